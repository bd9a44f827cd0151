use std::{collections::BTreeMap, sync::Arc};

use rhai::{AST, Dynamic, FnAccess, Module, Scope};
use tracing::{debug, info, warn};

use crate::{
    builtins::BoundNamespace,
    config::BridgeConfig,
    contract::InterfaceContract,
    engine::{Deadline, build_engine},
    error::{ConfigError, LoadError, classify},
    handle::{ModuleHandle, Runtime},
    source::ScriptSource,
};

/// Compiles script sources and checks them against interface contracts.
#[derive(Debug, Clone, Default)]
pub struct ModuleLoader {
    config: BridgeConfig,
}

impl ModuleLoader {
    /// Create a loader applying `config` to every module it loads.
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    /// Active configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Compile `source`, verify it satisfies `contract` and run its top-level
    /// statements once.
    ///
    /// Constants declared at the top level are readable from exported
    /// functions as `global::NAME`. Top-level `let` bindings stay private to
    /// initialization.
    ///
    /// `namespace` must be the binding for the contract's builtin namespace
    /// when the contract declares one.
    pub fn load(
        &self,
        source: &ScriptSource,
        contract: &Arc<InterfaceContract>,
        namespace: Option<BoundNamespace>,
    ) -> Result<ModuleHandle, LoadError> {
        let id = source.id();
        match (contract.namespace(), &namespace) {
            (Some(expected), Some(bound)) if bound.name() != expected => {
                return Err(ConfigError::UnknownNamespace(expected.to_string()).into());
            }
            (Some(expected), None) => {
                return Err(ConfigError::UnknownNamespace(expected.to_string()).into());
            }
            _ => {}
        }

        let deadline = Deadline::default();
        let mut engine = build_engine(&self.config, id, namespace.as_ref(), deadline.clone());

        let ast = engine.compile(source.text()).map_err(|error| {
            warn!(module = id, %error, "script failed to parse");
            LoadError::Parse {
                id: id.to_string(),
                error,
            }
        })?;

        let available = exported_functions(&ast);
        debug!(module = id, exports = ?available.keys().collect::<Vec<_>>(), "compiled script");
        if let Err(err) = contract.check(id, &available) {
            warn!(
                module = id,
                interface = contract.name(),
                missing = ?err.missing,
                "script does not satisfy contract"
            );
            return Err(err.into());
        }

        let mut scope = Scope::new();
        deadline.arm(self.config.timeout);
        let init = engine.run_ast_with_scope(&mut scope, &ast);
        deadline.disarm();
        if let Err(err) = init {
            let timeout_ms = self.config.timeout.as_millis() as u64;
            let message = classify("<init>", timeout_ms, &err).to_string();
            warn!(module = id, %message, "module initialization failed");
            return Err(LoadError::Initialization {
                id: id.to_string(),
                message,
            });
        }

        let constants = module_constants(&scope);
        if !constants.is_empty() {
            debug!(module = id, count = constants.len(), "exposing module constants");
            let mut globals = Module::new();
            for (name, value) in constants {
                globals.set_var(name, value);
            }
            engine.register_static_module(GLOBAL_NAMESPACE, globals.into());
        }

        info!(
            module = id,
            interface = contract.name(),
            namespace = namespace.as_ref().map(|n| n.name()),
            "loaded script module"
        );
        let runtime = Runtime {
            engine,
            ast,
            scope,
            deadline,
        };
        Ok(ModuleHandle::new(
            source.clone(),
            contract.clone(),
            namespace,
            runtime,
            self.config.timeout,
        ))
    }
}

/// Namespace through which functions read top-level constants.
const GLOBAL_NAMESPACE: &str = "global";

/// Top-level constants left in scope after initialization. Later
/// declarations shadow earlier ones.
fn module_constants(scope: &Scope) -> BTreeMap<String, Dynamic> {
    scope
        .iter()
        .filter(|(_, constant, _)| *constant)
        .map(|(name, _, value)| (name.to_string(), value))
        .collect()
}

/// Public script functions by name, with the parameter count of each overload.
fn exported_functions(ast: &AST) -> BTreeMap<String, Vec<usize>> {
    let mut out: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for f in ast.iter_functions() {
        if matches!(f.access, FnAccess::Private) || f.name.starts_with("anon$") {
            continue;
        }
        out.entry(f.name.to_string())
            .or_default()
            .push(f.params.len());
    }
    out
}
