use std::{
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use rhai::{AST, CallFnOptions, Dynamic, Engine, Scope};
use tracing::{debug, error, warn};

use crate::{
    builtins::BoundNamespace,
    contract::{ExportSignature, InterfaceContract},
    engine::Deadline,
    error::{DecodeError, DecodeStage, InvocationError, PathSegment, classify},
    marshal::{Marshal, from_dynamic, to_dynamic},
    source::ScriptSource,
    value::Value,
};

/// Positional arguments for [`ModuleHandle::invoke`].
///
/// Implemented for `()`, tuples of up to six [`Marshal`] values, and
/// `Vec<Value>`.
pub trait IntoArgs {
    /// Encode the arguments into boundary values.
    fn into_values(self) -> Result<Vec<Value>, DecodeError>;
}

impl IntoArgs for () {
    fn into_values(self) -> Result<Vec<Value>, DecodeError> {
        Ok(Vec::new())
    }
}

impl IntoArgs for Vec<Value> {
    fn into_values(self) -> Result<Vec<Value>, DecodeError> {
        Ok(self)
    }
}

macro_rules! impl_into_args {
    ($($T:ident => $idx:tt),+) => {
        impl<$($T: Marshal),+> IntoArgs for ($($T,)+) {
            fn into_values(self) -> Result<Vec<Value>, DecodeError> {
                Ok(vec![$(
                    self.$idx
                        .encode()
                        .map_err(|e| e.within(PathSegment::Arg($idx)))?,
                )+])
            }
        }
    };
}

impl_into_args!(A => 0);
impl_into_args!(A => 0, B => 1);
impl_into_args!(A => 0, B => 1, C => 2);
impl_into_args!(A => 0, B => 1, C => 2, D => 3);
impl_into_args!(A => 0, B => 1, C => 2, D => 3, E => 4);
impl_into_args!(A => 0, B => 1, C => 2, D => 3, E => 4, F => 5);

/// Engine state produced by the loader for one module.
pub(crate) struct Runtime {
    pub(crate) engine: Engine,
    pub(crate) ast: AST,
    pub(crate) scope: Scope<'static>,
    pub(crate) deadline: Deadline,
}

/// A loaded script module validated against its interface contract.
///
/// Handles can be shared between threads. Invocations on one handle are
/// serialized; distinct handles run independently.
pub struct ModuleHandle {
    source: ScriptSource,
    contract: Arc<InterfaceContract>,
    namespace: Option<BoundNamespace>,
    engine: Engine,
    ast: AST,
    scope: Mutex<Scope<'static>>,
    deadline: Deadline,
    timeout: Duration,
    abandoned: AtomicBool,
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("id", &self.source.id())
            .field("interface", &self.contract.name())
            .field("namespace", &self.namespace.as_ref().map(|n| n.name()))
            .field("abandoned", &self.is_abandoned())
            .finish_non_exhaustive()
    }
}

impl ModuleHandle {
    pub(crate) fn new(
        source: ScriptSource,
        contract: Arc<InterfaceContract>,
        namespace: Option<BoundNamespace>,
        runtime: Runtime,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            contract,
            namespace,
            engine: runtime.engine,
            ast: runtime.ast,
            scope: Mutex::new(runtime.scope),
            deadline: runtime.deadline,
            timeout,
            abandoned: AtomicBool::new(false),
        }
    }

    /// Source identifier of the module.
    pub fn id(&self) -> &str {
        self.source.id()
    }

    /// The source the module was loaded from.
    pub fn source(&self) -> &ScriptSource {
        &self.source
    }

    /// The contract the module was validated against.
    pub fn contract(&self) -> &Arc<InterfaceContract> {
        &self.contract
    }

    /// The builtin namespace bound into the module, if any.
    pub fn namespace(&self) -> Option<&BoundNamespace> {
        self.namespace.as_ref()
    }

    /// Exports callable through this handle.
    pub fn exports(&self) -> &[ExportSignature] {
        self.contract.exports()
    }

    /// Whether an earlier timeout or runtime fault made the handle unusable.
    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::Acquire)
    }

    /// Call `export` with typed arguments and decode the result into `R`.
    pub fn invoke<A, R>(&self, export: &str, args: A) -> Result<R, InvocationError>
    where
        A: IntoArgs,
        R: Marshal,
    {
        self.signature(export)?;
        let args = args
            .into_values()
            .map_err(|source| decode_failed(export, DecodeStage::Arguments, source))?;
        let value = self.invoke_values(export, args)?;
        R::decode(&value).map_err(|source| {
            decode_failed(
                export,
                DecodeStage::ReturnValue,
                source.within(PathSegment::Return),
            )
        })
    }

    /// Call `export` with boundary values.
    ///
    /// Arguments are conformed to the contract's parameter kinds before the
    /// script runs, and the result is conformed to the declared return kind.
    pub fn invoke_values(&self, export: &str, args: Vec<Value>) -> Result<Value, InvocationError> {
        let signature = self.signature(export)?;
        if args.len() != signature.arity() {
            return Err(InvocationError::ArgumentCount {
                export: export.to_string(),
                expected: signature.arity(),
                actual: args.len(),
            });
        }

        let args = args
            .into_iter()
            .zip(&signature.params)
            .enumerate()
            .map(|(i, (arg, param))| {
                param
                    .kind
                    .conform(arg)
                    .map(|v| to_dynamic(&v, &param.kind))
                    .map_err(|e| e.within(PathSegment::Arg(i)))
            })
            .collect::<Result<Vec<Dynamic>, DecodeError>>()
            .map_err(|source| decode_failed(export, DecodeStage::Arguments, source))?;

        let result = self.execute(export, args)?;

        let value = from_dynamic(&result)
            .and_then(|v| signature.returns.conform(v))
            .map_err(|e| {
                decode_failed(
                    export,
                    DecodeStage::ReturnValue,
                    e.within(PathSegment::Return),
                )
            })?;
        Ok(value)
    }

    fn signature(&self, export: &str) -> Result<&ExportSignature, InvocationError> {
        self.contract
            .export(export)
            .ok_or_else(|| InvocationError::UnknownExport {
                interface: self.contract.name().to_string(),
                export: export.to_string(),
            })
    }

    /// Run one call with the scope lock held for its whole duration.
    fn execute(&self, export: &str, args: Vec<Dynamic>) -> Result<Dynamic, InvocationError> {
        let mut scope = self.scope.lock().unwrap_or_else(|e| e.into_inner());
        if self.is_abandoned() {
            return Err(InvocationError::Abandoned {
                module: self.id().to_string(),
            });
        }

        let start = Instant::now();
        self.deadline.arm(self.timeout);
        let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
        let result =
            self.engine
                .call_fn_with_options::<Dynamic>(options, &mut scope, &self.ast, export, args);
        self.deadline.disarm();
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(value) => {
                debug!(module = self.id(), export, elapsed_ms, "invocation succeeded");
                Ok(value)
            }
            Err(err) => {
                let err = classify(export, self.timeout.as_millis() as u64, &err);
                if err.is_fatal() {
                    self.abandoned.store(true, Ordering::Release);
                    error!(module = self.id(), export, elapsed_ms, error = %err, "module abandoned");
                } else {
                    warn!(module = self.id(), export, elapsed_ms, error = %err, "invocation failed");
                }
                Err(err)
            }
        }
    }
}

fn decode_failed(export: &str, stage: DecodeStage, source: DecodeError) -> InvocationError {
    InvocationError::HostDecodeFailed {
        export: export.to_string(),
        stage,
        source,
    }
}
