use std::{
    any::TypeId,
    collections::{BTreeMap, HashSet},
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use rhai::{
    Dynamic, EvalAltResult, FnNamespace, FuncRegistration, Module, NativeCallContext, Position,
    RhaiFunc, Shared,
};
use tracing::{debug, error, warn};

use crate::{
    contract::{Param, validate_identifier},
    error::{BuiltinError, BuiltinResult, ConfigError},
    kind::Kind,
    marshal::{Marshal, from_dynamic, to_dynamic},
    value::Value,
};

/// Host function behind a builtin, operating on boundary values.
pub type BuiltinFn = Arc<dyn Fn(&[Value]) -> BuiltinResult<Value> + Send + Sync>;

/// A host-implemented function exposed to scripts.
#[derive(Clone)]
pub struct BuiltinDescriptor {
    name: String,
    params: Vec<Param>,
    returns: Kind,
    func: BuiltinFn,
}

impl fmt::Debug for BuiltinDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

impl BuiltinDescriptor {
    /// Describe a builtin over boundary values.
    ///
    /// Arguments are conformed to `params` before `func` runs, and the result
    /// is conformed to `returns` before it is handed back to the script.
    pub fn new<F>(name: impl Into<String>, params: Vec<Param>, returns: Kind, func: F) -> Self
    where
        F: Fn(&[Value]) -> BuiltinResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params,
            returns,
            func: Arc::new(func),
        }
    }

    /// Describe a builtin from a closure over [`Marshal`] types.
    ///
    /// Parameter kinds come from the closure's argument types. Missing
    /// entries in `param_names` are filled with `argN`.
    pub fn typed<M, F>(name: impl Into<String>, param_names: &[&str], func: F) -> Self
    where
        F: HostFn<M>,
        M: 'static,
    {
        let params = F::param_kinds()
            .into_iter()
            .enumerate()
            .map(|(i, kind)| {
                let name = param_names
                    .get(i)
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| format!("arg{i}"));
                Param::new(name, kind)
            })
            .collect();
        let func = Arc::new(func);
        Self {
            name: name.into(),
            params,
            returns: F::return_kind(),
            func: Arc::new(move |args: &[Value]| func.call_host(args)),
        }
    }

    /// Builtin name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameters.
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Declared return kind.
    pub fn returns(&self) -> &Kind {
        &self.returns
    }

    /// Call the builtin with boundary values, enforcing the declared kinds.
    pub fn call(&self, args: &[Value]) -> BuiltinResult<Value> {
        if args.len() != self.params.len() {
            return Err(BuiltinError::failed(format!(
                "{} expects {} argument(s), got {}",
                self.name,
                self.params.len(),
                args.len()
            )));
        }
        let args = args
            .iter()
            .zip(&self.params)
            .enumerate()
            .map(|(index, (arg, param))| {
                param
                    .kind
                    .conform(arg.clone())
                    .map_err(|source| BuiltinError::Argument { index, source })
            })
            .collect::<BuiltinResult<Vec<_>>>()?;
        let out = (self.func)(&args)?;
        self.returns.conform(out).map_err(BuiltinError::Return)
    }

    fn same_signature(&self, other: &Self) -> bool {
        self.name == other.name && self.params == other.params && self.returns == other.returns
    }
}

/// Closures usable as typed builtins. Implemented for `Fn(A, B, ..) ->
/// BuiltinResult<R>` with up to five [`Marshal`] arguments.
pub trait HostFn<Marker>: Send + Sync + 'static {
    /// Kinds of the closure's parameters.
    fn param_kinds() -> Vec<Kind>;
    /// Kind of the closure's result.
    fn return_kind() -> Kind;
    /// Decode arguments, run the closure and encode its result.
    fn call_host(&self, args: &[Value]) -> BuiltinResult<Value>;
}

fn decode_arg<T: Marshal>(args: &[Value], index: usize) -> BuiltinResult<T> {
    let value = args.get(index).unwrap_or(&Value::Null);
    T::decode(value).map_err(|source| BuiltinError::Argument { index, source })
}

macro_rules! impl_host_fn {
    ($($arg:ident),*) => {
        impl<F, R, $($arg,)*> HostFn<fn($($arg,)*) -> R> for F
        where
            F: Fn($($arg,)*) -> BuiltinResult<R> + Send + Sync + 'static,
            R: Marshal,
            $($arg: Marshal,)*
        {
            fn param_kinds() -> Vec<Kind> {
                vec![$($arg::kind(),)*]
            }

            fn return_kind() -> Kind {
                R::kind()
            }

            #[allow(non_snake_case, unused_mut, unused_variables, unused_assignments)]
            fn call_host(&self, args: &[Value]) -> BuiltinResult<Value> {
                let mut index = 0;
                $(
                    let $arg = decode_arg::<$arg>(args, index)?;
                    index += 1;
                )*
                let out = (self)($($arg,)*)?;
                out.encode().map_err(BuiltinError::Return)
            }
        }
    };
}

impl_host_fn!();
impl_host_fn!(A);
impl_host_fn!(A, B);
impl_host_fn!(A, B, C);
impl_host_fn!(A, B, C, D);
impl_host_fn!(A, B, C, D, E);

/// A host object exposing a fixed set of builtins under one namespace.
///
/// Builtin closures typically capture a clone of the provider's `Arc`.
/// Providers may be called concurrently from different handles and must be
/// stateless or internally synchronized.
pub trait BuiltinProvider: Send + Sync + 'static {
    /// Namespace the builtins are injected under.
    fn namespace(&self) -> &str;

    /// The builtins this provider exposes.
    fn builtins(self: Arc<Self>) -> Vec<BuiltinDescriptor>;
}

/// A named, immutable group of builtins.
#[derive(Debug)]
pub struct BuiltinNamespace {
    name: String,
    builtins: Vec<BuiltinDescriptor>,
}

impl BuiltinNamespace {
    /// Namespace name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Builtins in registration order.
    pub fn builtins(&self) -> &[BuiltinDescriptor] {
        &self.builtins
    }

    /// Look up a builtin by name.
    pub fn get(&self, name: &str) -> Option<&BuiltinDescriptor> {
        self.builtins.iter().find(|b| b.name == name)
    }
}

/// Configuration-time table of builtin namespaces.
#[derive(Debug, Default)]
pub struct BuiltinRegistry {
    namespaces: BTreeMap<String, Arc<BuiltinNamespace>>,
}

impl BuiltinRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a namespace.
    ///
    /// Registering the same name again with identical signatures is a no-op;
    /// different signatures are a configuration error.
    pub fn register(
        &mut self,
        namespace: &str,
        builtins: Vec<BuiltinDescriptor>,
    ) -> Result<(), ConfigError> {
        validate_identifier(namespace)?;
        let mut seen = HashSet::new();
        for builtin in &builtins {
            validate_identifier(&builtin.name)?;
            if !seen.insert(builtin.name.as_str()) {
                return Err(ConfigError::DuplicateBuiltin {
                    namespace: namespace.to_string(),
                    builtin: builtin.name.clone(),
                });
            }
        }

        if let Some(existing) = self.namespaces.get(namespace) {
            let identical = existing.builtins.len() == builtins.len()
                && builtins
                    .iter()
                    .all(|b| existing.get(&b.name).is_some_and(|e| e.same_signature(b)));
            if identical {
                debug!(namespace, "builtin namespace already registered");
                return Ok(());
            }
            return Err(ConfigError::ConflictingNamespace(namespace.to_string()));
        }

        debug!(namespace, count = builtins.len(), "registered builtin namespace");
        self.namespaces.insert(
            namespace.to_string(),
            Arc::new(BuiltinNamespace {
                name: namespace.to_string(),
                builtins,
            }),
        );
        Ok(())
    }

    /// Register the builtins of a provider under its namespace.
    pub fn register_provider<P: BuiltinProvider>(
        &mut self,
        provider: Arc<P>,
    ) -> Result<(), ConfigError> {
        let namespace = provider.namespace().to_string();
        let builtins = provider.builtins();
        self.register(&namespace, builtins)
    }

    /// Look up a registered namespace.
    pub fn namespace(&self, name: &str) -> Option<&Arc<BuiltinNamespace>> {
        self.namespaces.get(name)
    }

    /// Names of all registered namespaces.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }

    /// Produce the live script module for one namespace.
    pub fn bind(&self, name: &str) -> Result<BoundNamespace, ConfigError> {
        let namespace = self
            .namespaces
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownNamespace(name.to_string()))?;
        let module = build_module(&namespace);
        Ok(BoundNamespace {
            namespace,
            module: module.into(),
        })
    }
}

/// A namespace compiled into a read-only script module.
#[derive(Clone)]
pub struct BoundNamespace {
    namespace: Arc<BuiltinNamespace>,
    module: Shared<Module>,
}

impl fmt::Debug for BoundNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundNamespace")
            .field("name", &self.namespace.name)
            .finish_non_exhaustive()
    }
}

impl BoundNamespace {
    /// Namespace name, the identifier scripts use to reach the builtins.
    pub fn name(&self) -> &str {
        &self.namespace.name
    }

    /// The underlying namespace definition.
    pub fn namespace(&self) -> &BuiltinNamespace {
        &self.namespace
    }

    pub(crate) fn module(&self) -> Shared<Module> {
        self.module.clone()
    }
}

fn build_module(namespace: &Arc<BuiltinNamespace>) -> Module {
    let mut module = Module::new();
    for builtin in &namespace.builtins {
        let arg_types = vec![TypeId::of::<Dynamic>(); builtin.params.len()];
        let ns_name = namespace.name.clone();
        let func = builtin.clone();
        FuncRegistration::new(builtin.name.clone())
            .with_namespace(FnNamespace::Internal)
            .set_into_module_raw(
                &mut module,
                arg_types,
                RhaiFunc::Pure {
                    func: Shared::new(
                        move |_ctx: Option<NativeCallContext>, args: &mut [&mut Dynamic]| {
                            call_from_script(&ns_name, &func, args)
                        },
                    ),
                    has_context: false,
                    is_pure: true,
                    is_volatile: true,
                },
            );
    }
    module
}

/// Re-enter the marshaller for a script-originated builtin call.
fn call_from_script(
    namespace: &str,
    builtin: &BuiltinDescriptor,
    args: &[&mut Dynamic],
) -> Result<Dynamic, Box<EvalAltResult>> {
    let result = args
        .iter()
        .enumerate()
        .map(|(index, arg)| {
            from_dynamic(arg).map_err(|source| BuiltinError::Argument { index, source })
        })
        .collect::<BuiltinResult<Vec<_>>>()
        .and_then(|values| guarded_call(builtin, &values));

    match result {
        Ok(value) => Ok(to_dynamic(&value, &builtin.returns)),
        Err(err) => {
            warn!(namespace, builtin = %builtin.name, error = %err, "builtin failed");
            let message = match err {
                BuiltinError::Failed(message) => message,
                other => format!("{namespace}::{}: {other}", builtin.name),
            };
            Err(Box::new(EvalAltResult::ErrorRuntime(
                message.into(),
                Position::NONE,
            )))
        }
    }
}

/// Run a builtin, turning a host panic into an ordinary builtin failure so it
/// never unwinds through the script runtime.
fn guarded_call(builtin: &BuiltinDescriptor, args: &[Value]) -> BuiltinResult<Value> {
    panic::catch_unwind(AssertUnwindSafe(|| builtin.call(args))).unwrap_or_else(|payload| {
        let detail = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "unknown panic".to_string()
        };
        error!(builtin = %builtin.name, %detail, "builtin panicked");
        Err(BuiltinError::failed(format!(
            "builtin '{}' panicked: {detail}",
            builtin.name
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multiply() -> BuiltinDescriptor {
        BuiltinDescriptor::typed("multiply", &["a", "b"], |a: i64, b: i64| -> BuiltinResult<i64> {
            a.checked_mul(b)
                .ok_or_else(|| BuiltinError::failed("integer overflow"))
        })
    }

    #[test]
    fn typed_builtins_derive_kinds() {
        let builtin = multiply();
        assert_eq!(builtin.params()[0], Param::new("a", Kind::Int));
        assert_eq!(builtin.returns(), &Kind::Int);
        let out = builtin.call(&[Value::from(4), Value::from(7)]).unwrap();
        assert_eq!(out, Value::Number(28.0));
    }

    #[test]
    fn typed_builtins_reject_bad_arguments() {
        let err = multiply()
            .call(&[Value::from(4), Value::Number(0.5)])
            .unwrap_err();
        assert!(matches!(err, BuiltinError::Argument { index: 1, .. }));
        let err = multiply().call(&[Value::from(4)]).unwrap_err();
        assert!(matches!(err, BuiltinError::Failed(_)));
    }

    #[test]
    fn missing_param_names_are_generated() {
        let builtin = BuiltinDescriptor::typed("concat", &[], |a: String, b: String| {
            Ok::<_, BuiltinError>(a + b.as_str())
        });
        let names: Vec<_> = builtin.params().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["arg0", "arg1"]);
    }

    #[test]
    fn host_panics_become_builtin_failures() {
        let boom = BuiltinDescriptor::typed("boom", &[], || -> BuiltinResult<i64> {
            panic!("host bug")
        });
        let err = guarded_call(&boom, &[]).unwrap_err();
        assert_eq!(
            err,
            BuiltinError::failed("builtin 'boom' panicked: host bug")
        );
    }

    #[test]
    fn reregistering_identical_namespace_is_idempotent() {
        let mut registry = BuiltinRegistry::new();
        registry.register("Math", vec![multiply()]).unwrap();
        registry.register("Math", vec![multiply()]).unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), ["Math"]);
    }

    #[test]
    fn conflicting_namespace_is_a_config_error() {
        let mut registry = BuiltinRegistry::new();
        registry.register("Math", vec![multiply()]).unwrap();
        let other = BuiltinDescriptor::typed("multiply", &["a", "b"], |a: f64, b: f64| {
            Ok::<_, BuiltinError>(a * b)
        });
        assert_eq!(
            registry.register("Math", vec![other]),
            Err(ConfigError::ConflictingNamespace("Math".into()))
        );
    }

    #[test]
    fn duplicate_builtin_names_are_rejected() {
        let mut registry = BuiltinRegistry::new();
        let err = registry
            .register("Math", vec![multiply(), multiply()])
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateBuiltin { .. }));
    }

    #[test]
    fn bind_unknown_namespace_fails() {
        let registry = BuiltinRegistry::new();
        assert_eq!(
            registry.bind("Nope").unwrap_err(),
            ConfigError::UnknownNamespace("Nope".into())
        );
    }
}
