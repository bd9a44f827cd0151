use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use crate::{
    error::{ArityMismatch, ConfigError, ContractError},
    kind::{Kind, RecordKind, collect_records},
};

/// Name under which an interface's builtins are injected unless overridden.
pub fn default_namespace(interface: &str) -> String {
    format!("{interface}_Builtins")
}

/// A named, kinded parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Parameter name, used in generated declarations.
    pub name: String,
    /// Declared kind.
    pub kind: Kind,
}

impl Param {
    /// Create a parameter.
    pub fn new(name: impl Into<String>, kind: Kind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// One function a script module must export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSignature {
    /// Export name.
    pub name: String,
    /// Positional parameters.
    pub params: Vec<Param>,
    /// Kind of the return value.
    pub returns: Kind,
}

impl ExportSignature {
    /// Start a signature with no parameters returning `any`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: Kind::Any,
        }
    }

    /// Append a parameter.
    pub fn param(mut self, name: impl Into<String>, kind: Kind) -> Self {
        self.params.push(Param::new(name, kind));
        self
    }

    /// Set the return kind.
    pub fn returns(mut self, kind: Kind) -> Self {
        self.returns = kind;
        self
    }

    /// Number of parameters.
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// The set of exports a script module must provide, plus the builtin
/// namespace injected into it.
///
/// Contracts are immutable once built and shared read-only between handles.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceContract {
    name: String,
    namespace: Option<String>,
    default_location: Option<String>,
    exports: Vec<ExportSignature>,
}

impl InterfaceContract {
    /// Start building a contract.
    pub fn builder(name: impl Into<String>) -> ContractBuilder {
        ContractBuilder {
            name: name.into(),
            namespace: None,
            default_location: None,
            exports: Vec::new(),
        }
    }

    /// Interface name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Builtin namespace bound into modules of this interface, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Location of the default implementation script, if declared.
    pub fn default_location(&self) -> Option<&str> {
        self.default_location.as_deref()
    }

    /// Required exports in declaration order.
    pub fn exports(&self) -> &[ExportSignature] {
        &self.exports
    }

    /// Look up a required export by name.
    pub fn export(&self, name: &str) -> Option<&ExportSignature> {
        self.exports.iter().find(|e| e.name == name)
    }

    /// Record kinds used by any export, in first-use order.
    pub fn records(&self) -> Vec<Arc<RecordKind>> {
        let mut out = Vec::new();
        for export in &self.exports {
            for param in &export.params {
                collect_records(&param.kind, &mut out);
            }
            collect_records(&export.returns, &mut out);
        }
        out
    }

    /// Verify a module's exported functions against this contract.
    ///
    /// `available` maps each exported name to the parameter counts of its
    /// overloads.
    pub fn check(
        &self,
        module: &str,
        available: &BTreeMap<String, Vec<usize>>,
    ) -> Result<(), ContractError> {
        let mut missing = Vec::new();
        let mut arity = Vec::new();
        for export in &self.exports {
            match available.get(&export.name) {
                None => missing.push(export.name.clone()),
                Some(found) if !found.contains(&export.arity()) => arity.push(ArityMismatch {
                    export: export.name.clone(),
                    expected: export.arity(),
                    found: found.clone(),
                }),
                Some(_) => {}
            }
        }
        if missing.is_empty() && arity.is_empty() {
            Ok(())
        } else {
            Err(ContractError {
                interface: self.name.clone(),
                module: module.to_string(),
                missing,
                arity,
            })
        }
    }
}

/// Builder for [`InterfaceContract`].
#[derive(Debug)]
pub struct ContractBuilder {
    name: String,
    namespace: Option<String>,
    default_location: Option<String>,
    exports: Vec<ExportSignature>,
}

impl ContractBuilder {
    /// Add a required export.
    pub fn export(mut self, signature: ExportSignature) -> Self {
        self.exports.push(signature);
        self
    }

    /// Inject the builtin namespace named `<Interface>_Builtins`.
    pub fn with_builtins(mut self) -> Self {
        self.namespace = Some(default_namespace(&self.name));
        self
    }

    /// Inject a builtin namespace with an explicit name.
    pub fn builtins(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Declare where the default implementation script lives.
    pub fn implementation(mut self, location: impl Into<String>) -> Self {
        self.default_location = Some(location.into());
        self
    }

    /// Validate names and finish the contract.
    pub fn build(self) -> Result<Arc<InterfaceContract>, ConfigError> {
        validate_identifier(&self.name)?;
        if let Some(namespace) = &self.namespace {
            validate_identifier(namespace)?;
        }
        let mut seen = HashSet::new();
        for export in &self.exports {
            validate_identifier(&export.name)?;
            if !seen.insert(export.name.as_str()) {
                return Err(ConfigError::DuplicateExport {
                    interface: self.name.clone(),
                    export: export.name.clone(),
                });
            }
        }
        Ok(Arc::new(InterfaceContract {
            name: self.name,
            namespace: self.namespace,
            default_location: self.default_location,
            exports: self.exports,
        }))
    }
}

/// Check that `name` can be used as a script identifier.
pub(crate) fn validate_identifier(name: &str) -> Result<(), ConfigError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(ConfigError::InvalidName(name.to_string()))
    }
}
