use std::fmt;

use rhai::{EvalAltResult, ParseError, Position};
use serde::{Deserialize, Serialize};

use crate::{marshal::from_dynamic, value::Value};

/// One step in the location of a decode failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A record field or map key.
    Field(String),
    /// A sequence index.
    Index(usize),
    /// A positional argument.
    Arg(usize),
    /// The return value of a call.
    Return,
}

/// Why a value could not cross the boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeReason {
    /// The value's shape does not match the expected kind.
    #[error("expected {expected}, found {found}")]
    KindMismatch {
        /// Expected kind name.
        expected: String,
        /// Name of the value actually found.
        found: String,
    },
    /// A required record field was absent.
    #[error("missing required field '{0}'")]
    MissingField(String),
    /// A null reached a non-optional target.
    #[error("null is not allowed for {0}")]
    NullNotAllowed(String),
    /// A fractional number was targeted at an integer.
    #[error("{0} is not an integer")]
    FractionalInteger(f64),
    /// A number does not fit the target type.
    #[error("{value} is out of range for {target}")]
    OutOfRange {
        /// The offending number.
        value: f64,
        /// Target type name.
        target: &'static str,
    },
    /// A runtime value has no boundary representation.
    #[error("unsupported script type '{0}'")]
    Unsupported(String),
}

/// A value could not be converted between host and script representations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{reason} at {}", render_path(.path))]
pub struct DecodeError {
    /// Location of the failure, outermost first.
    pub path: Vec<PathSegment>,
    /// What went wrong.
    pub reason: DecodeReason,
}

impl DecodeError {
    /// Create an error located at the root.
    pub fn new(reason: DecodeReason) -> Self {
        Self {
            path: Vec::new(),
            reason,
        }
    }

    pub(crate) fn mismatch(expected: impl fmt::Display, found: &Value) -> Self {
        Self::new(DecodeReason::KindMismatch {
            expected: expected.to_string(),
            found: found.type_name().to_string(),
        })
    }

    /// Prefix the error location with an enclosing segment.
    pub fn within(mut self, segment: PathSegment) -> Self {
        self.path.insert(0, segment);
        self
    }

    /// Prefix the error location with a field name.
    pub fn at_field(self, name: &str) -> Self {
        self.within(PathSegment::Field(name.to_string()))
    }

    /// The rendered location, e.g. `$.address.city`.
    pub fn location(&self) -> String {
        render_path(&self.path)
    }
}

fn render_path(path: &[PathSegment]) -> String {
    let mut out = String::from("$");
    for segment in path {
        match segment {
            PathSegment::Field(name) => {
                out.push('.');
                out.push_str(name);
            }
            PathSegment::Index(i) => out.push_str(&format!("[{i}]")),
            PathSegment::Arg(i) => out.push_str(&format!(".arg{i}")),
            PathSegment::Return => out.push_str(".return"),
        }
    }
    out
}

/// Failure raised by a host builtin. Surfaces to the script as a catchable
/// exception carrying [`BuiltinError::message`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuiltinError {
    /// The builtin rejected its input or failed internally.
    #[error("{0}")]
    Failed(String),
    /// An argument could not be decoded into the builtin's parameter type.
    #[error("argument {index}: {source}")]
    Argument {
        /// Zero-based argument position.
        index: usize,
        /// Underlying decode failure.
        source: DecodeError,
    },
    /// The builtin's return value could not be encoded.
    #[error("return value: {0}")]
    Return(DecodeError),
}

impl BuiltinError {
    /// Create a failure with a human-readable message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Result alias for builtin implementations.
pub type BuiltinResult<T> = Result<T, BuiltinError>;

/// Invalid bridge configuration. Raised while building a bridge, never per call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A namespace, builtin, export or record name is not a valid identifier.
    #[error("invalid identifier: '{0}'")]
    InvalidName(String),
    /// The same builtin name appears twice in one namespace.
    #[error("duplicate builtin '{builtin}' in namespace '{namespace}'")]
    DuplicateBuiltin {
        /// Namespace name.
        namespace: String,
        /// Builtin name.
        builtin: String,
    },
    /// A namespace was re-registered with different signatures.
    #[error("namespace '{0}' is already registered with different signatures")]
    ConflictingNamespace(String),
    /// A contract or load referenced a namespace that was never registered.
    #[error("unknown builtin namespace: '{0}'")]
    UnknownNamespace(String),
    /// The same export name appears twice in one contract.
    #[error("duplicate export '{export}' in interface '{interface}'")]
    DuplicateExport {
        /// Interface name.
        interface: String,
        /// Export name.
        export: String,
    },
    /// A default load was requested for an interface with no implementation
    /// location.
    #[error("interface '{0}' declares no default implementation")]
    NoDefaultImplementation(String),
}

/// Declared and available parameter counts for one export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArityMismatch {
    /// Export name.
    pub export: String,
    /// Parameter count declared by the contract.
    pub expected: usize,
    /// Parameter counts of the script's overloads.
    pub found: Vec<usize>,
}

/// A script module does not satisfy its interface contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("module '{module}' does not satisfy interface '{interface}': {}", self.describe())]
pub struct ContractError {
    /// Interface name.
    pub interface: String,
    /// Source identifier of the module.
    pub module: String,
    /// Required exports that are absent, in contract order.
    pub missing: Vec<String>,
    /// Exports present with the wrong parameter count.
    pub arity: Vec<ArityMismatch>,
}

impl ContractError {
    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("missing exports [{}]", self.missing.join(", ")));
        }
        for m in &self.arity {
            parts.push(format!(
                "'{}' expects {} parameter(s), script declares {:?}",
                m.export, m.expected, m.found
            ));
        }
        parts.join("; ")
    }
}

/// Errors raised while producing a module handle.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
    /// The script source could not be read.
    #[error("failed to read script '{id}': {message}")]
    Io {
        /// Source identifier.
        id: String,
        /// Error message details.
        message: String,
    },
    /// The script failed to parse.
    #[error("parse error in '{id}': {error}")]
    Parse {
        /// Source identifier.
        id: String,
        /// Underlying parse error.
        error: ParseError,
    },
    /// The script's exports do not match the contract.
    #[error(transparent)]
    Contract(#[from] ContractError),
    /// Evaluating the module's top-level statements failed.
    #[error("initialization of '{id}' failed: {message}")]
    Initialization {
        /// Source identifier.
        id: String,
        /// Error message details.
        message: String,
    },
    /// The bridge configuration does not support this load.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Which side of the script call a decode failure happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeStage {
    /// Host arguments could not be encoded for the script.
    Arguments,
    /// The script's return value could not be decoded for the host.
    ReturnValue,
}

/// Coarse classification of an [`InvocationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationErrorKind {
    /// The export is not part of the validated contract.
    UnknownExport,
    /// The call supplied the wrong number of arguments.
    ArgumentCount,
    /// A value could not cross the boundary.
    HostDecodeFailed,
    /// The script raised an error.
    ScriptException,
    /// The call exceeded its deadline.
    Timeout,
    /// The script runtime hit a hard resource limit.
    RuntimeFault,
    /// The handle was abandoned by an earlier timeout or fault.
    Abandoned,
}

/// Errors raised by a single invocation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InvocationError {
    /// The export name is not in the handle's contract.
    #[error("unknown export '{export}' for interface '{interface}'")]
    UnknownExport {
        /// Interface name.
        interface: String,
        /// Requested export.
        export: String,
    },
    /// The number of arguments does not match the contract.
    #[error("'{export}' expects {expected} argument(s), got {actual}")]
    ArgumentCount {
        /// Export name.
        export: String,
        /// Declared parameter count.
        expected: usize,
        /// Supplied argument count.
        actual: usize,
    },
    /// An argument or return value could not be converted.
    #[error("'{export}': {stage:?} could not be converted: {source}")]
    HostDecodeFailed {
        /// Export name.
        export: String,
        /// Whether arguments or the return value failed.
        stage: DecodeStage,
        /// Underlying decode failure.
        source: DecodeError,
    },
    /// The script threw.
    #[error("'{export}' threw: {message}")]
    ScriptException {
        /// Export name.
        export: String,
        /// Thrown message, verbatim when the script threw a string.
        message: String,
        /// Structured thrown value, when it could be decoded.
        payload: Option<Value>,
        /// Line of the throw, when available.
        location: Option<String>,
    },
    /// The script exceeded the configured timeout.
    #[error("'{export}' timed out after {ms}ms")]
    Timeout {
        /// Export name.
        export: String,
        /// Timeout duration in milliseconds.
        ms: u64,
    },
    /// The script runtime failed at a level scripts cannot handle.
    #[error("'{export}' aborted by the script runtime: {message}")]
    RuntimeFault {
        /// Export name.
        export: String,
        /// Error message details.
        message: String,
    },
    /// The handle can no longer be used.
    #[error("module '{module}' was abandoned after a timeout or runtime fault")]
    Abandoned {
        /// Source identifier of the module.
        module: String,
    },
}

impl InvocationError {
    /// Coarse classification of this error.
    pub fn kind(&self) -> InvocationErrorKind {
        match self {
            Self::UnknownExport { .. } => InvocationErrorKind::UnknownExport,
            Self::ArgumentCount { .. } => InvocationErrorKind::ArgumentCount,
            Self::HostDecodeFailed { .. } => InvocationErrorKind::HostDecodeFailed,
            Self::ScriptException { .. } => InvocationErrorKind::ScriptException,
            Self::Timeout { .. } => InvocationErrorKind::Timeout,
            Self::RuntimeFault { .. } => InvocationErrorKind::RuntimeFault,
            Self::Abandoned { .. } => InvocationErrorKind::Abandoned,
        }
    }

    /// Whether this error leaves the handle unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            InvocationErrorKind::Timeout
                | InvocationErrorKind::RuntimeFault
                | InvocationErrorKind::Abandoned
        )
    }

    /// Convert the error to a structured, serializable form.
    pub fn info(&self) -> ErrorInfo {
        let (message, location, payload) = match self {
            Self::ScriptException {
                message,
                payload,
                location,
                ..
            } => (message.clone(), location.clone(), payload.clone()),
            Self::HostDecodeFailed { source, .. } => {
                (source.reason.to_string(), Some(source.location()), None)
            }
            other => (other.to_string(), None, None),
        };
        ErrorInfo {
            kind: self.kind(),
            message,
            location,
            payload,
        }
    }
}

/// Serializable error details for an invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error classification.
    pub kind: InvocationErrorKind,
    /// Human-readable error message.
    pub message: String,
    /// Location in the script or value, when available.
    pub location: Option<String>,
    /// Structured error details.
    pub payload: Option<Value>,
}

/// Translate a runtime error raised while executing `export`.
pub(crate) fn classify(export: &str, timeout_ms: u64, err: &EvalAltResult) -> InvocationError {
    let err = innermost(err);
    match err {
        EvalAltResult::ErrorTerminated(..) => InvocationError::Timeout {
            export: export.to_string(),
            ms: timeout_ms,
        },
        e @ (EvalAltResult::ErrorTooManyOperations(..)
        | EvalAltResult::ErrorTooManyVariables(..)
        | EvalAltResult::ErrorTooManyModules(..)
        | EvalAltResult::ErrorStackOverflow(..)
        | EvalAltResult::ErrorDataTooLarge(..)) => InvocationError::RuntimeFault {
            export: export.to_string(),
            message: e.to_string(),
        },
        EvalAltResult::ErrorRuntime(thrown, pos) => {
            let payload = from_dynamic(thrown).ok();
            let message = thrown_message(thrown, payload.as_ref());
            InvocationError::ScriptException {
                export: export.to_string(),
                message,
                payload,
                location: format_location(*pos),
            }
        }
        other => InvocationError::ScriptException {
            export: export.to_string(),
            message: other.to_string(),
            payload: None,
            location: format_location(other.position()),
        },
    }
}

/// Unwrap the function-call frames Rhai wraps around errors.
fn innermost(mut err: &EvalAltResult) -> &EvalAltResult {
    while let EvalAltResult::ErrorInFunctionCall(_, _, inner, _) = err {
        err = inner;
    }
    err
}

fn thrown_message(thrown: &rhai::Dynamic, payload: Option<&Value>) -> String {
    match payload {
        Some(Value::String(s)) => s.clone(),
        Some(map @ Value::Map(_)) => match map.get("message") {
            Some(Value::String(s)) => s.clone(),
            _ => map.to_string(),
        },
        _ => thrown.to_string(),
    }
}

pub(crate) fn format_location(pos: Position) -> Option<String> {
    if pos.is_none() {
        None
    } else {
        Some(format!("line {}", pos.line().unwrap_or(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_renders_path() {
        let err = DecodeError::new(DecodeReason::MissingField("city".into()))
            .at_field("address")
            .within(PathSegment::Arg(0));
        assert_eq!(err.location(), "$.arg0.address");
        assert_eq!(
            err.to_string(),
            "missing required field 'city' at $.arg0.address"
        );
    }

    #[test]
    fn contract_error_names_missing_exports() {
        let err = ContractError {
            interface: "Calculator".into(),
            module: "calc.rhai".into(),
            missing: vec!["multiply".into(), "divide".into()],
            arity: vec![],
        };
        assert_eq!(
            err.to_string(),
            "module 'calc.rhai' does not satisfy interface 'Calculator': missing exports [multiply, divide]"
        );
    }

    #[test]
    fn thrown_string_is_preserved_verbatim() {
        let err = EvalAltResult::ErrorInFunctionCall(
            "divide".into(),
            String::new(),
            Box::new(EvalAltResult::ErrorRuntime(
                "Division by zero".into(),
                Position::new(3, 9),
            )),
            Position::NONE,
        );
        let classified = classify("divide", 1000, &err);
        assert_eq!(classified.kind(), InvocationErrorKind::ScriptException);
        let info = classified.info();
        assert_eq!(info.message, "Division by zero");
        assert_eq!(info.location.as_deref(), Some("line 3"));
    }

    #[test]
    fn termination_is_a_timeout() {
        let err = EvalAltResult::ErrorTerminated(rhai::Dynamic::UNIT, Position::NONE);
        let classified = classify("spin", 250, &err);
        assert!(matches!(classified, InvocationError::Timeout { ms: 250, .. }));
        assert!(classified.is_fatal());
    }

    #[test]
    fn resource_limits_are_runtime_faults() {
        let err = EvalAltResult::ErrorTooManyOperations(Position::NONE);
        let classified = classify("spin", 1000, &err);
        assert_eq!(classified.kind(), InvocationErrorKind::RuntimeFault);
        assert!(classified.is_fatal());
    }

    #[test]
    fn parse_errors_raised_by_scripts_are_exceptions() {
        let err = EvalAltResult::ErrorParsing(
            rhai::ParseErrorType::UnexpectedEOF,
            Position::new(1, 4),
        );
        let classified = classify("f", 1000, &err);
        assert_eq!(classified.kind(), InvocationErrorKind::ScriptException);
        assert!(!classified.is_fatal());
    }

    #[test]
    fn error_info_serializes_kind() {
        let err = InvocationError::UnknownExport {
            interface: "Calculator".into(),
            export: "sqrt".into(),
        };
        let json = serde_json::to_value(err.info()).unwrap();
        assert_eq!(json["kind"], "unknown_export");
    }
}
