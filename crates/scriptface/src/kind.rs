use std::{collections::BTreeMap, fmt, sync::Arc};

use crate::{
    error::{DecodeError, DecodeReason, PathSegment},
    value::Value,
};

/// Largest integer magnitude a boundary number represents exactly.
pub const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Expected shape of a value at the boundary.
///
/// Kinds are declared by the integrating application for every argument,
/// return value and record field; nothing is inferred from the value itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Kind {
    /// Any value, passed through unchecked.
    Any,
    /// Boolean.
    Bool,
    /// Exactly integral number.
    Int,
    /// Any number.
    Float,
    /// String.
    String,
    /// The inner kind, or null.
    Optional(Box<Kind>),
    /// Sequence of the inner kind.
    Seq(Box<Kind>),
    /// Map with dynamic string keys and values of the inner kind.
    Map(Box<Kind>),
    /// Struct-like record with a fixed field set.
    Record(Arc<RecordKind>),
}

impl Kind {
    /// Optional wrapper.
    pub fn optional(inner: Kind) -> Self {
        Self::Optional(Box::new(inner))
    }

    /// Sequence wrapper.
    pub fn seq(inner: Kind) -> Self {
        Self::Seq(Box::new(inner))
    }

    /// Dynamic map wrapper.
    pub fn map(inner: Kind) -> Self {
        Self::Map(Box::new(inner))
    }

    /// Whether a null or absent value is acceptable.
    pub fn is_optional(&self) -> bool {
        matches!(self, Self::Optional(_) | Self::Any)
    }

    /// Check `value` against this kind and normalize it.
    ///
    /// Records keep only their declared fields and gain explicit nulls for
    /// absent optional fields. Integers must be exactly integral and within
    /// [`MAX_SAFE_INTEGER`].
    pub fn conform(&self, value: Value) -> Result<Value, DecodeError> {
        match (self, value) {
            (Self::Any, value) => Ok(value),
            (Self::Optional(_), Value::Null) => Ok(Value::Null),
            (Self::Optional(inner), value) => inner.conform(value),
            (kind, Value::Null) => Err(DecodeError::new(DecodeReason::NullNotAllowed(
                kind.to_string(),
            ))),
            (Self::Bool, value @ Value::Bool(_)) => Ok(value),
            (Self::Float, value @ Value::Number(_)) => Ok(value),
            (Self::Int, Value::Number(n)) => check_integral(n).map(Value::Number),
            (Self::String, value @ Value::String(_)) => Ok(value),
            (Self::Seq(inner), Value::Seq(items)) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    inner
                        .conform(item)
                        .map_err(|e| e.within(PathSegment::Index(i)))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Seq),
            (Self::Map(inner), Value::Map(entries)) => entries
                .into_iter()
                .map(|(key, item)| match inner.conform(item) {
                    Ok(item) => Ok((key, item)),
                    Err(e) => Err(e.at_field(&key)),
                })
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map(Value::Map),
            (Self::Record(record), Value::Map(entries)) => record.conform(entries),
            (kind, value) => Err(DecodeError::mismatch(kind, &value)),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Bool => write!(f, "bool"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::String => write!(f, "string"),
            Self::Optional(inner) => write!(f, "{inner}?"),
            Self::Seq(inner) => write!(f, "array<{inner}>"),
            Self::Map(inner) => write!(f, "map<{inner}>"),
            Self::Record(record) => write!(f, "{}", record.name),
        }
    }
}

fn check_integral(n: f64) -> Result<f64, DecodeError> {
    if !n.is_finite() || n.fract() != 0.0 {
        return Err(DecodeError::new(DecodeReason::FractionalInteger(n)));
    }
    if n.abs() > MAX_SAFE_INTEGER {
        return Err(DecodeError::new(DecodeReason::OutOfRange {
            value: n,
            target: "int",
        }));
    }
    Ok(n)
}

/// One declared record field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name as seen by scripts.
    pub name: String,
    /// Field kind; `Kind::Optional` makes the field optional.
    pub kind: Kind,
}

/// Schema of a struct-like record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordKind {
    /// Record type name, used in errors and generated declarations.
    pub name: String,
    /// Declared fields in declaration order.
    pub fields: Vec<Field>,
}

impl RecordKind {
    /// Start a record schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a required field.
    pub fn field(mut self, name: impl Into<String>, kind: Kind) -> Self {
        self.fields.push(Field {
            name: name.into(),
            kind,
        });
        self
    }

    /// Add an optional field.
    pub fn optional(self, name: impl Into<String>, kind: Kind) -> Self {
        self.field(name, Kind::optional(kind))
    }

    /// Finish the schema as a [`Kind`].
    pub fn build(self) -> Kind {
        Kind::Record(Arc::new(self))
    }

    /// Record kinds referenced by this record's fields, depth first.
    pub(crate) fn nested(&self, out: &mut Vec<Arc<RecordKind>>) {
        for field in &self.fields {
            collect_records(&field.kind, out);
        }
    }

    fn conform(&self, mut entries: BTreeMap<String, Value>) -> Result<Value, DecodeError> {
        let mut out = BTreeMap::new();
        for field in &self.fields {
            let value = match entries.remove(&field.name) {
                Some(value) => field
                    .kind
                    .conform(value)
                    .map_err(|e| e.at_field(&field.name))?,
                None if field.kind.is_optional() => Value::Null,
                None => {
                    return Err(DecodeError::new(DecodeReason::MissingField(
                        field.name.clone(),
                    )));
                }
            };
            out.insert(field.name.clone(), value);
        }
        Ok(Value::Map(out))
    }
}

/// Collect every distinct record kind reachable from `kind`.
pub(crate) fn collect_records(kind: &Kind, out: &mut Vec<Arc<RecordKind>>) {
    match kind {
        Kind::Optional(inner) | Kind::Seq(inner) | Kind::Map(inner) => collect_records(inner, out),
        Kind::Record(record) => {
            if out.iter().any(|seen| seen.name == record.name) {
                return;
            }
            out.push(record.clone());
            record.nested(out);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> Kind {
        RecordKind::new("Address")
            .field("street", Kind::String)
            .field("city", Kind::String)
            .field("zipCode", Kind::String)
            .build()
    }

    fn person() -> Kind {
        RecordKind::new("Person")
            .field("name", Kind::String)
            .field("age", Kind::Int)
            .optional("address", address())
            .build()
    }

    fn map(entries: &[(&str, Value)]) -> Value {
        Value::Map(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn record_ignores_unknown_fields_and_fills_optional() {
        let value = map(&[
            ("name", "Alice".into()),
            ("age", 30.into()),
            ("nickname", "Al".into()),
        ]);
        let conformed = person().conform(value).unwrap();
        assert_eq!(conformed.get("address"), Some(&Value::Null));
        assert_eq!(conformed.get("nickname"), None);
    }

    #[test]
    fn record_requires_declared_fields() {
        let value = map(&[("name", "Alice".into())]);
        let err = person().conform(value).unwrap_err();
        assert_eq!(err.reason, DecodeReason::MissingField("age".into()));
    }

    #[test]
    fn nested_errors_carry_their_path() {
        let value = map(&[
            ("name", "Alice".into()),
            ("age", 30.into()),
            ("address", map(&[("street", "Main St".into())])),
        ]);
        let err = person().conform(value).unwrap_err();
        assert_eq!(err.location(), "$.address");
        assert_eq!(err.reason, DecodeReason::MissingField("city".into()));
    }

    #[test]
    fn integers_reject_fractions() {
        let err = Kind::Int.conform(Value::Number(2.5)).unwrap_err();
        assert_eq!(err.reason, DecodeReason::FractionalInteger(2.5));
        assert_eq!(Kind::Int.conform(Value::Number(5.0)), Ok(Value::Number(5.0)));
        assert!(Kind::Int.conform(Value::Number(1e300)).is_err());
    }

    #[test]
    fn null_requires_optional_target() {
        assert!(Kind::String.conform(Value::Null).is_err());
        assert_eq!(
            Kind::optional(Kind::String).conform(Value::Null),
            Ok(Value::Null)
        );
    }

    #[test]
    fn sequences_report_failing_index() {
        let err = Kind::seq(Kind::String)
            .conform(Value::from(vec![Value::from("a"), Value::Number(1.0)]))
            .unwrap_err();
        assert_eq!(err.location(), "$[1]");
    }

    #[test]
    fn records_are_collected_once() {
        let mut out = Vec::new();
        collect_records(&Kind::seq(person()), &mut out);
        let names: Vec<_> = out.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["Person", "Address"]);
    }
}
