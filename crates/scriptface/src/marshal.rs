//! Typed codecs between host values, [`Value`] and Rhai's `Dynamic`.

use std::collections::BTreeMap;

use rhai::{Array, Dynamic, FLOAT, INT, Map};

use crate::{
    error::{DecodeError, DecodeReason, PathSegment},
    kind::{Kind, MAX_SAFE_INTEGER},
    value::Value,
};

/// A host type with a declared boundary kind and a codec to and from [`Value`].
///
/// Host records implement this by hand, usually with [`RecordWriter`] and
/// [`RecordReader`]:
///
/// ```
/// use scriptface::{DecodeError, Kind, Marshal, RecordKind, RecordReader, RecordWriter, Value};
///
/// struct Point { x: i64, y: i64 }
///
/// impl Marshal for Point {
///     fn kind() -> Kind {
///         RecordKind::new("Point").field("x", Kind::Int).field("y", Kind::Int).build()
///     }
///     fn encode(&self) -> Result<Value, DecodeError> {
///         RecordWriter::new().field("x", &self.x)?.field("y", &self.y)?.finish()
///     }
///     fn decode(value: &Value) -> Result<Self, DecodeError> {
///         let r = RecordReader::new(value, "Point")?;
///         Ok(Point { x: r.required("x")?, y: r.required("y")? })
///     }
/// }
/// ```
pub trait Marshal: Sized {
    /// The kind this type encodes to.
    fn kind() -> Kind;
    /// Project the host value into a boundary value.
    fn encode(&self) -> Result<Value, DecodeError>;
    /// Rebuild the host value from a boundary value.
    fn decode(value: &Value) -> Result<Self, DecodeError>;
}

/// Encode a host value and check it against `kind`.
pub fn encode<T: Marshal>(value: &T, kind: &Kind) -> Result<Value, DecodeError> {
    kind.conform(value.encode()?)
}

/// Check a boundary value against `kind` and decode it into a host value.
pub fn decode<T: Marshal>(value: Value, kind: &Kind) -> Result<T, DecodeError> {
    T::decode(&kind.conform(value)?)
}

impl Marshal for Value {
    fn kind() -> Kind {
        Kind::Any
    }

    fn encode(&self) -> Result<Value, DecodeError> {
        Ok(self.clone())
    }

    fn decode(value: &Value) -> Result<Self, DecodeError> {
        Ok(value.clone())
    }
}

impl Marshal for bool {
    fn kind() -> Kind {
        Kind::Bool
    }

    fn encode(&self) -> Result<Value, DecodeError> {
        Ok(Value::Bool(*self))
    }

    fn decode(value: &Value) -> Result<Self, DecodeError> {
        match value {
            Value::Bool(b) => Ok(*b),
            other => Err(mismatch_or_null(&Kind::Bool, other)),
        }
    }
}

impl Marshal for String {
    fn kind() -> Kind {
        Kind::String
    }

    fn encode(&self) -> Result<Value, DecodeError> {
        Ok(Value::String(self.clone()))
    }

    fn decode(value: &Value) -> Result<Self, DecodeError> {
        match value {
            Value::String(s) => Ok(s.clone()),
            other => Err(mismatch_or_null(&Kind::String, other)),
        }
    }
}

impl Marshal for f64 {
    fn kind() -> Kind {
        Kind::Float
    }

    fn encode(&self) -> Result<Value, DecodeError> {
        Ok(Value::Number(*self))
    }

    fn decode(value: &Value) -> Result<Self, DecodeError> {
        match value {
            Value::Number(n) => Ok(*n),
            other => Err(mismatch_or_null(&Kind::Float, other)),
        }
    }
}

macro_rules! impl_marshal_int {
    ($($ty:ty),*) => {$(
        impl Marshal for $ty {
            fn kind() -> Kind {
                Kind::Int
            }

            fn encode(&self) -> Result<Value, DecodeError> {
                let n = *self as f64;
                if n.abs() > MAX_SAFE_INTEGER {
                    return Err(DecodeError::new(DecodeReason::OutOfRange {
                        value: n,
                        target: stringify!($ty),
                    }));
                }
                Ok(Value::Number(n))
            }

            fn decode(value: &Value) -> Result<Self, DecodeError> {
                let n = match value {
                    Value::Number(n) => *n,
                    other => return Err(mismatch_or_null(&Kind::Int, other)),
                };
                if !n.is_finite() || n.fract() != 0.0 {
                    return Err(DecodeError::new(DecodeReason::FractionalInteger(n)));
                }
                if n < <$ty>::MIN as f64 || n > <$ty>::MAX as f64 || n.abs() > MAX_SAFE_INTEGER {
                    return Err(DecodeError::new(DecodeReason::OutOfRange {
                        value: n,
                        target: stringify!($ty),
                    }));
                }
                Ok(n as $ty)
            }
        }
    )*};
}

impl_marshal_int!(i32, i64, u32, u64);

impl<T: Marshal> Marshal for Option<T> {
    fn kind() -> Kind {
        Kind::optional(T::kind())
    }

    fn encode(&self) -> Result<Value, DecodeError> {
        match self {
            Some(inner) => inner.encode(),
            None => Ok(Value::Null),
        }
    }

    fn decode(value: &Value) -> Result<Self, DecodeError> {
        match value {
            Value::Null => Ok(None),
            other => T::decode(other).map(Some),
        }
    }
}

impl<T: Marshal> Marshal for Vec<T> {
    fn kind() -> Kind {
        Kind::seq(T::kind())
    }

    fn encode(&self) -> Result<Value, DecodeError> {
        self.iter()
            .enumerate()
            .map(|(i, item)| item.encode().map_err(|e| e.within(PathSegment::Index(i))))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Seq)
    }

    fn decode(value: &Value) -> Result<Self, DecodeError> {
        match value {
            Value::Seq(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| T::decode(item).map_err(|e| e.within(PathSegment::Index(i))))
                .collect(),
            other => Err(mismatch_or_null(&Self::kind(), other)),
        }
    }
}

impl<T: Marshal> Marshal for BTreeMap<String, T> {
    fn kind() -> Kind {
        Kind::map(T::kind())
    }

    fn encode(&self) -> Result<Value, DecodeError> {
        self.iter()
            .map(|(key, item)| -> Result<(String, Value), DecodeError> {
                Ok((key.clone(), item.encode().map_err(|e| e.at_field(key))?))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Value::Map)
    }

    fn decode(value: &Value) -> Result<Self, DecodeError> {
        match value {
            Value::Map(entries) => entries
                .iter()
                .map(|(key, item)| -> Result<(String, T), DecodeError> {
                    Ok((key.clone(), T::decode(item).map_err(|e| e.at_field(key))?))
                })
                .collect(),
            other => Err(mismatch_or_null(&Self::kind(), other)),
        }
    }
}

fn mismatch_or_null(kind: &Kind, found: &Value) -> DecodeError {
    if found.is_null() {
        DecodeError::new(DecodeReason::NullNotAllowed(kind.to_string()))
    } else {
        DecodeError::mismatch(kind, found)
    }
}

/// Builds the boundary value of a host record field by field.
#[derive(Debug, Default)]
pub struct RecordWriter {
    entries: BTreeMap<String, Value>,
}

impl RecordWriter {
    /// Start an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode and add a field. `None` options are written as null.
    pub fn field<T: Marshal>(mut self, name: &str, value: &T) -> Result<Self, DecodeError> {
        let encoded = value.encode().map_err(|e| e.at_field(name))?;
        self.entries.insert(name.to_string(), encoded);
        Ok(self)
    }

    /// Finish the record.
    pub fn finish(self) -> Result<Value, DecodeError> {
        Ok(Value::Map(self.entries))
    }
}

/// Reads the fields of a boundary record into host types.
#[derive(Debug)]
pub struct RecordReader<'a> {
    entries: &'a BTreeMap<String, Value>,
}

impl<'a> RecordReader<'a> {
    /// Borrow the fields of `value`, which must be a map.
    pub fn new(value: &'a Value, record: &str) -> Result<Self, DecodeError> {
        match value {
            Value::Map(entries) => Ok(Self { entries }),
            Value::Null => Err(DecodeError::new(DecodeReason::NullNotAllowed(
                record.to_string(),
            ))),
            other => Err(DecodeError::mismatch(record, other)),
        }
    }

    /// Decode a field that must be present. A null is passed to `T`, so
    /// `Option` fields accept it and everything else rejects it.
    pub fn required<T: Marshal>(&self, name: &str) -> Result<T, DecodeError> {
        let value = self.entries.get(name).ok_or_else(|| {
            DecodeError::new(DecodeReason::MissingField(name.to_string()))
        })?;
        T::decode(value).map_err(|e| e.at_field(name))
    }

    /// Decode a field that may be absent or null.
    pub fn optional<T: Marshal>(&self, name: &str) -> Result<Option<T>, DecodeError> {
        match self.entries.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::decode(value).map(Some).map_err(|e| e.at_field(name)),
        }
    }
}

/// Convert a boundary value to a Rhai value, directed by `kind`.
///
/// Numbers become `INT` where the kind is `Int` and `FLOAT` everywhere else.
pub fn to_dynamic(value: &Value, kind: &Kind) -> Dynamic {
    let kind = match kind {
        Kind::Optional(inner) => inner.as_ref(),
        other => other,
    };
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from_bool(*b),
        Value::Number(n) => match kind {
            Kind::Int => Dynamic::from_int(*n as INT),
            _ => Dynamic::from_float(*n as FLOAT),
        },
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Seq(items) => {
            let inner = match kind {
                Kind::Seq(inner) => inner.as_ref(),
                _ => &Kind::Any,
            };
            let array: Array = items.iter().map(|item| to_dynamic(item, inner)).collect();
            Dynamic::from_array(array)
        }
        Value::Map(entries) => {
            let map: Map = entries
                .iter()
                .map(|(key, item)| {
                    let item_kind = field_kind(kind, key);
                    (key.as_str().into(), to_dynamic(item, item_kind))
                })
                .collect();
            Dynamic::from_map(map)
        }
    }
}

fn field_kind<'k>(kind: &'k Kind, key: &str) -> &'k Kind {
    match kind {
        Kind::Map(inner) => inner,
        Kind::Record(record) => record
            .fields
            .iter()
            .find(|field| field.name == key)
            .map(|field| &field.kind)
            .unwrap_or(&Kind::Any),
        _ => &Kind::Any,
    }
}

/// Convert a Rhai value to a boundary value.
pub fn from_dynamic(value: &Dynamic) -> Result<Value, DecodeError> {
    let value = value.flatten_clone();
    if value.is_unit() {
        return Ok(Value::Null);
    }
    if let Ok(b) = value.as_bool() {
        return Ok(Value::Bool(b));
    }
    if let Ok(i) = value.as_int() {
        let n = i as f64;
        if n.abs() > MAX_SAFE_INTEGER {
            return Err(DecodeError::new(DecodeReason::OutOfRange {
                value: n,
                target: "number",
            }));
        }
        return Ok(Value::Number(n));
    }
    if let Ok(f) = value.as_float() {
        return Ok(Value::Number(f));
    }
    if let Ok(c) = value.as_char() {
        return Ok(Value::String(c.to_string()));
    }
    if value.is_string() {
        return value
            .into_immutable_string()
            .map(|s| Value::String(s.to_string()))
            .map_err(|found| DecodeError::new(DecodeReason::Unsupported(found.to_string())));
    }
    if value.is_array() {
        let array = value
            .into_array()
            .map_err(|found| DecodeError::new(DecodeReason::Unsupported(found.to_string())))?;
        return array
            .iter()
            .enumerate()
            .map(|(i, item)| from_dynamic(item).map_err(|e| e.within(PathSegment::Index(i))))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Seq);
    }
    if value.is_map() {
        let type_name = value.type_name();
        let map = value
            .try_cast::<Map>()
            .ok_or_else(|| DecodeError::new(DecodeReason::Unsupported(type_name.to_string())))?;
        return map
            .iter()
            .map(|(key, item)| -> Result<(String, Value), DecodeError> {
                let key = key.to_string();
                let item = from_dynamic(item).map_err(|e| e.at_field(&key))?;
                Ok((key, item))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Value::Map);
    }
    Err(DecodeError::new(DecodeReason::Unsupported(
        value.type_name().to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::RecordKind;

    #[derive(Debug, Clone, PartialEq)]
    struct Reading {
        label: String,
        samples: Vec<f64>,
        count: i64,
        note: Option<String>,
    }

    impl Marshal for Reading {
        fn kind() -> Kind {
            RecordKind::new("Reading")
                .field("label", Kind::String)
                .field("samples", Kind::seq(Kind::Float))
                .field("count", Kind::Int)
                .optional("note", Kind::String)
                .build()
        }

        fn encode(&self) -> Result<Value, DecodeError> {
            RecordWriter::new()
                .field("label", &self.label)?
                .field("samples", &self.samples)?
                .field("count", &self.count)?
                .field("note", &self.note)?
                .finish()
        }

        fn decode(value: &Value) -> Result<Self, DecodeError> {
            let r = RecordReader::new(value, "Reading")?;
            Ok(Self {
                label: r.required("label")?,
                samples: r.required("samples")?,
                count: r.required("count")?,
                note: r.optional("note")?,
            })
        }
    }

    fn reading() -> Reading {
        Reading {
            label: "gauge".into(),
            samples: vec![0.5, 1.25],
            count: 2,
            note: None,
        }
    }

    #[test]
    fn records_survive_the_boundary() {
        let kind = Reading::kind();
        let encoded = encode(&reading(), &kind).unwrap();
        assert_eq!(encoded.get("note"), Some(&Value::Null));

        let dynamic = to_dynamic(&encoded, &kind);
        let back = from_dynamic(&dynamic).unwrap();
        assert_eq!(decode::<Reading>(back, &kind).unwrap(), reading());
    }

    fn across<T: Marshal + PartialEq + std::fmt::Debug>(value: &T) -> T {
        let kind = T::kind();
        let encoded = encode(value, &kind).unwrap();
        let back = from_dynamic(&to_dynamic(&encoded, &kind)).unwrap();
        decode::<T>(back, &kind).unwrap()
    }

    #[test]
    fn every_kind_survives_the_boundary() {
        assert!(across(&true));
        assert_eq!(across(&-7i32), -7);
        assert_eq!(across(&4_000_000_000u32), 4_000_000_000);
        assert_eq!(across(&Some(2.5f64)), Some(2.5));
        assert_eq!(across(&Some(false)), Some(false));
        assert_eq!(across(&None::<String>), None);

        let nested = vec![vec![1u32, 2], vec![], vec![3]];
        assert_eq!(across(&nested), nested);

        let scores: BTreeMap<String, i32> =
            [("ada".to_string(), 36), ("alan".to_string(), -41)].into();
        assert_eq!(BTreeMap::<String, i32>::kind(), Kind::map(Kind::Int));
        assert_eq!(across(&scores), scores);

        let readings: BTreeMap<String, Vec<Option<Reading>>> =
            [("north".to_string(), vec![Some(reading()), None])].into();
        assert_eq!(across(&readings), readings);
    }

    #[test]
    fn int_fields_become_rhai_integers() {
        let kind = Reading::kind();
        let dynamic = to_dynamic(&encode(&reading(), &kind).unwrap(), &kind);
        let map = dynamic.cast::<Map>();
        assert!(map["count"].is::<INT>());
        assert!(map["samples"].clone().into_array().unwrap()[0].is::<FLOAT>());
    }

    #[test]
    fn fractional_value_never_truncates() {
        let err = decode::<i32>(Value::Number(2.7), &Kind::Int).unwrap_err();
        assert_eq!(err.reason, DecodeReason::FractionalInteger(2.7));
        let err = i64::decode(&Value::Number(0.5)).unwrap_err();
        assert_eq!(err.reason, DecodeReason::FractionalInteger(0.5));
    }

    #[test]
    fn narrow_integers_check_range() {
        let err = u32::decode(&Value::Number(-1.0)).unwrap_err();
        assert!(matches!(err.reason, DecodeReason::OutOfRange { .. }));
        assert!(i64::MAX.encode().is_err());
    }

    #[test]
    fn null_against_required_field_fails() {
        let mut value = encode(&reading(), &Reading::kind()).unwrap();
        if let Value::Map(entries) = &mut value {
            entries.insert("label".into(), Value::Null);
        }
        let err = decode::<Reading>(value, &Reading::kind()).unwrap_err();
        assert!(matches!(err.reason, DecodeReason::NullNotAllowed(_)));
        assert_eq!(err.location(), "$.label");
    }

    #[test]
    fn unsupported_dynamic_is_rejected() {
        let fn_ptr = Dynamic::from(rhai::FnPtr::new("noop").unwrap());
        let err = from_dynamic(&fn_ptr).unwrap_err();
        assert!(matches!(err.reason, DecodeReason::Unsupported(_)));
    }

    #[test]
    fn chars_decode_as_strings() {
        assert_eq!(
            from_dynamic(&Dynamic::from('x')).unwrap(),
            Value::String("x".into())
        );
    }
}
