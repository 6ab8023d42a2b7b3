//! Language-level field values.
//!
//! [`Value`] is what field accessors produce and consume; the dialect's binder
//! registry converts it to and from wire parameters. [`FieldValue`] connects a
//! Rust field type to its [`ValueKind`].

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// Declared kind of a mapped field. Selects the binder pair used for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Text,
    Bytes,
    Uuid,
    Date,
    DateTime,
    /// UTC instant
    Timestamp,
    /// Instant with its originating offset
    TimestampTz,
    Json,
    /// Enum stored as its variant name
    Enum,
}

impl ValueKind {
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Self::I8 | Self::I16 | Self::I32 | Self::I64 | Self::U8 | Self::U16 | Self::U32 | Self::U64
        )
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Text => "text",
            Self::Bytes => "bytes",
            Self::Uuid => "uuid",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Timestamp => "timestamp",
            Self::TimestampTz => "timestamptz",
            Self::Json => "json",
            Self::Enum => "enum",
        };
        f.write_str(name)
    }
}

/// A field value, or `Null` when the field is absent.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Timestamp(DateTime<Utc>),
    TimestampTz(DateTime<FixedOffset>),
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Kind of a non-null value. Text reports [`ValueKind::Text`] even when it
    /// holds an enum variant name.
    pub fn kind(&self) -> Option<ValueKind> {
        Some(match self {
            Self::Null => return None,
            Self::Bool(_) => ValueKind::Bool,
            Self::I8(_) => ValueKind::I8,
            Self::I16(_) => ValueKind::I16,
            Self::I32(_) => ValueKind::I32,
            Self::I64(_) => ValueKind::I64,
            Self::U8(_) => ValueKind::U8,
            Self::U16(_) => ValueKind::U16,
            Self::U32(_) => ValueKind::U32,
            Self::U64(_) => ValueKind::U64,
            Self::F32(_) => ValueKind::F32,
            Self::F64(_) => ValueKind::F64,
            Self::Text(_) => ValueKind::Text,
            Self::Bytes(_) => ValueKind::Bytes,
            Self::Uuid(_) => ValueKind::Uuid,
            Self::Date(_) => ValueKind::Date,
            Self::DateTime(_) => ValueKind::DateTime,
            Self::Timestamp(_) => ValueKind::Timestamp,
            Self::TimestampTz(_) => ValueKind::TimestampTz,
            Self::Json(_) => ValueKind::Json,
        })
    }

    /// Integer content widened to i64, if this is an integer value that fits.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::I8(v) => Some(v.into()),
            Self::I16(v) => Some(v.into()),
            Self::I32(v) => Some(v.into()),
            Self::I64(v) => Some(v),
            Self::U8(v) => Some(v.into()),
            Self::U16(v) => Some(v.into()),
            Self::U32(v) => Some(v.into()),
            Self::U64(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    /// Convert an integer value into the variant of `kind`, checking range.
    /// Non-integer values and nulls pass through unchanged.
    pub fn convert_integer(self, kind: ValueKind) -> Result<Value, String> {
        if !kind.is_integer() || self.kind() == Some(kind) {
            return Ok(self);
        }
        let Some(wide) = self.as_i64() else {
            return Ok(self);
        };
        let out_of_range = || format!("integer {wide} out of range for {kind}");
        Ok(match kind {
            ValueKind::I8 => Value::I8(i8::try_from(wide).map_err(|_| out_of_range())?),
            ValueKind::I16 => Value::I16(i16::try_from(wide).map_err(|_| out_of_range())?),
            ValueKind::I32 => Value::I32(i32::try_from(wide).map_err(|_| out_of_range())?),
            ValueKind::I64 => Value::I64(wide),
            ValueKind::U8 => Value::U8(u8::try_from(wide).map_err(|_| out_of_range())?),
            ValueKind::U16 => Value::U16(u16::try_from(wide).map_err(|_| out_of_range())?),
            ValueKind::U32 => Value::U32(u32::try_from(wide).map_err(|_| out_of_range())?),
            ValueKind::U64 => Value::U64(u64::try_from(wide).map_err(|_| out_of_range())?),
            _ => self,
        })
    }
}

/// Hashable identity of a primary-key value, used to match references to
/// the rows that resolve them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdKey {
    Int(i64),
    Text(String),
    Uuid(Uuid),
    Bytes(Vec<u8>),
    Other(String),
}

impl IdKey {
    /// Key for a non-null value.
    pub fn of(value: &Value) -> Option<IdKey> {
        if let Some(v) = value.as_i64() {
            return Some(IdKey::Int(v));
        }
        match value {
            Value::Null => None,
            Value::Text(s) => Some(IdKey::Text(s.clone())),
            Value::Uuid(u) => Some(IdKey::Uuid(*u)),
            Value::Bytes(b) => Some(IdKey::Bytes(b.clone())),
            other => Some(IdKey::Other(format!("{other:?}"))),
        }
    }
}

/// A Rust type that can back a mapped scalar field.
///
/// Implemented for the supported primitives and their `Option` forms. The
/// plain forms reject `Null` on load; use `Option<T>` for nullable columns.
pub trait FieldValue: Sized + Send + Sync + 'static {
    const KIND: ValueKind;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Result<Self, String>;
}

macro_rules! impl_field_value {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl FieldValue for $ty {
                const KIND: ValueKind = ValueKind::$variant;

                fn to_value(&self) -> Value {
                    Value::$variant(self.clone())
                }

                fn from_value(value: Value) -> Result<Self, String> {
                    match value.convert_integer(ValueKind::$variant)? {
                        Value::$variant(v) => Ok(v),
                        Value::Null => Err(format!(
                            "NULL cannot be stored in a non-optional {} field",
                            ValueKind::$variant
                        )),
                        other => Err(format!(
                            "expected {} value, got {:?}",
                            ValueKind::$variant,
                            other
                        )),
                    }
                }
            }

            impl FieldValue for Option<$ty> {
                const KIND: ValueKind = ValueKind::$variant;

                fn to_value(&self) -> Value {
                    match self {
                        Some(v) => Value::$variant(v.clone()),
                        None => Value::Null,
                    }
                }

                fn from_value(value: Value) -> Result<Self, String> {
                    match value {
                        Value::Null => Ok(None),
                        other => <$ty as FieldValue>::from_value(other).map(Some),
                    }
                }
            }

            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )+
    };
}

impl_field_value! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => Text,
    Vec<u8> => Bytes,
    Uuid => Uuid,
    NaiveDate => Date,
    NaiveDateTime => DateTime,
    DateTime<Utc> => Timestamp,
    DateTime<FixedOffset> => TimestampTz,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Build a `Vec<Value>` of statement parameters.
///
/// ```
/// use rowmap::{params, Value};
/// let p = params![7, "x", None::<i32>];
/// assert_eq!(p[0], Value::I32(7));
/// assert_eq!(p[2], Value::Null);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::Value>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::Value::from($value)),+]
    };
}
