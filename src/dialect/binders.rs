//! Value kind to wire parameter conversions.
//!
//! Each [`ValueKind`] maps to a stateless save/load pair. Saving widens
//! narrow integers to the smallest wire integer that holds every value of the
//! kind; loading narrows back with a range check. Unsigned 64-bit values have
//! no lossless wire integer and are left unregistered.

use crate::db::{DbRow, Param, WireType};
use crate::models::value::{Value, ValueKind};
use std::collections::HashMap;

/// Converts a field value into a statement parameter.
pub type SaveFn = fn(&Value) -> Result<Param, String>;

/// Reads a column of a result row into a field value.
pub type LoadFn = fn(&DbRow, usize) -> Result<Value, String>;

#[derive(Clone, Copy)]
pub struct Binder {
    pub save: SaveFn,
    pub load: LoadFn,
}

impl std::fmt::Debug for Binder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binder").finish_non_exhaustive()
    }
}

/// Binder table owned by a dialect.
#[derive(Debug, Clone)]
pub struct BinderRegistry {
    binders: HashMap<ValueKind, Binder>,
}

impl BinderRegistry {
    pub fn empty() -> Self {
        Self {
            binders: HashMap::new(),
        }
    }

    /// Binders shared by every supported backend.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(ValueKind::Bool, save_bool, load_bool);
        registry.register(ValueKind::I8, save_small_int, load_i8);
        registry.register(ValueKind::U8, save_small_int, load_u8);
        registry.register(ValueKind::I16, save_small_int, load_i16);
        registry.register(ValueKind::U16, save_int, load_u16);
        registry.register(ValueKind::I32, save_int, load_i32);
        registry.register(ValueKind::U32, save_big_int, load_u32);
        registry.register(ValueKind::I64, save_big_int, load_i64);
        registry.register(ValueKind::F32, save_real, load_f32);
        registry.register(ValueKind::F64, save_double, load_f64);
        registry.register(ValueKind::Text, save_text, load_text);
        registry.register(ValueKind::Enum, save_text, load_text);
        registry.register(ValueKind::Bytes, save_bytes, load_bytes);
        registry.register(ValueKind::Uuid, save_uuid, load_uuid);
        registry.register(ValueKind::Date, save_date, load_date);
        registry.register(ValueKind::DateTime, save_datetime, load_datetime);
        registry.register(ValueKind::Timestamp, save_timestamp, load_timestamp);
        registry.register(ValueKind::TimestampTz, save_timestamptz, load_timestamptz);
        registry.register(ValueKind::Json, save_json, load_json);
        registry
    }

    pub fn register(&mut self, kind: ValueKind, save: SaveFn, load: LoadFn) {
        self.binders.insert(kind, Binder { save, load });
    }

    pub fn remove(&mut self, kind: ValueKind) {
        self.binders.remove(&kind);
    }

    pub fn get(&self, kind: ValueKind) -> Option<Binder> {
        self.binders.get(&kind).copied()
    }

    pub fn save_binder(&self, kind: ValueKind) -> Option<SaveFn> {
        self.get(kind).map(|b| b.save)
    }

    pub fn load_binder(&self, kind: ValueKind) -> Option<LoadFn> {
        self.get(kind).map(|b| b.load)
    }
}

impl Default for BinderRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn mismatch(expected: &str, value: &Value) -> String {
    format!("expected {expected} value, got {value:?}")
}

fn integer(value: &Value) -> Result<i64, String> {
    value.as_i64().ok_or_else(|| mismatch("integer", value))
}

fn save_bool(value: &Value) -> Result<Param, String> {
    match value {
        Value::Null => Ok(Param::Null(WireType::Bool)),
        Value::Bool(v) => Ok(Param::Bool(*v)),
        other => Err(mismatch("bool", other)),
    }
}

fn save_small_int(value: &Value) -> Result<Param, String> {
    if value.is_null() {
        return Ok(Param::Null(WireType::SmallInt));
    }
    let v = integer(value)?;
    i16::try_from(v)
        .map(Param::SmallInt)
        .map_err(|_| format!("integer {v} does not fit SMALLINT"))
}

fn save_int(value: &Value) -> Result<Param, String> {
    if value.is_null() {
        return Ok(Param::Null(WireType::Int));
    }
    let v = integer(value)?;
    i32::try_from(v)
        .map(Param::Int)
        .map_err(|_| format!("integer {v} does not fit INTEGER"))
}

fn save_big_int(value: &Value) -> Result<Param, String> {
    if value.is_null() {
        return Ok(Param::Null(WireType::BigInt));
    }
    integer(value).map(Param::BigInt)
}

fn save_real(value: &Value) -> Result<Param, String> {
    match value {
        Value::Null => Ok(Param::Null(WireType::Real)),
        Value::F32(v) => Ok(Param::Real(*v)),
        other => Err(mismatch("f32", other)),
    }
}

fn save_double(value: &Value) -> Result<Param, String> {
    match value {
        Value::Null => Ok(Param::Null(WireType::Double)),
        Value::F64(v) => Ok(Param::Double(*v)),
        Value::F32(v) => Ok(Param::Double(f64::from(*v))),
        other => Err(mismatch("f64", other)),
    }
}

fn save_text(value: &Value) -> Result<Param, String> {
    match value {
        Value::Null => Ok(Param::Null(WireType::Text)),
        Value::Text(v) => Ok(Param::Text(v.clone())),
        other => Err(mismatch("text", other)),
    }
}

fn save_bytes(value: &Value) -> Result<Param, String> {
    match value {
        Value::Null => Ok(Param::Null(WireType::Bytes)),
        Value::Bytes(v) => Ok(Param::Bytes(v.clone())),
        other => Err(mismatch("bytes", other)),
    }
}

fn save_uuid(value: &Value) -> Result<Param, String> {
    match value {
        Value::Null => Ok(Param::Null(WireType::Uuid)),
        Value::Uuid(v) => Ok(Param::Uuid(*v)),
        other => Err(mismatch("uuid", other)),
    }
}

fn save_date(value: &Value) -> Result<Param, String> {
    match value {
        Value::Null => Ok(Param::Null(WireType::Date)),
        Value::Date(v) => Ok(Param::Date(*v)),
        other => Err(mismatch("date", other)),
    }
}

fn save_datetime(value: &Value) -> Result<Param, String> {
    match value {
        Value::Null => Ok(Param::Null(WireType::DateTime)),
        Value::DateTime(v) => Ok(Param::DateTime(*v)),
        other => Err(mismatch("datetime", other)),
    }
}

fn save_timestamp(value: &Value) -> Result<Param, String> {
    match value {
        Value::Null => Ok(Param::Null(WireType::Timestamp)),
        Value::Timestamp(v) => Ok(Param::Timestamp(*v)),
        other => Err(mismatch("timestamp", other)),
    }
}

fn save_timestamptz(value: &Value) -> Result<Param, String> {
    match value {
        Value::Null => Ok(Param::Null(WireType::TimestampTz)),
        Value::TimestampTz(v) => Ok(Param::TimestampTz(*v)),
        other => Err(mismatch("timestamptz", other)),
    }
}

fn save_json(value: &Value) -> Result<Param, String> {
    match value {
        Value::Null => Ok(Param::Null(WireType::Json)),
        Value::Json(v) => Ok(Param::Json(v.clone())),
        other => Err(mismatch("json", other)),
    }
}

/// Save binder for zoned timestamps on engines that store only the instant.
pub(crate) fn save_timestamptz_as_utc(value: &Value) -> Result<Param, String> {
    match value {
        Value::Null => Ok(Param::Null(WireType::Timestamp)),
        Value::TimestampTz(v) => Ok(Param::Timestamp(v.with_timezone(&chrono::Utc))),
        other => Err(mismatch("timestamptz", other)),
    }
}

macro_rules! integer_loaders {
    ($($name:ident => $ty:ty, $variant:ident;)+) => {
        $(
            fn $name(row: &DbRow, index: usize) -> Result<Value, String> {
                match row.get_i64(index).map_err(|e| e.to_string())? {
                    None => Ok(Value::Null),
                    Some(v) => <$ty>::try_from(v)
                        .map(Value::$variant)
                        .map_err(|_| format!("value {v} out of range for {}", stringify!($ty))),
                }
            }
        )+
    };
}

integer_loaders! {
    load_i8 => i8, I8;
    load_u8 => u8, U8;
    load_i16 => i16, I16;
    load_u16 => u16, U16;
    load_i32 => i32, I32;
    load_u32 => u32, U32;
    load_i64 => i64, I64;
}

macro_rules! plain_loaders {
    ($($name:ident => $getter:ident, $variant:ident;)+) => {
        $(
            fn $name(row: &DbRow, index: usize) -> Result<Value, String> {
                Ok(row
                    .$getter(index)
                    .map_err(|e| e.to_string())?
                    .map_or(Value::Null, Value::$variant))
            }
        )+
    };
}

plain_loaders! {
    load_bool => get_bool, Bool;
    load_f64 => get_f64, F64;
    load_text => get_text, Text;
    load_bytes => get_bytes, Bytes;
    load_uuid => get_uuid, Uuid;
    load_date => get_date, Date;
    load_datetime => get_datetime, DateTime;
    load_timestamp => get_timestamp, Timestamp;
    load_timestamptz => get_timestamptz, TimestampTz;
    load_json => get_json, Json;
}

fn load_f32(row: &DbRow, index: usize) -> Result<Value, String> {
    Ok(row
        .get_f64(index)
        .map_err(|e| e.to_string())?
        .map_or(Value::Null, |v| Value::F32(v as f32)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_skips_u64() {
        let registry = BinderRegistry::standard();
        assert!(registry.get(ValueKind::I64).is_some());
        assert!(registry.get(ValueKind::Json).is_some());
        assert!(registry.get(ValueKind::U64).is_none());
    }

    #[test]
    fn test_narrow_integers_widen() {
        let registry = BinderRegistry::standard();
        let save = |kind, value| registry.save_binder(kind).unwrap()(&value).unwrap();
        assert_eq!(save(ValueKind::I8, Value::I8(-3)), Param::SmallInt(-3));
        assert_eq!(save(ValueKind::U8, Value::U8(255)), Param::SmallInt(255));
        assert_eq!(save(ValueKind::U16, Value::U16(65535)), Param::Int(65535));
        assert_eq!(
            save(ValueKind::U32, Value::U32(u32::MAX)),
            Param::BigInt(i64::from(u32::MAX))
        );
        assert_eq!(save(ValueKind::I32, Value::I64(12)), Param::Int(12));
    }

    #[test]
    fn test_out_of_range_integer_is_rejected() {
        let save = BinderRegistry::standard()
            .save_binder(ValueKind::I32)
            .unwrap();
        assert!(save(&Value::I64(i64::MAX)).is_err());
    }

    #[test]
    fn test_null_binds_typed() {
        let registry = BinderRegistry::standard();
        let save_null = |kind| registry.save_binder(kind).unwrap()(&Value::Null).unwrap();
        assert_eq!(save_null(ValueKind::I16), Param::Null(WireType::SmallInt));
        assert_eq!(save_null(ValueKind::F64), Param::Null(WireType::Double));
        assert_eq!(save_null(ValueKind::Enum), Param::Null(WireType::Text));
        assert_eq!(save_null(ValueKind::Json), Param::Null(WireType::Json));
    }

    #[test]
    fn test_kind_mismatch_is_reported() {
        let save = BinderRegistry::standard()
            .save_binder(ValueKind::Uuid)
            .unwrap();
        let err = save(&Value::Text("not-a-uuid".into())).unwrap_err();
        assert!(err.contains("expected uuid"));
    }

    #[test]
    fn test_zoned_timestamp_as_utc() {
        let ts = chrono::DateTime::parse_from_rfc3339("2024-03-01T10:00:00+02:00").unwrap();
        let param = save_timestamptz_as_utc(&Value::TimestampTz(ts)).unwrap();
        let Param::Timestamp(utc) = param else {
            panic!("expected UTC timestamp");
        };
        assert_eq!(utc.to_rfc3339(), "2024-03-01T08:00:00+00:00");
    }
}
