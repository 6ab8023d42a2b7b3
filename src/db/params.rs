//! Wire-level statement parameters.
//!
//! Save binders turn field values into [`Param`]s; the functions here bind
//! them to backend-specific sqlx queries. NULLs carry a [`WireType`] so each
//! backend receives a typed NULL.
//!
//! UUIDs travel as hyphenated text on MySQL and SQLite, so UUID fields need a
//! text column there (`CHAR(36)` on MySQL). A MySQL `BINARY(16)` column is
//! readable but not a supported write or filter target.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::types::Json;
use sqlx::{MySql, Postgres, Sqlite};
use uuid::Uuid;

/// SQL-side type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    Bool,
    SmallInt,
    Int,
    BigInt,
    Real,
    Double,
    Text,
    Bytes,
    Uuid,
    Date,
    DateTime,
    Timestamp,
    TimestampTz,
    Json,
}

/// A statement parameter ready to bind.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null(WireType),
    Bool(bool),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Real(f32),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Timestamp(DateTime<Utc>),
    TimestampTz(DateTime<FixedOffset>),
    Json(serde_json::Value),
}

impl Param {
    pub fn wire_type(&self) -> WireType {
        match self {
            Self::Null(t) => *t,
            Self::Bool(_) => WireType::Bool,
            Self::SmallInt(_) => WireType::SmallInt,
            Self::Int(_) => WireType::Int,
            Self::BigInt(_) => WireType::BigInt,
            Self::Real(_) => WireType::Real,
            Self::Double(_) => WireType::Double,
            Self::Text(_) => WireType::Text,
            Self::Bytes(_) => WireType::Bytes,
            Self::Uuid(_) => WireType::Uuid,
            Self::Date(_) => WireType::Date,
            Self::DateTime(_) => WireType::DateTime,
            Self::Timestamp(_) => WireType::Timestamp,
            Self::TimestampTz(_) => WireType::TimestampTz,
            Self::Json(_) => WireType::Json,
        }
    }
}

/// Bind a parameter to a MySQL query.
///
/// MySQL has no zoned timestamp or UUID column type: zoned instants are sent
/// as UTC and UUIDs as hyphenated text.
pub(crate) fn bind_mysql_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q Param,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        Param::Null(t) => match t {
            WireType::Bool => query.bind(None::<bool>),
            WireType::SmallInt => query.bind(None::<i16>),
            WireType::Int => query.bind(None::<i32>),
            WireType::BigInt => query.bind(None::<i64>),
            WireType::Real => query.bind(None::<f32>),
            WireType::Double => query.bind(None::<f64>),
            WireType::Bytes => query.bind(None::<Vec<u8>>),
            WireType::Date => query.bind(None::<NaiveDate>),
            WireType::DateTime => query.bind(None::<NaiveDateTime>),
            WireType::Timestamp | WireType::TimestampTz => query.bind(None::<DateTime<Utc>>),
            WireType::Json => query.bind(None::<Json<serde_json::Value>>),
            WireType::Text | WireType::Uuid => query.bind(None::<String>),
        },
        Param::Bool(v) => query.bind(*v),
        Param::SmallInt(v) => query.bind(*v),
        Param::Int(v) => query.bind(*v),
        Param::BigInt(v) => query.bind(*v),
        Param::Real(v) => query.bind(*v),
        Param::Double(v) => query.bind(*v),
        Param::Text(v) => query.bind(v.as_str()),
        Param::Bytes(v) => query.bind(v.as_slice()),
        Param::Uuid(v) => query.bind(uuid_text(v)),
        Param::Date(v) => query.bind(*v),
        Param::DateTime(v) => query.bind(*v),
        Param::Timestamp(v) => query.bind(*v),
        Param::TimestampTz(v) => query.bind(v.with_timezone(&Utc)),
        Param::Json(v) => query.bind(Json(v)),
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q Param,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        Param::Null(t) => match t {
            WireType::Bool => query.bind(None::<bool>),
            WireType::SmallInt => query.bind(None::<i16>),
            WireType::Int => query.bind(None::<i32>),
            WireType::BigInt => query.bind(None::<i64>),
            WireType::Real => query.bind(None::<f32>),
            WireType::Double => query.bind(None::<f64>),
            WireType::Text => query.bind(None::<String>),
            WireType::Bytes => query.bind(None::<Vec<u8>>),
            WireType::Uuid => query.bind(None::<Uuid>),
            WireType::Date => query.bind(None::<NaiveDate>),
            WireType::DateTime => query.bind(None::<NaiveDateTime>),
            WireType::Timestamp => query.bind(None::<DateTime<Utc>>),
            WireType::TimestampTz => query.bind(None::<DateTime<FixedOffset>>),
            WireType::Json => query.bind(None::<Json<serde_json::Value>>),
        },
        Param::Bool(v) => query.bind(*v),
        Param::SmallInt(v) => query.bind(*v),
        Param::Int(v) => query.bind(*v),
        Param::BigInt(v) => query.bind(*v),
        Param::Real(v) => query.bind(*v),
        Param::Double(v) => query.bind(*v),
        Param::Text(v) => query.bind(v.as_str()),
        Param::Bytes(v) => query.bind(v.as_slice()),
        Param::Uuid(v) => query.bind(*v),
        Param::Date(v) => query.bind(*v),
        Param::DateTime(v) => query.bind(*v),
        Param::Timestamp(v) => query.bind(*v),
        Param::TimestampTz(v) => query.bind(*v),
        Param::Json(v) => query.bind(Json(v)),
    }
}

/// Bind a parameter to a SQLite query.
///
/// SQLite keeps JSON and UUIDs as text; zoned timestamps keep their offset
/// in the RFC 3339 text.
pub(crate) fn bind_sqlite_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q Param,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        Param::Null(t) => match t {
            WireType::Bool => query.bind(None::<bool>),
            WireType::SmallInt => query.bind(None::<i16>),
            WireType::Int => query.bind(None::<i32>),
            WireType::BigInt => query.bind(None::<i64>),
            WireType::Real => query.bind(None::<f32>),
            WireType::Double => query.bind(None::<f64>),
            WireType::Bytes => query.bind(None::<Vec<u8>>),
            _ => query.bind(None::<String>),
        },
        Param::Bool(v) => query.bind(*v),
        Param::SmallInt(v) => query.bind(*v),
        Param::Int(v) => query.bind(*v),
        Param::BigInt(v) => query.bind(*v),
        Param::Real(v) => query.bind(*v),
        Param::Double(v) => query.bind(*v),
        Param::Text(v) => query.bind(v.as_str()),
        Param::Bytes(v) => query.bind(v.as_slice()),
        Param::Uuid(v) => query.bind(uuid_text(v)),
        Param::Date(v) => query.bind(*v),
        Param::DateTime(v) => query.bind(*v),
        Param::Timestamp(v) => query.bind(*v),
        Param::TimestampTz(v) => query.bind(*v),
        Param::Json(v) => query.bind(v.to_string()),
    }
}

/// Text form of a UUID on backends without a native UUID type.
pub(crate) fn uuid_text(v: &Uuid) -> String {
    v.hyphenated().to_string()
}
