//! Backend-neutral result rows.
//!
//! Load binders read columns through the typed getters below. Every getter
//! decodes through `Option<T>`, so SQL NULL always comes back as `None` and
//! never as a zero value. PostgreSQL and MySQL are strict about column types,
//! so integer, float and temporal getters pick the decode type from the
//! column's reported type; SQLite values are decoded without type checks
//! because its columns carry affinities rather than types.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::types::Json;
use sqlx::{Column, Row, TypeInfo};
use uuid::Uuid;

/// A result row from any supported backend.
pub enum DbRow {
    MySql(MySqlRow),
    Postgres(PgRow),
    SQLite(SqliteRow),
}

type DecodeResult<T> = Result<Option<T>, sqlx::Error>;

fn out_of_range(index: usize, value: impl std::fmt::Display) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: index.to_string(),
        source: format!("value {value} out of range for i64").into(),
    }
}

impl DbRow {
    pub fn len(&self) -> usize {
        match self {
            DbRow::MySql(r) => r.len(),
            DbRow::Postgres(r) => r.len(),
            DbRow::SQLite(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Column names in result order.
    pub fn column_names(&self) -> Vec<String> {
        match self {
            DbRow::MySql(r) => r.columns().iter().map(|c| c.name().to_string()).collect(),
            DbRow::Postgres(r) => r.columns().iter().map(|c| c.name().to_string()).collect(),
            DbRow::SQLite(r) => r.columns().iter().map(|c| c.name().to_string()).collect(),
        }
    }

    fn type_name(&self, index: usize) -> String {
        match self {
            DbRow::MySql(r) => r.column(index).type_info().name().to_uppercase(),
            DbRow::Postgres(r) => r.column(index).type_info().name().to_uppercase(),
            DbRow::SQLite(r) => r.column(index).type_info().name().to_uppercase(),
        }
    }

    pub fn get_bool(&self, index: usize) -> DecodeResult<bool> {
        match self {
            DbRow::MySql(r) => match self.type_name(index).as_str() {
                "BOOLEAN" => r.try_get::<Option<bool>, _>(index),
                _ => Ok(self.get_i64(index)?.map(|v| v != 0)),
            },
            DbRow::Postgres(r) => r.try_get::<Option<bool>, _>(index),
            DbRow::SQLite(r) => r.try_get_unchecked::<Option<bool>, _>(index),
        }
    }

    /// Any integer column, widened to i64.
    pub fn get_i64(&self, index: usize) -> DecodeResult<i64> {
        match self {
            DbRow::MySql(r) => {
                if self.type_name(index).contains("UNSIGNED") {
                    match r.try_get::<Option<u64>, _>(index)? {
                        Some(v) => i64::try_from(v)
                            .map(Some)
                            .map_err(|_| out_of_range(index, v)),
                        None => Ok(None),
                    }
                } else {
                    r.try_get::<Option<i64>, _>(index)
                }
            }
            DbRow::Postgres(r) => match self.type_name(index).as_str() {
                "INT2" => Ok(r.try_get::<Option<i16>, _>(index)?.map(i64::from)),
                "INT4" => Ok(r.try_get::<Option<i32>, _>(index)?.map(i64::from)),
                _ => r.try_get::<Option<i64>, _>(index),
            },
            DbRow::SQLite(r) => r.try_get_unchecked::<Option<i64>, _>(index),
        }
    }

    /// Any floating point column, widened to f64.
    pub fn get_f64(&self, index: usize) -> DecodeResult<f64> {
        match self {
            DbRow::MySql(r) => match self.type_name(index).as_str() {
                "FLOAT" => Ok(r.try_get::<Option<f32>, _>(index)?.map(f64::from)),
                _ => r.try_get::<Option<f64>, _>(index),
            },
            DbRow::Postgres(r) => match self.type_name(index).as_str() {
                "FLOAT4" => Ok(r.try_get::<Option<f32>, _>(index)?.map(f64::from)),
                _ => r.try_get::<Option<f64>, _>(index),
            },
            DbRow::SQLite(r) => r.try_get_unchecked::<Option<f64>, _>(index),
        }
    }

    pub fn get_text(&self, index: usize) -> DecodeResult<String> {
        match self {
            DbRow::MySql(r) => r.try_get::<Option<String>, _>(index),
            DbRow::Postgres(r) => r.try_get::<Option<String>, _>(index),
            DbRow::SQLite(r) => r.try_get_unchecked::<Option<String>, _>(index),
        }
    }

    pub fn get_bytes(&self, index: usize) -> DecodeResult<Vec<u8>> {
        match self {
            DbRow::MySql(r) => r.try_get::<Option<Vec<u8>>, _>(index),
            DbRow::Postgres(r) => r.try_get::<Option<Vec<u8>>, _>(index),
            DbRow::SQLite(r) => r.try_get_unchecked::<Option<Vec<u8>>, _>(index),
        }
    }

    /// Native UUID on PostgreSQL; hyphenated text elsewhere. MySQL
    /// `BINARY(16)` columns also decode, but writes always send text.
    pub fn get_uuid(&self, index: usize) -> DecodeResult<Uuid> {
        let parse = |text: Option<String>| -> DecodeResult<Uuid> {
            text.map(|t| {
                Uuid::parse_str(&t).map_err(|e| sqlx::Error::ColumnDecode {
                    index: index.to_string(),
                    source: Box::new(e),
                })
            })
            .transpose()
        };
        match self {
            DbRow::Postgres(r) => r.try_get::<Option<Uuid>, _>(index),
            DbRow::MySql(r) => {
                if self.type_name(index).contains("BINARY") {
                    r.try_get::<Option<Uuid>, _>(index)
                } else {
                    parse(r.try_get::<Option<String>, _>(index)?)
                }
            }
            DbRow::SQLite(r) => parse(r.try_get_unchecked::<Option<String>, _>(index)?),
        }
    }

    pub fn get_date(&self, index: usize) -> DecodeResult<NaiveDate> {
        match self {
            DbRow::MySql(r) => r.try_get::<Option<NaiveDate>, _>(index),
            DbRow::Postgres(r) => r.try_get::<Option<NaiveDate>, _>(index),
            DbRow::SQLite(r) => r.try_get_unchecked::<Option<NaiveDate>, _>(index),
        }
    }

    pub fn get_datetime(&self, index: usize) -> DecodeResult<NaiveDateTime> {
        match self {
            DbRow::MySql(r) => r.try_get::<Option<NaiveDateTime>, _>(index),
            DbRow::Postgres(r) => match self.type_name(index).as_str() {
                "TIMESTAMPTZ" => Ok(r
                    .try_get::<Option<DateTime<Utc>>, _>(index)?
                    .map(|v| v.naive_utc())),
                _ => r.try_get::<Option<NaiveDateTime>, _>(index),
            },
            DbRow::SQLite(r) => r.try_get_unchecked::<Option<NaiveDateTime>, _>(index),
        }
    }

    pub fn get_timestamp(&self, index: usize) -> DecodeResult<DateTime<Utc>> {
        match self {
            DbRow::MySql(r) => r.try_get::<Option<DateTime<Utc>>, _>(index),
            DbRow::Postgres(r) => match self.type_name(index).as_str() {
                "TIMESTAMP" => Ok(r
                    .try_get::<Option<NaiveDateTime>, _>(index)?
                    .map(|v| v.and_utc())),
                _ => r.try_get::<Option<DateTime<Utc>>, _>(index),
            },
            DbRow::SQLite(r) => r.try_get_unchecked::<Option<DateTime<Utc>>, _>(index),
        }
    }

    /// Zoned instant. Only SQLite stores the original offset; the other
    /// backends return the instant at UTC.
    pub fn get_timestamptz(&self, index: usize) -> DecodeResult<DateTime<FixedOffset>> {
        match self {
            DbRow::SQLite(r) => r.try_get_unchecked::<Option<DateTime<FixedOffset>>, _>(index),
            _ => Ok(self.get_timestamp(index)?.map(|v| v.fixed_offset())),
        }
    }

    /// JSON column, or text holding JSON.
    pub fn get_json(&self, index: usize) -> DecodeResult<serde_json::Value> {
        let parse = |text: Option<String>| -> DecodeResult<serde_json::Value> {
            text.map(|t| {
                serde_json::from_str(&t).map_err(|e| sqlx::Error::ColumnDecode {
                    index: index.to_string(),
                    source: Box::new(e),
                })
            })
            .transpose()
        };
        match self {
            DbRow::MySql(r) => match self.type_name(index).as_str() {
                "JSON" => Ok(r
                    .try_get::<Option<Json<serde_json::Value>>, _>(index)?
                    .map(|j| j.0)),
                _ => parse(r.try_get::<Option<String>, _>(index)?),
            },
            DbRow::Postgres(r) => match self.type_name(index).as_str() {
                "JSON" | "JSONB" => Ok(r
                    .try_get::<Option<Json<serde_json::Value>>, _>(index)?
                    .map(|j| j.0)),
                _ => parse(r.try_get::<Option<String>, _>(index)?),
            },
            DbRow::SQLite(r) => parse(r.try_get_unchecked::<Option<String>, _>(index)?),
        }
    }
}
