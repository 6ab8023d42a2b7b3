//! rowmap library
//!
//! A lightweight ORM runtime for PostgreSQL, MySQL and SQLite. Structs
//! describe their columns once through [`Entity::schema`]; [`Database`] turns
//! that metadata into parameterized CRUD statements, hydrates rows back into
//! structs, and resolves many-to-one references in batches.

pub mod config;
pub mod db;
pub mod dialect;
pub mod error;
pub mod hooks;
pub mod metadata;
pub mod models;

mod database;
mod query;

pub use config::DatabaseConfig;
pub use database::{Database, Session};
pub use db::{DatabaseType, DbPool};
pub use dialect::{Dialect, SqlDialect};
pub use error::{InitError, OrmError, OrmResult};
pub use hooks::{Hooks, NoHooks, Operation};
pub use metadata::{EntityInfo, EntityMetadata};
pub use models::{Entity, Field, FieldValue, IdKey, RefSlot, Schema, SqlEnum, Value, ValueKind};
pub use query::Query;
