//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection pools, pooled connections and transactions
//! - Statement execution on a borrowed connection
//! - Wire parameter binding
//! - Backend-neutral row decoding
//! - Database dispatch macros for reducing code duplication

#[macro_use]
pub mod macros;
pub mod executor;
pub mod params;
pub mod pool;
pub mod row;

pub use executor::{DbConn, ExecOutcome};
pub use macros::DatabaseType;
pub use params::{Param, WireType};
pub use pool::{DbPool, DbTransaction, PooledConn};
pub use row::DbRow;
