//! Connection pools, pooled connections and transactions.
//!
//! Each wrapper is an enum over the three backends so the rest of the crate
//! can stay backend-agnostic and hand out [`DbConn`] borrows.

use crate::config::DatabaseConfig;
use crate::db::executor::DbConn;
use crate::db::macros::DatabaseType;
use crate::error::{OrmError, OrmResult};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{MySql, MySqlPool, PgPool, Postgres, Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Database connection pool wrapper.
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl From<MySqlPool> for DbPool {
    fn from(pool: MySqlPool) -> Self {
        DbPool::MySql(pool)
    }
}

impl From<PgPool> for DbPool {
    fn from(pool: PgPool) -> Self {
        DbPool::Postgres(pool)
    }
}

impl From<SqlitePool> for DbPool {
    fn from(pool: SqlitePool) -> Self {
        DbPool::SQLite(pool)
    }
}

impl DbPool {
    /// Create a pool from a parsed configuration.
    pub async fn connect(config: &DatabaseConfig) -> OrmResult<DbPool> {
        let pool_opts = &config.pool_options;
        let is_sqlite = config.db_type == DatabaseType::SQLite;
        let max_connections = pool_opts.max_connections_or_default(is_sqlite);
        let min_connections = pool_opts.min_connections_or_default(is_sqlite);
        let acquire_timeout = Duration::from_secs(pool_opts.acquire_timeout_or_default());
        let idle_timeout = Some(Duration::from_secs(pool_opts.idle_timeout_or_default()));
        let test_before_acquire = pool_opts.test_before_acquire_or_default();

        let pool = match config.db_type {
            DatabaseType::MySql => {
                let options = MySqlConnectOptions::from_str(&config.connection_string)
                    .map_err(|e| {
                        OrmError::config(format!("Invalid MySQL connection string: {}", e))
                    })?
                    .charset("utf8mb4");

                let pool = MySqlPoolOptions::new()
                    .min_connections(min_connections)
                    .max_connections(max_connections)
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(idle_timeout)
                    .test_before_acquire(test_before_acquire)
                    .connect_with(options)
                    .await?;
                DbPool::MySql(pool)
            }
            DatabaseType::Postgres => {
                let options = PgConnectOptions::from_str(&config.connection_string).map_err(
                    |e| OrmError::config(format!("Invalid PostgreSQL connection string: {}", e)),
                )?;

                let pool = PgPoolOptions::new()
                    .min_connections(min_connections)
                    .max_connections(max_connections)
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(idle_timeout)
                    .test_before_acquire(test_before_acquire)
                    .connect_with(options)
                    .await?;
                DbPool::Postgres(pool)
            }
            DatabaseType::SQLite => {
                let options = SqliteConnectOptions::from_str(&config.connection_string)
                    .map_err(|e| {
                        OrmError::config(format!("Invalid SQLite connection string: {}", e))
                    })?
                    .create_if_missing(true);

                let pool = SqlitePoolOptions::new()
                    .min_connections(min_connections)
                    .max_connections(max_connections)
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(idle_timeout)
                    .test_before_acquire(test_before_acquire)
                    .connect_with(options)
                    .await?;
                DbPool::SQLite(pool)
            }
        };

        info!(
            database = %config.masked_connection_string(),
            db_type = %config.db_type,
            max_connections,
            "Connection pool created"
        );
        Ok(pool)
    }

    pub fn database_type(&self) -> DatabaseType {
        match self {
            DbPool::MySql(_) => DatabaseType::MySql,
            DbPool::Postgres(_) => DatabaseType::Postgres,
            DbPool::SQLite(_) => DatabaseType::SQLite,
        }
    }

    /// Check out one connection for the duration of an operation.
    pub async fn acquire(&self) -> OrmResult<PooledConn> {
        Ok(impl_db_dispatch!(DbPool, self, {
            MySql(p) => PooledConn::MySql(p.acquire().await?),
            Postgres(p) => PooledConn::Postgres(p.acquire().await?),
            SQLite(p) => PooledConn::SQLite(p.acquire().await?),
        }))
    }

    /// Begin a transaction on a dedicated connection.
    pub async fn begin(&self) -> OrmResult<DbTransaction> {
        Ok(impl_db_dispatch!(DbPool, self, {
            MySql(p) => DbTransaction::MySql(p.begin().await?),
            Postgres(p) => DbTransaction::Postgres(p.begin().await?),
            SQLite(p) => DbTransaction::SQLite(p.begin().await?),
        }))
    }

    /// Close the pool and wait for connections to be released.
    pub async fn close(&self) {
        impl_db_dispatch!(DbPool, self, {
            MySql(p) => p.close().await,
            Postgres(p) => p.close().await,
            SQLite(p) => p.close().await,
        })
    }
}

/// A connection checked out of a [`DbPool`]; returned to the pool on drop.
pub enum PooledConn {
    MySql(PoolConnection<MySql>),
    Postgres(PoolConnection<Postgres>),
    SQLite(PoolConnection<Sqlite>),
}

impl PooledConn {
    pub fn as_conn(&mut self) -> DbConn<'_> {
        impl_db_dispatch!(PooledConn, self, {
            MySql(c) => DbConn::MySql(&mut **c),
            Postgres(c) => DbConn::Postgres(&mut **c),
            SQLite(c) => DbConn::SQLite(&mut **c),
        })
    }
}

/// Database-specific transaction wrapper.
///
/// Dropping an uncommitted transaction rolls it back.
pub enum DbTransaction {
    MySql(Transaction<'static, MySql>),
    Postgres(Transaction<'static, Postgres>),
    SQLite(Transaction<'static, Sqlite>),
}

impl DbTransaction {
    pub fn as_conn(&mut self) -> DbConn<'_> {
        impl_db_dispatch!(DbTransaction, self, {
            MySql(tx) => DbConn::MySql(&mut **tx),
            Postgres(tx) => DbConn::Postgres(&mut **tx),
            SQLite(tx) => DbConn::SQLite(&mut **tx),
        })
    }

    /// Commit the transaction.
    pub async fn commit(self) -> OrmResult<()> {
        impl_db_dispatch!(DbTransaction, self, {
            MySql(tx) => tx.commit().await.map_err(OrmError::from),
            Postgres(tx) => tx.commit().await.map_err(OrmError::from),
            SQLite(tx) => tx.commit().await.map_err(OrmError::from),
        })
    }

    /// Rollback the transaction.
    pub async fn rollback(self) -> OrmResult<()> {
        impl_db_dispatch!(DbTransaction, self, {
            MySql(tx) => tx.rollback().await.map_err(OrmError::from),
            Postgres(tx) => tx.rollback().await.map_err(OrmError::from),
            SQLite(tx) => tx.rollback().await.map_err(OrmError::from),
        })
    }
}
