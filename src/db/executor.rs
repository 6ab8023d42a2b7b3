//! Statement execution on a single connection.
//!
//! [`DbConn`] borrows either a pooled connection or the connection owned by
//! an open transaction, so every ORM operation runs the same code in and out
//! of a transaction.
//!
//! # Architecture
//!
//! Database-specific implementations live in submodules:
//! - `mysql`: MySQL-specific fetch and execute
//! - `postgres`: PostgreSQL-specific fetch and execute
//! - `sqlite`: SQLite-specific fetch and execute
//!
//! Each submodule provides identical functionality adapted to the backend.

use crate::db::params::Param;
use crate::db::row::DbRow;
use crate::error::OrmResult;
use sqlx::{MySqlConnection, PgConnection, SqliteConnection};

/// Mutable borrow of one live connection.
pub enum DbConn<'c> {
    MySql(&'c mut MySqlConnection),
    Postgres(&'c mut PgConnection),
    SQLite(&'c mut SqliteConnection),
}

/// Result of a write statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    /// Auto-increment key of the first inserted row, where the backend
    /// reports one (MySQL, SQLite).
    pub last_insert_id: Option<i64>,
}

impl DbConn<'_> {
    /// Run a statement and collect all result rows.
    pub async fn fetch_all(&mut self, sql: &str, params: &[Param]) -> OrmResult<Vec<DbRow>> {
        match self {
            DbConn::MySql(c) => mysql::fetch_all(c, sql, params).await,
            DbConn::Postgres(c) => postgres::fetch_all(c, sql, params).await,
            DbConn::SQLite(c) => sqlite::fetch_all(c, sql, params).await,
        }
    }

    /// Run a statement and read at most its first row.
    pub async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[Param],
    ) -> OrmResult<Option<DbRow>> {
        match self {
            DbConn::MySql(c) => mysql::fetch_optional(c, sql, params).await,
            DbConn::Postgres(c) => postgres::fetch_optional(c, sql, params).await,
            DbConn::SQLite(c) => sqlite::fetch_optional(c, sql, params).await,
        }
    }

    /// Run a statement that returns no rows.
    pub async fn execute(&mut self, sql: &str, params: &[Param]) -> OrmResult<ExecOutcome> {
        match self {
            DbConn::MySql(c) => mysql::execute(c, sql, params).await,
            DbConn::Postgres(c) => postgres::execute(c, sql, params).await,
            DbConn::SQLite(c) => sqlite::execute(c, sql, params).await,
        }
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.
// The code structure is intentionally parallel to make differences obvious.

mod mysql {
    use super::*;
    use crate::db::params::bind_mysql_param;

    pub async fn fetch_all(
        conn: &mut MySqlConnection,
        sql: &str,
        params: &[Param],
    ) -> OrmResult<Vec<DbRow>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_mysql_param(query, param);
        }
        let rows = query.fetch_all(conn).await?;
        Ok(rows.into_iter().map(DbRow::MySql).collect())
    }

    pub async fn fetch_optional(
        conn: &mut MySqlConnection,
        sql: &str,
        params: &[Param],
    ) -> OrmResult<Option<DbRow>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_mysql_param(query, param);
        }
        let row = query.fetch_optional(conn).await?;
        Ok(row.map(DbRow::MySql))
    }

    pub async fn execute(
        conn: &mut MySqlConnection,
        sql: &str,
        params: &[Param],
    ) -> OrmResult<ExecOutcome> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_mysql_param(query, param);
        }
        let result = query.execute(conn).await?;
        Ok(ExecOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id: i64::try_from(result.last_insert_id())
                .ok()
                .filter(|id| *id != 0),
        })
    }
}

mod postgres {
    use super::*;
    use crate::db::params::bind_postgres_param;

    pub async fn fetch_all(
        conn: &mut PgConnection,
        sql: &str,
        params: &[Param],
    ) -> OrmResult<Vec<DbRow>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_postgres_param(query, param);
        }
        let rows = query.fetch_all(conn).await?;
        Ok(rows.into_iter().map(DbRow::Postgres).collect())
    }

    pub async fn fetch_optional(
        conn: &mut PgConnection,
        sql: &str,
        params: &[Param],
    ) -> OrmResult<Option<DbRow>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_postgres_param(query, param);
        }
        let row = query.fetch_optional(conn).await?;
        Ok(row.map(DbRow::Postgres))
    }

    pub async fn execute(
        conn: &mut PgConnection,
        sql: &str,
        params: &[Param],
    ) -> OrmResult<ExecOutcome> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_postgres_param(query, param);
        }
        let result = query.execute(conn).await?;
        Ok(ExecOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id: None,
        })
    }
}

mod sqlite {
    use super::*;
    use crate::db::params::bind_sqlite_param;

    pub async fn fetch_all(
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[Param],
    ) -> OrmResult<Vec<DbRow>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_sqlite_param(query, param);
        }
        let rows = query.fetch_all(conn).await?;
        Ok(rows.into_iter().map(DbRow::SQLite).collect())
    }

    pub async fn fetch_optional(
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[Param],
    ) -> OrmResult<Option<DbRow>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_sqlite_param(query, param);
        }
        let row = query.fetch_optional(conn).await?;
        Ok(row.map(DbRow::SQLite))
    }

    pub async fn execute(
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[Param],
    ) -> OrmResult<ExecOutcome> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_sqlite_param(query, param);
        }
        let result = query.execute(conn).await?;
        Ok(ExecOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id: Some(result.last_insert_rowid()).filter(|id| *id != 0),
        })
    }
}
