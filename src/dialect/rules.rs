//! SQL dialect rules per backend.

use crate::db::DatabaseType;
use crate::dialect::binders::{BinderRegistry, save_timestamptz_as_utc};
use crate::models::value::ValueKind;
use heck::ToSnakeCase;
use std::borrow::Cow;
use std::fmt;

/// Naming conventions and SQL fragment templates of one database engine.
///
/// Fragments are parameterized only by table and column names and use `?`
/// placeholders; [`SqlDialect::finalize_placeholders`] rewrites a complete
/// statement into the engine's placeholder style.
pub trait SqlDialect: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn database_type(&self) -> DatabaseType;

    /// Table name for a type name without an explicit override.
    fn table_name(&self, type_name: &str) -> String {
        type_name.to_snake_case()
    }

    /// Column name for a field name without an explicit override.
    fn column_name(&self, field_name: &str) -> String {
        field_name.to_snake_case()
    }

    /// `INSERT INTO t(a,b) VALUES `
    fn sql_for_insert(&self, table: &str, columns: &[&str]) -> String {
        format!("INSERT INTO {}({}) VALUES ", table, columns.join(","))
    }

    /// One values group: `(?,?)`
    fn sql_for_values(&self, columns: usize) -> String {
        format!("({})", vec!["?"; columns].join(","))
    }

    /// `UPDATE t SET a=?,b=?`
    fn sql_for_update(&self, table: &str, columns: &[&str]) -> String {
        let assignments: Vec<String> = columns.iter().map(|c| format!("{c}=?")).collect();
        format!("UPDATE {} SET {}", table, assignments.join(","))
    }

    /// `DELETE FROM t`
    fn sql_for_delete(&self, table: &str) -> String {
        format!("DELETE FROM {table}")
    }

    /// `SELECT * FROM t`
    fn sql_for_select(&self, table: &str) -> String {
        format!("SELECT * FROM {table}")
    }

    /// `id=?`
    fn sql_for_where(&self, column: &str) -> String {
        format!("{column}=?")
    }

    /// Clause appended to an INSERT to read back generated keys, or `None`
    /// when the engine reports them out of band.
    fn returning_clause(&self, id_column: &str) -> Option<String>;

    /// Rewrite `?` placeholders into the engine's style.
    fn finalize_placeholders<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(sql)
    }

    /// Bind-parameter ceiling of a single statement.
    fn max_parameters(&self) -> usize;

    /// Adjust the standard binders for this engine.
    fn register_binders(&self, _registry: &mut BinderRegistry) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::Postgres
    }

    fn returning_clause(&self, id_column: &str) -> Option<String> {
        Some(format!(" RETURNING {id_column}"))
    }

    fn finalize_placeholders<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        if sql.contains('?') {
            Cow::Owned(numbered_placeholders(sql))
        } else {
            Cow::Borrowed(sql)
        }
    }

    fn max_parameters(&self) -> usize {
        65_535
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl SqlDialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "MySQL"
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySql
    }

    fn returning_clause(&self, _id_column: &str) -> Option<String> {
        None
    }

    fn max_parameters(&self) -> usize {
        65_535
    }

    fn register_binders(&self, registry: &mut BinderRegistry) {
        if let Some(binder) = registry.get(ValueKind::TimestampTz) {
            registry.register(ValueKind::TimestampTz, save_timestamptz_as_utc, binder.load);
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "SQLite"
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    fn returning_clause(&self, id_column: &str) -> Option<String> {
        Some(format!(" RETURNING {id_column}"))
    }

    fn max_parameters(&self) -> usize {
        32_766
    }
}

/// Replace `?` outside quoted text with `$1`, `$2`, ...
fn numbered_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 16);
    let mut quote: Option<char> = None;
    let mut n = 0usize;
    for c in sql.chars() {
        match quote {
            Some(q) => {
                out.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    out.push(c);
                }
                '?' => {
                    n += 1;
                    out.push('$');
                    out.push_str(&n.to_string());
                }
                _ => out.push(c),
            },
        }
    }
    out
}
