//! Extension points applied to every generated statement.

use crate::metadata::EntityInfo;
use crate::models::value::Value;
use std::any::Any;
use std::fmt;

/// Write operation being authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Update,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Insert => write!(f, "insert"),
            Operation::Update => write!(f, "update"),
        }
    }
}

/// Callbacks installed on a [`crate::Database`].
///
/// Every method has a no-op default.
///
/// `inject_where` and `inject_params` must agree: the fragment returned by
/// the former is ANDed onto the WHERE clause of generated selects, updates,
/// deletes and reference batch queries, and the parameters appended by the
/// latter are bound after the statement's own. Caller-supplied raw SQL
/// (`Database::sql`, `Database::execute`) is never rewritten.
pub trait Hooks: Send + Sync {
    /// Extra predicate for statements on `entity`. `filter` is the WHERE text
    /// already present, if any.
    fn inject_where(&self, _entity: &EntityInfo, _filter: Option<&str>) -> Option<String> {
        None
    }

    /// Parameters matching the `?` placeholders of [`Hooks::inject_where`].
    fn inject_params(&self, _entity: &EntityInfo, _params: &mut Vec<Value>) {}

    /// Veto an insert or update before any SQL is issued. `record` is the
    /// entity being written; downcast it to inspect fields.
    fn authorize(
        &self,
        _operation: Operation,
        _entity: &EntityInfo,
        _record: &dyn Any,
    ) -> Result<(), String> {
        Ok(())
    }

    /// Observe each statement right before it runs, with `?` placeholders.
    fn on_statement(&self, _sql: &str) {}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl Hooks for NoHooks {}
