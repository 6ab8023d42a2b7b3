//! Dialects: naming rules, SQL templates and the binder registry of one
//! database engine, plus the per-dialect caches of resolved metadata.
//!
//! A [`Dialect`] is shared by every [`crate::Database`] opened against the same
//! engine and connection identity. Entity metadata is resolved lazily on first
//! use and cached for the lifetime of the dialect, including failures.

pub mod binders;
mod cache;
pub mod rules;

pub use binders::{Binder, BinderRegistry, LoadFn, SaveFn};
pub use rules::{MySqlDialect, PostgresDialect, SqlDialect, SqliteDialect};

use crate::db::DatabaseType;
use crate::error::InitError;
use crate::metadata::{EntityMetadata, EntityStructure};
use crate::models::entity::Entity;
use crate::models::value::ValueKind;
use cache::TypeCache;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DialectKey {
    db_type: DatabaseType,
    identity: String,
}

static DIALECTS: LazyLock<RwLock<HashMap<DialectKey, Arc<Dialect>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

pub struct Dialect {
    rules: Box<dyn SqlDialect>,
    binders: BinderRegistry,
    structures: TypeCache,
    metadata: TypeCache,
}

impl fmt::Debug for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dialect")
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

impl Dialect {
    /// Fresh dialect with the standard binders adjusted by `rules`.
    pub fn new(rules: impl SqlDialect + 'static) -> Self {
        Self::with_binders(rules, BinderRegistry::standard())
    }

    /// Fresh dialect with a caller-built binder registry. `rules` may still
    /// adjust it.
    pub fn with_binders(rules: impl SqlDialect + 'static, mut binders: BinderRegistry) -> Self {
        rules.register_binders(&mut binders);
        Self {
            rules: Box::new(rules),
            binders,
            structures: TypeCache::default(),
            metadata: TypeCache::default(),
        }
    }

    /// Uncached dialect for an engine.
    pub fn for_type(db_type: DatabaseType) -> Self {
        match db_type {
            DatabaseType::MySql => Self::new(MySqlDialect),
            DatabaseType::Postgres => Self::new(PostgresDialect),
            DatabaseType::SQLite => Self::new(SqliteDialect),
        }
    }

    /// Shared dialect for an engine and connection identity. Repeated calls
    /// with the same pair return the same instance.
    pub fn for_config(db_type: DatabaseType, identity: &str) -> Arc<Dialect> {
        let key = DialectKey {
            db_type,
            identity: identity.to_string(),
        };
        if let Some(dialect) = DIALECTS
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Arc::clone(dialect);
        }

        let mut dialects = DIALECTS.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(dialects.entry(key).or_insert_with(|| {
            info!(db_type = %db_type, identity, "Dialect initialized");
            Arc::new(Dialect::for_type(db_type))
        }))
    }

    pub fn rules(&self) -> &dyn SqlDialect {
        self.rules.as_ref()
    }

    pub fn database_type(&self) -> DatabaseType {
        self.rules.database_type()
    }

    pub fn binder(&self, kind: ValueKind) -> Option<Binder> {
        self.binders.get(kind)
    }

    pub fn save_binder(&self, kind: ValueKind) -> Option<SaveFn> {
        self.binders.save_binder(kind)
    }

    pub fn load_binder(&self, kind: ValueKind) -> Option<LoadFn> {
        self.binders.load_binder(kind)
    }

    /// Structural record of `E`: persistable fields, columns and identity.
    /// Never touches other types.
    pub fn structure<E: Entity>(&self) -> Result<Arc<EntityStructure<E>>, InitError> {
        self.structures
            .get_or_init(TypeId::of::<E>(), || EntityStructure::<E>::resolve(self))
    }

    /// Full binding metadata of `E`, resolved on first use.
    pub fn properties<E: Entity>(&self) -> Result<Arc<EntityMetadata<E>>, InitError> {
        self.metadata.get_or_init(TypeId::of::<E>(), || {
            let structure = self.structure::<E>()?;
            EntityMetadata::bind(self, structure)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_config_shares_instances() {
        let a = Dialect::for_config(DatabaseType::SQLite, "sqlite:shared-a.db");
        let b = Dialect::for_config(DatabaseType::SQLite, "sqlite:shared-a.db");
        let c = Dialect::for_config(DatabaseType::SQLite, "sqlite:shared-b.db");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_engine_selects_rules() {
        assert_eq!(
            Dialect::for_type(DatabaseType::Postgres).rules().name(),
            "PostgreSQL"
        );
        assert_eq!(
            Dialect::for_type(DatabaseType::MySql).database_type(),
            DatabaseType::MySql
        );
    }

    #[test]
    fn test_custom_registry_is_used() {
        let mut binders = BinderRegistry::standard();
        binders.remove(ValueKind::Uuid);
        let dialect = Dialect::with_binders(SqliteDialect, binders);
        assert!(dialect.binder(ValueKind::Uuid).is_none());
        assert!(dialect.binder(ValueKind::Text).is_some());
    }
}
