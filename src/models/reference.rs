//! Many-to-one reference fields.
//!
//! A reference column stores only the referenced row's primary key. Loading
//! produces an id-only shell of the target type; [`crate::Query`] can then
//! replace the shells with fully loaded rows in one batched query per field.
//!
//! The target type is erased behind [`ReferenceAccess`] (declaration) and
//! [`ReferenceCodec`] (bound to a dialect), so metadata of the owning type
//! never needs more than the target's structural record.

use crate::database::Env;
use crate::db::{DbConn, DbRow, Param};
use crate::dialect::{Binder, Dialect};
use crate::error::{InitError, OrmResult};
use crate::metadata::EntityStructure;
use crate::models::entity::Entity;
use crate::models::value::{IdKey, Value, ValueKind};
use futures_util::future::BoxFuture;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Storage for a referenced entity inside its owner: `Option<T>` or
/// `Option<Box<T>>` (the latter for recursive types).
pub trait RefSlot<T>: Send + Sync + 'static {
    fn target(&self) -> Option<&T>;

    fn target_mut(&mut self) -> Option<&mut T>;

    fn set_target(&mut self, value: Option<T>);
}

impl<T: Entity> RefSlot<T> for Option<T> {
    fn target(&self) -> Option<&T> {
        self.as_ref()
    }

    fn target_mut(&mut self) -> Option<&mut T> {
        self.as_mut()
    }

    fn set_target(&mut self, value: Option<T>) {
        *self = value;
    }
}

impl<T: Entity> RefSlot<T> for Option<Box<T>> {
    fn target(&self) -> Option<&T> {
        self.as_deref()
    }

    fn target_mut(&mut self) -> Option<&mut T> {
        self.as_deref_mut()
    }

    fn set_target(&mut self, value: Option<T>) {
        *self = value.map(Box::new);
    }
}

/// Declared reference, not yet bound to a dialect.
pub(crate) trait ReferenceAccess<E>: Send + Sync {
    fn target_name(&self) -> &'static str;

    fn bind(
        &self,
        dialect: &Dialect,
        owner: &'static str,
        field: &'static str,
    ) -> Result<Arc<dyn ReferenceCodec<E>>, InitError>;
}

/// Rows fetched for one reference field, keyed by primary key.
pub(crate) struct LoadedTargets {
    rows: Box<dyn Any + Send + Sync>,
    pub(crate) count: usize,
}

/// Reference bound to a dialect: saves and loads the key column and resolves
/// shells in batches.
pub(crate) trait ReferenceCodec<E>: Send + Sync {
    fn target(&self) -> TypeId;

    fn target_name(&self) -> &'static str;

    /// Kind of the referenced identity, which is also the kind of the column.
    fn id_kind(&self) -> ValueKind;

    fn save(&self, entity: &E) -> Result<Param, String>;

    fn load(&self, entity: &mut E, row: &DbRow, index: usize) -> Result<(), String>;

    /// Primary key of the referenced shell, if one is present.
    fn shell_id(&self, entity: &E) -> Result<Option<Value>, String>;

    fn fetch<'a>(
        &'a self,
        env: &'a Env,
        conn: &'a mut DbConn<'_>,
        ids: Vec<Value>,
        columns: &'a [String],
    ) -> BoxFuture<'a, OrmResult<LoadedTargets>>;

    /// Replace the shell with its loaded row. Returns false when the shell
    /// has no matching row and stays id-only.
    fn attach(&self, entity: &mut E, loaded: &LoadedTargets) -> Result<bool, String>;
}

pub(crate) struct RefField<E, T, S> {
    get: fn(&E) -> &S,
    get_mut: fn(&mut E) -> &mut S,
    _target: PhantomData<fn() -> T>,
}

impl<E, T, S> RefField<E, T, S> {
    pub(crate) fn new(get: fn(&E) -> &S, get_mut: fn(&mut E) -> &mut S) -> Self {
        Self {
            get,
            get_mut,
            _target: PhantomData,
        }
    }
}

impl<E, T, S> ReferenceAccess<E> for RefField<E, T, S>
where
    E: Send + Sync + 'static,
    T: Entity + Clone,
    S: RefSlot<T>,
{
    fn target_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn bind(
        &self,
        dialect: &Dialect,
        owner: &'static str,
        field: &'static str,
    ) -> Result<Arc<dyn ReferenceCodec<E>>, InitError> {
        let target = dialect.structure::<T>()?;
        let Some(id_index) = target.id_index() else {
            return Err(InitError::field(
                owner,
                field,
                format!("referenced type `{}` has no identity field", target.type_name()),
            ));
        };
        let id_kind = target.fields()[id_index].kind;
        let binder = dialect.binder(id_kind).ok_or_else(|| {
            InitError::field(
                owner,
                field,
                format!("identity of `{}` has unsupported kind {id_kind}", target.type_name()),
            )
        })?;
        Ok(Arc::new(BoundReference {
            get: self.get,
            get_mut: self.get_mut,
            target,
            id_index,
            binder,
        }))
    }
}

struct BoundReference<E, T, S> {
    get: fn(&E) -> &S,
    get_mut: fn(&mut E) -> &mut S,
    target: Arc<EntityStructure<T>>,
    id_index: usize,
    binder: Binder,
}

struct TargetMap<T> {
    rows: HashMap<IdKey, T>,
}

impl<E, T, S> BoundReference<E, T, S>
where
    T: Entity + Clone,
{
    fn id_of(&self, target: &T) -> Result<Value, String> {
        self.target.fields()[self.id_index].read(target)
    }
}

impl<E, T, S> ReferenceCodec<E> for BoundReference<E, T, S>
where
    E: Send + Sync + 'static,
    T: Entity + Clone,
    S: RefSlot<T>,
{
    fn target(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn target_name(&self) -> &'static str {
        self.target.type_name()
    }

    fn id_kind(&self) -> ValueKind {
        self.target.fields()[self.id_index].kind
    }

    fn save(&self, entity: &E) -> Result<Param, String> {
        let id = match (self.get)(entity).target() {
            Some(target) => self.id_of(target)?,
            None => Value::Null,
        };
        (self.binder.save)(&id)
    }

    fn load(&self, entity: &mut E, row: &DbRow, index: usize) -> Result<(), String> {
        let raw = (self.binder.load)(row, index)?;
        let shell = if raw.is_null() {
            None
        } else {
            let mut shell = T::default();
            self.target.fields()[self.id_index].write(&mut shell, raw)?;
            Some(shell)
        };
        (self.get_mut)(entity).set_target(shell);
        Ok(())
    }

    fn shell_id(&self, entity: &E) -> Result<Option<Value>, String> {
        match (self.get)(entity).target() {
            Some(target) => {
                let id = self.id_of(target)?;
                Ok((!id.is_null()).then_some(id))
            }
            None => Ok(None),
        }
    }

    fn fetch<'a>(
        &'a self,
        env: &'a Env,
        conn: &'a mut DbConn<'_>,
        ids: Vec<Value>,
        columns: &'a [String],
    ) -> BoxFuture<'a, OrmResult<LoadedTargets>> {
        Box::pin(async move {
            let loaded: Vec<T> = crate::query::load_by_ids::<T>(env, conn, ids, columns).await?;
            let mut rows = HashMap::with_capacity(loaded.len());
            for row in loaded {
                let id = self.id_of(&row).map_err(crate::error::OrmError::bind)?;
                if let Some(key) = IdKey::of(&id) {
                    rows.insert(key, row);
                }
            }
            Ok(LoadedTargets {
                count: rows.len(),
                rows: Box::new(TargetMap { rows }),
            })
        })
    }

    fn attach(&self, entity: &mut E, loaded: &LoadedTargets) -> Result<bool, String> {
        let map = loaded
            .rows
            .downcast_ref::<TargetMap<T>>()
            .ok_or_else(|| format!("loaded rows are not of type `{}`", self.target_name()))?;
        let Some(shell) = (self.get_mut)(entity).target_mut() else {
            return Ok(true);
        };
        let Some(key) = IdKey::of(&self.id_of(shell)?) else {
            return Ok(true);
        };
        match map.rows.get(&key) {
            Some(full) => {
                *shell = full.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Reference declared on an embedded parent struct.
pub(crate) struct ProjectedAccess<C, P> {
    pub(crate) inner: Arc<dyn ReferenceAccess<P>>,
    pub(crate) get: fn(&C) -> &P,
    pub(crate) get_mut: fn(&mut C) -> &mut P,
}

impl<C, P> ReferenceAccess<C> for ProjectedAccess<C, P>
where
    C: Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    fn target_name(&self) -> &'static str {
        self.inner.target_name()
    }

    fn bind(
        &self,
        dialect: &Dialect,
        owner: &'static str,
        field: &'static str,
    ) -> Result<Arc<dyn ReferenceCodec<C>>, InitError> {
        Ok(Arc::new(ProjectedCodec {
            inner: self.inner.bind(dialect, owner, field)?,
            get: self.get,
            get_mut: self.get_mut,
        }))
    }
}

struct ProjectedCodec<C, P> {
    inner: Arc<dyn ReferenceCodec<P>>,
    get: fn(&C) -> &P,
    get_mut: fn(&mut C) -> &mut P,
}

impl<C, P> ReferenceCodec<C> for ProjectedCodec<C, P>
where
    C: Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    fn target(&self) -> TypeId {
        self.inner.target()
    }

    fn target_name(&self) -> &'static str {
        self.inner.target_name()
    }

    fn id_kind(&self) -> ValueKind {
        self.inner.id_kind()
    }

    fn save(&self, entity: &C) -> Result<Param, String> {
        self.inner.save((self.get)(entity))
    }

    fn load(&self, entity: &mut C, row: &DbRow, index: usize) -> Result<(), String> {
        self.inner.load((self.get_mut)(entity), row, index)
    }

    fn shell_id(&self, entity: &C) -> Result<Option<Value>, String> {
        self.inner.shell_id((self.get)(entity))
    }

    fn fetch<'a>(
        &'a self,
        env: &'a Env,
        conn: &'a mut DbConn<'_>,
        ids: Vec<Value>,
        columns: &'a [String],
    ) -> BoxFuture<'a, OrmResult<LoadedTargets>> {
        self.inner.fetch(env, conn, ids, columns)
    }

    fn attach(&self, entity: &mut C, loaded: &LoadedTargets) -> Result<bool, String> {
        self.inner.attach((self.get_mut)(entity), loaded)
    }
}
