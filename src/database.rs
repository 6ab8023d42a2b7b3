//! CRUD facade and transaction scoping.
//!
//! [`Database`] runs each operation on its own pooled connection.
//! [`Database::transaction`] hands a [`Session`] to a closure; every operation
//! on the session runs on the transaction's connection and commits or rolls
//! back together.
//!
//! ```ignore
//! let db = Database::connect("sqlite:app.db").await?;
//! let mut invoice = Invoice { total: 12.5, ..Default::default() };
//! db.insert(&mut invoice).await?;
//!
//! let moved = db
//!     .transaction(|s| {
//!         Box::pin(async move {
//!             let n = s.update_where(&archived, "customer=?", params![7]).await?;
//!             s.delete_where::<Invoice>("customer=?", params![7]).await?;
//!             Ok(n)
//!         })
//!     })
//!     .await?;
//! ```

use crate::config::DatabaseConfig;
use crate::db::{DbConn, DbPool, DbRow, DbTransaction, ExecOutcome, Param, PooledConn, WireType};
use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::hooks::{Hooks, NoHooks, Operation};
use crate::metadata::{EntityInfo, EntityMetadata};
use crate::models::entity::Entity;
use crate::models::value::Value;
use crate::query::{self, Query, QuerySpec};
use futures_util::future::BoxFuture;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    /// Database instances with a transaction open on the current task.
    static ACTIVE_TRANSACTIONS: HashSet<u64>;
}

/// Everything an operation needs besides a connection.
pub(crate) struct Env {
    pub(crate) id: u64,
    pub(crate) dialect: Arc<Dialect>,
    pub(crate) hooks: Arc<dyn Hooks>,
    pub(crate) batch_size: usize,
}

impl Env {
    pub(crate) fn new(dialect: Arc<Dialect>, hooks: Arc<dyn Hooks>, batch_size: usize) -> Self {
        Self {
            id: NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed),
            dialect,
            hooks,
            batch_size: batch_size.max(1),
        }
    }

    /// Wire parameter for a caller-supplied value, using the binder of its
    /// own kind. A bare NULL binds as text.
    pub(crate) fn bind_value(&self, value: &Value) -> OrmResult<Param> {
        let Some(kind) = value.kind() else {
            return Ok(Param::Null(WireType::Text));
        };
        match self.dialect.save_binder(kind) {
            Some(save) => save(value).map_err(OrmError::bind),
            None => value.as_i64().map(Param::BigInt).ok_or_else(|| {
                OrmError::bind(format!("unsupported parameter kind {kind}: {value:?}"))
            }),
        }
    }

    pub(crate) fn bind_values(&self, values: &[Value]) -> OrmResult<Vec<Param>> {
        values.iter().map(|v| self.bind_value(v)).collect()
    }

    /// Combine `filter` with the hook predicate for `entity`. Returns the
    /// WHERE text and the hook's parameters, to be bound after the
    /// statement's own.
    pub(crate) fn scope(
        &self,
        entity: &EntityInfo,
        filter: Option<String>,
    ) -> OrmResult<(Option<String>, Vec<Param>)> {
        let Some(extra) = self.hooks.inject_where(entity, filter.as_deref()) else {
            return Ok((filter, Vec::new()));
        };
        let mut values = Vec::new();
        self.hooks.inject_params(entity, &mut values);
        let combined = match filter {
            Some(filter) => format!("({filter}) AND ({extra})"),
            None => extra,
        };
        Ok((Some(combined), self.bind_values(&values)?))
    }

    pub(crate) fn authorize<E: Entity>(
        &self,
        operation: Operation,
        meta: &EntityMetadata<E>,
        entity: &E,
    ) -> OrmResult<()> {
        self.hooks
            .authorize(operation, meta.info(), entity)
            .map_err(|reason| {
                warn!(
                    operation = %operation,
                    table = meta.table(),
                    reason = %reason,
                    "Write vetoed"
                );
                OrmError::unauthorized(reason)
            })
    }

    pub(crate) async fn fetch(
        &self,
        conn: &mut DbConn<'_>,
        sql: &str,
        params: &[Param],
    ) -> OrmResult<Vec<DbRow>> {
        self.hooks.on_statement(sql);
        let sql = self.dialect.rules().finalize_placeholders(sql);
        debug!(sql = %sql, params = params.len(), "Executing query");
        let rows = conn.fetch_all(&sql, params).await?;
        debug!(rows = rows.len(), "Query returned");
        Ok(rows)
    }

    /// Like [`Env::fetch`], but reads only the first row.
    pub(crate) async fn fetch_first(
        &self,
        conn: &mut DbConn<'_>,
        sql: &str,
        params: &[Param],
    ) -> OrmResult<Option<DbRow>> {
        self.hooks.on_statement(sql);
        let sql = self.dialect.rules().finalize_placeholders(sql);
        debug!(sql = %sql, params = params.len(), "Executing single-row query");
        Ok(conn.fetch_optional(&sql, params).await?)
    }

    pub(crate) async fn execute(
        &self,
        conn: &mut DbConn<'_>,
        sql: &str,
        params: &[Param],
    ) -> OrmResult<ExecOutcome> {
        self.hooks.on_statement(sql);
        let sql = self.dialect.rules().finalize_placeholders(sql);
        debug!(sql = %sql, params = params.len(), "Executing statement");
        let outcome = conn.execute(&sql, params).await?;
        debug!(rows_affected = outcome.rows_affected, "Statement executed");
        Ok(outcome)
    }
}

struct DatabaseInner {
    env: Arc<Env>,
    pool: DbPool,
    tx_gate: Mutex<()>,
}

/// Entry point for mapped-type persistence over one connection pool.
///
/// Cloning is cheap; clones share the pool, the hooks and the transaction
/// gate.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("id", &self.inner.env.id)
            .field("db_type", &self.inner.pool.database_type())
            .field("batch_size", &self.inner.env.batch_size)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Open a pool from a connection URL. ORM options in the query string
    /// (`max_connections`, `batch_size`, ...) are consumed here; the rest is
    /// passed to the driver.
    pub async fn connect(url: &str) -> OrmResult<Database> {
        Self::connect_with(DatabaseConfig::parse(url)?).await
    }

    pub async fn connect_with(config: DatabaseConfig) -> OrmResult<Database> {
        let pool = DbPool::connect(&config).await?;
        let dialect = Dialect::for_config(config.db_type, &config.masked_connection_string());
        Ok(Self::assemble(
            pool,
            dialect,
            Arc::new(NoHooks),
            config.batch_size_or_default(),
        ))
    }

    /// Wrap a pool built by the caller. All such pools of one engine share a
    /// dialect.
    pub fn from_pool(pool: impl Into<DbPool>) -> Database {
        let pool = pool.into();
        let db_type = pool.database_type();
        let dialect = Dialect::for_config(db_type, db_type.display_name());
        Self::assemble(
            pool,
            dialect,
            Arc::new(NoHooks),
            crate::config::DEFAULT_BATCH_SIZE,
        )
    }

    fn assemble(
        pool: DbPool,
        dialect: Arc<Dialect>,
        hooks: Arc<dyn Hooks>,
        batch_size: usize,
    ) -> Database {
        Database {
            inner: Arc::new(DatabaseInner {
                env: Arc::new(Env::new(dialect, hooks, batch_size)),
                pool,
                tx_gate: Mutex::new(()),
            }),
        }
    }

    /// New instance over the same pool with `hooks` installed. The instance
    /// has its own transaction gate.
    pub fn with_hooks(&self, hooks: impl Hooks + 'static) -> Database {
        let env = &self.inner.env;
        Self::assemble(
            self.inner.pool.clone(),
            Arc::clone(&env.dialect),
            Arc::new(hooks),
            env.batch_size,
        )
    }

    /// New instance over the same pool with a different bulk insert chunk
    /// size.
    pub fn with_batch_size(&self, batch_size: usize) -> Database {
        let env = &self.inner.env;
        Self::assemble(
            self.inner.pool.clone(),
            Arc::clone(&env.dialect),
            Arc::clone(&env.hooks),
            batch_size,
        )
    }

    pub(crate) fn env(&self) -> &Env {
        &self.inner.env
    }

    /// Pooled connection for a standalone operation. Inside a transaction
    /// body on this database the caller must use the [`Session`] instead;
    /// a second connection would commit outside the transaction.
    pub(crate) async fn acquire(&self) -> OrmResult<PooledConn> {
        let in_transaction = ACTIVE_TRANSACTIONS
            .try_with(|ids| ids.contains(&self.inner.env.id))
            .unwrap_or(false);
        if in_transaction {
            return Err(OrmError::transaction(
                "use the Session inside a transaction body",
                None,
            ));
        }
        self.inner.pool.acquire().await
    }

    pub fn pool(&self) -> &DbPool {
        &self.inner.pool
    }

    pub fn dialect(&self) -> &Arc<Dialect> {
        &self.inner.env.dialect
    }

    pub fn batch_size(&self) -> usize {
        self.inner.env.batch_size
    }

    /// Resolved metadata of `E` for this database's dialect.
    pub fn metadata<E: Entity>(&self) -> OrmResult<Arc<EntityMetadata<E>>> {
        Ok(self.inner.env.dialect.properties::<E>()?)
    }

    /// Insert one row and assign its generated key.
    pub async fn insert<E: Entity>(&self, entity: &mut E) -> OrmResult<()> {
        let mut conn = self.acquire().await?;
        ops::insert(self.env(), &mut conn.as_conn(), std::slice::from_mut(entity)).await
    }

    /// Insert many rows with multi-row INSERT statements of at most
    /// [`Database::batch_size`] rows, assigning generated keys in order.
    pub async fn insert_batch<E: Entity>(&self, entities: &mut [E]) -> OrmResult<()> {
        if entities.is_empty() {
            return Ok(());
        }
        let mut conn = self.acquire().await?;
        ops::insert(self.env(), &mut conn.as_conn(), entities).await
    }

    /// Update every updatable field of the row with this entity's id.
    pub async fn update<E: Entity>(&self, entity: &E) -> OrmResult<()> {
        let mut conn = self.acquire().await?;
        ops::update(self.env(), &mut conn.as_conn(), entity).await
    }

    /// Write this entity's updatable fields to every row matching `filter`.
    pub async fn update_where<E: Entity>(
        &self,
        entity: &E,
        filter: &str,
        params: Vec<Value>,
    ) -> OrmResult<u64> {
        let mut conn = self.acquire().await?;
        ops::update_where(self.env(), &mut conn.as_conn(), entity, filter, &params).await
    }

    pub async fn delete<E: Entity>(&self, id: impl Into<Value>) -> OrmResult<()> {
        let mut conn = self.acquire().await?;
        ops::delete::<E>(self.env(), &mut conn.as_conn(), id.into()).await
    }

    pub async fn delete_where<E: Entity>(&self, filter: &str, params: Vec<Value>) -> OrmResult<u64> {
        let mut conn = self.acquire().await?;
        ops::delete_where::<E>(self.env(), &mut conn.as_conn(), filter, &params).await
    }

    pub async fn get_by_id<E: Entity>(&self, id: impl Into<Value>) -> OrmResult<Option<E>> {
        let mut conn = self.acquire().await?;
        ops::get_by_id::<E>(self.env(), &mut conn.as_conn(), id.into()).await
    }

    pub async fn list_all<E: Entity>(&self) -> OrmResult<Vec<E>> {
        self.query::<E>().list().await
    }

    pub async fn list_where<E: Entity>(&self, filter: &str, params: Vec<Value>) -> OrmResult<Vec<E>> {
        self.filter::<E>(filter, params).list().await
    }

    pub fn query<E: Entity>(&self) -> Query<'_, E> {
        Query::on_database(self)
    }

    pub fn filter<E: Entity>(&self, filter: &str, params: Vec<Value>) -> Query<'_, E> {
        self.query().filter(filter, params)
    }

    pub fn sql<E: Entity>(&self, sql: &str, params: Vec<Value>) -> Query<'_, E> {
        self.query().sql(sql, params)
    }

    /// Run a raw statement and return the affected row count.
    pub async fn execute(&self, sql: &str, params: Vec<Value>) -> OrmResult<u64> {
        let mut conn = self.acquire().await?;
        ops::execute(self.env(), &mut conn.as_conn(), sql, &params).await
    }

    /// Run `body` inside one transaction and commit if it succeeds.
    ///
    /// Any error from `body`, or from the commit, rolls the transaction back
    /// and is returned wrapped in [`OrmError::Transaction`]. Inside `body`,
    /// all work goes through the [`Session`]: operations on this database
    /// itself, including a second `transaction`, fail without side effects.
    /// Calls from other tasks wait for the running one.
    pub async fn transaction<T, F>(&self, body: F) -> OrmResult<T>
    where
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, OrmResult<T>> + Send,
        T: Send,
    {
        let id = self.inner.env.id;
        let mut active = ACTIVE_TRANSACTIONS
            .try_with(|ids| ids.clone())
            .unwrap_or_default();
        if active.contains(&id) {
            return Err(OrmError::transaction(
                "a transaction is already open on this database in the current task",
                None,
            ));
        }
        active.insert(id);

        let _gate = self.inner.tx_gate.lock().await;
        ACTIVE_TRANSACTIONS
            .scope(active, self.run_transaction(body))
            .await
    }

    async fn run_transaction<T, F>(&self, body: F) -> OrmResult<T>
    where
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, OrmResult<T>> + Send,
        T: Send,
    {
        let started = Instant::now();
        let tx = self
            .inner
            .pool
            .begin()
            .await
            .map_err(|e| OrmError::transaction("failed to begin transaction", Some(e)))?;
        debug!(database = self.inner.env.id, "Transaction started");

        let mut session = Session {
            env: Arc::clone(&self.inner.env),
            tx,
        };
        let result = body(&mut session).await;
        let Session { tx, .. } = session;

        match result {
            Ok(value) => {
                tx.commit()
                    .await
                    .map_err(|e| OrmError::transaction("commit failed", Some(e)))?;
                info!(
                    database = self.inner.env.id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Transaction committed"
                );
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(
                        database = self.inner.env.id,
                        error = %rollback_err,
                        "Rollback failed"
                    );
                }
                info!(
                    database = self.inner.env.id,
                    error = %err,
                    "Transaction rolled back"
                );
                Err(OrmError::transaction("transaction rolled back", Some(err)))
            }
        }
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.inner.pool.close().await;
    }
}

/// Operations bound to one open transaction. Obtained inside
/// [`Database::transaction`].
pub struct Session {
    env: Arc<Env>,
    tx: DbTransaction,
}

impl Session {
    pub(crate) fn parts(&mut self) -> (&Env, DbConn<'_>) {
        (&self.env, self.tx.as_conn())
    }

    pub async fn insert<E: Entity>(&mut self, entity: &mut E) -> OrmResult<()> {
        let (env, mut conn) = self.parts();
        ops::insert(env, &mut conn, std::slice::from_mut(entity)).await
    }

    pub async fn insert_batch<E: Entity>(&mut self, entities: &mut [E]) -> OrmResult<()> {
        if entities.is_empty() {
            return Ok(());
        }
        let (env, mut conn) = self.parts();
        ops::insert(env, &mut conn, entities).await
    }

    pub async fn update<E: Entity>(&mut self, entity: &E) -> OrmResult<()> {
        let (env, mut conn) = self.parts();
        ops::update(env, &mut conn, entity).await
    }

    pub async fn update_where<E: Entity>(
        &mut self,
        entity: &E,
        filter: &str,
        params: Vec<Value>,
    ) -> OrmResult<u64> {
        let (env, mut conn) = self.parts();
        ops::update_where(env, &mut conn, entity, filter, &params).await
    }

    pub async fn delete<E: Entity>(&mut self, id: impl Into<Value>) -> OrmResult<()> {
        let (env, mut conn) = self.parts();
        ops::delete::<E>(env, &mut conn, id.into()).await
    }

    pub async fn delete_where<E: Entity>(
        &mut self,
        filter: &str,
        params: Vec<Value>,
    ) -> OrmResult<u64> {
        let (env, mut conn) = self.parts();
        ops::delete_where::<E>(env, &mut conn, filter, &params).await
    }

    pub async fn get_by_id<E: Entity>(&mut self, id: impl Into<Value>) -> OrmResult<Option<E>> {
        let (env, mut conn) = self.parts();
        ops::get_by_id::<E>(env, &mut conn, id.into()).await
    }

    pub async fn list_all<E: Entity>(&mut self) -> OrmResult<Vec<E>> {
        self.query::<E>().list().await
    }

    pub async fn list_where<E: Entity>(
        &mut self,
        filter: &str,
        params: Vec<Value>,
    ) -> OrmResult<Vec<E>> {
        self.filter::<E>(filter, params).list().await
    }

    pub fn query<E: Entity>(&mut self) -> Query<'_, E> {
        Query::on_session(self)
    }

    pub fn filter<E: Entity>(&mut self, filter: &str, params: Vec<Value>) -> Query<'_, E> {
        self.query().filter(filter, params)
    }

    pub fn sql<E: Entity>(&mut self, sql: &str, params: Vec<Value>) -> Query<'_, E> {
        self.query().sql(sql, params)
    }

    pub async fn execute(&mut self, sql: &str, params: Vec<Value>) -> OrmResult<u64> {
        let (env, mut conn) = self.parts();
        ops::execute(env, &mut conn, sql, &params).await
    }
}

/// Operations shared by [`Database`] and [`Session`], run on a borrowed
/// connection.
mod ops {
    use super::*;

    fn require_id<E>(meta: &EntityMetadata<E>) -> OrmResult<&crate::metadata::FieldMetadata<E>> {
        meta.id_field().ok_or_else(|| {
            OrmError::invalid_input(format!("`{}` has no identity field", meta.type_name()))
        })
    }

    pub(super) async fn insert<E: Entity>(
        env: &Env,
        conn: &mut DbConn<'_>,
        entities: &mut [E],
    ) -> OrmResult<()> {
        let meta = env.dialect.properties::<E>()?;
        let per_row = meta.insertable_count();
        if per_row == 0 {
            return Err(OrmError::invalid_input(format!(
                "`{}` has no insertable fields",
                meta.type_name()
            )));
        }
        for entity in entities.iter() {
            env.authorize(Operation::Insert, &meta, entity)?;
        }

        let ceiling = (env.dialect.rules().max_parameters() / per_row).max(1);
        let chunk_size = env.batch_size.min(ceiling);
        for chunk in entities.chunks_mut(chunk_size) {
            insert_chunk(env, conn, &meta, chunk).await?;
        }
        if entities.len() > 1 {
            debug!(
                table = meta.table(),
                rows = entities.len(),
                statements = entities.len().div_ceil(chunk_size),
                "Bulk insert completed"
            );
        }
        Ok(())
    }

    async fn insert_chunk<E: Entity>(
        env: &Env,
        conn: &mut DbConn<'_>,
        meta: &EntityMetadata<E>,
        chunk: &mut [E],
    ) -> OrmResult<()> {
        let values = &meta.sql.insert_values;
        let mut sql = String::with_capacity(
            meta.sql.insert_header.len() + chunk.len() * (values.len() + 1) + 32,
        );
        sql.push_str(&meta.sql.insert_header);
        let mut params = Vec::with_capacity(chunk.len() * meta.insertable_count());
        for (i, entity) in chunk.iter().enumerate() {
            if i > 0 {
                sql.push(',');
            }
            sql.push_str(values);
            for field in meta.insertable_fields() {
                params.push(field.save(entity)?);
            }
        }

        let generated = meta.id_field().filter(|_| meta.has_generated_id());
        match (generated, &meta.sql.returning) {
            (Some(id), Some(returning)) => {
                sql.push_str(returning);
                let rows = env.fetch(conn, &sql, &params).await?;
                if rows.len() != chunk.len() {
                    return Err(OrmError::bind(format!(
                        "expected {} generated keys from `{}`, got {}",
                        chunk.len(),
                        meta.table(),
                        rows.len()
                    )));
                }
                let mut keys = rows
                    .iter()
                    .map(|row| {
                        let mut scratch = E::default();
                        id.load(&mut scratch, row, 0)?;
                        id.read(&scratch)
                    })
                    .collect::<OrmResult<Vec<_>>>()?;
                sort_generated_keys(&mut keys);
                for (entity, key) in chunk.iter_mut().zip(keys) {
                    id.write(entity, key)?;
                }
            }
            (Some(id), None) => {
                let outcome = env.execute(conn, &sql, &params).await?;
                let first = outcome.last_insert_id.ok_or_else(|| {
                    OrmError::bind(format!(
                        "database reported no generated key for `{}`",
                        meta.table()
                    ))
                })?;
                for (offset, entity) in (0i64..).zip(chunk.iter_mut()) {
                    id.write(entity, Value::I64(first + offset))?;
                }
            }
            (None, _) => {
                env.execute(conn, &sql, &params).await?;
            }
        }
        Ok(())
    }

    /// RETURNING rows come back in no guaranteed order. Generated integer
    /// keys are allocated in VALUES order, so ascending order restores the
    /// input order. Non-integer keys keep the order the engine returned.
    pub(super) fn sort_generated_keys(keys: &mut [Value]) {
        if keys.iter().all(|k| k.as_i64().is_some()) {
            keys.sort_by_key(Value::as_i64);
        }
    }

    /// `UPDATE ... SET <updatable>` with the entity's values bound.
    fn update_statement<E: Entity>(
        env: &Env,
        meta: &EntityMetadata<E>,
        entity: &E,
    ) -> OrmResult<(String, Vec<Param>)> {
        env.authorize(Operation::Update, meta, entity)?;
        let sql = meta.sql.update.clone().ok_or_else(|| {
            OrmError::invalid_input(format!("`{}` has no updatable fields", meta.type_name()))
        })?;
        let params = meta
            .updatable_fields()
            .map(|f| f.save(entity))
            .collect::<OrmResult<Vec<_>>>()?;
        Ok((sql, params))
    }

    pub(super) async fn update<E: Entity>(
        env: &Env,
        conn: &mut DbConn<'_>,
        entity: &E,
    ) -> OrmResult<()> {
        let meta = env.dialect.properties::<E>()?;
        let id = require_id(&meta)?;
        let (mut sql, mut params) = update_statement(env, &meta, entity)?;
        params.push(id.save(entity)?);

        let (filter, extra) = env.scope(meta.info(), meta.sql.where_id.clone())?;
        push_where(&mut sql, filter);
        params.extend(extra);

        let outcome = env.execute(conn, &sql, &params).await?;
        if outcome.rows_affected == 0 {
            let id_value = id.read(entity)?;
            return Err(OrmError::not_found(
                meta.table(),
                format!("{} = {id_value:?}", id.column),
            ));
        }
        Ok(())
    }

    pub(super) async fn update_where<E: Entity>(
        env: &Env,
        conn: &mut DbConn<'_>,
        entity: &E,
        filter: &str,
        values: &[Value],
    ) -> OrmResult<u64> {
        let meta = env.dialect.properties::<E>()?;
        let (mut sql, mut params) = update_statement(env, &meta, entity)?;
        params.extend(env.bind_values(values)?);

        let (filter, extra) = env.scope(meta.info(), Some(filter.to_string()))?;
        push_where(&mut sql, filter);
        params.extend(extra);

        Ok(env.execute(conn, &sql, &params).await?.rows_affected)
    }

    pub(super) async fn delete<E: Entity>(
        env: &Env,
        conn: &mut DbConn<'_>,
        id_value: Value,
    ) -> OrmResult<()> {
        let meta = env.dialect.properties::<E>()?;
        let id = require_id(&meta)?;
        let mut params = vec![id.save_value(&id_value)?];
        let (filter, extra) = env.scope(meta.info(), meta.sql.where_id.clone())?;
        let mut sql = meta.sql.delete.clone();
        push_where(&mut sql, filter);
        params.extend(extra);

        let outcome = env.execute(conn, &sql, &params).await?;
        if outcome.rows_affected == 0 {
            return Err(OrmError::not_found(
                meta.table(),
                format!("{} = {id_value:?}", id.column),
            ));
        }
        Ok(())
    }

    pub(super) async fn delete_where<E: Entity>(
        env: &Env,
        conn: &mut DbConn<'_>,
        filter: &str,
        values: &[Value],
    ) -> OrmResult<u64> {
        let meta = env.dialect.properties::<E>()?;
        let mut params = env.bind_values(values)?;
        let (filter, extra) = env.scope(meta.info(), Some(filter.to_string()))?;
        let mut sql = meta.sql.delete.clone();
        push_where(&mut sql, filter);
        params.extend(extra);

        Ok(env.execute(conn, &sql, &params).await?.rows_affected)
    }

    pub(super) async fn get_by_id<E: Entity>(
        env: &Env,
        conn: &mut DbConn<'_>,
        id_value: Value,
    ) -> OrmResult<Option<E>> {
        let meta = env.dialect.properties::<E>()?;
        let id = require_id(&meta)?;
        let param = id.save_value(&id_value)?;
        let spec = QuerySpec {
            filter: meta.sql.where_id.clone(),
            ..Default::default()
        };
        let (sql, extra) = query::build_select(env, &meta, &spec)?;
        let mut params = vec![param];
        params.extend(extra);

        let rows = env.fetch(conn, &sql, &params).await?;
        Ok(query::hydrate(&meta, &rows)?.into_iter().next())
    }

    pub(super) async fn execute(
        env: &Env,
        conn: &mut DbConn<'_>,
        sql: &str,
        values: &[Value],
    ) -> OrmResult<u64> {
        let params = env.bind_values(values)?;
        Ok(env.execute(conn, sql, &params).await?.rows_affected)
    }

    fn push_where(sql: &mut String, filter: Option<String>) {
        if let Some(filter) = filter {
            sql.push_str(" WHERE ");
            sql.push_str(&filter);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabaseType;

    fn env() -> Env {
        Env::new(
            Arc::new(Dialect::for_type(DatabaseType::SQLite)),
            Arc::new(NoHooks),
            0,
        )
    }

    #[test]
    fn test_instances_get_distinct_ids() {
        let a = env();
        let b = env();
        assert_ne!(a.id, b.id);
        assert_eq!(a.batch_size, 1);
    }

    #[test]
    fn test_bind_value_uses_kind_binders() {
        let env = env();
        assert_eq!(env.bind_value(&Value::I8(3)).unwrap(), Param::SmallInt(3));
        assert_eq!(env.bind_value(&Value::Null).unwrap(), Param::Null(WireType::Text));
        assert_eq!(env.bind_value(&Value::U64(9)).unwrap(), Param::BigInt(9));
        assert!(env.bind_value(&Value::U64(u64::MAX)).is_err());
    }

    #[test]
    fn test_generated_keys_follow_allocation_order() {
        let mut keys = vec![Value::I64(12), Value::I64(10), Value::I64(11)];
        ops::sort_generated_keys(&mut keys);
        assert_eq!(keys, vec![Value::I64(10), Value::I64(11), Value::I64(12)]);

        let mut mixed = vec![Value::Text("b".into()), Value::I64(1)];
        ops::sort_generated_keys(&mut mixed);
        assert_eq!(mixed, vec![Value::Text("b".into()), Value::I64(1)]);
    }
}
