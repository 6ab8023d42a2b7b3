//! Read queries: statement assembly, row hydration and batched reference
//! resolution.
//!
//! A [`Query`] is built from [`crate::Database::query`] (or the `filter` and
//! `sql` shortcuts, or the same methods on a [`crate::Session`]) and consumed
//! by one of its terminal operations: [`Query::list`], [`Query::fetch`] or
//! [`Query::stream`].

use crate::database::{Database, Env, Session};
use crate::db::{DbConn, DbRow, Param};
use crate::error::{OrmError, OrmResult};
use crate::metadata::EntityMetadata;
use crate::models::entity::Entity;
use crate::models::value::{IdKey, Value};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use tracing::{debug, warn};

enum Source<'a> {
    Database(&'a Database),
    Session(&'a mut Session),
}

/// Columns to load for referenced rows: a global list, optionally overridden
/// per referenced type. An empty list selects every column.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReferenceColumns {
    global: Vec<String>,
    per_type: HashMap<TypeId, Vec<String>>,
}

impl ReferenceColumns {
    fn columns_for(&self, target: TypeId) -> &[String] {
        self.per_type.get(&target).unwrap_or(&self.global)
    }
}

/// Parts of a read statement before the entity's metadata is applied.
#[derive(Debug, Clone, Default)]
pub(crate) struct QuerySpec {
    pub(crate) sql: Option<String>,
    pub(crate) filter: Option<String>,
    pub(crate) group_by: Option<String>,
    pub(crate) order_by: Option<String>,
    pub(crate) params: Vec<Value>,
    pub(crate) references: Option<ReferenceColumns>,
}

/// Single-use read query for entity type `E`.
#[must_use = "a query does nothing until list, fetch or stream is called"]
pub struct Query<'a, E> {
    source: Source<'a>,
    spec: QuerySpec,
    _entity: PhantomData<fn() -> E>,
}

impl<'a, E: Entity> Query<'a, E> {
    pub(crate) fn on_database(database: &'a Database) -> Self {
        Self::new(Source::Database(database))
    }

    pub(crate) fn on_session(session: &'a mut Session) -> Self {
        Self::new(Source::Session(session))
    }

    fn new(source: Source<'a>) -> Self {
        Self {
            source,
            spec: QuerySpec::default(),
            _entity: PhantomData,
        }
    }

    /// Replace the generated `SELECT * FROM <table>` with caller SQL. The
    /// text is used verbatim; filter, grouping and ordering are still
    /// appended when set.
    pub fn sql(mut self, sql: impl Into<String>, params: Vec<Value>) -> Self {
        self.spec.sql = Some(sql.into());
        self.spec.params.extend(params);
        self
    }

    /// WHERE clause text with `?` placeholders.
    pub fn filter(mut self, filter: impl Into<String>, params: Vec<Value>) -> Self {
        self.spec.filter = Some(filter.into());
        self.spec.params.extend(params);
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.spec.order_by = Some(order_by.into());
        self
    }

    pub fn group_by(mut self, group_by: impl Into<String>) -> Self {
        self.spec.group_by = Some(group_by.into());
        self
    }

    /// Append one more positional parameter.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.spec.params.push(value.into());
        self
    }

    /// Load referenced rows after the main query, one batched query per
    /// reference field. `columns` lists what to load for every referenced
    /// type; empty or `["*"]` loads all columns.
    pub fn referenced_columns<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        let refs = self.spec.references.get_or_insert_with(Default::default);
        refs.global = column_list(columns);
        self
    }

    /// Override the columns loaded for references to `T`. Also enables
    /// reference loading.
    pub fn referenced_columns_for<T: Entity, S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        let refs = self.spec.references.get_or_insert_with(Default::default);
        refs.per_type.insert(TypeId::of::<T>(), column_list(columns));
        self
    }

    /// All matching rows.
    pub async fn list(self) -> OrmResult<Vec<E>> {
        self.load(Rows::All).await
    }

    /// First matching row, if any. Only that row is read and hydrated, and
    /// only its references are resolved.
    pub async fn fetch(self) -> OrmResult<Option<E>> {
        Ok(self.load(Rows::First).await?.into_iter().next())
    }

    async fn load(self, rows: Rows) -> OrmResult<Vec<E>> {
        let Query { source, spec, .. } = self;
        match source {
            Source::Database(database) => {
                let mut pooled = database.acquire().await?;
                run::<E>(database.env(), &mut pooled.as_conn(), &spec, rows).await
            }
            Source::Session(session) => {
                let (env, mut conn) = session.parts();
                run::<E>(env, &mut conn, &spec, rows).await
            }
        }
    }

    /// Matching rows as a stream. The query runs once, when the stream is
    /// first polled.
    pub fn stream(self) -> BoxStream<'a, OrmResult<E>>
    where
        E: 'a,
    {
        stream::once(self.list())
            .flat_map(|result| match result {
                Ok(rows) => stream::iter(rows.into_iter().map(Ok)).left_stream(),
                Err(err) => stream::iter(std::iter::once(Err(err))).right_stream(),
            })
            .boxed()
    }
}

fn column_list<S: AsRef<str>>(columns: &[S]) -> Vec<String> {
    let columns: Vec<String> = columns
        .iter()
        .map(|c| c.as_ref().trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    if columns.iter().any(|c| c == "*") {
        Vec::new()
    } else {
        columns
    }
}

/// Assemble the statement text for `spec`, appending the hook predicate to
/// generated selects. Returns the SQL and the hook's extra parameters.
pub(crate) fn build_select<E>(
    env: &Env,
    meta: &EntityMetadata<E>,
    spec: &QuerySpec,
) -> OrmResult<(String, Vec<Param>)> {
    let (mut sql, filter, extra) = match &spec.sql {
        Some(raw) => (raw.clone(), spec.filter.clone(), Vec::new()),
        None => {
            let (filter, extra) = env.scope(meta.info(), spec.filter.clone())?;
            (meta.sql.select.clone(), filter, extra)
        }
    };
    if let Some(filter) = filter {
        sql.push_str(" WHERE ");
        sql.push_str(&filter);
    }
    if let Some(group_by) = &spec.group_by {
        sql.push_str(" GROUP BY ");
        sql.push_str(group_by);
    }
    if let Some(order_by) = &spec.order_by {
        sql.push_str(" ORDER BY ");
        sql.push_str(order_by);
    }
    Ok((sql, extra))
}

/// How many result rows a read consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rows {
    All,
    First,
}

pub(crate) async fn run<E: Entity>(
    env: &Env,
    conn: &mut DbConn<'_>,
    spec: &QuerySpec,
    mode: Rows,
) -> OrmResult<Vec<E>> {
    let meta = env.dialect.properties::<E>()?;
    let (sql, extra) = build_select(env, &meta, spec)?;
    let mut params = env.bind_values(&spec.params)?;
    params.extend(extra);

    let rows = match mode {
        Rows::All => env.fetch(conn, &sql, &params).await?,
        Rows::First => env.fetch_first(conn, &sql, &params).await?.into_iter().collect(),
    };
    let mut entities = hydrate(&meta, &rows)?;

    if let Some(references) = &spec.references {
        if meta.has_references() && !entities.is_empty() {
            resolve_references(env, conn, &meta, &mut entities, references).await?;
        }
    }
    Ok(entities)
}

/// Build one entity per row. Columns are matched to fields by name once, from
/// the first row; unmatched columns are skipped.
pub(crate) fn hydrate<E: Entity>(meta: &EntityMetadata<E>, rows: &[DbRow]) -> OrmResult<Vec<E>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let plan: Vec<(usize, usize)> = first
        .column_names()
        .iter()
        .enumerate()
        .filter_map(|(col, name)| meta.column_index(name).map(|field| (col, field)))
        .collect();

    rows.iter()
        .map(|row| {
            let mut entity = E::default();
            for &(col, field) in &plan {
                meta.fields()[field].load(&mut entity, row, col)?;
            }
            Ok(entity)
        })
        .collect()
}

async fn resolve_references<E: Entity>(
    env: &Env,
    conn: &mut DbConn<'_>,
    meta: &EntityMetadata<E>,
    entities: &mut [E],
    references: &ReferenceColumns,
) -> OrmResult<()> {
    for field in meta.reference_fields() {
        let Some(codec) = field.reference() else {
            continue;
        };
        let field_error = |e: String| OrmError::bind_column(e, &field.column, field.name);

        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for entity in entities.iter() {
            let Some(id) = codec.shell_id(entity).map_err(field_error)? else {
                continue;
            };
            if IdKey::of(&id).is_some_and(|key| seen.insert(key)) {
                ids.push(id);
            }
        }
        if ids.is_empty() {
            continue;
        }

        let distinct = ids.len();
        let loaded = codec
            .fetch(env, conn, ids, references.columns_for(codec.target()))
            .await?;

        let mut orphans = 0usize;
        for entity in entities.iter_mut() {
            if !codec.attach(entity, &loaded).map_err(field_error)? {
                orphans += 1;
            }
        }

        debug!(
            table = meta.table(),
            field = field.name,
            target = codec.target_name(),
            distinct,
            loaded = loaded.count,
            "Resolved references"
        );
        if orphans > 0 {
            warn!(
                table = meta.table(),
                field = field.name,
                target = codec.target_name(),
                orphans,
                "Referenced rows not found, keeping id-only references"
            );
        }
    }
    Ok(())
}

/// Load rows of `T` by primary key, selecting the identity column plus
/// `columns` (all columns when empty). Ids are split across statements only
/// when they exceed the dialect's parameter ceiling.
pub(crate) async fn load_by_ids<T: Entity>(
    env: &Env,
    conn: &mut DbConn<'_>,
    ids: Vec<Value>,
    columns: &[String],
) -> OrmResult<Vec<T>> {
    let meta = env.dialect.properties::<T>()?;
    let id = meta.id_field().ok_or_else(|| {
        OrmError::invalid_input(format!("`{}` has no identity field", meta.type_name()))
    })?;

    let projection = if columns.is_empty() {
        "*".to_string()
    } else {
        std::iter::once(id.column.as_str())
            .chain(
                columns
                    .iter()
                    .map(String::as_str)
                    .filter(|c| !c.eq_ignore_ascii_case(&id.column)),
            )
            .collect::<Vec<_>>()
            .join(",")
    };

    let chunk_size = env
        .dialect
        .rules()
        .max_parameters()
        .saturating_sub(RESERVED_PARAMETERS)
        .max(1);
    let mut loaded = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(chunk_size) {
        let placeholders = vec!["?"; chunk.len()].join(",");
        let predicate = format!("{} IN ({placeholders})", id.column);
        let (filter, extra) = env.scope(meta.info(), Some(predicate))?;
        let sql = format!(
            "SELECT {projection} FROM {} WHERE {}",
            meta.table(),
            filter.unwrap_or_default()
        );
        let mut params = chunk
            .iter()
            .map(|v| id.save_value(v))
            .collect::<OrmResult<Vec<_>>>()?;
        params.extend(extra);

        let rows = env.fetch(conn, &sql, &params).await?;
        loaded.extend(hydrate::<T>(&meta, &rows)?);
    }
    Ok(loaded)
}

/// Parameter slots left free for hook predicates in reference batch queries.
const RESERVED_PARAMETERS: usize = 64;
