//! Binding metadata: per-field binders, reference codecs and the SQL
//! fragments of one type, resolved against a dialect.

use crate::db::{DbRow, Param};
use crate::dialect::{Dialect, LoadFn, SaveFn};
use crate::error::{InitError, OrmError, OrmResult};
use crate::metadata::structure::EntityStructure;
use crate::models::entity::{Access, Getter, Setter};
use crate::models::reference::ReferenceCodec;
use crate::models::value::{Value, ValueKind};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Identity of a mapped type as seen by [`crate::Hooks`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityInfo {
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub table: String,
}

pub(crate) enum FieldCodec<E> {
    Scalar {
        get: Getter<E>,
        set: Setter<E>,
        save: SaveFn,
        load: LoadFn,
    },
    Reference(Arc<dyn ReferenceCodec<E>>),
}

/// A persistable field with its binders resolved.
pub struct FieldMetadata<E> {
    pub name: &'static str,
    pub column: String,
    pub kind: ValueKind,
    pub insertable: bool,
    pub updatable: bool,
    pub(crate) codec: FieldCodec<E>,
}

impl<E> FieldMetadata<E> {
    fn bind_error(&self, message: String) -> OrmError {
        OrmError::bind_column(message, &self.column, self.name)
    }

    /// Wire parameter for this field's current value.
    pub(crate) fn save(&self, entity: &E) -> OrmResult<Param> {
        match &self.codec {
            FieldCodec::Scalar { get, save, .. } => {
                let value = get(entity).map_err(|e| self.bind_error(e))?;
                save(&value).map_err(|e| self.bind_error(e))
            }
            FieldCodec::Reference(codec) => codec.save(entity).map_err(|e| self.bind_error(e)),
        }
    }

    /// Decode column `index` of `row` into this field.
    pub(crate) fn load(&self, entity: &mut E, row: &DbRow, index: usize) -> OrmResult<()> {
        match &self.codec {
            FieldCodec::Scalar { set, load, .. } => {
                let value = load(row, index).map_err(|e| self.bind_error(e))?;
                set(entity, value).map_err(|e| self.bind_error(e))
            }
            FieldCodec::Reference(codec) => {
                codec.load(entity, row, index).map_err(|e| self.bind_error(e))
            }
        }
    }

    /// Wire parameter for a caller-supplied value of this field, such as an
    /// id passed to `get_by_id`.
    pub(crate) fn save_value(&self, value: &Value) -> OrmResult<Param> {
        match &self.codec {
            FieldCodec::Scalar { save, .. } => save(value).map_err(|e| self.bind_error(e)),
            FieldCodec::Reference(_) => Err(self.bind_error("reference field".to_string())),
        }
    }

    pub(crate) fn read(&self, entity: &E) -> OrmResult<Value> {
        match &self.codec {
            FieldCodec::Scalar { get, .. } => get(entity).map_err(|e| self.bind_error(e)),
            FieldCodec::Reference(_) => Err(self.bind_error("reference field".to_string())),
        }
    }

    pub(crate) fn write(&self, entity: &mut E, value: Value) -> OrmResult<()> {
        match &self.codec {
            FieldCodec::Scalar { set, .. } => {
                let value = value
                    .convert_integer(self.kind)
                    .map_err(|e| self.bind_error(e))?;
                set(entity, value).map_err(|e| self.bind_error(e))
            }
            FieldCodec::Reference(_) => Err(self.bind_error("reference field".to_string())),
        }
    }

    pub(crate) fn reference(&self) -> Option<&Arc<dyn ReferenceCodec<E>>> {
        match &self.codec {
            FieldCodec::Reference(codec) => Some(codec),
            FieldCodec::Scalar { .. } => None,
        }
    }
}

/// SQL fragments derived once from the resolved column sets. All use `?`
/// placeholders.
#[derive(Debug, Clone)]
pub(crate) struct SqlFragments {
    /// `INSERT INTO t(a,b) VALUES `
    pub insert_header: String,
    /// `(?,?)`, repeated once per inserted row
    pub insert_values: String,
    /// `UPDATE t SET a=?,b=?`, absent when nothing is updatable
    pub update: Option<String>,
    pub delete: String,
    pub select: String,
    /// `id=?`
    pub where_id: Option<String>,
    /// Generated-key clause appended to inserts
    pub returning: Option<String>,
}

/// Phase-two record of a mapped type: everything needed to save, load and
/// query it.
pub struct EntityMetadata<E> {
    structure: Arc<EntityStructure<E>>,
    info: EntityInfo,
    fields: Vec<FieldMetadata<E>>,
    columns: HashMap<String, usize>,
    id: Option<usize>,
    insertable: Vec<usize>,
    updatable: Vec<usize>,
    references: Vec<usize>,
    pub(crate) sql: SqlFragments,
}

impl<E: 'static> EntityMetadata<E> {
    pub(crate) fn bind(
        dialect: &Dialect,
        structure: Arc<EntityStructure<E>>,
    ) -> Result<Self, InitError> {
        let type_name = structure.type_name();
        let mut fields = Vec::with_capacity(structure.fields().len());

        for field in structure.fields() {
            let (kind, codec) = match &field.access {
                Access::Reference(access) => {
                    let codec = access.bind(dialect, type_name, field.name)?;
                    (codec.id_kind(), FieldCodec::Reference(codec))
                }
                Access::Scalar { get, set } => {
                    let binder = dialect.binder(field.kind).ok_or_else(|| {
                        InitError::field(
                            type_name,
                            field.name,
                            format!("unsupported value kind {}", field.kind),
                        )
                    })?;
                    (
                        field.kind,
                        FieldCodec::Scalar {
                            get: Arc::clone(get),
                            set: Arc::clone(set),
                            save: binder.save,
                            load: binder.load,
                        },
                    )
                }
            };
            fields.push(FieldMetadata {
                name: field.name,
                column: field.column.clone(),
                kind,
                insertable: field.insertable,
                updatable: field.updatable,
                codec,
            });
        }

        let columns = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.column.to_lowercase(), i))
            .collect();
        let id = structure.id_index();
        let insertable: Vec<usize> = indices(&fields, |f| f.insertable);
        let updatable: Vec<usize> = indices(&fields, |f| f.updatable);
        let references: Vec<usize> = indices(&fields, |f| f.reference().is_some());

        let rules = dialect.rules();
        let table = structure.table();
        let column_names = |set: &[usize]| -> Vec<&str> {
            set.iter().map(|&i| fields[i].column.as_str()).collect()
        };
        let id_column = id.map(|i| fields[i].column.as_str());
        let generated_id = id.filter(|&i| !fields[i].insertable);

        let sql = SqlFragments {
            insert_header: rules.sql_for_insert(table, &column_names(&insertable)),
            insert_values: rules.sql_for_values(insertable.len()),
            update: (!updatable.is_empty())
                .then(|| rules.sql_for_update(table, &column_names(&updatable))),
            delete: rules.sql_for_delete(table),
            select: rules.sql_for_select(table),
            where_id: id_column.map(|c| rules.sql_for_where(c)),
            returning: generated_id.and_then(|i| rules.returning_clause(&fields[i].column)),
        };

        debug!(
            type_name,
            table = %table,
            insertable = insertable.len(),
            updatable = updatable.len(),
            references = references.len(),
            "Bound entity metadata"
        );

        Ok(Self {
            info: EntityInfo {
                type_id: TypeId::of::<E>(),
                type_name,
                table: table.to_string(),
            },
            structure,
            fields,
            columns,
            id,
            insertable,
            updatable,
            references,
            sql,
        })
    }
}

fn indices<E>(fields: &[FieldMetadata<E>], pred: impl Fn(&FieldMetadata<E>) -> bool) -> Vec<usize> {
    fields
        .iter()
        .enumerate()
        .filter(|(_, f)| pred(f))
        .map(|(i, _)| i)
        .collect()
}

impl<E> EntityMetadata<E> {
    pub fn info(&self) -> &EntityInfo {
        &self.info
    }

    pub fn table(&self) -> &str {
        &self.info.table
    }

    pub fn type_name(&self) -> &'static str {
        self.info.type_name
    }

    pub fn structure(&self) -> &EntityStructure<E> {
        &self.structure
    }

    pub fn fields(&self) -> &[FieldMetadata<E>] {
        &self.fields
    }

    /// Field mapped to `column`, matched case-insensitively.
    pub fn field_for_column(&self, column: &str) -> Option<&FieldMetadata<E>> {
        self.column_index(column).map(|i| &self.fields[i])
    }

    pub(crate) fn column_index(&self, column: &str) -> Option<usize> {
        self.columns
            .get(column)
            .or_else(|| self.columns.get(&column.to_lowercase()))
            .copied()
    }

    pub fn id_field(&self) -> Option<&FieldMetadata<E>> {
        self.id.map(|i| &self.fields[i])
    }

    /// True when the identity is assigned by the database on insert.
    pub fn has_generated_id(&self) -> bool {
        self.id_field().is_some_and(|f| !f.insertable)
    }

    pub fn insertable_fields(&self) -> impl Iterator<Item = &FieldMetadata<E>> {
        self.insertable.iter().map(|&i| &self.fields[i])
    }

    pub fn updatable_fields(&self) -> impl Iterator<Item = &FieldMetadata<E>> {
        self.updatable.iter().map(|&i| &self.fields[i])
    }

    pub(crate) fn insertable_count(&self) -> usize {
        self.insertable.len()
    }

    pub(crate) fn reference_fields(&self) -> impl Iterator<Item = &FieldMetadata<E>> {
        self.references.iter().map(|&i| &self.fields[i])
    }

    pub(crate) fn has_references(&self) -> bool {
        !self.references.is_empty()
    }
}
