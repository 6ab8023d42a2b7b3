//! Structural metadata: persistable fields, columns and identity of one type.

use crate::dialect::Dialect;
use crate::error::InitError;
use crate::models::entity::{Access, Entity, Schema};
use crate::models::value::{Value, ValueKind};
use std::collections::HashSet;
use tracing::debug;

/// Field name adopted as the identity when no field is marked explicitly.
const IMPLICIT_ID: &str = "id";

/// One persistable field after column naming and flag resolution.
pub struct FieldStructure<E> {
    pub name: &'static str,
    pub column: String,
    pub kind: ValueKind,
    pub primary_key: bool,
    pub generated: bool,
    pub insertable: bool,
    pub updatable: bool,
    pub(crate) access: Access<E>,
}

impl<E> FieldStructure<E> {
    pub fn is_reference(&self) -> bool {
        matches!(self.access, Access::Reference(_))
    }

    /// Read the scalar value of this field.
    pub(crate) fn read(&self, entity: &E) -> Result<Value, String> {
        match &self.access {
            Access::Scalar { get, .. } => get(entity),
            Access::Reference(_) => Err(format!("`{}` is a reference field", self.name)),
        }
    }

    /// Overwrite the scalar value of this field.
    pub(crate) fn write(&self, entity: &mut E, value: Value) -> Result<(), String> {
        match &self.access {
            Access::Scalar { set, .. } => set(entity, value),
            Access::Reference(_) => Err(format!("`{}` is a reference field", self.name)),
        }
    }
}

/// Phase-one record of a mapped type. Built from the type's own schema only,
/// so resolving it never recurses into referenced types.
pub struct EntityStructure<E> {
    type_name: &'static str,
    table: String,
    fields: Vec<FieldStructure<E>>,
    id_index: Option<usize>,
}

impl<E> EntityStructure<E> {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn fields(&self) -> &[FieldStructure<E>] {
        &self.fields
    }

    pub fn id_index(&self) -> Option<usize> {
        self.id_index
    }

    pub fn id_field(&self) -> Option<&FieldStructure<E>> {
        self.id_index.map(|i| &self.fields[i])
    }
}

impl<E: Entity> EntityStructure<E> {
    pub(crate) fn resolve(dialect: &Dialect) -> Result<Self, InitError> {
        Self::from_schema(dialect, E::schema())
    }

    fn from_schema(dialect: &Dialect, schema: Schema<E>) -> Result<Self, InitError> {
        let rules = dialect.rules();
        let type_name = schema.type_name;
        let table = schema
            .table
            .unwrap_or_else(|| rules.table_name(type_name));

        let mut fields = Vec::with_capacity(schema.fields.len());
        let mut seen_columns = HashSet::new();
        let mut id_index = None;

        for field in schema.fields {
            if field.transient {
                continue;
            }
            let column = field
                .column
                .clone()
                .unwrap_or_else(|| rules.column_name(field.name));
            if !seen_columns.insert(column.to_lowercase()) {
                return Err(InitError::field(
                    type_name,
                    field.name,
                    format!("column `{column}` is mapped more than once"),
                ));
            }
            if field.primary_key {
                if field.is_reference() {
                    return Err(InitError::field(
                        type_name,
                        field.name,
                        "a reference cannot be the primary key",
                    ));
                }
                if id_index.is_some() {
                    return Err(InitError::field(
                        type_name,
                        field.name,
                        "more than one primary key field",
                    ));
                }
                id_index = Some(fields.len());
            }
            fields.push(FieldStructure {
                name: field.name,
                column,
                kind: field.kind,
                primary_key: field.primary_key,
                generated: field.generated,
                insertable: field.insertable.unwrap_or(true),
                updatable: field.updatable.unwrap_or(true),
                access: field.access,
            });
        }

        if fields.is_empty() {
            return Err(InitError::new(type_name, "no persistable fields"));
        }

        if id_index.is_none() {
            id_index = fields
                .iter()
                .position(|f| f.name == IMPLICIT_ID && !f.is_reference());
            if let Some(i) = id_index {
                fields[i].primary_key = true;
                fields[i].generated = true;
            }
        }

        for field in &mut fields {
            if field.generated {
                field.insertable = false;
                field.updatable = false;
            }
            if field.primary_key {
                field.updatable = false;
            }
        }

        if id_index.is_some() && fields.len() == 1 {
            return Err(InitError::new(
                type_name,
                "no persistable fields besides the identity field",
            ));
        }

        debug!(
            type_name,
            table = %table,
            fields = fields.len(),
            id = id_index.map(|i| fields[i].column.as_str()),
            "Resolved entity structure"
        );

        Ok(Self {
            type_name,
            table,
            fields,
            id_index,
        })
    }
}
