//! Declarative mapping of Rust structs to tables.
//!
//! A mapped type implements [`Entity`] and describes its fields once through a
//! [`Schema`]. Each [`Field`] carries the accessor pair used to read and write
//! the struct member plus the markers that shape its column: primary key,
//! generated value, transient, explicit column name and insert/update
//! overrides.
//!
//! ```ignore
//! impl Entity for Invoice {
//!     fn schema() -> Schema<Self> {
//!         Schema::new()
//!             .table("invoices")
//!             .field(Field::scalar("id", |e: &Self| &e.id, |e: &mut Self| &mut e.id))
//!             .field(Field::scalar("total", |e: &Self| &e.total, |e: &mut Self| &mut e.total))
//!             .field(Field::json("lines", |e: &Self| &e.lines, |e: &mut Self| &mut e.lines))
//!             .field(Field::reference::<Customer, _>(
//!                 "customer",
//!                 |e: &Self| &e.customer,
//!                 |e: &mut Self| &mut e.customer,
//!             ))
//!     }
//! }
//! ```

use crate::models::reference::{ProjectedAccess, RefField, RefSlot, ReferenceAccess};
use crate::models::value::{FieldValue, Value, ValueKind};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// A struct mapped to a table.
///
/// `Default` provides the blank instance that result rows are hydrated into,
/// and the id-only shells created for many-to-one references.
pub trait Entity: Default + Send + Sync + 'static {
    fn schema() -> Schema<Self>;
}

/// Enum persisted as its variant name.
pub trait SqlEnum: Sized + Send + Sync + 'static {
    fn variant_name(&self) -> &'static str;

    fn from_variant_name(name: &str) -> Option<Self>;
}

pub(crate) type Getter<E> = Arc<dyn Fn(&E) -> Result<Value, String> + Send + Sync>;
pub(crate) type Setter<E> = Arc<dyn Fn(&mut E, Value) -> Result<(), String> + Send + Sync>;

fn getter<E>(f: impl Fn(&E) -> Result<Value, String> + Send + Sync + 'static) -> Getter<E> {
    Arc::new(f)
}

fn setter<E>(
    f: impl Fn(&mut E, Value) -> Result<(), String> + Send + Sync + 'static,
) -> Setter<E> {
    Arc::new(f)
}

pub(crate) enum Access<E> {
    Scalar { get: Getter<E>, set: Setter<E> },
    Reference(Arc<dyn ReferenceAccess<E>>),
}

impl<E> Clone for Access<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Scalar { get, set } => Self::Scalar {
                get: Arc::clone(get),
                set: Arc::clone(set),
            },
            Self::Reference(r) => Self::Reference(Arc::clone(r)),
        }
    }
}

impl<P: Send + Sync + 'static> Access<P> {
    /// Re-root this accessor at a struct `C` that embeds `P`.
    fn project<C: Send + Sync + 'static>(
        self,
        get: fn(&C) -> &P,
        get_mut: fn(&mut C) -> &mut P,
    ) -> Access<C> {
        match self {
            Self::Scalar { get: g, set: s } => Access::Scalar {
                get: getter(move |c| g(get(c))),
                set: setter(move |c, v| s(get_mut(c), v)),
            },
            Self::Reference(inner) => Access::Reference(Arc::new(ProjectedAccess {
                inner,
                get,
                get_mut,
            })),
        }
    }
}

/// One declared member of a mapped type.
pub struct Field<E> {
    pub(crate) name: &'static str,
    pub(crate) kind: ValueKind,
    pub(crate) column: Option<String>,
    pub(crate) primary_key: bool,
    pub(crate) generated: bool,
    pub(crate) transient: bool,
    pub(crate) insertable: Option<bool>,
    pub(crate) updatable: Option<bool>,
    pub(crate) access: Access<E>,
}

impl<E: Send + Sync + 'static> Field<E> {
    fn with_access(name: &'static str, kind: ValueKind, access: Access<E>) -> Self {
        Self {
            name,
            kind,
            column: None,
            primary_key: false,
            generated: false,
            transient: false,
            insertable: None,
            updatable: None,
            access,
        }
    }

    /// Plain column backed by a [`FieldValue`] member.
    pub fn scalar<T: FieldValue>(
        name: &'static str,
        get: fn(&E) -> &T,
        get_mut: fn(&mut E) -> &mut T,
    ) -> Self {
        Self::with_access(
            name,
            T::KIND,
            Access::Scalar {
                get: getter(move |e| Ok(get(e).to_value())),
                set: setter(move |e, v| {
                    *get_mut(e) = T::from_value(v)?;
                    Ok(())
                }),
            },
        )
    }

    /// Member serialized to a JSON column. `None`/unit values map to NULL.
    pub fn json<T>(name: &'static str, get: fn(&E) -> &T, get_mut: fn(&mut E) -> &mut T) -> Self
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        Self::with_access(
            name,
            ValueKind::Json,
            Access::Scalar {
                get: getter(move |e| match serde_json::to_value(get(e)) {
                    Ok(serde_json::Value::Null) => Ok(Value::Null),
                    Ok(json) => Ok(Value::Json(json)),
                    Err(err) => Err(format!("JSON serialization failed: {err}")),
                }),
                set: setter(move |e, v| {
                    let json = match v {
                        Value::Null => serde_json::Value::Null,
                        Value::Json(json) => json,
                        Value::Text(text) => serde_json::from_str(&text)
                            .map_err(|err| format!("invalid JSON text: {err}"))?,
                        other => return Err(format!("expected json value, got {other:?}")),
                    };
                    *get_mut(e) = serde_json::from_value(json)
                        .map_err(|err| format!("JSON deserialization failed: {err}"))?;
                    Ok(())
                }),
            },
        )
    }

    /// Nullable enum stored as its variant name.
    pub fn enumeration<T: SqlEnum>(
        name: &'static str,
        get: fn(&E) -> &Option<T>,
        get_mut: fn(&mut E) -> &mut Option<T>,
    ) -> Self {
        Self::with_access(
            name,
            ValueKind::Enum,
            Access::Scalar {
                get: getter(move |e| {
                    Ok(get(e)
                        .as_ref()
                        .map_or(Value::Null, |v| Value::Text(v.variant_name().to_string())))
                }),
                set: setter(move |e, v| {
                    *get_mut(e) = match v {
                        Value::Null => None,
                        Value::Text(name) => Some(
                            T::from_variant_name(&name)
                                .ok_or_else(|| format!("unknown enum variant '{name}'"))?,
                        ),
                        other => return Err(format!("expected enum name, got {other:?}")),
                    };
                    Ok(())
                }),
            },
        )
    }

    /// Many-to-one reference. The column holds the referenced entity's
    /// primary key; loading yields an id-only shell of `T`.
    pub fn reference<T, S>(
        name: &'static str,
        get: fn(&E) -> &S,
        get_mut: fn(&mut E) -> &mut S,
    ) -> Self
    where
        T: Entity + Clone,
        S: RefSlot<T>,
    {
        let access: Arc<dyn ReferenceAccess<E>> = Arc::new(RefField::<E, T, S>::new(get, get_mut));
        // The kind is a placeholder until the target's id field is resolved.
        Self::with_access(name, ValueKind::I64, Access::Reference(access))
    }

    /// Mark as the primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Value assigned by the database; never written on insert or update.
    pub fn generated(mut self) -> Self {
        self.generated = true;
        self
    }

    /// Not persisted at all.
    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    /// Explicit column name instead of the snake_case field name.
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn insertable(mut self, insertable: bool) -> Self {
        self.insertable = Some(insertable);
        self
    }

    pub fn updatable(mut self, updatable: bool) -> Self {
        self.updatable = Some(updatable);
        self
    }

    pub(crate) fn is_reference(&self) -> bool {
        matches!(self.access, Access::Reference(_))
    }

    fn project<C: Send + Sync + 'static>(
        self,
        get: fn(&C) -> &E,
        get_mut: fn(&mut C) -> &mut E,
    ) -> Field<C> {
        Field {
            name: self.name,
            kind: self.kind,
            column: self.column,
            primary_key: self.primary_key,
            generated: self.generated,
            transient: self.transient,
            insertable: self.insertable,
            updatable: self.updatable,
            access: self.access.project(get, get_mut),
        }
    }
}

/// Field list and table naming of a mapped type.
pub struct Schema<E> {
    pub(crate) type_name: &'static str,
    pub(crate) table: Option<String>,
    pub(crate) fields: Vec<Field<E>>,
}

impl<E: Entity> Schema<E> {
    /// Schema named after the Rust type (module path and generics stripped).
    pub fn new() -> Self {
        Self::named(short_type_name::<E>())
    }

    /// Schema with an explicit logical type name, used for the default table
    /// name and in error messages.
    pub fn named(type_name: &'static str) -> Self {
        Self {
            type_name,
            table: None,
            fields: Vec::new(),
        }
    }

    /// Explicit table name instead of the snake_case type name.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn field(mut self, field: Field<E>) -> Self {
        self.fields.push(field);
        self
    }

    /// Include every field of an embedded parent entity, ahead of the fields
    /// declared so far. The parent's table name is ignored.
    pub fn inherit<P: Entity>(
        mut self,
        get: fn(&E) -> &P,
        get_mut: fn(&mut E) -> &mut P,
    ) -> Self {
        let mut fields: Vec<Field<E>> = P::schema()
            .fields
            .into_iter()
            .map(|f| f.project(get, get_mut))
            .collect();
        fields.append(&mut self.fields);
        self.fields = fields;
        self
    }
}

impl<E: Entity> Default for Schema<E> {
    fn default() -> Self {
        Self::new()
    }
}

fn short_type_name<E>() -> &'static str {
    let full = std::any::type_name::<E>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
