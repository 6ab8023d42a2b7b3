//! Metadata resolution for mapped types.
//!
//! Resolution runs in two phases:
//! - [`EntityStructure`]: fields, columns, identity and insert/update flags,
//!   derived from the type's own [`crate::Schema`]
//! - [`EntityMetadata`]: binders, reference codecs and SQL fragments
//!
//! A reference field only needs the phase-one record of its target, so types
//! that reference each other (or themselves) resolve without recursion.
//! Both records are cached per [`crate::Dialect`].

mod binding;
mod structure;

pub use binding::{EntityInfo, EntityMetadata, FieldMetadata};
pub use structure::{EntityStructure, FieldStructure};
