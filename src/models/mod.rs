//! Mapping model: entity declarations, field values and references.
//!
//! This module re-exports the types a mapped struct needs to describe itself.

pub mod entity;
pub mod reference;
pub mod value;

pub use entity::{Entity, Field, Schema, SqlEnum};
pub use reference::RefSlot;
pub use value::{FieldValue, IdKey, Value, ValueKind};
