//! Declared schema subsystem
//!
//! The schema store is the sole authority on which fields a collection has,
//! what type each field is, and which enum options are known locally.
//!
//! # Design Principles
//!
//! - Loaded once at startup, read-only afterwards
//! - Declaration order is preserved
//! - Missing remote ids abort startup
//! - Option sets only grow through a human-applied migration

mod backup;
mod store;
mod types;
mod value;

pub use backup::SchemaBackup;
pub use store::{SchemaDefinition, SchemaStore};
pub use types::{CollectionSchema, FieldSpec, FieldType, OptionSet};
pub use value::{FieldMap, FieldValue};
