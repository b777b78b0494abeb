//! Core of the strata versioned-record engine.
//!
//! A record type declares its fields once in a [`FieldSchema`]. Each record
//! instance owns a [`VersionControl`], which tracks successive edits as a
//! stack of [`VersionedSnapshot`]s, computes [`VersionDelta`]s between them,
//! and derives the record's [`DataState`] and [`EditState`].
//!
//! This crate holds no storage or UI code; consumers register schemas, store
//! typed values, and read back deltas and states.

pub mod control;
pub mod delta;
pub mod error;
pub mod format;
pub mod history;
pub mod record;
pub mod registry;
pub mod schema;
pub mod snapshot;
pub mod validation;
pub mod value;

pub use control::{DataState, EditState, VersionControl};
pub use delta::VersionDelta;
pub use error::{Error, Result};
pub use history::VersionHistory;
pub use record::Record;
pub use registry::SchemaRegistry;
pub use schema::{FieldDescriptor, FieldSchema, FieldSpec};
pub use snapshot::VersionedSnapshot;
pub use validation::Validation;
pub use value::{DataType, Difference, Value};
