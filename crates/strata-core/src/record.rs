//! The contract a versioned record type exposes to display and business
//! layers.

use std::sync::Arc;

use crate::{
  Result,
  control::{DataState, EditState, VersionControl},
  schema::{FieldDescriptor, FieldSchema},
  value::Value,
};

/// A record type backed by a [`VersionControl`].
///
/// Record types register their schema once, typically in a
/// `std::sync::OnceLock` or a [`SchemaRegistry`](crate::SchemaRegistry), and
/// hand it to every [`VersionControl`] they create.
pub trait Record {
  fn control(&self) -> &VersionControl;

  fn control_mut(&mut self) -> &mut VersionControl;

  fn schema(&self) -> &Arc<FieldSchema> { self.control().schema() }

  fn value(&self, field: &FieldDescriptor) -> Result<&Value> {
    self.control().value(field)
  }

  /// Look up a field by name and return its current value.
  fn value_by_name(&self, name: &str) -> Result<&Value> {
    let field = self.schema().require(name)?;
    self.control().value(field)
  }

  fn data_state(&self) -> DataState { self.control().data_state() }

  fn edit_state(&self) -> EditState { self.control().edit_state() }
}
