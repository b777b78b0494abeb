//! Per-record facade over history and validation.
//!
//! [`VersionControl`] mirrors the [`VersionHistory`] operations and
//! recomputes [`DataState`] and [`EditState`] as the last step of every
//! mutation. Neither state can be set directly.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

use crate::{
  Result,
  history::VersionHistory,
  schema::{FieldDescriptor, FieldSchema},
  snapshot::VersionedSnapshot,
  validation::Validation,
  value::{Difference, Value},
};

// ─── Derived states ──────────────────────────────────────────────────────────

/// Lifecycle of a record relative to its original baseline.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum DataState {
  Clean,
  /// Created during the current session.
  New,
  Changed,
  Deleted,
  /// Created during the current session, then deleted.
  DelNew,
  /// Deleted in the baseline, live now.
  Recovered,
}

impl DataState {
  fn derive(current: &VersionedSnapshot, original: &VersionedSnapshot) -> Self {
    if original.version() > 0 {
      if current.is_deletion() { Self::DelNew } else { Self::New }
    } else if current.version() == 0 {
      Self::Clean
    } else if current.is_deletion() {
      Self::Deleted
    } else if original.is_deletion() {
      Self::Recovered
    } else {
      Self::Changed
    }
  }
}

/// State of the edit in progress.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum EditState {
  Clean,
  Dirty,
  Error,
}

impl EditState {
  fn derive(current: &VersionedSnapshot, validation: &Validation) -> Self {
    if validation.has_errors() {
      Self::Error
    } else if current.version() == 0 {
      Self::Clean
    } else {
      Self::Dirty
    }
  }
}

// ─── VersionControl ──────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct VersionControl {
  id:         Uuid,
  history:    VersionHistory,
  validation: Validation,
  data_state: DataState,
  edit_state: EditState,
}

impl VersionControl {
  /// A record with an empty baseline snapshot.
  pub fn new(id: Uuid, schema: Arc<FieldSchema>) -> Self {
    Self::from_snapshot(id, VersionedSnapshot::new(schema))
  }

  /// A record whose baseline is `snapshot`. A snapshot with a non-zero
  /// version marks a record created mid-session.
  pub fn from_snapshot(id: Uuid, snapshot: VersionedSnapshot) -> Self {
    let mut control = Self {
      id,
      history: VersionHistory::from_snapshot(snapshot),
      validation: Validation::new(),
      data_state: DataState::Clean,
      edit_state: EditState::Clean,
    };
    control.refresh_state();
    control
  }

  fn refresh_state(&mut self) {
    let current = self.history.current();
    self.data_state = DataState::derive(current, self.history.original());
    self.edit_state = EditState::derive(current, &self.validation);
  }

  // ── Accessors ─────────────────────────────────────────────────────────

  pub fn id(&self) -> Uuid { self.id }

  pub fn schema(&self) -> &Arc<FieldSchema> { self.history.current().schema() }

  pub fn current(&self) -> &VersionedSnapshot { self.history.current() }

  pub fn original(&self) -> &VersionedSnapshot { self.history.original() }

  pub fn history(&self) -> &VersionHistory { &self.history }

  pub fn validation(&self) -> &Validation { &self.validation }

  pub fn version(&self) -> u32 { self.history.version() }

  pub fn is_deleted(&self) -> bool { self.history.current().is_deletion() }

  pub fn data_state(&self) -> DataState { self.data_state }

  pub fn edit_state(&self) -> EditState { self.edit_state }

  pub fn has_history(&self) -> bool { self.history.has_history() }

  /// The current value of `field`.
  pub fn value(&self, field: &FieldDescriptor) -> Result<&Value> {
    self.history.current().get(field)
  }

  // ── Values ────────────────────────────────────────────────────────────

  pub fn set_value(
    &mut self,
    field: &FieldDescriptor,
    value: impl Into<Value>,
  ) -> Result<()> {
    let result = self.history.current_mut().set(field, value);
    self.refresh_state();
    result
  }

  /// Write several fields at once. Nothing is written unless every value is
  /// accepted.
  pub fn set_values<'f, I, V>(&mut self, values: I) -> Result<()>
  where
    I: IntoIterator<Item = (&'f FieldDescriptor, V)>,
    V: Into<Value>,
  {
    let mut next = self.history.current().clone();
    for (field, value) in values {
      next.set(field, value)?;
    }
    *self.history.current_mut() = next;
    self.refresh_state();
    Ok(())
  }

  pub fn set_deleted(&mut self, deleted: bool) {
    self.history.current_mut().set_deletion(deleted);
    self.refresh_state();
  }

  // ── History ───────────────────────────────────────────────────────────

  pub fn push_history(&mut self, version: u32) {
    self.history.push_history(version);
    self.refresh_state();
  }

  pub fn pop_history(&mut self) {
    self.history.pop_history();
    self.refresh_state();
  }

  pub fn maybe_pop_history(&mut self) -> bool {
    let changed = self.history.maybe_pop_history();
    self.refresh_state();
    changed
  }

  pub fn clear_history(&mut self) {
    self.history.clear_history();
    self.refresh_state();
  }

  pub fn reset_history(&mut self) {
    self.history.reset_history();
    self.refresh_state();
  }

  pub fn set_history(&mut self, base: &VersionedSnapshot) -> Result<()> {
    let result = self.history.set_history(base);
    self.refresh_state();
    result
  }

  pub fn condense_history(&mut self, target: u32) {
    self.history.condense_history(target);
    self.refresh_state();
  }

  pub fn field_changed(&self, field: &FieldDescriptor) -> Difference {
    self.history.field_changed(field)
  }

  /// Run one edit as version `version`.
  ///
  /// `apply` mutates the new current snapshot. If it fails the edit is
  /// rolled back and the error returned. If it changed nothing the edit is
  /// discarded and `Ok(false)` returned.
  pub fn edit<F>(&mut self, version: u32, apply: F) -> Result<bool>
  where
    F: FnOnce(&mut VersionedSnapshot) -> Result<()>,
  {
    self.history.push_history(version);
    if let Err(err) = apply(self.history.current_mut()) {
      self.history.pop_history();
      self.refresh_state();
      return Err(err);
    }
    let changed = self.history.maybe_pop_history();
    self.refresh_state();
    tracing::debug!(record = %self.id, version, changed, "edit applied");
    Ok(changed)
  }

  // ── Validation ────────────────────────────────────────────────────────

  pub fn add_error(
    &mut self,
    message: impl Into<String>,
    field: &FieldDescriptor,
  ) -> Result<()> {
    self.validation.add_error(message, field)?;
    self.refresh_state();
    Ok(())
  }

  pub fn clear_errors(&mut self) {
    self.validation.clear();
    self.refresh_state();
  }
}
