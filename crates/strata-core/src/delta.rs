//! Field-by-field difference between two snapshots, computed on request.
//!
//! Delta positions are laid out as two synthetic slots followed by one slot
//! per versioned field:
//!
//! | position | content                                     |
//! |----------|---------------------------------------------|
//! | 0        | the older snapshot's version number         |
//! | 1        | the deletion change, if the flags differ    |
//! | 2 + i    | versioned field `i`: older value + change   |

use crate::{
  Error, Result,
  schema::FieldDescriptor,
  snapshot::VersionedSnapshot,
  value::{Difference, Value},
};

const VERSION_SLOT: usize = 0;
const DELETED_SLOT: usize = 1;
const FIRST_FIELD_SLOT: usize = 2;

static NULL: Value = Value::Null;

/// One position of a [`VersionDelta`].
#[derive(Debug, Clone, PartialEq)]
pub enum DeltaValue<'a> {
  Version(u32),
  Deletion {
    was: bool,
    now: bool,
  },
  Field {
    field:      &'a FieldDescriptor,
    /// The value held by the older snapshot.
    value:      &'a Value,
    difference: Difference,
  },
}

/// A changed field, with both sides.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange<'a> {
  pub field:      &'a FieldDescriptor,
  pub before:     &'a Value,
  pub after:      &'a Value,
  pub difference: Difference,
}

/// The difference between a newer snapshot and the older one it replaced.
#[derive(Debug, Clone, Copy)]
pub struct VersionDelta<'a> {
  newer: &'a VersionedSnapshot,
  older: &'a VersionedSnapshot,
}

impl<'a> VersionDelta<'a> {
  pub fn new(newer: &'a VersionedSnapshot, older: &'a VersionedSnapshot) -> Self {
    Self { newer, older }
  }

  pub fn newer(&self) -> &'a VersionedSnapshot { self.newer }

  pub fn older(&self) -> &'a VersionedSnapshot { self.older }

  /// Two synthetic positions plus one per versioned field.
  pub fn field_count(&self) -> usize {
    FIRST_FIELD_SLOT + self.older.schema().total_versioned_count()
  }

  fn deletion_changed(&self) -> bool {
    self.newer.is_deletion() != self.older.is_deletion()
  }

  fn field_at(&self, index: usize) -> Result<&'a FieldDescriptor> {
    let slot = index
      .checked_sub(FIRST_FIELD_SLOT)
      .ok_or(Error::UnknownDeltaIndex(index))?;
    let schema: &'a _ = self.older.schema();
    schema
      .versioned_field(slot)
      .ok_or(Error::UnknownDeltaIndex(index))
  }

  /// The content of position `index`.
  ///
  /// `Ok(None)` means there is nothing to show (the deletion flag did not
  /// change). Positions past [`field_count`](Self::field_count) fail.
  pub fn value_at(&self, index: usize) -> Result<Option<DeltaValue<'a>>> {
    match index {
      VERSION_SLOT => Ok(Some(DeltaValue::Version(self.older.version()))),
      DELETED_SLOT => Ok(self.deletion_changed().then(|| DeltaValue::Deletion {
        was: self.older.is_deletion(),
        now: self.newer.is_deletion(),
      })),
      _ => {
        let field = self.field_at(index)?;
        Ok(Some(DeltaValue::Field {
          field,
          value: self.older.get(field)?,
          difference: self.older.field_changed(field, self.newer),
        }))
      }
    }
  }

  /// A short name for position `index`.
  pub fn label_at(&self, index: usize) -> Result<&'a str> {
    match index {
      VERSION_SLOT => Ok("version"),
      DELETED_SLOT => Ok("deleted"),
      _ => self.field_at(index).map(FieldDescriptor::name),
    }
  }

  /// Every versioned field whose value differs, in field order.
  pub fn changes(&self) -> impl Iterator<Item = FieldChange<'a>> + 'a {
    let (newer, older) = (self.newer, self.older);
    let schema: &'a _ = older.schema();
    schema.equality_fields().filter_map(move |field| {
      let difference = older.field_changed(field, newer);
      if difference.is_identical() {
        return None;
      }
      Some(FieldChange {
        field,
        before: older.get(field).unwrap_or(&NULL),
        after: newer.get(field).unwrap_or(&NULL),
        difference,
      })
    })
  }

  /// Number of changed fields, plus one if the deletion flag changed.
  pub fn summary(&self) -> usize {
    self.changes().count() + usize::from(self.deletion_changed())
  }

  pub fn is_empty(&self) -> bool { self.summary() == 0 }
}
