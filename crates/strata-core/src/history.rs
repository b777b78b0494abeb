//! Undo-capable edit history for one record instance.
//!
//! The history keeps the live `current` snapshot, a stack of the snapshots
//! it replaced, and the `original` baseline. Each stack frame's delta is
//! derived from the frame and the snapshot that replaced it (the frame above,
//! or `current` for the top frame), so a frame and its delta can never drift
//! apart.
//!
//! `original` is tracked by identity rather than by value: it *is* `current`
//! until the first push, then lives in the stack frame that `current` was
//! pushed into. Popping that frame makes it `current` again.

use std::mem;

use chrono::{DateTime, Utc};

use crate::{
  Error, Result,
  delta::VersionDelta,
  schema::{FieldDescriptor, FieldSchema},
  snapshot::VersionedSnapshot,
  value::Difference,
};

#[derive(Debug, Clone)]
struct Frame {
  snapshot:    VersionedSnapshot,
  recorded_at: DateTime<Utc>,
}

/// Where the `original` snapshot currently lives.
#[derive(Debug, Clone)]
enum Origin {
  Current,
  /// Index into the stack, counted from the bottom.
  Frame(usize),
  /// Dropped from the stack by a condense but still the baseline.
  Detached(VersionedSnapshot),
}

/// A borrowed view of one stack frame.
#[derive(Debug, Clone, Copy)]
pub struct HistoryFrame<'a> {
  pub snapshot:    &'a VersionedSnapshot,
  pub recorded_at: DateTime<Utc>,
  /// From this frame to the snapshot that replaced it.
  pub delta:       VersionDelta<'a>,
}

#[derive(Debug, Clone)]
pub struct VersionHistory {
  current: VersionedSnapshot,
  origin:  Origin,
  stack:   Vec<Frame>,
}

impl VersionHistory {
  pub fn new(schema: std::sync::Arc<FieldSchema>) -> Self {
    Self::from_snapshot(VersionedSnapshot::new(schema))
  }

  /// Start a history whose baseline is `snapshot`.
  pub fn from_snapshot(snapshot: VersionedSnapshot) -> Self {
    Self {
      current: snapshot,
      origin:  Origin::Current,
      stack:   Vec::new(),
    }
  }

  // ── Accessors ─────────────────────────────────────────────────────────

  pub fn current(&self) -> &VersionedSnapshot { &self.current }

  /// The snapshot being edited. Callers mutate it in place after
  /// [`push_history`](Self::push_history).
  pub fn current_mut(&mut self) -> &mut VersionedSnapshot { &mut self.current }

  pub fn original(&self) -> &VersionedSnapshot {
    match &self.origin {
      Origin::Current => &self.current,
      Origin::Frame(i) => &self.stack[*i].snapshot,
      Origin::Detached(snapshot) => snapshot,
    }
  }

  pub fn version(&self) -> u32 { self.current.version() }

  pub fn has_history(&self) -> bool { !self.stack.is_empty() }

  /// Number of frames on the stack.
  pub fn depth(&self) -> usize { self.stack.len() }

  /// The delta for the frame `depth` positions below the top (0 = most
  /// recent).
  pub fn delta(&self, depth: usize) -> Option<VersionDelta<'_>> {
    let index = self.stack.len().checked_sub(depth + 1)?;
    Some(self.delta_at(index))
  }

  fn delta_at(&self, index: usize) -> VersionDelta<'_> {
    let newer = self
      .stack
      .get(index + 1)
      .map_or(&self.current, |frame| &frame.snapshot);
    VersionDelta::new(newer, &self.stack[index].snapshot)
  }

  /// Frames from most recent to oldest, each with its delta.
  pub fn frames(&self) -> impl Iterator<Item = HistoryFrame<'_>> + '_ {
    (0..self.stack.len()).rev().map(|index| HistoryFrame {
      snapshot:    &self.stack[index].snapshot,
      recorded_at: self.stack[index].recorded_at,
      delta:       self.delta_at(index),
    })
  }

  /// Deltas from most recent to oldest, aligned with [`frames`](Self::frames).
  pub fn deltas(&self) -> impl Iterator<Item = VersionDelta<'_>> + '_ {
    self.frames().map(|frame| frame.delta)
  }

  /// Everything that changed between `original` and `current`.
  pub fn changes_since_original(&self) -> VersionDelta<'_> {
    VersionDelta::new(&self.current, self.original())
  }

  // ── Mutations ─────────────────────────────────────────────────────────

  /// Start a new edit: `current` is pushed onto the stack and replaced by a
  /// copy carrying `version`.
  pub fn push_history(&mut self, version: u32) {
    let mut next = self.current.clone();
    next.set_version(version);
    let previous = mem::replace(&mut self.current, next);
    if matches!(self.origin, Origin::Current) {
      self.origin = Origin::Frame(self.stack.len());
    }
    self.stack.push(Frame {
      snapshot:    previous,
      recorded_at: Utc::now(),
    });
    tracing::trace!(version, depth = self.stack.len(), "pushed history");
  }

  /// Abandon the edit in progress and restore the snapshot below it.
  /// Does nothing when there is no history.
  pub fn pop_history(&mut self) {
    let Some(frame) = self.stack.pop() else {
      return;
    };
    self.current = frame.snapshot;
    if let Origin::Frame(i) = self.origin
      && i == self.stack.len()
    {
      self.origin = Origin::Current;
    }
    tracing::trace!(depth = self.stack.len(), "popped history");
  }

  /// Keep the edit in progress only if it changed something.
  ///
  /// Returns `true` when `current` differs from the frame below it. An
  /// identical edit is popped and `false` returned, as is an empty history.
  pub fn maybe_pop_history(&mut self) -> bool {
    let Some(top) = self.stack.last() else {
      return false;
    };
    if self.current.differs(&top.snapshot).is_identical() {
      self.pop_history();
      false
    } else {
      true
    }
  }

  /// Accept `current` as the new baseline at version 0.
  pub fn clear_history(&mut self) {
    self.stack.clear();
    self.origin = Origin::Current;
    self.current.set_version(0);
    tracing::trace!("cleared history");
  }

  /// Abandon every edit and return to `original`.
  pub fn reset_history(&mut self) {
    match mem::replace(&mut self.origin, Origin::Current) {
      Origin::Current => {}
      Origin::Frame(i) => self.current = self.stack.swap_remove(i).snapshot,
      Origin::Detached(snapshot) => self.current = snapshot,
    }
    self.stack.clear();
    tracing::trace!(version = self.current.version(), "reset history");
  }

  /// Install `base` as an explicit baseline below `current`.
  ///
  /// The baseline is a copy of `current` overwritten with `base`'s values and
  /// deletion flag; it becomes `original` and the top stack frame, and
  /// `current` moves to version 1.
  pub fn set_history(&mut self, base: &VersionedSnapshot) -> Result<()> {
    let (mine, theirs) = (self.current.schema(), base.schema());
    if !mine.descends_from(theirs) && !theirs.descends_from(mine) {
      return Err(Error::IncompatibleSchema {
        expected: mine.name().to_string(),
        found:    theirs.name().to_string(),
      });
    }
    let mut baseline = self.current.clone();
    baseline.copy_values_from(base);
    self.origin = Origin::Frame(self.stack.len());
    self.stack.push(Frame {
      snapshot:    baseline,
      recorded_at: Utc::now(),
    });
    self.current.set_version(1);
    Ok(())
  }

  /// Collapse every frame at or above `target` into `current`, which then
  /// carries `target` as its version. Does nothing unless `current` is newer
  /// than `target`.
  ///
  /// `original` is unaffected; if its frame is dropped it stays the
  /// baseline.
  pub fn condense_history(&mut self, target: u32) {
    if self.current.version() <= target {
      return;
    }
    let mut removed = 0usize;
    while self
      .stack
      .last()
      .is_some_and(|frame| frame.snapshot.version() >= target)
    {
      let Some(frame) = self.stack.pop() else {
        break;
      };
      if let Origin::Frame(i) = self.origin
        && i == self.stack.len()
      {
        self.origin = Origin::Detached(frame.snapshot);
      }
      removed += 1;
    }
    self.current.set_version(target);
    tracing::debug!(target, removed, depth = self.stack.len(), "condensed history");
  }

  /// How `field` differs between `current` and `original`.
  pub fn field_changed(&self, field: &FieldDescriptor) -> Difference {
    if !field.is_equality_eligible() {
      return Difference::Identical;
    }
    self.current.field_changed(field, self.original())
  }
}
