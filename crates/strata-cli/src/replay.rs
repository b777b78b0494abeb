//! Applies a script's steps to a freshly built record.

use std::sync::Arc;

use anyhow::Context as _;
use serde::Serialize;
use strata_core::{
  DataState, EditState, FieldSchema, SchemaRegistry, Value, VersionControl,
  VersionedSnapshot,
};
use uuid::Uuid;

use crate::script::{RecordDef, Script, Step, field_values};

/// What a step did to the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
  Applied,
  /// Accepted, but nothing changed.
  Unchanged,
  /// The engine refused the step; the record was left as it was.
  Rejected(String),
}

/// Record state after one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
  pub step:       usize,
  pub action:     &'static str,
  pub outcome:    Outcome,
  pub version:    u32,
  pub depth:      usize,
  pub data_state: DataState,
  pub edit_state: EditState,
}

#[derive(Debug)]
pub struct Replay {
  pub control: VersionControl,
  pub steps:   Vec<StepReport>,
}

/// Build the script's schemas and record, then apply every step in order.
///
/// Steps the engine rejects are reported and replay continues. Script
/// mistakes (unknown fields, malformed values) abort the replay.
pub fn run(script: &Script) -> anyhow::Result<Replay> {
  let registry = SchemaRegistry::new();
  script.register(&registry)?;
  let record = script.record.as_ref().context("script has no [record]")?;
  let schema = registry
    .get(&record.schema)
    .with_context(|| format!("record uses undeclared schema `{}`", record.schema))?;

  let mut control = build_record(record, schema)?;
  tracing::info!(
    record = %control.id(),
    schema = %record.schema,
    state = %control.data_state(),
    "record loaded"
  );

  let mut steps = Vec::with_capacity(script.steps.len());
  for (index, step) in script.steps.iter().enumerate() {
    let number = index + 1;
    let outcome = apply(&mut control, step)
      .with_context(|| format!("step {number} ({})", step.action()))?;
    if let Outcome::Rejected(reason) = &outcome {
      tracing::warn!(step = number, action = step.action(), %reason, "step rejected");
    } else {
      tracing::debug!(step = number, action = step.action(), ?outcome, "step done");
    }
    steps.push(StepReport {
      step: number,
      action: step.action(),
      outcome,
      version: control.version(),
      depth: control.history().depth(),
      data_state: control.data_state(),
      edit_state: control.edit_state(),
    });
  }

  Ok(Replay { control, steps })
}

fn build_record(
  record: &RecordDef,
  schema: Arc<FieldSchema>,
) -> anyhow::Result<VersionControl> {
  let mut snapshot = VersionedSnapshot::new(schema.clone());
  for (field, value) in field_values(&schema, &record.values)? {
    snapshot
      .set(field, value)
      .with_context(|| format!("initial value for `{}`", field.name()))?;
  }
  snapshot.set_version(record.version);
  snapshot.set_deletion(record.deleted);
  Ok(VersionControl::from_snapshot(
    record.id.unwrap_or_else(Uuid::new_v4),
    snapshot,
  ))
}

fn edited(result: strata_core::Result<bool>) -> Outcome {
  match result {
    Ok(true) => Outcome::Applied,
    Ok(false) => Outcome::Unchanged,
    Err(err) => Outcome::Rejected(err.to_string()),
  }
}

fn apply(control: &mut VersionControl, step: &Step) -> anyhow::Result<Outcome> {
  let schema = control.schema().clone();

  let outcome = match step {
    Step::Edit {
      version,
      values,
      clear,
    } => {
      let mut values = field_values(&schema, values)?;
      for name in clear {
        values.push((schema.require(name)?, Value::Null));
      }
      edited(control.edit(*version, |snapshot| {
        for (field, value) in values {
          snapshot.set(field, value)?;
        }
        Ok(())
      }))
    }
    Step::Delete { version } | Step::Restore { version } => {
      let deleted = matches!(step, Step::Delete { .. });
      edited(control.edit(*version, |snapshot| {
        snapshot.set_deletion(deleted);
        Ok(())
      }))
    }
    Step::Undo => {
      if !control.has_history() {
        return Ok(Outcome::Unchanged);
      }
      control.pop_history();
      Outcome::Applied
    }
    Step::Commit => {
      control.clear_history();
      Outcome::Applied
    }
    Step::Reset => {
      if !control.has_history() {
        return Ok(Outcome::Unchanged);
      }
      control.reset_history();
      Outcome::Applied
    }
    Step::Baseline { values, deleted } => {
      let mut base = VersionedSnapshot::new(schema.clone());
      for (field, value) in field_values(&schema, values)? {
        if let Err(err) = base.set(field, value) {
          return Ok(Outcome::Rejected(err.to_string()));
        }
      }
      base.set_deletion(*deleted);
      match control.set_history(&base) {
        Ok(()) => Outcome::Applied,
        Err(err) => Outcome::Rejected(err.to_string()),
      }
    }
    Step::Condense { version } => {
      let before = (control.version(), control.history().depth());
      control.condense_history(*version);
      if before == (control.version(), control.history().depth()) {
        Outcome::Unchanged
      } else {
        Outcome::Applied
      }
    }
    Step::Error { field, message } => {
      let field = schema.require(field)?;
      match control.add_error(message.as_str(), field) {
        Ok(()) => Outcome::Applied,
        Err(err) => Outcome::Rejected(err.to_string()),
      }
    }
    Step::ClearErrors => {
      control.clear_errors();
      Outcome::Applied
    }
  };
  Ok(outcome)
}
