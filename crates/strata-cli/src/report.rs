//! Text and JSON rendering of replay results and schema listings.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strata_core::{
  DataState, EditState, FieldSchema, SchemaRegistry,
  format::{DeltaLine, PlainFormatter, ValueFormatter, describe_delta, describe_errors},
  value::Difference,
};
use uuid::Uuid;

use crate::{
  replay::{Outcome, Replay, StepReport},
  settings::Settings,
};

// ─── Replay report ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct FieldValue {
  pub name:  String,
  pub value: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FrameReport {
  pub version:     u32,
  pub recorded_at: DateTime<Utc>,
  pub changes:     Vec<DeltaLine>,
}

#[derive(Debug, Serialize)]
pub struct Report {
  pub record:      Uuid,
  pub schema:      String,
  pub version:     u32,
  pub data_state:  DataState,
  pub edit_state:  EditState,
  pub fingerprint: String,
  pub values:      Vec<FieldValue>,
  pub errors:      Vec<String>,
  pub steps:       Vec<StepReport>,
  /// Most recent first. Empty unless history output is enabled.
  pub history:     Vec<FrameReport>,
  /// Changes since the baseline.
  pub changes:     Vec<DeltaLine>,
}

impl Report {
  pub fn build(replay: Replay, settings: &Settings) -> anyhow::Result<Self> {
    let formatter = PlainFormatter::with_date_format(&settings.date_format);
    let control = &replay.control;
    let current = control.current();

    let values = control
      .schema()
      .fields()
      .filter(|field| field.is_versioned())
      .map(|field| -> strata_core::Result<_> {
        Ok(FieldValue {
          name:  field.name().to_string(),
          value: formatter.format(current.get(field)?),
        })
      })
      .collect::<strata_core::Result<Vec<_>>>()?;

    let history = if settings.show_history {
      control
        .history()
        .frames()
        .map(|frame| -> strata_core::Result<_> {
          Ok(FrameReport {
            version:     frame.delta.newer().version(),
            recorded_at: frame.recorded_at,
            changes:     describe_delta(&frame.delta, &formatter)?,
          })
        })
        .collect::<strata_core::Result<Vec<_>>>()?
    } else {
      Vec::new()
    };

    let changes =
      describe_delta(&control.history().changes_since_original(), &formatter)?;

    Ok(Self {
      record: control.id(),
      schema: control.schema().name().to_string(),
      version: control.version(),
      data_state: control.data_state(),
      edit_state: control.edit_state(),
      fingerprint: current.fingerprint()?,
      values,
      errors: describe_errors(control.validation()),
      steps: replay.steps,
      history,
      changes,
    })
  }
}

fn or_dash(value: Option<&str>) -> &str { value.unwrap_or("-") }

struct Line<'a>(&'a DeltaLine);

impl fmt::Display for Line<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let line = self.0;
    write!(
      f,
      "{}: {} -> {}",
      line.label,
      or_dash(line.before.as_deref()),
      or_dash(line.after.as_deref())
    )?;
    if line.difference == Difference::SecurityDifferent {
      f.write_str(" (re-encrypted)")?;
    }
    Ok(())
  }
}

impl fmt::Display for Outcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Applied => f.write_str("applied"),
      Self::Unchanged => f.write_str("unchanged"),
      Self::Rejected(reason) => write!(f, "rejected: {reason}"),
    }
  }
}

impl fmt::Display for Report {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "record {} ({})", self.record, self.schema)?;
    writeln!(f, "  state       {} / {}", self.data_state, self.edit_state)?;
    writeln!(f, "  version     {}", self.version)?;
    writeln!(f, "  fingerprint {}", self.fingerprint)?;

    if !self.steps.is_empty() {
      writeln!(f, "\nsteps")?;
      for s in &self.steps {
        writeln!(
          f,
          "  {:>3} {:<12} v{:<4} {:<9} {:<5} depth {}  {}",
          s.step,
          s.action,
          s.version,
          s.data_state.to_string(),
          s.edit_state.to_string(),
          s.depth,
          s.outcome
        )?;
      }
    }

    let width = self.values.iter().map(|v| v.name.len()).max().unwrap_or(0);
    writeln!(f, "\nvalues")?;
    for v in &self.values {
      writeln!(f, "  {:<width$}  {}", v.name, or_dash(v.value.as_deref()))?;
    }

    if !self.errors.is_empty() {
      writeln!(f, "\nerrors")?;
      for e in &self.errors {
        writeln!(f, "  {e}")?;
      }
    }

    if !self.history.is_empty() {
      writeln!(f, "\nhistory")?;
      for frame in &self.history {
        writeln!(f, "  v{}", frame.version)?;
        for line in &frame.changes {
          writeln!(f, "    {}", Line(line))?;
        }
      }
    }

    writeln!(f, "\nchanges since baseline")?;
    if self.changes.is_empty() {
      writeln!(f, "  none")?;
    }
    for line in &self.changes {
      writeln!(f, "  {}", Line(line))?;
    }
    Ok(())
  }
}

// ─── Schema listing ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct FieldRow {
  pub name:        String,
  pub declared_in: String,
  pub data_type:   String,
  pub max_length:  Option<usize>,
  pub equality:    String,
  pub storage:     String,
  /// Value slot for versioned fields; lookup ordinal for index-only ones.
  pub index:       Option<usize>,
  pub index_only:  bool,
}

#[derive(Debug, Serialize)]
pub struct SchemaListing {
  pub name:            String,
  pub parent:          Option<String>,
  pub versioned_count: usize,
  pub fields:          Vec<FieldRow>,
}

impl SchemaListing {
  fn from_schema(schema: &FieldSchema) -> Self {
    let fields = schema
      .lineage()
      .collect::<Vec<_>>()
      .into_iter()
      .rev()
      .flat_map(|owner| {
        owner.own_fields().iter().map(move |field| FieldRow {
          name:        field.name().to_string(),
          declared_in: owner.name().to_string(),
          data_type:   field.data_type().to_string(),
          max_length:  field.max_length(),
          equality:    field.equality().to_string(),
          storage:     field.storage().to_string(),
          index:       field.index(),
          index_only:  field.is_index_only(),
        })
      })
      .collect();
    Self {
      name: schema.name().to_string(),
      parent: schema.parent().map(|p| p.name().to_string()),
      versioned_count: schema.total_versioned_count(),
      fields,
    }
  }

  /// Every schema in `registry`, in the order given by `names`.
  pub fn collect(registry: &SchemaRegistry, names: &[String]) -> Vec<Self> {
    names
      .iter()
      .filter_map(|name| registry.get(name))
      .map(|schema| Self::from_schema(&schema))
      .collect()
  }
}

impl fmt::Display for SchemaListing {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.parent {
      Some(parent) => writeln!(f, "{} extends {parent}", self.name)?,
      None => writeln!(f, "{}", self.name)?,
    }
    writeln!(f, "  {} versioned fields", self.versioned_count)?;
    for row in &self.fields {
      let slot = match (row.index, row.index_only) {
        (Some(i), true) => format!("lookup {i}"),
        (Some(i), false) => format!("slot {i}"),
        (None, _) => "-".to_string(),
      };
      let length = row.max_length.map(|n| format!("({n})")).unwrap_or_default();
      writeln!(
        f,
        "  {:<16} {:<10} {:<16} {:<10} {:<10} {}",
        row.name,
        slot,
        format!("{}{length}", row.data_type),
        row.equality,
        row.storage,
        row.declared_in
      )?;
    }
    Ok(())
  }
}
