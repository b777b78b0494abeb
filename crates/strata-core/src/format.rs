//! Display formatting for stored values, deltas and validation errors.
//!
//! Formatting is delegated to a [`ValueFormatter`], so consumers can render
//! their own domain types. `None` means "nothing to show": null values, an
//! unchanged deletion flag, an empty error set.

use std::fmt::Write as _;

use serde::Serialize;

use crate::{
  Result,
  delta::{DeltaValue, VersionDelta},
  validation::Validation,
  value::{Difference, Value},
};

/// Renders values for display.
pub trait ValueFormatter {
  /// Render a value that is known not to be encrypted.
  fn format_plain(&self, value: &Value) -> Option<String>;

  /// Render any value, formatting the plaintext under an encrypted wrapper.
  fn format(&self, value: &Value) -> Option<String> {
    match value {
      Value::Encrypted(enc) => self.format_plain(enc.plaintext()),
      plain => self.format_plain(plain),
    }
  }
}

/// Formats every built-in value type without domain knowledge.
#[derive(Debug, Clone)]
pub struct PlainFormatter {
  date_format: String,
}

impl Default for PlainFormatter {
  fn default() -> Self {
    Self {
      date_format: "%Y-%m-%d".to_string(),
    }
  }
}

impl PlainFormatter {
  /// A formatter rendering dates with a `chrono` format string. Invalid
  /// format strings fall back to ISO 8601.
  pub fn with_date_format(date_format: impl Into<String>) -> Self {
    Self {
      date_format: date_format.into(),
    }
  }
}

impl ValueFormatter for PlainFormatter {
  fn format_plain(&self, value: &Value) -> Option<String> {
    let text = match value {
      Value::Null => return None,
      Value::Text(s) | Value::Enum(s) | Value::Context(s) => s.clone(),
      Value::Bytes(b) => hex::encode(b),
      Value::Boolean(b) => return yes_no(*b),
      Value::Integer(n) => n.to_string(),
      Value::Decimal(d) => d.to_string(),
      Value::Money(m) => m.to_string(),
      Value::Date(d) => {
        let mut out = String::new();
        match write!(out, "{}", d.format(&self.date_format)) {
          Ok(()) => out,
          Err(_) => d.to_string(),
        }
      }
      Value::Timestamp(t) => t.to_rfc3339(),
      Value::Link(id) => id.to_string(),
      Value::Object(obj) => obj.to_string(),
      Value::Encrypted(enc) => return self.format_plain(enc.plaintext()),
    };
    Some(text)
  }
}

// ─── Deltas ──────────────────────────────────────────────────────────────────

/// One displayable change in a delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeltaLine {
  pub label:      String,
  pub before:     Option<String>,
  pub after:      Option<String>,
  pub difference: Difference,
}

fn yes_no(flag: bool) -> Option<String> {
  Some(String::from(if flag { "yes" } else { "no" }))
}

/// The changed positions of `delta`, rendered with `formatter`.
pub fn describe_delta(
  delta: &VersionDelta<'_>,
  formatter: &dyn ValueFormatter,
) -> Result<Vec<DeltaLine>> {
  let mut lines = Vec::new();
  for index in 1..delta.field_count() {
    let line = match delta.value_at(index)? {
      None | Some(DeltaValue::Version(_)) => continue,
      Some(DeltaValue::Deletion { was, now }) => DeltaLine {
        label:      delta.label_at(index)?.to_string(),
        before:     yes_no(was),
        after:      yes_no(now),
        difference: Difference::Different,
      },
      Some(DeltaValue::Field {
        field,
        value,
        difference,
      }) => {
        if difference.is_identical() {
          continue;
        }
        DeltaLine {
          label: field.name().to_string(),
          before: formatter.format(value),
          after: formatter.format(delta.newer().get(field)?),
          difference,
        }
      }
    };
    lines.push(line);
  }
  Ok(lines)
}

/// One `field: message; message` line per failing field, in first-failure
/// order.
pub fn describe_errors(validation: &Validation) -> Vec<String> {
  validation
    .groups()
    .into_iter()
    .map(|group| format!("{}: {}", group.field, group.messages.join("; ")))
    .collect()
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use chrono::NaiveDate;

  use super::*;
  use crate::{
    schema::{FieldSchema, FieldSpec},
    snapshot::VersionedSnapshot,
    value::{DataType, Decimal, EncryptedValue, Money},
  };

  #[test]
  fn null_is_skipped() {
    assert_eq!(PlainFormatter::default().format(&Value::Null), None);
  }

  #[test]
  fn encrypted_values_show_plaintext() {
    let f = PlainFormatter::default();
    let enc = EncryptedValue::new(Value::Integer(42), vec![0xde, 0xad]);
    assert_eq!(f.format(&Value::from(enc)).as_deref(), Some("42"));
  }

  #[test]
  fn dates_use_configured_format() {
    let d = Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    assert_eq!(
      PlainFormatter::default().format(&d).as_deref(),
      Some("2024-02-29")
    );
    assert_eq!(
      PlainFormatter::with_date_format("%d/%m/%Y")
        .format(&d)
        .as_deref(),
      Some("29/02/2024")
    );
  }

  #[test]
  fn money_and_bytes() {
    let f = PlainFormatter::default();
    let m = Value::Money(Money {
      amount:   Decimal::new(12345, 2),
      currency: "EUR".into(),
    });
    assert_eq!(f.format(&m).as_deref(), Some("123.45 EUR"));
    assert_eq!(
      f.format(&Value::Bytes(vec![0xab, 0x01])).as_deref(),
      Some("ab01")
    );
  }

  struct Shouting;

  impl ValueFormatter for Shouting {
    fn format_plain(&self, value: &Value) -> Option<String> {
      value.as_text().map(str::to_uppercase)
    }
  }

  #[test]
  fn custom_formatter_still_unwraps_encryption() {
    let enc = EncryptedValue::new(Value::from("secret"), vec![1]);
    assert_eq!(Shouting.format(&Value::from(enc)).as_deref(), Some("SECRET"));
  }

  #[test]
  fn delta_lines_list_only_changes() {
    let mut schema = FieldSchema::new("txn");
    let payee = schema.declare_field(FieldSpec::text("payee", 80)).unwrap();
    let amount = schema
      .declare_field(FieldSpec::new("amount", DataType::Integer))
      .unwrap();
    let schema = Arc::new(schema);

    let mut older = VersionedSnapshot::new(schema);
    older.set(&payee, "Grocer").unwrap();
    older.set(&amount, 10_i64).unwrap();
    let mut newer = older.clone();
    newer.set(&amount, 12_i64).unwrap();
    newer.set_deletion(true);

    let delta = VersionDelta::new(&newer, &older);
    let lines = describe_delta(&delta, &PlainFormatter::default()).unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].label, "deleted");
    assert_eq!(lines[0].after.as_deref(), Some("yes"));
    assert_eq!(lines[1].label, "amount");
    assert_eq!(lines[1].before.as_deref(), Some("10"));
    assert_eq!(lines[1].after.as_deref(), Some("12"));
  }

  #[test]
  fn error_lines_group_messages() {
    let mut schema = FieldSchema::new("txn");
    let payee = schema.declare_field(FieldSpec::text("payee", 80)).unwrap();
    let mut v = Validation::new();
    assert!(describe_errors(&v).is_empty());
    v.add_error("required", &payee).unwrap();
    v.add_error("too short", &payee).unwrap();
    assert_eq!(describe_errors(&v), vec!["payee: required; too short"]);
  }
}
