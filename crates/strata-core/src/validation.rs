//! Per-record validation errors.
//!
//! Business-rule failures are data, not [`crate::Error`]s: they accumulate
//! here, keyed by field, and only influence a record's
//! [`EditState`](crate::control::EditState).

use serde::Serialize;

use crate::{
  Result,
  schema::{FieldDescriptor, FieldSchema},
};

const DISPLAY_SCHEMA: &str = "validation";

#[derive(Debug, Clone, Serialize)]
pub struct ValidationError {
  pub field:   FieldDescriptor,
  pub message: String,
  /// Ordinal of the field's display group.
  #[serde(skip)]
  group:       usize,
}

/// A group of messages for one field, in the order the field first failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorGroup<'a> {
  /// Display label; the field name, qualified when another failing field
  /// already uses it.
  pub field:      &'a str,
  pub descriptor: &'a FieldDescriptor,
  pub messages:   Vec<&'a str>,
}

#[derive(Debug)]
pub struct Validation {
  /// One index-only field per distinct failing field.
  display: FieldSchema,
  errors:  Vec<ValidationError>,
}

impl Default for Validation {
  fn default() -> Self {
    Self {
      display: FieldSchema::new(DISPLAY_SCHEMA),
      errors:  Vec::new(),
    }
  }
}

impl Validation {
  pub fn new() -> Self { Self::default() }

  pub fn add_error(
    &mut self,
    message: impl Into<String>,
    field: &FieldDescriptor,
  ) -> Result<()> {
    let group = match self.errors.iter().find(|e| &e.field == field) {
      Some(existing) => existing.group,
      None => {
        // The next lookup ordinal is the one the declaration assigns.
        let group = self.display.index_only_count();
        let label = if self.display.field(field.name()).is_some() {
          format!("{}#{group}", field.name())
        } else {
          field.name().to_string()
        };
        self.display.declare_index_only_field(label)?;
        group
      }
    };
    self.errors.push(ValidationError {
      field: field.clone(),
      message: message.into(),
      group,
    });
    Ok(())
  }

  pub fn has_errors(&self) -> bool { !self.errors.is_empty() }

  pub fn has_errors_for(&self, field: &FieldDescriptor) -> bool {
    self.errors.iter().any(|e| &e.field == field)
  }

  pub fn errors(&self) -> &[ValidationError] { &self.errors }

  /// Messages for `field`, one per line, or `None` if it has none.
  pub fn errors_for(&self, field: &FieldDescriptor) -> Option<String> {
    let messages: Vec<&str> = self
      .errors
      .iter()
      .filter(|e| &e.field == field)
      .map(|e| e.message.as_str())
      .collect();
    (!messages.is_empty()).then(|| messages.join("\n"))
  }

  /// `field: message` lines for every error not attached to one of
  /// `excluded`, or `None` if nothing remains.
  pub fn errors_excluding(&self, excluded: &[FieldDescriptor]) -> Option<String> {
    let lines: Vec<String> = self
      .errors
      .iter()
      .filter(|e| !excluded.contains(&e.field))
      .map(|e| format!("{}: {}", e.field.name(), e.message))
      .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
  }

  /// Errors grouped by field for display.
  pub fn groups(&self) -> Vec<ErrorGroup<'_>> {
    self
      .display
      .fields()
      .filter_map(|display_field| {
        let group = display_field.index()?;
        let members: Vec<&ValidationError> =
          self.errors.iter().filter(|e| e.group == group).collect();
        let first = *members.first()?;
        Some(ErrorGroup {
          field:      display_field.name(),
          descriptor: &first.field,
          messages:   members.iter().map(|e| e.message.as_str()).collect(),
        })
      })
      .collect()
  }

  pub fn clear(&mut self) {
    self.errors.clear();
    self.display = FieldSchema::new(DISPLAY_SCHEMA);
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::{schema::FieldSpec, value::DataType};

  fn fields() -> (FieldDescriptor, FieldDescriptor) {
    let mut schema = FieldSchema::new("txn");
    let payee = schema.declare_field(FieldSpec::text("payee", 80)).unwrap();
    let amount = schema
      .declare_field(FieldSpec::new("amount", DataType::Integer))
      .unwrap();
    (payee, amount)
  }

  #[test]
  fn empty_validation_has_nothing_to_show() {
    let (payee, _) = fields();
    let v = Validation::new();
    assert!(!v.has_errors());
    assert!(!v.has_errors_for(&payee));
    assert_eq!(v.errors_for(&payee), None);
    assert_eq!(v.errors_excluding(&[]), None);
    assert!(v.groups().is_empty());
  }

  #[test]
  fn errors_are_keyed_by_field() {
    let (payee, amount) = fields();
    let mut v = Validation::new();
    v.add_error("payee is required", &payee).unwrap();
    v.add_error("amount must be positive", &amount).unwrap();
    v.add_error("payee is too long", &payee).unwrap();

    assert!(v.has_errors());
    assert!(v.has_errors_for(&amount));
    assert_eq!(
      v.errors_for(&payee).as_deref(),
      Some("payee is required\npayee is too long")
    );
    assert_eq!(
      v.errors_excluding(&[payee.clone()]).as_deref(),
      Some("amount: amount must be positive")
    );
    assert_eq!(v.errors_excluding(&[payee, amount]), None);
  }

  #[test]
  fn groups_follow_first_failure_order() {
    let (payee, amount) = fields();
    let mut v = Validation::new();
    v.add_error("must be positive", &amount).unwrap();
    v.add_error("required", &payee).unwrap();
    v.add_error("too large", &amount).unwrap();

    let groups = v.groups();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].field, "amount");
    assert_eq!(groups[0].messages, vec!["must be positive", "too large"]);
    assert_eq!(groups[1].field, "payee");
    assert_eq!(groups[1].descriptor, &payee);
  }

  #[test]
  fn same_named_fields_keep_separate_groups() {
    let (payee, _) = fields();
    let mut parent = FieldSchema::new("account");
    let name = parent.declare_field(FieldSpec::text("name", 64)).unwrap();
    let mut child = FieldSchema::extending("payee_account", Arc::new(parent));
    let other_payee = child.declare_field(FieldSpec::text("payee", 80)).unwrap();

    let mut v = Validation::new();
    v.add_error("required", &payee).unwrap();
    v.add_error("unknown payee", &other_payee).unwrap();
    v.add_error("too long", &payee).unwrap();
    v.add_error("required", &name).unwrap();

    let groups = v.groups();
    assert_eq!(groups.len(), 3);
    assert_eq!(groups[0].descriptor, &payee);
    assert_eq!(groups[0].messages, vec!["required", "too long"]);
    assert_eq!(groups[1].field, "payee#1");
    assert_eq!(groups[1].descriptor, &other_payee);
    assert_eq!(groups[1].messages, vec!["unknown payee"]);
    assert_eq!(groups[2].field, "name");
    assert!(v.has_errors_for(&other_payee));
    assert_eq!(v.errors_for(&other_payee).as_deref(), Some("unknown payee"));
  }

  #[test]
  fn clear_resets_everything() {
    let (payee, _) = fields();
    let mut v = Validation::new();
    v.add_error("required", &payee).unwrap();
    v.clear();
    assert!(!v.has_errors());
    assert!(v.groups().is_empty());
    v.add_error("again", &payee).unwrap();
    assert_eq!(v.groups().len(), 1);
  }
}
