//! Replay scripts: schemas, one record, and the steps applied to it.
//!
//! ```toml
//! [[schema]]
//! name = "account"
//! [[schema.field]]
//! name = "name"
//! type = "text"
//! max_length = 64
//!
//! [record]
//! schema = "account"
//! values = { name = "Checking" }
//!
//! [[step]]
//! action = "edit"
//! version = 1
//! values = { name = "Savings" }
//! ```

use std::path::Path;

use anyhow::{Context as _, bail};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use strata_core::{
  FieldDescriptor, FieldSchema, FieldSpec, SchemaRegistry, Value,
  schema::{EqualityClass, StorageClass},
  value::{DataType, Decimal, EncryptedValue, Money},
};
use uuid::Uuid;

// ─── Script model ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Script {
  /// In declaration order; parents come before their children.
  #[serde(default, rename = "schema")]
  pub schemas: Vec<SchemaDef>,
  pub record:  Option<RecordDef>,
  #[serde(default, rename = "step")]
  pub steps:   Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaDef {
  pub name:   String,
  pub parent: Option<String>,
  #[serde(default, rename = "field")]
  pub fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldDef {
  pub name:       String,
  #[serde(rename = "type")]
  pub data_type:  Option<DataType>,
  pub max_length: Option<usize>,
  #[serde(default)]
  pub equality:   EqualityClass,
  #[serde(default)]
  pub storage:    StorageClass,
  #[serde(default)]
  pub index_only: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordDef {
  pub schema:  String,
  pub id:      Option<Uuid>,
  /// A non-zero version marks a record created mid-session.
  #[serde(default)]
  pub version: u32,
  #[serde(default)]
  pub deleted: bool,
  #[serde(default)]
  pub values:  toml::Table,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
  /// Set (or clear) field values as a new version.
  Edit {
    version: u32,
    #[serde(default)]
    values:  toml::Table,
    #[serde(default)]
    clear:   Vec<String>,
  },
  Delete {
    version: u32,
  },
  Restore {
    version: u32,
  },
  /// Abandon the most recent version.
  Undo,
  /// Accept the current state as the new baseline.
  Commit,
  /// Return to the baseline.
  Reset,
  /// Install a saved snapshot as the baseline.
  Baseline {
    #[serde(default)]
    values:  toml::Table,
    #[serde(default)]
    deleted: bool,
  },
  Condense {
    version: u32,
  },
  Error {
    field:   String,
    message: String,
  },
  ClearErrors,
}

impl Step {
  pub fn action(&self) -> &'static str {
    match self {
      Self::Edit { .. } => "edit",
      Self::Delete { .. } => "delete",
      Self::Restore { .. } => "restore",
      Self::Undo => "undo",
      Self::Commit => "commit",
      Self::Reset => "reset",
      Self::Baseline { .. } => "baseline",
      Self::Condense { .. } => "condense",
      Self::Error { .. } => "error",
      Self::ClearErrors => "clear_errors",
    }
  }
}

impl Script {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading script {}", path.display()))?;
    Self::parse(&raw)
      .with_context(|| format!("parsing script {}", path.display()))
  }

  pub fn parse(raw: &str) -> anyhow::Result<Self> {
    toml::from_str(raw).context("invalid script")
  }

  /// Declare every schema into `registry`, in script order.
  pub fn register(&self, registry: &SchemaRegistry) -> anyhow::Result<()> {
    for def in &self.schemas {
      if registry.get(&def.name).is_some() {
        bail!("schema `{}` is declared twice", def.name);
      }
      let parent = match &def.parent {
        Some(name) => Some(registry.get(name).with_context(|| {
          format!("schema `{}` extends undeclared `{name}`", def.name)
        })?),
        None => None,
      };
      let declarations = def
        .fields
        .iter()
        .map(FieldDef::declaration)
        .collect::<anyhow::Result<Vec<_>>>()?;

      registry
        .get_or_register(&def.name, parent, |schema| {
          for declaration in declarations {
            match declaration {
              Declaration::Field(spec) => schema.declare_field(spec)?,
              Declaration::IndexOnly(name) => {
                schema.declare_index_only_field(name)?
              }
            };
          }
          Ok(())
        })
        .with_context(|| format!("declaring schema `{}`", def.name))?;
    }
    Ok(())
  }
}

enum Declaration {
  Field(FieldSpec),
  IndexOnly(String),
}

impl FieldDef {
  fn declaration(&self) -> anyhow::Result<Declaration> {
    if self.index_only {
      return Ok(Declaration::IndexOnly(self.name.clone()));
    }
    let data_type = self
      .data_type
      .with_context(|| format!("field `{}` has no type", self.name))?;
    Ok(Declaration::Field(FieldSpec {
      name: self.name.clone(),
      data_type,
      max_length: self.max_length,
      equality: self.equality,
      storage: self.storage,
    }))
  }
}

// ─── Values ──────────────────────────────────────────────────────────────────

/// Resolve each key of `table` against `schema` and convert its value to
/// the field's type.
pub fn field_values<'s>(
  schema: &'s FieldSchema,
  table: &toml::Table,
) -> anyhow::Result<Vec<(&'s FieldDescriptor, Value)>> {
  table
    .iter()
    .map(|(name, raw)| -> anyhow::Result<_> {
      let field = schema.require(name)?;
      let value = convert(field.data_type(), raw)
        .with_context(|| format!("value for `{name}`"))?;
      Ok((field, value))
    })
    .collect()
}

/// Convert a script value to a [`Value`] of `data_type`.
///
/// A table holding `ciphertext` (hex) and `plaintext` is stored encrypted.
/// Links accept an integer for a target that is not yet resolved.
pub fn convert(data_type: DataType, raw: &toml::Value) -> anyhow::Result<Value> {
  use toml::Value as T;

  if let T::Table(table) = raw
    && data_type != DataType::Object
    && table.contains_key("ciphertext")
  {
    return encrypted(data_type, table);
  }

  let value = match (data_type, raw) {
    (DataType::Text | DataType::Chars, T::String(s)) => Value::Text(s.clone()),
    (DataType::Enum, T::String(s)) => Value::Enum(s.clone()),
    (DataType::Context, T::String(s)) => Value::Context(s.clone()),
    (DataType::Bytes, T::String(s)) => {
      Value::Bytes(hex::decode(s).context("bytes must be hex")?)
    }
    (DataType::Boolean, T::Boolean(b)) => Value::Boolean(*b),
    (DataType::Integer, T::Integer(n)) => Value::Integer(*n),
    (DataType::Decimal, T::Integer(n)) => Value::Decimal(Decimal::new(*n, 0)),
    (DataType::Decimal, T::Float(f)) => Value::Decimal(f.to_string().parse()?),
    (DataType::Decimal, T::String(s)) => Value::Decimal(s.parse()?),
    (DataType::Money, T::String(s)) => Value::Money(parse_money(s)?),
    (DataType::Date, T::String(s)) => Value::Date(parse_date(s)?),
    (DataType::Date, T::Datetime(dt)) => Value::Date(parse_date(&dt.to_string())?),
    (DataType::Timestamp, T::String(s)) => Value::Timestamp(parse_timestamp(s)?),
    (DataType::Timestamp, T::Datetime(dt)) => {
      Value::Timestamp(parse_timestamp(&dt.to_string())?)
    }
    (DataType::Link, T::String(s)) => {
      Value::Link(s.parse().context("link must be a UUID")?)
    }
    (DataType::Link, T::Integer(n)) => Value::Integer(*n),
    (DataType::Object, other) => Value::Object(serde_json::to_value(other)?),
    (data_type, other) => {
      bail!("cannot store a {} in a {data_type} field", other.type_str())
    }
  };
  Ok(value)
}

fn encrypted(data_type: DataType, table: &toml::Table) -> anyhow::Result<Value> {
  let ciphertext = match table.get("ciphertext") {
    Some(toml::Value::String(hex)) => {
      hex::decode(hex).context("ciphertext must be hex")?
    }
    _ => bail!("ciphertext must be a hex string"),
  };
  let plaintext = match table.get("plaintext") {
    Some(raw) => convert(data_type, raw)?,
    None => Value::Null,
  };
  Ok(EncryptedValue::new(plaintext, ciphertext).into())
}

/// `"12.50 USD"`
fn parse_money(s: &str) -> anyhow::Result<Money> {
  let Some((amount, currency)) = s.trim().split_once(' ') else {
    bail!("money must look like `12.50 USD`, got `{s}`");
  };
  Ok(Money {
    amount:   amount.parse()?,
    currency: currency.trim().to_string(),
  })
}

fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .with_context(|| format!("invalid date `{s}`"))
}

fn parse_timestamp(s: &str) -> anyhow::Result<DateTime<Utc>> {
  Ok(
    DateTime::parse_from_rfc3339(s)
      .with_context(|| format!("invalid timestamp `{s}`"))?
      .with_timezone(&Utc),
  )
}

#[cfg(test)]
mod tests {
  use strata_core::format::{PlainFormatter, ValueFormatter};

  use super::*;

  const SCRIPT: &str = r#"
    [[schema]]
    name = "account"
    [[schema.field]]
    name = "name"
    type = "text"
    max_length = 64
    [[schema.field]]
    name = "opened"
    type = "date"
    equality = "comparison"

    [[schema]]
    name = "bank_account"
    parent = "account"
    [[schema.field]]
    name = "limit"
    type = "money"
    [[schema.field]]
    name = "balance"
    type = "money"
    storage = "calculated"
    equality = "derived"

    [record]
    schema = "bank_account"
    values = { name = "Checking", opened = "2023-01-15" }

    [[step]]
    action = "edit"
    version = 1
    values = { limit = "500.00 USD" }

    [[step]]
    action = "undo"
  "#;

  #[test]
  fn parses_schemas_record_and_steps() {
    let script = Script::parse(SCRIPT).unwrap();
    assert_eq!(script.schemas.len(), 2);
    assert_eq!(script.schemas[1].parent.as_deref(), Some("account"));
    assert_eq!(script.schemas[1].fields[1].storage, StorageClass::Calculated);
    assert_eq!(script.steps.len(), 2);
    assert!(matches!(script.steps[0], Step::Edit { version: 1, .. }));
    assert_eq!(script.steps[1].action(), "undo");
  }

  #[test]
  fn registers_child_after_parent() {
    let script = Script::parse(SCRIPT).unwrap();
    let registry = SchemaRegistry::new();
    script.register(&registry).unwrap();
    let child = registry.get("bank_account").unwrap();
    assert_eq!(child.total_versioned_count(), 3);
    assert_eq!(child.require("limit").unwrap().index(), Some(2));
    assert_eq!(child.require("balance").unwrap().index(), None);
  }

  #[test]
  fn undeclared_parent_is_rejected() {
    let script = Script::parse(
      r#"
        [[schema]]
        name = "child"
        parent = "missing"
      "#,
    )
    .unwrap();
    let err = script.register(&SchemaRegistry::new()).unwrap_err();
    assert!(err.to_string().contains("undeclared `missing`"));
  }

  #[test]
  fn schema_errors_surface() {
    let script = Script::parse(
      r#"
        [[schema]]
        name = "memo"
        [[schema.field]]
        name = "body"
        type = "text"
      "#,
    )
    .unwrap();
    let err = script.register(&SchemaRegistry::new()).unwrap_err();
    assert!(format!("{err:#}").contains("invalid max length"));
  }

  #[test]
  fn converts_typed_values() {
    let Value::Money(money) =
      convert(DataType::Money, &"12.50 USD".into()).unwrap()
    else {
      panic!("expected money");
    };
    assert_eq!(money.to_string(), "12.50 USD");

    let date = convert(DataType::Date, &"2024-02-29".into()).unwrap();
    assert_eq!(date.as_date(), NaiveDate::from_ymd_opt(2024, 2, 29));

    let unresolved = convert(DataType::Link, &toml::Value::Integer(7)).unwrap();
    assert_eq!(unresolved.as_integer(), Some(7));

    assert!(convert(DataType::Boolean, &"yes".into()).is_err());
    assert!(convert(DataType::Money, &"12.50".into()).is_err());
  }

  #[test]
  fn overlong_decimal_fractions_are_refused() {
    let literal = format!("0.{}1", "0".repeat(39));
    let err = convert(DataType::Decimal, &literal.as_str().into()).unwrap_err();
    assert!(format!("{err:#}").contains("decimal scale 40"));
    assert!(convert(DataType::Money, &format!("{literal} USD").as_str().into()).is_err());

    let finest = convert(DataType::Decimal, &"0.000000000000000001".into()).unwrap();
    assert_eq!(
      PlainFormatter::default().format(&finest).as_deref(),
      Some("0.000000000000000001")
    );
  }

  #[test]
  fn tables_with_ciphertext_are_encrypted() {
    let raw: toml::Value =
      toml::from_str::<toml::Table>(r#"v = { plaintext = "acct", ciphertext = "beef" }"#)
        .unwrap()
        .remove("v")
        .unwrap();
    let value = convert(DataType::Text, &raw).unwrap();
    assert!(value.is_encrypted());
    assert_eq!(value.plaintext().as_text(), Some("acct"));
  }

  #[test]
  fn unknown_fields_are_errors() {
    let mut schema = FieldSchema::new("account");
    schema.declare_field(FieldSpec::text("name", 64)).unwrap();
    let table: toml::Table = toml::from_str(r#"nickname = "x""#).unwrap();
    assert!(field_values(&schema, &table).is_err());
  }
}
