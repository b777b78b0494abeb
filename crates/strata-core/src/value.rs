//! Field data types and the tagged values stored in snapshots.
//!
//! A [`Value`] carries its own type tag. Writes are checked against the
//! declaring field's [`DataType`] by [`DataType::accepts`] before anything is
//! stored, so reads never need an unchecked cast.

use std::{
  fmt,
  hash::{Hash, Hasher},
  str::FromStr,
};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Data types ──────────────────────────────────────────────────────────────

/// The declared domain type of a field.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DataType {
  Text,
  /// Fixed-width character data; stored as text.
  Chars,
  Bytes,
  Boolean,
  Integer,
  Decimal,
  Money,
  Date,
  Timestamp,
  Enum,
  /// A reference to another record.
  Link,
  /// A reference into a domain context (e.g. a security holding).
  Context,
  /// An opaque domain object. Never safe for versioned equality.
  Object,
}

impl DataType {
  pub fn is_numeric(self) -> bool {
    matches!(self, Self::Integer | Self::Decimal | Self::Money)
  }

  /// Text-like types carry a maximum length; no other type may.
  pub fn has_length(self) -> bool {
    matches!(self, Self::Text | Self::Chars | Self::Bytes)
  }

  /// Whether `value` may be stored in a field of this type.
  ///
  /// Null and plain text are accepted everywhere. An integer stands in for a
  /// link that has not been resolved yet. Encrypted values are checked by
  /// their plaintext.
  pub fn accepts(self, value: &Value) -> bool {
    match (self, value) {
      (_, Value::Null | Value::Text(_)) => true,
      (_, Value::Encrypted(enc)) => self.accepts(&enc.plaintext),
      (Self::Link, Value::Link(_) | Value::Integer(_)) => true,
      (Self::Bytes, Value::Bytes(_))
      | (Self::Boolean, Value::Boolean(_))
      | (Self::Integer, Value::Integer(_))
      | (Self::Decimal, Value::Decimal(_))
      | (Self::Money, Value::Money(_))
      | (Self::Date, Value::Date(_))
      | (Self::Timestamp, Value::Timestamp(_))
      | (Self::Enum, Value::Enum(_))
      | (Self::Context, Value::Context(_))
      | (Self::Object, Value::Object(_)) => true,
      _ => false,
    }
  }
}

// ─── Fixed-point numbers ─────────────────────────────────────────────────────

/// A fixed-point decimal: `mantissa * 10^-scale`.
///
/// Comparison is structural, so `1.0` and `1.00` are different values.
/// Arithmetic is left to the consumer.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
pub struct Decimal {
  pub mantissa: i64,
  pub scale:    u8,
}

impl Decimal {
  /// Largest scale a parsed literal may carry: every digit of an `i64`
  /// mantissa can sit behind the point, and no more.
  pub const MAX_SCALE: u8 = 18;

  /// Unchecked constructor; any scale renders, but literals beyond
  /// [`Self::MAX_SCALE`] cannot be parsed back.
  pub fn new(mantissa: i64, scale: u8) -> Self { Self { mantissa, scale } }

  pub fn try_new(mantissa: i64, scale: u8) -> Result<Self> {
    if scale > Self::MAX_SCALE {
      return Err(Error::DecimalScale(scale));
    }
    Ok(Self { mantissa, scale })
  }
}

impl fmt::Display for Decimal {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let sign = if self.mantissa < 0 { "-" } else { "" };
    let digits = self.mantissa.unsigned_abs().to_string();
    let scale = usize::from(self.scale);
    if scale == 0 {
      return write!(f, "{sign}{digits}");
    }
    // At least one digit before the point.
    let padded = format!("{digits:0>width$}", width = scale + 1);
    let (whole, frac) = padded.split_at(padded.len() - scale);
    write!(f, "{sign}{whole}.{frac}")
  }
}

impl FromStr for Decimal {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let invalid = || Error::InvalidDecimal(s.to_string());
    let trimmed = s.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
      Some(rest) => (true, rest),
      None => (false, trimmed),
    };
    let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() && frac.is_empty() {
      return Err(invalid());
    }
    if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
      return Err(invalid());
    }
    let scale = u8::try_from(frac.len()).map_err(|_| invalid())?;
    let joined = format!("{whole}{frac}");
    let magnitude: i64 = joined.parse().map_err(|_| invalid())?;
    let mantissa = if negative { -magnitude } else { magnitude };
    Self::try_new(mantissa, scale)
  }
}

/// An amount tagged with its currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
  pub amount:   Decimal,
  pub currency: String,
}

impl fmt::Display for Money {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.amount, self.currency)
  }
}

// ─── Encrypted wrapper ───────────────────────────────────────────────────────

/// A value held together with its encrypted representation.
///
/// Two encrypted values with the same plaintext but different ciphertext
/// compare as [`Difference::SecurityDifferent`].
#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize)]
pub struct EncryptedValue {
  plaintext:  Box<Value>,
  ciphertext: Vec<u8>,
}

impl EncryptedValue {
  /// Wrap `plaintext`. Nested wrappers are flattened to their innermost
  /// plaintext.
  pub fn new(plaintext: Value, ciphertext: Vec<u8>) -> Self {
    let plaintext = match plaintext {
      Value::Encrypted(inner) => inner.plaintext,
      other => Box::new(other),
    };
    Self {
      plaintext,
      ciphertext,
    }
  }

  pub fn plaintext(&self) -> &Value { &self.plaintext }

  pub fn ciphertext(&self) -> &[u8] { &self.ciphertext }
}

// ─── Value ───────────────────────────────────────────────────────────────────

/// A single stored field value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, IntoStaticStr)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Value {
  #[default]
  Null,
  Text(String),
  Bytes(Vec<u8>),
  Boolean(bool),
  Integer(i64),
  Decimal(Decimal),
  Money(Money),
  Date(NaiveDate),
  Timestamp(DateTime<Utc>),
  Enum(String),
  Link(Uuid),
  Context(String),
  Object(serde_json::Value),
  Encrypted(EncryptedValue),
}

impl Value {
  /// The variant name, used in type-mismatch diagnostics.
  pub fn kind_name(&self) -> &'static str { self.into() }

  pub fn is_null(&self) -> bool { matches!(self, Self::Null) }

  pub fn is_encrypted(&self) -> bool { matches!(self, Self::Encrypted(_)) }

  /// The value underneath any encrypted wrapper.
  pub fn plaintext(&self) -> &Value {
    match self {
      Self::Encrypted(enc) => enc.plaintext(),
      other => other,
    }
  }

  pub fn as_text(&self) -> Option<&str> {
    match self.plaintext() {
      Self::Text(s) | Self::Enum(s) | Self::Context(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_integer(&self) -> Option<i64> {
    match self.plaintext() {
      Self::Integer(n) => Some(*n),
      _ => None,
    }
  }

  pub fn as_date(&self) -> Option<NaiveDate> {
    match self.plaintext() {
      Self::Date(d) => Some(*d),
      _ => None,
    }
  }

  /// Tri-state comparison against `other`.
  pub fn compare(&self, other: &Value) -> Difference {
    if self == other {
      Difference::Identical
    } else if self.plaintext() == other.plaintext() {
      Difference::SecurityDifferent
    } else {
      Difference::Different
    }
  }
}

impl Hash for Value {
  fn hash<H: Hasher>(&self, state: &mut H) {
    std::mem::discriminant(self).hash(state);
    match self {
      Self::Null => {}
      Self::Text(s) | Self::Enum(s) | Self::Context(s) => s.hash(state),
      Self::Bytes(b) => b.hash(state),
      Self::Boolean(b) => b.hash(state),
      Self::Integer(n) => n.hash(state),
      Self::Decimal(d) => d.hash(state),
      Self::Money(m) => m.hash(state),
      Self::Date(d) => d.hash(state),
      Self::Timestamp(t) => t.hash(state),
      Self::Link(id) => id.hash(state),
      // Compact JSON with sorted keys is stable for equal objects.
      Self::Object(obj) => obj.to_string().hash(state),
      Self::Encrypted(enc) => enc.hash(state),
    }
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self { Self::Text(s.to_string()) }
}

impl From<String> for Value {
  fn from(s: String) -> Self { Self::Text(s) }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self { Self::Boolean(b) }
}

impl From<i64> for Value {
  fn from(n: i64) -> Self { Self::Integer(n) }
}

impl From<Decimal> for Value {
  fn from(d: Decimal) -> Self { Self::Decimal(d) }
}

impl From<Money> for Value {
  fn from(m: Money) -> Self { Self::Money(m) }
}

impl From<NaiveDate> for Value {
  fn from(d: NaiveDate) -> Self { Self::Date(d) }
}

impl From<DateTime<Utc>> for Value {
  fn from(t: DateTime<Utc>) -> Self { Self::Timestamp(t) }
}

impl From<Uuid> for Value {
  fn from(id: Uuid) -> Self { Self::Link(id) }
}

impl From<EncryptedValue> for Value {
  fn from(enc: EncryptedValue) -> Self { Self::Encrypted(enc) }
}

impl<T: Into<Value>> From<Option<T>> for Value {
  fn from(opt: Option<T>) -> Self { opt.map_or(Self::Null, Into::into) }
}

// ─── Difference ──────────────────────────────────────────────────────────────

/// Outcome of comparing two values, ordered by severity.
///
/// When several fields are compared the most severe outcome wins, so a real
/// change always outranks a re-encryption.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Difference {
  #[default]
  Identical,
  /// Same plaintext, different encrypted representation.
  SecurityDifferent,
  Different,
}

impl Difference {
  pub fn is_identical(self) -> bool { self == Self::Identical }
}
