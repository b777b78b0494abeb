//! Versioned snapshots: one frozen set of field values for a record.
//!
//! A snapshot is a fixed-length value array indexed by
//! [`FieldDescriptor::index`], plus a version number and a deletion flag.
//! Only versioned fields can be read or written through it.

use std::{
  hash::{Hash, Hasher},
  sync::Arc,
};

use sha2::{Digest, Sha256};

use crate::{
  Error, Result,
  schema::{FieldDescriptor, FieldSchema},
  value::{Difference, Value},
};

#[derive(Debug, Clone)]
pub struct VersionedSnapshot {
  schema:   Arc<FieldSchema>,
  values:   Vec<Value>,
  version:  u32,
  deletion: bool,
}

impl VersionedSnapshot {
  /// An unedited baseline with every slot null.
  pub fn new(schema: Arc<FieldSchema>) -> Self {
    let values = vec![Value::Null; schema.total_versioned_count()];
    Self {
      schema,
      values,
      version: 0,
      deletion: false,
    }
  }

  pub fn schema(&self) -> &Arc<FieldSchema> { &self.schema }

  pub fn version(&self) -> u32 { self.version }

  pub fn set_version(&mut self, version: u32) { self.version = version; }

  pub fn is_deletion(&self) -> bool { self.deletion }

  pub fn set_deletion(&mut self, deletion: bool) { self.deletion = deletion; }

  /// Number of value slots held.
  pub fn slot_count(&self) -> usize { self.values.len() }

  /// All slots in index order.
  pub fn values(&self) -> &[Value] { &self.values }

  // ── Field access ──────────────────────────────────────────────────────

  fn slot(&self, field: &FieldDescriptor) -> Result<usize> {
    let index = match field.index() {
      Some(index) if field.is_versioned() => index,
      _ => return Err(Error::NotVersioned(field.name().to_string())),
    };
    if !self.schema.contains(field) || index >= self.values.len() {
      return Err(Error::ForeignField {
        schema: self.schema.name().to_string(),
        field:  field.name().to_string(),
      });
    }
    Ok(index)
  }

  pub fn get(&self, field: &FieldDescriptor) -> Result<&Value> {
    let index = self.slot(field)?;
    Ok(&self.values[index])
  }

  /// Store `value` in `field`'s slot after checking it against the field's
  /// declared type.
  pub fn set(
    &mut self,
    field: &FieldDescriptor,
    value: impl Into<Value>,
  ) -> Result<()> {
    let index = self.slot(field)?;
    let value = value.into();
    if !field.data_type().accepts(&value) {
      return Err(Error::TypeMismatch {
        field:    field.name().to_string(),
        expected: field.data_type(),
        found:    value.kind_name(),
      });
    }
    self.values[index] = value;
    Ok(())
  }

  /// Copy the deletion flag and as many values as both snapshots hold from
  /// `other`. The version number is left alone.
  pub fn copy_values_from(&mut self, other: &VersionedSnapshot) {
    let shared = self.values.len().min(other.values.len());
    self.values[..shared].clone_from_slice(&other.values[..shared]);
    self.deletion = other.deletion;
  }

  /// Re-bind this snapshot to `schema`, which must be the bound schema or a
  /// descendant of it. Existing values are kept; slots the new schema adds
  /// start out null.
  pub fn upgrade(&self, schema: Arc<FieldSchema>) -> Result<Self> {
    if !schema.descends_from(&self.schema) {
      return Err(Error::IncompatibleSchema {
        expected: self.schema.name().to_string(),
        found:    schema.name().to_string(),
      });
    }
    let mut upgraded = Self::new(schema);
    upgraded.copy_values_from(self);
    upgraded.version = self.version;
    Ok(upgraded)
  }

  // ── Comparison ────────────────────────────────────────────────────────

  /// The most severe difference across every equality-eligible field, the
  /// deletion flag, and the slot count.
  pub fn differs(&self, other: &VersionedSnapshot) -> Difference {
    if self.deletion != other.deletion
      || self.values.len() != other.values.len()
    {
      return Difference::Different;
    }
    let mut worst = Difference::Identical;
    for field in self.schema.equality_fields() {
      worst = worst.max(self.field_changed(field, other));
      if worst == Difference::Different {
        break;
      }
    }
    worst
  }

  /// Compare one field against `other`. Non-versioned and derived fields
  /// are always identical.
  pub fn field_changed(
    &self,
    field: &FieldDescriptor,
    other: &VersionedSnapshot,
  ) -> Difference {
    if !field.is_equality_eligible() {
      return Difference::Identical;
    }
    match (self.get(field), other.get(field)) {
      (Ok(mine), Ok(theirs)) => mine.compare(theirs),
      // One side cannot hold the field at all.
      (Ok(_), Err(_)) | (Err(_), Ok(_)) => Difference::Different,
      (Err(_), Err(_)) => Difference::Identical,
    }
  }

  /// A SHA-256 hex digest over the deletion flag and every
  /// equality-eligible value, in field order.
  pub fn fingerprint(&self) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update([u8::from(self.deletion)]);
    for field in self.schema.equality_fields() {
      let value = self.get(field)?;
      hasher.update(field.name().as_bytes());
      hasher.update(serde_json::to_vec(value)?);
    }
    Ok(hex::encode(hasher.finalize()))
  }
}

impl PartialEq for VersionedSnapshot {
  fn eq(&self, other: &Self) -> bool {
    self.differs(other) == Difference::Identical
  }
}

impl Eq for VersionedSnapshot {}

impl Hash for VersionedSnapshot {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.deletion.hash(state);
    for field in self.schema.equality_fields() {
      if let Some(value) = field.index().and_then(|i| self.values.get(i)) {
        value.hash(state);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{collections::hash_map::DefaultHasher, hash::Hash};

  use chrono::NaiveDate;

  use super::*;
  use crate::{
    schema::{EqualityClass, FieldSpec, StorageClass},
    value::{DataType, EncryptedValue},
  };

  struct Fixture {
    schema:  Arc<FieldSchema>,
    payee:   FieldDescriptor,
    date:    FieldDescriptor,
    cleared: FieldDescriptor,
    balance: FieldDescriptor,
  }

  fn fixture() -> Fixture {
    let mut schema = FieldSchema::new("txn");
    let payee = schema.declare_field(FieldSpec::text("payee", 80)).unwrap();
    let date = schema
      .declare_field(
        FieldSpec::new("date", DataType::Date)
          .equality(EqualityClass::Comparison),
      )
      .unwrap();
    let cleared = schema
      .declare_field(
        FieldSpec::new("cleared", DataType::Boolean)
          .equality(EqualityClass::Derived),
      )
      .unwrap();
    let balance = schema
      .declare_field(
        FieldSpec::new("balance", DataType::Money)
          .storage(StorageClass::Calculated)
          .equality(EqualityClass::Derived),
      )
      .unwrap();
    Fixture {
      schema: Arc::new(schema),
      payee,
      date,
      cleared,
      balance,
    }
  }

  fn hash_of(s: &VersionedSnapshot) -> u64 {
    let mut h = DefaultHasher::new();
    s.hash(&mut h);
    h.finish()
  }

  #[test]
  fn get_and_set_versioned_field() {
    let fx = fixture();
    let mut snap = VersionedSnapshot::new(fx.schema.clone());
    assert_eq!(snap.get(&fx.payee).unwrap(), &Value::Null);
    snap.set(&fx.payee, "Grocer").unwrap();
    assert_eq!(snap.get(&fx.payee).unwrap().as_text(), Some("Grocer"));
  }

  #[test]
  fn non_versioned_field_access_fails() {
    let fx = fixture();
    let mut snap = VersionedSnapshot::new(fx.schema.clone());
    assert!(matches!(snap.get(&fx.balance), Err(Error::NotVersioned(_))));
    assert!(matches!(
      snap.set(&fx.balance, Value::Null),
      Err(Error::NotVersioned(_))
    ));
  }

  #[test]
  fn foreign_field_access_fails() {
    let fx = fixture();
    let other = fixture();
    let snap = VersionedSnapshot::new(fx.schema.clone());
    assert!(matches!(
      snap.get(&other.payee),
      Err(Error::ForeignField { .. })
    ));
  }

  #[test]
  fn type_mismatch_rejected() {
    let fx = fixture();
    let mut snap = VersionedSnapshot::new(fx.schema.clone());
    let err = snap.set(&fx.date, Value::Integer(3)).unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { found: "integer", .. }));
    // Text is always accepted.
    snap.set(&fx.date, "someday").unwrap();
  }

  #[test]
  fn clone_is_equal_and_independent() {
    let fx = fixture();
    let mut snap = VersionedSnapshot::new(fx.schema.clone());
    snap.set(&fx.payee, "Grocer").unwrap();
    let mut copy = snap.clone();
    assert_eq!(copy, snap);
    assert_eq!(hash_of(&copy), hash_of(&snap));
    copy.set(&fx.payee, "Bakery").unwrap();
    assert_eq!(snap.get(&fx.payee).unwrap().as_text(), Some("Grocer"));
    assert_ne!(copy, snap);
  }

  #[test]
  fn derived_fields_do_not_affect_equality() {
    let fx = fixture();
    let a = VersionedSnapshot::new(fx.schema.clone());
    let mut b = a.clone();
    b.set(&fx.cleared, true).unwrap();
    assert_eq!(a, b);
    assert_eq!(hash_of(&a), hash_of(&b));
    assert_eq!(a.differs(&b), Difference::Identical);
    assert_eq!(a.field_changed(&fx.cleared, &b), Difference::Identical);
  }

  #[test]
  fn equality_and_comparison_fields_affect_equality() {
    let fx = fixture();
    let a = VersionedSnapshot::new(fx.schema.clone());
    let mut b = a.clone();
    b.set(&fx.payee, "Grocer").unwrap();
    assert_ne!(a, b);
    assert_ne!(hash_of(&a), hash_of(&b));
    assert_eq!(a.differs(&b), Difference::Different);

    let mut c = a.clone();
    c.set(&fx.date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
      .unwrap();
    assert_ne!(a, c);
    assert_ne!(hash_of(&a), hash_of(&c));
  }

  #[test]
  fn deletion_flag_breaks_equality() {
    let fx = fixture();
    let a = VersionedSnapshot::new(fx.schema.clone());
    let mut b = a.clone();
    b.set_deletion(true);
    assert_eq!(a.differs(&b), Difference::Different);
    assert_ne!(a, b);
  }

  #[test]
  fn reencryption_reported_as_security_difference() {
    let fx = fixture();
    let mut a = VersionedSnapshot::new(fx.schema.clone());
    a.set(&fx.payee, EncryptedValue::new("Grocer".into(), vec![1]))
      .unwrap();
    let mut b = a.clone();
    b.set(&fx.payee, EncryptedValue::new("Grocer".into(), vec![2]))
      .unwrap();
    assert_eq!(a.differs(&b), Difference::SecurityDifferent);
    assert_eq!(a.field_changed(&fx.payee, &b), Difference::SecurityDifferent);
    assert_ne!(a, b);

    // A real change elsewhere outranks it.
    b.set(&fx.date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
      .unwrap();
    assert_eq!(a.differs(&b), Difference::Different);
  }

  #[test]
  fn upgrade_keeps_values_and_adds_null_slots() {
    let fx = fixture();
    let mut snap = VersionedSnapshot::new(fx.schema.clone());
    snap.set(&fx.payee, "Grocer").unwrap();
    snap.set_version(4);

    let mut child = FieldSchema::extending("split", fx.schema.clone());
    let memo = child.declare_field(FieldSpec::text("memo", 200)).unwrap();
    let child = Arc::new(child);

    let up = snap.upgrade(child.clone()).unwrap();
    assert_eq!(up.slot_count(), 4);
    assert_eq!(up.version(), 4);
    assert_eq!(up.get(&fx.payee).unwrap().as_text(), Some("Grocer"));
    assert!(up.get(&memo).unwrap().is_null());

    let unrelated = fixture();
    assert!(matches!(
      snap.upgrade(unrelated.schema),
      Err(Error::IncompatibleSchema { .. })
    ));
  }

  #[test]
  fn slot_count_mismatch_is_different() {
    let fx = fixture();
    let snap = VersionedSnapshot::new(fx.schema.clone());
    let mut child = FieldSchema::extending("split", fx.schema.clone());
    child.declare_field(FieldSpec::text("memo", 200)).unwrap();
    let up = snap.upgrade(Arc::new(child)).unwrap();
    assert_eq!(snap.differs(&up), Difference::Different);
  }

  #[test]
  fn fingerprint_ignores_derived_fields() {
    let fx = fixture();
    let a = VersionedSnapshot::new(fx.schema.clone());
    let mut b = a.clone();
    b.set(&fx.cleared, true).unwrap();
    assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    b.set(&fx.payee, "Grocer").unwrap();
    assert_ne!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    assert_eq!(a.fingerprint().unwrap().len(), 64);
  }
}
