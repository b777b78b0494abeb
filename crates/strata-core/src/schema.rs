//! Field schemas: the declared shape of a record type.
//!
//! A [`FieldSchema`] is built once with `&mut self` declarations and then
//! shared behind an [`Arc`]. Once shared it can no longer be mutated, so
//! every snapshot bound to it sees the same field layout for its whole life.
//!
//! Schemas may extend a parent. Inherited fields come first when iterating
//! and keep their value indices; the child's versioned fields continue the
//! numbering where the parent stopped.

use std::{fmt, hash::Hash, iter, sync::Arc};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result, value::DataType};

// ─── Identity ────────────────────────────────────────────────────────────────

/// Process-assigned identity of a schema. Schemas are never compared
/// structurally.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
  Deserialize,
)]
pub struct SchemaId(Uuid);

impl SchemaId {
  fn generate() -> Self { Self(Uuid::new_v4()) }
}

impl fmt::Display for SchemaId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

// ─── Field classes ───────────────────────────────────────────────────────────

/// Whether a field takes part in equality, hashing and diffing.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EqualityClass {
  /// Computed from other fields; never compared.
  Derived,
  #[default]
  Equality,
  /// Compared, and also usable for ordering. Implies `Equality`.
  Comparison,
}

impl EqualityClass {
  pub fn participates_in_equality(self) -> bool { self != Self::Derived }
}

/// Where a field's value lives.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StorageClass {
  /// Held by the record itself, outside any snapshot.
  Local,
  /// Tracked per snapshot; occupies a slot in the value array.
  #[default]
  Versioned,
  /// Computed on demand for display.
  Calculated,
}

// ─── FieldSpec ───────────────────────────────────────────────────────────────

/// Input to [`FieldSchema::declare_field`].
#[derive(Debug, Clone)]
pub struct FieldSpec {
  pub name:       String,
  pub data_type:  DataType,
  pub max_length: Option<usize>,
  pub equality:   EqualityClass,
  pub storage:    StorageClass,
}

impl FieldSpec {
  /// A versioned, equality-compared field with no max length.
  pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
    Self {
      name: name.into(),
      data_type,
      max_length: None,
      equality: EqualityClass::default(),
      storage: StorageClass::default(),
    }
  }

  /// A versioned text field of at most `max_length` characters.
  pub fn text(name: impl Into<String>, max_length: usize) -> Self {
    Self::new(name, DataType::Text).max_length(max_length)
  }

  pub fn max_length(mut self, max_length: usize) -> Self {
    self.max_length = Some(max_length);
    self
  }

  pub fn equality(mut self, equality: EqualityClass) -> Self {
    self.equality = equality;
    self
  }

  pub fn storage(mut self, storage: StorageClass) -> Self {
    self.storage = storage;
    self
  }

  fn check(&self) -> Result<()> {
    if self.data_type.has_length() != self.max_length.is_some() {
      return Err(Error::InvalidMaxLength {
        field:      self.name.clone(),
        data_type:  self.data_type,
        max_length: self.max_length,
      });
    }
    if self.data_type == DataType::Object
      && self.equality.participates_in_equality()
      && self.storage == StorageClass::Versioned
    {
      return Err(Error::UnsafeObjectEquality(self.name.clone()));
    }
    Ok(())
  }
}

// ─── FieldDescriptor ─────────────────────────────────────────────────────────

/// A declared field. Identity is (owning schema, name, index); two
/// descriptors from different schemas are never equal.
#[derive(Debug, Clone, Serialize)]
pub struct FieldDescriptor {
  schema:     SchemaId,
  name:       String,
  data_type:  DataType,
  max_length: Option<usize>,
  equality:   EqualityClass,
  storage:    StorageClass,
  /// Slot in the snapshot value array (versioned) or lookup ordinal
  /// (index-only). `None` for local and calculated fields.
  index:      Option<usize>,
  index_only: bool,
}

impl FieldDescriptor {
  pub fn schema_id(&self) -> SchemaId { self.schema }

  pub fn name(&self) -> &str { &self.name }

  pub fn data_type(&self) -> DataType { self.data_type }

  pub fn max_length(&self) -> Option<usize> { self.max_length }

  pub fn equality(&self) -> EqualityClass { self.equality }

  pub fn storage(&self) -> StorageClass { self.storage }

  pub fn index(&self) -> Option<usize> { self.index }

  pub fn is_versioned(&self) -> bool { self.storage == StorageClass::Versioned }

  pub fn is_index_only(&self) -> bool { self.index_only }

  /// Versioned and not derived: the field takes part in equality, hashing
  /// and deltas.
  pub fn is_equality_eligible(&self) -> bool {
    self.is_versioned() && self.equality.participates_in_equality()
  }
}

impl PartialEq for FieldDescriptor {
  fn eq(&self, other: &Self) -> bool {
    self.schema == other.schema
      && self.name == other.name
      && self.index == other.index
  }
}

impl Eq for FieldDescriptor {}

impl Hash for FieldDescriptor {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
    self.schema.hash(state);
    self.name.hash(state);
    self.index.hash(state);
  }
}

// ─── FieldSchema ─────────────────────────────────────────────────────────────

/// The fields of one record type.
#[derive(Debug)]
pub struct FieldSchema {
  id:                    SchemaId,
  name:                  String,
  parent:                Option<Arc<FieldSchema>>,
  fields:                Vec<FieldDescriptor>,
  next_value_index:      usize,
  next_lookup_index:     usize,
  has_comparison_fields: bool,
  has_versioned_fields:  bool,
  has_index_only_fields: bool,
}

impl FieldSchema {
  /// A root schema with no fields.
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      id: SchemaId::generate(),
      name: name.into(),
      parent: None,
      fields: Vec::new(),
      next_value_index: 0,
      next_lookup_index: 0,
      has_comparison_fields: false,
      has_versioned_fields: false,
      has_index_only_fields: false,
    }
  }

  /// A schema inheriting every field of `parent`.
  pub fn extending(name: impl Into<String>, parent: Arc<FieldSchema>) -> Self {
    Self {
      id: SchemaId::generate(),
      name: name.into(),
      next_value_index: parent.next_value_index,
      next_lookup_index: parent.next_lookup_index,
      has_comparison_fields: parent.has_comparison_fields,
      has_versioned_fields: parent.has_versioned_fields,
      has_index_only_fields: parent.has_index_only_fields,
      parent: Some(parent),
      fields: Vec::new(),
    }
  }

  pub fn id(&self) -> SchemaId { self.id }

  pub fn name(&self) -> &str { &self.name }

  pub fn parent(&self) -> Option<&Arc<FieldSchema>> { self.parent.as_ref() }

  pub fn has_comparison_fields(&self) -> bool { self.has_comparison_fields }

  pub fn has_versioned_fields(&self) -> bool { self.has_versioned_fields }

  pub fn has_index_only_fields(&self) -> bool { self.has_index_only_fields }

  /// Number of value slots a snapshot of this schema holds, inherited
  /// fields included.
  pub fn total_versioned_count(&self) -> usize { self.next_value_index }

  /// Number of index-only fields, inherited fields included.
  pub fn index_only_count(&self) -> usize { self.next_lookup_index }

  // ── Declaration ───────────────────────────────────────────────────────

  /// Declare a field described by `spec`.
  ///
  /// Versioned fields receive the next free value index; all other fields
  /// carry no index.
  pub fn declare_field(&mut self, spec: FieldSpec) -> Result<FieldDescriptor> {
    self.ensure_unique(&spec.name)?;
    if spec.storage == StorageClass::Versioned && self.has_index_only_fields {
      return Err(Error::VersionedAfterIndexOnly {
        schema: self.name.clone(),
        field:  spec.name,
      });
    }
    spec.check()?;

    let index = if spec.storage == StorageClass::Versioned {
      let index = self.next_value_index;
      self.next_value_index += 1;
      self.has_versioned_fields = true;
      Some(index)
    } else {
      None
    };
    if spec.equality == EqualityClass::Comparison {
      self.has_comparison_fields = true;
    }

    let descriptor = FieldDescriptor {
      schema: self.id,
      name: spec.name,
      data_type: spec.data_type,
      max_length: spec.max_length,
      equality: spec.equality,
      storage: spec.storage,
      index,
      index_only: false,
    };
    tracing::debug!(
      schema = %self.name,
      field = %descriptor.name,
      index = ?descriptor.index,
      "declared field"
    );
    self.fields.push(descriptor.clone());
    Ok(descriptor)
  }

  /// Declare a field whose value is looked up externally by its ordinal
  /// rather than stored in a snapshot.
  pub fn declare_index_only_field(
    &mut self,
    name: impl Into<String>,
  ) -> Result<FieldDescriptor> {
    let name = name.into();
    self.ensure_unique(&name)?;
    if self.has_versioned_fields {
      return Err(Error::IndexOnlyAfterVersioned {
        schema: self.name.clone(),
        field:  name,
      });
    }

    let index = self.next_lookup_index;
    self.next_lookup_index += 1;
    self.has_index_only_fields = true;

    let descriptor = FieldDescriptor {
      schema: self.id,
      name,
      data_type: DataType::Object,
      max_length: None,
      equality: EqualityClass::Derived,
      storage: StorageClass::Local,
      index: Some(index),
      index_only: true,
    };
    self.fields.push(descriptor.clone());
    Ok(descriptor)
  }

  fn ensure_unique(&self, name: &str) -> Result<()> {
    if self.field(name).is_some() {
      return Err(Error::DuplicateField {
        schema: self.name.clone(),
        field:  name.to_string(),
      });
    }
    Ok(())
  }

  // ── Iteration & lookup ────────────────────────────────────────────────

  /// This schema followed by its ancestors, nearest first.
  pub fn lineage(&self) -> impl Iterator<Item = &FieldSchema> + '_ {
    iter::successors(Some(self), |schema| schema.parent.as_deref())
  }

  /// Every field in the chain: the root ancestor's first, then each
  /// descendant's, in declaration order.
  pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> + '_ {
    let mut chain: Vec<&FieldSchema> = self.lineage().collect();
    chain.reverse();
    chain.into_iter().flat_map(|schema| schema.fields.iter())
  }

  /// Fields declared on this schema only, excluding inherited ones.
  pub fn own_fields(&self) -> &[FieldDescriptor] { &self.fields }

  /// Fields that take part in equality, hashing and deltas.
  pub fn equality_fields(&self) -> impl Iterator<Item = &FieldDescriptor> + '_ {
    self.fields().filter(|f| f.is_equality_eligible())
  }

  pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
    self
      .lineage()
      .flat_map(|schema| schema.fields.iter())
      .find(|f| f.name == name)
  }

  /// Look up a field by name, failing with [`Error::UnknownField`].
  pub fn require(&self, name: &str) -> Result<&FieldDescriptor> {
    self
      .field(name)
      .ok_or_else(|| Error::UnknownField(name.to_string()))
  }

  /// The versioned field occupying value slot `index`.
  pub fn versioned_field(&self, index: usize) -> Option<&FieldDescriptor> {
    self
      .lineage()
      .flat_map(|schema| schema.fields.iter())
      .find(|f| f.is_versioned() && f.index == Some(index))
  }

  /// Whether `field` was declared on this schema or one of its ancestors.
  pub fn contains(&self, field: &FieldDescriptor) -> bool {
    self.lineage().any(|schema| schema.id == field.schema)
  }

  /// Whether `ancestor` is this schema or appears in its parent chain.
  pub fn descends_from(&self, ancestor: &FieldSchema) -> bool {
    self.lineage().any(|schema| schema.id == ancestor.id)
  }
}

impl PartialEq for FieldSchema {
  fn eq(&self, other: &Self) -> bool { self.id == other.id }
}

impl Eq for FieldSchema {}

impl Hash for FieldSchema {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) { self.id.hash(state) }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn account() -> FieldSchema {
    let mut schema = FieldSchema::new("account");
    schema.declare_field(FieldSpec::text("name", 64)).unwrap();
    schema
      .declare_field(
        FieldSpec::new("opened", DataType::Date)
          .equality(EqualityClass::Comparison),
      )
      .unwrap();
    schema
  }

  #[test]
  fn versioned_indices_follow_declaration_order() {
    let mut schema = FieldSchema::new("t");
    let ids: Vec<_> = ["a", "b", "c"]
      .into_iter()
      .map(|n| schema.declare_field(FieldSpec::new(n, DataType::Integer)))
      .collect::<Result<_>>()
      .unwrap();
    let indices: Vec<_> = ids.iter().map(|f| f.index()).collect();
    assert_eq!(indices, vec![Some(0), Some(1), Some(2)]);
    assert_eq!(schema.total_versioned_count(), 3);
  }

  #[test]
  fn child_indices_continue_after_parent() {
    let parent = Arc::new(account());
    let mut child = FieldSchema::extending("bank", parent);
    let a = child.declare_field(FieldSpec::text("iban", 34)).unwrap();
    let b = child
      .declare_field(FieldSpec::new("limit", DataType::Money))
      .unwrap();
    assert_eq!(a.index(), Some(2));
    assert_eq!(b.index(), Some(3));
    assert_eq!(child.total_versioned_count(), 4);
  }

  #[test]
  fn non_versioned_fields_have_no_index() {
    let mut schema = FieldSchema::new("t");
    let f = schema
      .declare_field(
        FieldSpec::new("balance", DataType::Money)
          .storage(StorageClass::Calculated)
          .equality(EqualityClass::Derived),
      )
      .unwrap();
    assert_eq!(f.index(), None);
    assert_eq!(schema.total_versioned_count(), 0);
    assert!(!schema.has_versioned_fields());
  }

  #[test]
  fn duplicate_name_rejected_across_chain() {
    let parent = Arc::new(account());
    let mut child = FieldSchema::extending("bank", parent);
    let err = child.declare_field(FieldSpec::text("name", 10)).unwrap_err();
    assert!(matches!(err, Error::DuplicateField { .. }));
  }

  #[test]
  fn versioned_locks_out_index_only() {
    let mut schema = account();
    let err = schema.declare_index_only_field("slot").unwrap_err();
    assert!(matches!(err, Error::IndexOnlyAfterVersioned { .. }));
  }

  #[test]
  fn index_only_locks_out_versioned() {
    let mut schema = FieldSchema::new("lookup");
    let slot = schema.declare_index_only_field("slot").unwrap();
    assert_eq!(slot.index(), Some(0));
    assert!(!slot.is_versioned());
    let err = schema
      .declare_field(FieldSpec::new("n", DataType::Integer))
      .unwrap_err();
    assert!(matches!(err, Error::VersionedAfterIndexOnly { .. }));
    // Non-versioned fields are still allowed alongside index-only ones.
    schema
      .declare_field(
        FieldSpec::new("label", DataType::Enum).storage(StorageClass::Local),
      )
      .unwrap();
  }

  #[test]
  fn inherited_versioned_fields_lock_out_index_only() {
    let parent = Arc::new(account());
    let mut child = FieldSchema::extending("bank", parent);
    assert!(child.declare_index_only_field("slot").is_err());
  }

  #[test]
  fn max_length_rules() {
    let mut schema = FieldSchema::new("t");
    let missing = schema.declare_field(FieldSpec::new("memo", DataType::Text));
    assert!(matches!(missing, Err(Error::InvalidMaxLength { .. })));
    let extra = schema
      .declare_field(FieldSpec::new("n", DataType::Integer).max_length(4));
    assert!(matches!(extra, Err(Error::InvalidMaxLength { .. })));
    schema
      .declare_field(FieldSpec::new("raw", DataType::Bytes).max_length(0))
      .unwrap();
  }

  #[test]
  fn versioned_object_equality_rejected() {
    let mut schema = FieldSchema::new("t");
    let err = schema
      .declare_field(FieldSpec::new("blob", DataType::Object))
      .unwrap_err();
    assert!(matches!(err, Error::UnsafeObjectEquality(_)));
    schema
      .declare_field(
        FieldSpec::new("blob", DataType::Object)
          .equality(EqualityClass::Derived),
      )
      .unwrap();
  }

  #[test]
  fn fields_iterate_parent_first() {
    let parent = Arc::new(account());
    let mut child = FieldSchema::extending("bank", parent);
    child.declare_field(FieldSpec::text("iban", 34)).unwrap();
    let names: Vec<_> = child.fields().map(|f| f.name()).collect();
    assert_eq!(names, vec!["name", "opened", "iban"]);
    // Restartable.
    assert_eq!(child.fields().count(), 3);
    assert_eq!(child.own_fields().len(), 1);
  }

  #[test]
  fn comparison_flag_tracks_declarations() {
    let schema = account();
    assert!(schema.has_comparison_fields());
    let child = FieldSchema::extending("bank", Arc::new(schema));
    assert!(child.has_comparison_fields());
  }

  #[test]
  fn descriptors_from_different_schemas_differ() {
    let a = account();
    let b = account();
    let fa = a.field("name").unwrap();
    let fb = b.field("name").unwrap();
    assert_ne!(fa, fb);
    assert_eq!(fa, a.field("name").unwrap());
    assert_ne!(a, b);
  }

  #[test]
  fn lookups() {
    let parent = Arc::new(account());
    let mut child = FieldSchema::extending("bank", parent.clone());
    child.declare_field(FieldSpec::text("iban", 34)).unwrap();
    assert_eq!(child.versioned_field(1).unwrap().name(), "opened");
    assert_eq!(child.versioned_field(2).unwrap().name(), "iban");
    assert!(child.versioned_field(3).is_none());
    assert!(child.contains(parent.field("name").unwrap()));
    assert!(!parent.contains(child.field("iban").unwrap()));
    assert!(child.descends_from(&parent));
    assert!(!parent.descends_from(&child));
    assert!(matches!(child.require("nope"), Err(Error::UnknownField(_))));
  }
}
