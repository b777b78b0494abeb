//! Error types for `strata-core`.
//!
//! Every variant signals a programming error in a record-type definition or
//! in the caller. Business-rule failures are not errors; they accumulate in
//! [`crate::validation::Validation`].

use thiserror::Error;

use crate::value::DataType;

#[derive(Debug, Error)]
pub enum Error {
  // ── Schema violations ───────────────────────────────────────────────────
  #[error("field {field:?} is already declared in the {schema:?} schema chain")]
  DuplicateField { schema: String, field: String },

  #[error(
    "schema {schema:?} holds index-only fields; cannot declare versioned \
     field {field:?}"
  )]
  VersionedAfterIndexOnly { schema: String, field: String },

  #[error(
    "schema {schema:?} holds versioned fields; cannot declare index-only \
     field {field:?}"
  )]
  IndexOnlyAfterVersioned { schema: String, field: String },

  #[error("field {field:?} of type {data_type} has invalid max length {max_length:?}")]
  InvalidMaxLength {
    field:      String,
    data_type:  DataType,
    max_length: Option<usize>,
  },

  #[error("object field {0:?} cannot be both versioned and equality-compared")]
  UnsafeObjectEquality(String),

  // ── Access violations ───────────────────────────────────────────────────
  #[error("field {0:?} is not versioned")]
  NotVersioned(String),

  #[error("field {field:?} does not belong to the {schema:?} schema chain")]
  ForeignField { schema: String, field: String },

  #[error("field {field:?} expects {expected}, got {found}")]
  TypeMismatch {
    field:    String,
    expected: DataType,
    found:    &'static str,
  },

  // ── Lookups ─────────────────────────────────────────────────────────────
  #[error("unknown field: {0:?}")]
  UnknownField(String),

  #[error("unknown delta index: {0}")]
  UnknownDeltaIndex(usize),

  #[error("schema {0:?} requested itself while being declared")]
  RecursiveSchema(String),

  #[error("schema {found:?} does not extend {expected:?}")]
  IncompatibleSchema { expected: String, found: String },

  #[error("invalid decimal literal: {0:?}")]
  InvalidDecimal(String),

  #[error("decimal scale {0} exceeds the maximum of 18")]
  DecimalScale(u8),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
