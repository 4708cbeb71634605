//! Error types for `atomize-core`.

use thiserror::Error;

/// A dump format assumption was violated while building the schema.
///
/// Always fatal: later passes rely on a consistent catalog.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
  #[error("malformed CREATE TABLE statement: {0}")]
  MalformedCreateTable(String),

  #[error("malformed constraint statement: {0}")]
  MalformedConstraint(String),

  #[error("malformed COPY statement: {0}")]
  MalformedCopy(String),

  #[error("unknown table {0}")]
  UnknownTable(String),

  #[error("unknown column {column} in table {table}")]
  UnknownColumn { table: String, column: String },

  #[error("table {table} already has primary key {existing}")]
  DuplicatePrimaryKey { table: String, existing: String },

  #[error("COPY into {table} names column {column} missing from its schema")]
  UnknownCopyColumn { table: String, column: String },
}

/// A reference table or mapping entry is inconsistent with itself.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReferenceError {
  #[error("reference table {table} has an empty field name")]
  EmptyField { table: String },

  #[error("reference table {table} declares field {field} twice")]
  DuplicateField { table: String, field: String },

  #[error("row of width {found} in reference table {table} of width \
           {expected}")]
  RowWidth {
    table:    String,
    expected: usize,
    found:    usize,
  },

  #[error("reference table {table} has no field {field}")]
  UnknownField { table: String, field: String },
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("schema error at line {line}: {source}")]
  Schema {
    line:   usize,
    #[source]
    source: SchemaError,
  },

  #[error("reference error: {0}")]
  Reference(#[from] ReferenceError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("configuration error: {0}")]
  Config(String),
}

impl Error {
  pub(crate) fn schema(line: usize, source: SchemaError) -> Self {
    Self::Schema { line, source }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
