//! Error type for `atomize-reference`.

use std::path::PathBuf;

use atomize_core::error::ReferenceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("reference table error: {0}")]
  Table(#[from] ReferenceError),

  #[error("io error reading {path}: {source}")]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("csv error in {path}: {source}")]
  Csv {
    path:   PathBuf,
    #[source]
    source: csv::Error,
  },

  #[error("json error in {path}: {source}")]
  Json {
    path:   PathBuf,
    #[source]
    source: serde_json::Error,
  },

  /// A data row appeared before any `#` header line.
  #[error("{0} has data rows but no header line")]
  MissingHeader(PathBuf),

  #[error("malformed mapping entry at {path}:{line}: {text}")]
  MalformedMapping {
    path: PathBuf,
    line: usize,
    text: String,
  },

  #[error("invalid identifier pattern: {0}")]
  Pattern(#[from] regex::Error),
}

impl Error {
  pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Self::Io {
      path: path.into(),
      source,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
