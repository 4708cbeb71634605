//! Conversion settings.
//!
//! Deserialised by the binary from `atomize.toml` and `ATOMIZE_*`
//! environment variables; every field has a default so an empty source is a
//! valid configuration.

use std::path::PathBuf;

use serde::Deserialize;

use crate::{reference::DEFAULT_NEAR_MATCH_THRESHOLD, schema::Column};

pub const DEFAULT_EXPRESSIONS_PER_CHUNK: u64 = 150_000_000;

/// Matches a bare FlyBase identifier, optionally behind a namespace prefix;
/// capture group 2 is the identifier.
pub const DEFAULT_IDENTIFIER_PATTERN: &str =
  r"^(\S+:)?(FB[a-zA-Z]{2}[0-9]{5,10})$";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
  /// Root directory for atom files and reports.
  pub output_dir:            PathBuf,
  /// Directory holding reference tables; none disables the mapping pass.
  pub reference_dir:         Option<PathBuf>,
  /// Expressions accumulated before a new output file is started.
  pub expressions_per_chunk: u64,
  /// Minimum witness coverage for a near match.
  pub near_match_threshold:  f64,
  /// Stop after the schema pass and the schema report.
  pub schema_only:           bool,
  pub show_progress:         bool,
  /// Tables emitted in the data pass regardless of reference mappings.
  pub extra_tables:          Vec<String>,
  pub ignored_columns:       ColumnFilter,
  /// Regex normalizing reference values; capture group 2 replaces a match.
  pub identifier_pattern:    Option<String>,
}

impl Default for ConvertConfig {
  fn default() -> Self {
    Self {
      output_dir:            PathBuf::from("output"),
      reference_dir:         None,
      expressions_per_chunk: DEFAULT_EXPRESSIONS_PER_CHUNK,
      near_match_threshold:  DEFAULT_NEAR_MATCH_THRESHOLD,
      schema_only:           false,
      show_progress:         true,
      extra_tables:          Vec::new(),
      ignored_columns:       ColumnFilter::default(),
      identifier_pattern:    Some(DEFAULT_IDENTIFIER_PATTERN.to_string()),
    }
  }
}

impl ConvertConfig {
  pub fn validate(&self) -> crate::Result<()> {
    if self.expressions_per_chunk == 0 {
      return Err(crate::Error::Config(
        "expressions_per_chunk must be positive".into(),
      ));
    }
    if !(0.0..=1.0).contains(&self.near_match_threshold) {
      return Err(crate::Error::Config(format!(
        "near_match_threshold must lie in [0, 1], got {}",
        self.near_match_threshold
      )));
    }
    Ok(())
  }
}

/// Columns that carry no knowledge, such as load timestamps. Names are
/// matched by prefix or substring; declared columns also by type.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ColumnFilter {
  pub prefixes:   Vec<String>,
  pub substrings: Vec<String>,
  pub types:      Vec<String>,
}

impl Default for ColumnFilter {
  fn default() -> Self {
    Self {
      prefixes:   vec!["time".into()],
      substrings: vec!["timestamp".into()],
      types:      vec!["timestamp".into()],
    }
  }
}

impl ColumnFilter {
  /// Whether a data column is left out of mapping and emission.
  pub fn ignores_column(&self, column: &str) -> bool {
    self.prefixes.iter().any(|p| column.starts_with(p.as_str()))
      || self.substrings.iter().any(|s| column.contains(s.as_str()))
  }

  /// Whether a declared column is left out of the schema, by name or by
  /// its SQL type.
  pub fn ignores_declared(&self, column: &Column) -> bool {
    let sql_type = column.sql_type.to_string();
    self.ignores_column(&column.name)
      || self.types.iter().any(|t| sql_type.contains(t.as_str()))
  }
}
