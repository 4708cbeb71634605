//! Loading of reference tables for `atomize`.
//!
//! A reference directory holds any number of tab-separated tables
//! (`*.tsv`), non-coding RNA gene exports (`ncRNA_genes_*.json`), and an
//! optional literal mapping file (`mapping.txt`).

pub mod error;
pub mod mapping;
pub mod ncrna;
pub mod normalize;
pub mod tsv;

use std::path::{Path, PathBuf};

use atomize_core::reference::{
  PreloadedMapping, ReferenceMapper, ReferenceTable,
};
pub use error::{Error, Result};
use ncrna::NcRnaTables;
use normalize::ValueNormalizer;
use tracing::{debug, info};

/// Everything read from one reference directory.
#[derive(Debug, Default)]
pub struct ReferenceSet {
  pub tables:    Vec<ReferenceTable>,
  pub preloaded: Option<Vec<PreloadedMapping>>,
}

impl ReferenceSet {
  pub fn is_empty(&self) -> bool { self.tables.is_empty() }

  /// Build a mapper over the tables, applying the mapping file if present.
  pub fn into_mapper(self) -> Result<ReferenceMapper> {
    let mut mapper = ReferenceMapper::new(self.tables);
    if let Some(entries) = &self.preloaded {
      mapper.apply_preloaded(entries)?;
    }
    Ok(mapper)
  }
}

/// Load every reference source found in `dir`. Files are visited in name
/// order; the JSON exports come first as one merged group of tables.
pub fn load_dir(
  dir: &Path,
  identifier_pattern: Option<&str>,
) -> Result<ReferenceSet> {
  let normalizer = ValueNormalizer::new(identifier_pattern)?;
  let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
    .map_err(|e| Error::io(dir, e))?
    .map(|entry| entry.map(|e| e.path()).map_err(|e| Error::io(dir, e)))
    .collect::<Result<_>>()?;
  paths.sort();

  let mut set = ReferenceSet::default();
  let mut ncrna = NcRnaTables::new();
  let mut json_files = 0;
  for path in &paths {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
      continue;
    };
    if NcRnaTables::matches(name) {
      debug!(path = %path.display(), "loading gene export");
      ncrna.add_file(path)?;
      json_files += 1;
    }
  }
  if json_files > 0 {
    info!(
      files = json_files,
      records = ncrna.records(),
      "loaded gene exports"
    );
    set.tables.extend(ncrna.into_tables(&normalizer)?);
  }

  for path in &paths {
    if path.extension().is_some_and(|ext| ext == "tsv") && path.is_file() {
      debug!(path = %path.display(), "loading reference table");
      if let Some(table) = tsv::load(path, &normalizer)? {
        set.tables.push(table);
      }
    }
  }

  let mapping = dir.join(mapping::MAPPING_FILE);
  if mapping.is_file() {
    let entries = mapping::load(&mapping)?;
    info!(entries = entries.len(), "loaded mapping file");
    set.preloaded = Some(entries);
  }

  info!(
    dir = %dir.display(),
    tables = set.tables.len(),
    "loaded reference tables"
  );
  Ok(set)
}

#[cfg(test)]
mod tests;
