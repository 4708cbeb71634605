//! Tab-separated reference tables.
//!
//! ```text
//! ## FlyBase gene symbols
//! #gene_id\tsymbol
//! #-----------------
//! FBgn0000001\tabc
//! ```
//!
//! Comment lines start with `#`. The header is the last comment line before
//! the first data row, minus its leading `#`; `#-----` separator lines are
//! never the header.

use std::{fs::File, io::Read, path::Path};

use atomize_core::reference::ReferenceTable;
use tracing::{debug, warn};

use crate::{Error, Result, normalize::ValueNormalizer};

const COMMENT: char = '#';
const SEPARATOR: &str = "#-----";

/// Load one `.tsv` file as a table named after the file. Files without any
/// data row yield `None`.
pub fn load(
  path: &Path,
  normalizer: &ValueNormalizer,
) -> Result<Option<ReferenceTable>> {
  let file = File::open(path).map_err(|e| Error::io(path, e))?;
  let table = read(path, file, normalizer)?;
  if table.is_none() {
    warn!(path = %path.display(), "reference file has no data rows");
  }
  Ok(table)
}

/// Parse the contents of `path` from `reader`.
pub fn read<R: Read>(
  path: &Path,
  reader: R,
  normalizer: &ValueNormalizer,
) -> Result<Option<ReferenceTable>> {
  let name = path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();
  let mut reader = csv::ReaderBuilder::new()
    .delimiter(b'\t')
    .quote(b'"')
    .has_headers(false)
    .flexible(true)
    .from_reader(reader);

  let mut previous: Option<Vec<String>> = None;
  let mut table: Option<ReferenceTable> = None;
  for record in reader.records() {
    let record = record.map_err(|source| Error::Csv {
      path: path.to_path_buf(),
      source,
    })?;
    let Some(first) = record.get(0) else {
      continue;
    };
    if record.len() == 1 && first.trim().is_empty() {
      continue;
    }

    if first.starts_with(COMMENT) {
      if !first.starts_with(SEPARATOR) {
        previous = Some(record.iter().map(str::to_string).collect());
      }
      continue;
    }

    if table.is_none() {
      let mut header = previous
        .take()
        .ok_or_else(|| Error::MissingHeader(path.to_path_buf()))?;
      header[0] = header[0].trim_start_matches(COMMENT).to_string();
      debug!(table = %name, ?header, "reference header");
      table = Some(ReferenceTable::new(name.as_str(), header)?);
    }
    if let Some(table) = &mut table {
      table.add_row(normalizer.normalize_row(record.iter()))?;
    }
  }
  Ok(table)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(text: &str) -> Result<Option<ReferenceTable>> {
    read(
      Path::new("genes.tsv"),
      text.as_bytes(),
      &ValueNormalizer::default(),
    )
  }

  #[test]
  fn header_is_last_comment_before_data() {
    let text = "## Generated 2024\n#gene_id\tsymbol\n#-----\nFBgn1\tabc\n\n\
                FBgn2\t\"d\tef\"\n#trailing comment\nFBgn3\tghi\n";
    let table = parse(text).unwrap().unwrap();
    assert_eq!(table.name(), "genes.tsv");
    assert_eq!(table.header(), ["gene_id", "symbol"]);
    assert_eq!(table.rows().len(), 3);
    assert_eq!(table.rows()[1], ["FBgn2", "d\tef"]);
  }

  #[test]
  fn data_without_header_is_an_error() {
    assert!(matches!(
      parse("FBgn1\tabc\n"),
      Err(Error::MissingHeader(_))
    ));
  }

  #[test]
  fn comments_only_yield_nothing() {
    assert!(parse("#a\tb\n#-----\n").unwrap().is_none());
  }

  #[test]
  fn ragged_rows_are_rejected() {
    assert!(matches!(
      parse("#a\tb\n1\t2\t3\n"),
      Err(Error::Table(_))
    ));
  }

  #[test]
  fn load_names_table_after_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alleles.tsv");
    std::fs::write(&path, "#allele\nFBal0000001\n").unwrap();
    let table = load(&path, &ValueNormalizer::default()).unwrap().unwrap();
    assert_eq!(table.name(), "alleles.tsv");
    assert_eq!(table.values("allele").collect::<Vec<_>>(), ["FBal0000001"]);
  }
}
