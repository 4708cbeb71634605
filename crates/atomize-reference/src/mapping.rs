//! The literal mapping file.
//!
//! One tab-separated `table column sql_table sql_field` entry per line.
//! Fields may be double-quoted, as in the reference tables.

use std::{io::Read, path::Path};

use atomize_core::reference::{PreloadedMapping, SqlColumn};

use crate::{Error, Result};

pub const MAPPING_FILE: &str = "mapping.txt";

pub fn load(path: &Path) -> Result<Vec<PreloadedMapping>> {
  let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
  read(path, file)
}

pub fn parse(path: &Path, text: &str) -> Result<Vec<PreloadedMapping>> {
  read(path, text.as_bytes())
}

fn read<R: Read>(path: &Path, reader: R) -> Result<Vec<PreloadedMapping>> {
  let mut reader = csv::ReaderBuilder::new()
    .delimiter(b'\t')
    .quote(b'"')
    .has_headers(false)
    .flexible(true)
    .from_reader(reader);

  let mut entries = Vec::new();
  for record in reader.records() {
    let record = record.map_err(|source| Error::Csv {
      path: path.to_path_buf(),
      source,
    })?;
    if record.len() == 1 && record[0].trim().is_empty() {
      continue;
    }
    let fields: Vec<&str> = record.iter().map(str::trim).collect();
    let [table, column, sql_table, sql_field] = fields[..] else {
      return Err(Error::MalformedMapping {
        path: path.to_path_buf(),
        line: record.position().map_or(0, |p| p.line() as usize),
        text: fields.join("\t"),
      });
    };
    entries.push(PreloadedMapping {
      table:  table.to_string(),
      column: column.to_string(),
      sql:    SqlColumn::new(sql_table, sql_field),
    });
  }
  Ok(entries)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_entries_and_skips_blank_lines() {
    let text = "genes.tsv\tid\tpublic.feature\tuniquename\n\n\
                genes.tsv\tsymbol\tpublic.feature\tname\r\n";
    let entries = parse(Path::new(MAPPING_FILE), text).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].column, "symbol");
    assert_eq!(entries[1].sql, SqlColumn::new("public.feature", "name"));
  }

  #[test]
  fn wrong_field_count_reports_the_line() {
    let text = "genes.tsv\tid\tpublic.feature\tuniquename\ngenes.tsv\tid\n";
    let err = parse(Path::new(MAPPING_FILE), text).unwrap_err();
    assert!(matches!(err, Error::MalformedMapping { line: 2, .. }));
  }

  #[test]
  fn quoted_fields_may_hold_tabs() {
    let text = "\"odd\tname.tsv\"\tid\t\"public.feature\"\tuniquename\n";
    let entries = parse(Path::new(MAPPING_FILE), text).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].table, "odd\tname.tsv");
    assert_eq!(entries[0].sql, SqlColumn::new("public.feature", "uniquename"));
  }
}
