//! Reference tables and the inference of their SQL counterparts.
//!
//! A reference table is an externally supplied table of known facts. While
//! the dump's data rows stream past, every `(sql_table, sql_field, value)`
//! observation is recorded as a witness for the reference fields whose value
//! set contains `value`. A field is mapped to a SQL column once that column
//! has witnessed every distinct value of the field; until then no mapping
//! is made, so a single counter-example is enough to prevent it.
//!
//! Real reference data is rarely perfectly consistent, so once the stream is
//! exhausted [`ReferenceMapper::finalize_near_matches`] maps the remaining
//! fields whose best candidate covers at least a threshold fraction of the
//! values.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ReferenceError;

pub const DEFAULT_NEAR_MATCH_THRESHOLD: f64 = 0.9;

/// A `(table, field)` pair on the SQL side.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SqlColumn {
  pub table: String,
  pub field: String,
}

impl SqlColumn {
  pub fn new(table: impl Into<String>, field: impl Into<String>) -> Self {
    Self {
      table: table.into(),
      field: field.into(),
    }
  }
}

/// Index into the mapper's interned [`SqlColumn`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct TagId(u32);

#[derive(Debug, Default)]
struct TagRegistry {
  by_name: HashMap<String, HashMap<String, TagId>>,
  columns: Vec<SqlColumn>,
}

impl TagRegistry {
  fn intern(&mut self, table: &str, field: &str) -> TagId {
    if let Some(id) = self.by_name.get(table).and_then(|f| f.get(field)) {
      return *id;
    }
    let id = TagId(self.columns.len() as u32);
    self.columns.push(SqlColumn::new(table, field));
    self
      .by_name
      .entry(table.to_string())
      .or_default()
      .insert(field.to_string(), id);
    id
  }

  fn column(&self, id: TagId) -> &SqlColumn { &self.columns[id.0 as usize] }
}

// ─── Reference table ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone)]
struct FieldCoverage {
  /// Distinct values of the field and the SQL columns seen holding each.
  witnesses: HashMap<String, HashSet<TagId>>,
  /// For each SQL column, how many distinct values it has witnessed.
  counts:    HashMap<TagId, usize>,
  mapping:   Option<SqlColumn>,
}

impl FieldCoverage {
  /// Record a witness; returns true when `tag` now covers every value.
  fn witness(&mut self, value: &str, tag: TagId) -> bool {
    let Some(seen) = self.witnesses.get_mut(value) else {
      return false;
    };
    if !seen.insert(tag) {
      return false;
    }
    let count = self.counts.entry(tag).or_default();
    *count += 1;
    *count == self.witnesses.len()
  }

  /// The tag with the most witnessed values; ties go to the tag seen first.
  fn dominant(&self) -> Option<(TagId, usize)> {
    self
      .counts
      .iter()
      .map(|(tag, count)| (*tag, *count))
      .max_by(|(ta, ca), (tb, cb)| ca.cmp(cb).then(tb.cmp(ta)))
  }
}

#[derive(Debug, Clone)]
pub struct ReferenceTable {
  name:   String,
  header: Vec<String>,
  rows:   Vec<Vec<String>>,
  fields: Vec<FieldCoverage>,
}

impl ReferenceTable {
  pub fn new(
    name: impl Into<String>,
    header: Vec<String>,
  ) -> Result<Self, ReferenceError> {
    let name = name.into();
    let header: Vec<String> =
      header.into_iter().map(|h| h.trim().to_string()).collect();
    let mut seen = HashSet::new();
    for field in &header {
      if field.is_empty() {
        return Err(ReferenceError::EmptyField { table: name });
      }
      if !seen.insert(field.as_str()) {
        return Err(ReferenceError::DuplicateField {
          table: name.clone(),
          field: field.clone(),
        });
      }
    }
    let fields = vec![FieldCoverage::default(); header.len()];
    Ok(Self {
      name,
      header,
      rows: Vec::new(),
      fields,
    })
  }

  /// Append a row. Empty values are kept in the row but do not join the
  /// field's value set.
  pub fn add_row(&mut self, row: Vec<String>) -> Result<(), ReferenceError> {
    if row.len() != self.header.len() {
      return Err(ReferenceError::RowWidth {
        table:    self.name.clone(),
        expected: self.header.len(),
        found:    row.len(),
      });
    }
    for (field, value) in self.fields.iter_mut().zip(&row) {
      if !value.is_empty() && !field.witnesses.contains_key(value) {
        field.witnesses.insert(value.clone(), HashSet::new());
      }
    }
    self.rows.push(row);
    Ok(())
  }

  pub fn name(&self) -> &str { &self.name }

  pub fn header(&self) -> &[String] { &self.header }

  pub fn rows(&self) -> &[Vec<String>] { &self.rows }

  /// Distinct non-empty values of `field`.
  pub fn values(&self, field: &str) -> impl Iterator<Item = &str> {
    self
      .field_index(field)
      .into_iter()
      .flat_map(|i| self.fields[i].witnesses.keys().map(String::as_str))
  }

  /// The SQL column `field` is mapped to, if any.
  pub fn mapping(&self, field: &str) -> Option<&SqlColumn> {
    self
      .field_index(field)
      .and_then(|i| self.fields[i].mapping.as_ref())
  }

  pub fn mapped_fields(&self) -> impl Iterator<Item = (&str, &SqlColumn)> {
    self
      .header
      .iter()
      .zip(&self.fields)
      .filter_map(|(h, f)| f.mapping.as_ref().map(|m| (h.as_str(), m)))
  }

  pub fn unmapped_fields(&self) -> impl Iterator<Item = &str> {
    self
      .header
      .iter()
      .zip(&self.fields)
      .filter(|(_, f)| f.mapping.is_none())
      .map(|(h, _)| h.as_str())
  }

  pub fn is_fully_mapped(&self) -> bool {
    self.fields.iter().all(|f| f.mapping.is_some())
  }

  /// Assign `field` directly, bypassing inference.
  pub fn set_mapping(
    &mut self,
    field: &str,
    column: SqlColumn,
  ) -> Result<(), ReferenceError> {
    let index = self.field_index(field).ok_or_else(|| {
      ReferenceError::UnknownField {
        table: self.name.clone(),
        field: field.to_string(),
      }
    })?;
    self.fields[index].mapping = Some(column);
    Ok(())
  }

  /// SQL tables appearing in any of this table's mappings.
  pub fn relevant_sql_tables(&self) -> impl Iterator<Item = &str> {
    self.mapped_fields().map(|(_, column)| column.table.as_str())
  }

  fn field_index(&self, field: &str) -> Option<usize> {
    self.header.iter().position(|h| h == field)
  }

  fn observe(&mut self, tag: TagId, value: &str, tags: &TagRegistry) {
    for (name, field) in self.header.iter().zip(self.fields.iter_mut()) {
      if field.mapping.is_none() && field.witness(value, tag) {
        let column = tags.column(tag).clone();
        debug!(table = %self.name, field = %name, ?column, "mapped field");
        field.mapping = Some(column);
      }
    }
  }

  fn finalize_near_matches(&mut self, threshold: f64, tags: &TagRegistry) {
    for (name, field) in self.header.iter().zip(self.fields.iter_mut()) {
      if field.mapping.is_some() {
        continue;
      }
      let Some((tag, count)) = field.dominant() else {
        continue;
      };
      if count > 0 && count as f64 >= threshold * field.witnesses.len() as f64 {
        let column = tags.column(tag).clone();
        debug!(
          table = %self.name,
          field = %name,
          ?column,
          count,
          values = field.witnesses.len(),
          "near-matched field"
        );
        field.mapping = Some(column);
      }
    }
  }
}

// ─── Mapper ──────────────────────────────────────────────────────────────────

/// A literal `(table, column) -> (sql_table, sql_field)` assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloadedMapping {
  pub table:  String,
  pub column: String,
  pub sql:    SqlColumn,
}

/// Owns every reference table, partitioned into mapped and unmapped.
#[derive(Debug, Default)]
pub struct ReferenceMapper {
  tables:          Vec<ReferenceTable>,
  unmapped:        Vec<usize>,
  mapped:          Vec<usize>,
  tags:            TagRegistry,
  sql_primary_key: HashMap<String, String>,
  preloaded:       bool,
}

impl ReferenceMapper {
  pub fn new(tables: Vec<ReferenceTable>) -> Self {
    let mut mapper = Self {
      unmapped: (0..tables.len()).collect(),
      tables,
      ..Self::default()
    };
    mapper.migrate_finished();
    mapper
  }

  /// Apply a pre-supplied mapping file. Entries for tables that were not
  /// loaded are ignored. Once applied, inference is considered unnecessary.
  pub fn apply_preloaded(
    &mut self,
    entries: &[PreloadedMapping],
  ) -> Result<(), ReferenceError> {
    for entry in entries {
      let Some(table) = self.tables.iter_mut().find(|t| t.name == entry.table)
      else {
        debug!(table = %entry.table, "mapping entry for unknown table");
        continue;
      };
      table.set_mapping(&entry.column, entry.sql.clone())?;
    }
    self.preloaded = true;
    self.migrate_finished();
    Ok(())
  }

  /// Record that `sql_table.sql_field` holds `value`.
  pub fn observe(&mut self, sql_table: &str, sql_field: &str, value: &str) {
    if self.unmapped.is_empty() || value.is_empty() {
      return;
    }
    let tag = self.tags.intern(sql_table, sql_field);
    for &index in &self.unmapped {
      self.tables[index].observe(tag, value, &self.tags);
    }
    self.migrate_finished();
  }

  /// Force-map every unmapped field whose dominant SQL column witnessed at
  /// least `threshold` of its distinct values.
  pub fn finalize_near_matches(&mut self, threshold: f64) {
    for &index in &self.unmapped {
      self.tables[index].finalize_near_matches(threshold, &self.tags);
    }
    self.migrate_finished();
    info!(
      mapped = self.mapped.len(),
      unmapped = self.unmapped.len(),
      "reference mapping finalized"
    );
  }

  pub fn all_tables_mapped(&self) -> bool {
    self.preloaded || self.unmapped.is_empty()
  }

  /// Union of the SQL tables named by any resolved mapping.
  pub fn relevant_sql_tables(&self) -> BTreeSet<String> {
    self
      .tables
      .iter()
      .flat_map(ReferenceTable::relevant_sql_tables)
      .map(str::to_string)
      .collect()
  }

  pub fn set_sql_primary_key(&mut self, sql_table: &str, field: &str) {
    self
      .sql_primary_key
      .insert(sql_table.to_string(), field.to_string());
  }

  pub fn sql_primary_key(&self, sql_table: &str) -> Option<&str> {
    self.sql_primary_key.get(sql_table).map(String::as_str)
  }

  /// All tables in load order.
  pub fn tables(&self) -> &[ReferenceTable] { &self.tables }

  pub fn mapped_tables(&self) -> impl Iterator<Item = &ReferenceTable> {
    self.mapped.iter().map(|&i| &self.tables[i])
  }

  pub fn unmapped_tables(&self) -> impl Iterator<Item = &ReferenceTable> {
    self.unmapped.iter().map(|&i| &self.tables[i])
  }

  /// Unmapped `(table, field)` pairs across every table.
  pub fn unmapped_fields(&self) -> BTreeMap<String, Vec<String>> {
    self
      .unmapped_tables()
      .map(|t| {
        (
          t.name().to_string(),
          t.unmapped_fields().map(str::to_string).collect(),
        )
      })
      .collect()
  }

  fn migrate_finished(&mut self) {
    let tables = &self.tables;
    let mapped = &mut self.mapped;
    self.unmapped.retain(|&index| {
      if tables[index].is_fully_mapped() {
        debug!(table = %tables[index].name, "reference table fully mapped");
        mapped.push(index);
        false
      } else {
        true
      }
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn table(name: &str, header: &[&str], rows: &[&[&str]]) -> ReferenceTable {
    let mut table =
      ReferenceTable::new(name, header.iter().map(|h| h.to_string()).collect())
        .unwrap();
    for row in rows {
      table
        .add_row(row.iter().map(|v| v.to_string()).collect())
        .unwrap();
    }
    table
  }

  fn genes() -> ReferenceTable {
    table("genes.tsv", &["gene_id", "symbol"], &[
      &["FBgn01", "abc"],
      &["FBgn02", "def"],
      &["FBgn03", "ghi"],
    ])
  }

  #[test]
  fn field_maps_once_every_value_is_witnessed() {
    let mut mapper = ReferenceMapper::new(vec![genes()]);
    assert_eq!(mapper.tables()[0].values("symbol").count(), 3);
    mapper.observe("public.feature", "uniquename", "FBgn01");
    mapper.observe("public.feature", "uniquename", "FBgn02");
    assert!(mapper.tables()[0].mapping("gene_id").is_none());
    mapper.observe("public.feature", "uniquename", "FBgn03");
    assert_eq!(
      mapper.tables()[0].mapping("gene_id"),
      Some(&SqlColumn::new("public.feature", "uniquename"))
    );
    assert!(!mapper.all_tables_mapped());

    for symbol in ["abc", "def", "ghi"] {
      mapper.observe("public.feature", "name", symbol);
    }
    assert!(mapper.all_tables_mapped());
    assert_eq!(mapper.mapped_tables().count(), 1);
    assert_eq!(mapper.unmapped_tables().count(), 0);
  }

  #[test]
  fn a_missing_value_prevents_mapping() {
    let mut mapper = ReferenceMapper::new(vec![genes()]);
    mapper.observe("public.feature", "uniquename", "FBgn01");
    mapper.observe("public.feature", "uniquename", "FBgn02");
    mapper.observe("public.other", "id", "FBgn03");
    mapper.observe("public.feature", "uniquename", "FBgn01");
    assert!(mapper.tables()[0].mapping("gene_id").is_none());
    assert!(
      mapper.tables()[0]
        .unmapped_fields()
        .any(|f| f == "gene_id")
    );
  }

  #[test]
  fn repeated_observations_do_not_inflate_coverage() {
    let mut mapper = ReferenceMapper::new(vec![genes()]);
    for _ in 0..10 {
      mapper.observe("public.feature", "uniquename", "FBgn01");
    }
    mapper.finalize_near_matches(0.9);
    assert!(mapper.tables()[0].mapping("gene_id").is_none());
  }

  fn wide(values: usize) -> ReferenceTable {
    let rows: Vec<Vec<String>> =
      (0..values).map(|i| vec![format!("v{i}")]).collect();
    let mut table = ReferenceTable::new("wide.tsv", vec!["id".into()]).unwrap();
    for row in rows {
      table.add_row(row).unwrap();
    }
    table
  }

  #[test]
  fn near_match_below_threshold_stays_unmapped() {
    let mut mapper = ReferenceMapper::new(vec![wide(20)]);
    for i in 0..17 {
      mapper.observe("public.t", "f", &format!("v{i}"));
    }
    mapper.finalize_near_matches(0.9);
    assert!(mapper.tables()[0].mapping("id").is_none());
    assert_eq!(mapper.unmapped_fields()["wide.tsv"], ["id"]);
  }

  #[test]
  fn near_match_at_threshold_maps_to_dominant_tag() {
    let mut mapper = ReferenceMapper::new(vec![wide(20)]);
    for i in 0..18 {
      mapper.observe("public.t", "f", &format!("v{i}"));
    }
    for i in 0..5 {
      mapper.observe("public.u", "g", &format!("v{i}"));
    }
    mapper.finalize_near_matches(0.9);
    assert_eq!(
      mapper.tables()[0].mapping("id"),
      Some(&SqlColumn::new("public.t", "f"))
    );
    assert!(mapper.all_tables_mapped());
  }

  #[test]
  fn field_without_witnesses_never_near_matches() {
    let mut mapper = ReferenceMapper::new(vec![wide(3)]);
    mapper.finalize_near_matches(0.0);
    assert!(mapper.tables()[0].mapping("id").is_none());
  }

  #[test]
  fn preloaded_mapping_short_circuits_inference() {
    let mut mapper = ReferenceMapper::new(vec![genes()]);
    mapper
      .apply_preloaded(&[PreloadedMapping {
        table:  "genes.tsv".into(),
        column: "gene_id".into(),
        sql:    SqlColumn::new("public.feature", "uniquename"),
      }])
      .unwrap();
    assert!(mapper.all_tables_mapped());
    assert_eq!(
      mapper.relevant_sql_tables().into_iter().collect::<Vec<_>>(),
      ["public.feature"]
    );
    // Only one of two fields was assigned.
    assert_eq!(mapper.unmapped_tables().count(), 1);
  }

  #[test]
  fn preloaded_mapping_rejects_unknown_columns() {
    let mut mapper = ReferenceMapper::new(vec![genes()]);
    let err = mapper
      .apply_preloaded(&[PreloadedMapping {
        table:  "genes.tsv".into(),
        column: "nope".into(),
        sql:    SqlColumn::new("public.feature", "uniquename"),
      }])
      .unwrap_err();
    assert!(matches!(err, ReferenceError::UnknownField { .. }));
  }

  #[test]
  fn table_validation() {
    assert!(matches!(
      ReferenceTable::new("t", vec!["a".into(), " ".into()]),
      Err(ReferenceError::EmptyField { .. })
    ));
    assert!(matches!(
      ReferenceTable::new("t", vec!["a".into(), "a".into()]),
      Err(ReferenceError::DuplicateField { .. })
    ));
    let mut t = ReferenceTable::new("t", vec!["a".into()]).unwrap();
    assert!(matches!(
      t.add_row(vec!["1".into(), "2".into()]),
      Err(ReferenceError::RowWidth { .. })
    ));
  }

  #[test]
  fn sql_primary_keys_are_recorded() {
    let mut mapper = ReferenceMapper::new(vec![]);
    mapper.set_sql_primary_key("public.feature", "feature_id");
    assert_eq!(mapper.sql_primary_key("public.feature"), Some("feature_id"));
    assert_eq!(mapper.sql_primary_key("public.other"), None);
    assert!(mapper.all_tables_mapped());
  }
}
