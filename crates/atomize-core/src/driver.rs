//! The three-pass dump compiler.
//!
//! 1. **Schema**: declare tables and collect key constraints, then resolve
//!    them into a [`SchemaCatalog`]. Tables without a primary key are
//!    discarded.
//! 2. **Mapping** (only with reference tables): feed every data value to the
//!    [`ReferenceMapper`] until all reference tables are mapped, settle near
//!    matches, emit the reference tables and flush them as the first chunk.
//! 3. **Data**: turn every row of every relevant table into nodes and links.
//!
//! Each pass reads the dump from the start, so the passes run strictly in
//! order on one thread.

use std::{
  collections::{BTreeMap, BTreeSet, HashSet},
  io::Write,
};

use tracing::{info, warn};

use crate::{
  Error, Result,
  atom::{self, AtomKind, NodeType},
  config::ConvertConfig,
  ddl::{self, CopyHeader, NULL_SENTINEL},
  diagnostics::{Diagnostic, DiagnosticLog},
  emitter::AtomEmitter,
  error::SchemaError,
  progress::{Pass, ProgressObserver},
  reference::ReferenceMapper,
  scan::{DumpSource, Scanner, Statement},
  schema::{ColumnType, SchemaBuilder, SchemaCatalog, ValueClass},
  sink::ChunkSink,
};

/// What a run produced, for the caller's final report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
  pub files_written:    usize,
  pub expressions:      u64,
  pub row_errors:       usize,
  pub discarded_tables: Vec<String>,
  /// Reference fields left unmapped, by reference table.
  pub unmapped_fields:  BTreeMap<String, Vec<String>>,
  /// Tables pass 3 was restricted to; `None` when every table was emitted.
  pub relevant_tables:  Option<BTreeSet<String>>,
}

impl RunSummary {
  pub fn has_errors(&self) -> bool { self.row_errors > 0 }
}

/// Everything the driver owned, handed back after a run.
pub struct DriverOutput<S, W> {
  pub catalog:     SchemaCatalog,
  pub mapper:      Option<ReferenceMapper>,
  pub sink:        S,
  pub diagnostics: DiagnosticLog<W>,
  pub summary:     RunSummary,
}

pub struct DumpStreamDriver<'c, S, W> {
  config:          &'c ConvertConfig,
  emitter:         AtomEmitter<S>,
  diagnostics:     DiagnosticLog<W>,
  catalog:         SchemaCatalog,
  mapper:          Option<ReferenceMapper>,
  relevant_tables: Option<BTreeSet<String>>,
  discarded:       Vec<String>,
  /// Lines already logged as malformed, so a second pass stays quiet.
  reported_rows:   HashSet<usize>,
}

impl<'c, S: ChunkSink, W: Write> DumpStreamDriver<'c, S, W> {
  pub fn new(
    config: &'c ConvertConfig,
    sink: S,
    diagnostics: DiagnosticLog<W>,
  ) -> Self {
    Self {
      config,
      emitter: AtomEmitter::new(sink, config.expressions_per_chunk),
      diagnostics,
      catalog: SchemaCatalog::new(),
      mapper: None,
      relevant_tables: None,
      discarded: Vec::new(),
      reported_rows: HashSet::new(),
    }
  }

  /// Enable the mapping pass with these reference tables.
  pub fn with_reference(mut self, mapper: ReferenceMapper) -> Self {
    self.mapper = Some(mapper);
    self
  }

  /// Run every pass over `source`.
  pub fn run<D, P>(
    mut self,
    source: &D,
    observer: &mut P,
  ) -> Result<DriverOutput<S, W>>
  where
    D: DumpSource + ?Sized,
    P: ProgressObserver + ?Sized,
  {
    if !self.config.schema_only {
      self.emitter.start()?;
    }
    self.schema_pass(source, observer)?;
    self.discard_keyless_tables()?;

    if !self.config.schema_only {
      if self.mapper.is_some() {
        self.mapping_pass(source, observer)?;
      }
      self.data_pass(source, observer)?;
    }
    self.finish()
  }

  // ─── Pass 1 ──────────────────────────────────────────────────────────────

  fn schema_pass<D, P>(&mut self, source: &D, observer: &mut P) -> Result<()>
  where
    D: DumpSource + ?Sized,
    P: ProgressObserver + ?Sized,
  {
    info!("schema pass started");
    let mut builder = SchemaBuilder::new(self.config.ignored_columns.clone());
    let mut scanner = Scanner::new(source.open()?, Pass::Schema, observer);
    while let Some(statement) = scanner.next_statement()? {
      match statement {
        Statement::CreateTable { line, text } => {
          builder.declare_table(line, text)?;
        }
        Statement::Constraint { line, header, body } => {
          let constraint = ddl::parse_constraint(header, body)
            .map_err(|e| Error::schema(line, e))?;
          if let Some(constraint) = constraint {
            builder.add_constraint(line, constraint);
          }
        }
        Statement::CopyStart { .. } => scanner.skip_copy_block(),
        Statement::Row { .. } => {}
      }
    }
    scanner.finish();

    self.catalog = builder.finish()?;
    if let Some(mapper) = &mut self.mapper {
      for table in self.catalog.tables() {
        if let Some(pk) = &table.primary_key {
          mapper.set_sql_primary_key(&table.name, pk);
        }
      }
    }
    info!(tables = self.catalog.len(), "schema pass finished");
    Ok(())
  }

  fn discard_keyless_tables(&mut self) -> Result<()> {
    for table in self.catalog.discard_tables_without_primary_key() {
      self
        .diagnostics
        .record(&Diagnostic::DiscardedTable { table: table.clone() })?;
      self.discarded.push(table);
    }
    Ok(())
  }

  // ─── Pass 2 ──────────────────────────────────────────────────────────────

  fn mapping_pass<D, P>(&mut self, source: &D, observer: &mut P) -> Result<()>
  where
    D: DumpSource + ?Sized,
    P: ProgressObserver + ?Sized,
  {
    let Some(mapper) = &self.mapper else {
      return Ok(());
    };
    if mapper.all_tables_mapped() {
      info!("reference mapping preloaded, skipping mapping pass");
    } else {
      info!("mapping pass started");
      self.scan_for_mappings(source, observer)?;
    }

    let Some(mapper) = &mut self.mapper else {
      return Ok(());
    };
    mapper.finalize_near_matches(self.config.near_match_threshold);
    for (table, fields) in mapper.unmapped_fields() {
      warn!(%table, ?fields, "reference fields left unmapped");
    }

    self.emit_reference_tables();
    self.emitter.checkpoint(true, true)?;

    let mut relevant = self
      .mapper
      .as_ref()
      .map(ReferenceMapper::relevant_sql_tables)
      .unwrap_or_default();
    relevant.extend(self.config.extra_tables.iter().map(|t| ddl::qualify(t)));
    info!(tables = ?relevant, "mapping pass finished");
    self.relevant_tables = Some(relevant);
    Ok(())
  }

  fn scan_for_mappings<D, P>(
    &mut self,
    source: &D,
    observer: &mut P,
  ) -> Result<()>
  where
    D: DumpSource + ?Sized,
    P: ProgressObserver + ?Sized,
  {
    let mut scanner = Scanner::new(source.open()?, Pass::Mapping, observer);
    let mut target: Option<CopyHeader> = None;
    while let Some(statement) = scanner.next_statement()? {
      match statement {
        Statement::CopyStart { line, text } => {
          target = self.start_copy(line, text)?;
          if target.is_none() {
            scanner.skip_copy_block();
          }
        }
        Statement::Row { line, raw } => {
          if let Some(target) = &target {
            self.observe_row(target, line, raw)?;
          }
          if self.mapper.as_ref().is_none_or(|m| m.all_tables_mapped()) {
            break;
          }
        }
        Statement::CreateTable { .. } | Statement::Constraint { .. } => {}
      }
    }
    scanner.finish();
    Ok(())
  }

  fn observe_row(
    &mut self,
    target: &CopyHeader,
    line: usize,
    raw: &str,
  ) -> Result<()> {
    let Some(values) = self.split_row(target, line, raw)? else {
      return Ok(());
    };
    let (Some(schema), Some(mapper)) =
      (self.catalog.table(&target.table), self.mapper.as_mut())
    else {
      return Ok(());
    };
    for (column, value) in target.columns.iter().zip(values) {
      if schema.is_ignored(column) || schema.foreign_keys.contains_key(column)
      {
        continue;
      }
      mapper.observe(&target.table, column, value);
    }
    Ok(())
  }

  /// Emit every reference row as schema relations between its values,
  /// recording each node as relevant.
  fn emit_reference_tables(&mut self) {
    let Some(mapper) = &self.mapper else {
      return;
    };
    let catalog = &self.catalog;
    let emitter = &mut self.emitter;
    emitter.set_recording_relevance(true);
    for table in mapper.tables() {
      let types: Vec<ColumnType<'_>> = table
        .header()
        .iter()
        .map(|field| match table.mapping(field) {
          Some(sql) => {
            catalog.resolve_column_type(Some(sql.table.as_str()), &sql.field)
          },
          None => ColumnType::Value(ValueClass::Verbatim),
        })
        .collect();
      for row in table.rows() {
        for (k1, v1) in row.iter().enumerate() {
          if table.mapping(&table.header()[k1]).is_none() {
            continue;
          }
          let node1 = reference_value_node(emitter, types[k1], v1);
          for (k2, v2) in row.iter().enumerate() {
            if k2 == k1 {
              continue;
            }
            let node2 = reference_value_node(emitter, types[k2], v2);
            let schema = emitter
              .add_node(NodeType::Kind(AtomKind::Schema), &table.header()[k2]);
            emitter.add_schema_relation(
              Some(schema.as_str()),
              node1.as_deref(),
              node2.as_deref(),
            );
          }
        }
      }
    }
    emitter.set_recording_relevance(false);
  }

  // ─── Pass 3 ──────────────────────────────────────────────────────────────

  fn data_pass<D, P>(&mut self, source: &D, observer: &mut P) -> Result<()>
  where
    D: DumpSource + ?Sized,
    P: ProgressObserver + ?Sized,
  {
    info!("data pass started");
    let mut scanner = Scanner::new(source.open()?, Pass::Data, observer);
    let mut target: Option<CopyHeader> = None;
    while let Some(statement) = scanner.next_statement()? {
      match statement {
        Statement::CopyStart { line, text } => {
          target = self.start_copy(line, text)?;
          if target.is_none() {
            scanner.skip_copy_block();
          }
        }
        Statement::Row { line, raw } => {
          if self.emitter.chunk_full() {
            self.emitter.checkpoint(true, false)?;
          }
          if let Some(target) = &target {
            self.emit_row(target, line, raw)?;
          }
        }
        Statement::CreateTable { .. } | Statement::Constraint { .. } => {}
      }
    }
    scanner.finish();
    self.emitter.checkpoint(false, false)?;
    info!(
      expressions = self.emitter.total_expressions(),
      files = self.emitter.files_opened(),
      "data pass finished"
    );
    Ok(())
  }

  fn emit_row(
    &mut self,
    target: &CopyHeader,
    line: usize,
    raw: &str,
  ) -> Result<()> {
    let Some(values) = self.split_row(target, line, raw)? else {
      return Ok(());
    };
    let Some(schema) = self.catalog.table(&target.table) else {
      return Ok(());
    };
    let Some(pk) = schema.primary_key.as_deref() else {
      return Ok(());
    };
    let Some(pk_value) = target
      .columns
      .iter()
      .zip(&values)
      .find_map(|(column, value)| (column == pk).then_some(*value))
    else {
      return Ok(());
    };

    let table = schema.short_name();
    let gated = self.mapper.is_some();
    let emitter = &mut self.emitter;

    let subject = emitter.add_node(NodeType::Table(table), pk_value);
    let subject_relevant = emitter.is_relevant(&subject);

    for (column, value) in target.columns.iter().zip(values) {
      if schema.is_ignored(column) {
        continue;
      }
      if let Some(fk) = schema.foreign_keys.get(column) {
        if value == NULL_SENTINEL {
          continue;
        }
        let referenced = ddl::short_name(&fk.table);
        let predicate =
          emitter.add_node(NodeType::Kind(AtomKind::Predicate), referenced);
        let object = emitter.add_node(
          NodeType::Kind(AtomKind::Concept),
          &atom::compose_name(referenced, value),
        );
        if !gated || subject_relevant || emitter.is_relevant(&object) {
          emitter.add_evaluation(
            Some(predicate.as_str()),
            Some(subject.as_str()),
            Some(object.as_str()),
          );
        }
      } else if column != pk {
        let Some(declared) = schema.column(column) else {
          continue;
        };
        let class = declared.sql_type.value_class();
        let Some(object) =
          emitter.add_value_node(ColumnType::Value(class), value)
        else {
          continue;
        };
        let relation = emitter.add_node(
          NodeType::Kind(AtomKind::Schema),
          &atom::compose_name(table, column),
        );
        if !gated || subject_relevant || emitter.is_relevant(&object) {
          emitter.add_schema_relation(
            Some(relation.as_str()),
            Some(subject.as_str()),
            Some(object.as_str()),
          );
        }
      }
    }
    Ok(())
  }

  // ─── Shared ──────────────────────────────────────────────────────────────

  /// Parse a `COPY` header and decide whether its rows are processed.
  fn start_copy(&self, line: usize, text: &str) -> Result<Option<CopyHeader>> {
    let header =
      ddl::parse_copy_header(text).map_err(|e| Error::schema(line, e))?;
    if self.catalog.is_discarded(&header.table)
      || self
        .relevant_tables
        .as_ref()
        .is_some_and(|r| !r.contains(&header.table))
    {
      return Ok(None);
    }
    let schema = self.catalog.table(&header.table).ok_or_else(|| {
      Error::schema(line, SchemaError::UnknownTable(header.table.clone()))
    })?;
    if let Some(column) = header
      .columns
      .iter()
      .find(|c| !schema.has_column(c) && !schema.is_ignored(c))
    {
      return Err(Error::schema(line, SchemaError::UnknownCopyColumn {
        table:  header.table.clone(),
        column: column.clone(),
      }));
    }
    if let Some(pk) = &schema.primary_key
      && !header.columns.contains(pk)
    {
      return Err(Error::schema(line, SchemaError::UnknownCopyColumn {
        table:  header.table.clone(),
        column: pk.clone(),
      }));
    }
    Ok(Some(header))
  }

  /// Split a row on tabs, logging it instead when its width is wrong.
  fn split_row<'r>(
    &mut self,
    target: &CopyHeader,
    line: usize,
    raw: &'r str,
  ) -> Result<Option<Vec<&'r str>>> {
    let values: Vec<&str> = raw.split('\t').collect();
    if values.len() == target.columns.len() {
      return Ok(Some(values));
    }
    if self.reported_rows.insert(line) {
      self.diagnostics.record(&Diagnostic::RowShape {
        line,
        table: target.table.clone(),
        header: target.columns.clone(),
        raw: raw.to_string(),
      })?;
    }
    Ok(None)
  }

  fn finish(mut self) -> Result<DriverOutput<S, W>> {
    self.diagnostics.flush()?;
    let summary = RunSummary {
      files_written:    self.emitter.files_opened(),
      expressions:      self.emitter.total_expressions(),
      row_errors:       self.diagnostics.row_errors(),
      discarded_tables: self.discarded,
      unmapped_fields:  self
        .mapper
        .as_ref()
        .map(ReferenceMapper::unmapped_fields)
        .unwrap_or_default(),
      relevant_tables:  self.relevant_tables,
    };
    Ok(DriverOutput {
      catalog: self.catalog,
      mapper: self.mapper,
      sink: self.emitter.finish()?,
      diagnostics: self.diagnostics,
      summary,
    })
  }
}

/// Reference values are never SQL NULL; an empty cell simply has no node.
fn reference_value_node<S: ChunkSink>(
  emitter: &mut AtomEmitter<S>,
  column_type: ColumnType<'_>,
  value: &str,
) -> Option<String> {
  if value.is_empty() {
    return None;
  }
  emitter.add_value_node(column_type, value)
}
