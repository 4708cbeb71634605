//! Table schemas recovered from the dump's DDL.
//!
//! The catalog is built in two phases. `CREATE TABLE` statements are declared
//! as they stream past, while key constraints are only collected; once the
//! schema pass is over, [`SchemaBuilder::finish`] resolves every constraint
//! against the declared tables and fails on the first one that does not fit.

use std::{collections::HashSet, fmt};

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::{
  Error, Result,
  config::ColumnFilter,
  ddl::{self, Constraint},
  error::SchemaError,
};

// ─── SQL types ───────────────────────────────────────────────────────────────

/// The SQL types the dump dialect uses, as a closed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlType {
  BigInt,
  Integer,
  SmallInt,
  DoublePrecision,
  Boolean,
  Character,
  CharacterVarying,
  Date,
  Text,
  Jsonb,
  /// Anything else, kept verbatim for the schema report.
  Other(String),
}

impl SqlType {
  /// Map a lower-cased, whitespace-normalized type name (size stripped).
  pub fn from_sql(name: &str) -> Self {
    match name {
      "bigint" => Self::BigInt,
      "integer" => Self::Integer,
      "smallint" => Self::SmallInt,
      "double precision" => Self::DoublePrecision,
      "boolean" => Self::Boolean,
      "character" => Self::Character,
      "character varying" => Self::CharacterVarying,
      "date" => Self::Date,
      "text" => Self::Text,
      "jsonb" => Self::Jsonb,
      other if other.contains("character") => Self::CharacterVarying,
      other => Self::Other(other.to_string()),
    }
  }

  pub fn value_class(&self) -> ValueClass {
    match self {
      Self::BigInt | Self::Integer | Self::SmallInt | Self::DoublePrecision => {
        ValueClass::Number
      }
      Self::Character | Self::CharacterVarying | Self::Date | Self::Text => {
        ValueClass::Verbatim
      }
      Self::Boolean => ValueClass::Truth,
      Self::Jsonb | Self::Other(_) => ValueClass::Unsupported,
    }
  }
}

impl fmt::Display for SqlType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::BigInt => "bigint",
      Self::Integer => "integer",
      Self::SmallInt => "smallint",
      Self::DoublePrecision => "double precision",
      Self::Boolean => "boolean",
      Self::Character => "character",
      Self::CharacterVarying => "character varying",
      Self::Date => "date",
      Self::Text => "text",
      Self::Jsonb => "jsonb",
      Self::Other(name) => name,
    };
    f.write_str(name)
  }
}

/// How a column's values become nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueClass {
  Number,
  Verbatim,
  /// Boolean columns collapse onto two truth concepts.
  Truth,
  /// Dropped from emission.
  Unsupported,
}

/// The resolved type of a column, as needed to build its value node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType<'a> {
  /// The column is its table's primary key; nodes are typed by the table's
  /// short name.
  PrimaryKey { table: &'a str },
  Value(ValueClass),
}

// ─── Tables ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
  pub name:     String,
  pub sql_type: SqlType,
  /// Parenthesized type argument, e.g. `255` or `10,2`.
  pub size:     Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
  pub table:  String,
  pub column: String,
}

#[derive(Debug, Clone)]
pub struct TableSchema {
  /// Schema-qualified name, e.g. `public.author`.
  pub name:         String,
  pub columns:      Vec<Column>,
  pub primary_key:  Option<String>,
  pub foreign_keys: IndexMap<String, ForeignKey>,
  /// Declared columns left out by the column filter. `COPY` headers may
  /// still name them.
  pub ignored:      HashSet<String>,
}

impl TableSchema {
  pub fn new(name: String, columns: Vec<Column>) -> Self {
    Self {
      name,
      columns,
      primary_key: None,
      foreign_keys: IndexMap::new(),
      ignored: HashSet::new(),
    }
  }

  /// Split `columns` into kept and ignored ones with `filter`.
  pub fn filtered(
    name: String,
    columns: Vec<Column>,
    filter: &ColumnFilter,
  ) -> Self {
    let (ignored, kept): (Vec<_>, Vec<_>) =
      columns.into_iter().partition(|c| filter.ignores_declared(c));
    Self {
      ignored: ignored.into_iter().map(|c| c.name).collect(),
      ..Self::new(name, kept)
    }
  }

  pub fn short_name(&self) -> &str { ddl::short_name(&self.name) }

  pub fn column(&self, name: &str) -> Option<&Column> {
    self.columns.iter().find(|c| c.name == name)
  }

  pub fn has_column(&self, name: &str) -> bool { self.column(name).is_some() }

  pub fn is_ignored(&self, name: &str) -> bool { self.ignored.contains(name) }

  pub fn is_primary_key(&self, column: &str) -> bool {
    self.primary_key.as_deref() == Some(column)
  }
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

/// All tables declared by a dump, keyed by qualified name in declaration
/// order.
#[derive(Debug, Default)]
pub struct SchemaCatalog {
  tables:    IndexMap<String, TableSchema>,
  discarded: HashSet<String>,
}

impl SchemaCatalog {
  pub fn new() -> Self { Self::default() }

  /// Parse one accumulated `CREATE TABLE` statement and record the table,
  /// setting aside the columns `filter` ignores.
  pub fn declare_table(
    &mut self,
    ddl_text: &str,
    filter: &ColumnFilter,
  ) -> Result<&TableSchema, SchemaError> {
    let (name, columns) = ddl::parse_create_table(ddl_text)?;
    let schema = TableSchema::filtered(name.clone(), columns, filter);
    debug!(
      table = %name,
      columns = schema.columns.len(),
      ignored = schema.ignored.len(),
      "declared table"
    );
    let index = self.tables.insert_full(name, schema).0;
    Ok(&self.tables[index])
  }

  pub fn set_primary_key(
    &mut self,
    table: &str,
    column: &str,
  ) -> Result<(), SchemaError> {
    let schema = self.table_mut(table)?;
    if let Some(existing) = &schema.primary_key {
      return Err(SchemaError::DuplicatePrimaryKey {
        table:    table.to_string(),
        existing: existing.clone(),
      });
    }
    if !schema.has_column(column) {
      return Err(unknown_column(table, column));
    }
    schema.primary_key = Some(column.to_string());
    Ok(())
  }

  pub fn add_foreign_key(
    &mut self,
    table: &str,
    column: &str,
    ref_table: &str,
    ref_column: &str,
  ) -> Result<(), SchemaError> {
    let referenced = self
      .tables
      .get(ref_table)
      .ok_or_else(|| SchemaError::UnknownTable(ref_table.to_string()))?;
    if !referenced.has_column(ref_column) {
      return Err(unknown_column(ref_table, ref_column));
    }
    let schema = self.table_mut(table)?;
    if !schema.has_column(column) {
      return Err(unknown_column(table, column));
    }
    schema.foreign_keys.insert(column.to_string(), ForeignKey {
      table:  ref_table.to_string(),
      column: ref_column.to_string(),
    });
    Ok(())
  }

  /// Resolve the type used to build nodes for `table.column`.
  ///
  /// Unknown tables or columns fall back to verbatim text; reference-table
  /// fields with no SQL counterpart take this path.
  pub fn resolve_column_type<'a>(
    &'a self,
    table: Option<&str>,
    column: &str,
  ) -> ColumnType<'a> {
    let Some(schema) = table.and_then(|t| self.tables.get(t)) else {
      return ColumnType::Value(ValueClass::Verbatim);
    };
    match schema.column(column) {
      Some(_) if schema.is_primary_key(column) => ColumnType::PrimaryKey {
        table: schema.short_name(),
      },
      Some(c) => ColumnType::Value(c.sql_type.value_class()),
      None => ColumnType::Value(ValueClass::Verbatim),
    }
  }

  pub fn table(&self, name: &str) -> Option<&TableSchema> {
    self.tables.get(name)
  }

  pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
    self.tables.values()
  }

  pub fn len(&self) -> usize { self.tables.len() }

  pub fn is_empty(&self) -> bool { self.tables.is_empty() }

  /// Exclude every table without a primary key from data emission and
  /// return the names newly discarded, in declaration order.
  pub fn discard_tables_without_primary_key(&mut self) -> Vec<String> {
    let newly: Vec<String> = self
      .tables
      .values()
      .filter(|t| t.primary_key.is_none() && !self.discarded.contains(&t.name))
      .map(|t| t.name.clone())
      .collect();
    for name in &newly {
      warn!(table = %name, "discarding table without primary key");
      self.discarded.insert(name.clone());
    }
    newly
  }

  pub fn is_discarded(&self, table: &str) -> bool {
    self.discarded.contains(table)
  }

  fn table_mut(&mut self, name: &str) -> Result<&mut TableSchema, SchemaError> {
    self
      .tables
      .get_mut(name)
      .ok_or_else(|| SchemaError::UnknownTable(name.to_string()))
  }
}

fn unknown_column(table: &str, column: &str) -> SchemaError {
  SchemaError::UnknownColumn {
    table:  table.to_string(),
    column: column.to_string(),
  }
}

// ─── Two-phase builder ───────────────────────────────────────────────────────

/// Accumulates schema facts during the schema pass.
#[derive(Debug)]
pub struct SchemaBuilder {
  catalog: SchemaCatalog,
  filter:  ColumnFilter,
  pending: Vec<(usize, Constraint)>,
}

impl SchemaBuilder {
  pub fn new(filter: ColumnFilter) -> Self {
    Self {
      catalog: SchemaCatalog::new(),
      filter,
      pending: Vec::new(),
    }
  }

  /// Declare a table from DDL text that ended on dump line `line`.
  pub fn declare_table(&mut self, line: usize, ddl_text: &str) -> Result<()> {
    self
      .catalog
      .declare_table(ddl_text, &self.filter)
      .map_err(|e| Error::schema(line, e))?;
    Ok(())
  }

  pub fn add_constraint(&mut self, line: usize, constraint: Constraint) {
    self.pending.push((line, constraint));
  }

  /// Resolve every collected constraint, in dump order.
  pub fn finish(mut self) -> Result<SchemaCatalog> {
    for (line, constraint) in self.pending.drain(..) {
      let applied = match &constraint {
        Constraint::PrimaryKey { table, column } => {
          self.catalog.set_primary_key(table, column)
        }
        Constraint::ForeignKey {
          table,
          column,
          ref_table,
          ref_column,
        } => self
          .catalog
          .add_foreign_key(table, column, ref_table, ref_column),
      };
      applied.map_err(|e| Error::schema(line, e))?;
    }
    Ok(self.catalog)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const AUTHOR: &str = "CREATE TABLE public.author (\n    id integer NOT \
                        NULL,\n    name text,\n    active boolean\n);";
  const BOOK: &str = "CREATE TABLE public.book (\n    id bigint NOT NULL,\n    \
                      title character varying(255),\n    author_id \
                      integer\n);";

  fn catalog() -> SchemaCatalog {
    let mut catalog = SchemaCatalog::new();
    let filter = ColumnFilter::default();
    catalog.declare_table(AUTHOR, &filter).unwrap();
    catalog.declare_table(BOOK, &filter).unwrap();
    catalog
  }

  #[test]
  fn declare_records_columns_in_order() {
    let catalog = catalog();
    let book = catalog.table("public.book").unwrap();
    let names: Vec<&str> =
      book.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["id", "title", "author_id"]);
    assert_eq!(book.columns[1].sql_type, SqlType::CharacterVarying);
    assert_eq!(book.columns[1].size.as_deref(), Some("255"));
    assert_eq!(book.short_name(), "book");
  }

  #[test]
  fn declare_sets_aside_filtered_columns() {
    let mut catalog = SchemaCatalog::new();
    let event = catalog
      .declare_table(
        "CREATE TABLE public.event (\n    id integer,\n    created \
         timestamp without time zone,\n    timelastmodified date,\n    \
         label text\n);",
        &ColumnFilter::default(),
      )
      .unwrap();
    let names: Vec<&str> =
      event.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["id", "label"]);
    assert!(event.is_ignored("created"));
    assert!(event.is_ignored("timelastmodified"));
    assert!(!event.has_column("created"));
  }

  #[test]
  fn second_primary_key_is_rejected() {
    let mut catalog = catalog();
    catalog.set_primary_key("public.author", "id").unwrap();
    let err = catalog.set_primary_key("public.author", "name").unwrap_err();
    assert!(matches!(err, SchemaError::DuplicatePrimaryKey { .. }));
  }

  #[test]
  fn primary_key_on_unknown_column_is_rejected() {
    let mut catalog = catalog();
    let err = catalog.set_primary_key("public.author", "nope").unwrap_err();
    assert!(matches!(err, SchemaError::UnknownColumn { .. }));
  }

  #[test]
  fn foreign_key_checks_both_sides() {
    let mut catalog = catalog();
    assert!(
      catalog
        .add_foreign_key("public.book", "author_id", "public.author", "id")
        .is_ok()
    );
    let err = catalog
      .add_foreign_key("public.book", "author_id", "public.author", "missing")
      .unwrap_err();
    assert!(matches!(err, SchemaError::UnknownColumn { .. }));
    let err = catalog
      .add_foreign_key("public.book", "editor_id", "public.author", "id")
      .unwrap_err();
    assert!(matches!(err, SchemaError::UnknownColumn { .. }));
    let fk = &catalog.table("public.book").unwrap().foreign_keys["author_id"];
    assert_eq!(fk.table, "public.author");
  }

  #[test]
  fn resolve_column_type_prefers_primary_key() {
    let mut catalog = catalog();
    catalog.set_primary_key("public.author", "id").unwrap();
    assert_eq!(
      catalog.resolve_column_type(Some("public.author"), "id"),
      ColumnType::PrimaryKey { table: "author" }
    );
    assert_eq!(
      catalog.resolve_column_type(Some("public.author"), "active"),
      ColumnType::Value(ValueClass::Truth)
    );
    assert_eq!(
      catalog.resolve_column_type(Some("public.book"), "id"),
      ColumnType::Value(ValueClass::Number)
    );
    assert_eq!(
      catalog.resolve_column_type(None, "anything"),
      ColumnType::Value(ValueClass::Verbatim)
    );
    assert_eq!(
      catalog.resolve_column_type(Some("public.nowhere"), "id"),
      ColumnType::Value(ValueClass::Verbatim)
    );
  }

  #[test]
  fn discards_tables_without_primary_key_once() {
    let mut catalog = catalog();
    catalog.set_primary_key("public.book", "id").unwrap();
    assert_eq!(catalog.discard_tables_without_primary_key(), [
      "public.author"
    ]);
    assert!(catalog.is_discarded("public.author"));
    assert!(!catalog.is_discarded("public.book"));
    assert!(catalog.discard_tables_without_primary_key().is_empty());
  }

  #[test]
  fn builder_resolves_constraints_after_declarations() {
    let mut builder = SchemaBuilder::new(ColumnFilter::default());
    builder.add_constraint(1, Constraint::ForeignKey {
      table:      "public.book".into(),
      column:     "author_id".into(),
      ref_table:  "public.author".into(),
      ref_column: "id".into(),
    });
    builder.declare_table(5, AUTHOR).unwrap();
    builder.declare_table(10, BOOK).unwrap();
    let catalog = builder.finish().unwrap();
    assert!(
      catalog
        .table("public.book")
        .unwrap()
        .foreign_keys
        .contains_key("author_id")
    );
  }

  #[test]
  fn builder_reports_line_of_bad_constraint() {
    let mut builder = SchemaBuilder::new(ColumnFilter::default());
    builder.declare_table(4, AUTHOR).unwrap();
    builder.add_constraint(42, Constraint::PrimaryKey {
      table:  "public.ghost".into(),
      column: "id".into(),
    });
    match builder.finish() {
      Err(Error::Schema { line, source }) => {
        assert_eq!(line, 42);
        assert_eq!(source, SchemaError::UnknownTable("public.ghost".into()));
      }
      other => panic!("expected schema error, got {other:?}"),
    }
  }
}
