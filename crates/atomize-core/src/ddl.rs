//! Statement parsing for the subset of the dump dialect the compiler reads.
//!
//! `CREATE TABLE` statements and the two-line `ALTER TABLE … ADD CONSTRAINT`
//! forms are handed to `sqlparser` with the PostgreSQL dialect. `COPY … FROM
//! stdin` headers are read directly, since their rows are streamed by the
//! scanner rather than parsed as SQL.

use sqlparser::{
  ast::{
    AlterTableOperation, CharacterLength, ColumnDef, DataType, ExactNumberInfo,
    ObjectName, Statement, TableConstraint,
  },
  dialect::PostgreSqlDialect,
  parser::Parser,
};
use tracing::{debug, warn};

use crate::{
  error::SchemaError,
  schema::{Column, SqlType},
};

pub const CREATE_TABLE_PREFIX: &str = "CREATE TABLE ";
pub const CREATE_TABLE_SUFFIX: &str = ");";
pub const ADD_CONSTRAINT_PREFIX: &str = "ADD CONSTRAINT ";
pub const PRIMARY_KEY: &str = " PRIMARY KEY ";
pub const FOREIGN_KEY: &str = " FOREIGN KEY ";
pub const COPY_PREFIX: &str = "COPY ";
pub const COPY_SUFFIX: &str = "\\.";
/// SQL NULL inside a COPY block.
pub const NULL_SENTINEL: &str = "\\N";

const DEFAULT_SCHEMA: &str = "public";

// ─── Names ───────────────────────────────────────────────────────────────────

/// Strip surrounding double quotes from an identifier.
pub fn unquote(identifier: &str) -> &str {
  identifier
    .strip_prefix('"')
    .and_then(|s| s.strip_suffix('"'))
    .unwrap_or(identifier)
}

/// Schema-qualify a table name, defaulting to `public`, and unquote both
/// parts.
pub fn qualify(name: &str) -> String {
  match name.split_once('.') {
    Some((schema, table)) => format!("{}.{}", unquote(schema), unquote(table)),
    None => format!("{DEFAULT_SCHEMA}.{}", unquote(name)),
  }
}

/// The part of a qualified name after the schema.
pub fn short_name(qualified: &str) -> &str {
  qualified
    .split_once('.')
    .map(|(_, table)| table)
    .unwrap_or(qualified)
}

fn object_name(name: &ObjectName) -> String {
  match name.0.as_slice() {
    [table] => format!("{DEFAULT_SCHEMA}.{}", table.value),
    [.., schema, table] => format!("{}.{}", schema.value, table.value),
    [] => String::new(),
  }
}

/// Contents of the first parenthesized group in `text`, split on commas.
fn paren_list(text: &str) -> Option<Vec<String>> {
  let open = text.find('(')?;
  let close = open + text[open..].find(')')?;
  Some(
    text[open + 1..close]
      .split(',')
      .map(|s| unquote(s.trim()).to_string())
      .filter(|s| !s.is_empty())
      .collect(),
  )
}

/// Parse `text` as exactly one PostgreSQL statement.
fn parse_statement(text: &str) -> Option<Statement> {
  match Parser::parse_sql(&PostgreSqlDialect {}, text) {
    Ok(statements) if statements.len() == 1 => statements.into_iter().next(),
    Ok(statements) => {
      debug!(count = statements.len(), "expected a single statement");
      None
    }
    Err(e) => {
      debug!(error = %e, "statement rejected by parser");
      None
    }
  }
}

// ─── CREATE TABLE ────────────────────────────────────────────────────────────

/// Parse an accumulated `CREATE TABLE` statement into its qualified name and
/// every declared column. Table-level constraints are left to the separate
/// `ALTER TABLE` statements.
pub fn parse_create_table(
  text: &str,
) -> Result<(String, Vec<Column>), SchemaError> {
  let malformed = || SchemaError::MalformedCreateTable(text.to_string());
  let Some(Statement::CreateTable(create)) = parse_statement(text) else {
    return Err(malformed());
  };
  if create.columns.is_empty() {
    return Err(malformed());
  }
  let columns = create.columns.iter().map(column).collect();
  Ok((object_name(&create.name), columns))
}

fn column(def: &ColumnDef) -> Column {
  let rendered = def.data_type.to_string().to_ascii_lowercase();
  let base = match rendered.split_once('(') {
    Some((head, tail)) => {
      let rest = tail.split_once(')').map_or("", |(_, rest)| rest);
      format!("{}{rest}", head.trim_end())
    }
    None => rendered,
  };
  Column {
    name:     def.name.value.clone(),
    sql_type: SqlType::from_sql(base.trim()),
    size:     type_size(&def.data_type),
  }
}

/// The parenthesized argument of a sized type, e.g. `255` or `10,2`.
fn type_size(data_type: &DataType) -> Option<String> {
  match data_type {
    DataType::Character(length)
    | DataType::Char(length)
    | DataType::CharacterVarying(length)
    | DataType::CharVarying(length)
    | DataType::Varchar(length) => match length {
      Some(CharacterLength::IntegerLength { length, .. }) => {
        Some(length.to_string())
      }
      Some(CharacterLength::Max) => Some("max".to_string()),
      None => None,
    },
    DataType::Numeric(info) | DataType::Decimal(info) => match info {
      ExactNumberInfo::None => None,
      ExactNumberInfo::Precision(p) => Some(p.to_string()),
      ExactNumberInfo::PrecisionAndScale(p, s) => Some(format!("{p},{s}")),
    },
    _ => None,
  }
}

// ─── ALTER TABLE … ADD CONSTRAINT ────────────────────────────────────────────

/// A key constraint awaiting resolution against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
  PrimaryKey {
    table:  String,
    column: String,
  },
  ForeignKey {
    table:      String,
    column:     String,
    ref_table:  String,
    ref_column: String,
  },
}

/// Parse a two-line key constraint: the `ALTER TABLE` line and the
/// `ADD CONSTRAINT` line after it.
///
/// Returns `Ok(None)` for constraints that carry no single-column key
/// (composite keys); those tables simply never gain a usable key from it.
pub fn parse_constraint(
  header: &str,
  body: &str,
) -> Result<Option<Constraint>, SchemaError> {
  let malformed =
    || SchemaError::MalformedConstraint(format!("{header} / {body}"));
  let Some(Statement::AlterTable {
    name, operations, ..
  }) = parse_statement(&format!("{header}\n{body}"))
  else {
    return Err(malformed());
  };
  let table = object_name(&name);

  for operation in operations {
    let AlterTableOperation::AddConstraint(constraint) = operation else {
      continue;
    };
    match constraint {
      TableConstraint::PrimaryKey { columns, .. } => {
        return match columns.as_slice() {
          [column] => Ok(Some(Constraint::PrimaryKey {
            table,
            column: column.value.clone(),
          })),
          [] => Err(malformed()),
          _ => {
            warn!(
              %table,
              columns = columns.len(),
              "ignoring composite primary key"
            );
            Ok(None)
          }
        };
      }
      TableConstraint::ForeignKey {
        columns,
        foreign_table,
        referred_columns,
        ..
      } => {
        return match (columns.as_slice(), referred_columns.as_slice()) {
          ([column], [ref_column]) => Ok(Some(Constraint::ForeignKey {
            table,
            column: column.value.clone(),
            ref_table: object_name(&foreign_table),
            ref_column: ref_column.value.clone(),
          })),
          ([], _) | (_, []) => Err(malformed()),
          _ => {
            warn!(
              %table,
              columns = columns.len(),
              "ignoring composite foreign key"
            );
            Ok(None)
          }
        };
      }
      _ => {}
    }
  }
  Err(malformed())
}

// ─── COPY ────────────────────────────────────────────────────────────────────

/// The target of a `COPY … FROM stdin;` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyHeader {
  pub table:   String,
  pub columns: Vec<String>,
}

pub fn parse_copy_header(line: &str) -> Result<CopyHeader, SchemaError> {
  let malformed = || SchemaError::MalformedCopy(line.to_string());
  let rest = line.strip_prefix(COPY_PREFIX).ok_or_else(malformed)?;
  let table = rest
    .split(|c: char| c.is_whitespace() || c == '(')
    .next()
    .filter(|s| !s.is_empty())
    .ok_or_else(malformed)?;
  let columns = paren_list(rest).ok_or_else(malformed)?;
  if columns.is_empty() {
    return Err(malformed());
  }
  Ok(CopyHeader {
    table: qualify(table),
    columns,
  })
}
