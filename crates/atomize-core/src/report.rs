//! Human-readable reports written next to the atom files.

use std::{collections::BTreeSet, fmt::Write};

use crate::{
  reference::{ReferenceMapper, ReferenceTable},
  schema::{Column, SchemaCatalog, TableSchema},
};

/// Every table with its columns, keys marked. With `relevant`, only those
/// tables are listed.
pub fn schema_report(
  catalog: &SchemaCatalog,
  relevant: Option<&BTreeSet<String>>,
) -> String {
  let mut out = String::new();
  for table in catalog.tables() {
    if relevant.is_some_and(|r| !r.contains(&table.name)) {
      continue;
    }
    out.push_str(&table.name);
    out.push('\n');
    for column in &table.columns {
      out.push_str(&column_line(table, column));
      out.push('\n');
    }
    out.push('\n');
  }
  out
}

fn column_line(table: &TableSchema, column: &Column) -> String {
  let sql_type = match &column.size {
    Some(size) => format!("{}({size})", column.sql_type),
    None => column.sql_type.to_string(),
  };
  if table.is_primary_key(&column.name) {
    format!("    PK {sql_type} {}", column.name)
  } else if let Some(fk) = table.foreign_keys.get(&column.name) {
    format!(
      "    FK {sql_type} {} -> {} {}",
      column.name, fk.table, fk.column
    )
  } else {
    format!("       {sql_type} {}", column.name)
  }
}

/// Resolved mappings per reference table, then the tables still missing
/// some.
pub fn mapping_report(mapper: &ReferenceMapper) -> String {
  let mut out = String::new();
  let mapped: Vec<&ReferenceTable> = mapper.mapped_tables().collect();
  let unmapped: Vec<&ReferenceTable> = mapper.unmapped_tables().collect();

  let _ = writeln!(out, "Fully mapped tables: {}", mapped.len());
  for table in mapped {
    write_mapped_fields(&mut out, table);
  }
  if unmapped.is_empty() {
    return out;
  }
  let _ = writeln!(out, "Non (or partially) mapped tables: {}", unmapped.len());
  for table in unmapped {
    write_mapped_fields(&mut out, table);
    for field in table.unmapped_fields() {
      let _ = writeln!(out, "\t{field} -> ???");
    }
  }
  out
}

fn write_mapped_fields(out: &mut String, table: &ReferenceTable) {
  let _ = writeln!(out, "{}", table.name());
  for (field, sql) in table.mapped_fields() {
    let _ = writeln!(out, "\t{field} -> {} {}", sql.table, sql.field);
  }
}
