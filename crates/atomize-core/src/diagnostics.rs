//! Non-fatal conditions met while streaming a dump.
//!
//! Each [`Diagnostic`] is written as one line to the run's error log. Only
//! row-shape problems count as errors; discarded tables are informational.

use std::{
  fmt,
  io::{self, Write},
};

use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
  /// A data row whose field count differs from its `COPY` header.
  RowShape {
    line:   usize,
    table:  String,
    header: Vec<String>,
    raw:    String,
  },
  /// A table without a primary key, excluded from data emission.
  DiscardedTable { table: String },
}

impl Diagnostic {
  pub fn is_error(&self) -> bool { matches!(self, Self::RowShape { .. }) }
}

impl fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::RowShape {
        line,
        table,
        header,
        raw,
      } => write!(
        f,
        "invalid row at line {line} in table {table}: expected {} fields \
         [{}], raw line <{raw}>",
        header.len(),
        header.join(", ")
      ),
      Self::DiscardedTable { table } => {
        write!(f, "discarded table {table}: no PRIMARY KEY defined")
      }
    }
  }
}

/// Writes diagnostics one per line and keeps counts.
#[derive(Debug)]
pub struct DiagnosticLog<W> {
  writer:     W,
  row_errors: usize,
  discarded:  usize,
}

impl<W: Write> DiagnosticLog<W> {
  pub fn new(writer: W) -> Self {
    Self {
      writer,
      row_errors: 0,
      discarded: 0,
    }
  }

  pub fn record(&mut self, diagnostic: &Diagnostic) -> io::Result<()> {
    debug!(%diagnostic, "diagnostic");
    match diagnostic {
      Diagnostic::RowShape { .. } => self.row_errors += 1,
      Diagnostic::DiscardedTable { .. } => self.discarded += 1,
    }
    writeln!(self.writer, "{diagnostic}")
  }

  /// True once any row-level error was recorded.
  pub fn has_errors(&self) -> bool { self.row_errors > 0 }

  pub fn row_errors(&self) -> usize { self.row_errors }

  pub fn discarded_tables(&self) -> usize { self.discarded }

  pub fn flush(&mut self) -> io::Result<()> { self.writer.flush() }

  pub fn into_inner(self) -> W { self.writer }
}

impl DiagnosticLog<Vec<u8>> {
  pub fn in_memory() -> Self { Self::new(Vec::new()) }

  pub fn contents(&self) -> String {
    String::from_utf8_lossy(&self.writer).into_owned()
  }
}
