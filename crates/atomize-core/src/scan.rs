//! Line-level state machine over a dump.
//!
//! [`Scanner`] reads the dump once, tracks whether it is between statements,
//! inside a `CREATE TABLE` body or inside a `COPY` block, and yields the
//! statements each pass cares about. What to do with them is up to the
//! caller.

use std::{
  fs::File,
  io::{self, BufRead, BufReader},
  path::Path,
};

use crate::{
  ddl::{
    ADD_CONSTRAINT_PREFIX, COPY_PREFIX, COPY_SUFFIX, CREATE_TABLE_PREFIX,
    CREATE_TABLE_SUFFIX, FOREIGN_KEY, PRIMARY_KEY,
  },
  progress::{Pass, ProgressObserver, REPORT_INTERVAL},
};

/// Something that can be read from the start once per pass.
pub trait DumpSource {
  fn open(&self) -> io::Result<Box<dyn BufRead + '_>>;
}

impl DumpSource for Path {
  fn open(&self) -> io::Result<Box<dyn BufRead + '_>> {
    Ok(Box::new(BufReader::new(File::open(self)?)))
  }
}

impl DumpSource for str {
  fn open(&self) -> io::Result<Box<dyn BufRead + '_>> {
    Ok(Box::new(self.as_bytes()))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
  AwaitingCommand,
  ReadingCreateTable,
  ReadingCopyBlock { skipping: bool },
}

#[derive(Debug, Clone, Copy)]
enum Kind {
  CreateTable,
  Constraint,
  CopyStart,
  Row,
}

/// A statement of interest, borrowed from the scanner's buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statement<'s> {
  /// A complete `CREATE TABLE` statement, ignorable lines removed.
  CreateTable { line: usize, text: &'s str },
  /// An `ADD CONSTRAINT` line for a primary or foreign key, together with
  /// the `ALTER TABLE` line before it.
  Constraint {
    line:   usize,
    header: &'s str,
    body:   &'s str,
  },
  /// A `COPY … FROM stdin;` line. Rows follow unless the caller calls
  /// [`Scanner::skip_copy_block`].
  CopyStart { line: usize, text: &'s str },
  /// One data row, with only its line terminator removed.
  Row { line: usize, raw: &'s str },
}

pub struct Scanner<'s, P: ?Sized> {
  reader:   Box<dyn BufRead + 's>,
  observer: &'s mut P,
  pass:     Pass,
  state:    State,
  line:     usize,
  current:  String,
  previous: String,
  ddl:      String,
}

impl<'s, P: ProgressObserver + ?Sized> Scanner<'s, P> {
  pub fn new(
    reader: Box<dyn BufRead + 's>,
    pass: Pass,
    observer: &'s mut P,
  ) -> Self {
    observer.pass_started(pass);
    Self {
      reader,
      observer,
      pass,
      state: State::AwaitingCommand,
      line: 0,
      current: String::new(),
      previous: String::new(),
      ddl: String::new(),
    }
  }

  /// Advance to the next statement, or `None` at end of input.
  pub fn next_statement(&mut self) -> io::Result<Option<Statement<'_>>> {
    let kind = loop {
      if !self.read_line()? {
        return Ok(None);
      }
      if let Some(kind) = self.step() {
        break kind;
      }
    };
    Ok(Some(self.statement(kind)))
  }

  /// Ignore the rows of the `COPY` block that just started.
  pub fn skip_copy_block(&mut self) {
    if let State::ReadingCopyBlock { skipping } = &mut self.state {
      *skipping = true;
    }
  }

  /// Number of lines read so far.
  pub fn line(&self) -> usize { self.line }

  /// Report the final line count and close the pass.
  pub fn finish(self) {
    self.observer.lines_read(self.pass, self.line as u64);
    self.observer.pass_finished(self.pass);
  }

  fn read_line(&mut self) -> io::Result<bool> {
    std::mem::swap(&mut self.previous, &mut self.current);
    self.current.clear();
    if self.reader.read_line(&mut self.current)? == 0 {
      return Ok(false);
    }
    self.line += 1;
    if self.line as u64 % REPORT_INTERVAL == 0 {
      self.observer.lines_read(self.pass, self.line as u64);
    }
    Ok(true)
  }

  fn step(&mut self) -> Option<Kind> {
    let line = self.current.trim();
    match self.state {
      State::AwaitingCommand => {
        if line.starts_with(CREATE_TABLE_PREFIX) {
          self.ddl.clear();
          self.ddl.push_str(line);
          self.state = State::ReadingCreateTable;
          None
        } else if line.starts_with(ADD_CONSTRAINT_PREFIX)
          && (line.contains(PRIMARY_KEY) || line.contains(FOREIGN_KEY))
        {
          Some(Kind::Constraint)
        } else if line.starts_with(COPY_PREFIX) {
          self.state = State::ReadingCopyBlock { skipping: false };
          Some(Kind::CopyStart)
        } else {
          None
        }
      }
      State::ReadingCreateTable => {
        self.ddl.push('\n');
        self.ddl.push_str(line);
        if line.starts_with(CREATE_TABLE_SUFFIX) {
          self.state = State::AwaitingCommand;
          Some(Kind::CreateTable)
        } else {
          None
        }
      }
      State::ReadingCopyBlock { skipping } => {
        if line.starts_with(COPY_SUFFIX) {
          self.state = State::AwaitingCommand;
          None
        } else if skipping {
          None
        } else {
          Some(Kind::Row)
        }
      }
    }
  }

  fn statement(&self, kind: Kind) -> Statement<'_> {
    let line = self.line;
    match kind {
      Kind::CreateTable => Statement::CreateTable {
        line,
        text: &self.ddl,
      },
      Kind::Constraint => Statement::Constraint {
        line,
        header: self.previous.trim(),
        body: self.current.trim(),
      },
      Kind::CopyStart => Statement::CopyStart {
        line,
        text: self.current.trim(),
      },
      Kind::Row => Statement::Row {
        line,
        raw: self.current.trim_end_matches(['\n', '\r']),
      },
    }
  }
}
