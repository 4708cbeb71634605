//! Destinations for atom chunks.
//!
//! The emitter writes through [`ChunkSink`]; [`DirectorySink`] produces the
//! numbered `file_NNN.metta` files, [`MemorySink`] keeps chunks in memory
//! for tests.

use std::{
  fs::{self, File},
  io::{self, BufWriter, Write},
  path::{Path, PathBuf},
};

use tracing::debug;

/// A single writer of sequential output files.
pub trait ChunkSink {
  /// Close the current file, if any, and start the next one.
  fn open_next(&mut self) -> io::Result<()>;

  /// Append one expression to the current file.
  fn write_expression(&mut self, expression: &str) -> io::Result<()>;

  /// Flush and close the current file.
  fn close(&mut self) -> io::Result<()>;

  /// Number of files opened so far.
  fn files_opened(&self) -> usize;
}

// ─── Directory ───────────────────────────────────────────────────────────────

pub struct DirectorySink {
  dir:     PathBuf,
  next:    usize,
  current: Option<BufWriter<File>>,
}

impl DirectorySink {
  /// Create `dir` if needed and remove anything already inside it.
  pub fn create(dir: impl AsRef<Path>) -> io::Result<Self> {
    let dir = dir.as_ref().to_path_buf();
    fs::create_dir_all(&dir)?;
    for entry in fs::read_dir(&dir)? {
      let path = entry?.path();
      if path.is_dir() {
        fs::remove_dir_all(&path)?;
      } else {
        fs::remove_file(&path)?;
      }
    }
    Ok(Self {
      dir,
      next: 1,
      current: None,
    })
  }

  pub fn file_path(&self, number: usize) -> PathBuf {
    self.dir.join(format!("file_{number:03}.metta"))
  }
}

impl ChunkSink for DirectorySink {
  fn open_next(&mut self) -> io::Result<()> {
    self.close()?;
    let path = self.file_path(self.next);
    debug!(path = %path.display(), "opening output file");
    self.current = Some(BufWriter::new(File::create(path)?));
    self.next += 1;
    Ok(())
  }

  fn write_expression(&mut self, expression: &str) -> io::Result<()> {
    let writer = self.current.as_mut().ok_or_else(|| {
      io::Error::new(io::ErrorKind::NotConnected, "no output file is open")
    })?;
    writer.write_all(expression.as_bytes())?;
    writer.write_all(b"\n")
  }

  fn close(&mut self) -> io::Result<()> {
    if let Some(mut writer) = self.current.take() {
      writer.flush()?;
    }
    Ok(())
  }

  fn files_opened(&self) -> usize { self.next - 1 }
}

// ─── Memory ──────────────────────────────────────────────────────────────────

/// Keeps every file as a list of lines.
#[derive(Debug, Default)]
pub struct MemorySink {
  pub files: Vec<Vec<String>>,
}

impl MemorySink {
  pub fn new() -> Self { Self::default() }

  /// All lines of all files, in order.
  pub fn lines(&self) -> impl Iterator<Item = &str> {
    self.files.iter().flatten().map(String::as_str)
  }
}

impl ChunkSink for MemorySink {
  fn open_next(&mut self) -> io::Result<()> {
    self.files.push(Vec::new());
    Ok(())
  }

  fn write_expression(&mut self, expression: &str) -> io::Result<()> {
    self
      .files
      .last_mut()
      .ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotConnected, "no output file is open")
      })?
      .push(expression.to_string());
    Ok(())
  }

  fn close(&mut self) -> io::Result<()> { Ok(()) }

  fn files_opened(&self) -> usize { self.files.len() }
}
