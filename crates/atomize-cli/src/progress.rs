//! Terminal progress bars for the conversion passes.

use std::{
  fs::File,
  io::{self, BufRead, BufReader},
  path::Path,
};

use atomize_core::progress::{Pass, ProgressObserver};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

const TEMPLATE: &str =
  "{prefix:>28} {bar:40.cyan/blue} {human_pos}/{human_len} lines \
   [{elapsed_precise}]";

/// One bar per pass, sized by the dump's line count.
pub struct BarProgress {
  multi: MultiProgress,
  label: String,
  total: u64,
  bar:   Option<ProgressBar>,
}

impl BarProgress {
  /// Counts the lines of `dump` up front so every bar has a length.
  pub fn new(multi: &MultiProgress, dump: &Path) -> io::Result<Self> {
    let label = dump
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();
    Ok(Self {
      multi: multi.clone(),
      label,
      total: count_lines(dump)?,
      bar: None,
    })
  }
}

impl ProgressObserver for BarProgress {
  fn pass_started(&mut self, pass: Pass) {
    let bar = self.multi.add(ProgressBar::new(self.total));
    bar.set_style(style());
    bar.set_prefix(format!("{} {pass}", self.label));
    self.bar = Some(bar);
  }

  fn lines_read(&mut self, _pass: Pass, lines: u64) {
    if let Some(bar) = &self.bar {
      bar.set_position(lines);
    }
  }

  fn pass_finished(&mut self, _pass: Pass) {
    if let Some(bar) = self.bar.take() {
      bar.set_position(self.total);
      bar.finish();
    }
  }
}

fn style() -> ProgressStyle {
  ProgressStyle::with_template(TEMPLATE)
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("##-")
}

/// Number of newline-terminated lines in `path`, plus a trailing partial
/// line if there is one.
pub fn count_lines(path: &Path) -> io::Result<u64> {
  let mut reader = BufReader::with_capacity(1 << 20, File::open(path)?);
  let mut lines = 0;
  let mut last = b'\n';
  loop {
    let buf = reader.fill_buf()?;
    let Some(&tail) = buf.last() else {
      break;
    };
    lines += buf.iter().filter(|&&b| b == b'\n').count() as u64;
    last = tail;
    let len = buf.len();
    reader.consume(len);
  }
  if last != b'\n' {
    lines += 1;
  }
  Ok(lines)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn counts_lines_with_and_without_trailing_newline() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.sql");
    let b = dir.path().join("b.sql");
    let c = dir.path().join("c.sql");
    std::fs::write(&a, "one\ntwo\n").unwrap();
    std::fs::write(&b, "one\ntwo").unwrap();
    std::fs::write(&c, "").unwrap();
    assert_eq!(count_lines(&a).unwrap(), 2);
    assert_eq!(count_lines(&b).unwrap(), 2);
    assert_eq!(count_lines(&c).unwrap(), 0);
  }

  #[test]
  fn bars_follow_passes() {
    let dir = tempfile::tempdir().unwrap();
    let dump = dir.path().join("dump.sql");
    std::fs::write(&dump, "a\nb\nc\n").unwrap();
    let multi = MultiProgress::with_draw_target(
      indicatif::ProgressDrawTarget::hidden(),
    );

    let mut progress = BarProgress::new(&multi, &dump).unwrap();
    assert_eq!(progress.total, 3);
    progress.pass_started(Pass::Schema);
    progress.lines_read(Pass::Schema, 2);
    assert_eq!(progress.bar.as_ref().map(ProgressBar::position), Some(2));
    progress.pass_finished(Pass::Schema);
    assert!(progress.bar.is_none());
  }
}
