//! Progress reporting hooks.

use strum::{AsRefStr, Display};

/// One full read of the dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display)]
pub enum Pass {
  /// Tables and key constraints.
  #[strum(serialize = "schema")]
  Schema,
  /// Reference-table mapping inference.
  #[strum(serialize = "mapping")]
  Mapping,
  /// Atom emission.
  #[strum(serialize = "data")]
  Data,
}

/// Receives progress from the driver. Every method defaults to a no-op.
pub trait ProgressObserver {
  fn pass_started(&mut self, _pass: Pass) {}

  /// Called periodically with the number of lines read so far in `pass`.
  fn lines_read(&mut self, _pass: Pass, _lines: u64) {}

  fn pass_finished(&mut self, _pass: Pass) {}
}

/// Ignores all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {}

/// Lines between two `lines_read` notifications.
pub(crate) const REPORT_INTERVAL: u64 = 16_384;
