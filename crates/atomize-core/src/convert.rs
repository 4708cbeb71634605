//! Converting one dump file into an output directory.

use std::{
  fs::{self, File},
  io::BufWriter,
  path::{Path, PathBuf},
};

use tracing::{info, warn};

use crate::{
  Error, Result,
  config::ConvertConfig,
  diagnostics::DiagnosticLog,
  driver::{DumpStreamDriver, RunSummary},
  progress::ProgressObserver,
  reference::ReferenceMapper,
  report,
  sink::DirectorySink,
};

/// Where the outputs for one dump go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
  /// `<out>/<base>/`, holding `file_NNN.metta`.
  pub atoms_dir:      PathBuf,
  pub error_log:      PathBuf,
  pub schema_report:  PathBuf,
  pub mapping_report: PathBuf,
}

impl OutputLayout {
  /// Lay out outputs for `dump` under `output_dir`, named after the dump's
  /// file stem.
  pub fn new(output_dir: &Path, dump: &Path) -> Result<Self> {
    let base = dump
      .file_stem()
      .and_then(|s| s.to_str())
      .filter(|s| !s.is_empty())
      .ok_or_else(|| {
        Error::Config(format!("dump path {} has no file name", dump.display()))
      })?;
    Ok(Self {
      atoms_dir:      output_dir.join(base),
      error_log:      output_dir.join(format!("{base}_errors.txt")),
      schema_report:  output_dir.join(format!("{base}_schema.txt")),
      mapping_report: output_dir.join(format!("{base}_mapping.txt")),
    })
  }
}

/// Convert `dump` into atom files and reports under `config.output_dir`.
///
/// The dump's atom directory is emptied first. With a `mapper`, the mapping
/// pass runs and a mapping report is written.
pub fn convert<P: ProgressObserver + ?Sized>(
  dump: &Path,
  config: &ConvertConfig,
  mapper: Option<ReferenceMapper>,
  observer: &mut P,
) -> Result<RunSummary> {
  config.validate()?;
  let layout = OutputLayout::new(&config.output_dir, dump)?;
  fs::create_dir_all(&config.output_dir)?;
  info!(
    dump = %dump.display(),
    output = %layout.atoms_dir.display(),
    "converting"
  );

  let sink = DirectorySink::create(&layout.atoms_dir)?;
  let errors =
    DiagnosticLog::new(BufWriter::new(File::create(&layout.error_log)?));
  let mut driver = DumpStreamDriver::new(config, sink, errors);
  if let Some(mapper) = mapper {
    driver = driver.with_reference(mapper);
  }
  let output = driver.run(dump, observer)?;

  fs::write(
    &layout.schema_report,
    report::schema_report(
      &output.catalog,
      output.summary.relevant_tables.as_ref(),
    ),
  )?;
  if let Some(mapper) = &output.mapper {
    fs::write(&layout.mapping_report, report::mapping_report(mapper))?;
  }

  let summary = output.summary;
  if summary.has_errors() {
    warn!(
      errors = summary.row_errors,
      log = %layout.error_log.display(),
      "rows were skipped"
    );
  }
  info!(
    files = summary.files_written,
    expressions = summary.expressions,
    "conversion finished"
  );
  Ok(summary)
}
