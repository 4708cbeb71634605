//! `atomize` — compile PostgreSQL dumps into knowledge-graph atoms.
//!
//! # Usage
//!
//! ```
//! atomize dumps/flybase.sql
//! atomize --reference-dir reference/ --output-dir out/ a.sql b.sql
//! ```
//!
//! Settings come from `atomize.toml` (or `--config`), then `ATOMIZE_*`
//! environment variables, then command-line flags.

mod progress;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::{Context, Result};
use atomize_core::{
  OutputLayout, RunSummary, config::ConvertConfig, progress::NoProgress,
};
use clap::Parser;
use indicatif::{MultiProgress, ProgressDrawTarget};
use progress::BarProgress;
use tokio::task::JoinSet;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
  name = "atomize",
  version,
  about = "Compile SQL dumps into knowledge-graph atoms"
)]
struct Args {
  /// SQL dump files to convert.
  #[arg(required = true, value_name = "DUMP")]
  dumps: Vec<PathBuf>,

  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "atomize.toml", value_name = "FILE")]
  config: PathBuf,

  /// Directory receiving atom files and reports.
  #[arg(short, long, value_name = "DIR")]
  output_dir: Option<PathBuf>,

  /// Directory of reference tables; enables the mapping pass.
  #[arg(short, long, value_name = "DIR")]
  reference_dir: Option<PathBuf>,

  /// Only recover the schema and write the schema report.
  #[arg(long)]
  schema_only: bool,

  /// Disable progress bars.
  #[arg(long)]
  no_progress: bool,

  /// Expressions per output file.
  #[arg(long, value_name = "EXPRESSIONS")]
  chunk_size: Option<u64>,
}

// ─── Configuration ───────────────────────────────────────────────────────────

fn load_config(args: &Args) -> Result<ConvertConfig> {
  let path_value = |p: &Option<PathBuf>| {
    p.as_ref().map(|p| p.to_string_lossy().into_owned())
  };

  let mut builder = config::Config::builder()
    .add_source(config::File::from(args.config.clone()).required(false))
    .add_source(config::Environment::with_prefix("ATOMIZE"))
    .set_override_option("output_dir", path_value(&args.output_dir))?
    .set_override_option("reference_dir", path_value(&args.reference_dir))?
    .set_override_option("expressions_per_chunk", args.chunk_size)?;
  if args.schema_only {
    builder = builder.set_override("schema_only", true)?;
  }
  if args.no_progress {
    builder = builder.set_override("show_progress", false)?;
  }

  let config: ConvertConfig = builder
    .build()
    .context("failed to read configuration")?
    .try_deserialize()
    .context("failed to deserialise ConvertConfig")?;
  config.validate().context("invalid configuration")?;
  Ok(config)
}

// ─── Conversion ──────────────────────────────────────────────────────────────

/// Convert one dump with its own reference mapper.
fn convert_one(
  dump: &Path,
  config: &ConvertConfig,
  multi: &MultiProgress,
) -> Result<RunSummary> {
  let mapper = match &config.reference_dir {
    Some(dir) => {
      let set = atomize_reference::load_dir(
        dir,
        config.identifier_pattern.as_deref(),
      )
      .with_context(|| {
        format!("failed to load reference tables from {}", dir.display())
      })?;
      if set.is_empty() {
        warn!(dir = %dir.display(), "no reference tables found");
        None
      } else {
        Some(set.into_mapper().context("failed to apply mapping file")?)
      }
    }
    None => None,
  };

  let result = if config.show_progress {
    let mut progress = BarProgress::new(multi, dump)
      .with_context(|| format!("failed to read {}", dump.display()))?;
    atomize_core::convert(dump, config, mapper, &mut progress)
  } else {
    atomize_core::convert(dump, config, mapper, &mut NoProgress)
  };
  result.with_context(|| format!("failed to convert {}", dump.display()))
}

/// Convert every dump on its own blocking task. Outcomes are returned in
/// input order.
async fn convert_all(
  dumps: Vec<PathBuf>,
  config: Arc<ConvertConfig>,
) -> Result<Vec<(PathBuf, Result<RunSummary>)>> {
  let multi = if config.show_progress {
    MultiProgress::new()
  } else {
    MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
  };

  let mut tasks = JoinSet::new();
  for (index, dump) in dumps.into_iter().enumerate() {
    let config = Arc::clone(&config);
    let multi = multi.clone();
    tasks.spawn_blocking(move || {
      let result = convert_one(&dump, &config, &multi);
      (index, dump, result)
    });
  }

  let mut outcomes = Vec::new();
  while let Some(joined) = tasks.join_next().await {
    outcomes.push(joined.context("conversion task panicked")?);
  }
  outcomes.sort_by_key(|(index, ..)| *index);
  Ok(
    outcomes
      .into_iter()
      .map(|(_, dump, result)| (dump, result))
      .collect(),
  )
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let args = Args::parse();
  let config = load_config(&args)?;
  let output_dir = config.output_dir.clone();
  info!(dumps = args.dumps.len(), "starting conversion");

  let outcomes = convert_all(args.dumps, Arc::new(config)).await?;

  let mut failures = 0;
  for (dump, result) in &outcomes {
    match result {
      Ok(summary) if summary.has_errors() => {
        let layout = OutputLayout::new(&output_dir, dump)?;
        println!(
          "Errors occurred while processing {}. See them in {}",
          dump.display(),
          layout.error_log.display()
        );
      }
      Ok(_) => {}
      Err(e) => {
        error!("{e:#}");
        failures += 1;
      }
    }
  }
  if failures > 0 {
    anyhow::bail!("{failures} of {} conversions failed", outcomes.len());
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::*;

  const DUMP: &str = "\
CREATE TABLE public.gene (
    id integer NOT NULL,
    name text
);

COPY public.gene (id, name) FROM stdin;
1\tdpp
2\twg\textra
\\.

ALTER TABLE ONLY public.gene
    ADD CONSTRAINT gene_pkey PRIMARY KEY (id);
";

  fn args(extra: &[&str]) -> Args {
    let mut argv = vec!["atomize", "--config", "/nonexistent/atomize.toml"];
    argv.extend_from_slice(extra);
    argv.push("dump.sql");
    Args::try_parse_from(argv).unwrap()
  }

  #[test]
  fn flags_override_defaults() {
    let config = load_config(&args(&[
      "--output-dir",
      "/tmp/atoms",
      "--chunk-size",
      "1000",
      "--schema-only",
      "--no-progress",
    ]))
    .unwrap();
    assert_eq!(config.output_dir, PathBuf::from("/tmp/atoms"));
    assert_eq!(config.expressions_per_chunk, 1000);
    assert!(config.schema_only);
    assert!(!config.show_progress);
    assert!(config.reference_dir.is_none());
  }

  #[test]
  fn config_file_is_read() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("atomize.toml");
    fs::write(
      &file,
      "near_match_threshold = 0.75\nextra_tables = [\"public.gene\"]\n",
    )
    .unwrap();
    let args = Args::try_parse_from([
      "atomize",
      "--config",
      file.to_str().unwrap(),
      "dump.sql",
    ])
    .unwrap();

    let config = load_config(&args).unwrap();
    assert_eq!(config.near_match_threshold, 0.75);
    assert_eq!(config.extra_tables, ["public.gene"]);
    assert!(config.show_progress);
  }

  #[test]
  fn zero_chunk_size_is_rejected() {
    assert!(load_config(&args(&["--chunk-size", "0"])).is_err());
  }

  #[test]
  fn at_least_one_dump_is_required() {
    assert!(Args::try_parse_from(["atomize"]).is_err());
  }

  #[tokio::test]
  async fn converts_dumps_concurrently() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.sql");
    let second = dir.path().join("second.sql");
    fs::write(&first, DUMP).unwrap();
    fs::write(&second, DUMP).unwrap();
    let missing = dir.path().join("missing.sql");
    let config = ConvertConfig {
      output_dir: dir.path().join("out"),
      show_progress: false,
      ..ConvertConfig::default()
    };

    let outcomes = convert_all(
      vec![first.clone(), missing.clone(), second.clone()],
      Arc::new(config),
    )
    .await
    .unwrap();

    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0].0, first);
    assert_eq!(outcomes[1].0, missing);
    assert!(outcomes[1].1.is_err());

    let summary = outcomes[2].1.as_ref().unwrap();
    assert_eq!(summary.files_written, 1);
    assert_eq!(summary.row_errors, 1);
    let out = dir.path().join("out");
    assert!(out.join("first/file_001.metta").exists());
    assert!(out.join("second_errors.txt").exists());
  }

  #[tokio::test]
  async fn reference_directory_enables_the_mapping_pass() {
    let dir = tempfile::tempdir().unwrap();
    let dump = dir.path().join("genes.sql");
    fs::write(&dump, DUMP).unwrap();
    let reference = dir.path().join("reference");
    fs::create_dir(&reference).unwrap();
    fs::write(reference.join("symbols.tsv"), "#symbol\ndpp\n").unwrap();
    let config = ConvertConfig {
      output_dir: dir.path().join("out"),
      reference_dir: Some(reference),
      show_progress: false,
      ..ConvertConfig::default()
    };

    let outcomes = convert_all(vec![dump], Arc::new(config)).await.unwrap();
    let summary = outcomes[0].1.as_ref().unwrap();
    assert!(summary.unmapped_fields.is_empty());
    assert!(
      summary
        .relevant_tables
        .as_ref()
        .is_some_and(|t| t.contains("public.gene"))
    );
    let report =
      fs::read_to_string(dir.path().join("out/genes_mapping.txt")).unwrap();
    assert!(report.contains("\tsymbol -> public.gene name\n"));
  }
}
