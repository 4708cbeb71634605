//! Non-coding RNA gene exports (`ncRNA_genes_*.json`).
//!
//! Each file holds `{ "data": [ <gene record>, ... ] }`. Records are
//! flattened into seven related tables; synonym and cross-reference pairs
//! are recorded in both directions.

use std::{fs::File, io::BufReader, path::Path};

use atomize_core::reference::ReferenceTable;
use serde::Deserialize;

use crate::{Error, Result, normalize::ValueNormalizer};

pub const FILE_PREFIX: &str = "ncRNA_genes_";
pub const FILE_SUFFIX: &str = ".json";

// ─── Records ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Export {
  data: Vec<GeneRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct GeneRecord {
  primary_id:          String,
  symbol:              String,
  #[serde(default)]
  sequence:            String,
  taxon_id:            String,
  so_term_id:          String,
  gene:                Gene,
  #[serde(default)]
  symbol_synonyms:     Vec<String>,
  #[serde(default)]
  publications:        Vec<String>,
  #[serde(default)]
  genome_locations:    Vec<GenomeLocation>,
  #[serde(default)]
  #[allow(dead_code)]
  url:                 Option<String>,
  #[serde(default)]
  cross_reference_ids: Vec<String>,
  #[serde(default)]
  related_sequences:   Vec<RelatedSequence>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Gene {
  gene_id:   String,
  symbol:    String,
  #[serde(default)]
  locus_tag: String,
  #[serde(default)]
  synonyms:  Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GenomeLocation {
  assembly:      String,
  gca_accession: String,
  #[serde(default)]
  exons:         Vec<Exon>,
}

#[derive(Debug, Deserialize)]
struct Exon {
  #[serde(rename = "INSDC_accession")]
  insdc_accession: String,
  chromosome:      String,
  strand:          String,
  #[serde(rename = "startPosition")]
  start_position:  u64,
  #[serde(rename = "endPosition")]
  end_position:    u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelatedSequence {
  sequence_id:  String,
  relationship: String,
}

// ─── Tables ──────────────────────────────────────────────────────────────────

struct RawTable {
  name:   &'static str,
  header: &'static [&'static str],
  rows:   Vec<Vec<String>>,
}

impl RawTable {
  fn new(name: &'static str, header: &'static [&'static str]) -> Self {
    Self {
      name,
      header,
      rows: Vec::new(),
    }
  }

  fn push<const N: usize>(&mut self, row: [&str; N]) {
    self.rows.push(row.iter().map(|v| v.to_string()).collect());
  }

  fn push_symmetric(&mut self, a: &str, b: &str) {
    self.push([a, b]);
    self.push([b, a]);
  }
}

/// Accumulates gene records from any number of export files.
pub struct NcRnaTables {
  genes:            RawTable,
  synonyms:         RawTable,
  cross_references: RawTable,
  related:          RawTable,
  gene_synonyms:    RawTable,
  publications:     RawTable,
  locations:        RawTable,
  records:          usize,
}

const PAIR: &[&str] = &["symbol1", "symbol2"];

impl Default for NcRnaTables {
  fn default() -> Self {
    Self {
      genes:            RawTable::new("ncRNA_genes", &[
        "primaryId",
        "symbol",
        "sequence",
        "taxonId",
        "soTermId",
        "gene_geneId",
        "gene_symbol",
        "gene_locusTag",
      ]),
      synonyms:         RawTable::new("ncRNA_genes_synonyms", PAIR),
      cross_references: RawTable::new("ncRNA_genes_cross_references", PAIR),
      related:          RawTable::new("ncRNA_genes_related_sequences", &[
        "primaryId",
        "sequenceId",
        "relationship",
      ]),
      gene_synonyms:    RawTable::new("ncRNA_genes_gene_synonyms", PAIR),
      publications:     RawTable::new("ncRNA_genes_publications", &[
        "primaryId",
        "publication",
      ]),
      locations:        RawTable::new("ncRNA_genes_genome_locations", &[
        "primaryId",
        "assembly",
        "gca_accession",
        "INSDC_accession",
        "chromosome",
        "strand",
        "startPosition",
        "endPosition",
      ]),
      records:          0,
    }
  }
}

impl NcRnaTables {
  pub fn new() -> Self { Self::default() }

  /// Whether `file_name` looks like an export file.
  pub fn matches(file_name: &str) -> bool {
    file_name.starts_with(FILE_PREFIX) && file_name.ends_with(FILE_SUFFIX)
  }

  pub fn add_file(&mut self, path: &Path) -> Result<()> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let export: Export = serde_json::from_reader(BufReader::new(file))
      .map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
      })?;
    self.add_records(export.data);
    Ok(())
  }

  pub fn add_json(&mut self, path: &Path, text: &str) -> Result<()> {
    let export: Export =
      serde_json::from_str(text).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
      })?;
    self.add_records(export.data);
    Ok(())
  }

  /// Number of gene records seen so far.
  pub fn records(&self) -> usize { self.records }

  fn add_records(&mut self, records: Vec<GeneRecord>) {
    for record in records {
      self.add_record(&record);
    }
  }

  fn add_record(&mut self, r: &GeneRecord) {
    self.records += 1;
    let id = r.primary_id.as_str();
    self.genes.push([
      id,
      &r.symbol,
      &r.sequence,
      &r.taxon_id,
      &r.so_term_id,
      &r.gene.gene_id,
      &r.gene.symbol,
      &r.gene.locus_tag,
    ]);
    for synonym in &r.symbol_synonyms {
      self.synonyms.push_symmetric(&r.symbol, synonym);
    }
    for xref in &r.cross_reference_ids {
      self.cross_references.push_symmetric(&r.symbol, xref);
    }
    for related in &r.related_sequences {
      self
        .related
        .push([id, &related.sequence_id, &related.relationship]);
    }
    for synonym in &r.gene.synonyms {
      self.gene_synonyms.push_symmetric(&r.gene.symbol, synonym);
    }
    for publication in &r.publications {
      self.publications.push([id, publication]);
    }
    for location in &r.genome_locations {
      for exon in &location.exons {
        self.locations.push([
          id,
          &location.assembly,
          &location.gca_accession,
          &exon.insdc_accession,
          &exon.chromosome,
          &exon.strand,
          &exon.start_position.to_string(),
          &exon.end_position.to_string(),
        ]);
      }
    }
  }

  /// Build the seven tables, normalizing every value.
  pub fn into_tables(
    self,
    normalizer: &ValueNormalizer,
  ) -> Result<Vec<ReferenceTable>> {
    [
      self.genes,
      self.synonyms,
      self.cross_references,
      self.related,
      self.gene_synonyms,
      self.publications,
      self.locations,
    ]
    .into_iter()
    .map(|raw| -> Result<ReferenceTable> {
      let header = raw.header.iter().map(|h| h.to_string()).collect();
      let mut table = ReferenceTable::new(raw.name, header)?;
      for row in &raw.rows {
        let row = normalizer.normalize_row(row.iter().map(String::as_str));
        table.add_row(row)?;
      }
      Ok(table)
    })
    .collect()
  }
}
