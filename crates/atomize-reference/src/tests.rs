use std::fs;

use atomize_core::{config::DEFAULT_IDENTIFIER_PATTERN, reference::SqlColumn};

use super::*;

const GENES: &str = "## FlyBase genes\n#gene_id\tsymbol\n#-----\n\
                     FB:FBgn0000001\tabc\nFBgn0000002\tdef\n";

const EXPORT: &str = r#"{"data": [{
  "primaryId": "FB:FBtr0000001",
  "symbol": "snoRNA:1",
  "taxonId": "NCBITaxon:7227",
  "soTermId": "SO:0000275",
  "gene": {"geneId": "FB:FBgn0000001", "symbol": "snoRNA"}
}]}"#;

fn names(set: &ReferenceSet) -> Vec<&str> {
  set.tables.iter().map(ReferenceTable::name).collect()
}

#[test]
fn loads_exports_before_tables() {
  let dir = tempfile::tempdir().unwrap();
  fs::write(dir.path().join("genes.tsv"), GENES).unwrap();
  fs::write(dir.path().join("empty.tsv"), "#only\n").unwrap();
  fs::write(dir.path().join("ncRNA_genes_a.json"), EXPORT).unwrap();
  fs::write(dir.path().join("ncRNA_genes_b.json"), EXPORT).unwrap();
  fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

  let set = load_dir(dir.path(), Some(DEFAULT_IDENTIFIER_PATTERN)).unwrap();
  assert_eq!(set.tables.len(), 8);
  assert_eq!(names(&set)[0], "ncRNA_genes");
  assert_eq!(names(&set)[7], "genes.tsv");
  assert_eq!(set.tables[0].rows().len(), 2);
  let mut ids: Vec<&str> = set.tables[7].values("gene_id").collect();
  ids.sort_unstable();
  assert_eq!(ids, ["FBgn0000001", "FBgn0000002"]);
  assert!(set.preloaded.is_none());

  let mapper = set.into_mapper().unwrap();
  assert!(!mapper.all_tables_mapped());
}

#[test]
fn mapping_file_preloads_the_mapper() {
  let dir = tempfile::tempdir().unwrap();
  fs::write(dir.path().join("genes.tsv"), GENES).unwrap();
  fs::write(
    dir.path().join(mapping::MAPPING_FILE),
    "genes.tsv\tgene_id\tpublic.feature\tuniquename\n\
     missing.tsv\tx\tpublic.feature\tname\n",
  )
  .unwrap();

  let set = load_dir(dir.path(), None).unwrap();
  assert_eq!(set.preloaded.as_ref().map(Vec::len), Some(2));

  let mapper = set.into_mapper().unwrap();
  assert!(mapper.all_tables_mapped());
  assert_eq!(
    mapper.tables()[0].mapping("gene_id"),
    Some(&SqlColumn::new("public.feature", "uniquename"))
  );
  assert_eq!(mapper.tables()[0].mapping("symbol"), None);
}

#[test]
fn missing_directory_is_an_io_error() {
  let dir = tempfile::tempdir().unwrap();
  let err = load_dir(&dir.path().join("absent"), None).unwrap_err();
  assert!(matches!(err, Error::Io { .. }));
}

#[test]
fn bad_identifier_pattern_is_rejected() {
  let dir = tempfile::tempdir().unwrap();
  assert!(matches!(
    load_dir(dir.path(), Some("([")),
    Err(Error::Pattern(_))
  ));
}
