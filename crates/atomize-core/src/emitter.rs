//! Chunked atom emission.
//!
//! [`AtomEmitter`] accumulates type declarations, nodes and links for the
//! current chunk, deduplicating types and nodes by their text, and flushes
//! them to a [`ChunkSink`] on [`AtomEmitter::checkpoint`]. Types are written
//! before nodes and nodes before links, so every name a link uses has been
//! declared earlier in the same file.

use std::{collections::HashSet, io};

use indexmap::IndexSet;

use crate::{
  atom::{self, AtomKind, NodeType},
  ddl::NULL_SENTINEL,
  schema::{ColumnType, ValueClass},
  sink::ChunkSink,
};

pub struct AtomEmitter<S> {
  sink:                  S,
  types:                 IndexSet<String>,
  nodes:                 IndexSet<String>,
  links:                 Vec<String>,
  /// Expressions accumulated in the current chunk.
  chunk_expressions:     u64,
  total_expressions:     u64,
  expressions_per_chunk: u64,
  recording_relevance:   bool,
  relevant_nodes:        HashSet<String>,
  relevant_names:        HashSet<String>,
}

impl<S: ChunkSink> AtomEmitter<S> {
  pub fn new(sink: S, expressions_per_chunk: u64) -> Self {
    Self {
      sink,
      types: IndexSet::new(),
      nodes: IndexSet::new(),
      links: Vec::new(),
      chunk_expressions: 0,
      total_expressions: 0,
      expressions_per_chunk: expressions_per_chunk.max(1),
      recording_relevance: false,
      relevant_nodes: HashSet::new(),
      relevant_names: HashSet::new(),
    }
  }

  /// Open the first output file.
  pub fn start(&mut self) -> io::Result<()> { self.open_file() }

  // ── Nodes ─────────────────────────────────────────────────────────────────

  /// Register a node and its type in the current chunk and return its
  /// canonical name. Repeated calls with the same node are free.
  pub fn add_node(&mut self, node_type: NodeType<'_>, raw: &str) -> String {
    let text = atom::node_text(node_type, raw);
    if self.recording_relevance {
      self.relevant_nodes.insert(text.declaration.clone());
      self.relevant_names.insert(text.canonical.clone());
    }
    self.types.insert(text.type_declaration);
    if self.nodes.insert(text.declaration) {
      self.count_expression();
    }
    text.canonical
  }

  /// Build the node for one column value, or `None` when the value is SQL
  /// NULL or its type is not emitted.
  pub fn add_value_node(
    &mut self,
    column_type: ColumnType<'_>,
    raw: &str,
  ) -> Option<String> {
    if raw == NULL_SENTINEL {
      return None;
    }
    let node = match column_type {
      ColumnType::PrimaryKey { table } => {
        self.add_node(NodeType::Table(table), raw)
      }
      ColumnType::Value(ValueClass::Truth) => {
        let truth = if raw.eq_ignore_ascii_case("t") {
          "True"
        } else {
          "False"
        };
        self.add_node(NodeType::Kind(AtomKind::Concept), truth)
      }
      ColumnType::Value(ValueClass::Number) => {
        self.add_node(NodeType::Kind(AtomKind::Number), raw)
      }
      ColumnType::Value(ValueClass::Verbatim) => {
        self.add_node(NodeType::Kind(AtomKind::Verbatim), raw)
      }
      ColumnType::Value(ValueClass::Unsupported) => return None,
    };
    Some(node)
  }

  // ── Links ─────────────────────────────────────────────────────────────────

  pub fn add_inheritance(&mut self, a: Option<&str>, b: Option<&str>) {
    if let (Some(a), Some(b)) = (a, b) {
      self.push_link(atom::inheritance(a, b));
    }
  }

  pub fn add_evaluation(
    &mut self,
    predicate: Option<&str>,
    a: Option<&str>,
    b: Option<&str>,
  ) {
    if let (Some(p), Some(a), Some(b)) = (predicate, a, b) {
      self.push_link(atom::evaluation(p, a, b));
    }
  }

  pub fn add_schema_relation(
    &mut self,
    schema: Option<&str>,
    a: Option<&str>,
    b: Option<&str>,
  ) {
    if let (Some(s), Some(a), Some(b)) = (schema, a, b) {
      self.push_link(atom::schema_relation(s, a, b));
    }
  }

  fn push_link(&mut self, link: String) {
    self.links.push(link);
    self.count_expression();
  }

  fn count_expression(&mut self) {
    self.chunk_expressions += 1;
    self.total_expressions += 1;
  }

  // ── Relevance ─────────────────────────────────────────────────────────────

  /// While recording, every node added is remembered as relevant across
  /// chunks.
  pub fn set_recording_relevance(&mut self, recording: bool) {
    self.recording_relevance = recording;
  }

  /// Whether a node with this canonical name was added while recording.
  pub fn is_relevant(&self, canonical: &str) -> bool {
    self.relevant_names.contains(canonical)
  }

  // ── Chunking ──────────────────────────────────────────────────────────────

  /// True once the current chunk holds at least the configured number of
  /// expressions.
  pub fn chunk_full(&self) -> bool {
    self.chunk_expressions >= self.expressions_per_chunk
  }

  /// Flush the current chunk: types, then nodes (optionally only relevant
  /// ones), then links. With `open_new_file` the next file is started.
  pub fn checkpoint(
    &mut self,
    open_new_file: bool,
    filter_to_relevant: bool,
  ) -> io::Result<()> {
    for line in self.types.drain(..) {
      self.sink.write_expression(&line)?;
    }
    for line in self.nodes.drain(..) {
      if !filter_to_relevant || self.relevant_nodes.contains(&line) {
        self.sink.write_expression(&line)?;
      }
    }
    for line in self.links.drain(..) {
      self.sink.write_expression(&line)?;
    }
    self.chunk_expressions = 0;
    if open_new_file {
      self.open_file()?;
    }
    Ok(())
  }

  fn open_file(&mut self) -> io::Result<()> {
    self.sink.open_next()?;
    for line in AtomKind::preamble() {
      self.sink.write_expression(&line)?;
    }
    Ok(())
  }

  pub fn total_expressions(&self) -> u64 { self.total_expressions }

  pub fn files_opened(&self) -> usize { self.sink.files_opened() }

  pub fn sink(&self) -> &S { &self.sink }

  /// Close the last file and hand back the sink.
  pub fn finish(mut self) -> io::Result<S> {
    self.sink.close()?;
    Ok(self.sink)
  }
}
