//! Textual atom forms.
//!
//! Every expression is a single line in parenthesized prefix notation:
//!
//! ```text
//! (: Concept Type)                                      type declaration
//! (: "Concept:True" Concept)                            node declaration
//! (Inheritance <a> <b>)
//! (Evaluation <predicate> (List <a> <b>))
//! (Schema <schema> <a> <b>)
//! ```
//!
//! Links refer to nodes by their canonical name, `"<type> <name>"`, where the
//! name of a Concept, Predicate or Schema node carries its type as a prefix.

use std::fmt;

use strum::{AsRefStr, Display, EnumIter, IntoEnumIterator};

/// The fixed atom-kind vocabulary declared at the top of every output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumIter)]
pub enum AtomKind {
  Concept,
  Predicate,
  Schema,
  Number,
  Verbatim,
  Inheritance,
  Evaluation,
  List,
}

impl AtomKind {
  /// Kinds whose node names are prefixed with the kind itself.
  pub fn is_typed_name(self) -> bool {
    matches!(self, Self::Concept | Self::Predicate | Self::Schema)
  }

  /// `(: <kind> Type)` for every kind, in declaration order.
  pub fn preamble() -> impl Iterator<Item = String> {
    Self::iter().map(|kind| type_declaration(kind.as_ref()))
  }
}

/// The type of a node: one of the fixed kinds, or a table-scoped type for
/// primary-key nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType<'a> {
  Kind(AtomKind),
  /// Short name of the table owning the key.
  Table(&'a str),
}

impl NodeType<'_> {
  fn is_typed_name(&self) -> bool {
    matches!(self, Self::Kind(kind) if kind.is_typed_name())
  }
}

impl fmt::Display for NodeType<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Kind(kind) => f.write_str(kind.as_ref()),
      Self::Table(table) => f.write_str(table),
    }
  }
}

/// The textual forms of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeText {
  /// `(: <type> Type)`
  pub type_declaration: String,
  /// `(: "<name>" <type>)`
  pub declaration:      String,
  /// `"<type> <name>"`, used by links.
  pub canonical:        String,
}

/// Replace characters that would break the surrounding expression.
pub fn sanitize(raw: &str) -> String {
  raw.replace('(', "[").replace(')', "]").replace('"', "")
}

pub fn type_declaration(name: &str) -> String { format!("(: {name} Type)") }

/// Build the declaration and canonical name for a node of `node_type`
/// named `raw`.
pub fn node_text(node_type: NodeType<'_>, raw: &str) -> NodeText {
  let name = sanitize(raw);
  let (quoted, canonical) = if node_type.is_typed_name() {
    (
      format!("\"{node_type}:{name}\""),
      format!("\"{node_type} {node_type}:{name}\""),
    )
  } else {
    (format!("\"{name}\""), format!("\"{node_type} {name}\""))
  };
  NodeText {
    type_declaration: type_declaration(&node_type.to_string()),
    declaration: format!("(: {quoted} {node_type})"),
    canonical,
  }
}

pub fn inheritance(a: &str, b: &str) -> String {
  format!("({} {a} {b})", AtomKind::Inheritance)
}

pub fn evaluation(predicate: &str, a: &str, b: &str) -> String {
  format!(
    "({} {predicate} ({} {a} {b}))",
    AtomKind::Evaluation,
    AtomKind::List
  )
}

pub fn schema_relation(schema: &str, a: &str, b: &str) -> String {
  format!("({} {schema} {a} {b})", AtomKind::Schema)
}

/// `<a>_<b>`, used for composed concept and schema names.
pub fn compose_name(a: &str, b: &str) -> String { format!("{a}_{b}") }

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn preamble_lists_every_kind_in_order() {
    let lines: Vec<String> = AtomKind::preamble().collect();
    assert_eq!(lines, [
      "(: Concept Type)",
      "(: Predicate Type)",
      "(: Schema Type)",
      "(: Number Type)",
      "(: Verbatim Type)",
      "(: Inheritance Type)",
      "(: Evaluation Type)",
      "(: List Type)",
    ]);
  }

  #[test]
  fn typed_name_nodes_carry_their_kind() {
    let text = node_text(NodeType::Kind(AtomKind::Predicate), "author");
    assert_eq!(text.declaration, "(: \"Predicate:author\" Predicate)");
    assert_eq!(text.canonical, "\"Predicate Predicate:author\"");
    assert_eq!(text.type_declaration, "(: Predicate Type)");
  }

  #[test]
  fn plain_nodes_and_table_scoped_nodes() {
    let text = node_text(NodeType::Kind(AtomKind::Number), "42");
    assert_eq!(text.declaration, "(: \"42\" Number)");
    assert_eq!(text.canonical, "\"Number 42\"");

    let text = node_text(NodeType::Table("author"), "1");
    assert_eq!(text.declaration, "(: \"1\" author)");
    assert_eq!(text.canonical, "\"author 1\"");
    assert_eq!(text.type_declaration, "(: author Type)");
  }

  #[test]
  fn structural_characters_are_normalized() {
    let text = node_text(
      NodeType::Kind(AtomKind::Verbatim),
      "say \"hi\" (twice)",
    );
    assert_eq!(text.declaration, "(: \"say hi [twice]\" Verbatim)");
  }

  #[test]
  fn link_forms() {
    assert_eq!(inheritance("a", "b"), "(Inheritance a b)");
    assert_eq!(evaluation("p", "a", "b"), "(Evaluation p (List a b))");
    assert_eq!(schema_relation("s", "a", "b"), "(Schema s a b)");
    assert_eq!(compose_name("author", "1"), "author_1");
  }
}
