//! Cleaning of raw reference values before they join a table.

use regex::Regex;

use crate::Result;

/// Trims values and, when a pattern is configured, replaces a matching
/// value by its second capture group.
#[derive(Debug, Clone, Default)]
pub struct ValueNormalizer {
  pattern: Option<Regex>,
}

impl ValueNormalizer {
  pub fn new(pattern: Option<&str>) -> Result<Self> {
    Ok(Self {
      pattern: pattern.map(Regex::new).transpose()?,
    })
  }

  pub fn normalize(&self, raw: &str) -> String {
    let value = raw.trim();
    self
      .pattern
      .as_ref()
      .and_then(|re| re.captures(value))
      .and_then(|caps| caps.get(2))
      .map_or(value, |m| m.as_str())
      .to_string()
  }

  pub fn normalize_row<'a>(
    &self,
    row: impl IntoIterator<Item = &'a str>,
  ) -> Vec<String> {
    row.into_iter().map(|v| self.normalize(v)).collect()
  }
}

#[cfg(test)]
mod tests {
  use atomize_core::config::DEFAULT_IDENTIFIER_PATTERN;

  use super::*;

  #[test]
  fn extracts_identifiers_behind_a_namespace() {
    let n = ValueNormalizer::new(Some(DEFAULT_IDENTIFIER_PATTERN)).unwrap();
    assert_eq!(n.normalize("FB:FBgn0000001"), "FBgn0000001");
    assert_eq!(n.normalize("  FBtr0012345 "), "FBtr0012345");
    assert_eq!(n.normalize("FBgn01"), "FBgn01");
    assert_eq!(n.normalize("dpp"), "dpp");
    assert_eq!(n.normalize(""), "");
  }

  #[test]
  fn without_pattern_only_trims() {
    let n = ValueNormalizer::new(None).unwrap();
    assert_eq!(n.normalize(" FB:FBgn0000001\t"), "FB:FBgn0000001");
  }

  #[test]
  fn invalid_pattern_is_rejected() {
    assert!(ValueNormalizer::new(Some("(")).is_err());
  }
}
