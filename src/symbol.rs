use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// A tagged symbolic value: a type tag, string properties, and child
/// symbols. The engine treats symbols opaquely; the catalog that builds
/// candidates decides what the tags and properties mean.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
  pub ty: String,
  pub properties: BTreeMap<String, String>,
  pub children: Vec<Symbol>,
}

impl Symbol {
  pub fn new(ty: impl Into<String>) -> Self {
    Self {
      ty: ty.into(),
      properties: BTreeMap::new(),
      children: Vec::new(),
    }
  }

  pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.properties.insert(key.into(), value.into());
    self
  }

  pub fn with_child(mut self, child: Symbol) -> Self {
    self.children.push(child);
    self
  }

  pub fn property(&self, key: &str) -> Option<&str> {
    self.properties.get(key).map(String::as_str)
  }
}

impl fmt::Display for Symbol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.ty)?;
    if !self.properties.is_empty() {
      write!(f, "[")?;
      for (idx, (key, value)) in self.properties.iter().enumerate() {
        if idx > 0 {
          write!(f, ", ")?;
        }
        write!(f, "{}: {}", key, value)?;
      }
      write!(f, "]")?;
    }
    if !self.children.is_empty() {
      write!(f, "(")?;
      for (idx, child) in self.children.iter().enumerate() {
        if idx > 0 {
          write!(f, " ")?;
        }
        write!(f, "{}", child)?;
      }
      write!(f, ")")?;
    }
    Ok(())
  }
}

/// The catalog of candidate symbols available for grounding, keyed by the
/// phrase type they may ground. The engine never fabricates symbols; it only
/// receives candidates from here.
#[derive(Debug, Default)]
pub struct SymbolSpace {
  candidates: HashMap<String, Vec<Symbol>>,
}

impl SymbolSpace {
  pub fn new() -> Self {
    Default::default()
  }

  pub fn add(&mut self, phrase_ty: impl Into<String>, symbol: Symbol) {
    self
      .candidates
      .entry(phrase_ty.into())
      .or_default()
      .push(symbol);
  }

  /// Candidate symbols for a phrase type; empty if none are catalogued
  pub fn candidates(&self, phrase_ty: &str) -> &[Symbol] {
    self
      .candidates
      .get(phrase_ty)
      .map(Vec::as_slice)
      .unwrap_or(&[])
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_symbol_display() {
    let s = Symbol::new("object")
      .with_property("id", "block1")
      .with_property("color", "red");
    assert_eq!(s.to_string(), "object[color: red, id: block1]");
    assert_eq!(s.property("id"), Some("block1"));
    assert_eq!(s.property("pose"), None);
  }

  #[test]
  fn test_space_candidates() {
    let mut space = SymbolSpace::new();
    space.add("NP", Symbol::new("object").with_property("id", "block1"));
    space.add("NP", Symbol::new("object").with_property("id", "block2"));

    assert_eq!(space.candidates("NP").len(), 2);
    assert!(space.candidates("VP").is_empty());
  }
}
