use std::fmt;

use crate::parse_tree::ParseTree;
use crate::symbol::Symbol;

/// A single token with the lexical category that produced it and its
/// position in the sentence.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
  pub text: String,
  pub pos: String,
  pub position: usize,
}

impl fmt::Display for Word {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}@{}", self.text, self.pos, self.position)
  }
}

/// One node of the grounding engine's input tree: a phrase category, the
/// phrase's own words, the symbols it has been resolved to (empty until
/// search fills them in), and labeled child links.
///
/// Nodes are identified across the factor graph by a path-qualified key
/// derived from the edge labels, unique within one tree.
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageVariable {
  pub ty: String,
  pub words: Vec<Word>,
  pub symbols: Vec<Symbol>,
  pub children: Vec<(String, LanguageVariable)>,
}

impl LanguageVariable {
  /// Key of the root node of any tree
  pub const ROOT_KEY: &'static str = "root";

  pub fn new(ty: impl Into<String>) -> Self {
    Self {
      ty: ty.into(),
      words: Vec::new(),
      symbols: Vec::new(),
      children: Vec::new(),
    }
  }

  /// Convert a parse tree, labeling children `child-0`, `child-1`, ... in
  /// order. Symbol sets start empty.
  pub fn from_parse_tree(tree: &ParseTree) -> Self {
    let mut lv = Self::new(&tree.category);
    lv.words = tree.words.clone();
    for (idx, child) in tree.children.iter().enumerate() {
      lv.children
        .push((format!("child-{}", idx), Self::from_parse_tree(child)));
    }
    lv
  }

  /// Path-qualified key of a child reached over `label` from `parent_key`
  pub fn child_key(parent_key: &str, label: &str) -> String {
    format!("{}.{}", parent_key, label)
  }

  /// All (key, node) pairs of the tree in pre-order, rooted at [`Self::ROOT_KEY`]
  pub fn keyed_nodes(&self) -> Vec<(String, &LanguageVariable)> {
    let mut nodes = Vec::new();
    self.collect_keyed(Self::ROOT_KEY.to_string(), &mut nodes);
    nodes
  }

  fn collect_keyed<'a>(&'a self, key: String, out: &mut Vec<(String, &'a LanguageVariable)>) {
    out.push((key.clone(), self));
    for (label, child) in self.children.iter() {
      child.collect_keyed(Self::child_key(&key, label), out);
    }
  }

  /// The sentence text covered by this node, in token order
  pub fn text(&self) -> String {
    let mut words: Vec<&Word> = Vec::new();
    self.collect_words(&mut words);
    words.sort_by_key(|w| w.position);
    words
      .iter()
      .map(|w| w.text.as_str())
      .collect::<Vec<_>>()
      .join(" ")
  }

  fn collect_words<'a>(&'a self, out: &mut Vec<&'a Word>) {
    out.extend(self.words.iter());
    for (_, child) in self.children.iter() {
      child.collect_words(out);
    }
  }
}

impl fmt::Display for LanguageVariable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "({}", self.ty)?;
    for word in self.words.iter() {
      write!(f, " {}", word.text)?;
    }
    if !self.symbols.is_empty() {
      write!(f, " {{")?;
      for (idx, symbol) in self.symbols.iter().enumerate() {
        if idx > 0 {
          write!(f, ", ")?;
        }
        write!(f, "{}", symbol)?;
      }
      write!(f, "}}")?;
    }
    for (label, child) in self.children.iter() {
      let fmt = format!("{}: {}", label, child);
      for line in fmt.lines() {
        write!(f, "\n  {}", line)?;
      }
    }
    write!(f, ")")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn word(text: &str, pos: &str, position: usize) -> Word {
    Word {
      text: text.to_string(),
      pos: pos.to_string(),
      position,
    }
  }

  #[test]
  fn test_keys_are_path_qualified() {
    let mut tree = ParseTree::new("VP");
    tree.words.push(word("take", "V", 0));
    let mut np = ParseTree::new("NP");
    np.words.push(word("the", "DET", 1));
    np.words.push(word("block", "N", 2));
    tree.children.push(np);

    let lv = LanguageVariable::from_parse_tree(&tree);
    let keys: Vec<String> = lv.keyed_nodes().into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["root".to_string(), "root.child-0".to_string()]);
    assert_eq!(lv.text(), "take the block");
  }
}
