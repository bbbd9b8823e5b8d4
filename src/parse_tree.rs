use std::fmt;

use crate::langvar::Word;

/// A parse tree materialized from the chart: a phrase category, the words
/// attached directly to this phrase, and child phrases. Words land on the
/// phrase whose rule consumed them, so leaf phrases carry the sentence text.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseTree {
  pub category: String,
  pub words: Vec<Word>,
  pub children: Vec<ParseTree>,
}

impl ParseTree {
  pub fn new(category: impl Into<String>) -> Self {
    Self {
      category: category.into(),
      words: Vec::new(),
      children: Vec::new(),
    }
  }

  pub fn is_leaf(&self) -> bool {
    self.children.is_empty()
  }

  /// All words of the tree in sentence order
  pub fn yield_words(&self) -> Vec<&Word> {
    let mut words: Vec<&Word> = Vec::new();
    self.collect_words(&mut words);
    words.sort_by_key(|w| w.position);
    words
  }

  fn collect_words<'a>(&'a self, out: &mut Vec<&'a Word>) {
    out.extend(self.words.iter());
    for child in self.children.iter() {
      child.collect_words(out);
    }
  }
}

impl fmt::Display for ParseTree {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "({}", self.category)?;
    for word in self.words.iter() {
      write!(f, " {}", word.text)?;
    }
    for child in self.children.iter() {
      let fmt = format!("{}", child);
      for line in fmt.lines() {
        write!(f, "\n  {}", line)?;
      }
    }
    write!(f, ")")
  }
}
