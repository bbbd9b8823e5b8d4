use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// One production of a binarized probabilistic grammar.
///
/// `X` rules are the pass-through nonterminals a binarizer introduces: they
/// combine like binary rules during chart fill, but they are excluded from
/// unary closure and their children are spliced directly into the parent when
/// trees are materialized.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
  Lexical {
    lhs: String,
    word: String,
    probability: f64,
  },
  Unary {
    lhs: String,
    rhs: String,
    probability: f64,
  },
  Binary {
    lhs: String,
    left: String,
    right: String,
    probability: f64,
  },
  X {
    lhs: String,
    left: String,
    right: String,
    probability: f64,
  },
}

impl Rule {
  pub fn lhs(&self) -> &str {
    match self {
      Self::Lexical { lhs, .. }
      | Self::Unary { lhs, .. }
      | Self::Binary { lhs, .. }
      | Self::X { lhs, .. } => lhs,
    }
  }

  pub fn probability(&self) -> f64 {
    match self {
      Self::Lexical { probability, .. }
      | Self::Unary { probability, .. }
      | Self::Binary { probability, .. }
      | Self::X { probability, .. } => *probability,
    }
  }
}

impl fmt::Display for Rule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Lexical {
        lhs,
        word,
        probability,
      } => write!(f, "{} -> {} : {}", lhs, word, probability),
      Self::Unary {
        lhs,
        rhs,
        probability,
      } => write!(f, "{} -> {} : {}", lhs, rhs, probability),
      Self::Binary {
        lhs,
        left,
        right,
        probability,
      } => write!(f, "{} -> {} {} : {}", lhs, left, right, probability),
      Self::X {
        lhs,
        left,
        right,
        probability,
      } => write!(f, "{} => {} {} : {}", lhs, left, right, probability),
    }
  }
}

/// A Chomsky-normal-form grammar with rules grouped by the lookups the chart
/// parser performs: lexical rules by terminal word, unary rules by their
/// right-hand symbol, binary and X rules by their right-hand symbol pair.
/// Immutable once built.
#[derive(Debug, Default)]
pub struct BinarizedGrammar {
  rules: Vec<Rc<Rule>>,
  lexicon: HashMap<String, Vec<Rc<Rule>>>,
  unary_by_rhs: HashMap<String, Vec<Rc<Rule>>>,
  binary_by_rhs: HashMap<(String, String), Vec<Rc<Rule>>>,
  x_by_rhs: HashMap<(String, String), Vec<Rc<Rule>>>,
}

impl BinarizedGrammar {
  pub fn new(rules: Vec<Rule>) -> Self {
    let mut grammar = Self {
      rules: rules.into_iter().map(Rc::new).collect(),
      ..Default::default()
    };

    for rule in grammar.rules.iter() {
      match &**rule {
        Rule::Lexical { word, .. } => {
          grammar
            .lexicon
            .entry(word.clone())
            .or_default()
            .push(rule.clone());
        }
        Rule::Unary { rhs, .. } => {
          grammar
            .unary_by_rhs
            .entry(rhs.clone())
            .or_default()
            .push(rule.clone());
        }
        Rule::Binary { left, right, .. } => {
          grammar
            .binary_by_rhs
            .entry((left.clone(), right.clone()))
            .or_default()
            .push(rule.clone());
        }
        Rule::X { left, right, .. } => {
          grammar
            .x_by_rhs
            .entry((left.clone(), right.clone()))
            .or_default()
            .push(rule.clone());
        }
      }
    }

    grammar
  }

  pub fn len(&self) -> usize {
    self.rules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rules.is_empty()
  }

  pub fn rules(&self) -> &[Rc<Rule>] {
    &self.rules
  }

  /// Lexical rules matching a terminal word
  pub fn lexical(&self, word: &str) -> &[Rc<Rule>] {
    self.lexicon.get(word).map(Vec::as_slice).unwrap_or(&[])
  }

  /// Unary rules whose right-hand symbol is `rhs`
  pub fn unary(&self, rhs: &str) -> &[Rc<Rule>] {
    self
      .unary_by_rhs
      .get(rhs)
      .map(Vec::as_slice)
      .unwrap_or(&[])
  }

  /// Binary rules whose right-hand pair is `(left, right)`
  pub fn binary(&self, left: &str, right: &str) -> &[Rc<Rule>] {
    self
      .binary_by_rhs
      .get(&(left.to_string(), right.to_string()))
      .map(Vec::as_slice)
      .unwrap_or(&[])
  }

  /// X rules whose right-hand pair is `(left, right)`
  pub fn x(&self, left: &str, right: &str) -> &[Rc<Rule>] {
    self
      .x_by_rhs
      .get(&(left.to_string(), right.to_string()))
      .map(Vec::as_slice)
      .unwrap_or(&[])
  }
}

impl fmt::Display for BinarizedGrammar {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for rule in self.rules.iter() {
      writeln!(f, "{};", rule)?;
    }
    Ok(())
  }
}
