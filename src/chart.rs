use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use crate::error::{Error, Result};
use crate::grammar::BinarizedGrammar;
use crate::langvar::Word;
use crate::parse_tree::ParseTree;

/// Index type for the chart's element arena
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ElementIdx(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
  /// A token matched by a lexical rule. Carries the word payload and never
  /// has backpointers.
  Word(Word),
  UnaryPhrase,
  BinaryPhrase,
  /// A pass-through phrase: participates in later combination but splices
  /// its two children into the parent when trees are materialized.
  XPhrase,
}

/// One scored parse fragment. Backpointers reference elements in strictly
/// smaller spans, so the element graph is a DAG with words at the bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartElement {
  pub probability: f64,
  pub kind: ElementKind,
  pub symbol: String,
  pub backpointer1: Option<ElementIdx>,
  pub backpointer2: Option<ElementIdx>,
}

/// Triangular chart over a token sequence. Elements live in a flat arena;
/// cell `(i, l)` lists the elements spanning `l + 1` tokens starting at
/// token `i`.
#[derive(Debug)]
pub struct Chart {
  elements: Vec<ChartElement>,
  cells: Vec<Vec<Vec<ElementIdx>>>,
}

impl Chart {
  pub fn new(input_len: usize) -> Self {
    Self {
      elements: Vec::new(),
      cells: (0..input_len)
        .map(|i| vec![Vec::new(); input_len - i])
        .collect(),
    }
  }

  pub fn input_len(&self) -> usize {
    self.cells.len()
  }

  pub fn alloc(&mut self, element: ChartElement) -> ElementIdx {
    let idx = self.elements.len() as u32;
    self.elements.push(element);
    ElementIdx(idx)
  }

  /// Get an element. Assumes valid, panics on OOB
  pub fn get(&self, idx: ElementIdx) -> &ChartElement {
    self
      .elements
      .get(idx.0 as usize)
      .expect("invalid ElementIdx")
  }

  pub fn cell(&self, start: usize, len: usize) -> &[ElementIdx] {
    &self.cells[start][len]
  }

  fn push(&mut self, start: usize, len: usize, idx: ElementIdx) {
    self.cells[start][len].push(idx);
  }

  /// The single top-right cell covering the whole input
  pub fn top_cell(&self) -> &[ElementIdx] {
    self.cell(0, self.input_len() - 1)
  }
}

impl fmt::Display for Chart {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for start in 0..self.input_len() {
      for len in 0..self.cells[start].len() {
        if self.cells[start][len].is_empty() {
          continue;
        }
        writeln!(f, "{}..{}:", start, start + len + 1)?;
        for &idx in self.cells[start][len].iter() {
          let e = self.get(idx);
          writeln!(f, "  {} {:?} p={}", e.symbol, e.kind, e.probability)?;
        }
      }
    }
    Ok(())
  }
}

/// Fill a chart for the token sequence bottom-up: lexical rules and unary
/// closure on the bottom diagonal, then binary/X combination plus unary
/// closure for each longer span in increasing span-length order.
pub fn fill_chart(grammar: &BinarizedGrammar, tokens: &[&str]) -> Result<Chart> {
  let mut chart = Chart::new(tokens.len());

  for (position, token) in tokens.iter().enumerate() {
    let rules = grammar.lexical(token);
    if rules.is_empty() {
      return Err(Error::NoLexicalCategory {
        word: token.to_string(),
      });
    }
    for rule in rules {
      let word = Word {
        text: token.to_string(),
        pos: rule.lhs().to_string(),
        position,
      };
      let idx = chart.alloc(ChartElement {
        probability: rule.probability(),
        kind: ElementKind::Word(word),
        symbol: rule.lhs().to_string(),
        backpointer1: None,
        backpointer2: None,
      });
      chart.push(position, 0, idx);
    }
    unary_closure(grammar, &mut chart, position, 0)?;
  }

  let n = tokens.len();
  for len in 1..n {
    for start in 0..n - len {
      for split in 0..len {
        let left = chart.cell(start, split).to_vec();
        let right = chart.cell(start + split + 1, len - split - 1).to_vec();
        for &a in left.iter() {
          for &b in right.iter() {
            combine(grammar, &mut chart, start, len, a, b);
          }
        }
      }
      unary_closure(grammar, &mut chart, start, len)?;
    }
  }

  tracing::trace!(tokens = tokens.len(), "chart filled");
  Ok(chart)
}

fn combine(
  grammar: &BinarizedGrammar,
  chart: &mut Chart,
  start: usize,
  len: usize,
  left: ElementIdx,
  right: ElementIdx,
) {
  let (left_symbol, left_p) = {
    let e = chart.get(left);
    (e.symbol.clone(), e.probability)
  };
  let (right_symbol, right_p) = {
    let e = chart.get(right);
    (e.symbol.clone(), e.probability)
  };

  for rule in grammar.binary(&left_symbol, &right_symbol) {
    let idx = chart.alloc(ChartElement {
      probability: rule.probability() * left_p * right_p,
      kind: ElementKind::BinaryPhrase,
      symbol: rule.lhs().to_string(),
      backpointer1: Some(left),
      backpointer2: Some(right),
    });
    chart.push(start, len, idx);
  }
  for rule in grammar.x(&left_symbol, &right_symbol) {
    let idx = chart.alloc(ChartElement {
      probability: rule.probability() * left_p * right_p,
      kind: ElementKind::XPhrase,
      symbol: rule.lhs().to_string(),
      backpointer1: Some(left),
      backpointer2: Some(right),
    });
    chart.push(start, len, idx);
  }
}

/// Repeatedly apply unary rules to a cell until no rule fires. Each symbol
/// is expanded at most once per closure, which terminates unary cycles like
/// `A -> B; B -> A`. X elements never participate in closure.
fn unary_closure(
  grammar: &BinarizedGrammar,
  chart: &mut Chart,
  start: usize,
  len: usize,
) -> Result<()> {
  let mut used: HashSet<String> = HashSet::new();
  let mut pos = 0;
  while pos < chart.cell(start, len).len() {
    let idx = chart.cell(start, len)[pos];
    pos += 1;

    let (symbol, probability) = {
      let e = chart.get(idx);
      match e.kind {
        ElementKind::Word(_) if len > 0 => {
          return Err(Error::MalformedGrammarUsage(format!(
            "word element above the bottom diagonal at {}..{}",
            start,
            start + len + 1
          )));
        }
        ElementKind::XPhrase => continue,
        _ => (e.symbol.clone(), e.probability),
      }
    };

    if !used.insert(symbol.clone()) {
      continue;
    }
    for rule in grammar.unary(&symbol) {
      let new = chart.alloc(ChartElement {
        probability: rule.probability() * probability,
        kind: ElementKind::UnaryPhrase,
        symbol: rule.lhs().to_string(),
        backpointer1: Some(idx),
        backpointer2: None,
      });
      chart.push(start, len, new);
    }
  }
  Ok(())
}

/// Parse a sentence into its `max_parses` highest-probability trees, ranked
/// by descending probability (ties broken by discovery order).
pub fn parse(
  grammar: &BinarizedGrammar,
  text: &str,
  max_parses: usize,
) -> Result<Vec<(ParseTree, f64)>> {
  let tokens: Vec<&str> = text.split_whitespace().collect();
  if tokens.is_empty() {
    return Err(Error::EmptyChart);
  }

  let chart = fill_chart(grammar, &tokens)?;

  let mut top = chart.top_cell().to_vec();
  if top.is_empty() {
    return Err(Error::EmptyChart);
  }
  top.sort_by(|a, b| {
    chart
      .get(*b)
      .probability
      .partial_cmp(&chart.get(*a).probability)
      .unwrap_or(Ordering::Equal)
  });

  let mut trees = Vec::new();
  for idx in top {
    if trees.len() == max_parses {
      break;
    }
    match chart.get(idx).kind {
      ElementKind::Word(_) => return Err(Error::TopWasWord),
      ElementKind::XPhrase => continue,
      _ => {}
    }
    let probability = chart.get(idx).probability;
    trees.push((materialize(&chart, idx)?, probability));
  }

  tracing::debug!(trees = trees.len(), "parsed {:?}", text);
  Ok(trees)
}

fn materialize(chart: &Chart, idx: ElementIdx) -> Result<ParseTree> {
  let element = chart.get(idx);
  let mut root = ParseTree::new(&element.symbol);
  match element.kind {
    ElementKind::UnaryPhrase => {
      attach(chart, backpointer(element, element.backpointer1)?, &mut root)?;
    }
    ElementKind::BinaryPhrase => {
      attach(chart, backpointer(element, element.backpointer1)?, &mut root)?;
      attach(chart, backpointer(element, element.backpointer2)?, &mut root)?;
    }
    _ => {
      return Err(Error::MalformedGrammarUsage(format!(
        "cannot materialize a {:?} element",
        element.kind
      )));
    }
  }
  Ok(root)
}

/// Walk one backpointer into `parent`: words append to the parent's word
/// list, unary/binary elements become child nodes, X elements splice both
/// of their backpointers into the parent directly.
fn attach(chart: &Chart, idx: ElementIdx, parent: &mut ParseTree) -> Result<()> {
  let element = chart.get(idx);
  match &element.kind {
    ElementKind::Word(word) => {
      parent.words.push(word.clone());
    }
    ElementKind::UnaryPhrase | ElementKind::BinaryPhrase => {
      parent.children.push(materialize(chart, idx)?);
    }
    ElementKind::XPhrase => {
      attach(chart, backpointer(element, element.backpointer1)?, parent)?;
      attach(chart, backpointer(element, element.backpointer2)?, parent)?;
    }
  }
  Ok(())
}

fn backpointer(element: &ChartElement, bp: Option<ElementIdx>) -> Result<ElementIdx> {
  bp.ok_or_else(|| {
    Error::MalformedGrammarUsage(format!(
      "{:?} element {} is missing a backpointer",
      element.kind, element.symbol
    ))
  })
}
