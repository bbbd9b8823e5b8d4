use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::langvar::LanguageVariable;
use crate::model::{Cv, LogLinearModel, PerCv};
use crate::symbol::Symbol;
use crate::utils::combinations;
use crate::world::World;

/// One ranked grounding: a probability and a partially grounded language
/// variable.
pub type Solution = (f64, LanguageVariable);

/// Sort solutions by descending probability. The sort is stable, so ties
/// keep their discovery order.
pub fn sort_solutions(solutions: &mut [Solution]) {
  solutions.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
}

/// One scored (language-variable, candidate-symbol) pairing. The candidate
/// identity is immutable; the cached scoring state (which features currently
/// contribute which weights, per correspondence value) is what incremental
/// update patches when the world changes.
#[derive(Debug, Clone)]
pub struct Factor {
  pub symbol: Symbol,
  /// Per-CV delta ledger: feature index -> weight currently contributing.
  /// Kept consistent with `sums` at all times.
  pub ledger: PerCv<BTreeMap<usize, f64>>,
  pub sums: PerCv<f64>,
  pub numerator: f64,
  pub denominator: f64,
  /// Probability of the branch named by `decision`
  pub probability: f64,
  /// Which correspondence-value branch this factor currently represents;
  /// `None` until a search completes and state is propagated back.
  pub decision: Option<Cv>,
}

impl Factor {
  pub fn new(symbol: Symbol) -> Self {
    Self {
      symbol,
      ledger: PerCv::default(),
      sums: PerCv::default(),
      numerator: 0.0,
      denominator: 0.0,
      probability: 0.0,
      decision: None,
    }
  }

  /// Replace the ledger for one correspondence value wholesale and re-derive
  /// its weight sum.
  pub fn set_ledger(&mut self, cv: Cv, entries: BTreeMap<usize, f64>) {
    *self.sums.get_mut(cv) = entries.values().sum();
    *self.ledger.get_mut(cv) = entries;
  }

  /// Add or remove one feature's weight contribution, keeping ledger and
  /// sum consistent. Returns true if anything changed.
  pub fn apply_delta(&mut self, cv: Cv, feature_idx: usize, weight: f64, fires: bool) -> bool {
    let ledger = self.ledger.get_mut(cv);
    if fires {
      if ledger.contains_key(&feature_idx) {
        return false;
      }
      ledger.insert(feature_idx, weight);
      *self.sums.get_mut(cv) += weight;
    } else {
      if ledger.remove(&feature_idx).is_none() {
        return false;
      }
      *self.sums.get_mut(cv) -= weight;
    }
    true
  }

  /// Fix the decision branch and recompute the cached probability from the
  /// current weight sums.
  pub fn set_decision(&mut self, cv: Cv) {
    let exp_true = self.sums.if_true.exp();
    let exp_false = self.sums.if_false.exp();
    self.denominator = exp_true + exp_false;
    self.numerator = match cv {
      Cv::True => exp_true,
      Cv::False => exp_false,
    };
    self.probability = self.numerator / self.denominator;
    self.decision = Some(cv);
  }

  /// Re-derive the argmax branch from the current weight sums (ties go to
  /// `Cv::True`, matching search discovery order). Returns whether the
  /// decision flipped.
  pub fn rescore(&mut self) -> bool {
    let argmax = if self.sums.if_true >= self.sums.if_false {
      Cv::True
    } else {
      Cv::False
    };
    let flipped = self.decision != Some(argmax);
    self.set_decision(argmax);
    flipped
  }

  /// Margin (in weight-sum units) by which the current decision is winning
  pub fn margin(&self) -> f64 {
    (self.sums.if_true - self.sums.if_false).abs()
  }
}

/// All factors for one language-variable node, its child links, and the
/// pruned, probability-sorted solutions produced by search.
#[derive(Debug)]
pub struct FactorSet {
  pub key: String,
  /// This node's own shape (type and words); children are attached from
  /// child solutions during search.
  pub language_variable: LanguageVariable,
  pub factors: Vec<Factor>,
  /// (edge label, child factor-set key) in child order
  pub children: Vec<(String, String)>,
  pub solutions: Vec<Solution>,
}

impl FactorSet {
  pub fn new(
    key: impl Into<String>,
    language_variable: LanguageVariable,
    candidates: &[Symbol],
    children: Vec<(String, String)>,
  ) -> Self {
    Self {
      key: key.into(),
      language_variable,
      factors: candidates.iter().cloned().map(Factor::new).collect(),
      children,
      solutions: Vec::new(),
    }
  }

  pub fn is_resolved(&self) -> bool {
    !self.solutions.is_empty()
  }

  /// Beam search over this node's candidate symbols, assuming every child's
  /// solutions have already been computed. `child_solutions` pairs each edge
  /// label with that child's ranked solutions, in child order.
  ///
  /// Partial solutions are re-sorted and truncated to `beam_width` after
  /// every factor, not only at the end; the pruning schedule is part of the
  /// observable behavior.
  pub fn search(
    &mut self,
    model: &LogLinearModel,
    world: &World,
    child_solutions: &[(String, Vec<Solution>)],
    beam_width: usize,
    cvs: &[Cv],
  ) {
    assert!(beam_width > 0, "beam width must be at least 1");

    let choice_sets: Vec<Vec<usize>> = child_solutions
      .iter()
      .map(|(_, solutions)| (0..solutions.len()).collect())
      .collect();
    let combos = if choice_sets.is_empty() {
      // no children: a single trivial combination
      vec![Vec::new()]
    } else {
      combinations(&choice_sets)
    };

    let mut partial: Vec<Solution> = Vec::with_capacity(combos.len());
    for combo in combos {
      let mut lv = self.language_variable.clone();
      let mut probability = 1.0;
      for (&choice, (label, solutions)) in combo.iter().zip(child_solutions.iter()) {
        let (p, child_lv) = &solutions[choice];
        probability *= p;
        lv.children.push((label.clone(), child_lv.clone()));
      }
      partial.push((probability, lv));
    }

    for factor in self.factors.iter() {
      let mut widened: Vec<Solution> = Vec::with_capacity(partial.len() * 2);
      for (probability, mut lv) in partial {
        let children: Vec<Symbol> = lv
          .children
          .iter()
          .flat_map(|(_, child)| child.symbols.iter().cloned())
          .collect();
        // features see resolved children and the world, never the node's
        // own pending symbol choices; the ledgers cached after search are
        // built against the same context
        let pending = std::mem::take(&mut lv.symbols);
        let taken = model.score(Cv::True, &factor.symbol, &children, &lv, world, cvs);
        let skipped = model.score(Cv::False, &factor.symbol, &children, &lv, world, cvs);
        lv.symbols = pending;

        let mut with_symbol = lv.clone();
        with_symbol.symbols.push(factor.symbol.clone());
        widened.push((probability * taken.probability, with_symbol));
        widened.push((probability * skipped.probability, lv));
      }
      sort_solutions(&mut widened);
      widened.truncate(beam_width);
      partial = widened;
    }

    sort_solutions(&mut partial);
    partial.truncate(beam_width);

    tracing::debug!(
      key = %self.key,
      factors = self.factors.len(),
      solutions = partial.len(),
      "factor set searched"
    );
    self.solutions = partial;
  }
}
