use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::factor::{FactorSet, Solution};
use crate::langvar::LanguageVariable;
use crate::model::{Cv, LogLinearModel};
use crate::symbol::{Symbol, SymbolSpace};
use crate::world::World;

/// Per-factor-set, per-factor lists of "substantial" world-dependent feature
/// indices: the features risky enough to invalidate a cached decision if the
/// world moves. Computed by [`Dcg::substantial_features`], consumed by
/// [`Dcg::valid`].
pub type SubstantialFeatures = HashMap<String, Vec<Vec<usize>>>;

/// The distributed correspondence graph for one sentence: one [`FactorSet`]
/// per language-variable node, mirroring the tree shape, connected by
/// path-qualified keys.
///
/// A `Dcg` is single-use per sentence: built, searched once, optionally
/// updated for world deltas, then discarded. The grammar, model, and world
/// it reads are never mutated; only its own graph is.
pub struct Dcg<'a> {
  model: &'a LogLinearModel,
  world: World,
  sentence: LanguageVariable,
  factor_sets: HashMap<String, FactorSet>,
  solutions: Option<Vec<Solution>>,
  cvs: Vec<Cv>,
}

impl<'a> Dcg<'a> {
  /// Build the factor graph for a sentence tree: one factor set per node in
  /// pre-order, candidate factors drawn from the symbol space, children
  /// wired by key.
  pub fn new(
    sentence: LanguageVariable,
    space: &SymbolSpace,
    model: &'a LogLinearModel,
    world: World,
    cvs: Vec<Cv>,
  ) -> Self {
    let mut factor_sets = HashMap::new();
    Self::build(&sentence, LanguageVariable::ROOT_KEY, space, &mut factor_sets);
    tracing::debug!(
      factor_sets = factor_sets.len(),
      "constructed correspondence graph"
    );
    Self {
      model,
      world,
      sentence,
      factor_sets,
      solutions: None,
      cvs,
    }
  }

  fn build(
    lv: &LanguageVariable,
    key: &str,
    space: &SymbolSpace,
    factor_sets: &mut HashMap<String, FactorSet>,
  ) {
    // the input is a tree, so keys never repeat; the guard only matters for
    // malformed input
    if factor_sets.contains_key(key) {
      return;
    }

    let mut node = LanguageVariable::new(&lv.ty);
    node.words = lv.words.clone();

    let children: Vec<(String, String)> = lv
      .children
      .iter()
      .map(|(label, _)| (label.clone(), LanguageVariable::child_key(key, label)))
      .collect();

    factor_sets.insert(
      key.to_string(),
      FactorSet::new(key, node, space.candidates(&lv.ty), children),
    );

    for (label, child) in lv.children.iter() {
      Self::build(
        child,
        &LanguageVariable::child_key(key, label),
        space,
        factor_sets,
      );
    }
  }

  pub fn sentence(&self) -> &LanguageVariable {
    &self.sentence
  }

  pub fn world(&self) -> &World {
    &self.world
  }

  /// Ranked sentence-level solutions, or `None` before a search completes
  pub fn solutions(&self) -> Option<&[Solution]> {
    self.solutions.as_deref()
  }

  pub fn factor_set(&self, key: &str) -> Result<&FactorSet> {
    self.factor_sets.get(key).ok_or_else(|| Error::MissingFactorSet {
      key: key.to_string(),
    })
  }

  /// Resolve the whole graph bottom-up: repeatedly search any factor set
  /// whose children are all resolved, until none remain. The fixed-point
  /// scan is equivalent to a post-order traversal but robust against
  /// construction order. When the root is resolved, its solutions become
  /// the sentence solutions and the top solution's symbol choices are
  /// propagated onto every factor's cached state.
  pub fn search(&mut self, beam_width: usize) -> Result<&[Solution]> {
    if self.factor_sets.is_empty() {
      return Err(Error::EmptyGraph);
    }

    while let Some(key) = self.find_ready()? {
      let child_solutions = self.child_solutions(&key)?;
      let fs = self
        .factor_sets
        .get_mut(&key)
        .ok_or_else(|| Error::MissingFactorSet { key: key.clone() })?;
      fs.search(
        self.model,
        &self.world,
        &child_solutions,
        beam_width,
        &self.cvs,
      );
    }

    let root = self.factor_set(LanguageVariable::ROOT_KEY)?;
    self.solutions = Some(root.solutions.clone());
    self.propagate_state()?;

    tracing::debug!(
      solutions = self.solutions.as_ref().map(Vec::len).unwrap_or(0),
      "search complete"
    );
    Ok(self.solutions.as_deref().unwrap_or_default())
  }

  /// A factor set with no solutions whose children all have solutions;
  /// leaves qualify immediately.
  fn find_ready(&self) -> Result<Option<String>> {
    for (key, fs) in self.factor_sets.iter() {
      if fs.is_resolved() {
        continue;
      }
      let mut ready = true;
      for (_, child_key) in fs.children.iter() {
        if !self.factor_set(child_key)?.is_resolved() {
          ready = false;
          break;
        }
      }
      if ready {
        return Ok(Some(key.clone()));
      }
    }
    Ok(None)
  }

  fn child_solutions(&self, key: &str) -> Result<Vec<(String, Vec<Solution>)>> {
    let fs = self.factor_set(key)?;
    let mut out = Vec::with_capacity(fs.children.len());
    for (label, child_key) in fs.children.iter() {
      let child = self.factor_set(child_key)?;
      out.push((label.clone(), child.solutions.clone()));
    }
    Ok(out)
  }

  /// Push the top solution's symbol choices back onto every factor: which
  /// correspondence-value branch it represents, and the ledger of feature
  /// weights behind that choice. This cached state is what incremental
  /// update patches.
  fn propagate_state(&mut self) -> Result<()> {
    let keys: Vec<String> = self.factor_sets.keys().cloned().collect();
    for key in keys {
      let (context, children_symbols, mut top_symbols) = {
        let fs = self.factor_set(&key)?;
        let (_, top) = fs.solutions.first().ok_or(Error::NotSearched)?;
        let mut context = top.clone();
        // features see the node and its resolved children, never the
        // node's own symbol choices
        context.symbols.clear();
        let children_symbols = child_symbols_of(top);
        (context, children_symbols, top.symbols.clone())
      };

      let model = self.model;
      let world = &self.world;
      let fs = self
        .factor_sets
        .get_mut(&key)
        .ok_or_else(|| Error::MissingFactorSet { key: key.clone() })?;
      for factor in fs.factors.iter_mut() {
        for &cv in Cv::ALL.iter() {
          let entries: BTreeMap<usize, f64> = model
            .firing_indices(cv, &factor.symbol, &children_symbols, &context, world)
            .into_iter()
            .map(|idx| (idx, model.weight(idx)))
            .collect();
          factor.set_ledger(cv, entries);
        }
        // the catalog may hold structurally identical candidates; each top
        // symbol is matched off against exactly one factor
        let taken = match top_symbols.iter().position(|s| s == &factor.symbol) {
          Some(pos) => {
            top_symbols.swap_remove(pos);
            true
          }
          None => false,
        };
        factor.set_decision(if taken { Cv::True } else { Cv::False });
      }
    }
    Ok(())
  }

  /// Re-score the already-searched graph against a world whose object
  /// identities are unchanged, without re-running the search. Returns
  /// whether any node's argmax changed. On a structural mismatch the graph
  /// and prior solutions are left untouched and the caller should fall back
  /// to a full re-search.
  pub fn update_world(&mut self, new_world: World) -> Result<bool> {
    if self.solutions.is_none() {
      return Err(Error::NotSearched);
    }
    if !self.world.same_structure(&new_world) {
      return Err(Error::StructuralWorldMismatch {
        expected: self.world.len(),
        actual: new_world.len(),
      });
    }

    let changed = self.update_node(LanguageVariable::ROOT_KEY, &new_world)?;
    self.world = new_world;

    let root = self.factor_set(LanguageVariable::ROOT_KEY)?;
    self.solutions = Some(root.solutions.clone());

    tracing::debug!(changed, "incremental world update complete");
    Ok(changed)
  }

  /// Child-first incremental re-scoring of one node. World-dependent
  /// features are always re-evaluated; children-dependent features only
  /// when some child's solution changed in this pass (an optimization, not
  /// a correctness condition). Weight contributions are patched through the
  /// per-factor ledger, never recomputed wholesale.
  fn update_node(&mut self, key: &str, world: &World) -> Result<bool> {
    let child_links = self.factor_set(key)?.children.clone();

    let mut child_changed = false;
    for (_, child_key) in child_links.iter() {
      child_changed |= self.update_node(child_key, world)?;
    }

    let mut context = self.factor_set(key)?.language_variable.clone();
    let mut probability = 1.0;
    for (label, child_key) in child_links.iter() {
      let child = self.factor_set(child_key)?;
      let (p, lv) = child.solutions.first().ok_or(Error::NotSearched)?;
      probability *= p;
      context.children.push((label.clone(), lv.clone()));
    }
    let children_symbols = child_symbols_of(&context);

    let model = self.model;
    let fs = self
      .factor_sets
      .get_mut(key)
      .ok_or_else(|| Error::MissingFactorSet {
        key: key.to_string(),
      })?;

    let mut flipped_any = false;
    for factor in fs.factors.iter_mut() {
      for (idx, feature) in model.pool().iter().enumerate() {
        let relevant = feature.depends.world || (feature.depends.children && child_changed);
        if !relevant {
          continue;
        }
        for &cv in Cv::ALL.iter() {
          let fires = (feature.eval)(cv, &factor.symbol, &context, &children_symbols, world);
          factor.apply_delta(cv, idx, model.weight(idx), fires);
        }
      }
      if factor.rescore() {
        tracing::trace!(key = %key, symbol = %factor.symbol, "factor argmax flipped");
        flipped_any = true;
      }
    }

    // rebuild the node's top solution from the (possibly updated) child
    // tops and the factors that now argmax to true; only the argmax
    // solution is kept after an update
    let mut top = context;
    for factor in fs.factors.iter() {
      if factor.decision == Some(Cv::True) {
        top.symbols.push(factor.symbol.clone());
      }
      probability *= factor.probability;
    }
    fs.solutions = vec![(probability, top)];

    Ok(flipped_any || child_changed)
  }

  /// For every factor, the world-dependent features whose weight is large
  /// enough to overturn the margin by which that factor's current decision
  /// is winning.
  pub fn substantial_features(&self) -> Result<SubstantialFeatures> {
    if self.solutions.is_none() {
      return Err(Error::NotSearched);
    }

    let mut out = HashMap::new();
    for (key, fs) in self.factor_sets.iter() {
      let per_factor: Vec<Vec<usize>> = fs
        .factors
        .iter()
        .map(|factor| {
          let margin = factor.margin();
          self
            .model
            .pool()
            .iter()
            .enumerate()
            .filter(|(idx, feature)| {
              feature.depends.world && self.model.weight(*idx).abs() >= margin
            })
            .map(|(idx, _)| idx)
            .collect()
        })
        .collect();
      out.insert(key.clone(), per_factor);
    }
    Ok(out)
  }

  /// Cheap pre-filter for [`Self::update_world`]: re-evaluate only the
  /// given substantial features against a hypothetical world. If any
  /// changes value the prior solution is not guaranteed valid and the
  /// caller should run a real update. Never mutates cached state.
  ///
  /// The margin test behind [`Self::substantial_features`] is per-feature:
  /// several sub-margin world features flipping in the same delta can pass
  /// this check and still flip a factor's argmax. A `true` result is a
  /// heuristic go-ahead, not a guarantee; only [`Self::update_world`]
  /// re-scores for real.
  pub fn valid(&self, candidate_world: &World, substantial: &SubstantialFeatures) -> Result<bool> {
    if self.solutions.is_none() {
      return Err(Error::NotSearched);
    }
    if !self.world.same_structure(candidate_world) {
      return Ok(false);
    }

    for (key, per_factor) in substantial.iter() {
      let fs = self.factor_set(key)?;

      let mut context = fs.language_variable.clone();
      for (label, child_key) in fs.children.iter() {
        let child = self.factor_set(child_key)?;
        let (_, lv) = child.solutions.first().ok_or(Error::NotSearched)?;
        context.children.push((label.clone(), lv.clone()));
      }
      let children_symbols = child_symbols_of(&context);

      for (factor, indices) in fs.factors.iter().zip(per_factor.iter()) {
        for &idx in indices {
          let feature = self.model.pool().get(idx);
          for &cv in Cv::ALL.iter() {
            let fires =
              (feature.eval)(cv, &factor.symbol, &context, &children_symbols, candidate_world);
            let fired = factor.ledger.get(cv).contains_key(&idx);
            if fires != fired {
              tracing::trace!(key = %key, feature = %feature.name, "substantial feature changed");
              return Ok(false);
            }
          }
        }
      }
    }
    Ok(true)
  }
}

/// The symbols of a node's direct children, in child order
fn child_symbols_of(lv: &LanguageVariable) -> Vec<Symbol> {
  lv.children
    .iter()
    .flat_map(|(_, child)| child.symbols.iter().cloned())
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::grammar::BinarizedGrammar;
  use crate::model::{Dependency, FeatureDef, FeaturePool};
  use crate::world::{Object, Pose};
  use rand::rngs::StdRng;
  use rand::{Rng, SeedableRng};

  const NEAR_THRESHOLD: f64 = 5.0;

  /// Model for "take the block"-style commands: objects near the origin are
  /// preferred groundings, actions must agree with the object their noun
  /// phrase grounded.
  fn command_model() -> LogLinearModel {
    let mut pool = FeaturePool::new();
    // 0: world-dependent object preference
    pool.push(FeatureDef::new(
      "object-near-origin",
      Dependency::WORLD,
      |cv, symbol: &Symbol, _lv: &LanguageVariable, _c: &[Symbol], world: &World| {
        cv == Cv::True
          && symbol.ty == "object"
          && symbol
            .property("id")
            .and_then(|id| world.object(id))
            .is_some_and(|o| o.pose.x < NEAR_THRESHOLD)
      },
    ));
    // 1: static bias against grounding objects
    pool.push(FeatureDef::new(
      "object-false-bias",
      Dependency::STATIC,
      |cv, symbol: &Symbol, _lv: &LanguageVariable, _c: &[Symbol], _w: &World| {
        cv == Cv::False && symbol.ty == "object"
      },
    ));
    // 2: children-dependent action/object agreement
    pool.push(FeatureDef::new(
      "action-object-agreement",
      Dependency::CHILDREN,
      |cv, symbol: &Symbol, _lv: &LanguageVariable, children: &[Symbol], _w: &World| {
        cv == Cv::True
          && symbol.ty == "action"
          && children
            .iter()
            .any(|c| c.property("id") == symbol.property("object"))
      },
    ));
    // 3: static bias against grounding actions
    pool.push(FeatureDef::new(
      "action-false-bias",
      Dependency::STATIC,
      |cv, symbol: &Symbol, _lv: &LanguageVariable, _c: &[Symbol], _w: &World| {
        cv == Cv::False && symbol.ty == "action"
      },
    ));
    LogLinearModel::new(pool, vec![2.0, 0.5, 1.5, 0.5])
  }

  fn command_space() -> SymbolSpace {
    let mut space = SymbolSpace::new();
    space.add("NP", Symbol::new("object").with_property("id", "block1"));
    space.add("NP", Symbol::new("object").with_property("id", "block2"));
    space.add("VP", Symbol::new("action").with_property("object", "block1"));
    space.add("VP", Symbol::new("action").with_property("object", "block2"));
    space
  }

  fn command_sentence() -> LanguageVariable {
    let grammar: BinarizedGrammar = r#"
      VP -> V NP : 0.9;
      NP -> DET N : 0.8;
      V -> take : 1.0;
      DET -> the : 1.0;
      N -> block : 1.0;
    "#
    .parse()
    .unwrap();
    let trees = grammar.parse("take the block", 1).unwrap();
    LanguageVariable::from_parse_tree(&trees[0].0)
  }

  fn world_at(block1_pose: Pose, block2_pose: Pose) -> World {
    let mut world = World::new();
    world.insert("block1", Object::at(block1_pose));
    world.insert("block2", Object::at(block2_pose));
    world
  }

  fn searched_dcg(model: &LogLinearModel, world: World) -> Dcg<'_> {
    let mut dcg = Dcg::new(
      command_sentence(),
      &command_space(),
      model,
      world,
      Cv::ALL.to_vec(),
    );
    dcg.search(4).unwrap();
    dcg
  }

  fn top_symbol_ids(dcg: &Dcg, key: &str) -> Vec<String> {
    dcg
      .factor_set(key)
      .unwrap()
      .solutions
      .first()
      .unwrap()
      .1
      .symbols
      .iter()
      .map(|s| {
        s.property("id")
          .or_else(|| s.property("object"))
          .unwrap()
          .to_string()
      })
      .collect()
  }

  #[test]
  fn test_search_grounds_near_object() {
    let model = command_model();
    let dcg = searched_dcg(&model, world_at(Pose::new(0.0, 0.0, 0.0), Pose::new(10.0, 0.0, 0.0)));

    let solutions = dcg.solutions().unwrap();
    assert!(!solutions.is_empty());
    for pair in solutions.windows(2) {
      assert!(pair[0].0 >= pair[1].0);
    }

    // block1 is near the origin, so the noun phrase grounds to it and the
    // action agrees
    assert_eq!(top_symbol_ids(&dcg, "root.child-0"), vec!["block1"]);
    assert_eq!(top_symbol_ids(&dcg, "root"), vec!["block1"]);
  }

  #[test]
  fn test_update_world_flips_grounding() {
    let model = command_model();
    let mut dcg = searched_dcg(&model, world_at(Pose::new(0.0, 0.0, 0.0), Pose::new(10.0, 0.0, 0.0)));

    // swap which block is near the origin
    let changed = dcg
      .update_world(world_at(Pose::new(10.0, 0.0, 0.0), Pose::new(0.0, 0.0, 0.0)))
      .unwrap();
    assert!(changed);
    assert_eq!(top_symbol_ids(&dcg, "root.child-0"), vec!["block2"]);
    assert_eq!(top_symbol_ids(&dcg, "root"), vec!["block2"]);
  }

  #[test]
  fn test_update_world_noop_when_nothing_moves() {
    let model = command_model();
    let world = world_at(Pose::new(0.0, 0.0, 0.0), Pose::new(10.0, 0.0, 0.0));
    let mut dcg = searched_dcg(&model, world.clone());
    let top_before = dcg.solutions().unwrap()[0].clone();

    let changed = dcg.update_world(world).unwrap();
    assert!(!changed);
    let top_after = &dcg.solutions().unwrap()[0];
    assert!((top_after.0 - top_before.0).abs() < 1e-9);
    assert_eq!(top_after.1.symbols, top_before.1.symbols);
  }

  #[test]
  fn test_update_world_rejects_structural_change() {
    let model = command_model();
    let mut dcg = searched_dcg(&model, world_at(Pose::new(0.0, 0.0, 0.0), Pose::new(10.0, 0.0, 0.0)));
    let before = dcg.solutions().unwrap().to_vec();

    let mut smaller = World::new();
    smaller.insert("block1", Object::at(Pose::new(0.0, 0.0, 0.0)));

    assert!(matches!(
      dcg.update_world(smaller),
      Err(Error::StructuralWorldMismatch {
        expected: 2,
        actual: 1
      })
    ));
    // prior solutions are untouched
    assert_eq!(dcg.solutions().unwrap(), &before[..]);
  }

  #[test]
  fn test_incremental_matches_full_search() {
    let model = command_model();
    let mut rng = StdRng::seed_from_u64(42);

    let base = world_at(Pose::new(0.0, 0.0, 0.0), Pose::new(10.0, 0.0, 0.0));
    let mut dcg = searched_dcg(&model, base);

    for _ in 0..25 {
      let perturbed = world_at(
        Pose::new(rng.gen_range(-10.0..10.0), rng.gen_range(-2.0..2.0), 0.0),
        Pose::new(rng.gen_range(-10.0..10.0), rng.gen_range(-2.0..2.0), 0.0),
      );

      dcg.update_world(perturbed.clone()).unwrap();
      let incremental = dcg.solutions().unwrap()[0].clone();

      let fresh = searched_dcg(&model, perturbed);
      let full = &fresh.solutions().unwrap()[0];

      assert!(
        (incremental.0 - full.0).abs() < 1e-9,
        "probability diverged: {} vs {}",
        incremental.0,
        full.0
      );
      assert_eq!(incremental.1.symbols, full.1.symbols);
      assert_eq!(
        incremental.1.children[0].1.symbols,
        full.1.children[0].1.symbols
      );
    }
  }

  #[test]
  fn test_valid_detects_substantial_world_change() {
    let model = command_model();
    let start = world_at(Pose::new(0.0, 0.0, 0.0), Pose::new(10.0, 0.0, 0.0));
    let mut dcg = searched_dcg(&model, start);
    let substantial = dcg.substantial_features().unwrap();

    // moving block1 ten units along x crosses the near-origin threshold
    let moved = world_at(Pose::new(10.0, 0.0, 0.0), Pose::new(10.0, 0.0, 0.0));
    assert!(!dcg.valid(&moved, &substantial).unwrap());
    assert!(dcg.update_world(moved).unwrap());
    assert_eq!(
      dcg
        .factor_set("root.child-0")
        .unwrap()
        .factors[0]
        .decision,
      Some(Cv::False)
    );
  }

  #[test]
  fn test_valid_is_sound() {
    let model = command_model();
    let start = world_at(Pose::new(0.0, 0.0, 0.0), Pose::new(10.0, 0.0, 0.0));
    let mut dcg = searched_dcg(&model, start);
    let substantial = dcg.substantial_features().unwrap();

    // movement along y doesn't touch the near-origin feature
    let shifted = world_at(Pose::new(0.0, 3.0, 0.0), Pose::new(10.0, -1.0, 0.0));
    assert!(dcg.valid(&shifted, &substantial).unwrap());

    let root_before = top_symbol_ids(&dcg, "root");
    assert!(!dcg.update_world(shifted).unwrap());
    assert_eq!(top_symbol_ids(&dcg, "root"), root_before);
  }

  #[test]
  fn test_valid_rejects_structural_change() {
    let model = command_model();
    let dcg = searched_dcg(&model, world_at(Pose::new(0.0, 0.0, 0.0), Pose::new(10.0, 0.0, 0.0)));
    let substantial = dcg.substantial_features().unwrap();

    let mut bigger = world_at(Pose::new(0.0, 0.0, 0.0), Pose::new(10.0, 0.0, 0.0));
    bigger.insert("block3", Object::default());
    assert!(!dcg.valid(&bigger, &substantial).unwrap());
  }

  #[test]
  fn test_noop_update_with_symbol_inspecting_feature() {
    // a feature reading the node's own symbol list sees the same (empty)
    // list during search and during update, so an identical-world update
    // changes nothing
    let mut pool = FeaturePool::new();
    pool.push(FeatureDef::new(
      "has-any-grounding",
      Dependency::STATIC,
      |cv, _s: &Symbol, lv: &LanguageVariable, _c: &[Symbol], _w: &World| {
        cv == Cv::True && !lv.symbols.is_empty()
      },
    ));
    let model = LogLinearModel::new(pool, vec![9.0f64.ln()]);

    let mut space = SymbolSpace::new();
    space.add("NP", Symbol::new("object").with_property("id", "block1"));
    space.add("NP", Symbol::new("object").with_property("id", "block2"));

    let mut dcg = Dcg::new(
      LanguageVariable::new("NP"),
      &space,
      &model,
      World::new(),
      Cv::ALL.to_vec(),
    );
    dcg.search(4).unwrap();

    let (probability, top) = dcg.solutions().unwrap()[0].clone();
    assert!((probability - 0.25).abs() < 1e-9);
    assert_eq!(top.symbols.len(), 2);

    let changed = dcg.update_world(World::new()).unwrap();
    assert!(!changed);
    let (after_probability, after_top) = &dcg.solutions().unwrap()[0];
    assert!((after_probability - probability).abs() < 1e-9);
    assert_eq!(after_top.symbols, top.symbols);
  }

  #[test]
  fn test_valid_misses_compound_sub_margin_change() {
    // two world features below the margin individually can flip the argmax
    // together; `valid` does not see that, only `update_world` does
    let mut pool = FeaturePool::new();
    pool.push(FeatureDef::new(
      "object-false-bias",
      Dependency::STATIC,
      |cv, symbol: &Symbol, _lv: &LanguageVariable, _c: &[Symbol], _w: &World| {
        cv == Cv::False && symbol.ty == "object"
      },
    ));
    pool.push(FeatureDef::new(
      "far-x",
      Dependency::WORLD,
      |cv, symbol: &Symbol, _lv: &LanguageVariable, _c: &[Symbol], world: &World| {
        cv == Cv::True
          && symbol
            .property("id")
            .and_then(|id| world.object(id))
            .is_some_and(|o| o.pose.x > 5.0)
      },
    ));
    pool.push(FeatureDef::new(
      "far-y",
      Dependency::WORLD,
      |cv, symbol: &Symbol, _lv: &LanguageVariable, _c: &[Symbol], world: &World| {
        cv == Cv::True
          && symbol
            .property("id")
            .and_then(|id| world.object(id))
            .is_some_and(|o| o.pose.y > 5.0)
      },
    ));
    let model = LogLinearModel::new(pool, vec![1.0, 0.8, 0.8]);

    let mut space = SymbolSpace::new();
    space.add("NP", Symbol::new("object").with_property("id", "block1"));

    let mut world = World::new();
    world.insert("block1", Object::at(Pose::new(0.0, 0.0, 0.0)));
    let mut dcg = Dcg::new(
      LanguageVariable::new("NP"),
      &space,
      &model,
      world,
      Cv::ALL.to_vec(),
    );
    dcg.search(4).unwrap();

    // margin is 1.0; each world feature weighs 0.8, so neither is
    // substantial on its own
    let substantial = dcg.substantial_features().unwrap();
    assert!(substantial["root"].iter().all(Vec::is_empty));

    let mut moved = World::new();
    moved.insert("block1", Object::at(Pose::new(10.0, 10.0, 0.0)));
    assert!(dcg.valid(&moved, &substantial).unwrap());

    // both features fire: combined 1.6 beats the margin and the argmax
    // flips despite the pre-filter's go-ahead
    assert!(dcg.update_world(moved).unwrap());
    assert_eq!(dcg.solutions().unwrap()[0].1.symbols.len(), 1);
  }

  #[test]
  fn test_duplicate_candidates_survive_noop_update() {
    let mut pool = FeaturePool::new();
    pool.push(FeatureDef::new(
      "any-object",
      Dependency::STATIC,
      |cv, symbol: &Symbol, _lv: &LanguageVariable, _c: &[Symbol], _w: &World| {
        cv == Cv::True && symbol.ty == "object"
      },
    ));
    let model = LogLinearModel::new(pool, vec![9.0f64.ln()]);

    // two structurally identical candidates become two separate factors
    let mut space = SymbolSpace::new();
    space.add("NP", Symbol::new("object").with_property("id", "block1"));
    space.add("NP", Symbol::new("object").with_property("id", "block1"));

    let mut dcg = Dcg::new(
      LanguageVariable::new("NP"),
      &space,
      &model,
      World::new(),
      Cv::ALL.to_vec(),
    );
    dcg.search(4).unwrap();

    let (probability, top) = dcg.solutions().unwrap()[0].clone();
    assert_eq!(top.symbols.len(), 2);
    assert!((probability - 0.81).abs() < 1e-9);
    for factor in dcg.factor_set("root").unwrap().factors.iter() {
      assert_eq!(factor.decision, Some(Cv::True));
    }

    let changed = dcg.update_world(World::new()).unwrap();
    assert!(!changed);
    let (after_probability, after_top) = &dcg.solutions().unwrap()[0];
    assert!((after_probability - probability).abs() < 1e-9);
    assert_eq!(after_top.symbols.len(), 2);
  }

  #[test]
  fn test_update_before_search_fails() {
    let model = command_model();
    let world = world_at(Pose::new(0.0, 0.0, 0.0), Pose::new(10.0, 0.0, 0.0));
    let mut dcg = Dcg::new(
      command_sentence(),
      &command_space(),
      &model,
      world.clone(),
      Cv::ALL.to_vec(),
    );
    assert!(matches!(dcg.update_world(world), Err(Error::NotSearched)));
  }
}
