#[macro_use]
extern crate lazy_static;

pub mod chart;
pub mod dcg;
pub mod error;
pub mod factor;
pub mod grammar;
pub mod langvar;
pub mod model;
pub mod parse_grammar;
pub mod parse_tree;
pub mod symbol;
pub mod utils;
pub mod world;

pub use crate::dcg::Dcg;
pub use crate::error::{Error, Result};
pub use crate::factor::Solution;
pub use crate::grammar::BinarizedGrammar;
pub use crate::langvar::LanguageVariable;
pub use crate::model::{Cv, LogLinearModel};
pub use crate::parse_tree::ParseTree;
pub use crate::symbol::{Symbol, SymbolSpace};
pub use crate::world::World;

impl BinarizedGrammar {
  /// Parse a sentence into its `max_parses` highest-probability trees
  pub fn parse(&self, text: &str, max_parses: usize) -> Result<Vec<(ParseTree, f64)>> {
    chart::parse(self, text, max_parses)
  }
}

/// Parse a sentence with the grammar and ground its best tree against the
/// world: construct the correspondence graph and run its beam search. The
/// returned graph carries the ranked solutions and stays usable for
/// incremental world updates.
pub fn ground<'a>(
  grammar: &BinarizedGrammar,
  text: &str,
  space: &SymbolSpace,
  model: &'a LogLinearModel,
  world: World,
  beam_width: usize,
) -> Result<Dcg<'a>> {
  let trees = grammar.parse(text, 1)?;
  let (tree, probability) = trees.first().ok_or(Error::EmptyChart)?;
  tracing::debug!(probability, "grounding best parse");

  let sentence = LanguageVariable::from_parse_tree(tree);
  let mut dcg = Dcg::new(sentence, space, model, world, Cv::ALL.to_vec());
  dcg.search(beam_width)?;
  Ok(dcg)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{Dependency, FeatureDef, FeaturePool};
  use crate::world::{Object, Pose};

  #[test]
  fn test_parse_then_ground() {
    let grammar: BinarizedGrammar = r#"
      // toy command grammar
      S -> NP VP;
      VP -> V NP : 0.9;
      NP -> DET N : 0.8;
      NP -> robot : 0.2;
      V -> take;
      DET -> the;
      N -> block;
    "#
    .parse()
    .unwrap();

    let mut pool = FeaturePool::new();
    pool.push(FeatureDef::new(
      "red-object",
      Dependency::WORLD,
      |cv, symbol: &Symbol, _lv: &LanguageVariable, _c: &[Symbol], world: &World| {
        cv == Cv::True
          && symbol
            .property("id")
            .and_then(|id| world.object(id))
            .and_then(|o| o.property("color"))
            == Some("red")
      },
    ));
    pool.push(FeatureDef::new(
      "false-bias",
      Dependency::STATIC,
      |cv, _s: &Symbol, _lv: &LanguageVariable, _c: &[Symbol], _w: &World| cv == Cv::False,
    ));
    let model = LogLinearModel::new(pool, vec![3.0, 0.5]);

    let mut space = SymbolSpace::new();
    space.add("NP", Symbol::new("object").with_property("id", "block1"));
    space.add("NP", Symbol::new("object").with_property("id", "block2"));

    let mut world = World::new();
    world.insert(
      "block1",
      Object::at(Pose::new(0.0, 0.0, 0.0)).with_property("color", "red"),
    );
    world.insert(
      "block2",
      Object::at(Pose::new(1.0, 0.0, 0.0)).with_property("color", "blue"),
    );

    let dcg = ground(&grammar, "robot take the block", &space, &model, world, 4).unwrap();

    let solutions = dcg.solutions().unwrap();
    assert!(!solutions.is_empty());
    let top = &solutions[0].1;
    assert_eq!(top.ty, "S");
    assert_eq!(top.text(), "robot take the block");

    // the noun phrase grounds to the red block
    let grounded: Vec<&str> = top
      .keyed_nodes()
      .into_iter()
      .flat_map(|(_, node)| node.symbols.iter())
      .filter_map(|s| s.property("id"))
      .collect();
    assert_eq!(grounded, vec!["block1"]);
  }

  #[test]
  fn test_ground_unparseable_sentence() {
    let grammar: BinarizedGrammar = "S -> hello;".parse().unwrap();
    let model = LogLinearModel::new(FeaturePool::new(), Vec::new());
    let result = ground(
      &grammar,
      "goodbye",
      &SymbolSpace::new(),
      &model,
      World::new(),
      4,
    );
    assert!(matches!(result, Err(Error::NoLexicalCategory { .. })));
  }
}
