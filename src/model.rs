use std::fmt;

use crate::langvar::LanguageVariable;
use crate::symbol::Symbol;
use crate::world::World;

/// Correspondence variable: whether a candidate symbol is the correct
/// grounding for a language-variable node. Passed explicitly through the
/// model and search APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cv {
  True,
  False,
}

impl Cv {
  pub const ALL: [Cv; 2] = [Cv::True, Cv::False];

  pub fn flip(self) -> Cv {
    match self {
      Cv::True => Cv::False,
      Cv::False => Cv::True,
    }
  }
}

impl fmt::Display for Cv {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Cv::True => write!(f, "true"),
      Cv::False => write!(f, "false"),
    }
  }
}

/// A pair of values indexed by correspondence value
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerCv<T> {
  pub if_true: T,
  pub if_false: T,
}

impl<T> PerCv<T> {
  pub fn get(&self, cv: Cv) -> &T {
    match cv {
      Cv::True => &self.if_true,
      Cv::False => &self.if_false,
    }
  }

  pub fn get_mut(&mut self, cv: Cv) -> &mut T {
    match cv {
      Cv::True => &mut self.if_true,
      Cv::False => &mut self.if_false,
    }
  }
}

/// What a feature's value can depend on besides the static sentence and
/// candidate symbol. Declared up front; incremental update trusts this
/// classification instead of inspecting feature code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dependency {
  pub world: bool,
  pub children: bool,
}

impl Dependency {
  pub const STATIC: Dependency = Dependency {
    world: false,
    children: false,
  };
  pub const WORLD: Dependency = Dependency {
    world: true,
    children: false,
  };
  pub const CHILDREN: Dependency = Dependency {
    world: false,
    children: true,
  };
}

/// A boolean feature function over a scoring context. Must be pure: the
/// incremental update and validity machinery re-evaluates features at will
/// and compares against cached values.
pub type FeatureFn = Box<dyn Fn(Cv, &Symbol, &LanguageVariable, &[Symbol], &World) -> bool>;

pub struct FeatureDef {
  pub name: String,
  pub depends: Dependency,
  pub eval: FeatureFn,
}

impl FeatureDef {
  pub fn new(
    name: impl Into<String>,
    depends: Dependency,
    eval: impl Fn(Cv, &Symbol, &LanguageVariable, &[Symbol], &World) -> bool + 'static,
  ) -> Self {
    Self {
      name: name.into(),
      depends,
      eval: Box::new(eval),
    }
  }
}

impl fmt::Debug for FeatureDef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FeatureDef")
      .field("name", &self.name)
      .field("depends", &self.depends)
      .finish_non_exhaustive()
  }
}

/// The ordered feature list shared by every factor; a feature's index in the
/// pool is its identity and its index into the model's weight vector.
#[derive(Debug, Default)]
pub struct FeaturePool {
  features: Vec<FeatureDef>,
}

impl FeaturePool {
  pub fn new() -> Self {
    Default::default()
  }

  /// Add a feature, returning its index
  pub fn push(&mut self, feature: FeatureDef) -> usize {
    self.features.push(feature);
    self.features.len() - 1
  }

  pub fn len(&self) -> usize {
    self.features.len()
  }

  pub fn is_empty(&self) -> bool {
    self.features.is_empty()
  }

  pub fn get(&self, idx: usize) -> &FeatureDef {
    &self.features[idx]
  }

  pub fn iter(&self) -> std::slice::Iter<'_, FeatureDef> {
    self.features.iter()
  }
}

/// Result of scoring one (correspondence value, candidate symbol) pairing
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResult {
  /// Softmax probability of the requested correspondence value
  pub probability: f64,
  /// Summed weights of firing features, per correspondence value
  pub sums: PerCv<f64>,
  pub numerator: f64,
  pub denominator: f64,
}

/// A log-linear model: a feature pool plus one weight per feature.
pub struct LogLinearModel {
  pool: FeaturePool,
  weights: Vec<f64>,
}

impl LogLinearModel {
  pub fn new(pool: FeaturePool, weights: Vec<f64>) -> Self {
    assert_eq!(
      pool.len(),
      weights.len(),
      "one weight per pooled feature required"
    );
    Self { pool, weights }
  }

  pub fn pool(&self) -> &FeaturePool {
    &self.pool
  }

  pub fn weight(&self, idx: usize) -> f64 {
    self.weights[idx]
  }

  /// Score a candidate symbol for one correspondence value against the
  /// accumulated context: softmax over `cvs` of the summed weights of
  /// firing features.
  pub fn score(
    &self,
    cv: Cv,
    symbol: &Symbol,
    children: &[Symbol],
    lv: &LanguageVariable,
    world: &World,
    cvs: &[Cv],
  ) -> ScoreResult {
    let mut sums = PerCv::<f64>::default();
    let mut numerator = 0.0;
    let mut denominator = 0.0;

    for &v in cvs {
      let mut sum = 0.0;
      for (idx, feature) in self.pool.iter().enumerate() {
        if (feature.eval)(v, symbol, lv, children, world) {
          sum += self.weights[idx];
        }
      }
      *sums.get_mut(v) = sum;

      let exp = sum.exp();
      if v == cv {
        numerator = exp;
      }
      denominator += exp;
    }

    ScoreResult {
      probability: numerator / denominator,
      sums,
      numerator,
      denominator,
    }
  }

  /// Indices of pool features that fire for `cv` in the given context
  pub fn firing_indices(
    &self,
    cv: Cv,
    symbol: &Symbol,
    children: &[Symbol],
    lv: &LanguageVariable,
    world: &World,
  ) -> Vec<usize> {
    self
      .pool
      .iter()
      .enumerate()
      .filter(|(_, feature)| (feature.eval)(cv, symbol, lv, children, world))
      .map(|(idx, _)| idx)
      .collect()
  }
}

impl fmt::Debug for LogLinearModel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("LogLinearModel")
      .field("features", &self.pool.len())
      .field("weights", &self.weights)
      .finish_non_exhaustive()
  }
}
