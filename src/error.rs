use thiserror::Error;

/// Errors reported by the parser and the grounding engine.
///
/// `NoLexicalCategory`, `EmptyChart` and `StructuralWorldMismatch` are
/// expected, recoverable failures: the input can't be parsed, or the caller
/// must fall back to a full re-search. The remaining variants indicate
/// grammar-authoring or construction bugs and are not retried.
#[derive(Debug, Error)]
pub enum Error {
  /// Grammar text that doesn't parse or declares an invalid rule.
  #[error("grammar error: {0}")]
  GrammarParse(String),

  /// A token matched no lexical rule, so the sentence cannot be parsed.
  #[error("no lexical category for word {word:?}")]
  NoLexicalCategory { word: String },

  /// The top chart cell is empty after fill: no parse spans the whole input.
  #[error("empty chart: no parse spans the input")]
  EmptyChart,

  /// A top-cell element was a bare word with no phrase rule above it.
  #[error("top chart element is a bare word")]
  TopWasWord,

  /// A structural chart invariant was violated, e.g. a word element above
  /// the bottom diagonal.
  #[error("malformed grammar usage: {0}")]
  MalformedGrammarUsage(String),

  /// Search was requested on a graph with no factor sets.
  #[error("cannot search an empty factor graph")]
  EmptyGraph,

  /// Incremental update or validity checking was requested before a search
  /// completed.
  #[error("factor graph has not been searched yet")]
  NotSearched,

  /// A factor set referenced a key absent from the graph.
  #[error("missing factor set for key {key:?}")]
  MissingFactorSet { key: String },

  /// The new world's object identities differ from the current world's.
  /// Prior solutions are left untouched; the caller should run a full
  /// re-search against the new world instead.
  #[error("world structure changed: expected {expected} objects, got {actual}")]
  StructuralWorldMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
