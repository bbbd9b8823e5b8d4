use std::collections::BTreeMap;
use std::fmt;

/// Position of an object in the modeled workspace
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
  pub x: f64,
  pub y: f64,
  pub z: f64,
}

impl Pose {
  pub fn new(x: f64, y: f64, z: f64) -> Self {
    Self { x, y, z }
  }
}

impl fmt::Display for Pose {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "({}, {}, {})", self.x, self.y, self.z)
  }
}

/// State of one world object: where it is and what it is like
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Object {
  pub pose: Pose,
  pub properties: BTreeMap<String, String>,
}

impl Object {
  pub fn at(pose: Pose) -> Self {
    Self {
      pose,
      ..Default::default()
    }
  }

  pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.properties.insert(key.into(), value.into());
    self
  }

  pub fn property(&self, key: &str) -> Option<&str> {
    self.properties.get(key).map(String::as_str)
  }
}

/// The modeled world: an ordered map from object identity to object state.
/// Read-only for the duration of a parse/search; incremental update swaps in
/// a whole new world whose object identities must match.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct World {
  objects: BTreeMap<String, Object>,
}

impl World {
  pub fn new() -> Self {
    Default::default()
  }

  pub fn insert(&mut self, id: impl Into<String>, object: Object) {
    self.objects.insert(id.into(), object);
  }

  pub fn object(&self, id: &str) -> Option<&Object> {
    self.objects.get(id)
  }

  pub fn objects(&self) -> impl Iterator<Item = (&String, &Object)> {
    self.objects.iter()
  }

  pub fn len(&self) -> usize {
    self.objects.len()
  }

  pub fn is_empty(&self) -> bool {
    self.objects.is_empty()
  }

  /// True when both worlds contain exactly the same object identities.
  /// Object *state* may differ; this is the precondition for incremental
  /// update, which can re-score state changes but not structural ones.
  pub fn same_structure(&self, other: &World) -> bool {
    self.objects.len() == other.objects.len() && self.objects.keys().eq(other.objects.keys())
  }
}
