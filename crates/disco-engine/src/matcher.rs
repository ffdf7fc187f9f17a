//! Entity Matcher — finds the existing entity an expanded definition refers
//! to.

use std::collections::HashMap;

use disco_core::{entity::DiscoveredEntity, prototype::EntitySpec};
use uuid::Uuid;

/// Index of one rule's entities keyed by `(prototype, normalised identity)`.
///
/// Orphaned entities (no prototype) are never indexed, so discovery leaves
/// them alone.
#[derive(Debug, Default)]
pub struct EntityMatcher {
  index: HashMap<(Uuid, String), DiscoveredEntity>,
}

impl EntityMatcher {
  pub fn new(entities: impl IntoIterator<Item = DiscoveredEntity>) -> Self {
    let mut matcher = Self::default();
    for entity in entities {
      matcher.insert(entity);
    }
    matcher
  }

  /// The entity of `prototype_id` whose identity matches `definition`.
  pub fn find(&self, prototype_id: Uuid, definition: &EntitySpec) -> Option<&DiscoveredEntity> {
    self.index.get(&(prototype_id, definition.identity_key()))
  }

  /// Index `entity`, replacing any previous entry with the same key.
  pub fn insert(&mut self, entity: DiscoveredEntity) {
    if let Some(prototype_id) = entity.prototype_id {
      self.index.insert((prototype_id, entity.identity_key()), entity);
    }
  }

  pub fn entities(&self) -> impl Iterator<Item = &DiscoveredEntity> { self.index.values() }

  pub fn len(&self) -> usize { self.index.len() }

  pub fn is_empty(&self) -> bool { self.index.is_empty() }
}
