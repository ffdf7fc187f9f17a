//! The `DiscoveryStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `disco-store-sqlite`).
//! The engine and the API depend on this abstraction, not on any concrete
//! backend. Every write method is atomic on its own: a create, refresh or
//! delete of one entity either fully happens or not at all.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  entity::{
    CreateOutcome, DiscoveredEntity, EntityStatus, HistoryValue, LinkChanges,
    NewEntity, Template, TemplateDeletion, TemplateLink,
  },
  prototype::{EntityKind, EntitySpec, NewPrototype, Prototype},
  rule::{DiscoveryRule, NewRule, RulePatch},
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`DiscoveryStore::list_entities`]. Results are ordered by
/// identity.
#[derive(Debug, Clone, Default)]
pub struct EntityQuery {
  pub rule_id:      Option<Uuid>,
  /// Restrict to entities of rules attached to this host.
  pub host_id:      Option<Uuid>,
  pub prototype_id: Option<Uuid>,
  pub kind:         Option<EntityKind>,
  pub status:       Option<EntityStatus>,
  /// Exact identity match, normalised per `kind` when `kind` is set.
  pub identity:     Option<String>,
  pub limit:        Option<usize>,
  pub offset:       Option<usize>,
}

impl EntityQuery {
  pub fn for_rule(rule_id: Uuid) -> Self {
    Self { rule_id: Some(rule_id), ..Default::default() }
  }

  pub fn for_prototype(prototype_id: Uuid) -> Self {
    Self { prototype_id: Some(prototype_id), ..Default::default() }
  }

  pub fn with_status(mut self, status: EntityStatus) -> Self {
    self.status = Some(status);
    self
  }

  pub fn with_kind(mut self, kind: EntityKind) -> Self {
    self.kind = Some(kind);
    self
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Error type of a [`DiscoveryStore`] backend.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  /// The write collided with an existing rule key or template name.
  fn is_conflict(&self) -> bool;
}

/// Abstraction over a discovery configuration store.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait DiscoveryStore: Send + Sync {
  type Error: StoreError;

  // ── Rules ─────────────────────────────────────────────────────────────

  fn create_rule(
    &self,
    input: NewRule,
  ) -> impl Future<Output = Result<DiscoveryRule, Self::Error>> + Send + '_;

  fn get_rule(
    &self,
    rule_id: Uuid,
  ) -> impl Future<Output = Result<Option<DiscoveryRule>, Self::Error>> + Send + '_;

  /// Find the rule a payload addressed to `key` on `host_id` belongs to.
  fn find_rule(
    &self,
    host_id: Uuid,
    key: String,
  ) -> impl Future<Output = Result<Option<DiscoveryRule>, Self::Error>> + Send + '_;

  /// List rules, optionally restricted to one host.
  fn list_rules(
    &self,
    host_id: Option<Uuid>,
  ) -> impl Future<Output = Result<Vec<DiscoveryRule>, Self::Error>> + Send + '_;

  /// Apply `patch` and return the updated rule, or `None` if not found.
  fn update_rule(
    &self,
    rule_id: Uuid,
    patch: RulePatch,
  ) -> impl Future<Output = Result<Option<DiscoveryRule>, Self::Error>> + Send + '_;

  /// Delete a rule with its prototypes, entities, links and history.
  /// Returns `false` if the rule did not exist.
  fn delete_rule(
    &self,
    rule_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Templates ─────────────────────────────────────────────────────────

  fn create_template(
    &self,
    name: String,
  ) -> impl Future<Output = Result<Template, Self::Error>> + Send + '_;

  fn get_template(
    &self,
    template_id: Uuid,
  ) -> impl Future<Output = Result<Option<Template>, Self::Error>> + Send + '_;

  fn list_templates(
    &self,
  ) -> impl Future<Output = Result<Vec<Template>, Self::Error>> + Send + '_;

  /// Delete a template and every link to it, unless a prototype lists it.
  /// The reference check and the delete happen in one transaction.
  fn delete_template(
    &self,
    template_id: Uuid,
  ) -> impl Future<Output = Result<TemplateDeletion, Self::Error>> + Send + '_;

  // ── Prototypes ────────────────────────────────────────────────────────

  fn create_prototype(
    &self,
    input: NewPrototype,
  ) -> impl Future<Output = Result<Prototype, Self::Error>> + Send + '_;

  fn get_prototype(
    &self,
    prototype_id: Uuid,
  ) -> impl Future<Output = Result<Option<Prototype>, Self::Error>> + Send + '_;

  fn list_prototypes(
    &self,
    rule_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Prototype>, Self::Error>> + Send + '_;

  /// Replace a prototype's spec. The kind cannot change.
  fn update_prototype(
    &self,
    prototype_id: Uuid,
    spec: EntitySpec,
  ) -> impl Future<Output = Result<Option<Prototype>, Self::Error>> + Send + '_;

  /// Delete a prototype. Entities created from it are kept with their
  /// `prototype_id` cleared; callers delete them first to cascade.
  fn delete_prototype(
    &self,
    prototype_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Entities ──────────────────────────────────────────────────────────

  /// Create an entity (and, for hosts, its prototype links) atomically.
  ///
  /// If an entity with the same normalised identity already exists for the
  /// same rule and prototype, nothing is written and the existing entity is
  /// returned as [`CreateOutcome::Existing`].
  fn create_entity(
    &self,
    input: NewEntity,
  ) -> impl Future<Output = Result<CreateOutcome, Self::Error>> + Send + '_;

  fn get_entity(
    &self,
    entity_id: Uuid,
  ) -> impl Future<Output = Result<Option<DiscoveredEntity>, Self::Error>> + Send + '_;

  fn list_entities(
    &self,
    query: EntityQuery,
  ) -> impl Future<Output = Result<Vec<DiscoveredEntity>, Self::Error>> + Send + '_;

  /// Record that an entity was discovered again: store the new definition,
  /// set `last_seen` and mark it active.
  fn refresh_entity(
    &self,
    entity_id: Uuid,
    spec: EntitySpec,
    last_seen: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<DiscoveredEntity>, Self::Error>> + Send + '_;

  /// Mark an entity lost. `last_seen` is left untouched.
  fn mark_lost(
    &self,
    entity_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Clear the prototype reference of every entity created from
  /// `prototype_id`. Returns the number of entities orphaned.
  fn orphan_entities(
    &self,
    prototype_id: Uuid,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Delete an entity with its history and template links.
  fn delete_entity(
    &self,
    entity_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Template links ────────────────────────────────────────────────────

  fn list_links(
    &self,
    entity_id: Uuid,
  ) -> impl Future<Output = Result<Vec<TemplateLink>, Self::Error>> + Send + '_;

  /// Apply a batch of link edits to one host in a single transaction.
  fn apply_link_changes(
    &self,
    entity_id: Uuid,
    changes: LinkChanges,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── History ───────────────────────────────────────────────────────────

  fn record_value(
    &self,
    entity_id: Uuid,
    value: String,
    clock: DateTime<Utc>,
  ) -> impl Future<Output = Result<HistoryValue, Self::Error>> + Send + '_;

  /// Values of one item, newest first.
  fn history(
    &self,
    entity_id: Uuid,
    limit: Option<usize>,
  ) -> impl Future<Output = Result<Vec<HistoryValue>, Self::Error>> + Send + '_;
}
