//! Discovered entities and what hangs off them: template links and history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::prototype::{EntityKind, EntitySpec};

// ─── Discovered entities ─────────────────────────────────────────────────────

/// Whether the latest discovery round reported the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
  Active,
  /// Not reported by the latest round; deleted once its lifetime runs out.
  Lost,
}

impl EntityStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Active => "active",
      Self::Lost => "lost",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "active" => Some(Self::Active),
      "lost" => Some(Self::Lost),
      _ => None,
    }
  }
}

/// An item, host, trigger or graph created from a prototype.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredEntity {
  pub entity_id:    Uuid,
  pub rule_id:      Uuid,
  /// The prototype this entity was expanded from; `None` once the prototype
  /// was deleted under [`CascadePolicy::Retain`](crate::rule::CascadePolicy).
  pub prototype_id: Option<Uuid>,
  /// The expanded identity (item key, host name, ...), as displayed.
  pub identity:     String,
  /// The expanded definition.
  pub spec:         EntitySpec,
  pub created_at:   DateTime<Utc>,
  pub last_seen:    DateTime<Utc>,
  pub status:       EntityStatus,
}

impl DiscoveredEntity {
  pub fn kind(&self) -> EntityKind { self.spec.kind() }

  pub fn identity_key(&self) -> String { self.kind().identity_key(&self.identity) }
}

/// Input to [`crate::store::DiscoveryStore::create_entity`]; built by
/// [`Prototype::instantiate`](crate::prototype::Prototype::instantiate).
#[derive(Debug, Clone)]
pub struct NewEntity {
  pub rule_id:        Uuid,
  pub prototype_id:   Uuid,
  pub spec:           EntitySpec,
  pub last_seen:      DateTime<Utc>,
  /// Templates to link with [`LinkType::Prototype`] in the same transaction.
  pub template_links: Vec<Uuid>,
}

/// The result of a create request.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
  Created(DiscoveredEntity),
  /// An entity with the same identity already exists in the same
  /// (rule, prototype) scope; nothing was written.
  Existing(DiscoveredEntity),
}

impl CreateOutcome {
  pub fn entity(&self) -> &DiscoveredEntity {
    match self {
      Self::Created(e) | Self::Existing(e) => e,
    }
  }

  pub fn into_entity(self) -> DiscoveredEntity {
    match self {
      Self::Created(e) | Self::Existing(e) => e,
    }
  }
}

// ─── Templates ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
  pub template_id: Uuid,
  pub name:        String,
  pub created_at:  DateTime<Utc>,
}

/// Outcome of [`DiscoveryStore::delete_template`](crate::store::DiscoveryStore::delete_template).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateDeletion {
  Deleted,
  NotFound,
  /// Prototypes still list the template; nothing was deleted.
  InUse(usize),
}

/// How a template came to be linked to a discovered host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
  /// Added directly to the host; never touched by discovery.
  Manual,
  /// Derived from the host prototype; kept in sync with it.
  Prototype,
}

impl LinkType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Manual => "manual",
      Self::Prototype => "prototype",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "manual" => Some(Self::Manual),
      "prototype" => Some(Self::Prototype),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateLink {
  pub entity_id:   Uuid,
  pub template_id: Uuid,
  pub link_type:   LinkType,
  pub linked_at:   DateTime<Utc>,
}

/// A batch of link edits applied to one host in a single transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkChanges {
  /// Insert the link, or change the type of an existing one.
  pub upsert: Vec<(Uuid, LinkType)>,
  /// Delete the link to each template.
  pub remove: Vec<Uuid>,
}

impl LinkChanges {
  pub fn is_empty(&self) -> bool { self.upsert.is_empty() && self.remove.is_empty() }
}

// ─── History ─────────────────────────────────────────────────────────────────

/// A value received by a discovered item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryValue {
  pub entity_id: Uuid,
  pub clock:     DateTime<Utc>,
  pub value:     String,
}
