//! Discovery rules — the configuration that owns prototypes and discovered
//! entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lifetime::Lifetime;

/// How a value reaches the platform (the polling type of an item or rule).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
  ZabbixAgent,
  #[default]
  Trapper,
  Simple,
  Internal,
  ZabbixActive,
  External,
  HttpAgent,
  SnmpAgent,
  Dependent,
  Calculated,
  Script,
}

impl ItemType {
  /// Whether values for this type are pushed by a sender rather than polled.
  pub fn accepts_pushed_values(self) -> bool { matches!(self, Self::Trapper) }
}

/// What happens to discovered entities when the prototype (or rule) they were
/// created from is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadePolicy {
  /// Delete the dependent entities together with their prototype.
  #[default]
  Remove,
  /// Keep dependents as orphans; they are no longer reconciled or reaped.
  Retain,
  /// Refuse the deletion while dependents exist.
  Restrict,
}

/// A low-level discovery rule attached to a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRule {
  pub rule_id:    Uuid,
  /// The host the rule (and every item it discovers) belongs to.
  pub host_id:    Uuid,
  pub name:       String,
  /// Key that discovery payloads are addressed to. Unique per host.
  pub key:        String,
  pub item_type:  ItemType,
  /// Polling interval, e.g. `"1h"`.
  pub delay:      String,
  pub lifetime:   Lifetime,
  pub cascade:    CascadePolicy,
  pub created_at: DateTime<Utc>,
}

/// Input to [`crate::store::DiscoveryStore::create_rule`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRule {
  pub host_id:   Uuid,
  pub name:      String,
  pub key:       String,
  #[serde(default)]
  pub item_type: ItemType,
  #[serde(default = "default_delay")]
  pub delay:     String,
  #[serde(default)]
  pub lifetime:  Lifetime,
  #[serde(default)]
  pub cascade:   CascadePolicy,
}

fn default_delay() -> String { "1h".to_owned() }

impl NewRule {
  /// A trapper rule with default interval, lifetime and cascade policy.
  pub fn new(host_id: Uuid, name: impl Into<String>, key: impl Into<String>) -> Self {
    Self {
      host_id,
      name: name.into(),
      key: key.into(),
      item_type: ItemType::default(),
      delay: default_delay(),
      lifetime: Lifetime::default(),
      cascade: CascadePolicy::default(),
    }
  }
}

/// A partial update of a rule; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulePatch {
  pub name:     Option<String>,
  pub delay:    Option<String>,
  pub lifetime: Option<Lifetime>,
  pub cascade:  Option<CascadePolicy>,
}
