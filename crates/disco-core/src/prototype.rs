//! Prototypes — templates from which discovered entities are generated.
//!
//! Every entity kind carries its own spec type. In a [`Prototype`] the string
//! fields are macro patterns (`"Item: {#KEY}"`); in a
//! [`DiscoveredEntity`](crate::entity::DiscoveredEntity) the same types hold
//! the expanded values.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  entity::NewEntity,
  expand::{expand, expand_key},
  macros::MacroContext,
  rule::ItemType,
};

// ─── Kinds ───────────────────────────────────────────────────────────────────

/// The discriminant shared by prototypes and the entities they produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
  Item,
  Host,
  Trigger,
  Graph,
}

impl EntityKind {
  /// The discriminant string stored in the `kind` column.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Item => "item",
      Self::Host => "host",
      Self::Trigger => "trigger",
      Self::Graph => "graph",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "item" => Some(Self::Item),
      "host" => Some(Self::Host),
      "trigger" => Some(Self::Trigger),
      "graph" => Some(Self::Graph),
      _ => None,
    }
  }

  /// Normalise an identity for matching. Host names compare
  /// case-insensitively; every other kind compares exactly.
  pub fn identity_key(self, identity: &str) -> String {
    match self {
      Self::Host => identity.to_lowercase(),
      Self::Item | Self::Trigger | Self::Graph => identity.to_owned(),
    }
  }
}

impl fmt::Display for EntityKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

// ─── Per-kind specs ──────────────────────────────────────────────────────────

/// Type of information an item stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
  Float,
  Char,
  Log,
  Unsigned,
  #[default]
  Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
  #[default]
  NotClassified,
  Information,
  Warning,
  Average,
  High,
  Disaster,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSpec {
  pub name:       String,
  /// The item key; the identity of a discovered item.
  pub key:        String,
  #[serde(default)]
  pub item_type:  ItemType,
  #[serde(default)]
  pub value_type: ValueType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSpec {
  /// Technical host name; the identity of a discovered host.
  pub host:      String,
  /// Visible name, if different from `host`.
  #[serde(default)]
  pub name:      Option<String>,
  /// Templates every host created from this prototype is linked to.
  #[serde(default)]
  pub templates: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSpec {
  pub description: String,
  pub expression:  String,
  #[serde(default)]
  pub severity:    Severity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSpec {
  pub name:  String,
  /// Keys of the items plotted on the graph.
  #[serde(default)]
  pub items: Vec<String>,
}

// ─── EntitySpec ──────────────────────────────────────────────────────────────

/// The kind-tagged definition of a prototype or a discovered entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EntitySpec {
  Item(ItemSpec),
  Host(HostSpec),
  Trigger(TriggerSpec),
  Graph(GraphSpec),
}

impl EntitySpec {
  pub fn kind(&self) -> EntityKind {
    match self {
      Self::Item(_) => EntityKind::Item,
      Self::Host(_) => EntityKind::Host,
      Self::Trigger(_) => EntityKind::Trigger,
      Self::Graph(_) => EntityKind::Graph,
    }
  }

  /// The field that identifies an entity within its (rule, prototype) scope.
  pub fn identity(&self) -> &str {
    match self {
      Self::Item(i) => &i.key,
      Self::Host(h) => &h.host,
      Self::Trigger(t) => &t.description,
      Self::Graph(g) => &g.name,
    }
  }

  /// The normalised identity used for matching.
  pub fn identity_key(&self) -> String { self.kind().identity_key(self.identity()) }

  /// Templates declared by a host spec; empty for every other kind.
  pub fn templates(&self) -> &[Uuid] {
    match self {
      Self::Host(h) => h.templates.as_slice(),
      _ => &[],
    }
  }

  /// Substitute every macro in the spec's patterns. Item keys are expanded in
  /// key-parameter mode; every other field verbatim.
  pub fn expand(&self, ctx: &MacroContext) -> Result<Self> {
    Ok(match self {
      Self::Item(i) => Self::Item(ItemSpec {
        name:       expand(&i.name, ctx)?,
        key:        expand_key(&i.key, ctx)?,
        item_type:  i.item_type,
        value_type: i.value_type,
      }),
      Self::Host(h) => Self::Host(HostSpec {
        host:      expand(&h.host, ctx)?,
        name:      h.name.as_deref().map(|n| expand(n, ctx)).transpose()?,
        templates: h.templates.clone(),
      }),
      Self::Trigger(t) => Self::Trigger(TriggerSpec {
        description: expand(&t.description, ctx)?,
        expression:  expand(&t.expression, ctx)?,
        severity:    t.severity,
      }),
      Self::Graph(g) => Self::Graph(GraphSpec {
        name:  expand(&g.name, ctx)?,
        items: g
          .items
          .iter()
          .map(|k| expand_key(k, ctx))
          .collect::<Result<_>>()?,
      }),
    })
  }

  /// Serialise the spec for the `spec_json` / `definition_json` columns.
  pub fn to_json(&self) -> Result<String> { Ok(serde_json::to_string(self)?) }

  pub fn from_json(s: &str) -> Result<Self> { Ok(serde_json::from_str(s)?) }

  /// Fail with [`Error::KindMismatch`] unless `self` is of `expected` kind.
  pub fn ensure_kind(&self, expected: EntityKind) -> Result<()> {
    if self.kind() == expected {
      Ok(())
    } else {
      Err(Error::KindMismatch {
        expected: expected.as_str(),
        actual:   self.kind().as_str(),
      })
    }
  }
}

// ─── Prototype ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prototype {
  pub prototype_id: Uuid,
  pub rule_id:      Uuid,
  pub spec:         EntitySpec,
  pub created_at:   DateTime<Utc>,
}

impl Prototype {
  pub fn kind(&self) -> EntityKind { self.spec.kind() }

  /// Expand this prototype for one discovered instance.
  pub fn expand(&self, ctx: &MacroContext) -> Result<EntitySpec> { self.spec.expand(ctx) }

  /// Build the creation request for an entity expanded from this prototype.
  /// Host entities carry the prototype's templates as prototype-derived links.
  pub fn instantiate(&self, definition: EntitySpec, clock: DateTime<Utc>) -> NewEntity {
    NewEntity {
      rule_id:        self.rule_id,
      prototype_id:   self.prototype_id,
      template_links: definition.templates().to_vec(),
      spec:           definition,
      last_seen:      clock,
    }
  }
}

/// Input to [`crate::store::DiscoveryStore::create_prototype`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPrototype {
  pub rule_id: Uuid,
  pub spec:    EntitySpec,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item_prototype() -> Prototype {
    Prototype {
      prototype_id: Uuid::new_v4(),
      rule_id:      Uuid::new_v4(),
      spec:         EntitySpec::Item(ItemSpec {
        name:       "Item: {#KEY}".into(),
        key:        "trap[{#KEY}]".into(),
        item_type:  ItemType::Trapper,
        value_type: ValueType::Text,
      }),
      created_at:   Utc::now(),
    }
  }

  #[test]
  fn item_expands_name_and_key() {
    let ctx = MacroContext::new().with("{#KEY}", "item5");
    let spec = item_prototype().expand(&ctx).unwrap();
    let EntitySpec::Item(item) = &spec else { panic!("expected item") };
    assert_eq!(item.name, "Item: item5");
    assert_eq!(item.key, "trap[item5]");
    assert_eq!(spec.identity(), "trap[item5]");
  }

  #[test]
  fn host_identity_is_case_insensitive() {
    let spec = EntitySpec::Host(HostSpec {
      host:      "Host_A".into(),
      name:      None,
      templates: vec![],
    });
    assert_eq!(spec.identity_key(), "host_a");
    assert_eq!(EntityKind::Item.identity_key("Trap[A]"), "Trap[A]");
  }

  #[test]
  fn instantiate_carries_host_templates() {
    let template = Uuid::new_v4();
    let proto = Prototype {
      prototype_id: Uuid::new_v4(),
      rule_id:      Uuid::new_v4(),
      spec:         EntitySpec::Host(HostSpec {
        host:      "host_{#KEY}".into(),
        name:      Some("Host {#KEY}".into()),
        templates: vec![template],
      }),
      created_at:   Utc::now(),
    };
    let ctx = MacroContext::new().with("{#KEY}", "host0");
    let clock = Utc::now();
    let new = proto.instantiate(proto.expand(&ctx).unwrap(), clock);

    assert_eq!(new.prototype_id, proto.prototype_id);
    assert_eq!(new.template_links, vec![template]);
    assert_eq!(new.spec.identity(), "host_host0");
    assert_eq!(new.last_seen, clock);
  }

  #[test]
  fn spec_json_roundtrip_keeps_kind_tag() {
    let spec = item_prototype().spec;
    let json = spec.to_json().unwrap();
    assert!(json.contains("\"kind\":\"item\""));
    assert_eq!(EntitySpec::from_json(&json).unwrap(), spec);
  }

  #[test]
  fn ensure_kind_reports_mismatch() {
    let err = item_prototype().spec.ensure_kind(EntityKind::Host).unwrap_err();
    assert!(matches!(err, Error::KindMismatch { expected: "host", actual: "item" }));
  }
}
