//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings (nanosecond
//! precision, `Z` suffix) so that they sort lexicographically. Specs are
//! stored as tagged JSON. UUIDs are stored as hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use disco_core::{
  entity::{DiscoveredEntity, EntityStatus, HistoryValue, LinkType, Template, TemplateLink},
  lifetime::Lifetime,
  prototype::{EntityKind, EntitySpec, Prototype},
  rule::DiscoveryRule,
};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Unit enums ──────────────────────────────────────────────────────────────

/// Encode a fieldless serde enum as its bare variant name.
pub fn encode_enum<T: Serialize>(value: &T) -> Result<String> {
  match serde_json::to_value(value)? {
    serde_json::Value::String(s) => Ok(s),
    other => Err(Error::Decode(format!("not a unit variant: {other}"))),
  }
}

pub fn decode_enum<T: DeserializeOwned>(s: &str) -> Result<T> {
  Ok(serde_json::from_value(serde_json::Value::String(s.to_owned()))?)
}

pub fn decode_kind(s: &str) -> Result<EntityKind> {
  EntityKind::parse(s).ok_or_else(|| Error::Decode(format!("unknown entity kind: {s:?}")))
}

pub fn decode_status(s: &str) -> Result<EntityStatus> {
  EntityStatus::parse(s).ok_or_else(|| Error::Decode(format!("unknown entity status: {s:?}")))
}

pub fn decode_link_type(s: &str) -> Result<LinkType> {
  LinkType::parse(s).ok_or_else(|| Error::Decode(format!("unknown link type: {s:?}")))
}

pub fn decode_lifetime(s: &str) -> Result<Lifetime> { Ok(s.parse()?) }

// ─── Row types ───────────────────────────────────────────────────────────────

pub const RULE_COLUMNS: &str = "rule_id, host_id, name, rule_key, item_type, delay, \
                                lifetime, cascade_policy, created_at";

/// Raw strings read directly from a `rules` row.
pub struct RawRule {
  pub rule_id:        String,
  pub host_id:        String,
  pub name:           String,
  pub rule_key:       String,
  pub item_type:      String,
  pub delay:          String,
  pub lifetime:       String,
  pub cascade_policy: String,
  pub created_at:     String,
}

impl RawRule {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      rule_id:        row.get(0)?,
      host_id:        row.get(1)?,
      name:           row.get(2)?,
      rule_key:       row.get(3)?,
      item_type:      row.get(4)?,
      delay:          row.get(5)?,
      lifetime:       row.get(6)?,
      cascade_policy: row.get(7)?,
      created_at:     row.get(8)?,
    })
  }

  pub fn into_rule(self) -> Result<DiscoveryRule> {
    Ok(DiscoveryRule {
      rule_id:    decode_uuid(&self.rule_id)?,
      host_id:    decode_uuid(&self.host_id)?,
      name:       self.name,
      key:        self.rule_key,
      item_type:  decode_enum(&self.item_type)?,
      delay:      self.delay,
      lifetime:   decode_lifetime(&self.lifetime)?,
      cascade:    decode_enum(&self.cascade_policy)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub const TEMPLATE_COLUMNS: &str = "template_id, name, created_at";

/// Raw strings read directly from a `templates` row.
pub struct RawTemplate {
  pub template_id: String,
  pub name:        String,
  pub created_at:  String,
}

impl RawTemplate {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      template_id: row.get(0)?,
      name:        row.get(1)?,
      created_at:  row.get(2)?,
    })
  }

  pub fn into_template(self) -> Result<Template> {
    Ok(Template {
      template_id: decode_uuid(&self.template_id)?,
      name:        self.name,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

pub const PROTOTYPE_COLUMNS: &str = "prototype_id, rule_id, kind, spec_json, created_at";

/// Raw strings read directly from a `prototypes` row.
pub struct RawPrototype {
  pub prototype_id: String,
  pub rule_id:      String,
  pub kind:         String,
  pub spec_json:    String,
  pub created_at:   String,
}

impl RawPrototype {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      prototype_id: row.get(0)?,
      rule_id:      row.get(1)?,
      kind:         row.get(2)?,
      spec_json:    row.get(3)?,
      created_at:   row.get(4)?,
    })
  }

  pub fn into_prototype(self) -> Result<Prototype> {
    let spec = EntitySpec::from_json(&self.spec_json)?;
    spec.ensure_kind(decode_kind(&self.kind)?)?;
    Ok(Prototype {
      prototype_id: decode_uuid(&self.prototype_id)?,
      rule_id:      decode_uuid(&self.rule_id)?,
      spec,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

pub const ENTITY_COLUMNS: &str = "e.entity_id, e.rule_id, e.prototype_id, e.identity, \
                                  e.spec_json, e.created_at, e.last_seen, e.status";

/// Raw strings read directly from an `entities` row.
pub struct RawEntity {
  pub entity_id:    String,
  pub rule_id:      String,
  pub prototype_id: Option<String>,
  pub identity:     String,
  pub spec_json:    String,
  pub created_at:   String,
  pub last_seen:    String,
  pub status:       String,
}

impl RawEntity {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entity_id:    row.get(0)?,
      rule_id:      row.get(1)?,
      prototype_id: row.get(2)?,
      identity:     row.get(3)?,
      spec_json:    row.get(4)?,
      created_at:   row.get(5)?,
      last_seen:    row.get(6)?,
      status:       row.get(7)?,
    })
  }

  pub fn into_entity(self) -> Result<DiscoveredEntity> {
    Ok(DiscoveredEntity {
      entity_id:    decode_uuid(&self.entity_id)?,
      rule_id:      decode_uuid(&self.rule_id)?,
      prototype_id: self.prototype_id.as_deref().map(decode_uuid).transpose()?,
      identity:     self.identity,
      spec:         EntitySpec::from_json(&self.spec_json)?,
      created_at:   decode_dt(&self.created_at)?,
      last_seen:    decode_dt(&self.last_seen)?,
      status:       decode_status(&self.status)?,
    })
  }
}

pub const LINK_COLUMNS: &str = "entity_id, template_id, link_type, linked_at";

/// Raw strings read directly from a `template_links` row.
pub struct RawLink {
  pub entity_id:   String,
  pub template_id: String,
  pub link_type:   String,
  pub linked_at:   String,
}

impl RawLink {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entity_id:   row.get(0)?,
      template_id: row.get(1)?,
      link_type:   row.get(2)?,
      linked_at:   row.get(3)?,
    })
  }

  pub fn into_link(self) -> Result<TemplateLink> {
    Ok(TemplateLink {
      entity_id:   decode_uuid(&self.entity_id)?,
      template_id: decode_uuid(&self.template_id)?,
      link_type:   decode_link_type(&self.link_type)?,
      linked_at:   decode_dt(&self.linked_at)?,
    })
  }
}

/// Raw strings read directly from a `history` row.
pub struct RawHistory {
  pub entity_id: String,
  pub clock:     String,
  pub value:     String,
}

impl RawHistory {
  pub fn into_value(self) -> Result<HistoryValue> {
    Ok(HistoryValue {
      entity_id: decode_uuid(&self.entity_id)?,
      clock:     decode_dt(&self.clock)?,
      value:     self.value,
    })
  }
}
