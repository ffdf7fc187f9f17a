//! Discovery events — one batch of discovered records for one rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, macros::MacroContext};

/// A batch of records received at one timestamp for one rule. Transient:
/// consumed by the reconciler and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryEvent {
  pub rule_id: Uuid,
  pub clock:   DateTime<Utc>,
  pub records: Vec<MacroContext>,
}

impl DiscoveryEvent {
  pub fn new(rule_id: Uuid, clock: DateTime<Utc>, records: Vec<MacroContext>) -> Self {
    Self { rule_id, clock, records }
  }

  /// Parse a discovery payload: either `{"data": [ {..}, .. ]}` or a bare
  /// array of records.
  pub fn from_json(
    rule_id: Uuid,
    clock: DateTime<Utc>,
    payload: &serde_json::Value,
  ) -> Result<Self> {
    let rows = match payload {
      serde_json::Value::Array(rows) => rows,
      serde_json::Value::Object(obj) => obj
        .get("data")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| Error::InvalidPayload("missing \"data\" array".into()))?,
      other => {
        return Err(Error::InvalidPayload(format!(
          "expected an object or array, got {other}"
        )));
      }
    };

    let records = rows
      .iter()
      .map(MacroContext::from_json)
      .collect::<Result<_>>()?;

    Ok(Self { rule_id, clock, records })
  }

  /// Parse a payload received as text (e.g. a sender value).
  pub fn parse(rule_id: Uuid, clock: DateTime<Utc>, payload: &str) -> Result<Self> {
    let value: serde_json::Value = serde_json::from_str(payload)
      .map_err(|e| Error::InvalidPayload(format!("not JSON: {e}")))?;
    Self::from_json(rule_id, clock, &value)
  }
}
