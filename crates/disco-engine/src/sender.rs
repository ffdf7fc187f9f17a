//! Trapper routing for values pushed by a sender.

use chrono::{DateTime, Utc};
use disco_core::{
  entity::HistoryValue,
  event::DiscoveryEvent,
  prototype::{EntityKind, EntitySpec},
  store::{DiscoveryStore, EntityQuery},
};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::{
  Engine,
  error::{EngineError, Result},
  reconcile::ReconcileReport,
};

/// Where a submitted value ended up.
#[derive(Debug, Serialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum SubmitOutcome {
  /// The key named a discovery rule; the value was processed as an event.
  Discovery(ReconcileReport),
  /// The key named a discovered trapper item; the value was stored.
  Value(HistoryValue),
}

impl<S: DiscoveryStore> Engine<S> {
  /// Route a value pushed to `key` on `host_id`.
  ///
  /// A discovery rule key takes precedence over an item key. Only trapper
  /// rules and items accept pushed values.
  pub async fn submit(
    &self,
    host_id: Uuid,
    key: String,
    value: String,
    clock: DateTime<Utc>,
  ) -> Result<SubmitOutcome, S::Error> {
    let rule = self
      .store
      .find_rule(host_id, key.clone())
      .await
      .map_err(EngineError::store)?;

    if let Some(rule) = rule {
      if !rule.item_type.accepts_pushed_values() {
        return Err(EngineError::NotTrapper { host_id, key });
      }
      let event = DiscoveryEvent::parse(rule.rule_id, clock, &value)
        .map_err(EngineError::InvalidPayload)?;
      return self.process_event(event).await.map(SubmitOutcome::Discovery);
    }

    let items = self
      .store
      .list_entities(EntityQuery {
        host_id: Some(host_id),
        kind: Some(EntityKind::Item),
        identity: Some(key.clone()),
        ..Default::default()
      })
      .await
      .map_err(EngineError::store)?;

    // Different rules may discover the same key; pick one deterministically.
    let Some(item) = items.into_iter().find(|e| e.identity == key) else {
      return Err(EngineError::UnknownTarget { host_id, key });
    };
    let EntitySpec::Item(spec) = &item.spec else {
      return Err(EngineError::UnknownTarget { host_id, key });
    };
    if !spec.item_type.accepts_pushed_values() {
      return Err(EngineError::NotTrapper { host_id, key });
    }

    let stored = self
      .store
      .record_value(item.entity_id, value, clock)
      .await
      .map_err(EngineError::store)?;
    debug!(entity_id = %item.entity_id, key = %key, "stored pushed value");
    Ok(SubmitOutcome::Value(stored))
  }
}
