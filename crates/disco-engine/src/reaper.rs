//! Lifetime Reaper — deletes entities that stayed lost for longer than their
//! rule's lifetime.
//!
//! The reaper has no clock of its own: callers pass `now`, either from a
//! periodic tick or an explicit trigger.

use chrono::{DateTime, Utc};
use disco_core::{
  entity::EntityStatus,
  store::{DiscoveryStore, EntityQuery},
};
use serde::Serialize;
use tracing::{debug, info};

use crate::{
  Engine,
  error::{EngineError, Result, unavailable},
};

#[derive(Debug, Default, Serialize)]
pub struct SweepReport {
  /// Rules visited.
  pub rules:   usize,
  /// Entities deleted.
  pub deleted: usize,
}

impl<S: DiscoveryStore> Engine<S> {
  /// Delete every lost entity with `now - last_seen > lifetime`, where the
  /// lifetime is read from each rule as it is swept. Each deletion removes
  /// the entity's history and template links with it.
  pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, S::Error> {
    let rules = self
      .store
      .list_rules(None)
      .await
      .map_err(EngineError::store)?;

    let mut report = SweepReport::default();
    for rule in rules {
      // The rule is re-read under the lock: it may have changed or gone since.
      let (_guard, rule) = match self.lock_rule(rule.rule_id).await {
        Ok(locked) => locked,
        Err(EngineError::RuleNotFound(_)) => continue,
        Err(EngineError::StoreUnavailable { source, .. }) => {
          return Err(unavailable(report.deleted)(source));
        }
        Err(other) => return Err(other),
      };
      report.rules += 1;

      let lost = self
        .store
        .list_entities(EntityQuery::for_rule(rule.rule_id).with_status(EntityStatus::Lost))
        .await
        .map_err(unavailable(report.deleted))?;

      for entity in lost {
        if !rule.lifetime.expired(entity.last_seen, now) {
          continue;
        }
        let deleted = self
          .store
          .delete_entity(entity.entity_id)
          .await
          .map_err(unavailable(report.deleted))?;
        if deleted {
          debug!(
            rule_id = %rule.rule_id,
            entity_id = %entity.entity_id,
            identity = %entity.identity,
            "reaped lost entity"
          );
          report.deleted += 1;
        }
      }
    }

    info!(rules = report.rules, deleted = report.deleted, "sweep finished");
    Ok(report)
  }
}
