//! Reconciler — applies one discovery event to a rule's entities.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use disco_core::{
  entity::{CreateOutcome, DiscoveredEntity, EntityStatus},
  event::DiscoveryEvent,
  prototype::{EntitySpec, Prototype},
  store::{DiscoveryStore, EntityQuery},
};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Engine,
  error::{EngineError, EntityError, Result, unavailable},
  linker::plan_links,
  matcher::EntityMatcher,
};

/// What one discovery event changed.
#[derive(Debug, Serialize)]
pub struct ReconcileReport {
  pub rule_id: Uuid,
  pub created: usize,
  pub updated: usize,
  pub lost:    usize,
  pub errors:  Vec<EntityError>,
}

impl ReconcileReport {
  fn new(rule_id: Uuid) -> Self {
    Self { rule_id, created: 0, updated: 0, lost: 0, errors: vec![] }
  }
}

impl<S: DiscoveryStore> Engine<S> {
  /// Reconcile the rule's entities with the records of `event`.
  ///
  /// Every (record, prototype) pair is expanded and matched against the
  /// rule's entities. Matches are refreshed, misses created, and active
  /// entities the event did not report are marked lost. Expansion failures
  /// are collected in the report without affecting other entities. A store
  /// failure aborts the event; entities written before it stay written.
  pub async fn process_event(&self, event: DiscoveryEvent) -> Result<ReconcileReport, S::Error> {
    let rule_id = event.rule_id;
    let (_guard, _) = self.lock_rule(rule_id).await?;

    let prototypes = self
      .store
      .list_prototypes(rule_id)
      .await
      .map_err(EngineError::store)?;
    let existing = self
      .store
      .list_entities(EntityQuery::for_rule(rule_id))
      .await
      .map_err(EngineError::store)?;

    let mut matcher = EntityMatcher::new(existing);
    let mut report = ReconcileReport::new(rule_id);
    let mut seen: HashSet<Uuid> = HashSet::new();
    // Entities whose writes all went through.
    let mut committed: usize = 0;

    for (index, record) in event.records.iter().enumerate() {
      for prototype in &prototypes {
        let definition = match prototype.expand(record) {
          Ok(definition) => definition,
          Err(error) => {
            warn!(
              rule_id = %rule_id,
              prototype_id = %prototype.prototype_id,
              record = index,
              %error,
              "skipping entity"
            );
            report.errors.push(EntityError {
              record: index,
              prototype_id: prototype.prototype_id,
              error,
            });
            continue;
          }
        };

        let entity = match matcher.find(prototype.prototype_id, &definition) {
          Some(entity) => entity.clone(),
          None => {
            let new = prototype.instantiate(definition.clone(), event.clock);
            let outcome = self
              .store
              .create_entity(new)
              .await
              .map_err(unavailable(committed))?;
            match outcome {
              CreateOutcome::Created(entity) => {
                committed += 1;
                debug!(
                  entity_id = %entity.entity_id,
                  identity = %entity.identity,
                  kind = %entity.kind(),
                  "created entity"
                );
                seen.insert(entity.entity_id);
                matcher.insert(entity);
                report.created += 1;
                continue;
              }
              CreateOutcome::Existing(entity) => entity,
            }
          }
        };

        // The same entity reported twice in one event.
        if !seen.insert(entity.entity_id) {
          continue;
        }

        let refreshed = self
          .refresh(prototype, &entity, definition, event.clock, committed)
          .await?;
        committed += 1;
        matcher.insert(refreshed);
        report.updated += 1;
      }
    }

    let current: HashSet<Uuid> = prototypes.iter().map(|p| p.prototype_id).collect();
    let unseen: Vec<Uuid> = matcher
      .entities()
      .filter(|e| e.status == EntityStatus::Active && !seen.contains(&e.entity_id))
      .filter(|e| e.prototype_id.is_some_and(|p| current.contains(&p)))
      .map(|e| e.entity_id)
      .collect();

    for entity_id in unseen {
      let marked = self
        .store
        .mark_lost(entity_id)
        .await
        .map_err(unavailable(committed))?;
      if marked {
        committed += 1;
        debug!(%entity_id, "entity lost");
        report.lost += 1;
      }
    }

    info!(
      rule_id = %rule_id,
      records = event.records.len(),
      created = report.created,
      updated = report.updated,
      lost = report.lost,
      errors = report.errors.len(),
      "processed discovery event"
    );
    Ok(report)
  }

  /// Store the new definition of a rediscovered entity and, for hosts,
  /// converge its prototype links. The entity counts as committed only once
  /// both have been written.
  async fn refresh(
    &self,
    prototype: &Prototype,
    entity: &DiscoveredEntity,
    definition: EntitySpec,
    clock: DateTime<Utc>,
    committed: usize,
  ) -> Result<DiscoveredEntity, S::Error> {
    // Out-of-order events never move last_seen backwards.
    let last_seen = entity.last_seen.max(clock);

    let refreshed = self
      .store
      .refresh_entity(entity.entity_id, definition, last_seen)
      .await
      .map_err(unavailable(committed))?
      .ok_or(EngineError::EntityNotFound(entity.entity_id))?;

    if refreshed.status != entity.status {
      debug!(entity_id = %entity.entity_id, "entity rediscovered");
    }

    if let EntitySpec::Host(_) = prototype.spec {
      let links = self
        .store
        .list_links(entity.entity_id)
        .await
        .map_err(unavailable(committed))?;
      let changes = plan_links(prototype.spec.templates(), &links);
      if !changes.is_empty() {
        self
          .store
          .apply_link_changes(entity.entity_id, changes)
          .await
          .map_err(unavailable(committed))?;
      }
    }

    Ok(refreshed)
  }
}
