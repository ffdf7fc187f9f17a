//! Configuration changes that cascade to discovered entities.
//!
//! What happens to the entities of a deleted prototype or rule is decided by
//! the rule's [`CascadePolicy`].

use disco_core::{
  entity::TemplateDeletion,
  prototype::{EntitySpec, NewPrototype, Prototype},
  rule::CascadePolicy,
  store::{DiscoveryStore, EntityQuery},
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::{
  Engine,
  error::{EngineError, Result, unavailable},
};

/// What a delete did to dependent entities.
#[derive(Debug, Default, Serialize)]
pub struct DeleteReport {
  pub removed:  usize,
  pub orphaned: usize,
}

impl<S: DiscoveryStore> Engine<S> {
  async fn ensure_templates(&self, spec: &EntitySpec) -> Result<(), S::Error> {
    for &template_id in spec.templates() {
      self
        .store
        .get_template(template_id)
        .await
        .map_err(EngineError::store)?
        .ok_or(EngineError::TemplateNotFound(template_id))?;
    }
    Ok(())
  }

  /// Add a prototype to a rule. Its entities appear with the next event.
  pub async fn create_prototype(&self, input: NewPrototype) -> Result<Prototype, S::Error> {
    let (_guard, _) = self.lock_rule(input.rule_id).await?;
    self.ensure_templates(&input.spec).await?;

    let prototype = self
      .store
      .create_prototype(input)
      .await
      .map_err(EngineError::store)?;
    info!(
      prototype_id = %prototype.prototype_id,
      rule_id = %prototype.rule_id,
      kind = %prototype.kind(),
      "created prototype"
    );
    Ok(prototype)
  }

  /// Replace a prototype's spec. The kind cannot change. Discovered entities
  /// pick up the new spec with the next event, or with
  /// [`Engine::resync_prototype`] for template links.
  pub async fn update_prototype(
    &self,
    prototype_id: Uuid,
    spec: EntitySpec,
  ) -> Result<Prototype, S::Error> {
    let current = self
      .store
      .get_prototype(prototype_id)
      .await
      .map_err(EngineError::store)?
      .ok_or(EngineError::PrototypeNotFound(prototype_id))?;
    spec
      .ensure_kind(current.kind())
      .map_err(EngineError::InvalidPayload)?;

    let (_guard, _) = self.lock_rule(current.rule_id).await?;
    self.ensure_templates(&spec).await?;

    self
      .store
      .update_prototype(prototype_id, spec)
      .await
      .map_err(EngineError::store)?
      .ok_or(EngineError::PrototypeNotFound(prototype_id))
  }

  /// Delete a prototype, handling its entities per the rule's policy.
  pub async fn delete_prototype(&self, prototype_id: Uuid) -> Result<DeleteReport, S::Error> {
    let rule_id = self
      .store
      .get_prototype(prototype_id)
      .await
      .map_err(EngineError::store)?
      .ok_or(EngineError::PrototypeNotFound(prototype_id))?
      .rule_id;
    let (_guard, rule) = self.lock_rule(rule_id).await?;

    // A concurrent delete may have won the race for the lock.
    self
      .store
      .get_prototype(prototype_id)
      .await
      .map_err(EngineError::store)?
      .ok_or(EngineError::PrototypeNotFound(prototype_id))?;
    let dependents = self
      .store
      .list_entities(EntityQuery::for_prototype(prototype_id))
      .await
      .map_err(EngineError::store)?;

    let mut report = DeleteReport::default();
    match rule.cascade {
      CascadePolicy::Restrict if !dependents.is_empty() => {
        return Err(EngineError::CascadeConflict {
          target:     format!("prototype {prototype_id}"),
          dependents: dependents.len(),
        });
      }
      CascadePolicy::Restrict => {}
      CascadePolicy::Remove => {
        for entity in &dependents {
          let deleted = self
            .store
            .delete_entity(entity.entity_id)
            .await
            .map_err(unavailable(report.removed))?;
          if deleted {
            report.removed += 1;
          }
        }
      }
      CascadePolicy::Retain => {
        report.orphaned = self
          .store
          .orphan_entities(prototype_id)
          .await
          .map_err(EngineError::store)?;
      }
    }

    let committed = report.removed + report.orphaned;
    let deleted = self
      .store
      .delete_prototype(prototype_id)
      .await
      .map_err(unavailable(committed))?;
    if !deleted {
      return Err(EngineError::PrototypeNotFound(prototype_id));
    }

    info!(
      prototype_id = %prototype_id,
      removed = report.removed,
      orphaned = report.orphaned,
      "deleted prototype"
    );
    Ok(report)
  }

  /// Delete a rule together with its prototypes and entities. Refused under
  /// [`CascadePolicy::Restrict`] while the rule has entities.
  pub async fn delete_rule(&self, rule_id: Uuid) -> Result<DeleteReport, S::Error> {
    let (guard, rule) = self.lock_rule(rule_id).await?;
    let dependents = self
      .store
      .list_entities(EntityQuery::for_rule(rule_id))
      .await
      .map_err(EngineError::store)?;

    if rule.cascade == CascadePolicy::Restrict && !dependents.is_empty() {
      return Err(EngineError::CascadeConflict {
        target:     format!("rule {rule_id}"),
        dependents: dependents.len(),
      });
    }

    self
      .store
      .delete_rule(rule_id)
      .await
      .map_err(EngineError::store)?;
    drop(guard);
    self.locks.forget(rule_id);

    info!(rule_id = %rule_id, removed = dependents.len(), "deleted rule");
    Ok(DeleteReport { removed: dependents.len(), orphaned: 0 })
  }

  /// Delete a template. Refused while any prototype lists it; links on
  /// discovered hosts go with it.
  pub async fn delete_template(&self, template_id: Uuid) -> Result<(), S::Error> {
    let outcome = self
      .store
      .delete_template(template_id)
      .await
      .map_err(EngineError::store)?;
    match outcome {
      TemplateDeletion::Deleted => {
        info!(template_id = %template_id, "deleted template");
        Ok(())
      }
      TemplateDeletion::NotFound => Err(EngineError::TemplateNotFound(template_id)),
      TemplateDeletion::InUse(prototypes) => Err(EngineError::CascadeConflict {
        target:     format!("template {template_id}"),
        dependents: prototypes,
      }),
    }
  }
}
