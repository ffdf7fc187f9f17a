//! Template Linker — converges a discovered host's template links with its
//! prototype.

use std::collections::HashSet;

use disco_core::{
  entity::{LinkChanges, LinkType, TemplateLink},
  prototype::EntityKind,
  store::{DiscoveryStore, EntityQuery},
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::{
  Engine,
  error::{EngineError, Result, unavailable},
};

/// Compute the link edits that bring `current` in line with the prototype's
/// `desired` template list.
///
/// - A listed template with no link gets a prototype link.
/// - A listed template with a manual link has it promoted to a prototype link.
/// - A prototype link to a template no longer listed is removed.
/// - Manual links to unlisted templates are kept as they are.
pub fn plan_links(desired: &[Uuid], current: &[TemplateLink]) -> LinkChanges {
  let mut changes = LinkChanges::default();
  let mut listed = HashSet::new();

  for &template_id in desired {
    if !listed.insert(template_id) {
      continue;
    }
    let existing = current.iter().find(|l| l.template_id == template_id);
    match existing.map(|l| l.link_type) {
      Some(LinkType::Prototype) => {}
      Some(LinkType::Manual) | None => {
        changes.upsert.push((template_id, LinkType::Prototype));
      }
    }
  }

  changes.remove = current
    .iter()
    .filter(|l| l.link_type == LinkType::Prototype && !listed.contains(&l.template_id))
    .map(|l| l.template_id)
    .collect();

  changes
}

// ─── Engine operations ───────────────────────────────────────────────────────

/// What a prototype resync changed.
#[derive(Debug, Default, Serialize)]
pub struct ResyncReport {
  pub hosts:    usize,
  pub linked:   usize,
  pub unlinked: usize,
}

impl<S: DiscoveryStore> Engine<S> {
  /// Converge the template links of every host discovered from
  /// `prototype_id` with the prototype's current template list.
  pub async fn resync_prototype(&self, prototype_id: Uuid) -> Result<ResyncReport, S::Error> {
    let rule_id = self
      .store
      .get_prototype(prototype_id)
      .await
      .map_err(EngineError::store)?
      .ok_or(EngineError::PrototypeNotFound(prototype_id))?
      .rule_id;
    let (_guard, _) = self.lock_rule(rule_id).await?;

    // Re-read under the lock: the template list may have changed since.
    let prototype = self
      .store
      .get_prototype(prototype_id)
      .await
      .map_err(EngineError::store)?
      .ok_or(EngineError::PrototypeNotFound(prototype_id))?;

    let mut report = ResyncReport::default();
    if prototype.kind() != EntityKind::Host {
      return Ok(report);
    }

    let hosts = self
      .store
      .list_entities(EntityQuery::for_prototype(prototype_id))
      .await
      .map_err(EngineError::store)?;

    let mut committed = 0;
    for host in hosts {
      let links = self
        .store
        .list_links(host.entity_id)
        .await
        .map_err(unavailable(committed))?;
      let changes = plan_links(prototype.spec.templates(), &links);
      report.hosts += 1;
      if changes.is_empty() {
        continue;
      }
      report.linked += changes.upsert.len();
      report.unlinked += changes.remove.len();
      self
        .store
        .apply_link_changes(host.entity_id, changes)
        .await
        .map_err(unavailable(committed))?;
      committed += 1;
    }

    info!(
      prototype_id = %prototype_id,
      hosts = report.hosts,
      linked = report.linked,
      unlinked = report.unlinked,
      "resynced prototype links"
    );
    Ok(report)
  }

  /// Link `template_id` to a discovered host by hand. An existing link of
  /// either type is returned unchanged.
  pub async fn link_template_manually(
    &self,
    entity_id: Uuid,
    template_id: Uuid,
  ) -> Result<TemplateLink, S::Error> {
    let host = self
      .store
      .get_entity(entity_id)
      .await
      .map_err(EngineError::store)?
      .ok_or(EngineError::EntityNotFound(entity_id))?;
    host
      .spec
      .ensure_kind(EntityKind::Host)
      .map_err(EngineError::InvalidPayload)?;
    self
      .store
      .get_template(template_id)
      .await
      .map_err(EngineError::store)?
      .ok_or(EngineError::TemplateNotFound(template_id))?;

    let (_guard, _) = self.lock_rule(host.rule_id).await?;

    let find = |links: Vec<TemplateLink>| links.into_iter().find(|l| l.template_id == template_id);

    let links = self
      .store
      .list_links(entity_id)
      .await
      .map_err(EngineError::store)?;
    if let Some(link) = find(links) {
      return Ok(link);
    }

    let changes = LinkChanges {
      upsert: vec![(template_id, LinkType::Manual)],
      remove: vec![],
    };
    self
      .store
      .apply_link_changes(entity_id, changes)
      .await
      .map_err(EngineError::store)?;

    let links = self
      .store
      .list_links(entity_id)
      .await
      .map_err(unavailable(1))?;
    find(links).ok_or(EngineError::EntityNotFound(entity_id))
  }
}
