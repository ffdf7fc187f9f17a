//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{Duration, Utc};
use disco_core::{
  entity::{CreateOutcome, EntityStatus, LinkChanges, LinkType, TemplateDeletion},
  lifetime::Lifetime,
  prototype::{EntityKind, EntitySpec, HostSpec, ItemSpec, NewPrototype, Prototype, ValueType},
  rule::{CascadePolicy, DiscoveryRule, ItemType, NewRule, RulePatch},
  store::{DiscoveryStore, EntityQuery, StoreError as _},
  macros::MacroContext,
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn rule(s: &SqliteStore) -> DiscoveryRule {
  s.create_rule(NewRule::new(Uuid::new_v4(), "Trapper discovery", "item_discovery"))
    .await
    .unwrap()
}

fn item_spec() -> EntitySpec {
  EntitySpec::Item(ItemSpec {
    name:       "Item: {#KEY}".into(),
    key:        "trap[{#KEY}]".into(),
    item_type:  ItemType::Trapper,
    value_type: ValueType::Text,
  })
}

fn host_spec(templates: Vec<Uuid>) -> EntitySpec {
  EntitySpec::Host(HostSpec {
    host: "host_{#KEY}".into(),
    name: None,
    templates,
  })
}

async fn prototype(s: &SqliteStore, rule_id: Uuid, spec: EntitySpec) -> Prototype {
  s.create_prototype(NewPrototype { rule_id, spec }).await.unwrap()
}

async fn discover(s: &SqliteStore, proto: &Prototype, key: &str) -> CreateOutcome {
  let ctx = MacroContext::new().with("{#KEY}", key);
  let new = proto.instantiate(proto.expand(&ctx).unwrap(), Utc::now());
  s.create_entity(new).await.unwrap()
}

// ─── Rules ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_find_rule() {
  let s = store().await;
  let r = rule(&s).await;

  let fetched = s.get_rule(r.rule_id).await.unwrap().unwrap();
  assert_eq!(fetched, r);

  let found = s
    .find_rule(r.host_id, "item_discovery".into())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(found.rule_id, r.rule_id);

  assert!(s.find_rule(r.host_id, "other".into()).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_rule_key_on_same_host_errors() {
  let s = store().await;
  let r = rule(&s).await;

  let err = s
    .create_rule(NewRule::new(r.host_id, "again", "item_discovery"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DuplicateRuleKey { .. }));
  assert!(err.is_conflict());

  // Same key on another host is fine.
  s.create_rule(NewRule::new(Uuid::new_v4(), "other host", "item_discovery"))
    .await
    .unwrap();
  assert_eq!(s.list_rules(None).await.unwrap().len(), 2);
  assert_eq!(s.list_rules(Some(r.host_id)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn update_rule_patches_only_given_fields() {
  let s = store().await;
  let r = rule(&s).await;

  let updated = s
    .update_rule(r.rule_id, RulePatch {
      lifetime: Some(Lifetime::After(0)),
      cascade: Some(CascadePolicy::Restrict),
      ..Default::default()
    })
    .await
    .unwrap()
    .unwrap();

  assert_eq!(updated.lifetime, Lifetime::After(0));
  assert_eq!(updated.cascade, CascadePolicy::Restrict);
  assert_eq!(updated.name, r.name);
  assert_eq!(updated.delay, r.delay);

  let missing = s.update_rule(Uuid::new_v4(), RulePatch::default()).await.unwrap();
  assert!(missing.is_none());
}

#[tokio::test]
async fn delete_rule_cascades_to_everything_it_owns() {
  let s = store().await;
  let r = rule(&s).await;
  let proto = prototype(&s, r.rule_id, item_spec()).await;
  let item = discover(&s, &proto, "item1").await.into_entity();
  s.record_value(item.entity_id, "v".into(), Utc::now()).await.unwrap();

  assert!(s.delete_rule(r.rule_id).await.unwrap());
  assert!(s.get_prototype(proto.prototype_id).await.unwrap().is_none());
  assert!(s.get_entity(item.entity_id).await.unwrap().is_none());
  assert!(s.history(item.entity_id, None).await.unwrap().is_empty());
  assert!(!s.delete_rule(r.rule_id).await.unwrap());
}

// ─── Templates & prototypes ──────────────────────────────────────────────────

#[tokio::test]
async fn template_names_are_unique() {
  let s = store().await;
  s.create_template("template_0".into()).await.unwrap();
  let err = s.create_template("template_0".into()).await.unwrap_err();
  assert!(matches!(err, Error::DuplicateTemplateName(_)));
  assert!(err.is_conflict());
}

#[tokio::test]
async fn prototype_requires_rule_and_templates() {
  let s = store().await;

  let err = s
    .create_prototype(NewPrototype { rule_id: Uuid::new_v4(), spec: item_spec() })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::RuleNotFound(_)));

  let r = rule(&s).await;
  let ghost = Uuid::new_v4();
  let err = s
    .create_prototype(NewPrototype { rule_id: r.rule_id, spec: host_spec(vec![ghost]) })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::TemplateNotFound(id) if id == ghost));
}

#[tokio::test]
async fn update_prototype_keeps_kind_and_tracks_templates() {
  let s = store().await;
  let r = rule(&s).await;
  let t1 = s.create_template("t1".into()).await.unwrap();
  let t2 = s.create_template("t2".into()).await.unwrap();
  let proto = prototype(&s, r.rule_id, host_spec(vec![t1.template_id])).await;

  let updated = s
    .update_prototype(proto.prototype_id, host_spec(vec![t2.template_id]))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(updated.spec.templates(), &[t2.template_id]);
  assert_eq!(s.delete_template(t2.template_id).await.unwrap(), TemplateDeletion::InUse(1));
  assert_eq!(s.delete_template(t1.template_id).await.unwrap(), TemplateDeletion::Deleted);

  let err = s
    .update_prototype(proto.prototype_id, item_spec())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(disco_core::Error::KindMismatch { .. })));
}

// ─── Entities ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_entity_twice_returns_existing() {
  let s = store().await;
  let r = rule(&s).await;
  let proto = prototype(&s, r.rule_id, item_spec()).await;

  let first = discover(&s, &proto, "item1").await;
  assert!(matches!(first, CreateOutcome::Created(_)));

  let second = discover(&s, &proto, "item1").await;
  let CreateOutcome::Existing(existing) = second else {
    panic!("expected existing entity");
  };
  assert_eq!(existing.entity_id, first.entity().entity_id);
  assert_eq!(existing.identity, "trap[item1]");
}

#[tokio::test]
async fn host_identity_matches_case_insensitively() {
  let s = store().await;
  let r = rule(&s).await;
  let proto = prototype(&s, r.rule_id, host_spec(vec![])).await;

  let created = discover(&s, &proto, "Alpha").await.into_entity();
  let again = discover(&s, &proto, "ALPHA").await;
  assert!(matches!(again, CreateOutcome::Existing(ref e) if e.entity_id == created.entity_id));

  let by_name = s
    .list_entities(EntityQuery {
      kind: Some(EntityKind::Host),
      identity: Some("HOST_alpha".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(by_name.len(), 1);
}

#[tokio::test]
async fn list_entities_sorted_and_filtered() {
  let s = store().await;
  let r = rule(&s).await;
  let proto = prototype(&s, r.rule_id, item_spec()).await;

  for key in ["item3", "item1", "item2"] {
    discover(&s, &proto, key).await;
  }

  let all = s.list_entities(EntityQuery::for_rule(r.rule_id)).await.unwrap();
  let keys: Vec<_> = all.iter().map(|e| e.identity.as_str()).collect();
  assert_eq!(keys, ["trap[item1]", "trap[item2]", "trap[item3]"]);

  let by_host = s
    .list_entities(EntityQuery {
      host_id: Some(r.host_id),
      kind: Some(EntityKind::Item),
      limit: Some(2),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(by_host.len(), 2);

  s.mark_lost(all[0].entity_id).await.unwrap();
  let lost = s
    .list_entities(EntityQuery::for_rule(r.rule_id).with_status(EntityStatus::Lost))
    .await
    .unwrap();
  assert_eq!(lost.len(), 1);
  assert_eq!(lost[0].entity_id, all[0].entity_id);
}

#[tokio::test]
async fn refresh_reactivates_and_updates_definition() {
  let s = store().await;
  let r = rule(&s).await;
  let proto = prototype(&s, r.rule_id, item_spec()).await;
  let item = discover(&s, &proto, "item1").await.into_entity();

  assert!(s.mark_lost(item.entity_id).await.unwrap());
  assert!(!s.mark_lost(item.entity_id).await.unwrap());

  let later = item.last_seen + Duration::seconds(30);
  let mut spec = item.spec.clone();
  if let EntitySpec::Item(ref mut i) = spec {
    i.name = "Renamed".into();
  }
  let refreshed = s
    .refresh_entity(item.entity_id, spec, later)
    .await
    .unwrap()
    .unwrap();

  assert_eq!(refreshed.status, EntityStatus::Active);
  assert_eq!(refreshed.last_seen, later);
  assert!(matches!(refreshed.spec, EntitySpec::Item(ref i) if i.name == "Renamed"));
}

#[tokio::test]
async fn host_creation_links_prototype_templates() {
  let s = store().await;
  let r = rule(&s).await;
  let t1 = s.create_template("t1".into()).await.unwrap();
  let proto = prototype(&s, r.rule_id, host_spec(vec![t1.template_id])).await;

  let host = discover(&s, &proto, "host0").await.into_entity();
  let links = s.list_links(host.entity_id).await.unwrap();
  assert_eq!(links.len(), 1);
  assert_eq!(links[0].template_id, t1.template_id);
  assert_eq!(links[0].link_type, LinkType::Prototype);
}

#[tokio::test]
async fn apply_link_changes_upserts_and_removes() {
  let s = store().await;
  let r = rule(&s).await;
  let t1 = s.create_template("t1".into()).await.unwrap();
  let t2 = s.create_template("t2".into()).await.unwrap();
  let proto = prototype(&s, r.rule_id, host_spec(vec![t1.template_id])).await;
  let host = discover(&s, &proto, "host0").await.into_entity();

  s.apply_link_changes(host.entity_id, LinkChanges {
    upsert: vec![(t2.template_id, LinkType::Manual)],
    remove: vec![],
  })
  .await
  .unwrap();
  s.apply_link_changes(host.entity_id, LinkChanges {
    upsert: vec![(t2.template_id, LinkType::Prototype)],
    remove: vec![t1.template_id],
  })
  .await
  .unwrap();

  let links = s.list_links(host.entity_id).await.unwrap();
  assert_eq!(links.len(), 1);
  assert_eq!(links[0].template_id, t2.template_id);
  assert_eq!(links[0].link_type, LinkType::Prototype);
}

#[tokio::test]
async fn delete_entity_removes_history_and_links() {
  let s = store().await;
  let r = rule(&s).await;
  let t1 = s.create_template("t1".into()).await.unwrap();
  let hosts = prototype(&s, r.rule_id, host_spec(vec![t1.template_id])).await;
  let items = prototype(&s, r.rule_id, item_spec()).await;

  let host = discover(&s, &hosts, "host0").await.into_entity();
  let item = discover(&s, &items, "item1").await.into_entity();
  s.record_value(item.entity_id, "a".into(), Utc::now()).await.unwrap();

  assert!(s.delete_entity(host.entity_id).await.unwrap());
  assert!(s.delete_entity(item.entity_id).await.unwrap());
  assert!(s.list_links(host.entity_id).await.unwrap().is_empty());
  assert!(s.history(item.entity_id, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn orphaned_entities_survive_prototype_deletion() {
  let s = store().await;
  let r = rule(&s).await;
  let proto = prototype(&s, r.rule_id, item_spec()).await;
  let item = discover(&s, &proto, "item1").await.into_entity();

  assert_eq!(s.orphan_entities(proto.prototype_id).await.unwrap(), 1);
  assert!(s.delete_prototype(proto.prototype_id).await.unwrap());

  let kept = s.get_entity(item.entity_id).await.unwrap().unwrap();
  assert_eq!(kept.prototype_id, None);
  assert_eq!(kept.rule_id, r.rule_id);
}

#[tokio::test]
async fn template_referenced_by_prototype_cannot_be_deleted() {
  let s = store().await;
  let r = rule(&s).await;
  let t1 = s.create_template("t1".into()).await.unwrap();
  let t2 = s.create_template("t2".into()).await.unwrap();
  let proto = prototype(&s, r.rule_id, host_spec(vec![t1.template_id])).await;

  assert_eq!(s.delete_template(t1.template_id).await.unwrap(), TemplateDeletion::InUse(1));
  assert!(s.get_template(t1.template_id).await.unwrap().is_some());

  // Once no prototype lists it, the template and its links go.
  s.update_prototype(proto.prototype_id, host_spec(vec![t2.template_id]))
    .await
    .unwrap();
  assert_eq!(s.delete_template(t1.template_id).await.unwrap(), TemplateDeletion::Deleted);
  assert_eq!(s.delete_template(t1.template_id).await.unwrap(), TemplateDeletion::NotFound);
}

// ─── History ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn history_is_newest_first() {
  let s = store().await;
  let r = rule(&s).await;
  let proto = prototype(&s, r.rule_id, item_spec()).await;
  let item = discover(&s, &proto, "item1").await.into_entity();

  let t0 = Utc::now();
  s.record_value(item.entity_id, "old".into(), t0).await.unwrap();
  s.record_value(item.entity_id, "new".into(), t0 + Duration::seconds(1))
    .await
    .unwrap();

  let values = s.history(item.entity_id, Some(1)).await.unwrap();
  assert_eq!(values.len(), 1);
  assert_eq!(values[0].value, "new");
}
