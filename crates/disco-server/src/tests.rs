use std::{path::Path, sync::Arc, time::Duration};

use axum::{
  body::Body,
  http::{Request, StatusCode},
};
use chrono::Utc;
use disco_core::{
  event::DiscoveryEvent,
  lifetime::Lifetime,
  macros::MacroContext,
  prototype::{EntitySpec, ItemSpec, NewPrototype, ValueType},
  rule::{ItemType, NewRule},
  store::{DiscoveryStore, EntityQuery},
};
use disco_engine::Engine;
use disco_store_sqlite::SqliteStore;
use tower::ServiceExt as _;
use uuid::Uuid;

use super::*;

async fn engine() -> Arc<Engine<SqliteStore>> {
  let store = SqliteStore::open_in_memory().await.unwrap();
  Arc::new(Engine::new(Arc::new(store)))
}

// ── Configuration ───────────────────────────────────────────────────────────

#[test]
fn missing_config_file_uses_defaults() {
  let cfg = ServerConfig::load(Path::new("/nonexistent/disco-config.toml")).unwrap();
  assert_eq!(cfg.store_path, PathBuf::from("disco.db"));
  assert_eq!(cfg.sweep_interval_secs, 3600);
}

#[test]
fn config_file_overrides_defaults() {
  let path = std::env::temp_dir().join(format!("disco-config-{}.toml", std::process::id()));
  std::fs::write(&path, "port = 9191\nsweep_interval_secs = 0\n").unwrap();

  let cfg = ServerConfig::load(&path).unwrap();
  std::fs::remove_file(&path).ok();

  assert_eq!(cfg.port, 9191);
  assert_eq!(cfg.sweep_interval_secs, 0);
  assert_eq!(cfg.address(), format!("{}:9191", cfg.host));
}

#[test]
fn tilde_expands_to_home() {
  assert_eq!(expand_tilde(Path::new("/var/db")), PathBuf::from("/var/db"));
  if let Ok(home) = std::env::var("HOME") {
    assert_eq!(expand_tilde(Path::new("~/disco.db")), Path::new(&home).join("disco.db"));
  }
}

// ── Router ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_and_api_are_mounted() {
  let app = router(engine().await);

  let resp = app
    .clone()
    .oneshot(Request::get("/health").body(Body::empty()).unwrap())
    .await
    .unwrap();
  assert_eq!(resp.status(), StatusCode::OK);

  let resp = app
    .oneshot(Request::get("/api/rules").body(Body::empty()).unwrap())
    .await
    .unwrap();
  assert_eq!(resp.status(), StatusCode::OK);
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let rules: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
  assert_eq!(rules, serde_json::json!([]));
}

// ── Sweeper ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sweeper_reaps_on_first_tick() {
  let engine = engine().await;
  let store = engine.store().clone();

  let mut input = NewRule::new(Uuid::new_v4(), "Trapper discovery", "item_discovery");
  input.lifetime = Lifetime::After(0);
  let rule = store.create_rule(input).await.unwrap();
  engine
    .create_prototype(NewPrototype {
      rule_id: rule.rule_id,
      spec:    EntitySpec::Item(ItemSpec {
        name:       "Item: {#KEY}".into(),
        key:        "trap[{#KEY}]".into(),
        item_type:  ItemType::Trapper,
        value_type: ValueType::Text,
      }),
    })
    .await
    .unwrap();

  let past = Utc::now() - chrono::Duration::minutes(5);
  let record = MacroContext::new().with("{#KEY}", "item1");
  engine
    .process_event(DiscoveryEvent::new(rule.rule_id, past, vec![record]))
    .await
    .unwrap();
  engine
    .process_event(DiscoveryEvent::new(rule.rule_id, past, vec![]))
    .await
    .unwrap();

  let sweeper = spawn_sweeper(engine.clone(), Duration::from_secs(3600));

  let mut remaining = usize::MAX;
  for _ in 0..100 {
    remaining = store
      .list_entities(EntityQuery::for_rule(rule.rule_id))
      .await
      .unwrap()
      .len();
    if remaining == 0 {
      break;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  sweeper.abort();

  assert_eq!(remaining, 0);
}
