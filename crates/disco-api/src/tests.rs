//! Router tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode, header},
};
use disco_engine::Engine;
use disco_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt as _;

use crate::api_router;

async fn router() -> Router {
  let store = SqliteStore::open_in_memory().await.unwrap();
  api_router(Arc::new(Engine::new(Arc::new(store))))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
  let mut builder = Request::builder().method(method).uri(uri);
  let body = match body {
    Some(v) => {
      builder = builder.header(header::CONTENT_TYPE, "application/json");
      Body::from(v.to_string())
    }
    None => Body::empty(),
  };
  let resp = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let value = if bytes.is_empty() {
    Value::Null
  } else {
    serde_json::from_slice(&bytes).unwrap()
  };
  (status, value)
}

const HOST: &str = "6f1c2a60-0000-4000-8000-000000000001";

async fn create_rule(app: &Router, extra: Value) -> String {
  let mut body = json!({
    "host_id": HOST,
    "name": "Trapper discovery",
    "key": "item_discovery",
  });
  if let (Some(obj), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
    obj.extend(extra.clone());
  }
  let (status, rule) = send(app, "POST", "/rules", Some(body)).await;
  assert_eq!(status, StatusCode::CREATED, "{rule}");
  rule["rule_id"].as_str().unwrap().to_owned()
}

async fn create_item_prototype(app: &Router, rule_id: &str) -> String {
  let (status, proto) = send(
    app,
    "POST",
    &format!("/rules/{rule_id}/prototypes"),
    Some(json!({"kind": "item", "name": "Item: {#KEY}", "key": "trap[{#KEY}]"})),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{proto}");
  proto["prototype_id"].as_str().unwrap().to_owned()
}

fn records(keys: &[&str]) -> Value {
  json!({ "data": keys.iter().map(|k| json!({"{#KEY}": k})).collect::<Vec<_>>() })
}

// ── Rules ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn rule_crud() {
  let app = router().await;
  let id = create_rule(&app, json!({})).await;

  let (status, rule) = send(&app, "GET", &format!("/rules/{id}"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(rule["lifetime"], "30d");
  assert_eq!(rule["cascade"], "remove");

  let (status, rule) = send(
    &app,
    "PATCH",
    &format!("/rules/{id}"),
    Some(json!({"lifetime": "0", "name": "renamed"})),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(rule["lifetime"], "0");
  assert_eq!(rule["name"], "renamed");

  let (status, _) = send(&app, "DELETE", &format!("/rules/{id}"), None).await;
  assert_eq!(status, StatusCode::OK);
  let (status, body) = send(&app, "GET", &format!("/rules/{id}"), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert!(body["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn duplicate_rule_key_conflicts() {
  let app = router().await;
  create_rule(&app, json!({})).await;
  let (status, _) = send(
    &app,
    "POST",
    "/rules",
    Some(json!({"host_id": HOST, "name": "again", "key": "item_discovery"})),
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn concurrent_duplicates_yield_one_conflict() {
  let app = router().await;
  let body = json!({"host_id": HOST, "name": "racer", "key": "item_discovery"});

  let (a, b) = tokio::join!(
    send(&app, "POST", "/rules", Some(body.clone())),
    send(&app, "POST", "/rules", Some(body)),
  );
  let mut statuses = [a.0, b.0];
  statuses.sort();
  assert_eq!(statuses, [StatusCode::CREATED, StatusCode::CONFLICT]);

  let (a, b) = tokio::join!(
    send(&app, "POST", "/templates", Some(json!({"name": "shared"}))),
    send(&app, "POST", "/templates", Some(json!({"name": "shared"}))),
  );
  let mut statuses = [a.0, b.0];
  statuses.sort();
  assert_eq!(statuses, [StatusCode::CREATED, StatusCode::CONFLICT]);
}

#[tokio::test]
async fn invalid_lifetime_is_rejected() {
  let app = router().await;
  let id = create_rule(&app, json!({})).await;
  let (status, _) = send(
    &app,
    "PATCH",
    &format!("/rules/{id}"),
    Some(json!({"lifetime": "soon"})),
  )
  .await;
  assert!(status.is_client_error());
}

// ── Discovery ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn discovery_creates_sorted_entities() {
  let app = router().await;
  let rule_id = create_rule(&app, json!({})).await;
  create_item_prototype(&app, &rule_id).await;

  let (status, report) = send(
    &app,
    "POST",
    &format!("/rules/{rule_id}/discovery"),
    Some(records(&["item2", "item1"])),
  )
  .await;
  assert_eq!(status, StatusCode::OK, "{report}");
  assert_eq!(report["created"], 2);

  let (status, entities) = send(&app, "GET", &format!("/entities?rule_id={rule_id}&kind=item"), None).await;
  assert_eq!(status, StatusCode::OK);
  let keys: Vec<_> = entities
    .as_array()
    .unwrap()
    .iter()
    .map(|e| e["identity"].as_str().unwrap().to_owned())
    .collect();
  assert_eq!(keys, ["trap[item1]", "trap[item2]"]);
  assert_eq!(entities[0]["spec"]["name"], "Item: item1");
}

#[tokio::test]
async fn unresolved_macro_is_reported_per_entity() {
  let app = router().await;
  let rule_id = create_rule(&app, json!({})).await;
  create_item_prototype(&app, &rule_id).await;

  let payload = json!([{"{#KEY}": "item1"}, {"{#OTHER}": "x"}, {"{#KEY}": "item3"}]);
  let (status, report) = send(&app, "POST", &format!("/rules/{rule_id}/discovery"), Some(payload)).await;

  assert_eq!(status, StatusCode::OK);
  assert_eq!(report["created"], 2);
  assert_eq!(report["errors"][0]["record"], 1);
  assert!(report["errors"][0]["error"].as_str().unwrap().contains("{#KEY}"));
}

#[tokio::test]
async fn malformed_payload_is_bad_request() {
  let app = router().await;
  let rule_id = create_rule(&app, json!({})).await;
  let (status, _) = send(&app, "POST", &format!("/rules/{rule_id}/discovery"), Some(json!(42))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn discovery_for_unknown_rule_is_not_found() {
  let app = router().await;
  let (status, _) = send(
    &app,
    "POST",
    &format!("/rules/{}/discovery", uuid::Uuid::new_v4()),
    Some(records(&["item1"])),
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sweep_reaps_lost_entities() {
  let app = router().await;
  let rule_id = create_rule(&app, json!({"lifetime": "0"})).await;
  create_item_prototype(&app, &rule_id).await;

  let uri = format!("/rules/{rule_id}/discovery?clock=2024-01-01T00:00:00Z");
  send(&app, "POST", &uri, Some(records(&["item1", "item2"]))).await;
  let (_, report) = send(&app, "POST", &uri, Some(records(&["item1"]))).await;
  assert_eq!(report["lost"], 1);

  let (status, report) = send(&app, "POST", "/sweep?now=2024-01-01T00:00:01Z", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(report["deleted"], 1);

  let (_, entities) = send(&app, "GET", &format!("/rules/{rule_id}/entities"), None).await;
  assert_eq!(entities.as_array().unwrap().len(), 1);
}

// ── Sender ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sender_routes_values_to_item_history() {
  let app = router().await;
  let rule_id = create_rule(&app, json!({})).await;
  create_item_prototype(&app, &rule_id).await;

  let (status, outcome) = send(
    &app,
    "POST",
    "/sender",
    Some(json!({
      "host_id": HOST,
      "key": "item_discovery",
      "value": records(&["item1"]).to_string(),
    })),
  )
  .await;
  assert_eq!(status, StatusCode::OK, "{outcome}");
  assert_eq!(outcome["target"], "discovery");

  let (status, outcome) = send(
    &app,
    "POST",
    "/sender",
    Some(json!({"host_id": HOST, "key": "trap[item1]", "value": "17"})),
  )
  .await;
  assert_eq!(status, StatusCode::OK, "{outcome}");
  assert_eq!(outcome["target"], "value");

  let entity_id = outcome["entity_id"].as_str().unwrap();
  let (_, history) = send(&app, "GET", &format!("/entities/{entity_id}/history"), None).await;
  assert_eq!(history[0]["value"], "17");

  let (status, _) = send(
    &app,
    "POST",
    "/sender",
    Some(json!({"host_id": HOST, "key": "trap[nope]", "value": "1"})),
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Templates & cascades ────────────────────────────────────────────────────

#[tokio::test]
async fn template_links_and_cascade_conflicts() {
  let app = router().await;
  let rule_id = create_rule(&app, json!({"cascade": "restrict"})).await;

  let (status, template) = send(&app, "POST", "/templates", Some(json!({"name": "template_1"}))).await;
  assert_eq!(status, StatusCode::CREATED);
  let template_id = template["template_id"].as_str().unwrap().to_owned();
  let (status, _) = send(&app, "POST", "/templates", Some(json!({"name": "template_1"}))).await;
  assert_eq!(status, StatusCode::CONFLICT);

  let (status, proto) = send(
    &app,
    "POST",
    &format!("/rules/{rule_id}/prototypes"),
    Some(json!({"kind": "host", "host": "host_{#KEY}", "templates": [template_id]})),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{proto}");
  let proto_id = proto["prototype_id"].as_str().unwrap().to_owned();

  send(&app, "POST", &format!("/rules/{rule_id}/discovery"), Some(records(&["host0"]))).await;
  let (_, hosts) = send(&app, "GET", "/entities?kind=host&identity=HOST_HOST0", None).await;
  let host_id = hosts[0]["entity_id"].as_str().unwrap().to_owned();

  let (status, links) = send(&app, "GET", &format!("/entities/{host_id}/templates"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(links[0]["link_type"], "prototype");

  let (status, _) = send(&app, "DELETE", &format!("/templates/{template_id}"), None).await;
  assert_eq!(status, StatusCode::CONFLICT);
  let (status, body) = send(&app, "DELETE", &format!("/prototypes/{proto_id}"), None).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert!(body["error"].is_string());
  let (status, _) = send(&app, "DELETE", &format!("/rules/{rule_id}"), None).await;
  assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn manual_link_and_resync() {
  let app = router().await;
  let rule_id = create_rule(&app, json!({})).await;
  let (_, manual) = send(&app, "POST", "/templates", Some(json!({"name": "manual"}))).await;
  let manual_id = manual["template_id"].as_str().unwrap().to_owned();

  let (_, proto) = send(
    &app,
    "POST",
    &format!("/rules/{rule_id}/prototypes"),
    Some(json!({"kind": "host", "host": "host_{#KEY}"})),
  )
  .await;
  let proto_id = proto["prototype_id"].as_str().unwrap().to_owned();
  send(&app, "POST", &format!("/rules/{rule_id}/discovery"), Some(records(&["a"]))).await;

  let (_, hosts) = send(&app, "GET", &format!("/rules/{rule_id}/entities"), None).await;
  let host_id = hosts[0]["entity_id"].as_str().unwrap().to_owned();

  let (status, link) = send(
    &app,
    "POST",
    &format!("/entities/{host_id}/templates"),
    Some(json!({"template_id": manual_id})),
  )
  .await;
  assert_eq!(status, StatusCode::OK, "{link}");
  assert_eq!(link["link_type"], "manual");

  let (status, report) = send(&app, "POST", &format!("/prototypes/{proto_id}/resync"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(report["hosts"], 1);
  assert_eq!(report["unlinked"], 0);

  let (_, links) = send(&app, "GET", &format!("/entities/{host_id}/templates"), None).await;
  assert_eq!(links.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn prototype_kind_cannot_change() {
  let app = router().await;
  let rule_id = create_rule(&app, json!({})).await;
  let proto_id = create_item_prototype(&app, &rule_id).await;

  let (status, _) = send(
    &app,
    "PUT",
    &format!("/prototypes/{proto_id}"),
    Some(json!({"kind": "host", "host": "h"})),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, proto) = send(
    &app,
    "PUT",
    &format!("/prototypes/{proto_id}"),
    Some(json!({"kind": "item", "name": "Renamed {#KEY}", "key": "trap[{#KEY}]"})),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(proto["spec"]["name"], "Renamed {#KEY}");
}
