//! Handlers for discovered entities.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/entities` | Optional `rule_id`, `host_id`, `prototype_id`, `kind`, `status`, `identity`, `limit`, `offset`; sorted by identity |
//! | `GET`  | `/rules/{id}/entities` | Same filters, scoped to one rule |
//! | `GET`  | `/entities/{id}` | 404 if not found |
//! | `GET`  | `/entities/{id}/templates` | Template links with their `link_type` |
//! | `POST` | `/entities/{id}/templates` | Body: `{"template_id":"..."}`; adds a manual link |
//! | `GET`  | `/entities/{id}/history` | Newest first; optional `?limit=` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use disco_core::{
  entity::{DiscoveredEntity, EntityStatus, HistoryValue, TemplateLink},
  prototype::EntityKind,
  store::{DiscoveryStore, EntityQuery},
};
use disco_engine::Engine;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

// ─── Query ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  pub rule_id:      Option<Uuid>,
  pub host_id:      Option<Uuid>,
  pub prototype_id: Option<Uuid>,
  pub kind:         Option<EntityKind>,
  pub status:       Option<EntityStatus>,
  /// Exact identity; host names compare case-insensitively when
  /// `kind=host` is also given.
  pub identity:     Option<String>,
  pub limit:        Option<usize>,
  pub offset:       Option<usize>,
}

impl From<ListParams> for EntityQuery {
  fn from(p: ListParams) -> Self {
    EntityQuery {
      rule_id:      p.rule_id,
      host_id:      p.host_id,
      prototype_id: p.prototype_id,
      kind:         p.kind,
      status:       p.status,
      identity:     p.identity,
      limit:        p.limit,
      offset:       p.offset,
    }
  }
}

/// `GET /entities[?rule_id=..][&kind=..][&status=..]...`
pub async fn list<S>(
  State(engine): State<Arc<Engine<S>>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<DiscoveredEntity>>, ApiError>
where
  S: DiscoveryStore + 'static,
{
  let entities = engine
    .store()
    .list_entities(params.into())
    .await
    .map_err(ApiError::store)?;
  Ok(Json(entities))
}

/// `GET /rules/{id}/entities`
pub async fn list_for_rule<S>(
  State(engine): State<Arc<Engine<S>>>,
  Path(rule_id): Path<Uuid>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<DiscoveredEntity>>, ApiError>
where
  S: DiscoveryStore + 'static,
{
  engine
    .store()
    .get_rule(rule_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("rule {rule_id} not found")))?;

  let query = EntityQuery { rule_id: Some(rule_id), ..params.into() };
  let entities = engine
    .store()
    .list_entities(query)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(entities))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

async fn find<S>(engine: &Engine<S>, id: Uuid) -> Result<DiscoveredEntity, ApiError>
where
  S: DiscoveryStore + 'static,
{
  engine
    .store()
    .get_entity(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("entity {id} not found")))
}

/// `GET /entities/{id}`
pub async fn get_one<S>(
  State(engine): State<Arc<Engine<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<DiscoveredEntity>, ApiError>
where
  S: DiscoveryStore + 'static,
{
  Ok(Json(find(&engine, id).await?))
}

// ─── Template links ───────────────────────────────────────────────────────────

/// `GET /entities/{id}/templates`
pub async fn links<S>(
  State(engine): State<Arc<Engine<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<TemplateLink>>, ApiError>
where
  S: DiscoveryStore + 'static,
{
  find(&engine, id).await?;
  let links = engine
    .store()
    .list_links(id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(links))
}

#[derive(Debug, Deserialize)]
pub struct LinkBody {
  pub template_id: Uuid,
}

/// `POST /entities/{id}/templates` — returns the (possibly pre-existing) link.
pub async fn link<S>(
  State(engine): State<Arc<Engine<S>>>,
  Path(id): Path<Uuid>,
  Json(body): Json<LinkBody>,
) -> Result<Json<TemplateLink>, ApiError>
where
  S: DiscoveryStore + 'static,
{
  Ok(Json(engine.link_template_manually(id, body.template_id).await?))
}

// ─── History ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
  pub limit: Option<usize>,
}

/// `GET /entities/{id}/history[?limit=N]`
pub async fn history<S>(
  State(engine): State<Arc<Engine<S>>>,
  Path(id): Path<Uuid>,
  Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<HistoryValue>>, ApiError>
where
  S: DiscoveryStore + 'static,
{
  find(&engine, id).await?;
  let values = engine
    .store()
    .history(id, params.limit)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(values))
}
