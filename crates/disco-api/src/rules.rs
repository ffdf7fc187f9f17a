//! Handlers for `/rules` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/rules` | Optional `?host_id=` |
//! | `POST`   | `/rules` | Body: [`NewRule`]; 409 if the host already has the key |
//! | `GET`    | `/rules/{id}` | 404 if not found |
//! | `PATCH`  | `/rules/{id}` | Body: [`RulePatch`]; new lifetimes apply at the next sweep |
//! | `DELETE` | `/rules/{id}` | Cascades to prototypes and entities; 409 under `restrict` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use disco_core::{
  rule::{DiscoveryRule, NewRule, RulePatch},
  store::DiscoveryStore,
};
use disco_engine::{DeleteReport, Engine};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub host_id: Option<Uuid>,
}

/// `GET /rules[?host_id=<id>]`
pub async fn list<S>(
  State(engine): State<Arc<Engine<S>>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<DiscoveryRule>>, ApiError>
where
  S: DiscoveryStore + 'static,
{
  let rules = engine
    .store()
    .list_rules(params.host_id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(rules))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /rules` — returns 201 + the stored rule.
pub async fn create<S>(
  State(engine): State<Arc<Engine<S>>>,
  Json(body): Json<NewRule>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DiscoveryStore + 'static,
{
  let rule = engine
    .store()
    .create_rule(body)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(rule)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /rules/{id}`
pub async fn get_one<S>(
  State(engine): State<Arc<Engine<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<DiscoveryRule>, ApiError>
where
  S: DiscoveryStore + 'static,
{
  let rule = engine
    .store()
    .get_rule(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("rule {id} not found")))?;
  Ok(Json(rule))
}

// ─── Update ───────────────────────────────────────────────────────────────────

/// `PATCH /rules/{id}` — body: any of `name`, `delay`, `lifetime`, `cascade`.
pub async fn update<S>(
  State(engine): State<Arc<Engine<S>>>,
  Path(id): Path<Uuid>,
  Json(patch): Json<RulePatch>,
) -> Result<Json<DiscoveryRule>, ApiError>
where
  S: DiscoveryStore + 'static,
{
  let rule = engine
    .store()
    .update_rule(id, patch)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("rule {id} not found")))?;
  Ok(Json(rule))
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// `DELETE /rules/{id}`
pub async fn delete_one<S>(
  State(engine): State<Arc<Engine<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<DeleteReport>, ApiError>
where
  S: DiscoveryStore + 'static,
{
  Ok(Json(engine.delete_rule(id).await?))
}
