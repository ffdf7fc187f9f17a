//! Handlers for prototype endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/rules/{id}/prototypes` | Prototypes of a rule |
//! | `POST`   | `/rules/{id}/prototypes` | Body: a kind-tagged spec, e.g. `{"kind":"item",...}` |
//! | `GET`    | `/prototypes/{id}` | 404 if not found |
//! | `PUT`    | `/prototypes/{id}` | Replace the spec; the kind cannot change |
//! | `DELETE` | `/prototypes/{id}` | Entities handled per the rule's cascade policy |
//! | `POST`   | `/prototypes/{id}/resync` | Converge discovered hosts' template links |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use disco_core::{
  prototype::{EntitySpec, NewPrototype, Prototype},
  store::DiscoveryStore,
};
use disco_engine::{DeleteReport, Engine, ResyncReport};
use uuid::Uuid;

use crate::error::ApiError;

/// `GET /rules/{id}/prototypes`
pub async fn list<S>(
  State(engine): State<Arc<Engine<S>>>,
  Path(rule_id): Path<Uuid>,
) -> Result<Json<Vec<Prototype>>, ApiError>
where
  S: DiscoveryStore + 'static,
{
  engine
    .store()
    .get_rule(rule_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("rule {rule_id} not found")))?;

  let prototypes = engine
    .store()
    .list_prototypes(rule_id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(prototypes))
}

/// `POST /rules/{id}/prototypes` — returns 201 + the stored prototype.
pub async fn create<S>(
  State(engine): State<Arc<Engine<S>>>,
  Path(rule_id): Path<Uuid>,
  Json(spec): Json<EntitySpec>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DiscoveryStore + 'static,
{
  let prototype = engine.create_prototype(NewPrototype { rule_id, spec }).await?;
  Ok((StatusCode::CREATED, Json(prototype)))
}

/// `GET /prototypes/{id}`
pub async fn get_one<S>(
  State(engine): State<Arc<Engine<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Prototype>, ApiError>
where
  S: DiscoveryStore + 'static,
{
  let prototype = engine
    .store()
    .get_prototype(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("prototype {id} not found")))?;
  Ok(Json(prototype))
}

/// `PUT /prototypes/{id}`
pub async fn replace<S>(
  State(engine): State<Arc<Engine<S>>>,
  Path(id): Path<Uuid>,
  Json(spec): Json<EntitySpec>,
) -> Result<Json<Prototype>, ApiError>
where
  S: DiscoveryStore + 'static,
{
  Ok(Json(engine.update_prototype(id, spec).await?))
}

/// `DELETE /prototypes/{id}`
pub async fn delete_one<S>(
  State(engine): State<Arc<Engine<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<DeleteReport>, ApiError>
where
  S: DiscoveryStore + 'static,
{
  Ok(Json(engine.delete_prototype(id).await?))
}

/// `POST /prototypes/{id}/resync`
pub async fn resync<S>(
  State(engine): State<Arc<Engine<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<ResyncReport>, ApiError>
where
  S: DiscoveryStore + 'static,
{
  Ok(Json(engine.resync_prototype(id).await?))
}
