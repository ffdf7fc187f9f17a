//! Handlers for `/templates` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/templates` | All templates by name |
//! | `POST`   | `/templates` | Body: `{"name":"..."}`; 409 if the name is taken |
//! | `DELETE` | `/templates/{id}` | 409 while a prototype lists it |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use disco_core::{entity::Template, store::DiscoveryStore};
use disco_engine::Engine;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

/// `GET /templates`
pub async fn list<S>(
  State(engine): State<Arc<Engine<S>>>,
) -> Result<Json<Vec<Template>>, ApiError>
where
  S: DiscoveryStore + 'static,
{
  let templates = engine
    .store()
    .list_templates()
    .await
    .map_err(ApiError::store)?;
  Ok(Json(templates))
}

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub name: String,
}

/// `POST /templates` — returns 201 + the stored template.
pub async fn create<S>(
  State(engine): State<Arc<Engine<S>>>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DiscoveryStore + 'static,
{
  if body.name.trim().is_empty() {
    return Err(ApiError::BadRequest("template name must not be empty".into()));
  }

  let template = engine
    .store()
    .create_template(body.name)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(template)))
}

/// `DELETE /templates/{id}` — 204 on success.
pub async fn delete_one<S>(
  State(engine): State<Arc<Engine<S>>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: DiscoveryStore + 'static,
{
  engine.delete_template(id).await?;
  Ok(StatusCode::NO_CONTENT)
}
