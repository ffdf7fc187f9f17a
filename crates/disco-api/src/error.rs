//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use disco_core::store::StoreError;
use disco_engine::EngineError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Classify a store error: uniqueness collisions are 409, the rest 500.
  pub fn store(e: impl StoreError) -> Self {
    if e.is_conflict() {
      Self::Conflict(e.to_string())
    } else {
      Self::Store(Box::new(e))
    }
  }
}

impl<E: StoreError> From<EngineError<E>> for ApiError {
  fn from(e: EngineError<E>) -> Self {
    match e {
      EngineError::RuleNotFound(_)
      | EngineError::PrototypeNotFound(_)
      | EngineError::TemplateNotFound(_)
      | EngineError::EntityNotFound(_)
      | EngineError::UnknownTarget { .. } => Self::NotFound(e.to_string()),
      EngineError::InvalidPayload(_) | EngineError::NotTrapper { .. } => {
        Self::BadRequest(e.to_string())
      }
      EngineError::CascadeConflict { .. } => Self::Conflict(e.to_string()),
      EngineError::StoreUnavailable { ref source, .. } if source.is_conflict() => {
        Self::Conflict(source.to_string())
      }
      EngineError::StoreUnavailable { .. } => Self::Store(Box::new(e)),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
