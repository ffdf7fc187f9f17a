//! Handlers that feed the engine: discovery payloads, sender values and
//! reaper sweeps.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/rules/{id}/discovery` | Body: `{"data":[{..}]}` or `[{..}]`; optional `?clock=` |
//! | `POST` | `/sender` | Body: [`SenderBody`] |
//! | `POST` | `/sweep` | Optional `?now=`; defaults to the current time |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use disco_core::{event::DiscoveryEvent, store::DiscoveryStore};
use disco_engine::{Engine, EngineError, ReconcileReport, SubmitOutcome, SweepReport};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ClockParams {
  pub clock: Option<DateTime<Utc>>,
}

/// `POST /rules/{id}/discovery`
pub async fn process<S>(
  State(engine): State<Arc<Engine<S>>>,
  Path(rule_id): Path<Uuid>,
  Query(params): Query<ClockParams>,
  Json(payload): Json<serde_json::Value>,
) -> Result<Json<ReconcileReport>, ApiError>
where
  S: DiscoveryStore + 'static,
{
  let clock = params.clock.unwrap_or_else(Utc::now);
  let event = DiscoveryEvent::from_json(rule_id, clock, &payload)
    .map_err(EngineError::<S::Error>::InvalidPayload)?;
  Ok(Json(engine.process_event(event).await?))
}

/// JSON body accepted by `POST /sender`.
#[derive(Debug, Deserialize)]
pub struct SenderBody {
  pub host_id: Uuid,
  pub key:     String,
  /// A discovery payload for rule keys; the raw value for item keys.
  pub value:   String,
  pub clock:   Option<DateTime<Utc>>,
}

/// `POST /sender`
pub async fn submit<S>(
  State(engine): State<Arc<Engine<S>>>,
  Json(body): Json<SenderBody>,
) -> Result<Json<SubmitOutcome>, ApiError>
where
  S: DiscoveryStore + 'static,
{
  let clock = body.clock.unwrap_or_else(Utc::now);
  let outcome = engine
    .submit(body.host_id, body.key, body.value, clock)
    .await?;
  Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct SweepParams {
  pub now: Option<DateTime<Utc>>,
}

/// `POST /sweep`
pub async fn sweep<S>(
  State(engine): State<Arc<Engine<S>>>,
  Query(params): Query<SweepParams>,
) -> Result<Json<SweepReport>, ApiError>
where
  S: DiscoveryStore + 'static,
{
  let now = params.now.unwrap_or_else(Utc::now);
  Ok(Json(engine.sweep(now).await?))
}
