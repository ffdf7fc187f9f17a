//! Server wiring for the discovery engine: configuration, the HTTP router and
//! the periodic reaper.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use axum::{Router, routing::get};
use chrono::Utc;
use disco_core::store::DiscoveryStore;
use disco_engine::Engine;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `DISCO_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                String,
  #[serde(default = "default_port")]
  pub port:                u16,
  #[serde(default = "default_store_path")]
  pub store_path:          PathBuf,
  /// Seconds between reaper sweeps; `0` disables the periodic sweep.
  #[serde(default = "default_sweep_interval")]
  pub sweep_interval_secs: u64,
}

fn default_host() -> String { "127.0.0.1".to_string() }

fn default_port() -> u16 { 8080 }

fn default_store_path() -> PathBuf { PathBuf::from("disco.db") }

fn default_sweep_interval() -> u64 { 3600 }

impl ServerConfig {
  /// Load configuration from an optional TOML file layered with `DISCO_*`
  /// environment variables.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("DISCO"))
      .build()?
      .try_deserialize()
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// The full application router: the JSON API under `/api` plus a liveness
/// probe, with request tracing.
pub fn router<S>(engine: Arc<Engine<S>>) -> Router
where
  S: DiscoveryStore + 'static,
{
  Router::new()
    .route("/health", get(|| async { "ok" }))
    .nest("/api", disco_api::api_router(engine))
    .layer(TraceLayer::new_for_http())
}

// ─── Reaper schedule ──────────────────────────────────────────────────────────

/// Run [`Engine::sweep`] every `every`, starting immediately. Failed sweeps
/// are logged and retried at the next tick.
pub fn spawn_sweeper<S>(engine: Arc<Engine<S>>, every: Duration) -> JoinHandle<()>
where
  S: DiscoveryStore + 'static,
{
  tokio::spawn(async move {
    info!("Starting sweeper (interval: {}s)", every.as_secs());
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
      interval.tick().await;
      if let Err(e) = engine.sweep(Utc::now()).await {
        error!("Sweep failed: {e}");
      }
    }
  })
}

#[cfg(test)]
mod tests;
