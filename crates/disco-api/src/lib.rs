//! JSON REST API for the discovery engine.
//!
//! Exposes an axum [`Router`] backed by an [`Engine`] over any
//! [`disco_core::store::DiscoveryStore`]. Auth, TLS, and transport concerns
//! are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", disco_api::api_router(engine.clone()))
//! ```

pub mod discovery;
pub mod entities;
pub mod error;
pub mod prototypes;
pub mod rules;
pub mod templates;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, post},
};
use disco_core::store::DiscoveryStore;
use disco_engine::Engine;

pub use error::ApiError;

/// Build a fully-materialised API router for `engine`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(engine: Arc<Engine<S>>) -> Router<()>
where
  S: DiscoveryStore + 'static,
{
  Router::new()
    // Rules
    .route("/rules", get(rules::list::<S>).post(rules::create::<S>))
    .route(
      "/rules/{id}",
      get(rules::get_one::<S>)
        .patch(rules::update::<S>)
        .delete(rules::delete_one::<S>),
    )
    .route(
      "/rules/{id}/prototypes",
      get(prototypes::list::<S>).post(prototypes::create::<S>),
    )
    .route("/rules/{id}/entities", get(entities::list_for_rule::<S>))
    .route("/rules/{id}/discovery", post(discovery::process::<S>))
    // Prototypes
    .route(
      "/prototypes/{id}",
      get(prototypes::get_one::<S>)
        .put(prototypes::replace::<S>)
        .delete(prototypes::delete_one::<S>),
    )
    .route("/prototypes/{id}/resync", post(prototypes::resync::<S>))
    // Templates
    .route("/templates", get(templates::list::<S>).post(templates::create::<S>))
    .route("/templates/{id}", delete(templates::delete_one::<S>))
    // Discovered entities
    .route("/entities", get(entities::list::<S>))
    .route("/entities/{id}", get(entities::get_one::<S>))
    .route(
      "/entities/{id}/templates",
      get(entities::links::<S>).post(entities::link::<S>),
    )
    .route("/entities/{id}/history", get(entities::history::<S>))
    // Sender & reaper
    .route("/sender", post(discovery::submit::<S>))
    .route("/sweep", post(discovery::sweep::<S>))
    .with_state(engine)
}

#[cfg(test)]
mod tests;
