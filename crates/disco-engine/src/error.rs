//! Error types for `disco-engine`.

use serde::{Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

/// An error returned by an [`Engine`](crate::Engine) operation, generic over
/// the error type of the backing store.
#[derive(Debug, Error)]
pub enum EngineError<E: std::error::Error + 'static> {
  #[error("discovery rule not found: {0}")]
  RuleNotFound(Uuid),

  #[error("prototype not found: {0}")]
  PrototypeNotFound(Uuid),

  #[error("template not found: {0}")]
  TemplateNotFound(Uuid),

  #[error("discovered entity not found: {0}")]
  EntityNotFound(Uuid),

  /// The store failed. `committed` entities of the current operation had
  /// already been written in full and stay written.
  #[error("store unavailable after {committed} committed entities: {source}")]
  StoreUnavailable {
    committed: usize,
    #[source]
    source:    E,
  },

  /// A delete was refused because dependents still exist.
  #[error("cannot delete {target}: {dependents} dependent(s) exist")]
  CascadeConflict { target: String, dependents: usize },

  #[error("invalid input: {0}")]
  InvalidPayload(#[source] disco_core::Error),

  #[error("host {host_id} has no discovery rule or discovered item with key {key:?}")]
  UnknownTarget { host_id: Uuid, key: String },

  #[error("{key:?} on host {host_id} does not accept pushed values")]
  NotTrapper { host_id: Uuid, key: String },
}

impl<E: std::error::Error + 'static> EngineError<E> {
  /// Wrap a store error raised before anything was written.
  pub fn store(source: E) -> Self { Self::StoreUnavailable { committed: 0, source } }
}

pub type Result<T, E> = std::result::Result<T, EngineError<E>>;

/// A failure confined to one (record, prototype) pair of a discovery event.
/// The rest of the event is still processed.
#[derive(Debug, Serialize)]
pub struct EntityError {
  /// Index of the record within the event.
  pub record:       usize,
  pub prototype_id: Uuid,
  #[serde(serialize_with = "display")]
  pub error:        disco_core::Error,
}

fn display<S: Serializer>(
  error: &disco_core::Error,
  s: S,
) -> std::result::Result<S::Ok, S::Error> {
  s.collect_str(error)
}

/// Map a store error to [`EngineError::StoreUnavailable`] with the number of
/// entities the failing operation had already committed.
pub(crate) fn unavailable<E: std::error::Error + 'static>(
  committed: usize,
) -> impl FnOnce(E) -> EngineError<E> {
  move |source| EngineError::StoreUnavailable { committed, source }
}
