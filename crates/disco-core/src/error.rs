//! Error types for `disco-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A prototype references a macro the discovery record does not bind.
  #[error("unresolved macro {0}")]
  UnresolvedMacro(String),

  /// A value that must be quoted inside an item key parameter ends with `\`,
  /// which would escape the closing quote.
  #[error("value {0:?} cannot be quoted as an item key parameter: it ends with a backslash")]
  UnquotableKeyParam(String),

  #[error("invalid lifetime {0:?}: expected a number with an optional s/m/h/d/w suffix or \"never\"")]
  InvalidLifetime(String),

  #[error("invalid discovery payload: {0}")]
  InvalidPayload(String),

  #[error("prototype kind mismatch: expected {expected}, got {actual}")]
  KindMismatch {
    expected: &'static str,
    actual:   &'static str,
  },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
