//! Error type for `disco-store-sqlite`.

use disco_core::store::StoreError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] disco_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("cannot decode column value: {0}")]
  Decode(String),

  #[error("host {host_id} already has a discovery rule with key {key:?}")]
  DuplicateRuleKey { host_id: Uuid, key: String },

  #[error("template name {0:?} is already taken")]
  DuplicateTemplateName(String),

  #[error("rule not found: {0}")]
  RuleNotFound(Uuid),

  #[error("template not found: {0}")]
  TemplateNotFound(Uuid),
}

impl StoreError for Error {
  fn is_conflict(&self) -> bool {
    matches!(self, Self::DuplicateRuleKey { .. } | Self::DuplicateTemplateName(_))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
