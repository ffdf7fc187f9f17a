//! Per-rule lock arena.
//!
//! Every operation that reads and then rewrites the entities of one rule
//! holds that rule's lock for its whole duration, so events, sweeps and
//! cascades of the same rule are applied one at a time. Different rules
//! never contend.

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct RuleLocks {
  locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl RuleLocks {
  pub fn new() -> Self { Self::default() }

  /// Wait for exclusive access to `rule_id`.
  pub async fn acquire(&self, rule_id: Uuid) -> OwnedMutexGuard<()> {
    let lock = self.locks.lock().entry(rule_id).or_default().clone();
    lock.lock_owned().await
  }

  /// Drop the lock of a deleted rule. Tasks already waiting on it still get
  /// it and then find the rule gone.
  pub fn forget(&self, rule_id: Uuid) { self.locks.lock().remove(&rule_id); }

  pub fn len(&self) -> usize { self.locks.lock().len() }

  pub fn is_empty(&self) -> bool { self.locks.lock().is_empty() }
}
