//! The discovery reconciliation engine.
//!
//! [`Engine`] applies discovery events to a [`DiscoveryStore`]: it expands
//! each record through the rule's prototypes, matches the results against
//! the entities already discovered, and creates, refreshes, or marks them as
//! lost. The Lifetime Reaper ([`Engine::sweep`]) later deletes entities that
//! stayed lost for longer than their rule's lifetime.
//!
//! Every operation that rewrites a rule's entities runs under that rule's
//! lock ([`RuleLocks`]).
//!
//! ```rust,ignore
//! let engine = Engine::new(Arc::new(store));
//! let report = engine.process_event(event).await?;
//! ```

pub mod cascade;
pub mod error;
pub mod linker;
pub mod locks;
pub mod matcher;
pub mod reaper;
pub mod reconcile;
pub mod sender;

use std::sync::Arc;

use disco_core::{rule::DiscoveryRule, store::DiscoveryStore};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

pub use cascade::DeleteReport;
pub use error::{EngineError, EntityError, Result};
pub use linker::ResyncReport;
pub use locks::RuleLocks;
pub use matcher::EntityMatcher;
pub use reaper::SweepReport;
pub use reconcile::ReconcileReport;
pub use sender::SubmitOutcome;

/// The reconciliation engine over a store `S`.
pub struct Engine<S> {
  store: Arc<S>,
  locks: RuleLocks,
}

impl<S: DiscoveryStore> Engine<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store, locks: RuleLocks::new() } }

  /// Read access to the underlying store.
  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn locks(&self) -> &RuleLocks { &self.locks }

  /// Take the lock of an existing rule and return the rule as read under it.
  ///
  /// The rule is looked up before and after waiting, so a missing or
  /// concurrently deleted rule leaves no entry in the lock arena.
  pub(crate) async fn lock_rule(
    &self,
    rule_id: Uuid,
  ) -> Result<(OwnedMutexGuard<()>, DiscoveryRule), S::Error> {
    self
      .store
      .get_rule(rule_id)
      .await
      .map_err(EngineError::store)?
      .ok_or(EngineError::RuleNotFound(rule_id))?;

    let guard = self.locks.acquire(rule_id).await;
    match self.store.get_rule(rule_id).await.map_err(EngineError::store)? {
      Some(rule) => Ok((guard, rule)),
      None => {
        drop(guard);
        self.locks.forget(rule_id);
        Err(EngineError::RuleNotFound(rule_id))
      }
    }
  }
}
