//! Tracker service: the per-entity entry points.
//!
//! Every operation runs one record through the [`EpochEngine`] or a
//! correction method inside a single [`SnapshotStore::update`], so the
//! read and the write happen under the store's exclusive lock even when
//! another process shares the snapshot. Operations on the same entity key
//! within this process are also serialized by a per-key async mutex;
//! different keys never share that lock.
//!
//! Persistence always happens before delivery. A failed delivery is logged
//! and reported in the returned [`StatusOutcome`] but never undoes the
//! finalization that preceded it. After a successful delivery only the
//! message handle is written, onto whatever the record is by then.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::cycle::{
    AdjustOutcome, Adjustment, Decision, EpochEngine, Outcome, RenewalPolicy, StatusReport,
    TrackedRecord,
};
use crate::error::{CoreError, Result, StorageError};
use crate::storage::{Snapshot, SnapshotStore};
use crate::transport::{MessageHandle, StatusMessage, Transport};

/// What happened to the emission of an evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "delivery", content = "detail", rename_all = "snake_case")]
pub enum Delivery {
    /// Nothing to send (no-op, muted, exhausted).
    NotAttempted,
    Delivered(MessageHandle),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusOutcome {
    pub outcome: Outcome,
    pub report: Option<StatusReport>,
    pub delivery: Delivery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Created,
    Resumed,
}

/// Lazily created async mutex per entity key.
///
/// Entries are never dropped: a waiter may still hold the old `Arc` when a
/// record is reset, and a fresh lock for the same key would let two
/// operations interleave.
#[derive(Default)]
struct EntityLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl EntityLocks {
    async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            map.entry(key.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

pub struct Tracker {
    store: Arc<dyn SnapshotStore>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    engine: EpochEngine,
    notify_on_activate: bool,
    locks: EntityLocks,
}

impl Tracker {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        engine: EpochEngine,
    ) -> Self {
        Self {
            store,
            transport,
            clock,
            engine,
            notify_on_activate: true,
            locks: EntityLocks::default(),
        }
    }

    /// Whether newly created records start with notifications on.
    pub fn with_notify_on_activate(mut self, enabled: bool) -> Self {
        self.notify_on_activate = enabled;
        self
    }

    pub fn engine(&self) -> &EpochEngine {
        &self.engine
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn get(&self, key: &str) -> Result<Option<TrackedRecord>> {
        Ok(self.store.get(key)?)
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        Ok(self.store.load()?)
    }

    /// Keys of records with `active = true`.
    pub fn active_keys(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .load()?
            .into_iter()
            .filter(|(_, r)| r.active)
            .map(|(k, _)| k)
            .collect())
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start tracking `key`, or turn notifications and tracking back on.
    pub async fn activate(
        &self,
        key: &str,
        delivery_target: &str,
        renewal: RenewalPolicy,
    ) -> Result<Activation> {
        let _guard = self.locks.acquire(key).await;
        let activation = self.modify(key, |slot| {
            if let Some(record) = slot.as_mut() {
                record.notify_enabled = true;
                record.active = true;
                return Ok(Activation::Resumed);
            }
            let mut record = TrackedRecord::new(self.clock.now(), delivery_target, renewal);
            record.notify_enabled = self.notify_on_activate;
            *slot = Some(record);
            Ok(Activation::Created)
        })?;
        info!(entity = key, ?activation, "tracking active");
        Ok(activation)
    }

    /// Stop periodic notifications; epochs keep counting.
    pub async fn mute(&self, key: &str) -> Result<()> {
        let _guard = self.locks.acquire(key).await;
        self.modify(key, |slot| {
            require(slot, key)?.notify_enabled = false;
            Ok(())
        })?;
        info!(entity = key, "notifications muted");
        Ok(())
    }

    /// Suspend tracking without discarding the record.
    pub async fn deactivate(&self, key: &str) -> Result<()> {
        let _guard = self.locks.acquire(key).await;
        self.modify(key, |slot| {
            require(slot, key)?.active = false;
            Ok(())
        })?;
        info!(entity = key, "tracking suspended");
        Ok(())
    }

    /// Forced evaluation on behalf of a user query.
    pub async fn status(&self, key: &str) -> Result<StatusOutcome> {
        let outcome = self.advance(key, true).await?;
        if outcome.outcome == Outcome::Inactive {
            return Err(CoreError::InactiveEntity {
                key: key.to_string(),
            });
        }
        Ok(outcome)
    }

    /// Periodic evaluation. Inactive records are a silent no-op.
    pub async fn tick(&self, key: &str) -> Result<StatusOutcome> {
        self.advance(key, false).await
    }

    pub async fn record_decision(&self, key: &str, decision: Decision) -> Result<()> {
        let _guard = self.locks.acquire(key).await;
        self.modify(key, |slot| {
            require_active(slot, key)?.record_decision(decision);
            Ok(())
        })?;
        debug!(entity = key, ?decision, "decision recorded");
        Ok(())
    }

    /// Decision made through a delivered message's acknowledgment control.
    ///
    /// The decision is committed first; removing the control from the
    /// message is best-effort.
    pub async fn acknowledge(
        &self,
        key: &str,
        message: &MessageHandle,
        decision: Decision,
    ) -> Result<()> {
        let _guard = self.locks.acquire(key).await;
        self.modify(key, |slot| {
            let record = require_active(slot, key)?;
            record.record_decision(decision);
            if record.last_message.as_ref() == Some(message) {
                record.last_message = None;
            }
            Ok(())
        })?;
        debug!(entity = key, ?decision, message = %message.id, "decision acknowledged");

        if let Err(e) = self.transport.revoke_interactivity(message).await {
            warn!(entity = key, error = %e, "could not revoke acknowledgment control");
        }
        Ok(())
    }

    pub async fn adjust_tapped(&self, key: &str, adjustment: Adjustment) -> Result<AdjustOutcome> {
        let _guard = self.locks.acquire(key).await;
        let outcome = self.modify(key, |slot| {
            Ok(require_active(slot, key)?.adjust_tapped(adjustment))
        })?;
        if let AdjustOutcome::Added { tapped_epochs } | AdjustOutcome::Removed { tapped_epochs } =
            outcome
        {
            info!(entity = key, tapped_epochs, "tapped epochs adjusted");
        }
        Ok(outcome)
    }

    /// Drop the record. Returns whether one existed.
    ///
    /// A timer still firing for `key` afterwards finds no record and stops
    /// at `NotFound`; [`Driver::reset`](crate::Driver::reset) also cancels
    /// the timer first.
    pub async fn reset(&self, key: &str) -> Result<bool> {
        let _guard = self.locks.acquire(key).await;
        let removed = self.modify(key, |slot| Ok(slot.take().is_some()))?;
        if removed {
            info!(entity = key, "record removed");
        }
        Ok(removed)
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Run `f` on the stored slot for `key` inside one exclusive store
    /// update. `f` must leave the slot untouched when it returns an error.
    fn modify<T>(
        &self,
        key: &str,
        f: impl FnOnce(&mut Option<TrackedRecord>) -> Result<T>,
    ) -> Result<T> {
        let mut f = Some(f);
        let mut result = None;
        self.store
            .update(key, &mut |slot: &mut Option<TrackedRecord>| {
                if let Some(f) = f.take() {
                    result = Some(f(slot));
                }
            })?;
        result.unwrap_or_else(|| {
            Err(StorageError::Corrupt(format!("store skipped the update of '{key}'")).into())
        })
    }

    async fn advance(&self, key: &str, forced: bool) -> Result<StatusOutcome> {
        let _guard = self.locks.acquire(key).await;
        // The clock is read under the store lock so that concurrent
        // evaluators agree on which epoch was finalized first.
        let eval = self.modify(key, |slot| {
            let record = require(slot, key)?;
            let now = self.clock.now();
            let eval = self.engine.evaluate(record, now, forced);
            if eval.clock_anomaly {
                warn!(entity = key, now, cycle_start = record.cycle_start, "clock anomaly");
            }
            if eval.changed() {
                *record = eval.record.clone();
            }
            Ok(eval)
        })?;

        match eval.outcome {
            Outcome::Finalized {
                epoch,
                credited,
                renewed,
            } => {
                if renewed {
                    info!(entity = key, "cycle renewed");
                }
                info!(
                    entity = key,
                    epoch,
                    credited,
                    tapped_epochs = eval.record.tapped_epochs,
                    "epoch finalized"
                );
            }
            Outcome::Exhausted => debug!(entity = key, "cycle exhausted"),
            Outcome::Unchanged => debug!(entity = key, "same epoch, nothing to do"),
            Outcome::Inactive => debug!(entity = key, "inactive, skipped"),
        }

        let Some(report) = eval.emission else {
            return Ok(StatusOutcome {
                outcome: eval.outcome,
                report: None,
                delivery: Delivery::NotAttempted,
            });
        };

        let message = StatusMessage::new(report.clone());
        let delivery = match self
            .transport
            .deliver(&eval.record.delivery_target, &message)
            .await
        {
            Ok(handle) => {
                // Other processes may have changed or removed the record
                // while the message was in flight: touch only the handle.
                let remembered = handle.clone();
                let stored = self.modify(key, |slot| {
                    if let Some(record) = slot.as_mut() {
                        record.last_message = Some(remembered);
                    }
                    Ok(())
                });
                if let Err(e) = stored {
                    warn!(entity = key, error = %e, "could not remember delivered message");
                }
                Delivery::Delivered(handle)
            }
            Err(e) => {
                warn!(
                    entity = key,
                    transport = self.transport.name(),
                    error = %e,
                    "status delivery failed"
                );
                Delivery::Failed(e.to_string())
            }
        };

        Ok(StatusOutcome {
            outcome: eval.outcome,
            report: Some(report),
            delivery,
        })
    }
}

fn require<'a>(slot: &'a mut Option<TrackedRecord>, key: &str) -> Result<&'a mut TrackedRecord> {
    slot.as_mut().ok_or_else(|| CoreError::NotFound {
        key: key.to_string(),
    })
}

fn require_active<'a>(
    slot: &'a mut Option<TrackedRecord>,
    key: &str,
) -> Result<&'a mut TrackedRecord> {
    let record = require(slot, key)?;
    if !record.active {
        return Err(CoreError::InactiveEntity {
            key: key.to_string(),
        });
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::storage::MemoryStore;
    use crate::transport::RecordingTransport;

    struct Fixture {
        clock: Arc<FixedClock>,
        transport: Arc<RecordingTransport>,
        store: Arc<MemoryStore>,
        tracker: Tracker,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(FixedClock::new(0));
        let transport = Arc::new(RecordingTransport::new());
        let store = Arc::new(MemoryStore::new());
        let tracker = Tracker::new(
            store.clone(),
            transport.clone(),
            clock.clone(),
            EpochEngine::default(),
        );
        Fixture {
            clock,
            transport,
            store,
            tracker,
        }
    }

    #[tokio::test]
    async fn activation_then_status_delivers_epoch_one() {
        let f = fixture();
        let created = f
            .tracker
            .activate("u1", "chat-1", RenewalPolicy::Terminal)
            .await
            .unwrap();
        assert_eq!(created, Activation::Created);

        f.clock.set(10);
        let outcome = f.tracker.status("u1").await.unwrap();
        let report = outcome.report.unwrap();
        assert_eq!(report.current_epoch, 1);
        assert_eq!(report.remaining_taps, 12_000);
        assert!(matches!(outcome.delivery, Delivery::Delivered(_)));

        let delivered = f.transport.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].handle.destination, "chat-1");
        let stored = f.store.get("u1").unwrap().unwrap();
        assert_eq!(stored.last_message, Some(delivered[0].handle.clone()));
    }

    #[tokio::test]
    async fn second_activation_resumes_notifications() {
        let f = fixture();
        f.tracker
            .activate("u1", "chat-1", RenewalPolicy::Terminal)
            .await
            .unwrap();
        f.tracker.mute("u1").await.unwrap();
        f.clock.set(5_000);

        let again = f
            .tracker
            .activate("u1", "other", RenewalPolicy::Renew)
            .await
            .unwrap();
        assert_eq!(again, Activation::Resumed);
        let record = f.tracker.get("u1").unwrap().unwrap();
        assert!(record.notify_enabled);
        assert_eq!(record.cycle_start, 0);
        assert_eq!(record.delivery_target, "chat-1");
    }

    #[tokio::test]
    async fn operations_on_unknown_entities_are_not_found() {
        let f = fixture();
        assert!(matches!(
            f.tracker.status("ghost").await,
            Err(CoreError::NotFound { .. })
        ));
        assert!(matches!(
            f.tracker.tick("ghost").await,
            Err(CoreError::NotFound { .. })
        ));
        assert!(f
            .tracker
            .adjust_tapped("ghost", Adjustment::Add)
            .await
            .unwrap_err()
            .is_untracked());
        assert!(f.tracker.mute("ghost").await.is_err());
        assert!(!f.tracker.reset("ghost").await.unwrap());
        assert!(f.store.load().unwrap().is_empty());
    }

    #[tokio::test]
    async fn deactivated_entity_rejects_status_and_skips_ticks() {
        let f = fixture();
        f.tracker
            .activate("u1", "chat-1", RenewalPolicy::Terminal)
            .await
            .unwrap();
        f.tracker.deactivate("u1").await.unwrap();

        assert!(matches!(
            f.tracker.status("u1").await,
            Err(CoreError::InactiveEntity { .. })
        ));
        let tick = f.tracker.tick("u1").await.unwrap();
        assert_eq!(tick.outcome, Outcome::Inactive);
        assert!(f
            .tracker
            .record_decision("u1", Decision::Tapped)
            .await
            .is_err());
        assert!(f.transport.delivered().is_empty());
    }

    #[tokio::test]
    async fn delivery_failure_keeps_finalized_state() {
        let f = fixture();
        f.tracker
            .activate("u1", "chat-1", RenewalPolicy::Terminal)
            .await
            .unwrap();
        f.tracker.tick("u1").await.unwrap();
        f.tracker
            .record_decision("u1", Decision::Tapped)
            .await
            .unwrap();

        f.transport.set_failing(true);
        f.clock.set(301);
        let outcome = f.tracker.tick("u1").await.unwrap();
        assert!(matches!(outcome.delivery, Delivery::Failed(_)));

        let record = f.tracker.get("u1").unwrap().unwrap();
        assert_eq!(record.tapped_epochs, 1);
        assert_eq!(record.last_epoch_emitted, 2);
        assert_eq!(record.pending_decision, None);

        // Next tick in the same epoch does not re-finalize.
        f.transport.set_failing(false);
        let retry = f.tracker.tick("u1").await.unwrap();
        assert_eq!(retry.outcome, Outcome::Unchanged);

        // A forced query recovers the missed message with the same counters.
        let status = f.tracker.status("u1").await.unwrap();
        assert_eq!(status.report.unwrap().tapped_epochs, 1);
    }

    #[tokio::test]
    async fn acknowledge_records_decision_and_revokes_buttons() {
        let f = fixture();
        f.tracker
            .activate("u1", "chat-1", RenewalPolicy::Terminal)
            .await
            .unwrap();
        let outcome = f.tracker.tick("u1").await.unwrap();
        let Delivery::Delivered(handle) = outcome.delivery else {
            panic!("expected a delivered message");
        };

        f.tracker
            .acknowledge("u1", &handle, Decision::Tapped)
            .await
            .unwrap();
        let record = f.tracker.get("u1").unwrap().unwrap();
        assert_eq!(record.pending_decision, Some(Decision::Tapped));
        assert_eq!(record.last_message, None);
        assert_eq!(f.transport.revoked(), vec![handle]);
    }

    #[tokio::test]
    async fn tap_remove_at_zero_is_reported() {
        let f = fixture();
        f.tracker
            .activate("u1", "chat-1", RenewalPolicy::Terminal)
            .await
            .unwrap();
        let outcome = f
            .tracker
            .adjust_tapped("u1", Adjustment::Remove)
            .await
            .unwrap();
        assert_eq!(outcome, AdjustOutcome::AlreadyZero);
        assert_eq!(
            f.tracker
                .adjust_tapped("u1", Adjustment::Add)
                .await
                .unwrap(),
            AdjustOutcome::Added { tapped_epochs: 1 }
        );
    }

    #[tokio::test]
    async fn muted_activation_default_suppresses_ticks() {
        let f = fixture();
        let tracker = Tracker::new(
            f.store.clone(),
            f.transport.clone(),
            f.clock.clone(),
            EpochEngine::default(),
        )
        .with_notify_on_activate(false);
        tracker
            .activate("u1", "chat-1", RenewalPolicy::Terminal)
            .await
            .unwrap();
        let tick = tracker.tick("u1").await.unwrap();
        assert!(matches!(tick.outcome, Outcome::Finalized { epoch: 1, .. }));
        assert_eq!(tick.delivery, Delivery::NotAttempted);
        assert!(f.transport.delivered().is_empty());
    }
}
