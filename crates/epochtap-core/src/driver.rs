//! Periodic driver: one scheduler timer per active entity, each calling
//! [`Tracker::tick`].
//!
//! The driver is the only place that both schedules and removes, so it owns
//! the ordering rule: an entity's timer is cancelled (and any in-flight tick
//! has finished) before its record is removed.
//!
//! A record removed by another process keeps its timer until the next
//! [`Driver::reconcile`]. Ticks in between stop at `NotFound` and write
//! nothing.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::cycle::RenewalPolicy;
use crate::error::Result;
use crate::scheduler::Scheduler;
use crate::storage::SchedulerConfig;
use crate::tracker::{Activation, Delivery, Tracker};

pub struct Driver {
    tracker: Arc<Tracker>,
    scheduler: Scheduler,
    first_delay: Duration,
    interval: Duration,
}

impl Driver {
    pub fn new(tracker: Arc<Tracker>, config: &SchedulerConfig) -> Self {
        Self {
            tracker,
            scheduler: Scheduler::new(),
            first_delay: Duration::from_secs(config.first_tick_delay_secs),
            interval: Duration::from_secs(config.tick_interval_secs.max(1)),
        }
    }

    pub fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }

    pub fn is_watching(&self, key: &str) -> bool {
        self.scheduler.is_scheduled(key)
    }

    /// Schedule periodic ticks for `key`, replacing any existing timer.
    pub fn watch(&self, key: &str) {
        let tracker = self.tracker.clone();
        let key_owned = key.to_string();
        self.scheduler
            .schedule_periodic(key, self.first_delay, self.interval, move || {
                let tracker = tracker.clone();
                let key = key_owned.clone();
                async move { tick_once(&tracker, &key).await }
            });
        debug!(entity = key, "timer scheduled");
    }

    /// Bring timers in line with the store: watch every active record that
    /// has no timer, drop timers whose record is gone or inactive.
    ///
    /// Returns the number of timers after reconciling.
    pub async fn reconcile(&self) -> Result<usize> {
        let active: HashSet<String> = self.tracker.active_keys()?.into_iter().collect();
        for key in self.scheduler.scheduled_keys() {
            if !active.contains(&key) {
                self.scheduler.cancel(&key).await;
                debug!(entity = %key, "timer dropped");
            }
        }
        for key in &active {
            if !self.scheduler.is_scheduled(key) {
                self.watch(key);
            }
        }
        Ok(active.len())
    }

    pub async fn activate(
        &self,
        key: &str,
        delivery_target: &str,
        renewal: RenewalPolicy,
    ) -> Result<Activation> {
        let activation = self
            .tracker
            .activate(key, delivery_target, renewal)
            .await?;
        if !self.is_watching(key) {
            self.watch(key);
        }
        Ok(activation)
    }

    pub async fn deactivate(&self, key: &str) -> Result<()> {
        self.scheduler.cancel(key).await;
        self.tracker.deactivate(key).await
    }

    /// Cancel the timer, then remove the record.
    pub async fn reset(&self, key: &str) -> Result<bool> {
        self.scheduler.cancel(key).await;
        self.tracker.reset(key).await
    }

    pub async fn shutdown(&self) {
        self.scheduler.cancel_all().await;
        info!("driver stopped");
    }
}

async fn tick_once(tracker: &Tracker, key: &str) {
    match tracker.tick(key).await {
        Ok(outcome) => {
            if let Delivery::Failed(reason) = outcome.delivery {
                debug!(entity = key, %reason, "will retry on next tick");
            }
        }
        Err(e) if e.is_untracked() => debug!(entity = key, "tick for untracked entity"),
        Err(e) => error!(entity = key, error = %e, "tick failed"),
    }
}
