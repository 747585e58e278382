//! Keyed periodic timers on the tokio runtime.
//!
//! One timer per key; scheduling a key that already has a timer replaces it.
//! [`Scheduler::cancel`] waits for the aborted task to finish, so once it
//! returns no callback for that key is running or will run again.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Default)]
pub struct Scheduler {
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `callback` after `first_delay`, then every `interval`.
    ///
    /// Must be called from within a tokio runtime. Missed ticks are delayed,
    /// not bursted.
    pub fn schedule_periodic<F, Fut>(
        &self,
        key: &str,
        first_delay: Duration,
        interval: Duration,
        callback: F,
    ) where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(first_delay).await;
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                callback().await;
            }
        });

        let previous = self.lock().insert(key.to_string(), handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Stop the timer for `key`. Returns whether one was registered.
    pub async fn cancel(&self, key: &str) -> bool {
        let handle = self.lock().remove(key);
        match handle {
            Some(handle) => {
                handle.abort();
                let _ = handle.await;
                true
            }
            None => false,
        }
    }

    pub async fn cancel_all(&self) {
        let handles: Vec<_> = self.lock().drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.abort();
            let _ = handle.await;
        }
    }

    pub fn is_scheduled(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn scheduled_keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for (_, handle) in self.lock().drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter(scheduler: &Scheduler, key: &str) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        scheduler.schedule_periodic(
            key,
            Duration::from_secs(10),
            Duration::from_secs(300),
            move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            },
        );
        count
    }

    async fn advance(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_first_delay_then_every_interval() {
        let scheduler = Scheduler::new();
        let count = counter(&scheduler, "a");

        advance(5).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        advance(10).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        advance(300).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_future_ticks() {
        let scheduler = Scheduler::new();
        let count = counter(&scheduler, "a");
        advance(15).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(scheduler.cancel("a").await);
        assert!(!scheduler.is_scheduled("a"));
        advance(1_000).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!scheduler.cancel("a").await);
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_previous_timer() {
        let scheduler = Scheduler::new();
        let first = counter(&scheduler, "a");
        let second = counter(&scheduler, "a");
        advance(15).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.scheduled_keys(), vec!["a".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let scheduler = Scheduler::new();
        let a = counter(&scheduler, "a");
        let b = counter(&scheduler, "b");
        advance(15).await;
        scheduler.cancel("a").await;
        advance(300).await;
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 2);
    }
}
