//! Periodic flushing of the ledger.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::ledger::DurableLedger;

/// How often the safety-net checkpoint runs unless configured otherwise.
pub const DEFAULT_CHECKPOINT_INTERVAL: Duration = Duration::from_secs(30);

const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Flushes a dirty ledger at a fixed interval.
///
/// Logins and logouts already save eagerly; this bounds how stale the file
/// can get when one of those saves failed.
#[derive(Debug)]
pub struct Checkpointer {
    store: Arc<DurableLedger>,
    interval: Duration,
    last_run: Option<DateTime<Utc>>,
}

impl Checkpointer {
    pub fn new(store: Arc<DurableLedger>, interval: Duration) -> Self {
        Self {
            store,
            interval: interval.max(MIN_INTERVAL),
            last_run: None,
        }
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Externally driven tick. Checkpoints when an interval has passed since
    /// the last tick that did.
    ///
    /// Returns true if the ledger was written.
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        let due = self.last_run.is_none_or(|last| {
            now.signed_duration_since(last)
                .to_std()
                .is_ok_and(|elapsed| elapsed >= self.interval)
        });
        if !due {
            return false;
        }
        self.last_run = Some(now);
        self.checkpoint()
    }

    /// Runs until `shutdown` flips to true or its sender is dropped, then
    /// checkpoints one last time.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.checkpoint();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.checkpoint();
        tracing::debug!("checkpointer stopped");
    }

    fn checkpoint(&self) -> bool {
        match self.store.checkpoint() {
            Ok(saved) => {
                if saved {
                    tracing::debug!(path = %self.store.path().display(), "checkpoint saved ledger");
                }
                saved
            }
            Err(e) => {
                tracing::error!(error = %e, "checkpoint failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use pt_core::RosterEntry;

    use super::*;
    use crate::LEDGER_FILE;
    use crate::test_support::{alex, t0};

    fn store() -> (tempfile::TempDir, Arc<DurableLedger>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(DurableLedger::open(dir.path().join(LEDGER_FILE)));
        (dir, store)
    }

    #[test]
    fn tick_only_saves_when_due_and_dirty() {
        let (_dir, store) = store();
        let mut checkpointer = Checkpointer::new(Arc::clone(&store), DEFAULT_CHECKPOINT_INTERVAL);

        // Clean: first tick is due but has nothing to write.
        assert!(!checkpointer.tick(t0()));

        store.refresh_names(&[RosterEntry::new(alex(), "Alex")]);
        assert!(!checkpointer.tick(t0() + ChronoDuration::seconds(10)));
        assert!(store.is_dirty());

        assert!(checkpointer.tick(t0() + ChronoDuration::seconds(30)));
        assert!(!store.is_dirty());
        assert!(store.path().exists());
    }

    #[test]
    fn zero_interval_is_clamped() {
        let (_dir, store) = store();
        let checkpointer = Checkpointer::new(store, Duration::ZERO);
        assert_eq!(checkpointer.interval(), MIN_INTERVAL);
    }

    #[tokio::test]
    async fn run_flushes_on_shutdown() {
        let (_dir, store) = store();
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(Checkpointer::new(Arc::clone(&store), Duration::from_secs(3600)).run(rx));

        store.refresh_names(&[RosterEntry::new(alex(), "Alex")]);
        tx.send(true).unwrap();
        task.await.unwrap();

        assert!(!store.is_dirty());
        let reopened = DurableLedger::open(store.path());
        assert_eq!(reopened.snapshot().name(&alex()), Some("Alex"));
    }
}
