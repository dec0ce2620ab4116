//! Background Expiry Scheduler
//!
//! Every `SET` with a TTL produces an [`ExpiryRegistration`]: the key, the
//! write generation that created the entry, and the instant it should go away.
//! The scheduler task keeps pending registrations in a min-heap and, once a
//! deadline passes, asks the store to remove the key *only if* it still
//! carries that generation.
//!
//! ## Why Generations?
//!
//! A plain "sleep, then delete" races with later writes: `SET k a EX 1`
//! followed by `SET k b` would lose `b` when the first timer fires. Tagging
//! each deferred deletion with the generation of the write that armed it means
//! an overwrite or delete simply makes the old deletion miss. No timer ever
//! needs to be cancelled.
//!
//! ## Design
//!
//! ```text
//!  CommandHandler ──schedule()──> mpsc ──> scheduler_loop
//!                                              │ BinaryHeap by fire_at
//!                                              │ sleep_until(earliest)
//!                                              ▼
//!                               StorageEngine::expire_if_generation
//! ```
//!
//! Readers never depend on the scheduler for correctness: the store also
//! checks deadlines on every access.

use crate::storage::StorageEngine;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

/// Heap size at which stale registrations are first pruned
const PRUNE_THRESHOLD: usize = 1024;

/// A deferred deletion tied to one write of a key.
///
/// Registrations order by `fire_at` first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExpiryRegistration {
    /// When the key should be removed
    pub fire_at: Instant,
    /// Generation of the write that armed this deletion
    pub generation: u64,
    /// The key to remove
    pub key: String,
}

/// A handle to the running expiry scheduler.
///
/// When this handle is dropped, the scheduler task stops and any pending
/// registrations are abandoned. Lazy expiry in the store still hides
/// those keys once their deadline passes.
#[derive(Debug)]
pub struct ExpiryScheduler {
    /// Queue of new registrations
    tx: mpsc::UnboundedSender<ExpiryRegistration>,
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
}

impl ExpiryScheduler {
    /// Starts the scheduler as a background task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use linekv::storage::{ExpiryScheduler, StorageEngine};
    /// use std::sync::Arc;
    /// use std::time::Duration;
    ///
    /// let engine = Arc::new(StorageEngine::new());
    /// let scheduler = ExpiryScheduler::start(Arc::clone(&engine));
    ///
    /// if let Some(reg) = engine.set("k".into(), "v".into(), Some(Duration::from_secs(5))) {
    ///     scheduler.schedule(reg);
    /// }
    /// ```
    pub fn start(engine: Arc<StorageEngine>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(scheduler_loop(engine, rx, shutdown_rx));

        info!("Expiry scheduler started");

        Self { tx, shutdown_tx }
    }

    /// Queues a deferred deletion.
    ///
    /// Never blocks. If the scheduler has already stopped the registration is
    /// dropped.
    pub fn schedule(&self, registration: ExpiryRegistration) {
        trace!(
            key = %registration.key,
            generation = registration.generation,
            "Expiry registered"
        );
        if self.tx.send(registration).is_err() {
            warn!("Expiry scheduler is not running, registration dropped");
        }
    }

    /// Stops the scheduler.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for ExpiryScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The main scheduler loop.
async fn scheduler_loop(
    engine: Arc<StorageEngine>,
    mut rx: mpsc::UnboundedReceiver<ExpiryRegistration>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut pending: BinaryHeap<Reverse<ExpiryRegistration>> = BinaryHeap::new();
    let mut prune_at = PRUNE_THRESHOLD;

    loop {
        let next_deadline = pending.peek().map(|Reverse(reg)| reg.fire_at);

        tokio::select! {
            received = rx.recv() => match received {
                Some(reg) => {
                    pending.push(Reverse(reg));
                    // Re-arming one key with long TTLs would otherwise grow
                    // the heap until the old deadlines pass
                    if pending.len() >= prune_at {
                        prune_stale(&engine, &mut pending);
                        prune_at = (pending.len() * 2).max(PRUNE_THRESHOLD);
                    }
                }
                None => {
                    debug!("Expiry channel closed");
                    return;
                }
            },
            _ = sleep_until(next_deadline) => {
                fire_due(&engine, &mut pending);
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!(abandoned = pending.len(), "Expiry scheduler received shutdown signal");
                    return;
                }
            }
        }
    }
}

/// Sleeps until `deadline`, or forever if there is nothing pending.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

/// Drops registrations whose key has since been overwritten or deleted.
fn prune_stale(engine: &StorageEngine, pending: &mut BinaryHeap<Reverse<ExpiryRegistration>>) {
    let before = pending.len();
    pending.retain(|Reverse(reg)| engine.is_current(&reg.key, reg.generation));
    debug!(
        pruned = before - pending.len(),
        pending = pending.len(),
        "Stale expiry registrations pruned"
    );
}

/// Runs every registration whose deadline has passed.
fn fire_due(engine: &StorageEngine, pending: &mut BinaryHeap<Reverse<ExpiryRegistration>>) {
    let now = Instant::now();
    let mut removed = 0usize;

    while pending.peek().is_some_and(|Reverse(reg)| reg.fire_at <= now) {
        let Some(Reverse(reg)) = pending.pop() else {
            break;
        };
        if engine.expire_if_generation(&reg.key, reg.generation) {
            removed += 1;
        } else {
            trace!(key = %reg.key, generation = reg.generation, "Stale expiry skipped");
        }
    }

    if removed > 0 {
        debug!(
            expired = removed,
            pending = pending.len(),
            "Expired keys removed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn set_ttl(engine: &StorageEngine, scheduler: &ExpiryScheduler, key: &str, value: &str, ms: u64) {
        let reg = engine
            .set(key.to_string(), value.to_string(), Some(Duration::from_millis(ms)))
            .unwrap();
        scheduler.schedule(reg);
    }

    #[tokio::test]
    async fn test_scheduler_removes_expired_keys() {
        let engine = Arc::new(StorageEngine::new());
        let scheduler = ExpiryScheduler::start(Arc::clone(&engine));

        for i in 0..10 {
            set_ttl(&engine, &scheduler, &format!("key{}", i), "value", 50);
        }
        engine.set("persistent".into(), "value".into(), None);

        assert_eq!(engine.len(), 11);

        tokio::time::sleep(Duration::from_millis(200)).await;

        // Physically removed without anyone reading them
        assert_eq!(engine.len(), 1);
        assert!(engine.exists("persistent"));
        assert_eq!(engine.stats().expired, 10);
    }

    #[tokio::test]
    async fn test_overwrite_survives_old_expiry() {
        let engine = Arc::new(StorageEngine::new());
        let scheduler = ExpiryScheduler::start(Arc::clone(&engine));

        set_ttl(&engine, &scheduler, "key", "old", 50);
        engine.set("key".into(), "new".into(), None);

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(engine.get("key"), Some("new".to_string()));
    }

    #[tokio::test]
    async fn test_reset_ttl_uses_latest_deadline() {
        let engine = Arc::new(StorageEngine::new());
        let scheduler = ExpiryScheduler::start(Arc::clone(&engine));

        set_ttl(&engine, &scheduler, "key", "short", 50);
        set_ttl(&engine, &scheduler, "key", "long", 400);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(engine.get("key"), Some("long".to_string()));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(engine.len(), 0);
    }

    #[tokio::test]
    async fn test_out_of_order_deadlines() {
        let engine = Arc::new(StorageEngine::new());
        let scheduler = ExpiryScheduler::start(Arc::clone(&engine));

        set_ttl(&engine, &scheduler, "late", "v", 300);
        set_ttl(&engine, &scheduler, "early", "v", 30);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(engine.len(), 1);
        assert!(engine.exists("late"));
    }

    #[tokio::test]
    async fn test_scheduler_stops_on_drop() {
        let engine = Arc::new(StorageEngine::new());

        {
            let scheduler = ExpiryScheduler::start(Arc::clone(&engine));
            set_ttl(&engine, &scheduler, "key", "value", 30);
            // Scheduler is dropped here, before the deadline
        }

        tokio::time::sleep(Duration::from_millis(100)).await;

        // Still physically present, but lazy expiry hides it
        assert_eq!(engine.len(), 1);
        assert!(engine.get("key").is_none());
    }

    #[test]
    fn test_prune_stale_keeps_current_registrations() {
        let engine = StorageEngine::new();
        let ttl = Some(Duration::from_secs(3600));
        let mut pending = BinaryHeap::new();

        for i in 0..50 {
            let reg = engine.set("hot".into(), i.to_string(), ttl).unwrap();
            pending.push(Reverse(reg));
        }
        let other = engine.set("other".into(), "v".into(), ttl).unwrap();
        pending.push(Reverse(other.clone()));
        let gone = engine.set("gone".into(), "v".into(), ttl).unwrap();
        pending.push(Reverse(gone));
        engine.delete("gone");

        prune_stale(&engine, &mut pending);

        assert_eq!(pending.len(), 2);
        assert!(pending.iter().any(|Reverse(reg)| *reg == other));
        assert!(pending
            .iter()
            .all(|Reverse(reg)| engine.is_current(&reg.key, reg.generation)));
    }

    #[tokio::test]
    async fn test_rearmed_key_still_expires_after_pruning() {
        let engine = Arc::new(StorageEngine::new());
        let scheduler = ExpiryScheduler::start(Arc::clone(&engine));

        for i in 0..(PRUNE_THRESHOLD * 2) {
            let reg = engine
                .set("hot".into(), i.to_string(), Some(Duration::from_secs(3600)))
                .unwrap();
            scheduler.schedule(reg);
        }
        set_ttl(&engine, &scheduler, "hot", "last", 50);

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(engine.len(), 0);
        assert_eq!(engine.stats().expired, 1);
    }
}
