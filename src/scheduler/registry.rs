use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::lock;
use super::types::{QueueStats, RegistrySnapshot};

/// The registry's view of a queue: identity plus a statistics snapshot.
///
/// Both queue variants implement this; the registry holds only weak
/// references, so registration never extends a queue's lifetime.
pub trait SchedulerQueue: Send + Sync {
    fn name(&self) -> &str;
    fn stats(&self) -> QueueStats;
}

struct RegisteredQueue {
    name: String,
    queue: Weak<dyn SchedulerQueue>,
}

/// Directory of live queues plus the shutdown signal they all share.
///
/// Queues self-register in their constructor and deregister on drop. The
/// registry also owns the monotonic sequence counter that queues stamp onto
/// jobs, so independent scheduler instances can coexist (tests included)
/// without process-wide state.
pub struct SchedulerRegistry {
    queues: Mutex<Vec<RegisteredQueue>>,
    shutdown_tx: watch::Sender<bool>,
    sequence: AtomicU64,
}

impl SchedulerRegistry {
    pub fn new() -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            queues: Mutex::new(Vec::new()),
            shutdown_tx,
            sequence: AtomicU64::new(0),
        })
    }

    /// Add a queue reference. Duplicate names are tolerated but flagged,
    /// since aggregate statistics are keyed by name.
    pub fn register(&self, queue: &Arc<dyn SchedulerQueue>) {
        let name = queue.name().to_string();
        let mut queues = lock(&self.queues);
        if queues
            .iter()
            .any(|entry| entry.name == name && entry.queue.strong_count() > 0)
        {
            warn!(queue = %name, "⚠️ duplicate queue name registered, statistics will overlap");
        }
        queues.push(RegisteredQueue {
            name: name.clone(),
            queue: Arc::downgrade(queue),
        });
        debug!(queue = %name, "📇 queue registered");
    }

    /// Remove a specific queue reference
    pub fn unregister(&self, queue: &Arc<dyn SchedulerQueue>) {
        let target = Arc::downgrade(queue);
        let mut queues = lock(&self.queues);
        queues.retain(|entry| entry.queue.strong_count() > 0 && !entry.queue.ptr_eq(&target));
        debug!(queue = %queue.name(), "📇 queue unregistered");
    }

    /// Sweep entries whose queue has been dropped. Called from queue `Drop`
    /// impls, where the weak reference is already dead.
    pub(crate) fn release(&self, name: &str) {
        let mut queues = lock(&self.queues);
        queues.retain(|entry| entry.queue.strong_count() > 0);
        debug!(queue = %name, "📇 queue released");
    }

    /// Request cooperative shutdown of every queue created under this
    /// registry. Observed at loop boundaries only: running jobs finish, no
    /// new ones are dispatched.
    pub fn shutdown(&self) {
        info!("🛑 scheduler shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    /// Subscribe to the shared shutdown signal
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Next value of the injected monotonic job counter (starts at 1)
    pub(crate) fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Upgrade the currently live queues into a defensive copy, so iteration
    /// cannot deadlock against a queue deregistering concurrently.
    fn live_queues(&self) -> Vec<Arc<dyn SchedulerQueue>> {
        lock(&self.queues)
            .iter()
            .filter_map(|entry| entry.queue.upgrade())
            .collect()
    }

    /// Run an action against every live queue
    pub fn for_each(&self, mut action: impl FnMut(&dyn SchedulerQueue)) {
        for queue in self.live_queues() {
            action(queue.as_ref());
        }
    }

    /// Per-queue statistics snapshots, in registration order
    pub fn snapshot(&self) -> Vec<QueueStats> {
        self.live_queues()
            .iter()
            .map(|queue| queue.stats())
            .collect()
    }

    /// Aggregate snapshot keyed by queue name. With duplicate names the
    /// later registration wins, which is acceptable for observability.
    pub fn aggregate(&self) -> RegistrySnapshot {
        let mut queues = BTreeMap::new();
        for stats in self.snapshot() {
            queues.insert(stats.name.clone(), stats);
        }
        RegistrySnapshot { queues }
    }
}
