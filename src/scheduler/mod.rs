pub mod job;
pub mod pool_queue;
pub mod pull_queue;
pub mod registry;
pub mod types;

pub use job::{Job, JobError, JobOutcome, JobResult};
pub use pool_queue::PoolQueue;
pub use pull_queue::PullQueue;
pub use registry::{SchedulerQueue, SchedulerRegistry};
pub use types::{DrainReport, PoolQueueConfig, PullQueueConfig, QueueStats, RegistrySnapshot};

/// Lock a mutex, recovering the data if a worker panicked while holding it
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
