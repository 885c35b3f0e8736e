use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::job::{Job, JobOutcome, JobResult, Readmit};
use super::lock;
use super::registry::{SchedulerQueue, SchedulerRegistry};
use super::types::{PoolQueueConfig, QueueStats};

/// Retry delay ceiling for pool-driven jobs
pub const POOL_RETRY_DELAY_CAP: Duration = Duration::from_millis(2000);

// Reaper wake cadence: clamp keeps it responsive to freshly delayed jobs
// without spinning, idle sleep covers the empty-set case.
const REAPER_MIN_SLEEP: Duration = Duration::from_millis(100);
const REAPER_MAX_SLEEP: Duration = Duration::from_millis(3000);
const REAPER_IDLE_SLEEP: Duration = Duration::from_millis(200);

/// A queue that dispatches ready jobs onto a bounded worker pool as they
/// arrive and transparently retries jobs that report transient failure.
///
/// Must be created inside a Tokio runtime: construction spawns the retry
/// reaper, and `submit` spawns worker tasks.
pub struct PoolQueue {
    inner: Arc<PoolInner>,
    registry: Arc<SchedulerRegistry>,
    reaper: Option<JoinHandle<()>>,
}

struct PoolInner {
    name: String,
    max_workers: usize,
    /// FIFO of jobs eligible to run now. Never locked together with `delayed`.
    ready: Mutex<VecDeque<Job>>,
    /// Unordered set of jobs waiting out a retry delay
    delayed: Mutex<Vec<Job>>,
    worker_slots: Arc<Semaphore>,
    total_submitted: AtomicU64,
    shutdown: watch::Receiver<bool>,
}

impl PoolQueue {
    pub fn new(config: PoolQueueConfig, registry: &Arc<SchedulerRegistry>) -> Arc<Self> {
        let max_workers = config.max_workers.max(1);
        let inner = Arc::new(PoolInner {
            name: config.name,
            max_workers,
            ready: Mutex::new(VecDeque::new()),
            delayed: Mutex::new(Vec::new()),
            worker_slots: Arc::new(Semaphore::new(max_workers)),
            total_submitted: AtomicU64::new(0),
            shutdown: registry.shutdown_signal(),
        });

        let reaper = tokio::spawn(reaper_loop(Arc::clone(&inner), registry.shutdown_signal()));

        let queue = Arc::new(Self {
            inner,
            registry: Arc::clone(registry),
            reaper: Some(reaper),
        });
        let as_dyn: Arc<dyn SchedulerQueue> = queue.clone();
        registry.register(&as_dyn);

        info!(queue = %queue.inner.name, max_workers, "🚀 pool queue started");
        queue
    }

    /// Accept a job and immediately dispatch as much ready work as the
    /// worker ceiling allows. Never fails; outcomes are not reported back.
    pub fn submit(&self, mut job: Job) {
        let inner_dyn: Arc<dyn Readmit> = self.inner.clone();
        let owner: Weak<dyn Readmit> = Arc::downgrade(&inner_dyn);
        job.admit(self.registry.next_sequence(), owner);
        self.inner.total_submitted.fetch_add(1, Ordering::Relaxed);
        debug!(
            queue = %self.inner.name,
            sequence = job.sequence(),
            priority = job.priority,
            "📥 job submitted"
        );
        lock(&self.inner.ready).push_back(job);
        self.inner.drain_ready();
    }

    /// Convenience wrapper: submit a bare callable as a job
    pub fn submit_with<F>(&self, priority: f32, op: F)
    where
        F: FnMut() -> JobResult + Send + 'static,
    {
        self.submit(Job::new(priority, op));
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn stats(&self) -> QueueStats {
        self.inner.stats()
    }
}

impl SchedulerQueue for PoolQueue {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn stats(&self) -> QueueStats {
        self.inner.stats()
    }
}

impl Drop for PoolQueue {
    fn drop(&mut self) {
        self.registry.release(&self.inner.name);
        if let Some(reaper) = self.reaper.take() {
            reaper.abort();
        }
    }
}

impl PoolInner {
    /// Dispatch ready jobs while a worker slot is free and shutdown has not
    /// been requested. FIFO order holds only for jobs waiting behind the
    /// worker ceiling; concurrently dispatched jobs race freely.
    fn drain_ready(self: &Arc<Self>) {
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            let permit = match Arc::clone(&self.worker_slots).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let Some(job) = lock(&self.ready).pop_front() else {
                break;
            };
            self.spawn_worker(job, permit);
        }
    }

    fn spawn_worker(self: &Arc<Self>, job: Job, permit: OwnedSemaphorePermit) {
        let inner = Arc::clone(self);
        let sequence = job.sequence();
        debug!(queue = %inner.name, sequence, "🏃 job dispatched");

        tokio::spawn(async move {
            let started = Instant::now();
            let outcome = tokio::task::spawn_blocking(move || {
                let mut job = job;
                let result = job.run();
                (job, result)
            })
            .await;

            match outcome {
                Ok((_, Ok(JobOutcome::Completed))) => {
                    debug!(
                        queue = %inner.name,
                        sequence,
                        elapsed = ?started.elapsed(),
                        "✅ job completed"
                    );
                }
                Ok((job, Ok(JobOutcome::Retry))) => match job.owner() {
                    Some(owner) => owner.readmit(job),
                    None => warn!(queue = %inner.name, sequence, "owning queue gone, dropping job"),
                },
                Ok((job, Err(fault))) => {
                    // a fault is treated as a permanent defect, never retried
                    error!(
                        queue = %inner.name,
                        sequence,
                        attempts = job.times_requeued() + 1,
                        %fault,
                        "❌ job faulted, dropping"
                    );
                }
                Err(join_error) => {
                    error!(queue = %inner.name, sequence, %join_error, "❌ job panicked, dropping");
                }
            }

            // release the slot before rechecking the ready list
            drop(permit);
            inner.drain_ready();
        });
    }

    fn stats(&self) -> QueueStats {
        QueueStats {
            name: self.name.clone(),
            total_submitted: self.total_submitted.load(Ordering::Relaxed),
            ready_count: lock(&self.ready).len(),
            delayed_count: lock(&self.delayed).len(),
            active_workers: self
                .max_workers
                .saturating_sub(self.worker_slots.available_permits()),
        }
    }
}

impl Readmit for PoolInner {
    fn readmit(&self, mut job: Job) {
        let delay = job.bump_backoff(POOL_RETRY_DELAY_CAP);
        debug!(
            queue = %self.name,
            sequence = job.sequence(),
            attempt = job.times_requeued(),
            retry_in = ?delay,
            "🔁 job requeued after transient failure"
        );
        lock(&self.delayed).push(job);
    }
}

/// Moves delayed jobs whose wake time has elapsed back into the ready path,
/// then sleeps until the soonest remaining deadline. The delayed set is
/// scanned, not ordered; no retry-ordering guarantee exists between jobs.
async fn reaper_loop(inner: Arc<PoolInner>, mut shutdown: watch::Receiver<bool>) {
    debug!(queue = %inner.name, "⏰ retry reaper started");
    loop {
        if *shutdown.borrow() {
            break;
        }

        let now = Instant::now();
        let due = {
            let mut delayed = lock(&inner.delayed);
            let mut due = Vec::new();
            let mut index = 0;
            while index < delayed.len() {
                if delayed[index].ready_at() < now {
                    due.push(delayed.swap_remove(index));
                } else {
                    index += 1;
                }
            }
            due
        };

        if !due.is_empty() {
            debug!(queue = %inner.name, count = due.len(), "⏰ re-admitting delayed jobs");
            {
                let mut ready = lock(&inner.ready);
                for job in due {
                    ready.push_back(job);
                }
            }
            inner.drain_ready();
        }

        let sleep_for = {
            let delayed = lock(&inner.delayed);
            match delayed.iter().map(|job| job.ready_at()).min() {
                Some(soonest) => soonest
                    .saturating_duration_since(Instant::now())
                    .clamp(REAPER_MIN_SLEEP, REAPER_MAX_SLEEP),
                None => REAPER_IDLE_SLEEP,
            }
        };

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(sleep_for) => {}
        }
    }
    debug!(queue = %inner.name, "⏰ retry reaper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn queue(name: &str, max_workers: usize, registry: &Arc<SchedulerRegistry>) -> Arc<PoolQueue> {
        PoolQueue::new(
            PoolQueueConfig {
                name: name.to_string(),
                max_workers,
            },
            registry,
        )
    }

    async fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let started = Instant::now();
        while started.elapsed() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    #[tokio::test]
    async fn test_jobs_waiting_behind_one_worker_run_in_fifo_order() {
        let registry = SchedulerRegistry::new();
        let queue = queue("fifo", 1, &registry);
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in 1..=5u32 {
            let order = Arc::clone(&order);
            queue.submit_with(0.0, move || {
                order.lock().unwrap().push(tag);
                std::thread::sleep(Duration::from_millis(5));
                Ok(JobOutcome::Completed)
            });
        }

        assert!(wait_until(Duration::from_secs(3), || order.lock().unwrap().len() == 5).await);
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_concurrent_executions_never_exceed_max_workers() {
        let registry = SchedulerRegistry::new();
        let queue = queue("bounded", 3, &registry);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            let done = Arc::clone(&done);
            queue.submit_with(0.0, move || {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(30));
                running.fetch_sub(1, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
                Ok(JobOutcome::Completed)
            });
        }

        assert!(wait_until(Duration::from_secs(5), || done.load(Ordering::SeqCst) == 10).await);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_transient_failures_retry_until_success() {
        let registry = SchedulerRegistry::new();
        let queue = queue("retry", 2, &registry);
        let attempts = Arc::new(AtomicUsize::new(0));

        let job_attempts = Arc::clone(&attempts);
        let job = Job::new(0.0, move || {
            let n = job_attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= 2 {
                Ok(JobOutcome::Retry)
            } else {
                Ok(JobOutcome::Completed)
            }
        })
        .with_base_delay(Duration::from_millis(100));
        queue.submit(job);

        assert!(wait_until(Duration::from_secs(5), || attempts.load(Ordering::SeqCst) == 3).await);

        // no further attempts and nothing left behind in either set
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        let stats = queue.stats();
        assert_eq!(stats.ready_count, 0);
        assert_eq!(stats.delayed_count, 0);
    }

    #[tokio::test]
    async fn test_faulted_jobs_are_dropped_not_retried() {
        let registry = SchedulerRegistry::new();
        let queue = queue("fault", 1, &registry);
        let attempts = Arc::new(AtomicUsize::new(0));

        let job_attempts = Arc::clone(&attempts);
        queue.submit_with(0.0, move || {
            job_attempts.fetch_add(1, Ordering::SeqCst);
            Err("simulated defect".into())
        });

        assert!(wait_until(Duration::from_secs(2), || attempts.load(Ordering::SeqCst) == 1).await);
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(queue.stats().delayed_count, 0);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_accepted_but_never_dispatched() {
        let registry = SchedulerRegistry::new();
        let queue = queue("post-shutdown", 2, &registry);
        registry.shutdown();

        let attempts = Arc::new(AtomicUsize::new(0));
        let job_attempts = Arc::clone(&attempts);
        queue.submit_with(0.0, move || {
            job_attempts.fetch_add(1, Ordering::SeqCst);
            Ok(JobOutcome::Completed)
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
        let stats = queue.stats();
        assert_eq!(stats.ready_count, 1);
        assert_eq!(stats.total_submitted, 1);
        assert_eq!(stats.active_workers, 0);
    }

    #[tokio::test]
    async fn test_stats_reflect_submissions() {
        let registry = SchedulerRegistry::new();
        let queue = queue("stats", 2, &registry);

        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let done = Arc::clone(&done);
            queue.submit_with(0.0, move || {
                done.fetch_add(1, Ordering::SeqCst);
                Ok(JobOutcome::Completed)
            });
        }

        assert!(wait_until(Duration::from_secs(2), || done.load(Ordering::SeqCst) == 4).await);
        assert!(
            wait_until(Duration::from_secs(2), || queue.stats().active_workers == 0).await
        );
        let stats = queue.stats();
        assert_eq!(stats.total_submitted, 4);
        assert_eq!(stats.ready_count, 0);
        assert_eq!(stats.delayed_count, 0);
    }
}
