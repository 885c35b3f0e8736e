use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use super::job::{Job, JobOutcome, JobResult, Readmit};
use super::lock;
use super::registry::{SchedulerQueue, SchedulerRegistry};
use super::types::{DrainReport, PullQueueConfig, QueueStats};

/// Retry delay ceiling for pull-driven jobs; these tolerate longer latency
/// than pool-driven work, so the cap is wider.
pub const PULL_RETRY_DELAY_CAP: Duration = Duration::from_millis(5000);

/// Default iteration ceiling per `drain` call
pub const DEFAULT_MAX_DRAIN_ITERATIONS: usize = 100;

/// A queue with no worker pool of its own: a latency-sensitive caller (a
/// render-loop tick, typically) periodically drains up to a cost budget, and
/// ready jobs execute synchronously on the caller's thread.
///
/// `drain` is a plain method on purpose; no Tokio runtime is required to call
/// it.
pub struct PullQueue {
    inner: Arc<PullInner>,
    registry: Arc<SchedulerRegistry>,
    max_drain_iterations: usize,
}

struct PullInner {
    name: String,
    /// Single arrival-ordered list; readiness is per job, so delayed retries
    /// live here too rather than in a separate set.
    jobs: Mutex<VecDeque<Job>>,
    total_submitted: AtomicU64,
}

impl PullQueue {
    pub fn new(config: PullQueueConfig, registry: &Arc<SchedulerRegistry>) -> Arc<Self> {
        let inner = Arc::new(PullInner {
            name: config.name,
            jobs: Mutex::new(VecDeque::new()),
            total_submitted: AtomicU64::new(0),
        });
        let queue = Arc::new(Self {
            inner,
            registry: Arc::clone(registry),
            max_drain_iterations: config.max_drain_iterations.max(1),
        });
        let as_dyn: Arc<dyn SchedulerQueue> = queue.clone();
        registry.register(&as_dyn);

        info!(queue = %queue.inner.name, "🚀 pull queue started");
        queue
    }

    /// Accept a job; it waits for the next `drain` call, nothing dispatches
    /// here. Never fails.
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
        lock(&self.inner.jobs).push_back(job);
    }

    /// Convenience wrapper: submit a bare callable as a job
    pub fn submit_with<F>(&self, priority: f32, op: F)
    where
        F: FnMut() -> JobResult + Send + 'static,
    {
        self.submit(Job::new(priority, op));
    }

    /// Drain with the configured iteration ceiling
    pub fn drain(&self, cost_budget: u32) -> DrainReport {
        self.drain_with_limit(cost_budget, self.max_drain_iterations)
    }

    /// Execute ready jobs on the calling thread until the cost budget is
    /// spent, the iteration ceiling is hit, or no ready job remains.
    ///
    /// Each pass picks the first job in arrival order whose wake time has
    /// elapsed; the list lock is held across that scan-and-remove so the pick
    /// stays atomic under concurrent callers. Finding none stops the call
    /// immediately rather than spinning.
    pub fn drain_with_limit(&self, cost_budget: u32, max_iterations: usize) -> DrainReport {
        let mut report = DrainReport::default();

        loop {
            if report.spent_cost >= cost_budget || report.executed >= max_iterations {
                break;
            }

            let next = {
                let mut jobs = lock(&self.inner.jobs);
                let now = Instant::now();
                let index = jobs.iter().position(|job| job.ready_at() <= now);
                index.and_then(|index| jobs.remove(index))
            };
            let Some(mut job) = next else {
                break;
            };

            report.executed += 1;
            let sequence = job.sequence();
            match job.run() {
                Ok(JobOutcome::Completed) => {
                    report.completed += 1;
                    report.spent_cost += job.cost;
                    debug!(queue = %self.inner.name, sequence, "✅ job completed");
                }
                Ok(JobOutcome::Retry) => {
                    report.retried += 1;
                    if let Some(owner) = job.owner() {
                        owner.readmit(job);
                    }
                }
                Err(fault) => {
                    report.faulted += 1;
                    error!(
                        queue = %self.inner.name,
                        sequence,
                        attempts = job.times_requeued() + 1,
                        %fault,
                        "❌ job faulted, dropping"
                    );
                }
            }
        }

        if report.executed > 0 {
            debug!(
                queue = %self.inner.name,
                executed = report.executed,
                spent_cost = report.spent_cost,
                budget = cost_budget,
                "🔄 drain finished"
            );
        }
        report
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn stats(&self) -> QueueStats {
        self.inner.stats()
    }
}

impl SchedulerQueue for PullQueue {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn stats(&self) -> QueueStats {
        self.inner.stats()
    }
}

impl Drop for PullQueue {
    fn drop(&mut self) {
        self.registry.release(&self.inner.name);
    }
}

impl PullInner {
    fn stats(&self) -> QueueStats {
        let now = Instant::now();
        let jobs = lock(&self.jobs);
        let delayed_count = jobs.iter().filter(|job| job.ready_at() > now).count();
        QueueStats {
            name: self.name.clone(),
            total_submitted: self.total_submitted.load(Ordering::Relaxed),
            ready_count: jobs.len() - delayed_count,
            delayed_count,
            active_workers: 0,
        }
    }
}

impl Readmit for PullInner {
    fn readmit(&self, mut job: Job) {
        let delay = job.bump_backoff(PULL_RETRY_DELAY_CAP);
        debug!(
            queue = %self.name,
            sequence = job.sequence(),
            attempt = job.times_requeued(),
            retry_in = ?delay,
            "🔁 job requeued after transient failure"
        );
        lock(&self.jobs).push_back(job);
    }
}
