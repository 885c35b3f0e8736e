use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Default budget cost charged for a successfully drained job
pub const DEFAULT_JOB_COST: u32 = 1;

/// Default base backoff unit applied after a transient failure
pub const DEFAULT_REQUEUE_BASE_DELAY: Duration = Duration::from_millis(500);

/// Lower bound on any computed retry delay
pub const RETRY_DELAY_FLOOR: Duration = Duration::from_millis(100);

/// Outcome of a single job attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job did its work and can be discarded
    Completed,
    /// Transient failure, run the job again after a backoff delay
    Retry,
}

/// Generic job error type
pub type JobError = Box<dyn std::error::Error + Send + Sync>;

/// Result of one invocation of a job's operation.
///
/// `Err` is a fault: the job is logged and dropped permanently, never retried.
pub type JobResult = Result<JobOutcome, JobError>;

/// Capability to hand a transiently failed job back to its owning queue.
///
/// Queues hand out a `Weak` reference to this at submit time so a job never
/// holds a strong (cyclic) edge back to its queue.
pub(crate) trait Readmit: Send + Sync {
    fn readmit(&self, job: Job);
}

/// A schedulable unit of deferred work.
///
/// A job lives in exactly one place at a time: a queue's ready list, a
/// delayed-retry set, or the execution context currently running it.
/// Ownership moves with it; nothing else touches its retry fields while it
/// executes.
pub struct Job {
    /// Advisory ordering hint, recorded for observability
    pub priority: f32,
    /// Abstract unit charged against a pull-driven drain budget
    pub cost: u32,
    /// Base backoff unit scaled by the number of failed attempts
    pub requeue_base_delay: Duration,
    pub(crate) ready_at: Instant,
    pub(crate) times_requeued: u32,
    pub(crate) sequence: u64,
    pub(crate) owner: Option<Weak<dyn Readmit>>,
    op: Box<dyn FnMut() -> JobResult + Send>,
}

impl Job {
    /// Wrap a callable into a job with default cost and backoff settings
    pub fn new<F>(priority: f32, op: F) -> Self
    where
        F: FnMut() -> JobResult + Send + 'static,
    {
        Self {
            priority,
            cost: DEFAULT_JOB_COST,
            requeue_base_delay: DEFAULT_REQUEUE_BASE_DELAY,
            ready_at: Instant::now(),
            times_requeued: 0,
            sequence: 0,
            owner: None,
            op: Box::new(op),
        }
    }

    /// Override the drain-budget cost
    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }

    /// Override the base backoff unit
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.requeue_base_delay = base_delay;
        self
    }

    /// Number of failed attempts so far
    pub fn times_requeued(&self) -> u32 {
        self.times_requeued
    }

    /// Monotonic audit id, stamped by the queue on first admission
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub(crate) fn ready_at(&self) -> Instant {
        self.ready_at
    }

    /// Reset retry state for a fresh admission and stamp queue identity.
    /// Called exactly once per `submit`; re-admission after failure keeps the
    /// accumulated retry state instead.
    pub(crate) fn admit(&mut self, sequence: u64, owner: Weak<dyn Readmit>) {
        self.ready_at = Instant::now();
        self.times_requeued = 0;
        if self.sequence == 0 {
            self.sequence = sequence;
        }
        self.owner = Some(owner);
    }

    /// Run the job's operation once
    pub(crate) fn run(&mut self) -> JobResult {
        (self.op)()
    }

    pub(crate) fn owner(&self) -> Option<Arc<dyn Readmit>> {
        self.owner.as_ref().and_then(Weak::upgrade)
    }

    /// Apply the capped backoff rule after a transient failure and return the
    /// delay that was chosen: `clamp(base * attempts, floor, cap)`.
    pub(crate) fn bump_backoff(&mut self, cap: Duration) -> Duration {
        self.times_requeued += 1;
        let delay = (self.requeue_base_delay * self.times_requeued).clamp(RETRY_DELAY_FLOOR, cap);
        self.ready_at = Instant::now() + delay;
        delay
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("sequence", &self.sequence)
            .field("priority", &self.priority)
            .field("cost", &self.cost)
            .field("times_requeued", &self.times_requeued)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_defaults() {
        let job = Job::new(1.0, || Ok(JobOutcome::Completed));
        assert_eq!(job.cost, DEFAULT_JOB_COST);
        assert_eq!(job.requeue_base_delay, DEFAULT_REQUEUE_BASE_DELAY);
        assert_eq!(job.times_requeued(), 0);
        assert_eq!(job.sequence(), 0);
    }

    #[test]
    fn test_backoff_is_monotonic_and_capped() {
        let cap = Duration::from_millis(2000);
        let mut job = Job::new(0.0, || Ok(JobOutcome::Retry));
        let mut previous = Duration::ZERO;
        for _ in 0..10 {
            let delay = job.bump_backoff(cap);
            assert!(delay >= previous, "backoff must not shrink between attempts");
            assert!(delay >= RETRY_DELAY_FLOOR);
            assert!(delay <= cap);
            previous = delay;
        }
        assert_eq!(previous, cap);
    }

    #[test]
    fn test_backoff_respects_floor_for_tiny_base() {
        let mut job = Job::new(0.0, || Ok(JobOutcome::Retry)).with_base_delay(Duration::from_millis(1));
        let delay = job.bump_backoff(Duration::from_millis(5000));
        assert_eq!(delay, RETRY_DELAY_FLOOR);
    }

    #[test]
    fn test_retry_twice_then_succeed_counts_attempts() {
        // execute() returns Retry exactly twice, then Completed: three
        // invocations total with two recorded requeues.
        let mut calls = 0u32;
        let mut job = Job::new(0.0, move || {
            calls += 1;
            if calls <= 2 {
                Ok(JobOutcome::Retry)
            } else {
                Ok(JobOutcome::Completed)
            }
        });

        let mut invocations = 0;
        loop {
            invocations += 1;
            match job.run() {
                Ok(JobOutcome::Completed) => break,
                Ok(JobOutcome::Retry) => {
                    job.bump_backoff(Duration::from_millis(2000));
                }
                Err(fault) => panic!("unexpected fault: {fault}"),
            }
        }

        assert_eq!(invocations, 3);
        assert_eq!(job.times_requeued(), 2);
    }

    #[test]
    fn test_admit_resets_retry_state_but_keeps_sequence() {
        let mut job = Job::new(0.0, || Ok(JobOutcome::Completed));
        job.bump_backoff(Duration::from_millis(2000));
        assert_eq!(job.times_requeued(), 1);

        struct NoopSink;
        impl Readmit for NoopSink {
            fn readmit(&self, _job: Job) {}
        }
        let sink: Arc<dyn Readmit> = Arc::new(NoopSink);

        job.admit(7, Arc::downgrade(&sink));
        assert_eq!(job.sequence(), 7);
        assert_eq!(job.times_requeued(), 0);
        assert!(job.ready_at() <= Instant::now());

        // a second admission must not reassign the audit id
        job.admit(9, Arc::downgrade(&sink));
        assert_eq!(job.sequence(), 7);
    }
}
