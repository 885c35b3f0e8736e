use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::pull_queue::DEFAULT_MAX_DRAIN_ITERATIONS;

/// Pool-driven queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolQueueConfig {
    /// Queue name, used as the statistics key in the registry
    pub name: String,
    /// Upper bound on concurrently executing jobs
    pub max_workers: usize,
}

impl Default for PoolQueueConfig {
    fn default() -> Self {
        Self {
            name: "pool".to_string(),
            max_workers: num_cpus::get(),
        }
    }
}

/// Pull-driven queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullQueueConfig {
    /// Queue name, used as the statistics key in the registry
    pub name: String,
    /// Iteration ceiling for `drain`, guarding against zero-cost job loops
    pub max_drain_iterations: usize,
}

impl Default for PullQueueConfig {
    fn default() -> Self {
        Self {
            name: "pull".to_string(),
            max_drain_iterations: DEFAULT_MAX_DRAIN_ITERATIONS,
        }
    }
}

/// Read-only statistics snapshot for a single queue.
///
/// Counters are sampled field by field, not as one atomic view; the snapshot
/// is for observability only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub name: String,
    pub total_submitted: u64,
    pub ready_count: usize,
    pub delayed_count: usize,
    pub active_workers: usize,
}

/// Aggregate snapshot across every registered queue, keyed by queue name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub queues: BTreeMap<String, QueueStats>,
}

/// Summary of one `drain` call on a pull-driven queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Jobs whose operation was invoked during this call
    pub executed: usize,
    /// Jobs that completed successfully
    pub completed: usize,
    /// Jobs that reported transient failure and were requeued
    pub retried: usize,
    /// Jobs that faulted and were dropped
    pub faulted: usize,
    /// Budget consumed by the completed jobs
    pub spent_cost: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_default_tracks_cpu_count() {
        let config = PoolQueueConfig::default();
        assert_eq!(config.name, "pool");
        assert!(config.max_workers >= 1);
    }

    #[test]
    fn test_queue_stats_serializes_for_the_stats_endpoint() {
        let stats = QueueStats {
            name: "render".to_string(),
            total_submitted: 42,
            ready_count: 3,
            delayed_count: 1,
            active_workers: 2,
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"total_submitted\":42"));
        assert!(json.contains("\"render\""));
    }
}
