use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info, warn};

use work_scheduler::logging::{cleanup_old_logs, init_dual_logging, LogRotation, LoggingConfig};
use work_scheduler::scheduler::{JobOutcome, PoolQueue, PoolQueueConfig, SchedulerRegistry};
use work_scheduler::stats_server::start_stats_server;

/// Scheduler configuration from config.toml
#[derive(Debug, Clone, Deserialize)]
struct SchedulerTomlConfig {
    pub pool_name: Option<String>,
    pub max_workers: Option<usize>,
    pub maintenance_interval_secs: Option<u64>, // how often to run housekeeping jobs (default: 3600)
    pub log_keep_days: Option<u32>,             // days of log files to keep (default: 7)
}

/// Logging configuration from config.toml
#[derive(Debug, Clone, Deserialize)]
struct LoggingTomlConfig {
    pub log_dir: Option<String>,
    pub level_filter: Option<String>,
    pub rotation: Option<String>, // "daily" or "hourly"
    pub console_timestamps: Option<bool>,
    pub file_json_format: Option<bool>,
}

/// Statistics endpoint configuration from config.toml
#[derive(Debug, Clone, Deserialize)]
struct StatsServerTomlConfig {
    pub port: Option<u16>,
}

/// Full TOML configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
struct TomlConfig {
    pub scheduler: Option<SchedulerTomlConfig>,
    pub logging: Option<LoggingTomlConfig>,
    pub stats_server: Option<StatsServerTomlConfig>,
}

fn load_config() -> Result<TomlConfig, Box<dyn std::error::Error + Send + Sync>> {
    match std::fs::read_to_string("config.toml") {
        Ok(raw) => Ok(toml::from_str(&raw)?),
        Err(_) => Ok(TomlConfig::default()),
    }
}

fn logging_config(toml: &Option<LoggingTomlConfig>) -> LoggingConfig {
    let defaults = LoggingConfig::default();
    let Some(toml) = toml else {
        return defaults;
    };
    LoggingConfig {
        log_dir: toml.log_dir.clone().unwrap_or(defaults.log_dir),
        level_filter: toml.level_filter.clone().unwrap_or(defaults.level_filter),
        rotation: match toml.rotation.as_deref() {
            Some("hourly") => LogRotation::Hourly,
            _ => LogRotation::Daily,
        },
        console_timestamps: toml.console_timestamps.unwrap_or(defaults.console_timestamps),
        file_json_format: toml.file_json_format.unwrap_or(defaults.file_json_format),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = load_config()?;
    let logging = logging_config(&config.logging);
    let log_dir = logging.log_dir.clone();
    let _logging_guard = init_dual_logging(logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "🚀 work_scheduler starting"
    );
    if config.scheduler.is_none() {
        warn!("No [scheduler] section in config.toml, using defaults");
    }

    let scheduler = config.scheduler.unwrap_or(SchedulerTomlConfig {
        pool_name: None,
        max_workers: None,
        maintenance_interval_secs: None,
        log_keep_days: None,
    });

    let registry = SchedulerRegistry::new();
    let pool = PoolQueue::new(
        PoolQueueConfig {
            name: scheduler.pool_name.unwrap_or_else(|| "maintenance".to_string()),
            max_workers: scheduler.max_workers.unwrap_or_else(num_cpus::get),
        },
        &registry,
    );

    let stats_port = config
        .stats_server
        .and_then(|s| s.port)
        .unwrap_or(9090);
    tokio::spawn({
        let registry = Arc::clone(&registry);
        async move {
            if let Err(e) = start_stats_server(stats_port, registry).await {
                error!("Statistics server failed: {}", e);
            }
        }
    });

    // Periodic housekeeping through the pool queue itself
    let maintenance_interval =
        Duration::from_secs(scheduler.maintenance_interval_secs.unwrap_or(3600));
    let log_keep_days = scheduler.log_keep_days.unwrap_or(7);
    tokio::spawn({
        let pool = Arc::clone(&pool);
        let mut shutdown = registry.shutdown_signal();
        async move {
            let mut tick = tokio::time::interval(maintenance_interval);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tick.tick() => {
                        let dir = log_dir.clone();
                        pool.submit_with(1.0, move || {
                            cleanup_old_logs(&dir, log_keep_days)?;
                            Ok(JobOutcome::Completed)
                        });
                    }
                }
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("🛑 Shutdown signal received");
    registry.shutdown();

    // grace period: running jobs finish, nothing new dispatches
    tokio::time::sleep(Duration::from_millis(500)).await;
    for stats in registry.snapshot() {
        info!(
            queue = %stats.name,
            total_submitted = stats.total_submitted,
            ready = stats.ready_count,
            delayed = stats.delayed_count,
            "📊 Final queue state"
        );
    }
    info!("👋 work_scheduler stopped");
    Ok(())
}
