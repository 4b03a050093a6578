//! Periodic resource logging for the daemon.
//!
//! Every [`METRICS_INTERVAL`] the daemon logs its memory and CPU usage
//! alongside the number of solutions it holds, warning when memory
//! crosses a threshold. Long-running sync servers accumulate solutions
//! for their whole lifetime, so this is the main signal of growth.

use std::process;
use std::sync::Arc;
use std::time::Duration;

use sysinfo::{Pid, System};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::SolutionRegistry;

/// Memory usage warning threshold in MB.
pub const HIGH_MEMORY_THRESHOLD_MB: u64 = 256;

/// How often to sample metrics.
pub const METRICS_INTERVAL: Duration = Duration::from_secs(60);

/// Snapshot of daemon resource usage.
#[derive(Debug, Clone, Default)]
pub struct ProcessMetrics {
    pub memory_bytes: u64,
    pub cpu_percent: f32,
}

impl ProcessMetrics {
    pub fn memory_mb(&self) -> u64 {
        self.memory_bytes / 1024 / 1024
    }
}

/// Samples this process through `sysinfo`.
pub struct ProcessMonitor {
    system: System,
    pid: Pid,
}

impl ProcessMonitor {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: Pid::from_u32(process::id()),
        }
    }

    /// Refreshes and returns current metrics.
    ///
    /// CPU usage needs a previous refresh as baseline, so the first
    /// sample usually reports 0%.
    pub fn refresh(&mut self) -> ProcessMetrics {
        self.system.refresh_all();

        self.system
            .process(self.pid)
            .map(|p| ProcessMetrics {
                memory_bytes: p.memory(),
                cpu_percent: p.cpu_usage(),
            })
            .unwrap_or_default()
    }
}

impl Default for ProcessMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the metrics logging task; it stops when `cancel_token` fires.
pub fn spawn_monitor_task(
    registry: Arc<SolutionRegistry>,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut monitor = ProcessMonitor::new();
        let mut tick = interval(METRICS_INTERVAL);

        let _ = monitor.refresh();

        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    debug!("Process monitor shutting down");
                    break;
                }

                _ = tick.tick() => {
                    let metrics = monitor.refresh();
                    let solutions = registry.len().await;
                    log_metrics(&metrics, solutions);
                }
            }
        }
    })
}

fn log_metrics(metrics: &ProcessMetrics, solutions: usize) {
    let cpu_percent = format!("{:.1}", metrics.cpu_percent);

    if metrics.memory_mb() > HIGH_MEMORY_THRESHOLD_MB {
        warn!(
            memory_mb = metrics.memory_mb(),
            threshold_mb = HIGH_MEMORY_THRESHOLD_MB,
            cpu_percent,
            solutions,
            "Daemon memory usage above threshold"
        );
    } else {
        info!(
            memory_mb = metrics.memory_mb(),
            cpu_percent,
            solutions,
            "Daemon resource usage"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_mb() {
        let metrics = ProcessMetrics {
            memory_bytes: 300 * 1024 * 1024 + 17,
            cpu_percent: 0.0,
        };
        assert_eq!(metrics.memory_mb(), 300);
    }

    #[test]
    fn test_refresh_reports_own_memory() {
        let mut monitor = ProcessMonitor::new();
        let metrics = monitor.refresh();
        assert!(metrics.memory_bytes > 0);
        assert!(metrics.cpu_percent >= 0.0);
    }

    #[tokio::test]
    async fn test_monitor_task_stops_on_cancel() {
        let cancel_token = CancellationToken::new();
        let handle = spawn_monitor_task(Arc::new(SolutionRegistry::new()), cancel_token.clone());

        cancel_token.cancel();
        tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("monitor stops")
            .expect("monitor task");
    }
}
