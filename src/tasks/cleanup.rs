//! Cache Janitor Task
//!
//! Background task that periodically purges expired entries from both tiers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::{CleanupReport, TieredCache};

/// Spawns the janitor, running `TieredCache::cleanup` every `interval`.
///
/// The first cycle runs one interval after spawning. A failed cycle is logged
/// and the next tick runs as usual. A cycle never starts while another one
/// (scheduled or triggered through [`JanitorHandle::run_now`]) is running.
///
/// # Example
/// ```ignore
/// let cache = Arc::new(TieredCache::from_config(&config));
/// let janitor = spawn_janitor(cache.clone(), config.cleanup_interval);
/// // Later, during shutdown:
/// janitor.shutdown().await;
/// ```
pub fn spawn_janitor(cache: Arc<TieredCache>, interval: Duration) -> JanitorHandle {
    let interval = interval.max(Duration::from_millis(1));
    let (shutdown, mut shutdown_rx) = watch::channel(false);
    let runner = CycleRunner {
        cache,
        running: Arc::new(AtomicBool::new(false)),
    };

    let task_runner = runner.clone();
    let task = tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "Starting cache janitor");

        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    task_runner.run().await;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Cache janitor stopped");
    });

    JanitorHandle {
        shutdown,
        task: Some(task),
        runner,
    }
}

// == Janitor Handle ==
/// Owner of the janitor task. Dropping it aborts the task.
#[derive(Debug)]
pub struct JanitorHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    runner: CycleRunner,
}

impl JanitorHandle {
    /// Stops the janitor, letting an in-progress cycle finish first.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "Cache janitor ended abnormally");
            }
        }
    }

    /// Runs one cycle now. Returns `None` if a cycle is already running or the
    /// cycle failed.
    pub async fn run_now(&self) -> Option<CleanupReport> {
        self.runner.run().await
    }

    pub fn is_cycle_running(&self) -> bool {
        self.runner.running.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for JanitorHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[derive(Debug, Clone)]
struct CycleRunner {
    cache: Arc<TieredCache>,
    running: Arc<AtomicBool>,
}

impl CycleRunner {
    async fn run(&self) -> Option<CleanupReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Previous janitor cycle still running, skipping");
            return None;
        }
        let _running = RunningFlag(&self.running);

        match self.cache.cleanup().await {
            Ok(report) => {
                if report.total() > 0 {
                    info!(
                        memory_removed = report.memory_removed,
                        disk_removed = report.disk_removed,
                        "Janitor removed expired entries"
                    );
                } else {
                    debug!("Janitor found no expired entries");
                }
                Some(report)
            }
            Err(err) => {
                warn!(error = %err, "Janitor cycle failed");
                None
            }
        }
    }
}

/// Clears the in-progress flag when a cycle ends, even if it is cancelled.
struct RunningFlag<'a>(&'a AtomicBool);

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{DiskStore, MemoryStore};
    use tempfile::TempDir;

    fn cache(dir: &TempDir) -> Arc<TieredCache> {
        Arc::new(TieredCache::new(
            MemoryStore::default(),
            DiskStore::new(dir.path()),
        ))
    }

    #[tokio::test]
    async fn test_janitor_removes_expired_entries() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        cache
            .set("expire_soon", "value", Some(Duration::from_millis(1)))
            .await
            .unwrap();

        let janitor = spawn_janitor(cache.clone(), Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(250)).await;

        // Inspect raw keys so lazy expiry on lookup cannot mask the result
        assert!(cache.memory_keys().is_empty());
        assert!(cache.disk().keys().await.is_empty());

        janitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_janitor_preserves_valid_entries() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        cache
            .set("long_lived", "value", Some(Duration::from_secs(3600)))
            .await
            .unwrap();

        let janitor = spawn_janitor(cache.clone(), Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(
            cache.get::<String>("long_lived").await.unwrap().as_deref(),
            Some("value")
        );

        janitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_task() {
        let dir = TempDir::new().unwrap();
        let janitor = spawn_janitor(cache(&dir), Duration::from_secs(3600));

        assert!(!janitor.is_finished());
        tokio::time::timeout(Duration::from_secs(1), janitor.shutdown())
            .await
            .expect("Shutdown should not wait for the next tick");
    }

    #[tokio::test]
    async fn test_run_now_reports_removals() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        cache
            .set("gone", &1, Some(Duration::from_millis(1)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let janitor = spawn_janitor(cache, Duration::from_secs(3600));
        let report = janitor.run_now().await.unwrap();

        assert_eq!(
            report,
            CleanupReport {
                memory_removed: 1,
                disk_removed: 1,
            }
        );
        assert!(!janitor.is_cycle_running());
    }

    #[tokio::test]
    async fn test_overlapping_cycle_is_skipped() {
        let dir = TempDir::new().unwrap();
        let janitor = spawn_janitor(cache(&dir), Duration::from_secs(3600));

        janitor.runner.running.store(true, Ordering::Release);
        assert!(janitor.run_now().await.is_none());

        janitor.runner.running.store(false, Ordering::Release);
        assert!(janitor.run_now().await.is_some());
    }

    #[tokio::test]
    async fn test_failed_cycle_does_not_stop_janitor() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let cache = Arc::new(TieredCache::new(
            MemoryStore::default(),
            DiskStore::new(&blocker),
        ));

        let janitor = spawn_janitor(cache, Duration::from_millis(20));
        assert!(janitor.run_now().await.is_none());
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!janitor.is_finished());
        janitor.shutdown().await;
    }
}
