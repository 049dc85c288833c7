//! Background sweeping of expired cache entries and rate windows
//!
//! `Janitor::sweep_once` can be called by any external scheduler. For
//! long-running processes `JanitorHandle::spawn` runs it on a tokio interval
//! and reports every run on a channel.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cache::{CacheManager, DEFAULT_SWEEP_BATCH};
use crate::rate_limit::RateLimiter;

/// What one sweep removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Expired cache entries deleted
    pub cache_entries: usize,
    /// Expired rate windows deleted
    pub rate_windows: usize,
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "removed {} cache entries and {} rate windows",
            self.cache_entries, self.rate_windows
        )
    }
}

/// Configuration for the background sweep
#[derive(Debug, Clone)]
pub struct JanitorConfig {
    /// Time between sweeps
    pub interval: Duration,
    /// Deletions per store round trip
    pub batch_size: usize,
    /// Whether the background task runs at all
    pub enabled: bool,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(24 * 60 * 60), // daily
            batch_size: DEFAULT_SWEEP_BATCH,
            enabled: true,
        }
    }
}

/// Sweeps the cache and the rate limiter
#[derive(Debug, Clone)]
pub struct Janitor {
    cache: CacheManager,
    limiter: RateLimiter,
    batch_size: usize,
}

impl Janitor {
    /// Creates a janitor deleting at most `batch_size` records per round trip
    pub fn new(cache: CacheManager, limiter: RateLimiter, batch_size: usize) -> Self {
        Self {
            cache,
            limiter,
            batch_size: batch_size.max(1),
        }
    }

    /// Sweeps both stores until no expired records remain
    ///
    /// Each store is swept in batches; a batch that comes back short means
    /// the store is exhausted.
    pub async fn sweep_once(&self) -> SweepReport {
        let mut report = SweepReport::default();

        loop {
            let removed = self.cache.sweep_expired(self.batch_size).await;
            report.cache_entries += removed;
            if removed < self.batch_size {
                break;
            }
        }

        loop {
            let removed = self.limiter.sweep_expired(self.batch_size).await;
            report.rate_windows += removed;
            if removed < self.batch_size {
                break;
            }
        }

        info!(
            cache_entries = report.cache_entries,
            rate_windows = report.rate_windows,
            "Sweep completed"
        );
        report
    }
}

/// Handle for the background sweep task
pub struct JanitorHandle {
    /// One report per completed sweep
    pub receiver: mpsc::Receiver<SweepReport>,
    shutdown_tx: mpsc::Sender<()>,
}

impl JanitorHandle {
    /// Spawns the background sweep task
    ///
    /// # Arguments
    /// * `janitor` - What to sweep
    /// * `config` - Interval and on/off switch; `config.batch_size` replaces the janitor's
    ///
    /// # Returns
    /// A handle whose `receiver` yields a report after every sweep
    pub fn spawn(janitor: Janitor, config: JanitorConfig) -> Self {
        let (report_tx, report_rx) = mpsc::channel(8);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        if config.enabled {
            let janitor = Janitor {
                batch_size: config.batch_size.max(1),
                ..janitor
            };

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(config.interval);
                // Skip the first tick (immediate)
                interval.tick().await;

                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            let report = janitor.sweep_once().await;
                            if report_tx.send(report).await.is_err() {
                                debug!("Sweep report receiver dropped");
                            }
                        }
                        _ = shutdown_rx.recv() => {
                            debug!("Janitor shutting down");
                            break;
                        }
                    }
                }
            });
        }

        Self {
            receiver: report_rx,
            shutdown_tx,
        }
    }

    /// Stops the background task
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}
