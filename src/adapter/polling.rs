//! Cancellable polling scan driver
//!
//! Re-runs a finite extraction scan on a cadence and reports the freshest
//! candidate to the coordinator. The task is keyed to a cancellation token
//! rather than running as a bare timer, so ending an episode actually stops
//! the polling tied to it.

use super::{BlockSource, CancellationToken};
use crate::coordinator::CoordinatorHandle;
use crate::extract::{ExtractionEngine, OtpCandidate};
use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Polling cadence.
#[derive(Debug, Clone, Copy)]
pub struct ScannerConfig {
    pub interval: Duration,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
        }
    }
}

/// Periodic scan task over a block source.
pub struct PollingScanner {
    engine: ExtractionEngine,
    source: Arc<dyn BlockSource>,
    coordinator: CoordinatorHandle,
    config: ScannerConfig,
}

impl PollingScanner {
    pub fn new(
        engine: ExtractionEngine,
        source: Arc<dyn BlockSource>,
        coordinator: CoordinatorHandle,
    ) -> Self {
        Self {
            engine,
            source,
            coordinator,
            config: ScannerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ScannerConfig) -> Self {
        self.config = config;
        self
    }

    /// Spawn the scan loop. The token stops it at the next tick.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if cancel.is_cancelled() {
                break;
            }
            match self.scan_once().await {
                Some(candidate) => {
                    let code = candidate.code.clone();
                    match self.coordinator.report_candidate(candidate).await {
                        Ok(accepted) => debug!(code = %code, accepted, "scan reported a candidate"),
                        // Coordinator gone; no point polling further.
                        Err(_) => break,
                    }
                }
                // Nothing visible: nudge the surface to refresh itself.
                None => self.source.refresh().await,
            }
        }
        debug!("scan loop stopped");
    }

    /// One finite scan: extract from every visible block, keep the
    /// freshest candidate. Unknown timestamps sort last.
    pub async fn scan_once(&self) -> Option<OtpCandidate> {
        let blocks = self.source.fetch_blocks().await;
        let mut candidates: Vec<OtpCandidate> = blocks
            .iter()
            .filter_map(|block| self.engine.extract(block))
            .collect();
        candidates.sort_by_key(|c| Reverse(c.source_timestamp));
        candidates.into_iter().next()
    }
}
