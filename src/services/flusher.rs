//! Periodic flush driver
//!
//! The engine itself never schedules anything; this service owns the
//! cadence. Each tick flushes every pending market, and a cycle that
//! finds nothing to do is free.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::trader::Trader;

/// Configuration for the trade flusher
#[derive(Debug, Clone)]
pub struct FlusherConfig {
    /// Interval between flush cycles (seconds)
    pub interval_secs: u64,
}

impl Default for FlusherConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

/// Background service invoking [`Trader::flush_all`] on an interval
pub struct TradeFlusher {
    trader: Arc<Trader>,
    config: FlusherConfig,
    running: Arc<AtomicBool>,
}

impl TradeFlusher {
    pub fn new(trader: Arc<Trader>, config: FlusherConfig) -> Self {
        Self {
            trader,
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the flush loop
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Trade flusher already running");
            return;
        }

        info!("Starting trade flusher (interval: {}s)", self.config.interval_secs);

        let trader = self.trader.clone();
        let running = self.running.clone();
        let interval_secs = self.config.interval_secs;

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_secs(interval_secs));

            while running.load(Ordering::SeqCst) {
                interval.tick().await;
                trader.flush_all().await;
            }

            info!("Trade flusher stopped");
        });
    }

    /// Stop the flush loop after the current cycle
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        info!("Trade flusher stop requested");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
