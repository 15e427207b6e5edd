//! Periodic refresh driver.
//!
//! [`RefreshScheduler`] owns the repeating timer that keeps the registry
//! fresh. It is started and stopped explicitly and stops itself when
//! dropped, so the timer never outlives whoever owns it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use wled_core::{CoordinatorConfig, MockClient, RefreshCoordinator, RefreshScheduler, Registry};
//!
//! # async fn example() {
//! let coordinator = Arc::new(RefreshCoordinator::new(
//!     Arc::new(Registry::in_memory()),
//!     Arc::new(MockClient::new()),
//!     CoordinatorConfig::default(),
//! ));
//!
//! let mut scheduler = RefreshScheduler::new(coordinator, Duration::from_secs(30));
//! scheduler.start();
//! // ...
//! scheduler.stop().await;
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::coordinator::RefreshCoordinator;

/// Default time between periodic refreshes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Triggers a periodic refresh on a fixed interval.
pub struct RefreshScheduler {
    coordinator: Arc<RefreshCoordinator>,
    period: Duration,
    scan_on_start: bool,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("period", &self.period)
            .field("scan_on_start", &self.scan_on_start)
            .field("running", &self.is_running())
            .finish()
    }
}

impl RefreshScheduler {
    /// Create a stopped scheduler. A zero period is raised to one second.
    pub fn new(coordinator: Arc<RefreshCoordinator>, period: Duration) -> Self {
        Self {
            coordinator,
            period: period.max(Duration::from_secs(1)),
            scan_on_start: false,
            cancel: CancellationToken::new(),
            handle: None,
        }
    }

    /// Run one scan-and-refresh in the background when started.
    pub fn scan_on_start(mut self, scan: bool) -> Self {
        self.scan_on_start = scan;
        self
    }

    /// Time between ticks.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether the timer task is running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Start the timer. The first tick fires one full period from now.
    ///
    /// Does nothing if already running. Must be called from within a tokio
    /// runtime.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        self.cancel = CancellationToken::new();

        let coordinator = Arc::clone(&self.coordinator);
        let cancel = self.cancel.clone();
        let period = self.period;
        let scan_on_start = self.scan_on_start;

        self.handle = Some(tokio::spawn(async move {
            if scan_on_start {
                let coordinator = Arc::clone(&coordinator);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        result = coordinator.scan_and_refresh() => {
                            if let Err(e) = result {
                                warn!("Initial scan failed: {}", e);
                            }
                        }
                    }
                });
            }

            let mut ticks = interval_at(Instant::now() + period, period);
            // A tick that fires late must not cause a burst of catch-up ticks.
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!("Refresh scheduler started, period {:?}", period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Refresh scheduler cancelled, shutting down");
                        break;
                    }
                    _ = ticks.tick() => {
                        let started = coordinator.trigger_periodic().await;
                        debug!("Periodic tick started {} refresh(es)", started);
                    }
                }
            }
        }));
    }

    /// Stop the timer and wait for it to exit.
    ///
    /// Refreshes already started keep running and apply their results.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
            && e.is_panic()
        {
            warn!("Refresh scheduler task panicked: {}", e);
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
