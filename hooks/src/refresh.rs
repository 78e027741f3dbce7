//! Periodic re-triggering of a refresh function.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::error::RefreshError;

type RefreshFn = Arc<dyn Fn() + Send + Sync>;

/// Calls a refresh function every `interval` while running.
///
/// The first call happens one full interval after arming, never
/// immediately. At most one timer is live: starting again replaces the
/// previous timer, and dropping the scheduler stops it.
#[derive(Default)]
pub struct RefreshScheduler {
    config: Option<(Duration, RefreshFn)>,
    handle: Option<JoinHandle<()>>,
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scheduler for `refresh` that is armed right away only if `enabled`.
    /// A disabled scheduler keeps its configuration for [`Self::resume`].
    pub fn periodic<F>(
        interval: Duration,
        refresh: F,
        enabled: bool,
    ) -> Result<Self, RefreshError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if interval.is_zero() {
            return Err(RefreshError::ZeroInterval);
        }
        let mut scheduler = Self {
            config: Some((interval, Arc::new(refresh))),
            handle: None,
        };
        if enabled {
            scheduler.resume();
        }
        Ok(scheduler)
    }

    /// Replace any existing schedule with one calling `refresh` every
    /// `interval`.
    pub fn start<F>(
        &mut self,
        interval: Duration,
        refresh: F,
    ) -> Result<(), RefreshError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if interval.is_zero() {
            return Err(RefreshError::ZeroInterval);
        }
        self.config = Some((interval, Arc::new(refresh)));
        self.resume();
        Ok(())
    }

    /// Re-arm the last configured schedule. Does nothing if the scheduler
    /// was never configured.
    pub fn resume(&mut self) {
        self.stop();
        let Some((interval, refresh)) = self.config.clone() else {
            return;
        };

        tracing::info!(interval_ms = interval.as_millis(), "starting refresh");
        self.handle = Some(tokio::spawn(async move {
            let start = Instant::now() + interval;
            let mut ticker = time::interval_at(start, interval);
            loop {
                ticker.tick().await;
                tracing::trace!("refresh tick");
                refresh();
            }
        }));
    }

    /// Stop the active timer, if any. Idempotent.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::info!("stopped refresh");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    pub fn interval(&self) -> Option<Duration> {
        self.config.as_ref().map(|(interval, _)| *interval)
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
