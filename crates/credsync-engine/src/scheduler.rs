//! Single-flight scheduler.
//!
//! Drives the orchestrator on a timer and on manual/webhook triggers. At
//! most one cycle runs at any time, enforced by an atomic flag this
//! module alone owns: ticks finding the flag held are skipped (never
//! queued), manual triggers get a distinct in-progress signal, and the
//! flag is released on every exit path by a scoped guard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::interval;
use tracing::{debug, info, instrument, warn};

use credsync_connector::{BrokerAdmin, IdentityProvider};

use crate::audit::{AuditStore, TriggerSource};
use crate::orchestrator::{CycleError, CycleSummary, ReconciliationOrchestrator};

/// Why a trigger request did not complete a cycle.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// A cycle is already in flight; try again shortly.
    #[error("a reconciliation cycle is already in progress")]
    InProgress,

    /// The cycle ran and failed.
    #[error(transparent)]
    Cycle(#[from] CycleError),
}

/// Scoped holder of the running flag; releases on drop, so the flag is
/// cleared on every exit path including panics.
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
            .then_some(Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Timer- and trigger-driven front door to the orchestrator.
pub struct SyncScheduler<I, B, S> {
    orchestrator: Arc<ReconciliationOrchestrator<I, B, S>>,
    tick_interval: Duration,
    running: AtomicBool,
    shutdown: AtomicBool,
}

impl<I, B, S> SyncScheduler<I, B, S>
where
    I: IdentityProvider,
    B: BrokerAdmin,
    S: AuditStore,
{
    /// Create a new scheduler.
    pub fn new(
        orchestrator: Arc<ReconciliationOrchestrator<I, B, S>>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            orchestrator,
            tick_interval,
            running: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Whether a cycle is currently in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start one cycle on operator request.
    pub async fn trigger_manual(&self) -> Result<CycleSummary, TriggerError> {
        self.trigger(TriggerSource::Manual).await
    }

    /// Start one cycle on a webhook notification.
    pub async fn trigger_webhook(&self) -> Result<CycleSummary, TriggerError> {
        self.trigger(TriggerSource::Webhook).await
    }

    /// Start one cycle with an explicit trigger source.
    ///
    /// Fails immediately with [`TriggerError::InProgress`] when a cycle
    /// is already running; callers can distinguish "try again shortly"
    /// from a broken cycle.
    pub async fn trigger(&self, trigger: TriggerSource) -> Result<CycleSummary, TriggerError> {
        let _guard = RunGuard::acquire(&self.running).ok_or(TriggerError::InProgress)?;
        let summary = self.orchestrator.run_cycle(trigger).await?;
        Ok(summary)
    }

    /// Run the timer loop until [`stop`](Self::stop) is called.
    ///
    /// Ticks that land while a cycle is in flight are skipped, not
    /// backlogged.
    #[instrument(skip(self))]
    pub async fn run(&self) {
        info!(
            interval_secs = self.tick_interval.as_secs(),
            "sync scheduler started"
        );

        let mut ticker = interval(self.tick_interval);
        // The first tick fires immediately; consume it so the first cycle
        // lands one full interval after startup.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            let Some(_guard) = RunGuard::acquire(&self.running) else {
                debug!("tick skipped: cycle already in progress");
                continue;
            };

            match self.orchestrator.run_cycle(TriggerSource::Timer).await {
                Ok(summary) => {
                    debug!(
                        correlation_id = %summary.correlation_id,
                        items_total = summary.items_total,
                        "scheduled cycle completed"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "scheduled cycle failed; retrying at next tick");
                }
            }
        }

        info!("sync scheduler stopped");
    }

    /// Request the timer loop to stop after the current tick.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}
