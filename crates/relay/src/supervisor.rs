//! Supervisor loop: drives the poller on a fixed interval.
//!
//! `Starting` loads the dedup store and announces startup. `Running` ticks
//! until the shutdown token is cancelled; cancellation is observed between
//! ticks and during the interval sleep, never mid-tick. `Stopping` announces
//! shutdown and persists the store.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use herald_engine::{DedupLimits, DedupStore, HealthTracker, HealthTransition};
use herald_notifier::DeliveryClient;

use crate::mailbox::Mailbox;
use crate::poller::MailboxPoller;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl std::fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SupervisorState::Starting => write!(f, "starting"),
            SupervisorState::Running => write!(f, "running"),
            SupervisorState::Stopping => write!(f, "stopping"),
            SupervisorState::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub poll_interval: Duration,
    pub state_file: PathBuf,
    pub dedup_limits: DedupLimits,
    pub health_failure_threshold: u32,
    /// Shown in lifecycle notifications, e.g. `user@host/INBOX`.
    pub mailbox_label: String,
}

/// Totals over the supervisor's lifetime.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub delivered: u64,
    pub failed: u64,
    pub unhealthy_ticks: u64,
}

pub struct Supervisor<M> {
    poller: MailboxPoller<M>,
    delivery: Arc<DeliveryClient>,
    settings: SupervisorSettings,
    shutdown: CancellationToken,
    state: SupervisorState,
}

impl<M: Mailbox> Supervisor<M> {
    pub fn new(
        poller: MailboxPoller<M>,
        delivery: Arc<DeliveryClient>,
        settings: SupervisorSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            poller,
            delivery,
            settings,
            shutdown,
            state: SupervisorState::Starting,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Run until the shutdown token is cancelled.
    pub async fn run(&mut self) -> RunSummary {
        self.transition(SupervisorState::Starting);
        let mut store =
            DedupStore::load_or_empty(&self.settings.state_file, self.settings.dedup_limits);
        let mut health = HealthTracker::new(self.settings.health_failure_threshold);
        let mut summary = RunSummary::default();

        self.notify(&format!(
            "🟢 Mail relay started\n\nWatching {}",
            self.settings.mailbox_label
        ))
        .await;

        self.transition(SupervisorState::Running);
        while !self.shutdown.is_cancelled() {
            let report = self.poller.tick(&mut store).await;
            summary.ticks += 1;
            summary.delivered += report.delivered as u64;
            summary.failed += report.failed as u64;

            let transition = if report.is_healthy() {
                health.record_success()
            } else {
                summary.unhealthy_ticks += 1;
                health.record_failure()
            };
            self.report_health(transition).await;

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }

        self.transition(SupervisorState::Stopping);
        self.notify("⏹ Mail relay stopped").await;
        if let Err(e) = store.persist() {
            tracing::error!(
                path = %store.path().display(),
                error = %e,
                "Failed to persist dedup state on shutdown"
            );
        }

        self.transition(SupervisorState::Stopped);
        tracing::info!(
            ticks = summary.ticks,
            delivered = summary.delivered,
            failed = summary.failed,
            "Supervisor stopped"
        );
        summary
    }

    async fn report_health(&self, transition: HealthTransition) {
        match transition {
            HealthTransition::Unchanged => {}
            HealthTransition::Degraded {
                consecutive_failures,
            } => {
                self.notify(&format!(
                    "⚠️ Mail relay degraded\n\n{consecutive_failures} consecutive polls failed"
                ))
                .await;
            }
            HealthTransition::Recovered { failed_ticks } => {
                self.notify(&format!(
                    "✅ Mail relay recovered\n\nBack to normal after {failed_ticks} failed polls"
                ))
                .await;
            }
        }
    }

    /// Best-effort operational message; failures are only logged.
    async fn notify(&self, text: &str) {
        if let Err(e) = self.delivery.send(text).await {
            tracing::warn!(error = %e, "Failed to send relay notification");
        }
    }

    fn transition(&mut self, next: SupervisorState) {
        tracing::info!(from = %self.state, to = %next, "Supervisor state change");
        self.state = next;
    }
}
