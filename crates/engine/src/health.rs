//! Health tracker: counts consecutive failed ticks.
//!
//! Only a streak of `threshold` failed ticks
//! degrades the relay. The first healthy tick after that recovers it.

/// State change produced by recording a tick outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTransition {
    /// Nothing to report.
    Unchanged,
    /// The failure streak just reached the threshold.
    Degraded { consecutive_failures: u32 },
    /// First healthy tick after being degraded.
    Recovered { failed_ticks: u32 },
}

/// In-memory consecutive failure counter.
#[derive(Debug)]
pub struct HealthTracker {
    threshold: u32,
    consecutive_failures: u32,
    degraded: bool,
}

impl HealthTracker {
    /// A threshold of zero is treated as one.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive_failures: 0,
            degraded: false,
        }
    }

    pub fn record_failure(&mut self) -> HealthTransition {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        if !self.degraded && self.consecutive_failures >= self.threshold {
            self.degraded = true;
            tracing::warn!(
                consecutive_failures = self.consecutive_failures,
                threshold = self.threshold,
                "Relay degraded"
            );
            return HealthTransition::Degraded {
                consecutive_failures: self.consecutive_failures,
            };
        }

        HealthTransition::Unchanged
    }

    pub fn record_success(&mut self) -> HealthTransition {
        let failed_ticks = std::mem::take(&mut self.consecutive_failures);

        if std::mem::take(&mut self.degraded) {
            tracing::info!(failed_ticks, "Relay recovered");
            return HealthTransition::Recovered { failed_ticks };
        }

        HealthTransition::Unchanged
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(5)
    }
}
