use std::time::Duration;
use tokio::time::Instant;

/// Severity of the current failure streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    /// Failing, but for less than the unhealthy threshold.
    Degraded,
    Unhealthy,
}

/// Tracks how long a loop has been failing consecutively so transient errors are reported as
/// warnings and only a sustained streak escalates to an error.
#[derive(Debug)]
pub struct HealthCounter {
    component: &'static str,
    unhealthy_after: Duration,
    failing_since: Option<Instant>,
    consecutive_failures: u64,
    reported_unhealthy: bool,
}

impl HealthCounter {
    pub fn new(component: &'static str, unhealthy_after: Duration) -> Self {
        Self {
            component,
            unhealthy_after,
            failing_since: None,
            consecutive_failures: 0,
            reported_unhealthy: false,
        }
    }

    pub fn record_failure(&mut self, error: &anyhow::Error) -> Health {
        let now = Instant::now();
        let since = *self.failing_since.get_or_insert(now);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let failing_for = now.saturating_duration_since(since);

        if failing_for >= self.unhealthy_after {
            self.reported_unhealthy = true;
            tracing::error!(
                component = self.component,
                failures = self.consecutive_failures,
                failing_for_ms = failing_for.as_millis() as u64,
                error = %format!("{error:#}"),
                "component unhealthy"
            );
            Health::Unhealthy
        } else {
            tracing::warn!(
                component = self.component,
                failures = self.consecutive_failures,
                error = %format!("{error:#}"),
                "transient failure; retrying"
            );
            Health::Degraded
        }
    }

    pub fn record_success(&mut self) {
        if self.failing_since.take().is_none() {
            return;
        }

        if self.reported_unhealthy {
            tracing::info!(
                component = self.component,
                failures = self.consecutive_failures,
                "component recovered"
            );
        }
        self.consecutive_failures = 0;
        self.reported_unhealthy = false;
    }

    pub fn health(&self) -> Health {
        match self.failing_since {
            None => Health::Healthy,
            Some(since) if since.elapsed() >= self.unhealthy_after => Health::Unhealthy,
            Some(_) => Health::Degraded,
        }
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures
    }
}
