use super::adapter::Adapter;
use super::health::HealthCounter;
use super::{pause, Step};
use crate::runtime::config::SyncConfig;
use crate::runtime::fatal::ContractViolation;
use crate::runtime::telemetry::Telemetry;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Steady-state follower of final data: one block at a time, never ahead of the finalized
/// frontier.
pub struct FinalizedPoller<A: Adapter> {
    adapter: Arc<A>,
    config: SyncConfig,
    telemetry: Arc<Telemetry>,
    next_block_number: u64,
}

impl<A: Adapter> FinalizedPoller<A> {
    pub fn new(adapter: Arc<A>, config: SyncConfig, next_block_number: u64) -> Self {
        Self {
            adapter,
            config,
            telemetry: Arc::new(Telemetry::default()),
            next_block_number,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn next_block_number(&self) -> u64 {
        self.next_block_number
    }

    /// Polls until cancelled. Only a contract violation (including a dropped receiver) ends the
    /// loop with an error.
    #[tracing::instrument(name = "finalized_poller", skip_all, fields(start = self.next_block_number))]
    pub async fn run(
        mut self,
        output: mpsc::Sender<A::Block>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut health = HealthCounter::new("finalized_poller", self.config.unhealthy_after());

        loop {
            let step = tokio::select! {
                _ = cancel.cancelled() => break,
                step = self.poll_once(&output) => step,
            };

            match step {
                Ok(Step::Advanced) => health.record_success(),
                Ok(Step::Idle) => {
                    health.record_success();
                    pause(self.config.idle_interval(), cancel).await;
                }
                Err(_) if cancel.is_cancelled() => break,
                Err(err) if ContractViolation::is_violation(&err) => return Err(err),
                Err(err) => {
                    self.telemetry.record_fetch_error();
                    health.record_failure(&err);
                    pause(self.config.retry_interval(), cancel).await;
                }
            }
        }

        tracing::info!(next_block = self.next_block_number, "finalized poller stopped");
        Ok(())
    }

    async fn poll_once(&mut self, output: &mpsc::Sender<A::Block>) -> Result<Step> {
        let frontier = self
            .adapter
            .finalized_block_number()
            .await
            .context("reading finalized block number")?;
        if self.next_block_number > frontier {
            return Ok(Step::Idle);
        }

        let number = self.next_block_number;
        let block = self
            .adapter
            .block_data(number)
            .await
            .with_context(|| format!("fetching block {number}"))?;
        self.telemetry.record_fetched_blocks(1);

        output.send(block).await.map_err(|_| {
            ContractViolation::new(format!(
                "finalized output stream closed before block {number}"
            ))
        })?;

        self.next_block_number = number.saturating_add(1);
        self.telemetry.record_delivered_block();
        tracing::debug!(number, frontier, "delivered finalized block");
        Ok(Step::Advanced)
    }
}
