use super::adapter::Adapter;
use super::health::HealthCounter;
use super::pause;
use crate::channel::{BoundedChannel, ByteSize, SendError};
use crate::executor::{CollectFuture, Collector, OrderedExecutor, TaskResult};
use crate::runtime::config::SyncConfig;
use crate::runtime::fatal::ContractViolation;
use crate::runtime::telemetry::Telemetry;
use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Bulk backfill from a stale cursor up to the finalized frontier.
///
/// Each round reads the frontier and fetches `[cursor, frontier]` concurrently through an
/// [`OrderedExecutor`], pushing blocks into a [`BoundedChannel`] in block order. The cursor only
/// moves when a block has been handed to the channel, so a failed round resumes from the first
/// block that was not delivered. The poller stops, closing its channel, once the cursor is past
/// the frontier.
pub struct CatchUpPoller<A: Adapter> {
    adapter: Arc<A>,
    config: SyncConfig,
    telemetry: Arc<Telemetry>,
    next_block_number: u64,
}

impl<A> CatchUpPoller<A>
where
    A: Adapter,
    A::Block: ByteSize,
{
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

    /// Runs until caught up or cancelled and returns the cursor: the first block not delivered.
    ///
    /// The output channel is closed on every exit path so the consumer can drain it.
    #[tracing::instrument(name = "catch_up_poller", skip_all, fields(start = self.next_block_number))]
    pub async fn run(
        mut self,
        output: Arc<BoundedChannel<A::Block>>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let outcome = self.poll(&output, cancel).await;
        output.close();
        outcome.map(|()| self.next_block_number)
    }

    async fn poll(
        &mut self,
        output: &BoundedChannel<A::Block>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut health = HealthCounter::new("catch_up_poller", self.config.unhealthy_after());

        loop {
            if cancel.is_cancelled() {
                tracing::info!(
                    next_block = self.next_block_number,
                    "catch-up cancelled"
                );
                return Ok(());
            }

            let outcome = match self.finalized_frontier(cancel).await {
                Ok(Some(frontier)) if self.next_block_number > frontier => {
                    health.record_success();
                    tracing::info!(
                        next_block = self.next_block_number,
                        frontier,
                        "caught up with finalized frontier"
                    );
                    return Ok(());
                }
                Ok(Some(frontier)) => self.fetch_range(frontier, output, cancel).await,
                Ok(None) => continue,
                Err(err) => Err(err),
            };

            match outcome {
                Ok(()) => health.record_success(),
                Err(_) if cancel.is_cancelled() => continue,
                Err(err) if ContractViolation::is_violation(&err) => return Err(err),
                Err(err) => {
                    self.telemetry.record_fetch_error();
                    health.record_failure(&err);
                    pause(self.config.retry_interval(), cancel).await;
                }
            }
        }
    }

    async fn finalized_frontier(&self, cancel: &CancellationToken) -> Result<Option<u64>> {
        tokio::select! {
            _ = cancel.cancelled() => Ok(None),
            frontier = self.adapter.finalized_block_number() => {
                frontier.context("reading finalized block number").map(Some)
            }
        }
    }

    async fn fetch_range(
        &mut self,
        frontier: u64,
        output: &BoundedChannel<A::Block>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let start = self.next_block_number;
        let end = match self.config.catch_up_max_range() {
            Some(range) => frontier.min(start.saturating_add(range - 1)),
            None => frontier,
        };
        let tasks = usize::try_from(end - start + 1)
            .with_context(|| format!("catch-up range {start}..={end} is too large"))?;

        let mut executor = OrderedExecutor::new(tasks);
        if let Some(routines) = self.config.catch_up_routines() {
            executor = executor.routines(routines);
        }
        if let Some(window) = self.config.catch_up_window() {
            executor = executor.window(window);
        }

        tracing::debug!(
            start,
            end,
            frontier,
            routines = executor.effective_routines(),
            "fetching catch-up range"
        );

        let adapter = Arc::clone(&self.adapter);
        let telemetry = Arc::clone(&self.telemetry);
        let fetch = move |_routine: usize, index: usize| {
            let adapter = Arc::clone(&adapter);
            let telemetry = Arc::clone(&telemetry);
            let number = start + index as u64;
            async move {
                let block = adapter
                    .block_data(number)
                    .await
                    .with_context(|| format!("fetching block {number}"))?;
                telemetry.record_fetched_blocks(1);
                Ok(block)
            }
        };

        let mut collector = ChannelCollector {
            output,
            cursor: &mut self.next_block_number,
            telemetry: &self.telemetry,
            cancel,
        };
        executor.run(fetch, &mut collector, cancel).await
    }
}

/// Hands blocks to the output channel in order and advances the cursor past each one.
struct ChannelCollector<'c, T> {
    output: &'c BoundedChannel<T>,
    cursor: &'c mut u64,
    telemetry: &'c Telemetry,
    cancel: &'c CancellationToken,
}

impl<'c, T> Collector<T> for ChannelCollector<'c, T>
where
    T: ByteSize + Send + Sync + 'static,
{
    fn collect<'a>(&'a mut self, result: TaskResult<T>) -> CollectFuture<'a> {
        Box::pin(async move {
            let number = *self.cursor;
            match self.output.send(result.value, self.cancel).await {
                Ok(()) => {
                    *self.cursor = number.saturating_add(1);
                    self.telemetry.record_delivered_block();
                    Ok(())
                }
                Err(SendError::Closed(_)) => Err(ContractViolation::new(format!(
                    "catch-up output channel closed before block {number}"
                ))
                .into()),
                Err(SendError::Cancelled(_)) => {
                    Err(anyhow!("delivery of block {number} cancelled"))
                }
            }
        })
    }
}
