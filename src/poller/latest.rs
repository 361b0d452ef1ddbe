use super::adapter::LatestAdapter;
use super::health::HealthCounter;
use super::reorg::{PushOutcome, ReorgWindow};
use super::{pause, Step};
use crate::channel::ByteSize;
use crate::runtime::config::SyncConfig;
use crate::runtime::fatal::ContractViolation;
use crate::runtime::state::ReorgSnapshot;
use crate::runtime::telemetry::Telemetry;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A block delivered by the [`LatestPoller`].
///
/// `reverted` is set on the first delivery after a reorg: every previously delivered block at or
/// above `data`'s number must be undone before `data` is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revertable<T> {
    pub data: T,
    pub reverted: bool,
}

impl<T> Revertable<T> {
    pub fn forward(data: T) -> Self {
        Self {
            data,
            reverted: false,
        }
    }

    pub fn replacing(data: T) -> Self {
        Self {
            data,
            reverted: true,
        }
    }
}

impl<T: ByteSize> ByteSize for Revertable<T> {
    fn byte_size(&self) -> usize {
        self.data.byte_size() + std::mem::size_of::<bool>()
    }
}

/// Follows the chain tip (minus the configured confirmations), tracking block linkage in a
/// [`ReorgWindow`] so replaced blocks are detected and re-delivered.
///
/// On a parent mismatch the conflicting tip is dropped and the cursor steps back one block; the
/// walk repeats until a fetched block links to the window again. The first block appended after
/// that walk is delivered with `reverted = true`.
pub struct LatestPoller<A: LatestAdapter> {
    adapter: Arc<A>,
    config: SyncConfig,
    telemetry: Arc<Telemetry>,
    next_block_number: u64,
    window: ReorgWindow,
    pending_revert: bool,
}

impl<A: LatestAdapter> LatestPoller<A> {
    pub fn new(adapter: Arc<A>, config: SyncConfig, next_block_number: u64) -> Self {
        Self {
            adapter,
            config,
            telemetry: Arc::new(Telemetry::default()),
            next_block_number,
            window: ReorgWindow::new(),
            pending_revert: false,
        }
    }

    /// Restores linkage tracked before a restart. The snapshot's highest block must be
    /// `next_block_number - 1`.
    pub fn with_snapshot(mut self, snapshot: &ReorgSnapshot) -> Self {
        self.window = ReorgWindow::from_snapshot(snapshot);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn next_block_number(&self) -> u64 {
        self.next_block_number
    }

    pub fn window(&self) -> &ReorgWindow {
        &self.window
    }

    #[tracing::instrument(name = "latest_poller", skip_all, fields(start = self.next_block_number))]
    pub async fn run(
        mut self,
        output: mpsc::Sender<Revertable<A::Block>>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if let Some(latest) = self.window.latest() {
            if latest.checked_add(1) != Some(self.next_block_number) {
                return Err(ContractViolation::new(format!(
                    "reorg window ends at {latest} but polling resumes at {}",
                    self.next_block_number
                ))
                .into());
            }
        }

        let mut health = HealthCounter::new("latest_poller", self.config.unhealthy_after());

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

        tracing::info!(
            next_block = self.next_block_number,
            tracked = self.window.len(),
            "latest poller stopped"
        );
        Ok(())
    }

    async fn poll_once(&mut self, output: &mpsc::Sender<Revertable<A::Block>>) -> Result<Step> {
        let finalized = self
            .adapter
            .finalized_block_number()
            .await
            .context("reading finalized block number")?;
        let evicted = self.window.evict(finalized);
        if evicted > 0 {
            tracing::trace!(finalized, evicted, "evicted finalized blocks from reorg window");
        }

        let latest = self
            .adapter
            .latest_block_number()
            .await
            .context("reading latest block number")?;
        let frontier = latest.saturating_sub(self.config.latest_confirmations());
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

        let hash = self.adapter.block_hash(&block);
        let parent_hash = self.adapter.parent_block_hash(&block);

        match self.window.push(number, hash, &parent_hash) {
            PushOutcome::Appended => {
                let reverted = self.pending_revert;
                output
                    .send(Revertable {
                        data: block,
                        reverted,
                    })
                    .await
                    .map_err(|_| {
                        ContractViolation::new(format!(
                            "latest output stream closed before block {number}"
                        ))
                    })?;

                self.next_block_number = number.saturating_add(1);
                self.pending_revert = false;
                self.telemetry.record_delivered_block();
                if reverted {
                    self.telemetry.record_revert();
                    tracing::info!(number, "delivered replacement block after reorg");
                }
                Ok(Step::Advanced)
            }
            PushOutcome::Popped => {
                self.next_block_number = number.saturating_sub(1);
                self.pending_revert = true;
                self.telemetry.record_reorg();
                tracing::warn!(
                    number,
                    parent_hash = %parent_hash,
                    rewind_to = self.next_block_number,
                    "reorg detected; stepping back one block"
                );
                Ok(Step::Advanced)
            }
            PushOutcome::Rejected => Err(ContractViolation::new(format!(
                "block {number} does not extend reorg window ending at {:?}",
                self.window.latest()
            ))
            .into()),
        }
    }
}
