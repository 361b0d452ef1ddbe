use crate::channel::BoundedChannel;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(30);

static TRACING: OnceLock<()> = OnceLock::new();

/// Installs a fmt subscriber filtered by `RUST_LOG` (default `info`). Only the first call has an
/// effect, and an already installed global subscriber is left in place.
pub fn init_tracing() {
    TRACING.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .try_init();
        if installed.is_err() {
            tracing::debug!("global tracing subscriber already set");
        }
    });
}

/// Rolling counters shared by pollers and pipelines.
#[derive(Default, Debug)]
pub struct Telemetry {
    fetched_blocks: AtomicU64,
    delivered_blocks: AtomicU64,
    committed_blocks: AtomicU64,
    committed_operations: AtomicU64,
    reverted_blocks: AtomicU64,
    reorgs: AtomicU64,
    fetch_errors: AtomicU64,
    commit_errors: AtomicU64,
}

impl Telemetry {
    pub fn record_fetched_blocks(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.fetched_blocks.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_delivered_block(&self) {
        self.delivered_blocks.fetch_add(1, Ordering::Relaxed);
    }

    /// One committed operation covering `blocks` block datums.
    pub fn record_commit(&self, blocks: u64) {
        self.committed_operations.fetch_add(1, Ordering::Relaxed);
        self.committed_blocks.fetch_add(blocks, Ordering::Relaxed);
    }

    pub fn record_revert(&self) {
        self.reverted_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reorg(&self) {
        self.reorgs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_error(&self) {
        self.fetch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_commit_error(&self) {
        self.commit_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            fetched_blocks: self.fetched_blocks.load(Ordering::Relaxed),
            delivered_blocks: self.delivered_blocks.load(Ordering::Relaxed),
            committed_blocks: self.committed_blocks.load(Ordering::Relaxed),
            committed_operations: self.committed_operations.load(Ordering::Relaxed),
            reverted_blocks: self.reverted_blocks.load(Ordering::Relaxed),
            reorgs: self.reorgs.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            commit_errors: self.commit_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub fetched_blocks: u64,
    pub delivered_blocks: u64,
    pub committed_blocks: u64,
    pub committed_operations: u64,
    pub reverted_blocks: u64,
    pub reorgs: u64,
    pub fetch_errors: u64,
    pub commit_errors: u64,
}

/// Exposes the current depth of a buffer to the metrics reporter.
pub trait QueueDepth: Send + Sync {
    /// Returns `(items, bytes)` currently buffered.
    fn depth(&self) -> (usize, usize);
}

impl<T: Send> QueueDepth for BoundedChannel<T> {
    fn depth(&self) -> (usize, usize) {
        (self.len(), self.bytes())
    }
}

/// Spawns a task that logs a progress snapshot every `interval` until `shutdown` fires.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    queue: Option<Arc<dyn QueueDepth>>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        let mut previous = (telemetry.snapshot(), Instant::now());
        loop {
            select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let current = (telemetry.snapshot(), Instant::now());
                    log_snapshot(&previous, &current, queue.as_deref());
                    previous = current;
                }
            }
        }
        tracing::debug!(target: "chainsync::metrics", "metrics reporter stopped");
    })
}

fn log_snapshot(
    (before, since): &(TelemetrySnapshot, Instant),
    (now, at): &(TelemetrySnapshot, Instant),
    queue: Option<&dyn QueueDepth>,
) {
    let seconds = at.saturating_duration_since(*since).as_secs_f64();
    let delivered = now.delivered_blocks.saturating_sub(before.delivered_blocks);
    let blocks_per_sec = if seconds > 0.0 {
        delivered as f64 / seconds
    } else {
        0.0
    };
    let (queue_items, queue_bytes) = queue.map_or((0, 0), QueueDepth::depth);

    tracing::info!(
        target: "chainsync::metrics",
        blocks_per_sec = format_args!("{blocks_per_sec:.2}"),
        fetched = now.fetched_blocks,
        delivered = now.delivered_blocks,
        committed = now.committed_blocks,
        reverted = now.reverted_blocks,
        reorgs = now.reorgs,
        queue_items,
        queue_bytes,
        fetch_errors = now.fetch_errors,
        commit_errors = now.commit_errors,
        "sync progress"
    );
}
