use crate::channel::{BoundedChannel, ByteSize};
use crate::pipeline::{Pipeline, Processor};
use crate::poller::{
    Adapter, CatchUpPoller, FinalizedPoller, LatestAdapter, LatestPoller, Revertable,
};
use crate::runtime::config::SyncConfig;
use crate::runtime::fatal::FatalErrorHandler;
use crate::runtime::state::PollerState;
use crate::runtime::telemetry::{spawn_metrics_reporter, QueueDepth, Telemetry};
use anyhow::{anyhow, bail, Context, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Wires one poller and one pipeline together and supervises them.
///
/// Every run gets a child of the root token. A fatal error in either task cancels both the run
/// and the root token, so a runner that returned a fatal error stays cancelled.
pub struct Runner {
    config: SyncConfig,
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
}

/// Tokens and fatal handler scoped to one poller/pipeline pair.
struct RunScope {
    token: CancellationToken,
    fatal: FatalErrorHandler,
    reporter: JoinHandle<()>,
}

impl Runner {
    pub fn new(config: SyncConfig) -> Self {
        Self::with_cancellation_token(config, CancellationToken::new())
    }

    pub fn with_cancellation_token(config: SyncConfig, shutdown: CancellationToken) -> Self {
        Self {
            config,
            telemetry: Arc::new(Telemetry::default()),
            shutdown,
        }
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        Arc::clone(&self.telemetry)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Backfills from `next_block_number` up to the finalized frontier through a bounded channel
    /// and returns the cursor once every delivered block went through `processor` and the
    /// processor was closed.
    ///
    /// A run cancelled before the pipeline drained and closed fails instead: blocks still
    /// buffered, or held in a pending batch, were never committed, so the caller must resume from
    /// the cursor it persisted last.
    pub async fn catch_up<A, P>(
        &self,
        adapter: Arc<A>,
        processor: P,
        next_block_number: u64,
    ) -> Result<u64>
    where
        A: Adapter,
        A::Block: ByteSize,
        P: Processor<A::Block> + 'static,
    {
        let channel = Arc::new(BoundedChannel::new(
            self.config.channel_capacity(),
            self.config.channel_max_bytes(),
        ));
        let queue: Arc<dyn QueueDepth> = channel.clone();
        let scope = self.start_run(Some(queue));

        let poller = CatchUpPoller::new(adapter, self.config.clone(), next_block_number)
            .with_telemetry(self.telemetry());
        let poller_task = spawn_supervised(&scope, "catch-up poller", {
            let output = Arc::clone(&channel);
            let token = scope.token.clone();
            async move { poller.run(output, &token).await }
        });
        let pipeline_task = spawn_supervised(&scope, "catch-up pipeline", {
            let token = scope.token.clone();
            async move {
                let processed = Pipeline::new("catch_up").run(channel, processor, &token).await?;
                Ok::<_, anyhow::Error>((processed, token.is_cancelled()))
            }
        });

        let cursor = join_supervised(&scope, "catch-up poller", poller_task).await;
        let processed = join_supervised(&scope, "catch-up pipeline", pipeline_task).await;
        self.finish_run(scope).await?;

        let cursor = cursor?;
        let (processed, interrupted) = processed?;
        if interrupted {
            tracing::warn!(cursor, processed, "catch-up cancelled before the pipeline drained");
            bail!(
                "catch-up cancelled after {processed} processed blocks; \
                 blocks below {cursor} may be uncommitted"
            );
        }
        tracing::info!(cursor, processed, "catch-up finished");
        Ok(cursor)
    }

    /// Follows finalized blocks one at a time until cancelled.
    pub async fn follow_finalized<A, P>(
        &self,
        adapter: Arc<A>,
        processor: P,
        next_block_number: u64,
    ) -> Result<()>
    where
        A: Adapter,
        P: Processor<A::Block> + 'static,
    {
        let (tx, rx) = mpsc::channel(self.config.stream_buffer());
        let scope = self.start_run(None);

        let poller = FinalizedPoller::new(adapter, self.config.clone(), next_block_number)
            .with_telemetry(self.telemetry());
        let poller_task = spawn_supervised(&scope, "finalized poller", {
            let token = scope.token.clone();
            async move { poller.run(tx, &token).await }
        });
        let pipeline_task = spawn_supervised(&scope, "finalized pipeline", {
            let token = scope.token.clone();
            async move { Pipeline::new("finalized").run(rx, processor, &token).await }
        });

        let polled = join_supervised(&scope, "finalized poller", poller_task).await;
        let processed = join_supervised(&scope, "finalized pipeline", pipeline_task).await;
        self.finish_run(scope).await?;

        polled?;
        processed?;
        Ok(())
    }

    /// Follows the chain tip with reorg tracking until cancelled. `state.reorg`, when present,
    /// restores the linkage persisted by a previous run.
    pub async fn follow_latest<A, P>(
        &self,
        adapter: Arc<A>,
        processor: P,
        state: PollerState,
    ) -> Result<()>
    where
        A: LatestAdapter,
        P: Processor<Revertable<A::Block>> + 'static,
    {
        let (tx, rx) = mpsc::channel(self.config.stream_buffer());
        let scope = self.start_run(None);

        let mut poller = LatestPoller::new(adapter, self.config.clone(), state.next_block_number)
            .with_telemetry(self.telemetry());
        if let Some(snapshot) = &state.reorg {
            poller = poller.with_snapshot(snapshot);
        }
        let poller_task = spawn_supervised(&scope, "latest poller", {
            let token = scope.token.clone();
            async move { poller.run(tx, &token).await }
        });
        let pipeline_task = spawn_supervised(&scope, "latest pipeline", {
            let token = scope.token.clone();
            async move { Pipeline::new("latest").run(rx, processor, &token).await }
        });

        let polled = join_supervised(&scope, "latest poller", poller_task).await;
        let processed = join_supervised(&scope, "latest pipeline", pipeline_task).await;
        self.finish_run(scope).await?;

        polled?;
        processed?;
        Ok(())
    }

    /// Drives `work` until it completes or a Ctrl-C (SIGINT) arrives. On Ctrl-C the root token is
    /// cancelled and `work` is awaited so it can wind down.
    pub async fn run_until_ctrl_c<F, R>(&self, work: F) -> Result<R>
    where
        F: Future<Output = Result<R>>,
    {
        tokio::pin!(work);
        tracing::info!("runner started; waiting for Ctrl-C (SIGINT) to initiate shutdown");

        tokio::select! {
            outcome = &mut work => return outcome,
            received = signal::ctrl_c() => {
                received.context("listening for Ctrl-C")?;
                tracing::info!("Ctrl-C received; shutting down runner");
            }
        }

        self.shutdown.cancel();
        work.await
    }

    fn start_run(&self, queue: Option<Arc<dyn QueueDepth>>) -> RunScope {
        let token = self.shutdown.child_token();
        let fatal = FatalErrorHandler::new(self.shutdown.clone(), token.clone());
        let reporter = spawn_metrics_reporter(
            self.telemetry(),
            queue,
            token.clone(),
            self.config.metrics_interval(),
        );
        RunScope {
            token,
            fatal,
            reporter,
        }
    }

    async fn finish_run(&self, scope: RunScope) -> Result<()> {
        scope.token.cancel();
        if let Err(err) = scope.reporter.await {
            tracing::warn!(error = %err, "metrics reporter did not shut down cleanly");
        }

        match scope.fatal.error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Spawns a run task whose error is routed through the fatal handler as soon as it happens, so
/// the sibling task is cancelled instead of blocking on a peer that is gone.
fn spawn_supervised<F, R>(
    scope: &RunScope,
    context: &'static str,
    task: F,
) -> JoinHandle<Result<R>>
where
    F: Future<Output = Result<R>> + Send + 'static,
    R: Send + 'static,
{
    let fatal = scope.fatal.clone();
    tokio::spawn(async move { task.await.map_err(|err| fatal.trigger(context, err)) })
}

async fn join_supervised<R>(
    scope: &RunScope,
    context: &'static str,
    handle: JoinHandle<Result<R>>,
) -> Result<R> {
    match handle.await {
        Ok(outcome) => outcome,
        Err(err) => Err(scope
            .fatal
            .trigger(context, anyhow!("{context} task did not complete: {err}"))),
    }
}
