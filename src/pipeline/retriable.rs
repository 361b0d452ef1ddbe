use super::processor::{OperationProcessor, Processor, ProcessorFuture};
use super::storage::Storage;
use crate::poller::health::HealthCounter;
use crate::runtime::config::SyncConfig;
use crate::runtime::retry::retry_until_cancelled;
use crate::runtime::telemetry::Telemetry;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Commits operations, retrying failed commits forever with a fixed delay. Only cancellation
/// ends the retry loop.
pub struct RetriableWriter<S: Storage> {
    storage: Arc<S>,
    retry_interval: Duration,
    health: HealthCounter,
    telemetry: Arc<Telemetry>,
}

impl<S: Storage> RetriableWriter<S> {
    pub fn new(storage: Arc<S>, config: &SyncConfig) -> Self {
        Self {
            storage,
            retry_interval: config.retry_interval(),
            health: HealthCounter::new("storage", config.unhealthy_after()),
            telemetry: Arc::new(Telemetry::default()),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Executes `operation`, which covers `blocks` block datums.
    pub async fn write(
        &mut self,
        operation: S::Operation,
        blocks: u64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let storage = &self.storage;
        let health = &mut self.health;
        let telemetry = &self.telemetry;

        retry_until_cancelled(
            self.retry_interval,
            cancel,
            |_attempt| storage.execute(&operation),
            |attempt, err| {
                telemetry.record_commit_error();
                health.record_failure(err);
                tracing::debug!(attempt, blocks, "retrying commit");
            },
        )
        .await
        .with_context(|| format!("committing operation for {blocks} blocks"))?;

        self.health.record_success();
        self.telemetry.record_commit(blocks);
        Ok(())
    }
}

/// Writes every datum on its own through a single [`OperationProcessor`].
pub struct RetriableProcessor<T, S: Storage> {
    processor: Box<dyn OperationProcessor<T, S::Operation>>,
    writer: RetriableWriter<S>,
}

impl<T, S: Storage> RetriableProcessor<T, S> {
    pub fn new(
        processor: Box<dyn OperationProcessor<T, S::Operation>>,
        writer: RetriableWriter<S>,
    ) -> Self {
        Self { processor, writer }
    }
}

impl<T, S> Processor<T> for RetriableProcessor<T, S>
where
    T: Send + Sync + 'static,
    S: Storage,
{
    fn process<'a>(&'a mut self, data: T, cancel: &'a CancellationToken) -> ProcessorFuture<'a> {
        Box::pin(async move {
            let operation = self.processor.process(&data).await?;
            self.writer.write(operation, 1, cancel).await
        })
    }
}
