use super::processor::{collect_operations, Processor, ProcessorFuture, RevertProcessor};
use super::retriable::RetriableWriter;
use super::storage::Storage;
use crate::poller::latest::Revertable;
use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

/// Aggregate processor for the latest poller's stream.
///
/// A delivery flagged `reverted` first commits the composed revert operations of every
/// sub-processor, then applies the new datum like any other delivery.
pub struct RevertableAggregateProcessor<T, S: Storage> {
    processors: Vec<Box<dyn RevertProcessor<T, S::Operation>>>,
    writer: RetriableWriter<S>,
}

impl<T, S> RevertableAggregateProcessor<T, S>
where
    T: Send + Sync + 'static,
    S: Storage,
{
    pub fn new(
        processors: Vec<Box<dyn RevertProcessor<T, S::Operation>>>,
        writer: RetriableWriter<S>,
    ) -> Self {
        Self { processors, writer }
    }

    async fn revert(&mut self, data: &T, cancel: &CancellationToken) -> Result<()> {
        let mut operations = Vec::with_capacity(self.processors.len());
        for (position, processor) in self.processors.iter_mut().enumerate() {
            let operation = processor
                .revert(data)
                .await
                .with_context(|| format!("revert of sub-processor {position} failed"))?;
            operations.push(operation);
        }

        let operation = self.writer.storage().compose(operations);
        self.writer.write(operation, 0, cancel).await
    }

    async fn apply(&mut self, data: &T, cancel: &CancellationToken) -> Result<()> {
        let operations = collect_operations(&mut self.processors[..], data).await?;
        let operation = self.writer.storage().compose(operations);
        self.writer.write(operation, 1, cancel).await
    }
}

impl<T, S> Processor<Revertable<T>> for RevertableAggregateProcessor<T, S>
where
    T: Send + Sync + 'static,
    S: Storage,
{
    fn process<'a>(
        &'a mut self,
        delivery: Revertable<T>,
        cancel: &'a CancellationToken,
    ) -> ProcessorFuture<'a> {
        Box::pin(async move {
            if delivery.reverted {
                self.revert(&delivery.data, cancel).await?;
            }
            self.apply(&delivery.data, cancel).await
        })
    }
}
