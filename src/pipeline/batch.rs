use super::processor::{collect_operations, OperationProcessor, Processor, ProcessorFuture};
use super::retriable::RetriableWriter;
use super::storage::Storage;
use crate::runtime::config::SyncConfig;
use anyhow::Result;
use std::mem;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Aggregates operations across many data and commits them together.
///
/// A batch is flushed once it holds `batch_size` data, or when a datum arrives at least
/// `batch_interval` after the previous flush. There is no background timer: a partial batch waits
/// for the next arrival or for [`Processor::close`].
pub struct BatchAggregateProcessor<T, S: Storage> {
    processors: Vec<Box<dyn OperationProcessor<T, S::Operation>>>,
    writer: RetriableWriter<S>,
    batch_size: usize,
    batch_interval: Duration,
    pending: Vec<S::Operation>,
    pending_items: usize,
    last_flush: Instant,
}

impl<T, S: Storage> BatchAggregateProcessor<T, S> {
    pub fn new(
        processors: Vec<Box<dyn OperationProcessor<T, S::Operation>>>,
        writer: RetriableWriter<S>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            processors,
            writer,
            batch_size: config.batch_size(),
            batch_interval: config.batch_interval(),
            pending: Vec::new(),
            pending_items: 0,
            last_flush: Instant::now(),
        }
    }

    /// Number of data accumulated since the last flush.
    pub fn pending_items(&self) -> usize {
        self.pending_items
    }

    fn should_flush(&self) -> bool {
        self.pending_items >= self.batch_size || self.last_flush.elapsed() >= self.batch_interval
    }

    async fn flush(&mut self, cancel: &CancellationToken) -> Result<()> {
        if self.pending_items == 0 {
            return Ok(());
        }

        let items = self.pending_items;
        let operation = self
            .writer
            .storage()
            .compose(mem::take(&mut self.pending));
        self.pending_items = 0;
        self.writer.write(operation, items as u64, cancel).await?;
        self.last_flush = Instant::now();
        tracing::debug!(items, "flushed batch");
        Ok(())
    }
}

impl<T, S> Processor<T> for BatchAggregateProcessor<T, S>
where
    T: Send + Sync + 'static,
    S: Storage,
{
    fn process<'a>(&'a mut self, data: T, cancel: &'a CancellationToken) -> ProcessorFuture<'a> {
        Box::pin(async move {
            let operations = collect_operations(&mut self.processors[..], &data).await?;
            self.pending.extend(operations);
            self.pending_items += 1;

            if self.should_flush() {
                self.flush(cancel).await?;
            }
            Ok(())
        })
    }

    fn close<'a>(&'a mut self, cancel: &'a CancellationToken) -> ProcessorFuture<'a> {
        Box::pin(self.flush(cancel))
    }
}
