use super::processor::{collect_operations, OperationProcessor, Processor, ProcessorFuture};
use super::retriable::RetriableWriter;
use super::storage::Storage;
use tokio_util::sync::CancellationToken;

/// Fans each datum out to several sub-processors and commits their operations as one, so all
/// concerns of a block land in the same transaction.
pub struct AggregateProcessor<T, S: Storage> {
    processors: Vec<Box<dyn OperationProcessor<T, S::Operation>>>,
    writer: RetriableWriter<S>,
}

impl<T, S: Storage> AggregateProcessor<T, S> {
    pub fn new(
        processors: Vec<Box<dyn OperationProcessor<T, S::Operation>>>,
        writer: RetriableWriter<S>,
    ) -> Self {
        Self { processors, writer }
    }
}

impl<T, S> Processor<T> for AggregateProcessor<T, S>
where
    T: Send + Sync + 'static,
    S: Storage,
{
    fn process<'a>(&'a mut self, data: T, cancel: &'a CancellationToken) -> ProcessorFuture<'a> {
        Box::pin(async move {
            let operations = collect_operations(&mut self.processors[..], &data).await?;
            let operation = self.writer.storage().compose(operations);
            self.writer.write(operation, 1, cancel).await
        })
    }
}
