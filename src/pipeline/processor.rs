use anyhow::{Context, Result};
use core::future::Future;
use core::pin::Pin;
use tokio_util::sync::CancellationToken;

pub type OperationFuture<'a, O> = Pin<Box<dyn Future<Output = Result<O>> + Send + 'a>>;
pub type ProcessorFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Converts one block datum into a storage operation for a single concern (one table, one
/// index, ...). Errors are not retried.
pub trait OperationProcessor<T, O>: Send {
    fn process<'a>(&'a mut self, data: &'a T) -> OperationFuture<'a, O>;
}

/// An [`OperationProcessor`] that can also undo what it applied.
pub trait RevertProcessor<T, O>: OperationProcessor<T, O> {
    /// Builds the operation removing every previously applied block numbered at or above `data`.
    fn revert<'a>(&'a mut self, data: &'a T) -> OperationFuture<'a, O>;
}

/// Consumer end of a pipeline. Invoked sequentially by a single task.
pub trait Processor<T>: Send {
    fn process<'a>(&'a mut self, data: T, cancel: &'a CancellationToken) -> ProcessorFuture<'a>;

    /// Called once after the source is exhausted or cancelled.
    fn close<'a>(&'a mut self, _cancel: &'a CancellationToken) -> ProcessorFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}

/// Runs every sub-processor on `data` in order and gathers their operations.
pub(crate) async fn collect_operations<T, O, P>(
    processors: &mut [Box<P>],
    data: &T,
) -> Result<Vec<O>>
where
    T: Sync + 'static,
    O: Send + 'static,
    P: OperationProcessor<T, O> + ?Sized,
{
    let mut operations = Vec::with_capacity(processors.len());
    for (position, processor) in processors.iter_mut().enumerate() {
        let operation = processor
            .process(data)
            .await
            .with_context(|| format!("sub-processor {position} failed"))?;
        operations.push(operation);
    }
    Ok(operations)
}
