use anyhow::Result;
use core::future::Future;
use core::pin::Pin;

pub type TaskFuture<V> = Pin<Box<dyn Future<Output = Result<V>> + Send + 'static>>;
pub type CollectFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// A completed task handed to the collector in index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult<V> {
    /// Worker that executed the task.
    pub routine: usize,
    /// Position of the task inside the batch, starting at zero.
    pub index: usize,
    pub value: V,
}

/// Work executed concurrently by the executor's worker tasks.
///
/// Implemented for any `Fn(routine, index) -> Future` closure, which is how most callers
/// provide it.
pub trait TaskFn<V>: Send + Sync + 'static {
    fn call(&self, routine: usize, index: usize) -> TaskFuture<V>;
}

impl<V, F, Fut> TaskFn<V> for F
where
    F: Fn(usize, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V>> + Send + 'static,
{
    fn call(&self, routine: usize, index: usize) -> TaskFuture<V> {
        Box::pin(self(routine, index))
    }
}

/// Receives completed tasks one at a time, strictly in index order, on the caller's task.
pub trait Collector<V>: Send {
    fn collect<'a>(&'a mut self, result: TaskResult<V>) -> CollectFuture<'a>;
}

/// Adapts a synchronous closure into a [`Collector`].
pub struct FnCollector<F>(pub F);

impl<V, F> Collector<V> for FnCollector<F>
where
    V: Send + 'static,
    F: FnMut(TaskResult<V>) -> Result<()> + Send,
{
    fn collect<'a>(&'a mut self, result: TaskResult<V>) -> CollectFuture<'a> {
        let outcome = (self.0)(result);
        Box::pin(async move { outcome })
    }
}
