use anyhow::Result;
use core::future::Future;
use core::pin::Pin;

pub type StorageFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Persistence engine that executes opaque operations transactionally.
///
/// The pipeline never looks inside an operation: it only merges several of them with
/// [`Storage::compose`] and hands the result to [`Storage::execute`], possibly more than once
/// when a commit has to be retried.
pub trait Storage: Send + Sync + 'static {
    type Operation: Send + Sync + 'static;

    fn compose(&self, operations: Vec<Self::Operation>) -> Self::Operation;

    fn execute<'a>(&'a self, operation: &'a Self::Operation) -> StorageFuture<'a>;
}
