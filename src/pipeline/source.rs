use crate::channel::{BoundedChannel, ByteSize};
use core::future::Future;
use core::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Option<T>> + Send + 'a>>;

/// Output stream of a poller, as seen by the pipeline loop.
pub trait DataSource<T>: Send {
    /// Next item, or `None` once the stream is exhausted or `cancel` fires.
    fn next<'a>(&'a mut self, cancel: &'a CancellationToken) -> SourceFuture<'a, T>;
}

impl<T: Send> DataSource<T> for mpsc::Receiver<T> {
    fn next<'a>(&'a mut self, cancel: &'a CancellationToken) -> SourceFuture<'a, T> {
        Box::pin(async move {
            tokio::select! {
                _ = cancel.cancelled() => None,
                item = self.recv() => item,
            }
        })
    }
}

impl<T: ByteSize + Send> DataSource<T> for Arc<BoundedChannel<T>> {
    fn next<'a>(&'a mut self, cancel: &'a CancellationToken) -> SourceFuture<'a, T> {
        Box::pin(async move { self.recv(cancel).await.ok() })
    }
}
