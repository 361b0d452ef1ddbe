use anyhow::Result;
use core::future::Future;
use core::pin::Pin;

pub type AdapterFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Source of chain data queried by the pollers.
///
/// Errors are treated as transient and retried, unless they carry a
/// [`ContractViolation`](crate::ContractViolation) (for example a block whose records do not
/// belong to the requested number), which stops the poller.
pub trait Adapter: Send + Sync + 'static {
    type Block: Send + Sync + 'static;

    /// Highest block guaranteed never to be reorganized.
    fn finalized_block_number(&self) -> AdapterFuture<'_, u64>;

    /// Highest block visible right now. May still be replaced.
    fn latest_block_number(&self) -> AdapterFuture<'_, u64>;

    fn block_data(&self, number: u64) -> AdapterFuture<'_, Self::Block>;
}

/// Linkage accessors needed to track the non-final tail of the chain.
pub trait LatestAdapter: Adapter {
    fn block_hash(&self, block: &Self::Block) -> String;

    fn parent_block_hash(&self, block: &Self::Block) -> String;
}
