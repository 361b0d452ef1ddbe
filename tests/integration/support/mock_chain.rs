use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{bail, Result};
use bytes::Bytes;
use chainsync::{Adapter, AdapterFuture, ByteSize, ContractViolation, LatestAdapter};

/// Block served by [`MockChain`]. Hashes are `"{number}{fork}"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockBlock {
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    pub payload: Bytes,
}

impl MockBlock {
    pub fn new(number: u64, fork: &str, parent_fork: &str) -> Self {
        Self {
            number,
            hash: format!("{number}{fork}"),
            parent_hash: format!("{}{parent_fork}", number.saturating_sub(1)),
            payload: Bytes::from(number.to_be_bytes().to_vec()),
        }
    }
}

impl ByteSize for MockBlock {
    fn byte_size(&self) -> usize {
        self.payload.len() + self.hash.len() + self.parent_hash.len() + 8
    }
}

#[derive(Default)]
struct ChainState {
    finalized: Vec<u64>,
    latest: Vec<u64>,
    blocks: HashMap<u64, Vec<MockBlock>>,
    failures: HashMap<u64, usize>,
    violations: Vec<u64>,
}

/// Scripted adapter. Frontier reads and block fetches pop from per-call queues and keep serving
/// the last entry once a queue is down to one element.
#[derive(Clone, Default)]
pub struct MockChain {
    state: Arc<Mutex<ChainState>>,
    fetches: Arc<AtomicU64>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single fork `a` covering `from..=to`.
    pub fn linear(from: u64, to: u64) -> Self {
        let chain = Self::new();
        for number in from..=to {
            chain.serve(MockBlock::new(number, "a", "a"));
        }
        chain
    }

    pub fn with_finalized(self, frontiers: &[u64]) -> Self {
        self.lock().finalized = frontiers.to_vec();
        self
    }

    pub fn with_latest(self, frontiers: &[u64]) -> Self {
        self.lock().latest = frontiers.to_vec();
        self
    }

    pub fn serve(&self, block: MockBlock) {
        self.lock().blocks.entry(block.number).or_default().push(block);
    }

    pub fn fail_fetch(&self, number: u64, times: usize) {
        self.lock().failures.insert(number, times);
    }

    pub fn violate_at(&self, number: u64) {
        self.lock().violations.push(number);
    }

    pub fn set_finalized(&self, frontier: u64) {
        self.lock().finalized = vec![frontier];
    }

    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_frontier(queue: &mut Vec<u64>) -> Result<u64> {
        match queue.len() {
            0 => bail!("no frontier scripted"),
            1 => Ok(queue[0]),
            _ => Ok(queue.remove(0)),
        }
    }

    fn fetch(&self, number: u64) -> Result<MockBlock> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();

        if state.violations.contains(&number) {
            return Err(ContractViolation::new(format!(
                "receipts returned for block {number} belong to another block"
            ))
            .into());
        }

        if let Some(left) = state.failures.get_mut(&number) {
            if *left > 0 {
                *left -= 1;
                bail!("connection reset while fetching block {number}");
            }
        }

        let Some(queue) = state.blocks.get_mut(&number) else {
            bail!("block {number} not found");
        };
        match queue.len() {
            0 => bail!("block {number} not found"),
            1 => Ok(queue[0].clone()),
            _ => Ok(queue.remove(0)),
        }
    }
}

impl Adapter for MockChain {
    type Block = MockBlock;

    fn finalized_block_number(&self) -> AdapterFuture<'_, u64> {
        let frontier = Self::next_frontier(&mut self.lock().finalized);
        Box::pin(async move { frontier })
    }

    fn latest_block_number(&self) -> AdapterFuture<'_, u64> {
        let frontier = Self::next_frontier(&mut self.lock().latest);
        Box::pin(async move { frontier })
    }

    fn block_data(&self, number: u64) -> AdapterFuture<'_, MockBlock> {
        let block = self.fetch(number);
        Box::pin(async move {
            tokio::task::yield_now().await;
            block
        })
    }
}

impl LatestAdapter for MockChain {
    fn block_hash(&self, block: &MockBlock) -> String {
        block.hash.clone()
    }

    fn parent_block_hash(&self, block: &MockBlock) -> String {
        block.parent_hash.clone()
    }
}
