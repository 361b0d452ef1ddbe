use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use chainsync::{OperationFuture, OperationProcessor, RevertProcessor, Storage, StorageFuture};
use once_cell::sync::Lazy;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use super::mock_chain::MockBlock;

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Apply { number: u64, hash: String },
    RevertFrom(u64),
}

#[derive(Default)]
struct StoredState {
    blocks: BTreeMap<u64, String>,
    batches: Vec<Vec<u64>>,
    reverts: Vec<Vec<u64>>,
    failures: usize,
}

/// In-memory storage that records every committed batch and revert.
#[derive(Clone, Default)]
pub struct RecordingStorage {
    state: Arc<Mutex<StoredState>>,
}

impl RecordingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `failures` executions fail.
    pub fn fail_next(&self, failures: usize) {
        self.lock().failures = failures;
    }

    /// Applied block numbers per committed operation.
    pub fn batches(&self) -> Vec<Vec<u64>> {
        self.lock().batches.clone()
    }

    /// Block numbers removed per revert.
    pub fn reverts(&self) -> Vec<Vec<u64>> {
        self.lock().reverts.clone()
    }

    pub fn blocks(&self) -> BTreeMap<u64, String> {
        self.lock().blocks.clone()
    }

    pub fn hash_of(&self, number: u64) -> Option<String> {
        self.lock().blocks.get(&number).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoredState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Storage for RecordingStorage {
    type Operation = Vec<Change>;

    fn compose(&self, operations: Vec<Vec<Change>>) -> Vec<Change> {
        operations.into_iter().flatten().collect()
    }

    fn execute<'a>(&'a self, operation: &'a Vec<Change>) -> StorageFuture<'a> {
        Box::pin(async move {
            let mut state = self.lock();
            if state.failures > 0 {
                state.failures -= 1;
                bail!("storage transaction aborted");
            }

            let mut applied = Vec::new();
            for change in operation {
                match change {
                    Change::Apply { number, hash } => {
                        state.blocks.insert(*number, hash.clone());
                        applied.push(*number);
                    }
                    Change::RevertFrom(number) => {
                        let removed = state.blocks.split_off(number);
                        state.reverts.push(removed.into_keys().collect());
                    }
                }
            }
            if !applied.is_empty() {
                state.batches.push(applied);
            }
            Ok(())
        })
    }
}

/// Stores each block's hash under its number.
pub struct BlockIndexer;

impl OperationProcessor<MockBlock, Vec<Change>> for BlockIndexer {
    fn process<'a>(&'a mut self, data: &'a MockBlock) -> OperationFuture<'a, Vec<Change>> {
        Box::pin(async move {
            Ok(vec![Change::Apply {
                number: data.number,
                hash: data.hash.clone(),
            }])
        })
    }
}

impl RevertProcessor<MockBlock, Vec<Change>> for BlockIndexer {
    fn revert<'a>(&'a mut self, data: &'a MockBlock) -> OperationFuture<'a, Vec<Change>> {
        Box::pin(async move { Ok(vec![Change::RevertFrom(data.number)]) })
    }
}

pub async fn wait_until<F>(what: &str, timeout: Duration, mut condition: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    loop {
        if condition() {
            return Ok(());
        }
        if start.elapsed() > timeout {
            bail!("timed out after {timeout:?} waiting for {what}");
        }
        sleep(Duration::from_millis(10)).await;
    }
}

pub fn assert_is_contiguous(numbers: &[u64]) {
    for pair in numbers.windows(2) {
        assert_eq!(pair[1], pair[0] + 1, "numbers are not contiguous: {numbers:?}");
    }
}
