use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persistable view of a reorg window: the anchor block (at or below the finalized boundary) and
/// the hashes of the non-final blocks tracked above it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorgSnapshot {
    pub finalized_number: u64,
    pub finalized_hash: String,
    #[serde(default)]
    pub blocks: BTreeMap<u64, String>,
}

impl ReorgSnapshot {
    pub fn new(finalized_number: u64, finalized_hash: impl Into<String>) -> Self {
        Self {
            finalized_number,
            finalized_hash: finalized_hash.into(),
            blocks: BTreeMap::new(),
        }
    }

    pub fn with_block(mut self, number: u64, hash: impl Into<String>) -> Self {
        self.blocks.insert(number, hash.into());
        self
    }
}

/// Everything a caller has to persist to resume a poller after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollerState {
    pub next_block_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reorg: Option<ReorgSnapshot>,
}

impl PollerState {
    pub fn new(next_block_number: u64) -> Self {
        Self {
            next_block_number,
            reorg: None,
        }
    }

    pub fn with_reorg(mut self, snapshot: ReorgSnapshot) -> Self {
        self.reorg = Some(snapshot);
        self
    }
}
