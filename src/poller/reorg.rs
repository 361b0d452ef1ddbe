//! Linkage ledger for the non-final tail of the chain.

use crate::runtime::state::ReorgSnapshot;
use std::collections::VecDeque;

/// Result of [`ReorgWindow::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The block extends the tracked tip (or the window was empty).
    Appended,
    /// The block's parent does not match the tip; the tip was dropped.
    Popped,
    /// The block number is not `latest + 1`. Nothing changed.
    Rejected,
}

impl PushOutcome {
    pub fn appended(self) -> bool {
        matches!(self, PushOutcome::Appended)
    }

    pub fn popped(self) -> bool {
        matches!(self, PushOutcome::Popped)
    }
}

/// Contiguous run of `(number, hash)` pairs `[earliest, latest]` used to decide whether a freshly
/// fetched block extends the tracked chain or conflicts with its tip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReorgWindow {
    items: VecDeque<(u64, String)>,
}

impl ReorgWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a window from persisted state. Blocks above the anchor are replayed in order and
    /// replay stops at the first missing number.
    pub fn from_snapshot(snapshot: &ReorgSnapshot) -> Self {
        let mut items = VecDeque::with_capacity(snapshot.blocks.len() + 1);
        items.push_back((snapshot.finalized_number, snapshot.finalized_hash.clone()));

        let mut expected = snapshot.finalized_number.saturating_add(1);
        for (&number, hash) in snapshot.blocks.range(expected..) {
            if number != expected {
                tracing::warn!(
                    expected,
                    found = number,
                    "reorg snapshot has a gap; dropping the rest"
                );
                break;
            }
            items.push_back((number, hash.clone()));
            expected = expected.saturating_add(1);
        }

        Self { items }
    }

    /// Exports the window anchored at its earliest entry, or `None` when nothing is tracked.
    pub fn snapshot(&self) -> Option<ReorgSnapshot> {
        let mut entries = self.items.iter();
        let (finalized_number, finalized_hash) = entries.next()?;
        Some(ReorgSnapshot {
            finalized_number: *finalized_number,
            finalized_hash: finalized_hash.clone(),
            blocks: entries.cloned().collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn earliest(&self) -> Option<u64> {
        self.items.front().map(|(number, _)| *number)
    }

    pub fn latest(&self) -> Option<u64> {
        self.items.back().map(|(number, _)| *number)
    }

    pub fn hash_of(&self, number: u64) -> Option<&str> {
        let earliest = self.earliest()?;
        let offset = usize::try_from(number.checked_sub(earliest)?).ok()?;
        self.items.get(offset).map(|(_, hash)| hash.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &str)> {
        self.items
            .iter()
            .map(|(number, hash)| (*number, hash.as_str()))
    }

    pub fn push(&mut self, number: u64, hash: impl Into<String>, parent_hash: &str) -> PushOutcome {
        let Some((latest, latest_hash)) = self.items.back() else {
            self.items.push_back((number, hash.into()));
            return PushOutcome::Appended;
        };

        if Some(number) != latest.checked_add(1) {
            return PushOutcome::Rejected;
        }

        if latest_hash == parent_hash {
            self.items.push_back((number, hash.into()));
            return PushOutcome::Appended;
        }

        tracing::debug!(
            number,
            parent_hash,
            tip = *latest,
            tip_hash = %latest_hash,
            "parent mismatch; dropping tip"
        );
        self.items.pop_back();
        PushOutcome::Popped
    }

    /// Drops every entry numbered at or below `finalized`. Returns how many were removed.
    pub fn evict(&mut self, finalized: u64) -> usize {
        let before = self.items.len();
        while matches!(self.items.front(), Some((number, _)) if *number <= finalized) {
            self.items.pop_front();
        }
        before - self.items.len()
    }
}
