use super::task::TaskResult;
use std::collections::HashMap;

/// Buffer that only releases task results in index order.
///
/// Results that complete ahead of the oldest undelivered index are parked in a map until the gap
/// fills; each index is released exactly once.
pub(crate) struct OrderedResults<V> {
    next_expected: usize,
    pending: HashMap<usize, TaskResult<V>>,
}

impl<V> OrderedResults<V> {
    pub(crate) fn new() -> Self {
        Self {
            next_expected: 0,
            pending: HashMap::new(),
        }
    }

    /// Parks a completed result. Results below the delivery cursor or duplicates are ignored.
    pub(crate) fn insert(&mut self, result: TaskResult<V>) {
        if result.index < self.next_expected {
            tracing::warn!(
                index = result.index,
                next_expected = self.next_expected,
                "dropping task result that was already delivered"
            );
            return;
        }
        self.pending.entry(result.index).or_insert(result);
    }

    pub(crate) fn pop_ready(&mut self) -> Option<TaskResult<V>> {
        let result = self.pending.remove(&self.next_expected)?;
        self.next_expected += 1;
        Some(result)
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn next_expected(&self) -> usize {
        self.next_expected
    }
}
