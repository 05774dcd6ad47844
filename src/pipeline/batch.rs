//! Splits the uncached keys into fixed-size batches.

use std::collections::VecDeque;

use crate::models::object::ObjectKey;

/// One slice of work handed to the fetch/ingest/reclaim cycle.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Zero-based batch number.
    pub index: usize,
    pub keys: Vec<ObjectKey>,
    /// Keys handed out in earlier batches.
    pub done_before: usize,
    /// Keys discovered in total.
    pub total: usize,
}

impl Batch {
    /// Share of all discovered keys handed out before this batch, in percent.
    pub fn percent_done(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.done_before as f64 / self.total as f64 * 100.0
    }
}

/// Hands out consecutive batches, in order, releasing keys as it goes so
/// the pending set shrinks while the run progresses.
#[derive(Debug)]
pub struct BatchScheduler {
    pending: VecDeque<ObjectKey>,
    batch_size: usize,
    total: usize,
    next_index: usize,
}

impl BatchScheduler {
    pub fn new(keys: Vec<ObjectKey>, batch_size: usize) -> Self {
        let total = keys.len();
        Self {
            pending: keys.into(),
            batch_size: batch_size.max(1),
            total,
            next_index: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl Iterator for BatchScheduler {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.pending.is_empty() {
            return None;
        }

        let done_before = self.total - self.pending.len();
        let take = self.batch_size.min(self.pending.len());
        let keys: Vec<ObjectKey> = self.pending.drain(..take).collect();

        let batch = Batch {
            index: self.next_index,
            keys,
            done_before,
            total: self.total,
        };
        self.next_index += 1;
        Some(batch)
    }
}
