//! Bounded transfer-rate history.

use std::collections::VecDeque;

use floodgate_gateway::model::{TransferHistory, TransferSample};

/// Default number of retained samples.
pub const DEFAULT_HISTORY_CAPACITY: usize = 120;

/// Fixed-capacity ring of transfer-rate samples.
///
/// History has no diffable snapshot form; it is emitted in full whenever it
/// changes, so the ring stays small.
#[derive(Debug)]
pub struct TransferHistoryRing {
    samples: VecDeque<TransferSample>,
    capacity: usize,
}

impl TransferHistoryRing {
    /// Construct a ring retaining `capacity` samples.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "history capacity must be positive");
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a sample, evicting the oldest when the ring is full.
    pub fn push(&mut self, sample: TransferSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// The current window, oldest sample first.
    #[must_use]
    pub fn snapshot(&self) -> TransferHistory {
        TransferHistory {
            samples: self.samples.iter().copied().collect(),
        }
    }
}

impl Default for TransferHistoryRing {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}
