//! Instantaneous rate and ETA derivation from cumulative counters.

use std::collections::HashMap;

use crate::model::Eta;

/// Derives moving instantaneous rates from noisy cumulative counters.
///
/// The computer retains the last `(timestamp, counter)` pair per logical key
/// so repeated calls produce the rate over the most recent window rather than
/// an average since epoch. A counter that decreases (daemon restart, counter
/// reset) clamps the rate to zero instead of going negative.
#[derive(Debug, Default)]
pub struct RateComputer {
    samples: HashMap<String, (i64, u64)>,
}

impl RateComputer {
    /// Construct an empty computer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample for `key` and return the rate in counter units per
    /// second since the previous sample.
    ///
    /// The first observation of a key, a non-advancing clock, and a counter
    /// reset all yield `0`.
    pub fn sample(&mut self, key: &str, timestamp_ms: i64, counter: u64) -> u64 {
        let previous = self
            .samples
            .insert(key.to_owned(), (timestamp_ms, counter));
        let Some((prev_ts, prev_counter)) = previous else {
            return 0;
        };

        let elapsed_ms = timestamp_ms - prev_ts;
        if elapsed_ms <= 0 || counter < prev_counter {
            return 0;
        }

        #[allow(clippy::cast_sign_loss)]
        let elapsed_ms = elapsed_ms as u64;
        (counter - prev_counter) * 1_000 / elapsed_ms
    }

    /// Forget every sample recorded for keys starting with `prefix`.
    ///
    /// Used when a backend session ends so a reconnect does not diff against
    /// stale counters.
    pub fn forget_prefix(&mut self, prefix: &str) {
        self.samples.retain(|key, _| !key.starts_with(prefix));
    }
}

/// Time remaining for `remaining` bytes at `rate` bytes per second.
///
/// A zero rate yields the infinite sentinel rather than an error.
#[must_use]
pub const fn eta(remaining: u64, rate: u64) -> Eta {
    if rate == 0 {
        Eta::Infinite
    } else {
        Eta::Seconds(remaining / rate)
    }
}
