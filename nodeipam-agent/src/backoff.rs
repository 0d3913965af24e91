//! Per-object exponential requeue delays for failed reconciliations.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::Duration,
};

const BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(60 * 5);

/// Tracks consecutive failures by object key. The n-th failure in a row is
/// requeued after `BASE_DELAY * 2^(n-1)`, capped at `MAX_DELAY`.
#[derive(Debug, Default)]
pub struct Backoff {
    failures: Mutex<HashMap<String, u32>>,
}

impl Backoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records another failure for `key` and returns how long to wait.
    pub fn next_delay(&self, key: &str) -> Duration {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let count = failures.entry(key.to_owned()).or_default();
        let delay = delay_for(*count);

        *count = count.saturating_add(1);

        delay
    }

    pub fn reset(&self, key: &str) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

fn delay_for(previous_failures: u32) -> Duration {
    2u32.checked_pow(previous_failures)
        .and_then(|factor| BASE_DELAY.checked_mul(factor))
        .map_or(MAX_DELAY, |delay| delay.min(MAX_DELAY))
}
