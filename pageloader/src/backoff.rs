/// Retry-with-backoff configuration.
///
/// A failed attempt `n` (0-based) is retried after `base_delay_ms × 2^n` while `n < limit`, so a
/// single load performs at most `limit + 1` attempts.
///
/// With `feature = "serde"`, this type implements `Serialize`/`Deserialize`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RetryPolicy {
    pub limit: u32,
    pub base_delay_ms: u64,
    /// Upper bound for a single delay. `None` leaves the doubling uncapped.
    pub max_delay_ms: Option<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            limit: 3,
            base_delay_ms: 1000,
            max_delay_ms: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(limit: u32, base_delay_ms: u64) -> Self {
        Self {
            limit,
            base_delay_ms,
            max_delay_ms: None,
        }
    }

    /// Disables automatic retries: the first failure is terminal.
    pub fn none() -> Self {
        Self::new(0, 0)
    }

    pub fn with_max_delay_ms(mut self, max_delay_ms: Option<u64>) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.limit
    }

    /// Delay before retrying after attempt `attempt` failed.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor);
        match self.max_delay_ms {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}
