use std::time::Duration;

/// Fixed-backoff retry ceiling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed per job; `0` retries forever.
    pub limit:   u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            limit:   3,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(limit: u32, backoff: Duration) -> Self { Self { limit, backoff } }

    pub fn unlimited(backoff: Duration) -> Self { Self { limit: 0, backoff } }

    /// Whether another attempt is allowed after `tried` failed ones.
    pub fn should_retry(&self, tried: u32) -> bool { self.limit == 0 || tried < self.limit }
}
