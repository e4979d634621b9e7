use std::time::{Duration, Instant};

/// Slice size when no rate limit is set.
pub const UNLIMITED_SLICE: usize = 64 * 1024;

/// Paces writes to a bytes-per-second budget.
///
/// Data is handled in slices of a tenth of the budget. After each slice the
/// caller sleeps for however far ahead of the ideal schedule the transfer is.
#[derive(Debug)]
pub struct Throttle {
    bytes_per_second: u64,
    started:          Instant,
    sent:             u64,
}

impl Throttle {
    pub fn new(bytes_per_second: u64) -> Self {
        Self {
            bytes_per_second,
            started: Instant::now(),
            sent: 0,
        }
    }

    pub fn bytes_per_second(&self) -> u64 { self.bytes_per_second }

    pub fn slice_len(&self) -> usize {
        match self.bytes_per_second {
            0 => UNLIMITED_SLICE,
            bps => (bps / 10).max(1) as usize,
        }
    }

    /// Account for `n` bytes and return how long to sleep before the next slice.
    pub fn record(&mut self, n: usize) -> Duration {
        self.sent += n as u64;
        delay_for(self.bytes_per_second, self.sent, self.started.elapsed())
    }
}

/// Time still owed after sending `sent` bytes in `elapsed` at `bytes_per_second`.
pub fn delay_for(bytes_per_second: u64, sent: u64, elapsed: Duration) -> Duration {
    if bytes_per_second == 0 {
        return Duration::ZERO;
    }
    let ideal = Duration::from_secs_f64(sent as f64 / bytes_per_second as f64);
    ideal.saturating_sub(elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_len() {
        assert_eq!(Throttle::new(0).slice_len(), UNLIMITED_SLICE);
        assert_eq!(Throttle::new(1000).slice_len(), 100);
        assert_eq!(Throttle::new(5).slice_len(), 1);
    }

    #[test]
    fn test_delay_for() {
        assert_eq!(delay_for(0, 1_000_000, Duration::ZERO), Duration::ZERO);
        assert_eq!(
            delay_for(1000, 500, Duration::from_millis(100)),
            Duration::from_millis(400)
        );
        assert_eq!(delay_for(1000, 500, Duration::from_secs(2)), Duration::ZERO);
    }

    #[test]
    fn test_record_accumulates() {
        let mut throttle = Throttle::new(1000);
        let first = throttle.record(100);
        let second = throttle.record(100);
        assert!(first <= Duration::from_millis(100));
        assert!(second > first);
        assert!(second <= Duration::from_millis(200));
    }
}
