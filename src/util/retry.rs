use std::time::Duration;

/// Fixed-delay retry policy for queued jobs.
///
/// Attempts are counted from zero; a job with `max_retries = 5` runs at most
/// six times (the first run plus five retries).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: i32,
    delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: i32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    #[must_use]
    pub fn max_retries(&self) -> i32 {
        self.max_retries
    }

    /// Whether a job that has already failed `retry_count` times may run again.
    #[must_use]
    pub fn can_retry(&self, retry_count: i32) -> bool {
        retry_count < self.max_retries
    }

    /// Delay before the next attempt. The schedule is flat; `retry_count`
    /// never changes it.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            delay: Duration::from_secs(90),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_allows_five_retries() {
        let policy = RetryPolicy::default();
        assert!(policy.can_retry(0));
        assert!(policy.can_retry(4));
        assert!(!policy.can_retry(5));
        assert!(!policy.can_retry(6));
        assert_eq!(policy.delay(), Duration::from_secs(90));
    }

    #[test]
    fn zero_retries_means_single_attempt() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1));
        assert!(!policy.can_retry(0));
    }
}
