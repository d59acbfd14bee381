//! Exponential reconnect delay.

use std::time::Duration;

/// Doubling delay between failed connect attempts, capped at `max`.
///
/// ```rust
/// use std::time::Duration;
/// use simlink_client::infrastructure::network::RetryPolicy;
///
/// let mut retry = RetryPolicy::new(Duration::from_millis(250), Duration::from_secs(1));
/// assert_eq!(retry.next_delay(), Duration::from_millis(250));
/// assert_eq!(retry.next_delay(), Duration::from_millis(500));
/// assert_eq!(retry.next_delay(), Duration::from_secs(1));
/// assert_eq!(retry.next_delay(), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl RetryPolicy {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait before the next attempt.  Each call doubles the delay
    /// that the following call will return.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Back to the initial delay; called after a successful connect.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_restores_initial_delay() {
        // Arrange
        let mut retry = RetryPolicy::new(Duration::from_millis(100), Duration::from_secs(10));
        retry.next_delay();
        retry.next_delay();

        // Act
        retry.reset();

        // Assert
        assert_eq!(retry.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_max_below_initial_is_raised_to_initial() {
        let mut retry = RetryPolicy::new(Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(retry.next_delay(), Duration::from_secs(2));
        assert_eq!(retry.next_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_zero_initial_stays_zero() {
        let mut retry = RetryPolicy::new(Duration::ZERO, Duration::from_secs(1));
        assert_eq!(retry.next_delay(), Duration::ZERO);
        assert_eq!(retry.next_delay(), Duration::ZERO);
    }
}
