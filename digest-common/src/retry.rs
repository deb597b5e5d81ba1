use std::time::Duration;

/// Exponential backoff calculation shared by the Budgeted Fetcher (C1) and
/// the LLM Client (C3).
#[derive(Copy, Clone, Debug)]
pub struct RetryPolicy {
    /// Coefficient to multiply initial_interval with for every past attempt.
    backoff_coefficient: u32,
    /// The backoff interval for the first retry.
    initial_interval: Duration,
    /// The maximum possible backoff between retries.
    maximum_interval: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(
        backoff_coefficient: u32,
        initial_interval: Duration,
        maximum_interval: Option<Duration>,
    ) -> Self {
        Self {
            backoff_coefficient,
            initial_interval,
            maximum_interval,
        }
    }

    /// Calculate the delay before the next retry attempt (0-indexed).
    ///
    /// `provider_min_delay` is a floor below which the computed delay is
    /// never allowed to drop, used for provider-mandated 429 cooldowns
    /// (e.g. a `Retry-After` header) that exceed what plain exponential
    /// backoff would produce.
    pub fn delay_for_attempt(&self, attempt: u32, provider_min_delay: Option<Duration>) -> Duration {
        let candidate_interval = self.initial_interval * self.backoff_coefficient.pow(attempt);

        match (provider_min_delay, self.maximum_interval) {
            (Some(floor), Some(max_interval)) => std::cmp::min(
                std::cmp::max(std::cmp::min(candidate_interval, max_interval), floor),
                max_interval,
            ),
            (Some(floor), None) => std::cmp::max(candidate_interval, floor),
            (None, Some(max_interval)) => std::cmp::min(candidate_interval, max_interval),
            (None, None) => candidate_interval,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_coefficient: 2,
            initial_interval: Duration::from_millis(500),
            maximum_interval: Some(Duration::from_secs(30)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backs_off_exponentially() {
        let policy = RetryPolicy::new(2, Duration::from_millis(100), None);
        assert_eq!(policy.delay_for_attempt(0, None), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1, None), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2, None), Duration::from_millis(400));
    }

    #[test]
    fn caps_at_maximum_interval() {
        let policy = RetryPolicy::new(2, Duration::from_secs(1), Some(Duration::from_secs(5)));
        assert_eq!(policy.delay_for_attempt(10, None), Duration::from_secs(5));
    }

    #[test]
    fn respects_provider_floor_even_past_maximum() {
        let policy = RetryPolicy::new(2, Duration::from_millis(100), Some(Duration::from_secs(2)));
        let floor = Duration::from_secs(10);
        assert_eq!(policy.delay_for_attempt(0, Some(floor)), floor);
    }
}
