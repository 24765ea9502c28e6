use clap::ValueEnum;
use std::time::Duration;

/// Backoff mode between session connection attempts.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum RetryStrategy {
    /// Wait the base interval before every attempt.
    Fixed,
    /// Grow the wait by 1.75x the base interval per failed attempt.
    Incr,
}

#[derive(Copy, Clone, Debug)]
pub struct RetryConfig {
    pub interval: Duration,
    pub strategy: RetryStrategy,
    pub max_attempts: u32,
}

impl RetryConfig {
    pub fn new(interval: Duration, strategy: RetryStrategy, max_attempts: u32) -> Self {
        Self {
            interval,
            strategy,
            max_attempts,
        }
    }

    /// Delay to wait before retrying after `attempt` failures.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.strategy {
            RetryStrategy::Fixed => self.interval,
            RetryStrategy::Incr => self.interval.mul_f64(1.75 * f64::from(attempt + 1)),
        }
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), RetryStrategy::Fixed, 6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_strategy_keeps_the_base_interval() {
        let config = RetryConfig::new(Duration::from_secs(10), RetryStrategy::Fixed, 3);
        assert_eq!(config.delay_for(0), Duration::from_secs(10));
        assert_eq!(config.delay_for(5), Duration::from_secs(10));
    }

    #[test]
    fn incremental_strategy_scales_with_attempts() {
        let config = RetryConfig::new(Duration::from_secs(10), RetryStrategy::Incr, 3);
        assert_eq!(config.delay_for(0), Duration::from_secs_f64(17.5));
        assert_eq!(config.delay_for(1), Duration::from_secs_f64(35.0));
        assert_eq!(config.delay_for(2), Duration::from_secs_f64(52.5));
    }

    #[test]
    fn attempts_are_bounded() {
        let config = RetryConfig::new(Duration::from_secs(1), RetryStrategy::Fixed, 3);
        assert!(!config.exhausted(2));
        assert!(config.exhausted(3));
        assert!(config.exhausted(4));
    }
}
