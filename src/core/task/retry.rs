use std::time::Duration;

use crate::config::Config;

/// 失败分段的重试策略
///
/// 默认不限次数、不等待，失败的分段在下一次轮询时立即重新下载。
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 0 表示不限次数
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64, // 抖动因子，避免所有分段同时重试
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.max_segment_retries,
            base_delay: Duration::from_millis(config.retry_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms.max(config.retry_delay_ms)),
            ..Self::default()
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_retries == 0
    }

    /// `retries` 为该分段已经重试过的次数
    pub fn allows(&self, retries: u32) -> bool {
        self.is_unbounded() || retries < self.max_retries
    }

    /// 第 `retries` 次重试之前的等待时间
    pub fn delay(&self, retries: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exp = retries.min(16) as i32;
        let secs = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exp);
        let jitter = secs * self.jitter_factor * (rand::random::<f64>() - 0.5);
        Duration::from_secs_f64((secs + jitter).max(0.0)).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unbounded_without_delay() {
        let policy = RetryPolicy::default();
        assert!(policy.allows(0));
        assert!(policy.allows(1_000_000));
        assert_eq!(policy.delay(5), Duration::ZERO);
    }

    #[test]
    fn test_bounded_policy() {
        let policy = RetryPolicy { max_retries: 3, ..RetryPolicy::default() };
        assert!(policy.allows(2));
        assert!(!policy.allows(3));
    }

    #[test]
    fn test_backoff_grows_and_is_capped() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter_factor: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
        assert_eq!(policy.delay(10), Duration::from_secs(1));
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.max_segment_retries = 5;
        config.retry_delay_ms = 200;
        config.retry_max_delay_ms = 100;
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.max_delay, Duration::from_millis(200));
    }
}
