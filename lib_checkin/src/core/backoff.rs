//! Exponential reconnect backoff.

use std::time::Duration;

use crate::configs::SyncConfig;

/// Delay before reconnect attempt `attempt` (1-based):
/// `base * 2^min(attempt - 1, cap_exponent)`.
pub fn reconnect_delay(attempt: u32, base: Duration, cap_exponent: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(cap_exponent);
    base.saturating_mul(2u32.saturating_pow(exponent))
}

/// Reconnect limits and delay curve for one connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub cap_exponent: u32,
}

impl ReconnectPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            max_attempts: config.max_reconnect_attempts,
            base_delay: Duration::from_millis(config.reconnect_base_delay_ms),
            cap_exponent: config.reconnect_cap_exponent,
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        reconnect_delay(attempt, self.base_delay, self.cap_exponent)
    }

    /// Whether another attempt may follow `failures` consecutive failed ones.
    pub fn should_retry(&self, failures: u32) -> bool {
        failures < self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_delays_double_from_one_second() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u128> = (1..=5).map(|a| policy.delay(a).as_millis()).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
    }

    #[test]
    fn test_delay_caps_at_sixteen_seconds() {
        let base = Duration::from_millis(1000);
        assert_eq!(reconnect_delay(6, base, 4), Duration::from_secs(16));
        assert_eq!(reconnect_delay(40, base, 4), Duration::from_secs(16));
    }

    #[test]
    fn test_attempt_zero_uses_base_delay() {
        assert_eq!(reconnect_delay(0, Duration::from_millis(250), 4), Duration::from_millis(250));
    }

    #[test]
    fn test_should_retry_stops_at_max_attempts() {
        let policy = ReconnectPolicy::default();
        assert!(policy.should_retry(4));
        assert!(!policy.should_retry(5));
    }
}
