//! Reconnect backoff.
//!
//! The attempt counter is incremented before the delay is computed, so the
//! first retry waits `base * 2`.

use std::time::Duration;

/// Exponential reconnect delays with a cap and an attempt limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub base: Duration,
    /// Upper bound on any delay.
    pub cap: Duration,
    /// Retries before giving up on the socket and polling instead.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// `min(base * 2^attempt, cap)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    Retry { attempt: u32, delay: Duration },
    FallbackToPolling,
}

/// Per-session reconnect bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconnectState {
    attempt: u32,
    polling: bool,
}

impl ReconnectState {
    /// Number of failed attempts since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Check whether attempts are exhausted.
    pub fn is_polling(&self) -> bool {
        self.polling
    }

    /// Record a failed connect or a dropped connection.
    pub fn on_failure(&mut self, policy: &ReconnectPolicy) -> ReconnectDecision {
        if self.polling || self.attempt >= policy.max_attempts {
            self.polling = true;
            return ReconnectDecision::FallbackToPolling;
        }
        self.attempt += 1;
        ReconnectDecision::Retry {
            attempt: self.attempt,
            delay: policy.delay_for(self.attempt),
        }
    }

    /// The relay assigned a role on a fresh connection.
    pub fn on_connected(&mut self) {
        self.reset();
    }

    /// Start counting from zero.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.polling = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_delays_double_until_cap() {
        let policy = ReconnectPolicy::default();
        let mut state = ReconnectState::default();
        let mut delays = Vec::new();
        while let ReconnectDecision::Retry { delay, .. } = state.on_failure(&policy) {
            delays.push(delay.as_millis());
        }
        assert_eq!(
            delays,
            vec![2000, 4000, 8000, 16000, 30000, 30000, 30000, 30000, 30000, 30000]
        );
        assert!(state.is_polling());
        assert_eq!(state.on_failure(&policy), ReconnectDecision::FallbackToPolling);
    }

    #[test]
    fn test_connection_resets_counter() {
        let policy = ReconnectPolicy::default();
        let mut state = ReconnectState::default();
        state.on_failure(&policy);
        state.on_failure(&policy);
        state.on_connected();
        assert_eq!(state.attempt(), 0);
        assert_eq!(
            state.on_failure(&policy),
            ReconnectDecision::Retry {
                attempt: 1,
                delay: Duration::from_secs(2)
            }
        );
    }

    #[test]
    fn test_huge_attempts_saturate() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(64), policy.cap);
    }

    proptest! {
        #[test]
        fn delay_is_capped_power_of_two(base_ms in 1u64..5000, attempt in 0u32..40) {
            let policy = ReconnectPolicy {
                base: Duration::from_millis(base_ms),
                cap: Duration::from_secs(30),
                max_attempts: 10,
            };
            let expected = (base_ms.saturating_mul(1u64 << attempt.min(32))).min(30_000);
            prop_assert_eq!(policy.delay_for(attempt), Duration::from_millis(expected));
        }
    }
}
