use crate::RemoteError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Bounded exponential backoff for registry calls.
///
/// Only transient errors (see [`RemoteError::is_transient`]) are retried;
/// everything else is returned from the first attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based), capped at `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let raw = self.initial_delay_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        let capped = if raw.is_finite() {
            raw.min(self.max_delay_ms as f64)
        } else {
            self.max_delay_ms as f64
        };
        Duration::from_millis(capped as u64)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub fn run<T, F>(&self, what: &str, mut op: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Result<T, RemoteError>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{what} failed (attempt {attempt}/{max_attempts}): {e}; retrying in {}ms",
                        delay.as_millis()
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            multiplier: 2.0,
        }
    }

    #[test]
    fn delays_grow_and_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(5000));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(5000));
    }

    #[test]
    fn transient_errors_are_retried_until_success() {
        let calls = Cell::new(0);
        let result = fast().run("push", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(RemoteError::Network("connection reset".to_owned()))
            } else {
                Ok(7)
            }
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<(), _> = fast().run("pull", || {
            calls.set(calls.get() + 1);
            Err(RemoteError::Network("timeout".to_owned()))
        });
        assert!(matches!(result, Err(RemoteError::Network(_))));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn conflicts_are_never_retried() {
        let calls = Cell::new(0);
        let result: Result<(), _> = fast().run("upsert", || {
            calls.set(calls.get() + 1);
            Err(RemoteError::Conflict("hub/x:1.0.0".to_owned()))
        });
        assert!(matches!(result, Err(RemoteError::Conflict(_))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn none_policy_makes_one_attempt() {
        let calls = Cell::new(0);
        let _: Result<(), _> = RetryPolicy::none().run("search", || {
            calls.set(calls.get() + 1);
            Err(RemoteError::Network("down".to_owned()))
        });
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"max_attempts": 5}"#).unwrap();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_delay_ms, 500);
    }
}
