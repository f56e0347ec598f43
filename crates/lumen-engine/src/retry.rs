use std::thread;
use std::time::Duration;

use anyhow::Result;

use crate::error::{classify, FailureKind};

pub const DEFAULT_QUOTA_COOLDOWN: Duration = Duration::from_secs(15);
pub const IMAGE_QUOTA_COOLDOWN: Duration = Duration::from_secs(18);
pub const DEFAULT_UNAVAILABLE_DELAY: Duration = Duration::from_secs(5);

pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    FailFast,
}

/// Bounded, classified retry around a remote call.
///
/// `retries` counts attempts after the first one. Rate limits and 503s wait
/// a fixed delay and try again while budget remains; every other failure is
/// returned on the spot. Once the budget is spent the last error is returned
/// unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: usize,
    pub quota_cooldown: Duration,
    pub unavailable_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            quota_cooldown: DEFAULT_QUOTA_COOLDOWN,
            unavailable_delay: DEFAULT_UNAVAILABLE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn with_retries(retries: usize) -> Self {
        Self {
            retries,
            ..Self::default()
        }
    }

    pub fn quota_cooldown(mut self, cooldown: Duration) -> Self {
        self.quota_cooldown = cooldown;
        self
    }

    pub fn unavailable_delay(mut self, delay: Duration) -> Self {
        self.unavailable_delay = delay;
        self
    }

    pub fn decide(&self, kind: FailureKind) -> RetryDecision {
        match kind {
            FailureKind::RateLimited => RetryDecision::RetryAfter(self.quota_cooldown),
            FailureKind::ServiceUnavailable => RetryDecision::RetryAfter(self.unavailable_delay),
            _ => RetryDecision::FailFast,
        }
    }

    pub fn run<T, F>(&self, sleeper: &dyn Sleeper, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut remaining = self.retries;
        let mut attempt = 1usize;
        loop {
            let err = match operation() {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            let kind = classify(&err);
            let delay = match self.decide(kind) {
                RetryDecision::RetryAfter(delay) if remaining > 0 => delay,
                _ => return Err(err),
            };
            remaining -= 1;
            tracing::warn!(
                operation = label,
                attempt,
                retries_left = remaining,
                failure = %kind,
                delay_s = delay.as_secs_f64(),
                "remote call failed; retrying"
            );
            sleeper.sleep(delay);
            attempt += 1;
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::Sleeper;

    /// Records requested sleeps instead of blocking.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub(crate) fn slept(&self) -> Vec<Duration> {
            self.slept.lock().map(|rows| rows.clone()).unwrap_or_default()
        }
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            if let Ok(mut rows) = self.slept.lock() {
                rows.push(duration);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::time::Duration;

    use super::testing::RecordingSleeper;
    use super::*;
    use crate::error::ProviderError;

    fn http_err(status: u16) -> anyhow::Error {
        anyhow::Error::new(ProviderError::http("Gemini", status, "upstream said no"))
    }

    #[test]
    fn success_needs_no_sleep() -> anyhow::Result<()> {
        let sleeper = RecordingSleeper::default();
        let value = RetryPolicy::with_retries(2).run(&sleeper, "test", || Ok(7))?;
        assert_eq!(value, 7);
        assert!(sleeper.slept().is_empty());
        Ok(())
    }

    #[test]
    fn quota_waits_cooldown_then_succeeds() -> anyhow::Result<()> {
        let sleeper = RecordingSleeper::default();
        let calls = Cell::new(0);
        let value = RetryPolicy::with_retries(2).run(&sleeper, "test", || {
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                Err(http_err(429))
            } else {
                Ok("done")
            }
        })?;
        assert_eq!(value, "done");
        assert_eq!(calls.get(), 2);
        assert_eq!(sleeper.slept(), vec![DEFAULT_QUOTA_COOLDOWN]);
        Ok(())
    }

    #[test]
    fn unavailable_uses_short_delay_and_exhausts_budget() {
        let sleeper = RecordingSleeper::default();
        let calls = Cell::new(0);
        let result: anyhow::Result<()> = RetryPolicy::with_retries(2).run(&sleeper, "test", || {
            calls.set(calls.get() + 1);
            Err(http_err(503))
        });
        let err = result.err().map(|err| err.to_string()).unwrap_or_default();
        assert_eq!(err, "Gemini request failed (503): upstream said no");
        assert_eq!(calls.get(), 3);
        assert_eq!(
            sleeper.slept(),
            vec![DEFAULT_UNAVAILABLE_DELAY, DEFAULT_UNAVAILABLE_DELAY]
        );
    }

    #[test]
    fn other_failures_fail_fast() {
        let sleeper = RecordingSleeper::default();
        let calls = Cell::new(0);
        for status in [400, 403, 500] {
            calls.set(0);
            let result: anyhow::Result<()> =
                RetryPolicy::with_retries(3).run(&sleeper, "test", || {
                    calls.set(calls.get() + 1);
                    Err(http_err(status))
                });
            assert!(result.is_err());
            assert_eq!(calls.get(), 1, "{status}");
        }
        assert!(sleeper.slept().is_empty());
    }

    #[test]
    fn server_error_mentioning_unavailable_fails_fast() {
        let sleeper = RecordingSleeper::default();
        let calls = Cell::new(0);
        let result: anyhow::Result<()> = RetryPolicy::with_retries(2).run(&sleeper, "test", || {
            calls.set(calls.get() + 1);
            Err(ProviderError::http("Gemini", 500, "INTERNAL: upstream unavailable").into())
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
        assert!(sleeper.slept().is_empty());
    }

    #[test]
    fn quota_message_without_status_is_retried() {
        let sleeper = RecordingSleeper::default();
        let calls = Cell::new(0);
        let policy = RetryPolicy::with_retries(1).quota_cooldown(Duration::from_secs(18));
        let result: anyhow::Result<()> = policy.run(&sleeper, "test", || {
            calls.set(calls.get() + 1);
            Err(anyhow::anyhow!("Quota exceeded for metric"))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 2);
        assert_eq!(sleeper.slept(), vec![Duration::from_secs(18)]);
    }

    #[test]
    fn zero_budget_never_retries() {
        let sleeper = RecordingSleeper::default();
        let calls = Cell::new(0);
        let result: anyhow::Result<()> = RetryPolicy::with_retries(0).run(&sleeper, "test", || {
            calls.set(calls.get() + 1);
            Err(http_err(429))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn decide_maps_kinds() {
        let policy = RetryPolicy::default().unavailable_delay(Duration::from_secs(1));
        assert_eq!(
            policy.decide(FailureKind::ServiceUnavailable),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
        assert_eq!(policy.decide(FailureKind::SafetyBlocked), RetryDecision::FailFast);
        assert_eq!(policy.decide(FailureKind::AccessDenied), RetryDecision::FailFast);
    }
}
