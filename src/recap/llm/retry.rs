use anyhow::{Result, anyhow};
use std::future::Future;
use std::time::Duration;

use crate::recap::config::LlmSettings;
use crate::ui::prelude::{Level, emit};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &LlmSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
        }
    }

    /// Delay after the given failed attempt (1-based): `base * 2^(attempt-1)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// Run `op` until it succeeds or `max_attempts` is spent. The closure gets the
/// 1-based attempt number.
pub async fn retry_with_backoff<T, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt < policy.max_attempts {
                    let delay = policy.delay_after(attempt);
                    emit(
                        Level::Warn,
                        "recap.llm.retry",
                        &format!(
                            "{} failed on attempt {}/{}: {:#}; retrying in {:?}",
                            label, attempt, policy.max_attempts, err, delay
                        ),
                        None,
                    );
                    tokio::time::sleep(delay).await;
                }
                last_error = Some(err);
            }
        }
    }

    let err = last_error.unwrap_or_else(|| anyhow!("no attempts were made"));
    Err(err.context(format!(
        "{} failed after {} attempts",
        label, policy.max_attempts
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }

    #[test]
    fn delays_double() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(4000));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let value = retry_with_backoff(instant(3), "select", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    anyhow::bail!("flaky")
                }
                Ok(attempt)
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_at_ceiling() {
        let calls = AtomicU32::new(0);
        let err = retry_with_backoff(instant(2), "narrate", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(anyhow!("bad json")) }
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let text = format!("{err:#}");
        assert!(text.contains("narrate failed after 2 attempts"));
        assert!(text.contains("bad json"));
    }
}
