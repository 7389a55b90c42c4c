//! Retry with exponential backoff
//!
//! Wraps a fallible control-plane call with bounded-time retry. Which
//! error kinds count as transient is declared by the call site, never
//! blanket-assumed: a conflict during table creation is retryable, the
//! same conflict while attaching an integration means "already present".

use crate::error::{CloudError, ErrorKind, Result};
use std::time::Duration;
use tokio::time::Instant;

/// Backoff tuning for one call site.
///
/// Retry is unbounded in attempt count but bounded in elapsed time: the
/// control plane is slow to propagate (IAM especially), so a small fixed
/// attempt limit gives up too early while a time budget does not.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier applied per attempt.
    pub multiplier: f64,

    /// Ceiling on the per-attempt delay.
    pub max_delay: Duration,

    /// Total elapsed-time budget; the last error surfaces once exceeded.
    pub budget: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            budget: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Policy with millisecond-scale delays, for tests.
    pub fn fast() -> Self {
        Self {
            base_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_delay: Duration::from_millis(5),
            budget: Duration::from_millis(250),
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// elapsed budget is exhausted. On exhaustion the operation's last error
/// is surfaced unchanged.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, retryable: &[ErrorKind], mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let mut delay = policy.base_delay;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !retryable.contains(&err.kind()) {
            return Err(err);
        }
        if started.elapsed() + delay > policy.budget {
            tracing::debug!(error = %err, "retry budget exhausted");
            return Err(err);
        }
        tracing::debug!(error = %err, delay_ms = delay.as_millis() as u64, "transient, retrying");
        tokio::time::sleep(delay).await;
        delay = delay.mul_f64(policy.multiplier).min(policy.max_delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_errors() {
        let calls = AtomicU32::new(0);
        let result = retry(&RetryPolicy::fast(), &[ErrorKind::Throttled], {
            let calls = &calls;
            move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(CloudError::Throttled("slow down".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_propagates_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = retry(&RetryPolicy::fast(), &[ErrorKind::Throttled], {
            let calls = &calls;
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CloudError::MalformedInput("bad document".into()))
            }
        })
        .await;
        assert!(matches!(result, Err(CloudError::MalformedInput(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn budget_exhaustion_surfaces_last_error() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_delay: Duration::from_millis(2),
            budget: Duration::from_millis(10),
        };
        let result: Result<u32> = retry(&policy, &[ErrorKind::Conflict], || async {
            Err(CloudError::Conflict("still deleting".into()))
        })
        .await;
        assert!(matches!(result, Err(CloudError::Conflict(_))));
    }

    #[tokio::test]
    async fn retryable_filter_is_per_call() {
        // NotFound is retryable here (eventual consistency) but a conflict
        // is not, so the conflict must pass through untouched.
        let result: Result<u32> = retry(&RetryPolicy::fast(), &[ErrorKind::NotFound], || async {
            Err(CloudError::Conflict("foreign binding".into()))
        })
        .await;
        assert!(matches!(result, Err(CloudError::Conflict(_))));
    }
}
