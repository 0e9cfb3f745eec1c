use anyhow::Result;
use backon::{ExponentialBuilder, Retryable};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(8);

/// Wraps a failure worth another attempt. Anything not wrapped is returned
/// to the caller on the first failure.
#[derive(Debug)]
pub(crate) struct Transient(anyhow::Error);

impl fmt::Display for Transient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

impl std::error::Error for Transient {}

pub(crate) fn transient(err: anyhow::Error) -> anyhow::Error {
    anyhow::Error::new(Transient(err))
}

pub(crate) fn is_transient(err: &anyhow::Error) -> bool {
    err.downcast_ref::<Transient>().is_some()
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    max_retries: u32,
    min_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub(crate) fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            min_delay: DEFAULT_MIN_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    #[cfg(test)]
    fn with_delays(mut self, min_delay: Duration, max_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self.max_delay = max_delay;
        self
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_factor(2.0)
            .with_max_times(self.max_retries as usize)
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or
    /// `max_retries` extra attempts are spent.
    pub(crate) async fn run<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_retries = self.max_retries;
        op.retry(self.backoff())
            .when(is_transient)
            .notify(|err: &anyhow::Error, wait: Duration| {
                warn!(
                    max_retries,
                    wait_ms = wait.as_millis() as u64,
                    error = %err,
                    "transient model error, retrying"
                );
            })
            .await
            .map_err(|err| {
                if is_transient(&err) {
                    err.context(format!(
                        "Model request still failing after {max_retries} retries"
                    ))
                } else {
                    err
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use backon::BackoffBuilder;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::{RetryPolicy, is_transient, transient};

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries).with_delays(Duration::ZERO, Duration::ZERO)
    }

    #[test]
    fn backoff_starts_at_half_a_second_and_caps_at_eight() {
        let delays: Vec<Duration> = RetryPolicy::new(6).backoff().build().collect();
        assert_eq!(delays.len(), 6);
        assert_eq!(delays[0], Duration::from_millis(500));
        assert_eq!(delays[1], Duration::from_secs(1));
        assert_eq!(delays[5], Duration::from_secs(8));
        assert!(delays.iter().all(|delay| *delay <= Duration::from_secs(8)));
    }

    #[test]
    fn zero_retries_yields_no_delays() {
        assert_eq!(RetryPolicy::new(0).backoff().build().count(), 0);
    }

    #[test]
    fn transient_marker_survives_context_and_keeps_message() {
        let err = transient(anyhow!("503 upstream busy"));
        assert!(is_transient(&err));
        assert!(err.to_string().contains("503 upstream busy"));
        assert!(!is_transient(&anyhow!("401 unauthorized")));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures_within_budget() {
        let calls = AtomicU32::new(0);
        let value = fast(2)
            .run(|| {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(transient(anyhow!("503")))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await
            .expect("third attempt should succeed");

        assert_eq!(value, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let err = fast(2)
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(transient(anyhow!("429 rate limited"))) }
            })
            .await
            .expect_err("should exhaust retries");

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let msg = format!("{err:#}");
        assert!(msg.contains("after 2 retries"), "unexpected message: {msg}");
        assert!(msg.contains("429 rate limited"), "unexpected message: {msg}");
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let err = fast(2)
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(anyhow!("401 unauthorized")) }
            })
            .await
            .expect_err("fatal error should surface");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.to_string(), "401 unauthorized");
    }
}
