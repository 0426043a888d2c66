//! Bounded retry with exponential backoff for maps-provider calls.
//!
//! All resolvers go through [`ResilientCaller`] instead of awaiting
//! provider calls directly. A call ends in one of three ways:
//!
//! 1. **Success**: the value is returned immediately.
//! 2. **Quota/auth denial** ([`ErrorClass::Retryable`]): the call is
//!    retried with exponential backoff until [`RetryPolicy::max_retries`]
//!    attempts have been made, then the caller's default is returned.
//! 3. **Anything else** ([`ErrorClass::Fatal`]): logged, and the default
//!    is returned without further attempts.
//!
//! Nothing is raised to the caller: a listing whose lookup fails gets a
//! "feature unavailable" value and enrichment moves on.
//!
//! # Usage
//!
//! ```ignore
//! let caller = ResilientCaller::new(RetryPolicy::default());
//!
//! let routes = caller
//!     .call("directions", Vec::new(), || client.directions(&request))
//!     .await;
//! ```

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::MapsError;

/// Default number of attempts.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Backoff multiplier applied after every retry.
pub const BACKOFF_MULTIPLIER: u32 = 2;

/// How many times to try and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. `0` behaves like `1`.
    pub max_retries: u32,
    /// Delay before the second attempt; doubled for each one after.
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: DEFAULT_INITIAL_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt` (zero-based), or `None` for the
    /// first attempt.
    ///
    /// With the defaults: attempt 1 waits 1s, attempt 2 waits 2s.
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 {
            return None;
        }
        let factor = BACKOFF_MULTIPLIER.saturating_pow(attempt - 1);
        Some(self.initial_delay.saturating_mul(factor))
    }
}

/// How a failed attempt should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Quota or auth denial; worth retrying after a pause.
    Retryable,
    /// Permanent or unexpected; give up now.
    Fatal,
}

/// Errors that know their own [`ErrorClass`].
pub trait Classify {
    /// Classifies this error.
    fn classify(&self) -> ErrorClass;
}

impl Classify for MapsError {
    fn classify(&self) -> ErrorClass {
        match self {
            Self::Api { status, .. } if status.is_quota_or_denied() => ErrorClass::Retryable,
            _ => ErrorClass::Fatal,
        }
    }
}

/// Something that can pause the current task.
///
/// Backoff and page-token waits go through this so tests can observe the
/// requested delays without actually waiting.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Pauses for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Runs fallible provider calls under a [`RetryPolicy`].
#[derive(Clone)]
pub struct ResilientCaller {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for ResilientCaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientCaller")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Default for ResilientCaller {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl ResilientCaller {
    /// Creates a caller that sleeps with tokio.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_sleeper(policy, Arc::new(TokioSleeper))
    }

    /// Creates a caller with a custom [`Sleeper`].
    #[must_use]
    pub fn with_sleeper(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { policy, sleeper }
    }

    /// The policy in use.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// The sleeper in use.
    #[must_use]
    pub fn sleeper(&self) -> &Arc<dyn Sleeper> {
        &self.sleeper
    }

    /// Runs `operation`, returning its value or `default` once retries are
    /// exhausted or a fatal error occurs.
    pub async fn call<T, E, F, Fut>(&self, label: &str, default: T, operation: F) -> T
    where
        E: Classify + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.try_call(label, operation).await.unwrap_or(default)
    }

    /// Like [`Self::call`] but returns `None` instead of a default, so the
    /// caller can tell a real answer from a degraded one.
    pub async fn try_call<T, E, F, Fut>(&self, label: &str, operation: F) -> Option<T>
    where
        E: Classify + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.try_call_classified(label, |e: &E| e.classify(), operation)
            .await
    }

    /// Runs `operation` with an explicit error classifier.
    ///
    /// Returns `None` when the last attempt failed with a retryable error
    /// or any attempt failed with a fatal one.
    pub async fn try_call_classified<T, E, C, F, Fut>(
        &self,
        label: &str,
        classify: C,
        mut operation: F,
    ) -> Option<T>
    where
        E: Display,
        C: Fn(&E) -> ErrorClass,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_retries = self.policy.max_retries.max(1);

        for attempt in 0..max_retries {
            if let Some(delay) = self.policy.delay_before(attempt) {
                self.sleeper.sleep(delay).await;
            }

            match operation().await {
                Ok(value) => return Some(value),
                Err(e) => match classify(&e) {
                    ErrorClass::Retryable if attempt + 1 < max_retries => {
                        let next = self.policy.delay_before(attempt + 1).unwrap_or_default();
                        log::warn!(
                            "{label}: {e} (attempt {}/{max_retries}), retrying in {next:?}...",
                            attempt + 1,
                        );
                    }
                    ErrorClass::Retryable => {
                        log::warn!(
                            "{label}: {e} on final attempt {max_retries}/{max_retries}, \
                             falling back to default"
                        );
                    }
                    ErrorClass::Fatal => {
                        log::error!("{label}: unrecoverable error, falling back to default: {e}");
                        return None;
                    }
                },
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::ApiStatus;

    /// Records requested sleeps instead of sleeping.
    #[derive(Default)]
    struct RecordingSleeper {
        sleeps: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    fn quota_error() -> MapsError {
        MapsError::Api {
            status: ApiStatus::OverQueryLimit,
            message: "slow down".to_string(),
        }
    }

    fn caller(sleeper: &Arc<RecordingSleeper>) -> ResilientCaller {
        ResilientCaller::with_sleeper(
            RetryPolicy::default(),
            Arc::clone(sleeper) as Arc<dyn Sleeper>,
        )
    }

    #[test]
    fn delays_double() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_delay: Duration::from_millis(250),
        };
        assert_eq!(policy.delay_before(0), None);
        assert_eq!(policy.delay_before(1), Some(Duration::from_millis(250)));
        assert_eq!(policy.delay_before(2), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_before(4), Some(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn succeeds_after_two_quota_errors() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = &AtomicU32::new(0);

        let result = caller(&sleeper)
            .call("test", 0, move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(quota_error())
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            *sleeper.sleeps.lock().unwrap(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn exhausted_quota_returns_default() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = &AtomicU32::new(0);

        let result = caller(&sleeper)
            .call("test", vec!["default"], move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<Vec<&str>, _>(quota_error())
            })
            .await;

        assert_eq!(result, vec!["default"]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.sleeps.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn fatal_error_returns_default_without_retry() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = &AtomicU32::new(0);

        let result = caller(&sleeper)
            .try_call("test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(MapsError::Api {
                    status: ApiStatus::InvalidRequest,
                    message: "bad".to_string(),
                })
            })
            .await;

        assert_eq!(result, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.sleeps.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unexpected_error_is_fatal() {
        let sleeper = Arc::new(RecordingSleeper::default());

        let result = caller(&sleeper)
            .call("test", -1, move || async move {
                Err::<i32, _>(MapsError::Unexpected {
                    message: "boom".to_string(),
                })
            })
            .await;

        assert_eq!(result, -1);
        assert!(sleeper.sleeps.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn quota_then_fatal_stops() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = &AtomicU32::new(0);

        let result = caller(&sleeper)
            .try_call("test", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err::<i32, _>(quota_error())
                } else {
                    Err(MapsError::Unexpected {
                        message: "boom".to_string(),
                    })
                }
            })
            .await;

        assert_eq!(result, None);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(*sleeper.sleeps.lock().unwrap(), vec![Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn custom_classifier() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = &AtomicU32::new(0);

        let result = caller(&sleeper)
            .try_call_classified(
                "test",
                |_e: &String| ErrorClass::Retryable,
                move || async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err("flaky".to_string())
                    } else {
                        Ok("done")
                    }
                },
            )
            .await;

        assert_eq!(result, Some("done"));
        assert_eq!(sleeper.sleeps.lock().unwrap().len(), 1);
    }
}
