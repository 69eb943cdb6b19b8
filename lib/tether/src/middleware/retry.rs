//! Retry middleware.
//!
//! [`Retry`] is an error middleware re-issuing the failed call through the
//! request's replay continuation. By default, retries:
//! - failures without a response (`status` 0 or -1)
//! - 5xx server errors
//! - 429 Too Many Requests
//!
//! A request the transport could not build carries the
//! [`INVALID_REQUEST`](crate::INVALID_REQUEST) code and is never retried.
//!
//! The replayed call runs the error chain again, so the retry count travels
//! with the request in the [`RETRY_ATTEMPT`] field. Add [`Retry`] last in the
//! error chain: the middlewares before it already ran on the replayed error.

use std::time::Duration;

use serde_json::{Map, Value};
use tracing::debug;

use crate::{Error, INVALID_REQUEST, Request, ResponseMiddleware, Step};

/// Request field holding the number of retries already issued.
pub const RETRY_ATTEMPT: &str = "retryAttempt";

/// Error middleware retrying transient failures.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tether::middleware::Retry;
/// use tether::MethodOptions;
///
/// let options = MethodOptions::new()
///     .verb("GET")
///     .url("/flaky")
///     .error(Retry::new(3).with_backoff(Duration::from_millis(100)));
/// # let _ = options;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retry {
    max_retries: u64,
    backoff: Duration,
}

impl Retry {
    /// Create a new retry middleware with the given maximum number of retries.
    #[must_use]
    pub const fn new(max_retries: u64) -> Self {
        Self {
            max_retries,
            backoff: Duration::ZERO,
        }
    }

    /// Wait before each retry, doubling the delay every attempt.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Returns `true` if the error should be retried.
    #[must_use]
    pub fn should_retry(error: &Value) -> bool {
        if error.get("code").and_then(Value::as_str) == Some(INVALID_REQUEST) {
            return false;
        }
        match error.get("status").and_then(Value::as_i64) {
            Some(status) => status <= 0 || status == 429 || status >= 500,
            None => false,
        }
    }

    fn delay(&self, attempt: u64) -> Duration {
        let factor = 1_u32
            .checked_shl(u32::try_from(attempt).unwrap_or(u32::MAX))
            .unwrap_or(u32::MAX);
        self.backoff.saturating_mul(factor)
    }
}

impl ResponseMiddleware for Retry {
    fn call<'a>(&'a self, request: &'a Request, error: Value) -> Step<'a> {
        if !Self::should_retry(&error) {
            return Step::next();
        }

        let attempt = request
            .get(RETRY_ATTEMPT)
            .and_then(Value::as_u64)
            .unwrap_or_default();
        if attempt >= self.max_retries {
            debug!(attempt, "giving up retrying");
            return Step::next();
        }
        let Some(replay) = request.replay() else {
            return Step::next();
        };

        let mut overrides = Map::new();
        overrides.insert(RETRY_ATTEMPT.to_string(), Value::from(attempt + 1));
        let delay = self.delay(attempt);

        debug!(attempt = attempt + 1, ?delay, "retrying call");
        Step::defer(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            replay
                .run_with(&overrides)
                .await
                .map(Some)
                .map_err(Error::into_rejection)
        })
    }
}
