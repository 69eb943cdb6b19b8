//! Transport call logging middleware.
//!
//! This middleware logs every transport call and its outcome using the
//! `tracing` crate.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use serde_json::Value;
use tower::{Layer, Service};
use tracing::{Instrument, Level, debug, info, span, warn};

use crate::TransportConfig;

/// Layer that adds transport call logging.
///
/// # Example
///
/// ```ignore
/// use tether::HyperTransport;
/// use tether::middleware::LoggingLayer;
///
/// let transport = HyperTransport::builder()
///     .layer(LoggingLayer::new())
///     .build();
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingLayer {
    level: LogLevel,
}

/// Log level for the logging middleware.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogLevel {
    /// Log at debug level (headers and params included).
    Debug,
    /// Log at info level (summary only).
    #[default]
    Info,
}

impl LoggingLayer {
    /// Create a new logging layer with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a logging layer that logs at debug level.
    #[must_use]
    pub fn debug() -> Self {
        Self {
            level: LogLevel::Debug,
        }
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = Logging<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Logging {
            inner,
            level: self.level,
        }
    }
}

/// Service that logs transport calls.
#[derive(Debug, Clone)]
pub struct Logging<S> {
    inner: S,
    level: LogLevel,
}

impl<S> Logging<S> {
    /// Create a new logging service wrapping the given service.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            level: LogLevel::Info,
        }
    }
}

fn status_of(value: &Value) -> i64 {
    value.get("status").and_then(Value::as_i64).unwrap_or_default()
}

impl<S> Service<TransportConfig> for Logging<S>
where
    S: Service<TransportConfig, Response = Value, Error = Value> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Value;
    type Error = Value;
    type Future = Pin<Box<dyn Future<Output = Result<Value, Value>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Value>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, config: TransportConfig) -> Self::Future {
        let method = config.method.clone();
        let url = config.url.clone();
        let level = self.level;

        let span = span!(Level::INFO, "transport_call", %method, %url);

        let mut inner = self.inner.clone();
        Box::pin(
            async move {
                let start = Instant::now();

                match level {
                    LogLevel::Debug => {
                        debug!(
                            headers = ?config.options.headers,
                            params = ?config.options.params,
                            "sending request"
                        );
                    }
                    LogLevel::Info => {
                        info!("sending request");
                    }
                }

                let result = inner.call(config).await;

                // Saturating conversion to u64
                let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

                match &result {
                    Ok(response) => {
                        info!(status = status_of(response), elapsed_ms, "request completed");
                    }
                    Err(error) => match status_of(error) {
                        0 => warn!(elapsed_ms, reason = %error["statusText"], "request failed"),
                        -1 => warn!(elapsed_ms, "request timed out"),
                        status => warn!(status, elapsed_ms, "request failed with HTTP error"),
                    },
                }

                result
            }
            .instrument(span),
        )
    }
}
