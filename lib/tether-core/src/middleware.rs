//! Middleware chains and their runner.
//!
//! Three chains surround the transport call:
//!
//! | Mode | Called with | Defined value | Rejection |
//! |------|-------------|---------------|-----------|
//! | request | `(req)` | bypasses the call, resolving with it | bypasses the call, rejecting with it |
//! | success | `(req, res)` | replaces `res`, chain continues | call rejects with it, error chain skipped |
//! | error | `(req, err)` | sync: replaces `err`; async: call resolves with it | replaces `err`, chain continues |
//!
//! Middlewares run strictly one after the other; a middleware never starts
//! before the previous one has settled.
//!
//! A middleware answers with a [`Step`]. The sync/async distinction is explicit
//! because the error chain treats a synchronous value differently from a
//! future resolving with the same value.
//!
//! A deferred step may borrow the middleware and the request. A request
//! middleware can therefore await something, then write to the request before
//! the chain moves on:
//!
//! ```
//! use std::time::Duration;
//! use tether_core::{Request, RequestMiddleware, Step};
//!
//! struct FetchToken;
//!
//! impl RequestMiddleware for FetchToken {
//!     fn call<'a>(&'a self, request: &'a mut Request) -> Step<'a> {
//!         Step::defer(async move {
//!             tokio::time::sleep(Duration::from_millis(1)).await;
//!             request.insert("headers", serde_json::json!({"Authorization": "Bearer t0k3n"}));
//!             Ok(None)
//!         })
//!     }
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use derive_more::Display;
use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;
use tracing::trace;

use crate::Request;

/// Outcome of an asynchronous middleware: `Ok(None)` is "no value".
pub type StepResult = std::result::Result<Option<Value>, Value>;

/// What a middleware did.
///
/// The lifetime bounds what a deferred step may borrow. Closures return
/// `Step<'static>`.
pub enum Step<'a> {
    /// Returned nothing synchronously.
    Next,
    /// Returned a value synchronously.
    Value(Value),
    /// Returned a future.
    Defer(BoxFuture<'a, StepResult>),
}

impl<'a> Step<'a> {
    /// Nothing to report, let the chain go on.
    #[must_use]
    pub const fn next() -> Self {
        Self::Next
    }

    /// A synchronous value.
    #[must_use]
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    /// An already resolved future.
    #[must_use]
    pub fn resolve(value: Option<Value>) -> Self {
        Self::Defer(futures_util::future::ready(Ok(value)).boxed())
    }

    /// An already rejected future.
    #[must_use]
    pub fn reject(error: impl Into<Value>) -> Self {
        Self::Defer(futures_util::future::ready(Err(error.into())).boxed())
    }

    /// A future settling later.
    pub fn defer<F>(future: F) -> Self
    where
        F: Future<Output = StepResult> + Send + 'a,
    {
        Self::Defer(future.boxed())
    }

    /// Returns `true` for [`Step::Defer`].
    #[must_use]
    pub const fn is_async(&self) -> bool {
        matches!(self, Self::Defer(_))
    }

    async fn settle(self) -> Settled {
        match self {
            Self::Next => Settled::Sync(None),
            Self::Value(value) => Settled::Sync(Some(value)),
            Self::Defer(future) => Settled::Async(future.await),
        }
    }
}

impl std::fmt::Debug for Step<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Next => f.write_str("Next"),
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Defer(_) => f.write_str("Defer(..)"),
        }
    }
}

enum Settled {
    Sync(Option<Value>),
    Async(StepResult),
}

// ============================================================================
// Middleware Traits
// ============================================================================

/// A middleware of the request chain, called with the request only.
///
/// A deferred step keeps the request borrowed until it settles, so it can
/// still mutate the request after awaiting.
pub trait RequestMiddleware: Send + Sync + 'static {
    /// Inspect or mutate the request.
    fn call<'a>(&'a self, request: &'a mut Request) -> Step<'a>;
}

impl<F> RequestMiddleware for F
where
    F: Fn(&mut Request) -> Step<'static> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, request: &'a mut Request) -> Step<'a> {
        self(request)
    }
}

/// A middleware of the success or error chain, called with the request and
/// the current value.
pub trait ResponseMiddleware: Send + Sync + 'static {
    /// Inspect, replace or settle the current value.
    fn call<'a>(&'a self, request: &'a Request, value: Value) -> Step<'a>;
}

impl<F> ResponseMiddleware for F
where
    F: Fn(&Request, Value) -> Step<'static> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, request: &'a Request, value: Value) -> Step<'a> {
        self(request, value)
    }
}

/// A registered middleware of either kind.
#[derive(Clone)]
pub enum Middleware {
    /// Runs in request chains.
    Request(Arc<dyn RequestMiddleware>),
    /// Runs in success and error chains.
    Response(Arc<dyn ResponseMiddleware>),
}

impl Middleware {
    /// Wrap a request middleware.
    pub fn request(middleware: impl RequestMiddleware) -> Self {
        Self::Request(Arc::new(middleware))
    }

    /// Wrap a success/error middleware.
    pub fn response(middleware: impl ResponseMiddleware) -> Self {
        Self::Response(Arc::new(middleware))
    }
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request(_) => f.write_str("Middleware::Request(..)"),
            Self::Response(_) => f.write_str("Middleware::Response(..)"),
        }
    }
}

/// Resolves middleware names to registered middlewares.
pub trait MiddlewareResolver {
    /// Look up a middleware by name.
    fn resolve(&self, name: &str) -> crate::Result<Middleware>;
}

/// Resolver with nothing registered.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMiddlewares;

impl MiddlewareResolver for NoMiddlewares {
    fn resolve(&self, name: &str) -> crate::Result<Middleware> {
        Err(crate::Error::UnknownMiddleware(name.to_string()))
    }
}

// ============================================================================
// Runner
// ============================================================================

/// The chain being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Mode {
    /// Before the transport call.
    #[display("request")]
    Request,
    /// After the transport resolved.
    #[display("success")]
    Success,
    /// After the transport rejected.
    #[display("error")]
    Error,
}

/// A settled chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Settled as a success.
    Resolved(Value),
    /// Settled as a failure.
    Rejected(Value),
}

impl Outcome {
    /// Convert into a standard result.
    pub fn into_result(self) -> std::result::Result<Value, Value> {
        match self {
            Self::Resolved(value) => Ok(value),
            Self::Rejected(error) => Err(error),
        }
    }
}

/// Run the request chain.
///
/// Returns `None` when every middleware let the call through, otherwise the
/// outcome the whole call settles with.
pub async fn run_request(
    chain: &[Arc<dyn RequestMiddleware>],
    request: &mut Request,
) -> Option<Outcome> {
    for (index, middleware) in chain.iter().enumerate() {
        let step = middleware.call(request);
        match step.settle().await {
            Settled::Sync(Some(value)) | Settled::Async(Ok(Some(value))) => {
                trace!(mode = %Mode::Request, index, "middleware bypassed the call");
                return Some(Outcome::Resolved(value));
            }
            Settled::Async(Err(error)) => {
                trace!(mode = %Mode::Request, index, "middleware rejected the call");
                return Some(Outcome::Rejected(error));
            }
            Settled::Sync(None) | Settled::Async(Ok(None)) => {}
        }
    }
    None
}

/// Run the success chain, seeded with the transport result.
pub async fn run_success(
    chain: &[Arc<dyn ResponseMiddleware>],
    request: &Request,
    seed: Value,
) -> Outcome {
    let mut current = seed;
    for (index, middleware) in chain.iter().enumerate() {
        let step = middleware.call(request, current.clone());
        match step.settle().await {
            Settled::Sync(Some(value)) | Settled::Async(Ok(Some(value))) => current = value,
            Settled::Sync(None) | Settled::Async(Ok(None)) => {}
            Settled::Async(Err(error)) => {
                trace!(mode = %Mode::Success, index, "middleware turned success into error");
                return Outcome::Rejected(error);
            }
        }
    }
    Outcome::Resolved(current)
}

/// Run the error chain, seeded with the transport error.
pub async fn run_error(
    chain: &[Arc<dyn ResponseMiddleware>],
    request: &Request,
    seed: Value,
) -> Outcome {
    let mut current = seed;
    for (index, middleware) in chain.iter().enumerate() {
        let step = middleware.call(request, current.clone());
        match step.settle().await {
            Settled::Async(Ok(Some(value))) => {
                trace!(mode = %Mode::Error, index, "middleware turned error into success");
                return Outcome::Resolved(value);
            }
            Settled::Sync(Some(error)) | Settled::Async(Err(error)) => current = error,
            Settled::Sync(None) | Settled::Async(Ok(None)) => {}
        }
    }
    Outcome::Rejected(current)
}
