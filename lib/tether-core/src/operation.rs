//! Method synthesis: turning a descriptor and a transport into a callable
//! operation.
//!
//! Every call walks the same stages:
//!
//! 1. a fresh [`Request`] is seeded from a deep copy of the method config
//! 2. the entry-point hook shapes it from the call arguments
//! 3. the request chain runs, and may settle the call on its own
//! 4. the transport config is compiled (verb, url, recognized fields)
//! 5. the transport is called
//! 6. the success or error chain runs on its outcome
//!
//! The request of a synthesized call carries a [`Replay`] continuation that
//! re-enters at stage 4, so a middleware can re-issue the same logical call.

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use serde_json::{Map, Value};
use tracing::{Instrument, debug, info_span, trace};

use crate::descriptor::{MethodDescriptor, UrlSource};
use crate::middleware::{self, Outcome};
use crate::{Error, Request, Result, Transport, TransportConfig};

/// Re-enters a call at the compile stage.
pub(crate) trait Resume: Send + Sync {
    fn resume(self: Arc<Self>, request: Request) -> BoxFuture<'static, Result<Value>>;
}

struct Inner<T> {
    descriptor: MethodDescriptor,
    transport: T,
}

impl<T: Transport> Inner<T> {
    fn compile(&self, request: &Request) -> Result<TransportConfig> {
        let descriptor = &self.descriptor;
        let mut config = request.config();
        config.method = Some(Value::String(descriptor.verb().to_string()));

        let url = match (request.url(), descriptor.url()) {
            (Some(url), _) => url.to_string(),
            (None, Some(UrlSource::Resolver(resolve))) => resolve(&config),
            (None, Some(UrlSource::Literal(url))) => url.clone(),
            (None, None) => match descriptor.pattern() {
                Some(pattern) => pattern.compile(request.url_params())?,
                None => String::new(),
            },
        };

        Ok(TransportConfig {
            method: descriptor.verb(),
            url,
            options: config.options,
        })
    }

    async fn execute(self: Arc<Self>, request: Request) -> Result<Value> {
        let config = self.compile(&request)?;
        debug!(url = %config.url, "calling transport");

        let outcome = match self.transport.execute(config).await {
            Ok(response) => {
                trace!("transport resolved");
                middleware::run_success(&self.descriptor.success, &request, response).await
            }
            Err(error) => {
                trace!("transport rejected");
                middleware::run_error(&self.descriptor.error, &request, error).await
            }
        };

        settle(outcome)
    }
}

impl<T: Transport> Resume for Inner<T> {
    fn resume(self: Arc<Self>, request: Request) -> BoxFuture<'static, Result<Value>> {
        let span = info_span!(
            "tether_replay",
            method = %self.descriptor.name(),
            verb = %self.descriptor.verb()
        );
        self.execute(request).instrument(span).boxed()
    }
}

fn settle(outcome: Outcome) -> Result<Value> {
    outcome.into_result().map_err(Error::Rejected)
}

// ============================================================================
// Operation
// ============================================================================

/// A callable synthesized from a [`MethodDescriptor`] and a [`Transport`].
///
/// Cloning is cheap: clones share the descriptor and the transport.
pub struct Operation<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Operation<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("descriptor", &self.inner.descriptor)
            .finish_non_exhaustive()
    }
}

/// Synthesize an operation.
#[must_use]
pub fn synthesize<T: Transport>(descriptor: MethodDescriptor, transport: T) -> Operation<T> {
    Operation::new(descriptor, transport)
}

impl<T: Transport> Operation<T> {
    /// Synthesize an operation.
    #[must_use]
    pub fn new(descriptor: MethodDescriptor, transport: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                descriptor,
                transport,
            }),
        }
    }

    /// The descriptor this operation was synthesized from.
    #[must_use]
    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.inner.descriptor
    }

    /// The transport this operation calls.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// Call the operation.
    ///
    /// The entry-point hook runs before this returns; every later stage runs
    /// when the future is polled.
    ///
    /// # Errors
    ///
    /// The future fails with [`Error::MissingParameter`] when the pattern
    /// cannot be compiled, and with [`Error::Rejected`] when the call settles
    /// as a rejection.
    pub fn call(&self, args: &[Value]) -> BoxFuture<'static, Result<Value>> {
        let inner = Arc::clone(&self.inner);
        let descriptor = &inner.descriptor;

        let span = info_span!("tether_call", method = %descriptor.name(), verb = %descriptor.verb());
        let mut request = Request::from_config(descriptor.config());
        request.attach(Arc::clone(&inner) as Arc<dyn Resume>);
        span.in_scope(|| descriptor.invoke_args(&mut request, args));

        async move {
            if let Some(outcome) = middleware::run_request(&inner.descriptor.request, &mut request).await {
                debug!("request middleware settled the call");
                return settle(outcome);
            }
            inner.execute(request).await
        }
        .instrument(span)
        .boxed()
    }
}

// ============================================================================
// Replay
// ============================================================================

/// A bound continuation re-issuing a call from the compile stage.
///
/// Obtained with [`Request::replay`]. The success and error chains run again
/// on the new transport outcome.
pub struct Replay {
    request: Request,
    resume: Arc<dyn Resume>,
}

impl std::fmt::Debug for Replay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replay")
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

impl Replay {
    pub(crate) fn new(request: Request, resume: Arc<dyn Resume>) -> Self {
        Self { request, resume }
    }

    /// The request that will be replayed.
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Re-issue the call unchanged.
    pub fn run(self) -> BoxFuture<'static, Result<Value>> {
        self.resume.resume(self.request)
    }

    /// Deep-extend the request with `overrides`, then re-issue the call.
    pub fn run_with(mut self, overrides: &Map<String, Value>) -> BoxFuture<'static, Result<Value>> {
        self.request.extend(overrides);
        self.run()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert2::let_assert;
    use serde_json::json;

    use super::*;
    use crate::middleware::{NoMiddlewares, Step};
    use crate::{MethodOptions, transport_fn};

    fn echo() -> impl Transport {
        transport_fn(|config: TransportConfig| async move {
            Ok(serde_json::to_value(config).unwrap_or_default())
        })
    }

    #[tokio::test]
    async fn call_compiles_pattern() {
        let descriptor = MethodOptions::new()
            .verb("GET")
            .pattern("/foo/:id")
            .args(|req, args| {
                if let Some(id) = args.first() {
                    req.set_url_param("id", id.clone());
                }
            })
            .build("load", &NoMiddlewares)
            .expect("valid");
        let operation = synthesize(descriptor, echo());

        let result = operation.call(&[json!("bar")]).await;
        assert_eq!(result.expect("resolved"), json!({"method": "GET", "url": "/foo/bar"}));
    }

    #[tokio::test]
    async fn missing_parameter_rejects_the_future() {
        let descriptor = MethodOptions::new()
            .verb("GET")
            .pattern("/foo/:id")
            .build("load", &NoMiddlewares)
            .expect("valid");
        let operation = synthesize(descriptor, echo());

        let result = operation.call(&[]).await;
        let_assert!(Err(Error::MissingParameter { name, pattern }) = result);
        assert_eq!(name, "id");
        assert_eq!(pattern, "/foo/:id");
    }

    #[tokio::test]
    async fn request_url_wins_over_descriptor() {
        let descriptor = MethodOptions::new()
            .verb("GET")
            .pattern("/foo/:id")
            .url_fn(|_| "/resolved".to_string())
            .args(|req, _| {
                req.insert("url", "/from-request");
            })
            .build("load", &NoMiddlewares)
            .expect("valid");
        let operation = synthesize(descriptor, echo());

        let result = operation.call(&[]).await.expect("resolved");
        assert_eq!(result["url"], "/from-request");
    }

    #[tokio::test]
    async fn url_resolver_sees_compiled_config() {
        let descriptor = MethodOptions::new()
            .verb("DELETE")
            .url_fn(|config| {
                let method = config.method.as_ref().and_then(Value::as_str).unwrap_or("?");
                format!("/{}", method.to_lowercase())
            })
            .build("remove", &NoMiddlewares)
            .expect("valid");
        let operation = synthesize(descriptor, echo());

        let result = operation.call(&[]).await.expect("resolved");
        assert_eq!(result, json!({"method": "DELETE", "url": "/delete"}));
    }

    #[tokio::test]
    async fn config_seed_is_not_mutated_by_calls() {
        let descriptor = MethodOptions::new()
            .verb("GET")
            .url("/foo")
            .config(json!({"params": {"page": 1}}))
            .args(|req, _| {
                if let Some(params) = req.get_mut("params") {
                    params["page"] = json!(2);
                }
            })
            .build("list", &NoMiddlewares)
            .expect("valid");
        let operation = synthesize(descriptor, echo());

        let result = operation.call(&[]).await.expect("resolved");
        assert_eq!(result["params"], json!({"page": 2}));
        assert_eq!(
            operation.descriptor().config().get("params"),
            Some(&json!({"page": 1}))
        );
    }

    #[tokio::test]
    async fn replay_reenters_at_compile() {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport = {
            let calls = Arc::clone(&calls);
            transport_fn(move |config: TransportConfig| {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err(json!({"status": 503}))
                    } else {
                        Ok(json!({"url": config.url}))
                    }
                }
            })
        };

        let descriptor = MethodOptions::new()
            .verb("GET")
            .pattern("/items/:id")
            .args(|req, _| req.set_url_param("id", 1))
            .request(|_: &mut Request| Step::next())
            .error(|req: &Request, _: Value| {
                let_assert!(Some(replay) = req.replay());
                let overrides = json!({"urlParams": {"id": 2}});
                Step::defer(async move {
                    let overrides = overrides.as_object().cloned().unwrap_or_default();
                    replay
                        .run_with(&overrides)
                        .await
                        .map(Some)
                        .map_err(Error::into_rejection)
                })
            })
            .build("load", &NoMiddlewares)
            .expect("valid");
        let operation = synthesize(descriptor, transport);

        let result = operation.call(&[]).await.expect("recovered");
        assert_eq!(result, json!({"url": "/items/2"}));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
