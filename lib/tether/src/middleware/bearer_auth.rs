//! Bearer token authentication.
//!
//! Sets an `Authorization: Bearer <token>` header, either per method as a
//! request middleware ([`BearerAuth`]) or on every transport call as a tower
//! layer ([`BearerAuthLayer`]). An `Authorization` header already present is
//! left untouched.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use serde_json::{Map, Value};
use tower::{Layer, Service};

use crate::{Request, RequestMiddleware, Step, TransportConfig};

fn authorize(headers: &mut Option<Value>, token: &str) {
    let headers = headers.get_or_insert_with(|| Value::Object(Map::new()));
    if !headers.is_object() {
        *headers = Value::Object(Map::new());
    }
    if let Value::Object(headers) = headers {
        let present = headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case("authorization"));
        if !present {
            headers.insert(
                "Authorization".to_string(),
                Value::String(format!("Bearer {token}")),
            );
        }
    }
}

/// Request middleware adding bearer token authentication.
///
/// # Example
///
/// ```
/// use tether::middleware::BearerAuth;
/// use tether::MethodOptions;
///
/// let options = MethodOptions::new()
///     .verb("GET")
///     .url("/me")
///     .request(BearerAuth::new("my-secret-token"));
/// # let _ = options;
/// ```
#[derive(Debug, Clone)]
pub struct BearerAuth {
    token: Arc<str>,
}

impl BearerAuth {
    /// Create a new bearer auth middleware with the given token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Arc::from(token.into()),
        }
    }
}

impl RequestMiddleware for BearerAuth {
    fn call<'a>(&'a self, request: &'a mut Request) -> Step<'a> {
        let mut headers = request.remove("headers");
        authorize(&mut headers, &self.token);
        if let Some(headers) = headers {
            request.insert("headers", headers);
        }
        Step::next()
    }
}

/// Layer that adds bearer token authentication to transport calls.
///
/// # Example
///
/// ```ignore
/// use tether::HyperTransport;
/// use tether::middleware::BearerAuthLayer;
///
/// let transport = HyperTransport::builder()
///     .layer(BearerAuthLayer::new("my-secret-token"))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct BearerAuthLayer {
    token: Arc<str>,
}

impl BearerAuthLayer {
    /// Create a new bearer auth layer with the given token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Arc::from(token.into()),
        }
    }
}

impl<S> Layer<S> for BearerAuthLayer {
    type Service = BearerAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BearerAuthService {
            inner,
            token: Arc::clone(&self.token),
        }
    }
}

/// Service that adds bearer token authentication to transport calls.
#[derive(Debug, Clone)]
pub struct BearerAuthService<S> {
    inner: S,
    token: Arc<str>,
}

impl<S> Service<TransportConfig> for BearerAuthService<S>
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

    fn call(&mut self, mut config: TransportConfig) -> Self::Future {
        authorize(&mut config.options.headers, &self.token);

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(config).await })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;

    #[test]
    fn bearer_auth_sets_header() {
        let mut request = Request::new();
        request.insert("headers", json!({"Accept": "application/json"}));

        let auth = BearerAuth::new("secret");
        assert!(matches!(auth.call(&mut request), Step::Next));
        assert_eq!(
            request.get("headers"),
            Some(&json!({"Accept": "application/json", "Authorization": "Bearer secret"}))
        );
    }

    #[test]
    fn bearer_auth_keeps_existing_authorization() {
        let mut request = Request::new();
        request.insert("headers", json!({"authorization": "Basic abc"}));

        BearerAuth::new("secret").call(&mut request);

        assert_eq!(
            request.get("headers"),
            Some(&json!({"authorization": "Basic abc"}))
        );
    }

    #[test]
    fn bearer_auth_creates_headers() {
        let mut request = Request::new();
        BearerAuth::new("secret").call(&mut request);
        assert_eq!(
            request.get("headers"),
            Some(&json!({"Authorization": "Bearer secret"}))
        );
    }

    #[tokio::test]
    async fn bearer_auth_layer_sets_transport_header() {
        let inner = tower::service_fn(|config: TransportConfig| async move {
            Ok::<_, Value>(config.options.headers.unwrap_or_default())
        });
        let service = BearerAuthLayer::new("secret").layer(inner);

        let headers = service
            .oneshot(TransportConfig::new(http::Method::GET, "http://localhost/"))
            .await;

        assert_eq!(headers, Ok(json!({"Authorization": "Bearer secret"})));
    }
}
