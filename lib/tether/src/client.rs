//! HTTP transport implementation using hyper-util.
//!
//! [`HyperTransport`] maps a [`TransportConfig`] onto an HTTP request and the
//! HTTP response onto a JSON value:
//!
//! ```json
//! {"status": 200, "statusText": "OK", "headers": {"content-type": "application/json"}, "data": {}}
//! ```
//!
//! A 2xx status resolves, any other status rejects with the same shape.
//! Failures without a response reject with `status: 0` (connection, invalid
//! request) or `status: -1` (timeout).

use std::borrow::Cow;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use serde_json::{Map, Value, json};
use tower::Layer;
use tower::util::BoxCloneService;
use tower_service::Service;
use url::Url;

use crate::middleware::{BearerAuthLayer, LoggingLayer};
use crate::{
    Transport, TransportConfig,
    config::{ClientConfig, ClientConfigBuilder},
    connector::https_connector,
};

/// What a transport call settles with: the response or the error value.
pub type TransportResult = std::result::Result<Value, Value>;

// ============================================================================
// Type-Erased Service for Middleware Composition
// ============================================================================

/// Type-erased service for middleware composition.
///
/// This type allows storing and composing arbitrary Tower layers without
/// exposing complex generic types to users.
pub type BoxedService = BoxCloneService<TransportConfig, Value, Value>;

/// Future type for Tower Service implementation.
pub type ServiceFuture = Pin<Box<dyn Future<Output = TransportResult> + Send + 'static>>;

/// Thread-safe wrapper for `BoxedService`.
///
/// The mutex makes the service `Sync`, as required by [`Transport`].
#[derive(Clone)]
struct SyncService {
    inner: Arc<Mutex<BoxedService>>,
}

impl SyncService {
    fn new(service: BoxedService) -> Self {
        Self {
            inner: Arc::new(Mutex::new(service)),
        }
    }

    fn call(&self, config: TransportConfig) -> ServiceFuture {
        // Lock, clone the service, and release the lock immediately
        let mut service = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();

        Box::pin(async move { service.call(config).await })
    }
}

/// `code` of a rejection for a request that could not be built, such as a
/// relative url. Such a call never reaches the network and is not retried.
pub const INVALID_REQUEST: &str = "invalid_request";

/// A rejection value for a call that got no HTTP response.
fn failure(status: i64, status_text: impl Into<String>) -> Value {
    json!({
        "status": status,
        "statusText": status_text.into(),
        "headers": {},
        "data": null,
    })
}

/// A status `0` rejection tagged with [`INVALID_REQUEST`].
fn invalid_request(status_text: impl Into<String>) -> Value {
    let mut value = failure(0, status_text);
    value["code"] = json!(INVALID_REQUEST);
    value
}

// ============================================================================
// Raw Client (internal, used for direct hyper access)
// ============================================================================

/// Raw HTTP client using hyper-util (internal implementation).
#[derive(Clone)]
struct RawHyperClient {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    config: ClientConfig,
}

impl RawHyperClient {
    fn new(config: ClientConfig) -> Self {
        let connector = https_connector(&config);

        let inner = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_idle_per_host)
            .build(connector);

        Self { inner, config }
    }

    /// Build a hyper request from a transport config.
    fn build_hyper_request(
        config: TransportConfig,
    ) -> std::result::Result<http::Request<Full<Bytes>>, Value> {
        let TransportConfig {
            method,
            url: raw_url,
            options,
        } = config;

        let mut url = Url::parse(&raw_url)
            .map_err(|err| invalid_request(format!("invalid url \"{raw_url}\": {err}")))?;
        if let Some(Value::Object(params)) = &options.params {
            append_query(&mut url, params);
        }

        let headers = header_pairs(options.headers.as_ref());
        let content_type = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.clone());

        let data = match (options.data, &options.transform_request) {
            (Some(data), Some(transform)) => Some(transform.apply(data)),
            (data, _) => data,
        };

        let (body, default_content_type) = match data {
            None | Some(Value::Null) => (Bytes::new(), None),
            Some(Value::String(text)) => (Bytes::from(text), Some("text/plain; charset=utf-8")),
            Some(value)
                if content_type
                    .as_deref()
                    .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded")) =>
            {
                let form = serde_html_form::to_string(&value)
                    .map_err(|err| invalid_request(format!("invalid form data: {err}")))?;
                (Bytes::from(form), None)
            }
            Some(value) => {
                let json = serde_json::to_vec(&value)
                    .map_err(|err| invalid_request(format!("invalid json data: {err}")))?;
                (Bytes::from(json), Some("application/json"))
            }
        };

        let mut builder = http::Request::builder().method(method).uri(url.as_str());
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let (None, Some(default)) = (&content_type, default_content_type) {
            builder = builder.header(http::header::CONTENT_TYPE, default);
        }

        builder
            .body(Full::new(body))
            .map_err(|err| invalid_request(format!("invalid request: {err}")))
    }

    /// Extract response headers as a JSON object, repeated values joined by `, `.
    fn extract_headers(headers: &http::HeaderMap) -> Map<String, Value> {
        let mut extracted = Map::new();
        for (name, value) in headers {
            let Ok(value) = value.to_str() else {
                continue;
            };
            match extracted.get_mut(name.as_str()) {
                Some(Value::String(existing)) => {
                    existing.push_str(", ");
                    existing.push_str(value);
                }
                _ => {
                    extracted.insert(name.to_string(), Value::String(value.to_string()));
                }
            }
        }
        extracted
    }

    async fn execute(&self, config: TransportConfig) -> TransportResult {
        let timeout = config
            .options
            .timeout_duration()
            .unwrap_or(self.config.timeout);
        let transform = config.options.transform_response.clone();
        let request = Self::build_hyper_request(config)?;

        let fetch = async {
            let response = self
                .inner
                .request(request)
                .await
                .map_err(|err| failure(0, hyper_error_text(&err)))?;
            let (parts, body) = response.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|err| failure(0, err.to_string()))?
                .to_bytes();
            Ok::<_, Value>((parts, body))
        };

        let (parts, body) = tokio::time::timeout(timeout, fetch)
            .await
            .map_err(|_| failure(-1, format!("timeout after {}ms", timeout.as_millis())))??;

        let mut data = parse_body(&body);
        if let Some(transform) = transform {
            data = transform.apply(data);
        }

        let response = json!({
            "status": parts.status.as_u16(),
            "statusText": parts.status.canonical_reason().unwrap_or_default(),
            "headers": Self::extract_headers(&parts.headers),
            "data": data,
        });

        if parts.status.is_success() {
            Ok(response)
        } else {
            Err(response)
        }
    }
}

fn hyper_error_text(err: &hyper_util::client::legacy::Error) -> String {
    use std::error::Error as _;

    match err.source() {
        Some(source) if err.is_connect() => format!("connection failed: {source}"),
        Some(source) => format!("{err}: {source}"),
        None => err.to_string(),
    }
}

fn query_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(Cow::Borrowed(text)),
        other => Some(Cow::Owned(other.to_string())),
    }
}

fn append_query(url: &mut Url, params: &Map<String, Value>) {
    if params.values().all(Value::is_null) {
        return;
    }
    let mut pairs = url.query_pairs_mut();
    for (key, value) in params {
        match value {
            Value::Array(values) => {
                for text in values.iter().filter_map(query_text) {
                    pairs.append_pair(key, &text);
                }
            }
            other => {
                if let Some(text) = query_text(other) {
                    pairs.append_pair(key, &text);
                }
            }
        }
    }
}

fn header_pairs(headers: Option<&Value>) -> Vec<(String, String)> {
    let Some(Value::Object(headers)) = headers else {
        return Vec::new();
    };
    headers
        .iter()
        .filter_map(|(name, value)| query_text(value).map(|text| (name.clone(), text.into_owned())))
        .collect()
}

fn parse_body(body: &Bytes) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

impl Service<TransportConfig> for RawHyperClient {
    type Response = Value;
    type Error = Value;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Value>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, config: TransportConfig) -> Self::Future {
        let client = self.clone();
        Box::pin(async move { client.execute(config).await })
    }
}

// ============================================================================
// Public Transport
// ============================================================================

/// HTTP transport using hyper-util with connection pooling, TLS, and middleware support.
///
/// # Example
///
/// ```ignore
/// use tether::HyperTransport;
/// use std::time::Duration;
///
/// // Simple transport without middleware
/// let transport = HyperTransport::new();
///
/// // Transport with tower layers
/// let transport = HyperTransport::builder()
///     .timeout(Duration::from_secs(10))
///     .with_logging()
///     .build();
/// ```
#[derive(Clone)]
pub struct HyperTransport {
    service: SyncService,
    config: ClientConfig,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HyperTransport {
    /// Create a new transport with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new transport with custom configuration (no middleware).
    #[must_use]
    pub fn with_config(config: ClientConfig) -> Self {
        let raw = RawHyperClient::new(config.clone());
        Self::with_service(BoxCloneService::new(raw), config)
    }

    /// Create a transport with a pre-configured service (used by builder).
    fn with_service(service: BoxedService, config: ClientConfig) -> Self {
        Self {
            service: SyncService::new(service),
            config,
        }
    }

    /// Create a new transport builder.
    #[must_use]
    pub fn builder() -> HyperTransportBuilder {
        HyperTransportBuilder::default()
    }

    /// Get the transport configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HyperTransport {
    fn execute(&self, config: TransportConfig) -> impl Future<Output = TransportResult> + Send {
        self.service.call(config)
    }
}

// ============================================================================
// Tower Service Implementation
// ============================================================================

impl Service<TransportConfig> for HyperTransport {
    type Response = Value;
    type Error = Value;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Value>> {
        // SyncService is always ready (the underlying service is polled when called)
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, config: TransportConfig) -> Self::Future {
        self.service.call(config)
    }
}

/// Builder for [`HyperTransport`].
///
/// # Example
///
/// ```ignore
/// use tether::HyperTransport;
/// use tether::middleware::LoggingLayer;
///
/// let transport = HyperTransport::builder()
///     .layer(LoggingLayer::debug())
///     .build();
/// ```
#[derive(Default)]
pub struct HyperTransportBuilder {
    config: ClientConfigBuilder,
    layers: Vec<Arc<dyn Fn(BoxedService) -> BoxedService + Send + Sync>>,
}

impl std::fmt::Debug for HyperTransportBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransportBuilder")
            .field("config", &self.config)
            .field("layers_count", &self.layers.len())
            .finish()
    }
}

impl HyperTransportBuilder {
    /// Set the base url kept in the configuration.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config = self.config.base_url(base_url);
        self
    }

    /// Set the default request timeout, used when a call sets no `timeout`.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.timeout(timeout);
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.connect_timeout(timeout);
        self
    }

    /// Set the maximum idle connections per host.
    #[must_use]
    pub fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.config = self.config.pool_idle_per_host(count);
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.pool_idle_timeout(timeout);
        self
    }

    /// Add a Tower layer to the transport.
    ///
    /// Layers are applied in order: first added = innermost, last added =
    /// outermost (sees the config first).
    #[must_use]
    pub fn layer<L>(mut self, layer: L) -> Self
    where
        L: Layer<BoxedService> + Send + Sync + 'static,
        L::Service: Service<TransportConfig, Response = Value, Error = Value>
            + Clone
            + Send
            + 'static,
        <L::Service as Service<TransportConfig>>::Future: Send + 'static,
    {
        self.layers.push(Arc::new(move |service| {
            BoxCloneService::new(layer.layer(service))
        }));
        self
    }

    /// Add transport call logging.
    #[must_use]
    pub fn with_logging(self) -> Self {
        self.layer(LoggingLayer::new())
    }

    /// Add debug-level logging (includes headers).
    #[must_use]
    pub fn with_debug_logging(self) -> Self {
        self.layer(LoggingLayer::debug())
    }

    /// Add bearer token authentication to every transport call.
    #[must_use]
    pub fn with_bearer_auth(self, token: impl Into<String>) -> Self {
        self.layer(BearerAuthLayer::new(token))
    }

    /// Build the transport with all configured layers.
    #[must_use]
    pub fn build(self) -> HyperTransport {
        let config = self.config.build();
        let mut service: BoxedService = BoxCloneService::new(RawHyperClient::new(config.clone()));

        for layer_fn in self.layers {
            service = layer_fn(service);
        }

        HyperTransport::with_service(service, config)
    }
}
