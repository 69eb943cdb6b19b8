//! Per-call request state and its transport projections.
//!
//! A [`Request`] is created fresh for every call from the method's
//! [`MethodConfig`] seed. It carries arbitrary caller fields (for example
//! `urlParams`) next to the recognized transport fields listed in
//! [`CONFIG_KEYS`]. Only those are ever forwarded to the transport, through
//! [`Request::config`].
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use tether_core::{MethodConfig, Request};
//!
//! let seed = MethodConfig::new().set("timeout", json!(5000)).set("id", json!(42));
//! let mut request = Request::from_config(&seed);
//! request.set_url_param("id", json!(42));
//!
//! let config = request.config();
//! assert_eq!(config.options.timeout, Some(json!(5000)));
//! assert_eq!(request.get("id"), Some(&json!(42)));
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::merge;
use crate::operation::{Replay, Resume};

/// Request fields recognized as transport configuration.
pub const CONFIG_KEYS: [&str; 13] = [
    "method",
    "url",
    "params",
    "data",
    "headers",
    "xsrfHeaderName",
    "xsrfCookieName",
    "transformRequest",
    "transformResponse",
    "cache",
    "timeout",
    "withCredentials",
    "responseType",
];

/// Field holding the values interpolated into the method pattern.
pub const URL_PARAMS: &str = "urlParams";

// ============================================================================
// Transform
// ============================================================================

/// A request or response body transformation, shared by reference.
#[derive(Clone)]
pub struct Transform(Arc<dyn Fn(Value) -> Value + Send + Sync>);

impl Transform {
    /// Wrap a function.
    pub fn new(f: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Apply the transformation.
    #[must_use]
    pub fn apply(&self, value: Value) -> Value {
        (self.0)(value)
    }
}

impl std::fmt::Debug for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Transform(..)")
    }
}

impl PartialEq for Transform {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

// ============================================================================
// Transport Projections
// ============================================================================

/// Transport options other than method and url.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportOptions {
    /// Query parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Request body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Request headers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<Value>,
    /// XSRF header name hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xsrf_header_name: Option<Value>,
    /// XSRF cookie name hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xsrf_cookie_name: Option<Value>,
    /// Cache hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<Value>,
    /// Timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Value>,
    /// Credentials hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub with_credentials: Option<Value>,
    /// Expected response type hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_type: Option<Value>,
    /// Applied to `data` before it is sent.
    #[serde(skip)]
    pub transform_request: Option<Transform>,
    /// Applied to the response data once received.
    #[serde(skip)]
    pub transform_response: Option<Transform>,
}

impl TransportOptions {
    /// The `timeout` field as a duration, if it is a non-negative number of milliseconds.
    #[must_use]
    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout
            .as_ref()
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
    }

    /// Slot of a recognized value field, `None` for `method`, `url`, the
    /// transforms and unknown keys.
    fn slot_mut(&mut self, key: &str) -> Option<&mut Option<Value>> {
        let slot = match key {
            "params" => &mut self.params,
            "data" => &mut self.data,
            "headers" => &mut self.headers,
            "xsrfHeaderName" => &mut self.xsrf_header_name,
            "xsrfCookieName" => &mut self.xsrf_cookie_name,
            "cache" => &mut self.cache,
            "timeout" => &mut self.timeout,
            "withCredentials" => &mut self.with_credentials,
            "responseType" => &mut self.response_type,
            _ => return None,
        };
        Some(slot)
    }

    fn from_fields(fields: &Map<String, Value>) -> Self {
        let mut options = Self::default();
        for key in CONFIG_KEYS {
            if let (Some(value), Some(slot)) = (fields.get(key), options.slot_mut(key)) {
                *slot = Some(value.clone());
            }
        }
        options
    }
}

/// Read-only snapshot of the transport fields of a [`Request`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestConfig {
    /// The `method` field, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<Value>,
    /// The `url` field, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<Value>,
    /// Every other recognized field.
    #[serde(flatten)]
    pub options: TransportOptions,
}

/// The configuration handed to the transport: compiled method and url plus options.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransportConfig {
    /// HTTP method.
    #[serde(serialize_with = "serialize_method")]
    pub method: http::Method,
    /// Resolved url.
    pub url: String,
    /// Every other recognized field.
    #[serde(flatten)]
    pub options: TransportOptions,
}

impl TransportConfig {
    /// Create a config with no options.
    #[must_use]
    pub fn new(method: http::Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            options: TransportOptions::default(),
        }
    }
}

fn serialize_method<S: Serializer>(method: &http::Method, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(method.as_str())
}

// ============================================================================
// Method Config (seed)
// ============================================================================

/// Static seed of a method's request state.
///
/// Holds arbitrary fields plus the two transform hooks. Every call deep-copies
/// it, so nothing a call does leaks back into the seed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodConfig {
    fields: Map<String, Value>,
    transform_request: Option<Transform>,
    transform_response: Option<Transform>,
}

impl MethodConfig {
    /// Create an empty config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config from a JSON object, `None` for any other value.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self {
                fields,
                ..Self::default()
            }),
            _ => None,
        }
    }

    /// Sets a field.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Sets the request transform.
    #[must_use]
    pub fn transform_request(mut self, f: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        self.transform_request = Some(Transform::new(f));
        self
    }

    /// Sets the response transform.
    #[must_use]
    pub fn transform_response(
        mut self,
        f: impl Fn(Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.transform_response = Some(Transform::new(f));
        self
    }

    /// Single field by name.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// All fields.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Extend with `other`, which wins on conflicts.
    pub fn extend(&mut self, other: &Self) {
        merge::extend(&mut self.fields, &other.fields);
        if other.transform_request.is_some() {
            self.transform_request.clone_from(&other.transform_request);
        }
        if other.transform_response.is_some() {
            self.transform_response.clone_from(&other.transform_response);
        }
    }
}

// ============================================================================
// Request
// ============================================================================

/// Per-call request state.
#[derive(Clone, Default)]
pub struct Request {
    fields: Map<String, Value>,
    transform_request: Option<Transform>,
    transform_response: Option<Transform>,
    resume: Option<Arc<dyn Resume>>,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("fields", &self.fields)
            .field("replayable", &self.resume.is_some())
            .finish_non_exhaustive()
    }
}

impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
            && self.transform_request == other.transform_request
            && self.transform_response == other.transform_response
    }
}

impl Request {
    /// Creates an empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a request from a deep copy of `config`.
    #[must_use]
    pub fn from_config(config: &MethodConfig) -> Self {
        Self {
            fields: config.fields.clone(),
            transform_request: config.transform_request.clone(),
            transform_response: config.transform_response.clone(),
            resume: None,
        }
    }

    /// Single field by name.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Mutable access to a single field.
    #[must_use]
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.fields.get_mut(key)
    }

    /// Sets a field, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    /// Removes a field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// All fields.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Mutable access to all fields.
    #[must_use]
    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.fields
    }

    /// The `urlParams` object, if set.
    #[must_use]
    pub fn url_params(&self) -> Option<&Map<String, Value>> {
        self.fields.get(URL_PARAMS).and_then(Value::as_object)
    }

    /// Sets one URL parameter, creating `urlParams` if needed.
    pub fn set_url_param(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let params = self
            .fields
            .entry(URL_PARAMS)
            .or_insert_with(|| Value::Object(Map::new()));
        if !params.is_object() {
            *params = Value::Object(Map::new());
        }
        if let Value::Object(params) = params {
            params.insert(name.into(), value.into());
        }
    }

    /// The `url` field when it is a non-empty string.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.fields
            .get("url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
    }

    /// Sets the request transform.
    pub fn set_transform_request(&mut self, f: impl Fn(Value) -> Value + Send + Sync + 'static) {
        self.transform_request = Some(Transform::new(f));
    }

    /// Sets the response transform.
    pub fn set_transform_response(&mut self, f: impl Fn(Value) -> Value + Send + Sync + 'static) {
        self.transform_response = Some(Transform::new(f));
    }

    /// Deep-extend the request with `overrides`.
    pub fn extend(&mut self, overrides: &Map<String, Value>) {
        merge::extend(&mut self.fields, overrides);
    }

    /// Snapshot of the transport fields.
    ///
    /// The snapshot is a copy: mutating it never affects the request.
    #[must_use]
    pub fn config(&self) -> RequestConfig {
        let mut options = TransportOptions::from_fields(&self.fields);
        options.transform_request.clone_from(&self.transform_request);
        options.transform_response.clone_from(&self.transform_response);
        RequestConfig {
            method: self.fields.get("method").cloned(),
            url: self.fields.get("url").cloned(),
            options,
        }
    }

    /// Continuation re-issuing this call from the compile stage.
    ///
    /// `None` for requests that were not created by a synthesized operation.
    #[must_use]
    pub fn replay(&self) -> Option<Replay> {
        self.resume
            .as_ref()
            .map(|resume| Replay::new(self.clone(), Arc::clone(resume)))
    }

    pub(crate) fn attach(&mut self, resume: Arc<dyn Resume>) {
        self.resume = Some(resume);
    }
}
