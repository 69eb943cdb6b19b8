//! Client-level registries.
//!
//! [`ApiClient`] wraps a [`Transport`] with a base URL and holds two
//! registries shared by everything built from it: named middlewares and
//! lazily constructed services.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::trailing_slash;
use crate::registry::MiddlewareRegistry;
use crate::service::{ApiService, ApiServiceBuilder};
use crate::{
    ClientConfig, Error, HyperTransport, Middleware, MiddlewareResolver, Result, Transport,
    TransportConfig,
};

/// A transport prefixing relative urls with a base URL.
///
/// Absolute urls (`http://`, `https://` or protocol-relative `//`) pass
/// untouched. A leading `/` of a relative url is dropped, so `/users` and
/// `users` both land under the base.
#[derive(Debug)]
pub struct BaseUrl<T> {
    transport: Arc<T>,
    base_url: Arc<str>,
}

impl<T> Clone for BaseUrl<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            base_url: Arc::clone(&self.base_url),
        }
    }
}

impl<T> BaseUrl<T> {
    /// Wrap `transport`, adding a trailing `/` to `base_url` if missing.
    pub fn new(transport: T, base_url: impl Into<String>) -> Self {
        Self {
            transport: Arc::new(transport),
            base_url: Arc::from(trailing_slash(base_url.into())),
        }
    }

    /// The base URL, always ending with `/`.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The wrapped transport.
    #[must_use]
    pub fn inner(&self) -> &T {
        &self.transport
    }

    /// Resolve `url` against the base URL.
    #[must_use]
    pub fn resolve(&self, url: &str) -> String {
        if is_absolute(url) {
            return url.to_string();
        }
        let path = url.strip_prefix('/').unwrap_or(url);
        format!("{}{path}", self.base_url)
    }
}

fn is_absolute(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://") || url.starts_with("//")
}

impl<T: Transport> Transport for BaseUrl<T> {
    fn execute(
        &self,
        mut config: TransportConfig,
    ) -> impl Future<Output = std::result::Result<Value, Value>> + Send {
        config.url = self.resolve(&config.url);
        self.transport.execute(config)
    }
}

type ServiceFactory<T> =
    Arc<dyn Fn(&ApiClient<T>) -> Result<ApiService<BaseUrl<T>>> + Send + Sync>;

struct ServiceSlot<T> {
    factory: ServiceFactory<T>,
    instance: Option<Arc<ApiService<BaseUrl<T>>>>,
}

struct ClientInner<T> {
    transport: BaseUrl<T>,
    middlewares: Arc<MiddlewareRegistry>,
    services: Mutex<HashMap<String, ServiceSlot<T>>>,
}

/// Entry point tying a transport, a base URL and the registries together.
///
/// Cloning is cheap: clones share the transport and both registries.
///
/// # Example
///
/// ```ignore
/// use serde_json::json;
/// use tether::middleware::BearerAuth;
/// use tether::{ApiClient, ClientConfig, MethodOptions, Middleware};
///
/// let client = ApiClient::with_config(
///     ClientConfig::builder().base_url("https://api.example.com/v1").build(),
/// );
/// client.register_middleware("auth", Middleware::request(BearerAuth::new("token")))?;
/// client.register_service("users", |client| {
///     client
///         .service_builder("users")
///         .all(MethodOptions::new().request_named("auth"))
///         .method_value("list", json!({"verb": "GET", "url": "/users"}))
///         .build()
/// })?;
///
/// let users = client.service("users")?.call("list", &[]).await?;
/// ```
pub struct ApiClient<T> {
    inner: Arc<ClientInner<T>>,
}

impl<T> Clone for ApiClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for ApiClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url())
            .field("middlewares", &self.inner.middlewares)
            .field("services", &self.service_names())
            .finish_non_exhaustive()
    }
}

impl ApiClient<HyperTransport> {
    /// Create a client over a [`HyperTransport`] built from `config`.
    ///
    /// The HTTP transport only sends absolute urls. With a relative base url
    /// (the default is `/`), calls to relative urls reject with the
    /// [`INVALID_REQUEST`](crate::INVALID_REQUEST) code.
    #[must_use]
    pub fn with_config(config: ClientConfig) -> Self {
        let base_url = config.base_url.clone();
        Self::from_parts(HyperTransport::with_config(config), base_url)
    }

    /// Create a client over `transport`, using its configured base URL.
    ///
    /// See [`ApiClient::with_config`] for relative base urls.
    #[must_use]
    pub fn from_hyper(transport: HyperTransport) -> Self {
        let base_url = transport.config().base_url.clone();
        Self::from_parts(transport, base_url)
    }

    fn from_parts(transport: HyperTransport, base_url: String) -> Self {
        if !is_absolute(&base_url) {
            warn!(%base_url, "base url is not absolute, relative urls will be rejected");
        }
        Self::new(transport, base_url)
    }
}

impl<T> ApiClient<T> {
    /// Create a client calling `transport` under `base_url`.
    pub fn new(transport: T, base_url: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                transport: BaseUrl::new(transport, base_url),
                middlewares: Arc::default(),
                services: Mutex::default(),
            }),
        }
    }

    fn lock_services(&self) -> MutexGuard<'_, HashMap<String, ServiceSlot<T>>> {
        self.inner
            .services
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The base URL, always ending with `/`.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.inner.transport.base_url()
    }

    /// The base-URL-resolving transport shared by the client's services.
    #[must_use]
    pub fn transport(&self) -> BaseUrl<T> {
        self.inner.transport.clone()
    }

    /// The middleware registry.
    #[must_use]
    pub fn middlewares(&self) -> Arc<MiddlewareRegistry> {
        Arc::clone(&self.inner.middlewares)
    }

    /// Register a named middleware.
    ///
    /// # Errors
    ///
    /// See [`MiddlewareRegistry::register`].
    pub fn register_middleware(&self, name: impl Into<String>, middleware: Middleware) -> Result<&Self> {
        self.inner.middlewares.register(name, middleware)?;
        Ok(self)
    }

    /// Look up a named middleware.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMiddleware`] if nothing is registered under `name`.
    pub fn middleware(&self, name: &str) -> Result<Middleware> {
        self.inner.middlewares.get(name)
    }

    /// Names of the registered services, sorted.
    #[must_use]
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.lock_services().keys().cloned().collect();
        names.sort();
        names
    }
}

impl<T: Transport> ApiClient<T> {
    /// Send `config` through the transport, resolving its url first.
    pub fn execute(
        &self,
        config: TransportConfig,
    ) -> impl Future<Output = std::result::Result<Value, Value>> + Send + '_ {
        self.inner.transport.execute(config)
    }

    /// Builder for a service sharing this client's transport and middlewares.
    pub fn service_builder(&self, name: impl Into<String>) -> ApiServiceBuilder<BaseUrl<T>> {
        ApiServiceBuilder::new(self.transport())
            .name(name)
            .middlewares(self.middlewares())
    }

    /// Register a service factory.
    ///
    /// The factory runs on the first [`ApiClient::service`] lookup; later
    /// lookups share its instance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidName`] for an empty name and
    /// [`Error::AlreadyRegistered`] if the name is taken.
    pub fn register_service<F>(&self, name: impl Into<String>, factory: F) -> Result<&Self>
    where
        F: Fn(&Self) -> Result<ApiService<BaseUrl<T>>> + Send + Sync + 'static,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidName { kind: "service" });
        }

        let mut services = self.lock_services();
        if services.contains_key(&name) {
            return Err(Error::AlreadyRegistered {
                kind: "service",
                name,
            });
        }
        debug!(%name, "service registered");
        services.insert(
            name,
            ServiceSlot {
                factory: Arc::new(factory),
                instance: None,
            },
        );
        Ok(self)
    }

    /// The service registered under `name`, constructed on first lookup.
    ///
    /// The factory runs without holding the registry lock. If two lookups
    /// race on an unconstructed service, the first stored instance wins.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownService`] if nothing is registered under
    /// `name`, or the factory's error.
    pub fn service(&self, name: &str) -> Result<Arc<ApiService<BaseUrl<T>>>> {
        let factory = {
            let services = self.lock_services();
            let slot = services
                .get(name)
                .ok_or_else(|| Error::UnknownService(name.to_string()))?;
            if let Some(instance) = &slot.instance {
                return Ok(Arc::clone(instance));
            }
            Arc::clone(&slot.factory)
        };

        debug!(%name, "constructing service");
        let instance = Arc::new(factory(self)?);

        let mut services = self.lock_services();
        match services.get_mut(name) {
            Some(slot) => Ok(Arc::clone(slot.instance.get_or_insert(instance))),
            None => Ok(instance),
        }
    }
}

impl<T> MiddlewareResolver for ApiClient<T> {
    fn resolve(&self, name: &str) -> Result<Middleware> {
        self.middleware(name)
    }
}
