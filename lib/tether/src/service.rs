//! Named service methods sharing defaults.
//!
//! An [`ApiService`] owns a set of synthesized operations, each built from
//! its own [`MethodOptions`] merged over the service-wide `all` defaults:
//!
//! - config fields are deep-extended, the method winning on conflicts
//! - middlewares from `all` run before the method's own, in every chain
//! - any other option set on the method overrides the one in `all`
//!
//! # Example
//!
//! ```ignore
//! use serde_json::json;
//! use tether::{ApiService, HyperTransport, MethodOptions};
//!
//! let users = ApiService::builder(HyperTransport::new())
//!     .name("users")
//!     .all(MethodOptions::new().config(json!({"timeout": 5000})))
//!     .method(
//!         "load",
//!         MethodOptions::new()
//!             .verb("GET")
//!             .pattern("https://api.example.com/users/:id")
//!             .args(|req, args| req.set_url_param("id", args[0].clone())),
//!     )
//!     .build()?;
//!
//! let user = users.call("load", &[json!(42)]).await?;
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{self, BoxFuture, FutureExt};
use serde_json::Value;
use tracing::debug;

use crate::registry::MiddlewareRegistry;
use crate::{Error, MethodOptions, Operation, Result, Transport, synthesize};

/// A set of named operations sharing a transport and default options.
pub struct ApiService<T> {
    name: String,
    transport: Arc<T>,
    all: MethodOptions,
    middlewares: Arc<MiddlewareRegistry>,
    methods: Mutex<HashMap<String, Operation<Arc<T>>>>,
}

impl<T> std::fmt::Debug for ApiService<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiService")
            .field("name", &self.name)
            .field("all", &self.all)
            .field("methods", &self.method_names())
            .finish_non_exhaustive()
    }
}

impl<T> ApiService<T> {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Operation<Arc<T>>>> {
        self.methods.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Service name, empty when none was given.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the registered methods, sorted.
    #[must_use]
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns `true` if a method is registered under `name`.
    #[must_use]
    pub fn has_method(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }
}

impl<T: Transport> ApiService<T> {
    /// Create a service builder.
    pub fn builder(transport: T) -> ApiServiceBuilder<T> {
        ApiServiceBuilder::new(transport)
    }

    /// Merge `options` over the `all` defaults, validate them and add the
    /// synthesized operation under `name`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidName`] for an empty name
    /// - [`Error::AlreadyRegistered`] if the service already has that method
    /// - any validation error of [`MethodOptions::build`]
    pub fn add_method(&self, name: &str, options: MethodOptions) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidName { kind: "method" });
        }
        if self.has_method(name) {
            return Err(Error::AlreadyRegistered {
                kind: "method",
                name: name.to_string(),
            });
        }

        let descriptor = options
            .with_defaults(&self.all)
            .build(name, self.middlewares.as_ref())?;
        let operation = synthesize(descriptor, Arc::clone(&self.transport));

        let mut methods = self.lock();
        if methods.contains_key(name) {
            return Err(Error::AlreadyRegistered {
                kind: "method",
                name: name.to_string(),
            });
        }
        debug!(service = %self.name, method = %name, "method added");
        methods.insert(name.to_string(), operation);
        Ok(())
    }

    /// Same as [`ApiService::add_method`], reading the options from JSON.
    ///
    /// # Errors
    ///
    /// See [`MethodOptions::from_value`] and [`ApiService::add_method`].
    pub fn add_method_value(&self, name: &str, options: Value) -> Result<()> {
        self.add_method(name, MethodOptions::from_value(name, options)?)
    }

    /// The operation registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMethod`] if there is none.
    pub fn operation(&self, name: &str) -> Result<Operation<Arc<T>>> {
        self.lock()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownMethod(name.to_string()))
    }

    /// Call the method registered under `name`.
    ///
    /// An unknown name is reported through the returned future, like any
    /// other call failure.
    pub fn call(&self, name: &str, args: &[Value]) -> BoxFuture<'static, Result<Value>> {
        match self.operation(name) {
            Ok(operation) => operation.call(args),
            Err(error) => future::ready(Err(error)).boxed(),
        }
    }
}

/// Builder for [`ApiService`].
pub struct ApiServiceBuilder<T> {
    name: String,
    transport: T,
    all: MethodOptions,
    middlewares: Arc<MiddlewareRegistry>,
    methods: Vec<(String, Result<MethodOptions>)>,
}

impl<T> std::fmt::Debug for ApiServiceBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiServiceBuilder")
            .field("name", &self.name)
            .field("all", &self.all)
            .field("methods_count", &self.methods.len())
            .finish_non_exhaustive()
    }
}

impl<T: Transport> ApiServiceBuilder<T> {
    /// Create a builder for a service calling `transport`.
    pub fn new(transport: T) -> Self {
        Self {
            name: String::new(),
            transport,
            all: MethodOptions::new(),
            middlewares: Arc::default(),
            methods: Vec::new(),
        }
    }

    /// Set the service name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the defaults merged under every method.
    #[must_use]
    pub fn all(mut self, all: MethodOptions) -> Self {
        self.all = all;
        self
    }

    /// Resolve named middlewares against `middlewares`.
    #[must_use]
    pub fn middlewares(mut self, middlewares: Arc<MiddlewareRegistry>) -> Self {
        self.middlewares = middlewares;
        self
    }

    /// Add a method.
    #[must_use]
    pub fn method(mut self, name: impl Into<String>, options: MethodOptions) -> Self {
        self.methods.push((name.into(), Ok(options)));
        self
    }

    /// Add a method described in JSON.
    #[must_use]
    pub fn method_value(mut self, name: impl Into<String>, options: Value) -> Self {
        let name = name.into();
        let options = MethodOptions::from_value(&name, options);
        self.methods.push((name, options));
        self
    }

    /// Build the service, adding methods in declaration order.
    ///
    /// # Errors
    ///
    /// Returns the first error met while adding the methods.
    pub fn build(self) -> Result<ApiService<T>> {
        let service = ApiService {
            name: self.name,
            transport: Arc::new(self.transport),
            all: self.all,
            middlewares: self.middlewares,
            methods: Mutex::default(),
        };
        for (name, options) in self.methods {
            service.add_method(&name, options?)?;
        }
        Ok(service)
    }
}

#[cfg(test)]
mod tests {
    use assert2::let_assert;
    use serde_json::json;

    use super::*;
    use crate::{Middleware, Request, Step, TransportConfig, transport_fn};

    fn echo() -> impl Transport {
        transport_fn(|config: TransportConfig| async move {
            Ok(serde_json::to_value(config).unwrap_or_default())
        })
    }

    #[tokio::test]
    async fn call_named_method() {
        let service = ApiService::builder(echo())
            .name("users")
            .method(
                "load",
                MethodOptions::new()
                    .verb("GET")
                    .pattern("/users/:id")
                    .args(|req, args| {
                        req.set_url_param("id", args.first().cloned().unwrap_or_default());
                    }),
            )
            .build()
            .expect("valid service");

        assert_eq!(service.name(), "users");
        assert_eq!(service.method_names(), vec!["load"]);

        let result = service.call("load", &[json!(42)]).await.expect("resolved");
        assert_eq!(result, json!({"method": "GET", "url": "/users/42"}));
    }

    #[tokio::test]
    async fn unknown_method_rejects_the_future() {
        let service = ApiService::builder(echo()).build().expect("valid service");

        let result = service.call("missing", &[]).await;
        let_assert!(Err(Error::UnknownMethod(name)) = result);
        assert_eq!(name, "missing");
    }

    #[test]
    fn add_method_rejects_duplicates_and_empty_names() {
        let service = ApiService::builder(echo()).build().expect("valid service");
        let options = MethodOptions::new().verb("GET").url("/ping");

        service.add_method("ping", options.clone()).expect("added");

        let result = service.add_method("ping", options.clone());
        assert!(matches!(
            result,
            Err(Error::AlreadyRegistered { kind: "method", .. })
        ));

        let result = service.add_method("", options);
        assert!(matches!(result, Err(Error::InvalidName { kind: "method" })));
    }

    #[test]
    fn build_reports_invalid_methods() {
        let result = ApiService::builder(echo())
            .method_value("broken", json!({"verb": 42, "url": "/x"}))
            .build();
        let_assert!(Err(Error::InvalidVerb { method }) = result);
        assert_eq!(method, "broken");

        let result = ApiService::builder(echo())
            .method_value("broken", json!(["GET", "/x"]))
            .build();
        assert!(matches!(result, Err(Error::InvalidMethodOptions { .. })));
    }

    #[tokio::test]
    async fn all_defaults_merge_under_methods() {
        let middlewares = Arc::new(MiddlewareRegistry::new());
        middlewares
            .register(
                "tag",
                Middleware::response(|_: &Request, res: Value| {
                    Step::value(json!({"tagged": res["url"]}))
                }),
            )
            .expect("registered");

        let service = ApiService::builder(echo())
            .middlewares(middlewares)
            .all(
                MethodOptions::new()
                    .verb("GET")
                    .config(json!({"headers": {"Accept": "application/json"}}))
                    .success_named("tag"),
            )
            .method_value(
                "list",
                json!({"url": "/items", "config": {"params": {"page": 1}}}),
            )
            .method(
                "raw",
                MethodOptions::new()
                    .verb("HEAD")
                    .url("/items")
                    .success(|_: &Request, res: Value| Step::value(json!([res]))),
            )
            .build()
            .expect("valid service");

        let list = service.call("list", &[]).await.expect("resolved");
        assert_eq!(list, json!({"tagged": "/items"}));

        // chains from `all` run first
        let raw = service.call("raw", &[]).await.expect("resolved");
        assert_eq!(raw, json!([{"tagged": "/items"}]));

        let operation = service.operation("list").expect("registered");
        assert_eq!(
            operation.descriptor().config().get("headers"),
            Some(&json!({"Accept": "application/json"}))
        );
    }
}
