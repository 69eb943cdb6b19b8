//! Method options and validated method descriptors.
//!
//! [`MethodOptions`] is the raw, possibly incomplete description of a method,
//! built programmatically or read from JSON. [`MethodOptions::build`] validates
//! it, resolves named middlewares and produces an immutable
//! [`MethodDescriptor`] ready to be synthesized into an operation.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use tether_core::{MethodOptions, NoMiddlewares};
//!
//! let descriptor = MethodOptions::new()
//!     .verb("GET")
//!     .pattern("/users/:id")
//!     .config(json!({"timeout": 5000}))
//!     .args(|req, args| {
//!         if let Some(id) = args.first() {
//!             req.set_url_param("id", id.clone());
//!         }
//!     })
//!     .build("load", &NoMiddlewares)
//!     .expect("valid method");
//!
//! assert_eq!(descriptor.verb(), http::Method::GET);
//! ```

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::middleware::{Middleware, MiddlewareResolver, RequestMiddleware, ResponseMiddleware};
use crate::{Error, MethodConfig, PathTemplate, Request, RequestConfig, Result};

/// Entry-point hook, called with the fresh request and the call arguments.
pub type ArgsHook = Arc<dyn Fn(&mut Request, &[Value]) + Send + Sync>;

/// Computes a url from the compiled transport config.
pub type UrlResolver = Arc<dyn Fn(&RequestConfig) -> String + Send + Sync>;

/// Where the url of a method comes from when the request does not carry one.
#[derive(Clone)]
pub enum UrlSource {
    /// A fixed url.
    Literal(String),
    /// Computed from the compiled config, just before the transport call.
    Resolver(UrlResolver),
}

impl UrlSource {
    /// A resolver url.
    pub fn resolver(f: impl Fn(&RequestConfig) -> String + Send + Sync + 'static) -> Self {
        Self::Resolver(Arc::new(f))
    }
}

impl std::fmt::Debug for UrlSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(url) => f.debug_tuple("Literal").field(url).finish(),
            Self::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

impl From<&str> for UrlSource {
    fn from(url: &str) -> Self {
        Self::Literal(url.to_string())
    }
}

impl From<String> for UrlSource {
    fn from(url: String) -> Self {
        Self::Literal(url)
    }
}

/// A middleware given inline or by registered name.
enum Link<M: ?Sized> {
    Inline(Arc<M>),
    Named(String),
}

impl<M: ?Sized> Clone for Link<M> {
    fn clone(&self) -> Self {
        match self {
            Self::Inline(middleware) => Self::Inline(Arc::clone(middleware)),
            Self::Named(name) => Self::Named(name.clone()),
        }
    }
}

// ============================================================================
// Method Options
// ============================================================================

/// Raw method options.
///
/// Every field is optional here; [`MethodOptions::build`] enforces the rules.
#[derive(Clone, Default)]
pub struct MethodOptions {
    verb: Option<String>,
    pattern: Option<String>,
    url: Option<UrlSource>,
    config: MethodConfig,
    args: Option<ArgsHook>,
    request: Vec<Link<dyn RequestMiddleware>>,
    success: Vec<Link<dyn ResponseMiddleware>>,
    error: Vec<Link<dyn ResponseMiddleware>>,
}

impl std::fmt::Debug for MethodOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodOptions")
            .field("verb", &self.verb)
            .field("pattern", &self.pattern)
            .field("url", &self.url)
            .field("config", &self.config)
            .field("request", &self.request.len())
            .field("success", &self.success.len())
            .field("error", &self.error.len())
            .finish_non_exhaustive()
    }
}

impl MethodOptions {
    /// Create empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read options from a JSON object.
    ///
    /// Recognized keys are `verb`, `pattern`, `url` (strings), `config` (object)
    /// and `request`, `success`, `error` (arrays of registered middleware names).
    /// Other keys are ignored.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidMethodOptions`] if `value` is not an object, or
    ///   `config` or a chain has the wrong shape
    /// - [`Error::InvalidVerb`], [`Error::InvalidPattern`] or
    ///   [`Error::InvalidUrl`] if the matching key is present but not a string
    pub fn from_value(method: &str, value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(Error::InvalidMethodOptions {
                method: method.to_string(),
            });
        };
        let invalid_options = || Error::InvalidMethodOptions {
            method: method.to_string(),
        };

        let mut options = Self::new();

        if let Some(verb) = fields.remove("verb") {
            let Value::String(verb) = verb else {
                return Err(Error::InvalidVerb {
                    method: method.to_string(),
                });
            };
            options.verb = Some(verb);
        }
        if let Some(pattern) = fields.remove("pattern") {
            let Value::String(pattern) = pattern else {
                return Err(Error::InvalidPattern {
                    method: method.to_string(),
                });
            };
            options.pattern = Some(pattern);
        }
        if let Some(url) = fields.remove("url") {
            let Value::String(url) = url else {
                return Err(Error::InvalidUrl {
                    method: method.to_string(),
                });
            };
            options.url = Some(UrlSource::Literal(url));
        }
        match fields.remove("config") {
            None | Some(Value::Null) => {}
            Some(config) => {
                options.config = MethodConfig::from_value(config).ok_or_else(invalid_options)?;
            }
        }

        options.request = named_links(&mut fields, "request").ok_or_else(invalid_options)?;
        options.success = named_links(&mut fields, "success").ok_or_else(invalid_options)?;
        options.error = named_links(&mut fields, "error").ok_or_else(invalid_options)?;

        Ok(options)
    }

    /// Sets the HTTP verb.
    #[must_use]
    pub fn verb(mut self, verb: impl Into<String>) -> Self {
        self.verb = Some(verb.into());
        self
    }

    /// Sets the URL pattern.
    #[must_use]
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Sets a literal url or a resolver. Takes precedence over the pattern.
    #[must_use]
    pub fn url(mut self, url: impl Into<UrlSource>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets a url resolver, called with the compiled config.
    #[must_use]
    pub fn url_fn(self, f: impl Fn(&RequestConfig) -> String + Send + Sync + 'static) -> Self {
        self.url(UrlSource::resolver(f))
    }

    /// Sets the static config seed from a JSON object.
    ///
    /// A non-object value is ignored and the seed is left unchanged, where
    /// [`MethodOptions::from_value`] rejects it with
    /// [`Error::InvalidMethodOptions`].
    #[must_use]
    pub fn config(mut self, config: Value) -> Self {
        if let Some(config) = MethodConfig::from_value(config) {
            self.config = config;
        }
        self
    }

    /// Sets the static config seed.
    #[must_use]
    pub fn method_config(mut self, config: MethodConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the entry-point hook.
    #[must_use]
    pub fn args(mut self, f: impl Fn(&mut Request, &[Value]) + Send + Sync + 'static) -> Self {
        self.args = Some(Arc::new(f));
        self
    }

    /// Appends a request middleware.
    #[must_use]
    pub fn request(mut self, middleware: impl RequestMiddleware) -> Self {
        self.request.push(Link::Inline(Arc::new(middleware)));
        self
    }

    /// Appends a success middleware.
    #[must_use]
    pub fn success(mut self, middleware: impl ResponseMiddleware) -> Self {
        self.success.push(Link::Inline(Arc::new(middleware)));
        self
    }

    /// Appends an error middleware.
    #[must_use]
    pub fn error(mut self, middleware: impl ResponseMiddleware) -> Self {
        self.error.push(Link::Inline(Arc::new(middleware)));
        self
    }

    /// Appends a registered middleware to the request chain.
    #[must_use]
    pub fn request_named(mut self, name: impl Into<String>) -> Self {
        self.request.push(Link::Named(name.into()));
        self
    }

    /// Appends a registered middleware to the success chain.
    #[must_use]
    pub fn success_named(mut self, name: impl Into<String>) -> Self {
        self.success.push(Link::Named(name.into()));
        self
    }

    /// Appends a registered middleware to the error chain.
    #[must_use]
    pub fn error_named(mut self, name: impl Into<String>) -> Self {
        self.error.push(Link::Named(name.into()));
        self
    }

    /// Merge shared defaults under these options.
    ///
    /// Config fields are deep-extended with these options winning, chains
    /// from `all` run before the method's own, and every other option set
    /// here overrides the one in `all`.
    #[must_use]
    pub fn with_defaults(self, all: &Self) -> Self {
        let mut config = all.config.clone();
        config.extend(&self.config);

        Self {
            verb: self.verb.or_else(|| all.verb.clone()),
            pattern: self.pattern.or_else(|| all.pattern.clone()),
            url: self.url.or_else(|| all.url.clone()),
            config,
            args: self.args.or_else(|| all.args.clone()),
            request: all.request.iter().cloned().chain(self.request).collect(),
            success: all.success.iter().cloned().chain(self.success).collect(),
            error: all.error.iter().cloned().chain(self.error).collect(),
        }
    }

    /// Validate the options and resolve named middlewares.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidVerb`] if the verb is missing, empty or not an HTTP method token
    ///
    /// The verb is uppercased first, so `"get"` builds a `GET` method.
    /// - [`Error::InvalidPattern`] if the pattern is empty
    /// - [`Error::InvalidUrl`] if the literal url is empty
    /// - [`Error::InvalidMethodOptions`] if neither a pattern nor a url is set
    /// - [`Error::UnknownMiddleware`] or [`Error::InvalidMiddleware`] for a
    ///   named middleware that is not registered or of the wrong kind
    pub fn build(self, name: &str, resolver: &impl MiddlewareResolver) -> Result<MethodDescriptor> {
        let verb = self
            .verb
            .as_deref()
            .filter(|verb| !verb.is_empty())
            .and_then(|verb| {
                http::Method::from_bytes(verb.to_ascii_uppercase().as_bytes()).ok()
            })
            .ok_or_else(|| Error::InvalidVerb {
                method: name.to_string(),
            })?;

        let pattern = match self.pattern {
            Some(pattern) if pattern.is_empty() => {
                return Err(Error::InvalidPattern {
                    method: name.to_string(),
                });
            }
            Some(pattern) => Some(PathTemplate::new(pattern)),
            None => None,
        };

        if matches!(&self.url, Some(UrlSource::Literal(url)) if url.is_empty()) {
            return Err(Error::InvalidUrl {
                method: name.to_string(),
            });
        }
        if pattern.is_none() && self.url.is_none() {
            return Err(Error::InvalidMethodOptions {
                method: name.to_string(),
            });
        }

        let request = self
            .request
            .into_iter()
            .map(|link| match link {
                Link::Inline(middleware) => Ok(middleware),
                Link::Named(name) => match resolver.resolve(&name)? {
                    Middleware::Request(middleware) => Ok(middleware),
                    Middleware::Response(_) => Err(Error::InvalidMiddleware {
                        name,
                        chain: "request",
                    }),
                },
            })
            .collect::<Result<Vec<_>>>()?;
        let success = resolve_response_chain(self.success, "success", resolver)?;
        let error = resolve_response_chain(self.error, "error", resolver)?;

        Ok(MethodDescriptor {
            name: name.to_string(),
            verb,
            pattern,
            url: self.url,
            config: self.config,
            args: self.args,
            request,
            success,
            error,
        })
    }
}

fn named_links<M: ?Sized>(fields: &mut Map<String, Value>, key: &str) -> Option<Vec<Link<M>>> {
    match fields.remove(key) {
        None | Some(Value::Null) => Some(Vec::new()),
        Some(Value::Array(names)) => names
            .into_iter()
            .map(|name| match name {
                Value::String(name) => Some(Link::Named(name)),
                _ => None,
            })
            .collect(),
        Some(_) => None,
    }
}

fn resolve_response_chain(
    links: Vec<Link<dyn ResponseMiddleware>>,
    chain: &'static str,
    resolver: &impl MiddlewareResolver,
) -> Result<Vec<Arc<dyn ResponseMiddleware>>> {
    links
        .into_iter()
        .map(|link| match link {
            Link::Inline(middleware) => Ok(middleware),
            Link::Named(name) => match resolver.resolve(&name)? {
                Middleware::Response(middleware) => Ok(middleware),
                Middleware::Request(_) => Err(Error::InvalidMiddleware { name, chain }),
            },
        })
        .collect()
}

// ============================================================================
// Method Descriptor
// ============================================================================

/// A validated, immutable method description.
pub struct MethodDescriptor {
    name: String,
    verb: http::Method,
    pattern: Option<PathTemplate>,
    url: Option<UrlSource>,
    config: MethodConfig,
    args: Option<ArgsHook>,
    pub(crate) request: Vec<Arc<dyn RequestMiddleware>>,
    pub(crate) success: Vec<Arc<dyn ResponseMiddleware>>,
    pub(crate) error: Vec<Arc<dyn ResponseMiddleware>>,
}

impl std::fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("verb", &self.verb)
            .field("pattern", &self.pattern)
            .field("url", &self.url)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MethodDescriptor {
    /// Method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// HTTP verb.
    #[must_use]
    pub fn verb(&self) -> http::Method {
        self.verb.clone()
    }

    /// URL pattern, if any.
    #[must_use]
    pub fn pattern(&self) -> Option<&PathTemplate> {
        self.pattern.as_ref()
    }

    /// Url source, if any.
    #[must_use]
    pub fn url(&self) -> Option<&UrlSource> {
        self.url.as_ref()
    }

    /// Static config seed.
    #[must_use]
    pub fn config(&self) -> &MethodConfig {
        &self.config
    }

    /// Number of middlewares in the request, success and error chains.
    #[must_use]
    pub fn chain_lengths(&self) -> (usize, usize, usize) {
        (self.request.len(), self.success.len(), self.error.len())
    }

    pub(crate) fn invoke_args(&self, request: &mut Request, args: &[Value]) {
        if let Some(hook) = &self.args {
            hook(request, args);
        }
    }
}
