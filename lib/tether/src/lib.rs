//! Declarative HTTP service methods for Rust.
//!
//! Describe each remote method once (verb, url pattern, config seed, and
//! request, success and error middleware chains), then call it by name:
//!
//! ```ignore
//! use serde_json::json;
//! use tether::middleware::{BearerAuth, Retry};
//! use tether::{ApiClient, ClientConfig, MethodOptions, Middleware};
//!
//! let client = ApiClient::with_config(
//!     ClientConfig::builder().base_url("https://api.example.com").build(),
//! );
//! client.register_middleware("auth", Middleware::request(BearerAuth::new("token")))?;
//!
//! let users = client
//!     .service_builder("users")
//!     .all(MethodOptions::new().request_named("auth").error(Retry::new(2)))
//!     .method(
//!         "load",
//!         MethodOptions::new()
//!             .verb("GET")
//!             .pattern("/users/:id")
//!             .args(|req, args| req.set_url_param("id", args[0].clone())),
//!     )
//!     .build()?;
//!
//! let user = users.call("load", &[json!(42)]).await?;
//! ```
//!
//! The pipeline itself lives in [`tether_core`]; this crate adds the hyper
//! transport, the registries and a few reusable middlewares.

mod api_client;
mod client;
mod config;
mod connector;
pub mod middleware;
pub mod prelude;
mod registry;
mod service;

pub use api_client::{ApiClient, BaseUrl};
pub use client::{HyperTransport, HyperTransportBuilder, INVALID_REQUEST, ServiceFuture};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use registry::MiddlewareRegistry;
pub use service::{ApiService, ApiServiceBuilder};

// Re-export tower for middleware composition
pub use tower;

// Re-export core types
pub use tether_core::{
    ArgsHook, CONFIG_KEYS, Error, FnTransport, MethodConfig, MethodDescriptor, MethodOptions,
    Middleware, MiddlewareResolver, Mode, NoMiddlewares, Operation, Outcome, ParamKind,
    PathTemplate, Replay, Request, RequestConfig, RequestMiddleware, ResponseMiddleware, Result,
    Step, StepResult, Transform, Transport, TransportConfig, TransportOptions, URL_PARAMS,
    UrlResolver, UrlSource, compile_url, merge, synthesize, transport_fn,
};

// Re-export http types for methods and headers
pub use tether_core::{Method, header};
