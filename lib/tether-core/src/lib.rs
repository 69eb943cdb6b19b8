//! Core of the tether declarative HTTP client.
//!
//! This crate turns a method description into a callable operation:
//! - [`PathTemplate`] - URL patterns with mandatory, optional and greedy parameters
//! - [`Request`] and [`MethodConfig`] - per-call request state and its seed
//! - [`Step`] and the middleware traits - request, success and error chains
//! - [`MethodOptions`] and [`MethodDescriptor`] - validated method descriptions
//! - [`Operation`] and [`Replay`] - the synthesized call and its continuation
//! - [`Transport`] - the seam performing the actual call
//! - [`Error`] and [`Result`] - error handling

mod descriptor;
mod error;
pub mod merge;
pub mod middleware;
mod operation;
mod path_template;
pub mod prelude;
mod request;
mod transport;

pub use descriptor::{ArgsHook, MethodDescriptor, MethodOptions, UrlResolver, UrlSource};
pub use error::{Error, Result};
pub use middleware::{
    Middleware, MiddlewareResolver, Mode, NoMiddlewares, Outcome, RequestMiddleware,
    ResponseMiddleware, Step, StepResult,
};
pub use operation::{Operation, Replay, synthesize};
pub use path_template::{ParamKind, PathTemplate, compile_url};
pub use request::{
    CONFIG_KEYS, MethodConfig, Request, RequestConfig, Transform, TransportConfig,
    TransportOptions, URL_PARAMS,
};
pub use transport::{FnTransport, Transport, transport_fn};

// Re-export http crate types for methods and headers
pub use http::{Method, header};
