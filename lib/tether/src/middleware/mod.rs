//! Reusable middlewares.
//!
//! Two kinds live here:
//!
//! - tower layers around the HTTP transport, composed with
//!   [`HyperTransportBuilder::layer`](crate::HyperTransportBuilder::layer):
//!   [`LoggingLayer`] and [`BearerAuthLayer`]
//! - pipeline middlewares, added to a method's request, success or error
//!   chain: [`BearerAuth`] and [`Retry`]
//!
//! # Example
//!
//! ```ignore
//! use tether::middleware::{BearerAuth, Retry};
//! use tether::{ApiClient, Middleware, MethodOptions};
//!
//! let client = ApiClient::with_config(config);
//! client.register_middleware("auth", Middleware::request(BearerAuth::new("my-token")))?;
//! client.register_middleware("retry", Middleware::response(Retry::new(3)))?;
//!
//! let options = MethodOptions::new()
//!     .verb("GET")
//!     .pattern("/users/:id")
//!     .request_named("auth")
//!     .error_named("retry");
//! ```

mod bearer_auth;
mod logging;
mod retry;

pub use bearer_auth::{BearerAuth, BearerAuthLayer, BearerAuthService};
pub use logging::{LogLevel, Logging, LoggingLayer};
pub use retry::{RETRY_ATTEMPT, Retry};

// Re-export tower types for convenience
pub use tower::{Layer, ServiceBuilder};
