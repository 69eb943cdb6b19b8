//! Prelude module for convenient imports.
//!
//! ```ignore
//! use tether::prelude::*;
//! ```

pub use crate::middleware::{BearerAuth, Retry};
pub use crate::{
    ApiClient, ApiService, ClientConfig, Error, HyperTransport, MethodConfig, MethodOptions,
    Middleware, Operation, Request, RequestMiddleware, ResponseMiddleware, Result, Step,
    Transport, TransportConfig, synthesize, transport_fn,
};
pub use serde_json::{Value, json};
