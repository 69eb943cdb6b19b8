//! Prelude module for convenient imports.
//!
//! ```ignore
//! use tether_core::prelude::*;
//! ```

pub use crate::{
    Error, MethodConfig, MethodOptions, Middleware, Operation, Request, RequestMiddleware,
    ResponseMiddleware, Result, Step, Transport, TransportConfig, synthesize, transport_fn,
};
