//! The transport seam.
//!
//! A transport takes the compiled [`TransportConfig`] and settles with either
//! a response value or an error value. Both are opaque to the pipeline: the
//! response seeds the success chain, the error seeds the error chain.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::TransportConfig;

/// Performs the actual call for a synthesized operation.
pub trait Transport: Send + Sync + 'static {
    /// Execute the call described by `config`.
    fn execute(
        &self,
        config: TransportConfig,
    ) -> impl Future<Output = std::result::Result<Value, Value>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    fn execute(
        &self,
        config: TransportConfig,
    ) -> impl Future<Output = std::result::Result<Value, Value>> + Send {
        (**self).execute(config)
    }
}

/// A transport backed by a function returning a future.
#[derive(Debug, Clone, Copy)]
pub struct FnTransport<F>(F);

/// Use a function as a transport.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use tether_core::{TransportConfig, transport_fn};
///
/// let transport = transport_fn(|config: TransportConfig| async move {
///     Ok(json!({"url": config.url}))
/// });
/// # let _ = transport;
/// ```
pub fn transport_fn<F, Fut>(f: F) -> FnTransport<F>
where
    F: Fn(TransportConfig) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Value, Value>> + Send + 'static,
{
    FnTransport(f)
}

impl<F, Fut> Transport for FnTransport<F>
where
    F: Fn(TransportConfig) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Value, Value>> + Send + 'static,
{
    fn execute(
        &self,
        config: TransportConfig,
    ) -> impl Future<Output = std::result::Result<Value, Value>> + Send {
        (self.0)(config)
    }
}
