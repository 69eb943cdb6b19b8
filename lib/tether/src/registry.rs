//! Named middleware store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::{Error, Middleware, MiddlewareResolver, Result};

/// Middlewares registered by name, shared by a client and its services.
///
/// Method options reference these through
/// [`MethodOptions::request_named`](crate::MethodOptions::request_named) and
/// friends; names are resolved once, when the method is added.
#[derive(Default)]
pub struct MiddlewareRegistry {
    middlewares: Mutex<HashMap<String, Middleware>>,
}

impl std::fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl MiddlewareRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Middleware>> {
        self.middlewares
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a middleware.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidName`] for an empty name and
    /// [`Error::AlreadyRegistered`] if the name is taken.
    pub fn register(&self, name: impl Into<String>, middleware: Middleware) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidName { kind: "middleware" });
        }

        let mut middlewares = self.lock();
        if middlewares.contains_key(&name) {
            return Err(Error::AlreadyRegistered {
                kind: "middleware",
                name,
            });
        }
        debug!(%name, ?middleware, "middleware registered");
        middlewares.insert(name, middleware);
        Ok(())
    }

    /// Look up a middleware.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMiddleware`] if nothing is registered under `name`.
    pub fn get(&self, name: &str) -> Result<Middleware> {
        self.lock()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownMiddleware(name.to_string()))
    }

    /// Returns `true` if a middleware is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

impl MiddlewareResolver for MiddlewareRegistry {
    fn resolve(&self, name: &str) -> Result<Middleware> {
        self.get(name)
    }
}
