//! Error types for tether.

use derive_more::{Display, Error};
use serde_json::Value;

// ============================================================================
// Error Type
// ============================================================================

/// Main error type for tether operations.
///
/// Configuration errors are returned synchronously while registering or
/// resolving things. Call errors ([`Error::MissingParameter`] and
/// [`Error::Rejected`]) only ever surface through the future returned by a
/// synthesized operation.
#[derive(Debug, Display, Error)]
pub enum Error {
    /// A mandatory URL parameter was absent or empty at compile time.
    #[display("missing parameter \"{name}\" when compiling URL for pattern \"{pattern}\"")]
    MissingParameter {
        /// Parameter name, without the `:` prefix or modifier.
        name: String,
        /// The pattern being compiled.
        pattern: String,
    },

    /// The call settled as a rejection carrying this payload.
    #[display("call rejected with {_0}")]
    Rejected(#[error(not(source))] Value),

    /// The method verb is missing, empty or not a valid HTTP method token.
    #[display("invalid verb for service method \"{method}\"")]
    InvalidVerb {
        /// Method name.
        method: String,
    },

    /// The method pattern is present but not a non-empty string.
    #[display("invalid pattern for service method \"{method}\"")]
    InvalidPattern {
        /// Method name.
        method: String,
    },

    /// The method url is present but neither a non-empty string nor a resolver.
    #[display("invalid url for service method \"{method}\"")]
    InvalidUrl {
        /// Method name.
        method: String,
    },

    /// The method options do not describe a method at all.
    #[display("invalid options for service method \"{method}\"")]
    InvalidMethodOptions {
        /// Method name.
        method: String,
    },

    /// A registry name was empty.
    #[display("invalid {kind} name")]
    InvalidName {
        /// What was being named (`middleware`, `service`, `method`).
        kind: &'static str,
    },

    /// A name was registered twice.
    #[display("{kind} \"{name}\" is already registered")]
    AlreadyRegistered {
        /// What was being registered.
        kind: &'static str,
        /// The duplicate name.
        name: String,
    },

    /// No middleware is registered under that name.
    #[display("unknown middleware \"{_0}\"")]
    UnknownMiddleware(#[error(not(source))] String),

    /// The named middleware cannot run in the chain it was referenced from.
    #[display("invalid middleware \"{name}\" for the {chain} chain")]
    InvalidMiddleware {
        /// Middleware name.
        name: String,
        /// Chain the middleware was referenced from.
        chain: &'static str,
    },

    /// No service is registered under that name.
    #[display("unknown service \"{_0}\"")]
    UnknownService(#[error(not(source))] String),

    /// No method is registered under that name.
    #[display("unknown method \"{_0}\"")]
    UnknownMethod(#[error(not(source))] String),
}

/// Result type alias using [`crate::Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a rejection error from a payload.
    #[must_use]
    pub fn rejected(payload: impl Into<Value>) -> Self {
        Self::Rejected(payload.into())
    }

    /// Create a missing parameter error.
    #[must_use]
    pub fn missing_parameter(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::MissingParameter {
            name: name.into(),
            pattern: pattern.into(),
        }
    }

    /// Returns `true` if a mandatory URL parameter was missing.
    #[must_use]
    pub const fn is_missing_parameter(&self) -> bool {
        matches!(self, Self::MissingParameter { .. })
    }

    /// Returns `true` if this is a settled pipeline rejection.
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// Returns the rejection payload, if this is a pipeline rejection.
    #[must_use]
    pub const fn rejection(&self) -> Option<&Value> {
        match self {
            Self::Rejected(payload) => Some(payload),
            _ => None,
        }
    }

    /// Convert into a payload usable as a middleware rejection.
    ///
    /// Rejections give back their payload untouched, any other error becomes
    /// `{"error": <kind>, "message": <display>}`.
    #[must_use]
    pub fn into_rejection(self) -> Value {
        match self {
            Self::Rejected(payload) => payload,
            other => serde_json::json!({
                "error": other.kind(),
                "message": other.to_string(),
            }),
        }
    }

    /// Short machine-readable name of the variant.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MissingParameter { .. } => "MissingParameter",
            Self::Rejected(_) => "Rejected",
            Self::InvalidVerb { .. } => "InvalidVerb",
            Self::InvalidPattern { .. } => "InvalidPattern",
            Self::InvalidUrl { .. } => "InvalidUrl",
            Self::InvalidMethodOptions { .. } => "InvalidMethodOptions",
            Self::InvalidName { .. } => "InvalidName",
            Self::AlreadyRegistered { .. } => "AlreadyRegistered",
            Self::UnknownMiddleware(_) => "UnknownMiddleware",
            Self::InvalidMiddleware { .. } => "InvalidMiddleware",
            Self::UnknownService(_) => "UnknownService",
            Self::UnknownMethod(_) => "UnknownMethod",
        }
    }
}
