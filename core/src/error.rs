//! Dispatch error taxonomy.
//!
//! Every variant is reported synchronously, before an asynchronous result is
//! handed back to the caller. Failures raised inside a handler's future are
//! not wrapped: they travel unchanged through the [`Response`](crate::request::Response).

use thiserror::Error;

/// Errors reported by the dispatcher and its handler wrappers.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// An argument does not satisfy the contract of the operation
    ///
    /// Raised for object-typed requests whose concrete type is not a known
    /// `Request` (or `Notification` for publish).
    #[error("Invalid argument `{argument}`: {reason}")]
    InvalidArgument {
        /// Name of the offending argument
        argument: &'static str,
        /// Which contract was violated
        reason: String,
    },

    /// The handler factory has no handler for a single-handler lookup
    #[error(
        "Handler was not found for request of type {request_type}. Register a {handler} with the handler factory."
    )]
    HandlerNotFound {
        /// Concrete request type
        request_type: &'static str,
        /// Handler capability that was requested
        handler: &'static str,
    },

    /// The handler factory failed while resolving a handler
    #[error(
        "Error constructing handler for request of type {request_type}. Register your handlers with the handler factory."
    )]
    HandlerConstructionFailed {
        /// Concrete request type
        request_type: &'static str,
        /// Cause raised by the factory
        #[source]
        source: anyhow::Error,
    },

    /// A notification handler failed while it was being started
    ///
    /// Only fan-out reports this synchronously; request handlers fail through
    /// their response future.
    #[error("Handler for notification of type {request_type} failed: {source}")]
    HandlerFailed {
        /// Concrete notification type
        request_type: &'static str,
        /// Failure raised by the handler
        #[source]
        source: anyhow::Error,
    },
}

impl DispatchError {
    /// Build an [`DispatchError::InvalidArgument`] for a missing capability.
    #[must_use]
    pub fn missing_capability(argument: &'static str, type_name: &str, capability: &str) -> Self {
        Self::InvalidArgument {
            argument,
            reason: format!("{type_name} does not implement {capability}"),
        }
    }

    /// Build an [`DispatchError::InvalidArgument`] for a value of the wrong concrete type.
    #[must_use]
    pub fn wrong_type(argument: &'static str, expected: &str) -> Self {
        Self::InvalidArgument {
            argument,
            reason: format!("value is not a {expected}"),
        }
    }

    /// Whether this error came from the handler factory rather than the caller.
    #[must_use]
    pub const fn is_resolution_failure(&self) -> bool {
        matches!(
            self,
            Self::HandlerNotFound { .. } | Self::HandlerConstructionFailed { .. }
        )
    }
}

/// Result alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
