//! Error taxonomy for gateway operations.
//!
//! # Design
//! - Constant messages; operational context lives in fields.
//! - Connectivity failures are the only recoverable class and are the only
//!   ones that drive the retry state machine.

use std::error::Error;

use thiserror::Error;

/// Primary error type for gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The backend could not be reached or refused the session.
    #[error("backend unreachable")]
    Connectivity {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying transport failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The backend returned a payload that could not be decoded.
    #[error("malformed backend payload")]
    Decode {
        /// Operation identifier.
        operation: &'static str,
        /// Static or formatted detail describing the malformation.
        detail: String,
    },
    /// The caller supplied an unsupported option combination.
    #[error("invalid request options")]
    Validation {
        /// Reason the options were rejected.
        reason: String,
    },
    /// The operation is not supported by this backend.
    #[error("operation not supported by this backend")]
    Unsupported {
        /// Operation identifier.
        operation: &'static str,
    },
    /// The backend processed the request but reported a failure.
    #[error("backend rejected the operation")]
    Rejected {
        /// Operation identifier.
        operation: &'static str,
        /// Failure message reported by the backend.
        message: String,
    },
}

impl GatewayError {
    /// Build a connectivity error with structured operation context.
    pub fn connectivity(
        operation: &'static str,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connectivity {
            operation,
            source: Box::new(source),
        }
    }

    /// Build a decode error for a malformed backend payload.
    pub fn decode(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::Decode {
            operation,
            detail: detail.into(),
        }
    }

    /// Build a synchronous validation error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Build a backend rejection error.
    pub fn rejected(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Rejected {
            operation,
            message: message.into(),
        }
    }

    /// Whether this failure should drive the connection-health retry path.
    #[must_use]
    pub const fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }
}

/// Convenience alias for gateway operation results.
pub type GatewayResult<T> = Result<T, GatewayError>;
