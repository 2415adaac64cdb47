//! Error types for the Linode IP reconciler
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

use crate::model::IpResourceState;

/// Result type alias for reconciler operations
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP status code the Linode API uses for missing objects
pub const NOT_FOUND_CODE: u16 = 404;

/// Core error type for the Linode IP reconciler
#[derive(Error, Debug)]
pub enum Error {
    /// The desired configuration violates a resource invariant.
    ///
    /// Always reported before any API call is made.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The Linode API answered with a non-success status
    #[error("Linode API error ({code}): {message}")]
    Api {
        /// HTTP status code returned by the API
        code: u16,
        /// Upstream error text
        message: String,
    },

    /// The request never produced an API answer (connect, TLS, decode)
    #[error("HTTP error: {0}")]
    Http(String),

    /// An API failure annotated with the address/linode it concerned
    #[error("{context}: {source}")]
    Operation {
        /// Which address or linode the failed call was about
        context: String,
        /// Underlying failure
        source: Box<Error>,
    },

    /// The remote resource changed but a follow-up step failed.
    ///
    /// The state as it now exists remotely travels with the error so the
    /// caller can persist it.
    #[error("IP address {} was changed but {step} failed: {source}", .state.address)]
    PartialFailure {
        /// State of the resource that now exists remotely
        state: Box<IpResourceState>,
        /// Name of the step that failed
        step: String,
        /// Underlying failure
        source: Box<Error>,
    },

    /// One or more best-effort unassignments failed during delete
    #[error("{} unassignment(s) failed: {}", .0.len(), join_messages(.0))]
    AggregatedDelete(Vec<Error>),

    /// The persisted state cannot be acted on
    #[error("Invalid resource state: {0}")]
    InvalidState(String),

    /// The operation context was cancelled while a call was in flight
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// The operation context deadline passed while a call was in flight
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// State store-related errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn join_messages(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an API error from a status code and upstream text
    pub fn api(code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            message: message.into(),
        }
    }

    /// Create a 404 API error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::api(NOT_FOUND_CODE, message)
    }

    /// Create an HTTP transport error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Wrap this error with the address/linode it concerned
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Operation {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Numeric API status code, looking through context wrappers
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Api { code, .. } => Some(*code),
            Self::Operation { source, .. } => source.code(),
            _ => None,
        }
    }

    /// Whether this error means the remote object does not exist
    pub fn is_not_found(&self) -> bool {
        self.code() == Some(NOT_FOUND_CODE)
    }

    /// Whether this error was caused by the operation context
    pub fn is_interrupted(&self) -> bool {
        match self {
            Self::Cancelled(_) | Self::DeadlineExceeded(_) => true,
            Self::Operation { source, .. } => source.is_interrupted(),
            _ => false,
        }
    }
}
