//! Unified error types.

use serde::Serialize;

/// Boxed error used at collaborator boundaries (CRUD operations, body streams,
/// caller-supplied middleware).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by restlayer's fallible operations.
///
/// Expected HTTP outcomes (404, 413, etc.) are written to the
/// [`Response`](crate::Response), not raised as `Error`s. This type surfaces
/// everything else: configuration, sockets, and failures escaping handlers or
/// middleware, which end up at the terminal error handler.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid route `{path}`: {reason}")]
    InvalidRoute { path: String, reason: String },

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("request body: {0}")]
    Body(#[source] BoxError),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Handler(BoxError),
}

impl Error {
    /// Wraps any error raised by application code.
    pub fn handler(err: impl Into<BoxError>) -> Self {
        Self::Handler(err.into())
    }
}

/// Assembly-time configuration failures. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing configuration section `{0}`")]
    MissingSection(String),

    #[error("missing required option `port`")]
    MissingPort,

    #[error("option `port` must be a positive integer")]
    InvalidPort,

    #[error("malformed options: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("`session` options are set but no session store was supplied")]
    MissingSessionStore,
}

/// Client-facing failure body: `{"error":{"code":..,"message":..}}`.
///
/// Only a code and a message ever reach the wire. Causes stay in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl ErrorEnvelope {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetails { code: code.into(), message: message.into() },
        }
    }

    /// Envelope used by generated model handlers when a collaborator fails.
    pub fn internal_server_error() -> Self {
        Self::new("InternalServerError", "An unexpected error occurred")
    }

    /// Envelope used by the terminal error handler.
    pub fn overall_exception() -> Self {
        Self::new("OverallException", "Internal error")
    }
}
