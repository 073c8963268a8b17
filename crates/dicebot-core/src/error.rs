//! Unified error types for the dicebot adapter layer.
//!
//! The taxonomy follows how far a failure is allowed to travel:
//!
//! - [`TransportError`]: dial/accept/read/write failures. They end a session
//!   or trigger a reconnect, never the process.
//! - [`AdapterError`]: a single inbound frame could not be understood. The
//!   frame is dropped and the read loop continues.
//! - [`ApiError`]: an outbound call could not complete. Returned to the caller
//!   and never retried automatically.

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that can occur in transport operations.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {url} - {reason}")]
    ConnectionFailed {
        /// The URL that failed to connect.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// Connection closed.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for closure.
        reason: String,
    },

    /// Message send failed.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// Message receive failed.
    #[error("failed to receive message: {0}")]
    ReceiveFailed(String),

    /// Listener could not bind its address.
    #[error("failed to bind {addr}: {reason}")]
    Bind {
        /// The address that could not be bound.
        addr: String,
        /// Reason for failure.
        reason: String,
    },

    /// The outbound request could not be built (bad URL or header value).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// Creates a connection-closed error with the given reason.
    pub fn closed(reason: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Adapter Errors
// =============================================================================

/// Errors raised while turning one inbound frame into domain types.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    /// Frame parsing failed.
    #[error("failed to parse frame: {reason}")]
    Parse {
        /// Reason for failure.
        reason: String,
    },

    /// Internal adapter error.
    #[error("adapter error: {0}")]
    Internal(String),

    /// Transport error.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl AdapterError {
    /// Creates a parse error with the given reason.
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(err: serde_json::Error) -> Self {
        Self::parse(err.to_string())
    }
}

// =============================================================================
// API Errors
// =============================================================================

/// Error type for outbound API calls.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// No session currently serves API calls.
    #[error("no active API session")]
    NotConnected,

    /// No response arrived within the call timeout.
    #[error("action timeout")]
    Timeout,

    /// The peer answered with a non-ok status.
    #[error("API error ({retcode}): {message}")]
    Remote {
        /// Wire `retcode`.
        retcode: i64,
        /// Wire message, wording, or a synthesized `retcode=<n>`.
        message: String,
    },

    /// The pending call was failed because its session or the adapter went away.
    #[error("call aborted: {0}")]
    Closed(String),

    /// The caller cancelled the call.
    #[error("call cancelled")]
    Cancelled,

    /// The operation has no OneBot11 equivalent.
    #[error("{0} not supported")]
    NotSupported(&'static str),

    /// A target identifier could not be normalized.
    #[error("invalid id: {0}")]
    InvalidId(String),

    /// The response frame carried the right echo but could not be decoded.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Failed to serialize/deserialize a payload.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Transport error.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;
