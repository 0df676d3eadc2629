//! Error types for the matchmaking session client.

use thiserror::Error;

use crate::error_category::ErrorCategory;

/// Errors that can occur while driving a matchmaking session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The operation needs a bearer token but none is held.
    #[error("authentication required")]
    AuthenticationRequired,

    /// The server refused the bearer token (invalid, expired or revoked).
    #[error("credential rejected by server")]
    InvalidCredential,

    /// The server understood the request but declined it.
    #[error("request rejected: {message}")]
    Rejected {
        /// Human-readable message from the server.
        message: String,
    },

    /// Failed to send a frame through the realtime transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a frame from the realtime transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The realtime transport was closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// The STOMP handshake did not complete.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// A REST request failed below the HTTP status level.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A REST request returned an unexpected status code.
    #[error("unexpected HTTP status {status} from {path}")]
    Status {
        /// Numeric HTTP status.
        status: u16,
        /// Request path, without query string.
        path: String,
    },

    /// Failed to serialize or deserialize a JSON payload.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A realtime frame could not be parsed.
    #[error("malformed frame: {0}")]
    Frame(String),

    /// User input was rejected before any network call.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Durable credential storage failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Classify this error for the session's handling policy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthenticationRequired | Self::InvalidCredential => ErrorCategory::Authentication,
            Self::Serialization(_) | Self::Frame(_) => ErrorCategory::Data,
            Self::InvalidInput(_) => ErrorCategory::UserInput,
            Self::Storage(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Rejected { .. }
            | Self::TransportSend(_)
            | Self::TransportReceive(_)
            | Self::TransportClosed
            | Self::Handshake(_)
            | Self::Http(_)
            | Self::Status { .. }
            | Self::Timeout => ErrorCategory::Transport,
        }
    }

    /// Returns `true` if the server refused the bearer token.
    ///
    /// Callers treat this exactly like a failed validation: the credential is
    /// cleared and the session returns to the login screen.
    pub fn is_credential_rejection(&self) -> bool {
        matches!(self, Self::InvalidCredential)
    }
}

/// A specialized [`Result`] type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_handling_policy() {
        assert_eq!(
            SessionError::AuthenticationRequired.category(),
            ErrorCategory::Authentication
        );
        assert_eq!(
            SessionError::InvalidCredential.category(),
            ErrorCategory::Authentication
        );
        assert_eq!(
            SessionError::Handshake("no".into()).category(),
            ErrorCategory::Transport
        );
        assert_eq!(
            SessionError::Frame("bad".into()).category(),
            ErrorCategory::Data
        );
        assert_eq!(
            SessionError::InvalidInput("empty".into()).category(),
            ErrorCategory::UserInput
        );
    }

    #[test]
    fn only_invalid_credential_is_a_rejection() {
        assert!(SessionError::InvalidCredential.is_credential_rejection());
        assert!(!SessionError::AuthenticationRequired.is_credential_rejection());
        assert!(!SessionError::Timeout.is_credential_rejection());
    }
}
