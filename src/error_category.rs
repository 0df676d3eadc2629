//! Error categories and the handling policy attached to each.
//!
//! Every [`SessionError`](crate::SessionError) maps to exactly one category
//! through [`SessionError::category`](crate::SessionError::category). The
//! session controller consults the category to decide whether an error
//! forces the session back to the login screen or is only reported.

use std::fmt;

/// Coarse classification of session errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    // Missing, invalid or expired bearer token
    Authentication,
    // Connect, handshake, subscribe and REST request failures
    Transport,
    // Malformed snapshot or match payloads
    Data,
    // Rejected locally before any network call
    UserInput,
    // Durable credential storage
    Storage,
}

impl ErrorCategory {
    /// Returns a human-readable description of the handling policy.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Authentication => {
                "Authentication failed. The stored credential was cleared; please log in again."
            }
            Self::Transport => {
                "The server could not be reached or refused the request. Retry manually."
            }
            Self::Data => {
                "The server sent a payload that could not be read. It was discarded."
            }
            Self::UserInput => "The input was rejected. Correct it and try again.",
            Self::Storage => "The session credential could not be read or written on disk.",
        }
    }

    /// Returns `true` if errors of this category end the authenticated session.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(self, Self::Authentication)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}
