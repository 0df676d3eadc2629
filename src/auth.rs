//! Auth Gate: credential validation, login and registration.
//!
//! Validation is fail-closed. A missing credential, a `{valid:false}`
//! answer, a non-success status, a transport failure and an unreadable
//! body all clear the store and send the operator back to the login screen.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::api::MatchmakingApi;
use crate::credential::CredentialStore;
use crate::error::{Result, SessionError};
use crate::protocol::{Credential, LoginRequest, RegisterRequest};

/// Result of [`AuthGate::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The stored credential is valid.
    Authenticated { display_name: String },
    /// No usable credential; the front-end must show the login screen.
    RedirectToLogin { reason: String },
}

/// Validates credentials against the server and performs login/registration.
#[derive(Clone)]
pub struct AuthGate {
    api: Arc<dyn MatchmakingApi>,
}

impl AuthGate {
    pub fn new(api: Arc<dyn MatchmakingApi>) -> Self {
        Self { api }
    }

    /// Check the stored credential with `GET /api/auth/validate`.
    ///
    /// Clears `store` on every outcome except success.
    pub async fn validate(&self, store: &CredentialStore) -> AuthOutcome {
        let Some(credential) = store.get() else {
            debug!("no stored credential");
            return AuthOutcome::RedirectToLogin {
                reason: "Please log in to continue.".into(),
            };
        };

        let reason = match self.api.validate(&credential.token).await {
            Ok(resp) if resp.valid => {
                info!(display_name = %credential.display_name, "credential validated");
                return AuthOutcome::Authenticated {
                    display_name: credential.display_name,
                };
            }
            Ok(_) => "Your session has expired. Please log in again.".to_string(),
            Err(e) => {
                warn!("credential validation failed: {e}");
                format!("Could not validate your session ({e}). Please log in again.")
            }
        };

        if let Err(e) = store.clear() {
            warn!("failed to clear rejected credential: {e}");
        }
        AuthOutcome::RedirectToLogin { reason }
    }

    /// Log in and store the returned credential.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidInput`] if username or password is empty
    /// - [`SessionError::Rejected`] with the server's message on bad credentials
    /// - [`SessionError::Storage`] if the credential could not be persisted
    pub async fn login(
        &self,
        store: &CredentialStore,
        username: &str,
        password: &str,
    ) -> Result<Credential> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(SessionError::InvalidInput(
                "Username and password are required".into(),
            ));
        }

        let resp = self
            .api
            .login(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .await?;

        let Some(token) = resp.token.filter(|t| !t.is_empty()) else {
            return Err(SessionError::Rejected {
                message: resp.message.unwrap_or_else(|| "Login failed".into()),
            });
        };
        let display_name = resp.username.unwrap_or_else(|| username.to_string());

        store.set(&token, &display_name)?;
        info!(display_name = %display_name, "logged in");
        Ok(Credential::new(token, display_name))
    }

    /// Create an account. Does not log in.
    ///
    /// Returns the confirmation shown to the operator.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidInput`] if a field is empty
    /// - [`SessionError::Rejected`] with a readable message when the name or
    ///   email is taken or the server declines for another reason
    pub async fn register(&self, username: &str, password: &str, email: &str) -> Result<String> {
        let username = username.trim();
        let email = email.trim();
        if username.is_empty() || password.is_empty() {
            return Err(SessionError::InvalidInput(
                "Username and password are required".into(),
            ));
        }
        if email.is_empty() {
            return Err(SessionError::InvalidInput(
                "Email is required for registration".into(),
            ));
        }

        let request = RegisterRequest {
            username: username.to_string(),
            password: password.to_string(),
            email: email.to_string(),
        };
        match self.api.register(&request).await {
            Ok(_) => {
                info!(username, "registered");
                Ok("Registration successful! You can now login.".into())
            }
            Err(SessionError::Rejected { message }) => Err(SessionError::Rejected {
                message: friendly_registration_error(&message),
            }),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate").finish_non_exhaustive()
    }
}

fn friendly_registration_error(message: &str) -> String {
    if message.contains("Username already exists") {
        "Username already exists. Please choose a different username.".into()
    } else if message.contains("Email already exists") {
        "Email already exists. Please use a different email.".into()
    } else if message.is_empty() {
        "Registration failed".into()
    } else {
        message.to_string()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn registration_errors_are_rephrased() {
        assert_eq!(
            friendly_registration_error("Registration failed: Username already exists"),
            "Username already exists. Please choose a different username."
        );
        assert_eq!(
            friendly_registration_error("Email already exists"),
            "Email already exists. Please use a different email."
        );
        assert_eq!(friendly_registration_error("weak password"), "weak password");
        assert_eq!(friendly_registration_error(""), "Registration failed");
    }
}
