//! Authentication gate
//!
//! Turns a bearer credential into the identity a connection is registered under.
//! Nothing is registered until this succeeds.

use notify_common::{AppError, AppResult, TokenVerifier};

/// Identity resolved from a verified credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub team_id: Option<String>,
}

/// Verifies connection-time credentials
#[derive(Debug, Clone)]
pub struct AuthGate {
    verifier: TokenVerifier,
}

impl AuthGate {
    #[must_use]
    pub fn new(verifier: TokenVerifier) -> Self {
        Self { verifier }
    }

    /// Validate a credential and extract the identity
    ///
    /// # Errors
    /// Returns an authentication error if the credential is absent or fails
    /// verification.
    pub fn authenticate(&self, credential: Option<&str>) -> AppResult<Identity> {
        let Some(credential) = credential else {
            return Err(AppError::MissingAuth);
        };

        match self.verifier.verify(credential) {
            Ok(claims) => {
                let identity = Identity {
                    user_id: claims.user_id().to_string(),
                    team_id: claims.team_id().map(str::to_string),
                };
                tracing::debug!(user_id = %identity.user_id, "Credential accepted");
                Ok(identity)
            }
            Err(e) => {
                tracing::debug!(error_code = e.error_code(), "Credential rejected");
                Err(e)
            }
        }
    }
}
