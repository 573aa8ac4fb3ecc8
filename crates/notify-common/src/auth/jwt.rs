//! JWT verification for connection-time credentials
//!
//! Tokens are issued by an external identity service. This module only decodes and
//! validates them using the `jsonwebtoken` crate; it never mints or refreshes tokens.

use chrono::Utc;
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    #[serde(default)]
    pub sub: String,
    /// Optional team the user is acting for
    #[serde(default, alias = "teamId", skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    /// Expiration time (Unix timestamp)
    #[serde(default)]
    pub exp: i64,
    /// Issued at (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

impl Claims {
    /// Get the user ID
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.sub
    }

    /// Get the team ID, treating an empty claim as absent
    #[must_use]
    pub fn team_id(&self) -> Option<&str> {
        self.team_id.as_deref().filter(|t| !t.is_empty())
    }

    /// Check if the token is expired
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }
}

/// Strip an optional `Bearer ` scheme prefix from a raw credential
#[must_use]
pub fn strip_bearer(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))
        .unwrap_or(trimmed)
        .trim()
}

/// Verifies bearer tokens against the configured HS256 secret
#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Create a new verifier with the given secret and clock-skew leeway
    #[must_use]
    pub fn new(secret: &str, leeway_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation.leeway = leeway_secs;

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Decode and validate a token, returning its claims
    ///
    /// # Errors
    /// Returns an error if the token is missing, malformed, expired, carries a bad
    /// signature, or lacks the subject claim.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let token = strip_bearer(token);
        if token.is_empty() {
            return Err(AppError::MissingAuth);
        }

        let token_data =
            decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
                match e.kind() {
                    ErrorKind::ExpiredSignature => AppError::TokenExpired,
                    ErrorKind::MissingRequiredClaim(claim) => AppError::MissingClaim(claim.clone()),
                    ErrorKind::InvalidToken
                    | ErrorKind::Base64(_)
                    | ErrorKind::Json(_)
                    | ErrorKind::Utf8(_) => AppError::MalformedToken,
                    _ => AppError::InvalidToken,
                }
            })?;

        let claims = token_data.claims;
        if claims.sub.trim().is_empty() {
            return Err(AppError::MissingClaim("sub".to_string()));
        }

        Ok(claims)
    }
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("algorithms", &self.validation.algorithms)
            .field("leeway", &self.validation.leeway)
            .finish_non_exhaustive()
    }
}
