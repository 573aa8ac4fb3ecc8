//! Credential extraction
//!
//! Pulls a bearer credential from the `Authorization` header, falling back to the
//! `token` query parameter for clients that cannot set headers on an upgrade.

use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use serde::Deserialize;
use std::convert::Infallible;

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Raw credential presented with a request, if any
///
/// Never rejects: a missing credential is reported by the authentication gate.
#[derive(Debug, Clone, Default)]
pub struct Credential(pub Option<String>);

impl Credential {
    #[must_use]
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Credential
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Ok(TypedHeader(Authorization(bearer))) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state).await
        {
            return Ok(Self(Some(bearer.token().to_string())));
        }

        let token = Query::<TokenQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(q)| q.token)
            .filter(|t| !t.trim().is_empty());

        Ok(Self(token))
    }
}
