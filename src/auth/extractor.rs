// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated sessions.
//!
//! Use the `Auth` extractor in handlers to require authentication:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(session): Auth) -> impl IntoResponse {
//!     // session.subject, session.data.user_roles(), ...
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::{AuthError, AuthenticatedSession};
use crate::state::AppState;

/// Extractor for authenticated sessions.
///
/// Validates the bearer token from the Authorization header and provides the
/// subject and session data. Rejects with the specific [`AuthError`].
pub struct Auth(pub AuthenticatedSession);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // Already authenticated earlier in this request
        if let Some(session) = parts.extensions.get::<AuthenticatedSession>().cloned() {
            return Ok(Auth(session));
        }

        let token = bearer_token(parts)?;
        let session = state
            .authenticator
            .authenticate(&state.request_token(), token)
            .await?;

        parts.extensions.insert(session.clone());
        Ok(Auth(session))
    }
}

/// Optional authentication extractor.
///
/// Any "not authenticated" outcome (no header, bad token, unsupported claims)
/// becomes `None`. Faults on our side, such as an unreachable provider, are
/// still rejected so they are not mistaken for an anonymous caller.
pub struct OptionalAuth(pub Option<AuthenticatedSession>);

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match Auth::from_request_parts(parts, state).await {
            Ok(Auth(session)) => Ok(OptionalAuth(Some(session))),
            Err(e) if e.is_unauthenticated() => Ok(OptionalAuth(None)),
            Err(e) => Err(e),
        }
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let (scheme, token) = header
        .trim()
        .split_once(' ')
        .ok_or(AuthError::InvalidAuthHeader)?;
    let token = token.trim();

    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }
    Ok(token)
}
