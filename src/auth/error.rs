// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Authentication error type.
///
/// Every verification or mapping failure keeps its specific kind so callers
/// can tell "this token is not acceptable" apart from "the identity provider
/// could not be reached". Only [`AuthError::ProviderUnavailable`] is transient.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No authorization header present
    #[error("Authorization header is required")]
    MissingAuthHeader,
    /// Invalid authorization header format
    #[error("Invalid authorization header format (expected 'Bearer <token>')")]
    InvalidAuthHeader,
    /// Token structure could not be parsed, or a required registered claim is missing
    #[error("Token is malformed")]
    MalformedToken,
    /// Discovery document or signing keys could not be obtained
    #[error("Identity provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Signature does not verify against any published key
    #[error("Token signature is invalid")]
    InvalidSignature,
    /// Token has expired
    #[error("Token has expired")]
    TokenExpired,
    /// Token is used before its not-before time
    #[error("Token is not yet valid")]
    TokenNotYetValid,
    /// Token issuer differs from the configured issuer
    #[error("Token issuer does not match the configured issuer")]
    IssuerMismatch,
    /// Token audience does not contain the configured client id
    #[error("Token audience does not include this client")]
    AudienceMismatch,
    /// A session claim is absent or has the wrong type
    #[error("Claim '{0}' is missing or has an unexpected type")]
    MalformedClaim(&'static str),
    /// Internal error
    #[error("Internal authentication error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Whether the failure is an infrastructure fault worth retrying.
    ///
    /// All other kinds are terminal for the token that produced them.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::ProviderUnavailable(_))
    }

    /// Whether the failure means "the caller is not authenticated", as opposed
    /// to "the service could not check".
    pub fn is_unauthenticated(&self) -> bool {
        !matches!(
            self,
            AuthError::ProviderUnavailable(_) | AuthError::Internal(_)
        )
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::MalformedToken => "malformed_token",
            AuthError::ProviderUnavailable(_) => "provider_unavailable",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenNotYetValid => "token_not_yet_valid",
            AuthError::IssuerMismatch => "issuer_mismatch",
            AuthError::AudienceMismatch => "audience_mismatch",
            AuthError::MalformedClaim(_) => "malformed_claim",
            AuthError::Internal(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let challenge = self.is_unauthenticated();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        let mut response = (status, body).into_response();
        if challenge {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
