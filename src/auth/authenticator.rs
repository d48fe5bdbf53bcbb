// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token in, authenticated session out.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::claims::SessionData;
use super::directory::KeyResolver;
use super::error::AuthError;
use super::session::AuthenticatedSession;
use super::verifier::{TokenVerifier, VerifiedToken};

/// Composes verification and claims mapping into the single authentication
/// entry point used by the request layer.
pub struct Authenticator {
    verifier: TokenVerifier,
}

impl Authenticator {
    pub fn new(verifier: TokenVerifier) -> Self {
        Self { verifier }
    }

    /// Build an authenticator for `issuer` / `client_id` on top of `resolver`.
    pub fn for_provider(
        resolver: Arc<dyn KeyResolver>,
        issuer: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self::new(TokenVerifier::new(resolver, issuer, client_id))
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Authenticate a bearer token.
    ///
    /// Provider requests made on the way are abandoned when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Any verification error from [`TokenVerifier::verify`], or
    /// [`AuthError::MalformedClaim`] when the verified claims do not have the
    /// session shape. [`AuthError::ProviderUnavailable`] is the only transient
    /// kind.
    pub async fn authenticate(
        &self,
        cancel: &CancellationToken,
        token: &str,
    ) -> Result<AuthenticatedSession, AuthError> {
        let result = self.verifier.verify(cancel, token).await;
        let VerifiedToken { subject, claims } = match result {
            Ok(verified) => verified,
            Err(e) if e.is_transient() => {
                warn!(issuer = self.verifier.issuer(), error = %e, "Token could not be checked");
                return Err(e);
            }
            Err(e) => {
                debug!(error_code = e.error_code(), "Token rejected");
                return Err(e);
            }
        };

        let data = SessionData::from_claims(&claims).inspect_err(|e| {
            debug!(subject = %subject, error = %e, "Verified token has unsupported claims");
        })?;

        debug!(subject = %subject, roles = ?data.user_roles(), "Token authenticated");
        Ok(AuthenticatedSession::new(subject, data))
    }
}
