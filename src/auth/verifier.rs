// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer token verification.
//!
//! A token is accepted only when all of these hold:
//!
//! 1. it parses as a JWS compact token with an allowed asymmetric algorithm
//! 2. the provider's keys can be obtained
//! 3. the signature verifies against the key named by `kid`
//! 4. `exp` is in the future and `nbf` (if present) is not
//! 5. `iss` equals the configured issuer and `aud` contains the client id
//!
//! Clock skew tolerance is 60 seconds by default. Custom claims are not looked
//! at here; see [`SessionData::from_claims`](super::SessionData::from_claims).

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::claims::RawClaimSet;
use super::directory::{jwk_to_decoding_key, KeyResolver, ProviderConfig};
use super::error::AuthError;
use super::session::SubjectId;

/// Clock skew tolerance (60 seconds).
pub const CLOCK_SKEW_LEEWAY: Duration = Duration::from_secs(60);

/// Asymmetric algorithms accepted by default.
pub const DEFAULT_ALGORITHMS: [Algorithm; 9] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

/// Registered claims every accepted token must carry.
const REQUIRED_CLAIMS: [&str; 4] = ["exp", "iss", "aud", "sub"];

/// A token that passed every verification step.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    /// The `sub` claim
    pub subject: SubjectId,
    /// All claims, for mapping
    pub claims: RawClaimSet,
}

/// Verifies bearer tokens issued by one configured provider for one client.
pub struct TokenVerifier {
    resolver: Arc<dyn KeyResolver>,
    issuer: String,
    client_id: String,
    leeway: Duration,
    algorithms: Vec<Algorithm>,
}

impl TokenVerifier {
    pub fn new(
        resolver: Arc<dyn KeyResolver>,
        issuer: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            issuer: issuer.into(),
            client_id: client_id.into(),
            leeway: CLOCK_SKEW_LEEWAY,
            algorithms: DEFAULT_ALGORITHMS.to_vec(),
        }
    }

    /// Set custom clock skew tolerance.
    pub fn with_clock_skew(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Restrict the accepted algorithms. HMAC algorithms are always dropped:
    /// a published key set must never double as a shared secret.
    pub fn with_algorithms(mut self, algorithms: impl IntoIterator<Item = Algorithm>) -> Self {
        self.algorithms = algorithms
            .into_iter()
            .filter(|alg| !matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512))
            .collect();
        self
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Verify `token` and return its subject and claims.
    ///
    /// An unknown `kid` triggers exactly one forced key refresh before the
    /// token is rejected.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MalformedToken`] for unparseable tokens, missing
    ///   registered claims or an empty subject
    /// - [`AuthError::ProviderUnavailable`] if keys cannot be obtained
    /// - [`AuthError::InvalidSignature`], [`AuthError::TokenExpired`],
    ///   [`AuthError::TokenNotYetValid`], [`AuthError::IssuerMismatch`],
    ///   [`AuthError::AudienceMismatch`] for the failing check
    pub async fn verify(
        &self,
        cancel: &CancellationToken,
        token: &str,
    ) -> Result<VerifiedToken, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::MalformedToken)?;

        if !self.algorithms.contains(&header.alg) {
            debug!(alg = ?header.alg, "Token algorithm not allowed");
            return Err(AuthError::InvalidSignature);
        }

        let config = self.resolver.resolve(&self.issuer, cancel).await?;

        let claims = match header.kid.as_deref() {
            Some(kid) => self.verify_with_kid(token, kid, header.alg, config, cancel).await?,
            // No kid in header, try every compatible key
            None => self.verify_with_any_key(token, header.alg, &config)?,
        };

        let subject = claims
            .subject()
            .and_then(SubjectId::new)
            .ok_or(AuthError::MalformedToken)?;

        Ok(VerifiedToken { subject, claims })
    }

    async fn verify_with_kid(
        &self,
        token: &str,
        kid: &str,
        alg: Algorithm,
        config: Arc<ProviderConfig>,
        cancel: &CancellationToken,
    ) -> Result<RawClaimSet, AuthError> {
        let config = if config.find_signing_key(kid).is_some() {
            config
        } else {
            debug!(kid, "Unknown key id, refreshing provider keys");
            self.resolver.refresh(&self.issuer, &config, cancel).await?
        };

        let jwk = config.find_signing_key(kid).ok_or_else(|| {
            warn!(kid, issuer = %self.issuer, "No provider key matches token key id");
            AuthError::InvalidSignature
        })?;

        let key = jwk_to_decoding_key(jwk, alg)?;
        self.decode(token, &key, alg, &config.issuer)
    }

    fn verify_with_any_key(
        &self,
        token: &str,
        alg: Algorithm,
        config: &ProviderConfig,
    ) -> Result<RawClaimSet, AuthError> {
        for jwk in config.signing_keys() {
            let Ok(key) = jwk_to_decoding_key(jwk, alg) else {
                continue;
            };
            match self.decode(token, &key, alg, &config.issuer) {
                Err(AuthError::InvalidSignature) => continue,
                result => return result,
            }
        }
        Err(AuthError::InvalidSignature)
    }

    /// Signature, temporal, issuer and audience checks.
    ///
    /// `issuer` is the provider's advertised spelling of the configured
    /// issuer, which is what its tokens carry in `iss`.
    fn decode(
        &self,
        token: &str,
        key: &DecodingKey,
        alg: Algorithm,
        issuer: &str,
    ) -> Result<RawClaimSet, AuthError> {
        let mut validation = Validation::new(alg);
        validation.leeway = self.leeway.as_secs();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[&self.client_id]);
        validation.set_required_spec_claims(&REQUIRED_CLAIMS);

        decode::<RawClaimSet>(token, key, &validation)
            .map(|data| data.claims)
            .map_err(|e| map_jwt_error(&e))
    }
}

fn map_jwt_error(e: &jsonwebtoken::errors::Error) -> AuthError {
    match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => AuthError::InvalidSignature,
        ErrorKind::InvalidIssuer => AuthError::IssuerMismatch,
        ErrorKind::InvalidAudience => AuthError::AudienceMismatch,
        _ => AuthError::MalformedToken,
    }
}
