// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for auth unit tests: RS256 signing keys, token builders and
//! an in-memory [`KeyResolver`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::directory::{KeyResolver, ProviderConfig};
use super::error::AuthError;

pub const ISSUER: &str = "https://dev-7217861.okta.com";
pub const CLIENT_ID: &str = "0oa26dc0cgcjzHwsJ5d6";
pub const JWKS_URI: &str = "https://dev-7217861.okta.com/oauth2/v1/keys";

pub const SIGNING_KID: &str = "conf-key-1";
pub const ROTATED_KID: &str = "conf-key-2";

const SIGNING_KEY_PEM: &[u8] = include_bytes!("../../tests/fixtures/signing_key.pem");
const SIGNING_JWK: &str = include_str!("../../tests/fixtures/signing_jwk.json");
const ROTATED_KEY_PEM: &[u8] = include_bytes!("../../tests/fixtures/rotated_key.pem");
const ROTATED_JWK: &str = include_str!("../../tests/fixtures/rotated_jwk.json");

pub fn signing_jwk() -> Jwk {
    serde_json::from_str(SIGNING_JWK).unwrap()
}

pub fn rotated_jwk() -> Jwk {
    serde_json::from_str(ROTATED_JWK).unwrap()
}

pub fn jwk_set(keys: Vec<Jwk>) -> JwkSet {
    JwkSet { keys }
}

pub fn now() -> i64 {
    Utc::now().timestamp()
}

/// Claims of a valid conference session token.
pub fn session_claims(subject: &str) -> Value {
    json!({
        "iss": ISSUER,
        "aud": CLIENT_ID,
        "sub": subject,
        "exp": 9999999999i64,
        "iat": 1000000000,
        "identityProvider": "okta",
        "userId": subject,
        "userDetails": "Jane",
        "userRoles": ["admin", "speaker"]
    })
}

/// RS256 token signed with the current provider key.
pub fn sign(claims: &Value) -> String {
    sign_with(claims, Some(SIGNING_KID), SIGNING_KEY_PEM)
}

/// RS256 token signed with the key the provider only publishes after rotation.
pub fn sign_rotated(claims: &Value) -> String {
    sign_with(claims, Some(ROTATED_KID), ROTATED_KEY_PEM)
}

/// RS256 token signed with the current key but carrying no `kid`.
pub fn sign_without_kid(claims: &Value) -> String {
    sign_with(claims, None, SIGNING_KEY_PEM)
}

fn sign_with(claims: &Value, kid: Option<&str>, pem: &[u8]) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_owned);
    encode(&header, claims, &EncodingKey::from_rsa_pem(pem).unwrap()).unwrap()
}

/// In-memory key resolver counting lookups and forced refreshes.
pub struct StaticResolver {
    current: Mutex<Arc<ProviderConfig>>,
    after_refresh: Option<JwkSet>,
    failure: Option<AuthError>,
    resolves: AtomicUsize,
    refreshes: AtomicUsize,
}

impl StaticResolver {
    pub fn new(keys: JwkSet) -> Self {
        Self {
            current: Mutex::new(Arc::new(ProviderConfig::new(
                ISSUER,
                JWKS_URI,
                keys,
                Duration::from_secs(300),
            ))),
            after_refresh: None,
            failure: None,
            resolves: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
        }
    }

    /// Publishes only the current signing key.
    pub fn current_key() -> Self {
        Self::new(jwk_set(vec![signing_jwk()]))
    }

    /// Every lookup fails as if the provider were unreachable.
    pub fn unavailable() -> Self {
        let mut resolver = Self::new(jwk_set(vec![]));
        resolver.failure = Some(AuthError::ProviderUnavailable(
            "connection refused".to_string(),
        ));
        resolver
    }

    /// A forced refresh installs `keys`.
    pub fn rotating_to(mut self, keys: JwkSet) -> Self {
        self.after_refresh = Some(keys);
        self
    }

    pub fn resolves(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyResolver for StaticResolver {
    async fn resolve(
        &self,
        _issuer: &str,
        _cancel: &CancellationToken,
    ) -> Result<Arc<ProviderConfig>, AuthError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        Ok(Arc::clone(&self.current.lock().unwrap()))
    }

    async fn refresh(
        &self,
        _issuer: &str,
        seen: &ProviderConfig,
        _cancel: &CancellationToken,
    ) -> Result<Arc<ProviderConfig>, AuthError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        let mut current = self.current.lock().unwrap();
        if let Some(keys) = &self.after_refresh {
            let mut next = ProviderConfig::new(ISSUER, JWKS_URI, keys.clone(), seen.ttl);
            next.generation = seen.generation + 1;
            *current = Arc::new(next);
        }
        Ok(Arc::clone(&current))
    }
}
