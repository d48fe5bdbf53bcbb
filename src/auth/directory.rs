// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity provider directory: OIDC discovery plus JWKS fetching and caching.
//!
//! ## Security
//!
//! - Discovery documents and JWKS are fetched via HTTPS only (plain HTTP is
//!   accepted for loopback hosts, which only exist in local setups and tests)
//! - The discovery document must name exactly the configured issuer
//! - Redirects are not followed
//!
//! ## Caching
//!
//! - One cache slot per issuer, holding an immutable [`ProviderConfig`]
//!   swapped in as a whole, so readers never see a half-updated key set
//! - TTL comes from the JWKS response `Cache-Control: max-age`, falling back
//!   to the configured default
//! - Concurrent misses for the same issuer wait on the slot's refresh lock and
//!   reuse the result of the single fetch that ran
//! - A failed fetch never falls back to stale keys; it surfaces as
//!   [`AuthError::ProviderUnavailable`]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use reqwest::header::{HeaderMap, CACHE_CONTROL};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::{Host, Url};

use super::error::AuthError;

/// Default JWKS cache TTL (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default timeout for a single request to the provider.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Bounds applied to a provider-supplied `max-age`.
const MIN_CACHE_TTL: Duration = Duration::from_secs(30);
const MAX_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// Largest discovery document or key set body read from a provider.
const MAX_RESPONSE_BYTES: usize = 256 * 1024;

/// Signing configuration of one identity provider.
///
/// Immutable once built; a refresh replaces the whole value.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Issuer URL as advertised by the provider's discovery document
    pub issuer: String,
    /// Key-fetch endpoint advertised by the discovery document
    pub jwks_uri: String,
    /// Published keys
    pub keys: JwkSet,
    /// When the keys were fetched
    pub fetched_at: Instant,
    /// How long the keys may be served from cache
    pub ttl: Duration,
    /// Increases with every fetch installed by a directory
    pub generation: u64,
}

impl ProviderConfig {
    pub fn new(
        issuer: impl Into<String>,
        jwks_uri: impl Into<String>,
        keys: JwkSet,
        ttl: Duration,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            jwks_uri: jwks_uri.into(),
            keys,
            fetched_at: Instant::now(),
            ttl,
            generation: 0,
        }
    }

    /// Whether the cached keys are still within their TTL.
    pub fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < self.ttl
    }

    /// Keys usable for signature verification (`use` absent or `sig`).
    pub fn signing_keys(&self) -> impl Iterator<Item = &Jwk> {
        self.keys.keys.iter().filter(|jwk| {
            !matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption))
        })
    }

    /// Signing key with the given key id.
    pub fn find_signing_key(&self, kid: &str) -> Option<&Jwk> {
        self.signing_keys()
            .find(|jwk| jwk.common.key_id.as_deref() == Some(kid))
    }
}

/// Source of provider signing configuration.
///
/// [`ProviderDirectory`] is the network-backed implementation; tests inject
/// fixed key sets or simulated outages.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    /// Current configuration for `issuer`, fetched when absent or stale.
    ///
    /// The returned `issuer` field is the provider's own spelling, which may
    /// differ from the argument by a trailing `/`.
    ///
    /// # Errors
    ///
    /// [`AuthError::ProviderUnavailable`] when discovery or key fetching fails
    /// or `cancel` fires first.
    async fn resolve(
        &self,
        issuer: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<ProviderConfig>, AuthError>;

    /// Replace `seen` with freshly fetched keys.
    ///
    /// If the cache already holds something newer than `seen`, that is
    /// returned without another fetch.
    ///
    /// # Errors
    ///
    /// Same as [`KeyResolver::resolve`].
    async fn refresh(
        &self,
        issuer: &str,
        seen: &ProviderConfig,
        cancel: &CancellationToken,
    ) -> Result<Arc<ProviderConfig>, AuthError>;
}

/// The parts of an OpenID Provider Metadata document the directory relies on.
#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    issuer: String,
    jwks_uri: String,
}

/// Cache slot for one issuer.
#[derive(Default)]
struct IssuerSlot {
    current: RwLock<Option<Arc<ProviderConfig>>>,
    refresh_lock: Mutex<()>,
}

impl IssuerSlot {
    async fn current(&self) -> Option<Arc<ProviderConfig>> {
        self.current.read().await.clone()
    }

    async fn fresh(&self) -> Option<Arc<ProviderConfig>> {
        self.current().await.filter(|config| config.is_fresh())
    }
}

/// Provider directory with per-issuer caching.
///
/// Construct once at startup and share it; clones share the same cache.
#[derive(Clone)]
pub struct ProviderDirectory {
    /// HTTP client
    client: reqwest::Client,
    /// TTL used when the provider sends no `max-age`
    cache_ttl: Duration,
    /// Issuer -> cache slot
    slots: Arc<RwLock<HashMap<String, Arc<IssuerSlot>>>>,
    generation: Arc<AtomicU64>,
}

impl ProviderDirectory {
    /// Create a directory with the default request timeout.
    ///
    /// # Errors
    ///
    /// [`AuthError::Internal`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, AuthError> {
        Self::with_http_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    /// Create a directory whose provider requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// [`AuthError::Internal`] if the HTTP client cannot be built.
    pub fn with_http_timeout(timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("conference-auth/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuthError::Internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            cache_ttl: DEFAULT_CACHE_TTL,
            slots: Arc::new(RwLock::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Create with custom default cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Check if keys for `issuer` are currently cached and valid.
    pub async fn is_cached(&self, issuer: &str) -> bool {
        match self.existing_slot(issuer).await {
            Some(slot) => slot.fresh().await.is_some(),
            None => false,
        }
    }

    /// Cached configuration for `issuer`, fresh or not.
    pub async fn cached(&self, issuer: &str) -> Option<Arc<ProviderConfig>> {
        self.existing_slot(issuer).await?.current().await
    }

    /// Drop the cached configuration for `issuer`.
    pub async fn clear(&self, issuer: &str) {
        if let Some(slot) = self.existing_slot(issuer).await {
            *slot.current.write().await = None;
            debug!(issuer, "Provider cache cleared");
        }
    }

    async fn existing_slot(&self, issuer: &str) -> Option<Arc<IssuerSlot>> {
        self.slots.read().await.get(issuer).cloned()
    }

    async fn slot(&self, issuer: &str) -> Arc<IssuerSlot> {
        if let Some(slot) = self.existing_slot(issuer).await {
            return slot;
        }
        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(issuer.to_string()).or_default())
    }

    /// Fetch configuration and install it in `slot`. Caller holds the refresh lock.
    async fn fetch_and_install(
        &self,
        slot: &IssuerSlot,
        issuer: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<ProviderConfig>, AuthError> {
        let config = match self.fetch_config(issuer, cancel).await {
            Ok(config) => Arc::new(config),
            Err(e) => {
                warn!(issuer, error = %e, "Provider configuration fetch failed");
                return Err(e);
            }
        };
        *slot.current.write().await = Some(Arc::clone(&config));
        Ok(config)
    }

    /// Run discovery, then fetch the advertised JWKS.
    async fn fetch_config(
        &self,
        issuer: &str,
        cancel: &CancellationToken,
    ) -> Result<ProviderConfig, AuthError> {
        let issuer_url = Url::parse(issuer)
            .map_err(|e| AuthError::Internal(format!("Invalid issuer URL '{issuer}': {e}")))?;
        if !is_secure_endpoint(&issuer_url) {
            return Err(AuthError::Internal(format!(
                "Issuer '{issuer}' must use HTTPS"
            )));
        }

        let discovery_url = format!("{}{DISCOVERY_PATH}", issuer.trim_end_matches('/'));
        info!(issuer, discovery_url = %discovery_url, "Fetching provider discovery document");
        let (document, _) = self
            .get_json::<DiscoveryDocument>(&discovery_url, cancel)
            .await?;

        if !same_issuer(&document.issuer, issuer) {
            error!(
                issuer,
                advertised = %document.issuer,
                "Discovery document names a different issuer"
            );
            return Err(AuthError::ProviderUnavailable(format!(
                "discovery document issuer '{}' does not match '{issuer}'",
                document.issuer
            )));
        }

        let jwks_url = Url::parse(&document.jwks_uri).map_err(|e| {
            AuthError::ProviderUnavailable(format!("invalid jwks_uri '{}': {e}", document.jwks_uri))
        })?;
        if !is_secure_endpoint(&jwks_url) {
            return Err(AuthError::ProviderUnavailable(format!(
                "jwks_uri '{}' must use HTTPS",
                document.jwks_uri
            )));
        }

        let (keys, max_age) = self.get_json::<JwkSet>(&document.jwks_uri, cancel).await?;
        let ttl = max_age
            .map(|age| age.clamp(MIN_CACHE_TTL, MAX_CACHE_TTL))
            .unwrap_or(self.cache_ttl);

        info!(
            issuer,
            jwks_uri = %document.jwks_uri,
            key_count = keys.keys.len(),
            ttl_secs = ttl.as_secs(),
            "Fetched provider signing keys"
        );

        Ok(ProviderConfig {
            issuer: document.issuer,
            jwks_uri: document.jwks_uri,
            keys,
            fetched_at: Instant::now(),
            ttl,
            generation: self.generation.fetch_add(1, Ordering::Relaxed) + 1,
        })
    }

    /// GET `url` and decode a JSON body, racing the caller's cancellation.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<(T, Option<Duration>), AuthError> {
        let request = async {
            let mut response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| AuthError::ProviderUnavailable(format!("GET {url}: {e}")))?;

            if !response.status().is_success() {
                return Err(AuthError::ProviderUnavailable(format!(
                    "HTTP {} from {url}",
                    response.status()
                )));
            }

            let too_large = || {
                AuthError::ProviderUnavailable(format!(
                    "response from {url} exceeds {MAX_RESPONSE_BYTES} bytes"
                ))
            };
            if response
                .content_length()
                .is_some_and(|len| len > MAX_RESPONSE_BYTES as u64)
            {
                return Err(too_large());
            }

            let max_age = cache_max_age(response.headers());
            let mut bytes = Vec::new();
            while let Some(chunk) = response
                .chunk()
                .await
                .map_err(|e| AuthError::ProviderUnavailable(format!("GET {url}: {e}")))?
            {
                if bytes.len() + chunk.len() > MAX_RESPONSE_BYTES {
                    return Err(too_large());
                }
                bytes.extend_from_slice(&chunk);
            }

            let body = serde_json::from_slice::<T>(&bytes).map_err(|e| {
                AuthError::ProviderUnavailable(format!("invalid response from {url}: {e}"))
            })?;
            Ok((body, max_age))
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(cancelled()),
            result = request => result,
        }
    }
}

#[async_trait]
impl KeyResolver for ProviderDirectory {
    async fn resolve(
        &self,
        issuer: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<ProviderConfig>, AuthError> {
        let slot = self.slot(issuer).await;
        if let Some(config) = slot.fresh().await {
            debug!(issuer, "Using cached provider keys");
            return Ok(config);
        }

        let _guard = tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled()),
            guard = slot.refresh_lock.lock() => guard,
        };

        // Another task may have fetched while we waited for the lock.
        if let Some(config) = slot.fresh().await {
            debug!(issuer, "Provider keys fetched by a concurrent request");
            return Ok(config);
        }

        self.fetch_and_install(&slot, issuer, cancel).await
    }

    async fn refresh(
        &self,
        issuer: &str,
        seen: &ProviderConfig,
        cancel: &CancellationToken,
    ) -> Result<Arc<ProviderConfig>, AuthError> {
        let slot = self.slot(issuer).await;
        let _guard = tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled()),
            guard = slot.refresh_lock.lock() => guard,
        };

        if let Some(current) = slot.current().await {
            if current.generation != seen.generation {
                debug!(issuer, "Provider keys already refreshed by a concurrent request");
                return Ok(current);
            }
        }

        info!(issuer, "Forcing provider key refresh");
        self.fetch_and_install(&slot, issuer, cancel).await
    }
}

/// Issuer identifiers compared the way discovery URLs are built from them,
/// ignoring a trailing `/`.
fn same_issuer(advertised: &str, configured: &str) -> bool {
    advertised.trim_end_matches('/') == configured.trim_end_matches('/')
}

fn cancelled() -> AuthError {
    AuthError::ProviderUnavailable("request cancelled".to_string())
}

/// HTTPS, or plain HTTP to a loopback host.
pub(crate) fn is_secure_endpoint(url: &Url) -> bool {
    match url.scheme() {
        "https" => true,
        "http" => match url.host() {
            Some(Host::Domain(domain)) => domain == "localhost",
            Some(Host::Ipv4(ip)) => ip.is_loopback(),
            Some(Host::Ipv6(ip)) => ip.is_loopback(),
            None => false,
        },
        _ => false,
    }
}

/// `max-age` directive of a `Cache-Control` header.
fn cache_max_age(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(CACHE_CONTROL)?
        .to_str()
        .ok()?
        .split(',')
        .filter_map(|directive| directive.trim().strip_prefix("max-age="))
        .find_map(|seconds| seconds.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Build a decoding key for `alg` from a published JWK.
///
/// A key whose declared `alg` differs from the token's, or whose type cannot
/// produce `alg` signatures, does not verify the token.
pub(crate) fn jwk_to_decoding_key(jwk: &Jwk, alg: Algorithm) -> Result<DecodingKey, AuthError> {
    if let Some(declared) = jwk.common.key_algorithm {
        if key_algorithm(declared) != Some(alg) {
            return Err(AuthError::InvalidSignature);
        }
    }

    match (&jwk.algorithm, alg) {
        (
            AlgorithmParameters::RSA(rsa),
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512,
        ) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
            .map_err(|e| AuthError::Internal(format!("Failed to create RSA key: {e}"))),
        (AlgorithmParameters::EllipticCurve(ec), Algorithm::ES256 | Algorithm::ES384) => {
            DecodingKey::from_ec_components(&ec.x, &ec.y)
                .map_err(|e| AuthError::Internal(format!("Failed to create EC key: {e}")))
        }
        (AlgorithmParameters::OctetKeyPair(okp), Algorithm::EdDSA) => {
            DecodingKey::from_ed_components(&okp.x)
                .map_err(|e| AuthError::Internal(format!("Failed to create EdDSA key: {e}")))
        }
        _ => Err(AuthError::InvalidSignature),
    }
}

fn key_algorithm(alg: KeyAlgorithm) -> Option<Algorithm> {
    match alg {
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    }
}
