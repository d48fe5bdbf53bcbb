// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `OIDC_ISSUER_URL` | Identity provider issuer URL | Required |
//! | `OIDC_CLIENT_ID` | Expected JWT audience (this service's client id) | Required |
//! | `OIDC_JWKS_CACHE_TTL_SECS` | Key cache TTL when the provider sends no `max-age` | `300` |
//! | `OIDC_HTTP_TIMEOUT_SECS` | Timeout for discovery and key requests | `10` |
//! | `OIDC_CLOCK_SKEW_SECS` | Tolerance for `exp` / `nbf` checks | `60` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::auth::directory::{
    is_secure_endpoint, DEFAULT_CACHE_TTL, DEFAULT_HTTP_TIMEOUT,
};
use crate::auth::verifier::CLOCK_SKEW_LEEWAY;
use crate::auth::{AuthError, Authenticator, KeyResolver, ProviderDirectory, TokenVerifier};

/// Issuer URL of the identity provider, e.g. `https://dev-7217861.okta.com`.
pub const OIDC_ISSUER_URL_ENV: &str = "OIDC_ISSUER_URL";

/// Client identifier tokens must be issued for (`aud`).
pub const OIDC_CLIENT_ID_ENV: &str = "OIDC_CLIENT_ID";

/// Default key cache TTL in seconds.
pub const OIDC_JWKS_CACHE_TTL_ENV: &str = "OIDC_JWKS_CACHE_TTL_SECS";

/// Provider request timeout in seconds.
pub const OIDC_HTTP_TIMEOUT_ENV: &str = "OIDC_HTTP_TIMEOUT_SECS";

/// Clock skew leeway in seconds.
pub const OIDC_CLOCK_SKEW_ENV: &str = "OIDC_CLOCK_SKEW_SECS";

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {0} is required")]
    Missing(&'static str),

    #[error("environment variable {var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Identity provider settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSettings {
    pub issuer_url: String,
    pub client_id: String,
    pub jwks_cache_ttl: Duration,
    pub http_timeout: Duration,
    pub clock_skew: Duration,
}

impl AuthSettings {
    /// Load from the process environment.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] if a required variable is unset or a value is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` to read variables.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] if a required variable is unset or a value is invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // Discovery and `iss` matching ignore a trailing slash
        let issuer_url = required(&lookup, OIDC_ISSUER_URL_ENV)?
            .trim_end_matches('/')
            .to_string();
        let parsed = Url::parse(&issuer_url).map_err(|e| ConfigError::Invalid {
            var: OIDC_ISSUER_URL_ENV,
            reason: e.to_string(),
        })?;
        if !is_secure_endpoint(&parsed) {
            return Err(ConfigError::Invalid {
                var: OIDC_ISSUER_URL_ENV,
                reason: "issuer must use https".to_string(),
            });
        }

        Ok(Self {
            issuer_url,
            client_id: required(&lookup, OIDC_CLIENT_ID_ENV)?,
            jwks_cache_ttl: seconds(&lookup, OIDC_JWKS_CACHE_TTL_ENV, DEFAULT_CACHE_TTL)?,
            http_timeout: seconds(&lookup, OIDC_HTTP_TIMEOUT_ENV, DEFAULT_HTTP_TIMEOUT)?,
            clock_skew: seconds(&lookup, OIDC_CLOCK_SKEW_ENV, CLOCK_SKEW_LEEWAY)?,
        })
    }

    /// Build the network-backed provider directory.
    ///
    /// # Errors
    ///
    /// [`AuthError::Internal`] if the HTTP client cannot be built.
    pub fn provider_directory(&self) -> Result<ProviderDirectory, AuthError> {
        Ok(ProviderDirectory::with_http_timeout(self.http_timeout)?
            .with_cache_ttl(self.jwks_cache_ttl))
    }

    /// Build the authenticator on top of `resolver`.
    pub fn authenticator(&self, resolver: Arc<dyn KeyResolver>) -> Authenticator {
        Authenticator::new(
            TokenVerifier::new(resolver, &self.issuer_url, &self.client_id)
                .with_clock_skew(self.clock_skew),
        )
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub log_format: LogFormat,
}

impl ServerSettings {
    /// Load from the process environment.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] for an unparseable port or log format.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` to read variables.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] for an unparseable port or log format.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = match lookup(PORT_ENV) {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                var: PORT_ENV,
                reason: format!("'{raw}' is not a port number"),
            })?,
            None => DEFAULT_PORT,
        };

        let log_format = match lookup(LOG_FORMAT_ENV).as_deref().map(str::trim) {
            None | Some("") => LogFormat::default(),
            Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
            Some(f) if f.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: LOG_FORMAT_ENV,
                    reason: format!("'{other}' is not one of json, pretty"),
                })
            }
        };

        Ok(Self {
            host: lookup(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            log_format,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<String, ConfigError> {
    lookup(var)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::Missing(var))
}

fn seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match lookup(var) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::Invalid {
                var,
                reason: format!("'{raw}' is not a whole number of seconds"),
            }),
        None => Ok(default),
    }
}
