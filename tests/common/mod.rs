// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared infrastructure for integration tests: a mock identity provider and
//! RS256 token signing with the fixture keys.

#![allow(dead_code)]

use std::time::Duration;

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const CLIENT_ID: &str = "0oa26dc0cgcjzHwsJ5d6";
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";
pub const JWKS_PATH: &str = "/oauth2/v1/keys";

pub const SIGNING_KID: &str = "conf-key-1";
pub const ROTATED_KID: &str = "conf-key-2";

const SIGNING_KEY_PEM: &[u8] = include_bytes!("../fixtures/signing_key.pem");
const SIGNING_JWK: &str = include_str!("../fixtures/signing_jwk.json");
const ROTATED_KEY_PEM: &[u8] = include_bytes!("../fixtures/rotated_key.pem");
const ROTATED_JWK: &str = include_str!("../fixtures/rotated_jwk.json");

pub fn signing_jwk() -> Value {
    serde_json::from_str(SIGNING_JWK).unwrap()
}

pub fn rotated_jwk() -> Value {
    serde_json::from_str(ROTATED_JWK).unwrap()
}

/// Mock OIDC provider serving discovery and JWKS over loopback HTTP.
pub struct MockProvider {
    pub server: MockServer,
    pub issuer: String,
    pub jwks_uri: String,
}

impl MockProvider {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let issuer = server.uri();
        let jwks_uri = format!("{issuer}{JWKS_PATH}");

        Self {
            server,
            issuer,
            jwks_uri,
        }
    }

    /// Discovery document naming this provider, expected `times` times.
    pub async fn mock_discovery(&self, times: u64) {
        self.mock_discovery_for(&self.issuer.clone(), times).await;
    }

    /// Discovery document advertising `issuer`, which may differ from ours.
    pub async fn mock_discovery_for(&self, issuer: &str, times: u64) {
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": issuer,
                "jwks_uri": self.jwks_uri,
                "authorization_endpoint": format!("{}/oauth2/v1/authorize", self.issuer),
                "id_token_signing_alg_values_supported": ["RS256"]
            })))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// JWKS endpoint publishing `keys`, expected `times` times.
    pub async fn mock_jwks(&self, keys: Vec<Value>, times: u64) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// JWKS endpoint with a `Cache-Control` header.
    pub async fn mock_jwks_with_cache_control(&self, keys: Vec<Value>, cache_control: &str) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "keys": keys }))
                    .insert_header("Cache-Control", cache_control),
            )
            .mount(&self.server)
            .await;
    }

    /// JWKS that serves `before` once, then `after` for every later request.
    pub async fn mock_jwks_rotation(&self, before: Vec<Value>, after: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": before })))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": after })))
            .with_priority(2)
            .mount(&self.server)
            .await;
    }

    /// JWKS endpoint answering with `body` verbatim.
    pub async fn mock_jwks_body(&self, body: Value) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// JWKS endpoint failing with `status`.
    pub async fn mock_jwks_error(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Discovery that answers only after `delay`.
    pub async fn mock_slow_discovery(&self, delay: Duration) {
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "issuer": self.issuer, "jwks_uri": self.jwks_uri }))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Claims of a valid session token from this provider.
    pub fn session_claims(&self, subject: &str) -> Value {
        json!({
            "iss": self.issuer,
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
}

/// RS256 token signed with the key published before rotation.
pub fn sign(claims: &Value) -> String {
    sign_with(claims, SIGNING_KID, SIGNING_KEY_PEM)
}

/// RS256 token signed with the key published after rotation.
pub fn sign_rotated(claims: &Value) -> String {
    sign_with(claims, ROTATED_KID, ROTATED_KEY_PEM)
}

fn sign_with(claims: &Value, kid: &str, pem: &[u8]) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(pem).unwrap();
    encode(&header, claims, &key).unwrap()
}
