// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! This module authenticates conference service requests with OIDC bearer
//! tokens issued by the configured identity provider.
//!
//! ## Auth Flow
//!
//! 1. Frontend authenticates the user with the identity provider
//! 2. Frontend sends `Authorization: Bearer <id token>`
//! 3. Server:
//!    - Discovers the provider's JWKS via `/.well-known/openid-configuration`
//!    - Verifies JWT signature, expiry, not-before, issuer, audience
//!    - Extracts:
//!      - `sub` → canonical [`SubjectId`]
//!      - `exp`, `iat`, `identityProvider`, `userId`, `userDetails`,
//!        `userRoles` → [`SessionData`]
//!
//! ## Security
//!
//! - A token is only accepted when every check passes; there is no
//!   development bypass
//! - Discovery and JWKS fetching are HTTPS-only
//! - JWKS is cached per issuer with a TTL; an unknown key id causes exactly
//!   one forced refresh
//! - Clock skew tolerance is 60 seconds
//! - Provider outages surface as [`AuthError::ProviderUnavailable`], never as
//!   an invalid token

pub mod authenticator;
pub mod claims;
pub mod directory;
pub mod error;
pub mod extractor;
pub mod session;
pub mod verifier;

#[cfg(test)]
pub(crate) mod testing;

pub use authenticator::Authenticator;
pub use claims::{RawClaimSet, SessionData};
pub use directory::{KeyResolver, ProviderConfig, ProviderDirectory};
pub use error::AuthError;
pub use extractor::{Auth, OptionalAuth};
pub use session::{AuthenticatedSession, SubjectId};
pub use verifier::{TokenVerifier, VerifiedToken};
