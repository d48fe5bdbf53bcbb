// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Conference Auth - OIDC bearer authentication for the conference service
//!
//! This crate verifies identity-provider tokens against keys discovered from
//! the provider and maps their claims into the session data the conference
//! service works with.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Provider discovery, token verification, claim mapping
//! - `config` - Environment configuration
//! - `state` - Shared application state

pub mod api;
pub mod auth;
pub mod config;
pub mod state;
