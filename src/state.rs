// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::auth::{Authenticator, KeyResolver};

#[derive(Clone)]
pub struct AppState {
    /// Verifies bearer tokens and maps them to sessions
    pub authenticator: Arc<Authenticator>,
    /// Key source shared with the authenticator, used for readiness checks
    pub resolver: Arc<dyn KeyResolver>,
    /// Cancelled on shutdown; per-request tokens are children of it
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(resolver: Arc<dyn KeyResolver>, authenticator: Authenticator) -> Self {
        Self {
            authenticator: Arc::new(authenticator),
            resolver,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Cancellation scope for one request's provider calls.
    pub fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    pub fn issuer(&self) -> &str {
        self.authenticator.verifier().issuer()
    }
}
