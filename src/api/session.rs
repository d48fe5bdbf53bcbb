// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::Json;

use crate::auth::{Auth, AuthenticatedSession};

/// Return the session resolved from the caller's bearer token.
pub async fn current_session(Auth(session): Auth) -> Json<AuthenticatedSession> {
    tracing::debug!(subject = %session.subject, "Session lookup");
    Json(session)
}
