// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The authenticated identity handed to the rest of the service.

use std::fmt;

use serde::Serialize;

use super::claims::SessionData;

/// Stable, issuer-scoped identifier of the authenticated principal (`sub`).
///
/// Never empty: an empty subject means "unauthenticated" and cannot be
/// represented by this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    /// Wrap a subject claim, rejecting the empty string.
    pub fn new(subject: impl Into<String>) -> Option<Self> {
        let subject = subject.into();
        if subject.is_empty() {
            None
        } else {
            Some(Self(subject))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SubjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Subject plus canonical session data for one verified token.
///
/// Both halves are produced together by
/// [`Authenticator::authenticate`](super::Authenticator::authenticate) or not
/// at all.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthenticatedSession {
    /// Canonical principal identifier (`sub` claim)
    pub subject: SubjectId,
    /// Claims mapped into the session shape
    pub data: SessionData,
}

impl AuthenticatedSession {
    pub fn new(subject: SubjectId, data: SessionData) -> Self {
        Self { subject, data }
    }
}
