// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session claims carried by a signed token.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::roles::Role;

/// Identity facts to embed in a new token.
///
/// Timestamps are added by the codec at issue time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Opaque user identifier
    pub sub: String,
    pub role: Role,
    /// Display/lookup only, never an authorization key
    pub email: String,
}

impl Identity {
    pub fn new(sub: impl Into<String>, role: Role, email: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            role,
            email: email.into(),
        }
    }
}

/// Verified session claims.
///
/// This is the type attached to request extensions once a token has been
/// verified. Claims are never mutated; a changed role or email requires a
/// freshly issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SessionClaims {
    /// Subject (user ID)
    pub sub: String,
    /// User's role
    pub role: Role,
    /// User's email
    pub email: String,
    /// Issued at (seconds since epoch)
    pub iat: i64,
    /// Expiration (seconds since epoch)
    pub exp: i64,
}

impl SessionClaims {
    pub(crate) fn from_identity(identity: Identity, iat: i64, exp: i64) -> Self {
        Self {
            sub: identity.sub,
            role: identity.role,
            email: identity.email,
            iat,
            exp,
        }
    }

    /// Strip the timestamps back off.
    pub fn identity(&self) -> Identity {
        Identity::new(self.sub.clone(), self.role, self.email.clone())
    }

    /// Expired when `now >= exp`; the boundary second counts as expired.
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.exp
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
