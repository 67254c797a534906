// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for authenticated sessions.
//!
//! ```rust,ignore
//! async fn my_handler(Auth(claims): Auth) -> impl IntoResponse {
//!     // claims is SessionClaims
//! }
//! ```

use axum::{extract::FromRequestParts, http::request::Parts};

use super::{middleware::authenticate, AuthError, Role, SessionClaims};
use crate::state::AppState;

/// Extractor for the authenticated session.
///
/// Reuses claims already verified by `require_auth`; otherwise verifies the
/// request's bearer header or session cookie itself.
pub struct Auth(pub SessionClaims);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(claims) = parts.extensions.get::<SessionClaims>().cloned() {
            return Ok(Auth(claims));
        }

        let claims = authenticate(&parts.headers, &state.tokens)?;
        parts.extensions.insert(claims.clone());
        Ok(Auth(claims))
    }
}

/// Extractor that additionally requires the `admin` role.
pub struct AdminOnly(pub SessionClaims);

impl FromRequestParts<AppState> for AdminOnly {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Auth(claims) = Auth::from_request_parts(parts, state).await?;

        if !claims.is_admin() {
            return Err(AuthError::RoleForbidden {
                required: Role::Admin,
            });
        }

        Ok(AdminOnly(claims))
    }
}
