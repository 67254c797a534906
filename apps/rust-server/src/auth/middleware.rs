// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication middleware for Axum.
//!
//! ```text
//! Unauthenticated -> TokenPresent -> Authenticated -> Authorized
//!        |                |               |
//!       401              401             403
//! ```
//!
//! `require_auth` handles the first two steps and stores the verified
//! [`SessionClaims`] in request extensions; `require_role` layers on top.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let admin = Router::new()
//!     .route("/admin/users", get(list_users))
//!     .route_layer(from_fn_with_state(Role::Admin, require_role))
//!     .route_layer(from_fn_with_state(tokens.clone(), require_auth));
//! ```

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use tracing::{debug, warn};

use super::claims::SessionClaims;
use super::cookies::SESSION_COOKIE;
use super::error::AuthError;
use super::roles::Role;
use super::token::TokenCodec;

/// Pull the raw token from `Authorization: Bearer`, falling back to the
/// `token` cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

/// Extract and verify the session token in `headers`.
///
/// The codec's specific failure is logged at debug level and kept inside
/// the error; the response for every variant is the same.
pub fn authenticate(headers: &HeaderMap, codec: &TokenCodec) -> Result<SessionClaims, AuthError> {
    let token = extract_token(headers).ok_or(AuthError::MissingToken)?;

    codec.verify(&token).map_err(|e| {
        debug!(reason = %e, "session token rejected");
        AuthError::InvalidToken(e)
    })
}

/// Authentication middleware function.
pub async fn require_auth(
    State(codec): State<Arc<TokenCodec>>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(request.headers(), &codec) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Role gate. Must run after [`require_auth`].
pub async fn require_role(State(required): State<Role>, request: Request, next: Next) -> Response {
    let Some(claims) = request.extensions().get::<SessionClaims>() else {
        return AuthError::MissingToken.into_response();
    };

    if !claims.role.satisfies(required) {
        warn!(
            user_id = %claims.sub,
            role = %claims.role,
            required = %required,
            path = %request.uri().path(),
            "role check failed"
        );
        return AuthError::RoleForbidden { required }.into_response();
    }

    next.run(request).await
}
