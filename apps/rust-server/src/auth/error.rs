// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! Every token verification failure produces the same 401 body so clients
//! cannot tell a forged token from an expired one. The CSRF rejection body
//! carries a stable `code` (and the word "CSRF" in its message) that the
//! HTTP client keys its refresh-and-retry on.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::roles::Role;
use super::token::TokenError;

/// Stable code for CSRF rejections.
pub const CSRF_INVALID_CODE: &str = "CSRF_INVALID";

/// Authentication error type.
#[derive(Debug)]
pub enum AuthError {
    /// No bearer header and no session cookie
    MissingToken,
    /// Token present but rejected by the codec
    InvalidToken(TokenError),
    /// Authenticated, but with the wrong role
    RoleForbidden { required: Role },
    /// Missing or invalid CSRF token on an unsafe request
    CsrfValidationFailed,
    /// Body too large to inspect for a CSRF token
    BodyTooLarge,
    /// Body stream failed while being inspected
    UnreadableBody,
    /// Internal error
    InternalError(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: &'static str,
    code: &'static str,
}

impl AuthError {
    /// Public error code returned to the client.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingToken | AuthError::InvalidToken(_) => "UNAUTHORIZED",
            AuthError::RoleForbidden { .. } => "FORBIDDEN",
            AuthError::CsrfValidationFailed => CSRF_INVALID_CODE,
            AuthError::BodyTooLarge => "PAYLOAD_TOO_LARGE",
            AuthError::UnreadableBody => "BAD_REQUEST",
            AuthError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingToken | AuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            AuthError::RoleForbidden { .. } | AuthError::CsrfValidationFailed => {
                StatusCode::FORBIDDEN
            }
            AuthError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AuthError::UnreadableBody => StatusCode::BAD_REQUEST,
            AuthError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> &'static str {
        match self {
            AuthError::MissingToken | AuthError::InvalidToken(_) => "Unauthorized",
            AuthError::RoleForbidden { .. } => "Forbidden",
            AuthError::CsrfValidationFailed => "Invalid CSRF token",
            AuthError::BodyTooLarge => "Request body too large",
            AuthError::UnreadableBody => "Request body could not be read",
            AuthError::InternalError(_) => "Internal server error",
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "no session token in request"),
            AuthError::InvalidToken(e) => write!(f, "session token rejected: {e}"),
            AuthError::RoleForbidden { required } => write!(f, "role {required} required"),
            AuthError::CsrfValidationFailed => write!(f, "CSRF token missing or invalid"),
            AuthError::BodyTooLarge => write!(f, "request body exceeds inspection limit"),
            AuthError::UnreadableBody => write!(f, "request body stream failed"),
            AuthError::InternalError(msg) => write!(f, "internal authentication error: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        AuthError::InvalidToken(e)
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(AuthErrorBody {
            error: self.public_message(),
            code: self.error_code(),
        });
        (self.status_code(), body).into_response()
    }
}
