// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies for the REST API. All types derive
//! `ToSchema` for the OpenAPI document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Role;
use crate::store::User;

// =============================================================================
// Auth Models
// =============================================================================

/// Request body for registration.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    /// At least 8 characters.
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Returned by register and login. The same token is also set as the
/// `token` cookie.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub token: String,
    /// Token expiry as a UNIX timestamp (seconds).
    pub expires_at: i64,
    pub user: UserResponse,
}

/// Response for `GET /v1/auth/csrf-token`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
}

// =============================================================================
// User Models
// =============================================================================

/// Public view of an account. Never includes the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
            created_at: user.created_at,
        }
    }
}

/// Response for `GET /v1/users/me`, built from the verified session.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub user_id: String,
    pub email: String,
    pub role: Role,
    /// Session expiry as a UNIX timestamp (seconds).
    pub expires_at: i64,
}

// =============================================================================
// Admin Models
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserListResponse {
    pub users: Vec<UserResponse>,
    pub total: usize,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateRoleRequest {
    pub role: Role,
}
