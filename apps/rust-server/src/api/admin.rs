// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Admin-only account management.
//!
//! Mounted behind `require_auth` and `require_role(Admin)`.

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AdminOnly,
    error::ApiError,
    models::{UpdateRoleRequest, UserListResponse, UserResponse},
    state::AppState,
};

/// List all accounts.
#[utoipa::path(
    get,
    path = "/v1/admin/users",
    tag = "Admin",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "All accounts", body = UserListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role required")
    )
)]
pub async fn list_users(State(state): State<AppState>) -> Json<UserListResponse> {
    let users: Vec<UserResponse> = state
        .users
        .read()
        .await
        .list()
        .iter()
        .map(UserResponse::from)
        .collect();

    Json(UserListResponse {
        total: users.len(),
        users,
    })
}

/// Change an account's role. Takes effect at the user's next login.
#[utoipa::path(
    patch,
    path = "/v1/admin/users/{user_id}/role",
    tag = "Admin",
    security(("bearer" = [])),
    params(("user_id" = Uuid, Path, description = "Account ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = UserResponse),
        (status = 400, description = "Admins cannot change their own role"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role required or invalid CSRF token"),
        (status = 404, description = "User not found")
    )
)]
pub async fn update_user_role(
    State(state): State<AppState>,
    AdminOnly(admin): AdminOnly,
    Path(user_id): Path<Uuid>,
    Json(req): Json<UpdateRoleRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    if admin.sub == user_id.to_string() {
        return Err(ApiError::bad_request("Admins cannot change their own role"));
    }

    let user = state.users.write().await.set_role(&user_id, req.role)?;
    info!(
        admin_id = %admin.sub,
        user_id = %user.id,
        role = %user.role,
        "role updated"
    );
    Ok(Json(UserResponse::from(&user)))
}
