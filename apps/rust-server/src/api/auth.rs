// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session endpoints: CSRF token, register, login, logout.
//!
//! Register and login return the session token in the body and also set it
//! as the `token` cookie. All POSTs here pass through the CSRF guard like
//! any other unsafe request.

use axum::{extract::State, http::StatusCode, Extension, Json};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use tracing::{info, warn};

use crate::{
    auth::{CsrfContext, Role},
    error::ApiError,
    models::{CsrfTokenResponse, LoginRequest, RegisterRequest, SessionResponse, UserResponse},
    state::AppState,
    store::{self, NewUser, User},
};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// Return the CSRF token bound to the caller's nonce cookie.
///
/// The same token is also present in the `X-CSRF-Token` header of every
/// response.
#[utoipa::path(
    get,
    path = "/v1/auth/csrf-token",
    tag = "Auth",
    responses(
        (status = 200, description = "CSRF token for the current nonce", body = CsrfTokenResponse)
    )
)]
pub async fn csrf_token(Extension(context): Extension<CsrfContext>) -> Json<CsrfTokenResponse> {
    Json(CsrfTokenResponse {
        csrf_token: context.token(),
    })
}

/// Create an account and start a session.
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = SessionResponse),
        (status = 403, description = "Missing or invalid CSRF token"),
        (status = 409, description = "Email already registered"),
        (status = 422, description = "Invalid email or password too short")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<SessionResponse>), ApiError> {
    store::validate_password(&req.password)?;
    let email = store::normalize_email(&req.email).ok_or(store::StoreError::InvalidEmail)?;
    let password_hash = store::hash_password(req.password, state.config.bcrypt_cost).await?;

    let user = state.users.write().await.insert(NewUser {
        email,
        password_hash,
        role: Role::User,
    })?;
    info!(user_id = %user.id, "account registered");

    let (jar, session) = start_session(&state, jar, &user)?;
    Ok((StatusCode::CREATED, jar, Json(session)))
}

/// Exchange credentials for a session.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = SessionResponse),
        (status = 401, description = "Invalid email or password"),
        (status = 403, description = "Missing or invalid CSRF token")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), ApiError> {
    let user = state.users.read().await.find_by_email(&req.email).cloned();
    let Some(user) = user else {
        let decoy = state.decoy_password_hash().await?.to_string();
        store::verify_password(req.password, decoy).await?;
        warn!("login for unknown account");
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    };

    if !store::verify_password(req.password, user.password_hash.clone()).await? {
        warn!(user_id = %user.id, "login with wrong password");
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    }

    info!(user_id = %user.id, "login succeeded");
    let (jar, session) = start_session(&state, jar, &user)?;
    Ok((jar, Json(session)))
}

/// Clear the session cookie. Bearer tokens stay valid until they expire.
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    tag = "Auth",
    responses(
        (status = 204, description = "Session cookie cleared"),
        (status = 403, description = "Missing or invalid CSRF token")
    )
)]
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (StatusCode, CookieJar) {
    let jar = jar.remove(state.cookies.session_removal());
    (StatusCode::NO_CONTENT, jar)
}

fn start_session(
    state: &AppState,
    jar: CookieJar,
    user: &User,
) -> Result<(CookieJar, SessionResponse), ApiError> {
    let now = Utc::now().timestamp();
    let token = state
        .tokens
        .issue_at(user.identity(), None, now)
        .map_err(ApiError::internal)?;
    let expires_at = now.saturating_add_unsigned(state.tokens.default_ttl().as_secs());

    let jar = jar.add(state.cookies.session_cookie(token.clone()));
    let session = SessionResponse {
        token,
        expires_at,
        user: UserResponse::from(user),
    };
    Ok((jar, session))
}
