// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{
        csrf::{csrf_guard, expose_csrf_token, CSRF_HEADER, XSRF_HEADER},
        middleware::{require_auth, require_role},
        Role, SessionClaims,
    },
    models::{
        CsrfTokenResponse, LoginRequest, MeResponse, RegisterRequest, SessionResponse,
        UpdateRoleRequest, UserListResponse, UserResponse,
    },
    state::AppState,
};

pub mod admin;
pub mod auth;
pub mod health;
pub mod users;

/// Build the application router.
///
/// Request path through the layers, outermost first: request id, trace,
/// CORS, CSRF guard, CSRF token header, then per-route auth and role gates.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/auth/csrf-token", get(auth::csrf_token))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout));

    let authenticated = Router::new()
        .route("/users/me", get(users::get_current_user))
        .route_layer(from_fn_with_state(state.tokens.clone(), require_auth));

    let admin = Router::new()
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/{user_id}/role", patch(admin::update_user_role))
        .route_layer(from_fn_with_state(Role::Admin, require_role))
        .route_layer(from_fn_with_state(state.tokens.clone(), require_auth));

    let v1_routes = public.merge(authenticated).merge(admin);

    Router::new()
        .route("/health", get(health::health))
        .nest("/v1", v1_routes)
        .with_state(state.clone())
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(from_fn(expose_csrf_token))
        .layer(from_fn_with_state(state.csrf.clone(), csrf_guard))
        .layer(cors_layer(state.config.cors_origin.as_ref()))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// With a configured origin, credentials are allowed and the CSRF header is
/// readable by browser scripts. Without one, anything goes.
fn cors_layer(origin: Option<&HeaderValue>) -> CorsLayer {
    match origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.clone())
            .allow_credentials(true)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([CONTENT_TYPE, AUTHORIZATION, CSRF_HEADER, XSRF_HEADER])
            .expose_headers([CSRF_HEADER]),
        None => CorsLayer::permissive(),
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::csrf_token,
        auth::register,
        auth::login,
        auth::logout,
        users::get_current_user,
        admin::list_users,
        admin::update_user_role
    ),
    components(
        schemas(
            Role,
            SessionClaims,
            CsrfTokenResponse,
            RegisterRequest,
            LoginRequest,
            SessionResponse,
            UserResponse,
            MeResponse,
            UserListResponse,
            UpdateRoleRequest,
            health::HealthResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness"),
        (name = "Auth", description = "Sessions and CSRF tokens"),
        (name = "Users", description = "Current user"),
        (name = "Admin", description = "Account administration")
    )
)]
struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::auth::{cookies::CSRF_NONCE_COOKIE, error::CSRF_INVALID_CODE};
    use crate::store::{self, NewUser};
    use axum::{
        body::{to_bytes, Body},
        http::{header, HeaderMap, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const PASSWORD: &str = "correct horse battery";

    /// Minimal cookie-keeping client over `oneshot`.
    struct TestClient {
        app: Router,
        cookies: HashMap<String, String>,
        csrf: Option<String>,
    }

    struct TestResponse {
        status: StatusCode,
        headers: HeaderMap,
        body: Value,
    }

    impl TestClient {
        fn new(state: &AppState) -> Self {
            Self {
                app: router(state.clone()),
                cookies: HashMap::new(),
                csrf: None,
            }
        }

        async fn send(
            &mut self,
            method: Method,
            uri: &str,
            body: Option<Value>,
            bearer: Option<&str>,
        ) -> TestResponse {
            let mut request = Request::builder().method(method).uri(uri);
            if !self.cookies.is_empty() {
                let cookie = self
                    .cookies
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join("; ");
                request = request.header(header::COOKIE, cookie);
            }
            if let Some(token) = &self.csrf {
                request = request.header(CSRF_HEADER, token);
            }
            if let Some(token) = bearer {
                request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
            }
            let body = match body {
                Some(value) => {
                    request = request.header(header::CONTENT_TYPE, "application/json");
                    Body::from(value.to_string())
                }
                None => Body::empty(),
            };

            let response = self
                .app
                .clone()
                .oneshot(request.body(body).unwrap())
                .await
                .unwrap();

            for value in response.headers().get_all(header::SET_COOKIE) {
                let pair = value.to_str().unwrap().split(';').next().unwrap();
                let (name, value) = pair.split_once('=').unwrap();
                if value.is_empty() {
                    self.cookies.remove(name);
                } else {
                    self.cookies.insert(name.to_string(), value.to_string());
                }
            }

            let status = response.status();
            let headers = response.headers().clone();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            TestResponse {
                status,
                headers,
                body,
            }
        }

        /// Fetch a CSRF token and attach it to subsequent requests.
        async fn prime_csrf(&mut self) -> String {
            let response = self.send(Method::GET, "/v1/auth/csrf-token", None, None).await;
            assert_eq!(response.status, StatusCode::OK);
            let token = response.body["csrf_token"].as_str().unwrap().to_string();
            self.csrf = Some(token.clone());
            token
        }

        async fn register(&mut self, email: &str, password: &str) -> TestResponse {
            self.send(
                Method::POST,
                "/v1/auth/register",
                Some(json!({ "email": email, "password": password })),
                None,
            )
            .await
        }

        async fn login(&mut self, email: &str, password: &str) -> TestResponse {
            self.send(
                Method::POST,
                "/v1/auth/login",
                Some(json!({ "email": email, "password": password })),
                None,
            )
            .await
        }
    }

    async fn seed(state: &AppState, email: &str, role: Role) -> uuid::Uuid {
        let password_hash = store::hash_password(PASSWORD.to_string(), 4).await.unwrap();
        state
            .users
            .write()
            .await
            .insert(NewUser {
                email: email.to_string(),
                password_hash,
                role,
            })
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let app = router(AppState::for_tests());
        let _ = app.into_make_service();
    }

    #[tokio::test]
    async fn health_is_public() {
        let mut client = TestClient::new(&AppState::for_tests());
        let response = client.send(Method::GET, "/health", None, None).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["status"], "ok");
        assert!(response.headers.get("x-request-id").is_some());
    }

    #[tokio::test]
    async fn csrf_token_then_register_succeeds() {
        let mut client = TestClient::new(&AppState::for_tests());

        let token = client.prime_csrf().await;
        assert!(client.cookies.contains_key(CSRF_NONCE_COOKIE));
        assert!(token.starts_with(&client.cookies[CSRF_NONCE_COOKIE]));

        let response = client.register("new@example.com", PASSWORD).await;
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.body["user"]["email"], "new@example.com");
        assert_eq!(response.body["user"]["role"], "user");
        assert!(response.body["token"].as_str().is_some());
        assert!(client.cookies.contains_key("token"));
    }

    #[tokio::test]
    async fn register_without_csrf_token_is_forbidden() {
        let state = AppState::for_tests();
        let mut client = TestClient::new(&state);

        let response = client.register("new@example.com", PASSWORD).await;
        assert_eq!(response.status, StatusCode::FORBIDDEN);
        assert_eq!(response.body["code"], CSRF_INVALID_CODE);
        assert!(response.body["error"]
            .as_str()
            .unwrap()
            .to_lowercase()
            .contains("csrf"));
        assert!(state.users.read().await.is_empty());
    }

    #[tokio::test]
    async fn every_response_carries_csrf_header() {
        let mut client = TestClient::new(&AppState::for_tests());
        let first = client.send(Method::GET, "/health", None, None).await;
        let second = client.send(Method::GET, "/health", None, None).await;

        assert!(first.headers.get(header::SET_COOKIE).is_some());
        assert!(second.headers.get(header::SET_COOKIE).is_none());

        let first = first.headers[CSRF_HEADER].to_str().unwrap().to_string();
        let second = second.headers[CSRF_HEADER].to_str().unwrap();
        assert_eq!(first, second);
        assert!(second.starts_with(&client.cookies[CSRF_NONCE_COOKIE]));
    }

    #[tokio::test]
    async fn register_validation_errors() {
        let state = AppState::for_tests();
        let mut client = TestClient::new(&state);
        client.prime_csrf().await;

        assert_eq!(
            client.register("new@example.com", "short").await.status,
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            client.register("not-an-email", PASSWORD).await.status,
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            client.register("new@example.com", PASSWORD).await.status,
            StatusCode::CREATED
        );
        assert_eq!(
            client.register("NEW@example.com", PASSWORD).await.status,
            StatusCode::CONFLICT
        );
    }

    #[tokio::test]
    async fn session_cookie_and_bearer_reach_me() {
        let state = AppState::for_tests();
        let mut client = TestClient::new(&state);
        client.prime_csrf().await;
        let token = client.register("me@example.com", PASSWORD).await.body["token"]
            .as_str()
            .unwrap()
            .to_string();

        let via_cookie = client.send(Method::GET, "/v1/users/me", None, None).await;
        assert_eq!(via_cookie.status, StatusCode::OK);
        assert_eq!(via_cookie.body["email"], "me@example.com");

        let mut fresh = TestClient::new(&state);
        let via_bearer = fresh.send(Method::GET, "/v1/users/me", None, Some(&token)).await;
        assert_eq!(via_bearer.status, StatusCode::OK);
        assert_eq!(via_bearer.body["role"], "user");
    }

    #[tokio::test]
    async fn me_without_session_is_unauthorized() {
        let mut client = TestClient::new(&AppState::for_tests());
        let response = client.send(Method::GET, "/v1/users/me", None, None).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.body, json!({"error": "Unauthorized", "code": "UNAUTHORIZED"}));

        let response = client
            .send(Method::GET, "/v1/users/me", None, Some("not.a.token"))
            .await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_checks_credentials() {
        let state = AppState::for_tests();
        seed(&state, "owner@example.com", Role::User).await;
        let mut client = TestClient::new(&state);
        client.prime_csrf().await;

        let wrong = client.login("owner@example.com", "wrong password").await;
        assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
        assert!(!state.decoy_hash_ready());
        let unknown = client.login("nobody@example.com", PASSWORD).await;
        assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong.body, unknown.body);
        assert!(state.decoy_hash_ready());

        let ok = client.login(" Owner@Example.com ", PASSWORD).await;
        assert_eq!(ok.status, StatusCode::OK);
        assert!(ok.body["expires_at"].as_i64().unwrap() > chrono::Utc::now().timestamp());
        assert!(client.cookies.contains_key("token"));
    }

    #[tokio::test]
    async fn logout_clears_session_cookie() {
        let state = AppState::for_tests();
        seed(&state, "owner@example.com", Role::User).await;
        let mut client = TestClient::new(&state);
        client.prime_csrf().await;
        client.login("owner@example.com", PASSWORD).await;

        let response = client.send(Method::POST, "/v1/auth/logout", None, None).await;
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        let removal = response
            .headers
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap())
            .find(|v| v.starts_with("token="))
            .unwrap();
        assert!(removal.contains("Max-Age=0"));

        assert!(!client.cookies.contains_key("token"));
        let me = client.send(Method::GET, "/v1/users/me", None, None).await;
        assert_eq!(me.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_routes_require_admin_role() {
        let state = AppState::for_tests();
        seed(&state, "admin@example.com", Role::Admin).await;
        let user_id = seed(&state, "user@example.com", Role::User).await;

        let mut user = TestClient::new(&state);
        user.prime_csrf().await;
        user.login("user@example.com", PASSWORD).await;
        let denied = user.send(Method::GET, "/v1/admin/users", None, None).await;
        assert_eq!(denied.status, StatusCode::FORBIDDEN);
        assert_eq!(denied.body, json!({"error": "Forbidden", "code": "FORBIDDEN"}));

        let mut anonymous = TestClient::new(&state);
        let response = anonymous.send(Method::GET, "/v1/admin/users", None, None).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);

        let mut admin = TestClient::new(&state);
        admin.prime_csrf().await;
        admin.login("admin@example.com", PASSWORD).await;
        let listed = admin.send(Method::GET, "/v1/admin/users", None, None).await;
        assert_eq!(listed.status, StatusCode::OK);
        assert_eq!(listed.body["total"], 2);

        let uri = format!("/v1/admin/users/{user_id}/role");
        let promoted = admin
            .send(Method::PATCH, &uri, Some(json!({"role": "admin"})), None)
            .await;
        assert_eq!(promoted.status, StatusCode::OK);
        assert_eq!(promoted.body["role"], "admin");
    }

    #[tokio::test]
    async fn admin_role_update_edge_cases() {
        let state = AppState::for_tests();
        let admin_id = seed(&state, "admin@example.com", Role::Admin).await;
        let mut admin = TestClient::new(&state);
        admin.prime_csrf().await;
        admin.login("admin@example.com", PASSWORD).await;

        let own = admin
            .send(
                Method::PATCH,
                &format!("/v1/admin/users/{admin_id}/role"),
                Some(json!({"role": "user"})),
                None,
            )
            .await;
        assert_eq!(own.status, StatusCode::BAD_REQUEST);

        let missing = admin
            .send(
                Method::PATCH,
                &format!("/v1/admin/users/{}/role", uuid::Uuid::new_v4()),
                Some(json!({"role": "user"})),
                None,
            )
            .await;
        assert_eq!(missing.status, StatusCode::NOT_FOUND);

        // Mutations still need the CSRF token even with a valid session.
        admin.csrf = None;
        let no_csrf = admin
            .send(
                Method::PATCH,
                &format!("/v1/admin/users/{}/role", uuid::Uuid::new_v4()),
                Some(json!({"role": "user"})),
                None,
            )
            .await;
        assert_eq!(no_csrf.status, StatusCode::FORBIDDEN);
        assert_eq!(no_csrf.body["code"], CSRF_INVALID_CODE);
    }

    #[tokio::test]
    async fn openapi_document_lists_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        for path in [
            "/health",
            "/v1/auth/csrf-token",
            "/v1/auth/register",
            "/v1/auth/login",
            "/v1/auth/logout",
            "/v1/users/me",
            "/v1/admin/users",
            "/v1/admin/users/{user_id}/role",
        ] {
            assert!(paths.iter().any(|p| p.as_str() == path), "{path}");
        }
    }
}
