// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! CSRF protection (synchronizer-token pattern).
//!
//! ## Flow
//!
//! 1. Every request passes through [`csrf_guard`], which makes sure the
//!    client holds a `_csrf_nonce` cookie (32 random bytes, base64url) and
//!    attaches a [`CsrfContext`] to the request.
//! 2. [`expose_csrf_token`] puts the derived token
//!    `nonce.base64url(HMAC-SHA256(nonce))` in the `X-CSRF-Token` response
//!    header, so a GET is enough for the client to obtain one.
//! 3. Unsafe requests must echo that token in `x-csrf-token`, `x-xsrf-token`,
//!    a `_csrf` body field, or a `_csrf` query parameter. A foreign site can
//!    make the browser send the cookie but cannot read it, so it cannot
//!    produce a matching token.
//!
//! The nonce is stable for the life of the cookie and is not bound to the
//! session token.

use std::{future::poll_fn, pin::Pin, sync::Arc};

use axum::{
    body::{Body, HttpBody},
    extract::{Request, State},
    http::{header::CONTENT_TYPE, request::Parts, HeaderName, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use base64ct::{Base64UrlUnpadded, Encoding};
use ring::rand::{SecureRandom, SystemRandom};
use subtle::ConstantTimeEq;
use tracing::{debug, error, warn};

use super::cookies::{CookiePolicy, CSRF_NONCE_COOKIE};
use super::error::AuthError;
use super::token::SecretKey;

/// Request header carrying the CSRF token.
pub const CSRF_HEADER: HeaderName = HeaderName::from_static("x-csrf-token");

/// Alternate request header name used by some HTTP clients.
pub const XSRF_HEADER: HeaderName = HeaderName::from_static("x-xsrf-token");

/// Body / query field carrying the CSRF token.
pub const CSRF_FIELD: &str = "_csrf";

/// Nonce cookies shorter than this are replaced.
pub const MIN_NONCE_LEN: usize = 16;

const NONCE_BYTES: usize = 32;
const MAX_INSPECTED_BODY: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
#[error("system random number generator failed")]
pub struct RandomnessError;

/// Issues nonces and derives/verifies CSRF tokens.
#[derive(Debug, Clone)]
pub struct CsrfManager {
    key: SecretKey,
    cookies: CookiePolicy,
    rng: SystemRandom,
}

/// Per-request CSRF state attached by [`csrf_guard`].
#[derive(Debug, Clone)]
pub struct CsrfContext {
    nonce: String,
    key: SecretKey,
}

impl CsrfContext {
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// The token the client must echo back.
    pub fn token(&self) -> String {
        derive_token(&self.key, &self.nonce)
    }
}

impl CsrfManager {
    pub fn new(key: SecretKey, cookies: CookiePolicy) -> Self {
        Self {
            key,
            cookies,
            rng: SystemRandom::new(),
        }
    }

    pub fn generate_nonce(&self) -> Result<String, RandomnessError> {
        let mut bytes = [0u8; NONCE_BYTES];
        self.rng.fill(&mut bytes).map_err(|_| RandomnessError)?;
        Ok(Base64UrlUnpadded::encode_string(&bytes))
    }

    /// Return the jar's nonce, minting a new cookie only when it is missing
    /// or too short. A valid nonce is left untouched.
    pub fn ensure_nonce(&self, jar: CookieJar) -> Result<(CookieJar, CsrfContext), RandomnessError> {
        if let Some(existing) = jar.get(CSRF_NONCE_COOKIE) {
            if existing.value().len() >= MIN_NONCE_LEN {
                let context = self.context(existing.value().to_string());
                return Ok((jar, context));
            }
        }

        let nonce = self.generate_nonce()?;
        debug!("issuing new CSRF nonce cookie");
        let jar = jar.add(self.cookies.nonce_cookie(nonce.clone()));
        Ok((jar, self.context(nonce)))
    }

    pub fn derive_token(&self, nonce: &str) -> String {
        derive_token(&self.key, nonce)
    }

    /// Check a presented token against the current nonce.
    pub fn verify_token(&self, token: &str, nonce: &str) -> bool {
        let Some((token_nonce, signature)) = token.rsplit_once('.') else {
            return false;
        };

        if token_nonce.len() != nonce.len() {
            return false;
        }
        if !bool::from(token_nonce.as_bytes().ct_eq(nonce.as_bytes())) {
            return false;
        }

        match Base64UrlUnpadded::decode_vec(signature) {
            Ok(tag) => self.key.verify(nonce.as_bytes(), &tag),
            Err(_) => false,
        }
    }

    fn context(&self, nonce: String) -> CsrfContext {
        CsrfContext {
            nonce,
            key: self.key.clone(),
        }
    }
}

fn derive_token(key: &SecretKey, nonce: &str) -> String {
    format!("{nonce}.{}", key.sign(nonce.as_bytes()))
}

/// GET, HEAD, OPTIONS and TRACE never need a token.
pub fn is_safe_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

/// CSRF guard middleware.
///
/// # Usage
///
/// ```rust,ignore
/// let app = Router::new()
///     .route("/v1/things", post(create_thing))
///     .layer(axum::middleware::from_fn(expose_csrf_token))
///     .layer(axum::middleware::from_fn_with_state(csrf, csrf_guard));
/// ```
pub async fn csrf_guard(
    State(csrf): State<Arc<CsrfManager>>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    let (jar, context) = match csrf.ensure_nonce(jar) {
        Ok(ensured) => ensured,
        Err(e) => {
            error!(error = %e, "failed to mint CSRF nonce");
            return AuthError::InternalError(e.to_string()).into_response();
        }
    };

    let (mut parts, body) = request.into_parts();
    parts.extensions.insert(context.clone());

    if is_safe_method(&parts.method) {
        let response = next.run(Request::from_parts(parts, body)).await;
        return (jar, response).into_response();
    }

    let (candidate, body) = match extract_candidate(&parts, body).await {
        Ok(found) => found,
        Err(e) => {
            warn!(
                method = %parts.method,
                path = %parts.uri.path(),
                error = %e,
                "request body rejected during CSRF inspection"
            );
            return (jar, e).into_response();
        }
    };
    let valid = candidate
        .as_deref()
        .is_some_and(|token| csrf.verify_token(token, context.nonce()));

    if !valid {
        warn!(
            method = %parts.method,
            path = %parts.uri.path(),
            token_present = candidate.is_some(),
            "CSRF validation failed"
        );
        return (jar, AuthError::CsrfValidationFailed).into_response();
    }

    let response = next.run(Request::from_parts(parts, body)).await;
    (jar, response).into_response()
}

/// Sets `X-CSRF-Token` on responses to requests that went through
/// [`csrf_guard`].
pub async fn expose_csrf_token(request: Request, next: Next) -> Response {
    let context = request.extensions().get::<CsrfContext>().cloned();
    let mut response = next.run(request).await;

    if let Some(context) = context {
        if let Ok(value) = HeaderValue::from_str(&context.token()) {
            response.headers_mut().insert(CSRF_HEADER, value);
        }
    }
    response
}

/// Find the presented token: headers first, then body, then query string.
///
/// Returns the body unchanged (or rebuilt from the buffered bytes) so the
/// handler still sees it. A JSON or form body that cannot be buffered in
/// full ends the request; the handler never sees a truncated payload.
async fn extract_candidate(
    parts: &Parts,
    body: Body,
) -> Result<(Option<String>, Body), AuthError> {
    for name in [&CSRF_HEADER, &XSRF_HEADER] {
        if let Some(value) = parts.headers.get(name).and_then(|v| v.to_str().ok()) {
            if !value.is_empty() {
                return Ok((Some(value.to_string()), body));
            }
        }
    }

    let (from_body, body) = match inspectable_body(parts) {
        Some(kind) => {
            let bytes = buffer_body(body, MAX_INSPECTED_BODY).await?;
            let token = match kind {
                BodyKind::Json => token_from_json(&bytes),
                BodyKind::Form => token_from_form(&bytes),
            };
            (token, Body::from(bytes))
        }
        None => (None, body),
    };
    if from_body.is_some() {
        return Ok((from_body, body));
    }

    let from_query = parts
        .uri
        .query()
        .and_then(|query| token_from_form(query.as_bytes()));
    Ok((from_query, body))
}

/// Read the whole body, failing with 413 past `limit` bytes and 400 on a
/// stream error.
async fn buffer_body(mut body: Body, limit: usize) -> Result<Vec<u8>, AuthError> {
    if body.size_hint().lower() > limit as u64 {
        return Err(AuthError::BodyTooLarge);
    }

    let mut buffered = Vec::new();
    while let Some(frame) = poll_fn(|cx| Pin::new(&mut body).poll_frame(cx)).await {
        let frame = frame.map_err(|e| {
            debug!(error = %e, "body stream failed during CSRF inspection");
            AuthError::UnreadableBody
        })?;
        if let Ok(data) = frame.into_data() {
            if buffered.len() + data.len() > limit {
                return Err(AuthError::BodyTooLarge);
            }
            buffered.extend_from_slice(&data);
        }
    }
    Ok(buffered)
}

enum BodyKind {
    Json,
    Form,
}

fn inspectable_body(parts: &Parts) -> Option<BodyKind> {
    let content_type = parts.headers.get(CONTENT_TYPE)?.to_str().ok()?;
    let mime = content_type.split(';').next()?.trim().to_ascii_lowercase();
    match mime.as_str() {
        "application/json" => Some(BodyKind::Json),
        "application/x-www-form-urlencoded" => Some(BodyKind::Form),
        _ => None,
    }
}

fn token_from_json(bytes: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    value.get(CSRF_FIELD)?.as_str().map(str::to_string)
}

fn token_from_form(bytes: &[u8]) -> Option<String> {
    url::form_urlencoded::parse(bytes)
        .find(|(key, _)| key == CSRF_FIELD)
        .map(|(_, value)| value.into_owned())
}
