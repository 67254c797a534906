// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! CSRF-aware request execution.
//!
//! ```text
//! send(request + cached token) --2xx--> Ok
//!        |
//!       403 "csrf"
//!        |
//! refresh token, send(clone + new token) --2xx--> Ok
//!        |
//!       any error --> Err (no third attempt)
//! ```
//!
//! If the refresh itself fails, the caller gets the original 403.

use std::{sync::Arc, time::Duration};

use reqwest::{header::HeaderValue, Client, Method, Request, Response, StatusCode};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use super::error::ClientError;
use crate::auth::{csrf::CSRF_HEADER, error::CSRF_INVALID_CODE};
use crate::models::CsrfTokenResponse;

/// Endpoint used to fetch a fresh token after a rejection.
pub const CSRF_REFRESH_PATH: &str = "/v1/auth/csrf-token";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Last CSRF token seen by a client. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct CsrfTokenCache {
    inner: Arc<RwLock<Option<String>>>,
}

impl CsrfTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> Option<String> {
        self.inner.read().await.clone()
    }

    pub async fn set(&self, token: impl Into<String>) {
        *self.inner.write().await = Some(token.into());
    }

    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }
}

/// POST, PUT, PATCH and DELETE carry the cached token.
pub fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// A 403 whose body is a CSRF failure: the `CSRF_INVALID` code, or failing
/// that any mention of "csrf".
pub fn is_csrf_rejection(status: StatusCode, body: &str) -> bool {
    if status != StatusCode::FORBIDDEN {
        return false;
    }

    let code = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("code").and_then(|c| c.as_str()).map(str::to_string));
    if code.as_deref() == Some(CSRF_INVALID_CODE) {
        return true;
    }

    body.to_lowercase().contains("csrf")
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    csrf: CsrfTokenCache,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_cache(base_url, CsrfTokenCache::new())
    }

    /// Build a client around an existing cache, e.g. one shared with
    /// another client for the same origin.
    pub fn with_cache(base_url: &str, csrf: CsrfTokenCache) -> Result<Self, ClientError> {
        let http = Client::builder()
            .cookie_store(true)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
            csrf,
        })
    }

    pub fn csrf_cache(&self) -> &CsrfTokenCache {
        &self.csrf
    }

    pub fn url(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(path)?)
    }

    /// Send `request`, retrying once with a refreshed token if the server
    /// rejects it for CSRF. Non-2xx results become [`ClientError::Status`].
    pub async fn execute(&self, request: Request) -> Result<Response, ClientError> {
        let replay = request.try_clone();
        let method = request.method().clone();
        let path = request.url().path().to_string();

        let response = self.send(request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await?;
        let Some(replay) = replay.filter(|_| is_csrf_rejection(status, &body)) else {
            return Err(ClientError::Status { status, body });
        };

        warn!(method = %method, path = %path, "CSRF token rejected; refreshing and retrying once");
        if let Err(e) = self.refresh_csrf_token().await {
            warn!(error = %e, "CSRF token refresh failed");
            return Err(ClientError::Status { status, body });
        }

        let response = self.send(replay).await?;
        ensure_success(response).await
    }

    /// Fetch a new token from the server and store it in the cache.
    pub async fn refresh_csrf_token(&self) -> Result<String, ClientError> {
        let request = self.http.get(self.url(CSRF_REFRESH_PATH)?).build()?;
        let response = ensure_success(self.send(request).await?).await?;

        let from_header = header_token(&response);
        let from_body = response
            .json::<CsrfTokenResponse>()
            .await
            .ok()
            .map(|body| body.csrf_token)
            .filter(|token| !token.is_empty());

        let token = from_body
            .or(from_header)
            .ok_or(ClientError::MissingCsrfToken)?;
        self.csrf.set(token.clone()).await;
        debug!("CSRF token refreshed");
        Ok(token)
    }

    pub async fn get(&self, path: &str) -> Result<Response, ClientError> {
        let request = self.http.get(self.url(path)?).build()?;
        self.execute(request).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, ClientError> {
        let request = self.http.post(self.url(path)?).json(body).build()?;
        self.execute(request).await
    }

    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, ClientError> {
        let request = self.http.patch(self.url(path)?).json(body).build()?;
        self.execute(request).await
    }

    pub async fn delete(&self, path: &str) -> Result<Response, ClientError> {
        let request = self.http.delete(self.url(path)?).build()?;
        self.execute(request).await
    }

    /// One attempt: attach the cached token, send, capture any new token.
    async fn send(&self, mut request: Request) -> Result<Response, ClientError> {
        if is_mutating(request.method()) {
            if let Some(token) = self.csrf.get().await {
                match HeaderValue::from_str(&token) {
                    Ok(value) => {
                        request.headers_mut().insert(CSRF_HEADER, value);
                    }
                    Err(_) => warn!("cached CSRF token is not a valid header value"),
                }
            }
        }

        let response = self.http.execute(request).await?;
        if let Some(token) = header_token(&response) {
            self.csrf.set(token).await;
        }
        Ok(response)
    }
}

fn header_token(response: &Response) -> Option<String> {
    response
        .headers()
        .get(CSRF_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

async fn ensure_success(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await?;
    Err(ClientError::Status { status, body })
}
