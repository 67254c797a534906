// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Cookie attributes for the session and CSRF nonce cookies.
//!
//! | Cookie | Purpose |
//! |--------|---------|
//! | `token` | signed session credential |
//! | `_csrf_nonce` | durable CSRF nonce |
//!
//! Both are `HttpOnly`, `Path=/`, live for 7 days, carry the configured
//! `SameSite` value, and are `Secure` in production.

use axum_extra::extract::cookie::{Cookie, SameSite};

use crate::config::{Config, Environment};

/// Session token cookie name.
pub const SESSION_COOKIE: &str = "token";

/// CSRF nonce cookie name.
pub const CSRF_NONCE_COOKIE: &str = "_csrf_nonce";

/// Cookie lifetime (7 days).
pub const COOKIE_MAX_AGE_SECS: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookiePolicy {
    secure: bool,
    same_site: SameSite,
}

impl CookiePolicy {
    pub fn new(environment: Environment, same_site: SameSite) -> Self {
        // Browsers drop SameSite=None cookies that are not Secure.
        let secure = environment.is_production() || same_site == SameSite::None;
        Self { secure, same_site }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.environment, config.same_site)
    }

    pub fn secure(&self) -> bool {
        self.secure
    }

    pub fn same_site(&self) -> SameSite {
        self.same_site
    }

    pub fn session_cookie(&self, token: String) -> Cookie<'static> {
        self.build(SESSION_COOKIE, token)
    }

    pub fn nonce_cookie(&self, nonce: String) -> Cookie<'static> {
        self.build(CSRF_NONCE_COOKIE, nonce)
    }

    /// Template passed to `CookieJar::remove` on logout. Path must match
    /// the original cookie for the browser to drop it.
    pub fn session_removal(&self) -> Cookie<'static> {
        Cookie::build(SESSION_COOKIE).path("/").build()
    }

    fn build(&self, name: &'static str, value: String) -> Cookie<'static> {
        Cookie::build((name, value))
            .http_only(true)
            .secure(self.secure)
            .same_site(self.same_site)
            .max_age(time::Duration::seconds(COOKIE_MAX_AGE_SECS))
            .path("/")
            .build()
    }
}
