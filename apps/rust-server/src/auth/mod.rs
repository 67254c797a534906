// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Session tokens, CSRF protection and role gating for the Tally API.
//!
//! ## Auth Flow
//!
//! 1. Client logs in (or registers) and receives a signed session token,
//!    both in the response body and as the `token` cookie
//! 2. Client sends the token back as `Authorization: Bearer <token>` or via
//!    the cookie
//! 3. Server:
//!    - verifies the CSRF token on unsafe methods (`csrf`)
//!    - verifies the session token MAC and expiry (`token`)
//!    - checks the route's required role (`middleware`)
//!
//! ## Security
//!
//! - MAC and nonce comparisons are constant time
//! - Token failures are indistinguishable to the client (generic 401)
//! - Session and nonce cookies are `HttpOnly`, and `Secure` in production

pub mod claims;
pub mod cookies;
pub mod csrf;
pub mod error;
pub mod extractor;
pub mod middleware;
pub mod roles;
pub mod token;

pub use claims::{Identity, SessionClaims};
pub use cookies::CookiePolicy;
pub use csrf::{CsrfContext, CsrfManager};
pub use error::AuthError;
pub use extractor::{AdminOnly, Auth};
pub use roles::Role;
pub use token::{SecretKey, TokenCodec, TokenError, Ttl};
