// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP client for the Tally API.
//!
//! [`ApiClient`] keeps the session and nonce cookies in a cookie store and
//! handles the CSRF contract: it remembers the last `X-CSRF-Token` it saw,
//! attaches it to mutating requests, and on a CSRF rejection refreshes the
//! token and retries the request once.

pub mod error;
pub mod interceptor;

pub use error::ClientError;
pub use interceptor::{ApiClient, CsrfTokenCache};
