// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tally - session and CSRF service for the invoice tracker
//!
//! Signed session tokens, a synchronizer-token CSRF scheme, role-gated
//! routes, and a matching HTTP client.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Token codec, cookies, CSRF, auth middleware
//! - `client` - CSRF-aware HTTP client (reqwest)
//! - `store` - In-memory account store

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod state;
pub mod store;
