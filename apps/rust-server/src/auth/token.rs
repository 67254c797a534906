// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Compact signed session tokens.
//!
//! ## Wire Format
//!
//! Three base64url (unpadded) segments joined by `.`:
//!
//! ```text
//! base64url({"alg":"HS256","typ":"JWT"}) . base64url({sub,role,email,iat,exp}) . base64url(mac)
//! ```
//!
//! The MAC is HMAC-SHA256 over the ASCII string `header.payload`. The layout
//! mirrors a signed JWT but is produced and checked here directly, with a
//! fixed algorithm and no header negotiation.
//!
//! ## Key Rotation
//!
//! Tokens are always signed with the current secret. Verification tries the
//! current secret, then each configured previous secret in order. With no
//! previous secrets configured, rotating the secret logs everyone out.

use std::fmt;
use std::str::FromStr;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::claims::{Identity, SessionClaims};
use super::roles::Role;

/// Minimum accepted secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Default token lifetime (7 days).
pub const DEFAULT_TTL: Ttl = Ttl(7 * 24 * 60 * 60);

const HEADER: TokenHeader<'static> = TokenHeader {
    alg: "HS256",
    typ: "JWT",
};

/// Token codec errors.
///
/// The verification variants are for diagnostics only; at the HTTP boundary
/// they all collapse into one generic 401.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    MalformedToken,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token payload is invalid")]
    InvalidPayload,

    #[error("token has expired")]
    TokenExpired,

    #[error("secret must be at least {MIN_SECRET_LEN} bytes, got {0}")]
    WeakSecret(usize),

    #[error("invalid ttl {0:?} (expected seconds or <integer><s|m|h|d>)")]
    InvalidTtl(String),

    #[error("failed to encode token: {0}")]
    Encoding(String),
}

/// Token time-to-live in seconds.
///
/// Parses either a raw integer of seconds (`"3600"`) or a duration string
/// (`"15m"`, `"12h"`, `"7d"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ttl(u64);

impl Ttl {
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub const fn as_secs(&self) -> u64 {
        self.0
    }
}

impl Default for Ttl {
    fn default() -> Self {
        DEFAULT_TTL
    }
}

impl From<u64> for Ttl {
    fn from(secs: u64) -> Self {
        Self(secs)
    }
}

impl FromStr for Ttl {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TokenError::InvalidTtl(s.to_string());
        let trimmed = s.trim();

        let (digits, multiplier) = match trimmed.char_indices().last() {
            Some((idx, unit)) if unit.is_ascii_alphabetic() => {
                let multiplier = match unit {
                    's' => 1,
                    'm' => 60,
                    'h' => 60 * 60,
                    'd' => 24 * 60 * 60,
                    _ => return Err(invalid()),
                };
                (&trimmed[..idx], multiplier)
            }
            Some(_) => (trimmed, 1),
            None => return Err(invalid()),
        };

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let value: u64 = digits.parse().map_err(|_| invalid())?;
        let secs = value.checked_mul(multiplier).ok_or_else(invalid)?;
        if secs == 0 {
            return Err(invalid());
        }
        Ok(Self(secs))
    }
}

type HmacSha256 = Hmac<Sha256>;

/// MAC key material. Never printed.
#[derive(Clone)]
pub struct SecretKey {
    mac: HmacSha256,
    len: usize,
}

impl SecretKey {
    /// Accepts keys of at least [`MIN_SECRET_LEN`] bytes.
    pub fn new(bytes: impl AsRef<[u8]>) -> Result<Self, TokenError> {
        let bytes = bytes.as_ref();
        if bytes.len() < MIN_SECRET_LEN {
            return Err(TokenError::WeakSecret(bytes.len()));
        }
        let mac = HmacSha256::new_from_slice(bytes)
            .map_err(|_| TokenError::WeakSecret(bytes.len()))?;
        Ok(Self {
            mac,
            len: bytes.len(),
        })
    }

    /// Base64url HMAC-SHA256 of `message`.
    pub(crate) fn sign(&self, message: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(message);
        Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes())
    }

    /// Constant-time MAC check.
    pub(crate) fn verify(&self, message: &[u8], tag: &[u8]) -> bool {
        let mut mac = self.mac.clone();
        mac.update(message);
        mac.verify_slice(tag).is_ok()
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey(<{} bytes>)", self.len)
    }
}

#[derive(Serialize)]
struct TokenHeader<'a> {
    alg: &'a str,
    typ: &'a str,
}

#[derive(Serialize)]
struct TokenBody<'a> {
    sub: &'a str,
    role: Role,
    email: &'a str,
    iat: i64,
    exp: i64,
}

/// Payload as found on the wire. Role stays a string so an unknown role is
/// reported as an invalid payload rather than a generic parse failure.
#[derive(Deserialize)]
struct RawBody {
    sub: String,
    role: String,
    email: String,
    #[serde(default)]
    iat: i64,
    exp: i64,
}

/// Issues and verifies session tokens.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    signing_key: SecretKey,
    previous_keys: Vec<SecretKey>,
    default_ttl: Ttl,
}

impl TokenCodec {
    pub fn new(signing_key: SecretKey) -> Self {
        Self {
            signing_key,
            previous_keys: Vec::new(),
            default_ttl: DEFAULT_TTL,
        }
    }

    /// Additional keys accepted during verification only.
    pub fn with_previous_keys(mut self, keys: Vec<SecretKey>) -> Self {
        self.previous_keys = keys;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Ttl) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn default_ttl(&self) -> Ttl {
        self.default_ttl
    }

    /// Issue a token valid from now for `ttl` (or the default ttl).
    pub fn issue(&self, identity: Identity, ttl: Option<Ttl>) -> Result<String, TokenError> {
        self.issue_at(identity, ttl, Utc::now().timestamp())
    }

    pub fn issue_at(
        &self,
        identity: Identity,
        ttl: Option<Ttl>,
        now: i64,
    ) -> Result<String, TokenError> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let ttl_secs = i64::try_from(ttl.as_secs())
            .map_err(|_| TokenError::InvalidTtl(ttl.as_secs().to_string()))?;
        let exp = now
            .checked_add(ttl_secs)
            .ok_or_else(|| TokenError::InvalidTtl(ttl.as_secs().to_string()))?;

        let body = TokenBody {
            sub: &identity.sub,
            role: identity.role,
            email: &identity.email,
            iat: now,
            exp,
        };

        let header = encode_json(&HEADER)?;
        let body = encode_json(&body)?;
        let signing_input = format!("{header}.{body}");
        let signature = self.signing_key.sign(signing_input.as_bytes());

        Ok(format!("{signing_input}.{signature}"))
    }

    /// Verify a token against the current time.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, TokenError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    pub fn verify_at(&self, token: &str, now: i64) -> Result<SessionClaims, TokenError> {
        let mut segments = token.split('.');
        let (Some(header), Some(body), Some(signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(TokenError::MalformedToken);
        };

        let tag =
            Base64UrlUnpadded::decode_vec(signature).map_err(|_| TokenError::InvalidSignature)?;
        let signing_input = &token[..header.len() + 1 + body.len()];

        let verified = std::iter::once(&self.signing_key)
            .chain(self.previous_keys.iter())
            .any(|key| key.verify(signing_input.as_bytes(), &tag));
        if !verified {
            return Err(TokenError::InvalidSignature);
        }

        let claims = decode_body(body)?;
        if claims.is_expired_at(now) {
            return Err(TokenError::TokenExpired);
        }
        Ok(claims)
    }
}

fn encode_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value).map_err(|e| TokenError::Encoding(e.to_string()))?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn decode_body(body: &str) -> Result<SessionClaims, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(body).map_err(|_| TokenError::InvalidPayload)?;
    let raw: RawBody = serde_json::from_slice(&bytes).map_err(|_| TokenError::InvalidPayload)?;
    let role = Role::parse(&raw.role).ok_or(TokenError::InvalidPayload)?;

    if raw.sub.is_empty() || raw.email.is_empty() {
        return Err(TokenError::InvalidPayload);
    }

    Ok(SessionClaims::from_identity(
        Identity::new(raw.sub, role, raw.email),
        raw.iat,
        raw.exp,
    ))
}
