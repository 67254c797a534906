// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment once at startup and
//! validated before the server binds. Secrets shorter than 32 bytes are
//! refused.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `APP_ENV` | `production` or `development` | `development` |
//! | `TOKEN_SECRET` | Session token MAC key (>= 32 bytes) | Required |
//! | `TOKEN_PREVIOUS_SECRETS` | Comma-separated retired keys still accepted for verification | Empty |
//! | `CSRF_SECRET` | CSRF token MAC key (>= 32 bytes) | `TOKEN_SECRET` |
//! | `TOKEN_TTL` | Session lifetime, seconds or `<n><s\|m\|h\|d>` | `7d` |
//! | `COOKIE_SAME_SITE` | `strict`, `lax` or `none` | `lax` |
//! | `CORS_ORIGIN` | Browser origin allowed to send credentials | Permissive |
//! | `BCRYPT_COST` | Password hashing cost | `12` |
//! | `SEED_ADMIN_EMAIL` | Bootstrap admin account email | Optional |
//! | `SEED_ADMIN_PASSWORD` | Bootstrap admin account password | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use axum::http::HeaderValue;
use axum_extra::extract::cookie::SameSite;

use crate::auth::token::{SecretKey, Ttl, DEFAULT_TTL};

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const APP_ENV_ENV: &str = "APP_ENV";
pub const TOKEN_SECRET_ENV: &str = "TOKEN_SECRET";
pub const TOKEN_PREVIOUS_SECRETS_ENV: &str = "TOKEN_PREVIOUS_SECRETS";
pub const CSRF_SECRET_ENV: &str = "CSRF_SECRET";
pub const TOKEN_TTL_ENV: &str = "TOKEN_TTL";
pub const COOKIE_SAME_SITE_ENV: &str = "COOKIE_SAME_SITE";
pub const CORS_ORIGIN_ENV: &str = "CORS_ORIGIN";
pub const BCRYPT_COST_ENV: &str = "BCRYPT_COST";
pub const SEED_ADMIN_EMAIL_ENV: &str = "SEED_ADMIN_EMAIL";
pub const SEED_ADMIN_PASSWORD_ENV: &str = "SEED_ADMIN_PASSWORD";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(var: &'static str, reason: impl ToString) -> Self {
        Self::Invalid {
            var,
            reason: reason.to_string(),
        }
    }
}

/// Deployment environment. Controls the `Secure` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Credentials for the bootstrap admin account.
#[derive(Clone)]
pub struct SeedAdmin {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for SeedAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedAdmin")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub token_key: SecretKey,
    pub previous_token_keys: Vec<SecretKey>,
    pub csrf_key: SecretKey,
    pub token_ttl: Ttl,
    pub same_site: SameSite,
    pub cors_origin: Option<HeaderValue>,
    pub bcrypt_cost: u32,
    pub seed_admin: Option<SeedAdmin>,
    pub log_format: LogFormat,
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let host = get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match get(PORT_ENV) {
            Some(port) => port
                .trim()
                .parse::<u16>()
                .map_err(|e| ConfigError::invalid(PORT_ENV, e))?,
            None => DEFAULT_PORT,
        };

        let environment = match get(APP_ENV_ENV).as_deref().map(str::trim) {
            None | Some("development") | Some("dev") | Some("test") => Environment::Development,
            Some("production") | Some("prod") => Environment::Production,
            Some(other) => {
                return Err(ConfigError::invalid(
                    APP_ENV_ENV,
                    format!("unknown environment {other:?}"),
                ))
            }
        };

        let token_secret = get(TOKEN_SECRET_ENV).ok_or(ConfigError::Missing(TOKEN_SECRET_ENV))?;
        let token_key = secret_key(TOKEN_SECRET_ENV, &token_secret)?;

        let previous_token_keys = get(TOKEN_PREVIOUS_SECRETS_ENV)
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| secret_key(TOKEN_PREVIOUS_SECRETS_ENV, s))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        let csrf_key = match get(CSRF_SECRET_ENV) {
            Some(secret) => secret_key(CSRF_SECRET_ENV, &secret)?,
            None => token_key.clone(),
        };

        let token_ttl = match get(TOKEN_TTL_ENV) {
            Some(ttl) => ttl
                .parse::<Ttl>()
                .map_err(|e| ConfigError::invalid(TOKEN_TTL_ENV, e))?,
            None => DEFAULT_TTL,
        };

        let same_site = match get(COOKIE_SAME_SITE_ENV) {
            Some(value) => parse_same_site(&value)
                .ok_or_else(|| ConfigError::invalid(COOKIE_SAME_SITE_ENV, "expected strict, lax or none"))?,
            None => SameSite::Lax,
        };

        let bcrypt_cost = match get(BCRYPT_COST_ENV) {
            Some(cost) => {
                let cost = cost
                    .trim()
                    .parse::<u32>()
                    .map_err(|e| ConfigError::invalid(BCRYPT_COST_ENV, e))?;
                if !(4..=31).contains(&cost) {
                    return Err(ConfigError::invalid(BCRYPT_COST_ENV, "must be between 4 and 31"));
                }
                cost
            }
            None => bcrypt::DEFAULT_COST,
        };

        let seed_admin = match (get(SEED_ADMIN_EMAIL_ENV), get(SEED_ADMIN_PASSWORD_ENV)) {
            (Some(email), Some(password)) => Some(SeedAdmin { email, password }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing(SEED_ADMIN_PASSWORD_ENV)),
            (None, Some(_)) => return Err(ConfigError::Missing(SEED_ADMIN_EMAIL_ENV)),
        };

        let cors_origin = get(CORS_ORIGIN_ENV)
            .map(|origin| {
                HeaderValue::from_str(origin.trim().trim_end_matches('/'))
                    .map_err(|e| ConfigError::invalid(CORS_ORIGIN_ENV, e))
            })
            .transpose()?;

        let log_format = match get(LOG_FORMAT_ENV).as_deref().map(str::trim) {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            host,
            port,
            environment,
            token_key,
            previous_token_keys,
            csrf_key,
            token_ttl,
            same_site,
            cors_origin,
            bcrypt_cost,
            seed_admin,
            log_format,
        })
    }

    /// Configuration for tests: development mode, fixed secrets, cheap hashing.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            environment: Environment::Development,
            token_key: test_key(b't'),
            previous_token_keys: Vec::new(),
            csrf_key: test_key(b'c'),
            token_ttl: DEFAULT_TTL,
            same_site: SameSite::Lax,
            cors_origin: None,
            bcrypt_cost: 4,
            seed_admin: None,
            log_format: LogFormat::Pretty,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn secret_key(var: &'static str, secret: &str) -> Result<SecretKey, ConfigError> {
    SecretKey::new(secret.as_bytes()).map_err(|e| ConfigError::invalid(var, e))
}

#[cfg(test)]
fn test_key(fill: u8) -> SecretKey {
    SecretKey::new([fill; 32]).expect("32-byte key")
}

pub fn parse_same_site(value: &str) -> Option<SameSite> {
    match value.trim().to_ascii_lowercase().as_str() {
        "strict" => Some(SameSite::Strict),
        "lax" => Some(SameSite::Lax),
        "none" => Some(SameSite::None),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_with_only_secret() {
        let config = load(&[(TOKEN_SECRET_ENV, SECRET)]).unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.token_ttl, DEFAULT_TTL);
        assert_eq!(config.same_site, SameSite::Lax);
        assert_eq!(config.bcrypt_cost, bcrypt::DEFAULT_COST);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.previous_token_keys.is_empty());
        assert!(config.seed_admin.is_none());
    }

    #[test]
    fn missing_secret_is_an_error() {
        assert!(matches!(
            load(&[]),
            Err(ConfigError::Missing(TOKEN_SECRET_ENV))
        ));
    }

    #[test]
    fn short_secrets_are_rejected() {
        let err = load(&[(TOKEN_SECRET_ENV, "short")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: TOKEN_SECRET_ENV, .. }));

        let err = load(&[(TOKEN_SECRET_ENV, SECRET), (CSRF_SECRET_ENV, "short")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: CSRF_SECRET_ENV, .. }));

        let err = load(&[
            (TOKEN_SECRET_ENV, SECRET),
            (TOKEN_PREVIOUS_SECRETS_ENV, "short"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: TOKEN_PREVIOUS_SECRETS_ENV, .. }));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            (TOKEN_SECRET_ENV, SECRET),
            (TOKEN_PREVIOUS_SECRETS_ENV, "abcdefghijklmnopqrstuvwxyz012345, ABCDEFGHIJKLMNOPQRSTUVWXYZ012345"),
            (APP_ENV_ENV, "production"),
            (PORT_ENV, "3000"),
            (TOKEN_TTL_ENV, "12h"),
            (COOKIE_SAME_SITE_ENV, "Strict"),
            (BCRYPT_COST_ENV, "6"),
            (LOG_FORMAT_ENV, "json"),
            (CORS_ORIGIN_ENV, "https://app.example.com"),
        ])
        .unwrap();

        assert!(config.environment.is_production());
        assert_eq!(config.port, 3000);
        assert_eq!(config.token_ttl.as_secs(), 43_200);
        assert_eq!(config.same_site, SameSite::Strict);
        assert_eq!(config.bcrypt_cost, 6);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.previous_token_keys.len(), 2);
        assert_eq!(
            config.cors_origin.as_ref().and_then(|v| v.to_str().ok()),
            Some("https://app.example.com")
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        for (var, value) in [
            (TOKEN_TTL_ENV, "7 weeks"),
            (COOKIE_SAME_SITE_ENV, "sometimes"),
            (APP_ENV_ENV, "staging"),
            (PORT_ENV, "http"),
            (BCRYPT_COST_ENV, "2"),
            (CORS_ORIGIN_ENV, "https://bad\norigin"),
        ] {
            let result = load(&[(TOKEN_SECRET_ENV, SECRET), (var, value)]);
            assert!(result.is_err(), "{var}={value}");
        }
    }

    #[test]
    fn seed_admin_requires_both_values() {
        let err = load(&[(TOKEN_SECRET_ENV, SECRET), (SEED_ADMIN_EMAIL_ENV, "a@b.c")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(SEED_ADMIN_PASSWORD_ENV)));

        let config = load(&[
            (TOKEN_SECRET_ENV, SECRET),
            (SEED_ADMIN_EMAIL_ENV, "admin@example.com"),
            (SEED_ADMIN_PASSWORD_ENV, "correct horse"),
        ])
        .unwrap();
        let seed = config.seed_admin.unwrap();
        assert_eq!(seed.email, "admin@example.com");
        assert!(!format!("{seed:?}").contains("correct horse"));
    }
}
