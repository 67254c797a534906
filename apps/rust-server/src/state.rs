// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tokio::sync::{OnceCell, RwLock};

use crate::auth::{CookiePolicy, CsrfManager, Role, TokenCodec};
use crate::config::Config;
use crate::store::{self, NewUser, StoreError, User, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tokens: Arc<TokenCodec>,
    pub csrf: Arc<CsrfManager>,
    pub cookies: CookiePolicy,
    pub users: Arc<RwLock<UserStore>>,
    decoy_hash: Arc<OnceCell<String>>,
}

/// Hashed once per process and verified against when a login names an
/// unknown account, so both failure paths pay one bcrypt verification.
const DECOY_PASSWORD: &str = "tally-login-decoy";

impl AppState {
    pub fn new(config: Config, users: UserStore) -> Self {
        let cookies = CookiePolicy::from_config(&config);
        let tokens = TokenCodec::new(config.token_key.clone())
            .with_previous_keys(config.previous_token_keys.clone())
            .with_default_ttl(config.token_ttl);
        let csrf = CsrfManager::new(config.csrf_key.clone(), cookies.clone());

        Self {
            config: Arc::new(config),
            tokens: Arc::new(tokens),
            csrf: Arc::new(csrf),
            cookies,
            users: Arc::new(RwLock::new(users)),
            decoy_hash: Arc::new(OnceCell::new()),
        }
    }

    /// Hash at the configured cost that no real password is checked against.
    pub async fn decoy_password_hash(&self) -> Result<&str, StoreError> {
        let hash = self
            .decoy_hash
            .get_or_try_init(|| {
                store::hash_password(DECOY_PASSWORD.to_string(), self.config.bcrypt_cost)
            })
            .await?;
        Ok(hash.as_str())
    }

    /// Create the configured bootstrap admin unless the email is taken.
    pub async fn seed_admin(&self) -> Result<Option<User>, StoreError> {
        let Some(seed) = self.config.seed_admin.as_ref() else {
            return Ok(None);
        };
        if self.users.read().await.find_by_email(&seed.email).is_some() {
            return Ok(None);
        }

        store::validate_password(&seed.password)?;
        let password_hash =
            store::hash_password(seed.password.clone(), self.config.bcrypt_cost).await?;
        let user = self.users.write().await.insert(NewUser {
            email: seed.email.clone(),
            password_hash,
            role: Role::Admin,
        })?;
        Ok(Some(user))
    }

    #[cfg(test)]
    pub fn decoy_hash_ready(&self) -> bool {
        self.decoy_hash.initialized()
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self::new(Config::for_tests(), UserStore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeedAdmin;

    #[tokio::test]
    async fn seed_admin_creates_account_once() {
        let mut config = Config::for_tests();
        config.seed_admin = Some(SeedAdmin {
            email: "Admin@Example.com".to_string(),
            password: "correct horse".to_string(),
        });
        let state = AppState::new(config, UserStore::new());

        let admin = state.seed_admin().await.unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(admin.email, "admin@example.com");

        assert!(state.seed_admin().await.unwrap().is_none());
        assert_eq!(state.users.read().await.len(), 1);
    }

    #[tokio::test]
    async fn seed_admin_is_noop_without_config() {
        let state = AppState::for_tests();
        assert!(state.seed_admin().await.unwrap().is_none());
        assert!(state.users.read().await.is_empty());
    }

    #[tokio::test]
    async fn decoy_hash_is_stable_and_uses_configured_cost() {
        let state = AppState::for_tests();
        let first = state.decoy_password_hash().await.unwrap().to_string();
        let second = state.decoy_password_hash().await.unwrap();

        assert_eq!(first, second);
        assert!(first.starts_with(&format!("$2b${:02}$", state.config.bcrypt_cost)));
        assert!(!store::verify_password("password123".to_string(), first).await.unwrap());
    }

    #[test]
    fn codec_uses_configured_ttl() {
        let mut config = Config::for_tests();
        config.token_ttl = crate::auth::Ttl::from_secs(60);
        let state = AppState::new(config, UserStore::new());
        assert_eq!(state.tokens.default_ttl().as_secs(), 60);
    }
}
