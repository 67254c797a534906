// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory account store.
//!
//! Accounts are keyed by UUID with a secondary index on the normalized
//! email. Password hashing is bcrypt and runs on the blocking pool, outside
//! any store lock.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

use crate::auth::{Identity, Role};

/// Minimum password length in characters.
pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("an account with this email already exists")]
    EmailTaken,

    #[error("email address is invalid")]
    InvalidEmail,

    #[error("password must be at least {MIN_PASSWORD_LEN} characters")]
    WeakPassword,

    #[error("user not found")]
    NotFound,

    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("password hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn identity(&self) -> Identity {
        Identity::new(self.id.to_string(), self.role, self.email.clone())
    }
}

/// Input for [`UserStore::insert`]. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Default)]
pub struct UserStore {
    users: HashMap<Uuid, User>,
    by_email: HashMap<String, Uuid>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Insert an account. `email` is normalized here.
    pub fn insert(&mut self, new_user: NewUser) -> Result<User, StoreError> {
        let email = normalize_email(&new_user.email).ok_or(StoreError::InvalidEmail)?;
        if self.by_email.contains_key(&email) {
            return Err(StoreError::EmailTaken);
        }

        let user = User {
            id: Uuid::new_v4(),
            email: email.clone(),
            password_hash: new_user.password_hash,
            role: new_user.role,
            created_at: Utc::now(),
        };
        self.by_email.insert(email, user.id);
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    pub fn get(&self, id: &Uuid) -> Option<&User> {
        self.users.get(id)
    }

    pub fn find_by_email(&self, email: &str) -> Option<&User> {
        let email = normalize_email(email)?;
        self.by_email.get(&email).and_then(|id| self.users.get(id))
    }

    /// All accounts, oldest first.
    pub fn list(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.values().cloned().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.email.cmp(&b.email)));
        users
    }

    /// Change a role. Existing tokens keep the old role until they expire
    /// or the user logs in again.
    pub fn set_role(&mut self, id: &Uuid, role: Role) -> Result<User, StoreError> {
        let user = self.users.get_mut(id).ok_or(StoreError::NotFound)?;
        user.role = role;
        Ok(user.clone())
    }
}

/// NFKC, trim, lowercase. `None` unless the result looks like `local@domain`.
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized: String = email.trim().nfkc().collect::<String>().to_lowercase();
    let (local, domain) = normalized.split_once('@')?;
    if local.is_empty()
        || domain.is_empty()
        || domain.contains('@')
        || normalized.chars().any(char::is_whitespace)
    {
        return None;
    }
    Some(normalized)
}

pub fn validate_password(password: &str) -> Result<(), StoreError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(StoreError::WeakPassword);
    }
    Ok(())
}

/// Hash on the blocking pool; bcrypt is deliberately slow.
pub async fn hash_password(password: String, cost: u32) -> Result<String, StoreError> {
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;
    Ok(hash)
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, StoreError> {
    let valid = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await??;
    Ok(valid)
}
