//! Persistence boundary
//!
//! Owns the two durable record types and the `Store` trait the core
//! components go through. Uniqueness is a property of the storage layer
//! (atomic insert-if-absent), and a violated constraint surfaces as
//! `StoreError::Conflict`, distinct from any other write failure, so
//! callers can treat the duplicate-insert race as benign.

pub mod redis;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Local role, owned by this system. Never overwritten by identity sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    #[default]
    Participant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Host => "host",
            Role::Participant => "participant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "host" => Some(Role::Host),
            "participant" => Some(Role::Participant),
            _ => None,
        }
    }
}

/// Durable evidence that a user's submission passed for a problem.
///
/// At most one record exists per `(user_id, problem_key)` pair. Repeat
/// solves mutate the record in place; `code`/`language` hold the last
/// winning submission, not a version history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveRecord {
    pub user_id: String,
    pub problem_key: String,
    /// Canonical slug; empty for legacy records.
    #[serde(default)]
    pub problem_slug: String,
    /// Stored lowercased. Unrecognized values are carried but excluded
    /// from the easy/medium/hard stat buckets.
    pub difficulty: String,
    /// Weak reference to a collaborative session, if any.
    #[serde(default)]
    pub session_ref: Option<String>,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub language: String,
    pub solved_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Local mirror of an identity-provider account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    /// Provider key; immutable once set, unique.
    pub external_id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub display_name: String,
    pub email: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint was violated on insert.
    #[error("record already exists")]
    Conflict,
    #[error("storage backend error: {0}")]
    Backend(#[from] ::redis::RedisError),
    #[error("corrupt stored record: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Storage operations the core components depend on.
///
/// `insert_*` are atomic insert-if-absent primitives: they either create
/// the record or fail with `Conflict`, never silently overwrite. `save_*`
/// overwrite an existing record (last writer wins), except that
/// `save_user` fails with `Conflict` and writes nothing when the record's
/// email is already held by another account.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_solve(
        &self,
        user_id: &str,
        problem_key: &str,
    ) -> Result<Option<SolveRecord>, StoreError>;

    async fn insert_solve(&self, record: &SolveRecord) -> Result<(), StoreError>;

    async fn save_solve(&self, record: &SolveRecord) -> Result<(), StoreError>;

    async fn list_solves(&self, user_id: &str) -> Result<Vec<SolveRecord>, StoreError>;

    async fn find_user(&self, external_id: &str) -> Result<Option<IdentityRecord>, StoreError>;

    async fn insert_user(&self, record: &IdentityRecord) -> Result<(), StoreError>;

    async fn save_user(&self, record: &IdentityRecord) -> Result<(), StoreError>;
}
