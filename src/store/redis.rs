//! Redis-backed store
//!
//! Records are JSON documents under deterministic keys. Insert-if-absent
//! is `SET NX`, which is what makes the uniqueness constraints hold under
//! concurrent writers without any in-process locking: the first writer's
//! SET claims the key, every other writer observes the claim as a
//! `Conflict`.
//!
//! Key layout:
//! - `solve:{user_id}:{problem_key}`   solve record document
//! - `solveindex:{user_id}`            set of the user's problem keys
//! - `user:{external_id}`              identity record document
//! - `useremail:{email}`               email uniqueness index -> external_id

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use super::{IdentityRecord, SolveRecord, Store, StoreError};

fn solve_key(user_id: &str, problem_key: &str) -> String {
    format!("solve:{}:{}", user_id, problem_key)
}

fn solve_index_key(user_id: &str) -> String {
    format!("solveindex:{}", user_id)
}

fn user_key(external_id: &str) -> String {
    format!("user:{}", external_id)
}

fn email_key(email: &str) -> String {
    format!("useremail:{}", email)
}

#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    /// SET NX: returns Ok(()) when the key was claimed, Conflict when it
    /// was already held.
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let claimed: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .query_async(&mut conn)
            .await?;

        if claimed.is_some() {
            Ok(())
        } else {
            Err(StoreError::Conflict)
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn find_solve(
        &self,
        user_id: &str,
        problem_key: &str,
    ) -> Result<Option<SolveRecord>, StoreError> {
        self.get_json(&solve_key(user_id, problem_key)).await
    }

    async fn insert_solve(&self, record: &SolveRecord) -> Result<(), StoreError> {
        let key = solve_key(&record.user_id, &record.problem_key);
        let json = serde_json::to_string(record)?;

        self.set_if_absent(&key, &json).await?;

        // Index entry for listing. Written after the claim succeeds, so a
        // conflict never leaves a dangling index member.
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(solve_index_key(&record.user_id), &record.problem_key)
            .await?;
        Ok(())
    }

    async fn save_solve(&self, record: &SolveRecord) -> Result<(), StoreError> {
        let key = solve_key(&record.user_id, &record.problem_key);
        let json = serde_json::to_string(record)?;

        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(&key, &json).await?;
        conn.sadd::<_, _, ()>(solve_index_key(&record.user_id), &record.problem_key)
            .await?;
        Ok(())
    }

    async fn list_solves(&self, user_id: &str) -> Result<Vec<SolveRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let problem_keys: Vec<String> = conn.smembers(solve_index_key(user_id)).await?;

        let mut records = Vec::with_capacity(problem_keys.len());
        for problem_key in &problem_keys {
            if let Some(record) = self.find_solve(user_id, problem_key).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn find_user(&self, external_id: &str) -> Result<Option<IdentityRecord>, StoreError> {
        self.get_json(&user_key(external_id)).await
    }

    async fn insert_user(&self, record: &IdentityRecord) -> Result<(), StoreError> {
        let key = user_key(&record.external_id);
        let json = serde_json::to_string(record)?;

        self.set_if_absent(&key, &json).await?;

        // Claim the email uniqueness index. If another account already
        // holds this address, roll the insert back and report the conflict.
        match self
            .set_if_absent(&email_key(&record.email), &record.external_id)
            .await
        {
            Ok(()) => Ok(()),
            Err(StoreError::Conflict) => {
                let mut conn = self.conn.clone();
                let holder: Option<String> = conn.get(email_key(&record.email)).await?;
                if holder.as_deref() == Some(record.external_id.as_str()) {
                    return Ok(());
                }
                conn.del::<_, ()>(&key).await?;
                Err(StoreError::Conflict)
            }
            Err(e) => Err(e),
        }
    }

    async fn save_user(&self, record: &IdentityRecord) -> Result<(), StoreError> {
        let key = user_key(&record.external_id);
        let previous: Option<IdentityRecord> = self.get_json(&key).await?;

        // When the address changes, claim the new index entry before
        // touching the record. A claim held by another account rejects
        // the whole save with nothing written.
        let email_changed = previous
            .as_ref()
            .map(|prev| prev.email != record.email)
            .unwrap_or(true);
        if email_changed {
            match self
                .set_if_absent(&email_key(&record.email), &record.external_id)
                .await
            {
                Ok(()) => {}
                Err(StoreError::Conflict) => {
                    let mut conn = self.conn.clone();
                    let holder: Option<String> = conn.get(email_key(&record.email)).await?;
                    if holder.as_deref() != Some(record.external_id.as_str()) {
                        return Err(StoreError::Conflict);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        let json = serde_json::to_string(record)?;
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(&key, &json).await?;

        if let Some(prev) = previous {
            if prev.email != record.email {
                conn.del::<_, ()>(email_key(&prev.email)).await?;
            }
        }
        Ok(())
    }
}
