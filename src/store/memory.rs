//! In-memory store for tests
//!
//! Enforces the same uniqueness constraints as the Redis store and keeps
//! a write counter so tests can assert minimal-write behavior. Lookup and
//! insert yield to the scheduler before touching state, so concurrent
//! callers interleave between their read and their write the way they
//! would against a real backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{IdentityRecord, SolveRecord, Store, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    solves: Mutex<HashMap<(String, String), SolveRecord>>,
    users: Mutex<HashMap<String, IdentityRecord>>,
    emails: Mutex<HashMap<String, String>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of insert/save operations performed so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Seed a solve record directly, bypassing the ledger.
    pub fn seed_solve(&self, record: SolveRecord) {
        self.solves.lock().unwrap().insert(
            (record.user_id.clone(), record.problem_key.clone()),
            record,
        );
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_solve(
        &self,
        user_id: &str,
        problem_key: &str,
    ) -> Result<Option<SolveRecord>, StoreError> {
        tokio::task::yield_now().await;
        let solves = self.solves.lock().unwrap();
        Ok(solves
            .get(&(user_id.to_string(), problem_key.to_string()))
            .cloned())
    }

    async fn insert_solve(&self, record: &SolveRecord) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        let mut solves = self.solves.lock().unwrap();
        let key = (record.user_id.clone(), record.problem_key.clone());
        if solves.contains_key(&key) {
            return Err(StoreError::Conflict);
        }
        solves.insert(key, record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn save_solve(&self, record: &SolveRecord) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        let mut solves = self.solves.lock().unwrap();
        solves.insert(
            (record.user_id.clone(), record.problem_key.clone()),
            record.clone(),
        );
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_solves(&self, user_id: &str) -> Result<Vec<SolveRecord>, StoreError> {
        let solves = self.solves.lock().unwrap();
        Ok(solves
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_user(&self, external_id: &str) -> Result<Option<IdentityRecord>, StoreError> {
        tokio::task::yield_now().await;
        let users = self.users.lock().unwrap();
        Ok(users.get(external_id).cloned())
    }

    async fn insert_user(&self, record: &IdentityRecord) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        // Check and insert under one lock acquisition so the constraint
        // holds even on a multi-threaded runtime.
        let mut users = self.users.lock().unwrap();
        let mut emails = self.emails.lock().unwrap();
        if users.contains_key(&record.external_id) {
            return Err(StoreError::Conflict);
        }
        if let Some(holder) = emails.get(&record.email) {
            if holder != &record.external_id {
                return Err(StoreError::Conflict);
            }
        }
        users.insert(record.external_id.clone(), record.clone());
        emails.insert(record.email.clone(), record.external_id.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn save_user(&self, record: &IdentityRecord) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        let mut users = self.users.lock().unwrap();
        let mut emails = self.emails.lock().unwrap();
        // An address held by another account rejects the save untouched.
        if let Some(holder) = emails.get(&record.email) {
            if holder != &record.external_id {
                return Err(StoreError::Conflict);
            }
        }
        let previous = users.insert(record.external_id.clone(), record.clone());
        if let Some(prev) = previous {
            if prev.email != record.email {
                emails.remove(&prev.email);
            }
        }
        emails.insert(record.email.clone(), record.external_id.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(external_id: &str, email: &str) -> IdentityRecord {
        IdentityRecord {
            external_id: external_id.into(),
            first_name: "Ada".into(),
            last_name: "".into(),
            display_name: "Ada".into(),
            email: email.into(),
            avatar_url: "".into(),
            role: Default::default(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_external_id_insert_conflicts() {
        let store = MemoryStore::new();
        store.insert_user(&user("ext_1", "a@x.com")).await.unwrap();
        assert!(matches!(
            store.insert_user(&user("ext_1", "b@x.com")).await,
            Err(StoreError::Conflict)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_email_insert_conflicts() {
        let store = MemoryStore::new();
        store.insert_user(&user("ext_1", "a@x.com")).await.unwrap();
        assert!(matches!(
            store.insert_user(&user("ext_2", "a@x.com")).await,
            Err(StoreError::Conflict)
        ));
        assert!(store.find_user("ext_2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_user_rejects_anothers_email() {
        let store = MemoryStore::new();
        store.insert_user(&user("ext_1", "a@x.com")).await.unwrap();
        store.insert_user(&user("ext_2", "b@x.com")).await.unwrap();

        assert!(matches!(
            store.save_user(&user("ext_2", "a@x.com")).await,
            Err(StoreError::Conflict)
        ));

        // Nothing written: ext_2 keeps its own address, ext_1 keeps its claim.
        let kept = store.find_user("ext_2").await.unwrap().unwrap();
        assert_eq!(kept.email, "b@x.com");
        assert_eq!(store.find_user("ext_1").await.unwrap().unwrap().email, "a@x.com");
    }

    #[tokio::test]
    async fn test_save_user_moves_own_email_claim() {
        let store = MemoryStore::new();
        store.insert_user(&user("ext_1", "a@x.com")).await.unwrap();
        store.save_user(&user("ext_1", "new@x.com")).await.unwrap();

        // The old address is released and claimable again.
        store.insert_user(&user("ext_2", "a@x.com")).await.unwrap();
        assert_eq!(store.find_user("ext_1").await.unwrap().unwrap().email, "new@x.com");
    }
}
