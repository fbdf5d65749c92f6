//! Solve ledger
//!
//! Idempotent bookkeeping that turns a passing verdict into exactly one
//! durable record per `(user, problem)` pair. Creation goes through the
//! store's atomic insert-if-absent, and an insert conflict means another
//! request won the first-solve race, so the loser falls back to the
//! update path instead of surfacing an error.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::store::{SolveRecord, Store, StoreError};

/// Default language recorded when a submission carries none.
pub const DEFAULT_LANGUAGE: &str = "javascript";

/// Input to `record_solve`. `problem_key` and `difficulty` are required
/// at the HTTP boundary; everything else is optional.
#[derive(Debug, Clone)]
pub struct SolveSubmission {
    pub user_id: String,
    pub problem_key: String,
    pub problem_slug: String,
    pub difficulty: String,
    pub session_ref: Option<String>,
    pub code: String,
    pub language: String,
}

/// Aggregate solve statistics for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SolveStats {
    pub total: usize,
    pub easy: usize,
    pub medium: usize,
    pub hard: usize,
}

/// Record a passing verdict.
///
/// Returns the stored record and whether it was created by this call.
/// Idempotent: solving the same problem N times converges to one record
/// holding the latest non-empty submission and the latest `solved_at`.
pub async fn record_solve(
    store: &dyn Store,
    submission: SolveSubmission,
) -> Result<(SolveRecord, bool), StoreError> {
    if let Some(record) = update_existing(store, &submission).await? {
        return Ok((record, false));
    }

    let now = Utc::now();
    let record = SolveRecord {
        user_id: submission.user_id.clone(),
        problem_key: submission.problem_key.clone(),
        problem_slug: submission.problem_slug.clone(),
        difficulty: submission.difficulty.to_lowercase(),
        session_ref: submission.session_ref.clone(),
        code: submission.code.clone(),
        language: if submission.language.is_empty() {
            DEFAULT_LANGUAGE.to_string()
        } else {
            submission.language.clone()
        },
        solved_at: now,
        created_at: now,
    };

    match store.insert_solve(&record).await {
        Ok(()) => {
            info!(
                "Recorded first solve: user={}, problem={}",
                record.user_id, record.problem_key
            );
            Ok((record, true))
        }
        Err(StoreError::Conflict) => {
            // Another request created the pair between our lookup and our
            // insert. The record exists now, so the update path must find it.
            debug!(
                "First-solve race for user={}, problem={}; retrying as update",
                submission.user_id, submission.problem_key
            );
            match update_existing(store, &submission).await? {
                Some(record) => Ok((record, false)),
                None => Err(StoreError::Conflict),
            }
        }
        Err(e) => Err(e),
    }
}

/// Repeat-solve path: refresh the existing record in place.
async fn update_existing(
    store: &dyn Store,
    submission: &SolveSubmission,
) -> Result<Option<SolveRecord>, StoreError> {
    let Some(mut record) = store
        .find_solve(&submission.user_id, &submission.problem_key)
        .await?
    else {
        return Ok(None);
    };

    if !submission.code.is_empty() {
        record.code = submission.code.clone();
    }
    if !submission.language.is_empty() {
        record.language = submission.language.clone();
    }
    record.solved_at = Utc::now();

    store.save_solve(&record).await?;
    Ok(Some(record))
}

/// Group a user's records by lowercased difficulty. Unrecognized
/// difficulty strings count toward `total` but no bucket.
pub async fn solve_stats(store: &dyn Store, user_id: &str) -> Result<SolveStats, StoreError> {
    let records = store.list_solves(user_id).await?;

    let mut stats = SolveStats {
        total: records.len(),
        easy: 0,
        medium: 0,
        hard: 0,
    };
    for record in &records {
        match record.difficulty.to_lowercase().as_str() {
            "easy" => stats.easy += 1,
            "medium" => stats.medium += 1,
            "hard" => stats.hard += 1,
            _ => {}
        }
    }
    Ok(stats)
}

/// The user's solve records, newest first.
pub async fn solved_problems(
    store: &dyn Store,
    user_id: &str,
) -> Result<Vec<SolveRecord>, StoreError> {
    let mut records = store.list_solves(user_id).await?;
    records.sort_by(|a, b| b.solved_at.cmp(&a.solved_at));
    Ok(records)
}
