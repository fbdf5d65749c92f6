//! External code-execution sandbox client
//!
//! The sandbox is a black box reached over a Redis job queue: we RPUSH a
//! run job onto the queue and BLPOP the per-run result key the worker
//! pushes its result to. The worker's compile/run machinery is entirely
//! its own concern; from here it is `(language, code) -> outcome`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Outcome of running a submission in the sandbox.
///
/// `success` means the program compiled (if applicable) and exited with
/// status zero. A false `success` is an execution failure, which is
/// distinct from "tests failed" downstream.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub output: String,
    pub error_detail: Option<String>,
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The sandbox could not be reached or did not answer in time.
    #[error("execution service unavailable: {0}")]
    Transport(String),
}

#[async_trait]
pub trait CodeExecutor: Send + Sync {
    async fn execute(&self, language: &str, code: &str) -> Result<ExecutionOutcome, ExecutorError>;
}

/// Job pushed onto the execution queue.
#[derive(Debug, Serialize)]
struct RunJob<'a> {
    job_type: &'static str,
    run_id: String,
    language: &'a str,
    code: &'a str,
    result_key: String,
}

/// Result the sandbox worker pushes back onto `result_key`.
#[derive(Debug, Deserialize)]
struct RunResult {
    success: bool,
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
    #[serde(default)]
    exit_code: i32,
}

const RESULT_KEY_PREFIX: &str = "exec:result:";

static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Sandbox client speaking the Redis queue protocol.
pub struct QueueExecutor {
    conn: MultiplexedConnection,
    queue: String,
    timeout_secs: u64,
}

impl QueueExecutor {
    pub fn new(conn: MultiplexedConnection, queue: String, timeout_secs: u64) -> Self {
        Self {
            conn,
            queue,
            timeout_secs,
        }
    }

    fn next_run_id() -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let seq = RUN_COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", nanos, seq)
    }
}

#[async_trait]
impl CodeExecutor for QueueExecutor {
    async fn execute(&self, language: &str, code: &str) -> Result<ExecutionOutcome, ExecutorError> {
        let run_id = Self::next_run_id();
        let result_key = format!("{}{}", RESULT_KEY_PREFIX, run_id);

        let job = RunJob {
            job_type: "run",
            run_id: run_id.clone(),
            language,
            code,
            result_key: result_key.clone(),
        };
        let job_json =
            serde_json::to_string(&job).map_err(|e| ExecutorError::Transport(e.to_string()))?;

        let mut conn = self.conn.clone();

        conn.rpush::<_, _, ()>(&self.queue, &job_json)
            .await
            .map_err(|e| {
                warn!("Failed to enqueue run job {}: {}", run_id, e);
                ExecutorError::Transport(e.to_string())
            })?;

        info!("Enqueued run job: run_id={}, language={}", run_id, language);

        // Bounded wait for the worker's result; None means the wait timed out.
        let popped: Option<(String, String)> = conn
            .blpop(&result_key, self.timeout_secs as f64)
            .await
            .map_err(|e| {
                warn!("Failed to collect run result {}: {}", run_id, e);
                ExecutorError::Transport(e.to_string())
            })?;

        let (_, payload) = popped.ok_or_else(|| {
            warn!(
                "Run job {} produced no result within {}s",
                run_id, self.timeout_secs
            );
            ExecutorError::Transport(format!(
                "no result from execution sandbox within {}s",
                self.timeout_secs
            ))
        })?;

        let result: RunResult = serde_json::from_str(&payload)
            .map_err(|e| ExecutorError::Transport(format!("malformed sandbox result: {}", e)))?;

        let error_detail = if result.success {
            None
        } else if !result.stderr.is_empty() {
            Some(result.stderr)
        } else {
            Some(format!("program exited with status {}", result.exit_code))
        };

        Ok(ExecutionOutcome {
            success: result.success,
            output: result.stdout,
            error_detail,
        })
    }
}
