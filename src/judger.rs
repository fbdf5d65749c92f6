//! Judging orchestration
//!
//! Runs a submission through the external sandbox and compares its
//! output against the expected output for the chosen language. Pure
//! orchestration: the only side effect is the executor call itself, and
//! an execution failure is never conflated with a wrong answer.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::checker::outputs_match;
use crate::executor::CodeExecutor;

/// Verdict from judging a submission.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Output matched the expected output.
    Passed,
    /// Program ran cleanly but output did not match.
    Failed,
    /// The program or the sandbox itself failed; no comparison was made.
    ExecutionError,
    /// No expected output is recorded for this language; neither pass nor fail.
    Inconclusive,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Passed => "passed",
            Verdict::Failed => "failed",
            Verdict::ExecutionError => "execution_error",
            Verdict::Inconclusive => "inconclusive",
        };
        write!(f, "{}", s)
    }
}

/// Result of judging one submission.
#[derive(Debug, Clone)]
pub struct JudgeOutcome {
    pub verdict: Verdict,
    pub output: String,
    pub error: Option<String>,
}

impl JudgeOutcome {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }
}

/// Judge a submission.
///
/// Executor transport failures and non-zero program exits both yield
/// `ExecutionError`; a missing expected output for `language` yields
/// `Inconclusive`. Only a clean run with a recorded expected output
/// produces a pass/fail verdict.
pub async fn judge(
    executor: &dyn CodeExecutor,
    language: &str,
    code: &str,
    expected_output_by_language: &HashMap<String, String>,
) -> JudgeOutcome {
    let outcome = match executor.execute(language, code).await {
        Ok(outcome) => outcome,
        Err(e) => {
            return JudgeOutcome {
                verdict: Verdict::ExecutionError,
                output: String::new(),
                error: Some(e.to_string()),
            };
        }
    };

    if !outcome.success {
        return JudgeOutcome {
            verdict: Verdict::ExecutionError,
            output: outcome.output,
            error: outcome.error_detail,
        };
    }

    let Some(expected) = expected_output_by_language.get(language) else {
        return JudgeOutcome {
            verdict: Verdict::Inconclusive,
            output: outcome.output,
            error: Some(format!("no expected output recorded for {}", language)),
        };
    };

    let verdict = if outputs_match(&outcome.output, expected) {
        Verdict::Passed
    } else {
        Verdict::Failed
    };

    info!("Judged submission: language={}, verdict={}", language, verdict);

    JudgeOutcome {
        verdict,
        output: outcome.output,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ExecutionOutcome, ExecutorError};
    use async_trait::async_trait;

    /// Stub executor returning a canned response.
    struct StubExecutor {
        response: Result<ExecutionOutcome, String>,
    }

    impl StubExecutor {
        fn ok(output: &str) -> Self {
            Self {
                response: Ok(ExecutionOutcome {
                    success: true,
                    output: output.to_string(),
                    error_detail: None,
                }),
            }
        }

        fn crashed(detail: &str) -> Self {
            Self {
                response: Ok(ExecutionOutcome {
                    success: false,
                    output: String::new(),
                    error_detail: Some(detail.to_string()),
                }),
            }
        }

        fn unreachable() -> Self {
            Self {
                response: Err("connection refused".to_string()),
            }
        }
    }

    #[async_trait]
    impl CodeExecutor for StubExecutor {
        async fn execute(
            &self,
            _language: &str,
            _code: &str,
        ) -> Result<ExecutionOutcome, ExecutorError> {
            match &self.response {
                Ok(outcome) => Ok(outcome.clone()),
                Err(msg) => Err(ExecutorError::Transport(msg.clone())),
            }
        }
    }

    fn expected(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_matching_output_passes() {
        let executor = StubExecutor::ok("  [0,   1]\n");
        let outcome = judge(&executor, "javascript", "...", &expected(&[("javascript", "[0, 1]")]))
            .await;
        assert_eq!(outcome.verdict, Verdict::Passed);
        assert!(outcome.passed());
    }

    #[tokio::test]
    async fn test_mismatched_output_fails() {
        let executor = StubExecutor::ok("[1, 0]");
        let outcome = judge(&executor, "javascript", "...", &expected(&[("javascript", "[0, 1]")]))
            .await;
        assert_eq!(outcome.verdict, Verdict::Failed);
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn test_transport_failure_is_execution_error() {
        let executor = StubExecutor::unreachable();
        let outcome = judge(&executor, "javascript", "...", &expected(&[("javascript", "[0, 1]")]))
            .await;
        assert_eq!(outcome.verdict, Verdict::ExecutionError);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_execution_error_not_failure() {
        let executor = StubExecutor::crashed("TypeError: undefined is not a function");
        let outcome = judge(&executor, "javascript", "...", &expected(&[("javascript", "[0, 1]")]))
            .await;
        assert_eq!(outcome.verdict, Verdict::ExecutionError);
        assert_eq!(
            outcome.error.as_deref(),
            Some("TypeError: undefined is not a function")
        );
    }

    #[tokio::test]
    async fn test_missing_expected_output_is_inconclusive() {
        let executor = StubExecutor::ok("[0, 1]");
        let outcome =
            judge(&executor, "ruby", "...", &expected(&[("javascript", "[0, 1]")])).await;
        assert_eq!(outcome.verdict, Verdict::Inconclusive);
    }
}
