//! Execution orchestrator
//!
//! Takes a whole submission, dispatches it to the registered runner for its
//! language and fans the test cases through one by one. Every raw outcome is
//! classified into a per-case result; only infrastructure failures propagate.
//!
//! Test cases run sequentially within a submission: resource accounting
//! stays simple, and the concurrency that matters in practice is across
//! submissions.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::models::{ExecutionResult, Submission};
use crate::runner::{CaseScope, LanguageRunner, RunnerRegistry};
use crate::verdict;

/// Orchestrates submission execution across language runners
#[derive(Default)]
pub struct Executor {
    registry: RunnerRegistry,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add support for a language
    pub fn register(&mut self, runner: Arc<dyn LanguageRunner>) {
        self.registry.register(runner);
    }

    /// Registered language tags, for startup logging
    pub fn languages(&self) -> Vec<String> {
        self.registry.languages()
    }

    /// Judge a submission: run every test case in order and aggregate.
    ///
    /// An unknown language comes back as a failed result, not an error.
    /// `Err` is reserved for infrastructure failures (and for cancellation
    /// through `shutdown`, which aborts the case in flight without a
    /// verdict). User failures never short-circuit the suite.
    pub async fn execute(
        &self,
        submission: &Submission,
        shutdown: &CancellationToken,
    ) -> Result<ExecutionResult> {
        let Some(runner) = self.registry.lookup(&submission.language) else {
            return Ok(unsupported_language(submission));
        };

        let mut result = ExecutionResult {
            success: true,
            test_results: Vec::with_capacity(submission.test_cases.len()),
            total_tests: submission.test_cases.len(),
            ..Default::default()
        };

        for (idx, case) in submission.test_cases.iter().enumerate() {
            let scope = CaseScope::new(shutdown, submission.time_limit);
            let output = runner
                .execute(&scope, &submission.code, &case.input)
                .await
                .with_context(|| format!("failed to execute test case {}", idx + 1))?;

            debug!(
                case = idx + 1,
                exit_code = output.exit_code,
                time_ms = output.time_ms,
                timed_out = output.timed_out,
                "test case finished"
            );

            let case_result = verdict::classify(
                case,
                &output,
                submission.time_limit,
                submission.memory_limit,
            );

            if case_result.passed {
                result.total_passed += 1;
            } else {
                result.success = false;
            }
            result.max_execution_ms = result.max_execution_ms.max(case_result.execution_time_ms);
            result.max_memory_kb = result.max_memory_kb.max(case_result.memory_used_kb);
            result.test_results.push(case_result);
        }

        info!(
            language = %submission.language,
            passed = result.total_passed,
            total = result.total_tests,
            max_time_ms = result.max_execution_ms,
            max_memory_kb = result.max_memory_kb,
            "submission judged"
        );

        Ok(result)
    }
}

fn unsupported_language(submission: &Submission) -> ExecutionResult {
    ExecutionResult {
        success: false,
        total_tests: submission.test_cases.len(),
        compile_error: Some(format!("unsupported language: {}", submission.language)),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExecutionOutput, TestCase};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed sequence of outcomes, one per test case
    struct ScriptedRunner {
        tag: &'static str,
        script: Mutex<VecDeque<Step>>,
    }

    enum Step {
        Output(ExecutionOutput),
        Infra(&'static str),
    }

    impl ScriptedRunner {
        fn new(tag: &'static str, steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                tag,
                script: Mutex::new(steps.into()),
            })
        }
    }

    #[async_trait]
    impl LanguageRunner for ScriptedRunner {
        fn language(&self) -> &str {
            self.tag
        }

        async fn execute(
            &self,
            _scope: &CaseScope,
            _code: &str,
            _stdin: &str,
        ) -> Result<ExecutionOutput> {
            match self.script.lock().unwrap().pop_front() {
                Some(Step::Output(output)) => Ok(output),
                Some(Step::Infra(msg)) => Err(anyhow::anyhow!(msg)),
                None => panic!("runner invoked more times than scripted"),
            }
        }
    }

    fn submission(cases: Vec<(&str, &str)>) -> Submission {
        Submission {
            code: "print(sum(map(int, input().split())))".to_string(),
            language: "python".to_string(),
            test_cases: cases
                .into_iter()
                .map(|(input, expected)| TestCase {
                    input: input.to_string(),
                    expected_output: expected.to_string(),
                })
                .collect(),
            time_limit: 2000,
            memory_limit: 128,
        }
    }

    fn clean(stdout: &str, time_ms: u64, memory_kb: u64) -> Step {
        Step::Output(ExecutionOutput {
            stdout: stdout.to_string(),
            time_ms,
            memory_kb,
            ..Default::default()
        })
    }

    fn executor_with(runner: Arc<ScriptedRunner>) -> Executor {
        let mut executor = Executor::new();
        executor.register(runner);
        executor
    }

    #[tokio::test]
    async fn test_single_passing_case() {
        let runner = ScriptedRunner::new("python", vec![clean("10\n", 25, 4096)]);
        let executor = executor_with(runner);

        let result = executor
            .execute(&submission(vec![("5 5", "10")]), &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.total_passed, 1);
        assert_eq!(result.total_tests, 1);
        assert!(result.test_results[0].passed);
        assert!(result.test_results[0].error.is_none());
        assert_eq!(result.max_execution_ms, 25);
        assert_eq!(result.max_memory_kb, 4096);
    }

    #[tokio::test]
    async fn test_wrong_answer() {
        let runner = ScriptedRunner::new("python", vec![clean("11\n", 10, 0)]);
        let executor = executor_with(runner);

        let result = executor
            .execute(&submission(vec![("5 5", "10")]), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.total_passed, 0);
        let case = &result.test_results[0];
        assert_eq!(case.error.as_deref(), Some("Output mismatch"));
        assert_eq!(case.actual_output, "11");
    }

    #[tokio::test]
    async fn test_mixed_suite_keeps_running_after_failure() {
        let runner = ScriptedRunner::new(
            "python",
            vec![
                clean("1\n", 30, 2000),
                clean("2\n", 45, 2500),
                clean("wrong\n", 12, 1800),
            ],
        );
        let executor = executor_with(runner);

        let result = executor
            .execute(
                &submission(vec![("", "1"), ("", "2"), ("", "3")]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.total_passed, 2);
        assert_eq!(result.total_tests, 3);
        assert_eq!(result.test_results.len(), 3);
        // No short-circuit: the failing case is last and was still reached
        assert!(!result.test_results[2].passed);
        assert_eq!(result.max_execution_ms, 45);
        assert_eq!(result.max_memory_kb, 2500);
    }

    #[tokio::test]
    async fn test_timeout_is_reported_as_tle() {
        let runner = ScriptedRunner::new(
            "python",
            vec![Step::Output(ExecutionOutput {
                timed_out: true,
                memory_exceeded: true,
                exit_code: 137,
                time_ms: 2100,
                ..Default::default()
            })],
        );
        let executor = executor_with(runner);

        let result = executor
            .execute(&submission(vec![("", "10")]), &CancellationToken::new())
            .await
            .unwrap();

        let error = result.test_results[0].error.as_deref().unwrap();
        assert!(error.starts_with("Time limit exceeded"));
    }

    #[tokio::test]
    async fn test_unsupported_language() {
        let executor = Executor::new();

        let mut submission = submission(vec![("5 5", "10")]);
        submission.language = "haskell".to_string();

        let result = executor
            .execute(&submission, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.total_passed, 0);
        assert_eq!(result.total_tests, 1);
        assert!(result.test_results.is_empty());
        assert_eq!(
            result.compile_error.as_deref(),
            Some("unsupported language: haskell")
        );
    }

    #[tokio::test]
    async fn test_infrastructure_error_propagates() {
        let runner = ScriptedRunner::new(
            "python",
            vec![
                clean("1\n", 5, 0),
                Step::Infra("container runtime failure: daemon unreachable"),
            ],
        );
        let executor = executor_with(runner);

        let error = executor
            .execute(
                &submission(vec![("", "1"), ("", "2")]),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(format!("{:#}", error).contains("daemon unreachable"));
    }

    #[tokio::test]
    async fn test_results_match_input_order_and_counts() {
        let runner = ScriptedRunner::new(
            "python",
            vec![clean("a\n", 1, 10), clean("b\n", 2, 20), clean("c\n", 3, 30)],
        );
        let executor = executor_with(runner);

        let result = executor
            .execute(
                &submission(vec![("x", "a"), ("y", "bad"), ("z", "c")]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.test_results.len(), result.total_tests);
        let passed = result.test_results.iter().filter(|t| t.passed).count();
        assert_eq!(passed, result.total_passed);
        assert_eq!(result.success, result.total_passed == result.total_tests);
        for (case, expected_input) in result.test_results.iter().zip(["x", "y", "z"]) {
            assert_eq!(case.input, expected_input);
            assert_eq!(case.passed, case.error.is_none());
        }
    }
}
