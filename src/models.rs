//! Submission and result types
//!
//! These are the caller-facing wire types: a `Submission` comes in as JSON,
//! an `ExecutionResult` goes back out. `ExecutionOutput` is the raw outcome
//! of one sandboxed run and never crosses the wire.

use serde::{Deserialize, Serialize};

/// Default per-test-case time limit in milliseconds
pub const DEFAULT_TIME_LIMIT_MS: u64 = 5000;
/// Default memory limit in MB
pub const DEFAULT_MEMORY_LIMIT_MB: u64 = 256;

/// A code submission to be judged
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    /// Source code as submitted
    pub code: String,
    /// Language tag (e.g. "python")
    pub language: String,
    pub test_cases: Vec<TestCase>,
    /// Per-test-case time limit in ms (0 or absent means default)
    #[serde(default)]
    pub time_limit: u64,
    /// Memory limit in MB (0 or absent means default)
    #[serde(default)]
    pub memory_limit: u64,
}

impl Submission {
    /// Replace missing or zero limits with the defaults
    pub fn apply_default_limits(&mut self) {
        if self.time_limit == 0 {
            self.time_limit = DEFAULT_TIME_LIMIT_MS;
        }
        if self.memory_limit == 0 {
            self.memory_limit = DEFAULT_MEMORY_LIMIT_MB;
        }
    }
}

/// A single test case: stdin content and the output we expect back
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
}

/// Raw outcome of one sandboxed run, before any verdict interpretation
#[derive(Debug, Clone, Default)]
pub struct ExecutionOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code of the process (0 on clean exit)
    pub exit_code: i32,
    /// Wall clock time from just before spawn to just after reap
    pub time_ms: u64,
    /// Peak resident set size observed by the monitor (0 if unavailable)
    pub memory_kb: u64,
    /// Execution was stopped because the deadline fired
    pub timed_out: bool,
    /// Memory cap was hit (monitor sample or kernel kill)
    pub memory_exceeded: bool,
}

/// Classified result of one test case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub passed: bool,
    pub input: String,
    pub expected_output: String,
    pub actual_output: String,
    /// Wall clock time in ms
    #[serde(rename = "execution_time")]
    pub execution_time_ms: u64,
    /// Peak memory in KB
    #[serde(rename = "memory_used")]
    pub memory_used_kb: u64,
    /// Diagnostic message; present exactly when the case did not pass
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated result of judging a whole submission
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// True iff every test case passed
    pub success: bool,
    pub test_results: Vec<TestCaseResult>,
    pub total_passed: usize,
    pub total_tests: usize,
    /// Submission-level failure before any case ran (bad language, compile)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_error: Option<String>,
    pub max_execution_ms: u64,
    pub max_memory_kb: u64,
}
