//! Output normalisation and verdict classification
//!
//! Maps the raw outcome of a sandboxed run onto a test case verdict. The
//! checks run in a fixed order: resource verdicts shadow whatever the program
//! printed, a non-clean exit shadows output comparison, and only a clean run
//! reaches the comparator.

use crate::models::{ExecutionOutput, TestCase, TestCaseResult};

/// Canonicalise program output for comparison.
///
/// Converts CRLF line endings to LF and strips leading/trailing whitespace of
/// the whole string. Interior whitespace is untouched and stays significant.
pub fn normalize_output(output: &str) -> String {
    output.replace("\r\n", "\n").trim().to_string()
}

/// Classify one execution outcome against its test case.
///
/// Precedence, first match wins:
/// 1. timed out
/// 2. memory exceeded
/// 3. non-zero exit or anything on stderr
/// 4. normalised output equality
/// 5. output mismatch
///
/// A run that blew both the deadline and the memory cap is reported as time
/// limit exceeded.
pub fn classify(
    case: &TestCase,
    output: &ExecutionOutput,
    time_limit_ms: u64,
    memory_limit_mb: u64,
) -> TestCaseResult {
    let mut result = TestCaseResult {
        passed: false,
        input: case.input.clone(),
        expected_output: case.expected_output.clone(),
        actual_output: String::new(),
        execution_time_ms: output.time_ms,
        memory_used_kb: output.memory_kb,
        error: None,
    };

    if output.timed_out {
        result.error = Some(format!("Time limit exceeded ({}ms)", time_limit_ms));
        result.actual_output = output.stdout.clone();
        return result;
    }

    if output.memory_exceeded {
        result.error = Some(format!("Memory limit exceeded ({}MB)", memory_limit_mb));
        result.actual_output = output.stdout.clone();
        return result;
    }

    // Anything on stderr counts as a runtime error even on a clean exit;
    // runner images are expected to keep benign warnings out of stderr.
    if output.exit_code != 0 || !output.stderr.is_empty() {
        result.error = Some(format!("Runtime error: {}", output.stderr));
        result.actual_output = output.stdout.clone();
        return result;
    }

    result.actual_output = normalize_output(&output.stdout);
    if result.actual_output == normalize_output(&case.expected_output) {
        result.passed = true;
    } else {
        result.error = Some("Output mismatch".to_string());
    }

    result
}
