//! Standalone execution worker
//!
//! Reads a submission from a JSON file, judges it and writes `result.json`
//! next to the input, with a human summary on stdout. Exits 0 whenever a
//! verdict was produced (even a failing one); a non-zero exit means the
//! infrastructure itself failed.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use code_judge::config::WorkerConfig;
use code_judge::executor::Executor;
use code_judge::languages;
use code_judge::models::{ExecutionResult, Submission};
use code_judge::runner::ContainerRunner;

/// Judge one code submission against its test cases
#[derive(Debug, Parser)]
#[command(name = "worker", version)]
struct CliArgs {
    /// Path to the submission JSON file
    submission: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,code_judge=info")),
        )
        .init();

    let args = CliArgs::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("worker failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: CliArgs) -> Result<()> {
    let data = tokio::fs::read_to_string(&args.submission)
        .await
        .with_context(|| {
            format!(
                "failed to read submission file {}",
                args.submission.display()
            )
        })?;
    let mut submission: Submission =
        serde_json::from_str(&data).context("failed to parse submission")?;
    submission.apply_default_limits();

    let config = WorkerConfig::from_env();

    let mut executor = Executor::new();
    for spec in languages::builtin()? {
        executor.register(Arc::new(ContainerRunner::new(
            spec,
            &config,
            submission.memory_limit,
        )));
    }

    info!(
        language = %submission.language,
        test_cases = submission.test_cases.len(),
        time_limit_ms = submission.time_limit,
        memory_limit_mb = submission.memory_limit,
        supported = ?executor.languages(),
        "executing submission"
    );

    // Ctrl-C aborts the case in flight; no verdict is produced for it.
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, aborting execution");
                shutdown.cancel();
            }
        }
    });

    let result = executor.execute(&submission, &shutdown).await?;

    print_summary(&result);

    let output_path = args.submission.with_file_name("result.json");
    let json = serde_json::to_string_pretty(&result).context("failed to serialise result")?;
    match tokio::fs::write(&output_path, json).await {
        Ok(()) => info!("results written to {}", output_path.display()),
        // The verdict was produced and printed; a lost file is only a warning.
        Err(e) => warn!(
            "failed to write result file {}: {}",
            output_path.display(),
            e
        ),
    }

    Ok(())
}

fn print_summary(result: &ExecutionResult) {
    println!("=== EXECUTION RESULTS ===");
    println!("Success: {}", result.success);
    println!("Tests passed: {}/{}", result.total_passed, result.total_tests);
    println!("Max execution time: {}ms", result.max_execution_ms);
    println!("Max memory used: {}KB", result.max_memory_kb);

    if let Some(error) = &result.compile_error {
        println!("Compile error: {}", error);
    }
    if let Some(error) = &result.runtime_error {
        println!("Runtime error: {}", error);
    }

    for (i, case) in result.test_results.iter().enumerate() {
        println!();
        println!("--- Test case {} ---", i + 1);
        println!("Input: {}", case.input);
        println!("Expected: {}", case.expected_output);
        println!("Actual: {}", case.actual_output);
        println!("Passed: {}", case.passed);
        println!("Time: {}ms", case.execution_time_ms);
        println!("Memory: {}KB", case.memory_used_kb);
        if let Some(error) = &case.error {
            println!("Error: {}", error);
        }
    }
}
