//! Container-backed language runner
//!
//! One runner instance per language, driven by its [`LanguageSpec`]: write
//! the source under the language's conventional filename into a fresh
//! scratch directory, make sure the executor image exists (once, serialised),
//! optionally compile, then hand over to the sandbox. The scratch directory
//! is removed on every exit path when the `TempDir` guard drops.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use super::{CaseScope, LanguageRunner};
use crate::config::WorkerConfig;
use crate::languages::LanguageSpec;
use crate::models::ExecutionOutput;
use crate::sandbox::{RunSpec, Sandbox};

/// Runs code for one language in sandboxed containers
pub struct ContainerRunner {
    spec: LanguageSpec,
    sandbox: Sandbox,
    work_dir: PathBuf,
    /// Memory cap for the program under test, in MB
    memory_limit_mb: u64,
    compile_time_limit: Duration,
    compile_memory_limit_mb: u64,
    /// Serialises the first-use image check across concurrent executions
    image_ready: OnceCell<()>,
}

impl ContainerRunner {
    pub fn new(spec: LanguageSpec, config: &WorkerConfig, memory_limit_mb: u64) -> Self {
        Self {
            sandbox: Sandbox::new(config),
            work_dir: config.work_dir.clone(),
            memory_limit_mb,
            compile_time_limit: Duration::from_millis(config.compile_time_limit_ms),
            compile_memory_limit_mb: config.compile_memory_limit_mb,
            spec,
            image_ready: OnceCell::new(),
        }
    }

    /// Verify or build the executor image, at most once per runner instance
    async fn ensure_image(&self) -> Result<()> {
        let image = self.spec.image();
        self.image_ready
            .get_or_try_init(|| self.sandbox.ensure_image(&image, &self.spec.recipe))
            .await?;
        Ok(())
    }

    /// Compile inside the sandbox. `None` means success; `Some` carries the
    /// compile diagnostics as the run's final output.
    async fn compile(
        &self,
        scope: &CaseScope,
        scratch_dir: &Path,
        argv: &[String],
    ) -> Result<Option<ExecutionOutput>> {
        debug!(language = %self.spec.name, "compiling with {:?}", argv);

        let image = self.spec.image();
        let outcome = self
            .sandbox
            .run(RunSpec {
                image: &image,
                argv,
                stdin: "",
                scratch_dir,
                time_limit: self.compile_time_limit,
                memory_limit_mb: self.compile_memory_limit_mb,
                cancel: scope.token(),
            })
            .await?;

        Ok(compile_failure(outcome))
    }
}

#[async_trait]
impl LanguageRunner for ContainerRunner {
    fn language(&self) -> &str {
        &self.spec.name
    }

    async fn execute(
        &self,
        scope: &CaseScope,
        code: &str,
        stdin: &str,
    ) -> Result<ExecutionOutput> {
        self.ensure_image().await?;

        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .with_context(|| format!("failed to create work root {}", self.work_dir.display()))?;
        let scratch = tempfile::Builder::new()
            .prefix("exec-")
            .tempdir_in(&self.work_dir)
            .context("failed to create scratch directory")?;

        let source_path = scratch.path().join(&self.spec.source_file);
        tokio::fs::write(&source_path, code)
            .await
            .with_context(|| format!("failed to write source file {}", source_path.display()))?;

        if let Some(compile_argv) = &self.spec.compile_command {
            if let Some(diagnostics) = self.compile(scope, scratch.path(), compile_argv).await? {
                return Ok(diagnostics);
            }
        }

        let image = self.spec.image();
        self.sandbox
            .run(RunSpec {
                image: &image,
                argv: &self.spec.run_command,
                stdin,
                scratch_dir: scratch.path(),
                time_limit: scope.time_limit(),
                memory_limit_mb: self.memory_limit_mb,
                cancel: scope.token(),
            })
            .await
    }
}

/// Map a failed compile outcome to pure compiler diagnostics.
///
/// The program never ran, so the resource flags from the compile container
/// must not leak into the verdict: the result carries a non-zero exit code
/// and the diagnostics on stderr, nothing else.
fn compile_failure(outcome: ExecutionOutput) -> Option<ExecutionOutput> {
    if outcome.exit_code == 0 && !outcome.timed_out && !outcome.memory_exceeded {
        return None;
    }

    let stderr = if !outcome.stderr.is_empty() {
        outcome.stderr
    } else if outcome.timed_out {
        "compilation timed out".to_string()
    } else if outcome.memory_exceeded {
        "compiler exceeded the memory limit".to_string()
    } else if !outcome.stdout.is_empty() {
        outcome.stdout
    } else {
        format!("compiler exited with code {}", outcome.exit_code)
    };

    Some(ExecutionOutput {
        stdout: String::new(),
        stderr,
        exit_code: if outcome.exit_code != 0 {
            outcome.exit_code
        } else {
            1
        },
        ..Default::default()
    })
}
