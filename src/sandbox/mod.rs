//! Container sandbox driver
//!
//! Launches one isolated container per execution through the OCI runtime CLI
//! and turns the outcome into a raw [`ExecutionOutput`]. Enforced per run: a
//! fresh scratch directory bind-mounted as the only writable path, no
//! network, a hard memory cap, a CPU quota and a process-count cap. The
//! container gets a fresh collision-resistant name so it can be killed by
//! name on every cancellation path even if the client handle is lost.
//!
//! Failures of the runtime itself (daemon unreachable, image missing) are
//! reported as errors, never as an `ExecutionOutput`.

pub mod monitor;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::models::ExecutionOutput;
use monitor::ResourceMonitor;

/// Exit code reported by the runtime when the kernel delivers SIGKILL,
/// in practice the memory cgroup killing the process.
const SIGKILL_EXIT_CODE: i32 = 137;

/// Grace period for the runtime client to exit after a kill-by-name
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Mount point of the scratch directory inside the container
const CONTAINER_WORKSPACE: &str = "/workspace";

/// stderr fragments that identify a failure of the container runtime rather
/// than of the program under test
const RUNTIME_FAILURE_PATTERNS: &[&str] = &[
    "Cannot connect to the Docker daemon",
    "Error response from daemon",
    "Unable to find image",
    "error during connect",
];

/// Everything needed for one sandboxed run
#[derive(Debug)]
pub struct RunSpec<'a> {
    /// Image tag to run (e.g. "python-executor")
    pub image: &'a str,
    /// Command executed inside the container
    pub argv: &'a [String],
    /// Text fed to the program's stdin
    pub stdin: &'a str,
    /// Host-side scratch directory, mounted read-write at /workspace
    pub scratch_dir: &'a Path,
    /// Deadline for the run; firing kills the container
    pub time_limit: Duration,
    /// Hard memory cap in MB
    pub memory_limit_mb: u64,
    /// Caller-initiated cancellation; aborts without a verdict
    pub cancel: &'a CancellationToken,
}

/// Launches isolated containers for single executions
#[derive(Debug, Clone)]
pub struct Sandbox {
    runtime: String,
    recipe_dir: PathBuf,
    cpu_limit: f64,
    pids_limit: u32,
}

impl Sandbox {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            runtime: config.runtime.clone(),
            recipe_dir: config.recipe_dir.clone(),
            cpu_limit: config.cpu_limit,
            pids_limit: config.pids_limit,
        }
    }

    /// Run one prepared program to completion, deadline or cancellation.
    ///
    /// The wall clock starts immediately before spawn and stops immediately
    /// after reap; the memory sampler runs alongside the child and is joined
    /// before this returns.
    pub async fn run(&self, spec: RunSpec<'_>) -> Result<ExecutionOutput> {
        let name = container_name();
        let args = self.run_args(&name, &spec);
        debug!(container = %name, "launching: {} {:?}", self.runtime, args);

        let mut command = Command::new(&self.runtime);
        command
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let monitor = ResourceMonitor::new(spec.memory_limit_mb);
        let monitor_token = spec.cancel.child_token();

        let started = Instant::now();
        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn container runtime '{}'", self.runtime))?;

        let mut stdin_pipe = child.stdin.take();
        let input = spec.stdin.as_bytes().to_vec();
        let stdin_task = tokio::spawn(async move {
            // The write fails harmlessly if the program exits without
            // draining its stdin.
            if let Some(pipe) = stdin_pipe.as_mut() {
                let _ = pipe.write_all(&input).await;
                let _ = pipe.shutdown().await;
            }
        });

        // Read the pipes in the background so partial output survives a
        // kill on timeout.
        let mut stdout_pipe = child.stdout.take().context("stdout pipe missing")?;
        let mut stderr_pipe = child.stderr.take().context("stderr pipe missing")?;
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stdout_pipe.read_to_end(&mut buf).await;
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf).await;
            buf
        });

        let monitor_task = tokio::spawn({
            let monitor = monitor.clone();
            let token = monitor_token.clone();
            let pid = child.id();
            async move { monitor.monitor(token, pid).await }
        });

        let mut timed_out = false;
        let mut cancelled = false;

        let wait_result = tokio::select! {
            status = child.wait() => Some(status),
            _ = tokio::time::sleep(spec.time_limit) => {
                timed_out = true;
                None
            }
            _ = spec.cancel.cancelled() => {
                cancelled = true;
                None
            }
        };

        let status = match wait_result {
            Some(status) => Some(status.context("failed to wait for container runtime")?),
            None => {
                self.kill_by_name(&name).await;
                match tokio::time::timeout(KILL_GRACE, child.wait()).await {
                    Ok(status) => Some(status.context("failed to reap container runtime")?),
                    Err(_) => {
                        warn!(container = %name, "runtime client survived kill-by-name, killing client");
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                        None
                    }
                }
            }
        };
        let elapsed = started.elapsed();

        // No sampler outlives its child.
        monitor_token.cancel();
        let (peak_kb, monitor_exceeded) = monitor_task.await.unwrap_or((0, false));
        let _ = stdin_task.await;
        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        if cancelled {
            anyhow::bail!("execution cancelled before completion");
        }

        let stdout = String::from_utf8_lossy(&stdout).to_string();
        let stderr = String::from_utf8_lossy(&stderr).to_string();

        let exit_code = match &status {
            Some(status) => status.code().unwrap_or(-1),
            None => -1,
        };

        if !timed_out {
            if let Some(status) = &status {
                if !status.success() && is_runtime_failure(&stderr) {
                    anyhow::bail!("container runtime failure: {}", stderr.trim());
                }
            }
        }

        let kernel_killed = exit_code == SIGKILL_EXIT_CODE && !timed_out;
        if kernel_killed {
            warn!(container = %name, "child killed with SIGKILL, treating as memory cap hit");
        }
        if monitor_exceeded {
            warn!(container = %name, peak_kb, "monitor sampled memory above the limit");
        }

        Ok(ExecutionOutput {
            stdout,
            stderr,
            exit_code,
            time_ms: elapsed.as_millis() as u64,
            memory_kb: peak_kb,
            timed_out,
            memory_exceeded: monitor_exceeded || kernel_killed,
        })
    }

    /// Make sure `image` exists, building it from the recipe if it does not.
    ///
    /// Callers serialise this per runner; the check itself is cheap.
    pub async fn ensure_image(&self, image: &str, recipe: &str) -> Result<()> {
        let inspect = Command::new(&self.runtime)
            .args(["image", "inspect", image])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .with_context(|| format!("failed to invoke container runtime '{}'", self.runtime))?;

        if inspect.success() {
            debug!(image, "image already present");
            return Ok(());
        }

        let recipe_path = self.recipe_dir.join(recipe);
        if !recipe_path.is_file() {
            anyhow::bail!(
                "image '{}' is missing and no recipe found at {}",
                image,
                recipe_path.display()
            );
        }

        info!(image, recipe = %recipe_path.display(), "image not found, building");
        let output = Command::new(&self.runtime)
            .arg("build")
            .args(["-t", image])
            .arg("-f")
            .arg(&recipe_path)
            .arg(&self.recipe_dir)
            .output()
            .await
            .with_context(|| format!("failed to build image '{}'", image))?;

        if !output.status.success() {
            anyhow::bail!(
                "failed to build image '{}': {}",
                image,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        info!(image, "image built");
        Ok(())
    }

    /// Kill a container by name. The container may already be gone.
    async fn kill_by_name(&self, name: &str) {
        debug!(container = %name, "killing container by name");
        let _ = Command::new(&self.runtime)
            .args(["kill", name])
            .output()
            .await;
    }

    fn run_args(&self, name: &str, spec: &RunSpec<'_>) -> Vec<String> {
        let mut args: Vec<String> = [
            "run",
            "--rm",
            "--name",
            name,
            "-i",
            "--network",
            "none",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        args.extend([
            "--memory".to_string(),
            format!("{}m", spec.memory_limit_mb),
            "--cpus".to_string(),
            self.cpu_limit.to_string(),
            "--pids-limit".to_string(),
            self.pids_limit.to_string(),
            "-v".to_string(),
            format!("{}:{}", spec.scratch_dir.display(), CONTAINER_WORKSPACE),
            "-w".to_string(),
            CONTAINER_WORKSPACE.to_string(),
        ]);

        args.push(spec.image.to_string());
        args.extend(spec.argv.iter().cloned());
        args
    }
}

/// Fresh collision-resistant container name
fn container_name() -> String {
    format!("code-exec-{}", Uuid::new_v4().simple())
}

fn is_runtime_failure(stderr: &str) -> bool {
    RUNTIME_FAILURE_PATTERNS
        .iter()
        .any(|pattern| stderr.contains(pattern))
}
