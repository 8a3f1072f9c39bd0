//! Worker configuration
//!
//! Everything is loaded from environment variables with sensible defaults
//! and passed explicitly to the components that need it.

use std::env;
use std::path::PathBuf;

/// Configuration for the execution worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root directory for per-run scratch directories
    pub work_dir: PathBuf,
    /// Container runtime binary, any OCI-compatible CLI (default: docker)
    pub runtime: String,
    /// Directory holding the per-language image recipes
    pub recipe_dir: PathBuf,
    /// CPU quota per container, in cores
    pub cpu_limit: f64,
    /// Maximum number of processes per container (fork-bomb defence)
    pub pids_limit: u32,
    /// Compile time limit in milliseconds
    pub compile_time_limit_ms: u64,
    /// Compile memory limit in MB
    pub compile_memory_limit_mb: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: env::temp_dir().join("code-judge"),
            runtime: "docker".to_string(),
            recipe_dir: default_recipe_dir(),
            cpu_limit: 0.5,
            pids_limit: 50,
            compile_time_limit_ms: 30_000,
            compile_memory_limit_mb: 2048,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from the environment, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = env::var("JUDGE_WORK_DIR") {
            config.work_dir = PathBuf::from(dir);
        }
        if let Ok(runtime) = env::var("JUDGE_CONTAINER_RUNTIME") {
            config.runtime = runtime;
        }
        if let Ok(dir) = env::var("JUDGE_RECIPE_DIR") {
            config.recipe_dir = PathBuf::from(dir);
        }
        config
    }
}

/// Recipes live next to the worker binary in deployment; during development
/// they are found at the crate root.
fn default_recipe_dir() -> PathBuf {
    if let Ok(exe) = env::current_exe() {
        if let Some(dir) = exe.parent() {
            let candidate = dir.join("recipes");
            if candidate.is_dir() {
                return candidate;
            }
        }
    }
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("recipes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.runtime, "docker");
        assert_eq!(config.cpu_limit, 0.5);
        assert_eq!(config.pids_limit, 50);
        assert_eq!(config.compile_time_limit_ms, 30_000);
        assert!(config.work_dir.ends_with("code-judge"));
    }

    #[test]
    fn test_recipe_dir_resolves() {
        // Either exe-relative or the crate root; both end in "recipes"
        assert!(default_recipe_dir().ends_with("recipes"));
    }
}
