//! Language runner abstraction
//!
//! A [`LanguageRunner`] knows how to take source code for one language,
//! prepare its artefacts and run it once inside the sandbox. The
//! [`RunnerRegistry`] dispatches a submission to its runner by language tag,
//! which is the seam for adding languages without touching the judge.
//!
//! Runners do NOT:
//! - Compare outputs or decide verdicts
//! - Aggregate results across test cases

pub mod container;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::models::ExecutionOutput;

pub use container::ContainerRunner;

/// Bounded execution scope for one test case: a cancellation token plus the
/// time budget the sandbox turns into a deadline at spawn.
#[derive(Debug, Clone)]
pub struct CaseScope {
    cancel: CancellationToken,
    time_limit: Duration,
}

impl CaseScope {
    /// Open a scope under a parent token with the given time budget
    pub fn new(parent: &CancellationToken, time_limit_ms: u64) -> Self {
        Self {
            cancel: parent.child_token(),
            time_limit: Duration::from_millis(time_limit_ms),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn time_limit(&self) -> Duration {
        self.time_limit
    }
}

/// Executes code for one specific language
#[async_trait]
pub trait LanguageRunner: Send + Sync {
    /// Stable language tag used for registry dispatch
    fn language(&self) -> &str;

    /// Run `code` once, feeding `stdin` to the program.
    ///
    /// User failures (bad exit, timeout, memory kill, compile diagnostics)
    /// come back inside the [`ExecutionOutput`]; an `Err` means the
    /// infrastructure itself failed.
    async fn execute(&self, scope: &CaseScope, code: &str, stdin: &str)
        -> Result<ExecutionOutput>;
}

/// Maps language tags to their runners; last registration wins
#[derive(Default)]
pub struct RunnerRegistry {
    runners: HashMap<String, Arc<dyn LanguageRunner>>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a runner under its own declared tag
    pub fn register(&mut self, runner: Arc<dyn LanguageRunner>) {
        let tag = runner.language().to_lowercase();
        if self.runners.insert(tag.clone(), runner).is_some() {
            debug!(language = %tag, "replaced previously registered runner");
        }
    }

    /// Look up the runner for a language tag
    pub fn lookup(&self, tag: &str) -> Option<Arc<dyn LanguageRunner>> {
        self.runners.get(&tag.to_lowercase()).cloned()
    }

    /// All registered language tags
    pub fn languages(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.runners.keys().cloned().collect();
        tags.sort();
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyRunner {
        tag: &'static str,
        marker: i32,
    }

    #[async_trait]
    impl LanguageRunner for DummyRunner {
        fn language(&self) -> &str {
            self.tag
        }

        async fn execute(
            &self,
            _scope: &CaseScope,
            _code: &str,
            _stdin: &str,
        ) -> Result<ExecutionOutput> {
            Ok(ExecutionOutput {
                exit_code: self.marker,
                ..Default::default()
            })
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut registry = RunnerRegistry::new();
        registry.register(Arc::new(DummyRunner {
            tag: "python",
            marker: 0,
        }));

        assert!(registry.lookup("Python").is_some());
        assert!(registry.lookup("PYTHON").is_some());
        assert!(registry.lookup("haskell").is_none());
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let mut registry = RunnerRegistry::new();
        registry.register(Arc::new(DummyRunner {
            tag: "python",
            marker: 1,
        }));
        registry.register(Arc::new(DummyRunner {
            tag: "python",
            marker: 2,
        }));

        let runner = registry.lookup("python").unwrap();
        let scope = CaseScope::new(&CancellationToken::new(), 1000);
        let output = runner.execute(&scope, "", "").await.unwrap();
        assert_eq!(output.exit_code, 2);
    }

    #[test]
    fn test_scope_carries_time_budget() {
        let scope = CaseScope::new(&CancellationToken::new(), 1500);
        assert_eq!(scope.time_limit(), Duration::from_millis(1500));
        assert!(!scope.token().is_cancelled());
    }
}
