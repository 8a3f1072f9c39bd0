//! Concurrent memory monitor
//!
//! Samples a child process's resident set size on a fixed cadence while the
//! child runs. The monitor is advisory evidence for the verdict: the
//! container's own memory cap remains the ground truth, and on hosts where
//! per-process RSS is unavailable the sampler reports 0 and never flags.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Sampling cadence
const SAMPLE_INTERVAL: Duration = Duration::from_millis(10);

/// Samples child memory usage and detects limit violations
#[derive(Debug, Clone)]
pub struct ResourceMonitor {
    limit_kb: u64,
}

impl ResourceMonitor {
    /// Create a monitor for the given limit in MB (tracked internally in KB)
    pub fn new(limit_mb: u64) -> Self {
        Self {
            limit_kb: limit_mb * 1024,
        }
    }

    /// Sample the child's RSS every 10 ms until the token fires, the child
    /// exits, or a sample exceeds the limit.
    ///
    /// Returns the peak observed so far in KB and whether the limit was
    /// crossed; a sample over the limit returns immediately. Called before
    /// the child exists (`pid = None`) it returns `(0, false)`.
    pub async fn monitor(&self, token: CancellationToken, pid: Option<u32>) -> (u64, bool) {
        let Some(pid) = pid else {
            return (0, false);
        };

        let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut peak = 0u64;

        loop {
            tokio::select! {
                _ = token.cancelled() => return (peak, false),
                _ = ticker.tick() => {
                    let Some(rss_kb) = sample_rss_kb(pid) else {
                        // Child has exited
                        return (peak, false);
                    };
                    peak = peak.max(rss_kb);
                    if self.limit_kb > 0 && rss_kb > self.limit_kb {
                        return (peak, true);
                    }
                }
            }
        }
    }
}

/// Current resident set size in KB, or `None` once the process is gone
#[cfg(target_os = "linux")]
fn sample_rss_kb(pid: u32) -> Option<u64> {
    let status = std::fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
    Some(parse_vm_rss_kb(&status).unwrap_or(0))
}

#[cfg(not(target_os = "linux"))]
fn sample_rss_kb(_pid: u32) -> Option<u64> {
    // No per-process RSS here; the container cap is the only enforcement.
    Some(0)
}

#[allow(dead_code)]
fn parse_vm_rss_kb(status: &str) -> Option<u64> {
    status.lines().find_map(|line| {
        let rest = line.strip_prefix("VmRSS:")?;
        rest.split_whitespace().next()?.parse().ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vm_rss() {
        let status = "Name:\tworker\nVmPeak:\t  20000 kB\nVmRSS:\t   8204 kB\nThreads:\t4\n";
        assert_eq!(parse_vm_rss_kb(status), Some(8204));
    }

    #[test]
    fn test_parse_vm_rss_missing() {
        assert_eq!(parse_vm_rss_kb("Name:\tkthread\n"), None);
    }

    #[tokio::test]
    async fn test_before_start_returns_zero() {
        let monitor = ResourceMonitor::new(256);
        let (peak, exceeded) = monitor.monitor(CancellationToken::new(), None).await;
        assert_eq!(peak, 0);
        assert!(!exceeded);
    }

    #[tokio::test]
    async fn test_returns_on_cancellation() {
        let monitor = ResourceMonitor::new(1024 * 1024);
        let token = CancellationToken::new();

        let handle = {
            let token = token.clone();
            let pid = std::process::id();
            tokio::spawn(async move { monitor.monitor(token, Some(pid)).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        let (_, exceeded) = handle.await.unwrap();
        assert!(!exceeded);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_flags_limit_violation() {
        // 1 MB limit; the test process itself is well above that
        let monitor = ResourceMonitor::new(1);
        let token = CancellationToken::new();

        let (peak, exceeded) = monitor.monitor(token, Some(std::process::id())).await;
        assert!(exceeded);
        assert!(peak > 1024);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_exited_child_ends_monitoring() {
        let monitor = ResourceMonitor::new(4096);
        let token = CancellationToken::new();

        let mut child = tokio::process::Command::new("true")
            .spawn()
            .expect("spawn true");
        let pid = child.id();
        let _ = child.wait().await;

        // The sampler notices the pid is gone and returns on its own
        let (_, exceeded) = monitor.monitor(token, pid).await;
        assert!(!exceeded);
    }
}
