//! Bounded wait for the CI run a commit triggers.

use crate::cancel::CancellationFlag;
use fxforge_core::ports::{CiService, CiState, CiStatus, CommitRef};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Succeeded {
        run_id: Option<u64>,
        url: Option<String>,
        /// Artifact name -> download location.
        downloads: BTreeMap<String, String>,
    },
    Failed {
        run_id: Option<u64>,
        url: Option<String>,
        /// Failure summary used as repair input.
        log: String,
    },
    /// Cancelled on the CI side. Repairable like a failure.
    Cancelled {
        run_id: Option<u64>,
        url: Option<String>,
        log: String,
    },
    TimedOut {
        last_state: CiState,
        waited: Duration,
    },
    /// The task was cancelled locally while waiting.
    Aborted,
}

pub struct BuildMonitor {
    ci: Arc<dyn CiService>,
    poll_interval: Duration,
    timeout: Duration,
}

impl BuildMonitor {
    pub fn new(ci: Arc<dyn CiService>) -> Self {
        Self {
            ci,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_BUILD_TIMEOUT,
        }
    }

    pub fn with_timing(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.timeout = timeout;
        self
    }

    /// Poll until the run for `commit` finishes, the timeout passes or the
    /// task is cancelled. `progress` sees every change of state or run.
    pub async fn wait(
        &self,
        commit: &CommitRef,
        cancel: &CancellationFlag,
        mut progress: impl FnMut(&CiStatus) + Send,
    ) -> BuildOutcome {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut last: Option<CiStatus> = None;

        loop {
            if cancel.is_cancelled() {
                return BuildOutcome::Aborted;
            }

            match tokio::time::timeout_at(deadline, self.ci.status(commit)).await {
                Err(_) => break,
                Ok(Err(err)) => {
                    tracing::warn!(commit = %commit.sha, error = %err, "CI status poll failed");
                }
                Ok(Ok(status)) => {
                    if last.as_ref() != Some(&status) {
                        tracing::debug!(commit = %commit.sha, state = %status.state, run_id = ?status.run_id, "CI status changed");
                        progress(&status);
                    }
                    last = Some(status.clone());
                    match status.state {
                        CiState::Success => return self.succeeded(status).await,
                        CiState::Failure => {
                            let log = self.summary(status.run_id, "build failed").await;
                            return BuildOutcome::Failed {
                                run_id: status.run_id,
                                url: status.url,
                                log,
                            };
                        }
                        CiState::Cancelled => {
                            let log = self.summary(status.run_id, "build was cancelled").await;
                            return BuildOutcome::Cancelled {
                                run_id: status.run_id,
                                url: status.url,
                                log,
                            };
                        }
                        CiState::Queued | CiState::Running | CiState::NotFound => {}
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }

        let waited = started.elapsed();
        let last_state = last.map(|s| s.state).unwrap_or(CiState::NotFound);
        tracing::warn!(commit = %commit.sha, waited_secs = waited.as_secs(), %last_state, "build timed out");
        BuildOutcome::TimedOut { last_state, waited }
    }

    async fn succeeded(&self, status: CiStatus) -> BuildOutcome {
        let downloads = match status.run_id {
            Some(run_id) => match self.ci.artifacts(run_id).await {
                Ok(artifacts) => artifacts,
                Err(err) => {
                    tracing::warn!(run_id, error = %err, "could not list build artifacts");
                    BTreeMap::new()
                }
            },
            None => BTreeMap::new(),
        };
        BuildOutcome::Succeeded {
            run_id: status.run_id,
            url: status.url,
            downloads,
        }
    }

    async fn summary(&self, run_id: Option<u64>, fallback: &str) -> String {
        let Some(run_id) = run_id else {
            return fallback.to_string();
        };
        match self.ci.run_summary(run_id).await {
            Ok(summary) if !summary.trim().is_empty() => summary,
            Ok(_) => fallback.to_string(),
            Err(err) => {
                tracing::warn!(run_id, error = %err, "could not fetch build summary");
                format!("{fallback} (summary unavailable: {err})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCi;
    use CiState::*;

    fn commit() -> CommitRef {
        CommitRef {
            sha: "abc123".into(),
            url: None,
        }
    }

    fn monitor(ci: Arc<FakeCi>) -> BuildMonitor {
        BuildMonitor::new(ci).with_timing(Duration::from_secs(5), Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_lists_downloads() {
        let ci = FakeCi::new(vec![vec![NotFound, Queued, Running, Success]]);
        let mut seen = Vec::new();
        let outcome = monitor(ci)
            .wait(&commit(), &CancellationFlag::new(), |s| seen.push(s.state))
            .await;
        match outcome {
            BuildOutcome::Succeeded { run_id, downloads, .. } => {
                assert_eq!(run_id, Some(100));
                assert_eq!(downloads.len(), 2);
                assert!(downloads.contains_key("FxForge-windows"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(seen, vec![NotFound, Queued, Running, Success]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_fetches_summary() {
        let ci = FakeCi::with_summary(vec![vec![Running, Failure]], "error: 'masterVolume' was not declared");
        let outcome = monitor(ci.clone())
            .wait(&commit(), &CancellationFlag::new(), |_| {})
            .await;
        assert_eq!(
            outcome,
            BuildOutcome::Failed {
                run_id: Some(100),
                url: Some("https://example.test/runs/100".into()),
                log: "error: 'masterVolume' was not declared".into(),
            }
        );
        assert_eq!(ci.summaries_requested(), vec![100]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ci_cancellation_is_reported() {
        let ci = FakeCi::new(vec![vec![Queued, Cancelled]]);
        let outcome = monitor(ci).wait(&commit(), &CancellationFlag::new(), |_| {}).await;
        assert!(matches!(outcome, BuildOutcome::Cancelled { run_id: Some(100), .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_when_run_never_finishes() {
        let ci = FakeCi::new(vec![vec![Running]]);
        let outcome = monitor(ci).wait(&commit(), &CancellationFlag::new(), |_| {}).await;
        match outcome {
            BuildOutcome::TimedOut { last_state, waited } => {
                assert_eq!(last_state, Running);
                assert_eq!(waited, Duration::from_secs(60));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_run_is_tolerated_until_timeout() {
        let ci = FakeCi::new(vec![vec![NotFound]]);
        let outcome = monitor(ci).wait(&commit(), &CancellationFlag::new(), |_| {}).await;
        assert!(matches!(outcome, BuildOutcome::TimedOut { last_state: NotFound, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_task_stops_waiting() {
        let ci = FakeCi::new(vec![vec![Running]]);
        let flag = CancellationFlag::new();
        let trigger = flag.clone();
        let outcome = monitor(ci)
            .wait(&commit(), &flag, move |_| trigger.cancel())
            .await;
        assert_eq!(outcome, BuildOutcome::Aborted);
    }
}
