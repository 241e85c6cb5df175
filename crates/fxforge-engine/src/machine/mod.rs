//! Drives one task from prompt to built plugin or terminal failure.
//!
//! The machine is sequential per task: generate, push once, wait for the
//! build, and on a failed build spend one retry on a repair before pushing
//! again. Every phase change goes through [`TaskMachine::transition`].

use crate::cancel::CancellationFlag;
use crate::monitor::{BuildMonitor, BuildOutcome, DEFAULT_BUILD_TIMEOUT, DEFAULT_POLL_INTERVAL};
use crate::registry::TaskRegistry;
use crate::repair::{RepairContext, RepairFailure, Repairer};
use crate::router::ModelRouter;
use crate::selector::Selector;
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use fxforge_adapters::config::Settings;
use fxforge_core::artifact::{GenerationArtifact, BUILD_CONFIG_PATH};
use fxforge_core::build_id::{generate_plugin_code, update_build_identifier};
use fxforge_core::catalog::Catalog;
use fxforge_core::consistency::check_consistency;
use fxforge_core::ports::{CiService, CommitRef, RepositoryHost};
use fxforge_core::task::{FailureKind, Phase, TaskId, TaskState, TaskStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;


const MAX_TTL_HOURS: u64 = 24 * 365;
const COMMIT_SUMMARY_CHARS: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    pub max_retries: u32,
    pub poll_interval: Duration,
    pub build_timeout: Duration,
    pub task_ttl: chrono::Duration,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            poll_interval: DEFAULT_POLL_INTERVAL,
            build_timeout: DEFAULT_BUILD_TIMEOUT,
            task_ttl: chrono::Duration::hours(24),
        }
    }
}

impl MachineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_retries: settings.max_retry_attempts,
            poll_interval: Duration::from_secs(settings.build_poll_interval_seconds.max(1)),
            build_timeout: Duration::from_secs(settings.build_timeout_seconds),
            task_ttl: chrono::Duration::hours(settings.task_ttl_hours.min(MAX_TTL_HOURS) as i64),
        }
    }
}

/// External collaborators, injected once per process.
pub struct Ports {
    pub router: Arc<ModelRouter>,
    pub repo: Arc<dyn RepositoryHost>,
    pub ci: Arc<dyn CiService>,
    pub catalog: Arc<Catalog>,
}

pub struct TaskMachine {
    registry: TaskRegistry,
    selector: Selector,
    repairer: Repairer,
    monitor: BuildMonitor,
    repo: Arc<dyn RepositoryHost>,
}

impl TaskMachine {
    pub fn new(ports: Ports, config: &MachineConfig) -> Self {
        let Ports {
            router,
            repo,
            ci,
            catalog,
        } = ports;
        Self {
            registry: TaskRegistry::new(config.max_retries, config.task_ttl),
            selector: Selector::standard(Arc::clone(&router), Arc::clone(&catalog)),
            repairer: Repairer::new(router, catalog),
            monitor: BuildMonitor::new(ci).with_timing(config.poll_interval, config.build_timeout),
            repo,
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn submit(&self, prompt: impl Into<String>) -> TaskId {
        self.registry.create(prompt)
    }

    /// Run the task on the tokio runtime.
    pub fn spawn(self: &Arc<Self>, id: TaskId) -> JoinHandle<Result<TaskStatus>> {
        let machine = Arc::clone(self);
        tokio::spawn(async move { machine.run(id).await })
    }

    /// Drive `id` to a terminal phase and return its final status.
    ///
    /// Domain failures end in `Failed` with a kind and message; `Err` is
    /// returned only when the task cannot be recorded at all.
    pub async fn run(&self, id: TaskId) -> Result<TaskStatus> {
        let cancel = self
            .registry
            .cancellation(id)
            .ok_or_else(|| anyhow!("task {id} not found"))?;
        let prompt = self.read(id, |t| t.prompt.clone())?;

        if let Err(err) = self.drive(id, &prompt, &cancel).await {
            let message = format!("{err:#}");
            tracing::error!(task_id = %id, error = %message, "task stopped on internal error");
            let terminal = self
                .registry
                .read(id, |t| t.phase().is_terminal())
                .unwrap_or(true);
            if terminal {
                return Err(err);
            }
            self.fail(id, FailureKind::Internal, message)?;
        }

        self.registry
            .snapshot(id)
            .ok_or_else(|| anyhow!("task {id} was evicted before it finished"))
    }

    async fn drive(&self, id: TaskId, prompt: &str, cancel: &CancellationFlag) -> Result<()> {
        self.transition(id, Phase::Synthesizing)?;
        if cancel.is_cancelled() {
            return self.cancelled(id);
        }

        let mut artifact = match self.selector.generate(prompt).await {
            Ok(artifact) => artifact,
            Err(failure) => return self.fail(id, FailureKind::Generation, failure.to_string()),
        };
        tracing::info!(task_id = %id, strategy = %artifact.strategy, "artifact generated");

        loop {
            let stored = artifact.clone();
            self.update(id, |t| t.artifact = Some(stored))?;
            if cancel.is_cancelled() {
                return self.cancelled(id);
            }

            self.transition(id, Phase::Pushing)?;
            let (commit, code) = match self.push(prompt, &artifact).await {
                Ok(pushed) => pushed,
                Err(err) => return self.fail(id, FailureKind::Transport, format!("push failed: {err:#}")),
            };
            self.update(id, |t| {
                t.commit_sha = Some(commit.sha.clone());
                t.plugin_code = Some(code);
                t.run_id = None;
                t.run_url = None;
            })?;
            self.transition(id, Phase::Building)?;

            let outcome = self
                .monitor
                .wait(&commit, cancel, |status| {
                    if status.run_id.is_some() {
                        self.registry.update(id, |t| {
                            t.run_id = status.run_id;
                            t.run_url = status.url.clone();
                        });
                    }
                })
                .await;

            let build_error = match outcome {
                BuildOutcome::Succeeded {
                    run_id,
                    url,
                    downloads,
                } => {
                    self.update(id, |t| {
                        t.run_id = run_id.or(t.run_id);
                        t.run_url = url.or_else(|| t.run_url.take());
                        t.downloads = downloads;
                    })?;
                    return self.transition(id, Phase::Success);
                }
                BuildOutcome::Failed { log, .. } | BuildOutcome::Cancelled { log, .. } => log,
                BuildOutcome::TimedOut { last_state, waited } => {
                    let message = format!(
                        "build did not finish within {}s (last state: {last_state})",
                        waited.as_secs()
                    );
                    return self.fail(id, FailureKind::Timeout, message);
                }
                BuildOutcome::Aborted => return self.cancelled(id),
            };

            tracing::warn!(task_id = %id, commit = %commit.sha, "build failed");
            self.update(id, |t| t.record_error(build_error.clone()))?;

            artifact = match self.repair_until_valid(id, &artifact, &build_error, cancel).await? {
                Some(repaired) => repaired,
                None => return Ok(()),
            };
        }
    }

    /// Repair `last` until a candidate passes local checks. Rejected repairs
    /// cost a retry but are never pushed. `None` means the task ended.
    async fn repair_until_valid(
        &self,
        id: TaskId,
        last: &GenerationArtifact,
        build_error: &str,
        cancel: &CancellationFlag,
    ) -> Result<Option<GenerationArtifact>> {
        let mut error = build_error.to_string();
        let mut rejected: Option<RepairFailure> = None;
        loop {
            let Some(ctx) = self.enter_repair(id)? else {
                let max = self.read(id, TaskState::max_retries)?;
                let kind = exhaustion_kind(max, rejected.as_ref());
                let message = if kind == FailureKind::Build {
                    format!("build failed and retries are disabled: {error}")
                } else {
                    format!("retry budget of {max} exhausted; last error: {error}")
                };
                self.fail(id, kind, message)?;
                return Ok(None);
            };
            if cancel.is_cancelled() {
                self.cancelled(id)?;
                return Ok(None);
            }

            match self.repairer.repair(last, &error, ctx).await {
                Ok(repaired) => return Ok(Some(repaired)),
                Err(failure) => {
                    let message = failure.to_string();
                    tracing::warn!(task_id = %id, attempt = ctx.attempt, error = %message, "repair rejected before push");
                    self.update(id, |t| t.record_error(message.clone()))?;
                    error = format!("{build_error}\n\nThe previous fix was rejected: {message}");
                    rejected = Some(failure);
                }
            }
        }
    }

    /// The one place the retry budget is checked and spent.
    fn enter_repair(&self, id: TaskId) -> Result<Option<RepairContext>> {
        let ctx = self.update(id, |t| {
            t.try_consume_retry().then(|| RepairContext {
                attempt: t.retry_count(),
                max_attempts: t.max_retries(),
            })
        })?;
        if let Some(ctx) = ctx {
            tracing::info!(task_id = %id, attempt = ctx.attempt, max_attempts = ctx.max_attempts, "entering repair");
            if self.read(id, TaskState::phase)? == Phase::Building {
                self.transition(id, Phase::Synthesizing)?;
            }
        }
        Ok(ctx)
    }

    /// Advisory header check, fresh plugin code, then one atomic push of
    /// every source file plus the build configuration.
    async fn push(&self, prompt: &str, artifact: &GenerationArtifact) -> Result<(CommitRef, String)> {
        let report = check_consistency(&artifact.interface_texts(), &artifact.implementation_texts());
        if let Some(reason) = &report.skipped {
            tracing::debug!(reason = %reason, "header consistency check skipped");
        } else if !report.ok {
            tracing::warn!(issues = ?report.issues, "header consistency issues");
        }

        let build_config = self
            .repo
            .read_file(BUILD_CONFIG_PATH)
            .await
            .context("Failed to read build configuration")?
            .ok_or_else(|| anyhow!("{BUILD_CONFIG_PATH} not found in repository"))?;
        let code = generate_plugin_code(&mut rand::thread_rng());
        let build_config = update_build_identifier(&build_config, &code)?;

        let mut files = artifact.to_repo_files();
        files.insert(BUILD_CONFIG_PATH.to_string(), build_config);
        let commit = self
            .repo
            .push_files(&files, &commit_message(prompt, artifact, &code))
            .await?;
        tracing::info!(commit = %commit.sha, plugin_code = %code, files = files.len(), "artifact pushed");
        Ok((commit, code))
    }

    /// Phase changes go through here or through `fail`.
    fn transition(&self, id: TaskId, next: Phase) -> Result<()> {
        let from = self.update(id, |t| t.transition(next, Utc::now()))??;
        tracing::info!(task_id = %id, from = %from, to = %next, "phase transition");
        Ok(())
    }

    fn fail(&self, id: TaskId, kind: FailureKind, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        let from = self.update(id, |t| t.fail(kind, message.clone(), Utc::now()))??;
        tracing::info!(task_id = %id, from = %from, to = Phase::Failed.as_str(), "phase transition");
        tracing::warn!(task_id = %id, failure_kind = %kind, error = %message, "task failed");
        Ok(())
    }

    fn cancelled(&self, id: TaskId) -> Result<()> {
        self.fail(id, FailureKind::Internal, "cancelled")
    }

    fn read<R>(&self, id: TaskId, f: impl FnOnce(&TaskState) -> R) -> Result<R> {
        self.registry
            .read(id, f)
            .ok_or_else(|| anyhow!("task {id} not found"))
    }

    fn update<R>(&self, id: TaskId, f: impl FnOnce(&mut TaskState) -> R) -> Result<R> {
        self.registry
            .update(id, f)
            .ok_or_else(|| anyhow!("task {id} not found"))
    }
}

/// Why the budget ran out: a repair the gate kept rejecting, a build that
/// was never allowed a repair, or plain exhaustion.
fn exhaustion_kind(max_retries: u32, last_rejection: Option<&RepairFailure>) -> FailureKind {
    match last_rejection {
        Some(RepairFailure::Verification { .. }) => FailureKind::Verification,
        _ if max_retries == 0 => FailureKind::Build,
        _ => FailureKind::BudgetExhausted,
    }
}

fn commit_message(prompt: &str, artifact: &GenerationArtifact, code: &str) -> String {
    let first_line = prompt.lines().next().unwrap_or("").trim();
    let mut summary: String = first_line.chars().take(COMMIT_SUMMARY_CHARS).collect();
    if first_line.chars().count() > COMMIT_SUMMARY_CHARS {
        summary.push_str("...");
    }
    format!(
        "Generate plugin: {summary}\n\nStrategy: {}\nPlugin code: {code}",
        artifact.strategy
    )
}
