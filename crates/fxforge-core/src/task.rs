//! Task record, lifecycle phases and the failure taxonomy.

use crate::artifact::{GenerationArtifact, StrategyKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Pending,
    Synthesizing,
    Pushing,
    Building,
    Success,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Pending => "pending",
            Phase::Synthesizing => "synthesizing",
            Phase::Pushing => "pushing",
            Phase::Building => "building",
            Phase::Success => "success",
            Phase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Success | Phase::Failed)
    }

    /// Legal edges. `Building -> Synthesizing` is the repair re-entry.
    pub fn can_transition_to(&self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Pending, Synthesizing)
                | (Pending, Failed)
                | (Synthesizing, Pushing)
                | (Synthesizing, Failed)
                | (Pushing, Building)
                | (Pushing, Failed)
                | (Building, Success)
                | (Building, Failed)
                | (Building, Synthesizing)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No strategy produced a valid artifact.
    Generation,
    /// The budget ran out on a repair whose identifiers never verified.
    Verification,
    /// The repository host rejected the push.
    Transport,
    /// The build failed and no repair was allowed.
    Build,
    Timeout,
    BudgetExhausted,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Generation => "generation",
            FailureKind::Verification => "verification",
            FailureKind::Transport => "transport",
            FailureKind::Build => "build",
            FailureKind::Timeout => "timeout",
            FailureKind::BudgetExhausted => "budget_exhausted",
            FailureKind::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("task is already {0}")]
    Terminal(Phase),
    #[error("illegal transition {from} -> {to}")]
    Illegal { from: Phase, to: Phase },
}

/// One request from prompt to built plugin or terminal failure.
#[derive(Debug, Clone)]
pub struct TaskState {
    pub id: TaskId,
    pub prompt: String,
    phase: Phase,
    retry_count: u32,
    max_retries: u32,
    pub last_error: Option<String>,
    pub error_history: Vec<String>,
    pub failure_kind: Option<FailureKind>,
    pub artifact: Option<GenerationArtifact>,
    pub commit_sha: Option<String>,
    pub run_id: Option<u64>,
    pub run_url: Option<String>,
    pub downloads: BTreeMap<String, String>,
    pub plugin_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskState {
    pub fn new(prompt: impl Into<String>, max_retries: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: TaskId::new(),
            prompt: prompt.into(),
            phase: Phase::Pending,
            retry_count: 0,
            max_retries,
            last_error: None,
            error_history: Vec::new(),
            failure_kind: None,
            artifact: None,
            commit_sha: None,
            run_id: None,
            run_url: None,
            downloads: BTreeMap::new(),
            plugin_code: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn strategy(&self) -> Option<StrategyKind> {
        self.artifact.as_ref().map(|a| a.strategy)
    }

    fn check_transition(&self, next: Phase) -> Result<Phase, TransitionError> {
        let from = self.phase;
        if from.is_terminal() {
            return Err(TransitionError::Terminal(from));
        }
        if !from.can_transition_to(next) {
            return Err(TransitionError::Illegal { from, to: next });
        }
        Ok(from)
    }

    /// Move to `next`, stamping `updated_at`.
    pub fn transition(&mut self, next: Phase, now: DateTime<Utc>) -> Result<Phase, TransitionError> {
        let from = self.check_transition(next)?;
        self.phase = next;
        self.updated_at = now;
        Ok(from)
    }

    /// Record the failure and enter `Failed` in one step. A terminal task is
    /// left untouched.
    pub fn fail(
        &mut self,
        kind: FailureKind,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Phase, TransitionError> {
        self.check_transition(Phase::Failed)?;
        self.failure_kind = Some(kind);
        self.record_error(message);
        self.transition(Phase::Failed, now)
    }

    /// Spend one retry if any remain.
    pub fn try_consume_retry(&mut self) -> bool {
        if self.retry_count < self.max_retries {
            self.retry_count += 1;
            true
        } else {
            false
        }
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.error_history.push(message.clone());
        self.last_error = Some(message);
    }

    pub fn status(&self) -> TaskStatus {
        TaskStatus {
            id: self.id,
            phase: self.phase,
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            strategy: self.strategy(),
            commit_sha: self.commit_sha.clone(),
            run_id: self.run_id,
            run_url: self.run_url.clone(),
            error: self.last_error.clone(),
            failure_kind: self.failure_kind,
            downloads: self.downloads.clone(),
            plugin_code: self.plugin_code.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Read-only snapshot handed to status callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub id: TaskId,
    pub phase: Phase,
    pub retry_count: u32,
    pub max_retries: u32,
    pub strategy: Option<StrategyKind>,
    pub commit_sha: Option<String>,
    pub run_id: Option<u64>,
    pub run_url: Option<String>,
    pub error: Option<String>,
    pub failure_kind: Option<FailureKind>,
    pub downloads: BTreeMap<String, String>,
    pub plugin_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
