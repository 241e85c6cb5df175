//! Contracts for the external collaborators: model service, repository host
//! and CI. Live implementations live in `fxforge-adapters`; tests use fakes.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

pub type PortFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Schema for a structured-output completion.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    pub name: String,
    pub schema: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub system: Option<String>,
    pub json_schema: Option<OutputSchema>,
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            system: None,
            json_schema: None,
            max_tokens: 4096,
        }
    }
}

impl CompletionOptions {
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_schema(mut self, name: impl Into<String>, schema: Value) -> Self {
        self.json_schema = Some(OutputSchema {
            name: name.into(),
            schema,
        });
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

pub trait ModelClient: Send + Sync {
    /// Model identifier, for logs.
    fn name(&self) -> &str;

    /// Empty or refused output is an error, never `Ok("")`.
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
        options: &'a CompletionOptions,
    ) -> PortFuture<'a, String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    pub sha: String,
    pub url: Option<String>,
}

pub trait RepositoryHost: Send + Sync {
    /// All files land in one commit or none do.
    fn push_files<'a>(
        &'a self,
        files: &'a BTreeMap<String, String>,
        message: &'a str,
    ) -> PortFuture<'a, CommitRef>;

    fn read_file<'a>(&'a self, path: &'a str) -> PortFuture<'a, Option<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiState {
    Queued,
    Running,
    Success,
    Failure,
    Cancelled,
    NotFound,
}

impl CiState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CiState::Success | CiState::Failure | CiState::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CiState::Queued => "queued",
            CiState::Running => "running",
            CiState::Success => "success",
            CiState::Failure => "failure",
            CiState::Cancelled => "cancelled",
            CiState::NotFound => "not_found",
        }
    }
}

impl fmt::Display for CiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiStatus {
    pub state: CiState,
    pub run_id: Option<u64>,
    pub url: Option<String>,
}

impl CiStatus {
    pub fn not_found() -> Self {
        Self {
            state: CiState::NotFound,
            run_id: None,
            url: None,
        }
    }
}

pub trait CiService: Send + Sync {
    fn status<'a>(&'a self, commit: &'a CommitRef) -> PortFuture<'a, CiStatus>;

    /// Human-readable failure summary (jobs, failed steps, log excerpt).
    fn run_summary<'a>(&'a self, run_id: u64) -> PortFuture<'a, String>;

    /// Artifact name -> download location.
    fn artifacts<'a>(&'a self, run_id: u64) -> PortFuture<'a, BTreeMap<String, String>>;
}
