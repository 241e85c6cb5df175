//! GitHub REST integration: atomic commits through the Git Data API, raw
//! file reads, and Actions run status, job summaries and artifacts.

use crate::config::{parse_repo_slug, Settings};
use anyhow::{anyhow, Context, Result};
use fxforge_core::ports::{CiService, CiState, CiStatus, CommitRef, PortFuture, RepositoryHost};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

const API_TIMEOUT_SECS: u64 = 60;
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = "fxforge";

/// Maximum length for error body content in error messages
const MAX_ERROR_BODY_LEN: usize = 200;

/// Sanitize an API error body to prevent credential leakage.
fn sanitize_error_body(body: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "token",
        "secret",
        "password",
        "credential",
        "bearer",
        "ghp_",
        "gho_",
        "ghu_",
        "github_pat_",
    ];

    let truncated = match body.char_indices().nth(MAX_ERROR_BODY_LEN) {
        Some((idx, _)) => format!("{}... (truncated)", &body[..idx]),
        None => body.to_string(),
    };

    let lower = truncated.to_lowercase();
    for pattern in SECRET_PATTERNS {
        if lower.contains(pattern) {
            return "(error details redacted - may contain sensitive data)".to_string();
        }
    }

    truncated
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Deserialize)]
struct ApiErrorResponse {
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

#[derive(Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Deserialize)]
struct RefResponse {
    object: GitObject,
}

#[derive(Deserialize)]
struct CommitResponse {
    sha: String,
    tree: GitObject,
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Serialize)]
struct TreeEntry<'a> {
    path: &'a str,
    mode: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct CreateTreeRequest<'a> {
    base_tree: &'a str,
    tree: Vec<TreeEntry<'a>>,
}

#[derive(Serialize)]
struct CreateCommitRequest<'a> {
    message: &'a str,
    tree: &'a str,
    parents: Vec<&'a str>,
}

#[derive(Serialize)]
struct UpdateRefRequest<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Deserialize)]
struct WorkflowRuns {
    #[serde(default)]
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Deserialize)]
struct WorkflowRun {
    id: u64,
    status: String,
    #[serde(default)]
    conclusion: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Deserialize)]
struct Jobs {
    #[serde(default)]
    jobs: Vec<Job>,
}

#[derive(Deserialize)]
struct Job {
    name: String,
    status: String,
    #[serde(default)]
    conclusion: Option<String>,
    #[serde(default)]
    steps: Vec<JobStep>,
}

#[derive(Deserialize)]
struct JobStep {
    name: String,
    #[serde(default)]
    conclusion: Option<String>,
}

#[derive(Deserialize)]
struct Artifacts {
    #[serde(default)]
    artifacts: Vec<Artifact>,
}

#[derive(Deserialize)]
struct Artifact {
    id: u64,
    name: String,
    #[serde(default)]
    expired: bool,
}

// ============================================================================
// State mapping and summaries
// ============================================================================

/// Actions `status`/`conclusion` pair to a CI state.
pub fn map_run_state(status: &str, conclusion: Option<&str>) -> CiState {
    match status {
        "completed" => match conclusion {
            Some("success") => CiState::Success,
            Some("cancelled") => CiState::Cancelled,
            _ => CiState::Failure,
        },
        "queued" | "waiting" | "pending" | "requested" => CiState::Queued,
        _ => CiState::Running,
    }
}

fn format_jobs_summary(run_id: u64, jobs: &Jobs) -> String {
    let mut lines = vec![format!("Workflow run {run_id}")];
    for job in &jobs.jobs {
        let outcome = job.conclusion.as_deref().unwrap_or(&job.status);
        lines.push(format!("{}: {}", job.name, outcome));
        for step in &job.steps {
            if matches!(step.conclusion.as_deref(), Some("failure" | "timed_out" | "cancelled")) {
                lines.push(format!(
                    "  failed step: {} ({})",
                    step.name,
                    step.conclusion.as_deref().unwrap_or("failure")
                ));
            }
        }
    }
    lines.join("\n")
}

// ============================================================================
// Client
// ============================================================================

pub struct GitHubClient {
    http: reqwest::Client,
    token: String,
    owner: String,
    repo: String,
    branch: String,
    api_url: String,
}

impl GitHubClient {
    pub fn new(
        token: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        branch: impl Into<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            http,
            token: token.into(),
            owner: owner.into(),
            repo: repo.into(),
            branch: branch.into(),
            api_url: crate::config::DEFAULT_GITHUB_API_URL.to_string(),
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let token = settings
            .github_token
            .clone()
            .ok_or_else(|| anyhow!("GITHUB_TOKEN is not set"))?;
        let slug = settings
            .github_repo
            .as_deref()
            .ok_or_else(|| anyhow!("GITHUB_REPO is not set"))?;
        let (owner, repo) =
            parse_repo_slug(slug).ok_or_else(|| anyhow!("GITHUB_REPO '{slug}' is not of the form owner/name"))?;
        Ok(Self::new(token, owner, repo, settings.github_branch.clone())?.with_api_url(settings.github_api_url.clone()))
    }

    fn repo_url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.api_url, self.owner, self.repo, path)
    }

    fn artifact_url(&self, run_id: u64, artifact_id: u64) -> String {
        format!(
            "https://github.com/{}/{}/actions/runs/{}/artifacts/{}",
            self.owner, self.repo, run_id, artifact_id
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.request_accepting(method, url, "application/vnd.github+json")
    }

    fn request_accepting(&self, method: Method, url: &str, accept: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("Accept", accept)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", USER_AGENT)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let resp = request
            .send()
            .await
            .with_context(|| format!("Failed to send {what} request"))?;
        let resp = check_status(resp).await?;
        resp.json()
            .await
            .with_context(|| format!("Failed to parse {what} response"))
    }

    /// Write every file in one commit on the branch: ref, parent commit,
    /// tree on top of the parent's tree, new commit, then a fast-forward
    /// ref update. Nothing is visible on the branch until the last step.
    pub async fn commit_files(&self, files: &BTreeMap<String, String>, message: &str) -> Result<CommitRef> {
        let ref_path = format!("git/ref/heads/{}", self.branch);
        let head: RefResponse = self
            .send_json(self.request(Method::GET, &self.repo_url(&ref_path)), "branch ref")
            .await?;
        let parent: CommitResponse = self
            .send_json(
                self.request(Method::GET, &self.repo_url(&format!("git/commits/{}", head.object.sha))),
                "parent commit",
            )
            .await?;

        let tree_request = CreateTreeRequest {
            base_tree: &parent.tree.sha,
            tree: files
                .iter()
                .map(|(path, content)| TreeEntry {
                    path,
                    mode: "100644",
                    kind: "blob",
                    content,
                })
                .collect(),
        };
        let tree: GitObject = self
            .send_json(
                self.request(Method::POST, &self.repo_url("git/trees")).json(&tree_request),
                "create tree",
            )
            .await?;

        let commit_request = CreateCommitRequest {
            message,
            tree: &tree.sha,
            parents: vec![parent.sha.as_str()],
        };
        let commit: CommitResponse = self
            .send_json(
                self.request(Method::POST, &self.repo_url("git/commits")).json(&commit_request),
                "create commit",
            )
            .await?;

        let update = UpdateRefRequest {
            sha: &commit.sha,
            force: false,
        };
        let _: RefResponse = self
            .send_json(
                self.request(Method::PATCH, &self.repo_url(&format!("git/refs/heads/{}", self.branch)))
                    .json(&update),
                "update ref",
            )
            .await?;

        tracing::info!(branch = %self.branch, commit = %commit.sha, files = files.len(), "committed files");
        Ok(CommitRef {
            sha: commit.sha,
            url: commit.html_url,
        })
    }

    /// Raw file contents on the branch, `None` when the path does not exist.
    pub async fn file_contents(&self, path: &str) -> Result<Option<String>> {
        let resp = self
            .request_accepting(
                Method::GET,
                &self.repo_url(&format!("contents/{path}")),
                "application/vnd.github.raw+json",
            )
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await
            .with_context(|| format!("Failed to fetch {path}"))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check_status(resp).await?;
        Ok(Some(resp.text().await.with_context(|| format!("Failed to read {path}"))?))
    }

    /// The newest workflow run for `sha`, or `NotFound` before one exists.
    pub async fn run_for_commit(&self, sha: &str) -> Result<CiStatus> {
        let runs: WorkflowRuns = self
            .send_json(
                self.request(Method::GET, &self.repo_url("actions/runs"))
                    .query(&[("head_sha", sha), ("per_page", "10")]),
                "workflow runs",
            )
            .await?;
        Ok(match runs.workflow_runs.into_iter().next() {
            Some(run) => CiStatus {
                state: map_run_state(&run.status, run.conclusion.as_deref()),
                run_id: Some(run.id),
                url: run.html_url,
            },
            None => CiStatus::not_found(),
        })
    }

    pub async fn jobs_summary(&self, run_id: u64) -> Result<String> {
        let jobs: Jobs = self
            .send_json(
                self.request(Method::GET, &self.repo_url(&format!("actions/runs/{run_id}/jobs"))),
                "workflow jobs",
            )
            .await?;
        Ok(format_jobs_summary(run_id, &jobs))
    }

    /// Artifact name to download page, skipping expired artifacts.
    pub async fn run_artifacts(&self, run_id: u64) -> Result<BTreeMap<String, String>> {
        let artifacts: Artifacts = self
            .send_json(
                self.request(Method::GET, &self.repo_url(&format!("actions/runs/{run_id}/artifacts"))),
                "run artifacts",
            )
            .await?;
        Ok(artifacts
            .artifacts
            .into_iter()
            .filter(|a| !a.expired)
            .map(|a| (a.name, self.artifact_url(run_id, a.id)))
            .collect())
    }
}

async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(api_error(status, &body))
}

fn api_error(status: StatusCode, body: &str) -> anyhow::Error {
    if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(body) {
        let detail = api_error
            .errors
            .first()
            .and_then(|e| e.message.clone())
            .unwrap_or_default();
        let msg = if detail.is_empty() {
            api_error.message
        } else {
            format!("{}: {}", api_error.message, detail)
        };
        return anyhow!("GitHub API error ({}): {}", status, sanitize_error_body(&msg));
    }
    anyhow!("GitHub API error ({}): {}", status, sanitize_error_body(body))
}

impl RepositoryHost for GitHubClient {
    fn push_files<'a>(&'a self, files: &'a BTreeMap<String, String>, message: &'a str) -> PortFuture<'a, CommitRef> {
        Box::pin(self.commit_files(files, message))
    }

    fn read_file<'a>(&'a self, path: &'a str) -> PortFuture<'a, Option<String>> {
        Box::pin(self.file_contents(path))
    }
}

impl CiService for GitHubClient {
    fn status<'a>(&'a self, commit: &'a CommitRef) -> PortFuture<'a, CiStatus> {
        Box::pin(self.run_for_commit(&commit.sha))
    }

    fn run_summary<'a>(&'a self, run_id: u64) -> PortFuture<'a, String> {
        Box::pin(self.jobs_summary(run_id))
    }

    fn artifacts<'a>(&'a self, run_id: u64) -> PortFuture<'a, BTreeMap<String, String>> {
        Box::pin(self.run_artifacts(run_id))
    }
}
