//! Settings for fxforge
//!
//! Stored in <config_dir>/fxforge/config.toml. Environment variables override
//! whatever the file says.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_PRIMARY_MODEL: &str = "google/gemini-2.0-flash-001";
pub const DEFAULT_FALLBACK_MODEL: &str = "anthropic/claude-sonnet-4";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub openrouter_api_key: Option<String>,
    pub openrouter_url: String,
    pub primary_model: String,
    pub fallback_model: Option<String>,
    pub github_token: Option<String>,
    /// `owner/name`
    pub github_repo: Option<String>,
    pub github_branch: String,
    pub github_api_url: String,
    pub max_retry_attempts: u32,
    pub build_poll_interval_seconds: u64,
    pub build_timeout_seconds: u64,
    pub task_ttl_hours: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            openrouter_api_key: None,
            openrouter_url: DEFAULT_OPENROUTER_URL.to_string(),
            primary_model: DEFAULT_PRIMARY_MODEL.to_string(),
            fallback_model: Some(DEFAULT_FALLBACK_MODEL.to_string()),
            github_token: None,
            github_repo: None,
            github_branch: "main".to_string(),
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
            max_retry_attempts: 3,
            build_poll_interval_seconds: 5,
            build_timeout_seconds: 300,
            task_ttl_hours: 24,
        }
    }
}

// Credentials never reach logs.
impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(value: &Option<String>) -> &'static str {
            if value.is_some() {
                "<set>"
            } else {
                "<unset>"
            }
        }
        f.debug_struct("Settings")
            .field("openrouter_api_key", &redact(&self.openrouter_api_key))
            .field("openrouter_url", &self.openrouter_url)
            .field("primary_model", &self.primary_model)
            .field("fallback_model", &self.fallback_model)
            .field("github_token", &redact(&self.github_token))
            .field("github_repo", &self.github_repo)
            .field("github_branch", &self.github_branch)
            .field("github_api_url", &self.github_api_url)
            .field("max_retry_attempts", &self.max_retry_attempts)
            .field("build_poll_interval_seconds", &self.build_poll_interval_seconds)
            .field("build_timeout_seconds", &self.build_timeout_seconds)
            .field("task_ttl_hours", &self.task_ttl_hours)
            .finish()
    }
}

impl Settings {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("fxforge"))
    }

    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.toml"))
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/fxforge/config.toml".to_string())
    }

    /// File settings from the default location, then the process environment.
    pub fn load() -> Result<Self> {
        let mut settings = match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Read a config file, or defaults when it is missing. A file that no
    /// longer parses is set aside as `config.toml.corrupt`.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match toml::from_str::<Settings>(&content) {
            Ok(settings) => settings,
            Err(err) => {
                preserve_corrupt_config(path, &content);
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "config file was corrupted; a backup was saved and defaults were loaded"
                );
                Self::default()
            }
        }
    }

    /// Apply overrides from `lookup` (normally `std::env::var`). Empty
    /// values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("OPENROUTER_API_KEY") {
            self.openrouter_api_key = Some(v);
        }
        if let Some(v) = get("GITHUB_TOKEN") {
            self.github_token = Some(v);
        }
        if let Some(v) = get("GITHUB_REPO") {
            self.github_repo = Some(v);
        }
        if let Some(v) = get("GITHUB_BRANCH") {
            self.github_branch = v;
        }
        if let Some(v) = get("FXFORGE_PRIMARY_MODEL") {
            self.primary_model = v;
        }
        if let Some(v) = get("FXFORGE_FALLBACK_MODEL") {
            self.fallback_model = if v.eq_ignore_ascii_case("none") { None } else { Some(v) };
        }
        if let Some(v) = get("MAX_RETRY_ATTEMPTS") {
            self.max_retry_attempts = parse_number("MAX_RETRY_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("BUILD_POLL_INTERVAL_SECONDS") {
            self.build_poll_interval_seconds = parse_number("BUILD_POLL_INTERVAL_SECONDS", &v)?;
        }
        if let Some(v) = get("BUILD_TIMEOUT_SECONDS") {
            self.build_timeout_seconds = parse_number("BUILD_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = get("TASK_TTL_HOURS") {
            self.task_ttl_hours = parse_number("TASK_TTL_HOURS", &v)?;
        }
        Ok(())
    }

    /// Every problem that would stop a live run. Empty means usable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.openrouter_api_key.is_none() {
            problems.push("OPENROUTER_API_KEY is not set".to_string());
        }
        if self.github_token.is_none() {
            problems.push("GITHUB_TOKEN is not set".to_string());
        }
        match &self.github_repo {
            None => problems.push("GITHUB_REPO is not set".to_string()),
            Some(slug) if parse_repo_slug(slug).is_none() => {
                problems.push(format!("GITHUB_REPO '{slug}' is not of the form owner/name"))
            }
            Some(_) => {}
        }
        if self.github_branch.trim().is_empty() {
            problems.push("GITHUB_BRANCH is empty".to_string());
        }
        for (name, value) in [
            ("openrouter_url", &self.openrouter_url),
            ("github_api_url", &self.github_api_url),
        ] {
            if let Err(err) = url::Url::parse(value) {
                problems.push(format!("{name} '{value}' is not a valid URL: {err}"));
            }
        }
        if self.build_poll_interval_seconds == 0 {
            problems.push("BUILD_POLL_INTERVAL_SECONDS must be at least 1".to_string());
        }
        if self.build_timeout_seconds < self.build_poll_interval_seconds {
            problems.push("BUILD_TIMEOUT_SECONDS is shorter than the poll interval".to_string());
        }
        problems
    }

    /// `validate` as a single error.
    pub fn ensure_valid(&self) -> Result<()> {
        let problems = self.validate();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(anyhow!(
                "configuration incomplete ({}): {}",
                Self::config_location(),
                problems.join("; ")
            ))
        }
    }

    /// Owner and name from `github_repo`.
    pub fn repo_slug(&self) -> Result<(String, String)> {
        let slug = self
            .github_repo
            .as_deref()
            .ok_or_else(|| anyhow!("GITHUB_REPO is not set"))?;
        parse_repo_slug(slug).ok_or_else(|| anyhow!("GITHUB_REPO '{slug}' is not of the form owner/name"))
    }

    /// Save to the default location
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(0o700)) {
                    tracing::debug!(error = %e, "failed to set config directory permissions");
                }
            }
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        write_config_atomic(path, &content).context("Failed to write config")
    }
}

/// `owner/name` with both parts non-empty and no extra segments.
pub fn parse_repo_slug(slug: &str) -> Option<(String, String)> {
    let (owner, name) = slug.trim().split_once('/')?;
    let valid = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    (valid(owner) && valid(name)).then(|| (owner.to_string(), name.to_string()))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("{key} must be a non-negative integer, got '{value}'"))
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("toml.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

fn write_config_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    use std::fs::OpenOptions;

    let tmp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = file.set_permissions(fs::Permissions::from_mode(0o600)) {
            tracing::debug!(error = %e, "failed to set temp config file permissions");
        }
    }

    file.write_all(content.as_bytes())?;
    file.sync_all()?;

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn complete() -> Settings {
        Settings {
            openrouter_api_key: Some("sk-or-test".into()),
            github_token: Some("ghp_test".into()),
            github_repo: Some("fxforge/plugin-builds".into()),
            ..Settings::default()
        }
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.github_branch, "main");
        assert_eq!(settings.max_retry_attempts, 3);
        assert_eq!(settings.build_poll_interval_seconds, 5);
        assert_eq!(settings.build_timeout_seconds, 300);
        assert_eq!(settings.task_ttl_hours, 24);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "github_repo = \"me/builds\"\nbuild_timeout_seconds = 600\n").unwrap();
        let settings = Settings::load_from(&path);
        assert_eq!(settings.github_repo.as_deref(), Some("me/builds"));
        assert_eq!(settings.build_timeout_seconds, 600);
        assert_eq!(settings.github_branch, "main");
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Settings::load_from(&dir.path().join("nope.toml")), Settings::default());
    }

    #[test]
    fn test_corrupt_file_is_set_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "max_retry_attempts = \"many\"").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
        assert!(!path.exists());
        assert!(dir.path().join("config.toml.corrupt").exists());
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut settings = Settings {
            github_branch: "dev".into(),
            ..Settings::default()
        };
        settings
            .apply_env(env(&[
                ("GITHUB_BRANCH", "release"),
                ("OPENROUTER_API_KEY", "sk-or-1"),
                ("MAX_RETRY_ATTEMPTS", "5"),
                ("TASK_TTL_HOURS", "48"),
                ("FXFORGE_FALLBACK_MODEL", "none"),
                ("GITHUB_TOKEN", "   "),
            ]))
            .unwrap();
        assert_eq!(settings.github_branch, "release");
        assert_eq!(settings.openrouter_api_key.as_deref(), Some("sk-or-1"));
        assert_eq!(settings.max_retry_attempts, 5);
        assert_eq!(settings.task_ttl_hours, 48);
        assert_eq!(settings.fallback_model, None);
        assert_eq!(settings.github_token, None);
    }

    #[test]
    fn test_bad_number_names_the_variable() {
        let err = Settings::default()
            .apply_env(env(&[("BUILD_TIMEOUT_SECONDS", "five minutes")]))
            .unwrap_err();
        assert!(err.to_string().contains("BUILD_TIMEOUT_SECONDS"));
    }

    #[test]
    fn test_validate_reports_missing_credentials() {
        let problems = Settings::default().validate();
        assert!(problems.contains(&"OPENROUTER_API_KEY is not set".to_string()));
        assert!(problems.contains(&"GITHUB_TOKEN is not set".to_string()));
        assert!(problems.contains(&"GITHUB_REPO is not set".to_string()));
        assert!(complete().validate().is_empty());
    }

    #[test]
    fn test_validate_checks_slug_and_urls() {
        let settings = Settings {
            github_repo: Some("just-a-name".into()),
            github_api_url: "not a url".into(),
            ..complete()
        };
        let problems = settings.validate();
        assert_eq!(problems.len(), 2, "{problems:?}");
        assert!(settings.ensure_valid().is_err());
    }

    #[test]
    fn test_parse_repo_slug() {
        assert_eq!(
            parse_repo_slug("my-org/my_cool.repo"),
            Some(("my-org".to_string(), "my_cool.repo".to_string()))
        );
        assert!(parse_repo_slug("owner/").is_none());
        assert!(parse_repo_slug("/repo").is_none());
        assert!(parse_repo_slug("a/b/c").is_none());
        assert!(parse_repo_slug("").is_none());
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let printed = format!("{:?}", complete());
        assert!(!printed.contains("sk-or-test"));
        assert!(!printed.contains("ghp_test"));
        assert!(printed.contains("<set>"));
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let settings = complete();
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path), settings);
        assert!(!path.with_extension("tmp").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
