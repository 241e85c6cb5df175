//! Primary/fallback routing over model clients.
//!
//! Falling back is invisible to the task: it never consumes a retry.

use anyhow::{anyhow, Result};
use fxforge_core::ports::{CompletionOptions, ModelClient};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelChoice {
    Primary,
    Fallback,
}

pub struct ModelRouter {
    primary: Arc<dyn ModelClient>,
    fallback: Option<Arc<dyn ModelClient>>,
}

impl ModelRouter {
    pub fn new(primary: Arc<dyn ModelClient>) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn ModelClient>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Complete on the primary model, retrying once on the fallback when the
    /// primary errors or returns blank text.
    pub async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        let primary_error = match call(self.primary.as_ref(), prompt, options).await {
            Ok(text) => return Ok(text),
            Err(err) => err,
        };
        let Some(fallback) = &self.fallback else {
            return Err(primary_error);
        };
        tracing::warn!(
            primary = self.primary.name(),
            fallback = fallback.name(),
            error = %primary_error,
            "primary model failed; using fallback"
        );
        call(fallback.as_ref(), prompt, options)
            .await
            .map_err(|err| anyhow!("primary: {primary_error}; fallback: {err}"))
    }

    /// Complete on exactly one model, without fallback.
    pub async fn complete_with(
        &self,
        choice: ModelChoice,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String> {
        let client = match choice {
            ModelChoice::Primary => self.primary.as_ref(),
            ModelChoice::Fallback => self
                .fallback
                .as_deref()
                .ok_or_else(|| anyhow!("no fallback model configured"))?,
        };
        call(client, prompt, options).await
    }
}

async fn call(client: &dyn ModelClient, prompt: &str, options: &CompletionOptions) -> Result<String> {
    let text = client.complete(prompt, options).await?;
    if text.trim().is_empty() {
        return Err(anyhow!("{} returned an empty completion", client.name()));
    }
    tracing::debug!(model = client.name(), chars = text.len(), "completion received");
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeModel;

    #[tokio::test]
    async fn test_primary_success_skips_fallback() {
        let primary = FakeModel::replying("primary", "hello");
        let fallback = FakeModel::replying("fallback", "unused");
        let router = ModelRouter::new(primary.clone()).with_fallback(fallback.clone());
        let text = router.complete("hi", &CompletionOptions::default()).await.unwrap();
        assert_eq!(text, "hello");
        assert_eq!(primary.call_count(), 1);
        assert_eq!(fallback.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_primary_falls_back() {
        let primary = FakeModel::replying("primary", "   ");
        let fallback = FakeModel::replying("fallback", "rescued");
        let router = ModelRouter::new(primary.clone()).with_fallback(fallback.clone());
        let text = router.complete("hi", &CompletionOptions::default()).await.unwrap();
        assert_eq!(text, "rescued");
        assert_eq!(fallback.call_count(), 1);
    }

    #[tokio::test]
    async fn test_error_without_fallback_propagates() {
        let primary = FakeModel::failing("primary", "rate limited");
        let router = ModelRouter::new(primary);
        let err = router
            .complete("hi", &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_both_failing_reports_both() {
        let router = ModelRouter::new(FakeModel::failing("primary", "down"))
            .with_fallback(FakeModel::failing("fallback", "also down"));
        let err = router
            .complete("hi", &CompletionOptions::default())
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("primary: down"));
        assert!(err.contains("fallback: also down"));
    }

    #[tokio::test]
    async fn test_complete_with_targets_one_model() {
        let primary = FakeModel::replying("primary", "a");
        let fallback = FakeModel::replying("fallback", "b");
        let router = ModelRouter::new(primary.clone()).with_fallback(fallback.clone());
        let options = CompletionOptions::default();
        assert_eq!(router.complete_with(ModelChoice::Fallback, "x", &options).await.unwrap(), "b");
        assert_eq!(primary.call_count(), 0);

        let single = ModelRouter::new(primary);
        assert!(single.complete_with(ModelChoice::Fallback, "x", &options).await.is_err());
    }
}
