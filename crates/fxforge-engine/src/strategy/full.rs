use super::{Strategy, StrategyFailure, StrategyResult};
use crate::prompts;
use crate::router::{ModelChoice, ModelRouter};
use futures::future::BoxFuture;
use futures::FutureExt;
use fxforge_core::artifact::{FileRole, GenerationArtifact, StrategyKind};
use fxforge_core::extract::extract_files;
use fxforge_core::ports::CompletionOptions;
use fxforge_core::screen::screen_artifact;
use std::sync::Arc;

pub(crate) const FULL_MAX_TOKENS: u32 = 8192;
const REQUIRED_ROLES: [FileRole; 2] = [FileRole::Processor, FileRole::Editor];

/// Model writes complete files; used when nothing more constrained worked.
pub struct FullStrategy {
    router: Arc<ModelRouter>,
}

impl FullStrategy {
    pub fn new(router: Arc<ModelRouter>) -> Self {
        Self { router }
    }

    async fn run(&self, request: &str) -> StrategyResult {
        let prompt = prompts::full_prompt(request);
        let options = CompletionOptions::default()
            .with_system(prompts::full_system())
            .with_max_tokens(FULL_MAX_TOKENS);

        let primary = match self.attempt(ModelChoice::Primary, &prompt, &options).await {
            Ok(artifact) => return Ok(artifact),
            Err(failure) => failure,
        };
        if primary.is_unsafe() || !self.router.has_fallback() {
            return Err(primary);
        }

        tracing::warn!(error = %primary, "primary full generation rejected; trying fallback model");
        self.attempt(ModelChoice::Fallback, &prompt, &options)
            .await
            .map_err(|fallback| StrategyFailure {
                message: format!("primary: {}; fallback: {}", primary.message, fallback.message),
                kind: fallback.kind,
            })
    }

    async fn attempt(
        &self,
        choice: ModelChoice,
        prompt: &str,
        options: &CompletionOptions,
    ) -> StrategyResult {
        let raw = self
            .router
            .complete_with(choice, prompt, options)
            .await
            .map_err(StrategyFailure::model)?;
        let files = extract_files(&raw, &FileRole::ALL);
        if let Some(missing) = REQUIRED_ROLES.iter().find(|role| !files.contains_key(role)) {
            return Err(StrategyFailure::extraction(format!(
                "model output has no {missing}"
            )));
        }
        let artifact = GenerationArtifact::new(StrategyKind::Full, files);
        screen_artifact(&artifact)?;
        Ok(artifact)
    }
}

impl Strategy for FullStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Full
    }

    fn generate<'a>(&'a self, request: &'a str) -> BoxFuture<'a, StrategyResult> {
        self.run(request).boxed()
    }
}
