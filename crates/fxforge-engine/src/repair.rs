//! Turns a failed build into a new candidate artifact.
//!
//! Repaired output goes back through the same extraction, screening and
//! verification as a fresh generation. The caller decides whether a failed
//! repair costs a retry; nothing here loops.

use crate::prompts;
use crate::router::ModelRouter;
use crate::strategy::full::FULL_MAX_TOKENS;
use crate::strategy::template::{check_fragment, FragmentCheck, FRAGMENT_MAX_TOKENS};
use crate::strategy::{StrategyFailure, StrategyFailureKind};
use fxforge_core::artifact::{FileRole, GenerationArtifact, InjectedLogic, StrategyKind};
use fxforge_core::catalog::Catalog;
use fxforge_core::extract::extract;
use fxforge_core::ports::CompletionOptions;
use fxforge_core::screen::{screen_artifact, screen_file, ScreenError};
use fxforge_core::skeleton::Skeleton;
use std::sync::Arc;
use thiserror::Error;

/// Where an attempt sits in the task's retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairContext {
    pub attempt: u32,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepairFailure {
    #[error("repair model call failed: {0}")]
    Model(String),
    #[error("repair output had no usable code: {0}")]
    Extraction(String),
    #[error("repaired code failed verification: {}", .errors.join("; "))]
    Verification { errors: Vec<String> },
    /// The offending content is dropped; the next attempt starts from the
    /// last artifact that passed screening.
    #[error("repaired code contains an unsafe construct: {0}")]
    Unsafe(String),
    #[error("repaired code is incomplete: {0}")]
    Structure(String),
}

impl From<StrategyFailure> for RepairFailure {
    fn from(failure: StrategyFailure) -> Self {
        match failure.kind {
            StrategyFailureKind::Extraction => RepairFailure::Extraction(failure.message),
            StrategyFailureKind::Verification { errors } => RepairFailure::Verification { errors },
            StrategyFailureKind::Unsafe => RepairFailure::Unsafe(failure.message),
            StrategyFailureKind::Structure => RepairFailure::Structure(failure.message),
            StrategyFailureKind::Model => RepairFailure::Model(failure.message),
        }
    }
}

impl From<ScreenError> for RepairFailure {
    fn from(err: ScreenError) -> Self {
        StrategyFailure::from(err).into()
    }
}

pub struct Repairer {
    router: Arc<ModelRouter>,
    catalog: Arc<Catalog>,
}

impl Repairer {
    pub fn new(router: Arc<ModelRouter>, catalog: Arc<Catalog>) -> Self {
        Self { router, catalog }
    }

    pub async fn repair(
        &self,
        artifact: &GenerationArtifact,
        build_error: &str,
        ctx: RepairContext,
    ) -> Result<GenerationArtifact, RepairFailure> {
        tracing::info!(
            strategy = %artifact.strategy,
            attempt = ctx.attempt,
            max_attempts = ctx.max_attempts,
            "repairing artifact"
        );
        match &artifact.injected {
            Some(injected) => self.repair_fragment(injected, build_error, ctx).await,
            None => self.repair_processor(artifact, build_error, ctx).await,
        }
    }

    async fn repair_fragment(
        &self,
        injected: &InjectedLogic,
        build_error: &str,
        ctx: RepairContext,
    ) -> Result<GenerationArtifact, RepairFailure> {
        let category = injected.category;
        let skeleton = Skeleton::for_category(category);
        let context = self.catalog.context_prompt(category);
        let prompt = prompts::fragment_repair_prompt(build_error, &injected.fragment, skeleton, &context, ctx);
        let options = CompletionOptions::default().with_max_tokens(FRAGMENT_MAX_TOKENS);
        let raw = self
            .router
            .complete(&prompt, &options)
            .await
            .map_err(|err| RepairFailure::Model(format!("{err:#}")))?;

        let fragment = match check_fragment(&self.catalog, &raw, category)? {
            FragmentCheck::Accepted(fragment) => fragment,
            FragmentCheck::Rejected { errors, .. } => return Err(RepairFailure::Verification { errors }),
        };
        let artifact = skeleton
            .assemble(&fragment)
            .map_err(|err| RepairFailure::Structure(err.to_string()))?;
        screen_artifact(&artifact)?;
        Ok(artifact)
    }

    async fn repair_processor(
        &self,
        artifact: &GenerationArtifact,
        build_error: &str,
        ctx: RepairContext,
    ) -> Result<GenerationArtifact, RepairFailure> {
        let role = FileRole::Processor;
        let current = artifact
            .file(role)
            .ok_or_else(|| RepairFailure::Structure(format!("artifact has no {role}")))?;
        let prompt = prompts::file_repair_prompt(build_error, current, role.file_name(), ctx);
        let options = CompletionOptions::default()
            .with_system(prompts::full_system())
            .with_max_tokens(FULL_MAX_TOKENS);
        let raw = self
            .router
            .complete(&prompt, &options)
            .await
            .map_err(|err| RepairFailure::Model(format!("{err:#}")))?;

        let repaired = extract(&raw, role)
            .ok_or_else(|| RepairFailure::Extraction(format!("no {role} in repair output")))?;
        screen_file(&repaired, role)?;
        // Model-written now, whatever produced the original.
        let mut rewritten = artifact.replacing(role, repaired);
        rewritten.strategy = StrategyKind::Full;
        Ok(rewritten)
    }
}
