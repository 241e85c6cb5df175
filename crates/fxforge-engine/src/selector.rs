//! Tries strategies in a fixed order and returns the first validated artifact.

use crate::router::ModelRouter;
use crate::strategy::{FullStrategy, SchemaStrategy, Strategy, StrategyFailure, TemplateStrategy};
use fxforge_core::artifact::{GenerationArtifact, StrategyKind};
use fxforge_core::catalog::Catalog;
use std::fmt;
use std::sync::Arc;

/// Every strategy failed; one reason per strategy, in the order tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationFailure {
    pub reasons: Vec<(StrategyKind, StrategyFailure)>,
}

impl fmt::Display for GenerationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("no strategy produced a valid artifact")?;
        for (kind, failure) in &self.reasons {
            write!(f, "; {kind}: {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for GenerationFailure {}

pub struct Selector {
    strategies: Vec<Box<dyn Strategy>>,
}

impl Selector {
    pub fn new(strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self { strategies }
    }

    /// Schema, then template injection, then full generation.
    pub fn standard(router: Arc<ModelRouter>, catalog: Arc<Catalog>) -> Self {
        Self::new(vec![
            Box::new(SchemaStrategy::new(router.clone(), catalog.clone())),
            Box::new(TemplateStrategy::new(router.clone(), catalog)),
            Box::new(FullStrategy::new(router)),
        ])
    }

    pub fn kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    pub async fn generate(&self, request: &str) -> Result<GenerationArtifact, GenerationFailure> {
        let mut reasons = Vec::new();
        for strategy in &self.strategies {
            let kind = strategy.kind();
            match strategy.generate(request).await {
                Ok(artifact) => {
                    tracing::info!(strategy = %kind, failed_before = reasons.len(), "strategy produced artifact");
                    return Ok(artifact);
                }
                Err(failure) => {
                    tracing::info!(strategy = %kind, reason = %failure, "strategy failed");
                    reasons.push((kind, failure));
                }
            }
        }
        Err(GenerationFailure { reasons })
    }
}
