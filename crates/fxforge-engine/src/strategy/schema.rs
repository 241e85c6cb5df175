use super::{Strategy, StrategyFailure, StrategyResult};
use crate::prompts;
use crate::router::ModelRouter;
use futures::future::BoxFuture;
use futures::FutureExt;
use fxforge_core::artifact::StrategyKind;
use fxforge_core::catalog::Catalog;
use fxforge_core::codegen::render;
use fxforge_core::ports::CompletionOptions;
use fxforge_core::schema::{PluginSpec, SchemaError};
use fxforge_core::screen::screen_artifact;
use fxforge_core::verify::verify_against;
use std::sync::Arc;

const SCHEMA_NAME: &str = "plugin_spec";
const SCHEMA_MAX_TOKENS: u32 = 2048;

/// Model fills a structured record; a deterministic renderer writes the C++.
pub struct SchemaStrategy {
    router: Arc<ModelRouter>,
    catalog: Arc<Catalog>,
}

impl SchemaStrategy {
    pub fn new(router: Arc<ModelRouter>, catalog: Arc<Catalog>) -> Self {
        Self { router, catalog }
    }

    async fn run(&self, request: &str) -> StrategyResult {
        let options = CompletionOptions::default()
            .with_system(prompts::SCHEMA_SYSTEM)
            .with_schema(SCHEMA_NAME, PluginSpec::json_schema())
            .with_max_tokens(SCHEMA_MAX_TOKENS);
        let raw = self
            .router
            .complete(&prompts::schema_prompt(request), &options)
            .await
            .map_err(StrategyFailure::model)?;

        let spec = PluginSpec::from_model_output(&raw).map_err(|err| match err {
            SchemaError::Malformed(_) => StrategyFailure::extraction(err.to_string()),
            SchemaError::Invalid(_) => StrategyFailure::structure(err.to_string()),
        })?;
        let rendered = render(&spec).map_err(|err| StrategyFailure::structure(err.to_string()))?;
        screen_artifact(&rendered.artifact)?;

        // The renderer only emits names it declared, so this should never fire.
        let check = verify_against(&rendered.dsp_body, &rendered.surface, self.catalog.corrections());
        if !check.valid {
            tracing::error!(errors = ?check.errors, plugin = %spec.plugin_name, "rendered DSP failed verification");
            return Err(StrategyFailure::verification(check.errors));
        }
        Ok(rendered.artifact)
    }
}

impl Strategy for SchemaStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Schema
    }

    fn generate<'a>(&'a self, request: &'a str) -> BoxFuture<'a, StrategyResult> {
        self.run(request).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::StrategyFailureKind;
    use crate::testing::{CallKind, FakeModel, DRIVE_SPEC};
    use fxforge_core::artifact::FileRole;

    fn strategy(model: Arc<FakeModel>) -> SchemaStrategy {
        SchemaStrategy::new(
            Arc::new(ModelRouter::new(model)),
            Arc::new(Catalog::builtin().unwrap()),
        )
    }

    #[tokio::test]
    async fn test_valid_record_renders_all_roles() {
        let model = FakeModel::replying("m", DRIVE_SPEC);
        let artifact = strategy(model.clone()).generate("warm drive").await.unwrap();
        assert_eq!(artifact.strategy, StrategyKind::Schema);
        assert!(artifact.file(FileRole::Processor).unwrap().contains("std::tanh"));
        assert_eq!(artifact.roles().count(), 4);
        assert_eq!(model.count(CallKind::Schema), 1);
    }

    #[tokio::test]
    async fn test_fenced_record_is_salvaged() {
        let reply = format!("Sure!\n```json\n{}\n```", DRIVE_SPEC.replace("\"default\": 1}", "\"default\": 1,}"));
        let model = FakeModel::replying("m", &reply);
        assert!(strategy(model).generate("warm drive").await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_record_is_a_structure_failure() {
        let bad = DRIVE_SPEC.replace("\"default\": 4", "\"default\": 40");
        let failure = strategy(FakeModel::replying("m", &bad))
            .generate("warm drive")
            .await
            .unwrap_err();
        assert_eq!(failure.kind, StrategyFailureKind::Structure);
        assert!(failure.message.contains("default"), "{}", failure.message);
    }

    #[tokio::test]
    async fn test_prose_reply_is_an_extraction_failure() {
        let failure = strategy(FakeModel::replying("m", "I cannot do that."))
            .generate("warm drive")
            .await
            .unwrap_err();
        assert_eq!(failure.kind, StrategyFailureKind::Extraction);
    }

    #[tokio::test]
    async fn test_reserved_parameter_name_falls_through() {
        let clash = DRIVE_SPEC.replace("\"name\": \"mix\"", "\"name\": \"sample\"");
        let failure = strategy(FakeModel::replying("m", &clash))
            .generate("warm drive")
            .await
            .unwrap_err();
        assert_eq!(failure.kind, StrategyFailureKind::Structure);
    }

    #[tokio::test]
    async fn test_model_error_is_reported() {
        let failure = strategy(FakeModel::failing("m", "quota exceeded"))
            .generate("warm drive")
            .await
            .unwrap_err();
        assert_eq!(failure.kind, StrategyFailureKind::Model);
        assert!(failure.message.contains("quota exceeded"));
    }
}
