use super::{Strategy, StrategyFailure, StrategyResult};
use crate::prompts;
use crate::router::ModelRouter;
use futures::future::BoxFuture;
use futures::FutureExt;
use fxforge_core::artifact::StrategyKind;
use fxforge_core::catalog::{Catalog, PluginCategory};
use fxforge_core::extract::extract_fragment;
use fxforge_core::ports::CompletionOptions;
use fxforge_core::screen::{screen_artifact, screen_fragment};
use fxforge_core::skeleton::Skeleton;
use fxforge_core::verify::verify;
use std::sync::Arc;

pub(crate) const FRAGMENT_MAX_TOKENS: u32 = 1024;

/// Outcome of running raw model output through extraction, screening and
/// the verification gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FragmentCheck {
    /// Verified, with any corrections already applied.
    Accepted(String),
    Rejected { fragment: String, errors: Vec<String> },
}

pub(crate) fn check_fragment(
    catalog: &Catalog,
    raw: &str,
    category: PluginCategory,
) -> Result<FragmentCheck, StrategyFailure> {
    let fragment = extract_fragment(raw)
        .ok_or_else(|| StrategyFailure::extraction("no logic fragment found in model output"))?;
    screen_fragment(&fragment)?;

    let result = verify(catalog, &fragment, category);
    if !result.corrections_applied.is_empty() {
        let applied: Vec<String> = result.corrections_applied.iter().map(ToString::to_string).collect();
        tracing::info!(%category, corrections = %applied.join(", "), "auto-corrected identifiers");
    }
    if result.valid {
        Ok(FragmentCheck::Accepted(result.effective_text(&fragment).to_string()))
    } else {
        Ok(FragmentCheck::Rejected {
            fragment: result.effective_text(&fragment).to_string(),
            errors: result.errors,
        })
    }
}

/// Model writes only the inner-loop logic; a fixed skeleton supplies the rest.
pub struct TemplateStrategy {
    router: Arc<ModelRouter>,
    catalog: Arc<Catalog>,
}

impl TemplateStrategy {
    pub fn new(router: Arc<ModelRouter>, catalog: Arc<Catalog>) -> Self {
        Self { router, catalog }
    }

    async fn run(&self, request: &str) -> StrategyResult {
        let category = PluginCategory::detect(request);
        if category == PluginCategory::Generic {
            return Err(StrategyFailure::structure("no template for generic requests"));
        }
        let skeleton = Skeleton::for_category(category);
        let context = self.catalog.context_prompt(category);
        tracing::debug!(%category, template = skeleton.title, "selected template");

        let options = CompletionOptions::default()
            .with_system(prompts::template_system(skeleton, &context))
            .with_max_tokens(FRAGMENT_MAX_TOKENS);
        let raw = self
            .router
            .complete(&prompts::template_prompt(request), &options)
            .await
            .map_err(StrategyFailure::model)?;

        let fragment = match check_fragment(&self.catalog, &raw, category)? {
            FragmentCheck::Accepted(fragment) => fragment,
            FragmentCheck::Rejected { fragment, errors } => {
                tracing::info!(%category, errors = ?errors, "fragment rejected; requesting rewrite");
                self.rewrite(&fragment, &errors, &context, category).await?
            }
        };

        let artifact = skeleton
            .assemble(&fragment)
            .map_err(|err| StrategyFailure::structure(err.to_string()))?;
        screen_artifact(&artifact)?;
        Ok(artifact)
    }

    /// One rewrite restricted to the listed identifiers.
    async fn rewrite(
        &self,
        fragment: &str,
        errors: &[String],
        context: &str,
        category: PluginCategory,
    ) -> Result<String, StrategyFailure> {
        let prompt = prompts::logic_rewrite_prompt(errors, context, fragment);
        let options = CompletionOptions::default().with_max_tokens(FRAGMENT_MAX_TOKENS);
        let raw = self
            .router
            .complete(&prompt, &options)
            .await
            .map_err(StrategyFailure::model)?;
        match check_fragment(&self.catalog, &raw, category)? {
            FragmentCheck::Accepted(fragment) => Ok(fragment),
            FragmentCheck::Rejected { errors, .. } => Err(StrategyFailure::verification(errors)),
        }
    }
}

impl Strategy for TemplateStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Template
    }

    fn generate<'a>(&'a self, request: &'a str) -> BoxFuture<'a, StrategyResult> {
        self.run(request).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::StrategyFailureKind;
    use crate::testing::{fenced, CallKind, FakeModel};
    use fxforge_core::artifact::FileRole;

    const DISTORTION: &str = "A warm distortion with a single drive knob";

    fn strategy(model: Arc<FakeModel>) -> TemplateStrategy {
        TemplateStrategy::new(
            Arc::new(ModelRouter::new(model)),
            Arc::new(Catalog::builtin().unwrap()),
        )
    }

    #[tokio::test]
    async fn test_distortion_request_injects_into_waveshaper() {
        let model = FakeModel::replying("m", &fenced("wet = std::tanh(dry * drive);"));
        let artifact = strategy(model.clone()).generate(DISTORTION).await.unwrap();
        let injected = artifact.injected.clone().unwrap();
        assert_eq!(injected.category, PluginCategory::Waveshaper);
        assert_eq!(injected.fragment, "wet = std::tanh(dry * drive);");
        assert!(artifact
            .file(FileRole::Processor)
            .unwrap()
            .contains("wet = std::tanh(dry * drive);"));
        assert_eq!(model.count(CallKind::Template), 1);
        assert_eq!(model.count(CallKind::LogicRewrite), 0);
    }

    #[tokio::test]
    async fn test_hallucinated_name_is_corrected() {
        let model = FakeModel::replying("m", &fenced("wet = std::tanh(dry * driveAmount);"));
        let artifact = strategy(model.clone()).generate(DISTORTION).await.unwrap();
        assert_eq!(artifact.injected.unwrap().fragment, "wet = std::tanh(dry * drive);");
        assert_eq!(model.count(CallKind::LogicRewrite), 0);
    }

    #[tokio::test]
    async fn test_rejected_fragment_gets_one_rewrite() {
        let model = FakeModel::new("m", |kind, _| {
            Ok(match kind {
                CallKind::LogicRewrite => fenced("wet = std::tanh(dry * drive);"),
                _ => fenced("wet = std::tanh(dry * masterVolume);"),
            })
        });
        let artifact = strategy(model.clone()).generate(DISTORTION).await.unwrap();
        assert_eq!(artifact.injected.unwrap().fragment, "wet = std::tanh(dry * drive);");
        let rewrite = &model.calls()[1];
        assert_eq!(rewrite.kind, CallKind::LogicRewrite);
        assert!(rewrite.prompt.contains("Undeclared identifier: 'masterVolume'"));
    }

    #[tokio::test]
    async fn test_persistent_unknown_name_fails_verification() {
        let model = FakeModel::replying("m", &fenced("wet = std::tanh(dry * masterVolume);"));
        let failure = strategy(model.clone()).generate(DISTORTION).await.unwrap_err();
        assert_eq!(
            failure.kind,
            StrategyFailureKind::Verification {
                errors: vec!["Undeclared identifier: 'masterVolume'".to_string()]
            }
        );
        assert_eq!(model.count(CallKind::LogicRewrite), 1);
    }

    #[tokio::test]
    async fn test_unsafe_fragment_is_never_rewritten() {
        let model = FakeModel::replying("m", &fenced("std::system(\"rm -rf /\");\nwet = dry;"));
        let failure = strategy(model.clone()).generate(DISTORTION).await.unwrap_err();
        assert!(failure.is_unsafe());
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn test_generic_request_has_no_template() {
        let model = FakeModel::replying("m", &fenced("channelData[sample] *= gain;"));
        let failure = strategy(model.clone())
            .generate("a lo-fi bitcrusher with sample-rate reduction")
            .await
            .unwrap_err();
        assert_eq!(failure.kind, StrategyFailureKind::Structure);
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_prose_reply_is_an_extraction_failure() {
        let model = FakeModel::replying("m", "I would rather not.");
        let failure = strategy(model).generate(DISTORTION).await.unwrap_err();
        assert_eq!(failure.kind, StrategyFailureKind::Extraction);
    }

    #[test]
    fn test_check_fragment_reports_rejections() {
        let catalog = Catalog::builtin().unwrap();
        let check = check_fragment(&catalog, &fenced("channelData[sample] *= masterVolume;"), PluginCategory::Gain)
            .unwrap();
        assert_eq!(
            check,
            FragmentCheck::Rejected {
                fragment: "channelData[sample] *= masterVolume;".to_string(),
                errors: vec!["Undeclared identifier: 'masterVolume'".to_string()],
            }
        );
    }
}
