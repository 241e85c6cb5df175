//! The three generation strategies, tried in order by the selector.

pub(crate) mod full;
mod schema;
pub(crate) mod template;

pub use full::FullStrategy;
pub use schema::SchemaStrategy;
pub use template::TemplateStrategy;

use futures::future::BoxFuture;
use fxforge_core::artifact::{GenerationArtifact, StrategyKind};
use fxforge_core::screen::ScreenError;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyFailureKind {
    /// Required roles or the fragment could not be found in the output.
    Extraction,
    /// Undeclared identifiers survived correction.
    Verification { errors: Vec<String> },
    /// A denylisted construct. Never retried with the same content.
    Unsafe,
    /// Required symbols, schema constraints or injection failed.
    Structure,
    /// The model call itself failed.
    Model,
}

impl StrategyFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyFailureKind::Extraction => "extraction",
            StrategyFailureKind::Verification { .. } => "verification",
            StrategyFailureKind::Unsafe => "unsafe",
            StrategyFailureKind::Structure => "structure",
            StrategyFailureKind::Model => "model",
        }
    }
}

impl fmt::Display for StrategyFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} failure: {message}")]
pub struct StrategyFailure {
    pub kind: StrategyFailureKind,
    pub message: String,
}

impl StrategyFailure {
    pub fn extraction(message: impl Into<String>) -> Self {
        Self {
            kind: StrategyFailureKind::Extraction,
            message: message.into(),
        }
    }

    pub fn verification(errors: Vec<String>) -> Self {
        Self {
            message: errors.join("; "),
            kind: StrategyFailureKind::Verification { errors },
        }
    }

    pub fn structure(message: impl Into<String>) -> Self {
        Self {
            kind: StrategyFailureKind::Structure,
            message: message.into(),
        }
    }

    pub fn model(err: anyhow::Error) -> Self {
        Self {
            kind: StrategyFailureKind::Model,
            message: format!("{err:#}"),
        }
    }

    pub fn is_unsafe(&self) -> bool {
        self.kind == StrategyFailureKind::Unsafe
    }
}

impl From<ScreenError> for StrategyFailure {
    fn from(err: ScreenError) -> Self {
        let kind = if err.is_unsafe() {
            StrategyFailureKind::Unsafe
        } else {
            StrategyFailureKind::Structure
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

pub type StrategyResult = Result<GenerationArtifact, StrategyFailure>;

pub trait Strategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Produce a fully validated artifact for `request`, or say why not.
    fn generate<'a>(&'a self, request: &'a str) -> BoxFuture<'a, StrategyResult>;
}
