//! Core domain for fxforge: identifier catalog, extraction, verification,
//! screening, rendering and task state. Everything here is synchronous and
//! free of I/O except the port contracts.

pub mod artifact;
pub mod build_id;
pub mod catalog;
pub mod codegen;
pub mod consistency;
pub mod extract;
pub mod juce;
mod lexer;
pub mod ports;
pub mod salvage;
pub mod schema;
pub mod screen;
pub mod skeleton;
pub mod task;
pub mod verify;

pub use artifact::{FileRole, GenerationArtifact, StrategyKind, BUILD_CONFIG_PATH};
pub use catalog::{Catalog, PluginCategory};
pub use task::{FailureKind, Phase, TaskId, TaskState, TaskStatus};
pub use verify::VerificationResult;
