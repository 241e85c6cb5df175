//! Live adapters for fxforge (settings, model service, GitHub).

pub mod config;
pub mod github;
pub mod llm;
