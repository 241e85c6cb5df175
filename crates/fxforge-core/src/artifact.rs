//! Generated source files keyed by role.

use crate::catalog::PluginCategory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Repository path of the build configuration carrying the plugin code.
pub const BUILD_CONFIG_PATH: &str = "CMakeLists.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileRole {
    Processor,
    Editor,
    ProcessorHeader,
    EditorHeader,
}

impl FileRole {
    pub const ALL: [FileRole; 4] = [
        FileRole::Processor,
        FileRole::Editor,
        FileRole::ProcessorHeader,
        FileRole::EditorHeader,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            FileRole::Processor => "PluginProcessor.cpp",
            FileRole::Editor => "PluginEditor.cpp",
            FileRole::ProcessorHeader => "PluginProcessor.h",
            FileRole::EditorHeader => "PluginEditor.h",
        }
    }

    pub fn repo_path(&self) -> String {
        format!("Source/{}", self.file_name())
    }

    pub fn is_interface(&self) -> bool {
        matches!(self, FileRole::ProcessorHeader | FileRole::EditorHeader)
    }
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Schema,
    Template,
    Full,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Schema => "schema",
            StrategyKind::Template => "template",
            StrategyKind::Full => "full",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The hole-filling fragment a template artifact was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectedLogic {
    pub category: PluginCategory,
    pub fragment: String,
}

/// Immutable output of one strategy run. Interface roles may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationArtifact {
    pub strategy: StrategyKind,
    files: BTreeMap<FileRole, String>,
    pub injected: Option<InjectedLogic>,
}

impl GenerationArtifact {
    pub fn new(strategy: StrategyKind, files: BTreeMap<FileRole, String>) -> Self {
        Self {
            strategy,
            files,
            injected: None,
        }
    }

    pub fn with_injected(mut self, category: PluginCategory, fragment: impl Into<String>) -> Self {
        self.injected = Some(InjectedLogic {
            category,
            fragment: fragment.into(),
        });
        self
    }

    pub fn file(&self, role: FileRole) -> Option<&str> {
        self.files.get(&role).map(String::as_str)
    }

    pub fn roles(&self) -> impl Iterator<Item = FileRole> + '_ {
        self.files.keys().copied()
    }

    /// Copy of this artifact with one role replaced.
    pub fn replacing(&self, role: FileRole, content: String) -> Self {
        let mut files = self.files.clone();
        files.insert(role, content);
        Self {
            strategy: self.strategy,
            files,
            injected: self.injected.clone(),
        }
    }

    pub fn interface_texts(&self) -> Vec<&str> {
        self.files
            .iter()
            .filter(|(role, _)| role.is_interface())
            .map(|(_, text)| text.as_str())
            .collect()
    }

    pub fn implementation_texts(&self) -> Vec<&str> {
        self.files
            .iter()
            .filter(|(role, _)| !role.is_interface())
            .map(|(_, text)| text.as_str())
            .collect()
    }

    /// Repository path -> content, for an atomic push.
    pub fn to_repo_files(&self) -> BTreeMap<String, String> {
        self.files
            .iter()
            .map(|(role, text)| (role.repo_path(), text.clone()))
            .collect()
    }
}
