//! Structural screening of generated sources before anything is pushed.
//!
//! Unsafe constructs are a hard failure and are never retried with the same
//! content. Missing required symbols are a separate, recoverable failure.

use crate::artifact::{FileRole, GenerationArtifact};
use crate::lexer::cached_regex;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Fragments longer than this are suspicious for a single inner loop.
pub const FRAGMENT_WARN_LEN: usize = 2000;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScreenError {
    #[error("unsafe construct in {location}: {construct}")]
    Unsafe { location: String, construct: String },
    #[error("{role} is missing required symbol '{symbol}'")]
    MissingSymbol { role: FileRole, symbol: String },
}

impl ScreenError {
    pub fn is_unsafe(&self) -> bool {
        matches!(self, ScreenError::Unsafe { .. })
    }
}

const DENYLIST: &[(&str, &str)] = &[
    (r"std::system\s*\(", "std::system("),
    (r"(?:^|[^\w:])system\s*\(", "system("),
    (r"#\s*include\s*<filesystem>", "#include <filesystem>"),
    (r"\bfopen\s*\(", "fopen("),
    (r"\bfwrite\s*\(", "fwrite("),
    (r"\bfread\s*\(", "fread("),
    (r"\bsocket\s*\(", "socket("),
    (r"(?:^|[^\w.>])connect\s*\(", "connect("),
    (r"\bexec(?:l|lp|le|v|vp|ve|vpe)\s*\(", "exec*("),
    (r"\bpopen\s*\(", "popen("),
    (r"ShellExecute", "ShellExecute"),
    (r"CreateProcess", "CreateProcess"),
    (r"WinExec", "WinExec"),
];

fn denylist() -> &'static [(Regex, &'static str)] {
    static COMPILED: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        DENYLIST
            .iter()
            .filter_map(|(pattern, label)| {
                Regex::new(&format!("(?im){pattern}"))
                    .ok()
                    .map(|re| (re, *label))
            })
            .collect()
    })
}

/// First denylisted construct found in `text`, if any.
pub fn find_unsafe(text: &str) -> Option<&'static str> {
    denylist()
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, label)| *label)
}

fn check_unsafe(text: &str, location: &str) -> Result<(), ScreenError> {
    match find_unsafe(text) {
        Some(construct) => {
            tracing::warn!(location, construct, "unsafe construct in generated code");
            Err(ScreenError::Unsafe {
                location: location.to_string(),
                construct: construct.to_string(),
            })
        }
        None => Ok(()),
    }
}

fn processor_scope_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&RE, r"\w*AudioProcessor(?:::|\s*\(|\s*:)")
}

fn missing(role: FileRole, symbol: &str) -> ScreenError {
    ScreenError::MissingSymbol {
        role,
        symbol: symbol.to_string(),
    }
}

/// Symbols a role's file must contain to be worth building.
pub fn check_required_symbols(text: &str, role: FileRole) -> Result<(), ScreenError> {
    match role {
        FileRole::Processor => {
            if !processor_scope_re().is_some_and(|re| re.is_match(text)) {
                return Err(missing(role, "AudioProcessor"));
            }
            for symbol in ["processBlock", "createPluginFilter", "#include"] {
                if !text.contains(symbol) {
                    return Err(missing(role, symbol));
                }
            }
        }
        FileRole::Editor => {
            for symbol in ["AudioProcessorEditor", "resized(", "paint(", "#include"] {
                if !text.contains(symbol) {
                    return Err(missing(role, symbol));
                }
            }
        }
        FileRole::ProcessorHeader | FileRole::EditorHeader => {}
    }
    Ok(())
}

/// Screen one file: denylist first, then required symbols.
pub fn screen_file(text: &str, role: FileRole) -> Result<(), ScreenError> {
    check_unsafe(text, role.file_name())?;
    check_required_symbols(text, role)
}

/// Screen every file in an artifact. Unsafe content anywhere wins over a
/// missing symbol elsewhere.
pub fn screen_artifact(artifact: &GenerationArtifact) -> Result<(), ScreenError> {
    for role in artifact.roles() {
        if let Some(text) = artifact.file(role) {
            check_unsafe(text, role.file_name())?;
        }
    }
    for role in [FileRole::Processor, FileRole::Editor] {
        match artifact.file(role) {
            Some(text) => check_required_symbols(text, role)?,
            None => return Err(missing(role, role.file_name())),
        }
    }
    Ok(())
}

/// Denylist check for an injectable fragment; oversized fragments only warn.
pub fn screen_fragment(fragment: &str) -> Result<(), ScreenError> {
    if fragment.len() > FRAGMENT_WARN_LEN {
        tracing::warn!(
            len = fragment.len(),
            limit = FRAGMENT_WARN_LEN,
            "logic fragment is unusually long"
        );
    }
    check_unsafe(fragment, "logic fragment")
}
