//! Verification gate: checks generated logic against a declared identifier
//! surface, auto-correcting what it safely can.
//!
//! Classification order per identifier: exact match, case-insensitive match,
//! correction table, undeclared. Corrections are applied as whole tokens in a
//! single pass and the result is re-scanned exactly once.

use crate::catalog::{is_keyword, Catalog, CorrectionTable, IdentifierSet, PluginCategory};
use crate::lexer::{identifier_spans, mask_literals_and_comments, replace_spans};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correction {
    pub from: String,
    pub to: String,
}

impl fmt::Display for Correction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' -> '{}'", self.from, self.to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// True iff no undeclared identifier remains after corrections.
    pub valid: bool,
    /// Set whenever at least one correction was made, valid or not.
    pub corrected_text: Option<String>,
    pub errors: Vec<String>,
    pub corrections_applied: Vec<Correction>,
}

impl VerificationResult {
    /// The text that should move forward: corrected if anything changed.
    pub fn effective_text<'a>(&'a self, original: &'a str) -> &'a str {
        self.corrected_text.as_deref().unwrap_or(original)
    }

    /// Errors joined for logs and repair prompts.
    pub fn error_summary(&self) -> String {
        self.errors.join("\n")
    }
}

pub fn undeclared_message(name: &str) -> String {
    format!("Undeclared identifier: '{}'", name)
}

enum Verdict {
    Valid,
    Correct(String),
    Undeclared,
}

fn classify(name: &str, set: &IdentifierSet, corrections: &CorrectionTable) -> Verdict {
    if set.contains(name) {
        return Verdict::Valid;
    }
    if let Some(canonical) = set.canonical_case(name) {
        return Verdict::Correct(canonical.to_string());
    }
    match corrections.resolve(name, set) {
        Some(target) => Verdict::Correct(target.to_string()),
        None => Verdict::Undeclared,
    }
}

/// Verify `logic` against the surface of one catalog category.
pub fn verify(catalog: &Catalog, logic: &str, category: PluginCategory) -> VerificationResult {
    verify_against(logic, catalog.identifiers(category), catalog.corrections())
}

/// Verify `logic` against an explicit surface.
pub fn verify_against(
    logic: &str,
    set: &IdentifierSet,
    corrections: &CorrectionTable,
) -> VerificationResult {
    let masked = mask_literals_and_comments(logic);
    let spans: Vec<_> = identifier_spans(&masked)
        .into_iter()
        .filter(|(_, token)| !is_keyword(token))
        .collect();

    let mut planned: HashMap<&str, String> = HashMap::new();
    let mut corrections_applied = Vec::new();
    let mut seen = BTreeSet::new();
    for (_, token) in &spans {
        if !seen.insert(*token) {
            continue;
        }
        if let Verdict::Correct(target) = classify(token, set, corrections) {
            corrections_applied.push(Correction {
                from: token.to_string(),
                to: target.clone(),
            });
            planned.insert(*token, target);
        }
    }

    let corrected_text = if planned.is_empty() {
        None
    } else {
        let replacements: Vec<_> = spans
            .iter()
            .filter_map(|(range, token)| {
                planned
                    .get(token)
                    .map(|target| (range.clone(), target.as_str()))
            })
            .collect();
        for correction in &corrections_applied {
            tracing::info!(from = %correction.from, to = %correction.to, "auto-corrected identifier");
        }
        Some(replace_spans(logic, &replacements))
    };

    let final_text = corrected_text.as_deref().unwrap_or(logic);
    let undeclared = undeclared_identifiers(final_text, set);
    for name in &undeclared {
        tracing::warn!(identifier = %name, "undeclared identifier in generated logic");
    }

    VerificationResult {
        valid: undeclared.is_empty(),
        corrected_text,
        errors: undeclared.iter().map(|name| undeclared_message(name)).collect(),
        corrections_applied,
    }
}

/// Identifiers in `text` that `set` does not declare, sorted.
pub fn undeclared_identifiers(text: &str, set: &IdentifierSet) -> BTreeSet<String> {
    let masked = mask_literals_and_comments(text);
    identifier_spans(&masked)
        .into_iter()
        .map(|(_, token)| token)
        .filter(|token| !is_keyword(token) && !set.contains(token))
        .map(str::to_string)
        .collect()
}
