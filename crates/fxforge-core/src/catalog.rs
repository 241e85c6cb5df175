//! Identifier catalog: the declared surface each plugin skeleton exposes to
//! generated DSP logic, plus the table of commonly hallucinated names.
//!
//! The catalog is built once at startup and shared read-only between tasks.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Language keywords subtracted before any identifier lookup.
pub const CPP_KEYWORDS: &[&str] = &[
    "if", "else", "for", "while", "do", "switch", "case", "default", "break", "continue",
    "return", "void", "int", "float", "double", "bool", "char", "auto", "const", "static",
    "true", "false", "nullptr", "new", "delete", "class", "struct", "public", "private",
    "protected", "virtual", "override", "template", "typename", "sizeof", "using", "namespace",
    "include",
];

/// Names valid in every category: std math, casts and framework namespaces.
pub const GLOBAL_BUILTINS: &[&str] = &[
    "std", "tanh", "atan", "sin", "cos", "abs", "sqrt", "pow", "log", "exp", "min", "max",
    "clamp", "floor", "ceil", "round", "float", "int", "double", "bool", "auto", "const",
    "static", "if", "else", "for", "while", "return", "true", "false", "juce", "MathConstants",
    "pi", "static_cast", "fabs", "jlimit", "jmin", "jmax",
];

pub fn is_keyword(name: &str) -> bool {
    CPP_KEYWORDS.contains(&name)
}

pub fn is_builtin(name: &str) -> bool {
    GLOBAL_BUILTINS.contains(&name)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("identifier '{name}' declared as both {first} and {second}")]
    Overlap {
        name: String,
        first: IdentifierKind,
        second: IdentifierKind,
    },
    #[error("correction '{from}' -> '{to}' targets a name no category declares")]
    DanglingCorrection { from: String, to: String },
}

// ═══════════════════════════════════════════════════════════════════════════
//  CATEGORIES
// ═══════════════════════════════════════════════════════════════════════════

/// Closed set of skeleton families. Each variant owns one identifier surface
/// and one processor skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginCategory {
    Gain,
    Waveshaper,
    Filter,
    Delay,
    Generic,
}

impl PluginCategory {
    pub const ALL: [PluginCategory; 5] = [
        PluginCategory::Gain,
        PluginCategory::Waveshaper,
        PluginCategory::Filter,
        PluginCategory::Delay,
        PluginCategory::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PluginCategory::Gain => "gain",
            PluginCategory::Waveshaper => "waveshaper",
            PluginCategory::Filter => "filter",
            PluginCategory::Delay => "delay",
            PluginCategory::Generic => "generic",
        }
    }

    /// Request keywords that vote for this category. `Generic` never wins a vote.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            PluginCategory::Gain => &["gain", "volume", "level", "amplitude", "loudness"],
            PluginCategory::Waveshaper => &[
                "distort",
                "overdrive",
                "saturation",
                "fuzz",
                "clip",
                "waveshap",
                "crunch",
                "drive",
            ],
            PluginCategory::Filter => &[
                "filter",
                "eq",
                "equalizer",
                "lowpass",
                "highpass",
                "bandpass",
                "cutoff",
                "resonance",
            ],
            PluginCategory::Delay => &["delay", "echo", "reverb", "time", "feedback"],
            PluginCategory::Generic => &[],
        }
    }

    /// Pick the category whose keyword list has the most substring hits in the
    /// request. Ties go to the earlier variant; no hits at all gives `Generic`.
    pub fn detect(request: &str) -> Self {
        let lower = request.to_lowercase();
        let mut best = PluginCategory::Generic;
        let mut best_score = 0usize;
        for category in Self::ALL {
            let score = category
                .keywords()
                .iter()
                .filter(|kw| lower.contains(*kw))
                .count();
            if score > best_score {
                best = category;
                best_score = score;
            }
        }
        tracing::debug!(category = best.as_str(), score = best_score, "detected plugin category");
        best
    }
}

impl fmt::Display for PluginCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PluginCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gain" => Ok(PluginCategory::Gain),
            "waveshaper" | "distortion" => Ok(PluginCategory::Waveshaper),
            "filter" => Ok(PluginCategory::Filter),
            "delay" => Ok(PluginCategory::Delay),
            "generic" => Ok(PluginCategory::Generic),
            other => Err(format!(
                "unknown category '{}' (expected gain, waveshaper, filter, delay or generic)",
                other
            )),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDENTIFIER SETS
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Parameter,
    Variable,
    Function,
    Builtin,
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IdentifierKind::Parameter => "parameter",
            IdentifierKind::Variable => "variable",
            IdentifierKind::Function => "function",
            IdentifierKind::Builtin => "builtin",
        };
        f.write_str(label)
    }
}

/// Three disjoint name sets plus the global builtins.
#[derive(Debug, Clone, Default)]
pub struct IdentifierSet {
    parameters: BTreeSet<String>,
    variables: BTreeSet<String>,
    functions: BTreeSet<String>,
    folded: HashMap<String, String>,
}

impl IdentifierSet {
    pub fn new(
        parameters: &[&str],
        variables: &[&str],
        functions: &[&str],
    ) -> Result<Self, CatalogError> {
        let mut set = IdentifierSet::default();
        set.extend(IdentifierKind::Parameter, parameters.iter().copied())?;
        set.extend(IdentifierKind::Variable, variables.iter().copied())?;
        set.extend(IdentifierKind::Function, functions.iter().copied())?;
        Ok(set)
    }

    /// Add names under one kind, keeping the three kinds disjoint.
    pub fn extend<'a>(
        &mut self,
        kind: IdentifierKind,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), CatalogError> {
        for name in names {
            if let Some(existing) = self.declared_kind(name) {
                if existing == kind {
                    continue;
                }
                return Err(CatalogError::Overlap {
                    name: name.to_string(),
                    first: existing,
                    second: kind,
                });
            }
            let bucket = match kind {
                IdentifierKind::Parameter => &mut self.parameters,
                IdentifierKind::Variable => &mut self.variables,
                IdentifierKind::Function | IdentifierKind::Builtin => &mut self.functions,
            };
            bucket.insert(name.to_string());
            self.folded
                .entry(name.to_ascii_lowercase())
                .or_insert_with(|| name.to_string());
        }
        Ok(())
    }

    fn declared_kind(&self, name: &str) -> Option<IdentifierKind> {
        if self.parameters.contains(name) {
            Some(IdentifierKind::Parameter)
        } else if self.variables.contains(name) {
            Some(IdentifierKind::Variable)
        } else if self.functions.contains(name) {
            Some(IdentifierKind::Function)
        } else {
            None
        }
    }

    /// Exact, case-sensitive classification including builtins.
    pub fn kind_of(&self, name: &str) -> Option<IdentifierKind> {
        self.declared_kind(name)
            .or_else(|| is_builtin(name).then_some(IdentifierKind::Builtin))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kind_of(name).is_some()
    }

    /// Canonical spelling of a name that differs only in letter case.
    pub fn canonical_case(&self, name: &str) -> Option<&str> {
        let lower = name.to_ascii_lowercase();
        if let Some(canonical) = self.folded.get(&lower) {
            return Some(canonical.as_str());
        }
        GLOBAL_BUILTINS
            .iter()
            .find(|builtin| builtin.eq_ignore_ascii_case(name))
            .copied()
    }

    pub fn parameters(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(String::as_str)
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(String::as_str)
    }

    pub fn functions(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(String::as_str)
    }

    /// Every declared name (builtins excluded), sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut all: Vec<&str> = self
            .parameters()
            .chain(self.variables())
            .chain(self.functions())
            .collect();
        all.sort_unstable();
        all
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  CORRECTIONS
// ═══════════════════════════════════════════════════════════════════════════

/// Hallucinated name -> canonical name.
#[derive(Debug, Clone, Default)]
pub struct CorrectionTable {
    entries: BTreeMap<String, String>,
}

impl CorrectionTable {
    /// Build the table, rejecting any entry whose target no set declares.
    pub fn new<'a>(
        entries: impl IntoIterator<Item = (&'a str, &'a str)>,
        sets: &[&IdentifierSet],
    ) -> Result<Self, CatalogError> {
        let mut table = BTreeMap::new();
        for (from, to) in entries {
            if !sets.iter().any(|set| set.contains(to)) {
                return Err(CatalogError::DanglingCorrection {
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
            table.insert(from.to_string(), to.to_string());
        }
        Ok(Self { entries: table })
    }

    /// The correction for `name`, only if its target is valid in `set`.
    pub fn resolve<'t>(&'t self, name: &str, set: &IdentifierSet) -> Option<&'t str> {
        self.entries
            .get(name)
            .map(String::as_str)
            .filter(|target| set.contains(target))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

const CORRECTIONS: &[(&str, &str)] = &[
    // gain
    ("gainParam", "gainParameter"),
    ("gainValue", "gain"),
    ("gainAmount", "gain"),
    ("masterGain", "gain"),
    ("volume", "gain"),
    ("volumeParam", "gainParameter"),
    // drive
    ("driveParameter", "driveParam"),
    ("driveValue", "drive"),
    ("driveAmount", "drive"),
    ("distortion", "drive"),
    ("distortionAmount", "drive"),
    // mix
    ("mixParameter", "mixParam"),
    ("mixValue", "mix"),
    ("mixAmount", "mix"),
    ("wetDry", "mix"),
    ("dryWet", "mix"),
    ("wetMix", "mix"),
    // cutoff
    ("cutoffParameter", "cutoffParam"),
    ("cutoffValue", "cutoff"),
    ("cutoffFreq", "cutoff"),
    ("filterCutoff", "cutoff"),
    ("frequency", "cutoff"),
    ("freq", "cutoff"),
    // resonance
    ("resonanceParameter", "resonanceParam"),
    ("resonanceValue", "Q"),
    ("res", "Q"),
    ("q", "Q"),
    // delay time
    ("delayTimeParameter", "delayTimeParam"),
    ("delayTimeValue", "delayTime"),
    ("time", "delayTime"),
    ("delay", "delayTime"),
    // feedback
    ("feedbackParameter", "feedbackParam"),
    ("feedbackValue", "feedback"),
    ("feedbackAmount", "feedback"),
    ("fb", "feedback"),
    // loop variables
    ("samples", "numSamples"),
    ("numSample", "numSamples"),
    ("sampleCount", "numSamples"),
    ("bufferSize", "numSamples"),
    ("data", "channelData"),
    ("audioData", "channelData"),
    ("inputData", "channelData"),
    ("outputData", "channelData"),
    ("inputSample", "dry"),
    ("drySignal", "dry"),
    ("originalSample", "dry"),
    ("outputSample", "wet"),
    ("wetSignal", "wet"),
    ("processedSample", "wet"),
];

// ═══════════════════════════════════════════════════════════════════════════
//  CATALOG
// ═══════════════════════════════════════════════════════════════════════════

const LOOP_VARIABLES: &[&str] = &["channelData", "numSamples", "sample", "channel", "buffer"];
const ACCESSORS: &[&str] = &["get", "set"];

/// Identifier surfaces for every category plus the shared correction table.
#[derive(Debug, Clone)]
pub struct Catalog {
    gain: IdentifierSet,
    waveshaper: IdentifierSet,
    filter: IdentifierSet,
    delay: IdentifierSet,
    corrections: CorrectionTable,
}

impl Catalog {
    pub fn builtin() -> Result<Self, CatalogError> {
        let gain = IdentifierSet::new(&["gainParameter", "gain"], LOOP_VARIABLES, ACCESSORS)?;

        let mut waveshaper = IdentifierSet::new(
            &["driveParam", "mixParam", "drive", "mix"],
            LOOP_VARIABLES,
            &["get", "set", "tanh", "atan", "sin", "cos", "abs", "sqrt", "pow"],
        )?;
        waveshaper.extend(IdentifierKind::Variable, ["dry", "wet"])?;

        let mut filter = IdentifierSet::new(
            &["cutoffParam", "resonanceParam", "cutoff", "Q"],
            LOOP_VARIABLES,
            &["get", "set", "sin", "cos"],
        )?;
        filter.extend(
            IdentifierKind::Variable,
            [
                "input", "output", "z1", "z2", "sampleRate", "b0", "b1", "b2", "a0", "a1", "a2",
                "omega", "sinOmega", "cosOmega", "alpha",
            ],
        )?;

        let mut delay = IdentifierSet::new(
            &[
                "delayTimeParam",
                "feedbackParam",
                "mixParam",
                "delayTime",
                "feedback",
                "mix",
            ],
            LOOP_VARIABLES,
            ACCESSORS,
        )?;
        delay.extend(
            IdentifierKind::Variable,
            [
                "dry",
                "wet",
                "delayData",
                "readPos",
                "writePosition",
                "bufferSize",
                "delaySamples",
            ],
        )?;

        let corrections = CorrectionTable::new(
            CORRECTIONS.iter().copied(),
            &[&gain, &waveshaper, &filter, &delay],
        )?;

        Ok(Self {
            gain,
            waveshaper,
            filter,
            delay,
            corrections,
        })
    }

    pub fn identifiers(&self, category: PluginCategory) -> &IdentifierSet {
        match category {
            PluginCategory::Gain | PluginCategory::Generic => &self.gain,
            PluginCategory::Waveshaper => &self.waveshaper,
            PluginCategory::Filter => &self.filter,
            PluginCategory::Delay => &self.delay,
        }
    }

    pub fn corrections(&self) -> &CorrectionTable {
        &self.corrections
    }

    /// Identifier listing handed to the model so it stays inside the surface.
    pub fn context_prompt(&self, category: PluginCategory) -> String {
        let set = self.identifiers(category);
        let mut lines = vec![
            format!(
                "AVAILABLE IDENTIFIERS FOR {} TEMPLATE:",
                category.as_str().to_uppercase()
            ),
            String::new(),
            "Parameters (use ->get() to read):".to_string(),
        ];
        lines.extend(set.parameters().map(|p| format!("  - {}", p)));
        lines.push(String::new());
        lines.push("Variables (already declared, use directly):".to_string());
        lines.extend(set.variables().map(|v| format!("  - {}", v)));
        lines.push(String::new());
        lines.push("Functions:".to_string());
        lines.extend(set.functions().map(|f| format!("  - {}", f)));
        lines.push(String::new());
        lines.push("IMPORTANT: Only use the identifiers listed above.".to_string());
        lines.push("Do NOT invent new variable names or use variations like:".to_string());
        let examples: Vec<(&str, &str)> = self
            .corrections
            .iter()
            .filter(|(_, to)| set.contains(to))
            .take(3)
            .collect();
        for (from, to) in examples {
            lines.push(format!("  - {} (use {})", from, to));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_consistent() {
        let catalog = Catalog::builtin().unwrap();
        assert!(catalog.corrections().len() > 40);
        for category in PluginCategory::ALL {
            assert!(!catalog.identifiers(category).names().is_empty());
        }
    }

    #[test]
    fn test_overlapping_kinds_rejected() {
        let err = IdentifierSet::new(&["gain"], &["gain"], &[]).unwrap_err();
        assert_eq!(
            err,
            CatalogError::Overlap {
                name: "gain".to_string(),
                first: IdentifierKind::Parameter,
                second: IdentifierKind::Variable,
            }
        );
    }

    #[test]
    fn test_dangling_correction_rejected() {
        let set = IdentifierSet::new(&["gain"], &[], &[]).unwrap();
        let err = CorrectionTable::new([("volume", "loudness")], &[&set]).unwrap_err();
        assert!(matches!(err, CatalogError::DanglingCorrection { .. }));
    }

    #[test]
    fn test_correction_only_resolves_within_category() {
        let catalog = Catalog::builtin().unwrap();
        let table = catalog.corrections();
        let waveshaper = catalog.identifiers(PluginCategory::Waveshaper);
        let gain = catalog.identifiers(PluginCategory::Gain);
        assert_eq!(table.resolve("driveAmount", waveshaper), Some("drive"));
        assert_eq!(table.resolve("driveAmount", gain), None);
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let catalog = Catalog::builtin().unwrap();
        let delay = catalog.identifiers(PluginCategory::Delay);
        assert_eq!(delay.canonical_case("delaytime"), Some("delayTime"));
        assert_eq!(delay.canonical_case("TANH"), Some("tanh"));
        assert_eq!(delay.canonical_case("masterVolume"), None);
    }

    #[test]
    fn test_builtins_valid_everywhere() {
        let catalog = Catalog::builtin().unwrap();
        for category in PluginCategory::ALL {
            let set = catalog.identifiers(category);
            assert_eq!(set.kind_of("std"), Some(IdentifierKind::Builtin));
            assert!(set.contains("juce"));
        }
    }

    #[test]
    fn test_detect_category_by_keyword_count() {
        assert_eq!(
            PluginCategory::detect("A warm distortion with a big drive knob"),
            PluginCategory::Waveshaper
        );
        assert_eq!(
            PluginCategory::detect("Resonant lowpass filter"),
            PluginCategory::Filter
        );
        assert_eq!(
            PluginCategory::detect("tape echo with feedback"),
            PluginCategory::Delay
        );
        assert_eq!(PluginCategory::detect("something weird"), PluginCategory::Generic);
    }

    #[test]
    fn test_detect_ties_use_enumeration_order() {
        // one gain keyword, one delay keyword
        assert_eq!(
            PluginCategory::detect("volume and echo"),
            PluginCategory::Gain
        );
    }

    #[test]
    fn test_context_prompt_lists_surface() {
        let catalog = Catalog::builtin().unwrap();
        let prompt = catalog.context_prompt(PluginCategory::Waveshaper);
        assert!(prompt.starts_with("AVAILABLE IDENTIFIERS FOR WAVESHAPER TEMPLATE:"));
        assert!(prompt.contains("  - driveParam"));
        assert!(prompt.contains("  - wet"));
        assert!(prompt.contains("Only use the identifiers listed above"));
    }

    #[test]
    fn test_category_parse_accepts_distortion_alias() {
        assert_eq!(
            "Distortion".parse::<PluginCategory>().unwrap(),
            PluginCategory::Waveshaper
        );
        assert!("chorus".parse::<PluginCategory>().is_err());
    }
}
