//! Pulls discrete source files (or a single logic fragment) out of free-form
//! model output.
//!
//! Per-role extraction tries independent stages in order: fenced block named
//! after the file, fenced block with a C++ tag and the role's opening
//! signature, then a content-signature scan over every block. A block that
//! holds both implementation files is split at the boundary between them.
//! Every function here is pure.

use crate::artifact::FileRole;
use crate::lexer::cached_regex;
use crate::skeleton::{LOGIC_END, LOGIC_START};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Cleaning that would leave less than this rolls back to the raw block.
pub const MIN_PLAUSIBLE_LEN: usize = 100;

/// Shortest fragment accepted after boilerplate removal.
pub const MIN_FRAGMENT_LEN: usize = 10;

// ═══════════════════════════════════════════════════════════════════════════
//  FENCED BLOCKS
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedBlock<'a> {
    /// Text after the opening backticks (language tag and/or file name).
    pub info: &'a str,
    pub body: &'a str,
    /// Up to two non-blank lines right before the opening fence.
    pub preamble: Vec<&'a str>,
}

impl FencedBlock<'_> {
    pub fn language(&self) -> String {
        self.info
            .split(|c: char| c.is_whitespace() || c == ':')
            .next()
            .unwrap_or("")
            .to_ascii_lowercase()
    }

    pub fn is_cpp_tagged(&self) -> bool {
        matches!(
            self.language().as_str(),
            "cpp" | "c++" | "cc" | "cxx" | "h" | "hpp"
        )
    }

    pub fn is_untagged(&self) -> bool {
        self.info.trim().is_empty()
    }
}

/// Split text into fenced blocks. An unterminated block runs to the end; a
/// fence line carrying an info string while a block is open closes it and
/// opens the next one.
pub fn fenced_blocks(text: &str) -> Vec<FencedBlock<'_>> {
    struct Open<'a> {
        info: &'a str,
        body_start: usize,
        preamble: Vec<&'a str>,
    }

    let mut blocks = Vec::new();
    let mut open: Option<Open<'_>> = None;
    let mut recent: Vec<&str> = Vec::new();
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let trimmed = line.trim();
        let fence_info = trimmed.strip_prefix("```").map(str::trim);

        match (open.take(), fence_info) {
            (None, Some(info)) => {
                open = Some(Open {
                    info,
                    body_start: offset,
                    preamble: std::mem::take(&mut recent),
                });
            }
            (None, None) => {
                if !trimmed.is_empty() {
                    recent.push(trimmed);
                    if recent.len() > 2 {
                        recent.remove(0);
                    }
                }
            }
            (Some(current), Some(info)) => {
                blocks.push(FencedBlock {
                    info: current.info,
                    body: &text[current.body_start..line_start],
                    preamble: current.preamble,
                });
                if !info.is_empty() {
                    open = Some(Open {
                        info,
                        body_start: offset,
                        preamble: Vec::new(),
                    });
                }
            }
            (Some(current), None) => open = Some(current),
        }
    }
    if let Some(current) = open {
        blocks.push(FencedBlock {
            info: current.info,
            body: &text[current.body_start..],
            preamble: current.preamble,
        });
    }
    blocks
}

// ═══════════════════════════════════════════════════════════════════════════
//  ROLE SIGNATURES
// ═══════════════════════════════════════════════════════════════════════════

fn processor_class_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&RE, r"class\s+\w*AudioProcessor\s*:")
}

fn editor_class_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&RE, r"class\s+\w*AudioProcessorEditor\s*:")
}

fn editor_scope_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&RE, r"\w*AudioProcessorEditor::~?\w+")
}

fn matches(re: Option<&Regex>, text: &str) -> bool {
    re.is_some_and(|re| re.is_match(text))
}

/// Tokens a block must contain to be classified as `role` with no other hint.
pub fn has_content_signature(body: &str, role: FileRole) -> bool {
    match role {
        FileRole::Processor => body.contains("processBlock") && body.contains("createPluginFilter"),
        FileRole::Editor => {
            body.contains("resized") && body.contains("paint") && body.contains("AudioProcessorEditor")
        }
        FileRole::ProcessorHeader => {
            body.contains("#pragma once") && matches(processor_class_re(), body)
        }
        FileRole::EditorHeader => body.contains("#pragma once") && matches(editor_class_re(), body),
    }
}

/// Opening shape of a well-formed file for `role`.
fn has_opening_signature(body: &str, role: FileRole) -> bool {
    let head = body.trim_start();
    match role {
        FileRole::Processor => {
            head.starts_with("#include")
                && body.contains("processBlock")
                && body.contains("createPluginFilter")
        }
        FileRole::Editor => {
            head.starts_with("#include")
                && matches(editor_scope_re(), body)
                && !body.contains("createPluginFilter")
        }
        FileRole::ProcessorHeader => {
            head.starts_with("#pragma once") && matches(processor_class_re(), body)
        }
        FileRole::EditorHeader => head.starts_with("#pragma once") && matches(editor_class_re(), body),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  STAGES
// ═══════════════════════════════════════════════════════════════════════════

type Stage = fn(&str, FileRole) -> Option<String>;

const STAGES: &[(&str, Stage)] = &[
    ("filename", by_filename),
    ("language_tag", by_language_tag),
    ("content_signature", by_content_signature),
];

/// Stage 1: a fence whose info string, or the heading right above it, names
/// the file.
pub fn by_filename(raw: &str, role: FileRole) -> Option<String> {
    let name = role.file_name().to_ascii_lowercase();
    fenced_blocks(raw)
        .into_iter()
        .find(|block| {
            block.info.to_ascii_lowercase().contains(&name)
                || block
                    .preamble
                    .iter()
                    .any(|line| line.len() < 120 && line.to_ascii_lowercase().contains(&name))
        })
        .map(|block| block.body.to_string())
}

/// Stage 2: a C++-tagged fence that opens the way the role's file opens.
pub fn by_language_tag(raw: &str, role: FileRole) -> Option<String> {
    fenced_blocks(raw)
        .into_iter()
        .find(|block| block.is_cpp_tagged() && has_opening_signature(block.body, role))
        .map(|block| block.body.to_string())
}

/// Stage 3: any C++ or untagged block (or the whole text when there are no
/// fences) containing the role's required tokens.
pub fn by_content_signature(raw: &str, role: FileRole) -> Option<String> {
    let blocks = fenced_blocks(raw);
    if blocks.is_empty() {
        return has_content_signature(raw, role).then(|| raw.to_string());
    }
    blocks
        .into_iter()
        .filter(|block| block.is_cpp_tagged() || block.is_untagged())
        .find(|block| has_content_signature(block.body, role))
        .map(|block| block.body.to_string())
}

/// Extract one file role from raw model output.
pub fn extract(raw: &str, role: FileRole) -> Option<String> {
    let (stage, found) = STAGES
        .iter()
        .find_map(|(name, stage)| stage(raw, role).map(|text| (*name, text)))?;
    tracing::debug!(role = %role, stage, "extracted file");

    let found = match role {
        FileRole::Processor | FileRole::Editor if is_merged(&found) => {
            match split_merged(&found) {
                Some((processor, editor)) => {
                    tracing::debug!(role = %role, "split merged implementation block");
                    if role == FileRole::Processor {
                        processor
                    } else {
                        editor
                    }
                }
                None => found,
            }
        }
        _ => found,
    };
    Some(clean_code(&found))
}

/// Extract each requested role that can be found.
pub fn extract_files(raw: &str, roles: &[FileRole]) -> BTreeMap<FileRole, String> {
    roles
        .iter()
        .filter_map(|role| extract(raw, *role).map(|text| (*role, text)))
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════
//  MERGED BLOCKS
// ═══════════════════════════════════════════════════════════════════════════

/// True when one block carries both the processor entry point and editor
/// member definitions.
pub fn is_merged(text: &str) -> bool {
    text.contains("createPluginFilter") && matches(editor_scope_re(), text)
}

/// Split a merged block into (processor, editor).
///
/// Processor-first text splits after the closing brace of the
/// `createPluginFilter` body; editor-first text splits at the include run
/// preceding the first processor-scope definition.
pub fn split_merged(text: &str) -> Option<(String, String)> {
    let boundary = processor_first_boundary(text);
    let (processor, editor) = match boundary {
        Some(at) if matches(editor_scope_re(), &text[at..]) => (&text[..at], &text[at..]),
        _ => {
            let at = editor_first_boundary(text)?;
            (&text[at..], &text[..at])
        }
    };
    let processor = processor.trim().to_string();
    let editor = editor.trim().to_string();
    let ok = has_content_signature(&processor, FileRole::Processor)
        && editor.contains("resized")
        && editor.contains("paint");
    ok.then_some((processor, editor))
}

fn processor_first_boundary(text: &str) -> Option<usize> {
    let entry = text.find("createPluginFilter")?;
    let open = entry + text[entry..].find('{')?;
    let mut depth = 0usize;
    for (offset, ch) in text[open..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let close = open + offset + 1;
                    let line_end = text[close..]
                        .find('\n')
                        .map(|n| close + n + 1)
                        .unwrap_or(text.len());
                    return Some(line_end);
                }
            }
            _ => {}
        }
    }
    None
}

fn editor_first_boundary(text: &str) -> Option<usize> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let scope = cached_regex(&RE, r"\b\w*AudioProcessor::~?\w+")?;
    let first = scope.find(text)?.start();

    // walk back over the include/comment/blank run that heads the processor file
    let mut boundary = text[..first].rfind('\n').map(|n| n + 1).unwrap_or(0);
    while boundary > 0 {
        let prev_start = text[..boundary - 1].rfind('\n').map(|n| n + 1).unwrap_or(0);
        let prev = text[prev_start..boundary].trim();
        let heads_file =
            prev.is_empty() || prev.starts_with("#include") || prev.starts_with("//");
        if !heads_file {
            break;
        }
        boundary = prev_start;
    }
    (boundary > 0).then_some(boundary)
}

// ═══════════════════════════════════════════════════════════════════════════
//  CLEANING
// ═══════════════════════════════════════════════════════════════════════════

fn is_fence_or_tag_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with("```")
        || matches!(
            trimmed.to_ascii_lowercase().as_str(),
            "cpp" | "c++" | "cxx" | "hpp"
        )
}

/// Strip stray fences and language-tag lines. Rolls back to the trimmed input
/// when the cleaned text would be implausibly short.
pub fn clean_code(text: &str) -> String {
    let cleaned = text
        .lines()
        .filter(|line| !is_fence_or_tag_line(line))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();
    if cleaned.len() < MIN_PLAUSIBLE_LEN {
        tracing::debug!(
            cleaned_len = cleaned.len(),
            "cleaning left too little text, keeping raw block"
        );
        return text.trim().to_string();
    }
    cleaned
}

// ═══════════════════════════════════════════════════════════════════════════
//  FRAGMENTS
// ═══════════════════════════════════════════════════════════════════════════

/// Extract the inner-loop logic fragment a template hole expects.
pub fn extract_fragment(raw: &str) -> Option<String> {
    let candidate = between_markers(raw)
        .or_else(|| first_fenced_logic(raw))
        .or_else(|| looks_like_logic(raw).then(|| raw.trim().to_string()))?;
    let cleaned = clean_fragment(&candidate);
    if cleaned.len() < MIN_FRAGMENT_LEN {
        tracing::debug!(len = cleaned.len(), "fragment too short after cleaning");
        return None;
    }
    Some(cleaned)
}

pub fn between_markers(raw: &str) -> Option<String> {
    let start = raw.find(LOGIC_START)? + LOGIC_START.len();
    let end = start + raw[start..].find(LOGIC_END)?;
    Some(raw[start..end].trim().to_string())
}

fn first_fenced_logic(raw: &str) -> Option<String> {
    let blocks = fenced_blocks(raw);
    blocks
        .iter()
        .find(|block| matches!(block.language().as_str(), "cpp" | "c++"))
        .or_else(|| blocks.iter().find(|block| block.is_untagged()))
        .map(|block| block.body.to_string())
}

/// At least three of seven cheap indicators of DSP statement text.
pub fn looks_like_logic(text: &str) -> bool {
    const INDICATORS: [&str; 7] = ["=", ";", "sample", "channelData", "float", "*", "+"];
    INDICATORS.iter().filter(|i| text.contains(*i)).count() >= 3
}

fn signature_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(
        &RE,
        r"^\s*(?:void|float|double|int|bool|auto)\s+[\w:~]+\s*\([^;=]*\)\s*(?:const)?\s*(?:override)?\s*\{?\s*$",
    )
}

/// Drop includes, class headers and function signatures, then unwrap any
/// braces left enclosing the whole fragment.
pub fn clean_fragment(text: &str) -> String {
    let text = text.replace(LOGIC_START, "").replace(LOGIC_END, "");
    let mut lines: Vec<&str> = text
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            !(trimmed.starts_with("#include")
                || trimmed.starts_with("class ")
                || trimmed.starts_with("struct ")
                || trimmed.starts_with("```")
                || matches(signature_re(), line))
        })
        .collect();

    loop {
        while lines.first().is_some_and(|l| l.trim().is_empty()) {
            lines.remove(0);
        }
        while lines.last().is_some_and(|l| l.trim().is_empty()) {
            lines.pop();
        }
        let wrapped = lines.len() >= 2
            && lines.first().is_some_and(|l| l.trim() == "{")
            && lines
                .last()
                .is_some_and(|l| matches!(l.trim(), "}" | "};"));
        if !wrapped {
            break;
        }
        lines.remove(0);
        lines.pop();
    }
    // a signature line ending in `{` leaves its closing brace behind
    let opens = lines.iter().map(|l| l.matches('{').count()).sum::<usize>();
    let closes = lines.iter().map(|l| l.matches('}').count()).sum::<usize>();
    if closes > opens && lines.last().is_some_and(|l| l.trim() == "}") {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROCESSOR: &str = r#"#include "PluginProcessor.h"
#include "PluginEditor.h"

void VAIstAudioProcessor::processBlock(juce::AudioBuffer<float>& buffer, juce::MidiBuffer&)
{
    for (int channel = 0; channel < buffer.getNumChannels(); ++channel)
        buffer.applyGain(channel, 0, buffer.getNumSamples(), 0.5f);
}

juce::AudioProcessor* JUCE_CALLTYPE createPluginFilter()
{
    return new VAIstAudioProcessor();
}"#;

    const EDITOR: &str = r#"#include "PluginProcessor.h"
#include "PluginEditor.h"

VAIstAudioProcessorEditor::VAIstAudioProcessorEditor(VAIstAudioProcessor& p)
    : AudioProcessorEditor(&p), processorRef(p)
{
    setSize(300, 200);
}

void VAIstAudioProcessorEditor::paint(juce::Graphics& g) { g.fillAll(juce::Colours::black); }
void VAIstAudioProcessorEditor::resized() {}"#;

    const HEADER: &str = r#"#pragma once
#include <juce_audio_processors/juce_audio_processors.h>

class VAIstAudioProcessor : public juce::AudioProcessor
{
public:
    void processBlock(juce::AudioBuffer<float>&, juce::MidiBuffer&) override;
};"#;

    // ═══════════════════════════════════════════════════════════════════════
    //  Fences
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_fenced_blocks_basic() {
        let text = "intro\n```cpp\nint a;\n```\ntext\n```\nb\n```\n";
        let blocks = fenced_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].info, "cpp");
        assert_eq!(blocks[0].body, "int a;\n");
        assert_eq!(blocks[0].preamble, vec!["intro"]);
        assert!(blocks[1].is_untagged());
    }

    #[test]
    fn test_fenced_blocks_unterminated() {
        let blocks = fenced_blocks("```cpp\nint a;\nint b;");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].body, "int a;\nint b;");
    }

    #[test]
    fn test_fence_with_info_reopens() {
        let blocks = fenced_blocks("```cpp PluginProcessor.cpp\na\n```cpp PluginEditor.cpp\nb\n```");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].info, "cpp PluginEditor.cpp");
        assert_eq!(blocks[1].body, "b\n");
    }

    // ═══════════════════════════════════════════════════════════════════════
    //  Stages in isolation
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_stage_filename_in_info() {
        let raw = format!("```cpp Source/PluginEditor.cpp\n{EDITOR}\n```\n```cpp Source/PluginProcessor.cpp\n{PROCESSOR}\n```");
        assert_eq!(by_filename(&raw, FileRole::Processor).unwrap().trim(), PROCESSOR);
        assert_eq!(by_filename(&raw, FileRole::Editor).unwrap().trim(), EDITOR);
        assert!(by_filename(&raw, FileRole::ProcessorHeader).is_none());
    }

    #[test]
    fn test_stage_filename_in_heading() {
        let raw = format!("### PluginProcessor.h\n```cpp\n{HEADER}\n```");
        assert_eq!(by_filename(&raw, FileRole::ProcessorHeader).unwrap().trim(), HEADER);
        assert!(by_filename(&raw, FileRole::Processor).is_none());
    }

    #[test]
    fn test_stage_language_tag() {
        let raw = format!("```cpp\n{EDITOR}\n```\n\n```c++\n{PROCESSOR}\n```");
        assert_eq!(by_language_tag(&raw, FileRole::Processor).unwrap().trim(), PROCESSOR);
        assert_eq!(by_language_tag(&raw, FileRole::Editor).unwrap().trim(), EDITOR);
    }

    #[test]
    fn test_stage_language_tag_requires_tag() {
        let raw = format!("```\n{PROCESSOR}\n```");
        assert!(by_language_tag(&raw, FileRole::Processor).is_none());
        assert!(by_content_signature(&raw, FileRole::Processor).is_some());
    }

    #[test]
    fn test_stage_content_signature_unfenced() {
        assert_eq!(
            by_content_signature(PROCESSOR, FileRole::Processor).as_deref(),
            Some(PROCESSOR)
        );
        assert!(by_content_signature(PROCESSOR, FileRole::Editor).is_none());
    }

    #[test]
    fn test_stage_content_signature_skips_other_languages() {
        let raw = format!("```python\n{PROCESSOR}\n```");
        assert!(by_content_signature(&raw, FileRole::Processor).is_none());
    }

    #[test]
    fn test_header_signatures_do_not_cross() {
        assert!(has_content_signature(HEADER, FileRole::ProcessorHeader));
        assert!(!has_content_signature(HEADER, FileRole::EditorHeader));
        let editor_header = "#pragma once\nclass VAIstAudioProcessorEditor : public juce::AudioProcessorEditor {};";
        assert!(has_content_signature(editor_header, FileRole::EditorHeader));
        assert!(!has_content_signature(editor_header, FileRole::ProcessorHeader));
    }

    // ═══════════════════════════════════════════════════════════════════════
    //  Merged blocks
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_split_processor_first() {
        let merged = format!("{PROCESSOR}\n\n{EDITOR}");
        assert!(is_merged(&merged));
        let (processor, editor) = split_merged(&merged).unwrap();
        assert_eq!(processor, PROCESSOR);
        assert_eq!(editor, EDITOR);
    }

    #[test]
    fn test_split_editor_first() {
        let merged = format!("{EDITOR}\n\n{PROCESSOR}");
        let (processor, editor) = split_merged(&merged).unwrap();
        assert_eq!(processor, PROCESSOR);
        assert_eq!(editor, EDITOR);
    }

    #[test]
    fn test_extract_splits_merged_block() {
        let raw = format!("Here you go:\n```cpp\n{PROCESSOR}\n\n{EDITOR}\n```");
        let files = extract_files(&raw, &[FileRole::Processor, FileRole::Editor]);
        assert_eq!(files.get(&FileRole::Processor).map(String::as_str), Some(PROCESSOR));
        assert_eq!(files.get(&FileRole::Editor).map(String::as_str), Some(EDITOR));
    }

    #[test]
    fn test_processor_alone_is_not_merged() {
        assert!(!is_merged(PROCESSOR));
    }

    // ═══════════════════════════════════════════════════════════════════════
    //  Cleaning
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_clean_strips_residual_fences() {
        let dirty = format!("cpp\n{PROCESSOR}\n```");
        assert_eq!(clean_code(&dirty), PROCESSOR);
    }

    #[test]
    fn test_clean_rolls_back_when_too_short() {
        let dirty = "```cpp\nint x = 1;\n```";
        assert_eq!(clean_code(dirty), dirty);
    }

    // ═══════════════════════════════════════════════════════════════════════
    //  Fragments
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_fragment_between_markers() {
        let raw = format!("Sure!\n{LOGIC_START}\nwet = std::tanh(dry * drive);\n{LOGIC_END}\n");
        assert_eq!(extract_fragment(&raw).as_deref(), Some("wet = std::tanh(dry * drive);"));
    }

    #[test]
    fn test_fragment_from_cpp_fence_drops_boilerplate() {
        let raw = "```cpp\n#include <cmath>\nvoid process(float dry)\n{\n    wet = std::atan(dry * drive);\n}\n```";
        assert_eq!(
            extract_fragment(raw).as_deref(),
            Some("wet = std::atan(dry * drive);")
        );
    }

    #[test]
    fn test_fragment_keeps_inner_blocks() {
        let raw = "```cpp\nif (dry > 0.0f)\n{\n    wet = dry * drive;\n}\n```";
        assert_eq!(
            extract_fragment(raw).as_deref(),
            Some("if (dry > 0.0f)\n{\n    wet = dry * drive;\n}")
        );
    }

    #[test]
    fn test_fragment_keeps_local_declarations() {
        let raw = "```cpp\nfloat shaped = std::tanh(dry);\nwet = shaped;\n```";
        assert_eq!(
            extract_fragment(raw).as_deref(),
            Some("float shaped = std::tanh(dry);\nwet = shaped;")
        );
    }

    #[test]
    fn test_fragment_raw_text_needs_indicators() {
        assert_eq!(
            extract_fragment("channelData[sample] *= gain;").as_deref(),
            Some("channelData[sample] *= gain;")
        );
        assert!(extract_fragment("I cannot help with that").is_none());
    }

    #[test]
    fn test_fragment_too_short_rejected() {
        assert!(extract_fragment("```cpp\nx=1;\n```").is_none());
    }
}
