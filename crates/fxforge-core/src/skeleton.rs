//! Fixed processor skeletons, one per category, each with a single logic hole
//! the model fills.

use crate::artifact::{FileRole, GenerationArtifact, StrategyKind};
use crate::catalog::PluginCategory;
use crate::juce::{editor_header, editor_source, processor_header, Control};
use std::collections::BTreeMap;
use thiserror::Error;

pub const LOGIC_START: &str = "// === AI_LOGIC_START ===";
pub const LOGIC_END: &str = "// === AI_LOGIC_END ===";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InjectError {
    #[error("skeleton has no '{}' marker", LOGIC_START)]
    MissingStart,
    #[error("skeleton has no '{}' marker after the start marker", LOGIC_END)]
    MissingEnd,
    #[error("logic fragment is empty")]
    EmptyFragment,
}

#[derive(Debug)]
pub struct Skeleton {
    pub category: PluginCategory,
    pub title: &'static str,
    pub processor: &'static str,
    /// (knob name, label, processor member)
    controls: &'static [(&'static str, &'static str, &'static str)],
    state: &'static [&'static str],
    /// What the hole may read and write, shown to the model.
    pub guidance: &'static [&'static str],
}

const GAIN: Skeleton = Skeleton {
    category: PluginCategory::Gain,
    title: "FxForge Gain",
    processor: include_str!("../skeletons/gain.cpp"),
    controls: &[("gain", "Gain", "gainParameter")],
    state: &[],
    guidance: &[
        "gain (0.0 to 2.0) is already read from gainParameter",
        "Read and write channelData[sample]; numSamples is the loop bound",
        "Do NOT declare new class members; use local variables only",
    ],
};

const WAVESHAPER: Skeleton = Skeleton {
    category: PluginCategory::Waveshaper,
    title: "FxForge Distortion",
    processor: include_str!("../skeletons/waveshaper.cpp"),
    controls: &[("drive", "Drive", "driveParam"), ("mix", "Mix", "mixParam")],
    state: &[],
    guidance: &[
        "dry holds the input sample; assign the shaped result to wet",
        "drive runs 1.0 to 20.0; mix runs 0.0 to 1.0 and is applied after your code",
        "Use std::tanh, std::atan or std::sin for the curve",
        "Do NOT declare new class members",
    ],
};

const FILTER: Skeleton = Skeleton {
    category: PluginCategory::Filter,
    title: "FxForge Filter",
    processor: include_str!("../skeletons/filter.cpp"),
    controls: &[
        ("cutoff", "Cutoff", "cutoffParam"),
        ("resonance", "Resonance", "resonanceParam"),
    ],
    state: &[
        "double currentSampleRate = 44100.0;",
        "float z1[2] = { 0.0f, 0.0f };",
        "float z2[2] = { 0.0f, 0.0f };",
    ],
    guidance: &[
        "input holds the current sample; assign the filtered result to output",
        "b0, b1, b2, a1, a2 are normalised lowpass coefficients computed before the loop",
        "z1[channel] and z2[channel] are per-channel state (Direct Form II Transposed)",
    ],
};

const DELAY: Skeleton = Skeleton {
    category: PluginCategory::Delay,
    title: "FxForge Delay",
    processor: include_str!("../skeletons/delay.cpp"),
    controls: &[
        ("delayTime", "Time", "delayTimeParam"),
        ("feedback", "Feedback", "feedbackParam"),
        ("mix", "Mix", "mixParam"),
    ],
    state: &[
        "double currentSampleRate = 44100.0;",
        "juce::AudioBuffer<float> delayBuffer;",
        "int writePosition = 0;",
    ],
    guidance: &[
        "dry is the input sample; assign the delayed signal to wet",
        "Read from delayData[readPos]; write delayData[writePosition] (feedback 0 to 0.95)",
        "readPos is already computed; writePosition advances after your code",
        "Dry/wet mixing is handled after your code",
    ],
};

impl Skeleton {
    /// Generic requests reuse the gain skeleton.
    pub fn for_category(category: PluginCategory) -> &'static Skeleton {
        match category {
            PluginCategory::Gain | PluginCategory::Generic => &GAIN,
            PluginCategory::Waveshaper => &WAVESHAPER,
            PluginCategory::Filter => &FILTER,
            PluginCategory::Delay => &DELAY,
        }
    }

    pub fn controls(&self) -> Vec<Control> {
        self.controls
            .iter()
            .map(|(name, label, member)| Control::new(*name, *label, *member))
            .collect()
    }

    /// The logic the skeleton ships with between its markers.
    pub fn reference_logic(&self) -> Option<String> {
        crate::extract::between_markers(self.processor)
    }

    /// The `processBlock` definition, for showing the model where its code lands.
    pub fn process_block(&self) -> &'static str {
        let start = self
            .processor
            .find("void FxForgeAudioProcessor::processBlock")
            .unwrap_or(0);
        let end = self.processor[start..]
            .find("\n}\n")
            .map(|n| start + n + 2)
            .unwrap_or(self.processor.len());
        &self.processor[start..end]
    }

    /// Every role for this skeleton with `fragment` in the hole.
    pub fn assemble(&self, fragment: &str) -> Result<GenerationArtifact, InjectError> {
        let controls = self.controls();
        let state: Vec<String> = self.state.iter().map(|s| s.to_string()).collect();
        let mut files = BTreeMap::new();
        files.insert(FileRole::Processor, inject(self.processor, fragment)?);
        files.insert(FileRole::Editor, editor_source(self.title, &controls));
        files.insert(FileRole::ProcessorHeader, processor_header(&controls, &state));
        files.insert(FileRole::EditorHeader, editor_header(&controls));
        Ok(GenerationArtifact::new(StrategyKind::Template, files).with_injected(self.category, fragment))
    }
}

/// Replace the marker region of `skeleton` with `fragment`, indented to the
/// start marker. Markers echoed inside the fragment are dropped.
pub fn inject(skeleton: &str, fragment: &str) -> Result<String, InjectError> {
    let start = skeleton.find(LOGIC_START).ok_or(InjectError::MissingStart)?;
    let end = skeleton[start..]
        .find(LOGIC_END)
        .map(|n| start + n + LOGIC_END.len())
        .ok_or(InjectError::MissingEnd)?;

    let logic = fragment.replace(LOGIC_START, "").replace(LOGIC_END, "");
    if logic.trim().is_empty() {
        return Err(InjectError::EmptyFragment);
    }

    let line_start = skeleton[..start].rfind('\n').map(|n| n + 1).unwrap_or(0);
    let indent: String = skeleton[line_start..start]
        .chars()
        .take_while(|c| c.is_whitespace())
        .collect();

    let mut region = String::from(LOGIC_START);
    for line in dedent(&logic).lines() {
        region.push('\n');
        if !line.trim().is_empty() {
            region.push_str(&indent);
            region.push_str(line.trim_end());
        }
    }
    region.push('\n');
    region.push_str(&indent);
    region.push_str(LOGIC_END);

    Ok(format!("{}{}{}", &skeleton[..start], region, &skeleton[end..]))
}

fn dedent(text: &str) -> String {
    let lines: Vec<&str> = text
        .lines()
        .skip_while(|l| l.trim().is_empty())
        .collect();
    let lines = match lines.iter().rposition(|l| !l.trim().is_empty()) {
        Some(last) => &lines[..=last],
        None => &lines[..0],
    };
    let indent_of = |l: &str| l.len() - l.trim_start().len();
    let opens_block = |l: &str| {
        let t = l.trim_end();
        t.ends_with('{') || t.ends_with(')') || t.ends_with("else")
    };
    // a first line that lost its indent to an earlier trim does not bound the rest
    let skip_first = lines
        .first()
        .is_some_and(|l| indent_of(l) == 0 && !opens_block(l));
    let common = lines
        .iter()
        .enumerate()
        .filter(|(i, l)| !(skip_first && *i == 0) && !l.trim().is_empty())
        .map(|(_, l)| indent_of(l))
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|line| match line.get(..common) {
            Some(prefix) if prefix.trim().is_empty() => &line[common..],
            _ => line.trim_start(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::verify::verify;

    #[test]
    fn test_every_skeleton_has_one_hole() {
        for category in PluginCategory::ALL {
            let skeleton = Skeleton::for_category(category);
            assert_eq!(skeleton.processor.matches(LOGIC_START).count(), 1, "{category}");
            assert_eq!(skeleton.processor.matches(LOGIC_END).count(), 1, "{category}");
            assert!(skeleton.processor.contains("createPluginFilter"));
        }
    }

    #[test]
    fn test_reference_logic_passes_the_gate() {
        let catalog = Catalog::builtin().unwrap();
        for category in PluginCategory::ALL {
            let logic = Skeleton::for_category(category).reference_logic().unwrap();
            let result = verify(&catalog, &logic, category);
            assert!(result.valid, "{category}: {:?}", result.errors);
            assert!(result.corrections_applied.is_empty());
        }
    }

    #[test]
    fn test_inject_replaces_region_and_indents() {
        let skeleton = "loop {\n    // === AI_LOGIC_START ===\n    old();\n    // === AI_LOGIC_END ===\n}\n";
        let out = inject(skeleton, "if (x)\n    y = 1;").unwrap();
        assert_eq!(
            out,
            "loop {\n    // === AI_LOGIC_START ===\n    if (x)\n        y = 1;\n    // === AI_LOGIC_END ===\n}\n"
        );
    }

    #[test]
    fn test_inject_strips_echoed_markers() {
        let skeleton = Skeleton::for_category(PluginCategory::Waveshaper).processor;
        let fragment = format!("{LOGIC_START}\nwet = std::atan(dry * drive);\n{LOGIC_END}");
        let out = inject(skeleton, &fragment).unwrap();
        assert_eq!(out.matches(LOGIC_START).count(), 1);
        assert_eq!(out.matches(LOGIC_END).count(), 1);
        assert!(out.contains("            wet = std::atan(dry * drive);\n"));
        assert!(!out.contains("std::tanh(drive)"));
    }

    #[test]
    fn test_inject_errors() {
        assert_eq!(inject("no markers", "x = 1;"), Err(InjectError::MissingStart));
        assert_eq!(
            inject(&format!("{LOGIC_START}\n"), "x = 1;"),
            Err(InjectError::MissingEnd)
        );
        assert_eq!(
            inject(&format!("{LOGIC_START}\n{LOGIC_END}"), "  \n"),
            Err(InjectError::EmptyFragment)
        );
    }

    #[test]
    fn test_assemble_produces_all_roles() {
        let artifact = Skeleton::for_category(PluginCategory::Delay)
            .assemble("wet = delayData[readPos];\ndelayData[writePosition] = dry;")
            .unwrap();
        assert_eq!(artifact.roles().count(), 4);
        assert_eq!(artifact.strategy, StrategyKind::Template);
        let header = artifact.file(FileRole::ProcessorHeader).unwrap();
        assert!(header.contains("juce::AudioBuffer<float> delayBuffer;"));
        assert!(header.contains("juce::AudioParameterFloat* feedbackParam = nullptr;"));
        let editor = artifact.file(FileRole::Editor).unwrap();
        assert!(editor.contains("getDelayTimeParam()"));
        assert_eq!(
            artifact.injected.as_ref().map(|i| i.category),
            Some(PluginCategory::Delay)
        );
    }

    #[test]
    fn test_process_block_excerpt() {
        let excerpt = Skeleton::for_category(PluginCategory::Filter).process_block();
        assert!(excerpt.starts_with("void FxForgeAudioProcessor::processBlock"));
        assert!(excerpt.ends_with("}\n"));
        assert!(excerpt.contains(LOGIC_START));
        assert!(!excerpt.contains("hasEditor"));
    }
}
