//! Framework boilerplate shared by the skeletons and the structured renderer:
//! class names, both headers and the knob-per-parameter editor.

use std::fmt::Write as _;

pub const PROCESSOR_CLASS: &str = "FxForgeAudioProcessor";
pub const EDITOR_CLASS: &str = "FxForgeAudioProcessorEditor";

/// One rotary knob bound to a processor parameter member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    /// Prefix for the slider, label and attachment members.
    pub name: String,
    pub label: String,
    /// Processor member holding the `juce::AudioParameterFloat*`.
    pub member: String,
}

impl Control {
    pub fn new(name: impl Into<String>, label: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            member: member.into(),
        }
    }

    pub fn getter(&self) -> String {
        format!("get{}", capitalize(&self.member))
    }
}

pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Processor header declaring one parameter pointer per control plus any
/// extra DSP state lines (each a full member declaration).
pub fn processor_header(controls: &[Control], state: &[String]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "#pragma once\n");
    let _ = writeln!(out, "#include <juce_audio_processors/juce_audio_processors.h>\n");
    let _ = writeln!(out, "class {PROCESSOR_CLASS} : public juce::AudioProcessor");
    out.push_str("{\npublic:\n");
    let _ = writeln!(out, "    {PROCESSOR_CLASS}();");
    let _ = writeln!(out, "    ~{PROCESSOR_CLASS}() override;\n");
    out.push_str(
        "    void prepareToPlay(double sampleRate, int samplesPerBlock) override;\n\
         \x20   void releaseResources() override;\n\
         \x20   bool isBusesLayoutSupported(const BusesLayout& layouts) const override;\n\
         \x20   void processBlock(juce::AudioBuffer<float>&, juce::MidiBuffer&) override;\n\n\
         \x20   juce::AudioProcessorEditor* createEditor() override;\n\
         \x20   bool hasEditor() const override;\n\n\
         \x20   const juce::String getName() const override;\n\
         \x20   bool acceptsMidi() const override;\n\
         \x20   bool producesMidi() const override;\n\
         \x20   bool isMidiEffect() const override;\n\
         \x20   double getTailLengthSeconds() const override;\n\n\
         \x20   int getNumPrograms() override;\n\
         \x20   int getCurrentProgram() override;\n\
         \x20   void setCurrentProgram(int index) override;\n\
         \x20   const juce::String getProgramName(int index) override;\n\
         \x20   void changeProgramName(int index, const juce::String& newName) override;\n\n\
         \x20   void getStateInformation(juce::MemoryBlock& destData) override;\n\
         \x20   void setStateInformation(const void* data, int sizeInBytes) override;\n",
    );
    if !controls.is_empty() {
        out.push('\n');
    }
    for control in controls {
        let _ = writeln!(
            out,
            "    juce::AudioParameterFloat* {}() {{ return {}; }}",
            control.getter(),
            control.member
        );
    }
    out.push_str("\nprivate:\n");
    for control in controls {
        let _ = writeln!(out, "    juce::AudioParameterFloat* {} = nullptr;", control.member);
    }
    if !state.is_empty() {
        out.push('\n');
        for line in state {
            let _ = writeln!(out, "    {line}");
        }
    }
    let _ = writeln!(out, "\n    JUCE_DECLARE_NON_COPYABLE_WITH_LEAK_DETECTOR({PROCESSOR_CLASS})");
    out.push_str("};\n");
    out
}

pub fn editor_header(controls: &[Control]) -> String {
    let mut out = String::new();
    out.push_str("#pragma once\n\n#include \"PluginProcessor.h\"\n\n");
    let _ = writeln!(out, "class {EDITOR_CLASS} : public juce::AudioProcessorEditor");
    out.push_str("{\npublic:\n");
    let _ = writeln!(out, "    explicit {EDITOR_CLASS}({PROCESSOR_CLASS}&);");
    let _ = writeln!(out, "    ~{EDITOR_CLASS}() override;\n");
    out.push_str("    void paint(juce::Graphics&) override;\n    void resized() override;\n\nprivate:\n");
    let _ = writeln!(out, "    {PROCESSOR_CLASS}& processorRef;\n");
    for control in controls {
        let _ = writeln!(out, "    juce::Slider {}Slider;", control.name);
        let _ = writeln!(out, "    juce::Label {}Label;", control.name);
    }
    if !controls.is_empty() {
        out.push('\n');
    }
    for control in controls {
        let _ = writeln!(
            out,
            "    std::unique_ptr<juce::SliderParameterAttachment> {}Attachment;",
            control.name
        );
    }
    let _ = writeln!(out, "\n    JUCE_DECLARE_NON_COPYABLE_WITH_LEAK_DETECTOR({EDITOR_CLASS})");
    out.push_str("};\n");
    out
}

/// Editor implementation with one attached knob per control, laid out in a row.
pub fn editor_source(title: &str, controls: &[Control]) -> String {
    let width = (controls.len() * 120 + 60).max(300);
    let mut out = String::new();
    out.push_str("#include \"PluginProcessor.h\"\n#include \"PluginEditor.h\"\n\n");
    let _ = writeln!(out, "{EDITOR_CLASS}::{EDITOR_CLASS}({PROCESSOR_CLASS}& p)");
    out.push_str("    : AudioProcessorEditor(&p), processorRef(p)\n{\n");
    for control in controls {
        let name = &control.name;
        let _ = writeln!(out, "    {name}Slider.setSliderStyle(juce::Slider::RotaryHorizontalVerticalDrag);");
        let _ = writeln!(out, "    {name}Slider.setTextBoxStyle(juce::Slider::TextBoxBelow, false, 80, 20);");
        let _ = writeln!(out, "    addAndMakeVisible({name}Slider);");
        let _ = writeln!(
            out,
            "    {name}Attachment = std::make_unique<juce::SliderParameterAttachment>(*processorRef.{}(), {name}Slider);",
            control.getter()
        );
        let _ = writeln!(
            out,
            "    {name}Label.setText(\"{}\", juce::dontSendNotification);",
            escape_cpp_string(&control.label)
        );
        let _ = writeln!(out, "    {name}Label.setJustificationType(juce::Justification::centred);");
        let _ = writeln!(out, "    addAndMakeVisible({name}Label);\n");
    }
    let _ = writeln!(out, "    setSize({width}, 250);");
    out.push_str("}\n\n");
    let _ = writeln!(out, "{EDITOR_CLASS}::~{EDITOR_CLASS}() = default;\n");
    let _ = writeln!(out, "void {EDITOR_CLASS}::paint(juce::Graphics& g)");
    out.push_str("{\n");
    out.push_str("    g.fillAll(getLookAndFeel().findColour(juce::ResizableWindow::backgroundColourId));\n");
    out.push_str("    g.setColour(juce::Colours::white);\n    g.setFont(20.0f);\n");
    let _ = writeln!(
        out,
        "    g.drawFittedText(\"{}\", getLocalBounds().removeFromTop(40), juce::Justification::centred, 1);",
        escape_cpp_string(title)
    );
    out.push_str("}\n\n");
    let _ = writeln!(out, "void {EDITOR_CLASS}::resized()");
    out.push_str("{\n    auto area = getLocalBounds().reduced(20);\n    area.removeFromTop(40);\n");
    if !controls.is_empty() {
        let _ = writeln!(out, "    const int knobWidth = area.getWidth() / {};", controls.len());
        for control in controls {
            let name = &control.name;
            let _ = writeln!(out, "\n    auto {name}Area = area.removeFromLeft(knobWidth);");
            let _ = writeln!(out, "    {name}Label.setBounds({name}Area.removeFromTop(20));");
            let _ = writeln!(out, "    {name}Slider.setBounds({name}Area.reduced(5));");
        }
    }
    out.push_str("}\n");
    out
}

pub fn escape_cpp_string(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controls() -> Vec<Control> {
        vec![
            Control::new("drive", "Drive", "driveParam"),
            Control::new("mix", "Mix", "mixParam"),
        ]
    }

    #[test]
    fn test_getter_name() {
        assert_eq!(Control::new("gain", "Gain", "gainParameter").getter(), "getGainParameter");
    }

    #[test]
    fn test_processor_header_declares_members_and_state() {
        let header = processor_header(&controls(), &["double currentSampleRate = 44100.0;".to_string()]);
        assert!(header.starts_with("#pragma once"));
        assert!(header.contains("class FxForgeAudioProcessor : public juce::AudioProcessor"));
        assert!(header.contains("juce::AudioParameterFloat* driveParam = nullptr;"));
        assert!(header.contains("juce::AudioParameterFloat* getMixParam() { return mixParam; }"));
        assert!(header.contains("    double currentSampleRate = 44100.0;"));
    }

    #[test]
    fn test_editor_binds_every_control() {
        let editor = editor_source("Crunch \"Box\"", &controls());
        assert!(editor.contains("FxForgeAudioProcessorEditor::resized()"));
        assert!(editor.contains("*processorRef.getDriveParam(), driveSlider"));
        assert!(editor.contains("mixLabel.setText(\"Mix\""));
        assert!(editor.contains("Crunch \\\"Box\\\""));
        let header = editor_header(&controls());
        assert!(header.contains("juce::Slider driveSlider;"));
        assert!(header.contains("std::unique_ptr<juce::SliderParameterAttachment> mixAttachment;"));
    }
}
