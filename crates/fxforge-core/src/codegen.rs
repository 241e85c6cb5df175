//! Deterministic C++ renderer for a validated [`PluginSpec`].
//!
//! The model never writes C++ on this path. Alongside the four files the
//! renderer reports the DSP body it emitted and the identifier surface that
//! body may use, so the verification gate can check the renderer itself.

use crate::artifact::{FileRole, GenerationArtifact, StrategyKind};
use crate::catalog::{is_builtin, is_keyword, CatalogError, IdentifierKind, IdentifierSet};
use crate::juce::{
    editor_header, editor_source, escape_cpp_string, processor_header, Control, EDITOR_CLASS,
    PROCESSOR_CLASS,
};
use crate::schema::{
    DelayDsp, FilterDsp, FilterType, GainDsp, ParameterSpec, ParameterUnit, PluginSpec,
    SpecCategory, WaveshaperDsp, WaveshapingFunction,
};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("parameter name '{0}' clashes with a name the renderer emits")]
    ReservedName(String),
    #[error(transparent)]
    Surface(#[from] CatalogError),
}

/// Locals, members and calls shared by every DSP body.
const COMMON_VARIABLES: &[&str] = &[
    "buffer",
    "channel",
    "numChannels",
    "channelData",
    "sample",
    "numSamples",
];
const COMMON_FUNCTIONS: &[&str] = &["get", "getSampleRate", "getWritePointer", "ignoreUnused"];

const GAIN_VARIABLES: &[&str] = &["gainDb", "gainLinear", "smoothCoeff", "gainSmoothed"];
const WAVESHAPER_VARIABLES: &[&str] = &[
    "preGain", "wetMix", "asym", "dry", "driven", "shaped", "clipped",
];
const FILTER_VARIABLES: &[&str] = &[
    "sampleRate", "cutoffHz", "qFactor", "omega", "sinOmega", "cosOmega", "alpha", "b0", "b1",
    "b2", "a0", "a1", "a2", "invA0", "nb0", "nb1", "nb2", "na1", "na2", "input", "output", "z1",
    "z2",
];
const DELAY_VARIABLES: &[&str] = &[
    "sampleRate",
    "delaySamples",
    "delayInt",
    "delayFrac",
    "feedbackGain",
    "wetMix",
    "delayData",
    "feedbackData",
    "delayBuffer",
    "dry",
    "readPos",
    "readPosNext",
    "delayed",
    "writePosition",
    "bufferSize",
];

/// Output of [`render`].
#[derive(Debug, Clone)]
pub struct Rendered {
    pub artifact: GenerationArtifact,
    /// Parameter reads plus the category DSP, as emitted into `processBlock`.
    pub dsp_body: String,
    /// Everything `dsp_body` is allowed to reference.
    pub surface: IdentifierSet,
}

/// C++ float literal for `value`.
fn lit(value: f32) -> String {
    let text = format!("{value:?}");
    if text.contains('.') || text.contains('e') {
        format!("{text}f")
    } else {
        format!("{text}.0f")
    }
}

/// Expression mapping a parameter onto 0..1, or `fallback` when the spec has
/// no parameter for that role.
fn normalised(param: Option<&ParameterSpec>, fallback: f32) -> String {
    match param {
        Some(p) => format!(
            "(({} - ({})) / {})",
            p.name,
            lit(p.min),
            lit(p.max - p.min)
        ),
        None => lit(fallback),
    }
}

/// Pick the first unclaimed parameter whose lowercase name contains a needle.
fn claim<'a>(
    params: &'a [ParameterSpec],
    needles: &[&str],
    taken: &mut Vec<&'a str>,
) -> Option<&'a ParameterSpec> {
    let found = params.iter().find(|p| {
        let lower = p.name.to_ascii_lowercase();
        !taken.contains(&p.name.as_str()) && needles.iter().any(|n| lower.contains(n))
    })?;
    taken.push(found.name.as_str());
    Some(found)
}

fn member(param: &ParameterSpec) -> String {
    format!("{}Param", param.name)
}

fn check_names(spec: &PluginSpec, variables: &[&str]) -> Result<(), RenderError> {
    for param in &spec.parameters {
        let name = param.name.as_str();
        let clashes = is_keyword(name)
            || is_builtin(name)
            || variables.contains(&name)
            || COMMON_FUNCTIONS.contains(&name)
            || spec.parameters.iter().any(|other| member(other) == name);
        if clashes {
            return Err(RenderError::ReservedName(param.name.clone()));
        }
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
//  DSP BODIES
// ═══════════════════════════════════════════════════════════════════════════

struct Dsp {
    body: String,
    variables: &'static [&'static str],
    state: Vec<String>,
    prepare: String,
    release: &'static str,
    tail_seconds: f32,
}

fn gain_dsp(dsp: &GainDsp, gain: Option<&ParameterSpec>) -> Dsp {
    let range = dsp.gain_range_db;
    let mut body = String::new();
    let _ = writeln!(
        body,
        "    const float gainDb = {} * {} - {};",
        normalised(gain, 0.5),
        lit(range * 2.0),
        lit(range)
    );
    body.push_str("    const float gainLinear = std::pow(10.0f, gainDb / 20.0f);\n");
    if dsp.smoothing_enabled {
        let _ = writeln!(
            body,
            "    const float smoothCoeff = 1.0f - std::exp(-1.0f / ({} * 0.001f * static_cast<float>(getSampleRate())));",
            lit(dsp.smoothing_time_ms)
        );
        body.push_str(
            "\n    for (int sample = 0; sample < numSamples; ++sample)\n    {\n\
             \x20       gainSmoothed += smoothCoeff * (gainLinear - gainSmoothed);\n\
             \x20       for (int channel = 0; channel < numChannels; ++channel)\n\
             \x20           buffer.getWritePointer(channel)[sample] *= gainSmoothed;\n    }\n",
        );
    } else {
        body.push_str(
            "\n    for (int channel = 0; channel < numChannels; ++channel)\n    {\n\
             \x20       auto* channelData = buffer.getWritePointer(channel);\n\
             \x20       for (int sample = 0; sample < numSamples; ++sample)\n\
             \x20           channelData[sample] *= gainLinear;\n    }\n",
        );
    }
    Dsp {
        body,
        variables: GAIN_VARIABLES,
        state: vec!["float gainSmoothed = 1.0f;".to_string()],
        prepare: "    gainSmoothed = 1.0f;\n".to_string(),
        release: "",
        tail_seconds: 0.0,
    }
}

fn shape_lines(function: WaveshapingFunction) -> &'static str {
    match function {
        WaveshapingFunction::Tanh => "const float shaped = std::tanh(driven);",
        WaveshapingFunction::Atan => "const float shaped = std::atan(driven) * 0.636619772f;",
        WaveshapingFunction::SoftClip => {
            "const float clipped = juce::jlimit(-1.0f, 1.0f, driven);\n\
             const float shaped = 1.5f * (clipped - (clipped * clipped * clipped) / 3.0f);"
        }
        WaveshapingFunction::HardClip => "const float shaped = juce::jlimit(-1.0f, 1.0f, driven);",
        WaveshapingFunction::SineFold => {
            "const float shaped = std::sin(driven * 0.5f * juce::MathConstants<float>::pi);"
        }
        WaveshapingFunction::Cubic => {
            "const float clipped = juce::jlimit(-1.0f, 1.0f, driven);\n\
             const float shaped = 1.5f * clipped - 0.5f * clipped * clipped * clipped;"
        }
    }
}

fn waveshaper_dsp(
    dsp: &WaveshaperDsp,
    drive: Option<&ParameterSpec>,
    mix: Option<&ParameterSpec>,
) -> Dsp {
    let wet_mix = if dsp.mix_enabled {
        normalised(mix, 1.0)
    } else {
        lit(1.0)
    };
    let compensation = if dsp.output_compensation { 0.7 } else { 1.0 };

    let mut body = String::new();
    let _ = writeln!(
        body,
        "    const float preGain = 1.0f + {} * {};",
        normalised(drive, 0.5),
        lit(dsp.pre_gain_range - 1.0)
    );
    let _ = writeln!(body, "    const float wetMix = {wet_mix};");
    let _ = writeln!(body, "    const float asym = {};", lit(dsp.asymmetry));
    body.push_str(
        "\n    for (int channel = 0; channel < numChannels; ++channel)\n    {\n\
         \x20       auto* channelData = buffer.getWritePointer(channel);\n\
         \x20       for (int sample = 0; sample < numSamples; ++sample)\n        {\n\
         \x20           const float dry = channelData[sample];\n\
         \x20           const float driven = dry * preGain * (dry >= 0.0f ? 1.0f + asym : 1.0f - asym);\n",
    );
    for line in shape_lines(dsp.waveshaping_function).lines() {
        let _ = writeln!(body, "            {}", line.trim());
    }
    let _ = writeln!(
        body,
        "            channelData[sample] = dry * (1.0f - wetMix) + shaped * {} * wetMix;",
        lit(compensation)
    );
    body.push_str("        }\n    }\n");
    Dsp {
        body,
        variables: WAVESHAPER_VARIABLES,
        state: Vec::new(),
        prepare: String::new(),
        release: "",
        tail_seconds: 0.0,
    }
}

/// RBJ cookbook numerators/denominators. Types without a dedicated formula
/// use the lowpass set.
fn coefficient_lines(filter: FilterType) -> [&'static str; 6] {
    match filter {
        FilterType::Highpass => [
            "(1.0f + cosOmega) / 2.0f",
            "-(1.0f + cosOmega)",
            "(1.0f + cosOmega) / 2.0f",
            "1.0f + alpha",
            "-2.0f * cosOmega",
            "1.0f - alpha",
        ],
        FilterType::Bandpass => [
            "alpha",
            "0.0f",
            "-alpha",
            "1.0f + alpha",
            "-2.0f * cosOmega",
            "1.0f - alpha",
        ],
        FilterType::Notch => [
            "1.0f",
            "-2.0f * cosOmega",
            "1.0f",
            "1.0f + alpha",
            "-2.0f * cosOmega",
            "1.0f - alpha",
        ],
        FilterType::Lowpass | FilterType::Peak | FilterType::Lowshelf | FilterType::Highshelf => [
            "(1.0f - cosOmega) / 2.0f",
            "1.0f - cosOmega",
            "(1.0f - cosOmega) / 2.0f",
            "1.0f + alpha",
            "-2.0f * cosOmega",
            "1.0f - alpha",
        ],
    }
}

fn filter_dsp(dsp: &FilterDsp, cutoff: Option<&ParameterSpec>, q: Option<&ParameterSpec>) -> Dsp {
    if matches!(
        dsp.filter_type,
        FilterType::Peak | FilterType::Lowshelf | FilterType::Highshelf
    ) {
        tracing::warn!(filter_type = ?dsp.filter_type, "no dedicated coefficients, rendering lowpass");
    }
    let q_span = dsp.max_resonance - dsp.min_resonance;
    let q_fallback = if q_span > 0.0 {
        ((0.707 - dsp.min_resonance) / q_span).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let mut body = String::new();
    body.push_str("    const float sampleRate = static_cast<float>(getSampleRate());\n");
    let _ = writeln!(
        body,
        "    const float cutoffHz = juce::jmin({} * std::pow({} / {}, {}), 0.45f * sampleRate);",
        lit(dsp.min_frequency_hz),
        lit(dsp.max_frequency_hz),
        lit(dsp.min_frequency_hz),
        normalised(cutoff, 0.5)
    );
    let _ = writeln!(
        body,
        "    const float qFactor = {} + {} * {};",
        lit(dsp.min_resonance),
        normalised(q, q_fallback),
        lit(q_span)
    );
    body.push_str(
        "    const float omega = 2.0f * juce::MathConstants<float>::pi * cutoffHz / sampleRate;\n\
         \x20   const float sinOmega = std::sin(omega);\n\
         \x20   const float cosOmega = std::cos(omega);\n\
         \x20   const float alpha = sinOmega / (2.0f * qFactor);\n\n",
    );
    let names = ["b0", "b1", "b2", "a0", "a1", "a2"];
    for (name, expr) in names.iter().zip(coefficient_lines(dsp.filter_type)) {
        let _ = writeln!(body, "    const float {name} = {expr};");
    }
    body.push_str(
        "\n    const float invA0 = 1.0f / a0;\n\
         \x20   const float nb0 = b0 * invA0;\n\
         \x20   const float nb1 = b1 * invA0;\n\
         \x20   const float nb2 = b2 * invA0;\n\
         \x20   const float na1 = a1 * invA0;\n\
         \x20   const float na2 = a2 * invA0;\n\n\
         \x20   for (int channel = 0; channel < numChannels; ++channel)\n    {\n\
         \x20       auto* channelData = buffer.getWritePointer(channel);\n\
         \x20       for (int sample = 0; sample < numSamples; ++sample)\n        {\n\
         \x20           const float input = channelData[sample];\n\
         \x20           const float output = nb0 * input + z1[channel];\n\
         \x20           z1[channel] = nb1 * input - na1 * output + z2[channel];\n\
         \x20           z2[channel] = nb2 * input - na2 * output;\n\
         \x20           channelData[sample] = output;\n        }\n    }\n",
    );
    Dsp {
        body,
        variables: FILTER_VARIABLES,
        state: vec![
            "float z1[2] = { 0.0f, 0.0f };".to_string(),
            "float z2[2] = { 0.0f, 0.0f };".to_string(),
        ],
        prepare: "    for (int ch = 0; ch < 2; ++ch)\n    {\n        z1[ch] = 0.0f;\n        z2[ch] = 0.0f;\n    }\n"
            .to_string(),
        release: "",
        tail_seconds: 0.0,
    }
}

fn delay_dsp(
    dsp: &DelayDsp,
    time: Option<&ParameterSpec>,
    feedback: Option<&ParameterSpec>,
    mix: Option<&ParameterSpec>,
) -> Dsp {
    let wet_mix = if dsp.mix_enabled {
        normalised(mix, 0.5)
    } else {
        lit(0.5)
    };
    let feedback_channel = if dsp.ping_pong {
        "(channel + 1) % numChannels"
    } else {
        "channel"
    };

    let mut body = String::new();
    body.push_str("    const float sampleRate = static_cast<float>(getSampleRate());\n");
    let _ = writeln!(
        body,
        "    const float delaySamples = juce::jlimit(1.0f, static_cast<float>(bufferSize - 2), {} * {} * 0.001f * sampleRate);",
        normalised(time, 0.3),
        lit(dsp.max_delay_ms)
    );
    body.push_str("    const int delayInt = static_cast<int>(delaySamples);\n");
    if dsp.interpolation_enabled {
        body.push_str("    const float delayFrac = delaySamples - static_cast<float>(delayInt);\n");
    } else {
        body.push_str("    const float delayFrac = 0.0f;\n");
    }
    let _ = writeln!(
        body,
        "    const float feedbackGain = {} * {};",
        normalised(feedback, 0.5),
        lit(dsp.max_feedback)
    );
    let _ = writeln!(body, "    const float wetMix = {wet_mix};");
    let _ = write!(
        body,
        "\n    for (int channel = 0; channel < numChannels; ++channel)\n    {{\n\
         \x20       auto* channelData = buffer.getWritePointer(channel);\n\
         \x20       auto* delayData = delayBuffer.getWritePointer(channel);\n\
         \x20       auto* feedbackData = delayBuffer.getWritePointer({feedback_channel});\n\
         \x20       for (int sample = 0; sample < numSamples; ++sample)\n        {{\n\
         \x20           const float dry = channelData[sample];\n\
         \x20           int readPos = writePosition[channel] - delayInt;\n\
         \x20           if (readPos < 0)\n                readPos += bufferSize;\n\
         \x20           int readPosNext = readPos - 1;\n\
         \x20           if (readPosNext < 0)\n                readPosNext += bufferSize;\n\
         \x20           const float delayed = delayData[readPos] * (1.0f - delayFrac) + delayData[readPosNext] * delayFrac;\n\
         \x20           feedbackData[writePosition[channel]] = dry + delayed * feedbackGain;\n\
         \x20           writePosition[channel] = (writePosition[channel] + 1) % bufferSize;\n\
         \x20           channelData[sample] = dry * (1.0f - wetMix) + delayed * wetMix;\n        }}\n    }}\n"
    );

    let seconds = dsp.max_delay_ms / 1000.0;
    Dsp {
        body,
        variables: DELAY_VARIABLES,
        state: vec![
            "juce::AudioBuffer<float> delayBuffer;".to_string(),
            "int bufferSize = 0;".to_string(),
            "int writePosition[2] = { 0, 0 };".to_string(),
        ],
        prepare: format!(
            "    bufferSize = static_cast<int>(sampleRate * {}) + 2;\n\
             \x20   delayBuffer.setSize(2, bufferSize);\n\
             \x20   delayBuffer.clear();\n\
             \x20   writePosition[0] = 0;\n\
             \x20   writePosition[1] = 0;\n",
            seconds
        ),
        release: "    delayBuffer.setSize(0, 0);\n",
        tail_seconds: seconds,
    }
}

fn category_dsp(spec: &PluginSpec) -> Dsp {
    let params = spec.parameters.as_slice();
    let mut taken = Vec::new();
    match spec.category {
        SpecCategory::Waveshaper | SpecCategory::Distortion => {
            let mix = claim(params, &["mix", "wet", "blend"], &mut taken);
            let drive = claim(params, &["drive", "gain", "saturat", "amount", "fuzz"], &mut taken);
            waveshaper_dsp(&spec.waveshaper_dsp.clone().unwrap_or_default(), drive, mix)
        }
        SpecCategory::Filter => {
            let q = claim(params, &["reson", "qfactor", "quality"], &mut taken);
            let cutoff = claim(params, &["cutoff", "freq"], &mut taken);
            filter_dsp(&spec.filter_dsp.clone().unwrap_or_default(), cutoff, q)
        }
        SpecCategory::Delay => {
            let mix = claim(params, &["mix", "wet", "blend"], &mut taken);
            let feedback = claim(params, &["feedback", "fb", "repeat", "regen"], &mut taken);
            let time = claim(params, &["time", "delay", "length"], &mut taken);
            delay_dsp(&spec.delay_dsp.clone().unwrap_or_default(), time, feedback, mix)
        }
        SpecCategory::Gain => {
            let gain = claim(params, &["gain", "volume", "level", "output"], &mut taken);
            gain_dsp(&spec.gain_dsp.clone().unwrap_or_default(), gain)
        }
        SpecCategory::Compressor
        | SpecCategory::Reverb
        | SpecCategory::Tremolo
        | SpecCategory::Chorus => {
            tracing::warn!(category = %spec.category, "no DSP template for category, rendering unity gain");
            gain_dsp(&GainDsp::default(), None)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  FILES
// ═══════════════════════════════════════════════════════════════════════════

fn parameter_constructor(param: &ParameterSpec) -> String {
    let attributes = match param.unit {
        ParameterUnit::None => String::new(),
        unit => format!(
            ",\n        juce::AudioParameterFloatAttributes().withLabel(\"{}\")",
            unit.suffix()
        ),
    };
    format!(
        "    addParameter({member} = new juce::AudioParameterFloat(\n\
         \x20       juce::ParameterID {{ \"{name}\", 1 }}, \"{label}\",\n\
         \x20       juce::NormalisableRange<float>({min}, {max}, 0.0f, {skew}),\n\
         \x20       {default}{attributes}));\n",
        member = member(param),
        name = param.name,
        label = escape_cpp_string(&param.label),
        min = lit(param.min),
        max = lit(param.max),
        skew = lit(param.skew),
        default = lit(param.default),
    )
}

fn processor_source(spec: &PluginSpec, dsp: &Dsp, dsp_body: &str) -> String {
    let p = PROCESSOR_CLASS;
    let mut out = String::new();
    out.push_str("#include \"PluginProcessor.h\"\n#include \"PluginEditor.h\"\n#include <cmath>\n\n");
    let _ = writeln!(out, "{p}::{p}()");
    out.push_str(
        "    : AudioProcessor(BusesProperties()\n\
         \x20                        .withInput(\"Input\", juce::AudioChannelSet::stereo(), true)\n\
         \x20                        .withOutput(\"Output\", juce::AudioChannelSet::stereo(), true))\n{\n",
    );
    for param in &spec.parameters {
        out.push_str(&parameter_constructor(param));
    }
    out.push_str("}\n\n");
    let _ = writeln!(out, "{p}::~{p}() = default;\n");
    let _ = writeln!(out, "const juce::String {p}::getName() const {{ return JucePlugin_Name; }}");
    let _ = writeln!(out, "bool {p}::acceptsMidi() const {{ return false; }}");
    let _ = writeln!(out, "bool {p}::producesMidi() const {{ return false; }}");
    let _ = writeln!(out, "bool {p}::isMidiEffect() const {{ return false; }}");
    let _ = writeln!(
        out,
        "double {p}::getTailLengthSeconds() const {{ return {:?}; }}",
        f64::from(dsp.tail_seconds)
    );
    let _ = writeln!(out, "int {p}::getNumPrograms() {{ return 1; }}");
    let _ = writeln!(out, "int {p}::getCurrentProgram() {{ return 0; }}");
    let _ = writeln!(out, "void {p}::setCurrentProgram(int) {{}}");
    let _ = writeln!(out, "const juce::String {p}::getProgramName(int) {{ return {{}}; }}");
    let _ = writeln!(out, "void {p}::changeProgramName(int, const juce::String&) {{}}\n");

    let _ = writeln!(out, "void {p}::prepareToPlay(double sampleRate, int samplesPerBlock)");
    out.push_str("{\n    juce::ignoreUnused(sampleRate, samplesPerBlock);\n");
    out.push_str(&dsp.prepare);
    out.push_str("}\n\n");
    let _ = writeln!(out, "void {p}::releaseResources()");
    out.push_str("{\n");
    out.push_str(dsp.release);
    out.push_str("}\n\n");

    let _ = writeln!(out, "bool {p}::isBusesLayoutSupported(const BusesLayout& layouts) const");
    out.push_str(
        "{\n    const auto& out = layouts.getMainOutputChannelSet();\n\
         \x20   if (out != juce::AudioChannelSet::mono() && out != juce::AudioChannelSet::stereo())\n\
         \x20       return false;\n\
         \x20   return out == layouts.getMainInputChannelSet();\n}\n\n",
    );

    let _ = writeln!(out, "void {p}::processBlock(juce::AudioBuffer<float>& buffer, juce::MidiBuffer&)");
    out.push_str(
        "{\n    juce::ScopedNoDenormals noDenormals;\n\
         \x20   for (auto i = getTotalNumInputChannels(); i < getTotalNumOutputChannels(); ++i)\n\
         \x20       buffer.clear(i, 0, buffer.getNumSamples());\n\n\
         \x20   const int numSamples = buffer.getNumSamples();\n\
         \x20   const int numChannels = juce::jmin(getTotalNumInputChannels(), 2);\n\n",
    );
    out.push_str(dsp_body);
    out.push_str("}\n\n");

    let _ = writeln!(out, "bool {p}::hasEditor() const {{ return true; }}\n");
    let _ = writeln!(out, "juce::AudioProcessorEditor* {p}::createEditor()");
    let _ = writeln!(out, "{{\n    return new {EDITOR_CLASS}(*this);\n}}\n");

    let _ = writeln!(out, "void {p}::getStateInformation(juce::MemoryBlock& destData)");
    out.push_str("{\n    juce::MemoryOutputStream stream(destData, true);\n");
    for param in &spec.parameters {
        let _ = writeln!(out, "    stream.writeFloat({}->get());", member(param));
    }
    out.push_str("}\n\n");
    let _ = writeln!(out, "void {p}::setStateInformation(const void* data, int sizeInBytes)");
    out.push_str(
        "{\n    juce::MemoryInputStream stream(data, static_cast<size_t>(sizeInBytes), false);\n",
    );
    for param in &spec.parameters {
        let _ = writeln!(out, "    *{} = stream.readFloat();", member(param));
    }
    out.push_str("}\n\n");
    let _ = writeln!(out, "juce::AudioProcessor* JUCE_CALLTYPE createPluginFilter()");
    let _ = writeln!(out, "{{\n    return new {p}();\n}}");
    out
}

/// Render all four files for a validated spec.
pub fn render(spec: &PluginSpec) -> Result<Rendered, RenderError> {
    let dsp = category_dsp(spec);
    check_names(spec, &[dsp.variables, COMMON_VARIABLES].concat())?;

    let mut dsp_body = String::new();
    for param in &spec.parameters {
        let _ = writeln!(dsp_body, "    const float {} = {}->get();", param.name, member(param));
    }
    let names: Vec<&str> = spec.parameters.iter().map(|p| p.name.as_str()).collect();
    if !names.is_empty() {
        let _ = writeln!(dsp_body, "    juce::ignoreUnused({});\n", names.join(", "));
    }
    dsp_body.push_str(&dsp.body);

    let members: Vec<String> = spec.parameters.iter().map(member).collect();
    let mut surface = IdentifierSet::default();
    surface.extend(IdentifierKind::Parameter, names.iter().copied())?;
    surface.extend(IdentifierKind::Parameter, members.iter().map(String::as_str))?;
    surface.extend(IdentifierKind::Variable, COMMON_VARIABLES.iter().copied())?;
    surface.extend(IdentifierKind::Variable, dsp.variables.iter().copied())?;
    surface.extend(IdentifierKind::Function, COMMON_FUNCTIONS.iter().copied())?;

    let controls: Vec<Control> = spec
        .parameters
        .iter()
        .map(|param| {
            let label = match param.unit {
                ParameterUnit::None => param.label.clone(),
                unit => format!("{} ({})", param.label, unit.suffix()),
            };
            Control::new(param.name.clone(), label, member(param))
        })
        .collect();

    let mut files = BTreeMap::new();
    files.insert(FileRole::Processor, processor_source(spec, &dsp, &dsp_body));
    files.insert(FileRole::Editor, editor_source(&spec.plugin_name, &controls));
    files.insert(FileRole::ProcessorHeader, processor_header(&controls, &dsp.state));
    files.insert(FileRole::EditorHeader, editor_header(&controls));

    tracing::info!(
        plugin = %spec.plugin_name,
        category = %spec.category,
        parameters = spec.parameters.len(),
        "rendered plugin from structured spec"
    );

    Ok(Rendered {
        artifact: GenerationArtifact::new(StrategyKind::Schema, files),
        dsp_body,
        surface,
    })
}
