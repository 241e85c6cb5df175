//! Structured plugin record the model fills in instead of writing C++.

use crate::lexer::cached_regex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("plugin spec is not valid JSON: {0}")]
    Malformed(String),
    #[error("plugin spec failed validation: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecCategory {
    Gain,
    Waveshaper,
    Distortion,
    Filter,
    Delay,
    Compressor,
    Reverb,
    Tremolo,
    Chorus,
}

impl SpecCategory {
    pub const ALL: [SpecCategory; 9] = [
        SpecCategory::Gain,
        SpecCategory::Waveshaper,
        SpecCategory::Distortion,
        SpecCategory::Filter,
        SpecCategory::Delay,
        SpecCategory::Compressor,
        SpecCategory::Reverb,
        SpecCategory::Tremolo,
        SpecCategory::Chorus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpecCategory::Gain => "gain",
            SpecCategory::Waveshaper => "waveshaper",
            SpecCategory::Distortion => "distortion",
            SpecCategory::Filter => "filter",
            SpecCategory::Delay => "delay",
            SpecCategory::Compressor => "compressor",
            SpecCategory::Reverb => "reverb",
            SpecCategory::Tremolo => "tremolo",
            SpecCategory::Chorus => "chorus",
        }
    }
}

impl fmt::Display for SpecCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParameterUnit {
    #[serde(rename = "%")]
    Percent,
    #[serde(rename = "dB")]
    Decibels,
    #[serde(rename = "ms")]
    Milliseconds,
    #[serde(rename = "Hz")]
    Hertz,
    #[serde(rename = ":1")]
    Ratio,
    #[default]
    #[serde(rename = "")]
    None,
}

impl ParameterUnit {
    pub fn suffix(&self) -> &'static str {
        match self {
            ParameterUnit::Percent => "%",
            ParameterUnit::Decibels => "dB",
            ParameterUnit::Milliseconds => "ms",
            ParameterUnit::Hertz => "Hz",
            ParameterUnit::Ratio => ":1",
            ParameterUnit::None => "",
        }
    }
}

fn one() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub label: String,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    #[serde(default)]
    pub unit: ParameterUnit,
    #[serde(default = "one")]
    pub skew: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaveshapingFunction {
    #[default]
    Tanh,
    Atan,
    SoftClip,
    HardClip,
    SineFold,
    Cubic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    #[default]
    Lowpass,
    Highpass,
    Bandpass,
    Notch,
    Peak,
    Lowshelf,
    Highshelf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GainDsp {
    pub gain_range_db: f32,
    pub smoothing_enabled: bool,
    pub smoothing_time_ms: f32,
}

impl Default for GainDsp {
    fn default() -> Self {
        Self {
            gain_range_db: 24.0,
            smoothing_enabled: true,
            smoothing_time_ms: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveshaperDsp {
    pub waveshaping_function: WaveshapingFunction,
    pub pre_gain_range: f32,
    pub output_compensation: bool,
    pub mix_enabled: bool,
    pub asymmetry: f32,
}

impl Default for WaveshaperDsp {
    fn default() -> Self {
        Self {
            waveshaping_function: WaveshapingFunction::Tanh,
            pre_gain_range: 10.0,
            output_compensation: true,
            mix_enabled: true,
            asymmetry: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterDsp {
    pub filter_type: FilterType,
    pub min_frequency_hz: f32,
    pub max_frequency_hz: f32,
    pub min_resonance: f32,
    pub max_resonance: f32,
    pub use_biquad: bool,
}

impl Default for FilterDsp {
    fn default() -> Self {
        Self {
            filter_type: FilterType::Lowpass,
            min_frequency_hz: 20.0,
            max_frequency_hz: 20000.0,
            min_resonance: 0.5,
            max_resonance: 10.0,
            use_biquad: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayDsp {
    pub max_delay_ms: f32,
    pub max_feedback: f32,
    pub interpolation_enabled: bool,
    pub mix_enabled: bool,
    pub ping_pong: bool,
}

impl Default for DelayDsp {
    fn default() -> Self {
        Self {
            max_delay_ms: 1000.0,
            max_feedback: 0.9,
            interpolation_enabled: true,
            mix_enabled: true,
            ping_pong: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSpec {
    pub plugin_name: String,
    pub category: SpecCategory,
    #[serde(default)]
    pub description: String,
    pub parameters: Vec<ParameterSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gain_dsp: Option<GainDsp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waveshaper_dsp: Option<WaveshaperDsp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_dsp: Option<FilterDsp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_dsp: Option<DelayDsp>,
}

fn param_name_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&RE, r"^[a-z][a-zA-Z0-9]*$")
}

fn check_range(errors: &mut Vec<String>, field: &str, value: f32, min: f32, max: f32) {
    if !(min..=max).contains(&value) {
        errors.push(format!("{field} ({value}) must be between {min} and {max}"));
    }
}

fn check_len(errors: &mut Vec<String>, field: &str, value: &str, min: usize, max: usize) {
    let len = value.chars().count();
    if len < min || len > max {
        errors.push(format!("{field} must be {min}-{max} characters (got {len})"));
    }
}

impl PluginSpec {
    /// Parse model output, salvaging near-JSON, then validate.
    pub fn from_model_output(content: &str) -> Result<Self, SchemaError> {
        let spec: PluginSpec = crate::salvage::parse_structured(content)
            .map_err(|err| SchemaError::Malformed(err.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Check every constraint, reporting all violations at once.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut errors = Vec::new();
        check_len(&mut errors, "plugin_name", &self.plugin_name, 3, 32);
        if self.description.chars().count() > 256 {
            errors.push("description must be at most 256 characters".to_string());
        }
        if self.parameters.is_empty() || self.parameters.len() > 8 {
            errors.push(format!(
                "parameters must contain 1-8 entries (got {})",
                self.parameters.len()
            ));
        }

        let mut seen = BTreeSet::new();
        for (i, param) in self.parameters.iter().enumerate() {
            let at = format!("parameters[{i}]");
            check_len(&mut errors, &format!("{at}.name"), &param.name, 2, 32);
            if !param_name_re().is_some_and(|re| re.is_match(&param.name)) {
                errors.push(format!("{at}.name '{}' must be camelCase", param.name));
            }
            if !seen.insert(param.name.as_str()) {
                errors.push(format!("parameter name '{}' is not unique", param.name));
            }
            check_len(&mut errors, &format!("{at}.label"), &param.label, 1, 24);
            check_range(&mut errors, &format!("{at}.min"), param.min, -100.0, 100.0);
            check_range(&mut errors, &format!("{at}.max"), param.max, -100.0, 100.0);
            if param.min >= param.max {
                errors.push(format!("{at}: min ({}) must be below max ({})", param.min, param.max));
            } else if param.default < param.min || param.default > param.max {
                errors.push(format!(
                    "{at}: default ({}) must be between min ({}) and max ({})",
                    param.default, param.min, param.max
                ));
            }
            check_range(&mut errors, &format!("{at}.skew"), param.skew, 0.1, 10.0);
        }

        if let Some(dsp) = &self.gain_dsp {
            check_range(&mut errors, "gain_dsp.gain_range_db", dsp.gain_range_db, 6.0, 60.0);
            check_range(&mut errors, "gain_dsp.smoothing_time_ms", dsp.smoothing_time_ms, 1.0, 100.0);
        }
        if let Some(dsp) = &self.waveshaper_dsp {
            check_range(&mut errors, "waveshaper_dsp.pre_gain_range", dsp.pre_gain_range, 1.0, 100.0);
            check_range(&mut errors, "waveshaper_dsp.asymmetry", dsp.asymmetry, -1.0, 1.0);
        }
        if let Some(dsp) = &self.filter_dsp {
            check_range(&mut errors, "filter_dsp.min_frequency_hz", dsp.min_frequency_hz, 10.0, 100.0);
            check_range(&mut errors, "filter_dsp.max_frequency_hz", dsp.max_frequency_hz, 1000.0, 22000.0);
            check_range(&mut errors, "filter_dsp.min_resonance", dsp.min_resonance, 0.1, 1.0);
            check_range(&mut errors, "filter_dsp.max_resonance", dsp.max_resonance, 1.0, 30.0);
        }
        if let Some(dsp) = &self.delay_dsp {
            check_range(&mut errors, "delay_dsp.max_delay_ms", dsp.max_delay_ms, 100.0, 5000.0);
            check_range(&mut errors, "delay_dsp.max_feedback", dsp.max_feedback, 0.0, 0.99);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::Invalid(errors))
        }
    }

    /// JSON schema for structured-output requests.
    pub fn json_schema() -> Value {
        let categories: Vec<&str> = SpecCategory::ALL.iter().map(|c| c.as_str()).collect();
        json!({
            "type": "object",
            "properties": {
                "plugin_name": { "type": "string", "description": "Plugin display name (3-32 chars)" },
                "category": { "type": "string", "enum": categories },
                "description": { "type": "string", "description": "Brief description (max 256 chars)" },
                "parameters": {
                    "type": "array",
                    "minItems": 1,
                    "maxItems": 8,
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string", "description": "camelCase identifier, e.g. driveAmount" },
                            "label": { "type": "string", "description": "Knob label (1-24 chars)" },
                            "min": { "type": "number" },
                            "max": { "type": "number" },
                            "default": { "type": "number" },
                            "unit": { "type": "string", "enum": ["%", "dB", "ms", "Hz", ":1", ""] },
                            "skew": { "type": "number", "description": "1.0 = linear" }
                        },
                        "required": ["name", "label", "min", "max", "default"]
                    }
                },
                "gain_dsp": {
                    "type": "object",
                    "properties": {
                        "gain_range_db": { "type": "number" },
                        "smoothing_enabled": { "type": "boolean" },
                        "smoothing_time_ms": { "type": "number" }
                    }
                },
                "waveshaper_dsp": {
                    "type": "object",
                    "properties": {
                        "waveshaping_function": {
                            "type": "string",
                            "enum": ["tanh", "atan", "soft_clip", "hard_clip", "sine_fold", "cubic"]
                        },
                        "pre_gain_range": { "type": "number" },
                        "output_compensation": { "type": "boolean" },
                        "mix_enabled": { "type": "boolean" },
                        "asymmetry": { "type": "number" }
                    }
                },
                "filter_dsp": {
                    "type": "object",
                    "properties": {
                        "filter_type": {
                            "type": "string",
                            "enum": ["lowpass", "highpass", "bandpass", "notch", "peak", "lowshelf", "highshelf"]
                        },
                        "min_frequency_hz": { "type": "number" },
                        "max_frequency_hz": { "type": "number" },
                        "min_resonance": { "type": "number" },
                        "max_resonance": { "type": "number" },
                        "use_biquad": { "type": "boolean" }
                    }
                },
                "delay_dsp": {
                    "type": "object",
                    "properties": {
                        "max_delay_ms": { "type": "number" },
                        "max_feedback": { "type": "number" },
                        "interpolation_enabled": { "type": "boolean" },
                        "mix_enabled": { "type": "boolean" },
                        "ping_pong": { "type": "boolean" }
                    }
                }
            },
            "required": ["plugin_name", "category", "parameters"]
        })
    }
}
