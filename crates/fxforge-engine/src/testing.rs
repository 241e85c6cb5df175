//! In-memory fakes for the ports, shared by the engine's tests.

use anyhow::{anyhow, Result};
use fxforge_core::ports::{
    CiService, CiState, CiStatus, CommitRef, CompletionOptions, ModelClient, PortFuture,
    RepositoryHost,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

// ═══════════════════════════════════════════════════════════════════════════
//  MODEL
// ═══════════════════════════════════════════════════════════════════════════

/// Which prompt a model call came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Schema,
    Template,
    LogicRewrite,
    Full,
    FragmentRepair,
    FileRepair,
    Other,
}

pub fn classify(prompt: &str, options: &CompletionOptions) -> CallKind {
    let system = options.system.as_deref().unwrap_or("");
    if options.json_schema.is_some() {
        CallKind::Schema
    } else if prompt.starts_with("Fix the following C++ DSP logic") {
        CallKind::LogicRewrite
    } else if prompt.starts_with("The DSP logic you provided") {
        CallKind::FragmentRepair
    } else if prompt.starts_with("The following C++ code failed to compile") {
        CallKind::FileRepair
    } else if system.contains("inner-loop DSP code") {
        CallKind::Template
    } else if system.contains("complete source files") {
        CallKind::Full
    } else {
        CallKind::Other
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub prompt: String,
}

type Responder = Box<dyn Fn(CallKind, &str) -> Result<String> + Send + Sync>;

pub struct FakeModel {
    name: String,
    responder: Responder,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeModel {
    pub fn new(
        name: &str,
        responder: impl Fn(CallKind, &str) -> Result<String> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(name: &str, text: &str) -> Arc<Self> {
        let text = text.to_string();
        Self::new(name, move |_, _| Ok(text.clone()))
    }

    pub fn failing(name: &str, message: &str) -> Arc<Self> {
        let message = message.to_string();
        Self::new(name, move |_, _| Err(anyhow!(message.clone())))
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.kind == kind).count()
    }
}

impl ModelClient for FakeModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn complete<'a>(
        &'a self,
        prompt: &'a str,
        options: &'a CompletionOptions,
    ) -> PortFuture<'a, String> {
        Box::pin(async move {
            let kind = classify(prompt, options);
            self.calls.lock().unwrap().push(RecordedCall {
                kind,
                prompt: prompt.to_string(),
            });
            (self.responder)(kind, prompt)
        })
    }
}

/// A model reply wrapping `logic` in a cpp fence.
pub fn fenced(logic: &str) -> String {
    format!("Here is the logic:\n```cpp\n{logic}\n```\n")
}

/// A structured record the schema strategy accepts.
pub const DRIVE_SPEC: &str = r#"{
    "plugin_name": "Warm Drive",
    "category": "waveshaper",
    "description": "Tube-style saturation",
    "parameters": [
        {"name": "drive", "label": "Drive", "min": 1, "max": 20, "default": 4},
        {"name": "mix", "label": "Mix", "min": 0, "max": 1, "default": 1}
    ],
    "waveshaper_dsp": {"waveshaping_function": "tanh"}
}"#;

// ═══════════════════════════════════════════════════════════════════════════
//  REPOSITORY
// ═══════════════════════════════════════════════════════════════════════════

pub const CMAKE: &str = "juce_add_plugin(FxForge\n    PLUGIN_MANUFACTURER_CODE Fxfg\n    PLUGIN_CODE Fx00\n    FORMATS VST3 AU)\n";

pub struct FakeRepo {
    files: Mutex<BTreeMap<String, String>>,
    pushes: Mutex<Vec<BTreeMap<String, String>>>,
    /// Any push touching this path is rejected as a whole.
    reject_path: Option<String>,
}

impl FakeRepo {
    pub fn new() -> Arc<Self> {
        Self::build(None)
    }

    pub fn rejecting(path: &str) -> Arc<Self> {
        Self::build(Some(path.to_string()))
    }

    fn build(reject_path: Option<String>) -> Arc<Self> {
        let mut files = BTreeMap::new();
        files.insert("CMakeLists.txt".to_string(), CMAKE.to_string());
        Arc::new(Self {
            files: Mutex::new(files),
            pushes: Mutex::new(Vec::new()),
            reject_path,
        })
    }

    pub fn pushes(&self) -> Vec<BTreeMap<String, String>> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }
}

impl RepositoryHost for FakeRepo {
    fn push_files<'a>(
        &'a self,
        files: &'a BTreeMap<String, String>,
        _message: &'a str,
    ) -> PortFuture<'a, CommitRef> {
        Box::pin(async move {
            if let Some(path) = &self.reject_path {
                if files.contains_key(path) {
                    return Err(anyhow!("remote rejected update to {path}"));
                }
            }
            let mut pushes = self.pushes.lock().unwrap();
            pushes.push(files.clone());
            self.files
                .lock()
                .unwrap()
                .extend(files.iter().map(|(k, v)| (k.clone(), v.clone())));
            let sha = format!("sha{}", pushes.len());
            Ok(CommitRef {
                url: Some(format!("https://example.test/commit/{sha}")),
                sha,
            })
        })
    }

    fn read_file<'a>(&'a self, path: &'a str) -> PortFuture<'a, Option<String>> {
        Box::pin(async move { Ok(self.file(path)) })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  CI
// ═══════════════════════════════════════════════════════════════════════════

struct Run {
    id: u64,
    script: Vec<CiState>,
    polled: usize,
}

/// Each new commit takes the next script; polls walk it and then stick on
/// its last state. Commits beyond the scripts succeed immediately.
pub struct FakeCi {
    scripts: Mutex<VecDeque<Vec<CiState>>>,
    runs: Mutex<HashMap<String, Run>>,
    summary: String,
    artifacts: BTreeMap<String, String>,
    summaries_requested: Mutex<Vec<u64>>,
}

impl FakeCi {
    pub fn new(scripts: Vec<Vec<CiState>>) -> Arc<Self> {
        Self::with_summary(scripts, "error: build failed")
    }

    pub fn with_summary(scripts: Vec<Vec<CiState>>, summary: &str) -> Arc<Self> {
        let mut artifacts = BTreeMap::new();
        artifacts.insert(
            "FxForge-windows".to_string(),
            "https://example.test/artifacts/1".to_string(),
        );
        artifacts.insert(
            "FxForge-macos".to_string(),
            "https://example.test/artifacts/2".to_string(),
        );
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            runs: Mutex::new(HashMap::new()),
            summary: summary.to_string(),
            artifacts,
            summaries_requested: Mutex::new(Vec::new()),
        })
    }

    pub fn summaries_requested(&self) -> Vec<u64> {
        self.summaries_requested.lock().unwrap().clone()
    }

    /// Commits whose status has been asked for at least once.
    pub fn commits_polled(&self) -> usize {
        self.runs.lock().unwrap().len()
    }
}

impl CiService for FakeCi {
    fn status<'a>(&'a self, commit: &'a CommitRef) -> PortFuture<'a, CiStatus> {
        Box::pin(async move {
            let mut runs = self.runs.lock().unwrap();
            let next_id = runs.len() as u64 + 100;
            let run = runs.entry(commit.sha.clone()).or_insert_with(|| Run {
                id: next_id,
                script: self
                    .scripts
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| vec![CiState::Success]),
                polled: 0,
            });
            let index = run.polled.min(run.script.len().saturating_sub(1));
            let state = run.script.get(index).copied().unwrap_or(CiState::NotFound);
            run.polled += 1;
            if state == CiState::NotFound {
                return Ok(CiStatus::not_found());
            }
            Ok(CiStatus {
                state,
                run_id: Some(run.id),
                url: Some(format!("https://example.test/runs/{}", run.id)),
            })
        })
    }

    fn run_summary<'a>(&'a self, run_id: u64) -> PortFuture<'a, String> {
        Box::pin(async move {
            self.summaries_requested.lock().unwrap().push(run_id);
            Ok(self.summary.clone())
        })
    }

    fn artifacts<'a>(&'a self, _run_id: u64) -> PortFuture<'a, BTreeMap<String, String>> {
        Box::pin(async move { Ok(self.artifacts.clone()) })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  FULL FILES
// ═══════════════════════════════════════════════════════════════════════════

pub const PROCESSOR_CPP: &str = r#"#include "PluginProcessor.h"
#include "PluginEditor.h"

FxForgeAudioProcessor::FxForgeAudioProcessor()
    : AudioProcessor(BusesProperties()
                     .withInput("Input", juce::AudioChannelSet::stereo(), true)
                     .withOutput("Output", juce::AudioChannelSet::stereo(), true))
{
}

void FxForgeAudioProcessor::processBlock(juce::AudioBuffer<float>& buffer, juce::MidiBuffer& midi)
{
    juce::ignoreUnused(midi);
    buffer.applyGain(0.5f);
}

juce::AudioProcessorEditor* FxForgeAudioProcessor::createEditor()
{
    return new FxForgeAudioProcessorEditor(*this);
}

juce::AudioProcessor* JUCE_CALLTYPE createPluginFilter()
{
    return new FxForgeAudioProcessor();
}"#;

pub const EDITOR_CPP: &str = r#"#include "PluginProcessor.h"
#include "PluginEditor.h"

FxForgeAudioProcessorEditor::FxForgeAudioProcessorEditor(FxForgeAudioProcessor& p)
    : AudioProcessorEditor(&p), processorRef(p)
{
    setSize(400, 300);
}

void FxForgeAudioProcessorEditor::paint(juce::Graphics& g)
{
    g.fillAll(juce::Colours::black);
}

void FxForgeAudioProcessorEditor::resized()
{
}"#;

/// A full-generation reply with both implementation files.
pub fn full_reply(processor: &str) -> String {
    format!(
        "Here you go.\n\n```cpp Source/PluginProcessor.cpp\n{processor}\n```\n\n```cpp Source/PluginEditor.cpp\n{EDITOR_CPP}\n```\n"
    )
}
