//! Shared test utilities
//!
//! In-memory stand-ins for every capability so no test needs audio hardware
//! or network access.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;

use herald::capabilities::{
    AudioInput, Entity, FrameSource, GenerationRequest, HomeAutomation, SpeechRecognizer,
    SpeechSink, TextGenerator, WakeWordEngine,
};
use herald::intent::parse::TAXONOMY_PROMPT;
use herald::{Error, Result, Subsystem};

/// Generator with one canned classification and one canned answer
#[derive(Default)]
pub struct ScriptedGenerator {
    classification: Option<String>,
    answer: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    /// Classifies every command as `raw`
    pub fn classifying(raw: &str) -> Self {
        Self {
            classification: Some(raw.to_string()),
            ..Self::default()
        }
    }

    /// Fails every call
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Answer general questions with `answer`
    pub fn answering(mut self, answer: &str) -> Self {
        self.answer = Some(answer.to_string());
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl TextGenerator for ScriptedGenerator {
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
        self.prompts.lock().unwrap().push(request.prompt.to_string());
        let reply = if request.system_prompt == Some(TAXONOMY_PROMPT) {
            &self.classification
        } else {
            &self.answer
        };
        reply.clone().ok_or(Error::Unavailable("scripted generator"))
    }

    fn is_available(&self) -> bool {
        self.classification.is_some()
    }
}

/// Remembers everything it was asked to say
#[derive(Default)]
pub struct RecordingSink {
    spoken: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

impl SpeechSink for RecordingSink {
    fn speak(&self, text: &str) {
        self.spoken.lock().unwrap().push(text.to_string());
    }
}

/// One recorded service call
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub payload: Value,
}

/// Home automation over a fixed entity list
#[derive(Default)]
pub struct FakeHome {
    entities: Vec<Entity>,
    failing: HashSet<String>,
    calls: Mutex<Vec<ServiceCall>>,
}

impl FakeHome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity_id: &str, state: &str, attributes: Value) -> Self {
        let attributes: Map<String, Value> = attributes.as_object().cloned().unwrap_or_default();
        self.entities.push(Entity {
            entity_id: entity_id.to_string(),
            state: state.to_string(),
            attributes,
        });
        self
    }

    /// Shorthand for an entity with only a friendly name
    pub fn with_named(self, entity_id: &str, state: &str, name: &str) -> Self {
        self.with_entity(entity_id, state, json!({ "friendly_name": name }))
    }

    /// Service calls targeting `entity_id` fail
    pub fn failing(mut self, entity_id: &str) -> Self {
        self.failing.insert(entity_id.to_string());
        self
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().unwrap().clone()
    }

    fn entity(&self, entity_id: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.entity_id == entity_id)
    }
}

impl HomeAutomation for FakeHome {
    fn find_entities(&self, domain: &str, filter: &str) -> Vec<Entity> {
        self.entities
            .iter()
            .filter(|e| e.matches(domain, filter))
            .cloned()
            .collect()
    }

    fn get_state(&self, entity_id: &str) -> Option<String> {
        self.entity(entity_id).map(|e| e.state.clone())
    }

    fn get_attributes(&self, entity_id: &str) -> Option<Map<String, Value>> {
        self.entity(entity_id).map(|e| e.attributes.clone())
    }

    fn call_service(&self, domain: &str, service: &str, payload: Value) -> Result<()> {
        self.calls.lock().unwrap().push(ServiceCall {
            domain: domain.to_string(),
            service: service.to_string(),
            payload: payload.clone(),
        });

        let target = payload
            .get("entity_id")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if self.failing.contains(target) {
            return Err(Error::Integration(format!("{target} is unreachable")));
        }
        Ok(())
    }
}

/// Frame source replaying a script, then optionally idling until cancelled
pub struct ScriptedSource {
    frames: VecDeque<Vec<i16>>,
    hold_open: bool,
    sample_rate: u32,
}

impl FrameSource for ScriptedSource {
    fn read_frame(&mut self, len: usize, cancel: &CancellationToken) -> Result<Option<Vec<i16>>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        if let Some(mut frame) = self.frames.pop_front() {
            frame.resize(len, frame.last().copied().unwrap_or(0));
            return Ok(Some(frame));
        }
        while self.hold_open && !cancel.is_cancelled() {
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(None)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Microphone whose first `open` replays a script
pub struct ScriptedInput {
    frames: Mutex<Option<VecDeque<Vec<i16>>>>,
    hold_open: bool,
    opened: AtomicUsize,
}

impl ScriptedInput {
    pub fn new(frames: Vec<Vec<i16>>) -> Self {
        Self {
            frames: Mutex::new(Some(frames.into())),
            hold_open: false,
            opened: AtomicUsize::new(0),
        }
    }

    /// Keep the stream open after the script until cancelled
    pub fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl AudioInput for ScriptedInput {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn FrameSource>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let frames = self.frames.lock().unwrap().take().unwrap_or_default();
        Ok(Box::new(ScriptedSource {
            frames,
            hold_open: self.hold_open,
            sample_rate,
        }))
    }
}

/// Sample value that makes [`MarkerWake`] fire
pub const WAKE_MARKER: i16 = 12_345;

/// Wake engine that fires on frames starting with [`WAKE_MARKER`]
pub struct MarkerWake {
    pub frames_seen: Arc<AtomicUsize>,
}

impl MarkerWake {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let seen = Arc::new(AtomicUsize::new(0));
        (
            Self {
                frames_seen: Arc::clone(&seen),
            },
            seen,
        )
    }
}

impl WakeWordEngine for MarkerWake {
    fn process(&mut self, frame: &[i16]) -> i32 {
        self.frames_seen.fetch_add(1, Ordering::SeqCst);
        if frame.first() == Some(&WAKE_MARKER) { 0 } else { -1 }
    }

    fn frame_length(&self) -> usize {
        4
    }

    fn sample_rate(&self) -> u32 {
        16
    }
}

/// Recognizer returning a fixed transcript
pub struct FixedRecognizer {
    transcript: String,
    calls: AtomicUsize,
}

impl FixedRecognizer {
    pub fn new(transcript: &str) -> Self {
        Self {
            transcript: transcript.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SpeechRecognizer for FixedRecognizer {
    fn transcribe(&self, _samples: &[f32], _language: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.transcript.clone())
    }
}

/// Subsystem that records start/stop into a shared log
pub struct FakeSubsystem {
    name: &'static str,
    fail_start: bool,
    log: Arc<Mutex<Vec<String>>>,
}

impl FakeSubsystem {
    pub fn new(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name,
            fail_start: false,
            log: Arc::clone(log),
        }
    }

    pub fn failing(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            fail_start: true,
            ..Self::new(name, log)
        }
    }
}

impl Subsystem for FakeSubsystem {
    fn name(&self) -> &'static str {
        self.name
    }

    fn start(&self) -> Result<()> {
        self.log.lock().unwrap().push(format!("start {}", self.name));
        if self.fail_start {
            return Err(Error::Api(format!("{} refused to start", self.name)));
        }
        Ok(())
    }

    fn stop(&self) -> bool {
        self.log.lock().unwrap().push(format!("stop {}", self.name));
        true
    }
}

/// Mono PCM16 frame of constant amplitude
pub fn frame(value: i16, len: usize) -> Vec<i16> {
    vec![value; len]
}
