//! Capability interfaces
//!
//! Narrow, blocking call-through contracts for every external engine or
//! service the pipeline touches. Nothing here orchestrates; the concrete
//! adapters only translate calls to a device or a remote API.

pub mod home_assistant;
pub mod media;
pub mod ollama;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::Result;

pub use home_assistant::HomeAssistantClient;
pub use media::HomeAssistantMedia;
pub use ollama::OllamaGenerator;

/// Detects a trigger phrase in fixed-length PCM16 frames
///
/// The frame length and sample rate are properties of the engine instance.
pub trait WakeWordEngine: Send {
    /// Feed one frame; returns the detected keyword index or -1
    fn process(&mut self, frame: &[i16]) -> i32;

    /// Samples per frame the engine expects
    fn frame_length(&self) -> usize;

    /// Sample rate the engine expects
    fn sample_rate(&self) -> u32;
}

/// Converts normalized float samples to text
pub trait SpeechRecognizer: Send + Sync {
    /// Transcribe samples in `[-1.0, 1.0]`; an empty string means nothing was heard
    ///
    /// # Errors
    ///
    /// Returns error if the recognition service fails
    fn transcribe(&self, samples: &[f32], language: &str) -> Result<String>;
}

/// Decoded, playable speech
#[derive(Debug, Clone, Default)]
pub struct SpeechAudio {
    /// Mono samples in `[-1.0, 1.0]`
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl SpeechAudio {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Converts text to playable audio
pub trait SpeechSynthesizer: Send + Sync {
    /// # Errors
    ///
    /// Returns error if synthesis or decoding fails
    fn synthesize(&self, text: &str, voice: &str, language: &str) -> Result<SpeechAudio>;
}

/// Arguments for one text generation call
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub prompt: &'a str,
    pub system_prompt: Option<&'a str>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl<'a> GenerationRequest<'a> {
    #[must_use]
    pub const fn new(prompt: &'a str) -> Self {
        Self {
            prompt,
            system_prompt: None,
            temperature: 0.7,
            max_tokens: None,
        }
    }

    #[must_use]
    pub const fn system(mut self, system_prompt: &'a str) -> Self {
        self.system_prompt = Some(system_prompt);
        self
    }

    #[must_use]
    pub const fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub const fn max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A text generation backend
pub trait TextGenerator: Send + Sync {
    /// # Errors
    ///
    /// Returns error if the backend is unreachable or answers with a failure
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<String>;

    /// Cheap reachability probe
    fn is_available(&self) -> bool;
}

/// A home automation entity snapshot
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct Entity {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Entity {
    /// `light` for `light.kitchen`
    #[must_use]
    pub fn domain(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map_or(self.entity_id.as_str(), |(domain, _)| domain)
    }

    /// Friendly name attribute, falling back to the entity id
    #[must_use]
    pub fn friendly_name(&self) -> &str {
        self.attributes
            .get("friendly_name")
            .and_then(Value::as_str)
            .unwrap_or(&self.entity_id)
    }

    /// Whether this entity belongs to `domain` and matches `filter`
    ///
    /// An empty filter matches every entity in the domain. Otherwise the
    /// filter must appear, case-insensitively, in the friendly name or the id.
    #[must_use]
    pub fn matches(&self, domain: &str, filter: &str) -> bool {
        if self.domain() != domain || !self.entity_id.contains('.') {
            return false;
        }
        if filter.is_empty() {
            return true;
        }
        let filter = filter.to_lowercase();
        self.friendly_name().to_lowercase().contains(&filter)
            || self.entity_id.to_lowercase().contains(&filter)
    }
}

/// Home automation service calls and cached state reads
///
/// Reads may be stale. A successful `call_service` refreshes the entities it targeted.
pub trait HomeAutomation: Send + Sync {
    /// Entities of `domain` matching `filter`; empty on any failure
    fn find_entities(&self, domain: &str, filter: &str) -> Vec<Entity>;

    /// Current state string of an entity
    fn get_state(&self, entity_id: &str) -> Option<String>;

    /// Attribute map of an entity
    fn get_attributes(&self, entity_id: &str) -> Option<Map<String, Value>>;

    /// Invoke `domain.service` with a JSON payload
    ///
    /// # Errors
    ///
    /// Returns error carrying the failure detail for this call
    fn call_service(&self, domain: &str, service: &str, payload: Value) -> Result<()>;

    /// Friendly name of an entity, falling back to its id
    fn entity_name(&self, entity_id: &str) -> String {
        self.get_attributes(entity_id)
            .and_then(|attrs| {
                attrs
                    .get("friendly_name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| entity_id.to_string())
    }
}

/// What to play; every field optional
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MusicQuery {
    pub artist: String,
    pub album: String,
    pub track: String,
    pub playlist: String,
    pub genre: String,
    /// Source name; empty selects the player's current source
    pub source: String,
}

impl MusicQuery {
    /// Whether nothing specific was requested
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artist.is_empty()
            && self.album.is_empty()
            && self.track.is_empty()
            && self.playlist.is_empty()
            && self.genre.is_empty()
    }

    /// Free-text search term built from the most specific fields present
    #[must_use]
    pub fn search_term(&self) -> String {
        [
            &self.track,
            &self.album,
            &self.artist,
            &self.playlist,
            &self.genre,
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// Media playback primitives
///
/// # Errors
///
/// Every mutating call returns an error carrying the failure detail.
pub trait MediaPlayer: Send + Sync {
    fn play(&self) -> Result<()>;
    fn pause(&self) -> Result<()>;
    fn next(&self) -> Result<()>;
    fn previous(&self) -> Result<()>;

    /// Set volume as a percentage `0..=100`
    fn set_volume(&self, level: u8) -> Result<()>;

    /// Current volume as a percentage
    fn get_volume(&self) -> Option<u8>;

    fn set_mute(&self, muted: bool) -> Result<()>;
    fn set_shuffle(&self, enabled: bool) -> Result<()>;
    fn set_repeat(&self, enabled: bool) -> Result<()>;

    /// Start playing music matching `query`
    fn play_music(&self, query: &MusicQuery) -> Result<()>;

    /// Whether `source` can be played from; the empty source is always supported
    fn supports_source(&self, source: &str) -> bool;
}

/// A stream of fixed-size PCM16 frames
///
/// Dropping the source closes the underlying device stream.
pub trait FrameSource {
    /// Block until `len` samples are available
    ///
    /// Returns `None` once `cancel` fires or the stream is exhausted. The
    /// token is checked at least every few tens of milliseconds.
    ///
    /// # Errors
    ///
    /// Returns error if the device stream failed
    fn read_frame(&mut self, len: usize, cancel: &CancellationToken) -> Result<Option<Vec<i16>>>;

    /// Sample rate of the frames
    fn sample_rate(&self) -> u32;

    /// Drop samples buffered but not yet read
    fn discard_pending(&mut self) {}
}

/// Opens frame sources on the calling thread
pub trait AudioInput: Send + Sync {
    /// # Errors
    ///
    /// Returns error if the device cannot be opened at `sample_rate`
    fn open(&self, sample_rate: u32) -> Result<Box<dyn FrameSource>>;
}

/// Plays decoded speech synchronously
pub trait AudioOutput: Send + Sync {
    /// # Errors
    ///
    /// Returns error if the output device fails
    fn play(&self, audio: &SpeechAudio) -> Result<()>;
}

/// Speaks text; failures are logged, never returned
pub trait SpeechSink: Send + Sync {
    fn speak(&self, text: &str);
}
