//! Wake word detection
//!
//! Gates on local frame energy, accumulates a speech segment, and once the
//! segment ends in silence asks the recognizer whether it contained a keyword.

use std::sync::Arc;

use crate::capabilities::{SpeechRecognizer, WakeWordEngine};
use crate::config::WakeWordConfig;

/// Samples per frame fed to the detector
pub const FRAME_LENGTH: usize = 512;

/// Minimum speech duration worth transcribing, in seconds
const MIN_SPEECH_SECS: f32 = 0.3;

/// Silence that ends a segment, in seconds
const SILENCE_SECS: f32 = 0.5;

/// Longest segment kept before it is evaluated anyway, in seconds
const MAX_SEGMENT_SECS: f32 = 3.0;

/// State of the wake word detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Waiting for speech
    Idle,
    /// Detected potential speech, accumulating
    Listening,
}

/// Energy-gated wake word engine verified by speech recognition
pub struct EnergyWakeWord {
    recognizer: Arc<dyn SpeechRecognizer>,
    keywords: Vec<String>,
    language: String,
    threshold: f32,
    sample_rate: u32,
    state: DetectorState,
    speech_buffer: Vec<f32>,
    silence_counter: usize,
    min_speech: usize,
    silence_limit: usize,
    max_segment: usize,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn samples_for(secs: f32, sample_rate: u32) -> usize {
    (secs * sample_rate as f32) as usize
}

impl EnergyWakeWord {
    /// Create a detector for `config.keywords` at `sample_rate`
    #[must_use]
    pub fn new(
        recognizer: Arc<dyn SpeechRecognizer>,
        config: &WakeWordConfig,
        language: &str,
        sample_rate: u32,
    ) -> Self {
        let keywords: Vec<String> = config
            .keywords
            .iter()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();

        tracing::debug!(wake_words = ?keywords, "wake word detector initialized");

        Self {
            recognizer,
            keywords,
            language: language.to_string(),
            threshold: config.energy_threshold,
            sample_rate,
            state: DetectorState::Idle,
            speech_buffer: Vec::new(),
            silence_counter: 0,
            min_speech: samples_for(MIN_SPEECH_SECS, sample_rate),
            silence_limit: samples_for(SILENCE_SECS, sample_rate),
            max_segment: samples_for(MAX_SEGMENT_SECS, sample_rate),
        }
    }

    /// Index of the first keyword contained in `transcript`
    #[must_use]
    pub fn keyword_index(&self, transcript: &str) -> Option<usize> {
        let normalized = transcript.to_lowercase();
        self.keywords
            .iter()
            .position(|keyword| normalized.contains(keyword.as_str()))
    }

    /// Get current state
    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }

    /// Reset detector to idle state
    pub fn reset(&mut self) {
        self.state = DetectorState::Idle;
        self.speech_buffer.clear();
        self.silence_counter = 0;
    }

    fn evaluate_segment(&mut self) -> i32 {
        let segment = std::mem::take(&mut self.speech_buffer);
        self.reset();

        tracing::debug!(samples = segment.len(), "speech segment complete");

        let transcript = match self.recognizer.transcribe(&segment, &self.language) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "wake word transcription failed");
                return -1;
            }
        };

        match self.keyword_index(&transcript) {
            Some(index) => {
                tracing::info!(wake_word = %self.keywords[index], transcript, "wake word detected");
                i32::try_from(index).unwrap_or(i32::MAX)
            }
            None => {
                tracing::trace!(transcript, "no wake word in segment");
                -1
            }
        }
    }
}

impl WakeWordEngine for EnergyWakeWord {
    fn process(&mut self, frame: &[i16]) -> i32 {
        let samples: Vec<f32> = frame.iter().map(|&s| f32::from(s) / 32768.0).collect();
        let energy = calculate_energy(&samples);
        let is_speech = energy > self.threshold;

        match self.state {
            DetectorState::Idle => {
                if is_speech {
                    self.state = DetectorState::Listening;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(&samples);
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech detected, listening");
                }
            }
            DetectorState::Listening => {
                self.speech_buffer.extend_from_slice(&samples);

                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                // Enough speech followed by silence, or a segment that never ends
                let ended = self.silence_counter > self.silence_limit
                    && self.speech_buffer.len() > self.min_speech;
                if ended || self.speech_buffer.len() > self.max_segment {
                    return self.evaluate_segment();
                }

                // Too much silence without enough speech
                if self.silence_counter > self.silence_limit * 2 {
                    tracing::trace!("timeout - resetting");
                    self.reset();
                }
            }
        }

        -1
    }

    fn frame_length(&self) -> usize {
        FRAME_LENGTH
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
