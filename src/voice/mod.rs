//! Voice processing module
//!
//! Microphone capture, speaker playback, wake word detection and the
//! speech service adapters.

mod capture;
mod playback;
mod stt;
mod tts;
mod wake_word;

use std::sync::Arc;

pub use capture::{Microphone, MicrophoneStream, list_devices, samples_to_wav, to_float, to_pcm16};
pub use playback::{Speaker, sine_tone};
pub use stt::WhisperRecognizer;
pub use tts::{SpeechApiSynthesizer, decode_mp3};
pub use wake_word::{DetectorState, EnergyWakeWord, FRAME_LENGTH};

use crate::capabilities::{AudioOutput, SpeechSink, SpeechSynthesizer};

/// Speaks text by synthesizing it and playing the result
pub struct Voice {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    output: Arc<dyn AudioOutput>,
    voice: String,
    language: String,
}

impl Voice {
    #[must_use]
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        output: Arc<dyn AudioOutput>,
        voice: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            synthesizer,
            output,
            voice: voice.into(),
            language: language.into(),
        }
    }
}

impl SpeechSink for Voice {
    fn speak(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }

        let audio = match self.synthesizer.synthesize(text, &self.voice, &self.language) {
            Ok(audio) => audio,
            Err(e) => {
                tracing::error!(error = %e, "speech synthesis failed");
                return;
            }
        };

        if let Err(e) = self.output.play(&audio) {
            tracing::error!(error = %e, "speech playback failed");
        }
    }
}
