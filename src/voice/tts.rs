//! Text-to-speech (TTS) processing

use std::io::Cursor;

use secrecy::{ExposeSecret, SecretString};

use crate::capabilities::{SpeechAudio, SpeechSynthesizer};
use crate::config::TtsConfig;
use crate::{Error, Result};

/// Synthesizes speech through an OpenAI-compatible `/v1/audio/speech` endpoint
pub struct SpeechApiSynthesizer {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    speed: f32,
}

impl SpeechApiSynthesizer {
    /// Create a synthesizer from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the hosted API is targeted without a key
    pub fn new(config: &TtsConfig) -> Result<Self> {
        let endpoint = config.endpoint.trim_end_matches('/').to_string();
        if config.api_key.is_none() && endpoint.contains("api.openai.com") {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::blocking::Client::builder().build()?,
            endpoint,
            api_key: config
                .api_key
                .as_ref()
                .map(|k| SecretString::new(k.expose_secret().into())),
            model: config.model.clone(),
            speed: config.speed,
        })
    }

    fn request_mp3(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
            response_format: &'a str,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice,
            speed: self.speed,
            response_format: "mp3",
        };

        let mut builder = self
            .client
            .post(format!("{}/v1/audio/speech", self.endpoint))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send()?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(Error::Tts(format!("speech API error {status}: {body}")));
        }

        Ok(response.bytes()?.to_vec())
    }
}

impl SpeechSynthesizer for SpeechApiSynthesizer {
    fn synthesize(&self, text: &str, voice: &str, language: &str) -> Result<SpeechAudio> {
        tracing::debug!(chars = text.len(), voice, language, "synthesizing speech");
        let mp3 = self.request_mp3(text, voice)?;
        decode_mp3(&mp3)
    }
}

/// Decode MP3 bytes to mono f32 samples
///
/// # Errors
///
/// Returns error if the stream is not valid MP3
pub fn decode_mp3(mp3_data: &[u8]) -> Result<SpeechAudio> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut audio = SpeechAudio::default();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if let Ok(rate) = u32::try_from(frame.sample_rate) {
                    audio.sample_rate = rate;
                }
                if frame.channels == 2 {
                    // Stereo: average channels
                    audio.samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    audio
                        .samples
                        .extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Tts(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(audio)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_empty_input_yields_no_samples() {
        let audio = decode_mp3(&[]).unwrap();
        assert!(audio.is_empty());
    }

    #[test]
    fn test_hosted_api_requires_key() {
        let config = TtsConfig::default();
        assert!(matches!(
            SpeechApiSynthesizer::new(&config),
            Err(Error::Config(_))
        ));
    }
}
