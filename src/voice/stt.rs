//! Speech-to-text (STT) processing

use secrecy::{ExposeSecret, SecretString};

use super::capture::samples_to_wav;
use crate::capabilities::SpeechRecognizer;
use crate::config::SttConfig;
use crate::{Error, Result};

/// Response from a Whisper-style transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Transcribes speech through an OpenAI-compatible `/v1/audio/transcriptions` endpoint
pub struct WhisperRecognizer {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    sample_rate: u32,
}

impl WhisperRecognizer {
    /// Create a recognizer for samples captured at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns error if the hosted API is targeted without a key
    pub fn new(config: &SttConfig, sample_rate: u32) -> Result<Self> {
        let endpoint = config.endpoint.trim_end_matches('/').to_string();
        if config.api_key.is_none() && endpoint.contains("api.openai.com") {
            return Err(Error::Config(
                "OpenAI API key required for Whisper".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::blocking::Client::builder().build()?,
            endpoint,
            api_key: config
                .api_key
                .as_ref()
                .map(|k| SecretString::new(k.expose_secret().into())),
            model: config.model.clone(),
            sample_rate,
        })
    }
}

impl SpeechRecognizer for WhisperRecognizer {
    fn transcribe(&self, samples: &[f32], language: &str) -> Result<String> {
        if samples.is_empty() {
            return Ok(String::new());
        }

        let audio = samples_to_wav(samples, self.sample_rate)?;
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let form = reqwest::blocking::multipart::Form::new()
            .part(
                "file",
                reqwest::blocking::multipart::Part::bytes(audio)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone())
            .text("language", language.to_string());

        let mut request = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.endpoint))
            .multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().map_err(|e| {
            tracing::error!(error = %e, "Whisper request failed");
            e
        })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json()?;
        let transcript = result.text.trim().to_string();

        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}
