//! Ollama text generation client

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{GenerationRequest, TextGenerator};
use crate::config::LlmConfig;
use crate::{Error, Result};

/// Non-streaming `/api/generate` request body
#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Generates text through a local Ollama server
pub struct OllamaGenerator {
    client: reqwest::blocking::Client,
    host: String,
    model: String,
}

impl OllamaGenerator {
    /// Create a client for the configured host and model
    ///
    /// Requests have no timeout unless `timeout_secs` is set.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout_secs.map(Duration::from_secs))
            .build()?;

        tracing::debug!(host = %config.host, model = %config.model, "ollama generator initialized");

        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl TextGenerator for OllamaGenerator {
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
        let body = GenerateRequest {
            model: &self.model,
            prompt: request.prompt,
            stream: false,
            system: request.system_prompt,
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        tracing::debug!(model = %self.model, "generating text");

        let response = self
            .client
            .post(format!("{}/api/generate", self.host))
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::Generator(format!("Ollama error {status}: {body}")));
        }

        let result: GenerateResponse = response.json()?;
        Ok(result.response)
    }

    fn is_available(&self) -> bool {
        match self.client.get(format!("{}/api/tags", self.host)).send() {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::warn!(error = %e, host = %self.host, "ollama not reachable");
                false
            }
        }
    }
}
