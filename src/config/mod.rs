//! Configuration management for Herald
//!
//! One [`Config`] value is built at startup and handed to every constructor.
//! Precedence, lowest first: defaults, TOML file, `.env`, environment, CLI.

pub mod file;

use std::path::Path;

use secrecy::SecretString;

use crate::{Error, Result};

/// Herald configuration
#[derive(Debug)]
pub struct Config {
    /// Run the voice front-end
    pub voice_enabled: bool,

    /// Text generator
    pub llm: LlmConfig,

    /// Wake word gate
    pub wake_word: WakeWordConfig,

    /// Capture parameters
    pub audio: AudioConfig,

    /// Speech recognition
    pub stt: SttConfig,

    /// Speech synthesis
    pub tts: TtsConfig,

    /// Home Assistant connection
    pub home_assistant: HomeAssistantConfig,

    /// Media player
    pub media: MediaConfig,

    /// HTTP API front-end
    pub api: ApiConfig,

    /// Scheduler front-end
    pub scheduler: SchedulerConfig,
}

/// Text generator configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Ollama base URL
    pub host: String,

    /// Model name
    pub model: String,

    pub temperature: f32,

    /// Token cap for intent classification; `None` leaves it to the model
    pub max_tokens: Option<u32>,

    /// Request timeout; `None` means the call may block indefinitely
    pub timeout_secs: Option<u64>,
}

/// Wake word configuration
#[derive(Debug, Clone)]
pub struct WakeWordConfig {
    /// Lowercased trigger phrases
    pub keywords: Vec<String>,

    /// RMS energy above which a frame counts as speech
    pub energy_threshold: f32,
}

/// Capture configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Capture sample rate in Hz
    pub sample_rate: u32,

    /// Samples per frame while recording a command
    pub frame_size: usize,

    /// Normalized mean amplitude under which a frame is silent
    pub silence_threshold: f32,

    /// Seconds of trailing silence that end a recording
    pub silence_duration: f32,

    /// Hard cap on recording length in seconds
    pub max_record_secs: f32,

    /// Input device name; default device when `None`
    pub input_device: Option<String>,

    /// Output device name; default device when `None`
    pub output_device: Option<String>,
}

/// Speech recognition configuration
#[derive(Debug)]
pub struct SttConfig {
    /// Base URL of an OpenAI-compatible transcription service
    pub endpoint: String,
    pub model: String,
    pub language: String,
    pub api_key: Option<SecretString>,
}

/// Speech synthesis configuration
#[derive(Debug)]
pub struct TtsConfig {
    /// Base URL of an OpenAI-compatible speech service
    pub endpoint: String,
    pub model: String,
    pub voice: String,
    pub language: String,
    pub speed: f32,
    pub api_key: Option<SecretString>,
}

/// Home Assistant configuration
#[derive(Debug, Default)]
pub struct HomeAssistantConfig {
    /// Base URL; the integration is unavailable when `None`
    pub url: Option<String>,
    pub token: Option<SecretString>,
}

/// Media configuration
#[derive(Debug, Clone, Default)]
pub struct MediaConfig {
    /// `media_player.*` entity; first player found when `None`
    pub player_entity: Option<String>,
}

/// HTTP API configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,

    /// Timer loop tick in milliseconds, capped at 100
    pub tick_ms: u64,

    /// Jobs installed at startup
    pub jobs: Vec<file::JobFileConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            voice_enabled: true,
            llm: LlmConfig::default(),
            wake_word: WakeWordConfig::default(),
            audio: AudioConfig::default(),
            stt: SttConfig::default(),
            tts: TtsConfig::default(),
            home_assistant: HomeAssistantConfig::default(),
            media: MediaConfig::default(),
            api: ApiConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            temperature: 0.1,
            max_tokens: None,
            timeout_secs: None,
        }
    }
}

impl Default for WakeWordConfig {
    fn default() -> Self {
        Self {
            keywords: vec!["hey herald".to_string(), "herald".to_string()],
            energy_threshold: 0.03,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_size: 1024,
            silence_threshold: 0.03,
            silence_duration: 1.0,
            max_record_secs: 10.0,
            input_device: None,
            output_device: None,
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com".to_string(),
            model: "whisper-1".to_string(),
            language: "en".to_string(),
            api_key: None,
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com".to_string(),
            model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            language: "en".to_string(),
            speed: 1.0,
            api_key: None,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_ms: 100,
            jobs: Vec::new(),
        }
    }
}

/// Command-line overrides applied last
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub disable_voice: bool,
}

impl Config {
    /// Load configuration from the standard file path and environment
    ///
    /// # Errors
    ///
    /// Returns error if the merged configuration is invalid
    pub fn load() -> Result<Self> {
        Self::load_with_options(None, &Overrides::default())
    }

    /// Load configuration with an explicit file path and CLI overrides
    ///
    /// # Errors
    ///
    /// Returns error if the merged configuration is invalid
    pub fn load_with_options(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        // .env never overrides variables already set in the process
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            tracing::warn!(error = %e, "failed to load .env file");
        }

        let fc = file::load_config_file(path);
        let defaults = Self::default();

        // LLM (env > toml > default)
        let llm = LlmConfig {
            host: env("OLLAMA_HOST")
                .or(fc.llm.host)
                .unwrap_or(defaults.llm.host),
            model: env("HERALD_LLM_MODEL")
                .or_else(|| env("LLM_MODEL"))
                .or(fc.llm.model)
                .unwrap_or(defaults.llm.model),
            temperature: env_parse("HERALD_LLM_TEMPERATURE")
                .or(fc.llm.temperature)
                .unwrap_or(defaults.llm.temperature),
            max_tokens: env_parse("HERALD_LLM_MAX_TOKENS").or(fc.llm.max_tokens),
            timeout_secs: env_parse("HERALD_LLM_TIMEOUT").or(fc.llm.timeout_secs),
        };

        let wake_word = WakeWordConfig {
            keywords: env("HERALD_WAKE_WORDS")
                .map(|s| s.split(',').map(str::to_string).collect())
                .or(fc.wake_word.keywords)
                .unwrap_or(defaults.wake_word.keywords)
                .into_iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
            energy_threshold: env_parse("HERALD_WAKE_ENERGY")
                .or(fc.wake_word.energy_threshold)
                .unwrap_or(defaults.wake_word.energy_threshold),
        };

        let audio = AudioConfig {
            sample_rate: env_parse("HERALD_SAMPLE_RATE")
                .or(fc.audio.sample_rate)
                .unwrap_or(defaults.audio.sample_rate),
            frame_size: env_parse("HERALD_FRAME_SIZE")
                .or(fc.audio.frame_size)
                .unwrap_or(defaults.audio.frame_size),
            silence_threshold: env_parse("HERALD_SILENCE_THRESHOLD")
                .or(fc.audio.silence_threshold)
                .unwrap_or(defaults.audio.silence_threshold),
            silence_duration: env_parse("HERALD_SILENCE_DURATION")
                .or(fc.audio.silence_duration)
                .unwrap_or(defaults.audio.silence_duration),
            max_record_secs: env_parse("HERALD_MAX_RECORD_SECS")
                .or(fc.audio.max_record_secs)
                .unwrap_or(defaults.audio.max_record_secs),
            input_device: env("HERALD_INPUT_DEVICE").or(fc.audio.input_device),
            output_device: env("HERALD_OUTPUT_DEVICE").or(fc.audio.output_device),
        };

        let stt = SttConfig {
            endpoint: env("HERALD_STT_ENDPOINT")
                .or(fc.stt.endpoint)
                .unwrap_or(defaults.stt.endpoint),
            model: env("WHISPER_MODEL")
                .or(fc.stt.model)
                .unwrap_or(defaults.stt.model),
            language: env("WHISPER_LANGUAGE")
                .or(fc.stt.language)
                .unwrap_or(defaults.stt.language),
            api_key: env("HERALD_STT_API_KEY")
                .or_else(|| env("OPENAI_API_KEY"))
                .or(fc.stt.api_key)
                .map(secret),
        };

        let tts = TtsConfig {
            endpoint: env("HERALD_TTS_ENDPOINT")
                .or(fc.tts.endpoint)
                .unwrap_or(defaults.tts.endpoint),
            model: env("TTS_MODEL")
                .or(fc.tts.model)
                .unwrap_or(defaults.tts.model),
            voice: env("TTS_SPEAKER")
                .or(fc.tts.voice)
                .unwrap_or(defaults.tts.voice),
            language: env("TTS_LANGUAGE")
                .or(fc.tts.language)
                .unwrap_or(defaults.tts.language),
            speed: env_parse("HERALD_TTS_SPEED")
                .or(fc.tts.speed)
                .unwrap_or(defaults.tts.speed),
            api_key: env("HERALD_TTS_API_KEY")
                .or_else(|| env("OPENAI_API_KEY"))
                .or(fc.tts.api_key)
                .map(secret),
        };

        let home_assistant = HomeAssistantConfig {
            url: env("HASS_URL").or(fc.home_assistant.url),
            token: env("HASS_TOKEN").or(fc.home_assistant.token).map(secret),
        };

        let media = MediaConfig {
            player_entity: env("HERALD_MEDIA_PLAYER").or(fc.media.player_entity),
        };

        // API server (cli > env > toml > default)
        let api = ApiConfig {
            enabled: env_bool("HERALD_API_ENABLED")
                .or(fc.api.enabled)
                .unwrap_or(defaults.api.enabled),
            host: env("HOST").or(fc.api.host).unwrap_or(defaults.api.host),
            port: overrides
                .port
                .or_else(|| env_parse("HERALD_PORT"))
                .or_else(|| env_parse("PORT"))
                .or(fc.api.port)
                .unwrap_or(defaults.api.port),
        };

        let scheduler = SchedulerConfig {
            enabled: env_bool("HERALD_SCHEDULER_ENABLED")
                .or(fc.scheduler.enabled)
                .unwrap_or(defaults.scheduler.enabled),
            tick_ms: fc
                .scheduler
                .tick_ms
                .unwrap_or(defaults.scheduler.tick_ms)
                .clamp(1, 100),
            jobs: fc.scheduler.jobs,
        };

        let voice_enabled = if overrides.disable_voice {
            tracing::info!("voice explicitly disabled via --disable-voice");
            false
        } else {
            env_bool("HERALD_VOICE_ENABLED")
                .or(fc.voice.enabled)
                .unwrap_or(defaults.voice_enabled)
        };

        let config = Self {
            voice_enabled,
            llm,
            wake_word,
            audio,
            stt,
            tts,
            home_assistant,
            media,
            api,
            scheduler,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check values that would otherwise fail deep inside a worker
    ///
    /// # Errors
    ///
    /// Returns error describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("audio.sample_rate must be positive".to_string()));
        }
        if self.audio.frame_size == 0 {
            return Err(Error::Config("audio.frame_size must be positive".to_string()));
        }
        if self.audio.silence_duration <= 0.0 || self.audio.max_record_secs <= 0.0 {
            return Err(Error::Config(
                "audio.silence_duration and audio.max_record_secs must be positive".to_string(),
            ));
        }
        if self.voice_enabled && self.wake_word.keywords.is_empty() {
            return Err(Error::Config("wake_word.keywords must not be empty".to_string()));
        }
        url::Url::parse(&self.llm.host)
            .map_err(|e| Error::Config(format!("invalid llm.host '{}': {e}", self.llm.host)))?;
        if let Some(hass) = &self.home_assistant.url {
            url::Url::parse(hass)
                .map_err(|e| Error::Config(format!("invalid home_assistant.url '{hass}': {e}")))?;
        }
        Ok(())
    }
}

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env(key).and_then(|s| s.parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    env(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

fn secret(value: String) -> SecretString {
    SecretString::new(value.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.audio.frame_size, 1024);
        assert_eq!(config.audio.sample_rate, 16_000);
        assert!((config.audio.silence_duration - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_validate_rejects_zero_frame_size() {
        let mut config = Config::default();
        config.audio.frame_size = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_hass_url() {
        let config = Config {
            home_assistant: HomeAssistantConfig {
                url: Some("not a url".to_string()),
                token: None,
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
