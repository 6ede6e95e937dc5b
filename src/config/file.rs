//! TOML configuration file loading
//!
//! Supports `~/.config/herald/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct HeraldConfigFile {
    /// Text generator configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Voice front-end toggle
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Wake word configuration
    #[serde(default)]
    pub wake_word: WakeWordFileConfig,

    /// Capture parameters
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Speech recognition service
    #[serde(default)]
    pub stt: SttFileConfig,

    /// Speech synthesis service
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Home Assistant connection
    #[serde(default)]
    pub home_assistant: HomeAssistantFileConfig,

    /// Media player selection
    #[serde(default)]
    pub media: MediaFileConfig,

    /// HTTP API server
    #[serde(default)]
    pub api: ApiFileConfig,

    /// Scheduler and static jobs
    #[serde(default)]
    pub scheduler: SchedulerFileConfig,
}

/// Text generator configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Ollama host (e.g. "http://localhost:11434")
    pub host: Option<String>,

    /// Model name (e.g. "llama3")
    pub model: Option<String>,

    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,

    /// Request timeout in seconds; unbounded when absent
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    pub enabled: Option<bool>,
}

/// Wake word configuration
#[derive(Debug, Default, Deserialize)]
pub struct WakeWordFileConfig {
    /// Phrases that arm command capture (e.g. "hey herald")
    pub keywords: Option<Vec<String>>,

    /// RMS energy above which a frame counts as speech
    pub energy_threshold: Option<f32>,
}

/// Capture configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    pub sample_rate: Option<u32>,
    pub frame_size: Option<usize>,
    pub silence_threshold: Option<f32>,
    pub silence_duration: Option<f32>,
    pub max_record_secs: Option<f32>,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
}

/// Speech recognition configuration
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub language: Option<String>,
    pub api_key: Option<String>,
}

/// Speech synthesis configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub language: Option<String>,
    pub speed: Option<f32>,
    pub api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HomeAssistantFileConfig {
    pub url: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MediaFileConfig {
    /// `media_player.*` entity used for music commands
    pub player_entity: Option<String>,
}

/// HTTP API configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiFileConfig {
    pub enabled: Option<bool>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Scheduler configuration
#[derive(Debug, Default, Deserialize)]
pub struct SchedulerFileConfig {
    pub enabled: Option<bool>,

    /// Timer loop tick in milliseconds
    pub tick_ms: Option<u64>,

    #[serde(default)]
    pub jobs: Vec<JobFileConfig>,
}

/// A static scheduled job
#[derive(Debug, Clone, Deserialize)]
pub struct JobFileConfig {
    /// Command text submitted to the pipeline
    pub command: String,

    /// Cron expression with seconds field (e.g. "0 30 7 * * *")
    pub cron: String,
}

/// Load the TOML config file from `path`, or the standard path when `None`
///
/// Returns `HeraldConfigFile::default()` if the file doesn't exist or can't be parsed.
#[must_use]
pub fn load_config_file(path: Option<&Path>) -> HeraldConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return HeraldConfigFile::default();
    };

    if !path.exists() {
        return HeraldConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                HeraldConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            HeraldConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/herald/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("herald").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_partial_overlay() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[llm]
model = "mistral"

[audio]
silence_duration = 1.5

[[scheduler.jobs]]
command = "what time is it"
cron = "0 0 8 * * *"
"#
        )
        .unwrap();

        let fc = load_config_file(Some(file.path()));
        assert_eq!(fc.llm.model.as_deref(), Some("mistral"));
        assert!(fc.llm.host.is_none());
        assert_eq!(fc.audio.silence_duration, Some(1.5));
        assert_eq!(fc.scheduler.jobs.len(), 1);
        assert_eq!(fc.scheduler.jobs[0].cron, "0 0 8 * * *");
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[llm\nmodel = ").unwrap();

        let fc = load_config_file(Some(file.path()));
        assert!(fc.llm.model.is_none());
        assert!(fc.scheduler.jobs.is_empty());
    }

    #[test]
    fn test_missing_file_is_default() {
        let fc = load_config_file(Some(Path::new("/nonexistent/herald/config.toml")));
        assert!(fc.api.port.is_none());
    }
}
