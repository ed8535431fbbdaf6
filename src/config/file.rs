//! TOML configuration file loading
//!
//! Supports `~/.config/hearth/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct HearthConfigFile {
    /// UDP listener configuration
    #[serde(default)]
    pub listener: ListenerFileConfig,

    /// Voice/audio configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Assistant name and patterns
    #[serde(default)]
    pub assistant: AssistantFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Device listener configuration
#[derive(Debug, Default, Deserialize)]
pub struct ListenerFileConfig {
    /// Bind address (e.g. "0.0.0.0")
    pub bind: Option<String>,

    /// UDP port
    pub port: Option<u16>,

    /// Forget devices silent for this long
    pub device_ttl_secs: Option<u64>,

    /// Seconds between status tables
    pub status_interval_secs: Option<u64>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Enable voice input/output
    pub enabled: Option<bool>,

    /// Capture sample rate in Hz
    pub sample_rate: Option<u32>,

    /// Utterance length in milliseconds
    pub capture_ms: Option<u64>,

    /// Bounded queue depth between the audio callback and the loop
    pub queue_frames: Option<usize>,

    /// BCP-47 language code (e.g. "en-US")
    pub language_code: Option<String>,

    /// "google" or "whisper"
    pub stt_provider: Option<String>,

    /// "google" or "openai"
    pub tts_provider: Option<String>,

    /// STT model for Whisper (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// TTS model for `OpenAI` (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier
    pub tts_voice: Option<String>,
}

/// Assistant configuration
#[derive(Debug, Default, Deserialize)]
pub struct AssistantFileConfig {
    /// Name used for `$Name`
    pub name: Option<String>,

    /// TOML file of `[[pattern]]` tables replacing the built-ins
    pub patterns_file: Option<PathBuf>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub google: Option<String>,
    pub openai: Option<String>,
}

/// Load the TOML config file from `path`
///
/// Returns `HearthConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: Option<&Path>) -> HearthConfigFile {
    let Some(path) = path else {
        return HearthConfigFile::default();
    };

    if !path.exists() {
        return HearthConfigFile::default();
    }

    match std::fs::read_to_string(path) {
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
                HearthConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            HearthConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/hearth/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("hearth").join("config.toml"))
}
