//! Configuration management for hearth
//!
//! Values are layered: command line > environment > TOML file > defaults.

pub mod file;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::assistant::PatternSet;
use crate::voice::{DEFAULT_QUEUE_FRAMES, SttProvider, TtsProvider, utterance_capacity};
use crate::{Error, Result};

/// Default UDP port devices report to
pub const DEFAULT_PORT: u16 = 20180;

/// hearth configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Device listener configuration
    pub listener: ListenerConfig,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// Assistant configuration
    pub assistant: AssistantConfig,

    /// API keys
    pub api_keys: ApiKeys,
}

/// UDP device listener configuration
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub bind: IpAddr,
    pub port: u16,

    /// Devices silent for longer than this are forgotten; `None` keeps them
    pub device_ttl: Option<Duration>,

    /// Interval between status tables
    pub status_interval: Duration,
}

impl ListenerConfig {
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            device_ttl: None,
            status_interval: Duration::from_secs(3),
        }
    }
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Enable voice input
    pub enabled: bool,

    /// Capture sample rate in Hz
    pub sample_rate: u32,

    /// Length of one utterance
    pub capture_ms: u64,

    /// Bounded queue depth between the audio callback and the loop
    pub queue_frames: usize,

    /// Language code sent to both services
    pub language_code: String,

    pub stt_provider: SttProvider,
    pub tts_provider: TtsProvider,

    /// Whisper model (e.g. "whisper-1")
    pub stt_model: String,

    /// `OpenAI` TTS model (e.g. "tts-1")
    pub tts_model: String,

    /// TTS voice; `None` uses the provider default
    pub tts_voice: Option<String>,
}

impl VoiceConfig {
    /// Exact byte size of one captured utterance
    #[must_use]
    pub const fn utterance_bytes(&self) -> usize {
        utterance_capacity(self.sample_rate, self.capture_ms)
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_rate: 44_100,
            capture_ms: 2_500,
            queue_frames: DEFAULT_QUEUE_FRAMES,
            language_code: "en-US".to_string(),
            stt_provider: SttProvider::Google,
            tts_provider: TtsProvider::Google,
            stt_model: "whisper-1".to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: None,
        }
    }
}

/// Assistant configuration
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Name spoken for `$Name`
    pub name: String,

    /// Patterns replacing the built-in set
    pub patterns_file: Option<PathBuf>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: "Zhaoyuan".to_string(),
            patterns_file: None,
        }
    }
}

impl AssistantConfig {
    /// Load and validate the intent patterns
    ///
    /// # Errors
    ///
    /// Returns error if the patterns file cannot be read or is invalid
    pub fn load_patterns(&self) -> Result<PatternSet> {
        self.patterns_file
            .as_deref()
            .map_or_else(|| Ok(PatternSet::builtin()), PatternSet::load)
    }
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// Google Cloud API key (Speech and Text-to-Speech)
    pub google: Option<SecretString>,

    /// `OpenAI` API key (Whisper and TTS)
    pub openai: Option<SecretString>,
}

/// Values given on the command line, highest precedence
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub bind: Option<IpAddr>,
    pub port: Option<u16>,
    pub name: Option<String>,
    pub language_code: Option<String>,
    pub disable_voice: bool,
}

impl Config {
    /// Load configuration from the environment and config file
    ///
    /// # Errors
    ///
    /// Returns error if a configured value is invalid
    pub fn load() -> Result<Self> {
        Self::load_with_options(&ConfigOverrides::default())
    }

    /// Load configuration with command line overrides
    ///
    /// # Errors
    ///
    /// Returns error if a configured value is invalid
    pub fn load_with_options(overrides: &ConfigOverrides) -> Result<Self> {
        let path = overrides
            .config_path
            .clone()
            .or_else(|| std::env::var("HEARTH_CONFIG").ok().map(PathBuf::from))
            .or_else(file::config_file_path);
        let fc = file::load_config_file(path.as_deref());

        Self::resolve(fc, overrides, |key| std::env::var(key).ok())
    }

    /// Merge the layers; `env` looks up environment variables
    fn resolve<F>(fc: file::HearthConfigFile, overrides: &ConfigOverrides, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ListenerConfig::default();
        let bind = match overrides.bind {
            Some(bind) => bind,
            None => env("HEARTH_BIND")
                .or(fc.listener.bind)
                .map(|s| {
                    s.parse::<IpAddr>()
                        .map_err(|e| Error::Config(format!("invalid bind address {s:?}: {e}")))
                })
                .transpose()?
                .unwrap_or(defaults.bind),
        };
        let listener = ListenerConfig {
            bind,
            port: overrides
                .port
                .or_else(|| env("HEARTH_PORT").and_then(|s| s.parse().ok()))
                .or(fc.listener.port)
                .unwrap_or(defaults.port),
            device_ttl: fc
                .listener
                .device_ttl_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            status_interval: fc
                .listener
                .status_interval_secs
                .filter(|secs| *secs > 0)
                .map_or(defaults.status_interval, Duration::from_secs),
        };

        let defaults = VoiceConfig::default();
        let stt_provider = env("HEARTH_STT_PROVIDER")
            .or(fc.voice.stt_provider)
            .map(|s| s.parse::<SttProvider>())
            .transpose()?
            .unwrap_or(defaults.stt_provider);
        let tts_provider = env("HEARTH_TTS_PROVIDER")
            .or(fc.voice.tts_provider)
            .map(|s| s.parse::<TtsProvider>())
            .transpose()?
            .unwrap_or(defaults.tts_provider);

        let voice = VoiceConfig {
            enabled: !overrides.disable_voice && fc.voice.enabled.unwrap_or(defaults.enabled),
            sample_rate: env("HEARTH_SAMPLE_RATE")
                .and_then(|s| s.parse().ok())
                .or(fc.voice.sample_rate)
                .unwrap_or(defaults.sample_rate),
            capture_ms: fc.voice.capture_ms.unwrap_or(defaults.capture_ms),
            queue_frames: fc.voice.queue_frames.unwrap_or(defaults.queue_frames),
            language_code: overrides
                .language_code
                .clone()
                .or_else(|| env("HEARTH_LANGUAGE"))
                .or(fc.voice.language_code)
                .unwrap_or(defaults.language_code),
            stt_provider,
            tts_provider,
            stt_model: fc.voice.stt_model.unwrap_or(defaults.stt_model),
            tts_model: fc.voice.tts_model.unwrap_or(defaults.tts_model),
            tts_voice: fc.voice.tts_voice.filter(|v| !v.is_empty()),
        };

        if voice.sample_rate == 0 || voice.capture_ms == 0 || voice.queue_frames == 0 {
            return Err(Error::Config(
                "sample_rate, capture_ms and queue_frames must be positive".to_string(),
            ));
        }

        if overrides.disable_voice {
            tracing::info!("voice explicitly disabled via --disable-voice");
        }

        let defaults = AssistantConfig::default();
        let assistant = AssistantConfig {
            name: overrides
                .name
                .clone()
                .or_else(|| env("HEARTH_NAME"))
                .or(fc.assistant.name)
                .unwrap_or(defaults.name),
            patterns_file: fc.assistant.patterns_file,
        };

        // API keys (env > toml > None)
        let api_keys = ApiKeys {
            google: env("GOOGLE_API_KEY")
                .or(fc.api_keys.google)
                .map(SecretString::from),
            openai: env("OPENAI_API_KEY")
                .or(fc.api_keys.openai)
                .map(SecretString::from),
        };

        Ok(Self {
            listener,
            voice,
            assistant,
            api_keys,
        })
    }
}
