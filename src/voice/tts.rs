//! Text-to-speech (TTS) processing
//!
//! Both backends are asked for 16-bit PCM so the result can go straight to
//! the speaker without a decoder.

use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::stt::http_client;
use super::wav::{SpeechAudio, is_wav, wav_to_speech};
use crate::{Error, Result};

/// Sample rate of `OpenAI` `pcm` responses
const OPENAI_PCM_SAMPLE_RATE: u32 = 24_000;

/// A blocking synthesis backend
pub trait Synthesizer: Send + Sync {
    /// Synthesize text to mono 16-bit PCM
    ///
    /// # Errors
    ///
    /// Returns error if the service cannot be reached or rejects the request
    fn synthesize(&self, text: &str) -> Result<SpeechAudio>;
}

/// TTS provider backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TtsProvider {
    Google,
    OpenAI,
}

impl std::str::FromStr for TtsProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "openai" => Ok(Self::OpenAI),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }
}

/// Synthesizes speech from text over HTTP
pub struct TextToSpeech {
    api_key: SecretString,
    voice: String,
    model: String,
    language_code: String,
    sample_rate: u32,
    provider: TtsProvider,
}

impl TextToSpeech {
    /// Create a new TTS instance using Google Cloud Text-to-Speech
    ///
    /// `voice` may be empty to let the service pick a voice for the language.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new_google(
        api_key: Option<SecretString>,
        voice: String,
        language_code: String,
        sample_rate: u32,
    ) -> Result<Self> {
        Ok(Self {
            api_key: require_key(api_key, "Google API key required for TTS")?,
            voice,
            model: String::new(),
            language_code,
            sample_rate,
            provider: TtsProvider::Google,
        })
    }

    /// Create a new TTS instance using `OpenAI`
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new_openai(api_key: Option<SecretString>, voice: String, model: String) -> Result<Self> {
        Ok(Self {
            api_key: require_key(api_key, "OpenAI API key required for TTS")?,
            voice,
            model,
            language_code: String::new(),
            sample_rate: OPENAI_PCM_SAMPLE_RATE,
            provider: TtsProvider::OpenAI,
        })
    }

    /// Synthesize using Google Cloud Text-to-Speech
    fn synthesize_google(&self, text: &str) -> Result<SpeechAudio> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct GoogleSynthesizeRequest<'a> {
            input: GoogleInput<'a>,
            voice: GoogleVoice<'a>,
            audio_config: GoogleAudioConfig,
        }

        #[derive(Serialize)]
        struct GoogleInput<'a> {
            text: &'a str,
        }

        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct GoogleVoice<'a> {
            language_code: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            name: Option<&'a str>,
            ssml_gender: &'static str,
        }

        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct GoogleAudioConfig {
            audio_encoding: &'static str,
            sample_rate_hertz: u32,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct GoogleSynthesizeResponse {
            audio_content: String,
        }

        let request = GoogleSynthesizeRequest {
            input: GoogleInput { text },
            voice: GoogleVoice {
                language_code: &self.language_code,
                name: (!self.voice.is_empty()).then_some(self.voice.as_str()),
                ssml_gender: "FEMALE",
            },
            audio_config: GoogleAudioConfig {
                audio_encoding: "LINEAR16",
                sample_rate_hertz: self.sample_rate,
            },
        };

        let response = http_client()?
            .post("https://texttospeech.googleapis.com/v1/text:synthesize")
            .query(&[("key", self.api_key.expose_secret())])
            .json(&request)
            .send()?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(Error::Tts(format!("Google TTS error {status}: {body}")));
        }

        let result: GoogleSynthesizeResponse = response.json()?;
        let audio = base64::engine::general_purpose::STANDARD
            .decode(result.audio_content)
            .map_err(|e| Error::Tts(format!("invalid audio content: {e}")))?;

        decode_linear16(&audio, self.sample_rate)
    }

    /// Synthesize using `OpenAI` TTS
    fn synthesize_openai(&self, text: &str) -> Result<SpeechAudio> {
        #[derive(Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            response_format: &'static str,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            response_format: "pcm",
        };

        let response = http_client()?
            .post("https://api.openai.com/v1/audio/speech")
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response.bytes()?;
        Ok(SpeechAudio::from_le_bytes(&audio, OPENAI_PCM_SAMPLE_RATE))
    }
}

impl Synthesizer for TextToSpeech {
    fn synthesize(&self, text: &str) -> Result<SpeechAudio> {
        tracing::debug!(provider = ?self.provider, chars = text.len(), "synthesizing");
        match self.provider {
            TtsProvider::Google => self.synthesize_google(text),
            TtsProvider::OpenAI => self.synthesize_openai(text),
        }
    }
}

fn require_key(api_key: Option<SecretString>, missing: &str) -> Result<SecretString> {
    api_key
        .filter(|k| !k.expose_secret().is_empty())
        .ok_or_else(|| Error::Config(missing.to_string()))
}

/// LINEAR16 from Google arrives with a WAV header; raw PCM is accepted too
fn decode_linear16(audio: &[u8], sample_rate: u32) -> Result<SpeechAudio> {
    if is_wav(audio) {
        wav_to_speech(audio)
    } else {
        Ok(SpeechAudio::from_le_bytes(audio, sample_rate))
    }
}
