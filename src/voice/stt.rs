//! Speech-to-text (STT) processing
//!
//! Calls are blocking; the interaction loop runs them on the worker pool.

use std::time::Duration;

use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::bridge::Utterance;
use super::wav::samples_to_wav;
use crate::{Error, Result};

/// Upper bound on a single service request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build a blocking HTTP client for one request
///
/// Created and dropped on the worker thread: a blocking client must never
/// be torn down inside the async runtime.
pub(super) fn http_client() -> Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}

/// Everything a transcription service needs for one utterance
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub audio: Utterance,
    pub sample_rate: u32,
    pub language_code: String,
    pub phrase_hints: Vec<String>,
}

/// One candidate transcript
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Alternative {
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// Result of a transcription; may hold no alternatives at all
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcription {
    pub alternatives: Vec<Alternative>,
}

impl Transcription {
    /// The best non-empty transcript, if any
    #[must_use]
    pub fn best(&self) -> Option<&str> {
        self.alternatives
            .first()
            .map(|a| a.transcript.trim())
            .filter(|t| !t.is_empty())
    }
}

/// A blocking transcription backend
pub trait Transcriber: Send + Sync {
    /// Transcribe one utterance
    ///
    /// # Errors
    ///
    /// Returns error if the service cannot be reached or rejects the request
    fn transcribe(&self, request: &TranscriptionRequest) -> Result<Transcription>;
}

/// STT provider backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SttProvider {
    Google,
    Whisper,
}

impl std::str::FromStr for SttProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "whisper" | "openai" => Ok(Self::Whisper),
            other => Err(Error::Config(format!("unknown STT provider: {other}"))),
        }
    }
}

/// Request body for Google Cloud Speech `speech:recognize`
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleRecognizeRequest<'a> {
    config: GoogleRecognitionConfig<'a>,
    audio: GoogleAudio,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleRecognitionConfig<'a> {
    encoding: &'static str,
    sample_rate_hertz: u32,
    language_code: &'a str,
    speech_contexts: Vec<GoogleSpeechContext<'a>>,
}

#[derive(Serialize)]
struct GoogleSpeechContext<'a> {
    phrases: &'a [String],
}

#[derive(Serialize)]
struct GoogleAudio {
    content: String,
}

/// Response from Google Cloud Speech; empty object when nothing was heard
#[derive(Deserialize)]
struct GoogleRecognizeResponse {
    #[serde(default)]
    results: Vec<GoogleResult>,
}

#[derive(Deserialize)]
struct GoogleResult {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

/// Response from OpenAI Whisper transcription API
#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Transcribes speech to text over HTTP
pub struct SpeechToText {
    api_key: SecretString,
    model: String,
    provider: SttProvider,
}

impl SpeechToText {
    /// Create a new STT instance using Google Cloud Speech
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new_google(api_key: Option<SecretString>) -> Result<Self> {
        Self::build(api_key, String::new(), SttProvider::Google, "Google API key required for STT")
    }

    /// Create a new STT instance using `OpenAI` Whisper
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new_whisper(api_key: Option<SecretString>, model: String) -> Result<Self> {
        Self::build(api_key, model, SttProvider::Whisper, "OpenAI API key required for Whisper")
    }

    fn build(
        api_key: Option<SecretString>,
        model: String,
        provider: SttProvider,
        missing: &str,
    ) -> Result<Self> {
        let api_key = api_key
            .filter(|k| !k.expose_secret().is_empty())
            .ok_or_else(|| Error::Config(missing.to_string()))?;

        Ok(Self {
            api_key,
            model,
            provider,
        })
    }

    /// Which backend this instance talks to
    #[must_use]
    pub const fn provider(&self) -> SttProvider {
        self.provider
    }

    /// Transcribe using Google Cloud Speech
    fn transcribe_google(&self, request: &TranscriptionRequest) -> Result<Transcription> {
        tracing::debug!(audio_bytes = request.audio.len(), "starting Google transcription");

        let body = GoogleRecognizeRequest {
            config: GoogleRecognitionConfig {
                encoding: "LINEAR16",
                sample_rate_hertz: request.sample_rate,
                language_code: &request.language_code,
                speech_contexts: vec![GoogleSpeechContext {
                    phrases: &request.phrase_hints,
                }],
            },
            audio: GoogleAudio {
                content: base64::engine::general_purpose::STANDARD
                    .encode(request.audio.as_bytes()),
            },
        };

        let response = http_client()?
            .post("https://speech.googleapis.com/v1/speech:recognize")
            .query(&[("key", self.api_key.expose_secret())])
            .json(&body)
            .send()
            .map_err(|e| {
                tracing::error!(error = %e, "Google STT request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Google STT API error");
            return Err(Error::Stt(format!("Google STT error {status}: {body}")));
        }

        let result: GoogleRecognizeResponse = response.json().map_err(|e| {
            tracing::error!(error = %e, "failed to parse response");
            e
        })?;

        let alternatives = result
            .results
            .into_iter()
            .next()
            .map(|r| r.alternatives)
            .unwrap_or_default();

        tracing::info!(alternatives = alternatives.len(), "transcription complete");
        Ok(Transcription { alternatives })
    }

    /// Transcribe using `OpenAI` Whisper
    fn transcribe_whisper(&self, request: &TranscriptionRequest) -> Result<Transcription> {
        tracing::debug!(audio_bytes = request.audio.len(), "starting Whisper transcription");

        let wav = samples_to_wav(request.audio.samples(), request.sample_rate)?;
        let language = request
            .language_code
            .split('-')
            .next()
            .unwrap_or_default()
            .to_lowercase();

        let mut form = reqwest::blocking::multipart::Form::new()
            .part(
                "file",
                reqwest::blocking::multipart::Part::bytes(wav)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());

        if !language.is_empty() {
            form = form.text("language", language);
        }
        if !request.phrase_hints.is_empty() {
            form = form.text("prompt", request.phrase_hints.join(", "));
        }

        let response = http_client()?
            .post("https://api.openai.com/v1/audio/transcriptions")
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .map_err(|e| {
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

        let result: WhisperResponse = response.json().map_err(|e| {
            tracing::error!(error = %e, "failed to parse response");
            e
        })?;

        tracing::info!(transcript = %result.text, "transcription complete");
        Ok(whisper_transcription(result.text))
    }
}

impl Transcriber for SpeechToText {
    fn transcribe(&self, request: &TranscriptionRequest) -> Result<Transcription> {
        match self.provider {
            SttProvider::Google => self.transcribe_google(request),
            SttProvider::Whisper => self.transcribe_whisper(request),
        }
    }
}

/// Whisper returns one text; silence comes back empty
fn whisper_transcription(text: String) -> Transcription {
    if text.trim().is_empty() {
        return Transcription::default();
    }
    Transcription {
        alternatives: vec![Alternative {
            transcript: text,
            confidence: None,
        }],
    }
}
