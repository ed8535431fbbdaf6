//! Voice processing module
//!
//! Handles microphone capture, the hand-off of audio frames onto the
//! scheduler, STT and TTS service calls, and playback.

pub mod bridge;
mod capture;
mod playback;
mod stt;
mod tts;
mod wav;

pub use bridge::{
    AudioFrame, CaptureBridge, DEFAULT_QUEUE_FRAMES, DEFAULT_STALL_TIMEOUT, FrameSender,
    FrameSource, PushOutcome, Utterance, UtteranceBuffer, utterance_capacity,
};
pub use capture::AudioCapture;
pub use playback::{AudioPlayback, Speaker};
pub use stt::{
    Alternative, SpeechToText, SttProvider, Transcriber, Transcription, TranscriptionRequest,
};
pub use tts::{Synthesizer, TextToSpeech, TtsProvider};
pub use wav::{SpeechAudio, samples_to_wav};
