//! Daemon - the concentrator service
//!
//! Runs the device listener, the status reporter and the voice interaction
//! loop as tasks on one `LocalSet`. The registry never leaves this thread.

use std::cell::RefCell;
use std::io::BufRead;
use std::rc::Rc;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::LocalSet;

use crate::assistant::{
    CycleSettings, InteractionLoop, PatternSet, Services, TriggerHandle, TriggerOutcome,
};
use crate::devices::DeviceRegistry;
use crate::listener::{DeviceListener, SharedRegistry};
use crate::voice::{
    AudioCapture, AudioPlayback, CaptureBridge, SpeechToText, SttProvider, TextToSpeech,
    Transcriber, TtsProvider,
};
use crate::{Config, Result, status};

/// Voice used for `OpenAI` TTS when none is configured
const DEFAULT_OPENAI_VOICE: &str = "alloy";

/// The hearth daemon - devices in, voice out
pub struct Daemon {
    config: Config,
    patterns: PatternSet,
}

impl Daemon {
    /// Create a new daemon instance
    ///
    /// Intent patterns are loaded and validated here so a bad patterns file
    /// stops startup instead of failing mid-conversation.
    ///
    /// # Errors
    ///
    /// Returns error if the patterns cannot be loaded
    pub fn new(config: Config) -> Result<Self> {
        let patterns = config.assistant.load_patterns()?;
        tracing::info!(patterns = patterns.len(), "intent patterns ready");
        Ok(Self { config, patterns })
    }

    /// Run until Ctrl-C
    ///
    /// # Errors
    ///
    /// Returns error if the listener cannot be bound, or if voice is
    /// enabled but its devices or services cannot be set up
    #[allow(clippy::future_not_send)]
    pub async fn run(self) -> Result<()> {
        let local = LocalSet::new();
        local.run_until(self.serve()).await
    }

    #[allow(clippy::future_not_send)]
    async fn serve(self) -> Result<()> {
        let registry: SharedRegistry = Rc::new(RefCell::new(DeviceRegistry::new()));

        // Set up shutdown signal
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
                let _ = shutdown_tx.send(true);
            }
        });

        let listener =
            DeviceListener::bind(self.config.listener.addr(), Rc::clone(&registry)).await?;
        let listener_task = tokio::task::spawn_local(listener.run(shutdown_rx.clone()));

        let status_task = tokio::task::spawn_local(status::run(
            Rc::clone(&registry),
            self.config.listener.status_interval,
            self.config.listener.device_ttl,
            shutdown_rx.clone(),
        ));

        if self.config.voice.enabled {
            let (interaction, trigger) = self.interaction_loop(Rc::clone(&registry))?;
            tokio::task::spawn_local(forward_triggers(trigger, shutdown_rx.clone()));
            tracing::info!("press Enter to talk");
            interaction.run(shutdown_rx.clone()).await;
        } else {
            tracing::info!("voice disabled - running as device concentrator only");
            let mut shutdown = shutdown_rx.clone();
            while !*shutdown.borrow_and_update() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        }

        listener_task.await?;
        status_task.await?;

        tracing::info!(devices = registry.borrow().len(), "daemon stopped");
        Ok(())
    }

    /// Wire the microphone, services and speaker into an interaction loop
    fn interaction_loop(&self, registry: SharedRegistry) -> Result<(InteractionLoop, TriggerHandle)> {
        let voice = &self.config.voice;

        let services = Services {
            transcriber: build_transcriber(&self.config)?,
            synthesizer: Arc::new(build_synthesizer(&self.config)?),
            speaker: Arc::new(AudioPlayback::new()?),
        };
        let capture = AudioCapture::new(voice.sample_rate)?;

        let settings = CycleSettings {
            name: self.config.assistant.name.clone(),
            sample_rate: voice.sample_rate,
            utterance_bytes: voice.utterance_bytes(),
            language_code: voice.language_code.clone(),
        };

        tracing::info!(
            stt = ?voice.stt_provider,
            tts = ?voice.tts_provider,
            name = %settings.name,
            "voice interaction enabled"
        );

        Ok(InteractionLoop::new(
            CaptureBridge::new(voice.queue_frames),
            Box::new(capture),
            services,
            self.patterns.clone(),
            settings,
            registry,
        ))
    }
}

/// Build the configured transcription backend
///
/// # Errors
///
/// Returns error if the provider's API key is missing
pub fn build_transcriber(config: &Config) -> Result<Arc<dyn Transcriber>> {
    let keys = &config.api_keys;
    let stt = match config.voice.stt_provider {
        SttProvider::Google => SpeechToText::new_google(keys.google.clone())?,
        SttProvider::Whisper => {
            SpeechToText::new_whisper(keys.openai.clone(), config.voice.stt_model.clone())?
        }
    };
    Ok(Arc::new(stt))
}

/// Build the configured synthesis backend
///
/// # Errors
///
/// Returns error if the provider's API key is missing
pub fn build_synthesizer(config: &Config) -> Result<TextToSpeech> {
    let voice = &config.voice;
    match voice.tts_provider {
        TtsProvider::Google => TextToSpeech::new_google(
            config.api_keys.google.clone(),
            voice.tts_voice.clone().unwrap_or_default(),
            voice.language_code.clone(),
            voice.sample_rate,
        ),
        TtsProvider::OpenAI => TextToSpeech::new_openai(
            config.api_keys.openai.clone(),
            voice
                .tts_voice
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_VOICE.to_string()),
            voice.tts_model.clone(),
        ),
    }
}

/// Turn lines on stdin into interaction triggers
///
/// Stdin is read on a plain thread so a pending read never holds up
/// shutdown.
#[allow(clippy::future_not_send)]
async fn forward_triggers(trigger: TriggerHandle, mut shutdown: watch::Receiver<bool>) {
    let (tx, mut lines) = mpsc::channel::<()>(4);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            if line.is_err() || tx.blocking_send(()).is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            line = lines.recv() => {
                if line.is_none() {
                    tracing::debug!("stdin closed, no more triggers");
                    break;
                }
                if trigger.trigger() == TriggerOutcome::Closed {
                    break;
                }
            }
        }
    }
}
