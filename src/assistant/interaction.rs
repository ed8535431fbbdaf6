//! The voice interaction loop
//!
//! One cycle at a time: capture an utterance, transcribe it on the worker
//! pool, pick a pattern, render a response, then synthesize and play it on
//! the worker pool. All state changes happen on the scheduler thread.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{mpsc, watch};
use tracing::Instrument;
use uuid::Uuid;

use super::patterns::PatternSet;
use super::scoring::select_pattern;
use super::template::{Placeholders, compose_response};
use crate::listener::SharedRegistry;
use crate::voice::{
    CaptureBridge, FrameSource, Speaker, Synthesizer, Transcriber, TranscriptionRequest,
};
use crate::{Error, Result};

/// Where the interaction loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Capturing,
    Transcribing,
    Responding,
}

/// Result of asking for a new cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A cycle was claimed and the loop woken
    Started,
    /// A cycle is already running; the trigger was ignored
    Busy,
    /// The loop is no longer running
    Closed,
}

/// Starts interaction cycles; cheap to clone, scheduler thread only
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    state: Rc<Cell<CycleState>>,
    tx: mpsc::Sender<()>,
}

impl TriggerHandle {
    /// Request one interaction cycle
    ///
    /// The cycle slot is claimed immediately, so a second trigger arriving
    /// before the loop has even started capturing is still ignored.
    pub fn trigger(&self) -> TriggerOutcome {
        let state = self.state.get();
        if state != CycleState::Idle {
            tracing::info!(?state, "interaction in progress, trigger ignored");
            return TriggerOutcome::Busy;
        }

        match self.tx.try_send(()) {
            Ok(()) => {
                self.state.set(CycleState::Capturing);
                TriggerOutcome::Started
            }
            Err(mpsc::error::TrySendError::Full(())) => TriggerOutcome::Busy,
            Err(mpsc::error::TrySendError::Closed(())) => TriggerOutcome::Closed,
        }
    }

    #[must_use]
    pub fn state(&self) -> CycleState {
        self.state.get()
    }
}

/// Returns the loop to Idle when a cycle ends, however it ends
struct CycleGuard(Rc<Cell<CycleState>>);

impl CycleGuard {
    fn enter(state: &Rc<Cell<CycleState>>) -> Self {
        state.set(CycleState::Capturing);
        Self(Rc::clone(state))
    }

    fn advance(&self, next: CycleState) {
        tracing::debug!(from = ?self.0.get(), to = ?next, "interaction state");
        self.0.set(next);
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.0.set(CycleState::Idle);
    }
}

/// Blocking collaborators run on the worker pool
#[derive(Clone)]
pub struct Services {
    pub transcriber: Arc<dyn Transcriber>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub speaker: Arc<dyn Speaker>,
}

/// Per-cycle parameters
#[derive(Debug, Clone)]
pub struct CycleSettings {
    /// Assistant name for `$Name`
    pub name: String,
    pub sample_rate: u32,
    /// Exact size of one utterance in bytes
    pub utterance_bytes: usize,
    pub language_code: String,
}

/// What one completed cycle heard and said
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub transcript: Option<String>,
    pub pattern: usize,
    pub response: String,
}

/// Drives interaction cycles on the scheduler thread
pub struct InteractionLoop {
    bridge: CaptureBridge,
    source: Box<dyn FrameSource>,
    services: Services,
    patterns: PatternSet,
    phrase_hints: Vec<String>,
    settings: CycleSettings,
    registry: SharedRegistry,
    state: Rc<Cell<CycleState>>,
    triggers: mpsc::Receiver<()>,
    rng: StdRng,
}

impl InteractionLoop {
    /// Create the loop and the handle used to trigger it
    #[must_use]
    pub fn new(
        bridge: CaptureBridge,
        source: Box<dyn FrameSource>,
        services: Services,
        patterns: PatternSet,
        settings: CycleSettings,
        registry: SharedRegistry,
    ) -> (Self, TriggerHandle) {
        let state = Rc::new(Cell::new(CycleState::Idle));
        let (tx, triggers) = mpsc::channel(1);
        let phrase_hints = patterns.phrase_hints();

        let handle = TriggerHandle {
            state: Rc::clone(&state),
            tx,
        };

        let this = Self {
            bridge,
            source,
            services,
            patterns,
            phrase_hints,
            settings,
            registry,
            state,
            triggers,
            rng: StdRng::from_entropy(),
        };

        (this, handle)
    }

    /// Use a fixed seed for template selection
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    #[must_use]
    pub fn state(&self) -> CycleState {
        self.state.get()
    }

    /// Frames dropped by the capture bridge so far
    #[must_use]
    pub fn dropped_frames(&self) -> u64 {
        self.bridge.dropped_frames()
    }

    /// Serve triggers until shutdown or until every trigger handle is gone
    ///
    /// Shutdown cancels an in-flight cycle; its guards stop the microphone
    /// and return the state to Idle. Once this returns, triggers report
    /// [`TriggerOutcome::Closed`].
    #[allow(clippy::future_not_send)]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            patterns = self.patterns.len(),
            utterance_bytes = self.settings.utterance_bytes,
            "interaction loop ready"
        );

        loop {
            let triggered = tokio::select! {
                biased;
                _ = shutdown.changed() => false,
                trigger = self.triggers.recv() => trigger.is_some(),
            };
            if !triggered {
                break;
            }

            let span = tracing::info_span!("interaction", cycle = %Uuid::new_v4());
            let outcome = tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    tracing::info!("shutdown during interaction, cycle abandoned");
                    break;
                }
                outcome = self.run_cycle().instrument(span.clone()) => outcome,
            };

            span.in_scope(|| match outcome {
                Ok(report) => tracing::info!(
                    transcript = report.transcript.as_deref().unwrap_or(""),
                    pattern = report.pattern,
                    response = %report.response,
                    "interaction complete"
                ),
                Err(e) => tracing::error!(error = %e, "interaction failed"),
            });
        }

        // A trigger may have claimed the slot without being served
        self.triggers.close();
        self.state.set(CycleState::Idle);
        tracing::info!("interaction loop stopped");
    }

    /// Run one full cycle
    ///
    /// # Errors
    ///
    /// Returns error if capture, transcription, rendering, synthesis or
    /// playback fails. The loop is back in Idle either way.
    #[allow(clippy::future_not_send)]
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let guard = CycleGuard::enter(&self.state);

        let audio = self
            .bridge
            .capture_utterance(&mut *self.source, self.settings.utterance_bytes)
            .await?;

        guard.advance(CycleState::Transcribing);
        let request = TranscriptionRequest {
            audio,
            sample_rate: self.settings.sample_rate,
            language_code: self.settings.language_code.clone(),
            phrase_hints: self.phrase_hints.clone(),
        };
        let transcriber = Arc::clone(&self.services.transcriber);
        let transcription =
            tokio::task::spawn_blocking(move || transcriber.transcribe(&request)).await??;

        guard.advance(CycleState::Responding);
        let transcript = transcription.best().map(str::to_string);
        let pattern = select_pattern(&self.patterns, transcript.as_deref());

        let response = {
            let registry = self.registry.borrow();
            let values = Placeholders {
                name: &self.settings.name,
                registry: &registry,
            };
            let intent = self
                .patterns
                .get(pattern)
                .ok_or_else(|| Error::Pattern(format!("pattern {pattern} out of range")))?;
            compose_response(intent, &values, &mut self.rng)?
        };

        let synthesizer = Arc::clone(&self.services.synthesizer);
        let speaker = Arc::clone(&self.services.speaker);
        let text = response.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let speech = synthesizer.synthesize(&text)?;
            speaker.play(&speech)
        })
        .await??;

        drop(guard);
        Ok(CycleReport {
            transcript,
            pattern,
            response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_returns_to_idle() {
        let state = Rc::new(Cell::new(CycleState::Idle));
        {
            let guard = CycleGuard::enter(&state);
            assert_eq!(state.get(), CycleState::Capturing);
            guard.advance(CycleState::Responding);
            assert_eq!(state.get(), CycleState::Responding);
        }
        assert_eq!(state.get(), CycleState::Idle);
    }

    #[test]
    fn trigger_claims_single_slot() {
        let state = Rc::new(Cell::new(CycleState::Idle));
        let (tx, _rx) = mpsc::channel(1);
        let handle = TriggerHandle { state, tx };

        assert_eq!(handle.trigger(), TriggerOutcome::Started);
        assert_eq!(handle.state(), CycleState::Capturing);
        assert_eq!(handle.trigger(), TriggerOutcome::Busy);
    }

    #[test]
    fn trigger_after_loop_gone() {
        let state = Rc::new(Cell::new(CycleState::Idle));
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = TriggerHandle { state, tx };

        assert_eq!(handle.trigger(), TriggerOutcome::Closed);
        assert_eq!(handle.state(), CycleState::Idle);
    }
}
