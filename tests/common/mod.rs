//! Shared test utilities
//!
//! Fakes for the audio hardware and the speech services so the pipeline can
//! run without devices or network access.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use hearth::voice::{
    Alternative, FrameSender, FrameSource, PushOutcome, Speaker, SpeechAudio, Synthesizer,
    Transcriber, Transcription, TranscriptionRequest,
};
use hearth::{Error, Result};

/// Start and stop counters shared with a fake source
#[derive(Debug, Clone, Default)]
pub struct SourceStats {
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
}

impl SourceStats {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

/// Delivers a fixed list of frames from its own thread, like a sound card
///
/// Frames are paced: a frame refused because the queue is full is offered
/// again, so every frame arrives in order. After the last frame the thread
/// exits and drops its sender.
pub struct ScriptedSource {
    frames: Vec<Vec<u8>>,
    interval: Option<Duration>,
    stats: SourceStats,
    halt: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ScriptedSource {
    pub fn new(frames: Vec<Vec<u8>>) -> Self {
        Self {
            frames,
            interval: None,
            stats: SourceStats::default(),
            halt: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Wait this long before each frame, like a real-time stream
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}

impl FrameSource for ScriptedSource {
    fn start(&mut self, sink: FrameSender) -> Result<()> {
        self.stats.starts.fetch_add(1, Ordering::SeqCst);
        self.halt.store(false, Ordering::SeqCst);

        let frames = self.frames.clone();
        let interval = self.interval;
        let halt = Arc::clone(&self.halt);
        self.worker = Some(std::thread::spawn(move || {
            for frame in frames {
                if let Some(interval) = interval {
                    std::thread::sleep(interval);
                }
                loop {
                    if halt.load(Ordering::SeqCst) {
                        return;
                    }
                    match sink.push(frame.clone()) {
                        PushOutcome::Queued => break,
                        PushOutcome::DroppedFull => std::thread::sleep(Duration::from_millis(1)),
                        PushOutcome::Disconnected => return,
                    }
                }
            }
        }));
        Ok(())
    }

    fn stop(&mut self) {
        self.stats.stops.fetch_add(1, Ordering::SeqCst);
        self.halt.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            worker.join().expect("source thread panicked");
        }
    }
}

/// Starts fine but never delivers anything until stopped
pub struct SilentSource {
    stats: SourceStats,
    sink: Option<FrameSender>,
}

impl SilentSource {
    pub fn new() -> Self {
        Self {
            stats: SourceStats::default(),
            sink: None,
        }
    }

    pub fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}

impl FrameSource for SilentSource {
    fn start(&mut self, sink: FrameSender) -> Result<()> {
        self.stats.starts.fetch_add(1, Ordering::SeqCst);
        self.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        self.stats.stops.fetch_add(1, Ordering::SeqCst);
        self.sink = None;
    }
}

/// Reports a stream fault right after starting, like an unplugged device
pub struct FaultySource {
    stats: SourceStats,
    sink: Option<FrameSender>,
}

impl FaultySource {
    pub fn new() -> Self {
        Self {
            stats: SourceStats::default(),
            sink: None,
        }
    }

    pub fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}

impl FrameSource for FaultySource {
    fn start(&mut self, sink: FrameSender) -> Result<()> {
        self.stats.starts.fetch_add(1, Ordering::SeqCst);
        sink.fail("device unplugged");
        self.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        self.stats.stops.fetch_add(1, Ordering::SeqCst);
        self.sink = None;
    }
}

/// `n` frames of `len` bytes each, numbered so order is checkable
pub fn numbered_frames(n: usize, len: usize) -> Vec<Vec<u8>> {
    (0..n)
        .map(|i| {
            (0..len)
                .map(|j| u8::try_from((i * len + j) % 251).unwrap())
                .collect()
        })
        .collect()
}

/// Transcriber answering with canned transcripts
pub struct FakeTranscriber {
    transcripts: Vec<String>,
    fail: bool,
    pub requests: Mutex<Vec<TranscriptionRequest>>,
}

impl FakeTranscriber {
    /// Hears the given transcripts, best first; empty means nothing was heard
    pub fn hearing(transcripts: &[&str]) -> Self {
        Self {
            transcripts: transcripts.iter().map(ToString::to_string).collect(),
            fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            transcripts: Vec::new(),
            fail: true,
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl Transcriber for FakeTranscriber {
    fn transcribe(&self, request: &TranscriptionRequest) -> Result<Transcription> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(Error::Stt("service unavailable".to_string()));
        }
        Ok(Transcription {
            alternatives: self
                .transcripts
                .iter()
                .map(|t| Alternative {
                    transcript: t.clone(),
                    confidence: Some(0.9),
                })
                .collect(),
        })
    }
}

/// Synthesizer that records what it was asked to say
#[derive(Default)]
pub struct RecordingSynthesizer {
    pub spoken: Mutex<Vec<String>>,
}

impl Synthesizer for RecordingSynthesizer {
    fn synthesize(&self, text: &str) -> Result<SpeechAudio> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(SpeechAudio {
            samples: vec![0; 16],
            sample_rate: 16_000,
        })
    }
}

/// Speaker that only counts playbacks
#[derive(Default)]
pub struct NullSpeaker {
    pub played: AtomicUsize,
}

impl Speaker for NullSpeaker {
    fn play(&self, _audio: &SpeechAudio) -> Result<()> {
        self.played.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
