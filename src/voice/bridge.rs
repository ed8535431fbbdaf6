//! Hand-off between the real-time audio callback and the scheduler
//!
//! The audio subsystem calls into its callback on its own thread with a
//! hard timing budget. The callback only ever calls [`FrameSender::push`],
//! which is a non-blocking `try_send` into a bounded queue. When the queue
//! is full the newest frame is dropped and counted; the callback is never
//! made to wait.
//!
//! On the scheduler side [`CaptureBridge::capture_utterance`] awaits frames
//! and fills an [`UtteranceBuffer`] until it holds exactly one utterance.
//! A stream that reports a fault, or goes quiet for longer than the stall
//! timeout, ends the capture with an audio error.
//!
//! Frame buffers are recycled through a small pool, so a warmed-up callback
//! does not touch the allocator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::{Error, Result};

/// Default bounded queue depth, in frames
pub const DEFAULT_QUEUE_FRAMES: usize = 10;

/// Bytes per sample of 16-bit PCM
pub const BYTES_PER_SAMPLE: usize = 2;

/// Longest gap between frames before a capture is declared stalled
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(1);

/// Initial capacity of pooled frame buffers
const POOLED_FRAME_BYTES: usize = 4096;

/// A chunk of mono 16-bit little-endian PCM as delivered by the callback
pub type AudioFrame = Vec<u8>;

/// Byte capacity of an utterance of `capture_ms` at `sample_rate`
///
/// Always a whole number of samples.
#[must_use]
pub const fn utterance_capacity(sample_rate: u32, capture_ms: u64) -> usize {
    let samples = sample_rate as u64 * capture_ms / 1000;
    #[allow(clippy::cast_possible_truncation)]
    let samples = samples as usize;
    samples * BYTES_PER_SAMPLE
}

/// What happened to a pushed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Frame is waiting for the consumer
    Queued,
    /// Queue was full; the frame was discarded
    DroppedFull,
    /// No capture in progress; the frame was discarded
    Disconnected,
}

/// Spare frame buffers shared by producer and consumer
///
/// The producer side only ever uses `try_lock`, so a contended pool costs
/// the callback an allocation rather than a wait.
#[derive(Debug)]
struct FramePool {
    spare: Mutex<Vec<AudioFrame>>,
    limit: usize,
}

impl FramePool {
    fn new(limit: usize) -> Self {
        let spare = (0..limit)
            .map(|_| Vec::with_capacity(POOLED_FRAME_BYTES))
            .collect();
        Self {
            spare: Mutex::new(spare),
            limit,
        }
    }

    fn take(&self) -> AudioFrame {
        self.spare
            .try_lock()
            .ok()
            .and_then(|mut spare| spare.pop())
            .unwrap_or_default()
    }

    fn give_back(&self, mut frame: AudioFrame) {
        frame.clear();
        if let Ok(mut spare) = self.spare.try_lock()
            && spare.len() < self.limit
        {
            spare.push(frame);
        }
    }

    fn spare_count(&self) -> usize {
        self.spare.lock().map_or(0, |spare| spare.len())
    }
}

/// Producer end of the bridge, handed to the audio callback
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<AudioFrame>,
    faults: mpsc::Sender<String>,
    dropped: Arc<AtomicU64>,
    pool: Arc<FramePool>,
}

impl FrameSender {
    /// An empty buffer to fill with the next frame, reused when possible
    #[must_use]
    pub fn frame_buffer(&self) -> AudioFrame {
        self.pool.take()
    }

    /// Offer a frame to the consumer without ever blocking
    pub fn push(&self, frame: AudioFrame) -> PushOutcome {
        match self.tx.try_send(frame) {
            Ok(()) => PushOutcome::Queued,
            Err(TrySendError::Full(frame)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                self.pool.give_back(frame);
                PushOutcome::DroppedFull
            }
            Err(TrySendError::Closed(frame)) => {
                self.pool.give_back(frame);
                PushOutcome::Disconnected
            }
        }
    }

    /// Report that the stream has failed
    ///
    /// The capture waiting on this sender ends with an audio error. Never
    /// blocks; only the first report of a capture is kept.
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.faults.try_send(reason.into());
    }
}

/// Something that delivers audio frames once armed
///
/// Implemented by the microphone; tests substitute scripted sources.
pub trait FrameSource {
    /// Arm the stream; frames go to `sink` until [`FrameSource::stop`]
    ///
    /// # Errors
    ///
    /// Returns error if the stream cannot be started
    fn start(&mut self, sink: FrameSender) -> Result<()>;

    /// Disarm the stream and release the sink
    fn stop(&mut self);
}

/// Accumulates frames until a fixed byte capacity is reached
#[derive(Debug)]
pub struct UtteranceBuffer {
    bytes: Vec<u8>,
    capacity: usize,
}

impl UtteranceBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a frame, keeping only what fits
    ///
    /// Returns true once the buffer is full
    pub fn push_frame(&mut self, frame: &[u8]) -> bool {
        let take = frame.len().min(self.remaining());
        self.bytes.extend_from_slice(&frame[..take]);
        self.is_full()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.bytes.len() >= self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity - self.bytes.len()
    }

    /// Freeze the contents into an immutable utterance
    #[must_use]
    pub fn freeze(self) -> Utterance {
        Utterance {
            pcm: self.bytes.into_boxed_slice().into(),
        }
    }
}

/// One captured utterance of mono 16-bit little-endian PCM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pcm: Arc<[u8]>,
}

impl Utterance {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.pcm
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pcm.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }

    /// Decode the PCM into samples
    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.pcm
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
    }
}

/// Stops the source however the capture ends, including cancellation
struct ArmedSource<'a, S: FrameSource + ?Sized>(&'a mut S);

impl<S: FrameSource + ?Sized> Drop for ArmedSource<'_, S> {
    fn drop(&mut self) {
        self.0.stop();
    }
}

/// Consumer ends of one capture's queues
struct CaptureQueues {
    frames: mpsc::Receiver<AudioFrame>,
    faults: mpsc::Receiver<String>,
}

/// Scheduler-side end of the bridge
#[derive(Debug)]
pub struct CaptureBridge {
    queue_frames: usize,
    stall_timeout: Duration,
    dropped: Arc<AtomicU64>,
    pool: Arc<FramePool>,
}

impl Default for CaptureBridge {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_FRAMES)
    }
}

impl CaptureBridge {
    /// Create a bridge whose queue holds at most `queue_frames` frames
    #[must_use]
    pub fn new(queue_frames: usize) -> Self {
        let queue_frames = queue_frames.max(1);
        Self {
            queue_frames,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
            dropped: Arc::new(AtomicU64::new(0)),
            pool: Arc::new(FramePool::new(queue_frames + 2)),
        }
    }

    /// Fail a capture when no frame arrives for `timeout`
    #[must_use]
    pub const fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn stall_timeout(&self) -> Duration {
        self.stall_timeout
    }

    /// Frame buffers currently waiting in the pool for reuse
    #[must_use]
    pub fn spare_buffers(&self) -> usize {
        self.pool.spare_count()
    }

    /// Frames discarded because the queue was full, since creation
    #[must_use]
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Open a fresh queue for one capture
    ///
    /// Each capture gets its own queue, so frames from an earlier cycle can
    /// never leak into the next one.
    #[must_use]
    pub fn channel(&self) -> (FrameSender, mpsc::Receiver<AudioFrame>) {
        let (sender, queues) = self.open();
        (sender, queues.frames)
    }

    fn open(&self) -> (FrameSender, CaptureQueues) {
        let (tx, frames) = mpsc::channel(self.queue_frames);
        let (fault_tx, faults) = mpsc::channel(1);
        let sender = FrameSender {
            tx,
            faults: fault_tx,
            dropped: Arc::clone(&self.dropped),
            pool: Arc::clone(&self.pool),
        };
        (sender, CaptureQueues { frames, faults })
    }

    /// Capture exactly `capacity` bytes from `source`
    ///
    /// The source is started before the first frame is awaited and stopped
    /// before returning, on every path.
    ///
    /// # Errors
    ///
    /// Returns error if the source fails to start, reports a fault, stalls
    /// for longer than the stall timeout or stops delivering frames before
    /// the utterance is complete
    pub async fn capture_utterance<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        capacity: usize,
    ) -> Result<Utterance> {
        let (sender, mut queues) = self.open();
        let mut buffer = UtteranceBuffer::new(capacity);
        let dropped_before = self.dropped_frames();

        source.start(sender)?;
        let armed = ArmedSource(source);
        tracing::debug!(capacity, "capture started");

        while !buffer.is_full() {
            let frame = tokio::select! {
                biased;
                Some(reason) = queues.faults.recv() => {
                    return Err(Error::Audio(format!("audio stream failed: {reason}")));
                }
                frame = queues.frames.recv() => frame,
                () = tokio::time::sleep(self.stall_timeout) => {
                    return Err(Error::Audio(format!(
                        "no audio for {} ms after {} of {capacity} bytes",
                        self.stall_timeout.as_millis(),
                        buffer.len()
                    )));
                }
            };
            let Some(frame) = frame else {
                return Err(Error::Audio(format!(
                    "audio stream ended after {} of {capacity} bytes",
                    buffer.len()
                )));
            };
            buffer.push_frame(&frame);
            self.pool.give_back(frame);
        }

        drop(armed);

        let dropped = self.dropped_frames() - dropped_before;
        if dropped > 0 {
            tracing::warn!(dropped, "audio frames dropped during capture");
        }
        tracing::debug!(bytes = buffer.len(), "capture complete");

        Ok(buffer.freeze())
    }
}
