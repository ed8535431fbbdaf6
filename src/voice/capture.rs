//! Audio capture from microphone

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use super::bridge::{FrameSender, FrameSource};
use crate::{Error, Result};

/// Captures mono 16-bit PCM from the default input device
pub struct AudioCapture {
    config: StreamConfig,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Create a new audio capture instance at the given sample rate
    ///
    /// # Errors
    ///
    /// Returns error if no input device supports the sample rate
    pub fn new(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supports_rate = |c: &cpal::SupportedStreamConfigRange| {
            c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        };

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| c.channels() == 1 && supports_rate(c))
            .or_else(|| {
                // Fallback: any channel count, downmixed in the callback
                device
                    .supported_input_configs()
                    .ok()?
                    .find(|c| supports_rate(c))
            })
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            config,
            stream: None,
        })
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    /// Get the sample rate
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }
}

impl FrameSource for AudioCapture {
    fn start(&mut self, sink: FrameSender) -> Result<()> {
        if self.stream.is_some() {
            return Err(Error::Audio("capture already running".to_string()));
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device".to_string()))?;

        let channels = usize::from(self.config.channels);
        let faults = sink.clone();

        let stream = device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // Bounded work only: convert into a pooled buffer and hand off
                    let mut frame = sink.frame_buffer();
                    encode_pcm(data, channels, &mut frame);
                    sink.push(frame);
                },
                move |err| {
                    tracing::error!(error = %err, "audio capture error");
                    faults.fail(err.to_string());
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            // Dropping the stream drops the callback and with it the sender
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Downmix interleaved f32 samples and append them to `frame` as 16-bit LE PCM
#[allow(clippy::cast_precision_loss)]
fn encode_pcm(data: &[f32], channels: usize, frame: &mut Vec<u8>) {
    let channels = channels.max(1);

    for chunk in data.chunks(channels) {
        let mono = chunk.iter().sum::<f32>() / chunk.len() as f32;
        // Convert f32 [-1.0, 1.0] to i16
        #[allow(clippy::cast_possible_truncation)]
        let sample = (mono * 32767.0).clamp(-32768.0, 32767.0) as i16;
        frame.extend_from_slice(&sample.to_le_bytes());
    }
}
