//! WAV framing for raw PCM

use std::io::Cursor;

use crate::{Error, Result};

/// Mono 16-bit PCM with its sample rate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl SpeechAudio {
    /// Parse raw 16-bit little-endian PCM
    #[must_use]
    pub fn from_le_bytes(pcm: &[u8], sample_rate: u32) -> Self {
        let samples = pcm
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        Self {
            samples,
            sample_rate,
        }
    }

    /// Playback length in milliseconds
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / u64::from(self.sample_rate)
    }
}

/// Wrap mono 16-bit samples in a WAV container for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: impl IntoIterator<Item = i16>, sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Whether the bytes start with a RIFF/WAVE header
#[must_use]
pub fn is_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// Decode a 16-bit WAV into mono samples, averaging channels
///
/// # Errors
///
/// Returns error if the data is not 16-bit integer WAV
pub fn wav_to_speech(bytes: &[u8]) -> Result<SpeechAudio> {
    let mut reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();

    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(Error::Audio(format!(
            "unsupported WAV format: {} bit {:?}",
            spec.bits_per_sample, spec.sample_format
        )));
    }

    let interleaved = reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Audio(e.to_string()))?;

    let channels = usize::from(spec.channels.max(1));
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let samples = interleaved
        .chunks(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
            (sum / frame.len() as i32) as i16
        })
        .collect();

    Ok(SpeechAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}
