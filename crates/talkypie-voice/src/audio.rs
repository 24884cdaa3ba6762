//! PCM audio frames exchanged between the room and the pipeline stages.

use std::time::Duration;

/// Sample rate of room input audio.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Mono signed 16-bit PCM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// An empty frame at the given rate, used as an accumulation buffer.
    pub fn empty(sample_rate: u32) -> Self {
        Self::new(Vec::new(), sample_rate)
    }

    /// A frame of digital silence lasting `duration`.
    pub fn silence(duration: Duration, sample_rate: u32) -> Self {
        let count = (duration.as_secs_f64() * f64::from(sample_rate)).round() as usize;
        Self::new(vec![0; count], sample_rate)
    }

    /// Decodes little-endian s16 PCM bytes. A trailing odd byte is dropped.
    pub fn from_pcm_bytes(bytes: &[u8], sample_rate: u32) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Self::new(samples, sample_rate)
    }

    pub fn to_pcm_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// Root-mean-square level of the frame, in sample units.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.samples.iter().map(|&s| f64::from(s).powi(2)).sum();
        (sum / self.samples.len() as f64).sqrt() as f32
    }

    /// Appends `other`'s samples. Frames are assumed to share a sample rate.
    pub fn extend(&mut self, other: &AudioFrame) {
        self.samples.extend_from_slice(&other.samples);
    }
}
