use crate::audio::AudioFrame;
use crate::capability::{VadDecision, VoiceActivityDetector};
use crate::error::VoiceError;

/// Energy-threshold voice activity detector.
#[derive(Debug, Clone)]
pub struct EnergyVad {
    threshold: f32,
}

impl EnergyVad {
    /// Loads the detector. Called once per worker process during prewarm.
    pub fn load(threshold: f32) -> Result<Self, VoiceError> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(VoiceError::Vad(format!(
                "threshold must be a positive RMS level, got {}",
                threshold
            )));
        }
        tracing::info!(threshold, "loaded energy VAD");
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn detect_activity(&self, frame: &AudioFrame) -> VadDecision {
        let rms = frame.rms();
        VadDecision {
            is_speech: rms >= self.threshold,
            probability: (rms / (2.0 * self.threshold)).clamp(0.0, 1.0),
        }
    }
}
