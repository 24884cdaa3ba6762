use crate::audio::AudioFrame;
use crate::capability::NoiseSuppressor;

/// Default gate floor, in RMS sample units.
pub const DEFAULT_NOISE_FLOOR: f32 = 150.0;

/// Silences frames whose level sits below a fixed noise floor.
#[derive(Debug, Clone)]
pub struct NoiseGate {
    floor: f32,
}

impl NoiseGate {
    pub fn new(floor: f32) -> Self {
        Self { floor }
    }
}

impl Default for NoiseGate {
    fn default() -> Self {
        Self::new(DEFAULT_NOISE_FLOOR)
    }
}

impl NoiseSuppressor for NoiseGate {
    fn suppress(&self, mut frame: AudioFrame) -> AudioFrame {
        if frame.rms() < self.floor {
            frame.samples.iter_mut().for_each(|s| *s = 0);
        }
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::INPUT_SAMPLE_RATE;

    #[test]
    fn gates_quiet_frames_only() {
        let gate = NoiseGate::default();
        let hiss = AudioFrame::new(vec![40, -40, 40, -40], INPUT_SAMPLE_RATE);
        let voice = AudioFrame::new(vec![3000, -3000, 3000, -3000], INPUT_SAMPLE_RATE);

        assert!(gate.suppress(hiss).samples.iter().all(|&s| s == 0));
        assert_eq!(gate.suppress(voice.clone()), voice);
    }
}
