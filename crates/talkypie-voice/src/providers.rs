//! Stage selection from process-wide settings.

use std::sync::Arc;

use crate::capability::{
    LanguageModel, NoiseSuppressor, SpeechToText, StageProvider, TextToSpeech, TurnDetector,
    VoiceActivityDetector,
};
use crate::config::PipelineSettings;
use crate::error::VoiceError;
use crate::llm::ChatCompletionsLlm;
use crate::noise::NoiseGate;
use crate::pipeline::PipelineOptions;
use crate::stt::WhisperStt;
use crate::tts::PiperTts;
use crate::turn::PunctuationTurnDetector;
use crate::vad::EnergyVad;

/// Local whisper/piper speech, a chat-completions LLM, and the built-in
/// VAD, turn detector, and noise gate.
#[derive(Debug, Clone)]
pub struct DefaultStageProvider {
    settings: PipelineSettings,
}

impl DefaultStageProvider {
    pub fn new(settings: PipelineSettings) -> Self {
        Self { settings }
    }
}

impl StageProvider for DefaultStageProvider {
    fn stt(&self) -> Result<Arc<dyn SpeechToText>, VoiceError> {
        Ok(Arc::new(WhisperStt::new(
            &self.settings.whisper_model,
            &self.settings.whisper_binary,
            &self.settings.stt_language,
        )))
    }

    fn llm(&self) -> Result<Arc<dyn LanguageModel>, VoiceError> {
        Ok(Arc::new(ChatCompletionsLlm::new(
            &self.settings.llm_base_url,
            &self.settings.llm_api_key,
            &self.settings.llm_model,
        )?))
    }

    fn tts(&self) -> Result<Arc<dyn TextToSpeech>, VoiceError> {
        Ok(Arc::new(PiperTts::new(
            &self.settings.voices_dir,
            &self.settings.piper_binary,
            &self.settings.tts_voice,
        )))
    }

    fn turn_detector(&self) -> Result<Arc<dyn TurnDetector>, VoiceError> {
        Ok(Arc::new(PunctuationTurnDetector::new(
            self.settings.min_endpointing_delay(),
            self.settings.max_endpointing_delay(),
        )))
    }

    fn noise_suppressor(&self) -> Option<Arc<dyn NoiseSuppressor>> {
        if self.settings.noise_cancellation {
            Some(Arc::new(NoiseGate::default()))
        } else {
            None
        }
    }

    fn load_vad(&self) -> Result<Arc<dyn VoiceActivityDetector>, VoiceError> {
        Ok(Arc::new(EnergyVad::load(self.settings.vad_threshold)?))
    }

    fn options(&self) -> PipelineOptions {
        PipelineOptions {
            preemptive_generation: self.settings.preemptive_generation,
            min_endpointing_delay: self.settings.min_endpointing_delay(),
        }
    }
}
