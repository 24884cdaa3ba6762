#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use talkypie_voice::{
    AudioFrame, ChatContext, Generation, LanguageModel, NoiseSuppressor, PipelineOptions,
    SpeechToText, StageProvider, TextToSpeech, TurnDetector, VadDecision, VoiceActivityDetector,
    VoiceError, INPUT_SAMPLE_RATE,
};
use tokio::sync::mpsc;

pub const PREAMBLE: &str = "Hi I am Pie.";

pub fn speech() -> AudioFrame {
    AudioFrame::new(vec![4000; 320], INPUT_SAMPLE_RATE)
}

pub fn silence() -> AudioFrame {
    AudioFrame::silence(Duration::from_millis(20), INPUT_SAMPLE_RATE)
}

/// Speaks one utterance followed by enough silence to end the turn.
pub async fn say_one_turn(tx: &mpsc::Sender<AudioFrame>) {
    for _ in 0..10 {
        tx.send(speech()).await.unwrap();
    }
    for _ in 0..15 {
        tx.send(silence()).await.unwrap();
    }
}

/// Waits for the agent's spoken reply.
pub async fn hear_reply(rx: &mut mpsc::Receiver<AudioFrame>) -> AudioFrame {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for agent audio")
        .expect("room output closed")
}

struct ThresholdVad;

impl VoiceActivityDetector for ThresholdVad {
    fn detect_activity(&self, frame: &AudioFrame) -> VadDecision {
        let is_speech = frame.rms() > 1000.0;
        VadDecision {
            is_speech,
            probability: if is_speech { 1.0 } else { 0.0 },
        }
    }
}

struct EchoStt;

#[async_trait]
impl SpeechToText for EchoStt {
    async fn transcribe(&self, _audio: &AudioFrame) -> Result<String, VoiceError> {
        Ok("hello pie".to_string())
    }
}

#[derive(Default)]
pub struct RecordingLlm {
    pub contexts: Mutex<Vec<ChatContext>>,
}

#[async_trait]
impl LanguageModel for RecordingLlm {
    async fn generate(&self, chat: &ChatContext) -> Result<Generation, VoiceError> {
        self.contexts.lock().unwrap().push(chat.clone());
        Ok(Generation {
            text: "hello friend".to_string(),
            prompt_tokens: 100,
            completion_tokens: 10,
            prompt_cached_tokens: 40,
        })
    }
}

struct ToneTts;

#[async_trait]
impl TextToSpeech for ToneTts {
    async fn synthesize(&self, text: &str) -> Result<AudioFrame, VoiceError> {
        Ok(AudioFrame::new(vec![1; text.len() * 100], 22_050))
    }
}

struct SilenceTurns;

impl TurnDetector for SilenceTurns {
    fn detect_turn_end(&self, _transcript: &str, trailing_silence: Duration) -> bool {
        trailing_silence >= Duration::from_millis(200)
    }
}

struct PassThrough;

impl NoiseSuppressor for PassThrough {
    fn suppress(&self, frame: AudioFrame) -> AudioFrame {
        frame
    }
}

/// Scripted stages with switches for failure paths.
#[derive(Default)]
pub struct FakeProvider {
    pub llm: Arc<RecordingLlm>,
    pub vad_loads: AtomicUsize,
    pub fail_tts: bool,
    pub fail_vad: bool,
}

impl FakeProvider {
    pub fn vad_loads(&self) -> usize {
        self.vad_loads.load(Ordering::SeqCst)
    }

    pub fn instructions_seen(&self) -> Vec<String> {
        self.llm
            .contexts
            .lock()
            .unwrap()
            .iter()
            .map(|chat| chat.instructions().to_string())
            .collect()
    }
}

impl StageProvider for FakeProvider {
    fn stt(&self) -> Result<Arc<dyn SpeechToText>, VoiceError> {
        Ok(Arc::new(EchoStt))
    }

    fn llm(&self) -> Result<Arc<dyn LanguageModel>, VoiceError> {
        Ok(self.llm.clone())
    }

    fn tts(&self) -> Result<Arc<dyn TextToSpeech>, VoiceError> {
        if self.fail_tts {
            return Err(VoiceError::Tts("voice model missing".to_string()));
        }
        Ok(Arc::new(ToneTts))
    }

    fn turn_detector(&self) -> Result<Arc<dyn TurnDetector>, VoiceError> {
        Ok(Arc::new(SilenceTurns))
    }

    fn noise_suppressor(&self) -> Option<Arc<dyn NoiseSuppressor>> {
        Some(Arc::new(PassThrough))
    }

    fn load_vad(&self) -> Result<Arc<dyn VoiceActivityDetector>, VoiceError> {
        self.vad_loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_vad {
            return Err(VoiceError::Vad("model file missing".to_string()));
        }
        Ok(Arc::new(ThresholdVad))
    }

    fn options(&self) -> PipelineOptions {
        PipelineOptions {
            preemptive_generation: false,
            min_endpointing_delay: Duration::from_millis(100),
        }
    }
}
