//! Narrow interfaces for the pluggable pipeline stages.
//!
//! Each stage is a single-method capability. Concrete implementations are
//! chosen once per process by a [`StageProvider`] and shared across
//! sessions behind `Arc`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::audio::AudioFrame;
use crate::error::VoiceError;

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Conversation state handed to the language model: the session
/// instructions followed by the turns so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatContext {
    messages: Vec<ChatMessage>,
}

impl ChatContext {
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage {
                role: ChatRole::System,
                content: instructions.into(),
            }],
        }
    }

    pub fn push(&mut self, role: ChatRole, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role,
            content: content.into(),
        });
    }

    /// Returns a copy of this context with one more message appended.
    pub fn with(&self, role: ChatRole, content: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.push(role, content);
        next
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn instructions(&self) -> &str {
        &self.messages[0].content
    }
}

/// A completed language-model reply with its token accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub prompt_cached_tokens: u64,
}

/// Voice-activity decision for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadDecision {
    pub is_speech: bool,
    /// Confidence in `[0, 1]`.
    pub probability: f32,
}

#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: &AudioFrame) -> Result<String, VoiceError>;
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, chat: &ChatContext) -> Result<Generation, VoiceError>;
}

#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<AudioFrame, VoiceError>;
}

/// Loaded once per worker process and reused by every session.
pub trait VoiceActivityDetector: Send + Sync {
    fn detect_activity(&self, frame: &AudioFrame) -> VadDecision;
}

pub trait TurnDetector: Send + Sync {
    /// Decides whether the user has finished speaking, given what they said
    /// and how long they have been silent since.
    fn detect_turn_end(&self, transcript: &str, trailing_silence: Duration) -> bool;
}

/// Conditions room input audio before it reaches the VAD.
pub trait NoiseSuppressor: Send + Sync {
    fn suppress(&self, frame: AudioFrame) -> AudioFrame;
}

/// Supplies configured stage instances to each new session.
///
/// The VAD is the exception: [`StageProvider::load_vad`] is called once per
/// process during prewarm, and sessions reuse that instance.
pub trait StageProvider: Send + Sync {
    fn stt(&self) -> Result<Arc<dyn SpeechToText>, VoiceError>;
    fn llm(&self) -> Result<Arc<dyn LanguageModel>, VoiceError>;
    fn tts(&self) -> Result<Arc<dyn TextToSpeech>, VoiceError>;
    fn turn_detector(&self) -> Result<Arc<dyn TurnDetector>, VoiceError>;
    /// Returns `None` when input conditioning is disabled.
    fn noise_suppressor(&self) -> Option<Arc<dyn NoiseSuppressor>>;
    fn load_vad(&self) -> Result<Arc<dyn VoiceActivityDetector>, VoiceError>;
    fn options(&self) -> crate::pipeline::PipelineOptions;
}
