//! Voice pipeline infrastructure for the Talkypie assistant.
//!
//! Defines the capability traits for each pipeline stage (speech-to-text,
//! language model, text-to-speech, voice activity detection, turn
//! detection, noise suppression), the room abstraction a session runs in,
//! and the conversation loop that drives turns once connected. Stage
//! metrics flow through a per-session channel into a usage accumulator.
//!
//! Concrete stages are selected through a [`StageProvider`];
//! [`DefaultStageProvider`] wires local whisper.cpp and piper binaries with
//! an OpenAI-compatible chat endpoint. LiveKit server API access (room
//! creation, join tokens) lives in [`VoiceService`].

pub mod audio;
pub mod capability;
pub mod config;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod noise;
pub mod pipeline;
pub mod providers;
pub mod room;
pub mod service;
pub mod stt;
pub mod tts;
pub mod turn;
pub mod vad;

pub use audio::{AudioFrame, INPUT_SAMPLE_RATE};
pub use capability::{
    ChatContext, ChatMessage, ChatRole, Generation, LanguageModel, NoiseSuppressor, SpeechToText,
    StageProvider, TextToSpeech, TurnDetector, VadDecision, VoiceActivityDetector,
};
pub use config::{LiveKitConfig, PipelineSettings};
pub use error::VoiceError;
pub use metrics::{
    drain_metrics, log_metrics, Metrics, MetricsCollected, MetricsSink, UsageCollector,
    UsageSummary,
};
pub use pipeline::{PipelineOptions, PipelineStages, VoicePipeline};
pub use providers::DefaultStageProvider;
pub use room::{LiveKitRoom, LocalRoom, LocalRoomHandle, Room, RoomIo};
pub use service::VoiceService;
