use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

fn default_token_ttl_seconds() -> u64 {
    3600
}

fn default_agent_identity() -> String {
    "talkypie-agent".to_string()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LiveKitConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing)]
    pub api_secret: String,
    /// JWT token TTL in seconds for LiveKit join tokens. Default: 3600 (1 hour).
    #[serde(default = "default_token_ttl_seconds")]
    pub token_ttl_seconds: u64,
    /// Participant identity the agent joins rooms with.
    #[serde(default = "default_agent_identity")]
    pub agent_identity: String,
}

impl Default for LiveKitConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            token_ttl_seconds: default_token_ttl_seconds(),
            agent_identity: default_agent_identity(),
        }
    }
}

impl fmt::Debug for LiveKitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveKitConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("token_ttl_seconds", &self.token_ttl_seconds)
            .field("agent_identity", &self.agent_identity)
            .finish()
    }
}

impl LiveKitConfig {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            ..Self::default()
        }
    }
}

/// Process-wide settings for the pipeline stages.
///
/// Every session in the process is assembled from the same settings; only
/// the instructions differ per session.
#[derive(Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// BCP-47 language the STT stage listens for (e.g. `hi-IN`).
    #[serde(default = "default_language")]
    pub stt_language: String,
    /// Path to the whisper.cpp binary.
    #[serde(default = "default_whisper_binary")]
    pub whisper_binary: PathBuf,
    /// Path to the whisper GGML model.
    #[serde(default = "default_whisper_model")]
    pub whisper_model: PathBuf,

    /// Model identifier sent to the chat completions endpoint.
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,
    #[serde(default, skip_serializing)]
    pub llm_api_key: String,

    /// Path to the piper binary.
    #[serde(default = "default_piper_binary")]
    pub piper_binary: PathBuf,
    /// Directory holding piper voice models.
    #[serde(default = "default_voices_dir")]
    pub voices_dir: PathBuf,
    /// Piper voice name; resolved to `<voices_dir>/<tts_voice>.onnx`.
    #[serde(default = "default_tts_voice")]
    pub tts_voice: String,

    /// RMS level above which a frame counts as speech.
    #[serde(default = "default_vad_threshold")]
    pub vad_threshold: f32,
    /// Silence after speech before the turn detector is consulted.
    #[serde(default = "default_min_endpointing_delay_ms")]
    pub min_endpointing_delay_ms: u64,
    /// Silence after which a turn ends regardless of the transcript.
    #[serde(default = "default_max_endpointing_delay_ms")]
    pub max_endpointing_delay_ms: u64,

    /// Start generating a reply as soon as a transcript is available.
    #[serde(default = "default_true")]
    pub preemptive_generation: bool,
    /// Apply noise suppression to room input audio.
    #[serde(default = "default_true")]
    pub noise_cancellation: bool,
}

fn default_language() -> String {
    "hi-IN".to_string()
}

fn default_whisper_binary() -> PathBuf {
    PathBuf::from("whisper-cli")
}

fn default_whisper_model() -> PathBuf {
    PathBuf::from("models/ggml-small.bin")
}

fn default_llm_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_piper_binary() -> PathBuf {
    PathBuf::from("piper")
}

fn default_voices_dir() -> PathBuf {
    PathBuf::from("voices")
}

fn default_tts_voice() -> String {
    "hi_IN-priyamvada-medium".to_string()
}

fn default_vad_threshold() -> f32 {
    500.0
}

fn default_min_endpointing_delay_ms() -> u64 {
    500
}

fn default_max_endpointing_delay_ms() -> u64 {
    3000
}

fn default_true() -> bool {
    true
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            stt_language: default_language(),
            whisper_binary: default_whisper_binary(),
            whisper_model: default_whisper_model(),
            llm_model: default_llm_model(),
            llm_base_url: default_llm_base_url(),
            llm_api_key: String::new(),
            piper_binary: default_piper_binary(),
            voices_dir: default_voices_dir(),
            tts_voice: default_tts_voice(),
            vad_threshold: default_vad_threshold(),
            min_endpointing_delay_ms: default_min_endpointing_delay_ms(),
            max_endpointing_delay_ms: default_max_endpointing_delay_ms(),
            preemptive_generation: true,
            noise_cancellation: true,
        }
    }
}

impl PipelineSettings {
    pub fn min_endpointing_delay(&self) -> Duration {
        Duration::from_millis(self.min_endpointing_delay_ms)
    }

    pub fn max_endpointing_delay(&self) -> Duration {
        Duration::from_millis(self.max_endpointing_delay_ms)
    }
}

impl fmt::Debug for PipelineSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineSettings")
            .field("stt_language", &self.stt_language)
            .field("whisper_binary", &self.whisper_binary)
            .field("whisper_model", &self.whisper_model)
            .field("llm_model", &self.llm_model)
            .field("llm_base_url", &self.llm_base_url)
            .field("llm_api_key", &"[REDACTED]")
            .field("piper_binary", &self.piper_binary)
            .field("voices_dir", &self.voices_dir)
            .field("tts_voice", &self.tts_voice)
            .field("vad_threshold", &self.vad_threshold)
            .field("min_endpointing_delay_ms", &self.min_endpointing_delay_ms)
            .field("max_endpointing_delay_ms", &self.max_endpointing_delay_ms)
            .field("preemptive_generation", &self.preemptive_generation)
            .field("noise_cancellation", &self.noise_cancellation)
            .finish()
    }
}
