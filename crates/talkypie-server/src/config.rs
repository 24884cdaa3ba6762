//! Process configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use talkypie_store::DEFAULT_PROFILE_FILE;
use talkypie_voice::{LiveKitConfig, PipelineSettings};
use thiserror::Error;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Profile Service network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Where the profile document lives.
    #[serde(default)]
    pub profile: ProfileConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// LiveKit server API credentials.
    #[serde(default)]
    pub livekit: LiveKitConfig,

    /// Settings shared by every session's pipeline stages.
    #[serde(default)]
    pub pipeline: PipelineSettings,

    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Network configuration for the Profile Service.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    /// Path to the profile document, relative to the working directory
    /// unless absolute.
    #[serde(default = "default_profile_path")]
    pub path: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "talkypie_agent=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Rooms the worker joins at startup, one job each.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub rooms: Vec<String>,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

fn default_profile_path() -> String {
    DEFAULT_PROFILE_FILE.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            path: default_profile_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults, then
/// applies environment overrides with [`apply_env_overrides`].
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Overrides config values from the environment.
///
/// - `TALKYPIE_HOST` overrides `server.host`
/// - `PORT`, then `TALKYPIE_PORT`, override `server.port`
/// - `TALKYPIE_PROFILE_PATH` overrides `profile.path`
/// - `TALKYPIE_LOG_LEVEL` / `TALKYPIE_LOG_JSON` override `logging`
/// - `LIVEKIT_URL`, `LIVEKIT_API_KEY`, `LIVEKIT_API_SECRET` override `livekit`
/// - `OPENAI_API_KEY`, `TALKYPIE_LLM_MODEL`, `TALKYPIE_LLM_BASE_URL`,
///   `TALKYPIE_TTS_VOICE`, `TALKYPIE_STT_LANGUAGE` override `pipeline`
/// - `TALKYPIE_ROOMS` (comma separated) overrides `worker.rooms`
///
/// Unparseable host or port values are ignored.
pub fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = var("TALKYPIE_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    for key in ["PORT", "TALKYPIE_PORT"] {
        if let Some(parsed) = var(key).and_then(|port| port.parse().ok()) {
            config.server.port = parsed;
        }
    }
    if let Some(path) = var("TALKYPIE_PROFILE_PATH") {
        config.profile.path = path;
    }
    if let Some(level) = var("TALKYPIE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("TALKYPIE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    if let Some(url) = var("LIVEKIT_URL") {
        config.livekit.url = url;
    }
    if let Some(key) = var("LIVEKIT_API_KEY") {
        config.livekit.api_key = key;
    }
    if let Some(secret) = var("LIVEKIT_API_SECRET") {
        config.livekit.api_secret = secret;
    }

    if let Some(key) = var("OPENAI_API_KEY") {
        config.pipeline.llm_api_key = key;
    }
    if let Some(model) = var("TALKYPIE_LLM_MODEL") {
        config.pipeline.llm_model = model;
    }
    if let Some(url) = var("TALKYPIE_LLM_BASE_URL") {
        config.pipeline.llm_base_url = url;
    }
    if let Some(voice) = var("TALKYPIE_TTS_VOICE") {
        config.pipeline.tts_voice = voice;
    }
    if let Some(language) = var("TALKYPIE_STT_LANGUAGE") {
        config.pipeline.stt_language = language;
    }

    if let Some(rooms) = var("TALKYPIE_ROOMS") {
        config.worker.rooms = rooms
            .split(',')
            .map(str::trim)
            .filter(|room| !room.is_empty())
            .map(str::to_string)
            .collect();
    }
}
