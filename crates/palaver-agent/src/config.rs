//! Worker configuration loading from file and environment variables.

use serde::Deserialize;
use thiserror::Error;

/// Top-level worker configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// LiveKit server settings.
    #[serde(default)]
    pub livekit: LiveKitSection,

    /// Agent identity and room settings.
    #[serde(default)]
    pub agent: AgentSection,

    /// Speech engine settings.
    #[serde(default)]
    pub engines: EnginesSection,

    /// Language model endpoint settings.
    #[serde(default)]
    pub llm: LlmSection,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSection,
}

/// LiveKit server connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LiveKitSection {
    /// Server URL.
    #[serde(default = "default_livekit_url")]
    pub url: String,

    /// API key for server-side room operations.
    #[serde(default)]
    pub api_key: String,

    /// API secret for token minting.
    #[serde(default)]
    pub api_secret: String,

    /// Join token TTL in seconds.
    #[serde(default = "default_token_ttl_seconds")]
    pub token_ttl_seconds: u64,
}

/// Agent identity and room settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    /// Room to create and join.
    #[serde(default = "default_room_name")]
    pub room_name: String,

    /// Participant identity the agent joins with.
    #[serde(default = "default_agent_identity")]
    pub identity: String,

    /// Display name of the agent.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Path to an external JSON profile document. Absent means the
    /// built-in voice table is used.
    #[serde(default)]
    pub config_doc_path: Option<String>,
}

/// Paths and tuning for the local speech engines.
#[derive(Debug, Clone, Deserialize)]
pub struct EnginesSection {
    /// Transcription binary (whisper.cpp style: `-m <model> -f -`).
    #[serde(default = "default_stt_binary")]
    pub stt_binary: String,

    /// Transcription model file.
    #[serde(default)]
    pub stt_model: String,

    /// Synthesis binary (piper style: `--model <path> --output_raw`).
    #[serde(default = "default_tts_binary")]
    pub tts_binary: String,

    /// Synthesis model file.
    #[serde(default)]
    pub tts_model: String,

    /// RMS amplitude above which a frame counts as speech.
    #[serde(default = "default_vad_threshold")]
    pub vad_rms_threshold: f64,

    /// Trailing silence, in milliseconds, that finalizes a turn.
    #[serde(default = "default_turn_silence_ms")]
    pub turn_silence_ms: u64,
}

/// OpenAI-compatible chat completion endpoint settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// Base URL of the endpoint (without `/chat/completions`).
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Bearer token; empty disables the Authorization header.
    #[serde(default)]
    pub api_key: String,

    /// Model identifier.
    #[serde(default = "default_llm_model")]
    pub model: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    /// Log level filter (e.g., "info", "debug", "palaver_agent=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_livekit_url() -> String {
    "http://localhost:7880".to_string()
}

fn default_token_ttl_seconds() -> u64 {
    3600
}

fn default_room_name() -> String {
    "palaver".to_string()
}

fn default_agent_identity() -> String {
    "palaver-agent".to_string()
}

fn default_agent_name() -> String {
    "Palaver".to_string()
}

fn default_stt_binary() -> String {
    "whisper".to_string()
}

fn default_tts_binary() -> String {
    "piper".to_string()
}

fn default_vad_threshold() -> f64 {
    500.0
}

fn default_turn_silence_ms() -> u64 {
    800
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LiveKitSection {
    fn default() -> Self {
        Self {
            url: default_livekit_url(),
            api_key: String::new(),
            api_secret: String::new(),
            token_ttl_seconds: default_token_ttl_seconds(),
        }
    }
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            room_name: default_room_name(),
            identity: default_agent_identity(),
            name: default_agent_name(),
            config_doc_path: None,
        }
    }
}

impl Default for EnginesSection {
    fn default() -> Self {
        Self {
            stt_binary: default_stt_binary(),
            stt_model: String::new(),
            tts_binary: default_tts_binary(),
            tts_model: String::new(),
            vad_rms_threshold: default_vad_threshold(),
            turn_silence_ms: default_turn_silence_ms(),
        }
    }
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: String::new(),
            model: default_llm_model(),
        }
    }
}

impl Default for LoggingSection {
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

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `LIVEKIT_URL` overrides `livekit.url`
/// - `LIVEKIT_API_KEY` overrides `livekit.api_key`
/// - `LIVEKIT_API_SECRET` overrides `livekit.api_secret`
/// - `PALAVER_ROOM` overrides `agent.room_name`
/// - `PALAVER_AGENT_CONFIG` overrides `agent.config_doc_path`
/// - `PALAVER_LLM_API_KEY` overrides `llm.api_key`
/// - `PALAVER_LLM_MODEL` overrides `llm.model`
/// - `PALAVER_LOG_LEVEL` overrides `logging.level`
/// - `PALAVER_LOG_JSON` overrides `logging.json` (set to "true" to enable)
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

    // Environment variable overrides
    if let Ok(url) = std::env::var("LIVEKIT_URL") {
        config.livekit.url = url;
    }
    if let Ok(key) = std::env::var("LIVEKIT_API_KEY") {
        config.livekit.api_key = key;
    }
    if let Ok(secret) = std::env::var("LIVEKIT_API_SECRET") {
        config.livekit.api_secret = secret;
    }
    if let Ok(room) = std::env::var("PALAVER_ROOM") {
        config.agent.room_name = room;
    }
    if let Ok(doc) = std::env::var("PALAVER_AGENT_CONFIG") {
        if !doc.trim().is_empty() {
            config.agent.config_doc_path = Some(doc);
        }
    }
    if let Ok(key) = std::env::var("PALAVER_LLM_API_KEY") {
        config.llm.api_key = key;
    }
    if let Ok(model) = std::env::var("PALAVER_LLM_MODEL") {
        config.llm.model = model;
    }
    if let Ok(level) = std::env::var("PALAVER_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("PALAVER_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    Ok(config)
}
