use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Without a database the service keeps learners in memory.
    pub database_url: Option<String>,
    pub gemini_api_key: String,
    pub groq_api_key: String,
    /// Enables pronunciation practice through Whisper transcription.
    pub openai_api_key: Option<String>,
    pub conversation_model: String,
    pub feature_model: String,
    pub transcription_model: String,
    pub log_level: Level,
    pub audio_temp_dir: PathBuf,
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url = optional("DATABASE_URL");
        let gemini_api_key = required("GEMINI_API_KEY")?;
        let groq_api_key = required("GROQ_API_KEY")?;
        let openai_api_key = optional("OPENAI_API_KEY");

        let conversation_model =
            optional("CONVERSATION_MODEL").unwrap_or_else(|| "gemini-1.5-flash".to_string());
        let feature_model =
            optional("FEATURE_MODEL").unwrap_or_else(|| "llama-3.3-70b-versatile".to_string());
        let transcription_model =
            optional("TRANSCRIPTION_MODEL").unwrap_or_else(|| "whisper-1".to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let audio_temp_dir = optional("AUDIO_TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("verba"));

        Ok(Self {
            bind_address,
            database_url,
            gemini_api_key,
            groq_api_key,
            openai_api_key,
            conversation_model,
            feature_model,
            transcription_model,
            log_level,
            audio_temp_dir,
        })
    }
}
