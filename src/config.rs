//! Service configuration
//!
//! Layered as built-in defaults, then an optional file, then
//! `INTERROGATOR__SECTION__KEY` environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::{MAX_INTERVIEW_MESSAGES, MIN_INTERVIEW_MESSAGES};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub simulation: SimulationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Allowed CORS origins; empty allows any
    #[serde(default)]
    pub cors_allow_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            cors_allow_origins: Vec::new(),
        }
    }
}

/// Chat-completions backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Base URL or full `/chat/completions` URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Falls back to `OPENAI_API_KEY` when unset
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: Option<f32>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            max_tokens: None,
        }
    }
}

impl GenerationConfig {
    /// Configured key, else the `OPENAI_API_KEY` environment variable
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// Run defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Ceiling used when a submission omits `max_interview_messages`
    #[serde(default = "default_max_interview_messages")]
    pub default_max_interview_messages: u32,

    /// JSON array of stakeholder profiles
    #[serde(default = "default_stakeholder_file")]
    pub stakeholder_file: PathBuf,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            default_max_interview_messages: default_max_interview_messages(),
            stakeholder_file: default_stakeholder_file(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_temperature() -> Option<f32> {
    Some(0.8)
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_interview_messages() -> u32 {
    8
}

fn default_stakeholder_file() -> PathBuf {
    PathBuf::from("data/stakeholders.json")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&AppConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("INTERROGATOR")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("server.cors_allow_origins")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let max = self.simulation.default_max_interview_messages;
        if !(MIN_INTERVIEW_MESSAGES..=MAX_INTERVIEW_MESSAGES).contains(&max) {
            return Err(config::ConfigError::Message(format!(
                "simulation.default_max_interview_messages must be between \
                 {MIN_INTERVIEW_MESSAGES} and {MAX_INTERVIEW_MESSAGES}, got {max}"
            )));
        }
        if self.generation.timeout_secs == 0 {
            return Err(config::ConfigError::Message(
                "generation.timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}
