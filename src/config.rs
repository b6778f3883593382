//! Configuration management for the gateway
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Main configuration structure for the gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream Spark model service settings
    #[serde(default)]
    pub spark: SparkConfig,
    /// Prompt and context assembly settings
    #[serde(default)]
    pub chat: ChatConfig,
    /// Storage collaborator settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address the HTTP server binds to
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Optional Prometheus exporter address (requires the `prometheus` feature)
    #[serde(default)]
    pub metrics_bind: Option<String>,
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_bind: None,
        }
    }
}

/// Spark model service configuration
///
/// Credentials default to empty. An empty credential is not a startup error:
/// chat endpoints degrade to a user-readable notice and the handshake endpoint
/// answers 500.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparkConfig {
    /// Application id sent in every outbound frame header
    #[serde(default)]
    pub app_id: String,

    /// API key named in the signed authorization header
    #[serde(default)]
    pub api_key: String,

    /// API secret used as the HMAC key
    #[serde(default)]
    pub api_secret: String,

    /// WebSocket endpoint of the model service
    #[serde(default = "default_spark_url")]
    pub url: String,

    /// Model domain id
    #[serde(default = "default_spark_domain")]
    pub domain: String,

    /// Generation parameters sent with every chat request
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Seconds to wait for the WebSocket handshake
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Seconds to wait between two inbound frames
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,

    /// Log every raw inbound frame at trace level
    #[serde(default)]
    pub debug_frames: bool,
}

fn default_spark_url() -> String {
    "wss://spark-api.xf-yun.com/v1/x1".to_string()
}

fn default_spark_domain() -> String {
    "spark-x".to_string()
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_idle_timeout() -> u64 {
    120
}

impl Default for SparkConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            url: default_spark_url(),
            domain: default_spark_domain(),
            generation: GenerationConfig::default(),
            connect_timeout_seconds: default_connect_timeout(),
            idle_timeout_seconds: default_idle_timeout(),
            debug_frames: false,
        }
    }
}

/// Generation parameters for the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Maximum tokens in one answer
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Presence penalty
    #[serde(default = "default_presence_penalty")]
    pub presence_penalty: f32,

    /// Frequency penalty
    #[serde(default = "default_frequency_penalty")]
    pub frequency_penalty: f32,

    /// Top-k sampling
    #[serde(default = "default_top_k")]
    pub top_k: u32,

    /// Let the model use its web search capability
    #[serde(default = "default_web_search")]
    pub web_search: bool,
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.5
}

fn default_presence_penalty() -> f32 {
    1.0
}

fn default_frequency_penalty() -> f32 {
    0.02
}

fn default_top_k() -> u32 {
    5
}

fn default_web_search() -> bool {
    true
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            presence_penalty: default_presence_penalty(),
            frequency_penalty: default_frequency_penalty(),
            top_k: default_top_k(),
            web_search: default_web_search(),
        }
    }
}

/// Prompt and context configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// System instruction template; `{time}` is replaced with the current time.
    /// An empty template disables the instruction block.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Prefix marking an assistant turn that recorded a failed request
    #[serde(default = "default_failure_marker")]
    pub failure_marker: String,

    /// Reply returned instead of an answer when credentials are missing
    #[serde(default = "default_unconfigured_notice")]
    pub unconfigured_notice: String,

    /// Title used when no title could be generated
    #[serde(default = "default_fallback_title")]
    pub fallback_title: String,
}

fn default_system_prompt() -> String {
    crate::prompts::DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_failure_marker() -> String {
    "请求失败：".to_string()
}

fn default_unconfigured_notice() -> String {
    "服务端未配置 Spark 凭证，请联系管理员。".to_string()
}

fn default_fallback_title() -> String {
    "新建聊天".to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            failure_marker: default_failure_marker(),
            unconfigured_notice: default_unconfigured_notice(),
            fallback_title: default_fallback_title(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file; defaults to the platform data directory
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of human-readable text
    #[serde(default)]
    pub json: bool,
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| GatewayError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| GatewayError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(app_id) = std::env::var("SPARK_APP_ID") {
            self.spark.app_id = app_id;
        }

        if let Ok(api_key) = std::env::var("SPARK_API_KEY") {
            self.spark.api_key = api_key;
        }

        if let Ok(api_secret) = std::env::var("SPARK_API_SECRET") {
            self.spark.api_secret = api_secret;
        }

        if let Ok(url) = std::env::var("SPARK_URL") {
            self.spark.url = url;
        }

        if let Ok(domain) = std::env::var("SPARK_DOMAIN") {
            self.spark.domain = domain;
        }

        if let Ok(prompt) = std::env::var("SPARK_SYSTEM_PROMPT") {
            self.chat.system_prompt = prompt;
        }

        if let Ok(debug) = std::env::var("SPARK_DEBUG_RESPONSE") {
            self.spark.debug_frames = debug == "1" || debug.eq_ignore_ascii_case("true");
            tracing::debug!(debug_frames = self.spark.debug_frames, "Env override: SPARK_DEBUG_RESPONSE");
        }

        if let Ok(bind) = std::env::var("FATE_GATEWAY_BIND") {
            self.server.bind = bind;
        }

        if let Ok(db_path) = std::env::var("FATE_GATEWAY_DB") {
            self.storage.db_path = Some(PathBuf::from(db_path));
        }

        if let Ok(json_logs) = std::env::var("FATE_GATEWAY_JSON_LOGS") {
            match json_logs.parse::<bool>() {
                Ok(v) => self.logging.json = v,
                Err(_) => {
                    tracing::warn!("Invalid value for FATE_GATEWAY_JSON_LOGS: {}", json_logs);
                }
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(db_path) = &cli.db_path {
            self.storage.db_path = Some(db_path.clone());
        }
        if cli.json_logs {
            self.logging.json = true;
        }
        if let crate::cli::Commands::Serve { bind: Some(bind) } = &cli.command {
            self.server.bind = bind.clone();
        }
    }

    /// Whether the upstream signer has everything it needs
    pub fn has_credentials(&self) -> bool {
        crate::signer::Signer::from_config(&self.spark).is_configured()
    }

    /// Validate the configuration
    ///
    /// Missing Spark credentials are deliberately not a validation failure.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        self.server.bind.parse::<SocketAddr>().map_err(|e| {
            GatewayError::Config(format!("Invalid server.bind '{}': {}", self.server.bind, e))
        })?;

        if let Some(metrics_bind) = &self.server.metrics_bind {
            metrics_bind.parse::<SocketAddr>().map_err(|e| {
                GatewayError::Config(format!("Invalid server.metrics_bind '{}': {}", metrics_bind, e))
            })?;
        }

        if self.spark.domain.trim().is_empty() {
            return Err(GatewayError::Config("spark.domain cannot be empty".to_string()).into());
        }

        let generation = &self.spark.generation;
        if generation.max_tokens == 0 || generation.max_tokens > 8192 {
            return Err(GatewayError::Config(
                "spark.generation.max_tokens must be between 1 and 8192".to_string(),
            )
            .into());
        }

        if generation.temperature <= 0.0 || generation.temperature > 1.0 {
            return Err(GatewayError::Config(
                "spark.generation.temperature must be between 0.0 and 1.0".to_string(),
            )
            .into());
        }

        if generation.top_k == 0 || generation.top_k > 6 {
            return Err(GatewayError::Config(
                "spark.generation.top_k must be between 1 and 6".to_string(),
            )
            .into());
        }

        if self.spark.connect_timeout_seconds == 0 || self.spark.idle_timeout_seconds == 0 {
            return Err(GatewayError::Config(
                "spark timeouts must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}
