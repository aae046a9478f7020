//! Server configuration loading from file and environment variables.

use poros_ranking::RankWeights;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Orchestration pipeline settings.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Session store settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Hybrid-ranking component weights.
    #[serde(default)]
    pub ranking: RankWeights,

    /// Per-IP request limits.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Busy timeout applied to every connection, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "poros_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Orchestration pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Isolated timeout for each dispatched agent call, in seconds. Verb
    /// relays use the same timeout.
    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,

    /// Selection size when a request does not carry `maxAgents`.
    #[serde(default = "default_max_agents")]
    pub default_max_agents: usize,

    /// Upper bound on the selection size.
    #[serde(default = "default_max_agents_cap")]
    pub max_agents_cap: usize,

    /// Decay of the rolling metric EMAs, in (0,1).
    #[serde(default = "default_ema_decay")]
    pub ema_decay: f64,
}

/// Session store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Idle lifetime of a session entry, in seconds.
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,

    /// Hard cap on concurrently tracked sessions.
    #[serde(default = "default_session_max_entries")]
    pub max_entries: usize,

    /// Interval of the background expiry sweeper, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// Per-IP fixed-window rate limits (requests per minute).
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Limit for reads and everything not listed below.
    #[serde(default = "default_rate_limit")]
    pub default_limit: u32,

    /// Limit for orchestration and verb-relay requests.
    #[serde(default = "default_orchestrate_limit")]
    pub orchestrate_limit: u32,

    /// Limit for agent registration.
    #[serde(default = "default_register_limit")]
    pub register_limit: u32,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8000
}

fn default_db_path() -> String {
    "poros.db".to_string()
}

fn default_busy_timeout_ms() -> u32 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_dispatch_timeout_secs() -> u64 {
    30
}

fn default_max_agents() -> usize {
    3
}

fn default_max_agents_cap() -> usize {
    10
}

fn default_ema_decay() -> f64 {
    0.9
}

fn default_session_ttl_secs() -> u64 {
    1_800
}

fn default_session_max_entries() -> usize {
    10_000
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_rate_limit() -> u32 {
    60
}

fn default_orchestrate_limit() -> u32 {
    20
}

fn default_register_limit() -> u32 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
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

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout_secs: default_dispatch_timeout_secs(),
            default_max_agents: default_max_agents(),
            max_agents_cap: default_max_agents_cap(),
            ema_decay: default_ema_decay(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl_secs(),
            max_entries: default_session_max_entries(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_limit: default_rate_limit(),
            orchestrate_limit: default_orchestrate_limit(),
            register_limit: default_register_limit(),
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
/// - `POROS_HOST` overrides `server.host`
/// - `POROS_PORT` overrides `server.port`
/// - `POROS_DB_PATH` overrides `database.path`
/// - `POROS_LOG_LEVEL` overrides `logging.level`
/// - `POROS_LOG_JSON` overrides `logging.json` (set to "true" to enable)
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
    if let Ok(host) = std::env::var("POROS_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("POROS_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(db_path) = std::env::var("POROS_DB_PATH") {
        config.database.path = db_path;
    }
    if let Ok(level) = std::env::var("POROS_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("POROS_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_section() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.database.path, "poros.db");
        assert_eq!(config.database.pool_max_size, 8);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert_eq!(config.orchestrator.dispatch_timeout_secs, 30);
        assert_eq!(config.orchestrator.default_max_agents, 3);
        assert_eq!(config.orchestrator.max_agents_cap, 10);
        assert_eq!(config.session.ttl_secs, 1_800);
        assert_eq!(config.rate_limit.default_limit, 60);
        assert_eq!(config.rate_limit.register_limit, 10);
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9005

            [orchestrator]
            default_max_agents = 5

            [ranking]
            performance = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9005);
        assert_eq!(
            config.server.host,
            IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
        );
        assert_eq!(config.orchestrator.default_max_agents, 5);
        assert_eq!(config.orchestrator.max_agents_cap, 10);
        assert!((config.ranking.performance - 0.5).abs() < 1e-9);
        assert!((config.ranking.skill_match - 0.40).abs() < 1e-9);
        assert_eq!(config.rate_limit.orchestrate_limit, 20);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config(Some("/nonexistent/poros-config.toml")).unwrap();
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "server = \"not a table\"").unwrap();

        let err = load_config(path.to_str()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
