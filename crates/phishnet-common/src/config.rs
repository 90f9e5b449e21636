//! Configuration for PhishNet

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Outbound SMTP configuration
    #[serde(default)]
    pub smtp: SmtpConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Lure template provider configuration
    #[serde(default)]
    pub template: TemplateConfig,

    /// IP geolocation configuration
    #[serde(default)]
    pub geo: GeoConfig,

    /// Tracking URL configuration
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Dispatch pass configuration
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Hostname
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            bind_address: default_bind_address(),
        }
    }
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (PostgreSQL)
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

/// Outbound SMTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Relay host
    #[serde(default = "default_smtp_host")]
    pub host: String,

    /// Relay port
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Relay username
    pub username: Option<String>,

    /// Relay password
    pub password: Option<String>,

    /// Use implicit TLS
    #[serde(default)]
    pub use_tls: bool,

    /// Use STARTTLS
    #[serde(default = "default_use_starttls")]
    pub use_starttls: bool,

    /// From address on outbound lures
    #[serde(default = "default_from_address")]
    pub from_address: String,

    /// Optional display name for the from address
    pub from_name: Option<String>,

    /// Per-send timeout in seconds
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: None,
            password: None,
            use_tls: false,
            use_starttls: default_use_starttls(),
            from_address: default_from_address(),
            from_name: None,
            send_timeout_secs: default_send_timeout(),
        }
    }
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_use_starttls() -> bool {
    true
}

fn default_from_address() -> String {
    "it-security@localhost".to_string()
}

fn default_send_timeout() -> u64 {
    30
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API port
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_api_port() -> u16 {
    8080
}

/// Lure template provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Chat-completions endpoint of the drafting service
    #[serde(default = "default_template_endpoint")]
    pub endpoint: String,

    /// API key for the drafting service
    pub api_key: Option<String>,

    /// Model identifier
    #[serde(default = "default_template_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_template_timeout")]
    pub timeout_secs: u64,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            endpoint: default_template_endpoint(),
            api_key: None,
            model: default_template_model(),
            timeout_secs: default_template_timeout(),
        }
    }
}

fn default_template_endpoint() -> String {
    "https://api.groq.com/openai/v1/chat/completions".to_string()
}

fn default_template_model() -> String {
    "llama-3.1-8b-instant".to_string()
}

fn default_template_timeout() -> u64 {
    20
}

/// IP geolocation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConfig {
    /// Enable the external resolver (disabled returns Unknown everywhere)
    #[serde(default)]
    pub enabled: bool,

    /// Lookup endpoint
    #[serde(default = "default_geo_endpoint")]
    pub endpoint: String,

    /// Bearer token for the lookup service
    pub token: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_geo_timeout")]
    pub timeout_secs: u64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_geo_endpoint(),
            token: None,
            timeout_secs: default_geo_timeout(),
        }
    }
}

fn default_geo_endpoint() -> String {
    "https://ipinfo.io".to_string()
}

fn default_geo_timeout() -> u64 {
    5
}

/// Tracking URL configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Public base URL embedded in outbound links and pixels
    #[serde(default = "default_tracking_base_url")]
    pub base_url: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            base_url: default_tracking_base_url(),
        }
    }
}

fn default_tracking_base_url() -> String {
    "http://localhost:8080".to_string()
}

/// Dispatch pass configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum concurrent per-target sends within one pass
    #[serde(default = "default_dispatch_concurrency")]
    pub concurrency: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_dispatch_concurrency(),
        }
    }
}

fn default_dispatch_concurrency() -> usize {
    10
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from the default locations
    pub fn load() -> crate::Result<Self> {
        let paths = [
            std::path::PathBuf::from("./config.toml"),
            std::path::PathBuf::from("/etc/phishnet/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let smtp = SmtpConfig::default();
        assert_eq!(smtp.port, 587);
        assert!(smtp.use_starttls);
        assert_eq!(smtp.send_timeout_secs, 30);

        let dispatch = DispatchConfig::default();
        assert_eq!(dispatch.concurrency, 10);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[server]
hostname = "awareness.example.com"

[database]
url = "postgres://localhost/phishnet"

[smtp]
host = "smtp.example.com"
port = 465
use_tls = true
from_address = "it-security@example.com"

[tracking]
base_url = "https://awareness.example.com"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.hostname, "awareness.example.com");
        assert_eq!(config.database.url, "postgres://localhost/phishnet");
        assert_eq!(config.smtp.port, 465);
        assert!(config.smtp.use_tls);
        assert_eq!(config.tracking.base_url, "https://awareness.example.com");
        // untouched sections fall back to defaults
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.dispatch.concurrency, 10);
    }
}
