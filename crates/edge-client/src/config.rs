//! Client configuration with YAML support

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default batched-command endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api-de.devicewise.com/api";

/// Edge client configuration
///
/// Can be loaded from YAML or JSON, or constructed programmatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Connection settings
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Retry policy for transient network failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Paginated query policy
    #[serde(default)]
    pub iteration: IterationConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    /// Session settings
    #[serde(default)]
    pub session: SessionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::builder(DEFAULT_ENDPOINT).build()
    }
}

/// Connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// URL of the batched-command endpoint
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint_url: default_endpoint_url(),
        }
    }
}

fn default_endpoint_url() -> String {
    DEFAULT_ENDPOINT.to_string()
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per request, including the first (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts in milliseconds (default: 5s)
    #[serde(default = "default_retry_delay")]
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_retry_delay(),
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    5_000 // 5 seconds
}

/// Iterated query configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationConfig {
    /// Maximum number of pages fetched by one query (default: 100)
    #[serde(default = "default_iteration_limit")]
    pub limit: u32,

    /// Records requested per page (default: 2000)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Pause between pages in milliseconds (default: 500ms)
    #[serde(default = "default_page_delay")]
    pub delay_ms: u64,
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self {
            limit: default_iteration_limit(),
            page_size: default_page_size(),
            delay_ms: default_page_delay(),
        }
    }
}

impl IterationConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

fn default_iteration_limit() -> u32 {
    100
}

fn default_page_size() -> u32 {
    2_000
}

fn default_page_delay() -> u64 {
    500 // 500ms
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Request timeout in milliseconds (default: 30s)
    #[serde(default = "default_request_timeout")]
    pub request_ms: u64,

    /// Connect timeout in milliseconds (default: 10s)
    #[serde(default = "default_connect_timeout")]
    pub connect_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            request_ms: default_request_timeout(),
            connect_ms: default_connect_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30_000 // 30 seconds
}

fn default_connect_timeout() -> u64 {
    10_000 // 10 seconds
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Lifetime of a session token in seconds (default: 8 hours)
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl(),
        }
    }
}

fn default_session_ttl() -> i64 {
    crate::session::DEFAULT_SESSION_TTL_SECS
}

impl SessionConfig {
    /// Token lifetime as a duration
    ///
    /// Rejects non-positive lifetimes and lifetimes whose expiry cannot be
    /// represented as a timestamp.
    pub fn ttl(&self) -> Result<chrono::Duration, ConfigError> {
        if self.ttl_secs <= 0 {
            return Err(ConfigError::InvalidValue(format!(
                "session.ttl_secs must be positive, got {}",
                self.ttl_secs
            )));
        }
        chrono::Duration::try_seconds(self.ttl_secs)
            .filter(|ttl| chrono::Utc::now().checked_add_signed(*ttl).is_some())
            .ok_or_else(|| {
                ConfigError::InvalidValue(format!(
                    "session.ttl_secs is out of range: {}",
                    self.ttl_secs
                ))
            })
    }
}

impl ClientConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot constrain
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.session.ttl()?;
        Ok(())
    }

    /// Serialize configuration to YAML
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Create a builder for programmatic configuration
    pub fn builder(endpoint_url: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder::new(endpoint_url)
    }
}

/// Builder for ClientConfig
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Create a new builder with the given endpoint URL
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            config: ClientConfig {
                connection: ConnectionConfig {
                    endpoint_url: endpoint_url.into(),
                },
                retry: RetryConfig::default(),
                iteration: IterationConfig::default(),
                timeouts: TimeoutsConfig::default(),
                session: SessionConfig::default(),
            },
        }
    }

    /// Set the total number of attempts per request
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.retry.max_attempts = attempts.max(1);
        self
    }

    /// Set the delay between attempts in milliseconds
    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.delay_ms = ms;
        self
    }

    /// Set the maximum number of pages per iterated query
    pub fn iteration_limit(mut self, limit: u32) -> Self {
        self.config.iteration.limit = limit;
        self
    }

    /// Set the page size for iterated queries
    pub fn page_size(mut self, size: u32) -> Self {
        self.config.iteration.page_size = size;
        self
    }

    /// Set the pause between pages in milliseconds
    pub fn page_delay_ms(mut self, ms: u64) -> Self {
        self.config.iteration.delay_ms = ms;
        self
    }

    /// Set request timeout in milliseconds
    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeouts.request_ms = ms;
        self
    }

    /// Set connect timeout in milliseconds
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeouts.connect_ms = ms;
        self
    }

    /// Set the session token lifetime in seconds
    pub fn session_ttl_secs(mut self, secs: i64) -> Self {
        self.config.session.ttl_secs = secs;
        self
    }

    /// Zero every intentional delay (tests)
    pub fn no_delays(self) -> Self {
        self.retry_delay_ms(0).page_delay_ms(0)
    }

    /// Build the configuration
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
