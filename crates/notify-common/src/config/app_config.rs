//! Application configuration structs
//!
//! Loads configuration from environment variables (and an optional `.env` file).

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app: AppSettings,
    pub gateway: ServerConfig,
    pub jwt: JwtConfig,
    pub transport: TransportConfig,
    pub delivery: DeliveryConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

/// Server bind configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Token verification configuration
#[derive(Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    #[serde(default)]
    pub leeway_secs: u64,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

/// Transport kinds a client can connect over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Full-duplex WebSocket
    #[serde(rename = "websocket")]
    WebSocket,
    /// Half-duplex HTTP long-polling fallback
    Polling,
}

impl TransportKind {
    /// All transport kinds
    pub const ALL: [Self; 2] = [Self::WebSocket, Self::Polling];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WebSocket => "websocket",
            Self::Polling => "polling",
        }
    }

    /// Whether the transport can push frames without a pending client request
    #[must_use]
    pub const fn is_full_duplex(self) -> bool {
        matches!(self, Self::WebSocket)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "websocket" | "ws" => Ok(Self::WebSocket),
            "polling" | "long-polling" => Ok(Self::Polling),
            other => Err(ConfigError::InvalidValue(
                "TRANSPORT_ENABLED",
                format!("unknown transport '{other}'"),
            )),
        }
    }
}

/// Transport server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Maximum number of concurrent connections (checked before authentication)
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Permitted `Origin` header values; empty allows any origin
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    /// Deadline for the identify frame when no credential came with the upgrade
    #[serde(default = "default_auth_timeout_ms")]
    pub auth_timeout_ms: u64,
    #[serde(default = "default_enabled_transports")]
    pub enabled: Vec<TransportKind>,
    /// Per-connection outbound queue capacity
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// How long a long-poll request is held open waiting for events
    #[serde(default = "default_poll_wait_ms")]
    pub poll_wait_ms: u64,
}

impl TransportConfig {
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    #[must_use]
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }

    #[must_use]
    pub fn poll_wait(&self) -> Duration {
        Duration::from_millis(self.poll_wait_ms)
    }

    #[must_use]
    pub fn is_enabled(&self, kind: TransportKind) -> bool {
        self.enabled.contains(&kind)
    }

    /// Check an `Origin` header value against the allow-list
    #[must_use]
    pub fn is_origin_allowed(&self, origin: Option<&str>) -> bool {
        if self.allowed_origins.is_empty() {
            return true;
        }
        origin.is_some_and(|o| {
            let origin = o.trim_end_matches('/');
            self.allowed_origins
                .iter()
                .any(|allowed| allowed == "*" || allowed.eq_ignore_ascii_case(origin))
        })
    }

    /// Validate cross-field constraints
    ///
    /// # Errors
    /// Returns an error if a value is out of range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue(
                "TRANSPORT_MAX_CONNECTIONS",
                "must be greater than zero".to_string(),
            ));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "TRANSPORT_HEARTBEAT_INTERVAL_MS",
                "must be greater than zero".to_string(),
            ));
        }
        if self.heartbeat_timeout_ms <= self.heartbeat_interval_ms {
            return Err(ConfigError::InvalidValue(
                "TRANSPORT_HEARTBEAT_TIMEOUT_MS",
                "must exceed the heartbeat interval".to_string(),
            ));
        }
        if self.poll_wait_ms >= self.heartbeat_timeout_ms {
            return Err(ConfigError::InvalidValue(
                "TRANSPORT_POLL_WAIT_MS",
                "must be below the heartbeat timeout".to_string(),
            ));
        }
        if self.enabled.is_empty() {
            return Err(ConfigError::InvalidValue(
                "TRANSPORT_ENABLED",
                "at least one transport must be enabled".to_string(),
            ));
        }
        if self.outbound_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "TRANSPORT_OUTBOUND_BUFFER",
                "must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            allowed_origins: Vec::new(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            auth_timeout_ms: default_auth_timeout_ms(),
            enabled: default_enabled_transports(),
            outbound_buffer: default_outbound_buffer(),
            poll_wait_ms: default_poll_wait_ms(),
        }
    }
}

/// Delivery event queue configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

// Default value functions
fn default_app_name() -> String {
    "notify".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_max_connections() -> usize {
    10_000
}

fn default_heartbeat_interval_ms() -> u64 {
    25_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    60_000
}

fn default_auth_timeout_ms() -> u64 {
    10_000
}

fn default_enabled_transports() -> Vec<TransportKind> {
    TransportKind::ALL.to_vec()
}

fn default_outbound_buffer() -> usize {
    256
}

fn default_poll_wait_ms() -> u64 {
    25_000
}

fn default_queue_capacity() -> usize {
    1024
}

/// Parse an optional environment variable, falling back to a default when unset
fn parse_var<T: FromStr>(
    name: &'static str,
    default: impl FnOnce() -> T,
) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name, raw)),
        _ => Ok(default()),
    }
}

/// Parse a required value; absent or blank is missing, anything unparsable is invalid
fn parse_required<T: FromStr>(name: &'static str, raw: Option<String>) -> Result<T, ConfigError> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name, raw)),
        _ => Err(ConfigError::MissingVar(name)),
    }
}

/// Split a comma-separated variable into trimmed, non-empty items
fn list_var(name: &'static str) -> Option<Vec<String>> {
    env::var(name).ok().map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect()
    })
}

impl AppConfig {
    /// Defaults bound to an ephemeral loopback port, for embedding and tests
    #[must_use]
    pub fn local(jwt_secret: impl Into<String>) -> Self {
        Self {
            app: AppSettings {
                name: default_app_name(),
                env: Environment::Development,
            },
            gateway: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            jwt: JwtConfig {
                secret: jwt_secret.into(),
                leeway_secs: 0,
            },
            transport: TransportConfig::default(),
            delivery: DeliveryConfig::default(),
        }
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing or invalid
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let enabled = match list_var("TRANSPORT_ENABLED") {
            Some(items) if !items.is_empty() => items
                .iter()
                .map(|s| s.parse())
                .collect::<Result<Vec<TransportKind>, _>>()?,
            _ => default_enabled_transports(),
        };

        let config = Self {
            app: AppSettings {
                name: env::var("APP_NAME").unwrap_or_else(|_| default_app_name()),
                env: env::var("APP_ENV")
                    .ok()
                    .and_then(|s| match s.to_lowercase().as_str() {
                        "production" => Some(Environment::Production),
                        "staging" => Some(Environment::Staging),
                        "development" => Some(Environment::Development),
                        _ => None,
                    })
                    .unwrap_or_default(),
            },
            gateway: ServerConfig {
                host: env::var("GATEWAY_HOST").unwrap_or_else(|_| default_host()),
                port: parse_required("GATEWAY_PORT", env::var("GATEWAY_PORT").ok())?,
            },
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET")
                    .ok()
                    .filter(|s| !s.is_empty())
                    .ok_or(ConfigError::MissingVar("JWT_SECRET"))?,
                leeway_secs: parse_var("JWT_LEEWAY_SECS", || 0)?,
            },
            transport: TransportConfig {
                max_connections: parse_var("TRANSPORT_MAX_CONNECTIONS", default_max_connections)?,
                allowed_origins: list_var("TRANSPORT_ALLOWED_ORIGINS").unwrap_or_default(),
                heartbeat_interval_ms: parse_var(
                    "TRANSPORT_HEARTBEAT_INTERVAL_MS",
                    default_heartbeat_interval_ms,
                )?,
                heartbeat_timeout_ms: parse_var(
                    "TRANSPORT_HEARTBEAT_TIMEOUT_MS",
                    default_heartbeat_timeout_ms,
                )?,
                auth_timeout_ms: parse_var("TRANSPORT_AUTH_TIMEOUT_MS", default_auth_timeout_ms)?,
                enabled,
                outbound_buffer: parse_var("TRANSPORT_OUTBOUND_BUFFER", default_outbound_buffer)?,
                poll_wait_ms: parse_var("TRANSPORT_POLL_WAIT_MS", default_poll_wait_ms)?,
            },
            delivery: DeliveryConfig {
                queue_capacity: parse_var("DELIVERY_QUEUE_CAPACITY", default_queue_capacity)?,
            },
        };

        config.transport.validate()?;
        if config.delivery.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "DELIVERY_QUEUE_CAPACITY",
                "must be greater than zero".to_string(),
            ));
        }

        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
