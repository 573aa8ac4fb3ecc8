//! # notify-common
//!
//! Shared utilities including configuration, error handling, token verification, and telemetry.

pub mod auth;
pub mod config;
pub mod error;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use auth::{strip_bearer, Claims, TokenVerifier};
pub use config::{
    AppConfig, AppSettings, ConfigError, DeliveryConfig, Environment, JwtConfig, ServerConfig,
    TransportConfig, TransportKind,
};
pub use error::{AppError, AppResult};
pub use telemetry::{try_init_tracing, try_init_tracing_with_config, TracingConfig, TracingError};
