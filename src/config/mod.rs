//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → loader.rs resolve_credentials (secrets from the environment)
//! ```
//!
//! Config is immutable once loaded. Secrets never appear in the file, only
//! the names of the environment variables holding them.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, resolve_credentials, ConfigError};
pub use schema::{
    AdminConfig, CredentialsConfig, DefaultsConfig, EventBusConfig, GatewayConfig, HealthCheckConfig,
    IntegrationConfig, ListenerConfig, LogFormat, ObservabilityConfig, WebhookConfig,
};
pub use validation::{validate_config, ValidationError};
