//! # hias-config
//!
//! Configuration for the HIAS agent. Reads from `agent.toml`, then applies
//! environment variable overrides. The result is validated once at startup and
//! treated as read-only for the rest of the process.

pub mod schema;
pub mod loader;

pub use schema::HiasConfig;
pub use schema::{
    AgentConfig, ConfigWarning, LoggingConfig, ModelConfig, MqttConfig, ServerConfig,
    WarningSeverity, KNOWN_MODELS, SUPPORTED_MODES,
};
pub use loader::ConfigLoader;
