use thiserror::Error;

/// Unified error type for the HIAS agent.
#[derive(Error, Debug)]
pub enum HiasError {
    // ── Agent errors ───────────────────────────────────────────
    #[error("agent error: {0}")]
    Agent(String),

    // ── Model errors ───────────────────────────────────────────
    #[error("model error: {0}")]
    Model(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("model not ready: {0}")]
    ModelNotReady(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    // ── Channel errors ─────────────────────────────────────────
    #[error("channel error: {channel}: {reason}")]
    Channel { channel: String, reason: String },

    #[error("channel not connected: {0}")]
    ChannelNotConnected(String),

    // ── Server errors ──────────────────────────────────────────
    #[error("server error: {0}")]
    Server(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl HiasError {
    /// Shorthand for a channel error tagged with the channel name.
    pub fn channel(channel: impl Into<String>, reason: impl ToString) -> Self {
        Self::Channel {
            channel: channel.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HiasError>;
