use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::schema::{ConfigWarning, HiasConfig};

/// Loads the agent configuration once at startup.
pub struct ConfigLoader {
    config: Arc<HiasConfig>,
    config_path: PathBuf,
    warnings: Vec<ConfigWarning>,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > HIAS_CONFIG env > ~/.hias/agent.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("HIAS_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".hias")
            .join("agent.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> hias_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            Self::parse(&raw, &config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            HiasConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        // Validate config: keep warnings, fail on errors
        let warnings = config.validate().map_err(hias_core::HiasError::Config)?;
        for w in &warnings {
            warn!("{}", w);
        }

        Ok(Self {
            config: Arc::new(config),
            config_path,
            warnings,
        })
    }

    fn parse(raw: &str, config_path: &Path) -> hias_core::Result<HiasConfig> {
        toml::from_str::<HiasConfig>(raw).map_err(|e| {
            hias_core::HiasError::Config(format!(
                "failed to parse {}: {}",
                config_path.display(),
                e
            ))
        })
    }

    /// Shared read-only handle.
    pub fn shared(&self) -> Arc<HiasConfig> {
        Arc::clone(&self.config)
    }

    /// Non-fatal findings from validation.
    pub fn warnings(&self) -> &[ConfigWarning] {
        &self.warnings
    }

    /// Path the config was resolved from.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply env var overrides (HIAS_MQTT_HOST, HIAS_SERVER_LISTEN, etc.)
    fn apply_env_overrides(mut config: HiasConfig) -> HiasConfig {
        if let Ok(v) = std::env::var("HIAS_MQTT_HOST") {
            config.mqtt.host = v;
        }
        if let Ok(v) = std::env::var("HIAS_MQTT_PORT") {
            match v.parse::<u16>() {
                Ok(port) => config.mqtt.port = port,
                Err(_) => warn!(value = %v, "ignoring invalid HIAS_MQTT_PORT"),
            }
        }
        if let Ok(v) = std::env::var("HIAS_SERVER_LISTEN") {
            config.server.listen = v;
        }
        if let Ok(v) = std::env::var("HIAS_LOG_LEVEL") {
            config.logging.level = v;
        }
        // Credentials: config file takes priority, env is the fallback.
        if config.mqtt.username.is_none() {
            if let Ok(v) = std::env::var("HIAS_MQTT_USERNAME") {
                config.mqtt.username = Some(v);
            }
        }
        if config.mqtt.password.is_none() {
            if let Ok(v) = std::env::var("HIAS_MQTT_PASSWORD") {
                config.mqtt.password = Some(v);
            }
        }
        config
    }
}
