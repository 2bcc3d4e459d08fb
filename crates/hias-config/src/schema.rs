use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Modes the agent binary knows how to run.
pub const SUPPORTED_MODES: [&str; 4] = ["train", "classify", "server", "classify_http"];

/// Model tags the model registry can build.
pub const KNOWN_MODELS: [&str; 1] = ["xDNN"];

/// Root configuration, loaded from `agent.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HiasConfig {
    pub agent: AgentConfig,
    pub mqtt: MqttConfig,
    pub model: ModelConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

// ── Agent ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Modes this deployment accepts on the command line.
    pub params: Vec<String>,
    /// Model variant to bind, e.g. "xDNN".
    pub model: String,
    /// Stay online after `train`/`classify` complete, until a termination
    /// signal arrives. When false the MQTT session is closed and the process exits.
    pub linger: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            params: SUPPORTED_MODES.iter().map(|m| m.to_string()).collect(),
            model: "xDNN".into(),
            linger: false,
        }
    }
}

// ── MQTT ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker hostname.
    pub host: String,
    /// Broker port (1883 plain, 8883 TLS).
    pub port: u16,
    /// Client identifier. Generated from the entity name when unset.
    pub client_id: Option<String>,
    /// Broker username. Can also be set via HIAS_MQTT_USERNAME.
    pub username: Option<String>,
    /// Broker password. Can also be set via HIAS_MQTT_PASSWORD.
    pub password: Option<String>,
    /// PEM CA bundle. When set the connection uses TLS.
    pub ca_file: Option<PathBuf>,
    /// MQTT keep-alive in seconds.
    pub keep_alive_secs: u64,
    /// Topic root, e.g. the HIAS location identifier.
    pub location: String,
    /// Zone the agent belongs to.
    pub zone: String,
    /// Agent entity identifier.
    pub entity: String,
    /// Seconds between life heartbeats. 0 disables the heartbeat.
    pub life_interval_secs: u64,
    /// Upper bound for the reconnect backoff.
    pub reconnect_max_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: None,
            username: None,
            password: None,
            ca_file: None,
            keep_alive_secs: 60,
            location: "hias".into(),
            zone: "default".into(),
            entity: "ai-agent".into(),
            life_interval_secs: 300,
            reconnect_max_secs: 60,
        }
    }
}

// ── Model ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory of labelled training samples (`*.json`).
    pub data_dir: PathBuf,
    /// Directory of samples used by `classify` and `classify_http`.
    pub test_dir: PathBuf,
    /// Where the trained model is written and loaded from.
    pub model_path: PathBuf,
    /// Fraction of the training data held out for evaluation (0.0 - 1.0).
    pub validation_split: f64,
    /// Seed for the deterministic shuffle before splitting.
    pub seed: u64,
    /// Timeout for each request made by `classify_http`.
    pub http_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("model/data/train"),
            test_dir: PathBuf::from("model/data/test"),
            model_path: PathBuf::from("model/xdnn.json"),
            validation_split: 0.2,
            seed: 42,
            http_timeout_secs: 30,
        }
    }
}

// ── Server ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listen address.
    pub listen: String,
    /// Optional bearer key required on the inference route.
    pub api_key: Option<String>,
    /// Enable permissive CORS.
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".into(),
            api_key: None,
            cors: false,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Default for root ───────────────────────────────────────────

impl Default for HiasConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            mqtt: MqttConfig::default(),
            model: ModelConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl MqttConfig {
    /// The client id used on the wire.
    pub fn effective_client_id(&self) -> String {
        self.client_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("{}-{}", self.entity, std::process::id()))
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "info",
        };
        write!(f, "{} {}: {}", label, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

impl HiasConfig {
    /// Validate the config and return a list of warnings/errors.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Agent modes ───
        if self.agent.params.is_empty() {
            warnings.push(ConfigWarning {
                field: "agent.params".into(),
                message: "no modes are enabled".into(),
                severity: WarningSeverity::Error,
                hint: Some(format!("Enable one or more of: {}", SUPPORTED_MODES.join(", "))),
            });
        }
        for mode in &self.agent.params {
            if !SUPPORTED_MODES.contains(&mode.as_str()) {
                warnings.push(ConfigWarning {
                    field: "agent.params".into(),
                    message: format!("unknown mode '{}' will never be accepted", mode),
                    severity: WarningSeverity::Warning,
                    hint: Some(format!("Supported: {}", SUPPORTED_MODES.join(", "))),
                });
            }
        }

        // ── Agent model ───
        if !KNOWN_MODELS.contains(&self.agent.model.as_str()) {
            warnings.push(ConfigWarning {
                field: "agent.model".into(),
                message: format!("unknown model '{}'", self.agent.model),
                severity: WarningSeverity::Error,
                hint: Some(format!("Supported: {}", KNOWN_MODELS.join(", "))),
            });
        }

        // ── MQTT broker ───
        if self.mqtt.host.is_empty() {
            warnings.push(ConfigWarning {
                field: "mqtt.host".into(),
                message: "broker host is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 'localhost' or the HIAS server hostname".into()),
            });
        }
        if self.mqtt.port == 0 {
            warnings.push(ConfigWarning {
                field: "mqtt.port".into(),
                message: "broker port is 0".into(),
                severity: WarningSeverity::Error,
                hint: Some("Use 1883 for plain MQTT or 8883 for TLS".into()),
            });
        } else if self.mqtt.port == 8883 && self.mqtt.ca_file.is_none() {
            warnings.push(ConfigWarning {
                field: "mqtt.ca_file".into(),
                message: "port 8883 is usually TLS but no CA file is configured".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set mqtt.ca_file to the broker's CA bundle".into()),
            });
        }
        if self.mqtt.username.is_some() != self.mqtt.password.is_some() {
            warnings.push(ConfigWarning {
                field: "mqtt.username".into(),
                message: "only one of username/password is set; credentials will be ignored".into(),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }
        for (field, value) in [
            ("mqtt.location", &self.mqtt.location),
            ("mqtt.zone", &self.mqtt.zone),
            ("mqtt.entity", &self.mqtt.entity),
        ] {
            if value.is_empty() || value.contains(['/', '+', '#']) {
                warnings.push(ConfigWarning {
                    field: field.into(),
                    message: format!("'{}' is not a valid topic segment", value),
                    severity: WarningSeverity::Error,
                    hint: Some("Topic segments must be non-empty and contain no '/', '+' or '#'".into()),
                });
            }
        }

        // ── Model ───
        let split = self.model.validation_split;
        if !(split > 0.0 && split < 1.0) {
            warnings.push(ConfigWarning {
                field: "model.validation_split".into(),
                message: format!("split {} is out of range", split),
                severity: WarningSeverity::Error,
                hint: Some("Use a fraction between 0.0 and 1.0, e.g. 0.2".into()),
            });
        }

        // ── Server listen address ───
        if self.server.listen.is_empty() {
            warnings.push(ConfigWarning {
                field: "server.listen".into(),
                message: "listen address is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. '127.0.0.1:8080'".into()),
            });
        } else if self.server.listen.starts_with("0.0.0.0") && self.server.api_key.is_none() {
            warnings.push(ConfigWarning {
                field: "server.api_key".into(),
                message: "no API key set while server is network-accessible".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set server.api_key to protect the inference endpoint".into()),
            });
        }

        // ── Logging format ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        // ── Logging level ───
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
