#[cfg(test)]
mod tests {
    use hias_config::ConfigLoader;
    use hias_config::schema::*;
    use std::io::Write;

    // ── Default tests ──────────────────────────────────────────

    #[test]
    fn test_hias_config_defaults() {
        let config = HiasConfig::default();
        assert_eq!(config.agent.model, "xDNN");
        assert_eq!(
            config.agent.params,
            vec!["train", "classify", "server", "classify_http"]
        );
        assert!(!config.agent.linger);
    }

    #[test]
    fn test_mqtt_config_defaults() {
        let config = MqttConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 1883);
        assert_eq!(config.keep_alive_secs, 60);
        assert!(config.ca_file.is_none());
        assert!(config.username.is_none());
    }

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.listen, "127.0.0.1:8080");
        assert!(config.api_key.is_none());
        assert!(!config.cors);
    }

    #[test]
    fn test_defaults_validate_cleanly() {
        let warnings = HiasConfig::default().validate().unwrap();
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    #[test]
    fn test_client_id_falls_back_to_entity() {
        let mut config = MqttConfig::default();
        assert!(config.effective_client_id().starts_with("ai-agent-"));
        config.client_id = Some("agent-7".into());
        assert_eq!(config.effective_client_id(), "agent-7");
    }

    // ── TOML parsing ───────────────────────────────────────────

    #[test]
    fn test_partial_toml_applies_defaults() {
        let toml_str = r#"
[agent]
params = ["train", "server"]

[mqtt]
host = "hias.local"
port = 8883
"#;
        let config: HiasConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.agent.params, vec!["train", "server"]);
        assert_eq!(config.mqtt.host, "hias.local");
        assert_eq!(config.mqtt.port, 8883);
        // Defaults should fill in
        assert_eq!(config.agent.model, "xDNN");
        assert_eq!(config.server.listen, "127.0.0.1:8080");
        assert_eq!(config.model.validation_split, 0.2);
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = HiasConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let restored: HiasConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(restored.agent.params, config.agent.params);
        assert_eq!(restored.mqtt.port, config.mqtt.port);
        assert_eq!(restored.server.listen, config.server.listen);
    }

    // ── Validation ─────────────────────────────────────────────

    #[test]
    fn test_empty_mode_set_is_an_error() {
        let mut config = HiasConfig::default();
        config.agent.params.clear();
        let err = config.validate().unwrap_err();
        assert!(err.contains("agent.params"));
    }

    #[test]
    fn test_unknown_mode_is_a_warning() {
        let mut config = HiasConfig::default();
        config.agent.params.push("retrain".into());
        let warnings = config.validate().unwrap();
        assert!(
            warnings
                .iter()
                .any(|w| w.field == "agent.params" && w.severity == WarningSeverity::Warning)
        );
    }

    #[test]
    fn test_unknown_model_is_an_error() {
        let mut config = HiasConfig::default();
        config.agent.model = "resnet".into();
        assert!(config.validate().unwrap_err().contains("agent.model"));
    }

    #[test]
    fn test_bad_topic_segment_is_an_error() {
        let mut config = HiasConfig::default();
        config.mqtt.entity = "agents/1".into();
        assert!(config.validate().unwrap_err().contains("mqtt.entity"));
    }

    #[test]
    fn test_split_out_of_range_is_an_error() {
        let mut config = HiasConfig::default();
        config.model.validation_split = 1.0;
        assert!(config.validate().unwrap_err().contains("model.validation_split"));
    }

    #[test]
    fn test_zero_port_is_an_error() {
        let mut config = HiasConfig::default();
        config.mqtt.port = 0;
        assert!(config.validate().unwrap_err().contains("mqtt.port"));
    }

    // ── ConfigLoader tests ─────────────────────────────────────

    #[test]
    fn test_config_loader_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("agent.toml");
        let mut f = std::fs::File::create(&config_path).unwrap();
        writeln!(
            f,
            r#"
[agent]
params = ["classify"]
linger = true

[mqtt]
host = "broker.example"
location = "site-1"

[server]
listen = "127.0.0.1:9090"
"#
        )
        .unwrap();

        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        let config = loader.shared();
        assert_eq!(config.agent.params, vec!["classify"]);
        assert!(config.agent.linger);
        assert_eq!(config.mqtt.location, "site-1");
        assert_eq!(config.server.listen, "127.0.0.1:9090");
        assert_eq!(loader.path(), config_path.as_path());
    }

    #[test]
    fn test_config_loader_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("agent.toml");
        std::fs::write(&config_path, "[agent]\nparams = []\n").unwrap();

        let result = ConfigLoader::load(Some(config_path.as_path()));
        assert!(matches!(result, Err(hias_core::HiasError::Config(_))));
    }

    #[test]
    fn test_config_loader_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("agent.toml");
        std::fs::write(&config_path, "[mqtt\nport = ").unwrap();

        match ConfigLoader::load(Some(config_path.as_path())) {
            Err(hias_core::HiasError::Config(msg)) => assert!(msg.contains("failed to parse")),
            other => panic!("expected parse error, got {:?}", other.map(|l| l.shared())),
        }
    }

    #[test]
    fn test_config_loader_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("absent.toml");
        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        assert_eq!(loader.shared().agent.model, "xDNN");
    }

    #[test]
    fn test_shared_handle_points_at_same_config() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::load(Some(dir.path().join("none.toml").as_path())).unwrap();
        let a = loader.shared();
        let b = loader.shared();
        assert!(std::sync::Arc::ptr_eq(&a, &b));
    }

    // ── JSON roundtrip ─────────────────────────────────────────

    #[test]
    fn test_config_json_roundtrip() {
        let config = HiasConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: HiasConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.agent.model, config.agent.model);
    }
}
