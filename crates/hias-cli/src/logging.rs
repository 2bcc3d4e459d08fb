use hias_config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Pick the log level: `--verbose` > `--quiet` > `--log-level` > config.
pub fn resolve_level<'a>(
    verbose: bool,
    quiet: bool,
    flag: Option<&'a str>,
    config: &'a LoggingConfig,
) -> &'a str {
    if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        flag.unwrap_or(&config.level)
    }
}

/// Install the global subscriber. `RUST_LOG` overrides `level`.
pub fn init(config: &LoggingConfig, level: &str) {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // A subscriber may already be installed (tests); keep it.
    let _ = match config.format.as_str() {
        "json" => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .json()
            .with_target(true)
            .try_init(),
        "compact" => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .compact()
            .with_target(false)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_target(false)
            .try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_precedence() {
        let config = LoggingConfig {
            level: "warn".into(),
            ..LoggingConfig::default()
        };
        assert_eq!(resolve_level(true, false, Some("trace"), &config), "debug");
        assert_eq!(resolve_level(false, true, Some("trace"), &config), "error");
        assert_eq!(resolve_level(false, false, Some("trace"), &config), "trace");
        assert_eq!(resolve_level(false, false, None, &config), "warn");
    }
}
