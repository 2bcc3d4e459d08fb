use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use hias_channels::{MessagingChannel, MqttChannel};
use hias_config::ConfigLoader;
use hias_model::ModelRegistry;
use hias_runtime::{Agent, Mode, ShutdownManager, UsageError};
use hias_server::HttpFrontend;

use crate::logging;

/// HIAS AI agent: train, classify and serve a local model for the HIAS network.
#[derive(Parser, Debug)]
#[command(name = "hias-agent", version, about, long_about = None)]
pub struct Cli {
    /// Path to agent.toml config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Operating mode: train, classify, server or classify_http
    mode: Option<String>,
}

impl Cli {
    /// Run the agent and return the process exit code.
    pub async fn run(self) -> i32 {
        // Usage is checked before anything touches disk or network.
        let Some(ref mode_arg) = self.mode else {
            let err = UsageError::MissingArgument;
            println!("{err}");
            return err.exit_code();
        };

        let loader = match ConfigLoader::load(self.config.as_deref()) {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Error: {e}");
                return 1;
            }
        };
        let config = loader.shared();

        let level = logging::resolve_level(
            self.verbose,
            self.quiet,
            self.log_level.as_deref(),
            &config.logging,
        );
        logging::init(&config.logging, level);
        info!(path = %loader.path().display(), "configuration loaded");
        for w in loader.warnings() {
            warn!("{}", w);
        }

        let mode = match Mode::select(Some(mode_arg.as_str()), &config.agent.params) {
            Ok(m) => m,
            Err(e) => {
                println!("{e}");
                return e.exit_code();
            }
        };

        let shutdown = Arc::new(ShutdownManager::new());
        shutdown.install_signal_handlers();

        let channel: Arc<dyn MessagingChannel> = Arc::new(MqttChannel::new(config.mqtt.clone()));
        let mut agent = Agent::new(
            config.clone(),
            channel,
            Arc::new(ModelRegistry::new(config)),
            Arc::new(HttpFrontend),
            shutdown,
        );

        match agent.run(mode).await {
            Ok(outcome) => outcome.exit_code(),
            Err(e) => {
                eprintln!("Error: {e}");
                1
            }
        }
    }
}
