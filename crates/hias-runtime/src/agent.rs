use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use hias_channels::MessagingChannel;
use hias_config::HiasConfig;
use hias_core::{HiasError, Result};
use hias_model::{ModelFacade, ModelFactory, ModelKind};

use crate::commands::dispatch_commands;
use crate::frontend::InferenceFrontend;
use crate::mode::{Mode, UsageError};
use crate::shutdown::ShutdownManager;

/// How a run ended without a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The mode finished on its own.
    Completed,
    /// A termination signal arrived first.
    Signalled,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Completed => 0,
            RunOutcome::Signalled => 1,
        }
    }
}

/// Anything that stops a run short of an outcome.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error(transparent)]
    Fatal(#[from] HiasError),
}

impl RunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Usage(e) => e.exit_code(),
            RunError::Fatal(_) => 1,
        }
    }
}

/// The agent lifecycle coordinator.
///
/// Owns the channel handle for the whole run and guarantees it is released
/// on every exit path: normal completion, failure or termination signal.
pub struct Agent {
    config: Arc<HiasConfig>,
    channel: Arc<dyn MessagingChannel>,
    factory: Arc<dyn ModelFactory>,
    frontend: Arc<dyn InferenceFrontend>,
    shutdown: Arc<ShutdownManager>,
    model: Option<Arc<dyn ModelFacade>>,
    channel_started: bool,
    released: bool,
    dispatcher: Option<JoinHandle<()>>,
}

impl Agent {
    pub fn new(
        config: Arc<HiasConfig>,
        channel: Arc<dyn MessagingChannel>,
        factory: Arc<dyn ModelFactory>,
        frontend: Arc<dyn InferenceFrontend>,
        shutdown: Arc<ShutdownManager>,
    ) -> Self {
        Self {
            config,
            channel,
            factory,
            frontend,
            shutdown,
            model: None,
            channel_started: false,
            released: false,
            dispatcher: None,
        }
    }

    /// The bound model, once `set_model` has run.
    pub fn model(&self) -> Option<Arc<dyn ModelFacade>> {
        self.model.clone()
    }

    pub fn channel_started(&self) -> bool {
        self.channel_started
    }

    /// Bind the configured model variant.
    pub fn set_model(&mut self) -> Result<()> {
        let kind: ModelKind = self.config.agent.model.parse()?;
        self.model = Some(self.factory.create(kind)?);
        Ok(())
    }

    fn bound_model(&self) -> Result<Arc<dyn ModelFacade>> {
        self.model
            .clone()
            .ok_or_else(|| HiasError::Agent("no model bound".into()))
    }

    /// Open the messaging channel and start serving remote commands.
    async fn start_channel(&mut self) -> Result<()> {
        self.channel_started = true;
        self.channel.connect().await?;

        if let Some(events) = self.channel.take_events() {
            let model = self.bound_model()?;
            self.dispatcher = Some(tokio::spawn(dispatch_commands(
                events,
                model,
                Arc::clone(&self.channel),
                self.shutdown.token(),
            )));
        }
        Ok(())
    }

    /// Connect, then prepare, train and evaluate the model.
    pub async fn train(&mut self) -> Result<()> {
        let model = self.bound_model()?;
        self.start_channel().await?;
        info!(model = %model.kind(), "training");
        model.prepare_data().await?;
        model.prepare_network().await?;
        model.train().await?;
        model.evaluate().await?;
        info!("training finished");
        Ok(())
    }

    /// Load the trained model.
    pub async fn load_model(&self) -> Result<()> {
        self.bound_model()?.load().await
    }

    /// Connect, load the model and serve HTTP inference until shutdown.
    pub async fn server(&mut self) -> Result<()> {
        let model = self.bound_model()?;
        self.start_channel().await?;
        self.load_model().await?;
        info!(listen = %self.config.server.listen, "starting inference server");
        self.frontend
            .start(
                Arc::clone(&self.config),
                model,
                Arc::clone(&self.channel),
                self.shutdown.token(),
            )
            .await
    }

    /// Load the model and classify the local test set.
    pub async fn inference(&self) -> Result<()> {
        self.load_model().await?;
        self.bound_model()?.test().await
    }

    /// Classify the local test set through the HTTP endpoint.
    pub async fn inference_http(&self) -> Result<()> {
        self.bound_model()?.test_http().await
    }

    async fn execute(&mut self, mode: Mode) -> Result<()> {
        match mode {
            Mode::Train => self.train().await,
            Mode::Classify => self.inference().await,
            Mode::Server => self.server().await,
            Mode::ClassifyHttp => self.inference_http().await,
        }
    }

    /// Validate the command-line token and run the selected mode.
    pub async fn run_arg(&mut self, arg: Option<&str>) -> std::result::Result<RunOutcome, RunError> {
        let mode = Mode::select(arg, &self.config.agent.params)?;
        Ok(self.run(mode).await?)
    }

    /// Bind the model and run `mode` until it completes, fails, or a
    /// termination signal arrives. The channel is released before returning.
    pub async fn run(&mut self, mode: Mode) -> Result<RunOutcome> {
        info!(mode = %mode, "agent starting");
        let token = self.shutdown.token();

        let result = match self.set_model() {
            Ok(()) => {
                let work = self.execute(mode);
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Ok(RunOutcome::Signalled),
                    r = work => r.map(|()| RunOutcome::Completed),
                }
            }
            Err(e) => Err(e),
        };

        let result = match result {
            Ok(RunOutcome::Completed) if self.lingers(mode) => {
                info!(mode = %mode, "staying online until terminated");
                token.cancelled().await;
                Ok(RunOutcome::Signalled)
            }
            other => other,
        };

        match result {
            Ok(RunOutcome::Signalled) => {
                info!(reason = ?self.shutdown.reason(), "Disconnecting");
                self.release(true).await;
            }
            Ok(RunOutcome::Completed) => {
                info!(mode = %mode, "agent finished");
                self.release(false).await;
            }
            Err(ref e) => {
                error!(mode = %mode, error = %e, "agent failed");
                self.release(false).await;
            }
        }
        result
    }

    fn lingers(&self, mode: Mode) -> bool {
        self.config.agent.linger && matches!(mode, Mode::Train | Mode::Classify)
    }

    /// Disconnect the channel at most once. A signal always disconnects; other
    /// paths only when this run opened the channel.
    async fn release(&mut self, signalled: bool) {
        if self.released {
            return;
        }
        self.released = true;

        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.abort();
        }
        if !(signalled || self.channel_started) {
            debug!("channel never opened, nothing to release");
            return;
        }
        if let Err(e) = self.channel.disconnect().await {
            warn!(channel = %self.channel.id(), error = %e, "disconnect failed");
        }
    }
}
