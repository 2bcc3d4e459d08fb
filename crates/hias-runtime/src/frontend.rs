use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use hias_channels::MessagingChannel;
use hias_config::HiasConfig;
use hias_core::Result;
use hias_model::ModelFacade;

/// The inference server started in `server` mode.
///
/// `start` constructs the server from the shared handles and serves until
/// `shutdown` is cancelled. The model passed in is the instance the
/// coordinator loaded, not a copy.
#[async_trait]
pub trait InferenceFrontend: Send + Sync {
    async fn start(
        &self,
        config: Arc<HiasConfig>,
        model: Arc<dyn ModelFacade>,
        channel: Arc<dyn MessagingChannel>,
        shutdown: CancellationToken,
    ) -> Result<()>;
}
