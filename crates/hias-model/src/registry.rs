use std::sync::Arc;
use tracing::info;

use hias_config::HiasConfig;
use hias_core::Result;

use crate::facade::{ModelFacade, ModelKind};
use crate::xdnn::XdnnModel;

/// Builds model facades by kind.
pub trait ModelFactory: Send + Sync {
    fn create(&self, kind: ModelKind) -> Result<Arc<dyn ModelFacade>>;
}

/// The default factory, building every known variant from configuration.
pub struct ModelRegistry {
    config: Arc<HiasConfig>,
}

impl ModelRegistry {
    pub fn new(config: Arc<HiasConfig>) -> Self {
        Self { config }
    }
}

impl ModelFactory for ModelRegistry {
    fn create(&self, kind: ModelKind) -> Result<Arc<dyn ModelFacade>> {
        info!(model = %kind, "binding model");
        match kind {
            ModelKind::Xdnn => Ok(Arc::new(XdnnModel::new(
                self.config.model.clone(),
                &self.config.server,
            ))),
        }
    }
}
