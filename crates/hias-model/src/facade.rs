use async_trait::async_trait;
use hias_core::{HiasError, Prediction, Result};

/// Model variants the registry can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    /// Explainable deep neural network: prototype-based density classifier.
    Xdnn,
}

impl ModelKind {
    /// The tag used in configuration and reports.
    pub fn tag(&self) -> &'static str {
        match self {
            ModelKind::Xdnn => "xDNN",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

impl std::str::FromStr for ModelKind {
    type Err = HiasError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "xDNN" | "xdnn" => Ok(ModelKind::Xdnn),
            other => Err(HiasError::ModelNotFound(other.to_string())),
        }
    }
}

/// Lifecycle of a trainable, servable classifier.
///
/// All methods take `&self`: one instance is shared between the coordinator
/// and the HTTP server, so implementations keep their state behind a lock and
/// must allow `classify` to run concurrently with other readers.
#[async_trait]
pub trait ModelFacade: Send + Sync {
    /// Which variant this is.
    fn kind(&self) -> ModelKind;

    /// Read and split the training data.
    async fn prepare_data(&self) -> Result<()>;

    /// Build an untrained network sized for the prepared data.
    async fn prepare_network(&self) -> Result<()>;

    /// Fit the network and persist the artifact.
    async fn train(&self) -> Result<()>;

    /// Score the trained network against the held-out data.
    async fn evaluate(&self) -> Result<()>;

    /// Load a previously trained artifact.
    async fn load(&self) -> Result<()>;

    /// Classify the local test set.
    async fn test(&self) -> Result<()>;

    /// Classify the local test set through the HTTP inference endpoint.
    async fn test_http(&self) -> Result<()>;

    /// Classify one feature vector. Requires a trained or loaded network.
    fn classify(&self, features: &[f32]) -> Result<Prediction>;

    /// Whether `classify` can be served.
    fn is_ready(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parses_tag() {
        assert_eq!("xDNN".parse::<ModelKind>().unwrap(), ModelKind::Xdnn);
        assert_eq!(ModelKind::Xdnn.to_string(), "xDNN");
    }

    #[test]
    fn test_unknown_kind() {
        let err = "vgg16".parse::<ModelKind>().unwrap_err();
        assert!(matches!(err, HiasError::ModelNotFound(ref m) if m == "vgg16"));
    }
}
