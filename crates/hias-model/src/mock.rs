//! Mock model for deterministic testing.
//!
//! Records every lifecycle call into a journal that can be shared with other
//! test doubles, so tests can assert the order of operations across the
//! model and the messaging channel.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::facade::{ModelFacade, ModelKind};
use hias_core::{HiasError, Prediction, Result};

/// Shared, ordered record of calls.
pub type Journal = Arc<Mutex<Vec<String>>>;

/// A model that performs no work and records what it was asked to do.
///
/// # Example
/// ```
/// use hias_model::mock::MockModel;
/// let model = MockModel::new().with_prediction("ALL", 0.9);
/// ```
pub struct MockModel {
    journal: Journal,
    prediction: Prediction,
    fail_on: Option<String>,
    ready: Mutex<bool>,
}

impl Default for MockModel {
    fn default() -> Self {
        Self::new()
    }
}

impl MockModel {
    pub fn new() -> Self {
        Self {
            journal: Arc::new(Mutex::new(vec![])),
            prediction: Prediction {
                label: "mock".into(),
                confidence: 1.0,
            },
            fail_on: None,
            ready: Mutex::new(false),
        }
    }

    /// Record into an existing journal instead of a private one.
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    /// The result every `classify` call returns.
    pub fn with_prediction(mut self, label: &str, confidence: f32) -> Self {
        self.prediction = Prediction {
            label: label.to_string(),
            confidence,
        };
        self
    }

    /// Make the named lifecycle step return an error.
    pub fn failing_on(mut self, step: &str) -> Self {
        self.fail_on = Some(step.to_string());
        self
    }

    /// Start out as if a network were already loaded.
    pub fn ready(self) -> Self {
        *self.ready.lock() = true;
        self
    }

    pub fn journal(&self) -> Journal {
        Arc::clone(&self.journal)
    }

    /// The model calls recorded so far, ignoring other entries in a shared journal.
    pub fn calls(&self) -> Vec<String> {
        self.journal
            .lock()
            .iter()
            .filter(|c| c.starts_with("model."))
            .cloned()
            .collect()
    }

    fn record(&self, step: &str) -> Result<()> {
        self.journal.lock().push(format!("model.{step}"));
        if self.fail_on.as_deref() == Some(step) {
            return Err(HiasError::Model(format!("mock failure in {step}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ModelFacade for MockModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Xdnn
    }

    async fn prepare_data(&self) -> Result<()> {
        self.record("prepare_data")
    }

    async fn prepare_network(&self) -> Result<()> {
        self.record("prepare_network")
    }

    async fn train(&self) -> Result<()> {
        self.record("train")?;
        *self.ready.lock() = true;
        Ok(())
    }

    async fn evaluate(&self) -> Result<()> {
        self.record("evaluate")
    }

    async fn load(&self) -> Result<()> {
        self.record("load")?;
        *self.ready.lock() = true;
        Ok(())
    }

    async fn test(&self) -> Result<()> {
        self.record("test")
    }

    async fn test_http(&self) -> Result<()> {
        self.record("test_http")
    }

    fn classify(&self, features: &[f32]) -> Result<Prediction> {
        if !*self.ready.lock() {
            return Err(HiasError::ModelNotReady("mock model not loaded".into()));
        }
        if features.is_empty() {
            return Err(HiasError::Model("no features".into()));
        }
        Ok(self.prediction.clone())
    }

    fn is_ready(&self) -> bool {
        *self.ready.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_calls_in_order() {
        let model = MockModel::new();
        model.prepare_data().await.unwrap();
        model.train().await.unwrap();
        assert_eq!(model.calls(), vec!["model.prepare_data", "model.train"]);
        assert!(model.is_ready());
    }

    #[tokio::test]
    async fn test_mock_failure_still_records() {
        let model = MockModel::new().failing_on("load");
        assert!(model.load().await.is_err());
        assert_eq!(model.calls(), vec!["model.load"]);
        assert!(!model.is_ready());
    }

    #[test]
    fn test_mock_shares_journal() {
        let journal: Journal = Arc::new(Mutex::new(vec!["channel.connect".into()]));
        let model = MockModel::new().with_journal(journal.clone());
        model.record("test").unwrap();
        assert_eq!(journal.lock().len(), 2);
        assert_eq!(model.calls(), vec!["model.test"]);
    }

    #[test]
    fn test_mock_classify_requires_ready() {
        let model = MockModel::new().with_prediction("ALL", 0.8);
        assert!(model.classify(&[1.0]).is_err());
        let model = MockModel::new().with_prediction("ALL", 0.8).ready();
        assert_eq!(model.classify(&[1.0]).unwrap().label, "ALL");
    }
}
