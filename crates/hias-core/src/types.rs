use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of the model variant bound to the agent (e.g. "xDNN").
pub type ModelTag = String;

/// The outcome of classifying a single feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Winning class label.
    pub label: String,
    /// Normalised score of the winning class, in `[0, 1]`.
    pub confidence: f32,
}

/// Where a classification request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportSource {
    Http,
    Mqtt,
    Local,
}

/// A classification result as published on the agent's results topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub source: ReportSource,
    pub label: String,
    pub confidence: f32,
    pub model: ModelTag,
    pub timestamp: DateTime<Utc>,
}

impl ClassificationReport {
    pub fn new(source: ReportSource, model: impl Into<ModelTag>, prediction: &Prediction) -> Self {
        Self {
            source,
            label: prediction.label.clone(),
            confidence: prediction.confidence,
            model: model.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Body of `POST /Inference`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub features: Vec<f32>,
}

/// Response of `POST /Inference`. Field names follow the HIAS wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InferenceResponse {
    pub response: String,
    pub message: String,
    pub diagnosis: String,
    pub confidence: f32,
}

impl InferenceResponse {
    pub fn ok(prediction: &Prediction) -> Self {
        Self {
            response: "OK".into(),
            message: format!("{} detected", prediction.label),
            diagnosis: prediction.label.clone(),
            confidence: prediction.confidence,
        }
    }
}

/// Presence states published on the status topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentStatus {
    Online,
    Offline,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Online => "ONLINE",
            AgentStatus::Offline => "OFFLINE",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
