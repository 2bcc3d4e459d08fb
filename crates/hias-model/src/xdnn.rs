//! xDNN: explainable deep neural network classifier.
//!
//! Operates on pre-extracted feature vectors. Training is a single recursive
//! pass per class: each sample's density relative to the running class mean
//! decides whether it becomes a new prototype or is absorbed by the nearest
//! one. Inference picks the class whose closest prototype is most similar.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use hias_config::{ModelConfig, ServerConfig};
use hias_core::{HiasError, InferenceRequest, InferenceResponse, Prediction, Result};

use crate::dataset::{self, Sample};
use crate::facade::{ModelFacade, ModelKind};

/// Initial prototype radius: distance between unit vectors 30° apart.
fn initial_radius() -> f32 {
    (2.0 - 2.0 * (std::f32::consts::PI / 6.0).cos()).sqrt()
}

// ── Network ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Prototype {
    center: Vec<f32>,
    support: u32,
    radius: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClassPrototypes {
    label: String,
    prototypes: Vec<Prototype>,
}

/// The persisted artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct XdnnNetwork {
    feature_dim: usize,
    classes: Vec<ClassPrototypes>,
    #[serde(default)]
    trained_at: Option<DateTime<Utc>>,
}

impl XdnnNetwork {
    fn empty(feature_dim: usize, labels: &[String]) -> Self {
        Self {
            feature_dim,
            classes: labels
                .iter()
                .map(|label| ClassPrototypes {
                    label: label.clone(),
                    prototypes: Vec::new(),
                })
                .collect(),
            trained_at: None,
        }
    }

    fn is_trained(&self) -> bool {
        self.classes.iter().any(|c| !c.prototypes.is_empty())
    }

    fn classify(&self, features: &[f32]) -> Result<Prediction> {
        if features.len() != self.feature_dim {
            return Err(HiasError::Model(format!(
                "expected {} features, got {}",
                self.feature_dim,
                features.len()
            )));
        }
        let x = normalize(features);

        let mut scores: Vec<(&str, f32)> = Vec::with_capacity(self.classes.len());
        for class in &self.classes {
            let best = class
                .prototypes
                .iter()
                .map(|p| (-sq_distance(&x, &p.center)).exp())
                .fold(0.0f32, f32::max);
            scores.push((&class.label, best));
        }

        let total: f32 = scores.iter().map(|(_, s)| s).sum();
        let (label, best) = scores
            .iter()
            .copied()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or_else(|| HiasError::ModelNotReady("network has no classes".into()))?;
        let confidence = if total > 0.0 { best / total } else { 0.0 };

        Ok(Prediction {
            label: label.to_string(),
            confidence,
        })
    }
}

/// Learn the prototypes of one class from its samples. Bails out once
/// `stop` is raised.
fn learn_class(samples: &[&[f32]], stop: &AtomicBool) -> Result<Vec<Prototype>> {
    let r0 = initial_radius();
    let mut prototypes: Vec<Prototype> = Vec::new();
    let Some(first) = samples.first() else {
        return Ok(prototypes);
    };

    let first = normalize(first);
    let mut mean = first.clone();
    let mut mean_sq_norm = dot(&first, &first);
    prototypes.push(Prototype {
        center: first,
        support: 1,
        radius: r0,
    });

    for (k, raw) in samples.iter().enumerate().skip(1) {
        check_stop(stop)?;
        let x = normalize(raw);
        let k = (k + 1) as f32;
        for (m, v) in mean.iter_mut().zip(&x) {
            *m = (k - 1.0) / k * *m + v / k;
        }
        mean_sq_norm = (k - 1.0) / k * mean_sq_norm + dot(&x, &x) / k;
        let spread = mean_sq_norm - dot(&mean, &mean);

        let density = |v: &[f32]| {
            if spread <= f32::EPSILON {
                1.0
            } else {
                1.0 / (1.0 + sq_distance(v, &mean) / spread)
            }
        };

        let dx = density(&x);
        let (d_min, d_max) = prototypes
            .iter()
            .map(|p| density(&p.center))
            .fold((f32::MAX, f32::MIN), |(lo, hi), d| (lo.min(d), hi.max(d)));

        if dx > d_max || dx < d_min {
            prototypes.push(Prototype {
                center: x,
                support: 1,
                radius: r0,
            });
            continue;
        }

        let (nearest, dist) = prototypes
            .iter()
            .enumerate()
            .map(|(i, p)| (i, sq_distance(&x, &p.center).sqrt()))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap_or((0, f32::MAX));

        if dist > prototypes[nearest].radius {
            prototypes.push(Prototype {
                center: x,
                support: 1,
                radius: r0,
            });
        } else {
            let p = &mut prototypes[nearest];
            let s = p.support as f32;
            for (c, v) in p.center.iter_mut().zip(&x) {
                *c = (s * *c + v) / (s + 1.0);
            }
            p.support += 1;
            p.radius = ((p.radius.powi(2) + (1.0 - dot(&p.center, &p.center))) / 2.0)
                .max(0.0)
                .sqrt();
        }
    }
    Ok(prototypes)
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn sq_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

fn normalize(v: &[f32]) -> Vec<f32> {
    let norm = dot(v, v).sqrt();
    if norm <= f32::EPSILON {
        v.to_vec()
    } else {
        v.iter().map(|x| x / norm).collect()
    }
}

// ── Facade ─────────────────────────────────────────────────────

#[derive(Default)]
struct XdnnState {
    training: Vec<Sample>,
    validation: Vec<Sample>,
    network: Option<XdnnNetwork>,
}

/// Evaluation summary written next to the model artifact.
#[derive(Debug, Serialize)]
struct EvaluationReport {
    accuracy: f32,
    samples: usize,
    per_class: BTreeMap<String, ClassScore>,
}

#[derive(Debug, Default, Serialize)]
struct ClassScore {
    correct: usize,
    total: usize,
}

/// The xDNN model facade.
///
/// Dataset I/O, learning and scoring run on the blocking pool so the
/// coordinator can still observe shutdown while they are in progress.
pub struct XdnnModel {
    config: ModelConfig,
    inference_url: String,
    api_key: Option<String>,
    state: Arc<RwLock<XdnnState>>,
}

impl XdnnModel {
    pub fn new(config: ModelConfig, server: &ServerConfig) -> Self {
        Self {
            config,
            inference_url: inference_url(&server.listen),
            api_key: server.api_key.clone(),
            state: Arc::new(RwLock::new(XdnnState::default())),
        }
    }

    /// URL `test_http` posts to.
    pub fn inference_url(&self) -> &str {
        &self.inference_url
    }

    fn metrics_path(&self) -> PathBuf {
        self.config.model_path.with_file_name("metrics.json")
    }
}

/// Raised when the future awaiting a blocking section is dropped.
struct StopOnDrop(Arc<AtomicBool>);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Run `work` on the blocking pool. If the caller stops waiting, `work` sees
/// its stop flag raised and should return early.
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&AtomicBool) -> Result<T> + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let _guard = StopOnDrop(Arc::clone(&stop));
    tokio::task::spawn_blocking(move || work(&stop))
        .await
        .map_err(|e| HiasError::Model(format!("model task failed: {e}")))?
}

fn check_stop(stop: &AtomicBool) -> Result<()> {
    if stop.load(Ordering::Relaxed) {
        return Err(HiasError::Model("interrupted".into()));
    }
    Ok(())
}

fn score(network: &XdnnNetwork, samples: &[Sample], stop: &AtomicBool) -> Result<EvaluationReport> {
    let mut per_class: BTreeMap<String, ClassScore> = BTreeMap::new();
    let mut correct = 0usize;
    let mut labelled = 0usize;
    for sample in samples {
        check_stop(stop)?;
        let prediction = network.classify(&sample.features)?;
        match sample.label {
            Some(ref label) => {
                labelled += 1;
                let hit = prediction.label == *label;
                let entry = per_class.entry(label.clone()).or_default();
                entry.total += 1;
                if hit {
                    entry.correct += 1;
                    correct += 1;
                }
                info!(
                    sample = %sample.source,
                    expected = %label,
                    predicted = %prediction.label,
                    confidence = prediction.confidence,
                    "classified"
                );
            }
            None => info!(
                sample = %sample.source,
                predicted = %prediction.label,
                confidence = prediction.confidence,
                "classified"
            ),
        }
    }

    let accuracy = if labelled > 0 {
        correct as f32 / labelled as f32
    } else {
        0.0
    };
    Ok(EvaluationReport {
        accuracy,
        samples: labelled,
        per_class,
    })
}

/// Turn a listen address into a connectable inference URL.
fn inference_url(listen: &str) -> String {
    let host = match listen.strip_prefix("0.0.0.0:") {
        Some(port) => format!("127.0.0.1:{port}"),
        None => listen.to_string(),
    };
    format!("http://{host}/Inference")
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(value)?)?;
    Ok(())
}

#[async_trait]
impl ModelFacade for XdnnModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Xdnn
    }

    async fn prepare_data(&self) -> Result<()> {
        let config = self.config.clone();
        let (training, validation) = run_blocking(move |_| {
            let samples = dataset::load_dir(&config.data_dir)?;
            if let Some(unlabelled) = samples.iter().find(|s| s.label.is_none()) {
                return Err(HiasError::Dataset(format!(
                    "training sample {} has no label",
                    unlabelled.source
                )));
            }
            dataset::feature_dim(&samples)?;
            Ok(dataset::split(samples, config.validation_split, config.seed))
        })
        .await?;
        info!(
            training = training.len(),
            validation = validation.len(),
            "training data prepared"
        );

        let mut state = self.state.write();
        state.training = training;
        state.validation = validation;
        Ok(())
    }

    async fn prepare_network(&self) -> Result<()> {
        let mut state = self.state.write();
        if state.training.is_empty() {
            return Err(HiasError::ModelNotReady(
                "prepare_data must run before prepare_network".into(),
            ));
        }
        let dim = dataset::feature_dim(&state.training)?;
        let mut labels: Vec<String> = state
            .training
            .iter()
            .filter_map(|s| s.label.clone())
            .collect();
        labels.sort();
        labels.dedup();

        info!(classes = ?labels, feature_dim = dim, "network prepared");
        state.network = Some(XdnnNetwork::empty(dim, &labels));
        Ok(())
    }

    async fn train(&self) -> Result<()> {
        let state = Arc::clone(&self.state);
        let model_path = self.config.model_path.clone();
        let network = run_blocking(move |stop| {
            // Learn under the read lock so `classify` stays available.
            let mut network = {
                let state = state.read();
                let Some(mut network) = state.network.clone() else {
                    return Err(HiasError::ModelNotReady(
                        "prepare_network must run before train".into(),
                    ));
                };
                for class in network.classes.iter_mut() {
                    let members: Vec<&[f32]> = state
                        .training
                        .iter()
                        .filter(|s| s.label.as_deref() == Some(class.label.as_str()))
                        .map(|s| s.features.as_slice())
                        .collect();
                    class.prototypes = learn_class(&members, stop)?;
                    debug!(
                        class = %class.label,
                        samples = members.len(),
                        prototypes = class.prototypes.len(),
                        "class trained"
                    );
                }
                network
            };
            network.trained_at = Some(Utc::now());
            check_stop(stop)?;

            write_json(&model_path, &network)?;
            info!(path = %model_path.display(), "model saved");
            state.write().network = Some(network.clone());
            Ok(network)
        })
        .await?;

        let prototypes: usize = network.classes.iter().map(|c| c.prototypes.len()).sum();
        info!(prototypes, "training complete");
        Ok(())
    }

    async fn evaluate(&self) -> Result<()> {
        let state = Arc::clone(&self.state);
        let metrics_path = self.metrics_path();
        let report = run_blocking(move |stop| {
            let state = state.read();
            if state.validation.is_empty() {
                return Ok(None);
            }
            let network = state
                .network
                .as_ref()
                .ok_or_else(|| HiasError::ModelNotReady("no trained network".into()))?;
            let report = score(network, &state.validation, stop)?;
            write_json(&metrics_path, &report)?;
            Ok(Some(report))
        })
        .await?;

        let Some(report) = report else {
            warn!("no validation samples, skipping evaluation");
            return Ok(());
        };
        info!(
            accuracy = report.accuracy,
            samples = report.samples,
            "evaluation complete"
        );
        for (label, score) in &report.per_class {
            info!(class = %label, correct = score.correct, total = score.total, "class accuracy");
        }
        Ok(())
    }

    async fn load(&self) -> Result<()> {
        let path = self.config.model_path.clone();
        let network = run_blocking(move |_| {
            if !path.exists() {
                return Err(HiasError::ModelNotFound(format!(
                    "{} (run the agent in train mode first)",
                    path.display()
                )));
            }
            let raw = std::fs::read_to_string(&path)?;
            let network: XdnnNetwork = serde_json::from_str(&raw).map_err(|e| {
                HiasError::Model(format!("failed to parse {}: {}", path.display(), e))
            })?;
            if !network.is_trained() {
                return Err(HiasError::ModelNotReady(format!(
                    "{} contains no prototypes",
                    path.display()
                )));
            }
            Ok(network)
        })
        .await?;
        info!(
            path = %self.config.model_path.display(),
            classes = network.classes.len(),
            "model loaded"
        );

        self.state.write().network = Some(network);
        Ok(())
    }

    async fn test(&self) -> Result<()> {
        let state = Arc::clone(&self.state);
        let test_dir = self.config.test_dir.clone();
        let (report, total) = run_blocking(move |stop| {
            let samples = dataset::load_dir(&test_dir)?;
            let state = state.read();
            let network = state
                .network
                .as_ref()
                .ok_or_else(|| HiasError::ModelNotReady("no trained network".into()))?;
            Ok((score(network, &samples, stop)?, samples.len()))
        })
        .await?;

        if report.samples > 0 {
            info!(
                accuracy = report.accuracy,
                samples = report.samples,
                "local classification complete"
            );
        } else {
            info!(samples = total, "local classification complete");
        }
        Ok(())
    }

    async fn test_http(&self) -> Result<()> {
        let test_dir = self.config.test_dir.clone();
        let samples = run_blocking(move |_| dataset::load_dir(&test_dir)).await?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.http_timeout_secs))
            .build()
            .map_err(|e| HiasError::Model(format!("failed to build HTTP client: {e}")))?;
        info!(url = %self.inference_url(), samples = samples.len(), "classifying via HTTP");

        let mut labelled = 0usize;
        let mut correct = 0usize;
        for sample in &samples {
            let mut req = client.post(self.inference_url()).json(&InferenceRequest {
                features: sample.features.clone(),
            });
            if let Some(ref key) = self.api_key {
                req = req.bearer_auth(key);
            }
            let resp = req.send().await.map_err(|e| {
                HiasError::Model(format!("inference request to {} failed: {e}", self.inference_url))
            })?;
            if !resp.status().is_success() {
                return Err(HiasError::Model(format!(
                    "inference server returned {} for {}",
                    resp.status(),
                    sample.source
                )));
            }
            let body: InferenceResponse = resp
                .json()
                .await
                .map_err(|e| HiasError::Model(format!("invalid inference response: {e}")))?;

            if let Some(ref label) = sample.label {
                labelled += 1;
                if *label == body.diagnosis {
                    correct += 1;
                }
            }
            info!(
                sample = %sample.source,
                diagnosis = %body.diagnosis,
                confidence = body.confidence,
                "classified via HTTP"
            );
        }

        if labelled > 0 {
            info!(
                accuracy = correct as f32 / labelled as f32,
                samples = labelled,
                "HTTP classification complete"
            );
        }
        Ok(())
    }

    fn classify(&self, features: &[f32]) -> Result<Prediction> {
        let state = self.state.read();
        match state.network {
            Some(ref network) if network.is_trained() => network.classify(features),
            _ => Err(HiasError::ModelNotReady("model is not loaded".into())),
        }
    }

    fn is_ready(&self) -> bool {
        self.state
            .read()
            .network
            .as_ref()
            .is_some_and(XdnnNetwork::is_trained)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inference_url_rewrites_wildcard() {
        assert_eq!(inference_url("0.0.0.0:8080"), "http://127.0.0.1:8080/Inference");
        assert_eq!(inference_url("10.0.0.5:9000"), "http://10.0.0.5:9000/Inference");
    }

    #[test]
    fn test_learn_class_absorbs_identical_samples() {
        let a = [1.0f32, 0.0];
        let samples: Vec<&[f32]> = vec![&a, &a, &a];
        let protos = learn_class(&samples, &AtomicBool::new(false)).unwrap();
        assert_eq!(protos.len(), 1);
        assert_eq!(protos[0].support, 3);
    }

    #[test]
    fn test_learn_class_spawns_prototype_for_far_sample() {
        let a = [1.0f32, 0.0];
        let b = [0.0f32, 1.0];
        let samples: Vec<&[f32]> = vec![&a, &a, &b];
        let protos = learn_class(&samples, &AtomicBool::new(false)).unwrap();
        assert!(protos.len() >= 2);
    }

    #[test]
    fn test_learn_class_stops_when_flag_raised() {
        let a = [1.0f32, 0.0];
        let samples: Vec<&[f32]> = vec![&a, &a, &a];
        let err = learn_class(&samples, &AtomicBool::new(true)).unwrap_err();
        assert!(matches!(err, HiasError::Model(_)));
    }

    #[tokio::test]
    async fn test_dropping_blocking_section_raises_stop() {
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let work = run_blocking(move |stop| {
            while !stop.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(1));
            }
            let _ = done_tx.send(());
            check_stop(stop)
        });
        assert!(tokio::time::timeout(Duration::from_millis(50), work).await.is_err());
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_network_rejects_wrong_dimension() {
        let mut net = XdnnNetwork::empty(3, &["a".to_string()]);
        net.classes[0].prototypes.push(Prototype {
            center: vec![1.0, 0.0, 0.0],
            support: 1,
            radius: initial_radius(),
        });
        assert!(net.classify(&[1.0, 0.0]).is_err());
        let p = net.classify(&[2.0, 0.0, 0.0]).unwrap();
        assert_eq!(p.label, "a");
        assert!((p.confidence - 1.0).abs() < 1e-6);
    }
}
