//! Feature-vector datasets stored as JSON files.
//!
//! Each `*.json` file in a dataset directory holds either a single sample or
//! an array of samples:
//!
//! ```json
//! { "label": "ALL", "features": [0.12, 0.98, 0.33] }
//! ```
//!
//! Test samples may omit `label`.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use hias_core::{HiasError, Result};

/// One feature vector, optionally labelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    #[serde(default)]
    pub label: Option<String>,
    pub features: Vec<f32>,
    /// File (and index within it) the sample came from.
    #[serde(skip)]
    pub source: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SampleFile {
    One(Sample),
    Many(Vec<Sample>),
}

/// Read every `*.json` sample file under `dir`, in file-name order.
pub fn load_dir(dir: &Path) -> Result<Vec<Sample>> {
    if !dir.is_dir() {
        return Err(HiasError::Dataset(format!(
            "dataset directory not found: {}",
            dir.display()
        )));
    }

    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut samples = Vec::new();
    for path in paths {
        let raw = std::fs::read_to_string(&path)?;
        let parsed: SampleFile = serde_json::from_str(&raw).map_err(|e| {
            HiasError::Dataset(format!("failed to parse {}: {}", path.display(), e))
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match parsed {
            SampleFile::One(mut s) => {
                s.source = name;
                samples.push(s);
            }
            SampleFile::Many(list) => {
                for (i, mut s) in list.into_iter().enumerate() {
                    s.source = format!("{name}#{i}");
                    samples.push(s);
                }
            }
        }
    }

    if samples.is_empty() {
        return Err(HiasError::Dataset(format!(
            "no samples found in {}",
            dir.display()
        )));
    }
    debug!(dir = %dir.display(), count = samples.len(), "dataset loaded");
    Ok(samples)
}

/// Check every sample has the same, non-zero dimension and return it.
pub fn feature_dim(samples: &[Sample]) -> Result<usize> {
    let dim = samples.first().map(|s| s.features.len()).unwrap_or(0);
    if dim == 0 {
        return Err(HiasError::Dataset("samples have no features".into()));
    }
    if let Some(bad) = samples.iter().find(|s| s.features.len() != dim) {
        return Err(HiasError::Dataset(format!(
            "{} has {} features, expected {}",
            bad.source,
            bad.features.len(),
            dim
        )));
    }
    Ok(dim)
}

/// Shuffle with a fixed seed and split off the trailing `fraction` as validation.
///
/// Both halves are non-empty whenever there are at least two samples.
pub fn split(mut samples: Vec<Sample>, fraction: f64, seed: u64) -> (Vec<Sample>, Vec<Sample>) {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let n = samples.len();
    if n < 2 {
        return (samples, Vec::new());
    }
    let held_out = ((n as f64) * fraction).round() as usize;
    let held_out = held_out.clamp(1, n - 1);
    let validation = samples.split_off(n - held_out);
    (samples, validation)
}
