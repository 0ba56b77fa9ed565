use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use ndarray::{s, ArrayView2};
use serde::Deserialize;
use thiserror::Error;

use super::posture::RawPrediction;

/// Columns of the head rows kept in the feature vector.
const HEAD_FEATURE_COLUMNS: [usize; 3] = [0, 3, 6];
const HEATMAP_ROWS: usize = 14;
const HEATMAP_COLS: usize = 7;
pub const FEATURE_LEN: usize = 2 * HEAD_FEATURE_COLUMNS.len() + (HEATMAP_ROWS - 2) * HEATMAP_COLS;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("model artifact not found at {0}")]
    ArtifactMissing(PathBuf),
    #[error("failed to read model artifact {path}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed model artifact {path}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("model expects {expected} features, got {actual}")]
    FeatureLength { expected: usize, actual: usize },
    #[error("heatmap must be 14x7, got {rows}x{cols}")]
    HeatmapShape { rows: usize, cols: usize },
}

/// External posture model: feature vector in, class index and raw flags out.
pub trait Classifier: Send {
    fn classify(&self, features: &[f64]) -> Result<RawPrediction, ClassifierError>;
}

/// Head rows 0–1 sampled at three columns, then body rows 2–13 in full.
pub fn features(heatmap: ArrayView2<'_, f64>) -> Result<Vec<f64>, ClassifierError> {
    let (rows, cols) = heatmap.dim();
    if rows != HEATMAP_ROWS || cols != HEATMAP_COLS {
        return Err(ClassifierError::HeatmapShape { rows, cols });
    }

    let mut out = Vec::with_capacity(FEATURE_LEN);
    for row in 0..2 {
        out.extend(HEAD_FEATURE_COLUMNS.iter().map(|&col| heatmap[[row, col]]));
    }
    out.extend(heatmap.slice(s![2.., ..]).iter().copied());
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct MinMaxScaler {
    min: Vec<f64>,
    scale: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct LinearHead {
    weights: Vec<f64>,
    bias: f64,
}

impl LinearHead {
    fn score(&self, x: &[f64]) -> f64 {
        self.bias + self.weights.iter().zip(x).map(|(w, v)| w * v).sum::<f64>()
    }
}

#[derive(Debug, Deserialize)]
struct PostureHead {
    classes: Vec<i64>,
    heads: Vec<LinearHead>,
}

#[derive(Debug, Deserialize)]
struct FlagHeads {
    upper_body: LinearHead,
    right_leg: LinearHead,
    left_leg: LinearHead,
    feet: LinearHead,
}

/// Serialized model: min-max scaler, one linear head per posture class
/// (argmax wins) and one linear binary head per raw flag (positive score
/// means set).
#[derive(Debug, Deserialize)]
struct PostureModel {
    scaler: MinMaxScaler,
    posture: PostureHead,
    flags: FlagHeads,
}

impl PostureModel {
    fn load(path: &Path) -> Result<Self, ClassifierError> {
        if !path.exists() {
            return Err(ClassifierError::ArtifactMissing(path.to_path_buf()));
        }
        let raw = fs::read_to_string(path).map_err(|source| ClassifierError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ClassifierError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    fn predict(&self, features: &[f64]) -> Result<RawPrediction, ClassifierError> {
        let expected = self.scaler.min.len();
        if features.len() != expected || self.scaler.scale.len() != expected {
            return Err(ClassifierError::FeatureLength {
                expected,
                actual: features.len(),
            });
        }

        let scaled: Vec<f64> = features
            .iter()
            .zip(&self.scaler.scale)
            .zip(&self.scaler.min)
            .map(|((x, scale), min)| x * scale + min)
            .collect();

        let class_index = self
            .posture
            .classes
            .iter()
            .zip(&self.posture.heads)
            .map(|(&class, head)| (class, head.score(&scaled)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(class, _)| class)
            .unwrap_or(-1);

        Ok(RawPrediction {
            class_index,
            upper_body: self.flags.upper_body.score(&scaled) > 0.0,
            right_leg: self.flags.right_leg.score(&scaled) > 0.0,
            left_leg: self.flags.left_leg.score(&scaled) > 0.0,
            feet: self.flags.feet.score(&scaled) > 0.0,
        })
    }
}

/// [`Classifier`] backed by a JSON model file. The file is read on first use
/// and kept once it loads; a failed load is retried on the next call.
pub struct ModelFileClassifier {
    path: PathBuf,
    model: OnceLock<PostureModel>,
}

impl ModelFileClassifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            model: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn model(&self) -> Result<&PostureModel, ClassifierError> {
        if let Some(model) = self.model.get() {
            return Ok(model);
        }
        let loaded = PostureModel::load(&self.path)?;
        log::info!("Loaded posture model from {}", self.path.display());
        Ok(self.model.get_or_init(|| loaded))
    }
}

impl Classifier for ModelFileClassifier {
    fn classify(&self, features: &[f64]) -> Result<RawPrediction, ClassifierError> {
        self.model()?.predict(features)
    }
}
