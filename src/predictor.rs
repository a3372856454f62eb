// ==============================================================================
// predictor.rs - Model Dispatcher / Predictor
// ==============================================================================
// Description: Organ validation, organ -> model routing, linear classifier
//              artifacts and per-variant probabilities
// Author: Matt Barham
// Created: 2026-09-16
// Modified: 2026-10-10
// Version: 1.2.0
// ==============================================================================
// Model artifact (JSON):
//   {"name": "TLand", "kind": "ridge", "intercept": -0.4,
//    "features": [{"name": "CHIP", "coefficient": 0.8, "fill_value": 0.0}, ...]}
// Probabilities:
//   ridge        softmax([-d, d])[1] = 1 / (1 + e^(-2d))
//   logistic     1 / (1 + e^(-d))
//   passthrough  value of the first feature column
// ==============================================================================

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{FeatureMatrix, Variant};

/// Sentinel organ accepted in addition to the organ list
pub const ALL_ORGANS: &str = "all";

/// Organs with enough TF ChIP-seq experiments for the full model
pub const DATA_RICH_ORGANS: [&str; 13] = [
    "epithelium",
    "blood",
    "bodily fluid",
    "exocrine gland",
    "endocrine gland",
    "liver",
    "lung",
    "kidney",
    "mammary gland",
    "brain",
    "connective tissue",
    "skin of body",
    "uterus",
];

#[derive(Error, Debug, PartialEq)]
pub enum DispatchError {
    #[error("Argument {organ} is not valid. Must be one of {allowed:?}.")]
    InvalidOrgan { organ: String, allowed: Vec<String> },
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read model artifact {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid model artifact {path}: {source}")]
    InvalidArtifact {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Model '{model}' expects feature '{feature}', which is missing from the matrix")]
    MissingFeature { model: String, feature: String },

    #[error("Model '{0}' has no features")]
    NoFeatures(String),
}

/// Check the organ against the organ list (plus `all`) before any work is done
pub fn validate_organ(organ: &str, organ_list: &[String]) -> Result<(), DispatchError> {
    if organ == ALL_ORGANS || organ_list.iter().any(|o| o == organ) {
        return Ok(());
    }

    let mut allowed = organ_list.to_vec();
    allowed.push(ALL_ORGANS.to_string());
    Err(DispatchError::InvalidOrgan {
        organ: organ.to_string(),
        allowed,
    })
}

/// Which of the two shipped models scores an organ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelTier {
    Full,
    Lightest,
}

impl ModelTier {
    pub fn file_name(&self) -> &'static str {
        match self {
            ModelTier::Full => "model_full.json",
            ModelTier::Lightest => "model_lightest.json",
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelTier::Full => write!(f, "full"),
            ModelTier::Lightest => write!(f, "lightest"),
        }
    }
}

/// Organ -> tier table; organs not listed as data-rich use the lightest model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRouting {
    data_rich: HashSet<String>,
}

impl Default for ModelRouting {
    fn default() -> Self {
        Self::new(DATA_RICH_ORGANS.iter().map(|o| o.to_string()))
    }
}

impl ModelRouting {
    pub fn new(data_rich: impl IntoIterator<Item = String>) -> Self {
        Self {
            data_rich: data_rich.into_iter().collect(),
        }
    }

    /// Replace the built-in table with a newline-delimited organ file
    pub fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let organs = crate::parsers::load_organ_list(path)?;
        Ok(Self::new(organs))
    }

    pub fn tier(&self, organ: &str) -> ModelTier {
        if self.data_rich.contains(organ) {
            ModelTier::Full
        } else {
            ModelTier::Lightest
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierKind {
    Ridge,
    Logistic,
    Passthrough,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeight {
    pub name: String,
    #[serde(default)]
    pub coefficient: f64,
    /// Replaces null cells
    #[serde(default)]
    pub fill_value: f64,
}

/// A serialized linear classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub name: String,
    pub kind: ClassifierKind,
    #[serde(default)]
    pub intercept: f64,
    pub features: Vec<FeatureWeight>,
}

impl ModelArtifact {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| ModelError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        let artifact: Self =
            serde_json::from_slice(&bytes).map_err(|source| ModelError::InvalidArtifact {
                path: path.to_path_buf(),
                source,
            })?;

        let digest = format!("{:x}", Sha256::digest(&bytes));
        info!(
            "Loaded model '{}' ({:?}, {} features) from {:?} sha256={}",
            artifact.name,
            artifact.kind,
            artifact.features.len(),
            path,
            digest
        );
        Ok(artifact)
    }

    /// Decision function value for every row
    fn decision(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>, ModelError> {
        let mut scores = vec![self.intercept; matrix.len()];
        for weight in &self.features {
            let column = matrix
                .column(&weight.name)
                .ok_or_else(|| ModelError::MissingFeature {
                    model: self.name.clone(),
                    feature: weight.name.clone(),
                })?;
            for (score, value) in scores.iter_mut().zip(&column.values) {
                *score += weight.coefficient * value.unwrap_or(weight.fill_value);
            }
        }
        Ok(scores)
    }
}

/// A fitted model that scores a feature matrix
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    fn expected_features(&self) -> Vec<&str>;

    /// Positive-class probability for every row of the matrix
    fn predict_probability(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>, ModelError>;
}

impl Classifier for ModelArtifact {
    fn name(&self) -> &str {
        &self.name
    }

    fn expected_features(&self) -> Vec<&str> {
        self.features.iter().map(|f| f.name.as_str()).collect()
    }

    fn predict_probability(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>, ModelError> {
        match self.kind {
            ClassifierKind::Ridge => Ok(self
                .decision(matrix)?
                .into_iter()
                .map(|d| 1.0 / (1.0 + (-2.0 * d).exp()))
                .collect()),
            ClassifierKind::Logistic => Ok(self
                .decision(matrix)?
                .into_iter()
                .map(|d| 1.0 / (1.0 + (-d).exp()))
                .collect()),
            ClassifierKind::Passthrough => {
                let weight = self
                    .features
                    .first()
                    .ok_or_else(|| ModelError::NoFeatures(self.name.clone()))?;
                let column = matrix
                    .column(&weight.name)
                    .ok_or_else(|| ModelError::MissingFeature {
                        model: self.name.clone(),
                        feature: weight.name.clone(),
                    })?;
                Ok(column
                    .values
                    .iter()
                    .map(|v| v.unwrap_or(weight.fill_value))
                    .collect())
            }
        }
    }
}

/// The full and lightest models
pub struct ModelSet {
    pub full: Box<dyn Classifier>,
    pub lightest: Box<dyn Classifier>,
}

impl ModelSet {
    pub fn load(models_dir: impl AsRef<Path>) -> Result<Self, ModelError> {
        let dir = models_dir.as_ref();
        Ok(Self {
            full: Box::new(ModelArtifact::load(dir.join(ModelTier::Full.file_name()))?),
            lightest: Box::new(ModelArtifact::load(dir.join(ModelTier::Lightest.file_name()))?),
        })
    }

    pub fn get(&self, tier: ModelTier) -> &dyn Classifier {
        match tier {
            ModelTier::Full => self.full.as_ref(),
            ModelTier::Lightest => self.lightest.as_ref(),
        }
    }
}

/// Per-variant predictions for one organ
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionTable {
    /// `{organ}_{model_name}`
    pub column: String,
    pub variants: Vec<Variant>,
    pub values: Vec<f64>,
}

/// Routes an organ to its model and scores the assembled matrix
pub struct Predictor {
    pub routing: ModelRouting,
    pub models: ModelSet,
}

impl Predictor {
    pub fn new(routing: ModelRouting, models: ModelSet) -> Self {
        Self { routing, models }
    }

    pub fn predict(&self, organ: &str, matrix: &FeatureMatrix) -> Result<PredictionTable, ModelError> {
        let tier = self.routing.tier(organ);
        let model = self.models.get(tier);
        info!(
            "Predicting {} variants for '{}' with the {} model '{}'",
            matrix.len(),
            organ,
            tier,
            model.name()
        );
        debug!("Model features: {:?}", model.expected_features());

        let values = model.predict_probability(matrix)?;
        Ok(PredictionTable {
            column: format!("{}_{}", organ, model.name()),
            variants: matrix.variants.clone(),
            values,
        })
    }
}
