use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{CropError, CropResult};
use crate::geometric::crop_class::{CropClass, CLASS_COUNT};
use crate::geometric::features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};

/// How the artifact was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetadata {
    pub samples: usize,
    pub holdout_samples: usize,
    pub seed: u64,
    pub label_noise: f64,
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
    /// Hold-out accuracy in percent
    pub accuracy: f64,
    /// Hold-out accuracy of the NDVI-median threshold rule
    pub baseline_accuracy: f64,
}

/// Multinomial logistic regression over standardized features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model_type: String,
    pub version: String,
    pub classes: Vec<u8>,
    pub feature_names: Vec<String>,
    pub feature_means: Vec<f64>,
    pub feature_scales: Vec<f64>,
    /// One row of `FEATURE_COUNT` weights per class
    pub weights: Vec<Vec<f64>>,
    pub biases: Vec<f64>,
    pub training: TrainingMetadata,
}

impl ModelArtifact {
    /// Load and validate; any failure is `ModelUnavailable`
    pub fn load(path: &Path) -> CropResult<Self> {
        Self::read(path).map_err(|e| CropError::ModelUnavailable(format!("{:#}", e)))
    }

    fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read model artifact {}", path.display()))?;
        let artifact = Self::parse(&content)
            .with_context(|| format!("Invalid model artifact {}", path.display()))?;
        Ok(artifact)
    }

    pub fn from_json(content: &str) -> CropResult<Self> {
        Self::parse(content).map_err(|e| CropError::ModelUnavailable(format!("{:#}", e)))
    }

    fn parse(content: &str) -> Result<Self> {
        let artifact: ModelArtifact =
            serde_json::from_str(content).context("Failed to parse model JSON")?;
        artifact.check_shape()?;
        Ok(artifact)
    }

    fn check_shape(&self) -> Result<()> {
        let expected_classes: Vec<u8> = CropClass::ALL.iter().map(|c| c.id()).collect();
        if self.classes != expected_classes {
            anyhow::bail!(
                "class ids {:?} do not match {:?}",
                self.classes,
                expected_classes
            );
        }
        if self.feature_names != FEATURE_NAMES {
            anyhow::bail!(
                "feature names {:?} do not match {:?}",
                self.feature_names,
                FEATURE_NAMES
            );
        }
        if self.feature_means.len() != FEATURE_COUNT || self.feature_scales.len() != FEATURE_COUNT {
            anyhow::bail!("standardization vectors must have {} entries", FEATURE_COUNT);
        }
        if self.weights.len() != CLASS_COUNT || self.biases.len() != CLASS_COUNT {
            anyhow::bail!("expected {} weight rows and biases", CLASS_COUNT);
        }
        if self.weights.iter().any(|row| row.len() != FEATURE_COUNT) {
            anyhow::bail!("every weight row must have {} entries", FEATURE_COUNT);
        }

        let all_finite = self
            .feature_means
            .iter()
            .chain(&self.feature_scales)
            .chain(self.weights.iter().flatten())
            .chain(&self.biases)
            .all(|v| v.is_finite());
        if !all_finite {
            anyhow::bail!("model parameters contain non-finite values");
        }
        if self.feature_scales.iter().any(|s| *s <= 0.0) {
            anyhow::bail!("feature scales must be positive");
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.check_shape()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize model")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write model artifact {}", path.display()))?;
        Ok(())
    }

    pub fn standardize(&self, features: &FeatureVector) -> [f64; FEATURE_COUNT] {
        let mut z = [0.0; FEATURE_COUNT];
        for (i, value) in features.values().iter().enumerate() {
            z[i] = (value - self.feature_means[i]) / self.feature_scales[i];
        }
        z
    }

    pub fn logits(&self, features: &FeatureVector) -> [f64; CLASS_COUNT] {
        let z = self.standardize(features);
        let mut logits = [0.0; CLASS_COUNT];
        for (k, row) in self.weights.iter().enumerate() {
            logits[k] = self.biases[k] + row.iter().zip(&z).map(|(w, x)| w * x).sum::<f64>();
        }
        logits
    }

    pub fn probabilities(&self, features: &FeatureVector) -> [f64; CLASS_COUNT] {
        softmax(&self.logits(features))
    }
}

/// Softmax with the max logit subtracted first
pub fn softmax<const N: usize>(logits: &[f64; N]) -> [f64; N] {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut out = [0.0; N];
    let mut sum = 0.0;
    for (o, l) in out.iter_mut().zip(logits) {
        *o = (l - max).exp();
        sum += *o;
    }
    for o in out.iter_mut() {
        *o /= sum;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::global_variables::default_model_path;
    use approx::assert_relative_eq;

    #[test]
    fn test_bundled_artifact_loads() {
        let model = ModelArtifact::load(&default_model_path()).unwrap();
        assert_eq!(model.classes, vec![0, 1, 2, 3]);
        assert_eq!(model.weights.len(), 4);
        assert!(model.training.accuracy > model.training.baseline_accuracy);
    }

    #[test]
    fn test_missing_file_is_model_unavailable() {
        let err = ModelArtifact::load(Path::new("/nonexistent/model.json")).unwrap_err();
        assert!(matches!(err, CropError::ModelUnavailable(_)));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let mut model = ModelArtifact::load(&default_model_path()).unwrap();
        model.weights[2].pop();
        let json = serde_json::to_string(&model).unwrap();
        let err = ModelArtifact::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("weight row"));

        assert!(ModelArtifact::from_json("{not json").is_err());
    }

    #[test]
    fn test_non_finite_weights_rejected() {
        let model = ModelArtifact::load(&default_model_path()).unwrap();
        let json = serde_json::to_string(&model)
            .unwrap()
            .replacen("\"biases\":[", "\"biases\":[1e999,", 1);
        assert!(ModelArtifact::from_json(&json).is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let model = ModelArtifact::load(&default_model_path()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("model.json");
        model.save(&path).unwrap();
        assert_eq!(ModelArtifact::load(&path).unwrap(), model);
    }

    #[test]
    fn test_softmax_stable() {
        let p = softmax(&[1000.0, 1000.0, 999.0, -1000.0]);
        assert_relative_eq!(p.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(p[0], p[1]);
        assert!(p[3] < 1e-300 || p[3] == 0.0);
        assert!(p.iter().all(|v| v.is_finite()));
    }
}
