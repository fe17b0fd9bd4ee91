use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use super::model::ModelArtifact;
use super::suggestions::{Suggestion, SuggestionPolicy};
use crate::commons::basic_functions::round_to;
use crate::error::{CropError, CropResult};
use crate::geometric::crop_class::{CropClass, CLASS_COUNT};
use crate::geometric::features::{FeatureVector, FEATURE_COUNT};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassProbability {
    pub crop_id: u8,
    pub crop_name: String,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    #[serde(skip)]
    pub primary: CropClass,
    /// Softmax output indexed by class id; sums to 1
    #[serde(skip)]
    pub probabilities: [f64; CLASS_COUNT],
    pub primary_class: String,
    pub primary_class_id: u8,
    pub confidence_percent: f64,
    pub per_class_confidence: Vec<ClassProbability>,
}

impl ClassificationResult {
    /// Argmax over `probabilities`; ties go to the lowest class id
    pub fn from_probabilities(probabilities: [f64; CLASS_COUNT]) -> Self {
        let mut best = 0;
        for (i, p) in probabilities.iter().enumerate() {
            if *p > probabilities[best] {
                best = i;
            }
        }
        let primary = CropClass::ALL[best];
        ClassificationResult {
            primary,
            probabilities,
            primary_class: primary.name().to_string(),
            primary_class_id: primary.id(),
            confidence_percent: round_to(probabilities[best] * 100.0, 2),
            per_class_confidence: CropClass::ALL
                .iter()
                .map(|c| ClassProbability {
                    crop_id: c.id(),
                    crop_name: c.name().to_string(),
                    probability: round_to(probabilities[c.index()], 4),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPerformance {
    pub current_accuracy: f64,
    pub baseline_accuracy: f64,
    /// Relative gain over the baseline in percent
    pub improvement_pct: f64,
    pub feature_count: usize,
    pub model_type: String,
    pub training_samples: usize,
}

/// Immutable classifier shared across analyses
#[derive(Debug, Clone)]
pub struct CropClassifier {
    model: Arc<ModelArtifact>,
    policy: SuggestionPolicy,
}

impl CropClassifier {
    pub fn new(model: Arc<ModelArtifact>) -> Self {
        CropClassifier {
            model,
            policy: SuggestionPolicy::default(),
        }
    }

    pub fn load(path: &Path) -> CropResult<Self> {
        Ok(Self::new(Arc::new(ModelArtifact::load(path)?)))
    }

    pub fn with_policy(mut self, policy: SuggestionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn model(&self) -> &ModelArtifact {
        &self.model
    }

    pub fn classify(&self, features: &FeatureVector) -> CropResult<ClassificationResult> {
        if !features.is_finite() {
            return Err(CropError::Internal(
                "feature vector contains non-finite values".to_string(),
            ));
        }
        let probabilities = self.model.probabilities(features);
        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(CropError::Internal(
                "model produced non-finite probabilities".to_string(),
            ));
        }
        Ok(ClassificationResult::from_probabilities(probabilities))
    }

    pub fn model_performance(&self) -> ModelPerformance {
        let training = &self.model.training;
        let improvement = if training.baseline_accuracy > 0.0 {
            (training.accuracy - training.baseline_accuracy) / training.baseline_accuracy * 100.0
        } else {
            0.0
        };
        ModelPerformance {
            current_accuracy: training.accuracy,
            baseline_accuracy: training.baseline_accuracy,
            improvement_pct: round_to(improvement, 2),
            feature_count: FEATURE_COUNT,
            model_type: self.model.model_type.clone(),
            training_samples: training.samples,
        }
    }

    pub fn improvement_suggestions(&self, confidence_percent: f64) -> Vec<Suggestion> {
        self.policy.evaluate(confidence_percent)
    }
}
