use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

#[cfg(feature = "indicatif")]
use indicatif::{ProgressBar, ProgressStyle};

use super::model::{softmax, ModelArtifact, TrainingMetadata};
use crate::commons::basic_functions::round_to;
use crate::geometric::crop_class::{CropClass, CLASS_COUNT};
use crate::geometric::features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};

pub const MODEL_TYPE: &str = "Multinomial Logistic Regression";

#[cfg(feature = "indicatif")]
fn progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {percent} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    pub samples: usize,
    /// Share of samples held out for the reported accuracy
    pub holdout_fraction: f64,
    pub seed: u64,
    pub label_noise: f64,
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
    pub version: String,
    pub show_progress: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            samples: 1600,
            holdout_fraction: 0.25,
            seed: 42,
            label_noise: 0.10,
            epochs: 1000,
            learning_rate: 1.0,
            l2: 1e-3,
            version: chrono::Utc::now().format("%Y.%m.%d").to_string(),
            show_progress: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabeledSample {
    pub features: FeatureVector,
    pub label: CropClass,
}

/// Agronomic labelling rule of the synthetic dataset
pub fn label_rule(median: f64, amplitude: f64, irrigation: f64) -> CropClass {
    if median >= 0.6 || (median >= 0.5 && irrigation >= 0.5) {
        CropClass::Paddy
    } else if median >= 0.35 && amplitude >= 0.15 {
        CropClass::MilletsPulses
    } else if median >= 0.35 {
        CropClass::CashCrops
    } else {
        CropClass::Fallow
    }
}

/// NDVI-median threshold rule the model is compared against
pub fn baseline_rule(median: f64) -> CropClass {
    if median >= 0.6 {
        CropClass::Paddy
    } else if median >= 0.35 {
        CropClass::CashCrops
    } else {
        CropClass::Fallow
    }
}

/// Seeded labelled feature vectors; `label_noise` of the labels are
/// redrawn uniformly over all classes.
pub fn synthetic_dataset(samples: usize, seed: u64, label_noise: f64) -> Vec<LabeledSample> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..samples)
        .map(|_| {
            let median: f64 = rng.gen_range(0.05..0.85);
            let spread: f64 = rng.gen_range(0.05..0.20);
            let p25 = (median - spread).max(-1.0);
            let p75 = (median + spread).min(1.0);
            let mean = median - spread * rng.gen_range(0.0f64..0.2);
            let std = spread / 0.6745;
            let amplitude: f64 = rng.gen_range(0.0..0.3);
            let trend: f64 = rng.gen_range(-0.02..0.02);
            let density: f64 = rng.gen_range(0.15..0.7);
            let area: f64 = rng.gen_range(0.3..1.0);
            let irrigation: f64 = rng.gen_range(0.1..0.7);
            let rainfall: f64 = rng.gen_range(0.2..0.9);

            let mut label = label_rule(median, amplitude, irrigation);
            if rng.gen::<f64>() < label_noise {
                label = CropClass::ALL[rng.gen_range(0..CLASS_COUNT)];
            }

            LabeledSample {
                features: FeatureVector([
                    median,
                    p25,
                    p75,
                    p75 - p25,
                    mean,
                    std,
                    amplitude,
                    trend,
                    density,
                    area,
                    irrigation,
                    rainfall,
                ]),
                label,
            }
        })
        .collect()
}

/// Percentage of samples whose argmax matches the label
pub fn accuracy(model: &ModelArtifact, samples: &[LabeledSample]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let correct = samples
        .iter()
        .filter(|s| argmax(&model.probabilities(&s.features)) == s.label.index())
        .count();
    correct as f64 / samples.len() as f64 * 100.0
}

pub fn baseline_accuracy(samples: &[LabeledSample]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let correct = samples
        .iter()
        .filter(|s| baseline_rule(s.features.0[0]) == s.label)
        .count();
    correct as f64 / samples.len() as f64 * 100.0
}

fn argmax(values: &[f64; CLASS_COUNT]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// Fit the softmax model by full-batch gradient descent with L2
pub fn train(config: &TrainingConfig) -> Result<ModelArtifact> {
    if config.samples < 10 {
        anyhow::bail!("need at least 10 samples, got {}", config.samples);
    }
    if !(0.0..1.0).contains(&config.holdout_fraction) {
        anyhow::bail!("holdout fraction must be in [0, 1)");
    }

    let dataset = synthetic_dataset(config.samples, config.seed, config.label_noise);
    let holdout_len = (config.samples as f64 * config.holdout_fraction).round() as usize;
    let (train_set, holdout) = dataset.split_at(config.samples - holdout_len);
    info!(
        train = train_set.len(),
        holdout = holdout.len(),
        "training crop classifier"
    );

    let n = train_set.len() as f64;
    let mut means = [0.0; FEATURE_COUNT];
    let mut scales = [0.0; FEATURE_COUNT];
    for s in train_set {
        for (m, v) in means.iter_mut().zip(s.features.values()) {
            *m += v / n;
        }
    }
    for s in train_set {
        for (j, v) in s.features.values().iter().enumerate() {
            scales[j] += (v - means[j]).powi(2) / n;
        }
    }
    for s in scales.iter_mut() {
        *s = if *s > 0.0 { s.sqrt() } else { 1.0 };
    }

    let standardized: Vec<[f64; FEATURE_COUNT]> = train_set
        .iter()
        .map(|s| {
            let mut z = [0.0; FEATURE_COUNT];
            for (j, v) in s.features.values().iter().enumerate() {
                z[j] = (v - means[j]) / scales[j];
            }
            z
        })
        .collect();

    let mut weights = [[0.0f64; FEATURE_COUNT]; CLASS_COUNT];
    let mut biases = [0.0f64; CLASS_COUNT];

    #[cfg(feature = "indicatif")]
    let pb = if config.show_progress {
        let pb = ProgressBar::new(config.epochs as u64);
        pb.set_style(progress_style());
        pb
    } else {
        ProgressBar::hidden()
    };

    for _ in 0..config.epochs {
        let mut grad_w = [[0.0f64; FEATURE_COUNT]; CLASS_COUNT];
        let mut grad_b = [0.0f64; CLASS_COUNT];
        for (z, sample) in standardized.iter().zip(train_set) {
            let mut logits = biases;
            for (k, row) in weights.iter().enumerate() {
                logits[k] += row.iter().zip(z).map(|(w, x)| w * x).sum::<f64>();
            }
            let p = softmax(&logits);
            for k in 0..CLASS_COUNT {
                let target = if sample.label.index() == k { 1.0 } else { 0.0 };
                let err = p[k] - target;
                grad_b[k] += err / n;
                for j in 0..FEATURE_COUNT {
                    grad_w[k][j] += err * z[j] / n;
                }
            }
        }
        for k in 0..CLASS_COUNT {
            biases[k] -= config.learning_rate * grad_b[k];
            for j in 0..FEATURE_COUNT {
                weights[k][j] -= config.learning_rate * (grad_w[k][j] + config.l2 * weights[k][j]);
            }
        }
        #[cfg(feature = "indicatif")]
        pb.inc(1);
    }

    #[cfg(feature = "indicatif")]
    pb.finish_with_message("trained");

    let mut model = ModelArtifact {
        model_type: MODEL_TYPE.to_string(),
        version: config.version.clone(),
        classes: CropClass::ALL.iter().map(|c| c.id()).collect(),
        feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
        feature_means: means.to_vec(),
        feature_scales: scales.to_vec(),
        weights: weights.iter().map(|row| row.to_vec()).collect(),
        biases: biases.to_vec(),
        training: TrainingMetadata {
            samples: config.samples,
            holdout_samples: holdout.len(),
            seed: config.seed,
            label_noise: config.label_noise,
            epochs: config.epochs,
            learning_rate: config.learning_rate,
            l2: config.l2,
            accuracy: 0.0,
            baseline_accuracy: 0.0,
        },
    };

    // no holdout: report on the training set
    let evaluation = if holdout.is_empty() { train_set } else { holdout };
    model.training.accuracy = round_to(accuracy(&model, evaluation), 2);
    model.training.baseline_accuracy = round_to(baseline_accuracy(evaluation), 2);
    info!(
        accuracy = model.training.accuracy,
        baseline = model.training.baseline_accuracy,
        "training finished"
    );
    Ok(model)
}
