//! Crop classifier: a pre-trained multinomial logistic model over the
//! feature vector, its performance summary and the improvement suggestions
//! attached to each analysis.

pub mod classifier;
pub mod model;
pub mod suggestions;
pub mod training;

pub use classifier::{ClassProbability, ClassificationResult, CropClassifier, ModelPerformance};
pub use model::ModelArtifact;
pub use suggestions::{Priority, Suggestion, SuggestionPolicy};
