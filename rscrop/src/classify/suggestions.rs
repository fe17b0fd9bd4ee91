use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// When a rule applies, against the confidence in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Below(f64),
    AtLeast(f64),
    Always,
}

impl Condition {
    pub fn matches(&self, confidence_percent: f64) -> bool {
        match *self {
            Condition::Below(threshold) => confidence_percent < threshold,
            Condition::AtLeast(threshold) => confidence_percent >= threshold,
            Condition::Always => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionRule {
    pub when: Condition,
    pub priority: Priority,
    pub suggestion: String,
    pub expected_improvement: String,
    pub details: String,
}

/// Suggestion as returned with an analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub priority: Priority,
    pub suggestion: String,
    pub expected_improvement: String,
    pub details: String,
}

/// Ordered rule table, configurable under `[suggestions]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionPolicy {
    pub rules: Vec<SuggestionRule>,
}

fn rule(when: Condition, priority: Priority, suggestion: &str, gain: &str, details: &str) -> SuggestionRule {
    SuggestionRule {
        when,
        priority,
        suggestion: suggestion.to_string(),
        expected_improvement: gain.to_string(),
        details: details.to_string(),
    }
}

impl Default for SuggestionPolicy {
    fn default() -> Self {
        SuggestionPolicy {
            rules: vec![
                rule(
                    Condition::Below(80.0),
                    Priority::High,
                    "Collect more training data for this region",
                    "5-8%",
                    "Low confidence predictions can be improved by adding more labeled samples from similar geographic areas.",
                ),
                rule(
                    Condition::Always,
                    Priority::Medium,
                    "Add multi-temporal satellite imagery",
                    "3-5%",
                    "Including imagery from different seasons can capture crop growth patterns and improve classification accuracy.",
                ),
                rule(
                    Condition::Always,
                    Priority::Medium,
                    "Incorporate additional spectral indices",
                    "2-4%",
                    "Adding EVI, SAVI, and NDWI indices alongside NDVI can provide complementary vegetation information.",
                ),
                rule(
                    Condition::AtLeast(85.0),
                    Priority::Low,
                    "Fine-tune hyperparameters",
                    "1-2%",
                    "Model is performing well. Further gains possible through a search over regularization strength and learning rate.",
                ),
                rule(
                    Condition::Below(85.0),
                    Priority::High,
                    "Explore deep learning models",
                    "8-12%",
                    "CNN-based models can extract spatial features from satellite imagery patches for improved accuracy.",
                ),
                rule(
                    Condition::Always,
                    Priority::Low,
                    "Use ensemble methods",
                    "2-3%",
                    "Combining the logistic model with gradient-boosted trees can leverage strengths of multiple algorithms.",
                ),
            ],
        }
    }
}

impl SuggestionPolicy {
    /// Matching rules, high priority first; table order within a priority
    pub fn evaluate(&self, confidence_percent: f64) -> Vec<Suggestion> {
        let mut suggestions: Vec<Suggestion> = self
            .rules
            .iter()
            .filter(|r| r.when.matches(confidence_percent))
            .map(|r| Suggestion {
                priority: r.priority,
                suggestion: r.suggestion.clone(),
                expected_improvement: r.expected_improvement.clone(),
                details: r.details.clone(),
            })
            .collect();
        // stable
        suggestions.sort_by_key(|s| s.priority);
        suggestions
    }
}
