use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{info, warn};

use super::result::{AnalysisFailure, AnalysisResult, RegionSummary, VegetationSummary};
use super::stages::{
    AnalysisState, StageLog, STAGE_FEATURES, STAGE_FETCH, STAGE_MAP, STAGE_PREDICTION,
};
use crate::classify::CropClassifier;
use crate::collect::admin::{AdminDataset, BoundaryResolver, RegionSelector};
use crate::collect::ndvi::VegetationDataSource;
use crate::config::{Settings, DEFAULT_GRID_SIZE};
use crate::error::{CropError, CropResult};
use crate::geometric::distribution::{synthesize, validate_grid_size};
use crate::geometric::features::extract;

/// Body of an analysis request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    #[serde(flatten)]
    pub selector: RegionSelector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_size: Option<usize>,
}

impl AnalysisRequest {
    pub fn new(selector: RegionSelector) -> Self {
        AnalysisRequest {
            selector,
            grid_size: None,
        }
    }

    pub fn with_grid_size(mut self, grid_size: usize) -> Self {
        self.grid_size = Some(grid_size);
        self
    }
}

/// Classifier load outcome. A missing model is kept as a reason so every
/// analysis reports it instead of the process refusing to start.
#[derive(Debug, Clone)]
enum ModelSlot {
    Loaded(Arc<CropClassifier>),
    Unavailable(String),
}

/// Runs resolve → fetch → extract → classify → synthesize.
///
/// Holds only shared immutable state and the data source cache, so one
/// instance serves concurrent analyses.
pub struct Pipeline {
    resolver: BoundaryResolver,
    source: VegetationDataSource,
    model: ModelSlot,
    default_grid_size: usize,
}

impl Pipeline {
    pub fn new(
        resolver: BoundaryResolver,
        source: VegetationDataSource,
        classifier: CropResult<CropClassifier>,
    ) -> Self {
        let model = match classifier {
            Ok(classifier) => ModelSlot::Loaded(Arc::new(classifier)),
            Err(e) => {
                warn!(error = %e, "crop classifier unavailable");
                match e {
                    CropError::ModelUnavailable(reason) => ModelSlot::Unavailable(reason),
                    other => ModelSlot::Unavailable(other.to_string()),
                }
            }
        };
        Pipeline {
            resolver,
            source,
            model,
            default_grid_size: DEFAULT_GRID_SIZE,
        }
    }

    pub fn with_default_grid_size(mut self, grid_size: usize) -> Self {
        self.default_grid_size = grid_size;
        self
    }

    /// Build every component from settings. Only a broken administrative
    /// dataset is an error here; a missing model is reported per analysis.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let dataset = match &settings.dataset.directory {
            Some(dir) => AdminDataset::from_dir(dir)?,
            None => AdminDataset::bundled()?,
        };
        let resolver = BoundaryResolver::new(Arc::new(dataset), settings.limits.max_span_degrees);
        let source = VegetationDataSource::from_settings(settings);
        let classifier = CropClassifier::load(&settings.model.path)
            .map(|c| c.with_policy(settings.suggestions.clone()));

        info!(
            data_source = source.primary_name(),
            model = %settings.model.path.display(),
            "analysis pipeline ready"
        );
        Ok(Self::new(resolver, source, classifier)
            .with_default_grid_size(settings.limits.default_grid_size))
    }

    pub fn resolver(&self) -> &BoundaryResolver {
        &self.resolver
    }

    pub fn data_source(&self) -> &VegetationDataSource {
        &self.source
    }

    pub fn classifier(&self) -> Option<&CropClassifier> {
        match &self.model {
            ModelSlot::Loaded(classifier) => Some(classifier),
            ModelSlot::Unavailable(_) => None,
        }
    }

    pub fn model_loaded(&self) -> bool {
        matches!(self.model, ModelSlot::Loaded(_))
    }

    /// Never returns an error or unwinds: every failure, including a panic
    /// inside a stage, becomes a result with `success: false`.
    pub fn run_analysis(&self, selector: &RegionSelector, grid_size: Option<usize>) -> AnalysisResult {
        let request = AnalysisRequest {
            selector: selector.clone(),
            grid_size,
        };
        match panic::catch_unwind(AssertUnwindSafe(|| self.analyze(&request))) {
            Ok(Ok(result)) => result,
            Ok(Err(failure)) => failure.into_result(),
            Err(_) => AnalysisFailure::early(CropError::Internal(
                "analysis aborted unexpectedly".to_string(),
            ))
            .into_result(),
        }
    }

    pub fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, AnalysisFailure> {
        let grid_size = request.grid_size.unwrap_or(self.default_grid_size);
        validate_grid_size(grid_size).map_err(AnalysisFailure::early)?;

        let mut log = StageLog::new();
        let step = |log: &mut StageLog, state| log.advance(state).map_err(AnalysisFailure::early);

        step(&mut log, AnalysisState::Resolving)?;
        // the first stage times resolution and fetching together; a resolver
        // error leaves no stage behind
        log.begin(STAGE_FETCH);
        let region = match self.resolver.resolve(&request.selector) {
            Ok(region) => region,
            Err(e) => {
                log.discard();
                return Err(AnalysisFailure::early(e));
            }
        };
        let summary = RegionSummary::from(&region);

        // from here on failures keep the stage log
        let fail = |mut log: StageLog, error: CropError| {
            let failed_stage = log.fail(error.to_string()).map(str::to_string);
            warn!(
                region = %region.bbox(),
                stage = failed_stage.as_deref().unwrap_or("-"),
                error = %error,
                "analysis failed"
            );
            AnalysisFailure {
                error,
                stages: log.into_stages(),
                failed_stage,
                region: Some(summary.clone()),
            }
        };

        step(&mut log, AnalysisState::Fetching)?;
        let (sample, report) = match self.source.fetch(&region) {
            Ok(fetched) => fetched,
            Err(e) => return Err(fail(log, e)),
        };
        log.complete(report.describe(&sample));
        info!(
            region = %region.bbox(),
            origin = %report.origin(),
            cached = report.cached,
            "NDVI fetched"
        );

        step(&mut log, AnalysisState::Extracting)?;
        log.begin(STAGE_FEATURES);
        let features = extract(&sample, &region);
        log.complete(format!(
            "Extracted {} features (NDVI median {:.3}, IQR {:.3}, {} scenes)",
            features.values().len(),
            features.values()[0],
            features.values()[3],
            sample.image_count
        ));

        step(&mut log, AnalysisState::Classifying)?;
        log.begin(STAGE_PREDICTION);
        let classifier = match &self.model {
            ModelSlot::Loaded(classifier) => Arc::clone(classifier),
            ModelSlot::Unavailable(reason) => {
                return Err(fail(log, CropError::ModelUnavailable(reason.clone())));
            }
        };
        let classification = match classifier.classify(&features) {
            Ok(classification) => classification,
            Err(e) => return Err(fail(log, e)),
        };
        log.complete(format!(
            "Predicted crop: {} with {}% confidence",
            classification.primary_class, classification.confidence_percent
        ));
        info!(
            primary = %classification.primary_class,
            confidence = classification.confidence_percent,
            "region classified"
        );

        step(&mut log, AnalysisState::Synthesizing)?;
        log.begin(STAGE_MAP);
        let output = match synthesize(&classification, &region, grid_size) {
            Ok(output) => output,
            Err(e) => return Err(fail(log, e)),
        };
        log.complete(format!(
            "Generated crop distribution map for {:.2} hectares ({}x{} cells)",
            output.total_area_hectares, grid_size, grid_size
        ));
        step(&mut log, AnalysisState::Complete)?;

        let suggestions = classifier.improvement_suggestions(classification.confidence_percent);
        Ok(AnalysisResult {
            success: true,
            region: Some(summary),
            model_performance: Some(classifier.model_performance()),
            improvement_suggestions: suggestions,
            classification: Some(classification),
            distribution: Some(output.distribution),
            spatial_features: Some(output.features),
            total_area_hectares: Some(output.total_area_hectares),
            grid_size: Some(output.grid_size),
            processing_stages: log.into_stages(),
            vegetation: Some(VegetationSummary::new(sample, &report)),
            timestamp: Utc::now(),
            error: None,
            error_kind: None,
            failed_stage: None,
        })
    }
}
