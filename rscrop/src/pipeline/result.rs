use chrono::{DateTime, Utc};
use geojson::FeatureCollection;
use serde::Serialize;
use thiserror::Error;

use super::stages::ProcessingStage;
use crate::classify::{ClassificationResult, ModelPerformance, Suggestion};
use crate::collect::ndvi::{FetchReport, VegetationSample};
use crate::error::{CropError, ErrorKind};
use crate::geo_core::{AdminKind, Region};
use crate::geometric::CropDistribution;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionSummary {
    /// `[south, west, north, east]`
    pub bounds: [f64; 4],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_kind: Option<AdminKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
}

impl From<&Region> for RegionSummary {
    fn from(region: &Region) -> Self {
        RegionSummary {
            bounds: region.bbox().to_swne(),
            admin_name: region.admin_name().map(str::to_string),
            admin_kind: region.admin().map(|a| a.kind),
            district: region.admin().map(|a| a.district.clone()),
        }
    }
}

/// NDVI statistics used for the analysis and where they came from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VegetationSummary {
    #[serde(flatten)]
    pub sample: VegetationSample,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

impl VegetationSummary {
    pub fn new(sample: VegetationSample, report: &FetchReport) -> Self {
        VegetationSummary {
            sample,
            cached: report.cached,
            fallback_reason: report.fallback_reason().map(str::to_string),
        }
    }
}

/// Immutable bundle returned by one analysis, successful or not
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<RegionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<ClassificationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution: Option<CropDistribution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spatial_features: Option<FeatureCollection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_area_hectares: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_performance: Option<ModelPerformance>,
    pub improvement_suggestions: Vec<Suggestion>,
    pub processing_stages: Vec<ProcessingStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vegetation: Option<VegetationSummary>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<String>,
}

/// Typed failure of [`crate::pipeline::Pipeline::analyze`]; carries the
/// stages that ran before the error.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct AnalysisFailure {
    pub error: CropError,
    pub stages: Vec<ProcessingStage>,
    pub failed_stage: Option<String>,
    pub region: Option<RegionSummary>,
}

impl AnalysisFailure {
    /// Validation failure before any stage ran
    pub fn early(error: CropError) -> Self {
        AnalysisFailure {
            error,
            stages: Vec::new(),
            failed_stage: None,
            region: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    pub fn into_result(self) -> AnalysisResult {
        AnalysisResult {
            success: false,
            region: self.region,
            classification: None,
            distribution: None,
            spatial_features: None,
            total_area_hectares: None,
            grid_size: None,
            model_performance: None,
            improvement_suggestions: Vec::new(),
            processing_stages: self.stages,
            vegetation: None,
            timestamp: Utc::now(),
            error: Some(self.error.to_string()),
            error_kind: Some(self.error.kind()),
            failed_stage: self.failed_stage,
        }
    }
}
