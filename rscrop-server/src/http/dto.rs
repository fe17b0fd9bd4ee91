//! Data Transfer Objects for the HTTP API.
//!
//! The analysis route serializes `rscrop::AnalysisResult` directly; these
//! cover the health and lookup routes.

use rscrop::collect::admin::TalukInfo;
use rscrop::collect::ndvi::CacheStats;
use rscrop::geometric::CropInfo;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    /// Name of the NDVI provider tried first
    pub data_source: &'static str,
    pub model_loaded: bool,
    pub cache: CacheStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistrictListResponse {
    pub districts: Vec<String>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TalukListResponse {
    pub district: String,
    pub taluks: Vec<TalukInfo>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CropInfoResponse {
    pub crops: Vec<CropInfo>,
}
