//! HTTP request handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use geojson::Feature;
use rscrop::geometric::crop_catalog;
use rscrop::pipeline::AnalysisFailure;
use rscrop::{AnalysisRequest, AnalysisResult, CropError};
use std::sync::Arc;
use tracing::{error, info};

use super::dto::*;
use super::error::{status_for_kind, AppError};
use super::state::AppState;

/// Result type for lookup handlers
pub type HandlerResult<T> = Result<Json<T>, AppError>;

fn required_name(value: &str, what: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{} name must not be blank", what)));
    }
    Ok(())
}

// =============================================================================
// Health Check
// =============================================================================

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let pipeline = &state.pipeline;
    Json(HealthResponse {
        status: "ok",
        data_source: pipeline.data_source().primary_name(),
        model_loaded: pipeline.model_loaded(),
        cache: pipeline.data_source().cache_stats(),
    })
}

// =============================================================================
// Analysis
// =============================================================================

/// POST /api/analyze
///
/// The body is always an `AnalysisResult`; the status code follows its
/// error kind.
pub async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalysisRequest>, JsonRejection>,
) -> (StatusCode, Json<AnalysisResult>) {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let failure = AnalysisFailure::early(CropError::InvalidParameter(format!(
                "malformed analysis request: {}",
                rejection.body_text()
            )));
            return (StatusCode::BAD_REQUEST, Json(failure.into_result()));
        }
    };

    let pipeline = Arc::clone(&state.pipeline);
    let result = tokio::task::spawn_blocking(move || {
        pipeline.run_analysis(&request.selector, request.grid_size)
    })
    .await
    .unwrap_or_else(|e| {
        error!(error = %e, "analysis task failed");
        AnalysisFailure::early(CropError::Internal(format!("analysis task failed: {}", e)))
            .into_result()
    });

    let status = match result.error_kind {
        None => StatusCode::OK,
        Some(kind) => status_for_kind(kind),
    };
    info!(
        status = status.as_u16(),
        success = result.success,
        stages = result.processing_stages.len(),
        "analysis request served"
    );
    (status, Json(result))
}

// =============================================================================
// Administrative lookups
// =============================================================================

/// GET /api/districts
pub async fn list_districts(State(state): State<AppState>) -> HandlerResult<DistrictListResponse> {
    let districts = state.pipeline.resolver().dataset().districts();
    Ok(Json(DistrictListResponse {
        total: districts.len(),
        districts,
    }))
}

/// GET /api/district-boundary/{name}
pub async fn district_boundary(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> HandlerResult<Feature> {
    required_name(&name, "District")?;
    state
        .pipeline
        .resolver()
        .dataset()
        .district_boundary(&name)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("District '{}' not found", name)))
}

/// GET /api/taluks/{district}
pub async fn list_taluks(
    State(state): State<AppState>,
    Path(district): Path<String>,
) -> HandlerResult<TalukListResponse> {
    required_name(&district, "District")?;
    let dataset = state.pipeline.resolver().dataset();
    let record = dataset
        .find_district(&district)
        .ok_or_else(|| AppError::NotFound(format!("District '{}' not found", district)))?;
    let taluks = dataset.taluks(&record.name);
    Ok(Json(TalukListResponse {
        district: record.name.clone(),
        total: taluks.len(),
        taluks,
    }))
}

// =============================================================================
// Crop catalog
// =============================================================================

/// GET /api/crop-info
pub async fn crop_info() -> Json<CropInfoResponse> {
    Json(CropInfoResponse {
        crops: crop_catalog(),
    })
}
