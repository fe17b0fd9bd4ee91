//! Router configuration for the HTTP API.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::state::AppState;

/// Create the API router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/analyze", post(handlers::analyze))
        .route("/api/districts", get(handlers::list_districts))
        .route(
            "/api/district-boundary/{name}",
            get(handlers::district_boundary),
        )
        .route("/api/taluks/{district}", get(handlers::list_taluks))
        .route("/api/crop-info", get(handlers::crop_info))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rscrop::collect::admin::{AdminDataset, BoundaryResolver};
    use rscrop::collect::ndvi::{SyntheticProfile, VegetationDataSource};
    use rscrop::error::CropError;
    use rscrop::Pipeline;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_router_creation() {
        let resolver = BoundaryResolver::new(Arc::new(AdminDataset::bundled().unwrap()), 5.0);
        let source =
            VegetationDataSource::synthetic_only(SyntheticProfile::default(), 8, Duration::from_secs(60), 90);
        let pipeline = Pipeline::new(
            resolver,
            source,
            Err(CropError::ModelUnavailable("not loaded".to_string())),
        );
        let _router = create_router(AppState::new(Arc::new(pipeline)));
    }
}
