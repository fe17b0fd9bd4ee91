use approx::assert_relative_eq;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rscrop::classify::CropClassifier;
use rscrop::collect::admin::{AdminDataset, BoundaryResolver, RegionSelector};
use rscrop::collect::global_variables::default_model_path;
use rscrop::collect::ndvi::{SampleOrigin, SyntheticProfile, VegetationDataSource};
use rscrop::error::{CropError, ErrorKind};
use rscrop::pipeline::{AnalysisRequest, Pipeline, StageStatus};

const STAGE_NAMES: [&str; 4] = [
    "Data Fetching from Satellite",
    "Preprocessing & Feature Extraction",
    "Model Prediction",
    "Map Generation & Visualization",
];

fn resolver() -> BoundaryResolver {
    BoundaryResolver::new(Arc::new(AdminDataset::bundled().unwrap()), 5.0)
}

fn synthetic_source() -> VegetationDataSource {
    VegetationDataSource::synthetic_only(
        SyntheticProfile::default(),
        64,
        Duration::from_secs(3600),
        90,
    )
}

fn pipeline() -> Pipeline {
    Pipeline::new(
        resolver(),
        synthetic_source(),
        CropClassifier::load(&default_model_path()),
    )
}

#[test]
fn test_tumkur_end_to_end() {
    let result = pipeline().run_analysis(&RegionSelector::admin("Tumkur"), None);
    assert!(result.success, "{:?}", result.error);

    let region = result.region.as_ref().unwrap();
    assert_eq!(region.admin_name.as_deref(), Some("Tumkur"));
    let [s, w, n, e] = region.bounds;
    assert!(s < n && w < e);
    assert_relative_eq!(s, 12.6, epsilon = 1e-9);
    assert_relative_eq!(e, 77.52, epsilon = 1e-9);

    let classification = result.classification.as_ref().unwrap();
    assert_eq!(classification.primary_class, "Paddy/Rice");
    assert!(
        (60.0..=95.0).contains(&classification.confidence_percent),
        "confidence {}",
        classification.confidence_percent
    );
    let total: f64 = classification.probabilities.iter().sum::<f64>() * 100.0;
    assert_relative_eq!(total, 100.0, epsilon = 0.01);

    let distribution = result.distribution.as_ref().unwrap();
    assert_eq!(distribution.0.len(), 4);
    assert_relative_eq!(distribution.total_percentage(), 100.0, epsilon = 0.1);
    let total_area = result.total_area_hectares.unwrap();
    assert_relative_eq!(distribution.total_area_hectares(), total_area, max_relative = 0.001);
    assert_eq!(result.grid_size, Some(30));
    assert_eq!(result.spatial_features.as_ref().unwrap().features.len(), 900);

    let names: Vec<&str> = result.processing_stages.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, STAGE_NAMES);
    assert!(result
        .processing_stages
        .iter()
        .all(|s| s.duration_seconds >= 0.0 && s.status == StageStatus::Completed));
    assert!(result.processing_stages[0].details.contains("synthetic fallback"));

    let vegetation = result.vegetation.as_ref().unwrap();
    assert_eq!(vegetation.sample.origin, SampleOrigin::Synthetic);
    assert!(vegetation.fallback_reason.is_some());

    let performance = result.model_performance.as_ref().unwrap();
    assert_eq!(performance.feature_count, 12);
    assert!(!result.improvement_suggestions.is_empty());
}

#[test]
fn test_alias_resolves_to_same_region() {
    let p = pipeline();
    let a = p.run_analysis(&RegionSelector::admin("Tumkur"), Some(10));
    let b = p.run_analysis(&RegionSelector::admin("tumakuru"), Some(10));
    assert_eq!(a.region.unwrap().bounds, b.region.unwrap().bounds);
}

#[test]
fn test_unknown_district_records_no_stages() {
    let p = pipeline();
    let result = p.run_analysis(&RegionSelector::admin("Atlantis"), None);
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::NotFound));
    assert!(result.processing_stages.is_empty());
    assert!(result.error.unwrap().contains("Atlantis"));

    let failure = p
        .analyze(&AnalysisRequest::new(RegionSelector::admin("Atlantis")))
        .unwrap_err();
    assert!(matches!(failure.error, CropError::NotFound(_)));
    assert!(failure.stages.is_empty());
}

#[test]
fn test_invalid_bounds_and_grid_size() {
    let p = pipeline();
    let inverted = p.run_analysis(&RegionSelector::bounds(13.0, 76.0, 12.0, 77.0), None);
    assert_eq!(inverted.error_kind, Some(ErrorKind::InvalidBounds));
    assert!(inverted.processing_stages.is_empty());

    let degenerate = p.run_analysis(&RegionSelector::bounds(12.0, 76.0, 12.0, 77.0), None);
    assert_eq!(degenerate.error_kind, Some(ErrorKind::InvalidBounds));

    let grid = p.run_analysis(&RegionSelector::admin("Mandya"), Some(4));
    assert_eq!(grid.error_kind, Some(ErrorKind::InvalidParameter));
    assert!(grid.processing_stages.is_empty());
}

#[test]
fn test_one_degree_at_equator() {
    let result = pipeline().run_analysis(&RegionSelector::bounds(0.0, 0.0, 1.0, 1.0), Some(30));
    assert!(result.success);
    assert_eq!(result.spatial_features.unwrap().features.len(), 900);
    assert_relative_eq!(
        result.total_area_hectares.unwrap(),
        111.0 * 111.0 * 100.0,
        max_relative = 0.001
    );
}

#[test]
fn test_repeated_analysis_is_identical() {
    let selector = RegionSelector::bounds(13.0, 75.5, 13.8, 76.4);
    let a = pipeline().run_analysis(&selector, Some(25));
    let b = pipeline().run_analysis(&selector, Some(25));
    assert_eq!(a.classification, b.classification);
    assert_eq!(a.distribution, b.distribution);
    assert_eq!(a.spatial_features, b.spatial_features);
    assert_eq!(
        a.vegetation.as_ref().map(|v| &v.sample),
        b.vegetation.as_ref().map(|v| &v.sample)
    );
}

#[test]
fn test_missing_model_fails_at_prediction() {
    let p = Pipeline::new(
        resolver(),
        synthetic_source(),
        CropClassifier::load(std::path::Path::new("/nonexistent/crop_classifier.json")),
    );
    assert!(!p.model_loaded());
    let result = p.run_analysis(&RegionSelector::admin("Mandya"), None);
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::ModelUnavailable));
    assert_eq!(result.failed_stage.as_deref(), Some("Model Prediction"));
    assert_eq!(result.processing_stages.len(), 3);
    assert_eq!(result.processing_stages[2].status, StageStatus::Failed);
}

#[test]
fn test_taluk_analysis() {
    let result = pipeline().run_analysis(&RegionSelector::admin("Sira"), Some(10));
    assert!(result.success, "{:?}", result.error);
    let region = result.region.unwrap();
    assert_eq!(region.admin_name.as_deref(), Some("Sira"));
    assert_eq!(region.district.as_deref(), Some("Tumkur"));
}

#[test]
fn test_concurrent_regions_keep_their_own_samples() {
    let selectors = vec![
        RegionSelector::admin("Tumkur"),
        RegionSelector::admin("Mandya"),
        RegionSelector::bounds(15.0, 75.0, 15.5, 75.5),
        RegionSelector::bounds(16.0, 76.0, 16.5, 76.5),
    ];
    let expected: Vec<_> = selectors
        .iter()
        .map(|s| pipeline().run_analysis(s, Some(10)).vegetation.unwrap().sample)
        .collect();

    let shared = Arc::new(pipeline());
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let shared = Arc::clone(&shared);
            let selector = selectors[i % selectors.len()].clone();
            thread::spawn(move || {
                let result = shared.run_analysis(&selector, Some(10));
                (i % 4, result.vegetation.unwrap().sample)
            })
        })
        .collect();
    for handle in handles {
        let (index, sample) = handle.join().unwrap();
        assert_eq!(sample, expected[index]);
    }
    let stats = shared.data_source().cache_stats();
    assert_eq!(stats.entries, 4);
    assert_eq!(stats.hits + stats.misses, 16);
}

#[cfg(feature = "remote")]
#[test]
fn test_unreachable_provider_falls_back() {
    use rscrop::collect::ndvi::remote::RemoteNdviProvider;
    use rscrop::config::ProviderSettings;

    let settings = ProviderSettings {
        max_attempts: 2,
        base_backoff_ms: 1,
        timeout_secs: 2,
        ..ProviderSettings::default()
    };
    let provider = RemoteNdviProvider::new("http://127.0.0.1:9", "key", &settings).unwrap();
    let p = Pipeline::new(
        resolver(),
        synthetic_source().with_primary(Arc::new(provider)),
        CropClassifier::load(&default_model_path()),
    );
    let result = p.run_analysis(&RegionSelector::bounds(12.0, 76.0, 12.2, 76.2), Some(5));
    assert!(result.success);
    let vegetation = result.vegetation.unwrap();
    assert_eq!(vegetation.sample.origin, SampleOrigin::Synthetic);
    assert!(vegetation.fallback_reason.is_some());
    assert!(result.processing_stages[0].details.contains("synthetic fallback"));
}

#[test]
fn test_result_json_shape() {
    let result = pipeline().run_analysis(&RegionSelector::admin("Mandya"), Some(5));
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["spatialFeatures"]["type"], "FeatureCollection");
    assert!(json["distribution"]["0"]["areaHectares"].is_number());
    assert!(json["classification"]["perClassConfidence"].is_array());
    assert!(json["processingStages"][0]["durationSeconds"].is_number());
    assert!(json["modelPerformance"]["improvementPct"].is_number());
    assert!(json.get("error").is_none());
}
