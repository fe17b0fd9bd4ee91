use anyhow::{Context, Result};
use rscrop::{load_settings, Pipeline, RegionSelector};
use std::fs;

fn main() -> Result<()> {
    println!("=== Crop analysis example ===\n");

    let settings = load_settings().context("Failed to load settings")?;
    let pipeline = Pipeline::from_settings(&settings)?;
    println!("Data source: {}", pipeline.data_source().primary_name());
    println!("Model loaded: {}\n", pipeline.model_loaded());

    // Example 1: named district
    println!("1. District analysis (Tumkur):");
    analyze(&pipeline, &RegionSelector::admin("Tumkur"), None, Some("output/tumkur_crops.geojson"))?;

    // Example 2: drawn rectangle with a coarser grid
    println!("\n2. Bounds analysis (12.3..12.8 N, 76.5..77.0 E, 10x10 grid):");
    analyze(&pipeline, &RegionSelector::bounds(12.3, 76.5, 12.8, 77.0), Some(10), None)?;

    // Example 3: unknown name
    println!("\n3. Unknown district:");
    analyze(&pipeline, &RegionSelector::admin("Atlantis"), None, None)?;

    Ok(())
}

fn analyze(
    pipeline: &Pipeline,
    selector: &RegionSelector,
    grid_size: Option<usize>,
    geojson_path: Option<&str>,
) -> Result<()> {
    let result = pipeline.run_analysis(selector, grid_size);
    if !result.success {
        println!(
            "  - Failed ({}): {}",
            result
                .error_kind
                .map(|k| k.to_string())
                .unwrap_or_default(),
            result.error.unwrap_or_default()
        );
        return Ok(());
    }

    if let Some(classification) = &result.classification {
        println!(
            "  - Primary crop: {} ({:.2}% confidence)",
            classification.primary_class, classification.confidence_percent
        );
    }
    if let Some(distribution) = &result.distribution {
        for (_, entry) in distribution.ranked() {
            println!(
                "  - {:<16} {:>12.2} ha  {:>6.2}%",
                entry.crop_name, entry.area_hectares, entry.percentage
            );
        }
    }
    for stage in &result.processing_stages {
        println!("  - [{:.3}s] {}: {}", stage.duration_seconds, stage.name, stage.details);
    }

    if let (Some(path), Some(features)) = (geojson_path, &result.spatial_features) {
        if let Some(parent) = std::path::Path::new(path).parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string(features)?)
            .with_context(|| format!("Failed to write {}", path))?;
        println!("  - Map cells written to {}", path);
    }
    Ok(())
}
