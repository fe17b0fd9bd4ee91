use std::path::PathBuf;

/// Name of the optional configuration file (any extension `config` knows)
pub const CONFIG_FILE_NAME: &str = "rscrop";

/// Prefix of environment overrides, e.g. `RSCROP__PROVIDER__API_KEY`
pub const ENV_PREFIX: &str = "RSCROP";

pub const MODEL_FILE_NAME: &str = "crop_classifier.json";

/// Bundled administrative dataset
pub const DISTRICTS_GEOJSON: &str = include_str!("../../data/boundaries/karnataka_districts.geojson");
pub const TALUKS_CSV: &str = include_str!("../../data/taluks.csv");

pub const DISTRICTS_FILE_NAME: &str = "boundaries/karnataka_districts.geojson";
pub const TALUKS_FILE_NAME: &str = "taluks.csv";

/// Locate the classifier artifact: crate directory first (dev and tests),
/// then `./models` relative to the working directory.
pub fn default_model_path() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let model_path = PathBuf::from(manifest_dir)
        .join("models")
        .join(MODEL_FILE_NAME);
    if model_path.exists() {
        return model_path;
    }

    for path in &[
        PathBuf::from("models").join(MODEL_FILE_NAME),
        PathBuf::from("rscrop/models").join(MODEL_FILE_NAME),
    ] {
        if path.exists() {
            return path.clone();
        }
    }

    model_path
}
