pub mod classify;
pub mod collect;
pub mod commons;
pub mod config;
pub mod error;
pub mod geo_core;
pub mod geometric;
pub mod pipeline;

pub use collect::admin::RegionSelector;
pub use config::{load_settings, Settings};
pub use error::{CropError, CropResult, ErrorKind};
pub use pipeline::{AnalysisRequest, AnalysisResult, Pipeline};
