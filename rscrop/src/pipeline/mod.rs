//! Analysis orchestration: the stage state machine, the result bundle and
//! the [`Pipeline`] that ties resolver, data source, classifier and
//! distribution synthesizer together.

pub mod orchestrator;
pub mod result;
pub mod stages;

pub use orchestrator::{AnalysisRequest, Pipeline};
pub use result::{AnalysisFailure, AnalysisResult, RegionSummary, VegetationSummary};
pub use stages::{AnalysisState, ProcessingStage, StageStatus};
