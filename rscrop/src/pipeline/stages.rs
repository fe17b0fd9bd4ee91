use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;

use crate::commons::basic_functions::round_to;
use crate::error::{CropError, CropResult};

pub const STAGE_FETCH: &str = "Data Fetching from Satellite";
pub const STAGE_FEATURES: &str = "Preprocessing & Feature Extraction";
pub const STAGE_PREDICTION: &str = "Model Prediction";
pub const STAGE_MAP: &str = "Map Generation & Visualization";

/// Lifecycle of one analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalysisState {
    Pending,
    Resolving,
    Fetching,
    Extracting,
    Classifying,
    Synthesizing,
    Complete,
    Failed,
}

impl AnalysisState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AnalysisState::Complete | AnalysisState::Failed)
    }

    /// Forward by exactly one step, or to `Failed` from any non-terminal state
    pub fn can_advance_to(self, next: AnalysisState) -> bool {
        use AnalysisState::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Failed)
                | (Pending, Resolving)
                | (Resolving, Fetching)
                | (Fetching, Extracting)
                | (Extracting, Classifying)
                | (Classifying, Synthesizing)
                | (Synthesizing, Complete)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Completed,
    Failed,
}

/// One entry of the stage log
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStage {
    pub name: String,
    pub status: StageStatus,
    pub duration_seconds: f64,
    pub details: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Append-only stage log driven by the state machine
#[derive(Debug)]
pub struct StageLog {
    state: AnalysisState,
    stages: Vec<ProcessingStage>,
    current: Option<(&'static str, DateTime<Utc>, Instant)>,
}

impl Default for StageLog {
    fn default() -> Self {
        Self::new()
    }
}

impl StageLog {
    pub fn new() -> Self {
        StageLog {
            state: AnalysisState::Pending,
            stages: Vec::new(),
            current: None,
        }
    }

    pub fn state(&self) -> AnalysisState {
        self.state
    }

    pub fn stages(&self) -> &[ProcessingStage] {
        &self.stages
    }

    pub fn advance(&mut self, next: AnalysisState) -> CropResult<()> {
        if !self.state.can_advance_to(next) {
            return Err(CropError::Internal(format!(
                "illegal transition {:?} -> {:?}",
                self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    /// Start timing a named stage; it ends with `complete` or `fail`
    pub fn begin(&mut self, name: &'static str) {
        self.current = Some((name, Utc::now(), Instant::now()));
    }

    pub fn current_stage(&self) -> Option<&'static str> {
        self.current.map(|(name, _, _)| name)
    }

    /// Drop the open stage without recording it
    pub fn discard(&mut self) {
        self.current = None;
    }

    pub fn complete(&mut self, details: impl Into<String>) {
        self.close(StageStatus::Completed, details.into());
    }

    /// Record the open stage as failed (if any) and move to `Failed`.
    /// Returns the name of the failed stage.
    pub fn fail(&mut self, details: impl Into<String>) -> Option<&'static str> {
        let name = self.current_stage();
        self.close(StageStatus::Failed, details.into());
        if !self.state.is_terminal() {
            self.state = AnalysisState::Failed;
        }
        name
    }

    fn close(&mut self, status: StageStatus, details: String) {
        if let Some((name, started_at, instant)) = self.current.take() {
            self.stages.push(ProcessingStage {
                name: name.to_string(),
                status,
                duration_seconds: round_to(instant.elapsed().as_secs_f64(), 3),
                details,
                started_at,
                finished_at: Utc::now(),
            });
        }
    }

    pub fn into_stages(self) -> Vec<ProcessingStage> {
        self.stages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::AnalysisState::*;

    #[test]
    fn test_forward_path() {
        let path = [
            Pending,
            Resolving,
            Fetching,
            Extracting,
            Classifying,
            Synthesizing,
            Complete,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]));
            assert!(!pair[1].can_advance_to(pair[0]));
        }
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!Pending.can_advance_to(Classifying));
        assert!(!Complete.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Resolving));
        assert!(Extracting.can_advance_to(Failed));
    }

    #[test]
    fn test_log_records_stages() {
        let mut log = StageLog::new();
        log.advance(Resolving).unwrap();
        log.advance(Fetching).unwrap();
        log.begin(STAGE_FETCH);
        log.complete("ok");
        assert!(log.advance(Synthesizing).is_err());
        log.advance(Extracting).unwrap();
        log.begin(STAGE_FEATURES);
        assert_eq!(log.fail("boom"), Some(STAGE_FEATURES));
        assert_eq!(log.state(), Failed);

        let stages = log.into_stages();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].status, StageStatus::Completed);
        assert_eq!(stages[1].status, StageStatus::Failed);
        assert!(stages.iter().all(|s| s.duration_seconds >= 0.0));
        assert!(stages[0].finished_at >= stages[0].started_at);
    }

    #[test]
    fn test_discarded_stage_leaves_no_entry() {
        let mut log = StageLog::new();
        log.advance(Resolving).unwrap();
        log.begin(STAGE_FETCH);
        log.discard();
        assert_eq!(log.current_stage(), None);
        assert_eq!(log.fail("unknown district"), None);
        assert!(log.into_stages().is_empty());
    }
}
