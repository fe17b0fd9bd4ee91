//! Vegetation-index data source.
//!
//! A [`NdviProvider`] supplies NDVI statistics for a region. Two variants
//! exist: the live [`remote::RemoteNdviProvider`] and the seeded
//! [`synthetic::SyntheticNdviProvider`]. [`source::VegetationDataSource`]
//! picks one by health check, substitutes the synthetic path on provider
//! errors and memoizes samples in a [`cache::SampleCache`].

pub mod cache;
#[cfg(feature = "remote")]
pub mod remote;
pub mod source;
pub mod synthetic;

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::commons::basic_functions::clamp_ndvi;
use crate::error::CropResult;
use crate::geo_core::Region;

pub use cache::{CacheStats, SampleCache};
pub use source::{FetchReport, FetchOutcome, VegetationDataSource};
pub use synthetic::{SyntheticNdviProvider, SyntheticProfile};

/// Inclusive date range of the composite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeWindow {
    pub fn ending_on(end: NaiveDate, days: i64) -> Self {
        TimeWindow {
            start: end - Duration::days(days.max(1)),
            end,
        }
    }

    /// Window of `days` ending today (UTC)
    pub fn recent(days: i64) -> Self {
        Self::ending_on(Utc::now().date_naive(), days)
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleOrigin {
    Remote,
    Synthetic,
}

impl std::fmt::Display for SampleOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleOrigin::Remote => f.write_str("remote"),
            SampleOrigin::Synthetic => f.write_str("synthetic"),
        }
    }
}

/// NDVI summary of one region. Every NDVI value lies in [-1, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VegetationSample {
    pub ndvi_mean: f64,
    pub ndvi_std: f64,
    pub ndvi_p25: f64,
    pub ndvi_median: f64,
    pub ndvi_p75: f64,
    /// Scenes that contributed after cloud filtering
    pub image_count: u32,
    /// Composite NDVI at a fixed interval across the window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_series: Option<Vec<f64>>,
    pub window: TimeWindow,
    pub origin: SampleOrigin,
}

impl VegetationSample {
    /// Force every NDVI statistic into the valid domain
    pub fn clamped(mut self) -> Self {
        self.ndvi_mean = clamp_ndvi(self.ndvi_mean);
        self.ndvi_p25 = clamp_ndvi(self.ndvi_p25);
        self.ndvi_median = clamp_ndvi(self.ndvi_median);
        self.ndvi_p75 = clamp_ndvi(self.ndvi_p75);
        self.ndvi_std = if self.ndvi_std.is_finite() {
            self.ndvi_std.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if let Some(series) = self.time_series.as_mut() {
            for value in series.iter_mut() {
                *value = clamp_ndvi(*value);
            }
        }
        self
    }

    pub fn is_within_domain(&self) -> bool {
        let in_range = |v: f64| (-1.0..=1.0).contains(&v);
        in_range(self.ndvi_mean)
            && in_range(self.ndvi_p25)
            && in_range(self.ndvi_median)
            && in_range(self.ndvi_p75)
            && self
                .time_series
                .as_ref()
                .map_or(true, |s| s.iter().all(|v| in_range(*v)))
    }
}

/// Capability: supply NDVI statistics for a region over a window
pub trait NdviProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn fetch(&self, region: &Region, window: &TimeWindow) -> CropResult<VegetationSample>;
}
