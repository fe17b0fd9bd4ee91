use serde::{Deserialize, Serialize};

use crate::collect::ndvi::VegetationSample;
use crate::commons::basic_functions::finite_or;
use crate::geo_core::Region;

pub const FEATURE_COUNT: usize = 12;

/// Column order of every feature vector and of the model weights
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "ndvi_median",
    "ndvi_p25",
    "ndvi_p75",
    "ndvi_iqr",
    "ndvi_mean",
    "ndvi_std",
    "seasonal_amplitude",
    "seasonal_trend",
    "scene_density",
    "area_scale",
    "irrigation_prior",
    "rainfall_prior",
];

/// Scenes at which `scene_density` saturates
const FULL_SCENE_COUNT: f64 = 30.0;
/// log10 of the area (ha) at which `area_scale` saturates
const AREA_SCALE_LOG10: f64 = 7.0;
const RAINFALL_SCALE_MM: f64 = 2000.0;

/// Used for unnamed regions
pub const DEFAULT_IRRIGATION_PRIOR: f64 = 0.35;
pub const DEFAULT_RAINFALL_PRIOR: f64 = 0.40;

/// Fixed-length classifier input. Never contains NaN or infinity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.0[i])
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    /// `(name, value)` pairs in column order
    pub fn named(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_NAMES.iter().copied().zip(self.0.iter().copied())
    }
}

/// Turn an NDVI sample and the region's static priors into model input
pub fn extract(sample: &VegetationSample, region: &Region) -> FeatureVector {
    let median = finite_or(sample.ndvi_median, 0.0);
    let p25 = finite_or(sample.ndvi_p25, median);
    let p75 = finite_or(sample.ndvi_p75, median);
    let mean = finite_or(sample.ndvi_mean, median);
    let std = finite_or(sample.ndvi_std, 0.0).max(0.0);

    let series: Vec<f64> = sample
        .time_series
        .as_deref()
        .unwrap_or(&[])
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .collect();

    let scene_density = (sample.image_count as f64 / FULL_SCENE_COUNT).min(1.0);

    let area = region.area_hectares();
    let area_scale = if area > 0.0 && area.is_finite() {
        (area.log10() / AREA_SCALE_LOG10).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let (irrigation, rainfall) = match region.priors() {
        Some(priors) => (
            finite_or(priors.irrigated_fraction, DEFAULT_IRRIGATION_PRIOR).clamp(0.0, 1.0),
            finite_or(
                priors.annual_rainfall_mm / RAINFALL_SCALE_MM,
                DEFAULT_RAINFALL_PRIOR,
            )
            .clamp(0.0, 1.0),
        ),
        None => (DEFAULT_IRRIGATION_PRIOR, DEFAULT_RAINFALL_PRIOR),
    };

    FeatureVector([
        median,
        p25,
        p75,
        p75 - p25,
        mean,
        std,
        seasonal_amplitude(&series),
        seasonal_trend(&series),
        scene_density,
        area_scale,
        irrigation,
        rainfall,
    ])
}

fn seasonal_amplitude(series: &[f64]) -> f64 {
    if series.is_empty() {
        return 0.0;
    }
    let max = series.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = series.iter().copied().fold(f64::INFINITY, f64::min);
    max - min
}

/// Least-squares slope against the step index
fn seasonal_trend(series: &[f64]) -> f64 {
    let n = series.len();
    if n < 2 {
        return 0.0;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = series.iter().sum::<f64>() / n as f64;
    let (num, den) = series
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, y)| {
            let dx = i as f64 - x_mean;
            (num + dx * (y - y_mean), den + dx * dx)
        });
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::ndvi::{SampleOrigin, TimeWindow};
    use crate::geo_core::{AdminIdentity, AdminKind, AdminPriors, BoundingBox};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use geo::MultiPolygon;

    fn sample(series: Option<Vec<f64>>) -> VegetationSample {
        VegetationSample {
            ndvi_mean: 0.5,
            ndvi_std: 0.12,
            ndvi_p25: 0.45,
            ndvi_median: 0.55,
            ndvi_p75: 0.65,
            image_count: 15,
            time_series: series,
            window: TimeWindow::ending_on(NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(), 90),
            origin: SampleOrigin::Synthetic,
        }
    }

    fn unnamed() -> Region {
        Region::from_bounds(BoundingBox::from_swne(12.0, 76.0, 13.0, 77.0))
    }

    #[test]
    fn test_feature_order() {
        let features = extract(&sample(Some(vec![0.4, 0.5, 0.6, 0.7])), &unnamed());
        let v = features.values();
        assert_eq!(v[0], 0.55);
        assert_relative_eq!(v[3], 0.2, epsilon = 1e-12);
        assert_relative_eq!(v[6], 0.3, epsilon = 1e-12);
        assert_relative_eq!(v[7], 0.1, epsilon = 1e-12);
        assert_eq!(v[8], 0.5);
        assert_eq!(v[10], DEFAULT_IRRIGATION_PRIOR);
        assert_eq!(v[11], DEFAULT_RAINFALL_PRIOR);
        assert_eq!(features.get("ndvi_std"), Some(0.12));
    }

    #[test]
    fn test_missing_series_uses_defaults() {
        let features = extract(&sample(None), &unnamed());
        assert_eq!(features.get("seasonal_amplitude"), Some(0.0));
        assert_eq!(features.get("seasonal_trend"), Some(0.0));
        let single = extract(&sample(Some(vec![0.4])), &unnamed());
        assert_eq!(single.get("seasonal_trend"), Some(0.0));
    }

    #[test]
    fn test_non_finite_inputs_replaced() {
        let mut s = sample(Some(vec![0.4, f64::NAN, 0.6]));
        s.ndvi_mean = f64::NAN;
        s.ndvi_std = f64::INFINITY;
        let features = extract(&s, &unnamed());
        assert!(features.is_finite());
        assert_eq!(features.get("ndvi_mean"), Some(0.55));
    }

    #[test]
    fn test_admin_priors() {
        let identity = AdminIdentity {
            name: "Test".to_string(),
            kind: AdminKind::District,
            district: "Test".to_string(),
            state: "Karnataka".to_string(),
            polygon: MultiPolygon(vec![BoundingBox::from_swne(12.0, 76.0, 13.0, 77.0).to_polygon()]),
            priors: AdminPriors {
                irrigated_fraction: 0.6,
                annual_rainfall_mm: 3000.0,
                ndvi_low: 0.5,
                ndvi_high: 0.7,
            },
        };
        let region = Region::named(identity).unwrap();
        let features = extract(&sample(None), &region);
        assert_eq!(features.get("irrigation_prior"), Some(0.6));
        assert_eq!(features.get("rainfall_prior"), Some(1.0));
        // about 1.2M ha
        assert_relative_eq!(features.get("area_scale").unwrap(), 6.08 / 7.0, epsilon = 0.01);
    }
}
