use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::cache::{CacheStats, SampleCache};
use super::synthetic::{SyntheticNdviProvider, SyntheticProfile};
use super::{NdviProvider, SampleOrigin, TimeWindow, VegetationSample};
use crate::config::Settings;
use crate::error::CropResult;
use crate::geo_core::Region;

/// How a sample was obtained
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum FetchOutcome {
    Remote { provider: String },
    Synthetic { reason: String },
}

/// Audit record of one fetch, written to the stage log details
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchReport {
    pub outcome: FetchOutcome,
    pub cached: bool,
}

impl FetchReport {
    pub fn origin(&self) -> SampleOrigin {
        match self.outcome {
            FetchOutcome::Remote { .. } => SampleOrigin::Remote,
            FetchOutcome::Synthetic { .. } => SampleOrigin::Synthetic,
        }
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        match &self.outcome {
            FetchOutcome::Synthetic { reason } => Some(reason),
            FetchOutcome::Remote { .. } => None,
        }
    }

    /// Human-readable stage details
    pub fn describe(&self, sample: &VegetationSample) -> String {
        let source = match &self.outcome {
            FetchOutcome::Remote { provider } => format!("remote provider '{}'", provider),
            FetchOutcome::Synthetic { reason } => {
                format!("synthetic fallback (provider substituted: {})", reason)
            }
        };
        format!(
            "NDVI from {}{}: {} scenes {} to {}, median {:.3}",
            source,
            if self.cached { " [cached]" } else { "" },
            sample.image_count,
            sample.window.start,
            sample.window.end,
            sample.ndvi_median
        )
    }
}

#[derive(Clone)]
struct CachedSample {
    sample: Arc<VegetationSample>,
    outcome: FetchOutcome,
}

/// Polymorphic NDVI source: a primary provider chosen once by health
/// check, the synthetic generator as substitute, and the sample cache.
pub struct VegetationDataSource {
    primary: Option<Arc<dyn NdviProvider>>,
    /// Why there is no primary provider
    unavailable_reason: String,
    synthetic: SyntheticNdviProvider,
    cache: SampleCache<CachedSample>,
    window_days: i64,
}

impl VegetationDataSource {
    pub fn synthetic_only(
        profile: SyntheticProfile,
        cache_capacity: usize,
        ttl: Duration,
        window_days: i64,
    ) -> Self {
        VegetationDataSource {
            primary: None,
            unavailable_reason: "no remote provider configured".to_string(),
            synthetic: SyntheticNdviProvider::new(profile),
            cache: SampleCache::new(cache_capacity, ttl),
            window_days,
        }
    }

    /// Use `primary` for every fetch, substituting synthetic data on error
    pub fn with_primary(mut self, primary: Arc<dyn NdviProvider>) -> Self {
        self.primary = Some(primary);
        self.unavailable_reason.clear();
        self
    }

    /// Build from settings; the remote provider is selected only when it is
    /// configured and passes its health check.
    pub fn from_settings(settings: &Settings) -> Self {
        let source = Self::synthetic_only(
            settings.synthetic.clone(),
            settings.cache.capacity,
            Duration::from_secs(settings.cache.ttl_secs),
            settings.provider.window_days,
        );
        source.select_primary(settings)
    }

    #[cfg(feature = "remote")]
    fn select_primary(mut self, settings: &Settings) -> Self {
        use super::remote::RemoteNdviProvider;

        let provider = match RemoteNdviProvider::from_settings(&settings.provider) {
            Ok(Some(provider)) => provider,
            Ok(None) => {
                info!("no NDVI provider credentials, using synthetic data source");
                return self;
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "remote NDVI provider misconfigured");
                self.unavailable_reason = format!("provider misconfigured: {:#}", e);
                return self;
            }
        };

        match provider.health_check() {
            Ok(()) => {
                info!(endpoint = %provider.endpoint(), "remote NDVI provider healthy");
                self.with_primary(Arc::new(provider))
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "remote NDVI provider failed health check");
                self.unavailable_reason = format!("health check failed: {:#}", e);
                self
            }
        }
    }

    #[cfg(not(feature = "remote"))]
    fn select_primary(self, _settings: &Settings) -> Self {
        info!("built without the remote feature, using synthetic data source");
        self
    }

    pub fn primary_name(&self) -> &'static str {
        self.primary
            .as_ref()
            .map_or_else(|| self.synthetic.name(), |p| p.name())
    }

    pub fn has_remote(&self) -> bool {
        self.primary.is_some()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Fetch NDVI statistics for `region`. Provider errors are absorbed and
    /// replaced by synthetic data; only malformed bounds are returned.
    pub fn fetch(&self, region: &Region) -> CropResult<(VegetationSample, FetchReport)> {
        region.bbox().validate(f64::INFINITY)?;

        let window = TimeWindow::recent(self.window_days);
        let key = region.cache_key();
        let (cached, hit) = self
            .cache
            .get_or_insert_with(key, || self.fetch_uncached(region, &window));

        // a substitution is not worth keeping when a live provider exists;
        // drop only the entry this call filled, never a later refill
        if !hit && self.primary.is_some() && matches!(cached.outcome, FetchOutcome::Synthetic { .. }) {
            self.cache
                .invalidate_if(&key, |current| Arc::ptr_eq(&current.sample, &cached.sample));
        }

        let report = FetchReport {
            outcome: cached.outcome.clone(),
            cached: hit,
        };
        Ok(((*cached.sample).clone(), report))
    }

    fn fetch_uncached(&self, region: &Region, window: &TimeWindow) -> CachedSample {
        let reason = match &self.primary {
            Some(primary) => match primary.fetch(region, window) {
                Ok(sample) => {
                    return CachedSample {
                        sample: Arc::new(sample.clamped()),
                        outcome: FetchOutcome::Remote {
                            provider: primary.name().to_string(),
                        },
                    };
                }
                Err(e) => {
                    warn!(
                        provider = primary.name(),
                        bbox = %region.bbox(),
                        error = %e,
                        "NDVI provider failed, substituting synthetic sample"
                    );
                    e.to_string()
                }
            },
            None => self.unavailable_reason.clone(),
        };

        CachedSample {
            sample: Arc::new(self.synthetic.generate(region, window)),
            outcome: FetchOutcome::Synthetic { reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CropError;
    use crate::geo_core::BoundingBox;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingProvider {
        calls: AtomicUsize,
    }

    impl NdviProvider for FailingProvider {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn fetch(&self, _region: &Region, _window: &TimeWindow) -> CropResult<VegetationSample> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CropError::DataSource("HTTP 503 after 3 attempts".to_string()))
        }
    }

    struct FixedProvider;

    impl NdviProvider for FixedProvider {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn fetch(&self, _region: &Region, window: &TimeWindow) -> CropResult<VegetationSample> {
            Ok(VegetationSample {
                ndvi_mean: 0.61,
                ndvi_std: 0.1,
                ndvi_p25: 0.5,
                ndvi_median: 0.6,
                ndvi_p75: 0.7,
                image_count: 9,
                time_series: None,
                window: *window,
                origin: SampleOrigin::Remote,
            })
        }
    }

    fn source(capacity: usize) -> VegetationDataSource {
        VegetationDataSource::synthetic_only(
            SyntheticProfile::default(),
            capacity,
            Duration::from_secs(3600),
            90,
        )
    }

    fn region() -> Region {
        Region::from_bounds(BoundingBox::from_swne(12.0, 76.0, 12.5, 76.5))
    }

    #[test]
    fn test_fallback_is_bit_identical_without_cache() {
        let source = source(0);
        let (a, report_a) = source.fetch(&region()).unwrap();
        let (b, report_b) = source.fetch(&region()).unwrap();
        assert_eq!(a, b);
        assert_eq!(report_a.origin(), SampleOrigin::Synthetic);
        assert!(!report_b.cached);
        assert_eq!(
            report_a.fallback_reason(),
            Some("no remote provider configured")
        );
    }

    #[test]
    fn test_second_fetch_is_cached() {
        let source = source(8);
        let (a, _) = source.fetch(&region()).unwrap();
        let (b, report) = source.fetch(&region()).unwrap();
        assert_eq!(a, b);
        assert!(report.cached);
        assert_eq!(source.cache_stats().hits, 1);
    }

    #[test]
    fn test_provider_error_is_substituted_and_recorded() {
        let failing = Arc::new(FailingProvider {
            calls: AtomicUsize::new(0),
        });
        let source = source(8).with_primary(failing.clone());
        let (sample, report) = source.fetch(&region()).unwrap();
        assert_eq!(sample.origin, SampleOrigin::Synthetic);
        let reason = report.fallback_reason().unwrap();
        assert!(reason.contains("HTTP 503"));
        assert!(report.describe(&sample).contains("synthetic fallback"));

        // substitutions are not cached while a live provider exists
        source.fetch(&region()).unwrap();
        assert_eq!(failing.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_remote_samples_stay_cached() {
        let source = source(8).with_primary(Arc::new(FixedProvider));
        source.fetch(&region()).unwrap();
        let (_, report) = source.fetch(&region()).unwrap();
        assert!(report.cached);
        assert_eq!(source.cache_stats().entries, 1);
    }

    #[test]
    fn test_remote_sample_is_used() {
        let source = source(8).with_primary(Arc::new(FixedProvider));
        let (sample, report) = source.fetch(&region()).unwrap();
        assert_eq!(sample.ndvi_median, 0.6);
        assert_eq!(
            report.outcome,
            FetchOutcome::Remote {
                provider: "fixed".to_string()
            }
        );
        assert_eq!(source.primary_name(), "fixed");
    }

    #[test]
    fn test_malformed_region_propagates() {
        let bad = Region::from_bounds(BoundingBox::from_swne(13.0, 76.0, 12.0, 77.0));
        let err = source(8).fetch(&bad).unwrap_err();
        assert!(matches!(err, CropError::InvalidBounds(_)));
    }
}
