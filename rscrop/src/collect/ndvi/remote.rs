use anyhow::{Context, Result};
use chrono::NaiveDate;
use rayon::prelude::*;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{NdviProvider, SampleOrigin, TimeWindow, VegetationSample};
use crate::config::ProviderSettings;
use crate::error::{CropError, CropResult};
use crate::geo_core::{BoundingBox, Region};

/// Statuses worth another attempt (rate limiting and gateway failures)
const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Per-scene NDVI statistics as served by the provider
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SceneStatistics {
    pub date: NaiveDate,
    pub cloudy_pixel_percentage: f64,
    /// Pixels with data inside the tile
    pub valid_pixels: u64,
    /// Subset of `valid_pixels` flagged as cloud or cloud shadow
    #[serde(default)]
    pub cloud_pixels: u64,
    pub ndvi_mean: f64,
    pub ndvi_std: f64,
    pub ndvi_p25: f64,
    pub ndvi_p50: f64,
    pub ndvi_p75: f64,
}

impl SceneStatistics {
    /// Pixel weight after masking clouds
    fn clear_pixels(&self) -> u64 {
        self.valid_pixels.saturating_sub(self.cloud_pixels)
    }

    fn is_finite(&self) -> bool {
        [
            self.ndvi_mean,
            self.ndvi_std,
            self.ndvi_p25,
            self.ndvi_p50,
            self.ndvi_p75,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

#[derive(Debug, Deserialize)]
struct SceneResponse {
    scenes: Vec<SceneStatistics>,
}

/// Outcome of one HTTP attempt
enum AttemptError {
    Transient(anyhow::Error),
    Permanent(anyhow::Error),
}

/// Live NDVI provider: cloud-filtered scene statistics per tile, fetched on
/// a bounded worker pool with retry and exponential backoff.
pub struct RemoteNdviProvider {
    client: Client,
    endpoint: Url,
    api_key: String,
    pool: rayon::ThreadPool,
    max_attempts: u32,
    base_backoff: Duration,
    health_timeout: Duration,
    tile_degrees: f64,
    max_tiles: usize,
    max_cloud_percentage: f64,
    series_length: usize,
}

impl RemoteNdviProvider {
    /// `Ok(None)` when endpoint or credentials are missing
    pub fn from_settings(settings: &ProviderSettings) -> Result<Option<Self>> {
        let endpoint = settings.endpoint.as_deref().map(str::trim).unwrap_or("");
        let api_key = settings.api_key.as_deref().map(str::trim).unwrap_or("");
        if endpoint.is_empty() || api_key.is_empty() {
            return Ok(None);
        }
        Self::new(endpoint, api_key, settings).map(Some)
    }

    pub fn new(endpoint: &str, api_key: &str, settings: &ProviderSettings) -> Result<Self> {
        // trailing slash so `join` appends instead of replacing the last segment
        let normalized = if endpoint.ends_with('/') {
            endpoint.to_string()
        } else {
            format!("{}/", endpoint)
        };
        let endpoint = Url::parse(&normalized)
            .with_context(|| format!("Invalid NDVI provider endpoint: {}", endpoint))?;

        let max_connections = settings.max_connections.max(1);
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .pool_max_idle_per_host(max_connections)
            .build()
            .context("Failed to create HTTP client")?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_connections)
            .thread_name(|i| format!("ndvi-tile-{}", i))
            .build()
            .context("Failed to create tile worker pool")?;

        Ok(RemoteNdviProvider {
            client,
            endpoint,
            api_key: api_key.to_string(),
            pool,
            max_attempts: settings.max_attempts.max(1),
            base_backoff: Duration::from_millis(settings.base_backoff_ms),
            health_timeout: Duration::from_secs(settings.health_timeout_secs.max(1)),
            tile_degrees: settings.tile_degrees,
            max_tiles: settings.max_tiles.max(1),
            max_cloud_percentage: settings.max_cloud_percentage,
            series_length: settings.series_length,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// `GET {endpoint}/health` must answer 2xx within the health timeout
    pub fn health_check(&self) -> Result<()> {
        let url = self
            .endpoint
            .join("health")
            .context("Failed to build health URL")?;
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(&self.api_key)
            .timeout(self.health_timeout)
            .send()
            .with_context(|| format!("Failed to reach {}", url))?;
        if !response.status().is_success() {
            anyhow::bail!("{} returned {}", url, response.status());
        }
        Ok(())
    }

    fn scenes_url(&self, tile: &BoundingBox, window: &TimeWindow) -> Result<Url> {
        let mut url = self
            .endpoint
            .join("v1/ndvi/scenes")
            .context("Failed to build scenes URL")?;
        let bbox = format!("{},{},{},{}", tile.min_x, tile.min_y, tile.max_x, tile.max_y);
        url.set_query(Some(&format!(
            "bbox={}&from={}&to={}",
            urlencoding::encode(&bbox),
            window.start.format("%Y-%m-%d"),
            window.end.format("%Y-%m-%d")
        )));
        Ok(url)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }

    fn request_scenes(&self, url: &Url) -> std::result::Result<Vec<SceneStatistics>, AttemptError> {
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(&self.api_key)
            .send()
            .map_err(|e| {
                AttemptError::Transient(anyhow::Error::new(e).context("Failed to send NDVI scene request"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            let err = anyhow::anyhow!("NDVI provider returned {}: {}", status, snippet);
            return Err(if RETRY_STATUSES.contains(&status.as_u16()) {
                AttemptError::Transient(err)
            } else {
                AttemptError::Permanent(err)
            });
        }

        let parsed: SceneResponse = response.json().map_err(|e| {
            let timed_out = e.is_timeout();
            let err = anyhow::Error::new(e).context("Malformed NDVI scene response");
            if timed_out {
                AttemptError::Transient(err)
            } else {
                AttemptError::Permanent(err)
            }
        })?;
        Ok(parsed.scenes)
    }

    /// One tile with retries; timeouts count as failed attempts
    fn fetch_tile(&self, tile: &BoundingBox, window: &TimeWindow) -> Result<Vec<SceneStatistics>> {
        let url = self.scenes_url(tile, window)?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.request_scenes(&url) {
                Ok(scenes) => {
                    debug!(tile = %tile, scenes = scenes.len(), attempt, "tile fetched");
                    return Ok(scenes);
                }
                Err(AttemptError::Transient(e)) if attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        tile = %tile,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %format!("{:#}", e),
                        "NDVI request failed, retrying"
                    );
                    std::thread::sleep(delay);
                }
                Err(AttemptError::Transient(e)) | Err(AttemptError::Permanent(e)) => {
                    return Err(e.context(format!(
                        "Tile {} failed after {} attempt(s)",
                        tile, attempt
                    )));
                }
            }
        }
    }

    fn fetch_internal(&self, bbox: &BoundingBox, window: &TimeWindow) -> Result<VegetationSample> {
        let tiles = tile_bounds(bbox, self.tile_degrees, self.max_tiles);
        debug!(tiles = tiles.len(), bbox = %bbox, "fetching NDVI tiles");

        let results: Vec<Result<Vec<SceneStatistics>>> = self.pool.install(|| {
            tiles
                .par_iter()
                .map(|tile| self.fetch_tile(tile, window))
                .collect()
        });
        let per_tile = results.into_iter().collect::<Result<Vec<_>>>()?;

        aggregate_scenes(
            per_tile.into_iter().flatten(),
            self.max_cloud_percentage,
            window,
            self.series_length,
        )
    }
}

impl NdviProvider for RemoteNdviProvider {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn fetch(&self, region: &Region, window: &TimeWindow) -> CropResult<VegetationSample> {
        self.fetch_internal(region.bbox(), window)
            .map_err(CropError::data_source)
    }
}

/// Split a box into at most `max_tiles` tiles of roughly `tile_degrees`;
/// the tile size doubles until the count fits.
pub fn tile_bounds(bbox: &BoundingBox, tile_degrees: f64, max_tiles: usize) -> Vec<BoundingBox> {
    let mut size = if tile_degrees.is_finite() && tile_degrees > 0.0 {
        tile_degrees
    } else {
        bbox.width_degrees().max(bbox.height_degrees())
    };
    let counts = |size: f64| {
        (
            ((bbox.width_degrees() / size).ceil() as usize).max(1),
            ((bbox.height_degrees() / size).ceil() as usize).max(1),
        )
    };
    let (mut cols, mut rows) = counts(size);
    while cols.saturating_mul(rows) > max_tiles.max(1) {
        size *= 2.0;
        (cols, rows) = counts(size);
    }

    let mut tiles = Vec::with_capacity(cols * rows);
    for row in 0..rows {
        for col in 0..cols {
            let min_x = bbox.min_x + col as f64 * size;
            let min_y = bbox.min_y + row as f64 * size;
            tiles.push(BoundingBox::new(
                min_x,
                min_y,
                (min_x + size).min(bbox.max_x),
                (min_y + size).min(bbox.max_y),
            ));
        }
    }
    tiles
}

/// Merge scene statistics into one sample.
///
/// Scenes at or above `max_cloud_percentage` are dropped, cloud pixels are
/// excluded from the weights, and the remaining scenes are averaged by clear
/// pixel count. The time series bins the window into `series_length` equal
/// spans and keeps the non-empty ones.
pub fn aggregate_scenes<I>(
    scenes: I,
    max_cloud_percentage: f64,
    window: &TimeWindow,
    series_length: usize,
) -> Result<VegetationSample>
where
    I: IntoIterator<Item = SceneStatistics>,
{
    let usable: Vec<SceneStatistics> = scenes
        .into_iter()
        .filter(|s| s.cloudy_pixel_percentage < max_cloud_percentage)
        .filter(|s| s.clear_pixels() > 0 && s.is_finite())
        .collect();
    if usable.is_empty() {
        anyhow::bail!(
            "No scenes below {}% cloud cover between {} and {}",
            max_cloud_percentage,
            window.start,
            window.end
        );
    }

    let total_weight: f64 = usable.iter().map(|s| s.clear_pixels() as f64).sum();
    let weighted = |f: fn(&SceneStatistics) -> f64| {
        usable
            .iter()
            .map(|s| f(s) * s.clear_pixels() as f64)
            .sum::<f64>()
            / total_weight
    };

    let mean = weighted(|s| s.ndvi_mean);
    // pooled standard deviation across scenes
    let second_moment = weighted(|s| s.ndvi_std * s.ndvi_std + s.ndvi_mean * s.ndvi_mean);
    let std = (second_moment - mean * mean).max(0.0).sqrt();

    let dates: BTreeSet<NaiveDate> = usable.iter().map(|s| s.date).collect();

    Ok(VegetationSample {
        ndvi_mean: mean,
        ndvi_std: std,
        ndvi_p25: weighted(|s| s.ndvi_p25),
        ndvi_median: weighted(|s| s.ndvi_p50),
        ndvi_p75: weighted(|s| s.ndvi_p75),
        image_count: dates.len() as u32,
        time_series: binned_series(&usable, window, series_length),
        window: *window,
        origin: SampleOrigin::Remote,
    }
    .clamped())
}

fn binned_series(
    scenes: &[SceneStatistics],
    window: &TimeWindow,
    series_length: usize,
) -> Option<Vec<f64>> {
    if series_length == 0 {
        return None;
    }
    let span_days = window.days().max(1) as f64;
    let mut sums = vec![(0.0f64, 0.0f64); series_length];
    for scene in scenes {
        let offset = (scene.date - window.start).num_days() as f64;
        let bin = ((offset / span_days) * series_length as f64).floor();
        let bin = (bin.max(0.0) as usize).min(series_length - 1);
        let weight = scene.clear_pixels() as f64;
        sums[bin].0 += scene.ndvi_mean * weight;
        sums[bin].1 += weight;
    }
    let series: Vec<f64> = sums
        .into_iter()
        .filter(|(_, w)| *w > 0.0)
        .map(|(v, w)| v / w)
        .collect();
    if series.len() >= 2 {
        Some(series)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    fn window() -> TimeWindow {
        TimeWindow::ending_on(NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(), 90)
    }

    fn scene(day: u32, cloud: f64, valid: u64, median: f64) -> SceneStatistics {
        SceneStatistics {
            date: NaiveDate::from_ymd_opt(2026, 1, day).unwrap(),
            cloudy_pixel_percentage: cloud,
            valid_pixels: valid,
            cloud_pixels: 0,
            ndvi_mean: median,
            ndvi_std: 0.1,
            ndvi_p25: median - 0.1,
            ndvi_p50: median,
            ndvi_p75: median + 0.1,
        }
    }

    fn scenes_json(scenes: &[(&str, f64, u64, f64)]) -> String {
        let items: Vec<String> = scenes
            .iter()
            .map(|(date, cloud, valid, median)| {
                format!(
                    r#"{{"date":"{}","cloudy_pixel_percentage":{},"valid_pixels":{},"cloud_pixels":0,"ndvi_mean":{},"ndvi_std":0.1,"ndvi_p25":{},"ndvi_p50":{},"ndvi_p75":{}}}"#,
                    date,
                    cloud,
                    valid,
                    median,
                    median - 0.1,
                    median,
                    median + 0.1
                )
            })
            .collect();
        format!(r#"{{"scenes":[{}]}}"#, items.join(","))
    }

    /// Serve canned responses, one per connection, in order
    fn stub_server(responses: Vec<(u16, String)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        thread::spawn(move || {
            for (status, body) in responses {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 8192];
                let _ = stream.read(&mut buf);
                let response = format!(
                    "HTTP/1.1 {} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
                let _ = stream.flush();
            }
        });
        (format!("http://{}", addr), hits)
    }

    fn settings() -> ProviderSettings {
        ProviderSettings {
            timeout_secs: 5,
            max_attempts: 3,
            base_backoff_ms: 1,
            max_connections: 2,
            tile_degrees: 1.0,
            ..ProviderSettings::default()
        }
    }

    fn small_region() -> Region {
        Region::from_bounds(BoundingBox::from_swne(12.0, 76.0, 12.2, 76.2))
    }

    #[test]
    fn test_tile_bounds_cover_box() {
        let bbox = BoundingBox::from_swne(12.0, 76.0, 13.0, 77.5);
        let tiles = tile_bounds(&bbox, 0.25, 64);
        assert_eq!(tiles.len(), 6 * 4);
        assert!(tiles.iter().all(|t| bbox.contains(t)));
        let area: f64 = tiles
            .iter()
            .map(|t| t.width_degrees() * t.height_degrees())
            .sum();
        assert_relative_eq!(area, 1.5, max_relative = 1e-9);
    }

    #[test]
    fn test_tile_bounds_respects_max_tiles() {
        let bbox = BoundingBox::from_swne(10.0, 70.0, 15.0, 75.0);
        let tiles = tile_bounds(&bbox, 0.1, 64);
        assert!(tiles.len() <= 64);
        assert!(!tiles.is_empty());
    }

    #[test]
    fn test_tile_bounds_tiny_tile_size() {
        let bbox = BoundingBox::from_swne(10.0, 70.0, 15.0, 75.0);
        let tiles = tile_bounds(&bbox, 1e-300, 64);
        assert!(!tiles.is_empty() && tiles.len() <= 64);
        assert!(tiles.iter().all(|t| bbox.contains(t)));
    }

    #[test]
    fn test_aggregate_masks_cloudy_scenes() {
        let scenes = vec![
            scene(10, 5.0, 300, 0.6),
            scene(20, 10.0, 100, 0.4),
            // dropped: above the 20% cloud threshold
            scene(25, 35.0, 1000, 0.1),
        ];
        let sample = aggregate_scenes(scenes, 20.0, &window(), 6).unwrap();
        assert_eq!(sample.image_count, 2);
        assert_relative_eq!(sample.ndvi_median, 0.55, epsilon = 1e-12);
        assert_relative_eq!(sample.ndvi_p25, 0.45, epsilon = 1e-12);
        assert_eq!(sample.origin, SampleOrigin::Remote);
    }

    #[test]
    fn test_aggregate_excludes_cloud_pixels_from_weights() {
        let mut cloudy = scene(10, 15.0, 400, 0.2);
        cloudy.cloud_pixels = 300;
        let clear = scene(11, 0.0, 100, 0.6);
        let sample = aggregate_scenes(vec![cloudy, clear], 20.0, &window(), 6).unwrap();
        assert_relative_eq!(sample.ndvi_median, 0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_aggregate_without_usable_scenes_fails() {
        let scenes = vec![scene(10, 50.0, 300, 0.6)];
        assert!(aggregate_scenes(scenes, 20.0, &window(), 6).is_err());
    }

    #[test]
    fn test_fetch_from_provider() {
        let body = scenes_json(&[
            ("2026-01-10", 5.0, 300, 0.6),
            ("2026-02-20", 8.0, 300, 0.7),
            ("2026-03-01", 45.0, 300, 0.1),
        ]);
        let (endpoint, hits) = stub_server(vec![(200, body)]);
        let provider = RemoteNdviProvider::new(&endpoint, "key", &settings()).unwrap();
        let sample = provider.fetch(&small_region(), &window()).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(sample.image_count, 2);
        assert_relative_eq!(sample.ndvi_median, 0.65, epsilon = 1e-12);
        assert_eq!(sample.time_series.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn test_retries_transient_errors() {
        let body = scenes_json(&[("2026-01-10", 5.0, 300, 0.5)]);
        let (endpoint, hits) = stub_server(vec![
            (503, "busy".to_string()),
            (502, "bad gateway".to_string()),
            (200, body),
        ]);
        let provider = RemoteNdviProvider::new(&endpoint, "key", &settings()).unwrap();
        let sample = provider.fetch(&small_region(), &window()).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_relative_eq!(sample.ndvi_median, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_exhausted_retries_become_data_source_error() {
        let (endpoint, hits) = stub_server(vec![
            (503, "busy".to_string()),
            (503, "busy".to_string()),
            (503, "busy".to_string()),
        ]);
        let provider = RemoteNdviProvider::new(&endpoint, "key", &settings()).unwrap();
        let err = provider.fetch(&small_region(), &window()).unwrap_err();
        assert!(matches!(err, CropError::DataSource(ref m) if m.contains("503")));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_client_errors_are_not_retried() {
        let (endpoint, hits) = stub_server(vec![(401, "bad key".to_string())]);
        let provider = RemoteNdviProvider::new(&endpoint, "key", &settings()).unwrap();
        assert!(provider.fetch(&small_region(), &window()).is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_health_check() {
        let (endpoint, _) = stub_server(vec![(200, "{}".to_string())]);
        let provider = RemoteNdviProvider::new(&endpoint, "key", &settings()).unwrap();
        assert!(provider.health_check().is_ok());

        let (endpoint, _) = stub_server(vec![(500, "{}".to_string())]);
        let provider = RemoteNdviProvider::new(&endpoint, "key", &settings()).unwrap();
        assert!(provider.health_check().is_err());
    }

    #[test]
    fn test_missing_credentials_disable_provider() {
        let settings = ProviderSettings {
            endpoint: Some("https://ndvi.example.org".to_string()),
            api_key: None,
            ..ProviderSettings::default()
        };
        assert!(RemoteNdviProvider::from_settings(&settings).unwrap().is_none());
    }

    #[test]
    fn test_backoff_doubles() {
        let provider = RemoteNdviProvider::new(
            "http://127.0.0.1:9",
            "key",
            &ProviderSettings {
                base_backoff_ms: 100,
                ..ProviderSettings::default()
            },
        )
        .unwrap();
        assert_eq!(provider.backoff(1), Duration::from_millis(100));
        assert_eq!(provider.backoff(3), Duration::from_millis(400));
        assert_eq!(provider.backoff(20), MAX_BACKOFF);
    }
}
