use geo::{BoundingRect, Coord, LineString, MultiPolygon, Polygon, Rect};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::commons::basic_functions::stable_seed;
use crate::error::{CropError, CropResult};

/// Spherical-earth approximation used for every area computation
pub const KM_PER_DEGREE: f64 = 111.0;
pub const HECTARES_PER_KM2: f64 = 100.0;

/// Decimal places kept in cache keys and seeds (about 11 m at the equator)
const KEY_DECIMALS: i32 = 4;

/// Bounding box structure (WGS84 degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64, // west longitude
    pub min_y: f64, // south latitude
    pub max_x: f64, // east longitude
    pub max_y: f64, // north latitude
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Build from the `[south, west, north, east]` order used by the API
    pub fn from_swne(south: f64, west: f64, north: f64, east: f64) -> Self {
        BoundingBox::new(west, south, east, north)
    }

    pub fn from_rect(rect: Rect<f64>) -> Self {
        BoundingBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }

    pub fn south(&self) -> f64 {
        self.min_y
    }

    pub fn west(&self) -> f64 {
        self.min_x
    }

    pub fn north(&self) -> f64 {
        self.max_y
    }

    pub fn east(&self) -> f64 {
        self.max_x
    }

    pub fn to_swne(&self) -> [f64; 4] {
        [self.min_y, self.min_x, self.max_y, self.max_x]
    }

    pub fn width_degrees(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height_degrees(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Center as (longitude, latitude)
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Check the invariants of a user-supplied selection: finite values,
    /// valid lat/lon ranges, south < north, west < east, and both spans
    /// at most `max_span_degrees`.
    pub fn validate(&self, max_span_degrees: f64) -> CropResult<()> {
        let values = [self.min_x, self.min_y, self.max_x, self.max_y];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(CropError::InvalidBounds(format!(
                "bounds must be finite numbers, got {}",
                self
            )));
        }
        if self.min_y < -90.0 || self.max_y > 90.0 {
            return Err(CropError::InvalidBounds(format!(
                "latitude outside [-90, 90]: {}",
                self
            )));
        }
        if self.min_x < -180.0 || self.max_x > 180.0 {
            return Err(CropError::InvalidBounds(format!(
                "longitude outside [-180, 180]: {}",
                self
            )));
        }
        if self.min_y >= self.max_y {
            return Err(CropError::InvalidBounds(format!(
                "south ({}) must be less than north ({})",
                self.min_y, self.max_y
            )));
        }
        if self.min_x >= self.max_x {
            return Err(CropError::InvalidBounds(format!(
                "west ({}) must be less than east ({})",
                self.min_x, self.max_x
            )));
        }
        if self.height_degrees() > max_span_degrees || self.width_degrees() > max_span_degrees {
            return Err(CropError::InvalidBounds(format!(
                "selection spans {:.3}° x {:.3}°, limit is {}° per side",
                self.height_degrees(),
                self.width_degrees(),
                max_span_degrees
            )));
        }
        Ok(())
    }

    /// Approximate area in hectares: 111 km per degree of latitude, and
    /// 111 km times cos(center latitude) per degree of longitude.
    pub fn area_hectares(&self) -> f64 {
        let (_, lat_center) = self.center();
        let height_km = self.height_degrees() * KM_PER_DEGREE;
        let width_km = self.width_degrees() * KM_PER_DEGREE * lat_center.to_radians().cos();
        height_km * width_km * HECTARES_PER_KM2
    }

    /// True when `other` lies entirely inside this box (edges included)
    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && self.max_x >= other.max_x
            && self.max_y >= other.max_y
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                Coord {
                    x: self.min_x,
                    y: self.min_y,
                },
                Coord {
                    x: self.max_x,
                    y: self.min_y,
                },
                Coord {
                    x: self.max_x,
                    y: self.max_y,
                },
                Coord {
                    x: self.min_x,
                    y: self.max_y,
                },
                Coord {
                    x: self.min_x,
                    y: self.min_y,
                },
            ]),
            vec![],
        )
    }

    pub fn cache_key(&self) -> BoundsKey {
        let factor = 10f64.powi(KEY_DECIMALS);
        let q = |v: f64| (v * factor).round() as i64;
        BoundsKey([q(self.min_y), q(self.min_x), q(self.max_y), q(self.max_x)])
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[s={}, w={}, n={}, e={}]",
            self.min_y, self.min_x, self.max_y, self.max_x
        )
    }
}

/// Bounds rounded to 4 decimals in `[s, w, n, e]` order; the only key used
/// by the sample cache and the synthetic seeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoundsKey([i64; 4]);

impl BoundsKey {
    pub fn seed(&self) -> u64 {
        let bytes: Vec<[u8; 8]> = self.0.iter().map(|v| v.to_le_bytes()).collect();
        let parts: Vec<&[u8]> = bytes.iter().map(|b| b.as_slice()).collect();
        stable_seed(&parts)
    }
}

impl fmt::Display for BoundsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let factor = 10f64.powi(KEY_DECIMALS);
        let [s, w, n, e] = self.0;
        write!(
            f,
            "{:.4},{:.4},{:.4},{:.4}",
            s as f64 / factor,
            w as f64 / factor,
            n as f64 / factor,
            e as f64 / factor
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminKind {
    District,
    Taluk,
}

/// Static per-unit priors shipped with the administrative dataset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdminPriors {
    pub irrigated_fraction: f64,
    pub annual_rainfall_mm: f64,
    pub ndvi_low: f64,
    pub ndvi_high: f64,
}

/// Identity of a named administrative unit
#[derive(Debug, Clone)]
pub struct AdminIdentity {
    pub name: String,
    pub kind: AdminKind,
    pub district: String,
    pub state: String,
    /// Authoritative boundary (a square footprint for taluks)
    pub polygon: MultiPolygon<f64>,
    pub priors: AdminPriors,
}

/// A region to analyze: a bounding box plus an optional administrative
/// identity. Immutable once built.
#[derive(Debug, Clone)]
pub struct Region {
    bbox: BoundingBox,
    admin: Option<AdminIdentity>,
}

impl Region {
    /// Region from raw bounds. Call [`BoundingBox::validate`] first.
    pub fn from_bounds(bbox: BoundingBox) -> Self {
        Region { bbox, admin: None }
    }

    /// Named region; the bounding box is the polygon's minimum bounding
    /// rectangle, so it always contains the polygon.
    pub fn named(identity: AdminIdentity) -> CropResult<Self> {
        let rect = identity.polygon.bounding_rect().ok_or_else(|| {
            CropError::Dataset(format!("{} has an empty boundary", identity.name))
        })?;
        let bbox = BoundingBox::from_rect(rect);
        if bbox.min_y >= bbox.max_y || bbox.min_x >= bbox.max_x {
            return Err(CropError::Dataset(format!(
                "{} has a degenerate boundary {}",
                identity.name, bbox
            )));
        }
        Ok(Region {
            bbox,
            admin: Some(identity),
        })
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn admin(&self) -> Option<&AdminIdentity> {
        self.admin.as_ref()
    }

    pub fn admin_name(&self) -> Option<&str> {
        self.admin.as_ref().map(|a| a.name.as_str())
    }

    pub fn priors(&self) -> Option<&AdminPriors> {
        self.admin.as_ref().map(|a| &a.priors)
    }

    pub fn area_hectares(&self) -> f64 {
        self.bbox.area_hectares()
    }

    pub fn cache_key(&self) -> BoundsKey {
        self.bbox.cache_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bounding_box() {
        let bbox = BoundingBox::from_swne(12.0, 76.0, 13.0, 77.5);
        assert_eq!(bbox.min_x, 76.0);
        assert_eq!(bbox.max_y, 13.0);
        assert_eq!(bbox.to_swne(), [12.0, 76.0, 13.0, 77.5]);
    }

    #[test]
    fn test_validate_rejects_inverted_and_degenerate() {
        let inverted = BoundingBox::from_swne(13.0, 76.0, 12.0, 77.0);
        assert!(matches!(
            inverted.validate(5.0),
            Err(CropError::InvalidBounds(_))
        ));
        let flat = BoundingBox::from_swne(13.0, 76.0, 13.0, 77.0);
        assert!(flat.validate(5.0).is_err());
        let backwards = BoundingBox::from_swne(12.0, 77.0, 13.0, 76.0);
        assert!(backwards.validate(5.0).is_err());
    }

    #[test]
    fn test_validate_rejects_whole_world_and_nan() {
        let world = BoundingBox::from_swne(-90.0, -180.0, 90.0, 180.0);
        assert!(world.validate(5.0).is_err());
        let nan = BoundingBox::from_swne(f64::NAN, 76.0, 13.0, 77.0);
        assert!(nan.validate(5.0).is_err());
        let ok = BoundingBox::from_swne(12.0, 76.0, 17.0, 81.0);
        assert!(ok.validate(5.0).is_ok());
    }

    #[test]
    fn test_area_one_degree_at_equator() {
        let bbox = BoundingBox::from_swne(-0.5, 10.0, 0.5, 11.0);
        assert_relative_eq!(bbox.area_hectares(), 111.0 * 111.0 * 100.0, max_relative = 1e-9);
    }

    #[test]
    fn test_cache_key_rounds_to_four_decimals() {
        let a = BoundingBox::from_swne(12.000_01, 76.0, 13.0, 77.0);
        let b = BoundingBox::from_swne(12.000_04, 76.0, 13.0, 77.0);
        let c = BoundingBox::from_swne(12.001, 76.0, 13.0, 77.0);
        assert_eq!(a.cache_key(), b.cache_key());
        assert_ne!(a.cache_key(), c.cache_key());
        assert_eq!(a.cache_key().seed(), b.cache_key().seed());
        assert_eq!(a.cache_key().to_string(), "12.0000,76.0000,13.0000,77.0000");
    }

    #[test]
    fn test_named_region_bbox_contains_polygon() {
        let polygon = Polygon::new(
            LineString::from(vec![(76.2, 13.4), (76.8, 12.6), (77.5, 13.9), (76.2, 13.4)]),
            vec![],
        );
        let identity = AdminIdentity {
            name: "Test".to_string(),
            kind: AdminKind::District,
            district: "Test".to_string(),
            state: "Karnataka".to_string(),
            polygon: MultiPolygon::new(vec![polygon]),
            priors: AdminPriors {
                irrigated_fraction: 0.3,
                annual_rainfall_mm: 700.0,
                ndvi_low: 0.4,
                ndvi_high: 0.6,
            },
        };
        let region = Region::named(identity).unwrap();
        assert_eq!(region.bbox().to_swne(), [12.6, 76.2, 13.9, 77.5]);
        assert_eq!(region.admin_name(), Some("Test"));
    }
}
