use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::admin_dataset::{AdminDataset, DistrictRecord, TalukInfo};
use crate::error::{CropError, CropResult};
use crate::geo_core::{
    AdminIdentity, AdminKind, BoundingBox, Region, HECTARES_PER_KM2, KM_PER_DEGREE,
};

/// What the caller selected: a named unit or a drawn rectangle.
/// Untagged so `{"adminName": ..}`, `{"south": .., ..}` and
/// `{"bounds": [s, w, n, e]}` bodies all parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegionSelector {
    Admin {
        #[serde(rename = "adminName")]
        admin_name: String,
    },
    Bounds {
        south: f64,
        west: f64,
        north: f64,
        east: f64,
    },
    BoundsArray {
        bounds: [f64; 4],
    },
}

impl RegionSelector {
    pub fn admin(name: impl Into<String>) -> Self {
        RegionSelector::Admin {
            admin_name: name.into(),
        }
    }

    pub fn bounds(south: f64, west: f64, north: f64, east: f64) -> Self {
        RegionSelector::Bounds {
            south,
            west,
            north,
            east,
        }
    }
}

/// Maps selectors to canonical regions. Pure lookup and validation.
#[derive(Clone)]
pub struct BoundaryResolver {
    dataset: Arc<AdminDataset>,
    max_span_degrees: f64,
}

impl BoundaryResolver {
    pub fn new(dataset: Arc<AdminDataset>, max_span_degrees: f64) -> Self {
        BoundaryResolver {
            dataset,
            max_span_degrees,
        }
    }

    pub fn dataset(&self) -> &AdminDataset {
        &self.dataset
    }

    pub fn resolve(&self, selector: &RegionSelector) -> CropResult<Region> {
        match selector {
            RegionSelector::Admin { admin_name } => self.resolve_name(admin_name),
            RegionSelector::Bounds {
                south,
                west,
                north,
                east,
            } => self.resolve_bounds(BoundingBox::from_swne(*south, *west, *north, *east)),
            RegionSelector::BoundsArray { bounds } => {
                let [south, west, north, east] = *bounds;
                self.resolve_bounds(BoundingBox::from_swne(south, west, north, east))
            }
        }
    }

    fn resolve_bounds(&self, bbox: BoundingBox) -> CropResult<Region> {
        bbox.validate(self.max_span_degrees)?;
        Ok(Region::from_bounds(bbox))
    }

    /// Districts take precedence over taluks of the same name
    fn resolve_name(&self, name: &str) -> CropResult<Region> {
        if let Some(district) = self.dataset.find_district(name) {
            debug!(query = name, district = %district.name, "resolved district");
            return Region::named(district_identity(district));
        }

        if let Some(taluk) = self.dataset.find_taluk(name) {
            let parent = self
                .dataset
                .district_record(&taluk.district)
                .ok_or_else(|| {
                    CropError::Dataset(format!(
                        "taluk {} references unknown district {}",
                        taluk.name, taluk.district
                    ))
                })?;
            debug!(query = name, taluk = %taluk.name, "resolved taluk");
            return Region::named(taluk_identity(taluk, parent));
        }

        Err(CropError::NotFound(name.to_string()))
    }
}

fn district_identity(district: &DistrictRecord) -> AdminIdentity {
    AdminIdentity {
        name: district.name.clone(),
        kind: AdminKind::District,
        district: district.name.clone(),
        state: district.state.clone(),
        polygon: district.polygon.clone(),
        priors: district.priors,
    }
}

fn taluk_identity(taluk: &TalukInfo, parent: &DistrictRecord) -> AdminIdentity {
    AdminIdentity {
        name: taluk.name.clone(),
        kind: AdminKind::Taluk,
        district: parent.name.clone(),
        state: parent.state.clone(),
        polygon: MultiPolygon::new(vec![taluk_footprint(taluk)]),
        priors: parent.priors,
    }
}

/// Square of the taluk's area centred on its centre point
pub fn taluk_footprint(taluk: &TalukInfo) -> Polygon<f64> {
    let side_km = (taluk.area_ha / HECTARES_PER_KM2).max(0.0).sqrt();
    let half_lat = side_km / KM_PER_DEGREE / 2.0;
    let cos_lat = taluk.lat.to_radians().cos().max(1e-6);
    let half_lng = side_km / (KM_PER_DEGREE * cos_lat) / 2.0;

    Polygon::new(
        LineString::from(vec![
            Coord {
                x: taluk.lng - half_lng,
                y: taluk.lat - half_lat,
            },
            Coord {
                x: taluk.lng + half_lng,
                y: taluk.lat - half_lat,
            },
            Coord {
                x: taluk.lng + half_lng,
                y: taluk.lat + half_lat,
            },
            Coord {
                x: taluk.lng - half_lng,
                y: taluk.lat + half_lat,
            },
            Coord {
                x: taluk.lng - half_lng,
                y: taluk.lat - half_lat,
            },
        ]),
        vec![],
    )
}
