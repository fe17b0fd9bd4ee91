use anyhow::{Context, Result};
use csv::ReaderBuilder;
use geo::{Centroid, Geometry as GeoGeometry, MultiPolygon};
use geojson::{Feature, GeoJson};
use rstar::primitives::GeomWithData;
use rstar::RTree;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::collect::global_variables::{
    DISTRICTS_FILE_NAME, DISTRICTS_GEOJSON, TALUKS_CSV, TALUKS_FILE_NAME,
};
use crate::geo_core::AdminPriors;

/// Shortest query accepted for substring matching of district names
const MIN_PARTIAL_MATCH_LEN: usize = 3;

/// District feature properties in the boundaries GeoJSON
#[derive(Debug, Deserialize)]
struct DistrictProperties {
    district: String,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
    irrigated_fraction: f64,
    annual_rainfall_mm: f64,
    ndvi_low: f64,
    ndvi_high: f64,
}

/// Row of the taluk CSV (headers: district,taluk,lat,lng,major_crops,area_ha)
#[derive(Debug, Deserialize)]
struct TalukCsvRecord {
    district: String,
    taluk: String,
    lat: f64,
    lng: f64,
    major_crops: String,
    area_ha: f64,
}

/// A district with its authoritative polygon
#[derive(Debug, Clone)]
pub struct DistrictRecord {
    pub name: String,
    pub state: String,
    pub aliases: Vec<String>,
    pub polygon: MultiPolygon<f64>,
    pub priors: AdminPriors,
    feature: Feature,
}

impl DistrictRecord {
    fn matches_exactly(&self, query_lower: &str) -> bool {
        self.name.to_lowercase() == query_lower
            || self.aliases.iter().any(|a| a.to_lowercase() == query_lower)
    }

    fn matches_partially(&self, query_lower: &str) -> bool {
        self.name.to_lowercase().contains(query_lower)
            || self
                .aliases
                .iter()
                .any(|a| a.to_lowercase().contains(query_lower))
    }
}

/// Taluk (sub-district) entry; the dataset has centres and areas, no outlines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TalukInfo {
    pub name: String,
    pub district: String,
    pub lat: f64,
    pub lng: f64,
    pub major_crops: String,
    pub area_ha: f64,
}

/// Static state -> district -> taluk dataset.
/// Read-only after load; shared between requests behind an `Arc`.
pub struct AdminDataset {
    districts: Vec<DistrictRecord>,
    taluks: Vec<TalukInfo>,
    taluk_index: RTree<GeomWithData<[f64; 2], usize>>,
}

impl AdminDataset {
    /// Dataset compiled into the crate
    pub fn bundled() -> Result<Self> {
        Self::from_sources(DISTRICTS_GEOJSON, TALUKS_CSV)
    }

    /// Load `boundaries/karnataka_districts.geojson` and `taluks.csv` from a directory
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let districts_path = dir.join(DISTRICTS_FILE_NAME);
        let taluks_path = dir.join(TALUKS_FILE_NAME);
        let districts_text = std::fs::read_to_string(&districts_path)
            .with_context(|| format!("Failed to read {}", districts_path.display()))?;
        let taluks_text = std::fs::read_to_string(&taluks_path)
            .with_context(|| format!("Failed to read {}", taluks_path.display()))?;
        Self::from_sources(&districts_text, &taluks_text)
    }

    pub fn from_sources(districts_geojson: &str, taluks_csv: &str) -> Result<Self> {
        let districts = Self::parse_districts(districts_geojson)?;
        let taluks = Self::parse_taluks(taluks_csv)?;
        let taluk_index = RTree::bulk_load(
            taluks
                .iter()
                .enumerate()
                .map(|(i, t)| GeomWithData::new([t.lng, t.lat], i))
                .collect(),
        );
        debug!(
            districts = districts.len(),
            taluks = taluks.len(),
            "administrative dataset loaded"
        );
        Ok(AdminDataset {
            districts,
            taluks,
            taluk_index,
        })
    }

    fn parse_districts(text: &str) -> Result<Vec<DistrictRecord>> {
        let geojson: GeoJson = text
            .parse()
            .context("Failed to parse district boundaries GeoJSON")?;
        let fc = match geojson {
            GeoJson::FeatureCollection(fc) => fc,
            _ => anyhow::bail!("District boundaries must be a FeatureCollection"),
        };

        let mut districts = Vec::with_capacity(fc.features.len());
        for feature in fc.features {
            let props_json = serde_json::Value::Object(feature.properties.clone().unwrap_or_default());
            let props: DistrictProperties = serde_json::from_value(props_json)
                .context("Failed to read district feature properties")?;

            let geometry = feature
                .geometry
                .as_ref()
                .with_context(|| format!("District {} has no geometry", props.district))?;
            let geo_geom: GeoGeometry<f64> = geometry
                .try_into()
                .with_context(|| format!("Invalid geometry for district {}", props.district))?;
            let polygon = match geo_geom {
                GeoGeometry::Polygon(p) => MultiPolygon::new(vec![p]),
                GeoGeometry::MultiPolygon(mp) => mp,
                _ => anyhow::bail!(
                    "District {} must be a Polygon or MultiPolygon",
                    props.district
                ),
            };

            if props.ndvi_low > props.ndvi_high {
                anyhow::bail!(
                    "District {} has ndvi_low > ndvi_high",
                    props.district
                );
            }

            districts.push(DistrictRecord {
                name: props.district,
                state: props.state.unwrap_or_else(|| "Karnataka".to_string()),
                aliases: props.aliases,
                polygon,
                priors: AdminPriors {
                    irrigated_fraction: props.irrigated_fraction,
                    annual_rainfall_mm: props.annual_rainfall_mm,
                    ndvi_low: props.ndvi_low,
                    ndvi_high: props.ndvi_high,
                },
                feature,
            });
        }
        Ok(districts)
    }

    fn parse_taluks(text: &str) -> Result<Vec<TalukInfo>> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let mut taluks = Vec::new();
        for result in rdr.deserialize() {
            let record: TalukCsvRecord = result.context("Failed to deserialize taluk record")?;
            if record.taluk.is_empty() {
                continue;
            }
            taluks.push(TalukInfo {
                name: record.taluk,
                district: record.district,
                lat: record.lat,
                lng: record.lng,
                major_crops: record.major_crops,
                area_ha: record.area_ha,
            });
        }
        Ok(taluks)
    }

    /// Case-insensitive lookup on name and aliases, then on a unique
    /// partial match ("tumak" finds Tumkur through its Tumakuru alias).
    pub fn find_district(&self, name: &str) -> Option<&DistrictRecord> {
        let query = name.trim().to_lowercase();
        if query.is_empty() {
            return None;
        }
        if let Some(found) = self.districts.iter().find(|d| d.matches_exactly(&query)) {
            return Some(found);
        }
        if query.len() < MIN_PARTIAL_MATCH_LEN {
            return None;
        }
        let mut partial = self.districts.iter().filter(|d| d.matches_partially(&query));
        match (partial.next(), partial.next()) {
            (Some(only), None) => Some(only),
            _ => None,
        }
    }

    pub fn find_taluk(&self, name: &str) -> Option<&TalukInfo> {
        let query = name.trim().to_lowercase();
        self.taluks.iter().find(|t| t.name.to_lowercase() == query)
    }

    /// Sorted, title-cased district names
    pub fn districts(&self) -> Vec<String> {
        let mut names: Vec<String> = self.districts.iter().map(|d| title_case(&d.name)).collect();
        names.sort();
        names
    }

    /// GeoJSON feature of a district, as stored in the dataset
    pub fn district_boundary(&self, name: &str) -> Option<Feature> {
        self.find_district(name).map(|d| d.feature.clone())
    }

    pub fn taluks(&self, district: &str) -> Vec<TalukInfo> {
        let Some(record) = self.find_district(district) else {
            return Vec::new();
        };
        self.taluks
            .iter()
            .filter(|t| t.district.eq_ignore_ascii_case(&record.name))
            .cloned()
            .collect()
    }

    /// District centroid as (lat, lng)
    pub fn district_center(&self, name: &str) -> Option<(f64, f64)> {
        let record = self.find_district(name)?;
        let centroid = record.polygon.centroid()?;
        Some((centroid.y(), centroid.x()))
    }

    pub fn nearest_taluk(&self, lat: f64, lng: f64) -> Option<&TalukInfo> {
        self.taluk_index
            .nearest_neighbor(&[lng, lat])
            .and_then(|entry| self.taluks.get(entry.data))
    }

    pub fn district_record(&self, name: &str) -> Option<&DistrictRecord> {
        self.districts
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }
}

fn title_case(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
