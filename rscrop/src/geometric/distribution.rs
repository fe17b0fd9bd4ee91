use geojson::{Feature, FeatureCollection, Geometry, Value};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use super::crop_class::{CropClass, CLASS_COUNT};
use crate::classify::ClassificationResult;
use crate::commons::basic_functions::{round_to, stable_seed};
use crate::error::{CropError, CropResult};
use crate::geo_core::{BoundingBox, Region, HECTARES_PER_KM2, KM_PER_DEGREE};

pub const MIN_GRID_SIZE: usize = 5;
pub const MAX_GRID_SIZE: usize = 50;

/// Share of cells given to the primary class
pub const PRIMARY_CELL_FRACTION: f64 = 0.8;

/// Fill opacity of every map cell
pub const CELL_OPACITY: f64 = 0.6;

/// Keeps the grid pattern independent of the synthetic NDVI stream
const PATTERN_SEED_SALT: u64 = 0x4752_4944_5041_5454;

/// Per-class share of the region
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionEntry {
    pub crop_name: String,
    pub color: String,
    pub area_hectares: f64,
    pub percentage: f64,
}

/// Class id to share; every class is present, zero-area ones included
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CropDistribution(pub BTreeMap<u8, DistributionEntry>);

impl CropDistribution {
    pub fn get(&self, class: CropClass) -> Option<&DistributionEntry> {
        self.0.get(&class.id())
    }

    /// Entries by area, largest first (legend order)
    pub fn ranked(&self) -> Vec<(u8, &DistributionEntry)> {
        let mut entries: Vec<(u8, &DistributionEntry)> =
            self.0.iter().map(|(id, e)| (*id, e)).collect();
        entries.sort_by(|a, b| {
            b.1.area_hectares
                .total_cmp(&a.1.area_hectares)
                .then(a.0.cmp(&b.0))
        });
        entries
    }

    pub fn total_percentage(&self) -> f64 {
        self.0.values().map(|e| e.percentage).sum()
    }

    pub fn total_area_hectares(&self) -> f64 {
        self.0.values().map(|e| e.area_hectares).sum()
    }
}

#[derive(Debug, Clone)]
pub struct DistributionOutput {
    pub distribution: CropDistribution,
    /// One polygon per cell, row-major from the south-west corner
    pub features: FeatureCollection,
    pub total_area_hectares: f64,
    pub grid_size: usize,
}

pub fn validate_grid_size(grid_size: usize) -> CropResult<()> {
    if !(MIN_GRID_SIZE..=MAX_GRID_SIZE).contains(&grid_size) {
        return Err(CropError::InvalidParameter(format!(
            "gridSize must be between {} and {}, got {}",
            MIN_GRID_SIZE, MAX_GRID_SIZE, grid_size
        )));
    }
    Ok(())
}

/// Spread the classification over a `grid_size` x `grid_size` lattice.
///
/// The cell ranking is a pure function of the region key and the primary
/// class, so identical inputs always give the same map.
pub fn synthesize(
    classification: &ClassificationResult,
    region: &Region,
    grid_size: usize,
) -> CropResult<DistributionOutput> {
    validate_grid_size(grid_size)?;
    let bbox = region.bbox();
    let cell_count = grid_size * grid_size;
    let primary = classification.primary;

    let counts = class_cell_counts(&classification.probabilities, primary, cell_count);
    let order = ranked_cells(region, primary, cell_count);

    let mut cell_classes = vec![primary; cell_count];
    let mut cursor = order.into_iter();
    // primary first, then the others by id
    let sequence = std::iter::once(primary).chain(CropClass::ALL.into_iter().filter(|c| *c != primary));
    for class in sequence {
        for index in cursor.by_ref().take(counts[class.index()]) {
            cell_classes[index] = class;
        }
    }

    let cell_h = bbox.height_degrees() / grid_size as f64;
    let cell_w = bbox.width_degrees() / grid_size as f64;

    let mut areas = [0.0f64; CLASS_COUNT];
    let mut features = Vec::with_capacity(cell_count);
    for (index, class) in cell_classes.iter().enumerate() {
        let row = index / grid_size;
        let col = index % grid_size;
        let cell = BoundingBox::new(
            bbox.min_x + col as f64 * cell_w,
            bbox.min_y + row as f64 * cell_h,
            bbox.min_x + (col + 1) as f64 * cell_w,
            bbox.min_y + (row + 1) as f64 * cell_h,
        );
        areas[class.index()] += cell_area_hectares(&cell);
        features.push(cell_feature(&cell, *class, row, col));
    }

    let total: f64 = areas.iter().sum();
    let distribution = CropDistribution(
        CropClass::ALL
            .iter()
            .map(|class| {
                let area = areas[class.index()];
                let share = if total > 0.0 { area / total * 100.0 } else { 0.0 };
                (
                    class.id(),
                    DistributionEntry {
                        crop_name: class.name().to_string(),
                        color: class.color().to_string(),
                        area_hectares: round_to(area, 2),
                        percentage: round_to(share, 2),
                    },
                )
            })
            .collect(),
    );

    debug!(
        grid_size,
        total_area = total,
        primary = %primary,
        "crop distribution synthesized"
    );

    Ok(DistributionOutput {
        distribution,
        features: FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        },
        total_area_hectares: round_to(total, 2),
        grid_size,
    })
}

/// Cells per class: `round(0.8 n)` for the primary class, the rest split
/// over the other classes by residual probability (largest remainder).
fn class_cell_counts(
    probabilities: &[f64; CLASS_COUNT],
    primary: CropClass,
    cell_count: usize,
) -> [usize; CLASS_COUNT] {
    let mut counts = [0usize; CLASS_COUNT];
    let primary_cells = ((cell_count as f64) * PRIMARY_CELL_FRACTION).round() as usize;
    counts[primary.index()] = primary_cells.min(cell_count);
    let residual_cells = cell_count - counts[primary.index()];

    let others: Vec<CropClass> = CropClass::ALL
        .into_iter()
        .filter(|c| *c != primary)
        .collect();
    let masses: Vec<f64> = others
        .iter()
        .map(|c| {
            let p = probabilities[c.index()];
            if p.is_finite() && p > 0.0 {
                p
            } else {
                0.0
            }
        })
        .collect();
    let mass_total: f64 = masses.iter().sum();

    let quotas: Vec<f64> = masses
        .iter()
        .map(|m| {
            if mass_total > 0.0 {
                residual_cells as f64 * m / mass_total
            } else {
                residual_cells as f64 / others.len() as f64
            }
        })
        .collect();

    let mut assigned = 0;
    for (class, quota) in others.iter().zip(&quotas) {
        let floor = quota.floor() as usize;
        counts[class.index()] = floor;
        assigned += floor;
    }

    // largest fractional part first, lower id on ties
    let mut remainders: Vec<(usize, f64)> = quotas
        .iter()
        .enumerate()
        .map(|(i, q)| (i, q - q.floor()))
        .collect();
    remainders.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    for (i, _) in remainders.into_iter().take(residual_cells.saturating_sub(assigned)) {
        counts[others[i].index()] += 1;
    }
    counts
}

/// Cell indices ordered by a seeded score
fn ranked_cells(region: &Region, primary: CropClass, cell_count: usize) -> Vec<usize> {
    let key_seed = region.cache_key().seed().to_le_bytes();
    let seed = stable_seed(&[&key_seed, &[primary.id()]]) ^ PATTERN_SEED_SALT;
    let mut rng = StdRng::seed_from_u64(seed);

    let mut scored: Vec<(f64, usize)> = (0..cell_count).map(|i| (rng.gen::<f64>(), i)).collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    scored.into_iter().map(|(_, i)| i).collect()
}

/// Same spherical approximation as [`BoundingBox::area_hectares`], at the
/// cell's own centre latitude
fn cell_area_hectares(cell: &BoundingBox) -> f64 {
    let (_, lat) = cell.center();
    let height_km = cell.height_degrees() * KM_PER_DEGREE;
    let width_km = cell.width_degrees() * KM_PER_DEGREE * lat.to_radians().cos();
    height_km * width_km * HECTARES_PER_KM2
}

fn cell_feature(cell: &BoundingBox, class: CropClass, row: usize, col: usize) -> Feature {
    let polygon = cell.to_polygon();
    let mut feature = Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::from(&polygon))),
        id: None,
        properties: None,
        foreign_members: None,
    };
    feature.set_property("crop_id", class.id());
    feature.set_property("crop_name", class.name());
    feature.set_property("color", class.color());
    feature.set_property("opacity", CELL_OPACITY);
    feature.set_property("row", row);
    feature.set_property("col", col);
    feature
}
