use serde::{Deserialize, Serialize};
use std::fmt;

/// Crop class codes
/// Name             Code
/// Paddy/Rice         0
/// Millets/Pulses     1
/// Cash Crops         2
/// Fallow/Barren      3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CropClass {
    Paddy = 0,
    MilletsPulses = 1,
    CashCrops = 2,
    Fallow = 3,
}

pub const CLASS_COUNT: usize = 4;

impl CropClass {
    pub const ALL: [CropClass; CLASS_COUNT] = [
        CropClass::Paddy,
        CropClass::MilletsPulses,
        CropClass::CashCrops,
        CropClass::Fallow,
    ];

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            CropClass::Paddy => "Paddy/Rice",
            CropClass::MilletsPulses => "Millets/Pulses",
            CropClass::CashCrops => "Cash Crops",
            CropClass::Fallow => "Fallow/Barren",
        }
    }

    /// Overlay color of the distribution map
    pub fn color(self) -> &'static str {
        match self {
            CropClass::Paddy => "#2ECC71",
            CropClass::MilletsPulses => "#F1C40F",
            CropClass::CashCrops => "#E91E63",
            CropClass::Fallow => "#95A5A6",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            CropClass::Paddy => {
                "Flooded or canal-irrigated rice; high, sustained NDVI through the growing season"
            }
            CropClass::MilletsPulses => {
                "Rainfed ragi, jowar and pulses; moderate NDVI with a pronounced seasonal peak"
            }
            CropClass::CashCrops => {
                "Sugarcane, cotton, coconut and arecanut; moderate to high NDVI, long duration"
            }
            CropClass::Fallow => "Uncultivated or harvested land; low NDVI, exposed soil",
        }
    }

    pub fn season(self) -> &'static str {
        match self {
            CropClass::Paddy => "Kharif (June-October), Rabi under irrigation",
            CropClass::MilletsPulses => "Kharif (June-October)",
            CropClass::CashCrops => "Perennial or annual",
            CropClass::Fallow => "Between seasons",
        }
    }

    pub fn info(self) -> CropInfo {
        CropInfo {
            id: self.id(),
            name: self.name().to_string(),
            color: self.color().to_string(),
            description: self.description().to_string(),
            season: self.season().to_string(),
        }
    }
}

impl fmt::Display for CropClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for CropClass {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.id())
    }
}

impl<'de> Deserialize<'de> for CropClass {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let id = u8::deserialize(deserializer)?;
        CropClass::from_id(id)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown crop class id {}", id)))
    }
}

/// Catalog entry served by the crop-info lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropInfo {
    pub id: u8,
    pub name: String,
    pub color: String,
    pub description: String,
    pub season: String,
}

pub fn crop_catalog() -> Vec<CropInfo> {
    CropClass::ALL.iter().map(|c| c.info()).collect()
}
