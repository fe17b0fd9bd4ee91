pub mod crop_class;
pub mod distribution;
pub mod features;

pub use crop_class::{crop_catalog, CropClass, CropInfo, CLASS_COUNT};
pub use distribution::{synthesize, CropDistribution, DistributionEntry, DistributionOutput};
pub use features::{extract, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
