pub mod admin_dataset;
pub mod resolver;

pub use admin_dataset::{AdminDataset, DistrictRecord, TalukInfo};
pub use resolver::{BoundaryResolver, RegionSelector};
