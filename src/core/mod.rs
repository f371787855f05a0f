pub mod algorithm;
pub mod compute;
pub mod query;
pub mod raster;
pub mod stack;

pub use crate::domain::model::{Location, PhenologyMetric};
pub use crate::domain::ports::{PhenologyRepository, RasterRepository};
pub use crate::utils::error::Result;
pub use compute::{ComputeOptions, PhenologyComputationService};
pub use query::QueryService;
pub use raster::RasterService;
