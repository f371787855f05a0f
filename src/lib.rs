pub mod adapters;
pub mod app;
pub mod cache;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use crate::adapters::{InMemoryPhenologyRepository, LocalRasterRepository};
pub use crate::cache::TtlCache;
pub use crate::config::AppConfig;
pub use crate::core::{ComputeOptions, PhenologyComputationService, QueryService, RasterService};
pub use crate::domain::model::{AreaFilter, AreaStats, Location, PhenologyMetric, SeasonLengthStat};
pub use crate::utils::error::{PhenologyError, Result};
