use crate::domain::model::{AreaFilter, AreaStats, Location, PhenologyMetric};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;

/// Locates raw raster files for a (product, year).
///
/// Lookups are cheap metadata operations; decoding the files is the
/// caller's job.
pub trait RasterRepository: Send + Sync {
    /// Expected path of the single yearly raster. The file may not exist.
    fn raster_path(&self, product: &str, year: i32) -> PathBuf;

    /// Whether the single yearly raster exists.
    fn exists(&self, product: &str, year: i32) -> bool;

    /// Per-timestep rasters forming the NDVI stack, in ascending DOY order.
    ///
    /// Returns an empty vector when no data is present.
    fn list_stack_paths(&self, product: &str, year: i32) -> Result<Vec<PathBuf>>;
}

/// Persisted phenology metrics.
///
/// `get_area_stats` is a capability: backends without spatial support
/// return `PhenologyError::Unsupported`, which is distinct from "no data".
#[async_trait]
pub trait PhenologyRepository: Send + Sync {
    async fn get_metric_for_location(
        &self,
        product: &str,
        location: &Location,
        year: i32,
    ) -> Result<Option<PhenologyMetric>>;

    /// Metrics for `start_year..=end_year`, ascending by year.
    async fn get_timeseries_for_location(
        &self,
        product: &str,
        location: &Location,
        start_year: i32,
        end_year: i32,
    ) -> Result<Vec<PhenologyMetric>>;

    /// Aggregate over stored points covered by a GeoJSON polygon.
    ///
    /// Returns `None` when no point matches.
    async fn get_area_stats(
        &self,
        product: &str,
        year: i32,
        polygon: &serde_json::Value,
        filter: &AreaFilter,
    ) -> Result<Option<AreaStats>>;

    /// Insert or replace metrics keyed by (product, year, lat, lon).
    async fn upsert_many(&self, product: &str, metrics: &[PhenologyMetric]) -> Result<usize>;
}
