//! Read-side facade over a phenology repository with optional caches.

use crate::cache::{area_stats_key, point_metric_key, timeseries_key, KeySource, TtlCache};
use crate::domain::model::{AreaFilter, AreaStats, Location, PhenologyMetric};
use crate::domain::ports::PhenologyRepository;
use crate::utils::error::Result;
use std::sync::Arc;

pub type PointCache = TtlCache<String, PhenologyMetric>;
pub type TimeseriesCache = TtlCache<String, Vec<PhenologyMetric>>;
pub type AreaStatsCache = TtlCache<String, AreaStats>;

/// Each cache layer is independent; a missing layer means that query always
/// goes to the repository.
pub struct QueryService {
    repo: Arc<dyn PhenologyRepository>,
    point_cache: Option<Arc<PointCache>>,
    timeseries_cache: Option<Arc<TimeseriesCache>>,
    area_stats_cache: Option<Arc<AreaStatsCache>>,
}

impl QueryService {
    pub fn new(repo: Arc<dyn PhenologyRepository>) -> Self {
        Self {
            repo,
            point_cache: None,
            timeseries_cache: None,
            area_stats_cache: None,
        }
    }

    /// The point cache may be shared with the computation service; keys are
    /// tagged by source so the two never see each other's entries.
    pub fn with_point_cache(mut self, cache: Arc<PointCache>) -> Self {
        self.point_cache = Some(cache);
        self
    }

    pub fn with_timeseries_cache(mut self, cache: Arc<TimeseriesCache>) -> Self {
        self.timeseries_cache = Some(cache);
        self
    }

    pub fn with_area_stats_cache(mut self, cache: Arc<AreaStatsCache>) -> Self {
        self.area_stats_cache = Some(cache);
        self
    }

    /// Stored metric for one location and year. Absence is not cached.
    pub async fn get_point_metric(
        &self,
        product: &str,
        location: &Location,
        year: i32,
    ) -> Result<Option<PhenologyMetric>> {
        let key = self
            .point_cache
            .as_ref()
            .map(|_| point_metric_key(KeySource::Repo, product, year, location, None));

        if let (Some(cache), Some(key)) = (&self.point_cache, &key) {
            if let Some(hit) = cache.get(key) {
                tracing::debug!("Point cache hit: {}", key);
                return Ok(Some(hit));
            }
        }

        let metric = self
            .repo
            .get_metric_for_location(product, location, year)
            .await?;

        if let (Some(cache), Some(key), Some(metric)) = (&self.point_cache, key, &metric) {
            cache.set(key, metric.clone());
        }
        Ok(metric)
    }

    /// Stored metrics for `start_year..=end_year`, ascending by year.
    pub async fn get_point_timeseries(
        &self,
        product: &str,
        location: &Location,
        start_year: i32,
        end_year: i32,
    ) -> Result<Vec<PhenologyMetric>> {
        if end_year < start_year {
            return Ok(Vec::new());
        }

        let key = self
            .timeseries_cache
            .as_ref()
            .map(|_| timeseries_key(product, location, start_year, end_year));

        if let (Some(cache), Some(key)) = (&self.timeseries_cache, &key) {
            if let Some(hit) = cache.get(key) {
                tracing::debug!("Timeseries cache hit: {}", key);
                return Ok(hit);
            }
        }

        let data = self
            .repo
            .get_timeseries_for_location(product, location, start_year, end_year)
            .await?;

        if let (Some(cache), Some(key)) = (&self.timeseries_cache, key) {
            cache.set(key, data.clone());
        }
        Ok(data)
    }

    /// Aggregate over the stored points inside `polygon` (GeoJSON geometry).
    ///
    /// Spatial work is delegated to the repository; backends without it
    /// return `Unsupported`, which is passed through.
    pub async fn get_area_stats(
        &self,
        product: &str,
        year: i32,
        polygon: &serde_json::Value,
        filter: AreaFilter,
    ) -> Result<Option<AreaStats>> {
        let key = self.area_stats_cache.as_ref().map(|_| {
            area_stats_key(
                product,
                year,
                polygon,
                filter.only_forest,
                filter.min_season_length,
                filter.season_length_stat,
            )
        });

        if let (Some(cache), Some(key)) = (&self.area_stats_cache, &key) {
            if let Some(hit) = cache.get(key) {
                tracing::debug!("Area stats cache hit: {}", key);
                return Ok(Some(hit));
            }
        }

        let stats = self
            .repo
            .get_area_stats(product, year, polygon, &filter)
            .await?;

        if let (Some(cache), Some(key), Some(stats)) = (&self.area_stats_cache, key, &stats) {
            cache.set(key, stats.clone());
        }
        Ok(stats)
    }
}
