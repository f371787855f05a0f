//! Builds the service graph from an [`AppConfig`]. Nothing here is global:
//! callers own the returned [`Services`] and share it by `Arc`.

use crate::adapters::{InMemoryPhenologyRepository, LocalRasterRepository};
use crate::cache::TtlCache;
use crate::config::{AppConfig, CacheConfig, StorageBackend};
use crate::core::compute::PhenologyComputationService;
use crate::core::query::{AreaStatsCache, PointCache, QueryService, TimeseriesCache};
use crate::core::raster::RasterService;
use crate::domain::ports::{PhenologyRepository, RasterRepository};
use crate::utils::error::Result;
use crate::utils::validation::Validate;
use std::sync::Arc;

pub struct Services {
    pub raster_repo: Arc<dyn RasterRepository>,
    pub phenology_repo: Arc<dyn PhenologyRepository>,
    /// Shared by the query and computation services; keys are source-tagged.
    pub point_cache: Option<Arc<PointCache>>,
    pub compute: Arc<PhenologyComputationService>,
    pub query: Arc<QueryService>,
    pub raster: Arc<RasterService>,
}

struct Caches {
    point: Option<Arc<PointCache>>,
    timeseries: Option<Arc<TimeseriesCache>>,
    area_stats: Option<Arc<AreaStatsCache>>,
}

impl Caches {
    fn from_config(config: &CacheConfig) -> Self {
        if !config.enabled {
            return Self {
                point: None,
                timeseries: None,
                area_stats: None,
            };
        }
        Self {
            point: Some(Arc::new(TtlCache::with_ttl_seconds(
                config.point_max_entries,
                config.point_ttl_seconds,
            ))),
            timeseries: Some(Arc::new(TtlCache::with_ttl_seconds(
                config.timeseries_max_entries,
                config.timeseries_ttl_seconds,
            ))),
            area_stats: Some(Arc::new(TtlCache::with_ttl_seconds(
                config.area_stats_max_entries,
                config.area_stats_ttl_seconds,
            ))),
        }
    }
}

impl Services {
    /// Validates `config` and wires the configured storage backend.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let repo = build_phenology_repository(config)?;
        Ok(Self::with_repository(config, repo))
    }

    /// Development profile: rasters from `data.dir`, metrics in memory.
    pub fn in_memory(config: &AppConfig) -> (Self, Arc<InMemoryPhenologyRepository>) {
        let repo = Arc::new(InMemoryPhenologyRepository::new());
        let services = Self::with_repository(config, repo.clone());
        (services, repo)
    }

    pub fn with_repository(config: &AppConfig, phenology_repo: Arc<dyn PhenologyRepository>) -> Self {
        let caches = Caches::from_config(&config.cache);
        let raster_repo: Arc<dyn RasterRepository> =
            Arc::new(LocalRasterRepository::new(config.data.dir.clone()));

        let compute = Arc::new(PhenologyComputationService::new(
            Arc::clone(&raster_repo),
            caches.point.clone(),
        ));

        let mut query = QueryService::new(Arc::clone(&phenology_repo));
        if let Some(cache) = &caches.point {
            query = query.with_point_cache(Arc::clone(cache));
        }
        if let Some(cache) = caches.timeseries {
            query = query.with_timeseries_cache(cache);
        }
        if let Some(cache) = caches.area_stats {
            query = query.with_area_stats_cache(cache);
        }

        tracing::debug!(
            "Wired services: data dir {}, caches {}",
            config.data.dir.display(),
            if config.cache.enabled { "on" } else { "off" }
        );

        Self {
            raster: Arc::new(RasterService::new(Arc::clone(&raster_repo))),
            raster_repo,
            phenology_repo,
            point_cache: caches.point,
            compute,
            query: Arc::new(query),
        }
    }
}

fn build_phenology_repository(config: &AppConfig) -> Result<Arc<dyn PhenologyRepository>> {
    match config.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(InMemoryPhenologyRepository::new())),
        StorageBackend::Postgis => build_postgis(config),
    }
}

#[cfg(feature = "postgis-repo")]
fn build_postgis(config: &AppConfig) -> Result<Arc<dyn PhenologyRepository>> {
    use crate::adapters::{PostgisConfig, PostgisPhenologyRepository};

    let pg = PostgisConfig {
        database_url: config.storage.database_url.clone().unwrap_or_default(),
        max_pool_size: config.storage.max_pool_size,
        ..PostgisConfig::default()
    };
    Ok(Arc::new(PostgisPhenologyRepository::new(&pg)?))
}

#[cfg(not(feature = "postgis-repo"))]
fn build_postgis(_config: &AppConfig) -> Result<Arc<dyn PhenologyRepository>> {
    Err(crate::utils::error::PhenologyError::ConfigError {
        message: "storage.backend = \"postgis\" needs the `postgis-repo` feature".to_string(),
    })
}
