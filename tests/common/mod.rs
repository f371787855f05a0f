#![allow(dead_code)]

use async_trait::async_trait;
use forest_phenology::adapters::LocalRasterRepository;
use forest_phenology::app::synthetic;
use forest_phenology::domain::ports::{PhenologyRepository, RasterRepository};
use forest_phenology::{AreaFilter, AreaStats, Location, PhenologyMetric, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

pub const PRODUCT: &str = "ndvi_synth";
pub const YEAR: i32 = 2020;

/// Temp data root holding the synthetic 10x10 stack for `PRODUCT`/`YEAR`.
pub fn synthetic_root() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    synthetic::write_synthetic_stack(dir.path(), PRODUCT, YEAR, 10).expect("synthetic stack");
    dir
}

/// Centre of the top-left pixel of the synthetic grid.
pub fn origin_pixel() -> Location {
    Location::new(51.495, -0.495).unwrap()
}

/// Filesystem repository that counts stack listings.
pub struct CountingRasterRepo {
    inner: LocalRasterRepository,
    list_calls: AtomicUsize,
}

impl CountingRasterRepo {
    pub fn new(root: &Path) -> Self {
        Self {
            inner: LocalRasterRepository::new(root),
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

impl RasterRepository for CountingRasterRepo {
    fn raster_path(&self, product: &str, year: i32) -> PathBuf {
        self.inner.raster_path(product, year)
    }

    fn exists(&self, product: &str, year: i32) -> bool {
        self.inner.exists(product, year)
    }

    fn list_stack_paths(&self, product: &str, year: i32) -> Result<Vec<PathBuf>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list_stack_paths(product, year)
    }
}

/// Phenology repository returning canned answers and counting calls.
#[derive(Default)]
pub struct FakePhenologyRepo {
    pub metric: Option<PhenologyMetric>,
    pub timeseries: Vec<PhenologyMetric>,
    pub area_stats: Option<AreaStats>,
    pub metric_calls: AtomicUsize,
    pub timeseries_calls: AtomicUsize,
    pub area_calls: AtomicUsize,
    pub upserted: Mutex<Vec<PhenologyMetric>>,
}

impl FakePhenologyRepo {
    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PhenologyRepository for FakePhenologyRepo {
    async fn get_metric_for_location(
        &self,
        _product: &str,
        _location: &Location,
        _year: i32,
    ) -> Result<Option<PhenologyMetric>> {
        self.metric_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.metric.clone())
    }

    async fn get_timeseries_for_location(
        &self,
        _product: &str,
        _location: &Location,
        _start_year: i32,
        _end_year: i32,
    ) -> Result<Vec<PhenologyMetric>> {
        self.timeseries_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.timeseries.clone())
    }

    async fn get_area_stats(
        &self,
        _product: &str,
        _year: i32,
        _polygon: &serde_json::Value,
        _filter: &AreaFilter,
    ) -> Result<Option<AreaStats>> {
        self.area_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.area_stats.clone())
    }

    async fn upsert_many(&self, _product: &str, metrics: &[PhenologyMetric]) -> Result<usize> {
        self.upserted
            .lock()
            .unwrap()
            .extend_from_slice(metrics);
        Ok(metrics.len())
    }
}
