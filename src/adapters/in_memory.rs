use crate::domain::model::{AreaFilter, AreaStats, Location, PhenologyMetric};
use crate::domain::ports::PhenologyRepository;
use crate::utils::error::{PhenologyError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// (product, lat bits, lon bits, year). Coordinates match exactly.
type MetricKey = (String, u64, u64, i32);

fn key(product: &str, location: &Location, year: i32) -> MetricKey {
    (
        product.to_string(),
        location.lat().to_bits(),
        location.lon().to_bits(),
        year,
    )
}

/// Process-local repository for development and tests.
///
/// Has no spatial index, so area statistics are not supported.
#[derive(Debug, Default)]
pub struct InMemoryPhenologyRepository {
    store: RwLock<HashMap<MetricKey, PhenologyMetric>>,
}

impl InMemoryPhenologyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_metric(&self, product: &str, metric: PhenologyMetric) {
        let k = key(product, &metric.location, metric.year);
        self.write().insert(k, metric);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<MetricKey, PhenologyMetric>> {
        self.store.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<MetricKey, PhenologyMetric>> {
        self.store.write().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl PhenologyRepository for InMemoryPhenologyRepository {
    async fn get_metric_for_location(
        &self,
        product: &str,
        location: &Location,
        year: i32,
    ) -> Result<Option<PhenologyMetric>> {
        Ok(self.read().get(&key(product, location, year)).cloned())
    }

    async fn get_timeseries_for_location(
        &self,
        product: &str,
        location: &Location,
        start_year: i32,
        end_year: i32,
    ) -> Result<Vec<PhenologyMetric>> {
        if end_year < start_year {
            return Ok(Vec::new());
        }
        let store = self.read();
        Ok((start_year..=end_year)
            .filter_map(|year| store.get(&key(product, location, year)).cloned())
            .collect())
    }

    async fn get_area_stats(
        &self,
        _product: &str,
        _year: i32,
        _polygon: &serde_json::Value,
        _filter: &AreaFilter,
    ) -> Result<Option<AreaStats>> {
        Err(PhenologyError::unsupported("get_area_stats"))
    }

    async fn upsert_many(&self, product: &str, metrics: &[PhenologyMetric]) -> Result<usize> {
        let mut store = self.write();
        for metric in metrics {
            store.insert(key(product, &metric.location, metric.year), metric.clone());
        }
        Ok(metrics.len())
    }
}
