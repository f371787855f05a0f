//! On-the-fly phenology computation from NDVI stacks.

use crate::cache::{compute_metric_key, TtlCache};
use crate::core::algorithm::{compute_sos_eos, validate_frac, DEFAULT_THRESHOLD_FRAC};
use crate::core::stack::NdviStack;
use crate::domain::model::{Location, NdviTimeSeries, PhenologyMetric};
use crate::domain::ports::RasterRepository;
use crate::utils::error::{PhenologyError, Result};
use chrono::{Days, NaiveDate};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::OnceCell;
use tokio::task;

/// Per-request knobs for the threshold algorithm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComputeOptions {
    pub threshold_frac: f64,
    /// Stacks carry no land-cover band, so the forest flag is supplied.
    pub is_forest_default: bool,
}

impl Default for ComputeOptions {
    fn default() -> Self {
        Self {
            threshold_frac: DEFAULT_THRESHOLD_FRAC,
            is_forest_default: true,
        }
    }
}

/// Calendar date of a 1-based day of year (DOY 1 = Jan 1).
pub fn date_from_doy(year: i32, doy: i32) -> Result<NaiveDate> {
    let offset = u64::try_from(doy - 1)
        .map_err(|_| PhenologyError::validation(format!("Day of year must be >= 1, got {}", doy)))?;
    NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|jan1| jan1.checked_add_days(Days::new(offset)))
        .ok_or_else(|| {
            PhenologyError::validation(format!("Day of year {} is out of range for {}", doy, year))
        })
}

type StackKey = (String, i32);
type StackSlot = Arc<OnceCell<Arc<NdviStack>>>;

/// Computes metrics for points by sampling the (product, year) NDVI stack.
///
/// Stacks are loaded once and kept for the lifetime of the service. Single
/// point results go through an optional TTL cache; batch results do not.
pub struct PhenologyComputationService {
    raster_repo: Arc<dyn RasterRepository>,
    point_cache: Option<Arc<TtlCache<String, PhenologyMetric>>>,
    stacks: Mutex<HashMap<StackKey, StackSlot>>,
}

impl PhenologyComputationService {
    pub fn new(
        raster_repo: Arc<dyn RasterRepository>,
        point_cache: Option<Arc<TtlCache<String, PhenologyMetric>>>,
    ) -> Self {
        Self {
            raster_repo,
            point_cache,
            stacks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_stacks(&self) -> MutexGuard<'_, HashMap<StackKey, StackSlot>> {
        self.stacks.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Number of fully loaded stacks.
    pub fn cached_stack_count(&self) -> usize {
        self.lock_stacks()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub async fn compute_point(
        &self,
        product: &str,
        year: i32,
        location: &Location,
        options: ComputeOptions,
    ) -> Result<PhenologyMetric> {
        validate_frac(options.threshold_frac)?;

        let key = compute_metric_key(
            product,
            year,
            location,
            options.threshold_frac,
            options.is_forest_default,
        );
        if let Some(cache) = &self.point_cache {
            if let Some(hit) = cache.get(&key) {
                tracing::debug!("Point cache hit: {}", key);
                return Ok(hit);
            }
            tracing::debug!("Point cache miss: {}", key);
        }

        let stack = self.stack_for(product, year).await?;
        let series = stack.sample_point(location);
        let metric = build_metric(year, *location, &series, options)?;

        if let Some(cache) = &self.point_cache {
            cache.set(key, metric.clone());
        }
        Ok(metric)
    }

    /// Computes all `locations` against one stack in a single sampling pass.
    ///
    /// Output order matches `locations`. The point cache is neither read nor
    /// written.
    pub async fn compute_points_batch(
        &self,
        product: &str,
        year: i32,
        locations: &[Location],
        options: ComputeOptions,
    ) -> Result<Vec<PhenologyMetric>> {
        validate_frac(options.threshold_frac)?;
        if locations.is_empty() {
            return Ok(Vec::new());
        }

        let stack = self.stack_for(product, year).await?;
        let locations = locations.to_vec();
        task::spawn_blocking(move || {
            let series = stack.sample_points_batch(&locations);
            locations
                .into_iter()
                .zip(series.iter())
                .map(|(location, ts)| build_metric(year, location, ts, options))
                .collect::<Result<Vec<_>>>()
        })
        .await?
    }

    /// Returns the cached stack, loading it on first use.
    ///
    /// Concurrent callers for the same key share one load; a failed load
    /// publishes nothing and the next caller retries.
    async fn stack_for(&self, product: &str, year: i32) -> Result<Arc<NdviStack>> {
        let key: StackKey = (product.to_string(), year);
        let slot = Arc::clone(self.lock_stacks().entry(key.clone()).or_default());

        let result = slot
            .get_or_try_init(|| {
                let repo = Arc::clone(&self.raster_repo);
                let product = product.to_string();
                async move {
                    let stack =
                        task::spawn_blocking(move || load_stack(repo.as_ref(), &product, year))
                            .await??;
                    Ok::<_, PhenologyError>(Arc::new(stack))
                }
            })
            .await
            .map(Arc::clone);

        if result.is_err() {
            let mut stacks = self.lock_stacks();
            if stacks
                .get(&key)
                .is_some_and(|s| Arc::ptr_eq(s, &slot) && !s.initialized())
            {
                stacks.remove(&key);
            }
        }
        result
    }
}

fn load_stack(repo: &dyn RasterRepository, product: &str, year: i32) -> Result<NdviStack> {
    let started = Instant::now();
    let paths = repo.list_stack_paths(product, year)?;
    if paths.is_empty() {
        return Err(PhenologyError::not_found(format!(
            "No NDVI stack files found for product={}, year={}",
            product, year
        )));
    }

    let stack = NdviStack::load(&paths)?;
    tracing::info!(
        "Cached NDVI stack for {}/{} ({} files, {:?})",
        product,
        year,
        paths.len(),
        started.elapsed()
    );
    Ok(stack)
}

fn build_metric(
    year: i32,
    location: Location,
    series: &NdviTimeSeries,
    options: ComputeOptions,
) -> Result<PhenologyMetric> {
    let dates = compute_sos_eos(&series.ndvi, &series.doys_i32(), options.threshold_frac)?;
    let sos_date = dates.sos_doy.map(|d| date_from_doy(year, d)).transpose()?;
    let eos_date = dates.eos_doy.map(|d| date_from_doy(year, d)).transpose()?;

    Ok(PhenologyMetric {
        year,
        location,
        sos_date,
        eos_date,
        season_length: dates.season_length,
        is_forest: options.is_forest_default,
    })
}
