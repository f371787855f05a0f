//! Year-wide batch computation over a regular lon/lat grid.

use crate::core::compute::{ComputeOptions, PhenologyComputationService};
use crate::domain::model::{Location, PhenologyMetric};
use crate::domain::ports::PhenologyRepository;
use crate::utils::error::{PhenologyError, Result};
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};

pub const DEFAULT_CHUNK_SIZE: usize = 1024;

const GRID_EPSILON: f64 = 1e-12;

/// Bounding box walked with a fixed step, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
    pub step_deg: f64,
}

impl GridSpec {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64, step_deg: f64) -> Result<Self> {
        let spec = Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
            step_deg,
        };
        spec.check()?;
        Ok(spec)
    }

    /// Parses `min_lon,min_lat,max_lon,max_lat`.
    pub fn from_bbox(bbox: &str, step_deg: f64) -> Result<Self> {
        let parts = bbox
            .split(',')
            .map(|p| f64::from_str(p.trim()))
            .collect::<std::result::Result<Vec<f64>, _>>()
            .map_err(|e| PhenologyError::validation(format!("Invalid bbox '{}': {}", bbox, e)))?;

        match parts.as_slice() {
            &[min_lon, min_lat, max_lon, max_lat] => {
                Self::new(min_lon, min_lat, max_lon, max_lat, step_deg)
            }
            _ => Err(PhenologyError::validation(format!(
                "bbox must be min_lon,min_lat,max_lon,max_lat, got '{}'",
                bbox
            ))),
        }
    }

    fn check(&self) -> Result<()> {
        if !(self.step_deg.is_finite() && self.step_deg > 0.0) {
            return Err(PhenologyError::validation(format!(
                "step_deg must be positive, got {}",
                self.step_deg
            )));
        }
        if self.min_lon > self.max_lon || self.min_lat > self.max_lat {
            return Err(PhenologyError::validation(
                "bbox minimum must not exceed maximum",
            ));
        }
        // corners must be valid locations
        Location::new(self.min_lat, self.min_lon)?;
        Location::new(self.max_lat, self.max_lon)?;
        Ok(())
    }

    /// Locations row by row: latitude ascending from `min_lat`, longitude
    /// ascending within each row.
    pub fn iter(&self) -> impl Iterator<Item = Location> + '_ {
        axis(self.min_lat, self.max_lat, self.step_deg).flat_map(move |lat| {
            // axis values never leave the checked corners
            axis(self.min_lon, self.max_lon, self.step_deg)
                .filter_map(move |lon| Location::new(lat, lon).ok())
        })
    }

    pub fn len(&self) -> usize {
        let count = |min: f64, max: f64| axis(min, max, self.step_deg).count();
        count(self.min_lat, self.max_lat) * count(self.min_lon, self.max_lon)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Accumulates by repeated addition, so float drift matches a plain loop.
// The last value may overshoot `max` by up to GRID_EPSILON and is clamped.
fn axis(min: f64, max: f64, step: f64) -> impl Iterator<Item = f64> {
    std::iter::successors(Some(min), move |v| Some(v + step))
        .take_while(move |v| *v <= max + GRID_EPSILON)
        .map(move |v| v.min(max))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchOptions {
    pub compute: ComputeOptions,
    pub chunk_size: usize,
    /// Keep the computed metrics in the report (e.g. for CSV export).
    pub keep_metrics: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            compute: ComputeOptions::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            keep_metrics: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub product: String,
    pub year: i32,
    pub points: usize,
    pub with_season: usize,
    pub upserted: usize,
    pub chunks: usize,
    #[serde(skip)]
    pub elapsed: Duration,
    #[serde(skip)]
    pub metrics: Vec<PhenologyMetric>,
}

/// Computes every grid point for `year` and upserts the metrics.
///
/// Points are processed `chunk_size` at a time; each chunk is written before
/// the next one is computed.
pub async fn process_year(
    compute: &PhenologyComputationService,
    repo: &dyn PhenologyRepository,
    product: &str,
    year: i32,
    grid: &GridSpec,
    options: &BatchOptions,
) -> Result<BatchReport> {
    grid.check()?;
    if options.chunk_size == 0 {
        return Err(PhenologyError::validation("chunk_size must be at least 1"));
    }

    let started = Instant::now();
    let mut report = BatchReport {
        product: product.to_string(),
        year,
        ..BatchReport::default()
    };
    tracing::info!(
        "Processing {}/{}: {} grid points, step {}",
        product,
        year,
        grid.len(),
        grid.step_deg
    );

    let mut points = grid.iter().peekable();
    while points.peek().is_some() {
        let chunk: Vec<Location> = points.by_ref().take(options.chunk_size).collect();
        let metrics = compute
            .compute_points_batch(product, year, &chunk, options.compute)
            .await?;

        report.points += metrics.len();
        report.with_season += metrics.iter().filter(|m| m.season_length.is_some()).count();
        report.upserted += repo.upsert_many(product, &metrics).await?;
        report.chunks += 1;
        tracing::debug!("Chunk {} done ({} points so far)", report.chunks, report.points);

        if options.keep_metrics {
            report.metrics.extend(metrics);
        }
    }

    report.elapsed = started.elapsed();
    tracing::info!(
        "Finished {}/{}: {} points, {} with a season, {} upserted in {:?}",
        product,
        year,
        report.points,
        report.with_season,
        report.upserted,
        report.elapsed
    );
    Ok(report)
}

#[derive(Debug, Serialize)]
struct MetricCsvRow<'a> {
    product: &'a str,
    year: i32,
    lat: f64,
    lon: f64,
    sos_date: Option<String>,
    eos_date: Option<String>,
    season_length: Option<i32>,
    is_forest: bool,
}

/// Writes metrics as CSV with a header row. Missing values are empty cells.
pub fn write_metrics_csv(path: &Path, product: &str, metrics: &[PhenologyMetric]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    for m in metrics {
        writer.serialize(MetricCsvRow {
            product,
            year: m.year,
            lat: m.location.lat(),
            lon: m.location.lon(),
            sos_date: m.sos_date.map(|d| d.to_string()),
            eos_date: m.eos_date.map(|d| d.to_string()),
            season_length: m.season_length,
            is_forest: m.is_forest,
        })?;
    }
    writer.flush()?;
    tracing::info!("Wrote {} metrics to {}", metrics.len(), path.display());
    Ok(())
}
