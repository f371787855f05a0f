//! Cache key normalisation.
//!
//! Floats are rounded before they become part of a key so equivalent
//! requests (e.g. `0.5` vs `0.5000000001`) map to the same entry.

use crate::domain::model::{Location, SeasonLengthStat};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// Which layer produced a cached point metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Repo,
    Compute,
}

impl fmt::Display for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::Repo => write!(f, "repo"),
            KeySource::Compute => write!(f, "compute"),
        }
    }
}

/// Rounds half away from zero and prints with fixed precision.
fn fixed(value: f64, decimals: i32) -> String {
    let scale = 10f64.powi(decimals);
    // `+ 0.0` folds -0.0 into 0.0
    let rounded = (value * scale).round() / scale + 0.0;
    format!("{:.*}", decimals as usize, rounded)
}

fn coord(location: &Location) -> String {
    format!("{}:{}", fixed(location.lat(), 6), fixed(location.lon(), 6))
}

pub fn point_metric_key(
    source: KeySource,
    product: &str,
    year: i32,
    location: &Location,
    threshold_frac: Option<f64>,
) -> String {
    let thr = threshold_frac.map_or_else(|| "None".to_string(), |t| fixed(t, 3));
    format!(
        "phenology:point:{}:{}:{}:{}:{}",
        source,
        product,
        year,
        coord(location),
        thr
    )
}

/// Key for on-the-fly computed metrics; the forest default is part of the
/// result so it is part of the key.
pub fn compute_metric_key(
    product: &str,
    year: i32,
    location: &Location,
    threshold_frac: f64,
    is_forest_default: bool,
) -> String {
    format!(
        "{}:forest={}",
        point_metric_key(
            KeySource::Compute,
            product,
            year,
            location,
            Some(threshold_frac)
        ),
        is_forest_default
    )
}

pub fn timeseries_key(product: &str, location: &Location, start_year: i32, end_year: i32) -> String {
    format!(
        "phenology:timeseries:{}:{}:{}:{}",
        product,
        coord(location),
        start_year,
        end_year
    )
}

pub fn area_stats_key(
    product: &str,
    year: i32,
    polygon: &Value,
    only_forest: bool,
    min_season_length: Option<i32>,
    stat: SeasonLengthStat,
) -> String {
    let min_len = min_season_length.map_or_else(|| "None".to_string(), |v| v.to_string());
    format!(
        "phenology:area_stats:{}:{}:{}:only_forest={}:min_season_length={}:season_length_stat={}",
        product,
        year,
        stable_json_hash(polygon),
        only_forest,
        min_len,
        stat
    )
}

/// SHA-256 of the compact JSON encoding with object keys sorted at every
/// level, so key order in the input does not change the hash.
pub fn stable_json_hash(value: &Value) -> String {
    let canonical = canonicalize(value).to_string();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k.clone(), canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
