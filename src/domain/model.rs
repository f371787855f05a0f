use crate::utils::error::{PhenologyError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A geographic location in WGS84 degrees.
///
/// Only constructible through [`Location::new`], so every value in the
/// system is within range and never NaN. Equality and hashing compare the
/// coordinates by value, with `-0.0` equal to `0.0`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "RawLocation")]
pub struct Location {
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
struct RawLocation {
    lat: f64,
    lon: f64,
}

impl TryFrom<RawLocation> for Location {
    type Error = PhenologyError;

    fn try_from(raw: RawLocation) -> Result<Self> {
        Location::new(raw.lat, raw.lon)
    }
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(PhenologyError::validation(format!(
                "Latitude must be between -90 and 90, got {}",
                lat
            )));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(PhenologyError::validation(format!(
                "Longitude must be between -180 and 180, got {}",
                lon
            )));
        }
        Ok(Self { lat, lon })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }

    fn canonical_bits(&self) -> (u64, u64) {
        ((self.lat + 0.0).to_bits(), (self.lon + 0.0).to_bits())
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_bits() == other.canonical_bits()
    }
}

impl Eq for Location {}

impl Hash for Location {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_bits().hash(state);
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.lat, self.lon)
    }
}

/// Phenology metrics for one location and year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhenologyMetric {
    pub year: i32,
    pub location: Location,
    pub sos_date: Option<NaiveDate>,
    pub eos_date: Option<NaiveDate>,
    pub season_length: Option<i32>,
    pub is_forest: bool,
}

impl PhenologyMetric {
    /// Builds a metric whose season length is derived from the two dates.
    pub fn from_dates(
        year: i32,
        location: Location,
        sos_date: Option<NaiveDate>,
        eos_date: Option<NaiveDate>,
        is_forest: bool,
    ) -> Self {
        let season_length = match (sos_date, eos_date) {
            (Some(sos), Some(eos)) if eos >= sos => Some((eos - sos).num_days() as i32),
            _ => None,
        };
        Self {
            year,
            location,
            sos_date,
            eos_date,
            season_length,
            is_forest,
        }
    }
}

/// NDVI samples for one pixel, ordered by ascending day of year.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NdviTimeSeries {
    pub doys: Vec<u16>,
    pub ndvi: Vec<f64>,
}

impl NdviTimeSeries {
    pub fn len(&self) -> usize {
        self.doys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doys.is_empty()
    }

    pub fn doys_i32(&self) -> Vec<i32> {
        self.doys.iter().map(|&d| i32::from(d)).collect()
    }
}

/// Season boundaries as day-of-year values, before calendar conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhenologyDates {
    pub sos_doy: Option<i32>,
    pub eos_doy: Option<i32>,
    pub season_length: Option<i32>,
}

impl PhenologyDates {
    pub const NONE: PhenologyDates = PhenologyDates {
        sos_doy: None,
        eos_doy: None,
        season_length: None,
    };
}

/// Which season-length aggregate an area query should report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonLengthStat {
    #[default]
    Mean,
    Median,
    Both,
}

impl SeasonLengthStat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Both => "both",
        }
    }

    pub fn wants_mean(&self) -> bool {
        matches!(self, Self::Mean | Self::Both)
    }

    pub fn wants_median(&self) -> bool {
        matches!(self, Self::Median | Self::Both)
    }
}

impl fmt::Display for SeasonLengthStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeasonLengthStat {
    type Err = PhenologyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "median" => Ok(Self::Median),
            "both" => Ok(Self::Both),
            other => Err(PhenologyError::validation(format!(
                "season_length_stat must be one of mean, median, both; got '{}'",
                other
            ))),
        }
    }
}

/// Filters applied to the points inside an area before aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AreaFilter {
    pub only_forest: bool,
    pub min_season_length: Option<i32>,
    pub season_length_stat: SeasonLengthStat,
}

/// Aggregate over all stored points covered by a polygon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaStats {
    pub n: i64,
    pub mean_season_length: Option<f64>,
    pub median_season_length: Option<f64>,
    pub forest_fraction: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_location_equality_and_hash_by_value() {
        let a = Location::new(46.5, 7.25).unwrap();
        let b = Location::new(46.5, 7.25).unwrap();
        let origin = Location::new(0.0, 0.0).unwrap();
        let negative_zero = Location::new(-0.0, -0.0).unwrap();

        assert_eq!(a, b);
        assert_eq!(origin, negative_zero);
        assert_ne!(a, origin);

        let set: HashSet<Location> = [a, b, origin, negative_zero].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_location_bounds() {
        assert!(Location::new(90.0, 180.0).is_ok());
        assert!(Location::new(-90.0, -180.0).is_ok());
        assert!(Location::new(90.0001, 0.0).unwrap_err().is_client_fault());
        assert!(Location::new(0.0, -180.5).unwrap_err().is_client_fault());
        assert!(Location::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_location_deserialize_validates() {
        let ok: Location = serde_json::from_str(r#"{"lat": 52.5, "lon": 13.4}"#).unwrap();
        assert_eq!(ok.lat(), 52.5);
        assert!(serde_json::from_str::<Location>(r#"{"lat": 95.0, "lon": 13.4}"#).is_err());
    }

    #[test]
    fn test_metric_from_dates_season_length() {
        let loc = Location::new(52.5, 13.4).unwrap();
        let sos = NaiveDate::from_ymd_opt(2020, 5, 29);
        let eos = NaiveDate::from_ymd_opt(2020, 9, 6);

        let metric = PhenologyMetric::from_dates(2020, loc, sos, eos, true);
        assert_eq!(metric.season_length, Some(100));

        let reversed = PhenologyMetric::from_dates(2020, loc, eos, sos, true);
        assert_eq!(reversed.season_length, None);

        let open = PhenologyMetric::from_dates(2020, loc, sos, None, false);
        assert_eq!(open.season_length, None);
    }

    #[test]
    fn test_season_length_stat_parsing() {
        assert_eq!("mean".parse::<SeasonLengthStat>().unwrap(), SeasonLengthStat::Mean);
        assert_eq!("Median".parse::<SeasonLengthStat>().unwrap(), SeasonLengthStat::Median);
        assert_eq!("both".parse::<SeasonLengthStat>().unwrap(), SeasonLengthStat::Both);
        assert!("p90".parse::<SeasonLengthStat>().unwrap_err().is_client_fault());
        assert!(SeasonLengthStat::Both.wants_mean() && SeasonLengthStat::Both.wants_median());
    }

    #[test]
    fn test_metric_json_dates() {
        let loc = Location::new(51.5, -0.5).unwrap();
        let metric = PhenologyMetric::from_dates(
            2020,
            loc,
            NaiveDate::from_ymd_opt(2020, 5, 29),
            None,
            true,
        );
        let json = serde_json::to_value(&metric).unwrap();
        assert_eq!(json["sos_date"], "2020-05-29");
        assert!(json["eos_date"].is_null());
    }
}
