//! Threshold-crossing season detection.
//!
//! `threshold = min + frac * (max - min)`; the start of season is the first
//! sample at or above the threshold, the end of season the last one.

use crate::domain::model::PhenologyDates;
use crate::utils::error::{PhenologyError, Result};

pub const DEFAULT_THRESHOLD_FRAC: f64 = 0.5;

/// Rejects fractions outside the open interval (0, 1), NaN included.
pub fn validate_frac(frac: f64) -> Result<()> {
    if frac > 0.0 && frac < 1.0 {
        Ok(())
    } else {
        Err(PhenologyError::validation(format!(
            "frac must be between 0 and 1 (exclusive), got {}",
            frac
        )))
    }
}

/// Computes start/end of season from an NDVI series and its day-of-year axis.
///
/// Samples are scanned in input order. A flat series, an empty series, or one
/// where nothing reaches the threshold yields an all-`None` result rather
/// than an error.
pub fn compute_sos_eos(ndvi: &[f64], doys: &[i32], frac: f64) -> Result<PhenologyDates> {
    validate_frac(frac)?;
    if ndvi.len() != doys.len() {
        return Err(PhenologyError::validation(format!(
            "ndvi and doys must have the same length ({} != {})",
            ndvi.len(),
            doys.len()
        )));
    }
    if ndvi.is_empty() {
        return Ok(PhenologyDates::NONE);
    }

    let (ndvi_min, ndvi_max) = ndvi
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    if ndvi_max == ndvi_min {
        return Ok(PhenologyDates::NONE);
    }

    let threshold = ndvi_min + frac * (ndvi_max - ndvi_min);

    let mut first: Option<usize> = None;
    let mut last: Option<usize> = None;
    for (idx, &value) in ndvi.iter().enumerate() {
        if value >= threshold {
            first.get_or_insert(idx);
            last = Some(idx);
        }
    }

    let (Some(first), Some(last)) = (first, last) else {
        return Ok(PhenologyDates::NONE);
    };

    let sos = doys[first];
    let eos = doys[last];
    let season_length = (eos >= sos).then(|| eos - sos);

    Ok(PhenologyDates {
        sos_doy: Some(sos),
        eos_doy: Some(eos),
        season_length,
    })
}
