//! Time-indexed NDVI raster stacks.
//!
//! A stack is assembled from one single-band raster per time step. Each file
//! carries its day of year in its name (`doy_###.tif`), which orders the
//! time axis.

use crate::adapters::geotiff::{self, GridTransform, RasterGrid};
use crate::domain::model::{Location, NdviTimeSeries};
use crate::utils::error::{PhenologyError, Result};
use ndarray::{s, Array4};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Instant;

fn doy_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"doy_(\d{3})\.tiff?$").expect("static regex is valid"))
}

/// Parses the day of year from a stack file name such as `doy_150.tif`.
///
/// Only days 1 to 366 are accepted.
pub fn doy_from_path(path: &Path) -> Result<u16> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let doy = doy_pattern()
        .captures(name)
        .and_then(|caps| caps[1].parse::<u16>().ok())
        .ok_or_else(|| {
            PhenologyError::validation(format!("Unexpected NDVI filename format: {}", name))
        })?;

    if !(1..=366).contains(&doy) {
        return Err(PhenologyError::validation(format!(
            "Day of year {} out of range in {}",
            doy, name
        )));
    }
    Ok(doy)
}

/// NDVI grid with axes (time, band, y, x).
#[derive(Debug, Clone)]
pub struct NdviStack {
    data: Array4<f32>,
    doys: Vec<u16>,
    transform: GridTransform,
}

impl NdviStack {
    /// Loads and orders the given per-timestep rasters.
    ///
    /// Files are ordered by DOY, then by path when two share a DOY, so the
    /// result does not depend on input order. All files must share the grid
    /// shape and georeference of the first one.
    pub fn load(paths: &[PathBuf]) -> Result<Self> {
        if paths.is_empty() {
            return Err(PhenologyError::validation("Paths must not be empty"));
        }

        let started = Instant::now();
        let mut dated: Vec<(u16, &PathBuf)> = paths
            .iter()
            .map(|p| doy_from_path(p).map(|doy| (doy, p)))
            .collect::<Result<_>>()?;
        dated.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

        let grids = dated
            .iter()
            .map(|(_, path)| geotiff::read_grid(path))
            .collect::<Result<Vec<_>>>()?;
        let doys: Vec<u16> = dated.iter().map(|(doy, _)| *doy).collect();

        let stack = Self::from_grids(doys, grids)?;
        tracing::info!(
            "Loaded NDVI stack: {} time steps, {}x{} pixels in {:?}",
            stack.time_steps(),
            stack.width(),
            stack.height(),
            started.elapsed()
        );
        Ok(stack)
    }

    /// Assembles already-decoded grids. `doys` must be non-decreasing and
    /// match `grids` one to one.
    pub fn from_grids(doys: Vec<u16>, grids: Vec<RasterGrid>) -> Result<Self> {
        if grids.is_empty() || doys.len() != grids.len() {
            return Err(PhenologyError::validation(format!(
                "Stack needs one grid per day of year ({} doys, {} grids)",
                doys.len(),
                grids.len()
            )));
        }
        if doys.windows(2).any(|w| w[0] > w[1]) {
            return Err(PhenologyError::validation(
                "Stack days of year must be in ascending order",
            ));
        }

        let (width, height, transform) = (grids[0].width, grids[0].height, grids[0].transform);
        let mut data = Array4::<f32>::zeros((grids.len(), 1, height, width));

        for (t, grid) in grids.into_iter().enumerate() {
            if grid.width != width || grid.height != height || grid.transform != transform {
                return Err(PhenologyError::validation(format!(
                    "Time step DOY {} does not share the stack grid ({}x{} vs {}x{})",
                    doys[t], grid.width, grid.height, width, height
                )));
            }
            let slice = ndarray::ArrayView2::from_shape((height, width), grid.data.as_slice()).map_err(
                |e| PhenologyError::validation(format!("Grid shape mismatch: {}", e)),
            )?;
            data.slice_mut(s![t, 0, .., ..]).assign(&slice);
        }

        Ok(Self {
            data,
            doys,
            transform,
        })
    }

    pub fn doys(&self) -> &[u16] {
        &self.doys
    }

    pub fn time_steps(&self) -> usize {
        self.data.shape()[0]
    }

    pub fn height(&self) -> usize {
        self.data.shape()[2]
    }

    pub fn width(&self) -> usize {
        self.data.shape()[3]
    }

    pub fn transform(&self) -> &GridTransform {
        &self.transform
    }

    fn pixel_for(&self, location: &Location) -> (usize, usize) {
        (
            self.transform.nearest_row(location.lat(), self.height()),
            self.transform.nearest_col(location.lon(), self.width()),
        )
    }

    /// NDVI over time at the pixel nearest to `location`, band 0.
    pub fn sample_point(&self, location: &Location) -> NdviTimeSeries {
        let (row, col) = self.pixel_for(location);
        let ndvi = self
            .data
            .slice(s![.., 0, row, col])
            .iter()
            .map(|&v| f64::from(v))
            .collect();

        NdviTimeSeries {
            doys: self.doys.clone(),
            ndvi,
        }
    }

    /// Vectorised variant of [`sample_point`](Self::sample_point).
    ///
    /// Pixel indices are resolved once, then every time slice is visited a
    /// single time. Output order matches `locations`.
    pub fn sample_points_batch(&self, locations: &[Location]) -> Vec<NdviTimeSeries> {
        if locations.is_empty() {
            return Vec::new();
        }

        let pixels: Vec<(usize, usize)> = locations.iter().map(|l| self.pixel_for(l)).collect();
        let mut series: Vec<Vec<f64>> = vec![Vec::with_capacity(self.time_steps()); pixels.len()];

        for slice in self.data.outer_iter() {
            let band = slice.index_axis(ndarray::Axis(0), 0);
            for (out, &(row, col)) in series.iter_mut().zip(&pixels) {
                out.push(f64::from(band[[row, col]]));
            }
        }

        series
            .into_iter()
            .map(|ndvi| NdviTimeSeries {
                doys: self.doys.clone(),
                ndvi,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::synthetic::{write_synthetic_stack, SYNTHETIC_DOYS, SYNTHETIC_NDVI};
    use tempfile::TempDir;

    fn grid(value_at: impl Fn(usize, usize) -> f32) -> RasterGrid {
        let (width, height) = (4, 3);
        let data = (0..height)
            .flat_map(|r| (0..width).map(move |c| (r, c)))
            .map(|(r, c)| value_at(r, c))
            .collect();
        RasterGrid {
            width,
            height,
            data,
            transform: GridTransform::from_origin(10.0, 50.0, 1.0, 1.0),
        }
    }

    #[test]
    fn test_doy_from_path() {
        assert_eq!(doy_from_path(Path::new("/data/raw/p/2020/doy_001.tif")).unwrap(), 1);
        assert_eq!(doy_from_path(Path::new("doy_365.tiff")).unwrap(), 365);
        assert!(doy_from_path(Path::new("doy_1.tif")).unwrap_err().is_client_fault());
        assert!(doy_from_path(Path::new("2020.tif")).is_err());
        assert!(doy_from_path(Path::new("doy_150.tif.bak")).is_err());
        assert!(doy_from_path(Path::new("doy_000.tif")).unwrap_err().is_client_fault());
        assert!(doy_from_path(Path::new("doy_367.tif")).is_err());
        assert_eq!(doy_from_path(Path::new("doy_366.tif")).unwrap(), 366);
    }

    #[test]
    fn test_load_rejects_doy_zero_before_reading() {
        let paths = vec![PathBuf::from("/nowhere/doy_000.tif"), PathBuf::from("/nowhere/doy_010.tif")];
        assert!(NdviStack::load(&paths).unwrap_err().is_client_fault());
    }

    #[test]
    fn test_load_rejects_empty_paths() {
        assert!(NdviStack::load(&[]).unwrap_err().is_client_fault());
    }

    #[test]
    fn test_load_rejects_bad_name_before_reading() {
        let paths = vec![PathBuf::from("/nowhere/doy_001.tif"), PathBuf::from("/nowhere/x.tif")];
        assert!(NdviStack::load(&paths).unwrap_err().is_client_fault());
    }

    fn write_pixel(path: &Path, value: f32) {
        let grid = RasterGrid {
            width: 1,
            height: 1,
            data: vec![value],
            transform: GridTransform::from_origin(10.0, 50.0, 1.0, 1.0),
        };
        geotiff::write_grid(path, &grid).unwrap();
    }

    #[test]
    fn test_load_orders_shared_doy_by_path() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("a").join("doy_010.tif");
        let second = dir.path().join("b").join("doy_010.tif");
        let earlier = dir.path().join("c").join("doy_005.tif");
        write_pixel(&first, 0.2);
        write_pixel(&second, 0.7);
        write_pixel(&earlier, 0.1);

        let here = Location::new(49.5, 10.5).unwrap();
        for paths in [
            vec![first.clone(), second.clone(), earlier.clone()],
            vec![second.clone(), earlier.clone(), first.clone()],
        ] {
            let ts = NdviStack::load(&paths).unwrap().sample_point(&here);
            assert_eq!(ts.doys, vec![5, 10, 10]);
            assert_eq!(ts.ndvi, vec![f64::from(0.1f32), f64::from(0.2f32), f64::from(0.7f32)]);
        }
    }

    #[test]
    fn test_load_reversed_paths_reads_back_written_series() {
        let dir = TempDir::new().unwrap();
        let mut paths = write_synthetic_stack(dir.path(), "ndvi", 2020, 3).unwrap();
        paths.reverse();

        let stack = NdviStack::load(&paths).unwrap();
        assert_eq!(stack.doys(), SYNTHETIC_DOYS.as_slice());

        let ts = stack.sample_point(&Location::new(51.49, -0.49).unwrap());
        assert_eq!(ts.doys, SYNTHETIC_DOYS.to_vec());
        let written: Vec<f64> = SYNTHETIC_NDVI.iter().map(|&v| f64::from(v)).collect();
        assert_eq!(ts.ndvi, written);
    }

    #[test]
    fn test_from_grids_rejects_descending_doys() {
        let err = NdviStack::from_grids(vec![20, 10], vec![grid(|_, _| 0.0), grid(|_, _| 0.0)])
            .unwrap_err();
        assert!(err.is_client_fault());
        assert!(NdviStack::from_grids(vec![10, 10], vec![grid(|_, _| 0.0), grid(|_, _| 1.0)]).is_ok());
    }

    #[test]
    fn test_sample_point_nearest_pixel() {
        let stack = NdviStack::from_grids(
            vec![10, 20],
            vec![
                grid(|r, c| (r * 10 + c) as f32),
                grid(|r, c| (100 + r * 10 + c) as f32),
            ],
        )
        .unwrap();

        // pixel (row 1, col 2) has its centre at lon 12.5, lat 48.5
        let loc = Location::new(48.6, 12.4).unwrap();
        let ts = stack.sample_point(&loc);
        assert_eq!(ts.doys, vec![10, 20]);
        assert_eq!(ts.ndvi, vec![12.0, 112.0]);
    }

    #[test]
    fn test_sample_outside_grid_clamps_to_edge() {
        let stack = NdviStack::from_grids(vec![1], vec![grid(|r, c| (r * 10 + c) as f32)]).unwrap();
        let far = Location::new(-80.0, 170.0).unwrap();
        assert_eq!(stack.sample_point(&far).ndvi, vec![23.0]);
    }

    #[test]
    fn test_batch_matches_single_and_keeps_order() {
        let stack = NdviStack::from_grids(
            vec![1, 2, 3],
            vec![
                grid(|r, c| (r + c) as f32),
                grid(|r, c| (r * c) as f32),
                grid(|r, _| r as f32),
            ],
        )
        .unwrap();

        let locations = vec![
            Location::new(47.5, 13.5).unwrap(),
            Location::new(49.5, 10.5).unwrap(),
            Location::new(48.5, 11.5).unwrap(),
        ];
        let batch = stack.sample_points_batch(&locations);
        assert_eq!(batch.len(), 3);
        for (loc, ts) in locations.iter().zip(&batch) {
            assert_eq!(&stack.sample_point(loc), ts);
        }
        assert!(stack.sample_points_batch(&[]).is_empty());
    }

    #[test]
    fn test_from_grids_rejects_mismatched_shapes() {
        let mut other = grid(|_, _| 0.0);
        other.transform = GridTransform::from_origin(0.0, 0.0, 1.0, 1.0);
        let err = NdviStack::from_grids(vec![1, 2], vec![grid(|_, _| 0.0), other]).unwrap_err();
        assert!(err.is_client_fault());
    }
}
