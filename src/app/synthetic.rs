//! Deterministic demo data: an 8-step NDVI stack with one clear season.

use crate::adapters::geotiff::{self, GridTransform, RasterGrid};
use crate::utils::error::Result;
use std::path::{Path, PathBuf};

pub const SYNTHETIC_DOYS: [u16; 8] = [1, 50, 100, 150, 200, 250, 300, 350];
pub const SYNTHETIC_NDVI: [f32; 8] = [0.10, 0.12, 0.20, 0.50, 0.70, 0.60, 0.25, 0.12];

/// Top-left corner at (-0.5, 51.5), 0.01 degree pixels.
pub fn synthetic_transform() -> GridTransform {
    GridTransform::from_origin(-0.5, 51.5, 0.01, 0.01)
}

/// Writes `{root}/raw/{product}/{year}/doy_###.tif`, each a `size` x `size`
/// grid filled with that step's NDVI value.
pub fn write_synthetic_stack(root: &Path, product: &str, year: i32, size: usize) -> Result<Vec<PathBuf>> {
    let dir = root.join("raw").join(product).join(year.to_string());
    let mut paths = Vec::with_capacity(SYNTHETIC_DOYS.len());

    for (doy, value) in SYNTHETIC_DOYS.iter().zip(SYNTHETIC_NDVI) {
        let grid = RasterGrid {
            width: size,
            height: size,
            data: vec![value; size * size],
            transform: synthetic_transform(),
        };
        let path = dir.join(format!("doy_{:03}.tif", doy));
        geotiff::write_grid(&path, &grid)?;
        paths.push(path);
    }

    tracing::info!("Wrote {} NDVI rasters to {}", paths.len(), dir.display());
    Ok(paths)
}
