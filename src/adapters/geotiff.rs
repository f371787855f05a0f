//! Single-band GeoTIFF reading and writing.
//!
//! Only north-up grids are supported: the georeference is taken from
//! `ModelPixelScaleTag` + `ModelTiepointTag`, rotation terms are ignored.

use crate::utils::error::{PhenologyError, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

/// Affine mapping from pixel edges to lon/lat for a north-up grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridTransform {
    /// Longitude of the west edge of column 0.
    pub origin_x: f64,
    /// Latitude of the north edge of row 0.
    pub origin_y: f64,
    pub pixel_width: f64,
    /// Positive; rows grow southwards.
    pub pixel_height: f64,
}

impl GridTransform {
    /// Same convention as rasterio's `from_origin(west, north, xsize, ysize)`.
    pub fn from_origin(west: f64, north: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x: west,
            origin_y: north,
            pixel_width,
            pixel_height,
        }
    }

    /// Nearest column for a longitude, clamped to the grid.
    pub fn nearest_col(&self, lon: f64, width: usize) -> usize {
        nearest_index((lon - self.origin_x) / self.pixel_width, width)
    }

    /// Nearest row for a latitude, clamped to the grid.
    pub fn nearest_row(&self, lat: f64, height: usize) -> usize {
        nearest_index((self.origin_y - lat) / self.pixel_height, height)
    }

    /// Coordinates of a pixel centre as (lon, lat).
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y - (row as f64 + 0.5) * self.pixel_height,
        )
    }
}

// `offset` is measured in pixels from the leading edge; centres sit at i + 0.5.
fn nearest_index(offset: f64, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let idx = (offset - 0.5).round();
    if idx.is_nan() || idx <= 0.0 {
        0
    } else {
        (idx as usize).min(len - 1)
    }
}

/// One decoded band, row-major.
#[derive(Debug, Clone)]
pub struct RasterGrid {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
    pub transform: GridTransform,
}

impl RasterGrid {
    pub fn value_at(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.width + col]
    }

    pub fn sample_nearest(&self, lat: f64, lon: f64) -> f32 {
        let row = self.transform.nearest_row(lat, self.height);
        let col = self.transform.nearest_col(lon, self.width);
        self.value_at(row, col)
    }
}

/// Decodes the first image of a GeoTIFF into an `f32` grid.
pub fn read_grid(path: &Path) -> Result<RasterGrid> {
    let file = File::open(path).map_err(|e| PhenologyError::raster(path, e.to_string()))?;
    let mut decoder = Decoder::new(BufReader::new(file))
        .map_err(|e| PhenologyError::raster(path, format!("failed to initialise decoder: {}", e)))?
        .with_limits(Limits::unlimited());

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| PhenologyError::raster(path, format!("cannot read dimensions: {}", e)))?;
    let transform = read_transform(&mut decoder, path)?;

    let data: Vec<f32> = match decoder
        .read_image()
        .map_err(|e| PhenologyError::raster(path, format!("failed to decode image: {}", e)))?
    {
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        _ => {
            return Err(PhenologyError::raster(path, "unsupported sample format"));
        }
    };

    let (width, height) = (width as usize, height as usize);
    if data.len() != width * height {
        return Err(PhenologyError::raster(
            path,
            format!(
                "expected a single band of {}x{} samples, got {}",
                width,
                height,
                data.len()
            ),
        ));
    }

    Ok(RasterGrid {
        width,
        height,
        data,
        transform,
    })
}

fn read_transform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    path: &Path,
) -> Result<GridTransform> {
    let scale = read_f64_tag(decoder, Tag::ModelPixelScaleTag, path)?;
    let tiepoint = read_f64_tag(decoder, Tag::ModelTiepointTag, path)?;

    match (scale, tiepoint) {
        (Some(scale), Some(tie)) if scale.len() >= 2 && tie.len() >= 6 => {
            let (sx, sy) = (scale[0], scale[1]);
            let (i, j, x, y) = (tie[0], tie[1], tie[3], tie[4]);
            Ok(GridTransform {
                origin_x: x - i * sx,
                origin_y: y + j * sy,
                pixel_width: sx,
                pixel_height: sy,
            })
        }
        _ => {
            tracing::warn!(
                "No GeoTIFF georeference in {}, using pixel coordinates",
                path.display()
            );
            Ok(GridTransform::from_origin(0.0, 0.0, 1.0, 1.0))
        }
    }
}

fn read_f64_tag<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    tag: Tag,
    path: &Path,
) -> Result<Option<Vec<f64>>> {
    let tag_id = tag.to_u16();
    let value = decoder
        .find_tag(tag)
        .map_err(|e| PhenologyError::raster(path, format!("cannot read tag {}: {}", tag_id, e)))?;
    value
        .map(|v| v.into_f64_vec())
        .transpose()
        .map_err(|e| PhenologyError::raster(path, format!("malformed tag {}: {}", tag_id, e)))
}

/// Writes a single-band `f32` GeoTIFF with pixel-scale and tiepoint tags.
pub fn write_grid(path: &Path, grid: &RasterGrid) -> Result<()> {
    if grid.data.len() != grid.width * grid.height {
        return Err(PhenologyError::validation(format!(
            "grid has {} samples, expected {}x{}",
            grid.data.len(),
            grid.width,
            grid.height
        )));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(path)?;
    let to_err = |e: tiff::TiffError| PhenologyError::raster(path, e.to_string());

    let mut encoder = TiffEncoder::new(BufWriter::new(file)).map_err(to_err)?;
    let mut image = encoder
        .new_image::<colortype::Gray32Float>(grid.width as u32, grid.height as u32)
        .map_err(to_err)?;

    let t = grid.transform;
    let scale = [t.pixel_width, t.pixel_height, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelPixelScaleTag, &scale[..])
        .map_err(to_err)?;
    image
        .encoder()
        .write_tag(Tag::ModelTiepointTag, &tiepoint[..])
        .map_err(to_err)?;

    image.write_data(&grid.data).map_err(to_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn origin() -> GridTransform {
        GridTransform::from_origin(-0.5, 51.5, 0.01, 0.01)
    }

    #[test]
    fn test_nearest_index_clamps() {
        let t = origin();
        assert_eq!(t.nearest_col(-0.5, 10), 0);
        assert_eq!(t.nearest_col(-0.495, 10), 0);
        assert_eq!(t.nearest_col(-0.484, 10), 1);
        assert_eq!(t.nearest_col(-10.0, 10), 0);
        assert_eq!(t.nearest_col(10.0, 10), 9);
        assert_eq!(t.nearest_row(51.495, 10), 0);
        assert_eq!(t.nearest_row(51.414, 10), 8);
        assert_eq!(t.nearest_row(0.0, 10), 9);
    }

    #[test]
    fn test_pixel_center() {
        let (lon, lat) = origin().pixel_center(0, 0);
        assert!((lon - -0.495).abs() < 1e-12);
        assert!((lat - 51.495).abs() < 1e-12);
    }

    #[test]
    fn test_write_then_read_keeps_georeference() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("grid.tif");
        let data: Vec<f32> = (0..12).map(|v| v as f32 * 0.5).collect();
        let grid = RasterGrid {
            width: 4,
            height: 3,
            data,
            transform: origin(),
        };

        write_grid(&path, &grid).unwrap();
        let read = read_grid(&path).unwrap();

        assert_eq!((read.width, read.height), (4, 3));
        assert_eq!(read.transform, origin());
        assert_eq!(read.value_at(2, 3), 5.5);
        assert_eq!(read.sample_nearest(51.5, -0.5), 0.0);
    }

    #[test]
    fn test_read_missing_file_is_raster_error() {
        let err = read_grid(Path::new("/nonexistent/doy_001.tif")).unwrap_err();
        assert!(matches!(err, PhenologyError::RasterError { .. }));
    }
}
