use crate::adapters::geotiff;
use crate::domain::model::Location;
use crate::domain::ports::RasterRepository;
use crate::utils::error::{PhenologyError, Result};
use std::sync::Arc;
use tokio::task;

/// Point reads from single yearly rasters (band 0, nearest pixel).
pub struct RasterService {
    raster_repo: Arc<dyn RasterRepository>,
}

impl RasterService {
    pub fn new(raster_repo: Arc<dyn RasterRepository>) -> Self {
        Self { raster_repo }
    }

    pub async fn sample_point(&self, product: &str, year: i32, location: &Location) -> Result<f64> {
        if !self.raster_repo.exists(product, year) {
            return Err(PhenologyError::not_found(format!(
                "Raster not found for product={}, year={}",
                product, year
            )));
        }

        let path = self.raster_repo.raster_path(product, year);
        let (lat, lon) = (location.lat(), location.lon());
        let value = task::spawn_blocking(move || {
            geotiff::read_grid(&path).map(|grid| grid.sample_nearest(lat, lon))
        })
        .await??;
        Ok(f64::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::geotiff::{GridTransform, RasterGrid};
    use crate::adapters::LocalRasterRepository;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sample_point_reads_nearest_pixel() {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(LocalRasterRepository::new(dir.path()));
        let grid = RasterGrid {
            width: 3,
            height: 2,
            data: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            transform: GridTransform::from_origin(10.0, 50.0, 1.0, 1.0),
        };
        geotiff::write_grid(&repo.raster_path("landcover", 2020), &grid).unwrap();

        let svc = RasterService::new(repo);
        let loc = Location::new(48.7, 11.6).unwrap();
        assert_eq!(svc.sample_point("landcover", 2020, &loc).await.unwrap(), 5.0);
    }

    #[tokio::test]
    async fn test_missing_raster_is_not_found() {
        let dir = TempDir::new().unwrap();
        let svc = RasterService::new(Arc::new(LocalRasterRepository::new(dir.path())));
        let loc = Location::new(0.0, 0.0).unwrap();
        let err = svc.sample_point("landcover", 2020, &loc).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
