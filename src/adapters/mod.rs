// Adapters layer: concrete implementations of the domain ports (filesystem
// rasters, GeoTIFF decoding, metric storage).

pub mod geotiff;
pub mod in_memory;
pub mod local_raster;

#[cfg(feature = "postgis-repo")]
pub mod postgis;

pub use in_memory::InMemoryPhenologyRepository;
pub use local_raster::LocalRasterRepository;

#[cfg(feature = "postgis-repo")]
pub use postgis::{PostgisConfig, PostgisPhenologyRepository};
