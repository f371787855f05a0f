pub mod keys;
pub mod ttl;

pub use keys::{
    area_stats_key, compute_metric_key, point_metric_key, timeseries_key, KeySource,
};
pub use ttl::{CacheStats, TtlCache};
