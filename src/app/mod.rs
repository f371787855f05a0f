// Application layer: batch driver and service wiring on top of core.

pub mod batch;
pub mod synthetic;
pub mod wiring;

pub use batch::{process_year, write_metrics_csv, BatchOptions, BatchReport, GridSpec};
pub use wiring::Services;
