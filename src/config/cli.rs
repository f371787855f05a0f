use crate::domain::model::Location;
use crate::utils::error::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "fpts")]
#[command(about = "Forest phenology metrics from NDVI raster stacks")]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Raster root, overrides `data.dir`
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[arg(long, short, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Compute phenology over a lon/lat grid and store the results
    ProcessYear(ProcessYearArgs),
    /// Compute phenology for one point and print it as JSON
    Compute(ComputeArgs),
    /// Read one value from a yearly raster
    Sample(SampleArgs),
    /// Write the synthetic 8-step NDVI stack used for demos
    MakeSynthetic(SyntheticArgs),
}

#[derive(Debug, Clone, Args)]
pub struct PointArgs {
    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,

    #[arg(long, allow_hyphen_values = true)]
    pub lon: f64,
}

impl PointArgs {
    pub fn location(&self) -> Result<Location> {
        Location::new(self.lat, self.lon)
    }
}

#[derive(Debug, Clone, Args)]
pub struct ProcessYearArgs {
    #[arg(long)]
    pub product: String,

    #[arg(long)]
    pub year: i32,

    /// min_lon,min_lat,max_lon,max_lat
    #[arg(long, allow_hyphen_values = true)]
    pub bbox: String,

    #[arg(long, default_value = "0.02")]
    pub step_deg: f64,

    #[arg(long)]
    pub threshold_frac: Option<f64>,

    /// Also write the computed metrics to this CSV file
    #[arg(long)]
    pub csv: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct ComputeArgs {
    #[arg(long)]
    pub product: String,

    #[arg(long)]
    pub year: i32,

    #[command(flatten)]
    pub point: PointArgs,

    #[arg(long)]
    pub threshold_frac: Option<f64>,

    /// Forest flag reported with the metric
    #[arg(long)]
    pub is_forest: Option<bool>,
}

#[derive(Debug, Clone, Args)]
pub struct SampleArgs {
    #[arg(long)]
    pub product: String,

    #[arg(long)]
    pub year: i32,

    #[command(flatten)]
    pub point: PointArgs,
}

#[derive(Debug, Clone, Args)]
pub struct SyntheticArgs {
    #[arg(long, default_value = "ndvi_synth")]
    pub product: String,

    #[arg(long, default_value = "2020")]
    pub year: i32,

    #[arg(long, default_value = "10")]
    pub size: usize,
}
