use clap::Parser;
use forest_phenology::app::batch::{self, BatchOptions, GridSpec};
use forest_phenology::app::synthetic;
use forest_phenology::app::Services;
use forest_phenology::config::cli::{
    Cli, Command, ComputeArgs, ProcessYearArgs, SampleArgs, SyntheticArgs,
};
use forest_phenology::config::{AppConfig, LogFormat};
use forest_phenology::utils::error::{ErrorCategory, PhenologyError};
use forest_phenology::utils::logger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data.dir = dir.clone();
    }

    if cli.json_logs || config.logging.format == LogFormat::Json {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }
    tracing::debug!("Configuration: {:?}", config);

    if let Err(e) = run(cli.command, &config).await {
        tracing::error!("fpts failed: {} (category: {:?})", e, e.category());
        eprintln!("❌ {}", e.user_friendly_message());

        let exit_code = match e.category() {
            ErrorCategory::Client => 2,
            ErrorCategory::NotFound => 3,
            ErrorCategory::Unsupported => 4,
            ErrorCategory::Server => 1,
        };
        std::process::exit(exit_code);
    }
    Ok(())
}

async fn run(command: Command, config: &AppConfig) -> Result<(), PhenologyError> {
    match command {
        Command::ProcessYear(args) => process_year(args, config).await,
        Command::Compute(args) => compute(args, config).await,
        Command::Sample(args) => sample(args, config).await,
        Command::MakeSynthetic(args) => make_synthetic(args, config),
    }
}

async fn process_year(args: ProcessYearArgs, config: &AppConfig) -> Result<(), PhenologyError> {
    let services = Services::from_config(config)?;
    let grid = GridSpec::from_bbox(&args.bbox, args.step_deg)?;

    let mut options = BatchOptions {
        compute: config.compute_options(),
        chunk_size: config.compute.batch_chunk_size,
        keep_metrics: args.csv.is_some(),
    };
    if let Some(frac) = args.threshold_frac {
        options.compute.threshold_frac = frac;
    }

    let report = batch::process_year(
        &services.compute,
        services.phenology_repo.as_ref(),
        &args.product,
        args.year,
        &grid,
        &options,
    )
    .await?;

    if let Some(path) = &args.csv {
        batch::write_metrics_csv(path, &args.product, &report.metrics)?;
        println!("📁 Metrics written to: {}", path.display());
    }
    println!(
        "✅ Upserted {} metrics for product={} year={} ({} with a season)",
        report.upserted, report.product, report.year, report.with_season
    );
    Ok(())
}

async fn compute(args: ComputeArgs, config: &AppConfig) -> Result<(), PhenologyError> {
    let services = Services::from_config(config)?;
    let location = args.point.location()?;

    let mut options = config.compute_options();
    if let Some(frac) = args.threshold_frac {
        options.threshold_frac = frac;
    }
    if let Some(is_forest) = args.is_forest {
        options.is_forest_default = is_forest;
    }

    let metric = services
        .compute
        .compute_point(&args.product, args.year, &location, options)
        .await?;
    println!("{}", serde_json::to_string_pretty(&metric)?);
    Ok(())
}

async fn sample(args: SampleArgs, config: &AppConfig) -> Result<(), PhenologyError> {
    let services = Services::from_config(config)?;
    let location = args.point.location()?;
    let value = services
        .raster
        .sample_point(&args.product, args.year, &location)
        .await?;
    println!("{}", value);
    Ok(())
}

fn make_synthetic(args: SyntheticArgs, config: &AppConfig) -> Result<(), PhenologyError> {
    if args.size == 0 {
        return Err(PhenologyError::validation("--size must be at least 1"));
    }
    let paths =
        synthetic::write_synthetic_stack(&config.data.dir, &args.product, args.year, args.size)?;
    println!("✅ Wrote {} NDVI rasters", paths.len());
    Ok(())
}
