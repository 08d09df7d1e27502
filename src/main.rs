use anyhow::Context;
use clap::Parser;
use peakmetrics::{DemFormat, PipelineConfig, ProminencePipeline, RegionConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "peakmetrics")]
#[command(about = "Compute prominence and isolation of the peaks in a DEM tile")]
struct Args {
    /// DEM tile to process
    dem_file: PathBuf,

    /// Directory for output data
    #[arg(short, long = "output-dir", default_value = ".")]
    output_dir: PathBuf,

    /// Input format: ASC, SRTM, NED13-ZIP, NED1-ZIP or GEOTIFF
    #[arg(short, long, default_value = "ASC")]
    format: DemFormat,

    /// Minimum prominence threshold for output, in the tile's elevation unit
    #[arg(short, long, default_value = "300")]
    min_prominence: f32,

    /// Finalize output tree: delete all runoffs and then prune
    #[arg(short = 't', long)]
    finalize: bool,

    /// KML polygon restricting reported peaks
    #[arg(long)]
    region: Option<PathBuf>,

    /// Add 360 to polygon longitudes below this value
    #[arg(long, requires = "region", allow_hyphen_values = true)]
    wrap_longitude: Option<f32>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    log::info!("Processing {}", args.dem_file.display());
    log::info!("  prominence >= {}", args.min_prominence);

    let config = PipelineConfig {
        min_prominence: args.min_prominence,
        finalize: args.finalize,
        output_directory: args.output_dir,
        format: args.format,
        region: args.region.map(|polygon_path| RegionConfig {
            polygon_path,
            wrap_longitude: args.wrap_longitude,
        }),
    };

    std::fs::create_dir_all(&config.output_directory).with_context(|| {
        format!("Cannot create output directory {}", config.output_directory.display())
    })?;

    let pipeline = ProminencePipeline::new(config).context("Cannot load region polygon")?;
    let table = pipeline
        .run(&args.dem_file)
        .with_context(|| format!("Failed to process {}", args.dem_file.display()))?;

    log::info!("Reported {} peaks", table.len());
    Ok(())
}
