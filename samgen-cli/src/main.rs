// samgen command line interface
// Segments every object in an image and writes one mask file per object

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use samgen_eye::models::ModelManager;
use samgen_eye::{ExecutionProvider, PredictionParams, SegmentConfig, SegmentPredictor};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "samgen")]
#[command(about = "Automatic mask generation with Segment Anything", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (JSON, TOML or YAML)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the encoder and decoder graphs
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    /// Execution provider (cpu, cuda)
    #[arg(long, global = true)]
    device: Option<ExecutionProvider>,

    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment an image and write its masks
    Predict {
        /// Input image
        image: PathBuf,

        /// Directory the masks are written to
        #[arg(long, short)]
        output_dir: Option<PathBuf>,

        /// Also write masks.json with per-mask metadata
        #[arg(long)]
        manifest: bool,

        #[command(flatten)]
        params: ParamArgs,
    },

    /// Download the configured encoder and decoder
    Download,

    /// Print the default prediction parameters as JSON
    Params,
}

/// Prediction parameters; unset flags keep their defaults
#[derive(Args)]
struct ParamArgs {
    /// Width the image is resized to before inference
    #[arg(long)]
    resize_width: Option<u32>,

    /// Points sampled along one side of the image
    #[arg(long)]
    points_per_side: Option<u32>,

    /// Point prompts run per batch
    #[arg(long)]
    points_per_batch: Option<u32>,

    /// Minimum predicted mask quality, in [0,1]
    #[arg(long)]
    pred_iou_thresh: Option<f32>,

    /// Minimum mask stability, in [0,1]
    #[arg(long)]
    stability_score_thresh: Option<f32>,

    /// Cutoff shift used for the stability score
    #[arg(long)]
    stability_score_offset: Option<f32>,

    /// Box IoU cutoff for suppression within a crop
    #[arg(long)]
    box_nms_thresh: Option<f32>,

    /// Extra crop layers
    #[arg(long)]
    crop_n_layers: Option<u32>,

    /// Box IoU cutoff for suppression between crops
    #[arg(long)]
    crop_nms_thresh: Option<f32>,

    /// Overlap between first-layer crops, as a fraction of the image length
    #[arg(long)]
    crop_overlap_ratio: Option<f32>,

    /// Per-layer divisor for points per side
    #[arg(long)]
    crop_n_points_downscale_factor: Option<u32>,

    /// Holes and islands smaller than this are removed
    #[arg(long)]
    min_mask_region_area: Option<u32>,
}

impl ParamArgs {
    fn into_params(self) -> PredictionParams {
        let mut params = PredictionParams::default();
        macro_rules! apply {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = self.$field {
                    params.$field = value;
                })*
            };
        }
        apply!(
            resize_width,
            points_per_side,
            points_per_batch,
            pred_iou_thresh,
            stability_score_thresh,
            stability_score_offset,
            box_nms_thresh,
            crop_n_layers,
            crop_nms_thresh,
            crop_overlap_ratio,
            crop_n_points_downscale_factor,
            min_mask_region_area,
        );
        params
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<SegmentConfig> {
    let mut config = match &cli.config {
        Some(path) => SegmentConfig::from_file(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => SegmentConfig::default(),
    };
    config.apply_env()?;

    if let Some(dir) = &cli.model_dir {
        config.model_dir = dir.clone();
    }
    if let Some(device) = cli.device {
        config.model.device = device;
    }
    Ok(config)
}

fn init_logging(level: &str, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli)?;
    init_logging(&config.log_level, cli.verbose);

    match cli.command {
        Commands::Predict {
            image,
            output_dir,
            manifest,
            params,
        } => {
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            config.write_manifest |= manifest;
            predict(config, image, params.into_params()).await?;
        }
        Commands::Download => {
            config.validate()?;
            let files = ModelManager::new(Arc::new(config)).resolve().await?;
            println!("{}", files.encoder.display());
            println!("{}", files.decoder.display());
        }
        Commands::Params => {
            println!("{}", serde_json::to_string_pretty(&PredictionParams::default())?);
        }
    }

    Ok(())
}

async fn predict(
    mut config: SegmentConfig,
    image: PathBuf,
    params: PredictionParams,
) -> anyhow::Result<()> {
    // Fail on bad flags before spending time on model files
    params.validate()?;
    config.validate()?;

    let manager = ModelManager::new(Arc::new(config.clone()));
    let files = manager.resolve().await?;
    info!("Using encoder {:?} and decoder {:?}", files.encoder, files.decoder);
    config.model.encoder_path = files.encoder;
    config.model.decoder_path = files.decoder;

    let paths = tokio::task::spawn_blocking(move || {
        let predictor = SegmentPredictor::setup(config)?;
        predictor.predict(&image, &params)
    })
    .await
    .context("Prediction task panicked")??;

    for path in paths {
        println!("{}", path.display());
    }
    Ok(())
}
