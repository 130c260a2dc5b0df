use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use clap::Parser;

use unet_seg_tools::{BatchPipeline, OrtModel, PipelineConfig};

/// Run a segmentation model over a directory of images and write binary masks
/// and background-free crops.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the ONNX model file.
    #[arg(short, long)]
    model: PathBuf,

    /// Directory containing the images to segment.
    #[arg(short, long)]
    input: PathBuf,

    /// Directory where masks/ and crops/ are written.
    #[arg(short, long, default_value = "results")]
    output: PathBuf,

    /// Binarization threshold in [0, 1].
    #[arg(short, long, default_value_t = 0.3)]
    threshold: f32,
}

fn main() -> Result<()> {
    let args = Args::parse();

    ensure!(args.model.exists(), "model file does not exist");
    ensure!(args.input.exists(), "input directory does not exist");
    ensure!(args.input.is_dir(), "input path is not a directory");
    ensure!(
        (0.0..=1.0).contains(&args.threshold),
        "threshold must be in [0, 1]"
    );

    let config = PipelineConfig::default();
    let model = OrtModel::new(&args.model, &config).context("failed to load model")?;
    println!(
        "model loaded: input {}x{}, output {}",
        model.image_size(),
        model.image_size(),
        model.output_desc()
    );

    // per-image failures are recovered and counted; the run itself succeeded
    let pipeline = BatchPipeline::new(model, config);
    pipeline.process_directory(&args.input, &args.output, args.threshold)?;
    Ok(())
}
