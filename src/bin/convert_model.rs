use std::path::PathBuf;

use anyhow::{ensure, Result};
use clap::Parser;

use unet_seg_tools::{convert_model, ConvertOptions, PipelineConfig};

/// Convert an ONNX segmentation model into a compressed NNEF artifact suitable
/// for lightweight deployment.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the ONNX model to convert.
    #[arg(short, long)]
    input: PathBuf,

    /// Destination of the compressed artifact.
    #[arg(short, long, default_value = "assets/model.nnef.tgz")]
    output: PathBuf,

    /// Skip the float16 weight transform and keep f32 weights.
    #[arg(long)]
    no_optimize: bool,

    /// Compare artifact outputs against the source model on a synthetic input.
    #[arg(long)]
    validate_precision: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    ensure!(args.input.exists(), "input model does not exist");

    let options = ConvertOptions {
        optimize: !args.no_optimize,
        validate_precision: args.validate_precision,
    };
    let config = PipelineConfig::default();
    let outcome = convert_model(&args.input, &args.output, options, &config)?;

    println!(
        "[INFO] summary: {} ({} weights, {} op set)",
        outcome.artifact_path.display(),
        if outcome.optimized { "float16" } else { "float32" },
        if outcome.used_extended_ops {
            "extended"
        } else {
            "core NNEF"
        }
    );
    Ok(())
}
