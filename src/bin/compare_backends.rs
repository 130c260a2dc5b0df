use std::path::PathBuf;

use anyhow::{ensure, Result};
use clap::Parser;

use unet_seg_tools::{
    compare::compare_backends,
    inspect::uniform_probe,
    model::load_and_preprocess,
    NnefArtifact, OrtModel, PipelineConfig,
};

/// Run the ONNX model and the converted artifact on the same input and report
/// how far their outputs diverge.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Optional image to compare on, random input when omitted.
    image: Option<PathBuf>,

    /// Path to the ONNX model file.
    #[arg(short, long, default_value = "model.onnx")]
    model: PathBuf,

    /// Path to the converted artifact.
    #[arg(short, long, default_value = "assets/model.nnef.tgz")]
    artifact: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    ensure!(args.model.exists(), "model file does not exist");
    ensure!(args.artifact.exists(), "artifact file does not exist");

    let config = PipelineConfig::default();
    let model = OrtModel::new(&args.model, &config)?;
    let artifact = NnefArtifact::load(&args.artifact, &config)?;

    let input = match &args.image {
        Some(image_path) => {
            ensure!(image_path.exists(), "image does not exist");
            println!("comparing on image {}", image_path.display());
            load_and_preprocess(image_path, model.image_size())?.0
        }
        None => {
            println!("comparing on a random [0, 1) input");
            uniform_probe(model.image_size(), 1.0)
        }
    };

    let report = compare_backends(&model, &artifact, input.view(), config.default_threshold)?;
    println!("{report}");

    // advisory only, interpretation is left to the operator
    if report.mean_abs_diff > config.precision_tolerance {
        println!(
            "note: mean difference exceeds the {} guideline, outputs may not be interchangeable",
            config.precision_tolerance
        );
    } else {
        println!(
            "backends agree within the {} guideline",
            config.precision_tolerance
        );
    }
    Ok(())
}
