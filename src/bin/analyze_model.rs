use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use clap::Parser;

use unet_seg_tools::{
    compare::compare_backends,
    inspect::{inspect, threshold_sweep, OutputClass, TensorStats},
    mask,
    model::load_and_preprocess,
    traits::SegmentationBackend,
    NnefArtifact, PipelineConfig,
};

/// Inspect a segmentation model: graph structure, synthetic probe responses,
/// output-range classification, and an optional real-image probe.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Optional image to run through the model after the synthetic probes.
    image: Option<PathBuf>,

    /// Path to the ONNX model file.
    #[arg(short, long, default_value = "model.onnx")]
    model: PathBuf,

    /// Converted artifact to compare against, skipped when absent.
    #[arg(short, long, default_value = "assets/model.nnef.tgz")]
    artifact: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    ensure!(args.model.exists(), "model file does not exist");

    let config = PipelineConfig::default();
    let (model, report) = inspect(&args.model, &config)?;

    println!("=== model ===");
    println!("input:  {}", report.input_desc);
    println!("output: {}", report.output_desc);

    println!("=== graph ===");
    println!("nodes: {}", report.graph.node_count);
    println!("parameters: {}", report.graph.parameter_count);
    println!(
        "first node: {} ({})",
        report.graph.first_node.0, report.graph.first_node.1
    );
    println!(
        "last node: {} ({})",
        report.graph.last_node.0, report.graph.last_node.1
    );
    if report.graph.normalization_nodes.is_empty() {
        println!("no normalization or rescaling nodes found");
    } else {
        for node in &report.graph.normalization_nodes {
            println!(
                "normalization node {}: {} ({})",
                node.index, node.name, node.operator
            );
        }
    }

    println!("=== synthetic probes ===");
    for probe in &report.probes {
        println!("{}:", probe.label);
        println!("   input  {}", probe.input_stats);
        println!("   output {} shape {:?}", probe.output_stats, probe.output_shape);
    }
    println!("threshold sweep (first probe):");
    for row in &report.sweep {
        println!(
            "   t={:.1}: {} pixels above ({:.2}%)",
            row.threshold, row.pixels_above, row.percentage
        );
    }
    match report.classification {
        OutputClass::ProbabilityLike => {
            println!("output range looks like probabilities, no activation needed");
        }
        OutputClass::LogitLike => {
            println!("output range looks like logits, apply sigmoid before thresholding");
        }
    }
    for note in &report.notes {
        println!("note: {note}");
    }

    if let Some(image_path) = &args.image {
        ensure!(image_path.exists(), "probe image does not exist");
        println!("=== image probe: {} ===", image_path.display());
        let (tensor, _resized) = load_and_preprocess(image_path, model.image_size())?;
        let output = model.predict(tensor.view())?;
        let stats = TensorStats::of(output.view());
        println!("output {}", stats);

        println!("threshold sweep:");
        for row in threshold_sweep(output.view(), &unet_seg_tools::inspect::SWEEP_THRESHOLDS) {
            println!(
                "   t={:.1}: {} pixels above ({:.2}%)",
                row.threshold, row.pixels_above, row.percentage
            );
        }

        let prediction = mask::squeeze_prediction(output)?;
        let threshold = mask::effective_threshold(
            config.default_threshold,
            stats.max,
            config.adaptive_trigger,
            config.adaptive_fraction,
        );
        let binary = mask::binarize(prediction.view(), threshold);
        let stem = image_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let preview = image_path.with_file_name(format!("{stem}_mask.png"));
        mask::mask_to_image(&binary)
            .save(&preview)
            .context("failed to save mask preview")?;
        println!(
            "mask preview written to {} (threshold {:.6}, coverage {:.2}%)",
            preview.display(),
            threshold,
            mask::coverage_pct(&binary)
        );
    }

    if args.artifact.exists() {
        println!("=== artifact comparison: {} ===", args.artifact.display());
        let artifact = NnefArtifact::load(&args.artifact, &config)?;
        let input = match &args.image {
            Some(image_path) => load_and_preprocess(image_path, model.image_size())?.0,
            None => unet_seg_tools::inspect::uniform_probe(model.image_size(), 1.0),
        };
        let comparison = compare_backends(&model, &artifact, input.view(), config.default_threshold)?;
        println!("{comparison}");
    } else {
        println!(
            "artifact {} not found, skipping backend comparison",
            args.artifact.display()
        );
    }

    Ok(())
}
