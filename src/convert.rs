//! ONNX to NNEF artifact conversion.
//!
//! The artifact is a gzip-compressed NNEF tar produced by tract. Serialization
//! prefers the plain NNEF registry (maximally portable artifact) and widens to
//! the tract-core extension registry only when the graph contains operators
//! the core spec cannot express.

use std::{
    fs,
    path::{Path, PathBuf},
};

use flate2::{write::GzEncoder, Compression};
use ndarray::Array4;
use tract_core::transform::ModelTransform as _;
use tract_nnef::prelude::*;
use tract_onnx::prelude::*;

use crate::{
    artifact::{NnefArtifact, TensorDesc},
    compare::compare_outputs,
    config::PipelineConfig,
    errors::{Result, SegError},
    inspect::uniform_probe,
    model::OrtModel,
    traits::SegmentationBackend,
};

#[derive(Debug, Clone, Copy)]
pub struct ConvertOptions {
    /// Apply the f32-to-f16 transform before serialization (halves the
    /// artifact size at a small precision cost).
    pub optimize: bool,
    /// Compare the artifact's output against the original model afterwards.
    pub validate_precision: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            optimize: true,
            validate_precision: false,
        }
    }
}

/// Result of the optional precision validation step.
#[derive(Debug, Clone, Copy)]
pub struct PrecisionReport {
    pub mean_abs_diff: f32,
    pub max_abs_diff: f32,
    pub tolerance: f32,
}

impl PrecisionReport {
    pub fn within_tolerance(&self) -> bool {
        self.mean_abs_diff <= self.tolerance
    }
}

#[derive(Debug)]
pub struct ConversionOutcome {
    pub artifact_path: PathBuf,
    pub file_size: u64,
    pub optimized: bool,
    /// The plain NNEF registry could not express the graph and the tract-core
    /// extension registry was used instead.
    pub used_extended_ops: bool,
    /// Input/output facts of the reloaded artifact; `None` means the reload
    /// failed (reported as a warning, the file was already written).
    pub integrity: Option<(TensorDesc, TensorDesc)>,
    pub precision: Option<PrecisionReport>,
}

/// Classify a serialization failure: only unsupported-operator errors are
/// worth retrying with the widened registry.
pub fn is_unsupported_op_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["no serializer", "not supported", "not implemented", "translating node"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Fixed per-channel scale/offset transform the model was trained with:
/// pixel values in `[0, 255]` map to `[-1, 1]`.
pub fn scale_offset_preprocess(input: &Array4<f32>) -> Array4<f32> {
    input.mapv(|v| v / 127.5 - 1.0)
}

/// Serialize a typed model as a gzip-compressed NNEF tar.
///
/// Exposed at this granularity so the write/reload cycle is testable with a
/// hand-built graph, without needing an ONNX file on disk.
pub fn write_artifact(model: &TypedModel, path: &Path, extended: bool) -> TractResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let nnef = if extended {
        tract_nnef::nnef().with_tract_core()
    } else {
        tract_nnef::nnef()
    };
    let file = fs::File::create(path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let encoder = nnef.write_to_tar(model, encoder)?;
    encoder.finish()?;
    Ok(())
}

/// Load the ONNX graph with tract and prepare it for serialization.
fn import_graph(input: &Path, config: &PipelineConfig) -> Result<TypedModel> {
    let size = config.image_size_usize();
    let mut typed = tract_onnx::onnx()
        .model_for_path(input)
        .map_err(|e| SegError::Conversion {
            operation: format!("graph import: {}", input.display()),
            source: e.into(),
        })?
        .with_input_fact(0, f32::fact([1, size, size, 3]).into())
        .map_err(|e| SegError::Conversion {
            operation: "input fact pinning".to_string(),
            source: e.into(),
        })?
        .into_typed()
        .map_err(|e| SegError::Conversion {
            operation: "graph typing".to_string(),
            source: e.into(),
        })?;
    typed.declutter().map_err(|e| SegError::Conversion {
        operation: "graph declutter".to_string(),
        source: e.into(),
    })?;
    Ok(typed)
}

/// Build the reference ort session used for metadata and precision checks.
///
/// Fallback chain: optimized load first, then a retry with graph
/// optimization disabled. If both fail, validation is disabled and the
/// conversion continues, since tract does all the actual work.
fn load_reference(
    input: &Path,
    config: &PipelineConfig,
    wants_validation: bool,
) -> Option<OrtModel> {
    match OrtModel::new(input, config) {
        Ok(model) => Some(model),
        Err(first) => {
            println!("[WARN] optimized reference load failed: {first}");
            println!("[INFO] retrying with graph optimization disabled...");
            match OrtModel::with_optimization_level(
                input,
                ort::session::builder::GraphOptimizationLevel::Disable,
                config,
            ) {
                Ok(model) => Some(model),
                Err(second) => {
                    println!("[WARN] reference load failed again: {second}");
                    if wants_validation {
                        println!("[WARN] precision validation is disabled for this run");
                    }
                    None
                }
            }
        }
    }
}

pub fn convert_model(
    input: &Path,
    output: &Path,
    options: ConvertOptions,
    config: &PipelineConfig,
) -> Result<ConversionOutcome> {
    if !input.exists() {
        return Err(SegError::PathNotFound {
            path: input.to_path_buf(),
        });
    }

    println!("[INFO] loading model: {}", input.display());
    let reference = load_reference(input, config, options.validate_precision);

    if let Some(model) = &reference {
        println!("[INFO] model information:");
        println!("   input shape:  {:?}", model.input_shape());
        println!("   output shape: {:?}", model.output_shape());

        let expected: Vec<i64> = vec![
            i64::from(config.image_size),
            i64::from(config.image_size),
            3,
        ];
        if model.input_shape().len() != 4 || model.input_shape()[1..] != expected[..] {
            println!(
                "[WARN] model expects input shape {:?}, the application assumes {:?}",
                &model.input_shape()[1..],
                expected
            );
        }
        match model.output_shape().len() {
            4 => println!("[INFO] segmentation model detected (rank-4 output)"),
            2 => println!("[INFO] classification model detected (rank-2 output)"),
            rank => println!("[INFO] output rank: {rank}"),
        }
    }

    println!("[INFO] importing graph for conversion...");
    let mut typed = import_graph(input, config)?;

    if options.optimize {
        println!("[INFO] applying optimizations (float16 weights)...");
        let transform = tract_core::transform::get_transform("f32-to-f16").ok_or_else(|| {
            SegError::Conversion {
                operation: "f32-to-f16 transform lookup".to_string(),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "transform not registered",
                )),
            }
        })?;
        transform.transform(&mut typed).map_err(|e| SegError::Conversion {
            operation: "f32-to-f16 transform".to_string(),
            source: e.into(),
        })?;
    } else {
        println!("[INFO] converting without optimizations (larger, full precision)...");
    }

    println!("[INFO] writing NNEF artifact...");
    let mut used_extended_ops = false;
    if let Err(err) = write_artifact(&typed, output, false) {
        let message = format!("{err:#}");
        if is_unsupported_op_error(&message) {
            println!("[WARN] some operators are outside the core NNEF spec");
            println!("[INFO] retrying with the tract-core extension op set...");
            used_extended_ops = true;
            write_artifact(&typed, output, true).map_err(|e| SegError::Conversion {
                operation: "artifact serialization (extended op set)".to_string(),
                source: e.into(),
            })?;
            println!("[OK] conversion succeeded with extension ops");
            println!("[WARN] the artifact requires a tract-based runtime to load");
        } else {
            return Err(SegError::Conversion {
                operation: "artifact serialization".to_string(),
                source: err.into(),
            });
        }
    }

    let file_size = fs::metadata(output)
        .map_err(|e| SegError::FileSystem {
            path: output.to_path_buf(),
            operation: "artifact size query".to_string(),
            source: e,
        })?
        .len();
    println!(
        "[OK] conversion finished: {} ({:.2} MiB, {} bytes)",
        output.display(),
        file_size as f64 / (1024.0 * 1024.0),
        file_size
    );

    // Reload the written file to prove it is usable. A failure here is only a
    // warning: the artifact is already on disk.
    println!("[INFO] verifying artifact integrity...");
    let (integrity, artifact) = match NnefArtifact::load(output, config) {
        Ok(artifact) => {
            println!("[OK] artifact reloads cleanly");
            println!("   input:  {}", artifact.input_desc());
            println!("   output: {}", artifact.output_desc());
            (
                Some((artifact.input_desc().clone(), artifact.output_desc().clone())),
                Some(artifact),
            )
        }
        Err(err) => {
            println!("[WARN] artifact verification failed: {err}");
            (None, None)
        }
    };

    let precision = match (reference, artifact) {
        (Some(model), Some(artifact)) if options.validate_precision => {
            println!("[INFO] validating converted model precision...");
            let raw = uniform_probe(model.input_size(), 255.0);
            let input = scale_offset_preprocess(&raw);
            let report = compare_outputs(
                model.predict(input.view())?.view(),
                artifact.predict(input.view())?.view(),
                config.default_threshold,
            )?;
            let precision = PrecisionReport {
                mean_abs_diff: report.mean_abs_diff,
                max_abs_diff: report.max_abs_diff,
                tolerance: config.precision_tolerance,
            };
            println!("   mean difference: {:.6}", precision.mean_abs_diff);
            println!("   max difference:  {:.6}", precision.max_abs_diff);
            if precision.within_tolerance() {
                println!("[OK] difference within the {:.0}% guideline", config.precision_tolerance * 100.0);
            } else {
                println!(
                    "[WARN] mean difference above the {:.0}% guideline; the float16 optimization or the conversion may be losing precision",
                    config.precision_tolerance * 100.0
                );
            }
            Some(precision)
        }
        _ => None,
    };

    Ok(ConversionOutcome {
        artifact_path: output.to_path_buf(),
        file_size,
        optimized: options.optimize,
        used_extended_ops,
        integrity,
        precision,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_op_errors_are_recognized() {
        assert!(is_unsupported_op_error("No serializer registered for op Foo"));
        assert!(is_unsupported_op_error("operator X is NOT SUPPORTED"));
        assert!(is_unsupported_op_error("feature not implemented"));
        assert!(!is_unsupported_op_error("permission denied"));
        assert!(!is_unsupported_op_error("unexpected end of file"));
    }

    #[test]
    fn scale_offset_maps_pixel_range_to_unit_interval() {
        let input = Array4::from_shape_vec(
            (1, 1, 1, 3),
            vec![0.0f32, 127.5, 255.0],
        )
        .unwrap();
        let out = scale_offset_preprocess(&input);
        assert!((out[[0, 0, 0, 0]] + 1.0).abs() < 1e-6);
        assert!(out[[0, 0, 0, 1]].abs() < 1e-6);
        assert!((out[[0, 0, 0, 2]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn options_default_to_optimized_without_validation() {
        let options = ConvertOptions::default();
        assert!(options.optimize);
        assert!(!options.validate_precision);
    }

    #[test]
    fn out_of_tolerance_precision_is_advisory() {
        // a drifting artifact still yields a successful outcome; the report
        // carries the numbers and nothing downstream treats them as an error
        let outcome = ConversionOutcome {
            artifact_path: PathBuf::from("assets/model.nnef.tgz"),
            file_size: 1024,
            optimized: true,
            used_extended_ops: false,
            integrity: None,
            precision: Some(PrecisionReport {
                mean_abs_diff: 0.05,
                max_abs_diff: 0.2,
                tolerance: 0.01,
            }),
        };
        let precision = outcome.precision.unwrap();
        assert!(!precision.within_tolerance());
    }

    #[test]
    fn precision_report_tolerance_check() {
        let ok = PrecisionReport {
            mean_abs_diff: 0.005,
            max_abs_diff: 0.1,
            tolerance: 0.01,
        };
        assert!(ok.within_tolerance());
        let bad = PrecisionReport {
            mean_abs_diff: 0.02,
            ..ok
        };
        assert!(!bad.within_tolerance());
    }
}
