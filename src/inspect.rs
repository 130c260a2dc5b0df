//! Read-only model inspection: structural metadata from the imported graph,
//! synthetic inference probes, and a classification of the output range.

use std::path::Path;

use ndarray::{Array4, ArrayViewD};
use rand::Rng;
use tract_onnx::prelude::*;
use tract_onnx::tract_hir::internal::*;

use crate::{
    config::PipelineConfig,
    errors::{Result, SegError},
    model::OrtModel,
    traits::SegmentationBackend,
};

/// Summary statistics over one tensor.
#[derive(Debug, Clone, Copy)]
pub struct TensorStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub std: f32,
}

impl TensorStats {
    pub fn of(values: ArrayViewD<f32>) -> Self {
        if values.is_empty() {
            return Self {
                min: 0.0,
                max: 0.0,
                mean: 0.0,
                std: 0.0,
            };
        }
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        let mut sum = 0.0f64;
        for &v in values.iter() {
            min = min.min(v);
            max = max.max(v);
            sum += f64::from(v);
        }
        let mean = sum / values.len() as f64;
        let variance = values
            .iter()
            .map(|&v| (f64::from(v) - mean).powi(2))
            .sum::<f64>()
            / values.len() as f64;
        Self {
            min,
            max,
            mean: mean as f32,
            std: variance.sqrt() as f32,
        }
    }
}

impl std::fmt::Display for TensorStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "range [{:.6}, {:.6}], mean {:.6}, std {:.6}",
            self.min, self.max, self.mean, self.std
        )
    }
}

/// Whether the output range looks like probabilities or raw logits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputClass {
    ProbabilityLike,
    LogitLike,
}

pub fn classify_output(min: f32, max: f32) -> OutputClass {
    if min >= 0.0 && max <= 1.0 {
        OutputClass::ProbabilityLike
    } else {
        OutputClass::LogitLike
    }
}

/// One node flagged by the normalization scan.
#[derive(Debug, Clone)]
pub struct NormalizationNode {
    pub index: usize,
    pub name: String,
    pub operator: String,
}

/// Structural facts read off the imported ONNX graph.
#[derive(Debug, Clone)]
pub struct GraphSummary {
    pub node_count: usize,
    pub parameter_count: usize,
    /// (name, operator) of the first graph node, normally the input source.
    pub first_node: (String, String),
    /// (name, operator) of the last graph node.
    pub last_node: (String, String),
    pub normalization_nodes: Vec<NormalizationNode>,
}

/// Enumerate the graph nodes of the ONNX file without building a session.
///
/// The session API exposes only boundary tensors; node-level questions (layer
/// types, parameter counts, embedded normalization) are answered from the
/// imported tract graph instead.
pub fn scan_graph(model_path: &Path) -> Result<GraphSummary> {
    if !model_path.exists() {
        return Err(SegError::PathNotFound {
            path: model_path.to_path_buf(),
        });
    }
    let imported = tract_onnx::onnx()
        .model_for_path(model_path)
        .map_err(|e| SegError::Model {
            operation: format!("graph import: {}", model_path.display()),
            source: e.into(),
        })?;

    let mut parameter_count = 0usize;
    let mut normalization_nodes = Vec::new();
    for (index, node) in imported.nodes.iter().enumerate() {
        let operator = node.op.name().to_string();
        let lower = operator.to_lowercase();
        if lower.contains("norm") || lower.contains("scal") {
            normalization_nodes.push(NormalizationNode {
                index,
                name: node.name.clone(),
                operator,
            });
            continue;
        }
        if operator == "Const" {
            if let Some(tensor) = node.outputs[0].fact.value.concretize() {
                parameter_count += tensor.len();
            }
        }
    }

    let first_node = imported
        .nodes
        .first()
        .map(|node| (node.name.clone(), node.op.name().to_string()))
        .unwrap_or_else(|| ("<empty>".to_string(), "<none>".to_string()));
    let last_node = imported
        .nodes
        .last()
        .map(|node| (node.name.clone(), node.op.name().to_string()))
        .unwrap_or_else(|| ("<empty>".to_string(), "<none>".to_string()));

    Ok(GraphSummary {
        node_count: imported.nodes.len(),
        parameter_count,
        first_node,
        last_node,
        normalization_nodes,
    })
}

/// Uniform random probe tensor with values in `[0, scale)`.
pub fn uniform_probe(image_size: u32, scale: f32) -> Array4<f32> {
    let mut rng = rand::thread_rng();
    let size = image_size as usize;
    Array4::from_shape_simple_fn((1, size, size, 3), || rng.gen::<f32>() * scale)
}

/// Probe built from integer pixel values `0..=255` scaled back to `[0, 1]`,
/// mimicking a real quantized image.
pub fn quantized_probe(image_size: u32) -> Array4<f32> {
    let mut rng = rand::thread_rng();
    let size = image_size as usize;
    Array4::from_shape_simple_fn((1, size, size, 3), || {
        f32::from(rng.gen_range(0u8..=255)) / 255.0
    })
}

/// One synthetic inference probe.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub label: String,
    pub input_stats: TensorStats,
    pub output_shape: Vec<usize>,
    pub output_stats: TensorStats,
}

/// Row of the threshold sweep table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepRow {
    pub threshold: f32,
    pub pixels_above: usize,
    pub percentage: f32,
}

/// Count prediction elements strictly above each threshold.
pub fn threshold_sweep(prediction: ArrayViewD<f32>, thresholds: &[f32]) -> Vec<SweepRow> {
    let total = prediction.len().max(1);
    thresholds
        .iter()
        .map(|&threshold| {
            let pixels_above = prediction.iter().filter(|&&p| p > threshold).count();
            SweepRow {
                threshold,
                pixels_above,
                percentage: pixels_above as f32 / total as f32 * 100.0,
            }
        })
        .collect()
}

/// The standard sweep grid, 0.1 through 0.9.
pub const SWEEP_THRESHOLDS: [f32; 9] = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9];

/// Full inspection report.
#[derive(Debug)]
pub struct InspectionReport {
    pub input_desc: String,
    pub output_desc: String,
    pub graph: GraphSummary,
    pub probes: Vec<ProbeResult>,
    pub classification: OutputClass,
    /// Threshold sweep over the first probe's output.
    pub sweep: Vec<SweepRow>,
    pub notes: Vec<String>,
}

/// Load the model and produce the report. The loaded backend is returned so a
/// follow-up comparison step can reuse it without a second session build.
pub fn inspect(model_path: &Path, config: &PipelineConfig) -> Result<(OrtModel, InspectionReport)> {
    let model = OrtModel::new(model_path, config)?;
    let graph = scan_graph(model_path)?;

    let probe_inputs = [
        ("uniform [0,1)", uniform_probe(model.input_size(), 1.0)),
        ("uniform [0,1), second draw", uniform_probe(model.input_size(), 1.0)),
        ("integers 0..=255 scaled by 1/255", quantized_probe(model.input_size())),
    ];

    let mut probes = Vec::with_capacity(probe_inputs.len());
    let mut sweep = Vec::new();
    for (label, input) in probe_inputs {
        let output = model.predict(input.view())?;
        if sweep.is_empty() {
            sweep = threshold_sweep(output.view(), &SWEEP_THRESHOLDS);
        }
        probes.push(ProbeResult {
            label: label.to_string(),
            input_stats: TensorStats::of(input.view().into_dyn()),
            output_shape: output.shape().to_vec(),
            output_stats: TensorStats::of(output.view()),
        });
    }

    // classification follows the first probe
    let reference = probes[0].output_stats;
    let classification = classify_output(reference.min, reference.max);
    let mut notes = Vec::new();
    match classification {
        OutputClass::ProbabilityLike => {
            if reference.mean < 0.1 {
                notes.push(
                    "output mean is very low; a low or adaptive threshold may be needed"
                        .to_string(),
                );
            } else if reference.mean > 0.9 {
                notes.push("output mean is very high; the model may be saturated".to_string());
            }
        }
        OutputClass::LogitLike => {
            notes.push(
                "output exceeds [0, 1]; values look like logits, apply sigmoid or softmax"
                    .to_string(),
            );
        }
    }
    if graph.normalization_nodes.is_empty() {
        notes.push(
            "no normalization node found in the graph; preprocessing must happen externally"
                .to_string(),
        );
    }

    let report = InspectionReport {
        input_desc: model.input_desc().to_string(),
        output_desc: model.output_desc().to_string(),
        graph,
        probes,
        classification,
        sweep,
        notes,
    };
    Ok((model, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    #[test]
    fn classification_boundaries() {
        assert_eq!(classify_output(0.0, 1.0), OutputClass::ProbabilityLike);
        assert_eq!(classify_output(0.2, 0.8), OutputClass::ProbabilityLike);
        assert_eq!(classify_output(-0.01, 0.8), OutputClass::LogitLike);
        assert_eq!(classify_output(0.0, 1.5), OutputClass::LogitLike);
    }

    #[test]
    fn stats_of_constant_tensor() {
        let t = ArrayD::from_elem(IxDyn(&[2, 3]), 0.5f32);
        let stats = TensorStats::of(t.view());
        assert_eq!(stats.min, 0.5);
        assert_eq!(stats.max, 0.5);
        assert!((stats.mean - 0.5).abs() < 1e-6);
        assert!(stats.std.abs() < 1e-6);
    }

    #[test]
    fn probes_have_expected_shape_and_range() {
        let probe = uniform_probe(16, 1.0);
        assert_eq!(probe.shape(), &[1, 16, 16, 3]);
        assert!(probe.iter().all(|&v| (0.0..1.0).contains(&v)));

        let probe = uniform_probe(8, 255.0);
        assert!(probe.iter().all(|&v| (0.0..255.0).contains(&v)));

        let probe = quantized_probe(8);
        assert!(probe.iter().all(|&v| (0.0..=1.0).contains(&v)));
        // every value must be k/255 for integer k
        assert!(probe
            .iter()
            .all(|&v| ((v * 255.0) - (v * 255.0).round()).abs() < 1e-4));
    }

    #[test]
    fn sweep_counts_strictly_above() {
        let p = ArrayD::from_shape_vec(IxDyn(&[4]), vec![0.1f32, 0.3, 0.5, 0.9]).unwrap();
        let rows = threshold_sweep(p.view(), &[0.3, 0.5]);
        assert_eq!(rows[0].pixels_above, 2); // 0.3 itself excluded
        assert_eq!(rows[1].pixels_above, 1);
        assert!((rows[0].percentage - 50.0).abs() < 1e-6);
    }
}
