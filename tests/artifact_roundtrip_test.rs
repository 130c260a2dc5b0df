use ndarray::Array4;
use tempfile::TempDir;
use tract_nnef::prelude::*;

use unet_seg_tools::{convert::write_artifact, NnefArtifact, PipelineConfig, SegmentationBackend};

const SIZE: usize = 8;

/// A single-sigmoid stand-in with the same boundary contract as the real
/// model: NHWC f32 in, per-element value in (0, 1) out.
fn tiny_model() -> TypedModel {
    let mut model = TypedModel::default();
    let source = model
        .add_source("input", f32::fact([1, SIZE, SIZE, 3]))
        .unwrap();
    let output = model
        .wire_node("sigmoid", tract_core::ops::nn::sigmoid(), &[source])
        .unwrap();
    model.set_output_outlets(&output).unwrap();
    model
}

fn test_input() -> Array4<f32> {
    Array4::from_shape_fn((1, SIZE, SIZE, 3), |(_, y, x, c)| {
        (y * SIZE * 3 + x * 3 + c) as f32 / 50.0 - 1.5
    })
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

#[test]
fn artifact_written_and_reloaded_matches_direct_evaluation() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("assets").join("model.nnef.tgz");

    write_artifact(&tiny_model(), &path, false).unwrap();
    assert!(path.exists());
    assert!(path.metadata().unwrap().len() > 0);

    let artifact = NnefArtifact::load(&path, &PipelineConfig::default()).unwrap();
    assert_eq!(artifact.input_size(), SIZE as u32);

    let input = test_input();
    let output = artifact.predict(input.view()).unwrap();
    assert_eq!(output.shape(), &[1, SIZE, SIZE, 3]);

    for (&got, &fed) in output.iter().zip(input.iter()) {
        assert!(
            (got - sigmoid(fed)).abs() < 1e-5,
            "expected sigmoid({fed}) = {}, got {got}",
            sigmoid(fed)
        );
    }
}

#[test]
fn extended_registry_artifacts_reload() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("model.nnef.tgz");

    write_artifact(&tiny_model(), &path, true).unwrap();

    let artifact = NnefArtifact::load(&path, &PipelineConfig::default()).unwrap();
    let output = artifact.predict(test_input().view()).unwrap();
    assert_eq!(output.shape(), &[1, SIZE, SIZE, 3]);
}

#[test]
fn half_precision_artifact_stays_close_to_full_precision() {
    use tract_core::transform::ModelTransform as _;

    let temp = TempDir::new().unwrap();
    let path = temp.path().join("model_f16.nnef.tgz");

    let mut model = tiny_model();
    let transform = tract_core::transform::get_transform("f32-to-f16").unwrap();
    transform.transform(&mut model).unwrap();
    write_artifact(&model, &path, true).unwrap();

    let artifact = NnefArtifact::load(&path, &PipelineConfig::default()).unwrap();
    let input = test_input();
    let output = artifact.predict(input.view()).unwrap();

    // Half precision loses bits but the sigmoid response stays within
    // rounding distance of the f32 result.
    for (&got, &fed) in output.iter().zip(input.iter()) {
        assert!(
            (got - sigmoid(fed)).abs() < 5e-3,
            "f16 drift too large at input {fed}: got {got}"
        );
    }
}
