use std::path::Path;

use ndarray::prelude::*;
use ort::{
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session,
    },
    value::TensorRef,
};
use parking_lot::Mutex;

use crate::{
    config::PipelineConfig,
    errors::{Result, SegError},
    traits::SegmentationBackend,
};

/// Reference backend: the original ONNX graph executed with ONNX Runtime.
///
/// The session is wrapped in a mutex because `Session::run` takes `&mut self`;
/// the tools themselves are sequential, the lock just keeps the backend usable
/// behind a shared reference.
pub struct OrtModel {
    image_size: u32,
    input_name: String,
    output_name: String,
    input_shape: Vec<i64>,
    output_shape: Vec<i64>,
    input_desc: String,
    output_desc: String,
    session: Mutex<Session>,
}

impl OrtModel {
    /// Load with full graph optimization, the normal path.
    pub fn new(model_path: &Path, config: &PipelineConfig) -> Result<Self> {
        Self::with_optimization_level(model_path, GraphOptimizationLevel::Level3, config)
    }

    /// Load with an explicit optimization level.
    ///
    /// The converter's fallback chain retries with optimization disabled when
    /// the optimized load rejects the graph.
    pub fn with_optimization_level(
        model_path: &Path,
        level: GraphOptimizationLevel,
        config: &PipelineConfig,
    ) -> Result<Self> {
        if !model_path.exists() {
            return Err(SegError::PathNotFound {
                path: model_path.to_path_buf(),
            });
        }

        let mut session = SessionBuilder::new()
            .map_err(|e| SegError::Model {
                operation: "session builder initialization".to_string(),
                source: Box::new(e),
            })?
            .with_optimization_level(level)
            .map_err(|e| SegError::Model {
                operation: "graph optimization setup".to_string(),
                source: Box::new(<ort::Error>::from(e)),
            })?
            .with_memory_pattern(true)
            .map_err(|e| SegError::Model {
                operation: "memory pattern setup".to_string(),
                source: Box::new(<ort::Error>::from(e)),
            })?
            .commit_from_file(model_path)
            .map_err(|e| SegError::Model {
                operation: format!("model file load: {}", model_path.display()),
                source: Box::new(e),
            })?;

        let input_name = session.inputs()[0].name().to_string();
        let output_name = session.outputs()[0].name().to_string();
        let input_desc = format!("{:?}", session.inputs()[0].dtype());
        let output_desc = format!("{:?}", session.outputs()[0].dtype());

        let input_shape: Vec<i64> = session.inputs()[0]
            .dtype()
            .tensor_shape()
            .ok_or_else(|| SegError::Model {
                operation: "model input shape query".to_string(),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "input is not a tensor",
                )),
            })?
            .to_vec();
        let output_shape: Vec<i64> = session.outputs()[0]
            .dtype()
            .tensor_shape()
            .map(|s| s.to_vec())
            .unwrap_or_default();

        // NHWC layout: the height axis carries the spatial size. Dynamic
        // dimensions fall back to the configured size.
        let image_size = match input_shape.get(1) {
            Some(&h) if h > 0 => h as u32,
            _ => config.image_size,
        };

        // warm-up run, also proves the graph is executable
        let size = image_size as usize;
        let data = Array4::<f32>::zeros((1, size, size, 3));
        session
            .run(ort::inputs![input_name.as_str() => TensorRef::from_array_view(&data)
                .map_err(|e| SegError::Model {
                    operation: "warm-up tensor creation".to_string(),
                    source: Box::new(e),
                })?])
            .map_err(|e| SegError::Model {
                operation: "warm-up inference".to_string(),
                source: Box::new(e),
            })?;

        Ok(Self {
            image_size,
            input_name,
            output_name,
            input_shape,
            output_shape,
            input_desc,
            output_desc,
            session: Mutex::new(session),
        })
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    pub fn input_shape(&self) -> &[i64] {
        &self.input_shape
    }

    pub fn output_shape(&self) -> &[i64] {
        &self.output_shape
    }

    pub fn input_desc(&self) -> &str {
        &self.input_desc
    }

    pub fn output_desc(&self) -> &str {
        &self.output_desc
    }
}

/// Resize to the model's square input and scale pixels to `[0, 1]`, NHWC.
///
/// Returns the normalized tensor together with the resized RGB image the crop
/// step reuses.
pub fn preprocess_image(
    image: &image::RgbImage,
    image_size: u32,
) -> (Array4<f32>, image::RgbImage) {
    let resized = image::imageops::resize(
        image,
        image_size,
        image_size,
        image::imageops::FilterType::Lanczos3,
    );
    let tensor = Array4::from_shape_fn(
        (1, image_size as usize, image_size as usize, 3),
        |(_, y, x, c)| f32::from(resized.get_pixel(x as u32, y as u32).0[c]) / 255.0,
    );
    (tensor, resized)
}

/// Decode an image file and prepare it for inference.
pub fn load_and_preprocess(
    path: &Path,
    image_size: u32,
) -> Result<(Array4<f32>, image::RgbImage)> {
    let image = image::open(path)
        .map_err(|e| SegError::ImageProcessing {
            path: path.display().to_string(),
            operation: "image load".to_string(),
            source: Box::new(e),
        })?
        .to_rgb8();
    Ok(preprocess_image(&image, image_size))
}

impl SegmentationBackend for OrtModel {
    fn name(&self) -> &str {
        "onnxruntime"
    }

    fn input_size(&self) -> u32 {
        self.image_size
    }

    fn predict(&self, input: ArrayView4<f32>) -> Result<ArrayD<f32>> {
        let mut session = self.session.lock();
        let outputs = session.run(
            ort::inputs![self.input_name.as_str() => TensorRef::from_array_view(&input.as_standard_layout())?],
        )?;
        Ok(outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .to_owned())
    }
}
