use std::path::Path;

use ndarray::{ArrayD, ArrayView4, IxDyn};
use tract_nnef::prelude::*;

use crate::{
    config::PipelineConfig,
    errors::{Result, SegError},
    traits::SegmentationBackend,
};

type Plan = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Describes one boundary tensor of the artifact, for the integrity report.
#[derive(Debug, Clone)]
pub struct TensorDesc {
    pub rank: usize,
    pub shape: Option<Vec<usize>>,
    pub datum_type: DatumType,
}

impl std::fmt::Display for TensorDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.shape {
            Some(shape) => write!(f, "{:?} ({:?})", shape, self.datum_type),
            None => write!(f, "rank {} ({:?})", self.rank, self.datum_type),
        }
    }
}

/// Mobile backend: the converted NNEF artifact executed with tract.
///
/// Loading always enables the tract-core registry so both plain-NNEF and
/// extended-op artifacts read back, and f16-optimized artifacts get their
/// inputs and outputs cast at the boundary.
pub struct NnefArtifact {
    image_size: u32,
    input: TensorDesc,
    output: TensorDesc,
    plan: Plan,
}

impl NnefArtifact {
    pub fn load(path: &Path, config: &PipelineConfig) -> Result<Self> {
        if !path.exists() {
            return Err(SegError::PathNotFound {
                path: path.to_path_buf(),
            });
        }

        let model = tract_nnef::nnef()
            .with_tract_core()
            .model_for_path(path)
            .map_err(|e| SegError::Model {
                operation: format!("artifact load: {}", path.display()),
                source: e.into(),
            })?;

        let input = Self::describe(model.input_fact(0)?);
        let output = Self::describe(model.output_fact(0)?);

        let image_size = match input.shape.as_ref().and_then(|s| s.get(1)) {
            Some(&h) if h > 1 => h as u32,
            _ => config.image_size,
        };

        let plan = model
            .into_optimized()
            .map_err(|e| SegError::Model {
                operation: "artifact optimization".to_string(),
                source: e.into(),
            })?
            .into_runnable()
            .map_err(|e| SegError::Model {
                operation: "artifact plan creation".to_string(),
                source: e.into(),
            })?;

        Ok(Self {
            image_size,
            input,
            output,
            plan,
        })
    }

    fn describe(fact: &TypedFact) -> TensorDesc {
        TensorDesc {
            rank: fact.rank(),
            shape: fact.shape.as_concrete().map(|s| s.to_vec()),
            datum_type: fact.datum_type,
        }
    }

    pub fn input_desc(&self) -> &TensorDesc {
        &self.input
    }

    pub fn output_desc(&self) -> &TensorDesc {
        &self.output
    }
}

impl SegmentationBackend for NnefArtifact {
    fn name(&self) -> &str {
        "tract-nnef"
    }

    fn input_size(&self) -> u32 {
        self.image_size
    }

    fn predict(&self, input: ArrayView4<f32>) -> Result<ArrayD<f32>> {
        let standard = input.as_standard_layout();
        let slice = standard.as_slice().ok_or_else(|| SegError::Model {
            operation: "input tensor layout".to_string(),
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "input tensor is not contiguous",
            )),
        })?;
        let mut tensor = Tensor::from_shape(input.shape(), slice)?;

        // f16-optimized artifacts expect half-precision at the boundary
        if self.input.datum_type != f32::datum_type() {
            tensor = tensor.cast_to_dt(self.input.datum_type)?.into_owned();
        }

        let outputs = self.plan.run(tvec!(tensor.into()))?;
        let out = outputs[0].cast_to::<f32>()?;
        let shape = out.shape().to_vec();
        let data = out.as_slice::<f32>()?.to_vec();
        Ok(ArrayD::from_shape_vec(IxDyn(&shape), data)?)
    }
}
