use crate::errors::Result;
use ndarray::prelude::*;

/// Abstraction over an inference engine that maps an NHWC image tensor to a
/// per-pixel foreground prediction.
///
/// Both the ONNX Runtime session and the converted NNEF artifact implement
/// this, which is what lets the batch pipeline and the comparator run against
/// either backend (or a mock in tests) without caring which engine is behind
/// the call.
pub trait SegmentationBackend: Send + Sync {
    /// Human-readable backend label used in reports.
    fn name(&self) -> &str;

    /// Spatial size of the square input the backend expects.
    fn input_size(&self) -> u32;

    /// Run one inference. Input is `[1, H, W, 3]` f32; the output keeps the
    /// backend's native rank (typically `[1, H, W, 1]`), callers squeeze it.
    fn predict(&self, input: ArrayView4<f32>) -> Result<ArrayD<f32>>;
}
