use ndarray::prelude::*;

use crate::errors::Result;
use crate::traits::SegmentationBackend;

/// Mock backend for tests. Returns a constant-valued prediction map so the
/// pipeline above it can be exercised without a real model file.
#[derive(Debug, Clone)]
pub struct MockBackend {
    pub image_size: u32,
    pub value: f32,
}

impl MockBackend {
    pub const fn constant(image_size: u32, value: f32) -> Self {
        Self { image_size, value }
    }
}

impl SegmentationBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn input_size(&self) -> u32 {
        self.image_size
    }

    fn predict(&self, input: ArrayView4<f32>) -> Result<ArrayD<f32>> {
        let shape = input.shape();
        Ok(ArrayD::from_elem(
            IxDyn(&[shape[0], shape[1], shape[2], 1]),
            self.value,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_prediction_matches_input_geometry() -> Result<()> {
        let mock = MockBackend::constant(32, 0.75);
        let input = Array4::<f32>::zeros((1, 32, 32, 3));

        let output = mock.predict(input.view())?;
        assert_eq!(output.shape(), &[1, 32, 32, 1]);
        assert!(output.iter().all(|&v| (v - 0.75).abs() < f32::EPSILON));
        Ok(())
    }
}
