//! Numerical comparison between two inference backends. Everything is
//! reported, nothing is enforced; interpretation is left to the operator.

use ndarray::{ArrayView4, ArrayViewD, Zip};

use crate::errors::{Result, SegError};
use crate::traits::SegmentationBackend;

/// Elementwise difference statistics plus binarized-mask disagreement.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonReport {
    pub mean_abs_diff: f32,
    pub max_abs_diff: f32,
    pub min_abs_diff: f32,
    /// Elements with absolute difference above 0.01.
    pub above_hundredth: usize,
    /// Elements with absolute difference above 0.1.
    pub above_tenth: usize,
    /// Pixels where the two masks, binarized at the fixed threshold, disagree.
    pub mask_disagreement: usize,
    pub total_elements: usize,
    pub mask_threshold: f32,
}

impl ComparisonReport {
    pub fn disagreement_pct(&self) -> f32 {
        if self.total_elements == 0 {
            return 0.0;
        }
        self.mask_disagreement as f32 / self.total_elements as f32 * 100.0
    }
}

impl std::fmt::Display for ComparisonReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "   Mean difference: {:.6}", self.mean_abs_diff)?;
        writeln!(f, "   Max difference:  {:.6}", self.max_abs_diff)?;
        writeln!(f, "   Min difference:  {:.6}", self.min_abs_diff)?;
        writeln!(f, "   Elements with difference > 0.01: {}", self.above_hundredth)?;
        writeln!(f, "   Elements with difference > 0.1:  {}", self.above_tenth)?;
        writeln!(
            f,
            "   Binarized masks (threshold {}): {} differing pixels ({:.2}%)",
            self.mask_threshold,
            self.mask_disagreement,
            self.disagreement_pct()
        )
    }
}

/// Compare two prediction tensors of identical shape.
pub fn compare_outputs(
    reference: ArrayViewD<f32>,
    candidate: ArrayViewD<f32>,
    mask_threshold: f32,
) -> Result<ComparisonReport> {
    if reference.shape() != candidate.shape() {
        return Err(SegError::Validation {
            field: "outputs".to_string(),
            reason: format!(
                "shape mismatch: {:?} vs {:?}",
                reference.shape(),
                candidate.shape()
            ),
        });
    }
    let total = reference.len();
    if total == 0 {
        return Err(SegError::Validation {
            field: "outputs".to_string(),
            reason: "empty output tensors".to_string(),
        });
    }

    let mut sum = 0.0f64;
    let mut max = f32::MIN;
    let mut min = f32::MAX;
    let mut above_hundredth = 0usize;
    let mut above_tenth = 0usize;
    let mut mask_disagreement = 0usize;

    Zip::from(&reference).and(&candidate).for_each(|&a, &b| {
        let d = (a - b).abs();
        sum += f64::from(d);
        max = max.max(d);
        min = min.min(d);
        if d > 0.01 {
            above_hundredth += 1;
        }
        if d > 0.1 {
            above_tenth += 1;
        }
        if (a > mask_threshold) != (b > mask_threshold) {
            mask_disagreement += 1;
        }
    });

    Ok(ComparisonReport {
        mean_abs_diff: (sum / total as f64) as f32,
        max_abs_diff: max,
        min_abs_diff: min,
        above_hundredth,
        above_tenth,
        mask_disagreement,
        total_elements: total,
        mask_threshold,
    })
}

/// Run the same input through both backends and compare the raw outputs.
pub fn compare_backends(
    reference: &dyn SegmentationBackend,
    candidate: &dyn SegmentationBackend,
    input: ArrayView4<f32>,
    mask_threshold: f32,
) -> Result<ComparisonReport> {
    let reference_out = reference.predict(input)?;
    let candidate_out = candidate.predict(input)?;
    compare_outputs(reference_out.view(), candidate_out.view(), mask_threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    fn tensor(values: &[f32]) -> ArrayD<f32> {
        ArrayD::from_shape_vec(IxDyn(&[1, values.len(), 1, 1]), values.to_vec()).unwrap()
    }

    #[test]
    fn identical_outputs_have_zero_difference() {
        let a = tensor(&[0.1, 0.5, 0.9]);
        let report = compare_outputs(a.view(), a.view(), 0.3).unwrap();
        assert_eq!(report.mean_abs_diff, 0.0);
        assert_eq!(report.max_abs_diff, 0.0);
        assert_eq!(report.mask_disagreement, 0);
    }

    #[test]
    fn difference_statistics_are_exact() {
        let a = tensor(&[0.0, 0.5, 1.0, 0.2]);
        let b = tensor(&[0.1, 0.5, 0.8, 0.2]);
        let report = compare_outputs(a.view(), b.view(), 0.3).unwrap();
        assert!((report.mean_abs_diff - 0.075).abs() < 1e-6);
        assert!((report.max_abs_diff - 0.2).abs() < 1e-6);
        assert_eq!(report.min_abs_diff, 0.0);
        assert_eq!(report.above_hundredth, 2);
        assert_eq!(report.above_tenth, 1);
    }

    #[test]
    fn mask_disagreement_counts_threshold_crossings() {
        // 0.25 vs 0.35 crosses the 0.3 threshold, 0.5 vs 0.6 does not
        let a = tensor(&[0.25, 0.5]);
        let b = tensor(&[0.35, 0.6]);
        let report = compare_outputs(a.view(), b.view(), 0.3).unwrap();
        assert_eq!(report.mask_disagreement, 1);
        assert!((report.disagreement_pct() - 50.0).abs() < 1e-6);
    }

    #[test]
    fn comparison_is_deterministic() {
        let a = tensor(&[0.1, 0.4, 0.7, 0.2, 0.9]);
        let b = tensor(&[0.2, 0.3, 0.8, 0.1, 0.95]);
        let first = compare_outputs(a.view(), b.view(), 0.3).unwrap();
        let second = compare_outputs(a.view(), b.view(), 0.3).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn large_differences_are_reported_not_enforced() {
        // differences far above the 0.01 guideline still produce a normal
        // report; no threshold turns the comparison into an error
        let a = tensor(&[0.0, 0.0, 0.0]);
        let b = tensor(&[0.9, 0.8, 0.7]);
        let report = compare_outputs(a.view(), b.view(), 0.3).unwrap();
        assert!(report.mean_abs_diff > 0.01);
        assert_eq!(report.above_hundredth, 3);
        assert_eq!(report.mask_disagreement, 3);
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let a = tensor(&[0.1, 0.2]);
        let b = tensor(&[0.1, 0.2, 0.3]);
        assert!(compare_outputs(a.view(), b.view(), 0.3).is_err());
    }
}
