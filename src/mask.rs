//! Pure mask operations: adaptive thresholding, binarization, coverage and
//! background removal. Everything here is deterministic and engine-agnostic.

use image::{GrayImage, Luma, Rgb, RgbImage};
use ndarray::prelude::*;

use crate::errors::{Result, SegError};

/// Threshold actually applied to a prediction.
///
/// When the maximum prediction is below `adaptive_trigger` the fixed threshold
/// would wipe out the whole mask, so the threshold falls back to
/// `adaptive_fraction * pred_max`. The result is always in `[0, pred_max]`.
pub fn effective_threshold(
    configured: f32,
    pred_max: f32,
    adaptive_trigger: f32,
    adaptive_fraction: f32,
) -> f32 {
    if pred_max < adaptive_trigger {
        pred_max * adaptive_fraction
    } else {
        configured
    }
}

/// Binarize a prediction with a strict comparison: foreground iff `p > t`.
pub fn binarize(prediction: ArrayView2<f32>, threshold: f32) -> Array2<u8> {
    prediction.mapv(|p| u8::from(p > threshold))
}

/// Percentage of foreground pixels, in `[0, 100]`.
pub fn coverage_pct(mask: &Array2<u8>) -> f32 {
    if mask.is_empty() {
        return 0.0;
    }
    let foreground = mask.iter().filter(|&&v| v == 1).count();
    foreground as f32 / mask.len() as f32 * 100.0
}

/// Reduce a raw model output to the 2-D prediction plane.
///
/// Accepts `[1, H, W, 1]`, `[1, H, W]` and `[H, W, 1]` layouts by dropping the
/// unit batch axis and a trailing unit channel axis.
pub fn squeeze_prediction(prediction: ArrayD<f32>) -> Result<Array2<f32>> {
    let mut p = prediction;
    while p.ndim() > 2 {
        let last = p.ndim() - 1;
        if p.shape()[0] == 1 {
            p = p.index_axis_move(Axis(0), 0);
        } else if p.shape()[last] == 1 {
            p = p.index_axis_move(Axis(last), 0);
        } else {
            return Err(SegError::Validation {
                field: "prediction".to_string(),
                reason: format!("unexpected output shape {:?}", p.shape()),
            });
        }
    }
    Ok(p.into_dimensionality::<Ix2>()?)
}

/// Render a 0/1 mask as a 0/255 grayscale image, rows as the first axis.
pub fn mask_to_image(mask: &Array2<u8>) -> GrayImage {
    let (height, width) = mask.dim();
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        Luma([mask[[y as usize, x as usize]] * 255])
    })
}

/// Zero every background pixel of `image`, keeping foreground untouched.
pub fn apply_mask(image: &RgbImage, mask: &Array2<u8>) -> Result<RgbImage> {
    let (height, width) = mask.dim();
    if image.width() as usize != width || image.height() as usize != height {
        return Err(SegError::Validation {
            field: "mask".to_string(),
            reason: format!(
                "dimensions {}x{} do not match image {}x{}",
                width,
                height,
                image.width(),
                image.height()
            ),
        });
    }
    Ok(RgbImage::from_fn(
        image.width(),
        image.height(),
        |x, y| {
            if mask[[y as usize, x as usize]] == 1 {
                *image.get_pixel(x, y)
            } else {
                Rgb([0, 0, 0])
            }
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_threshold_when_max_is_high() {
        let t = effective_threshold(0.3, 0.8, 0.1, 0.3);
        assert_eq!(t, 0.3);
    }

    #[test]
    fn adaptive_threshold_when_max_is_low() {
        let t = effective_threshold(0.3, 0.05, 0.1, 0.3);
        assert!((t - 0.015).abs() < 1e-7);
        // never exceeds the observed maximum
        assert!(t <= 0.05);
    }

    #[test]
    fn all_zero_prediction_yields_all_background_mask() {
        // max(P) = 0 selects the adaptive branch with t = 0; the strict `>`
        // comparison then keeps every zero pixel in the background.
        let prediction = Array2::<f32>::zeros((8, 8));
        let pred_max = prediction.iter().cloned().fold(f32::MIN, f32::max);
        let t = effective_threshold(0.3, pred_max, 0.1, 0.3);
        assert_eq!(t, 0.0);

        let mask = binarize(prediction.view(), t);
        assert!(mask.iter().all(|&v| v == 0));
        assert_eq!(coverage_pct(&mask), 0.0);
    }

    #[test]
    fn binarize_is_strict() {
        let prediction = array![[0.3f32, 0.300001, 0.29, 1.0]];
        let mask = binarize(prediction.view(), 0.3);
        assert_eq!(mask, array![[0u8, 1, 0, 1]]);
    }

    #[test]
    fn coverage_is_percentage_in_range() {
        let mask = array![[1u8, 0], [1, 0]];
        let pct = coverage_pct(&mask);
        assert!((pct - 50.0).abs() < 1e-6);
        assert!((0.0..=100.0).contains(&pct));
    }

    #[test]
    fn squeeze_handles_common_layouts() {
        let p = ArrayD::<f32>::zeros(ndarray::IxDyn(&[1, 4, 4, 1]));
        assert_eq!(squeeze_prediction(p).unwrap().dim(), (4, 4));

        let p = ArrayD::<f32>::zeros(ndarray::IxDyn(&[1, 4, 4]));
        assert_eq!(squeeze_prediction(p).unwrap().dim(), (4, 4));

        let p = ArrayD::<f32>::zeros(ndarray::IxDyn(&[4, 4, 1]));
        assert_eq!(squeeze_prediction(p).unwrap().dim(), (4, 4));
    }

    #[test]
    fn squeeze_rejects_multi_channel_output() {
        let p = ArrayD::<f32>::zeros(ndarray::IxDyn(&[1, 4, 4, 3]));
        assert!(squeeze_prediction(p).is_err());
    }

    #[test]
    fn mask_image_uses_full_scale_values() {
        let mask = array![[1u8, 0]];
        let img = mask_to_image(&mask);
        assert_eq!(img.get_pixel(0, 0).0, [255]);
        assert_eq!(img.get_pixel(1, 0).0, [0]);
    }

    #[test]
    fn apply_mask_zeroes_background_only() {
        let image = RgbImage::from_pixel(2, 1, Rgb([10, 20, 30]));
        let mask = array![[1u8, 0]];
        let out = apply_mask(&image, &mask).unwrap();
        assert_eq!(out.get_pixel(0, 0).0, [10, 20, 30]);
        assert_eq!(out.get_pixel(1, 0).0, [0, 0, 0]);
    }

    #[test]
    fn apply_mask_checks_dimensions() {
        let image = RgbImage::new(3, 3);
        let mask = Array2::<u8>::zeros((2, 2));
        assert!(apply_mask(&image, &mask).is_err());
    }
}
