/// Fixed parameters of the segmentation pipeline.
///
/// The model contract (256x256x3 input, per-pixel foreground probability) and
/// the thresholding policy live here so every tool works from the same values
/// instead of scattered globals.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Spatial size the model consumes (square input).
    pub image_size: u32,
    /// Default binarization threshold.
    pub default_threshold: f32,
    /// Below this maximum prediction the adaptive threshold kicks in.
    pub adaptive_trigger: f32,
    /// Adaptive threshold = this fraction of the maximum prediction.
    pub adaptive_fraction: f32,
    /// Coverage percentages below this produce a low-coverage warning.
    pub min_coverage_pct: f32,
    /// Advisory mean-absolute-difference guideline for backend comparison.
    pub precision_tolerance: f32,
    /// Output layout of the batch pipeline.
    pub masks_subdir: String,
    pub crops_subdir: String,
    pub mask_prefix: String,
    pub crop_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            image_size: 256,
            default_threshold: 0.3,
            adaptive_trigger: 0.1,
            adaptive_fraction: 0.3,
            min_coverage_pct: 0.1,
            precision_tolerance: 0.01,
            masks_subdir: "masks".to_string(),
            crops_subdir: "crops".to_string(),
            mask_prefix: "mascara_".to_string(),
            crop_prefix: "recorte_".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn image_size_usize(&self) -> usize {
        self.image_size as usize
    }
}
