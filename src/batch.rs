//! Sequential batch pipeline: one directory of images in, one mask and one
//! background-free crop per image out. A bad image never aborts the batch; it
//! is counted and the loop moves on.

use std::{
    fs,
    path::{Path, PathBuf},
};

use indicatif::{ProgressBar, ProgressStyle};
use walkdir::WalkDir;

use crate::{
    config::PipelineConfig,
    errors::{Result, SegError},
    inspect::TensorStats,
    mask,
    model::load_and_preprocess,
    traits::SegmentationBackend,
};

/// Outcome of one processed image, used for per-image reporting.
#[derive(Debug, Clone, Copy)]
pub struct ImageOutcome {
    pub stats: TensorStats,
    pub effective_threshold: f32,
    pub adaptive: bool,
    pub coverage_pct: f32,
    pub low_coverage: bool,
}

/// Final counts of a directory run.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub successful: usize,
    pub failed: usize,
    pub total: usize,
    pub masks_dir: PathBuf,
    pub crops_dir: PathBuf,
}

pub struct BatchPipeline<B: SegmentationBackend> {
    backend: B,
    config: PipelineConfig,
}

impl<B: SegmentationBackend> BatchPipeline<B> {
    pub const fn new(backend: B, config: PipelineConfig) -> Self {
        Self { backend, config }
    }

    pub fn is_supported_image_format(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                matches!(
                    ext.to_lowercase().as_str(),
                    "jpg" | "jpeg" | "png" | "webp" | "bmp" | "tiff" | "tif"
                )
            })
    }

    fn collect_image_files(input_dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(input_dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry.path().is_file() && Self::is_supported_image_format(entry.path())
            })
            .map(|entry| entry.into_path())
            .collect();
        files.sort();
        files
    }

    /// Process every supported image under `input_dir`.
    ///
    /// Preconditions fail fast before any image is touched; per-image failures
    /// are counted and reported at the end.
    pub fn process_directory(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        threshold: f32,
    ) -> Result<BatchSummary> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(SegError::Validation {
                field: "threshold".to_string(),
                reason: format!("must be in [0, 1], got {threshold}"),
            });
        }
        if !input_dir.exists() {
            return Err(SegError::PathNotFound {
                path: input_dir.to_path_buf(),
            });
        }
        if !input_dir.is_dir() {
            return Err(SegError::Validation {
                field: "input".to_string(),
                reason: format!("{} is not a directory", input_dir.display()),
            });
        }

        let masks_dir = output_dir.join(&self.config.masks_subdir);
        let crops_dir = output_dir.join(&self.config.crops_subdir);
        for dir in [&masks_dir, &crops_dir] {
            fs::create_dir_all(dir).map_err(|e| SegError::FileSystem {
                path: dir.clone(),
                operation: "output directory creation".to_string(),
                source: e,
            })?;
        }

        let image_files = Self::collect_image_files(input_dir);
        if image_files.is_empty() {
            println!("no supported images found in {}", input_dir.display());
            return Ok(BatchSummary {
                successful: 0,
                failed: 0,
                total: 0,
                masks_dir,
                crops_dir,
            });
        }

        println!(
            "processing {} images (threshold {}, input {}x{})",
            image_files.len(),
            threshold,
            self.backend.input_size(),
            self.backend.input_size()
        );

        let pb = ProgressBar::new(image_files.len() as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec} {eta})",
            )
            .map_err(|e| SegError::Configuration {
                message: format!("progress bar template: {e}"),
            })?
            .progress_chars("#>-"),
        );

        let mut successful = 0usize;
        let mut failed = 0usize;
        for path in &image_files {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match self.process_single_image(path, &name, &masks_dir, &crops_dir, threshold) {
                Ok(outcome) => {
                    pb.println(format!(
                        "   {name}: max {:.4}, mean {:.4}, threshold {:.6}{}",
                        outcome.stats.max,
                        outcome.stats.mean,
                        outcome.effective_threshold,
                        if outcome.adaptive { " (adaptive)" } else { "" },
                    ));
                    if outcome.low_coverage {
                        pb.println(format!(
                            "   {name}: WARNING coverage {:.2}% below the {:.2}% minimum, nothing segmented",
                            outcome.coverage_pct, self.config.min_coverage_pct
                        ));
                    } else {
                        pb.println(format!("   {name}: coverage {:.2}%", outcome.coverage_pct));
                    }
                    successful += 1;
                }
                Err(err) => {
                    pb.println(format!("   {name}: ERROR {err}"));
                    failed += 1;
                }
            }
            pb.inc(1);
        }
        pb.finish();

        let summary = BatchSummary {
            successful,
            failed,
            total: image_files.len(),
            masks_dir,
            crops_dir,
        };
        println!(
            "done: {} successful, {} failed, {} total",
            summary.successful, summary.failed, summary.total
        );
        println!("   masks: {}", summary.masks_dir.display());
        println!("   crops: {}", summary.crops_dir.display());
        Ok(summary)
    }

    fn process_single_image(
        &self,
        path: &Path,
        name: &str,
        masks_dir: &Path,
        crops_dir: &Path,
        threshold: f32,
    ) -> Result<ImageOutcome> {
        let (tensor, resized) = load_and_preprocess(path, self.backend.input_size())?;
        let output = self.backend.predict(tensor.view())?;
        let prediction = mask::squeeze_prediction(output)?;
        let stats = TensorStats::of(prediction.view().into_dyn());

        let effective_threshold = mask::effective_threshold(
            threshold,
            stats.max,
            self.config.adaptive_trigger,
            self.config.adaptive_fraction,
        );
        let adaptive = stats.max < self.config.adaptive_trigger;

        let binary = mask::binarize(prediction.view(), effective_threshold);
        let coverage_pct = mask::coverage_pct(&binary);
        let low_coverage = coverage_pct < self.config.min_coverage_pct;

        let mask_path = masks_dir.join(format!("{}{}", self.config.mask_prefix, name));
        mask::mask_to_image(&binary)
            .save(&mask_path)
            .map_err(|e| SegError::ImageProcessing {
                path: mask_path.display().to_string(),
                operation: "mask save".to_string(),
                source: Box::new(e),
            })?;

        let crop_path = crops_dir.join(format!("{}{}", self.config.crop_prefix, name));
        mask::apply_mask(&resized, &binary)?
            .save(&crop_path)
            .map_err(|e| SegError::ImageProcessing {
                path: crop_path.display().to_string(),
                operation: "crop save".to_string(),
                source: Box::new(e),
            })?;

        Ok(ImageOutcome {
            stats,
            effective_threshold,
            adaptive,
            coverage_pct,
            low_coverage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockBackend;

    #[test]
    fn supported_formats() {
        let accepted = ["a.jpg", "b.JPEG", "c.png", "d.webp", "e.tif"];
        for name in accepted {
            assert!(
                BatchPipeline::<MockBackend>::is_supported_image_format(Path::new(name)),
                "{name} should be supported"
            );
        }
        let rejected = ["a.txt", "b", "c.png.bak"];
        for name in rejected {
            assert!(
                !BatchPipeline::<MockBackend>::is_supported_image_format(Path::new(name)),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn threshold_outside_unit_interval_is_rejected() {
        let pipeline = BatchPipeline::new(MockBackend::constant(16, 0.5), PipelineConfig::default());
        let err = pipeline
            .process_directory(Path::new("."), Path::new("out"), 1.5)
            .unwrap_err();
        assert!(matches!(err, SegError::Validation { .. }));
    }

    #[test]
    fn missing_input_directory_is_rejected() {
        let pipeline = BatchPipeline::new(MockBackend::constant(16, 0.5), PipelineConfig::default());
        let err = pipeline
            .process_directory(Path::new("definitely/not/here"), Path::new("out"), 0.3)
            .unwrap_err();
        assert!(matches!(err, SegError::PathNotFound { .. }));
    }
}
