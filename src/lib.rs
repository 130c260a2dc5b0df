pub mod artifact;
pub mod batch;
pub mod compare;
pub mod config;
pub mod convert;
pub mod errors;
pub mod inspect;
pub mod mask;
pub mod model;
pub mod traits;

pub mod mocks;

pub use artifact::NnefArtifact;
pub use batch::{BatchPipeline, BatchSummary};
pub use compare::{compare_backends, compare_outputs, ComparisonReport};
pub use config::PipelineConfig;
pub use convert::{convert_model, ConversionOutcome, ConvertOptions};
pub use errors::{Result, SegError};
pub use inspect::{inspect, InspectionReport};
pub use model::OrtModel;
pub use traits::SegmentationBackend;
