pub use crate::config::{IngestConfig, ModelConfig};
pub use crate::differ::{Candidate, DirectoryDiffer};
pub use crate::error::{Result, TaggerError};
pub use crate::file::ModelSource;
pub use crate::pipeline::{
    ProgressCallback, ProgressUpdate, RunStats, TaggingPipeline, TaggingResult,
};
pub use crate::processor::{ImagePreprocessor, ImageProcessor};
pub use crate::sampler::{Sampler, SamplingReport};
pub use crate::store::{SearchQuery, TagStore};
pub use crate::tagger::{Device, Inference, TaggerModel};
pub use crate::tags::LabelTags;
