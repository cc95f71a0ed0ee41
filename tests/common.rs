use aen::{
    config::IngestConfig,
    differ::{Candidate, DirectoryDiffer},
    error::{Result, TaggerError},
    pipeline::TaggingPipeline,
    processor::ImagePreprocessor,
    store::TagStore,
    tagger::Inference,
    tags::{LabelTags, TagCategory},
};
use image::{Rgb, RgbImage};
use ndarray::{Array, Ix4};
use std::{fs, path::Path};

/// Side of the square buffers the stub pipeline prepares.
#[allow(dead_code)]
pub const TEST_SIZE: u32 = 8;

/// Label indices of the test taxonomy.
#[allow(dead_code)]
pub mod label {
    pub const GENERAL: usize = 0;
    pub const SENSITIVE: usize = 1;
    pub const EXPLICIT: usize = 2;
    pub const GIRL: usize = 3;
    pub const LONG_HAIR: usize = 4;
    pub const SMILE: usize = 5;
    pub const MIKU: usize = 6;
    pub const RIN: usize = 7;
    pub const COUNT: usize = 8;
}

#[allow(dead_code)]
pub fn taxonomy() -> LabelTags {
    LabelTags::from_labels([
        ("general", TagCategory::Rating),
        ("sensitive", TagCategory::Rating),
        ("explicit", TagCategory::Rating),
        ("1girl", TagCategory::General),
        ("long_hair", TagCategory::General),
        ("smile", TagCategory::General),
        ("hatsune_miku", TagCategory::Character),
        ("kagamine_rin", TagCategory::Character),
    ])
    .unwrap()
}

/// A probability vector over the test taxonomy, zero except for `set`.
#[allow(dead_code)]
pub fn probs(set: &[(usize, f32)]) -> Vec<f32> {
    let mut probs = vec![0.0; label::COUNT];
    for &(idx, p) in set {
        probs[idx] = p;
    }
    probs
}

/// Every image gets rated "general", tagged "1girl" and recognized as Miku.
#[allow(dead_code)]
pub fn miku_probs() -> Vec<f32> {
    probs(&[(label::GENERAL, 0.9), (label::GIRL, 0.8), (label::MIKU, 0.9)])
}

/// Every image gets rated "general" and tagged "1girl", with no character.
#[allow(dead_code)]
pub fn anonymous_probs() -> Vec<f32> {
    probs(&[(label::GENERAL, 0.9), (label::GIRL, 0.8), (label::MIKU, 0.3)])
}

/// Stands in for the ONNX model: returns the same vector for every image.
#[allow(dead_code)]
pub struct StubModel {
    pub probs: Vec<f32>,
    /// Fail every call after this many successful ones.
    pub fail_after: Option<usize>,
    pub batch_sizes: Vec<usize>,
}

#[allow(dead_code)]
impl StubModel {
    pub fn new(probs: Vec<f32>) -> Self {
        Self {
            probs,
            fail_after: None,
            batch_sizes: Vec::new(),
        }
    }

    pub fn failing_after(probs: Vec<f32>, calls: usize) -> Self {
        Self {
            fail_after: Some(calls),
            ..Self::new(probs)
        }
    }
}

impl Inference for StubModel {
    fn predict(&mut self, input: Array<f32, Ix4>) -> Result<Vec<Vec<f32>>> {
        if self.fail_after.is_some_and(|n| self.batch_sizes.len() >= n) {
            return Err(TaggerError::Inference("stub model out of memory".into()));
        }
        let batch = input.shape()[0];
        self.batch_sizes.push(batch);
        Ok(vec![self.probs.clone(); batch])
    }
}

#[allow(dead_code)]
pub fn config(batch_size: usize, num_workers: usize) -> IngestConfig {
    IngestConfig {
        batch_size,
        num_workers,
        ..IngestConfig::default()
    }
}

#[allow(dead_code)]
pub fn pipeline(model: StubModel, config: IngestConfig) -> TaggingPipeline<StubModel> {
    TaggingPipeline::new(
        model,
        ImagePreprocessor::new(TEST_SIZE, true),
        taxonomy(),
        config,
    )
}

#[allow(dead_code)]
pub fn write_image(root: &Path, rel_path: &str, color: [u8; 3]) {
    let path = root.join(rel_path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    RgbImage::from_pixel(12, 10, Rgb(color)).save(&path).unwrap();
}

#[allow(dead_code)]
pub fn write_corrupt(root: &Path, rel_path: &str) {
    let path = root.join(rel_path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, b"definitely not an image").unwrap();
}

/// Writes `count` images named `0.png`, `1.png`, ... into `folder`.
#[allow(dead_code)]
pub fn write_folder(root: &Path, folder: &str, count: usize) {
    for i in 0..count {
        write_image(root, &format!("{}/{}.png", folder, i), [i as u8, 64, 128]);
    }
}

#[allow(dead_code)]
pub fn new_files(root: &Path, store: &mut TagStore) -> Vec<Candidate> {
    DirectoryDiffer::new(root).diff(store).unwrap()
}
