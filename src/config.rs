use crate::{
    error::{Result, TaggerError},
    file::{ConfigFile, ModelSource},
};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Name of the directory, inside an ingested root, that holds the store.
pub const DATA_DIR_NAME: &str = ".aen_data";
/// File name of the tag store inside [`DATA_DIR_NAME`].
pub const DB_NAME: &str = "image_tags.db";
/// Default tagger model on the Hugging Face Hub.
pub const DEFAULT_MODEL_REPO: &str = "SmilingWolf/wd-eva02-large-tagger-v3";

/// The result channel holds this many batches' worth of prepared images.
pub const CHANNEL_BATCHES: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub architecture: String,
    pub num_classes: u32,
    #[serde(default)]
    pub num_features: u32,
    pub pretrained_cfg: PretrainedCfg,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PretrainedCfg {
    pub input_size: Vec<u32>, // [channels, height, width]
    #[serde(default)]
    pub fixed_input_size: bool,
    #[serde(default)]
    pub num_classes: u32,
}

impl ModelConfig {
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let json = fs::read_to_string(config_path)?;
        let config: ModelConfig = serde_json::from_str(&json)?;
        Ok(config)
    }

    pub async fn from_source(source: &ModelSource) -> Result<Self> {
        let config_file = ConfigFile::new(source).get().await?;
        Self::load(config_file)
    }

    /// Square input dimension the model expects.
    pub fn target_size(&self) -> Result<u32> {
        match self.pretrained_cfg.input_size.as_slice() {
            [_, height, width] if height == width => Ok(*height),
            other => Err(TaggerError::Config(format!(
                "Expected a square [channels, height, width] input size, got {:?}",
                other
            ))),
        }
    }
}

/// Settings for one ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// General tags are kept when their probability is strictly above this.
    pub general_threshold: f32,
    /// A character is assigned only when its probability is strictly above this.
    pub character_threshold: f32,
    pub batch_size: usize,
    pub num_workers: usize,
    /// Per-folder sample size. `None` or `Some(0)` ingests every new file.
    pub sample_size: Option<usize>,
    pub model_repo: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            general_threshold: 0.35,
            character_threshold: 0.85,
            batch_size: 32,
            num_workers: 8,
            sample_size: None,
            model_repo: DEFAULT_MODEL_REPO.to_string(),
        }
    }
}

impl IngestConfig {
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let json = fs::read_to_string(config_path)?;
        let config: IngestConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(TaggerError::Config("batch_size must be at least 1".into()));
        }
        if self.num_workers == 0 {
            return Err(TaggerError::Config("num_workers must be at least 1".into()));
        }
        for (name, value) in [
            ("general_threshold", self.general_threshold),
            ("character_threshold", self.character_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(TaggerError::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// The sampling size when lite mode is on.
    pub fn sampling(&self) -> Option<usize> {
        self.sample_size.filter(|&n| n > 0)
    }

    pub fn channel_capacity(&self) -> usize {
        self.batch_size * CHANNEL_BATCHES
    }
}
