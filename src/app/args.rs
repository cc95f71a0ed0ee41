use std::path::PathBuf;

use aen::{config::IngestConfig, error::Result, file::ModelSource};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Tag every image under a directory that is not indexed yet
    Index(IndexArgs),

    /// Remove index entries whose files no longer exist
    Cleanup {
        /// The root directory of the library
        #[arg(long)]
        target_dir: PathBuf,
    },

    /// List recognized characters with their image counts
    ListChars {
        /// The root directory of the library
        #[arg(long)]
        target_dir: PathBuf,
    },

    /// List every general tag in the index
    ListTags {
        /// The root directory of the library
        #[arg(long)]
        target_dir: PathBuf,
    },

    /// Find images matching comma-separated tags, e.g. "1girl, rating:general, char:hatsune miku"
    Query {
        /// The root directory of the library
        #[arg(long)]
        target_dir: PathBuf,

        /// The tags to match
        query: String,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct IndexArgs {
    /// The root directory of the library
    #[arg(long)]
    pub target_dir: PathBuf,

    /// Keep general tags scoring strictly above this
    #[arg(long)]
    pub general_thresh: Option<f32>,

    /// Images per inference call
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Threads decoding and preparing images
    #[arg(long)]
    pub num_workers: Option<usize>,

    /// Tag at most this many images per folder (two-pass sampling); 0 tags everything
    #[arg(long)]
    pub sample_size: Option<usize>,

    /// Hugging Face repository of the tagger model
    #[arg(long, conflicts_with = "model_dir")]
    pub model: Option<String>,

    /// Local directory holding model.onnx, selected_tags.csv and config.json
    #[arg(long)]
    pub model_dir: Option<PathBuf>,

    /// A JSON file with ingestion settings; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl IndexArgs {
    pub fn ingest_config(&self) -> Result<IngestConfig> {
        let mut config = match &self.config {
            Some(path) => IngestConfig::load(path)?,
            None => IngestConfig::default(),
        };

        if let Some(threshold) = self.general_thresh {
            config.general_threshold = threshold;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(num_workers) = self.num_workers {
            config.num_workers = num_workers;
        }
        if self.sample_size.is_some() {
            config.sample_size = self.sample_size;
        }
        if let Some(repo) = &self.model {
            config.model_repo = repo.clone();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn model_source(&self, config: &IngestConfig) -> ModelSource {
        match &self.model_dir {
            Some(dir) => ModelSource::Local(dir.clone()),
            None => ModelSource::Hub(config.model_repo.clone()),
        }
    }
}
