use crate::error::{Result, TaggerError};
use hf_hub::api::tokio::Api;
use std::path::PathBuf;
use tracing::debug;

/// Where the model artifacts come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// A Hugging Face repository id, downloaded into the local hub cache.
    Hub(String),
    /// A directory that already holds the model files.
    Local(PathBuf),
}

impl ModelSource {
    pub async fn get(&self, file_name: &str) -> Result<PathBuf> {
        match self {
            ModelSource::Hub(repo_id) => get(repo_id, file_name).await,
            ModelSource::Local(dir) => {
                let path = dir.join(file_name);
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(TaggerError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("Model file not found: {}", path.display()),
                    )))
                }
            }
        }
    }
}

pub async fn get(repo_id: &str, file_path: &str) -> Result<PathBuf> {
    let api = Api::new().map_err(|e| TaggerError::Network(e.to_string()))?;
    let path = api
        .model(repo_id.to_string())
        .get(file_path)
        .await
        .map_err(|e| TaggerError::Network(format!("{}/{}: {}", repo_id, file_path, e)))?;
    debug!("Resolved {}/{} to {:?}", repo_id, file_path, path);
    Ok(path)
}

/// Model for the Tagging
pub struct TaggerModelFile<'a> {
    source: &'a ModelSource,
    model_path: &'static str,
}

impl<'a> TaggerModelFile<'a> {
    pub fn new(source: &'a ModelSource) -> Self {
        Self {
            source,
            model_path: "model.onnx",
        }
    }

    pub async fn get(&self) -> Result<PathBuf> {
        self.source.get(self.model_path).await
    }
}

/// CSV file that has the list of tags and ids.
pub struct TagCSVFile<'a> {
    source: &'a ModelSource,
    csv_path: &'static str,
}

impl<'a> TagCSVFile<'a> {
    pub fn new(source: &'a ModelSource) -> Self {
        Self {
            source,
            csv_path: "selected_tags.csv",
        }
    }

    pub async fn get(&self) -> Result<PathBuf> {
        self.source.get(self.csv_path).await
    }
}

pub struct ConfigFile<'a> {
    source: &'a ModelSource,
    config_path: &'static str,
}

impl<'a> ConfigFile<'a> {
    pub fn new(source: &'a ModelSource) -> Self {
        Self {
            source,
            config_path: "config.json",
        }
    }

    pub async fn get(&self) -> Result<PathBuf> {
        self.source.get(self.config_path).await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;
    use tokio::runtime::Runtime;

    fn run_async<F, T>(future: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        Runtime::new().unwrap().block_on(future)
    }

    #[test]
    fn test_local_source_resolves_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("selected_tags.csv"), "name,category\n").unwrap();
        let source = ModelSource::Local(dir.path().to_path_buf());

        let path = run_async(TagCSVFile::new(&source).get()).unwrap();
        assert_eq!(path, dir.path().join("selected_tags.csv"));
    }

    #[test]
    fn test_local_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = ModelSource::Local(dir.path().to_path_buf());

        let result = run_async(TaggerModelFile::new(&source).get());
        assert!(matches!(result, Err(TaggerError::Io(_))));
    }
}
