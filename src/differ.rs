//! Finds the files under a root that still need tagging.
//!
//! Paths are stored relative to the root with forward slashes, so the same
//! library can be moved or mounted elsewhere and still be recognized. Stores
//! written by older versions held absolute paths; those are rewritten before
//! any differencing happens.

use std::path::{Component, Path, PathBuf};

use tracing::{info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::{
    config::DATA_DIR_NAME,
    error::Result,
    store::{MigrationReport, TagStore},
};

/// Supported image extensions.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "bmp"];

/// Check if the path is an image file.
pub fn is_image<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// A file that is on disk but not yet in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate {
    pub abs_path: PathBuf,
    pub rel_path: String,
}

impl Candidate {
    /// The folder part of the relative path, `""` for files directly in the root.
    pub fn folder(&self) -> &str {
        folder_of(&self.rel_path)
    }
}

pub fn folder_of(rel_path: &str) -> &str {
    rel_path.rsplit_once('/').map_or("", |(folder, _)| folder)
}

/// Root-relative path with forward slashes.
///
/// `None` if `path` is outside `root` or any component below the root is not
/// valid UTF-8.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts = rel
        .components()
        .map(|c| match c {
            Component::Normal(part) => part.to_str().map(str::to_string),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    (!parts.is_empty()).then(|| parts.join("/"))
}

/// Whether a stored path is absolute, including Windows drive and UNC forms.
pub fn is_absolute_path(stored: &str) -> bool {
    let bytes = stored.as_bytes();
    let drive = bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/');
    Path::new(stored).is_absolute() || drive || stored.starts_with("\\\\")
}

fn is_reserved(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() && entry.file_name() == DATA_DIR_NAME
}

pub struct DirectoryDiffer {
    root: PathBuf,
}

impl DirectoryDiffer {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Every image under the root, sorted by relative path.
    pub fn scan(&self) -> Result<Vec<Candidate>> {
        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root).follow_links(true).into_iter();

        for entry in walker.filter_entry(|e| !is_reserved(e)) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_image(entry.path()) {
                continue;
            }
            match relative_path(&self.root, entry.path()) {
                Some(rel_path) => files.push(Candidate {
                    abs_path: entry.path().to_path_buf(),
                    rel_path,
                }),
                None => warn!("Skipping {:?}: path is not valid UTF-8", entry.path()),
            }
        }

        files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        Ok(files)
    }

    /// Rewrites absolute paths left by older stores into root-relative ones.
    pub fn migrate_legacy_paths(&self, store: &mut TagStore) -> Result<MigrationReport> {
        let root = self.root.to_string_lossy().replace('\\', "/");
        let root = root.trim_end_matches('/');

        store.migrate_paths(|stored| {
            if !is_absolute_path(stored) {
                return None;
            }
            let normalized = stored.replace('\\', "/");
            let rel = normalized
                .strip_prefix(root)
                .and_then(|rest| rest.strip_prefix('/'))
                .filter(|rest| !rest.is_empty());
            if rel.is_none() {
                warn!("Legacy path {} is outside {}, leaving it as is", stored, root);
            }
            rel.map(str::to_string)
        })
    }

    /// Files on disk that are not in the store yet, after migrating legacy rows.
    pub fn diff(&self, store: &mut TagStore) -> Result<Vec<Candidate>> {
        self.migrate_legacy_paths(store)?;

        let indexed = store.indexed_paths()?;
        let on_disk = self.scan()?;
        let total = on_disk.len();
        let new_files: Vec<_> = on_disk
            .into_iter()
            .filter(|c| !indexed.contains(&c.rel_path))
            .collect();

        info!(
            "Found {} images on disk, {} already indexed, {} new",
            total,
            total - new_files.len(),
            new_files.len()
        );
        Ok(new_files)
    }
}
