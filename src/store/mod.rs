//! The persistent tag index.
//!
//! One SQLite file per ingested root, at `<root>/.aen_data/image_tags.db`.
//! Images carry their rating and character directly; general tags live in a
//! normalized `tags` table joined through `image_tags` with a confidence.
//! Rows are written once by the ingestion pipeline and only rewritten by the
//! explicit maintenance passes (`migrate_paths`, `remove_missing`).

mod schema;
mod search;

pub use search::SearchQuery;

use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::{
    config::{DATA_DIR_NAME, DB_NAME},
    error::Result,
};
use schema::{MAX_PARAMS, SCHEMA};

/// Rating stored when the taxonomy has no rating labels.
pub const RATING_UNKNOWN: &str = "unknown";
/// Character stored when no character clears the confidence threshold.
pub const CHARACTER_OTHERS: &str = "others/oc";

/// In-process tag name to row id map, owned by whoever writes batches.
pub type TagIds = HashMap<String, i64>;

/// A fully classified image, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub path: String,
    pub rating: String,
    pub character: String,
    pub general: Vec<(String, f32)>,
}

/// A stored image row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRow {
    pub id: i64,
    pub path: String,
    pub rating: Option<String>,
    pub character: Option<String>,
}

/// Outcome of rewriting legacy paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub rewritten: usize,
    pub deleted: usize,
}

pub struct TagStore {
    conn: Connection,
}

impl TagStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path.as_ref())?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        Self::init(conn)
    }

    /// Opens (creating if needed) the store that belongs to `root`.
    pub fn open_in_root<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::open(Self::path_in_root(root))
    }

    pub fn path_in_root<P: AsRef<Path>>(root: P) -> PathBuf {
        root.as_ref().join(DATA_DIR_NAME).join(DB_NAME)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn image_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Every stored image path, exactly as stored.
    pub fn indexed_paths(&self) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT filepath FROM images")?;
        let paths = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<HashSet<String>, _>>()?;
        Ok(paths)
    }

    /// `(path, character)` for every image.
    pub fn image_characters(&self) -> Result<Vec<(String, Option<String>)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT filepath, character_name FROM images")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Seed for the in-process tag cache.
    pub fn tag_ids(&self) -> Result<TagIds> {
        let mut stmt = self.conn.prepare("SELECT name, id FROM tags")?;
        let ids = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<TagIds, _>>()?;
        Ok(ids)
    }

    /// Writes one batch in a single transaction and returns how many images were new.
    ///
    /// A path that is already stored is skipped together with its tags. Tags
    /// created here are added to `tag_ids` only once the transaction commits.
    pub fn insert_batch(&mut self, records: &[ImageRecord], tag_ids: &mut TagIds) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        let mut new_tags = TagIds::new();

        {
            let mut stmt_image = tx.prepare_cached(
                "INSERT OR IGNORE INTO images (filepath, rating, character_name)
                 VALUES (?1, ?2, ?3)
                 RETURNING id",
            )?;
            let mut stmt_tag = tx.prepare_cached("INSERT OR IGNORE INTO tags (name) VALUES (?1)")?;
            let mut stmt_get_tag_id = tx.prepare_cached("SELECT id FROM tags WHERE name = ?1")?;
            let mut stmt_image_tag = tx.prepare_cached(
                "INSERT OR IGNORE INTO image_tags (image_id, tag_id, confidence) VALUES (?1, ?2, ?3)",
            )?;

            for record in records {
                let image_id: Option<i64> = stmt_image
                    .query_row(
                        params![record.path, record.rating, record.character],
                        |row| row.get(0),
                    )
                    .optional()?;
                let Some(image_id) = image_id else {
                    debug!("Skipping already indexed image {}", record.path);
                    continue;
                };
                inserted += 1;

                for (name, confidence) in &record.general {
                    let cached = tag_ids.get(name).or_else(|| new_tags.get(name)).copied();
                    let tag_id = match cached {
                        Some(id) => id,
                        None => {
                            stmt_tag.execute(params![name])?;
                            let id: i64 = stmt_get_tag_id.query_row(params![name], |row| row.get(0))?;
                            new_tags.insert(name.clone(), id);
                            id
                        }
                    };
                    stmt_image_tag.execute(params![image_id, tag_id, *confidence as f64])?;
                }
            }
        }

        tx.commit()?;
        tag_ids.extend(new_tags);
        Ok(inserted)
    }

    pub fn image<S: AsRef<str>>(&self, path: S) -> Result<Option<ImageRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, filepath, rating, character_name FROM images WHERE filepath = ?1",
                params![path.as_ref()],
                |row| {
                    Ok(ImageRow {
                        id: row.get(0)?,
                        path: row.get(1)?,
                        rating: row.get(2)?,
                        character: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// General tags of one image, highest confidence first.
    pub fn image_tags<S: AsRef<str>>(&self, path: S) -> Result<Vec<(String, f64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.name, it.confidence
             FROM image_tags it
             JOIN images i ON it.image_id = i.id
             JOIN tags t ON it.tag_id = t.id
             WHERE i.filepath = ?1
             ORDER BY it.confidence DESC, t.name ASC",
        )?;
        let tags = stmt
            .query_map(params![path.as_ref()], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    /// Rewrites stored paths with `rewrite`.
    ///
    /// Rows for which `rewrite` returns `None` (or the same path) are left alone.
    /// When the rewritten path is already taken by another row, the row being
    /// rewritten is deleted instead.
    pub fn migrate_paths<F>(&mut self, rewrite: F) -> Result<MigrationReport>
    where
        F: Fn(&str) -> Option<String>,
    {
        let rows: Vec<(i64, String)> = {
            let mut stmt = self.conn.prepare("SELECT id, filepath FROM images")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut report = MigrationReport::default();
        let tx = self.conn.transaction()?;
        {
            let mut stmt_exists = tx.prepare_cached("SELECT id FROM images WHERE filepath = ?1")?;
            let mut stmt_update = tx.prepare_cached("UPDATE images SET filepath = ?1 WHERE id = ?2")?;
            let mut stmt_delete = tx.prepare_cached("DELETE FROM images WHERE id = ?1")?;

            for (id, path) in rows {
                let Some(new_path) = rewrite(&path) else {
                    continue;
                };
                if new_path == path {
                    continue;
                }

                let existing: Option<i64> = stmt_exists
                    .query_row(params![new_path], |row| row.get(0))
                    .optional()?;
                if existing.is_some() {
                    debug!("Dropping {} in favour of existing {}", path, new_path);
                    stmt_delete.execute(params![id])?;
                    report.deleted += 1;
                } else {
                    stmt_update.execute(params![new_path, id])?;
                    report.rewritten += 1;
                }
            }
        }
        tx.commit()?;

        if report != MigrationReport::default() {
            info!(
                "Path migration: {} rewritten, {} duplicates removed",
                report.rewritten, report.deleted
            );
        }
        Ok(report)
    }

    /// Deletes every image whose file no longer exists under `root`.
    pub fn remove_missing<P: AsRef<Path>>(&mut self, root: P) -> Result<usize> {
        let root = root.as_ref();
        let missing: Vec<i64> = {
            let mut stmt = self.conn.prepare("SELECT id, filepath FROM images")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter()
                .filter(|(_, path)| !root.join(path).exists())
                .map(|(id, _)| id)
                .collect()
        };

        if missing.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        for chunk in missing.chunks(MAX_PARAMS) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            tx.execute(
                &format!("DELETE FROM images WHERE id IN ({})", placeholders),
                params_from_iter(chunk.iter()),
            )?;
        }
        tx.commit()?;

        info!("Removed {} images whose files are gone", missing.len());
        Ok(missing.len())
    }

    /// Character name and image count, most common first.
    pub fn character_counts(&self) -> Result<Vec<(Option<String>, usize)>> {
        let mut stmt = self.conn.prepare(
            "SELECT character_name, COUNT(*) AS count
             FROM images
             GROUP BY character_name
             ORDER BY count DESC, character_name ASC",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as usize)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Every general tag name, alphabetically.
    pub fn tag_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM tags ORDER BY name ASC")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }
}
