use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use aen::store::{SearchQuery, TagStore};

use crate::core::{resolve_root, IndexOutcome};

/// Opens the store of an already indexed library.
fn open_existing(target_dir: &Path) -> Result<(PathBuf, TagStore)> {
    let root = resolve_root(target_dir)?;
    let db_path = TagStore::path_in_root(&root);
    if !db_path.is_file() {
        bail!(
            "No index found at {}; run `aen index --target-dir {}` first",
            db_path.display(),
            target_dir.display()
        );
    }
    let store = TagStore::open(&db_path)
        .with_context(|| format!("Failed to open {}", db_path.display()))?;
    Ok((root, store))
}

pub fn print_index_outcome(outcome: &IndexOutcome) {
    match outcome {
        IndexOutcome::UpToDate => println!("Nothing new to tag."),
        IndexOutcome::Full(stats) => println!(
            "Tagged {} of {} new images ({} unreadable).",
            stats.tagged, stats.candidates, stats.failed
        ),
        IndexOutcome::Sampled(report) => {
            println!(
                "Pass 1: tagged {} of {} sampled images ({} unreadable).",
                report.base.tagged, report.base.candidates, report.base.failed
            );
            match report.compensation {
                Some(stats) => println!(
                    "Pass 2: tagged {} of {} images from folders without a recognized character ({} unreadable).",
                    stats.tagged, stats.candidates, stats.failed
                ),
                None => println!("Pass 2: skipped, every sampled folder has a character."),
            }
            println!(
                "{} images tagged, {} left for a later run.",
                report.tagged(),
                report.skipped
            );
        }
    }
}

pub fn run_cleanup(target_dir: &Path) -> Result<()> {
    let (root, mut store) = open_existing(target_dir)?;
    let removed = store
        .remove_missing(&root)
        .context("Failed to remove missing files")?;
    println!("Removed {} entries for missing files.", removed);
    Ok(())
}

pub fn run_list_chars(target_dir: &Path) -> Result<()> {
    let (_, store) = open_existing(target_dir)?;
    for (character, count) in store.character_counts()? {
        println!("{}\t{}", character.as_deref().unwrap_or("(none)"), count);
    }
    Ok(())
}

pub fn run_list_tags(target_dir: &Path) -> Result<()> {
    let (_, store) = open_existing(target_dir)?;
    for name in store.tag_names()? {
        println!("{}", name);
    }
    Ok(())
}

pub fn run_query(target_dir: &Path, query: &str) -> Result<()> {
    let query = SearchQuery::parse(query);
    if query.is_empty() {
        bail!("The query has no tags");
    }
    let (_, store) = open_existing(target_dir)?;
    let paths = store.search(&query)?;
    for path in &paths {
        println!("{}", path);
    }
    eprintln!("{} matching images", paths.len());
    Ok(())
}
