//! Per-folder sampling for quick, representative indexing of large libraries.
//!
//! Instead of tagging every new file, a sampled run tags up to `N` files per
//! folder in two passes:
//!
//! 1. **Base pass**: each folder is topped up to `N` stored images, with files
//!    chosen uniformly at random among its new candidates.
//! 2. **Compensation pass**: folders that still have no recognized character
//!    after the base pass get up to `N` more files from what was left over.
//!
//! Folder states are always derived from what is in the store, so repeated
//! sampled runs converge instead of re-sampling folders that are already full.

use std::collections::{BTreeMap, HashMap};

use rand::{seq::SliceRandom, Rng};
use tracing::info;

use crate::{
    differ::{folder_of, Candidate},
    error::Result,
    pipeline::{RunStats, TaggingPipeline},
    store::{TagStore, CHARACTER_OTHERS, RATING_UNKNOWN},
    tagger::Inference,
};

/// What the store knows about one folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FolderState {
    /// Stored images in the folder.
    pub tagged: usize,
    /// Whether any of them carries a recognized character.
    pub has_character: bool,
}

fn is_recognized(character: Option<&str>) -> bool {
    matches!(character, Some(c) if !c.is_empty() && c != CHARACTER_OTHERS && c != RATING_UNKNOWN)
}

/// Folder states for every folder that has at least one stored image.
pub fn folder_states(store: &TagStore) -> Result<HashMap<String, FolderState>> {
    let mut states: HashMap<String, FolderState> = HashMap::new();
    for (path, character) in store.image_characters()? {
        let state = states.entry(folder_of(&path).to_string()).or_default();
        state.tagged += 1;
        state.has_character |= is_recognized(character.as_deref());
    }
    Ok(states)
}

/// Candidates split into the base selection and the per-folder leftovers.
#[derive(Debug, Clone, Default)]
pub struct SamplingPlan {
    pub base: Vec<Candidate>,
    remaining: BTreeMap<String, Vec<Candidate>>,
}

impl SamplingPlan {
    /// Groups candidates by folder, shuffles each group and takes the base selection.
    pub fn new<R: Rng + ?Sized>(
        candidates: Vec<Candidate>,
        states: &HashMap<String, FolderState>,
        sample_size: usize,
        rng: &mut R,
    ) -> Self {
        let mut groups: BTreeMap<String, Vec<Candidate>> = BTreeMap::new();
        for candidate in candidates {
            groups
                .entry(candidate.folder().to_string())
                .or_default()
                .push(candidate);
        }

        let mut base = Vec::new();
        for (folder, files) in groups.iter_mut() {
            files.shuffle(rng);
            let tagged = states.get(folder).map_or(0, |s| s.tagged);
            let take = sample_size.saturating_sub(tagged).min(files.len());
            base.extend(files.drain(..take));
        }

        Self {
            base,
            remaining: groups,
        }
    }

    /// Takes up to `sample_size` leftovers from every folder still lacking a character.
    pub fn compensation(
        &mut self,
        states: &HashMap<String, FolderState>,
        sample_size: usize,
    ) -> Vec<Candidate> {
        let mut selection = Vec::new();
        for (folder, files) in self.remaining.iter_mut() {
            let has_character = states.get(folder).is_some_and(|s| s.has_character);
            if has_character || files.is_empty() {
                continue;
            }
            let take = sample_size.min(files.len());
            selection.extend(files.drain(..take));
        }
        selection
    }

    /// Candidates not selected by any pass so far.
    pub fn remaining(&self) -> usize {
        self.remaining.values().map(Vec::len).sum()
    }
}

/// Outcome of a sampled run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplingReport {
    pub base: RunStats,
    /// `None` when every folder already had a character after the base pass.
    pub compensation: Option<RunStats>,
    /// Candidates left untagged for a later run.
    pub skipped: usize,
}

impl SamplingReport {
    pub fn tagged(&self) -> usize {
        self.base.tagged + self.compensation.map_or(0, |c| c.tagged)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sampler {
    sample_size: usize,
}

impl Sampler {
    pub fn new(sample_size: usize) -> Self {
        Self { sample_size }
    }

    pub fn run<M: Inference>(
        &self,
        pipeline: &mut TaggingPipeline<M>,
        store: &mut TagStore,
        candidates: Vec<Candidate>,
    ) -> Result<SamplingReport> {
        self.run_with_rng(pipeline, store, candidates, &mut rand::rng())
    }

    /// Runs both passes with a caller-provided random source.
    pub fn run_with_rng<M: Inference, R: Rng + ?Sized>(
        &self,
        pipeline: &mut TaggingPipeline<M>,
        store: &mut TagStore,
        candidates: Vec<Candidate>,
        rng: &mut R,
    ) -> Result<SamplingReport> {
        let states = folder_states(store)?;
        let mut plan = SamplingPlan::new(candidates, &states, self.sample_size, rng);

        info!(
            "Sampling pass 1: {} files (up to {} per folder)",
            plan.base.len(),
            self.sample_size
        );
        let base = pipeline.run(store, std::mem::take(&mut plan.base))?;

        let states = folder_states(store)?;
        let selection = plan.compensation(&states, self.sample_size);
        let compensation = if selection.is_empty() {
            info!("Sampling pass 2 skipped: no folder needs compensation");
            None
        } else {
            info!(
                "Sampling pass 2: {} files for folders without a recognized character",
                selection.len()
            );
            Some(pipeline.run(store, selection)?)
        };

        Ok(SamplingReport {
            base,
            compensation,
            skipped: plan.remaining(),
        })
    }
}
