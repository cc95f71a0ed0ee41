//! This module provides the `TaggingPipeline`, which turns a list of candidate
//! files into rows of the tag store.
//!
//! A run works like this:
//!
//! 1. Candidates go into a shared queue. A fixed pool of worker threads pops
//!    from it until it is empty, decoding and preparing each file.
//! 2. Prepared buffers (or an empty slot for a file that failed to decode) go
//!    through a bounded channel. Its capacity is the only backpressure: when the
//!    model falls behind, workers block on send.
//! 3. The calling thread drains the channel into batches, runs the model once
//!    per batch, interprets the probabilities and commits the batch in one
//!    transaction.
//!
//! Only the calling thread touches the store and the tag cache. Workers share
//! nothing but the preprocessor.

use std::thread;

use crossbeam::{
    channel::{bounded, Receiver, Sender},
    queue::SegQueue,
};
use indexmap::IndexMap;
use itertools::Itertools;
use ndarray::Array3;
use tracing::{debug, info, warn};

use crate::{
    config::IngestConfig,
    differ::Candidate,
    error::{Result, TaggerError},
    processor::{stack_batch, ImagePreprocessor, ImageProcessor},
    store::{ImageRecord, TagIds, TagStore, CHARACTER_OTHERS, RATING_UNKNOWN},
    tagger::{Inference, TaggerModel},
    tags::LabelTags,
};

/// A type alias for a map of tag predictions, from tag name to confidence score.
pub type Prediction = IndexMap<String, f32>;

/// The interpreted model output for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggingResult {
    /// The highest scoring rating label, or `"unknown"`.
    pub rating: String,
    /// The highest scoring confident character, or `"others/oc"`.
    pub character: String,
    /// Every character above the character threshold, best first.
    pub characters: Prediction,
    /// Every general tag above the general threshold, best first.
    pub general: Prediction,
}

/// First index with the highest probability. NaN never wins.
fn argmax(indices: &[usize], probs: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for &idx in indices {
        let prob = probs[idx];
        if prob.is_nan() {
            continue;
        }
        if best.map_or(true, |(_, top)| prob > top) {
            best = Some((idx, prob));
        }
    }
    best.map(|(idx, _)| idx)
}

/// Labels from `indices` strictly above `threshold`, sorted by confidence.
fn above_threshold(tags: &LabelTags, indices: &[usize], probs: &[f32], threshold: f32) -> Prediction {
    indices
        .iter()
        .filter(|&&idx| probs[idx] > threshold)
        .sorted_by(|&&a, &&b| {
            probs[b]
                .partial_cmp(&probs[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|&idx| (tags.name(idx).to_string(), probs[idx]))
        .collect()
}

impl TaggingResult {
    pub fn from_probs(
        tags: &LabelTags,
        probs: &[f32],
        general_threshold: f32,
        character_threshold: f32,
    ) -> Result<Self> {
        if probs.len() != tags.len() {
            return Err(TaggerError::Inference(format!(
                "Tags and probabilities length mismatch ({} labels, {} probabilities)",
                tags.len(),
                probs.len()
            )));
        }

        let rating = argmax(tags.rating_indices(), probs)
            .map_or_else(|| RATING_UNKNOWN.to_string(), |idx| tags.name(idx).to_string());
        let general = above_threshold(tags, tags.general_indices(), probs, general_threshold);
        let characters = above_threshold(tags, tags.character_indices(), probs, character_threshold);
        let character = characters
            .first()
            .map_or_else(|| CHARACTER_OTHERS.to_string(), |(name, _)| name.clone());

        Ok(Self {
            rating,
            character,
            characters,
            general,
        })
    }

    pub fn into_record(self, path: String) -> ImageRecord {
        ImageRecord {
            path,
            rating: self.rating,
            character: self.character,
            general: self.general.into_iter().collect(),
        }
    }
}

/// Counters for one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Files handed to the run.
    pub candidates: usize,
    /// Files drained from the result channel, tagged or not.
    pub processed: usize,
    /// Files that could not be decoded or prepared.
    pub failed: usize,
    /// New image rows written.
    pub tagged: usize,
    /// Batches committed.
    pub batches: usize,
}

/// Events emitted while a run progresses.
#[derive(Debug, Clone)]
pub enum ProgressUpdate {
    Started { total: usize },
    Prepared { path: String, ok: bool },
    BatchCommitted { images: usize },
    Finished(RunStats),
}

/// A callback function for reporting progress.
pub type ProgressCallback = Box<dyn Fn(ProgressUpdate) + Send + Sync>;

/// What a worker hands to the batch assembler.
struct PreparedImage {
    rel_path: String,
    buffer: Option<Array3<f32>>,
}

fn prepare_worker(
    id: usize,
    queue: &SegQueue<Candidate>,
    preprocessor: &ImagePreprocessor,
    tx: Sender<PreparedImage>,
) {
    debug!("Worker {} started", id);
    while let Some(candidate) = queue.pop() {
        let buffer = match preprocessor.load(&candidate.abs_path) {
            Ok(buffer) => Some(buffer),
            Err(e) => {
                warn!("Failed to prepare {:?}: {}", candidate.abs_path, e);
                None
            }
        };
        let prepared = PreparedImage {
            rel_path: candidate.rel_path,
            buffer,
        };
        // The receiver is gone only when the run is aborting.
        if tx.send(prepared).is_err() {
            break;
        }
    }
    debug!("Worker {} finished", id);
}

/// The consuming half of a run: batches, infers and persists.
struct BatchWriter<'a, M> {
    model: &'a mut M,
    tags: &'a LabelTags,
    config: &'a IngestConfig,
    store: &'a mut TagStore,
    tag_ids: TagIds,
    progress: Option<&'a ProgressCallback>,
    stats: RunStats,
}

impl<M: Inference> BatchWriter<'_, M> {
    fn consume(&mut self, rx: Receiver<PreparedImage>) -> Result<()> {
        let total = self.stats.candidates;
        let batch_size = self.config.batch_size;

        while self.stats.processed < total {
            let mut buffers = Vec::with_capacity(batch_size);
            let mut paths = Vec::with_capacity(batch_size);

            while paths.len() < batch_size && self.stats.processed < total {
                let prepared = rx.recv().map_err(|_| {
                    TaggerError::Worker("workers exited before every file was prepared".into())
                })?;
                self.stats.processed += 1;
                TaggingPipeline::<M>::report_progress(
                    self.progress,
                    ProgressUpdate::Prepared {
                        path: prepared.rel_path.clone(),
                        ok: prepared.buffer.is_some(),
                    },
                );

                match prepared.buffer {
                    Some(buffer) => {
                        buffers.push(buffer);
                        paths.push(prepared.rel_path);
                    }
                    None => self.stats.failed += 1,
                }
            }

            if paths.is_empty() {
                continue;
            }
            self.write_batch(buffers, paths)?;
        }
        Ok(())
    }

    fn write_batch(&mut self, buffers: Vec<Array3<f32>>, paths: Vec<String>) -> Result<()> {
        let input = stack_batch(&buffers)?;
        drop(buffers);

        let probs = self.model.predict(input)?;
        if probs.len() != paths.len() {
            return Err(TaggerError::Inference(format!(
                "Model returned {} results for a batch of {}",
                probs.len(),
                paths.len()
            )));
        }

        let records = paths
            .into_iter()
            .zip(probs)
            .map(|(path, probs)| {
                TaggingResult::from_probs(
                    self.tags,
                    &probs,
                    self.config.general_threshold,
                    self.config.character_threshold,
                )
                .map(|result| result.into_record(path))
            })
            .collect::<Result<Vec<_>>>()?;

        let inserted = self.store.insert_batch(&records, &mut self.tag_ids)?;
        self.stats.tagged += inserted;
        self.stats.batches += 1;
        debug!(
            "Committed batch {} ({} images, {}/{} processed)",
            self.stats.batches, inserted, self.stats.processed, self.stats.candidates
        );
        TaggingPipeline::<M>::report_progress(
            self.progress,
            ProgressUpdate::BatchCommitted { images: inserted },
        );
        Ok(())
    }
}

/// An end-to-end pipeline from candidate files to stored tags.
pub struct TaggingPipeline<M = TaggerModel> {
    /// The classifier run once per batch.
    pub model: M,
    /// The preprocessor shared by the worker threads.
    pub preprocessor: ImagePreprocessor,
    /// The set of labels the model can predict.
    pub tags: LabelTags,
    /// Thresholds, batch size and worker count.
    pub config: IngestConfig,
    progress_callback: Option<ProgressCallback>,
}

impl<M: Inference> TaggingPipeline<M> {
    /// Creates a new `TaggingPipeline`.
    pub fn new(
        model: M,
        preprocessor: ImagePreprocessor,
        tags: LabelTags,
        config: IngestConfig,
    ) -> Self {
        Self {
            model,
            preprocessor,
            tags,
            config,
            progress_callback: None,
        }
    }

    pub fn with_progress(mut self, progress_callback: ProgressCallback) -> Self {
        self.progress_callback = Some(progress_callback);
        self
    }

    /// Reports progress using the provided callback.
    fn report_progress(progress_callback: Option<&ProgressCallback>, update: ProgressUpdate) {
        if let Some(cb) = progress_callback {
            cb(update);
        }
    }

    /// Tags every candidate and stores the results.
    ///
    /// Files that fail to decode are counted and skipped. An inference or
    /// storage error stops the run; batches committed before it stay stored.
    pub fn run(&mut self, store: &mut TagStore, candidates: Vec<Candidate>) -> Result<RunStats> {
        self.config.validate()?;
        let total = candidates.len();
        if total == 0 {
            return Ok(RunStats::default());
        }

        let Self {
            model,
            preprocessor,
            tags,
            config,
            progress_callback,
        } = self;
        let preprocessor: &ImagePreprocessor = preprocessor;
        let progress = progress_callback.as_ref();

        let workers = config.num_workers.min(total);
        info!(
            "Tagging {} images with {} workers, batch size {}",
            total, workers, config.batch_size
        );
        Self::report_progress(progress, ProgressUpdate::Started { total });

        let queue = SegQueue::new();
        for candidate in candidates {
            queue.push(candidate);
        }
        let (tx, rx) = bounded::<PreparedImage>(config.channel_capacity());

        let mut writer = BatchWriter {
            model,
            tags,
            config,
            tag_ids: store.tag_ids()?,
            store,
            progress,
            stats: RunStats {
                candidates: total,
                ..Default::default()
            },
        };

        thread::scope(|s| {
            for id in 0..workers {
                let tx = tx.clone();
                let queue = &queue;
                s.spawn(move || prepare_worker(id, queue, preprocessor, tx));
            }
            drop(tx);

            // Dropping `rx` on error unblocks any worker waiting on a full channel.
            writer.consume(rx)
        })?;

        let stats = writer.stats;
        info!(
            "Run complete: {} processed, {} tagged, {} failed to decode",
            stats.processed, stats.tagged, stats.failed
        );
        Self::report_progress(progress, ProgressUpdate::Finished(stats));
        Ok(stats)
    }
}
