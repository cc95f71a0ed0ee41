use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};
use tokio::task::JoinHandle;
use tracing::info;

use aen::{
    config::ModelConfig,
    differ::DirectoryDiffer,
    pipeline::{ProgressCallback, ProgressUpdate, RunStats, TaggingPipeline},
    processor::ImagePreprocessor,
    sampler::{Sampler, SamplingReport},
    store::TagStore,
    tagger::{Device, TaggerModel},
    tags::LabelTags,
};

use crate::args::IndexArgs;

/// What an index run did, depending on whether sampling was on.
#[derive(Debug, Clone, Copy)]
pub enum IndexOutcome {
    UpToDate,
    Full(RunStats),
    Sampled(SamplingReport),
}

/// Resolves the library root, which must be an existing directory.
pub fn resolve_root(target_dir: &Path) -> Result<PathBuf> {
    let root = target_dir
        .canonicalize()
        .with_context(|| format!("Cannot access {}", target_dir.display()))?;
    if !root.is_dir() {
        bail!("{} is not a directory", root.display());
    }
    Ok(root)
}

/// Tags every new image under the target directory.
pub async fn run_index(args: IndexArgs) -> Result<IndexOutcome> {
    let config = args.ingest_config().context("Invalid ingestion settings")?;
    let root = resolve_root(&args.target_dir)?;

    let mut store = TagStore::open_in_root(&root).context("Failed to open the tag store")?;
    let candidates = DirectoryDiffer::new(&root)
        .diff(&mut store)
        .context("Failed to scan the library")?;
    if candidates.is_empty() {
        info!("Everything under {} is already indexed", root.display());
        return Ok(IndexOutcome::UpToDate);
    }

    let source = args.model_source(&config);
    TaggerModel::init(Device::auto()).context("Failed to initialize ONNX Runtime")?;
    let model_config = ModelConfig::from_source(&source)
        .await
        .context("Failed to load the model config")?;
    let tags = LabelTags::from_source(&source)
        .await
        .context("Failed to load the label taxonomy")?;
    let model = TaggerModel::from_source(&source)
        .await
        .context("Failed to load the tagger model")?;
    let preprocessor = ImagePreprocessor::new(model_config.target_size()?, true);

    let bar = make_progress_bar();
    let sampling = config.sampling();
    let mut pipeline = TaggingPipeline::new(model, preprocessor, tags, config)
        .with_progress(progress_callback(bar.clone()));

    let task = tokio::task::spawn_blocking(move || -> aen::error::Result<IndexOutcome> {
        match sampling {
            Some(sample_size) => Sampler::new(sample_size)
                .run(&mut pipeline, &mut store, candidates)
                .map(IndexOutcome::Sampled),
            None => pipeline
                .run(&mut store, candidates)
                .map(IndexOutcome::Full),
        }
    });
    wait_for_run(&bar, task).await
}

/// Awaits the tagging task and clears the bar however the task ended.
async fn wait_for_run<T>(
    bar: &ProgressBar,
    task: JoinHandle<aen::error::Result<T>>,
) -> Result<T> {
    let joined = task.await;
    bar.finish_and_clear();
    joined
        .context("The tagging task panicked")?
        .context("Indexing stopped")
}

fn make_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} images ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb.set_draw_target(ProgressDrawTarget::stderr_with_hz(12));
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Drives the progress bar from pipeline events. Each pass resets the bar.
fn progress_callback(bar: ProgressBar) -> ProgressCallback {
    let failed = AtomicUsize::new(0);
    Box::new(move |update| match update {
        ProgressUpdate::Started { total } => {
            failed.store(0, Ordering::Relaxed);
            bar.set_length(total as u64);
            bar.set_position(0);
            bar.set_message("");
        }
        ProgressUpdate::Prepared { ok, .. } => {
            bar.inc(1);
            if !ok {
                let failed = failed.fetch_add(1, Ordering::Relaxed) + 1;
                bar.set_message(format!("{} unreadable", failed));
            }
        }
        ProgressUpdate::BatchCommitted { .. } => {}
        ProgressUpdate::Finished(stats) => {
            bar.println(format!(
                "Pass done: {} tagged, {} unreadable, {} batches",
                stats.tagged, stats.failed, stats.batches
            ));
        }
    })
}
