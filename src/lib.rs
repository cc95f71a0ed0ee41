//! # Aen
//!
//! Aen indexes a directory tree of images with an ONNX multi-label tagger and
//! keeps the results in a small SQLite store inside the tree, so that a
//! browsing layer can search the library by tag, rating and character.
//!
//! ## Features
//!
//! - **Incremental**: only files missing from the store are tagged, so an
//!   interrupted run resumes where its last committed batch left off.
//! - **Bounded concurrency**: a fixed pool of threads decodes and prepares
//!   images while the calling thread batches, infers and persists.
//! - **Sampling**: a two-pass per-folder sampler for quick passes over large
//!   libraries.
//! - **ONNX Runtime**: powered by `ort`, with CPU, CUDA and other execution providers.
//!
//! ## Modules
//!
//! - `pipeline`: The ingestion pipeline and per-image interpretation.
//! - `sampler`: The two-pass sampling scheduler.
//! - `differ`: Finds files not yet indexed and migrates legacy paths.
//! - `store`: The SQLite tag store and tag search.
//! - `tagger`: Handles the ONNX model and session management.
//! - `processor`: Provides tools for image preprocessing.
//! - `tags`: Manages tag labels and their categories.
//! - `config`: Model and ingestion settings.
//! - `error`: Contains the error types for the library.
//! - `prelude`: A collection of the most commonly used types.

pub mod config;
pub mod differ;
pub mod error;
pub mod file;
pub mod pipeline;
pub mod prelude;
pub mod processor;
pub mod sampler;
pub mod store;
pub mod tagger;
pub mod tags;
