//! # Error Handling
//!
//! This module defines the custom error type for the `aen` library.
//!
//! The `TaggerError` enum represents all possible errors that can occur
//! within the library, providing a unified and consistent error-handling mechanism.
//! It uses the `thiserror` crate to derive the `Error` trait and provide
//! descriptive error messages.
//!
//! A file that fails to decode is not an error at this level: the ingestion
//! pipeline records it as an empty slot and moves on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaggerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("ONNX Runtime error: {0}")]
    Ort(String),

    #[error("Download failed: {0}")]
    Network(String),

    #[error("Invalid label taxonomy: {0}")]
    Taxonomy(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Preparation worker failed: {0}")]
    Worker(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T, E = TaggerError> = std::result::Result<T, E>;
