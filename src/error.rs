/// Error types for the annotation pipeline
///
/// Only `ConfigError` is fatal. Everything else is caught per image or per
/// field by the annotator and surfaces through the log.

use std::path::PathBuf;
use thiserror::Error;

/// Startup configuration problems. Aborts the run before any image is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Language code {0:?} is not a proper ISO 639-1 code")]
    InvalidLanguage(String),

    #[error("Failed to read config file {path}: {message}")]
    Unreadable { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },

    #[error("Directory {0} does not exist or is not a directory")]
    MissingDirectory(PathBuf),
}

/// Failures of the embedded metadata container
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Image {path} not readable: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("Failed to write metadata to {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}

/// Failures of a single vision model request
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("model server answered with status {0}")]
    Status(u16),

    #[error("malformed model response: {0}")]
    Malformed(String),
}

/// Translation stage failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranslationError {
    #[error("Translation to {0} not implemented yet")]
    Unsupported(String),
}
