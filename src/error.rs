//! Error taxonomy shared by the cache and writer layers.
//!
//! Parse failures never surface here: the structural parser degrades to an
//! empty mapping or raw-string scalars instead of failing. Everything that
//! can be reported to a caller as a typed result lives in [`VarError`].

use std::path::PathBuf;

use thiserror::Error;

/// Typed failure reported to callers of the cache/writer entry points.
///
/// These are returned, never thrown across the rendering path; the
/// decoration loop keeps running on any of them.
#[derive(Debug, Error)]
pub enum VarError {
    /// The project's variables file does not exist.
    #[error("variables file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The variables file could not be decoded at all.
    #[error("failed to decode variables file: {0}")]
    Decode(String),

    /// A write target's dotted path does not resolve to an existing leaf.
    #[error("key path not found: {0}")]
    PathNotFound(String),

    /// The value shape cannot be written without corrupting the file.
    #[error("unsupported value shape for key {0}")]
    UnsupportedShape(String),

    /// Underlying file I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
