//! File access seam.
//!
//! The cache and writer never touch the filesystem directly; they go through
//! [`FileAccess`] so hosts can supply their own storage and tests can run
//! against an in-memory implementation.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use dashmap::DashMap;

/// Capability to read and write whole files.
#[async_trait]
pub trait FileAccess: Send + Sync {
    /// Read the full text of a file.
    async fn read(&self, path: &Path) -> std::io::Result<String>;

    /// Write the full text of a file, replacing any previous content.
    async fn write(&self, path: &Path, text: &str) -> std::io::Result<()>;

    /// Last modification time, if the backing store tracks one.
    async fn modified(&self, path: &Path) -> Option<SystemTime>;

    async fn exists(&self, path: &Path) -> bool {
        self.modified(path).await.is_some()
    }
}

/// Filesystem-backed implementation using `tokio::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFiles;

#[async_trait]
impl FileAccess for LocalFiles {
    async fn read(&self, path: &Path) -> std::io::Result<String> {
        tokio::fs::read_to_string(path).await
    }

    async fn write(&self, path: &Path, text: &str) -> std::io::Result<()> {
        tokio::fs::write(path, text).await
    }

    async fn modified(&self, path: &Path) -> Option<SystemTime> {
        tokio::fs::metadata(path).await.ok()?.modified().ok()
    }
}

/// In-memory implementation for tests; counts reads so callers can assert
/// single-flight and memoization behavior.
#[derive(Debug, Default)]
pub struct MemoryFiles {
    contents: DashMap<PathBuf, (String, SystemTime)>,
    reads: std::sync::atomic::AtomicUsize,
}

impl MemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, text: impl Into<String>) {
        self.contents
            .insert(path.into(), (text.into(), SystemTime::now()));
    }

    /// Number of reads performed so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl FileAccess for MemoryFiles {
    async fn read(&self, path: &Path) -> std::io::Result<String> {
        self.reads
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.contents
            .get(path)
            .map(|entry| entry.0.clone())
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))
    }

    async fn write(&self, path: &Path, text: &str) -> std::io::Result<()> {
        self.contents
            .insert(path.to_path_buf(), (text.to_string(), SystemTime::now()));
        Ok(())
    }

    async fn modified(&self, path: &Path) -> Option<SystemTime> {
        self.contents.get(path).map(|entry| entry.1)
    }
}
