//! Per-project variable cache.
//!
//! Process-scoped service object memoizing each project's parsed variables
//! and structure. The cache is the sole writer of its own maps: consumers
//! receive read-only snapshots and route every mutation through
//! [`VariableCache::update_variable`], which enforces reload-after-write.
//! Loads are single-flight per project root; a second request while one is
//! outstanding observes the eventual cached result instead of triggering a
//! duplicate read.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::VarError;
use crate::files::FileAccess;
use crate::notify::NotificationSink;
use crate::project::ProjectPaths;
use crate::structure::{ParsedStructure, VarValue, lookup_path, parse};
use crate::writer;

/// Minimum spacing between user-visible load-failure notifications for the
/// same project.
const NOTIFY_WINDOW: Duration = Duration::from_secs(60);

/// Snapshot of one project's decoded variables.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Plain nested mapping used for dotted lookup.
    pub data: VarValue,
    /// Value of the shared version counter when this entry was created.
    pub version: u64,
    /// Source file modification time at load, when available.
    pub last_modified: Option<SystemTime>,
}

pub struct VariableCache {
    files: Arc<dyn FileAccess>,
    notifier: Arc<dyn NotificationSink>,
    entries: DashMap<PathBuf, Arc<CacheEntry>>,
    structures: DashMap<PathBuf, Arc<ParsedStructure>>,
    /// Monotonically increasing counter shared across all projects; lets
    /// dependents detect "something changed" without value comparison.
    version: AtomicU64,
    /// Single-flight gates, one per project root.
    inflight: DashMap<PathBuf, Arc<Mutex<()>>>,
    last_notified: DashMap<PathBuf, Instant>,
}

impl VariableCache {
    pub fn new(files: Arc<dyn FileAccess>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            files,
            notifier,
            entries: DashMap::new(),
            structures: DashMap::new(),
            version: AtomicU64::new(0),
            inflight: DashMap::new(),
            last_notified: DashMap::new(),
        }
    }

    /// Return the project's cached entry, loading it on first use.
    ///
    /// Missing file or undecodable content yields `None` and a rate-limited
    /// notification.
    pub async fn load_variables(&self, project: &ProjectPaths) -> Option<Arc<CacheEntry>> {
        if let Some(entry) = self.entries.get(&project.root) {
            return Some(Arc::clone(&entry));
        }

        let gate = self.gate(&project.root);
        let _guard = gate.lock().await;

        // A concurrent load may have completed while waiting on the gate.
        if let Some(entry) = self.entries.get(&project.root) {
            return Some(Arc::clone(&entry));
        }

        match self.read_and_parse(project).await {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!(
                    "failed to load variables for {}: {err}",
                    project.root.display()
                );
                self.notify_limited(&project.root, &format!("varlens: {err}"));
                None
            }
        }
    }

    /// Whether the project's values are currently cached.
    pub fn is_loaded(&self, project: &ProjectPaths) -> bool {
        self.entries.contains_key(&project.root)
    }

    /// Resolve a dotted key against the cached mapping, as display text.
    pub fn get(&self, project: &ProjectPaths, dotted: &str) -> Option<String> {
        let entry = self.entries.get(&project.root)?;
        lookup_path(&entry.data, dotted)
    }

    /// Read-only view of the cached structure.
    pub fn get_structure(&self, project: &ProjectPaths) -> Option<Arc<ParsedStructure>> {
        self.structures.get(&project.root).map(|s| Arc::clone(&s))
    }

    /// Persist a new value for `dotted` through the writer.
    ///
    /// On success both cache maps are evicted and eagerly reloaded so
    /// subsequent reads are consistent; on failure the existing cache is
    /// left untouched and the error is reported without panicking.
    pub async fn update_variable(
        &self,
        project: &ProjectPaths,
        dotted: &str,
        value: &VarValue,
    ) -> Result<(), VarError> {
        let structure = self.structure_or_load(project).await?;
        let result = writer::update_variable(&structure, dotted, value)?;
        self.files.write(&project.data_file, &result.text).await?;
        self.invalidate(project).await;
        Ok(())
    }

    /// Append a new key through the writer, starting from an empty
    /// structure when the project has no variables file yet.
    pub async fn add_variable(
        &self,
        project: &ProjectPaths,
        section: Option<&str>,
        key: &str,
        value: &VarValue,
    ) -> Result<(), VarError> {
        let structure = match self.structure_or_load(project).await {
            Ok(s) => s,
            Err(VarError::NotFound(_)) => Arc::new(parse("")),
            Err(err) => return Err(err),
        };
        let text = writer::add_variable(&structure, section, key, value)?;
        self.files.write(&project.data_file, &text).await?;
        self.invalidate(project).await;
        Ok(())
    }

    /// Write a fresh variables file with the default scaffold.
    pub async fn create_variables_file(&self, project: &ProjectPaths) -> Result<(), VarError> {
        writer::create_variables_file(self.files.as_ref(), &project.data_file).await?;
        self.invalidate(project).await;
        Ok(())
    }

    /// React to an external modification of the project's data file:
    /// evict and reload immediately rather than waiting for the next read.
    pub async fn invalidate(&self, project: &ProjectPaths) {
        let gate = self.gate(&project.root);
        let _guard = gate.lock().await;

        self.entries.remove(&project.root);
        self.structures.remove(&project.root);

        if let Err(err) = self.read_and_parse(project).await {
            tracing::warn!("reload failed for {}: {err}", project.root.display());
            self.notify_limited(&project.root, &format!("varlens: {err}"));
        }
    }

    /// Drop one project's entries without reloading.
    pub fn evict(&self, root: &Path) {
        self.entries.remove(root);
        self.structures.remove(root);
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.entries.clear();
        self.structures.clear();
    }

    pub fn current_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    fn gate(&self, root: &Path) -> Arc<Mutex<()>> {
        // Clone out of the shard before any await.
        let slot = self.inflight.entry(root.to_path_buf()).or_default();
        Arc::clone(&slot)
    }

    async fn structure_or_load(
        &self,
        project: &ProjectPaths,
    ) -> Result<Arc<ParsedStructure>, VarError> {
        if let Some(structure) = self.get_structure(project) {
            return Ok(structure);
        }
        self.load_variables(project).await;
        self.get_structure(project)
            .ok_or_else(|| VarError::NotFound(project.data_file.clone()))
    }

    async fn read_and_parse(&self, project: &ProjectPaths) -> Result<Arc<CacheEntry>, VarError> {
        let text = self
            .files
            .read(&project.data_file)
            .await
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => VarError::NotFound(project.data_file.clone()),
                std::io::ErrorKind::InvalidData => VarError::Decode(err.to_string()),
                _ => VarError::Io(err),
            })?;

        let structure = parse(&text);
        let last_modified = self.files.modified(&project.data_file).await;
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;

        let entry = Arc::new(CacheEntry {
            data: structure.data.clone(),
            version,
            last_modified,
        });
        self.entries.insert(project.root.clone(), Arc::clone(&entry));
        self.structures
            .insert(project.root.clone(), Arc::new(structure));

        tracing::debug!(
            "loaded variables for {} (version {version})",
            project.root.display()
        );
        Ok(entry)
    }

    /// Per-project rate limit: at most one notification per window no
    /// matter how many failures occur inside it.
    fn notify_limited(&self, root: &Path, message: &str) {
        let now = Instant::now();
        let mut allowed = false;
        self.last_notified
            .entry(root.to_path_buf())
            .and_modify(|last| {
                if now.duration_since(*last) >= NOTIFY_WINDOW {
                    *last = now;
                    allowed = true;
                }
            })
            .or_insert_with(|| {
                allowed = true;
                now
            });

        if allowed {
            self.notifier.notify(message);
        } else {
            tracing::debug!("notification suppressed for {}: {message}", root.display());
        }
    }
}
