//! Project identity resolution.
//!
//! A project is a directory holding one variables file (and optionally a
//! configuration file) governing the documents beneath it. The core treats
//! resolution as an injected lookup; the filesystem implementation walks
//! parent directories until it finds a marker file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default name of the per-project values file.
pub const DEFAULT_VARIABLES_FILE: &str = "variables.yaml";

/// Default name of the per-project configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "varlens.toml";

/// Paths identifying one project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectPaths {
    /// Common root of the governed documents.
    pub root: PathBuf,
    /// The values file substitutions are sourced from.
    pub data_file: PathBuf,
    /// Optional project configuration file.
    pub config_file: Option<PathBuf>,
}

/// Maps a document to its project identity, or none.
pub trait ProjectResolver: Send + Sync {
    fn resolve(&self, document: &Path) -> Option<ProjectPaths>;
}

/// Filesystem resolver walking up from the document's directory.
///
/// The first ancestor directory containing the variables file (or the
/// configuration file) becomes the project root.
#[derive(Debug, Clone)]
pub struct FsProjectResolver {
    variables_file: String,
    config_file: String,
}

impl Default for FsProjectResolver {
    fn default() -> Self {
        Self::new(DEFAULT_VARIABLES_FILE, DEFAULT_CONFIG_FILE)
    }
}

impl FsProjectResolver {
    pub fn new(variables_file: impl Into<String>, config_file: impl Into<String>) -> Self {
        Self {
            variables_file: variables_file.into(),
            config_file: config_file.into(),
        }
    }
}

impl ProjectResolver for FsProjectResolver {
    fn resolve(&self, document: &Path) -> Option<ProjectPaths> {
        let start = if document.is_dir() {
            document
        } else {
            document.parent()?
        };

        for dir in start.ancestors() {
            let data_file = dir.join(&self.variables_file);
            let config_file = dir.join(&self.config_file);
            if data_file.is_file() || config_file.is_file() {
                return Some(ProjectPaths {
                    root: dir.to_path_buf(),
                    data_file,
                    config_file: config_file.is_file().then_some(config_file),
                });
            }
        }
        None
    }
}

/// Fixed-answer resolver for tests and single-project CLI runs.
pub struct StaticResolver {
    project: Option<ProjectPaths>,
}

impl StaticResolver {
    pub fn new(project: Option<ProjectPaths>) -> Self {
        Self { project }
    }
}

impl ProjectResolver for StaticResolver {
    fn resolve(&self, _document: &Path) -> Option<ProjectPaths> {
        self.project.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolver_finds_marker_in_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("site");
        let docs = root.join("content").join("posts");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(root.join(DEFAULT_VARIABLES_FILE), "a: 1\n").unwrap();

        let resolver = FsProjectResolver::default();
        let project = resolver.resolve(&docs.join("post.md")).unwrap();
        assert_eq!(project.root, root);
        assert_eq!(project.data_file, root.join(DEFAULT_VARIABLES_FILE));
        assert_eq!(project.config_file, None);
    }

    #[test]
    fn test_resolver_prefers_nearest_root() {
        let dir = tempfile::tempdir().unwrap();
        let outer = dir.path();
        let inner = outer.join("sub");
        std::fs::create_dir_all(&inner).unwrap();
        std::fs::write(outer.join(DEFAULT_VARIABLES_FILE), "a: 1\n").unwrap();
        std::fs::write(inner.join(DEFAULT_VARIABLES_FILE), "a: 2\n").unwrap();

        let resolver = FsProjectResolver::default();
        let project = resolver.resolve(&inner.join("doc.md")).unwrap();
        assert_eq!(project.root, inner);
    }

    #[test]
    fn test_resolver_none_without_marker() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = FsProjectResolver::new("does-not-exist.yaml", "nope.toml");
        assert!(resolver.resolve(&dir.path().join("doc.md")).is_none());
    }

    #[test]
    fn test_config_only_project_still_resolves() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DEFAULT_CONFIG_FILE), "").unwrap();

        let resolver = FsProjectResolver::default();
        let project = resolver.resolve(&dir.path().join("doc.md")).unwrap();
        assert_eq!(project.config_file, Some(dir.path().join(DEFAULT_CONFIG_FILE)));
        // The data file path is still the conventional location.
        assert_eq!(
            project.data_file,
            dir.path().join(DEFAULT_VARIABLES_FILE)
        );
    }
}
