//! Configuration management for the varlens language server.

use serde::Deserialize;

use crate::project::{DEFAULT_CONFIG_FILE, DEFAULT_VARIABLES_FILE};

/// Default scroll debounce while a project's values are uncached (ms).
const DEFAULT_SCROLL_DEBOUNCE_MS: u64 = 100;

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Inlay hint rendering configuration
    pub hints: HintsConfig,
    /// Rebuild scheduling configuration
    pub scan: ScanConfig,
    /// Diagnostics configuration
    pub diagnostics: DiagnosticsConfig,
    /// Project file naming configuration
    pub files: FilesConfig,
    /// Key prefixes to leave undecorated
    #[serde(default)]
    pub ignore: Vec<String>,
}

/// Inlay hint rendering configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HintsConfig {
    /// Enable placeholder hints
    pub enabled: bool,
    /// Visually flag unresolved keys instead of leaving them raw
    pub highlight_unresolved: bool,
}

impl Default for HintsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            highlight_unresolved: false,
        }
    }
}

/// Rebuild scheduling configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Debounce for viewport-only changes while values are uncached, in ms
    pub scroll_debounce_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scroll_debounce_ms: DEFAULT_SCROLL_DEBOUNCE_MS,
        }
    }
}

/// Diagnostics configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Publish unresolved-key and duplicate-key diagnostics
    pub enabled: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Project file naming configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Name of the per-project values file
    pub variables_file: String,
    /// Name of the per-project configuration file
    pub config_file: String,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            variables_file: DEFAULT_VARIABLES_FILE.to_string(),
            config_file: DEFAULT_CONFIG_FILE.to_string(),
        }
    }
}

impl Config {
    /// Parse configuration from initialization options
    pub fn from_init_options(options: Option<serde_json::Value>) -> Self {
        match options {
            Some(value) => serde_json::from_value(value).unwrap_or_default(),
            None => Self::default(),
        }
    }
}
