//! varlens LSP - Language server for template variable placeholders
//!
//! This crate resolves `{{< var dotted.key >}}` placeholders in documents
//! against a per-project `variables.yaml` file, preserving the ability to
//! edit that file losslessly.

pub mod backend;
pub mod cache;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod files;
pub mod notify;
pub mod project;
pub mod providers;
pub mod scanner;
pub mod structure;
pub mod utils;
pub mod writer;
