//! Diagnostics for documents and the variables file itself.
//!
//! Documents get a warning per placeholder whose key does not resolve
//! against the project's loaded values. The variables file gets a warning
//! per duplicate sibling key found by the parser. Both are data-quality
//! signals only; nothing here ever blocks rendering.

use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Position, Range};

use crate::cache::VariableCache;
use crate::project::ProjectPaths;
use crate::scanner;
use crate::structure::ParsedStructure;
use crate::utils::offset_to_position;

const SOURCE: &str = "varlens";

/// Warnings for unresolved placeholder keys in a document.
///
/// Requires the project's values to be cached; with nothing loaded there is
/// no basis to call a key unresolved.
pub fn unresolved_diagnostics(
    text: &str,
    project: &ProjectPaths,
    cache: &VariableCache,
) -> Vec<Diagnostic> {
    if !cache.is_loaded(project) {
        return Vec::new();
    }

    scanner::find_all(text)
        .into_iter()
        .filter(|m| cache.get(project, &m.key).is_none())
        .map(|m| Diagnostic {
            range: Range {
                start: offset_to_position(text, m.from),
                end: offset_to_position(text, m.to),
            },
            severity: Some(DiagnosticSeverity::WARNING),
            source: Some(SOURCE.to_string()),
            message: format!("unknown variable '{}'", m.key),
            ..Default::default()
        })
        .collect()
}

/// Warnings for duplicate sibling keys in a parsed variables file.
pub fn duplicate_key_diagnostics(structure: &ParsedStructure) -> Vec<Diagnostic> {
    structure
        .duplicates
        .iter()
        .map(|dup| {
            let line = dup.line as u32;
            let length = structure
                .original_lines
                .get(dup.line)
                .map(|l| l.len() as u32)
                .unwrap_or(0);
            Diagnostic {
                range: Range {
                    start: Position::new(line, 0),
                    end: Position::new(line, length),
                },
                severity: Some(DiagnosticSeverity::WARNING),
                source: Some(SOURCE.to_string()),
                message: format!(
                    "duplicate key '{}' (first defined on line {})",
                    dup.path,
                    dup.first_line + 1
                ),
                ..Default::default()
            }
        })
        .collect()
}
