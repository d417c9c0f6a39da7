//! Dotted-key completion inside placeholder tokens.

use std::sync::LazyLock;

use regex::Regex;
use tower_lsp::lsp_types::{CompletionItem, CompletionItemKind};

use crate::structure::ParsedStructure;

/// An opened placeholder with a partially typed key right before the
/// cursor: `{{< var site.ti`
static OPEN_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*<\s*var\s+([A-Za-z0-9_.]*)$").expect("open token pattern")
});

/// Offer the structure's leaf keys when the cursor sits inside a
/// placeholder being typed. Returns `None` outside of one.
pub fn key_completions(
    text: &str,
    offset: usize,
    structure: &ParsedStructure,
) -> Option<Vec<CompletionItem>> {
    let before = text.get(..offset)?;
    // Only the tail of the current line matters for the open-token check.
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let caps = OPEN_TOKEN.captures(&before[line_start..])?;
    let typed = caps.get(1).map(|m| m.as_str()).unwrap_or("");

    let items = structure
        .flat_nodes
        .iter()
        .filter(|node| !node.is_structural_parent)
        .map(|node| (node.path(), node))
        .filter(|(path, _)| path.starts_with(typed))
        .map(|(path, node)| CompletionItem {
            label: path.clone(),
            kind: Some(CompletionItemKind::VARIABLE),
            detail: Some(node.value.display_text()),
            ..Default::default()
        })
        .collect();
    Some(items)
}
