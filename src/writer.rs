//! Lossless write-back into the variables file.
//!
//! The writer never mutates the caller's cached tree: it clones the
//! structure, overwrites the target node in the clone, mirrors the change
//! into the plain mapping, and regenerates the file text from the verbatim
//! original lines. Only the target leaf's value portion is substituted;
//! every untouched line stays byte-identical.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::VarError;
use crate::files::FileAccess;
use crate::structure::{
    ParsedStructure, Section, StructureNode, VarValue, inline_comment_start,
};

/// Content written by [`create_variables_file`].
pub const DEFAULT_SCAFFOLD: &str = "\
# Variables
# Values referenced from documents as {{< var key >}}.

site:
  title: My Site
";

/// Result of a successful update: the regenerated file text and the
/// updated structure snapshot.
#[derive(Debug, Clone)]
pub struct UpdateResult {
    pub text: String,
    pub structure: ParsedStructure,
}

/// Overwrite the value at `dotted` with `value`.
///
/// The target is located by walking the dotted path through the node tree
/// (not the flat list), so the correct nested occurrence is found. Fails
/// with a path-not-found error when the path is exhausted before reaching a
/// leaf or the final segment has no matching key.
pub fn update_variable(
    structure: &ParsedStructure,
    dotted: &str,
    value: &VarValue,
) -> Result<UpdateResult, VarError> {
    let segments: Vec<&str> = dotted.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(VarError::PathNotFound(dotted.to_string()));
    }

    let mut updated = structure.clone();

    let target_line = {
        let node = find_node_mut(&mut updated.sections, &segments)
            .ok_or_else(|| VarError::PathNotFound(dotted.to_string()))?;
        if node.is_structural_parent {
            return Err(VarError::PathNotFound(dotted.to_string()));
        }
        node.value = value.clone();
        node.value_type = value.value_type();
        node.line_start
    };

    mirror_into_data(&mut updated.data, &segments, value);

    let mut lines = updated.original_lines.clone();
    let original = lines
        .get(target_line)
        .ok_or_else(|| VarError::PathNotFound(dotted.to_string()))?;
    let rewritten = rewrite_value_line(original, value)
        .ok_or_else(|| VarError::PathNotFound(dotted.to_string()))?;
    lines[target_line] = rewritten;

    updated.original_lines = lines.clone();
    let text = lines.join("\n");
    Ok(UpdateResult {
        text,
        structure: updated,
    })
}

/// Append a new key under a section, creating the section when absent.
///
/// Only simple (undotted) keys can be appended. Indentation is inferred
/// from sibling nodes where possible.
pub fn add_variable(
    structure: &ParsedStructure,
    section_header: Option<&str>,
    key: &str,
    value: &VarValue,
) -> Result<String, VarError> {
    if key.is_empty() || key.contains('.') || !crate::scanner::is_valid_key(key) {
        return Err(VarError::UnsupportedShape(key.to_string()));
    }

    let mut lines = structure.original_lines.clone();
    let new_line = format!("{}: {}", key, format_value(value, key));

    let existing = section_header.and_then(|header| {
        structure
            .sections
            .iter()
            .find(|s| s.header.eq_ignore_ascii_case(header))
    });

    match existing {
        Some(section) => {
            let indent = section
                .nodes
                .first()
                .and_then(|n| lines.get(n.line_start))
                .map(|line| leading_whitespace(line).to_string())
                .unwrap_or_default();
            let insert_at = section
                .nodes
                .iter()
                .map(|n| n.line_end + 1)
                .max()
                .unwrap_or(section.line_number + 1);
            lines.insert(insert_at, format!("{indent}{new_line}"));
        }
        None => {
            // Keep a trailing newline terminal: insert before the final
            // empty element produced by splitting on '\n'.
            let mut tail = lines.len();
            if lines.last().is_some_and(|l| l.is_empty()) {
                tail -= 1;
            }
            let mut inserted = Vec::new();
            if tail > 0 && !lines[tail - 1].trim().is_empty() {
                inserted.push(String::new());
            }
            if let Some(header) = section_header {
                inserted.push(format!("# {header}"));
            }
            inserted.push(new_line);
            for (i, line) in inserted.into_iter().enumerate() {
                lines.insert(tail + i, line);
            }
        }
    }

    Ok(lines.join("\n"))
}

/// Write a fresh variables file with the default scaffold content.
pub async fn create_variables_file(
    files: &dyn FileAccess,
    path: &Path,
) -> Result<(), VarError> {
    files.write(path, DEFAULT_SCAFFOLD).await?;
    Ok(())
}

fn find_node_mut<'a>(
    sections: &'a mut [Section],
    segments: &[&str],
) -> Option<&'a mut StructureNode> {
    for section in sections.iter_mut() {
        if let Some(found) = descend(&mut section.nodes, segments) {
            return Some(found);
        }
    }
    None
}

fn descend<'a>(
    nodes: &'a mut [StructureNode],
    segments: &[&str],
) -> Option<&'a mut StructureNode> {
    let (first, rest) = segments.split_first()?;
    let node = nodes.iter_mut().find(|n| n.key == *first)?;
    if rest.is_empty() {
        Some(node)
    } else {
        descend(&mut node.children, rest)
    }
}

/// Mirror the new value into the plain mapping, creating intermediate
/// containers as needed.
fn mirror_into_data(data: &mut VarValue, segments: &[&str], value: &VarValue) {
    if !matches!(data, VarValue::Object(_)) {
        *data = VarValue::Object(BTreeMap::new());
    }
    if let VarValue::Object(map) = data {
        mirror_into_map(map, segments, value);
    }
}

fn mirror_into_map(map: &mut BTreeMap<String, VarValue>, segments: &[&str], value: &VarValue) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        map.insert(first.to_string(), value.clone());
        return;
    }
    let entry = map
        .entry(first.to_string())
        .or_insert_with(|| VarValue::Object(BTreeMap::new()));
    if !matches!(entry, VarValue::Object(_)) {
        *entry = VarValue::Object(BTreeMap::new());
    }
    if let VarValue::Object(child) = entry {
        mirror_into_map(child, rest, value);
    }
}

/// Substitute only the value portion of a key line.
///
/// Everything before and including the colon, the leading whitespace before
/// the value token, and anything after the token (trailing whitespace and
/// inline comment) are preserved verbatim.
fn rewrite_value_line(line: &str, value: &VarValue) -> Option<String> {
    let colon = line.find(':')?;
    let (prefix, rest) = line.split_at(colon + 1);

    let region_end = inline_comment_start(rest).unwrap_or(rest.len());
    let region = &rest[..region_end];
    let token = region.trim();
    let formatted = format_value(value, prefix.trim().trim_end_matches(':'));

    if token.is_empty() {
        // Bare null leaf: no value token to replace, append one.
        let suffix = &rest[region_end..];
        let gap = if suffix.is_empty() { "" } else { " " };
        return Some(format!("{prefix} {formatted}{gap}{suffix}"));
    }

    let token_start = region.len() - region.trim_start().len();
    let token_end = region.trim_end().len();
    let lead = &region[..token_start];
    let suffix = &rest[token_end..];
    Some(format!("{prefix}{lead}{formatted}{suffix}"))
}

/// YAML characters that force quoting of a plain string value.
const SIGNIFICANT: &[char] = &[
    ':', '#', '[', ']', '{', '}', ',', '&', '*', '!', '|', '>', '\'', '"', '%', '@', '`',
];

/// Type-aware rendering of a value token.
///
/// Arrays with non-scalar elements are written as an explicit placeholder
/// instead of silently mis-encoding nested data.
pub fn format_value(value: &VarValue, key: &str) -> String {
    match value {
        VarValue::Null => "null".to_string(),
        VarValue::Bool(b) => b.to_string(),
        VarValue::Number(n) => n.to_string(),
        VarValue::String(s) => format_string(s),
        VarValue::Array(items) => {
            if items.iter().all(VarValue::is_scalar) {
                let rendered: Vec<String> =
                    items.iter().map(|item| format_value(item, key)).collect();
                format!("[{}]", rendered.join(", "))
            } else {
                tracing::warn!("array for '{key}' contains non-scalar elements, not written");
                "\"<unsupported>\"".to_string()
            }
        }
        VarValue::Object(map) => {
            if map.is_empty() {
                String::new()
            } else {
                let rendered: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, format_value(v, key)))
                    .collect();
                format!("{{{}}}", rendered.join(", "))
            }
        }
    }
}

fn format_string(s: &str) -> String {
    if needs_quoting(s) {
        format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        s.to_string()
    }
}

fn needs_quoting(s: &str) -> bool {
    s.is_empty()
        || s.starts_with(|c: char| c.is_ascii_digit())
        || s.starts_with(char::is_whitespace)
        || s.ends_with(char::is_whitespace)
        || s.contains(SIGNIFICANT)
}

fn leading_whitespace(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}
