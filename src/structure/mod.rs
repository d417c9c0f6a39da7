//! Structure-preserving model of a variables file.
//!
//! A parse produces two parallel representations of the same text: a tree of
//! [`StructureNode`]s grouped into comment-headed [`Section`]s (carrying line
//! positions so the writer can regenerate individual lines), and a plain
//! nested [`VarValue`] mapping used for fast dotted-key lookup. The verbatim
//! input lines are kept as the immutable baseline for writes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

mod parser;

pub use parser::parse;
pub(crate) use parser::inline_comment_start;

/// A decoded value from the variables file.
///
/// Closed union: every consumer matches exhaustively, there is no open
/// "any" escape hatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    Null,
    Bool(bool),
    Number(serde_yaml::Number),
    String(String),
    Array(Vec<VarValue>),
    Object(BTreeMap<String, VarValue>),
}

/// Discriminant for [`VarValue`], stored on every node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Null,
}

impl VarValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            VarValue::Null => ValueType::Null,
            VarValue::Bool(_) => ValueType::Boolean,
            VarValue::Number(_) => ValueType::Number,
            VarValue::String(_) => ValueType::String,
            VarValue::Array(_) => ValueType::Array,
            VarValue::Object(_) => ValueType::Object,
        }
    }

    /// Whether this value renders as a single token on a key line.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, VarValue::Array(_) | VarValue::Object(_))
    }

    /// Coerce to the display text shown in place of a placeholder.
    ///
    /// Numbers and booleans stringify, arrays join their elements with a
    /// comma, nested objects are summarized by their keys rather than
    /// traversed further.
    pub fn display_text(&self) -> String {
        match self {
            VarValue::Null => "null".to_string(),
            VarValue::Bool(b) => b.to_string(),
            VarValue::Number(n) => n.to_string(),
            VarValue::String(s) => s.clone(),
            VarValue::Array(items) => items
                .iter()
                .map(VarValue::display_text)
                .collect::<Vec<_>>()
                .join(", "),
            VarValue::Object(map) => {
                let keys = map.keys().cloned().collect::<Vec<_>>().join(", ");
                format!("{{{}}}", crate::utils::ellipsize(&keys, 40))
            }
        }
    }
}

impl From<serde_yaml::Value> for VarValue {
    fn from(value: serde_yaml::Value) -> Self {
        match value {
            serde_yaml::Value::Null => VarValue::Null,
            serde_yaml::Value::Bool(b) => VarValue::Bool(b),
            serde_yaml::Value::Number(n) => VarValue::Number(n),
            serde_yaml::Value::String(s) => VarValue::String(s),
            serde_yaml::Value::Sequence(seq) => {
                VarValue::Array(seq.into_iter().map(VarValue::from).collect())
            }
            serde_yaml::Value::Mapping(map) => {
                let mut out = BTreeMap::new();
                for (k, v) in map {
                    out.insert(mapping_key(&k), VarValue::from(v));
                }
                VarValue::Object(out)
            }
            serde_yaml::Value::Tagged(tagged) => VarValue::from(tagged.value),
        }
    }
}

impl From<serde_json::Value> for VarValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => VarValue::Null,
            serde_json::Value::Bool(b) => VarValue::Bool(b),
            serde_json::Value::Number(n) => {
                // Carry integers through without a float round-trip.
                if let Some(i) = n.as_i64() {
                    VarValue::Number(serde_yaml::Number::from(i))
                } else if let Some(u) = n.as_u64() {
                    VarValue::Number(serde_yaml::Number::from(u))
                } else {
                    VarValue::Number(serde_yaml::Number::from(n.as_f64().unwrap_or(0.0)))
                }
            }
            serde_json::Value::String(s) => VarValue::String(s),
            serde_json::Value::Array(items) => {
                VarValue::Array(items.into_iter().map(VarValue::from).collect())
            }
            serde_json::Value::Object(map) => VarValue::Object(
                map.into_iter().map(|(k, v)| (k, VarValue::from(v))).collect(),
            ),
        }
    }
}

/// Render a YAML mapping key as the string segment used in dotted paths.
fn mapping_key(key: &serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        other => format!("{:?}", other),
    }
}

/// One parsed key line (or nested block header) of the variables file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureNode {
    /// Key as written on the line, without the dotted prefix.
    pub key: String,
    /// Decoded value; `Null` for structural parents.
    pub value: VarValue,
    /// Discriminant for `value`.
    pub value_type: ValueType,
    /// Indentation units of the key line (spaces count 1, tabs count 2).
    pub level: u32,
    /// First line of this node in the original text (0-indexed).
    pub line_start: usize,
    /// Last line covered by this node, including its nested block.
    pub line_end: usize,
    /// Trailing inline comment, without the leading `#`.
    pub comment: Option<String>,
    /// Nested child nodes; always empty for leaves.
    pub children: Vec<StructureNode>,
    /// True when this line introduces a nested block and carries no value.
    pub is_structural_parent: bool,
    /// Dotted path of the parent node, absent for top-level nodes.
    ///
    /// Derived during parsing, never mutated independently of the node's
    /// position in the tree.
    pub parent_path: Option<String>,
}

impl StructureNode {
    /// Full dotted path of this node.
    pub fn path(&self) -> String {
        match &self.parent_path {
            Some(prefix) => format!("{}.{}", prefix, self.key),
            None => self.key.clone(),
        }
    }
}

/// A run of nodes grouped under a full-line comment header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Human-readable label derived by title-casing the comment body.
    pub header: String,
    /// Raw comment text the header was derived from.
    pub comment: String,
    /// Line index of the introducing comment.
    pub line_number: usize,
    /// Nodes belonging to this section, in file order.
    pub nodes: Vec<StructureNode>,
}

/// A duplicate dotted path found among sibling-level nodes.
///
/// Diagnostic-only: duplicates never abort parsing or alter the returned
/// structure's shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateKey {
    pub path: String,
    pub level: u32,
    /// Line of the first occurrence.
    pub first_line: usize,
    /// Line of the repeated occurrence.
    pub line: usize,
}

/// Complete result of parsing a variables file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedStructure {
    /// Sections in file order; a file without comment headers yields exactly
    /// one implicit section holding all nodes.
    pub sections: Vec<Section>,
    /// Depth-first flattening of all nodes across all sections.
    pub flat_nodes: Vec<StructureNode>,
    /// Verbatim input split into lines, the immutable baseline for writes.
    pub original_lines: Vec<String>,
    /// Plain nested mapping mirroring the same values, for dotted lookup.
    pub data: VarValue,
    /// Duplicate sibling paths detected during validation.
    pub duplicates: Vec<DuplicateKey>,
}

impl ParsedStructure {
    /// Look up a dotted key in the plain mapping, coercing to display text.
    pub fn lookup(&self, dotted: &str) -> Option<String> {
        lookup_path(&self.data, dotted)
    }
}

/// Descend a plain mapping one dot-segment at a time, coercing the found
/// value to display text.
///
/// Returns `None` the moment any segment is missing or the traversal hits a
/// non-container.
pub fn lookup_path(data: &VarValue, dotted: &str) -> Option<String> {
    let mut current = data;
    for segment in dotted.split('.') {
        match current {
            VarValue::Object(map) => current = map.get(segment)?,
            _ => return None,
        }
    }
    Some(current.display_text())
}

/// Flatten sections depth-first into a single node list.
pub(crate) fn flatten(sections: &[Section]) -> Vec<StructureNode> {
    fn walk(node: &StructureNode, out: &mut Vec<StructureNode>) {
        out.push(node.clone());
        for child in &node.children {
            walk(child, out);
        }
    }

    let mut out = Vec::new();
    for section in sections {
        for node in &section.nodes {
            walk(node, &mut out);
        }
    }
    out
}

/// Detect sibling-level nodes sharing a dotted path at the same depth.
pub(crate) fn find_duplicates(flat_nodes: &[StructureNode]) -> Vec<DuplicateKey> {
    let mut seen: BTreeMap<(String, u32), usize> = BTreeMap::new();
    let mut duplicates = Vec::new();

    for node in flat_nodes {
        let key = (node.path(), node.level);
        match seen.get(&key) {
            Some(&first_line) => {
                tracing::warn!(
                    "duplicate key '{}' at line {} (first seen at line {})",
                    key.0,
                    node.line_start + 1,
                    first_line + 1
                );
                duplicates.push(DuplicateKey {
                    path: key.0.clone(),
                    level: node.level,
                    first_line,
                    line: node.line_start,
                });
            }
            None => {
                seen.insert(key, node.line_start);
            }
        }
    }

    duplicates
}
