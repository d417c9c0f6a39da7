//! Line-oriented structural parse of a variables file.
//!
//! The whole text is decoded once through `serde_yaml` to obtain the plain
//! nested mapping, then the lines are walked sequentially to build the
//! section/node tree with positions. The two passes are independent: a
//! decode failure degrades to an empty mapping without aborting the
//! structural pass.

use std::collections::BTreeMap;

use super::{
    ParsedStructure, Section, StructureNode, ValueType, VarValue, find_duplicates, flatten,
};

/// Parse a variables file into its structure-preserving representation.
pub fn parse(text: &str) -> ParsedStructure {
    let original_lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    let data = decode_whole(text);

    let mut sections: Vec<Section> = Vec::new();
    let mut current: Option<Section> = None;

    let mut i = 0;
    while i < original_lines.len() {
        let trimmed = original_lines[i].trim();

        if trimmed.is_empty() {
            i += 1;
            continue;
        }

        if trimmed.starts_with('#') {
            // Full-line comment: boundary of a new section. Nodes gathered
            // so far stay with the previous section.
            if let Some(section) = current.take() {
                sections.push(section);
            }
            let body = trimmed.trim_start_matches('#').trim();
            current = Some(Section {
                header: title_case(body),
                comment: trimmed.to_string(),
                line_number: i,
                nodes: Vec::new(),
            });
            i += 1;
            continue;
        }

        match split_key_line(trimmed) {
            Some((key, rhs)) => {
                let (node, next) = parse_node(&original_lines, i, key, rhs, None);
                current
                    .get_or_insert_with(implicit_section)
                    .nodes
                    .push(node);
                i = next;
            }
            None => {
                i += 1;
            }
        }
    }
    if let Some(section) = current.take() {
        sections.push(section);
    }

    let flat_nodes = flatten(&sections);
    let duplicates = find_duplicates(&flat_nodes);

    ParsedStructure {
        sections,
        flat_nodes,
        original_lines,
        data,
        duplicates,
    }
}

/// Parse one key line, recursing into a nested block when the right-hand
/// side marks a structural parent. Returns the node and the index of the
/// next unconsumed line.
fn parse_node(
    lines: &[String],
    line: usize,
    key: &str,
    rhs: &str,
    parent_path: Option<&str>,
) -> (StructureNode, usize) {
    let indent = indent_units(&lines[line]);
    let (value_part, comment) = split_inline_comment(rhs);
    let value_token = value_part.trim();

    let path = match parent_path {
        Some(prefix) => format!("{}.{}", prefix, key),
        None => key.to_string(),
    };

    // An empty right-hand side introduces a nested block. Block scalar
    // markers get the same treatment as an empty value.
    if value_token.is_empty() || value_token == "|" || value_token == ">" {
        let (children, last) = parse_children(lines, line, indent, &path);
        if !children.is_empty() {
            let node = StructureNode {
                key: key.to_string(),
                value: VarValue::Null,
                value_type: ValueType::Object,
                level: indent,
                line_start: line,
                line_end: last,
                comment,
                children,
                is_structural_parent: true,
                parent_path: parent_path.map(str::to_string),
            };
            return (node, last + 1);
        }
        // No nested content follows: a bare key holding null.
        let node = StructureNode {
            key: key.to_string(),
            value: VarValue::Null,
            value_type: ValueType::Null,
            level: indent,
            line_start: line,
            line_end: line,
            comment,
            children: Vec::new(),
            is_structural_parent: false,
            parent_path: parent_path.map(str::to_string),
        };
        return (node, line + 1);
    }

    let value = decode_scalar(value_token);
    let value_type = value.value_type();
    let node = StructureNode {
        key: key.to_string(),
        value,
        value_type,
        level: indent,
        line_start: line,
        line_end: line,
        comment,
        children: Vec::new(),
        is_structural_parent: false,
        parent_path: parent_path.map(str::to_string),
    };
    (node, line + 1)
}

/// Collect the contiguous run of lines more indented than the parent.
///
/// Blank lines and comment lines inside the block are skipped, not treated
/// as boundaries. Stops at the first content line whose indentation is not
/// greater than the parent's.
fn parse_children(
    lines: &[String],
    parent_line: usize,
    parent_indent: u32,
    parent_path: &str,
) -> (Vec<StructureNode>, usize) {
    let mut children = Vec::new();
    let mut last = parent_line;
    let mut j = parent_line + 1;

    while j < lines.len() {
        let trimmed = lines[j].trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            j += 1;
            continue;
        }
        if indent_units(&lines[j]) <= parent_indent {
            break;
        }
        match split_key_line(trimmed) {
            Some((key, rhs)) => {
                let (child, next) = parse_node(lines, j, key, rhs, Some(parent_path));
                last = child.line_end;
                children.push(child);
                j = next;
            }
            None => {
                j += 1;
            }
        }
    }

    (children, last)
}

/// A line is a key line if, after trimming, it contains a colon and the
/// substring before the colon is non-empty with no internal whitespace.
/// Splits at the first colon.
fn split_key_line(trimmed: &str) -> Option<(&str, &str)> {
    let colon = trimmed.find(':')?;
    let key = trimmed[..colon].trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }
    Some((key, &trimmed[colon + 1..]))
}

/// Find the start of a trailing inline comment in the text after the colon.
///
/// A `#` only starts a comment when it sits outside quotes and is preceded
/// by whitespace (or starts the value region).
pub(crate) fn inline_comment_start(rhs: &str) -> Option<usize> {
    let bytes = rhs.as_bytes();
    let mut quote: Option<u8> = None;
    for (idx, &b) in bytes.iter().enumerate() {
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'#' => {
                    if idx == 0 || bytes[idx - 1].is_ascii_whitespace() {
                        return Some(idx);
                    }
                }
                _ => {}
            },
        }
    }
    None
}

/// Split the right-hand side into its value region and the recorded comment.
fn split_inline_comment(rhs: &str) -> (&str, Option<String>) {
    match inline_comment_start(rhs) {
        Some(idx) => {
            let body = rhs[idx + 1..].trim();
            let comment = (!body.is_empty()).then(|| body.to_string());
            (&rhs[..idx], comment)
        }
        None => (rhs, None),
    }
}

/// Indentation units of a line: spaces count as 1, tabs count as 2.
pub(crate) fn indent_units(line: &str) -> u32 {
    let mut units = 0;
    for ch in line.chars() {
        match ch {
            ' ' => units += 1,
            '\t' => units += 2,
            _ => break,
        }
    }
    units
}

/// Decode the whole text with the conventional loader.
fn decode_whole(text: &str) -> VarValue {
    match serde_yaml::from_str::<serde_yaml::Value>(text) {
        Ok(value @ serde_yaml::Value::Mapping(_)) => VarValue::from(value),
        Ok(_) => VarValue::Object(BTreeMap::new()),
        Err(err) => {
            tracing::debug!("variables decode failed, structural pass continues: {err}");
            VarValue::Object(BTreeMap::new())
        }
    }
}

/// Decode a single right-hand-side token, falling back to the raw trimmed
/// string when it cannot be scalar-decoded.
fn decode_scalar(token: &str) -> VarValue {
    match serde_yaml::from_str::<serde_yaml::Value>(token) {
        Ok(value) => VarValue::from(value),
        Err(_) => VarValue::String(token.to_string()),
    }
}

/// Title-case each whitespace-separated word of a comment body.
fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn implicit_section() -> Section {
    Section {
        header: "General".to_string(),
        comment: String::new(),
        line_number: 0,
        nodes: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flat_pairs() {
        let parsed = parse("foo: bar\ncount: 5\nenabled: true\n");
        assert_eq!(parsed.sections.len(), 1);
        assert_eq!(parsed.sections[0].header, "General");

        let nodes = &parsed.sections[0].nodes;
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].key, "foo");
        assert_eq!(nodes[0].value, VarValue::String("bar".into()));
        assert_eq!(nodes[1].value_type, ValueType::Number);
        assert_eq!(nodes[2].value_type, ValueType::Boolean);

        assert_eq!(parsed.lookup("count"), Some("5".to_string()));
    }

    #[test]
    fn test_parse_nested_example() {
        let parsed = parse("foo: bar\nnested:\n  key: value");
        assert_eq!(parsed.lookup("foo"), Some("bar".to_string()));
        assert_eq!(parsed.lookup("nested.key"), Some("value".to_string()));

        let nested = &parsed.sections[0].nodes[1];
        assert!(nested.is_structural_parent);
        assert_eq!(nested.value, VarValue::Null);
        assert_eq!(nested.value_type, ValueType::Object);
        assert_eq!(nested.children.len(), 1);
        assert_eq!(nested.children[0].parent_path.as_deref(), Some("nested"));
        assert_eq!(nested.line_start, 1);
        assert_eq!(nested.line_end, 2);
    }

    #[test]
    fn test_sections_from_comments() {
        let text = "# site settings\ntitle: Home\n\n# contact info\nemail: a@b.c\n";
        let parsed = parse(text);
        assert_eq!(parsed.sections.len(), 2);
        assert_eq!(parsed.sections[0].header, "Site Settings");
        assert_eq!(parsed.sections[0].comment, "# site settings");
        assert_eq!(parsed.sections[0].line_number, 0);
        assert_eq!(parsed.sections[1].header, "Contact Info");
        assert_eq!(parsed.sections[1].nodes[0].key, "email");
    }

    #[test]
    fn test_unheaded_content_lands_in_implicit_section() {
        let parsed = parse("first: 1\n# rest\nsecond: 2\n");
        assert_eq!(parsed.sections.len(), 2);
        assert_eq!(parsed.sections[0].header, "General");
        assert_eq!(parsed.sections[0].nodes[0].key, "first");
        assert_eq!(parsed.sections[1].header, "Rest");
    }

    #[test]
    fn test_inline_comment_recorded_and_stripped() {
        let parsed = parse("port: 8080  # override in prod\n");
        let node = &parsed.sections[0].nodes[0];
        assert_eq!(node.value, VarValue::Number(serde_yaml::Number::from(8080)));
        assert_eq!(node.comment.as_deref(), Some("override in prod"));
    }

    #[test]
    fn test_hash_inside_quoted_value_is_not_a_comment() {
        let parsed = parse("color: \"#ff0000\"\n");
        let node = &parsed.sections[0].nodes[0];
        assert_eq!(node.comment, None);
        assert_eq!(node.value, VarValue::String("#ff0000".into()));
    }

    #[test]
    fn test_deeply_nested_blocks() {
        let text = "a:\n  b:\n    c: 5\n  d: 6\ne: 7\n";
        let parsed = parse(text);
        assert_eq!(parsed.lookup("a.b.c"), Some("5".to_string()));
        assert_eq!(parsed.lookup("a.d"), Some("6".to_string()));
        assert_eq!(parsed.lookup("e"), Some("7".to_string()));

        let a = &parsed.sections[0].nodes[0];
        assert_eq!(a.line_end, 3);
        let b = &a.children[0];
        assert_eq!(b.children[0].parent_path.as_deref(), Some("a.b"));

        // Siblings never claim overlapping line ranges.
        let d = &a.children[1];
        assert!(b.line_end < d.line_start);
    }

    #[test]
    fn test_blank_and_comment_lines_inside_block_are_skipped() {
        let text = "outer:\n\n  # note\n  inner: 1\nnext: 2\n";
        let parsed = parse(text);
        assert_eq!(parsed.lookup("outer.inner"), Some("1".to_string()));
        assert_eq!(parsed.lookup("next"), Some("2".to_string()));
        assert_eq!(parsed.sections[0].nodes[0].children.len(), 1);
    }

    #[test]
    fn test_tab_indentation_counts_double() {
        let text = "parent:\n\tchild: 1\n";
        let parsed = parse(text);
        let parent = &parsed.sections[0].nodes[0];
        assert_eq!(parent.children.len(), 1);
        assert_eq!(parent.children[0].level, 2);
    }

    #[test]
    fn test_block_scalar_marker_treated_as_container() {
        let text = "block: |\n  first: 1\n  second: 2\n";
        let parsed = parse(text);
        let node = &parsed.sections[0].nodes[0];
        assert!(node.is_structural_parent);
        assert_eq!(node.children.len(), 2);
    }

    #[test]
    fn test_bare_key_without_children_is_null_leaf() {
        let parsed = parse("empty:\nnext: 1\n");
        let node = &parsed.sections[0].nodes[0];
        assert!(!node.is_structural_parent);
        assert!(node.children.is_empty());
        assert_eq!(node.value_type, ValueType::Null);
    }

    #[test]
    fn test_undecodable_value_falls_back_to_raw_string() {
        let parsed = parse("weird: [unclosed\n");
        let node = &parsed.sections[0].nodes[0];
        assert_eq!(node.value, VarValue::String("[unclosed".into()));
        assert_eq!(node.value_type, ValueType::String);
    }

    #[test]
    fn test_flat_array_value() {
        let parsed = parse("tags: [a, b, c]\n");
        let node = &parsed.sections[0].nodes[0];
        assert_eq!(node.value_type, ValueType::Array);
        assert_eq!(parsed.lookup("tags"), Some("a, b, c".to_string()));
    }

    #[test]
    fn test_duplicate_sibling_keys_reported_not_fatal() {
        let parsed = parse("name: a\nname: b\n");
        assert_eq!(parsed.duplicates.len(), 1);
        assert_eq!(parsed.duplicates[0].path, "name");
        assert_eq!(parsed.duplicates[0].first_line, 0);
        assert_eq!(parsed.duplicates[0].line, 1);
        // Shape is unchanged: both nodes are present.
        assert_eq!(parsed.sections[0].nodes.len(), 2);
    }

    #[test]
    fn test_same_key_at_different_depths_is_not_a_duplicate() {
        let parsed = parse("name: a\nnested:\n  name: b\n");
        assert!(parsed.duplicates.is_empty());
    }

    #[test]
    fn test_flat_nodes_depth_first_order() {
        let parsed = parse("a:\n  b: 1\nc: 2\n");
        let paths: Vec<String> = parsed.flat_nodes.iter().map(|n| n.path()).collect();
        assert_eq!(paths, vec!["a", "a.b", "c"]);
    }

    #[test]
    fn test_flat_nodes_agree_with_plain_mapping() {
        let text = "x: 1\ngroup:\n  y: hello\n  z: [1, 2]\n";
        let parsed = parse(text);
        for node in parsed.flat_nodes.iter().filter(|n| !n.is_structural_parent) {
            assert_eq!(
                parsed.lookup(&node.path()),
                Some(node.value.display_text()),
                "mismatch at {}",
                node.path()
            );
        }
    }

    #[test]
    fn test_decode_failure_yields_empty_mapping() {
        // serde_yaml rejects duplicate mapping keys; the structural pass
        // still succeeds.
        let parsed = parse("name: a\nname: b\n");
        assert_eq!(parsed.data, VarValue::Object(Default::default()));
        assert_eq!(parsed.sections[0].nodes.len(), 2);
    }

    #[test]
    fn test_key_with_internal_space_is_not_a_key_line() {
        let parsed = parse("not a key: 1\nreal: 2\n");
        assert_eq!(parsed.sections[0].nodes.len(), 1);
        assert_eq!(parsed.sections[0].nodes[0].key, "real");
    }

    #[test]
    fn test_indent_units() {
        assert_eq!(indent_units("key: 1"), 0);
        assert_eq!(indent_units("  key: 1"), 2);
        assert_eq!(indent_units("\tkey: 1"), 2);
        assert_eq!(indent_units(" \tkey: 1"), 3);
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("site settings"), "Site Settings");
        assert_eq!(title_case("API keys"), "API Keys");
        assert_eq!(title_case(""), "");
    }
}
