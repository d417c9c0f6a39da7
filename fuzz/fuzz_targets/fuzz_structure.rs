#![no_main]

use libfuzzer_sys::fuzz_target;
use std::panic::AssertUnwindSafe;
use varlens_lsp::structure::{StructureNode, parse};

fn check_node(node: &StructureNode, line_count: usize) {
    assert!(
        node.line_start <= node.line_end,
        "line_start must be <= line_end"
    );
    assert!(node.line_end < line_count, "line_end out of range");

    if node.is_structural_parent {
        assert!(!node.children.is_empty(), "parent without children");
    } else {
        assert!(node.children.is_empty(), "leaf with children");
    }

    for pair in node.children.windows(2) {
        assert!(
            pair[0].line_end < pair[1].line_start,
            "sibling line ranges overlap"
        );
    }
    for child in &node.children {
        assert!(child.parent_path.is_some(), "child missing parent_path");
        check_node(child, line_count);
    }
}

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = std::str::from_utf8(data) {
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| parse(content)));

        if let Ok(parsed) = result {
            let line_count = content.split('\n').count();
            assert_eq!(parsed.original_lines.len(), line_count);

            for section in &parsed.sections {
                for pair in section.nodes.windows(2) {
                    assert!(
                        pair[0].line_end < pair[1].line_start,
                        "top-level line ranges overlap"
                    );
                }
                for node in &section.nodes {
                    check_node(node, line_count);
                }
            }
        }
    }
});
