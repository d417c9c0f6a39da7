//! Integration tests for varlens-lsp

use std::sync::Arc;

use varlens_lsp::cache::VariableCache;
use varlens_lsp::files::{FileAccess, LocalFiles, MemoryFiles};
use varlens_lsp::notify::{NullNotifier, RecordingNotifier};
use varlens_lsp::project::{FsProjectResolver, ProjectPaths, ProjectResolver};
use varlens_lsp::providers::decorations::{DecorationKind, build_decorations};
use varlens_lsp::scanner;
use varlens_lsp::structure::{ValueType, VarValue, parse};
use varlens_lsp::writer;

/// Test parsing a realistic variables file
#[test]
fn test_parse_realistic_variables_file() {
    let content = r#"# Site settings
title: My Documentation
url: example.org
published: true

# Build options
build:
  drafts: false
  workers: 4
  formats: [html, pdf]

# Contact details
contact:
  email: docs@example.org
  address:
    city: Lyon
    country: France
"#;

    let parsed = parse(content);

    assert_eq!(parsed.sections.len(), 3);
    assert_eq!(parsed.sections[0].header, "Site Settings");
    assert_eq!(parsed.sections[1].header, "Build Options");
    assert_eq!(parsed.sections[2].header, "Contact Details");

    // Top-level scalars
    assert_eq!(
        parsed.lookup("title"),
        Some("My Documentation".to_string())
    );
    assert_eq!(parsed.lookup("published"), Some("true".to_string()));

    // Nested values through both representations
    assert_eq!(parsed.lookup("build.workers"), Some("4".to_string()));
    assert_eq!(parsed.lookup("build.formats"), Some("html, pdf".to_string()));
    assert_eq!(
        parsed.lookup("contact.address.city"),
        Some("Lyon".to_string())
    );

    // Structural shape
    let build = &parsed.sections[1].nodes[0];
    assert!(build.is_structural_parent);
    assert_eq!(build.children.len(), 3);
    let formats = &build.children[2];
    assert_eq!(formats.value_type, ValueType::Array);
    assert_eq!(formats.parent_path.as_deref(), Some("build"));

    assert!(parsed.duplicates.is_empty());
}

/// Parse, look up, update, and re-parse against real files on disk
#[tokio::test]
async fn test_end_to_end_update_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let content = "# Header\nfoo: bar\nnested:\n  key: value\n";
    std::fs::write(root.join("variables.yaml"), content).unwrap();

    let resolver = FsProjectResolver::default();
    let project = resolver.resolve(&root.join("doc.md")).unwrap();

    let cache = VariableCache::new(Arc::new(LocalFiles), Arc::new(NullNotifier));
    cache.load_variables(&project).await.unwrap();
    assert_eq!(cache.get(&project, "nested.key"), Some("value".to_string()));

    cache
        .update_variable(&project, "nested.key", &VarValue::String("new value".into()))
        .await
        .unwrap();

    // Only the target line changed on disk.
    let written = std::fs::read_to_string(root.join("variables.yaml")).unwrap();
    assert_eq!(written, "# Header\nfoo: bar\nnested:\n  key: new value\n");

    // The eager reload already reflects the new value.
    assert_eq!(
        cache.get(&project, "nested.key"),
        Some("new value".to_string())
    );
    assert_eq!(cache.get(&project, "foo"), Some("bar".to_string()));
}

/// Repeated loads of an unchanged project hit the memoized entry
#[tokio::test]
async fn test_repeated_loads_share_one_read() {
    let files = Arc::new(MemoryFiles::new());
    files.insert("/site/variables.yaml", "a: 1\n");
    let cache = VariableCache::new(
        Arc::clone(&files) as Arc<dyn FileAccess>,
        Arc::new(RecordingNotifier::new()),
    );
    let project = ProjectPaths {
        root: "/site".into(),
        data_file: "/site/variables.yaml".into(),
        config_file: None,
    };

    let first = cache.load_variables(&project).await.unwrap();
    let second = cache.load_variables(&project).await.unwrap();

    assert_eq!(files.read_count(), 1);
    assert_eq!(first.version, second.version);
}

/// Scanning a document and resolving its placeholders end to end
#[tokio::test]
async fn test_scan_and_resolve_document() {
    let files = Arc::new(MemoryFiles::new());
    files.insert(
        "/site/variables.yaml",
        "site:\n  title: Home\n  count: 3\n",
    );
    let cache = VariableCache::new(
        files as Arc<dyn FileAccess>,
        Arc::new(RecordingNotifier::new()),
    );
    let project = ProjectPaths {
        root: "/site".into(),
        data_file: "/site/variables.yaml".into(),
        config_file: None,
    };
    cache.load_variables(&project).await;

    let text = "Welcome to {{< var site.title >}}, {{< var site.count >}} pages, \
                {{< var site.missing >}} unknown.";
    let matches = scanner::find_all(text);
    assert_eq!(matches.len(), 3);

    let lookup = |key: &str| cache.get(&project, key);
    let decorations = build_decorations(&matches, text, 0, None, &lookup, true);

    assert_eq!(decorations.len(), 3);
    assert_eq!(
        decorations[0].kind,
        DecorationKind::Resolved {
            text: "Home".to_string()
        }
    );
    assert_eq!(
        decorations[1].kind,
        DecorationKind::Resolved {
            text: "3".to_string()
        }
    );
    assert!(matches!(
        decorations[2].kind,
        DecorationKind::Unresolved { .. }
    ));
}

/// External modification is picked up by push-based invalidation
#[tokio::test]
async fn test_external_change_invalidation() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::write(root.join("variables.yaml"), "version: 1\n").unwrap();

    let project = FsProjectResolver::default()
        .resolve(&root.join("doc.md"))
        .unwrap();
    let cache = VariableCache::new(Arc::new(LocalFiles), Arc::new(NullNotifier));
    cache.load_variables(&project).await.unwrap();
    assert_eq!(cache.get(&project, "version"), Some("1".to_string()));

    std::fs::write(root.join("variables.yaml"), "version: 2\n").unwrap();
    cache.invalidate(&project).await;

    assert_eq!(cache.get(&project, "version"), Some("2".to_string()));
}

/// The writer preserves comments, blank lines, and unrelated sections
#[test]
fn test_writer_preserves_file_texture() {
    let content = "# Main\n\nname: demo   # inline note\nflags: [a, b]\n\n# Extra\nextra:\n  deep: 1\n";
    let parsed = parse(content);

    let result = writer::update_variable(&parsed, "extra.deep", &VarValue::Bool(true)).unwrap();

    let expected = "# Main\n\nname: demo   # inline note\nflags: [a, b]\n\n# Extra\nextra:\n  deep: true\n";
    assert_eq!(result.text, expected);

    // Round trip: the new text parses back with the updated value.
    let reparsed = parse(&result.text);
    assert_eq!(reparsed.lookup("extra.deep"), Some("true".to_string()));
    assert_eq!(reparsed.lookup("name"), Some("demo".to_string()));
}

/// Tab-indented blocks round-trip structurally even though the strict
/// loader rejects them
#[test]
fn test_tab_indented_update_keeps_structure() {
    let content = "outer:\n\tinner: 1\n";
    let parsed = parse(content);

    let result =
        writer::update_variable(&parsed, "outer.inner", &VarValue::String("two".into())).unwrap();
    assert_eq!(result.text, "outer:\n\tinner: two\n");

    let reparsed = parse(&result.text);
    let outer = &reparsed.sections[0].nodes[0];
    assert_eq!(outer.children[0].value, VarValue::String("two".into()));
}

/// Adding a variable through the cache persists and reloads
#[tokio::test]
async fn test_add_variable_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::write(root.join("variables.yaml"), "# General\nname: demo\n").unwrap();

    let project = FsProjectResolver::default()
        .resolve(&root.join("doc.md"))
        .unwrap();
    let cache = VariableCache::new(Arc::new(LocalFiles), Arc::new(NullNotifier));

    cache
        .add_variable(&project, Some("General"), "motto", &VarValue::String("onward".into()))
        .await
        .unwrap();

    assert_eq!(cache.get(&project, "motto"), Some("onward".to_string()));
    let written = std::fs::read_to_string(root.join("variables.yaml")).unwrap();
    assert_eq!(written, "# General\nname: demo\nmotto: onward\n");
}

/// A broken variables file degrades to raw tokens instead of failing
#[tokio::test]
async fn test_invalid_data_degrades_gracefully() {
    let files = Arc::new(MemoryFiles::new());
    // Duplicate keys make the whole-file decode fail; the structural pass
    // still succeeds and lookups simply miss.
    files.insert("/p/variables.yaml", "a: 1\na: 2\n");
    let cache = VariableCache::new(
        files as Arc<dyn FileAccess>,
        Arc::new(RecordingNotifier::new()),
    );
    let project = ProjectPaths {
        root: "/p".into(),
        data_file: "/p/variables.yaml".into(),
        config_file: None,
    };

    let entry = cache.load_variables(&project).await;
    assert!(entry.is_some());
    assert_eq!(cache.get(&project, "a"), None);

    let structure = cache.get_structure(&project).unwrap();
    assert_eq!(structure.duplicates.len(), 1);

    // Documents still render: every match falls back to unresolved.
    let text = "{{< var a >}}";
    let matches = scanner::find_all(text);
    let lookup = |key: &str| cache.get(&project, key);
    let decorations = build_decorations(&matches, text, 0, None, &lookup, true);
    assert!(matches!(
        decorations[0].kind,
        DecorationKind::Unresolved { .. }
    ));
}
