//! Per-rebuild decoration computation.
//!
//! Pure function from scanned matches and a value lookup to the ordered,
//! non-overlapping set of replacement spans for the current viewport. The
//! scheduling around it lives in [`crate::engine`].

use serde::{Deserialize, Serialize};

use crate::scanner::PlaceholderMatch;

/// One "replace span `[from, to)` with computed display text" instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decoration {
    pub from: usize,
    pub to: usize,
    /// The dotted key the span referenced.
    pub key: String,
    pub kind: DecorationKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DecorationKind {
    /// The key resolved; show this text in place of the token.
    Resolved { text: String },
    /// The key did not resolve; show the raw token, visually flagged.
    Unresolved { raw: String },
}

/// Compute decorations for one viewport.
///
/// A match whose span contains the cursor (inclusive on both ends) is left
/// raw so the user always sees editable syntax under the caret. Unresolved
/// keys yield a flagged decoration only when `highlight_unresolved` is set;
/// otherwise the raw text shows through untouched.
pub fn build_decorations(
    matches: &[PlaceholderMatch],
    viewport_text: &str,
    viewport_offset: usize,
    cursor: Option<usize>,
    lookup: &dyn Fn(&str) -> Option<String>,
    highlight_unresolved: bool,
) -> Vec<Decoration> {
    matches
        .iter()
        .filter(|m| !cursor.is_some_and(|pos| m.from <= pos && pos <= m.to))
        .filter_map(|m| {
            let kind = match lookup(&m.key) {
                Some(text) => DecorationKind::Resolved { text },
                None if highlight_unresolved => DecorationKind::Unresolved {
                    raw: raw_token(viewport_text, viewport_offset, m),
                },
                None => return None,
            };
            Some(Decoration {
                from: m.from,
                to: m.to,
                key: m.key.clone(),
                kind,
            })
        })
        .collect()
}

fn raw_token(viewport_text: &str, viewport_offset: usize, m: &PlaceholderMatch) -> String {
    let start = m.from.saturating_sub(viewport_offset);
    let end = m.to.saturating_sub(viewport_offset).min(viewport_text.len());
    viewport_text.get(start..end).unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::find_all;

    fn lookup_site(key: &str) -> Option<String> {
        (key == "site.title").then(|| "Home".to_string())
    }

    #[test]
    fn test_resolved_match_becomes_replacement() {
        let text = "see {{< var site.title >}} here";
        let matches = find_all(text);
        let decorations = build_decorations(&matches, text, 0, None, &lookup_site, false);

        assert_eq!(decorations.len(), 1);
        assert_eq!(decorations[0].key, "site.title");
        assert_eq!(
            decorations[0].kind,
            DecorationKind::Resolved {
                text: "Home".to_string()
            }
        );
    }

    #[test]
    fn test_cursor_inside_span_suppresses_decoration() {
        let text = "{{< var site.title >}}";
        let matches = find_all(text);

        for pos in [0, 5, text.len()] {
            let decorations =
                build_decorations(&matches, text, 0, Some(pos), &lookup_site, false);
            assert!(decorations.is_empty(), "cursor at {pos} not suppressed");
        }

        let outside = build_decorations(
            &matches,
            text,
            0,
            Some(text.len() + 1),
            &lookup_site,
            false,
        );
        assert_eq!(outside.len(), 1);
    }

    #[test]
    fn test_unresolved_with_highlighting_keeps_raw_text() {
        let text = "{{< var missing.key >}}";
        let matches = find_all(text);
        let decorations = build_decorations(&matches, text, 0, None, &lookup_site, true);

        assert_eq!(decorations.len(), 1);
        assert_eq!(
            decorations[0].kind,
            DecorationKind::Unresolved {
                raw: text.to_string()
            }
        );
    }

    #[test]
    fn test_unresolved_without_highlighting_yields_nothing() {
        let text = "{{< var missing.key >}}";
        let matches = find_all(text);
        let decorations = build_decorations(&matches, text, 0, None, &lookup_site, false);
        assert!(decorations.is_empty());
    }

    #[test]
    fn test_spans_ordered_and_non_overlapping() {
        let text = "{{< var site.title >}} mid {{< var site.title >}}";
        let matches = find_all(text);
        let decorations = build_decorations(&matches, text, 0, None, &lookup_site, false);

        assert_eq!(decorations.len(), 2);
        assert!(decorations[0].to <= decorations[1].from);
    }

    #[test]
    fn test_viewport_offset_maps_raw_text() {
        let viewport = "{{< var missing.key >}}";
        let offset = 500;
        let matches = crate::scanner::ViewportScanner::new().scan("v", viewport, offset);
        let decorations =
            build_decorations(&matches, viewport, offset, None, &lookup_site, true);

        assert_eq!(decorations[0].from, 500);
        assert_eq!(
            decorations[0].kind,
            DecorationKind::Unresolved {
                raw: viewport.to_string()
            }
        );
    }
}
