//! Placeholder token scanner.
//!
//! Finds `{{< var dotted.key >}}` tokens in document text. Pure text
//! matching, no dependencies on the rest of the core; the viewport-scoped
//! variant adds a bounded result cache keyed by view, invalidated by a
//! content hash of the viewport's text.

use std::collections::{HashMap, VecDeque};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{LazyLock, Mutex};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Token grammar: two opening braces, optional whitespace, `<`, optional
/// whitespace, the literal tag word `var` (case-sensitive), required
/// whitespace, a single key token, optional whitespace, `>`, optional
/// whitespace, two closing braces.
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*<\s*var\s+([A-Za-z0-9_.]+)\s*>\s*\}\}").expect("placeholder pattern")
});

/// A placeholder token found in document text.
///
/// Offsets are byte positions into the scanned text; `to` is the end of the
/// token. Produced transiently, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderMatch {
    pub from: usize,
    pub to: usize,
    /// The dotted key embedded in the token.
    pub key: String,
}

impl PlaceholderMatch {
    fn offset_by(&self, offset: usize) -> PlaceholderMatch {
        PlaceholderMatch {
            from: self.from + offset,
            to: self.to + offset,
            key: self.key.clone(),
        }
    }
}

/// Find every placeholder token in `text`, in order.
///
/// Matches whose embedded key violates the dotted-key rules are dropped
/// entirely rather than reported with a bad key.
pub fn find_all(text: &str) -> Vec<PlaceholderMatch> {
    PLACEHOLDER
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let key = caps.get(1)?.as_str();
            is_valid_key(key).then(|| PlaceholderMatch {
                from: whole.start(),
                to: whole.end(),
                key: key.to_string(),
            })
        })
        .collect()
}

/// Return the match whose span contains `position`, inclusive on both ends.
pub fn match_at(text: &str, position: usize) -> Option<PlaceholderMatch> {
    find_all(text)
        .into_iter()
        .find(|m| m.from <= position && position <= m.to)
}

/// Whether `key` is a well-formed dotted identifier.
///
/// Non-empty, letters/digits/underscore/dot only, no leading, trailing, or
/// doubled dot. Usable independently of scanning.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        && !key.starts_with('.')
        && !key.ends_with('.')
        && !key.contains("..")
}

/// Bound on cached viewports; oldest entries are dropped first.
const VIEWPORT_CACHE_CAPACITY: usize = 32;

struct CachedScan {
    hash: u64,
    /// Matches relative to the viewport start.
    matches: Vec<PlaceholderMatch>,
}

#[derive(Default)]
struct ScanCache {
    entries: HashMap<String, CachedScan>,
    order: VecDeque<String>,
}

/// Range-scoped scanner memoizing the last result per viewport key.
pub struct ViewportScanner {
    cache: Mutex<ScanCache>,
    capacity: usize,
}

impl Default for ViewportScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewportScanner {
    pub fn new() -> Self {
        Self::with_capacity(VIEWPORT_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(ScanCache::default()),
            capacity,
        }
    }

    /// Scan a viewport's text, returning spans shifted by `offset` so they
    /// are absolute within the full document.
    pub fn scan(&self, view: &str, text: &str, offset: usize) -> Vec<PlaceholderMatch> {
        let hash = content_hash(text);
        let mut cache = self.lock();

        if let Some(entry) = cache.entries.get(view)
            && entry.hash == hash
        {
            return entry.matches.iter().map(|m| m.offset_by(offset)).collect();
        }

        let matches = find_all(text);

        if !cache.entries.contains_key(view) {
            cache.order.push_back(view.to_string());
            if cache.order.len() > self.capacity
                && let Some(oldest) = cache.order.pop_front()
            {
                cache.entries.remove(&oldest);
            }
        }
        cache.entries.insert(
            view.to_string(),
            CachedScan {
                hash,
                matches: matches.clone(),
            },
        );

        matches.into_iter().map(|m| m.offset_by(offset)).collect()
    }

    /// Drop cached spans for every viewport except `keep`.
    ///
    /// Offsets from a previous viewport window are not guaranteed valid for
    /// a new one, so scroll-driven rebuilds clear stale entries first.
    pub fn evict_others(&self, keep: &str) {
        let mut cache = self.lock();
        cache.entries.retain(|view, _| view == keep);
        cache.order.retain(|view| view == keep);
    }

    /// Drop the cached spans for one viewport.
    pub fn invalidate(&self, view: &str) {
        let mut cache = self.lock();
        cache.entries.remove(view);
        cache.order.retain(|v| v != view);
    }

    pub fn clear(&self) {
        let mut cache = self.lock();
        cache.entries.clear();
        cache.order.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScanCache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[cfg(test)]
    fn cached_views(&self) -> usize {
        self.lock().entries.len()
    }
}

fn content_hash(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}
