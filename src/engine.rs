//! Live decoration engine.
//!
//! Per-view scheduling around the pure decoration computation. Each view
//! moves through Idle → ScanRequested → (immediate | scroll-debounced) →
//! Rebuilding → Idle; a newer scheduling request replaces the pending timer
//! rather than queueing behind it, which is the engine's only cancellation
//! mechanism. File loads triggered from here always run in the background;
//! the interactive path never blocks on I/O.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::AbortHandle;
use tower_lsp::lsp_types::Url;

use crate::cache::VariableCache;
use crate::project::ProjectPaths;
use crate::providers::decorations::{Decoration, build_decorations};
use crate::scanner::ViewportScanner;

/// Delay applied to scroll-driven rebuilds while the project's values are
/// not cached yet. Cached lookups are cheap enough to apply every frame, so
/// the debounce collapses to immediate once values are loaded.
pub const SCROLL_DEBOUNCE: Duration = Duration::from_millis(100);

/// What triggered a rebuild request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewEvent {
    /// The document content changed.
    Edited,
    /// The selection or cursor moved.
    SelectionMoved,
    /// Only the visible range changed.
    Scrolled,
    /// The variable cache was reloaded.
    CacheChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    ScanRequested,
    Rebuilding,
}

/// Everything a rebuild needs, captured at scheduling time. The newest
/// scheduled context wins.
#[derive(Debug, Clone)]
pub struct RebuildContext {
    pub view: Url,
    /// Text of the currently visible range only, never the whole document.
    pub viewport_text: String,
    /// Byte offset of the viewport within the full document.
    pub viewport_offset: usize,
    /// Absolute cursor offset, when known.
    pub cursor: Option<usize>,
    pub project: Option<ProjectPaths>,
    pub highlight_unresolved: bool,
}

/// Host-side callback invoked after a view's decoration set was replaced.
pub trait DecorationHost: Send + Sync {
    fn decorations_updated(&self, view: &Url);
}

#[derive(Default)]
struct ViewState {
    decorations: Vec<Decoration>,
    pending: Option<AbortHandle>,
    /// Cache version observed at the last completed rebuild.
    seen_version: u64,
    phase: Phase,
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Idle
    }
}

pub struct DecorationEngine {
    cache: Arc<VariableCache>,
    scanner: ViewportScanner,
    views: DashMap<Url, ViewState>,
    host: Arc<dyn DecorationHost>,
    scroll_debounce_ms: AtomicU64,
}

impl DecorationEngine {
    pub fn new(cache: Arc<VariableCache>, host: Arc<dyn DecorationHost>) -> Self {
        Self {
            cache,
            scanner: ViewportScanner::new(),
            views: DashMap::new(),
            host,
            scroll_debounce_ms: AtomicU64::new(SCROLL_DEBOUNCE.as_millis() as u64),
        }
    }

    /// Override the scroll debounce; applied from configuration.
    pub fn set_scroll_debounce(&self, debounce: Duration) {
        self.scroll_debounce_ms
            .store(debounce.as_millis() as u64, Ordering::Relaxed);
    }

    /// Current decoration set for a view, ordered and non-overlapping.
    pub fn decorations(&self, view: &Url) -> Vec<Decoration> {
        self.views
            .get(view)
            .map(|v| v.decorations.clone())
            .unwrap_or_default()
    }

    /// Forget a closed view and its cached viewport spans.
    pub fn drop_view(&self, view: &Url) {
        if let Some((_, mut state)) = self.views.remove(view)
            && let Some(pending) = state.pending.take()
        {
            pending.abort();
        }
        self.scanner.invalidate(view.as_str());
    }

    /// Request a rebuild for `ctx.view`.
    ///
    /// Edits and selection changes rebuild immediately (coalescing only
    /// same-tick events). Viewport-only changes are debounced while the
    /// project's values are uncached. A cache-version change observed here
    /// forces an immediate pass regardless of the event type.
    pub fn schedule(self: Arc<Self>, ctx: RebuildContext, event: ViewEvent) {
        let delay = self.delay_for(&ctx, event);
        let scroll_only = event == ViewEvent::Scrolled;
        let view = ctx.view.clone();

        let engine = Arc::clone(&self);
        let task = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            engine.rebuild(ctx, scroll_only).await;
        });

        let mut state = self.views.entry(view).or_default();
        if let Some(previous) = state.pending.replace(task.abort_handle()) {
            previous.abort();
        }
        state.phase = Phase::ScanRequested;
    }

    fn delay_for(&self, ctx: &RebuildContext, event: ViewEvent) -> Duration {
        let version_changed = self
            .views
            .get(&ctx.view)
            .map(|v| v.seen_version != self.cache.current_version())
            .unwrap_or(false);

        match event {
            ViewEvent::Edited | ViewEvent::SelectionMoved | ViewEvent::CacheChanged => {
                Duration::ZERO
            }
            ViewEvent::Scrolled => {
                let cached = ctx
                    .project
                    .as_ref()
                    .is_some_and(|p| self.cache.is_loaded(p));
                if cached || version_changed {
                    Duration::ZERO
                } else {
                    Duration::from_millis(self.scroll_debounce_ms.load(Ordering::Relaxed))
                }
            }
        }
    }

    async fn rebuild(self: Arc<Self>, ctx: RebuildContext, scroll_only: bool) {
        if let Some(mut state) = self.views.get_mut(&ctx.view) {
            tracing::trace!("rebuild for {} ({:?} -> Rebuilding)", ctx.view, state.phase);
            state.phase = Phase::Rebuilding;
        }

        // Spans cached for previous viewport windows are not valid offsets
        // for this one.
        if scroll_only {
            self.scanner.evict_others(ctx.view.as_str());
        }

        let matches =
            self.scanner
                .scan(ctx.view.as_str(), &ctx.viewport_text, ctx.viewport_offset);

        let decorations = match &ctx.project {
            Some(project) if self.cache.is_loaded(project) => {
                let lookup = |key: &str| self.cache.get(project, key);
                build_decorations(
                    &matches,
                    &ctx.viewport_text,
                    ctx.viewport_offset,
                    ctx.cursor,
                    &lookup,
                    ctx.highlight_unresolved,
                )
            }
            Some(project) => {
                // Values not cached yet: load in the background, keep the
                // existing decorations in place until the load lands, then
                // schedule a fresh pass.
                let engine = Arc::clone(&self);
                let project = project.clone();
                let retry = ctx.clone();
                tokio::spawn(async move {
                    if engine.cache.load_variables(&project).await.is_some() {
                        Arc::clone(&engine).schedule(retry, ViewEvent::CacheChanged);
                    }
                });
                if let Some(mut state) = self.views.get_mut(&ctx.view) {
                    state.phase = Phase::Idle;
                }
                return;
            }
            None => {
                // No project for this view: render every match flagged
                // rather than silently hiding it.
                build_decorations(
                    &matches,
                    &ctx.viewport_text,
                    ctx.viewport_offset,
                    ctx.cursor,
                    &|_| None,
                    true,
                )
            }
        };

        let version = self.cache.current_version();
        {
            let mut state = self.views.entry(ctx.view.clone()).or_default();
            state.decorations = decorations;
            state.seen_version = version;
            state.phase = Phase::Idle;
        }
        self.host.decorations_updated(&ctx.view);
    }
}
