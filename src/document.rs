//! Per-document state tracked by the backend.

use crate::project::ProjectPaths;

pub struct DocumentState {
    /// Full document text (FULL sync).
    pub text: String,
    /// Project governing this document, when one resolved.
    pub project: Option<ProjectPaths>,
    /// Last reported visible range, as byte offsets into `text`.
    pub viewport: Option<(usize, usize)>,
    /// Last reported cursor position, as an absolute byte offset.
    pub cursor: Option<usize>,
}

impl DocumentState {
    pub fn new(text: String, project: Option<ProjectPaths>) -> Self {
        Self {
            text,
            project,
            viewport: None,
            cursor: None,
        }
    }

    /// Text of the visible range and its offset, falling back to the whole
    /// document when the host has not reported a viewport yet.
    pub fn viewport_slice(&self) -> (&str, usize) {
        match self.viewport {
            Some((start, end)) => {
                let start = start.min(self.text.len());
                let end = end.clamp(start, self.text.len());
                (&self.text[start..end], start)
            }
            None => (&self.text, 0),
        }
    }
}
