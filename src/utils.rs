//! Common helpers shared across the server implementation.

use tower_lsp::lsp_types::Position;

/// Convert a byte offset into an LSP position (UTF-16 line/character).
pub fn offset_to_position(text: &str, offset: usize) -> Position {
    let clamped = offset.min(text.len());
    let mut line = 0u32;
    let mut line_start = 0usize;
    for (idx, ch) in text.char_indices() {
        if idx >= clamped {
            break;
        }
        if ch == '\n' {
            line += 1;
            line_start = idx + 1;
        }
    }
    let character = text[line_start..clamped]
        .chars()
        .map(|c| c.len_utf16() as u32)
        .sum();
    Position { line, character }
}

/// Convert an LSP position into a byte offset, clamping past-end positions.
pub fn position_to_offset(text: &str, position: Position) -> usize {
    let mut current_line = 0u32;
    let mut offset = 0usize;
    for line in text.split_inclusive('\n') {
        if current_line == position.line {
            let mut character = position.character;
            for (idx, ch) in line.char_indices() {
                if character == 0 || ch == '\n' {
                    return offset + idx;
                }
                character = character.saturating_sub(ch.len_utf16() as u32);
            }
            return offset + line.len();
        }
        offset += line.len();
        current_line += 1;
    }
    text.len()
}

/// Shorten a label to at most `max_chars` characters, ellipsis included.
pub fn ellipsize(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let keep = max_chars.saturating_sub(1);
    let mut out: String = s.chars().take(keep).collect();
    out.push('…');
    out
}
