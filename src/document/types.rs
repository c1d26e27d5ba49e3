//! Conversions between byte offsets and LSP positions.
//!
//! LSP positions count UTF-16 code units within a line; the core works on
//! byte offsets. Both directions go through the document's rope.

use std::ops::Deref;

use ropey::Rope;
use tower_lsp::lsp_types::{Position, Range};

use crate::syntax::SourceSpan;

/// A wrapper around `tower_lsp::lsp_types::Range` built from a byte span.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct LspRange(pub Range);

impl LspRange {
    pub fn from_span(rope: &Rope, span: SourceSpan) -> LspRange {
        Range {
            start: offset_to_position(rope, span.start),
            end: offset_to_position(rope, span.end),
        }
        .into()
    }
}

impl Deref for LspRange {
    type Target = Range;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Range> for LspRange {
    fn from(range: Range) -> Self {
        LspRange(range)
    }
}

impl From<LspRange> for Range {
    fn from(range: LspRange) -> Self {
        range.0
    }
}

/// Byte offset to LSP position. Offsets past the end clamp to the end.
pub fn offset_to_position(rope: &Rope, offset: usize) -> Position {
    let offset = offset.min(rope.len_bytes());
    // convert from byte offset to char offset
    let char_idx = rope.byte_to_char(offset);
    let line = rope.char_to_line(char_idx);
    let line_start = rope.line_to_char(line);
    let character = rope.char_to_utf16_cu(char_idx) - rope.char_to_utf16_cu(line_start);

    Position {
        line: line as u32,
        character: character as u32,
    }
}

/// LSP position to byte offset.
///
/// A character past the end of its line clamps to the end of the line, a
/// line past the end of the text clamps to the end of the text.
pub fn position_to_offset(rope: &Rope, position: Position) -> usize {
    let line = position.line as usize;
    if line >= rope.len_lines() {
        return rope.len_bytes();
    }

    let line_start = rope.line_to_char(line);
    let line_slice = rope.line(line);
    let mut line_len = line_slice.len_chars();
    while line_len > 0 && matches!(line_slice.char(line_len - 1), '\n' | '\r') {
        line_len -= 1;
    }

    let start_cu = rope.char_to_utf16_cu(line_start);
    let end_cu = rope.char_to_utf16_cu(line_start + line_len);
    let target_cu = (start_cu + position.character as usize).min(end_cu);
    rope.char_to_byte(rope.utf16_cu_to_char(target_cu))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_round_trip() {
        let rope = Rope::from_str("ab\ncd\n");
        let position = offset_to_position(&rope, 4);
        assert_eq!(position, Position { line: 1, character: 1 });
        assert_eq!(position_to_offset(&rope, position), 4);
    }

    /// Test: columns count UTF-16 code units, not bytes or chars
    #[test]
    fn utf16_columns() {
        // 'é' is 2 bytes / 1 unit, '😀' is 4 bytes / 2 units
        let text = "é😀x";
        let rope = Rope::from_str(text);
        let x = text.find('x').unwrap();
        assert_eq!(offset_to_position(&rope, x), Position { line: 0, character: 3 });
        assert_eq!(position_to_offset(&rope, Position { line: 0, character: 3 }), x);
    }

    #[test]
    fn clamps_past_line_end() {
        let rope = Rope::from_str("ab\r\ncd");
        assert_eq!(position_to_offset(&rope, Position { line: 0, character: 40 }), 2);
        assert_eq!(position_to_offset(&rope, Position { line: 9, character: 0 }), 6);
        assert_eq!(offset_to_position(&rope, 99), Position { line: 1, character: 2 });
    }

    #[test]
    fn range_from_span() {
        let rope = Rope::from_str("@prefix ex: <x> .\nex:a ex:b ex:c .");
        let range = LspRange::from_span(&rope, SourceSpan::new(18, 22));
        assert_eq!(range.start, Position { line: 1, character: 0 });
        assert_eq!(range.end, Position { line: 1, character: 4 });
    }
}
