//! Line/column bookkeeping for document text
//!
//! Positions follow the protocol convention: zero-based line, zero-based
//! character counted in UTF-16 code units.

use tower_lsp::lsp_types::{Position, Range};

/// A zero-based line/character pair as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct LinePosition {
    pub line: u32,
    pub character: u32,
}

impl LinePosition {
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// A half-open span between two engine positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct LineSpan {
    pub start: LinePosition,
    pub end: LinePosition,
}

impl LineSpan {
    pub const fn new(start: LinePosition, end: LinePosition) -> Self {
        Self { start, end }
    }

    /// One-character span at the very start of a document.
    pub const fn document_start() -> Self {
        Self::new(LinePosition::new(0, 0), LinePosition::new(0, 1))
    }
}

// Engine and protocol share the same coordinate system, so these are field copies.
impl From<LinePosition> for Position {
    fn from(pos: LinePosition) -> Self {
        Position::new(pos.line, pos.character)
    }
}

impl From<Position> for LinePosition {
    fn from(pos: Position) -> Self {
        LinePosition::new(pos.line, pos.character)
    }
}

impl From<LineSpan> for Range {
    fn from(span: LineSpan) -> Self {
        Range::new(span.start.into(), span.end.into())
    }
}

impl From<Range> for LineSpan {
    fn from(range: Range) -> Self {
        LineSpan::new(range.start.into(), range.end.into())
    }
}

/// Byte offsets of line starts for a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            line_starts,
            len: text.len(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Converts a position into a byte offset.
    ///
    /// Returns `None` when the line does not exist. A character past the end
    /// of its line is clamped to the line end.
    pub fn offset(&self, text: &str, pos: LinePosition) -> Option<usize> {
        let line = pos.line as usize;
        let start = *self.line_starts.get(line)?;
        let end = self.line_end(text, line);

        let mut units = 0u32;
        for (i, ch) in text[start..end].char_indices() {
            if units >= pos.character {
                return Some(start + i);
            }
            units += ch.len_utf16() as u32;
        }
        Some(end)
    }

    /// Converts a byte offset into a position. Offsets past the end clamp to
    /// the end of the text.
    pub fn position(&self, text: &str, offset: usize) -> LinePosition {
        let offset = offset.min(self.len);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let start = self.line_starts[line];
        let character: usize = text[start..offset].chars().map(char::len_utf16).sum();
        LinePosition::new(line as u32, character as u32)
    }

    pub fn span(&self, text: &str, start: usize, end: usize) -> LineSpan {
        LineSpan::new(self.position(text, start), self.position(text, end))
    }

    /// Byte offset just past the last character of `line`, excluding the
    /// line terminator.
    fn line_end(&self, text: &str, line: usize) -> usize {
        let next = self
            .line_starts
            .get(line + 1)
            .copied()
            .unwrap_or(self.len);
        let bytes = text.as_bytes();
        let mut end = next;
        if end > self.line_starts[line] && bytes.get(end - 1) == Some(&b'\n') {
            end -= 1;
        }
        if end > self.line_starts[line] && bytes.get(end - 1) == Some(&b'\r') {
            end -= 1;
        }
        end
    }
}
