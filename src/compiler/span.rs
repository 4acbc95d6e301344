//! Source ranges and offset → line/column mapping.

use serde::Serialize;

/// Char offset range in a source document, `start` inclusive, `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn len(self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }
}

/// Precomputed table of line start offsets for one document.
///
/// `\n`, `\r` and `\r\n` each count as a single line break.
#[derive(Debug, Clone)]
pub struct LineMap {
    starts: Vec<usize>,
}

impl LineMap {
    pub fn new(source: &str) -> Self {
        let mut starts = vec![0];
        let mut chars = source.chars().enumerate().peekable();
        while let Some((offset, ch)) = chars.next() {
            match ch {
                '\r' => {
                    if chars.peek().is_some_and(|&(_, next)| next == '\n') {
                        chars.next();
                        starts.push(offset + 2);
                    } else {
                        starts.push(offset + 1);
                    }
                }
                '\n' => starts.push(offset + 1),
                _ => {}
            }
        }
        Self { starts }
    }

    /// 1-based line number containing `offset`.
    pub fn line_of(&self, offset: usize) -> usize {
        match self.starts.binary_search(&offset) {
            Ok(index) => index + 1,
            Err(index) => index,
        }
    }

    /// 1-based `(line, column)` of `offset`.
    pub fn position(&self, offset: usize) -> (usize, usize) {
        let line = self.line_of(offset);
        let start = self.starts.get(line - 1).copied().unwrap_or(0);
        (line, offset - start + 1)
    }

    pub fn line_count(&self) -> usize {
        self.starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_covers_both() {
        let merged = Span::new(4, 6).merge(Span::new(1, 3));
        assert_eq!(merged, Span::new(1, 6));
        assert_eq!(merged.len(), 5);
    }

    #[test]
    fn line_map_handles_all_line_endings() {
        let map = LineMap::new("a\nb\r\nc\rd");
        assert_eq!(map.line_count(), 4);
        assert_eq!(map.position(0), (1, 1));
        assert_eq!(map.position(2), (2, 1));
        // "\r\n" is one break: 'c' sits at offset 5
        assert_eq!(map.position(5), (3, 1));
        assert_eq!(map.position(7), (4, 1));
    }

    #[test]
    fn column_within_line() {
        let map = LineMap::new("[proc,a]\n  return;");
        assert_eq!(map.position(11), (2, 3));
    }
}
