//! Buffered character input for the tokenizer.

use thiserror::Error;

/// Returned by [`CharStream::take`] and [`CharStream::peek`] past the end.
pub const NULL: char = '\0';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("reset called without a preceding mark")]
    NoMark,
}

/// Random-access character buffer with a single mark.
#[derive(Debug, Clone)]
pub struct CharStream {
    chars: Vec<char>,
    position: usize,
    mark: Option<usize>,
}

impl CharStream {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            position: 0,
            mark: None,
        }
    }

    /// Consume and return the next character, or [`NULL`] at the end.
    pub fn take(&mut self) -> char {
        match self.chars.get(self.position) {
            Some(&ch) => {
                self.position += 1;
                ch
            }
            None => NULL,
        }
    }

    pub fn peek(&self) -> char {
        self.peek_at(0)
    }

    /// Look `distance` characters ahead without consuming.
    pub fn peek_at(&self, distance: usize) -> char {
        self.chars.get(self.position + distance).copied().unwrap_or(NULL)
    }

    pub fn mark(&mut self) {
        self.mark = Some(self.position);
    }

    /// Restore the marked position. The mark is consumed.
    pub fn reset(&mut self) -> Result<(), StreamError> {
        let mark = self.mark.take().ok_or(StreamError::NoMark)?;
        self.position = mark;
        Ok(())
    }

    /// Step back `count` characters, stopping at the start.
    pub fn rollback(&mut self, count: usize) {
        self.position = self.position.saturating_sub(count);
    }

    pub fn has_remaining(&self) -> bool {
        self.position < self.chars.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn take_past_end_returns_null() {
        let mut stream = CharStream::new("ab");
        assert_eq!(stream.take(), 'a');
        assert_eq!(stream.take(), 'b');
        assert!(!stream.has_remaining());
        assert_eq!(stream.take(), NULL);
        assert_eq!(stream.take(), NULL);
        assert_eq!(stream.peek(), NULL);
    }

    #[test]
    fn mark_then_reset_restores_once() {
        let mut stream = CharStream::new("hello");
        stream.take();
        stream.mark();
        stream.take();
        stream.take();
        stream.reset().unwrap();
        assert_eq!(stream.position(), 1);
        assert_eq!(stream.reset(), Err(StreamError::NoMark));
    }

    #[test]
    fn rollback_is_clamped() {
        let mut stream = CharStream::new("xyz");
        stream.take();
        stream.rollback(10);
        assert_eq!(stream.position(), 0);
        assert_eq!(stream.peek(), 'x');
    }

    #[test]
    fn peek_does_not_consume() {
        let stream = CharStream::new("ab");
        assert_eq!(stream.peek(), 'a');
        assert_eq!(stream.peek_at(1), 'b');
        assert_eq!(stream.peek_at(2), NULL);
        assert_eq!(stream.position(), 0);
    }
}
