//! Buffered, random-access token sequence consumed by the parser.

use super::error::ErrorReporter;
use super::token::{Token, TokenKind};
use super::tokenizer::Tokenizer;

#[derive(Debug, Clone, Default)]
pub struct Lexer {
    tokens: Vec<Token>,
    cursor: usize,
}

impl Lexer {
    /// Drain `tokenizer` to the end of input, dropping comments.
    ///
    /// Lexical errors go to `reporter` and tokenizing continues past them
    /// unless the reporter halts.
    pub fn new(mut tokenizer: Tokenizer<'_>, reporter: &mut dyn ErrorReporter) -> Self {
        let mut tokens = Vec::new();
        loop {
            match tokenizer.parse() {
                Ok(Some(token)) => {
                    if token.kind != TokenKind::Comment {
                        tokens.push(token);
                    }
                }
                Ok(None) => break,
                Err(error) => {
                    reporter.report(error);
                    if reporter.halted() {
                        break;
                    }
                }
            }
        }
        Self::from_tokens(tokens)
    }

    pub fn from_tokens(tokens: Vec<Token>) -> Self {
        Self { tokens, cursor: 0 }
    }

    /// Consume the current token.
    pub fn take(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.cursor)?;
        self.cursor += 1;
        Some(token)
    }

    pub fn peek(&self) -> Option<&Token> {
        self.lookahead(0)
    }

    /// The token `n` positions past the current one.
    pub fn lookahead(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.cursor + n)
    }

    /// The last consumed token.
    pub fn previous(&self) -> Option<&Token> {
        self.cursor.checked_sub(1).and_then(|i| self.tokens.get(i))
    }

    pub fn remaining(&self) -> usize {
        self.tokens.len().saturating_sub(self.cursor)
    }

    /// End offset of the whole input, for spans at end of file.
    pub fn end_offset(&self) -> usize {
        self.tokens.last().map_or(0, |t| t.span.end)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::compiler::error::CollectingReporter;
    use crate::compiler::stream::CharStream;
    use crate::compiler::token::LexicalTable;

    fn lexer(source: &str) -> (Lexer, CollectingReporter) {
        let table = LexicalTable::default();
        let mut reporter = CollectingReporter::new();
        let lexer = Lexer::new(Tokenizer::new(&table, CharStream::new(source)), &mut reporter);
        (lexer, reporter)
    }

    #[test]
    fn comments_are_dropped() {
        let (lexer, _) = lexer("1 // one\n/* two */ 2");
        assert_eq!(lexer.remaining(), 2);
    }

    #[test]
    fn remaining_zero_iff_peek_none() {
        let (mut lexer, _) = lexer("a b");
        while lexer.remaining() > 0 {
            assert!(lexer.peek().is_some());
            lexer.take();
        }
        assert!(lexer.peek().is_none());
        assert!(lexer.take().is_none());
        assert_eq!(lexer.remaining(), 0);
    }

    #[test]
    fn lookahead_and_previous() {
        let (mut lexer, _) = lexer("[proc,a]");
        assert!(lexer.previous().is_none());
        assert_eq!(lexer.lookahead(3).unwrap().lexeme, "a");
        lexer.take();
        assert_eq!(lexer.previous().unwrap().kind, TokenKind::LBracket);
        assert_eq!(lexer.peek().unwrap().lexeme, "proc");
    }

    #[test]
    fn lexical_errors_do_not_stop_draining() {
        let (lexer, reporter) = lexer("1 ? 2 ? 3");
        assert_eq!(lexer.remaining(), 3);
        assert_eq!(reporter.errors().len(), 2);
    }
}
