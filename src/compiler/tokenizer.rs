//! Turns a [`CharStream`] into [`Token`]s one at a time.
//!
//! String interpolation is handled with a mode stack: `<` inside a string
//! pushes an interpolation mode in which regular tokens are produced until
//! the matching `>`, after which scanning of the string resumes.

use std::collections::VecDeque;

use super::error::CompileError;
use super::span::Span;
use super::stream::{CharStream, NULL};
use super::token::{LexicalTable, Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Inside an interpolated string, between `>` and the next `<` or `"`.
    String,
    /// Inside `<...>` of an interpolated string.
    Interpolation,
}

/// How a string segment ended.
enum Terminator {
    Quote,
    Interpolation,
}

struct Segment {
    text: String,
    span: Span,
    terminator: Terminator,
    error: Option<CompileError>,
}

pub struct Tokenizer<'t> {
    table: &'t LexicalTable,
    stream: CharStream,
    modes: Vec<Mode>,
    pending: VecDeque<Token>,
    /// Kind of the last significant token, for telling `-1` from `a - 1`.
    last: Option<TokenKind>,
}

impl<'t> Tokenizer<'t> {
    pub fn new(table: &'t LexicalTable, stream: CharStream) -> Self {
        Self {
            table,
            stream,
            modes: Vec::new(),
            pending: VecDeque::new(),
            last: None,
        }
    }

    /// Produce the next token, `Ok(None)` at end of input.
    ///
    /// After an `Err` the offending input has been skipped, so calling again
    /// continues with the rest of the source.
    pub fn parse(&mut self) -> Result<Option<Token>, CompileError> {
        let token = match self.pending.pop_front() {
            Some(token) => Some(token),
            None => {
                if self.modes.last() == Some(&Mode::String) {
                    self.resume_string()?;
                    self.pending.pop_front()
                } else {
                    self.next_token()?
                }
            }
        };
        if let Some(token) = &token {
            if token.kind != TokenKind::Comment {
                self.last = Some(token.kind);
            }
        }
        Ok(token)
    }

    fn next_token(&mut self) -> Result<Option<Token>, CompileError> {
        self.skip_whitespace();
        let start = self.stream.position();
        if !self.stream.has_remaining() {
            if self.modes.is_empty() {
                return Ok(None);
            }
            self.modes.clear();
            return Err(CompileError::lexical(
                "Unterminated string interpolation",
                Span::new(start, start),
            ));
        }

        let ch = self.stream.peek();
        let next = self.stream.peek_at(1);
        match ch {
            '/' if next == '/' => Ok(Some(self.line_comment(start))),
            '/' if next == '*' => self.block_comment(start).map(Some),
            '"' => {
                self.stream.take();
                self.open_string(start)?;
                Ok(self.pending.pop_front())
            }
            '>' if self.modes.last() == Some(&Mode::Interpolation) => {
                self.stream.take();
                self.modes.pop();
                self.resume_string()?;
                Ok(self.pending.pop_front())
            }
            c if c.is_ascii_digit() => self.number(start).map(Some),
            '-' | '+'
                if next.is_ascii_digit() && !self.last.is_some_and(TokenKind::ends_operand) =>
            {
                self.number(start).map(Some)
            }
            c if is_identifier_start(c) => Ok(Some(self.identifier(start))),
            c => {
                if let Some(kind) = self.table.separator(c) {
                    self.stream.take();
                    return Ok(Some(self.token(kind, start, c.to_string())));
                }
                let lookahead = [c, next];
                if let Some((len, kind)) = self.table.operator(&lookahead) {
                    let mut lexeme = String::new();
                    for _ in 0..len {
                        lexeme.push(self.stream.take());
                    }
                    return Ok(Some(self.token(kind, start, lexeme)));
                }
                self.stream.take();
                Err(CompileError::lexical(
                    format!("Unexpected character '{c}'"),
                    self.span_from(start),
                ))
            }
        }
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn skip_whitespace(&mut self) {
        while self.stream.has_remaining() && self.stream.peek().is_whitespace() {
            self.stream.take();
        }
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(start, self.stream.position())
    }

    fn token(&self, kind: TokenKind, start: usize, lexeme: impl Into<String>) -> Token {
        Token::new(kind, self.span_from(start), lexeme)
    }

    // ── Comments ──────────────────────────────────────────────────

    fn line_comment(&mut self, start: usize) -> Token {
        self.stream.take();
        self.stream.take();
        let mut text = String::new();
        while self.stream.has_remaining() && !matches!(self.stream.peek(), '\n' | '\r') {
            text.push(self.stream.take());
        }
        self.token(TokenKind::Comment, start, text)
    }

    fn block_comment(&mut self, start: usize) -> Result<Token, CompileError> {
        self.stream.take();
        self.stream.take();
        let mut text = String::new();
        loop {
            if !self.stream.has_remaining() {
                return Err(CompileError::lexical(
                    "Unterminated block comment",
                    self.span_from(start),
                ));
            }
            let ch = self.stream.take();
            if ch == '*' && self.stream.peek() == '/' {
                self.stream.take();
                return Ok(self.token(TokenKind::Comment, start, text));
            }
            text.push(ch);
        }
    }

    // ── Strings ───────────────────────────────────────────────────

    /// Called after the opening quote has been consumed.
    fn open_string(&mut self, start: usize) -> Result<(), CompileError> {
        let segment = self.string_segment(start)?;
        match segment.terminator {
            Terminator::Quote => {
                self.pending
                    .push_back(Token::new(TokenKind::String, segment.span, segment.text));
            }
            Terminator::Interpolation => {
                self.pending.push_back(Token::new(
                    TokenKind::ConcatBegin,
                    Span::new(start, start + 1),
                    "\"",
                ));
                self.push_segment(segment.text, segment.span);
                self.modes.push(Mode::String);
                self.modes.push(Mode::Interpolation);
            }
        }
        segment.error.map_or(Ok(()), Err)
    }

    /// Continue an interpolated string after its `>`.
    fn resume_string(&mut self) -> Result<(), CompileError> {
        let start = self.stream.position();
        let segment = match self.string_segment(start) {
            Ok(segment) => segment,
            Err(e) => {
                self.modes.pop();
                return Err(e);
            }
        };
        let end = segment.span.end;
        self.push_segment(segment.text, segment.span);
        match segment.terminator {
            Terminator::Quote => {
                self.modes.pop();
                self.pending.push_back(Token::new(
                    TokenKind::ConcatEnd,
                    Span::new(end.saturating_sub(1), end),
                    "\"",
                ));
            }
            Terminator::Interpolation => self.modes.push(Mode::Interpolation),
        }
        segment.error.map_or(Ok(()), Err)
    }

    fn push_segment(&mut self, text: String, span: Span) {
        if !text.is_empty() {
            self.pending.push_back(Token::new(TokenKind::String, span, text));
        }
    }

    /// Scan string content up to a closing quote or an interpolation opener.
    ///
    /// A bad escape does not stop the scan; it is handed back in
    /// [`Segment::error`] once the segment is complete.
    fn string_segment(&mut self, start: usize) -> Result<Segment, CompileError> {
        let mut text = String::new();
        let mut error = None;
        let terminator = loop {
            if !self.stream.has_remaining() || matches!(self.stream.peek(), '\n' | '\r') {
                return Err(CompileError::lexical(
                    "Unterminated string literal",
                    self.span_from(start),
                ));
            }
            match self.stream.take() {
                '"' => break Terminator::Quote,
                '<' => break Terminator::Interpolation,
                '\\' => {
                    let escape_start = self.stream.position() - 1;
                    let escaped = self.stream.peek();
                    if let Some(ch) = unescape(escaped) {
                        self.stream.take();
                        text.push(ch);
                    } else if escaped != NULL && escaped != '\n' {
                        self.stream.take();
                        error.get_or_insert(CompileError::lexical(
                            format!("Invalid escape sequence '\\{escaped}'"),
                            self.span_from(escape_start),
                        ));
                    }
                }
                ch => text.push(ch),
            }
        };
        Ok(Segment {
            text,
            span: self.span_from(start),
            terminator,
            error,
        })
    }

    // ── Numbers and identifiers ───────────────────────────────────

    fn number(&mut self, start: usize) -> Result<Token, CompileError> {
        let mut text = String::new();
        match self.stream.peek() {
            '-' => text.push(self.stream.take()),
            '+' => {
                self.stream.take();
            }
            _ => {}
        }
        let mut kind = TokenKind::Integer;
        if self.stream.peek() == '0' && matches!(self.stream.peek_at(1), 'x' | 'X') {
            text.push(self.stream.take());
            text.push(self.stream.take());
            let digits = self.take_while(|c| c.is_ascii_hexdigit());
            if digits.is_empty() {
                return Err(CompileError::lexical(
                    "Expected hexadecimal digits after '0x'",
                    self.span_from(start),
                ));
            }
            text.push_str(&digits);
        } else {
            text.push_str(&self.take_while(|c| c.is_ascii_digit()));
            while self.stream.peek() == '_' && self.stream.peek_at(1).is_ascii_digit() {
                kind = TokenKind::Coordgrid;
                text.push(self.stream.take());
                text.push_str(&self.take_while(|c| c.is_ascii_digit()));
            }
        }
        if kind == TokenKind::Integer && matches!(self.stream.peek(), 'L' | 'l') {
            self.stream.take();
            kind = TokenKind::Long;
        }
        if is_identifier_part(self.stream.peek()) {
            self.take_while(is_identifier_part);
            return Err(CompileError::lexical(
                "Malformed number literal",
                self.span_from(start),
            ));
        }
        Ok(self.token(kind, start, text))
    }

    fn identifier(&mut self, start: usize) -> Token {
        let text = self.take_while(is_identifier_part);
        let kind = self.table.keyword(&text).unwrap_or(TokenKind::Identifier);
        self.token(kind, start, text)
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut text = String::new();
        while self.stream.has_remaining() && pred(self.stream.peek()) {
            text.push(self.stream.take());
        }
        text
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_identifier_part(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn unescape(c: char) -> Option<char> {
    match c {
        'b' => Some('\u{8}'),
        't' => Some('\t'),
        'n' => Some('\n'),
        'f' => Some('\u{c}'),
        '"' => Some('"'),
        '\\' => Some('\\'),
        '<' => Some('<'),
        '>' => Some('>'),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        let table = LexicalTable::default();
        let mut tokenizer = Tokenizer::new(&table, CharStream::new(source));
        let mut out = Vec::new();
        while let Some(token) = tokenizer.parse().unwrap() {
            out.push(token);
        }
        out
    }

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokens(source).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn script_header() {
        assert_eq!(
            kinds("[proc,test](int $a)"),
            vec![
                TokenKind::LBracket,
                TokenKind::Identifier,
                TokenKind::Comma,
                TokenKind::Identifier,
                TokenKind::RBracket,
                TokenKind::LParen,
                TokenKind::Type,
                TokenKind::Dollar,
                TokenKind::Identifier,
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn escapes_map_exactly() {
        let toks = tokens(r#""\< \> \b \t \n \f \" \\""#);
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].kind, TokenKind::String);
        assert_eq!(toks[0].lexeme, "< > \u{8} \t \n \u{c} \" \\");
    }

    #[test]
    fn interpolation_produces_concat_markers() {
        let toks = tokens(r#""a <$x> b""#);
        let kinds: Vec<_> = toks.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::ConcatBegin,
                TokenKind::String,
                TokenKind::Dollar,
                TokenKind::Identifier,
                TokenKind::String,
                TokenKind::ConcatEnd,
            ]
        );
        assert_eq!(toks[1].lexeme, "a ");
        assert_eq!(toks[4].lexeme, " b");
    }

    #[test]
    fn interpolation_can_nest_strings() {
        assert_eq!(
            kinds(r#""<"in">""#),
            vec![TokenKind::ConcatBegin, TokenKind::String, TokenKind::ConcatEnd]
        );
    }

    #[test]
    fn comments_are_surfaced() {
        let toks = tokens("// line\n/* block */ 5");
        assert_eq!(toks[0].kind, TokenKind::Comment);
        assert_eq!(toks[0].lexeme, " line");
        assert_eq!(toks[1].kind, TokenKind::Comment);
        assert_eq!(toks[2].kind, TokenKind::Integer);
    }

    #[test]
    fn numbers() {
        let toks = tokens("12 0x1F 5L -3 0_50_50_22_22");
        assert_eq!(toks[0].kind, TokenKind::Integer);
        assert_eq!(toks[1].lexeme, "0x1F");
        assert_eq!(toks[2].kind, TokenKind::Long);
        assert_eq!(toks[2].lexeme, "5");
        assert_eq!(toks[3].lexeme, "-3");
        assert_eq!(toks[4].kind, TokenKind::Coordgrid);
    }

    #[test]
    fn minus_after_operand_is_an_operator() {
        assert_eq!(
            kinds("1 -3"),
            vec![TokenKind::Integer, TokenKind::Minus, TokenKind::Integer]
        );
    }

    #[test]
    fn plus_sign_glues_to_digits() {
        let toks = tokens("+5 +0x10");
        assert_eq!(toks[0].kind, TokenKind::Integer);
        assert_eq!(toks[0].lexeme, "5");
        assert_eq!(toks[0].span, Span::new(0, 2));
        assert_eq!(toks[1].lexeme, "0x10");
        assert_eq!(
            kinds("1 +3"),
            vec![TokenKind::Integer, TokenKind::Plus, TokenKind::Integer]
        );
    }

    #[test]
    fn keywords_and_operators() {
        assert_eq!(
            kinds("if ($a >= 3 & true) def_int"),
            vec![
                TokenKind::If,
                TokenKind::LParen,
                TokenKind::Dollar,
                TokenKind::Identifier,
                TokenKind::Ge,
                TokenKind::Integer,
                TokenKind::And,
                TokenKind::Bool,
                TokenKind::RParen,
                TokenKind::Define,
            ]
        );
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let table = LexicalTable::default();
        let mut tokenizer = Tokenizer::new(&table, CharStream::new("\"abc"));
        assert!(tokenizer.parse().is_err());
        assert!(tokenizer.parse().unwrap().is_none());
    }

    #[test]
    fn unterminated_comment_is_an_error() {
        let table = LexicalTable::default();
        let mut tokenizer = Tokenizer::new(&table, CharStream::new("/* abc"));
        let error = tokenizer.parse().unwrap_err();
        assert_eq!(error.message, "Unterminated block comment");
    }

    #[test]
    fn invalid_escape_is_reported_after_scanning() {
        let table = LexicalTable::default();
        let mut tokenizer = Tokenizer::new(&table, CharStream::new("\"a\\qb\" 4"));
        let error = tokenizer.parse().unwrap_err();
        assert_eq!(error.message, "Invalid escape sequence '\\q'");
        let string = tokenizer.parse().unwrap().unwrap();
        assert_eq!(string.kind, TokenKind::String);
        assert_eq!(string.lexeme, "ab");
        assert_eq!(tokenizer.parse().unwrap().unwrap().kind, TokenKind::Integer);
    }

    #[test]
    fn unexpected_character_is_skipped() {
        let table = LexicalTable::default();
        let mut tokenizer = Tokenizer::new(&table, CharStream::new("? 1"));
        let error = tokenizer.parse().unwrap_err();
        assert_eq!(error.span, Span::new(0, 1));
        assert_eq!(tokenizer.parse().unwrap().unwrap().kind, TokenKind::Integer);
    }
}
