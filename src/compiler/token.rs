//! Token kinds and the table of registered keywords, separators and operators.

use std::collections::HashMap;
use std::fmt;

use super::span::Span;
use super::types::PrimitiveType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Literals
    Identifier,
    Integer,
    Long,
    String,
    Bool,
    Coordgrid,
    /// Opens an interpolated string.
    ConcatBegin,
    /// Closes an interpolated string.
    ConcatEnd,

    // Keywords
    If,
    Else,
    While,
    Do,
    Return,
    Case,
    Default,
    Break,
    Continue,
    Calc,
    /// `def_<type>`
    Define,
    /// `switch_<type>`
    Switch,
    /// A declarable type name.
    Type,
    /// `<type>array`
    ArrayType,

    // Separators
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Semicolon,
    Dollar,
    Percent,
    Caret,
    Hash,
    Dot,
    Tilde,
    At,

    // Operators
    Equals,
    Excl,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
    Plus,
    Minus,
    Star,
    Slash,

    Comment,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Identifier => "identifier",
            Self::Integer => "integer",
            Self::Long => "long",
            Self::String => "string",
            Self::Bool => "boolean",
            Self::Coordgrid => "coordgrid",
            Self::ConcatBegin => "string interpolation",
            Self::ConcatEnd => "end of interpolated string",
            Self::If => "'if'",
            Self::Else => "'else'",
            Self::While => "'while'",
            Self::Do => "'do'",
            Self::Return => "'return'",
            Self::Case => "'case'",
            Self::Default => "'default'",
            Self::Break => "'break'",
            Self::Continue => "'continue'",
            Self::Calc => "'calc'",
            Self::Define => "variable definition",
            Self::Switch => "switch",
            Self::Type => "type",
            Self::ArrayType => "array type",
            Self::LParen => "'('",
            Self::RParen => "')'",
            Self::LBracket => "'['",
            Self::RBracket => "']'",
            Self::LBrace => "'{'",
            Self::RBrace => "'}'",
            Self::Comma => "','",
            Self::Colon => "':'",
            Self::Semicolon => "';'",
            Self::Dollar => "'$'",
            Self::Percent => "'%'",
            Self::Caret => "'^'",
            Self::Hash => "'#'",
            Self::Dot => "'.'",
            Self::Tilde => "'~'",
            Self::At => "'@'",
            Self::Equals => "'='",
            Self::Excl => "'!'",
            Self::Lt => "'<'",
            Self::Gt => "'>'",
            Self::Le => "'<='",
            Self::Ge => "'>='",
            Self::And => "'&'",
            Self::Or => "'|'",
            Self::Plus => "'+'",
            Self::Minus => "'-'",
            Self::Star => "'*'",
            Self::Slash => "'/'",
            Self::Comment => "comment",
            Self::Eof => "end of file",
        };
        f.write_str(text)
    }
}

impl TokenKind {
    /// Whether a token of this kind can be the last token of an operand.
    ///
    /// Used to tell a negative literal (`-5`) from a subtraction (`a -5`).
    pub fn ends_operand(self) -> bool {
        matches!(
            self,
            Self::Identifier
                | Self::Integer
                | Self::Long
                | Self::String
                | Self::Bool
                | Self::Coordgrid
                | Self::ConcatEnd
                | Self::RParen
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub lexeme: String,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span, lexeme: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            lexeme: lexeme.into(),
        }
    }
}

/// Registered keywords, separators and operators of the language.
#[derive(Debug, Clone)]
pub struct LexicalTable {
    keywords: HashMap<String, TokenKind>,
    separators: HashMap<char, TokenKind>,
    /// Kept sorted longest first so lookups take the longest match.
    operators: Vec<(String, TokenKind)>,
}

impl LexicalTable {
    pub fn empty() -> Self {
        Self {
            keywords: HashMap::new(),
            separators: HashMap::new(),
            operators: Vec::new(),
        }
    }

    pub fn register_keyword(&mut self, word: impl Into<String>, kind: TokenKind) {
        self.keywords.insert(word.into(), kind);
    }

    pub fn register_separator(&mut self, ch: char, kind: TokenKind) {
        self.separators.insert(ch, kind);
    }

    pub fn register_operator(&mut self, text: impl Into<String>, kind: TokenKind) {
        let text = text.into();
        self.operators.retain(|(existing, _)| *existing != text);
        self.operators.push((text, kind));
        self.operators
            .sort_by(|(a, _), (b, _)| b.chars().count().cmp(&a.chars().count()));
    }

    pub fn keyword(&self, word: &str) -> Option<TokenKind> {
        self.keywords.get(word).copied()
    }

    pub fn separator(&self, ch: char) -> Option<TokenKind> {
        self.separators.get(&ch).copied()
    }

    /// Longest registered operator that `text` starts with.
    pub fn operator(&self, text: &[char]) -> Option<(usize, TokenKind)> {
        self.operators.iter().find_map(|(op, kind)| {
            let len = op.chars().count();
            let matches = text.len() >= len && op.chars().zip(text).all(|(a, &b)| a == b);
            matches.then_some((len, *kind))
        })
    }

    pub fn is_operator_start(&self, ch: char) -> bool {
        self.operators.iter().any(|(op, _)| op.starts_with(ch))
    }
}

impl Default for LexicalTable {
    /// The standard language table.
    fn default() -> Self {
        let mut table = Self::empty();
        for (word, kind) in [
            ("if", TokenKind::If),
            ("else", TokenKind::Else),
            ("while", TokenKind::While),
            ("do", TokenKind::Do),
            ("return", TokenKind::Return),
            ("case", TokenKind::Case),
            ("default", TokenKind::Default),
            ("break", TokenKind::Break),
            ("continue", TokenKind::Continue),
            ("calc", TokenKind::Calc),
            ("true", TokenKind::Bool),
            ("false", TokenKind::Bool),
        ] {
            table.register_keyword(word, kind);
        }
        for ty in PrimitiveType::ALL.into_iter().filter(|ty| ty.is_declarable()) {
            let name = ty.representation();
            table.register_keyword(name, TokenKind::Type);
            table.register_keyword(format!("{name}array"), TokenKind::ArrayType);
            table.register_keyword(format!("def_{name}"), TokenKind::Define);
            table.register_keyword(format!("switch_{name}"), TokenKind::Switch);
        }
        for (ch, kind) in [
            ('(', TokenKind::LParen),
            (')', TokenKind::RParen),
            ('[', TokenKind::LBracket),
            (']', TokenKind::RBracket),
            ('{', TokenKind::LBrace),
            ('}', TokenKind::RBrace),
            (',', TokenKind::Comma),
            (':', TokenKind::Colon),
            (';', TokenKind::Semicolon),
            ('$', TokenKind::Dollar),
            ('%', TokenKind::Percent),
            ('^', TokenKind::Caret),
            ('#', TokenKind::Hash),
            ('.', TokenKind::Dot),
            ('~', TokenKind::Tilde),
            ('@', TokenKind::At),
        ] {
            table.register_separator(ch, kind);
        }
        for (op, kind) in [
            ("=", TokenKind::Equals),
            ("!", TokenKind::Excl),
            ("<", TokenKind::Lt),
            (">", TokenKind::Gt),
            ("<=", TokenKind::Le),
            (">=", TokenKind::Ge),
            ("&", TokenKind::And),
            ("|", TokenKind::Or),
            ("+", TokenKind::Plus),
            ("-", TokenKind::Minus),
            ("*", TokenKind::Star),
            ("/", TokenKind::Slash),
        ] {
            table.register_operator(op, kind);
        }
        table
    }
}
