use tracing::debug;

use super::ast::{NodeId, NodeKind, Operator, SyntaxTree};
use super::error::{CompileError, ErrorReporter};
use super::lexer::Lexer;
use super::span::Span;
use super::stream::CharStream;
use super::token::{LexicalTable, Token, TokenKind};
use super::tokenizer::Tokenizer;
use super::trigger::TriggerType;
use super::types::{PrimitiveType, Type};

type ParseResult<T> = Result<T, CompileError>;

/// Tokenize and parse `source` into a syntax tree.
///
/// Every lexical and syntax error goes to `reporter`; the returned tree holds
/// each script that parsed far enough to have a header.
pub fn parse_source(
    source: &str,
    table: &LexicalTable,
    reporter: &mut dyn ErrorReporter,
) -> SyntaxTree {
    let lexer = Lexer::new(Tokenizer::new(table, CharStream::new(source)), reporter);
    SyntaxParser::new(lexer, reporter).parse_file()
}

/// Recursive-descent parser over a buffered token sequence.
pub struct SyntaxParser<'r> {
    lexer: Lexer,
    tree: SyntaxTree,
    reporter: &'r mut dyn ErrorReporter,
}

impl<'r> SyntaxParser<'r> {
    pub fn new(lexer: Lexer, reporter: &'r mut dyn ErrorReporter) -> Self {
        Self {
            lexer,
            tree: SyntaxTree::new(),
            reporter,
        }
    }

    /// Parse every script until end of input.
    pub fn parse_file(mut self) -> SyntaxTree {
        while self.lexer.peek().is_some() && !self.reporter.halted() {
            let before = self.lexer.remaining();
            match self.script() {
                Ok(script) => self.tree.add_script(script),
                Err(error) => {
                    self.reporter.report(error);
                    if self.lexer.remaining() == before {
                        self.lexer.take();
                    }
                    while !is_script_end(self.peek_kind()) {
                        self.lexer.take();
                    }
                }
            }
        }
        debug!(scripts = self.tree.scripts().len(), "parsed source");
        self.tree
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn peek_kind(&self) -> Option<TokenKind> {
        self.lexer.peek().map(|t| t.kind)
    }

    fn peek_kind_at(&self, n: usize) -> Option<TokenKind> {
        self.lexer.lookahead(n).map(|t| t.kind)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn advance(&mut self) -> Option<Token> {
        self.lexer.take().cloned()
    }

    fn consume_if(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.lexer.take();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.at(kind) {
            if let Some(token) = self.advance() {
                return Ok(token);
            }
        }
        Err(self.unexpected(&kind.to_string()))
    }

    /// An identifier, or a keyword used where a plain name is expected.
    fn word(&mut self) -> ParseResult<Token> {
        match self.lexer.peek() {
            Some(token) if is_word(token.kind) => {
                let token = token.clone();
                self.lexer.take();
                Ok(token)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn unexpected(&self, expected: &str) -> CompileError {
        match self.lexer.peek() {
            Some(token) => CompileError::syntax(
                format!("Expected {expected}, got {}", describe(token)),
                token.span,
            ),
            None => {
                let end = self.lexer.end_offset();
                CompileError::syntax(
                    format!("Expected {expected}, got end of file"),
                    Span::new(end, end),
                )
            }
        }
    }

    fn start(&self) -> usize {
        self.lexer
            .peek()
            .map_or_else(|| self.lexer.end_offset(), |t| t.span.start)
    }

    fn span_from(&self, start: usize) -> Span {
        let end = self.lexer.previous().map_or(start, |t| t.span.end);
        Span::new(start, end.max(start))
    }

    fn node(
        &mut self,
        kind: NodeKind,
        span: Span,
        children: impl IntoIterator<Item = NodeId>,
    ) -> ParseResult<NodeId> {
        self.tree
            .build(kind, span, children)
            .map_err(|e| CompileError::syntax(e.to_string(), span))
    }

    // ── Scripts ───────────────────────────────────────────────────

    fn script(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        let mut header = Vec::new();
        while self.at(TokenKind::Hash) {
            header.push(self.annotation()?);
        }
        self.expect(TokenKind::LBracket)?;
        let trigger = self.word()?.lexeme;
        self.expect(TokenKind::Comma)?;
        let name = self.word()?.lexeme;
        self.expect(TokenKind::RBracket)?;

        // Up to two groups follow the header: parameters and return types,
        // in either order.
        let mut parameters = Vec::new();
        let mut return_type = None;
        for _ in 0..2 {
            if !self.consume_if(TokenKind::LParen) {
                break;
            }
            if self.consume_if(TokenKind::RParen) {
                continue;
            }
            if self.is_parameter() && parameters.is_empty() {
                parameters = self.parameters()?;
            } else if return_type.is_none() && !self.is_parameter() {
                return_type = Some(self.return_types()?);
            } else {
                return Err(self.unexpected("')'"));
            }
            self.expect(TokenKind::RParen)?;
        }
        header.extend(parameters);

        let body_start = self.start();
        let statements = self.statements(is_script_end);
        let body = self.node(NodeKind::Block, self.span_from(body_start), statements)?;
        header.push(body);

        let kind = NodeKind::Script {
            trigger,
            name,
            return_type: return_type.unwrap_or(Type::VOID),
        };
        self.node(kind, self.span_from(start), header)
    }

    fn annotation(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        self.expect(TokenKind::Hash)?;
        let name = self.word()?.lexeme;
        self.expect(TokenKind::Colon)?;
        let token = self.expect(TokenKind::Integer)?;
        let value = int_value(&token)?;
        self.node(NodeKind::Annotation { name, value }, self.span_from(start), [])
    }

    fn is_parameter(&self) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Type | TokenKind::ArrayType))
            && self.peek_kind_at(1) == Some(TokenKind::Dollar)
    }

    /// Array parameters are numbered by their position among the array
    /// parameters, which is the array slot they bind in the callee.
    fn parameters(&mut self) -> ParseResult<Vec<NodeId>> {
        let mut list = Vec::new();
        let mut arrays = 0;
        loop {
            let start = self.start();
            let ty = if self.at(TokenKind::ArrayType) {
                let element = self.array_type()?;
                arrays += 1;
                Type::ArrayReference {
                    element,
                    index: arrays - 1,
                }
            } else {
                Type::Primitive(self.primitive_type()?)
            };
            self.expect(TokenKind::Dollar)?;
            let name = self.word()?.lexeme;
            list.push(self.node(NodeKind::Parameter { ty, name }, self.span_from(start), [])?);
            if !self.consume_if(TokenKind::Comma) {
                return Ok(list);
            }
        }
    }

    fn return_types(&mut self) -> ParseResult<Type> {
        let mut types = vec![Type::Primitive(self.primitive_type()?)];
        while self.consume_if(TokenKind::Comma) {
            types.push(Type::Primitive(self.primitive_type()?));
        }
        Ok(Type::tuple(types))
    }

    fn array_type(&mut self) -> ParseResult<PrimitiveType> {
        let token = self.expect(TokenKind::ArrayType)?;
        token
            .lexeme
            .strip_suffix("array")
            .and_then(PrimitiveType::for_representation)
            .ok_or_else(|| {
                CompileError::syntax(format!("Unknown array type '{}'", token.lexeme), token.span)
            })
    }

    fn primitive_type(&mut self) -> ParseResult<PrimitiveType> {
        if !self.at(TokenKind::Type) {
            return Err(self.unexpected("type"));
        }
        let token = self.expect(TokenKind::Type)?;
        PrimitiveType::for_representation(&token.lexeme).ok_or_else(|| {
            CompileError::syntax(format!("Unknown type '{}'", token.lexeme), token.span)
        })
    }

    // ── Statements ────────────────────────────────────────────────

    /// Parse statements until `end` holds, recovering from errors at
    /// statement boundaries.
    fn statements(&mut self, end: fn(Option<TokenKind>) -> bool) -> Vec<NodeId> {
        let mut list = Vec::new();
        while !end(self.peek_kind()) && !self.reporter.halted() {
            let before = self.lexer.remaining();
            match self.statement() {
                Ok(statement) => list.push(statement),
                Err(error) => {
                    self.reporter.report(error);
                    self.recover_statement(before);
                }
            }
        }
        list
    }

    /// Skip past the next `;`, or up to a closing brace, case or script.
    fn recover_statement(&mut self, before: usize) {
        if self.lexer.remaining() == before
            && self.advance().is_some_and(|t| t.kind == TokenKind::Semicolon)
        {
            return;
        }
        while let Some(kind) = self.peek_kind() {
            match kind {
                TokenKind::Semicolon => {
                    self.lexer.take();
                    return;
                }
                TokenKind::RBrace | TokenKind::Case | TokenKind::LBracket | TokenKind::Hash => {
                    return;
                }
                _ => {
                    self.lexer.take();
                }
            }
        }
    }

    fn statement(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        match self.peek_kind() {
            Some(TokenKind::If) => self.if_statement(),
            Some(TokenKind::While) => self.while_statement(),
            Some(TokenKind::Do) => self.do_while_statement(),
            Some(kind @ (TokenKind::Break | TokenKind::Continue)) => {
                self.advance();
                self.expect(TokenKind::Semicolon)?;
                let node = if kind == TokenKind::Break {
                    NodeKind::Break
                } else {
                    NodeKind::Continue
                };
                self.node(node, self.span_from(start), [])
            }
            Some(TokenKind::LBrace) => self.block(),
            Some(TokenKind::Return) => self.return_statement(),
            Some(TokenKind::Define) => self.declaration(),
            Some(TokenKind::Switch) => self.switch_statement(),
            Some(TokenKind::Dollar | TokenKind::Percent) => self.assignment(),
            _ => {
                let expr = self.expression()?;
                self.expect(TokenKind::Semicolon)?;
                self.node(NodeKind::ExpressionStatement, self.span_from(start), [expr])
            }
        }
    }

    fn block(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        self.expect(TokenKind::LBrace)?;
        let statements = self.statements(|kind| {
            matches!(kind, Some(TokenKind::RBrace)) || is_script_end(kind)
        });
        self.expect(TokenKind::RBrace)?;
        self.node(NodeKind::Block, self.span_from(start), statements)
    }

    fn par_expression(&mut self) -> ParseResult<NodeId> {
        self.expect(TokenKind::LParen)?;
        let expr = self.expression()?;
        self.expect(TokenKind::RParen)?;
        Ok(expr)
    }

    fn if_statement(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        self.expect(TokenKind::If)?;
        let mut children = vec![self.par_expression()?, self.statement()?];
        if self.consume_if(TokenKind::Else) {
            children.push(self.statement()?);
        }
        self.node(NodeKind::If, self.span_from(start), children)
    }

    fn while_statement(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        self.expect(TokenKind::While)?;
        let condition = self.par_expression()?;
        let body = self.statement()?;
        self.node(NodeKind::While, self.span_from(start), [condition, body])
    }

    fn do_while_statement(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        self.expect(TokenKind::Do)?;
        let body = self.statement()?;
        self.expect(TokenKind::While)?;
        let condition = self.par_expression()?;
        self.expect(TokenKind::Semicolon)?;
        self.node(NodeKind::DoWhile, self.span_from(start), [body, condition])
    }

    fn return_statement(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        self.expect(TokenKind::Return)?;
        let mut values = Vec::new();
        if self.consume_if(TokenKind::LParen) && !self.consume_if(TokenKind::RParen) {
            values = self.expression_list()?;
            self.expect(TokenKind::RParen)?;
        }
        self.expect(TokenKind::Semicolon)?;
        self.node(NodeKind::Return, self.span_from(start), values)
    }

    fn declaration(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        let token = self.expect(TokenKind::Define)?;
        let ty = token
            .lexeme
            .strip_prefix("def_")
            .and_then(PrimitiveType::for_representation)
            .ok_or_else(|| {
                CompileError::syntax(format!("Unknown declaration type '{}'", token.lexeme), token.span)
            })?;
        if !self.consume_if(TokenKind::Dollar) {
            return Err(self.unexpected("a local variable name"));
        }
        let name = self.word()?.lexeme;
        if self.at(TokenKind::LParen) {
            let size = self.par_expression()?;
            self.expect(TokenKind::Semicolon)?;
            return self.node(
                NodeKind::ArrayDeclaration { ty, name },
                self.span_from(start),
                [size],
            );
        }
        let mut children = Vec::new();
        if self.consume_if(TokenKind::Equals) {
            children.push(self.expression()?);
        }
        self.expect(TokenKind::Semicolon)?;
        self.node(
            NodeKind::VariableDeclaration { ty, name },
            self.span_from(start),
            children,
        )
    }

    fn assignment(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        let mut children = vec![self.variable()?];
        while self.consume_if(TokenKind::Comma) {
            children.push(self.variable()?);
        }
        let targets = children.len();
        self.expect(TokenKind::Equals)?;
        children.extend(self.expression_list()?);
        self.expect(TokenKind::Semicolon)?;
        self.node(NodeKind::Assignment { targets }, self.span_from(start), children)
    }

    fn switch_statement(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        let token = self.expect(TokenKind::Switch)?;
        let ty = token
            .lexeme
            .strip_prefix("switch_")
            .and_then(PrimitiveType::for_representation)
            .ok_or_else(|| {
                CompileError::syntax(format!("Unknown switch type '{}'", token.lexeme), token.span)
            })?;
        let mut children = vec![self.par_expression()?];
        self.expect(TokenKind::LBrace)?;
        let mut has_default = false;
        while !self.consume_if(TokenKind::RBrace) {
            if !self.at(TokenKind::Case) {
                return Err(self.unexpected("'case' or '}'"));
            }
            let case = self.switch_case()?;
            if matches!(self.tree.kind(case), NodeKind::Case { is_default: true }) {
                if has_default {
                    self.reporter.report(CompileError::syntax(
                        "Switch statements can only have one default case defined",
                        self.tree.span(case),
                    ));
                }
                has_default = true;
            }
            children.push(case);
        }
        self.node(NodeKind::Switch { ty }, self.span_from(start), children)
    }

    fn switch_case(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        self.expect(TokenKind::Case)?;
        let is_default = self.consume_if(TokenKind::Default);
        let mut children = if is_default {
            Vec::new()
        } else {
            self.expression_list()?
        };
        self.expect(TokenKind::Colon)?;
        let body_start = self.start();
        let statements = self.statements(|kind| {
            matches!(kind, Some(TokenKind::Case | TokenKind::RBrace)) || is_script_end(kind)
        });
        children.push(self.node(NodeKind::Block, self.span_from(body_start), statements)?);
        self.node(NodeKind::Case { is_default }, self.span_from(start), children)
    }

    // ── Expressions (precedence climbing) ─────────────────────────

    pub fn expression(&mut self) -> ParseResult<NodeId> {
        self.binary(0)
    }

    fn binary(&mut self, min: u8) -> ParseResult<NodeId> {
        let start = self.start();
        let mut left = self.primary()?;
        while let Some(op) = self.peek_kind().and_then(Operator::for_token) {
            if op.precedence() < min {
                break;
            }
            self.advance();
            let right = self.binary(op.precedence() + 1)?;
            left = self.node(NodeKind::Binary { op }, self.span_from(start), [left, right])?;
        }
        Ok(left)
    }

    fn expression_list(&mut self) -> ParseResult<Vec<NodeId>> {
        let mut list = vec![self.expression()?];
        while self.consume_if(TokenKind::Comma) {
            list.push(self.expression()?);
        }
        Ok(list)
    }

    fn arguments(&mut self) -> ParseResult<Vec<NodeId>> {
        self.expect(TokenKind::LParen)?;
        if self.consume_if(TokenKind::RParen) {
            return Ok(Vec::new());
        }
        let list = self.expression_list()?;
        self.expect(TokenKind::RParen)?;
        Ok(list)
    }

    fn primary(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        let Some(kind) = self.peek_kind() else {
            return Err(self.unexpected("expression"));
        };
        match kind {
            TokenKind::LParen => self.par_expression(),
            TokenKind::Integer => {
                let token = self.expect(kind)?;
                let value = int_value(&token)?;
                self.node(NodeKind::IntLiteral(value), token.span, [])
            }
            TokenKind::Long => {
                let token = self.expect(kind)?;
                let value = parse_integer(&token.lexeme)
                    .and_then(|v| i64::try_from(v).ok())
                    .ok_or_else(|| out_of_range(&token, "long"))?;
                self.node(NodeKind::LongLiteral(value), token.span, [])
            }
            TokenKind::Coordgrid => {
                let token = self.expect(kind)?;
                let value = coordgrid_value(&token)?;
                self.node(NodeKind::CoordgridLiteral(value), token.span, [])
            }
            TokenKind::Bool => {
                let token = self.expect(kind)?;
                self.node(NodeKind::BoolLiteral(token.lexeme == "true"), token.span, [])
            }
            TokenKind::String => {
                let token = self.expect(kind)?;
                self.node(NodeKind::StringLiteral(token.lexeme), token.span, [])
            }
            TokenKind::ConcatBegin => self.concatenation(),
            TokenKind::Dollar | TokenKind::Percent => self.variable(),
            TokenKind::Caret => {
                self.advance();
                let name = self.word()?.lexeme;
                self.node(NodeKind::Constant { name }, self.span_from(start), [])
            }
            TokenKind::Calc => {
                self.advance();
                let inner = self.par_expression()?;
                self.node(NodeKind::Calc, self.span_from(start), [inner])
            }
            TokenKind::Dot => {
                self.advance();
                let name = self.word()?.lexeme;
                let args = if self.at(TokenKind::LParen) {
                    self.arguments()?
                } else {
                    Vec::new()
                };
                let command = NodeKind::Command {
                    name,
                    alternative: true,
                };
                self.node(command, self.span_from(start), args)
            }
            TokenKind::Identifier => {
                let name = self.word()?.lexeme;
                if self.at(TokenKind::LParen) {
                    let args = self.arguments()?;
                    let command = NodeKind::Command {
                        name,
                        alternative: false,
                    };
                    self.node(command, self.span_from(start), args)
                } else {
                    self.node(NodeKind::Dynamic { name }, self.span_from(start), [])
                }
            }
            _ => match TriggerType::for_operator(kind) {
                Some(trigger) => {
                    self.advance();
                    let name = self.word()?.lexeme;
                    let args = if self.at(TokenKind::LParen) {
                        self.arguments()?
                    } else {
                        Vec::new()
                    };
                    self.node(NodeKind::Call { trigger, name }, self.span_from(start), args)
                }
                None => Err(self.unexpected("expression")),
            },
        }
    }

    /// `$name`, `$name(index)` or `%name`.
    fn variable(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        if self.consume_if(TokenKind::Percent) {
            let name = self.word()?.lexeme;
            return self.node(NodeKind::GlobalVariable { name }, self.span_from(start), []);
        }
        if !self.consume_if(TokenKind::Dollar) {
            return Err(self.unexpected("variable"));
        }
        let name = self.word()?.lexeme;
        if self.at(TokenKind::LParen) {
            let index = self.par_expression()?;
            return self.node(NodeKind::ArrayElement { name }, self.span_from(start), [index]);
        }
        self.node(NodeKind::LocalVariable { name }, self.span_from(start), [])
    }

    fn concatenation(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        self.expect(TokenKind::ConcatBegin)?;
        let mut parts = Vec::new();
        while !self.consume_if(TokenKind::ConcatEnd) {
            if self.lexer.peek().is_none() {
                return Err(self.unexpected("end of interpolated string"));
            }
            if self.at(TokenKind::String) {
                let token = self.expect(TokenKind::String)?;
                parts.push(self.node(NodeKind::StringLiteral(token.lexeme), token.span, [])?);
            } else {
                parts.push(self.expression()?);
            }
        }
        self.node(NodeKind::Concat, self.span_from(start), parts)
    }
}

fn is_script_end(kind: Option<TokenKind>) -> bool {
    matches!(kind, None | Some(TokenKind::LBracket | TokenKind::Hash))
}

fn is_word(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Identifier
            | TokenKind::If
            | TokenKind::Else
            | TokenKind::While
            | TokenKind::Do
            | TokenKind::Return
            | TokenKind::Case
            | TokenKind::Default
            | TokenKind::Break
            | TokenKind::Continue
            | TokenKind::Calc
            | TokenKind::Define
            | TokenKind::Switch
            | TokenKind::Type
            | TokenKind::ArrayType
            | TokenKind::Bool
    )
}

fn describe(token: &Token) -> String {
    match token.kind {
        TokenKind::Identifier | TokenKind::Integer | TokenKind::Long => {
            format!("{} '{}'", token.kind, token.lexeme)
        }
        kind => kind.to_string(),
    }
}

/// Decimal or `0x` hexadecimal, with an optional leading `-`.
fn parse_integer(lexeme: &str) -> Option<i128> {
    let (negative, digits) = match lexeme.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, lexeme),
    };
    let value = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i128::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i128>().ok()?,
    };
    Some(if negative { -value } else { value })
}

fn int_value(token: &Token) -> ParseResult<i32> {
    parse_integer(&token.lexeme)
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| out_of_range(token, "int"))
}

fn out_of_range(token: &Token, ty: &str) -> CompileError {
    CompileError::syntax(
        format!("The literal {} of type {ty} is out of range", token.lexeme),
        token.span,
    )
}

/// Pack `level_x_y_tx_ty` into its 32-bit form.
fn coordgrid_value(token: &Token) -> ParseResult<i32> {
    const LIMITS: [(&str, i32); 5] = [
        ("level", 3),
        ("square-x", 127),
        ("square-y", 255),
        ("tile-x", 63),
        ("tile-y", 63),
    ];
    let parts: Vec<&str> = token.lexeme.split('_').collect();
    if parts.len() != LIMITS.len() {
        return Err(CompileError::syntax(
            "Expected 5 components for literal of type coordgrid",
            token.span,
        ));
    }
    let mut values = [0i32; 5];
    for ((slot, part), (label, max)) in values.iter_mut().zip(&parts).zip(LIMITS) {
        let value: i32 = part
            .parse()
            .map_err(|_| out_of_range(token, "coordgrid"))?;
        if !(0..=max).contains(&value) {
            return Err(CompileError::syntax(
                format!("Expected the {label} component value to be between [0-{max}] inclusively"),
                token.span,
            ));
        }
        *slot = value;
    }
    let [level, x, y, tile_x, tile_y] = values;
    Ok(level << 28 | x << 20 | y << 14 | tile_x << 6 | tile_y)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::compiler::error::CollectingReporter;

    fn parse_str(source: &str) -> (SyntaxTree, Vec<CompileError>) {
        let table = LexicalTable::default();
        let mut reporter = CollectingReporter::new();
        let tree = parse_source(source, &table, &mut reporter);
        (tree, reporter.take())
    }

    fn parse_ok(source: &str) -> SyntaxTree {
        let (tree, errors) = parse_str(source);
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        tree
    }

    /// The statements of the only script's body.
    fn body(tree: &SyntaxTree) -> Vec<NodeId> {
        let view = tree.script(tree.scripts()[0]).unwrap();
        tree.children(view.body.unwrap()).to_vec()
    }

    #[test]
    fn parse_empty_script() {
        let tree = parse_ok("[proc,test]");
        assert_eq!(tree.scripts().len(), 1);
        let view = tree.script(tree.scripts()[0]).unwrap();
        assert_eq!(view.trigger, "proc");
        assert_eq!(view.name, "test");
        assert!(view.return_type.is_void());
        assert!(tree.children(view.body.unwrap()).is_empty());
    }

    #[test]
    fn parse_header_groups_in_either_order() {
        let tree = parse_ok("[proc,a](int $x, string $s)(int, string) [proc,b](long)(int $y)");
        let a = tree.script(tree.scripts()[0]).unwrap();
        assert_eq!(a.parameters.len(), 2);
        assert_eq!(*a.return_type, Type::tuple([Type::INT, Type::STRING]));
        let b = tree.script(tree.scripts()[1]).unwrap();
        assert_eq!(b.parameters.len(), 1);
        assert_eq!(*b.return_type, Type::LONG);
    }

    #[test]
    fn parse_array_parameters() {
        let tree = parse_ok("[proc,a](int $n, intarray $arr, objarray $items)\n$arr(0) = 1;");
        let view = tree.script(tree.scripts()[0]).unwrap();
        let kinds: Vec<_> = view.parameters.iter().map(|&id| tree.kind(id).clone()).collect();
        assert_eq!(
            kinds[0],
            NodeKind::Parameter {
                ty: Type::INT,
                name: "n".into()
            }
        );
        assert!(matches!(
            &kinds[1],
            NodeKind::Parameter {
                ty: Type::ArrayReference { element: PrimitiveType::Int, index: 0 },
                name,
            } if name == "arr"
        ));
        assert!(matches!(
            &kinds[2],
            NodeKind::Parameter {
                ty: Type::ArrayReference { element: PrimitiveType::Obj, index: 1 },
                ..
            }
        ));
    }

    #[test]
    fn parse_annotations() {
        let tree = parse_ok("#id:12 #version:3 [clientscript,menu]");
        let view = tree.script(tree.scripts()[0]).unwrap();
        assert_eq!(view.annotations.len(), 2);
        assert_eq!(
            *tree.kind(view.annotations[0]),
            NodeKind::Annotation {
                name: "id".into(),
                value: 12
            }
        );
    }

    #[test]
    fn parse_precedence() {
        let tree = parse_ok("[proc,a] return(calc(1 + 2 * 3));");
        let ret = body(&tree)[0];
        let calc = tree.children(ret)[0];
        let sum = tree.children(calc)[0];
        assert_eq!(*tree.kind(sum), NodeKind::Binary { op: Operator::Add });
        let product = tree.children(sum)[1];
        assert_eq!(*tree.kind(product), NodeKind::Binary { op: Operator::Mul });
    }

    #[test]
    fn parse_logical_binds_looser_than_comparison() {
        let tree = parse_ok("[proc,a] if ($a = 1 & $b < 2 | $c) { return; }");
        let cond = tree.children(body(&tree)[0])[0];
        assert_eq!(*tree.kind(cond), NodeKind::Binary { op: Operator::Or });
        let and = tree.children(cond)[0];
        assert_eq!(*tree.kind(and), NodeKind::Binary { op: Operator::And });
    }

    #[test]
    fn parse_modulo_after_operand() {
        let tree = parse_ok("[proc,a] return(calc(9 % 6));");
        let calc = tree.children(body(&tree)[0])[0];
        let op = tree.children(calc)[0];
        assert_eq!(*tree.kind(op), NodeKind::Binary { op: Operator::Mod });
    }

    #[test]
    fn parse_statements() {
        let source = r#"[proc,a]
def_int $i = 0;
def_int $arr(10);
while ($i < 10) {
    $arr($i) = $i;
    $i = calc($i + 1);
    if ($i = 5) break; else continue;
}
do { $i = 0; } while ($i > 0);
%counter, $i = 1, 2;
switch_int ($i) {
    case 1, 2: mes("low");
    case default: mes("<$i> high");
}
~other($i);
return;
"#;
        let tree = parse_ok(source);
        let kinds: Vec<_> = body(&tree).iter().map(|&id| tree.kind(id).clone()).collect();
        assert!(matches!(kinds[0], NodeKind::VariableDeclaration { ty: PrimitiveType::Int, .. }));
        assert!(matches!(kinds[1], NodeKind::ArrayDeclaration { .. }));
        assert_eq!(kinds[2], NodeKind::While);
        assert_eq!(kinds[3], NodeKind::DoWhile);
        assert_eq!(kinds[4], NodeKind::Assignment { targets: 2 });
        assert!(matches!(kinds[5], NodeKind::Switch { ty: PrimitiveType::Int }));
        assert_eq!(kinds[6], NodeKind::ExpressionStatement);
        assert_eq!(kinds[7], NodeKind::Return);
    }

    #[test]
    fn parse_switch_cases() {
        let tree = parse_ok("[proc,a](int $x) switch_int ($x) { case 1, 2: return; case default: }");
        let switch = body(&tree)[0];
        let children = tree.children(switch);
        assert_eq!(children.len(), 3);
        let first = children[1];
        assert_eq!(*tree.kind(first), NodeKind::Case { is_default: false });
        // two keys and the body block
        assert_eq!(tree.children(first).len(), 3);
        assert_eq!(*tree.kind(children[2]), NodeKind::Case { is_default: true });
    }

    #[test]
    fn parse_calls_and_references() {
        let tree = parse_ok("[proc,a] ~b(1, \"x\"); @c; .cmd(^max, coins, %var);");
        let stmts = body(&tree);
        let call = tree.children(stmts[0])[0];
        assert_eq!(
            *tree.kind(call),
            NodeKind::Call {
                trigger: TriggerType::Proc,
                name: "b".into()
            }
        );
        assert_eq!(tree.children(call).len(), 2);
        let jump = tree.children(stmts[1])[0];
        assert!(matches!(tree.kind(jump), NodeKind::Call { trigger: TriggerType::Label, .. }));
        let command = tree.children(stmts[2])[0];
        assert!(matches!(tree.kind(command), NodeKind::Command { alternative: true, .. }));
        let args: Vec<_> = tree.children(command).iter().map(|&id| tree.kind(id).clone()).collect();
        assert_eq!(args[0], NodeKind::Constant { name: "max".into() });
        assert_eq!(args[1], NodeKind::Dynamic { name: "coins".into() });
        assert_eq!(args[2], NodeKind::GlobalVariable { name: "var".into() });
    }

    #[test]
    fn parse_literals() {
        let tree = parse_ok("[proc,a] return(0x10, 5L, true, 0_50_50_22_22, -3);");
        let values: Vec<_> = tree
            .children(body(&tree)[0])
            .iter()
            .map(|&id| tree.kind(id).clone())
            .collect();
        assert_eq!(values[0], NodeKind::IntLiteral(16));
        assert_eq!(values[1], NodeKind::LongLiteral(5));
        assert_eq!(values[2], NodeKind::BoolLiteral(true));
        assert_eq!(
            values[3],
            NodeKind::CoordgridLiteral(50 << 20 | 50 << 14 | 22 << 6 | 22)
        );
        assert_eq!(values[4], NodeKind::IntLiteral(-3));
    }

    #[test]
    fn coordgrid_component_out_of_range() {
        let (_, errors) = parse_str("[proc,a] return(4_0_0_0_0);");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("level"));
    }

    #[test]
    fn int_literal_out_of_range() {
        let (_, errors) = parse_str("[proc,a] return(4294967296);");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("out of range"));
    }

    #[test]
    fn parse_concatenation() {
        let tree = parse_ok("[proc,a] mes(\"a<$x>b<~c>\");");
        let command = tree.children(body(&tree)[0])[0];
        let concat = tree.children(command)[0];
        assert_eq!(*tree.kind(concat), NodeKind::Concat);
        assert_eq!(tree.children(concat).len(), 4);
    }

    #[test]
    fn statement_errors_recover_at_semicolon() {
        let (tree, errors) = parse_str("[proc,a] $x = ; $y = 1; ) ; $z = 2;");
        assert_eq!(errors.len(), 2);
        let view = tree.script(tree.scripts()[0]).unwrap();
        // `$y = 1;` and `$z = 2;` survive
        assert_eq!(tree.children(view.body.unwrap()).len(), 2);
    }

    #[test]
    fn header_errors_skip_to_next_script() {
        let (tree, errors) = parse_str("[proc a] return; [proc,b] return;");
        assert_eq!(errors.len(), 1);
        assert_eq!(tree.scripts().len(), 1);
        assert_eq!(tree.script(tree.scripts()[0]).unwrap().name, "b");
    }

    #[test]
    fn duplicate_default_case() {
        let (_, errors) = parse_str("[proc,a](int $x) switch_int ($x) { case default: case default: }");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("one default case"));
    }

    #[test]
    fn every_child_reports_its_parent() {
        let tree = parse_ok("[proc,a](int $x) if ($x > 1) { return; } else { $x = calc($x * 2); }");
        for &script in tree.scripts() {
            let mut stack = vec![script];
            while let Some(id) = stack.pop() {
                for &child in tree.children(id) {
                    assert_eq!(tree.parent(child), Some(id));
                    stack.push(child);
                }
            }
        }
    }

    #[test]
    fn fail_fast_stops_after_first_error() {
        use crate::compiler::error::FailFastReporter;
        let table = LexicalTable::default();
        let mut reporter = FailFastReporter::new();
        let tree = parse_source("[proc,a] ) ; ) ; [proc,b]", &table, &mut reporter);
        assert!(reporter.halted());
        assert!(tree.scripts().len() <= 1);
        assert!(reporter.into_result().is_err());
    }
}
