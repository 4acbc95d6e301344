//! Arena syntax tree for script source.
//!
//! Nodes live in one `Vec` and refer to each other through [`NodeId`].
//! Children keep syntactic order; every inserted child records its parent.

use serde::Serialize;
use thiserror::Error;

use super::span::Span;
use super::symbol::Symbol;
use super::token::TokenKind;
use super::trigger::TriggerType;
use super::types::{PrimitiveType, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ── Operators ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Operator {
    Or,
    And,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorClass {
    Logical,
    Equality,
    Relational,
    Arithmetic,
}

impl Operator {
    pub fn for_token(kind: TokenKind) -> Option<Operator> {
        let op = match kind {
            TokenKind::Or => Self::Or,
            TokenKind::And => Self::And,
            TokenKind::Equals => Self::Equal,
            TokenKind::Excl => Self::NotEqual,
            TokenKind::Lt => Self::Less,
            TokenKind::Gt => Self::Greater,
            TokenKind::Le => Self::LessEqual,
            TokenKind::Ge => Self::GreaterEqual,
            TokenKind::Plus => Self::Add,
            TokenKind::Minus => Self::Sub,
            TokenKind::Star => Self::Mul,
            TokenKind::Slash => Self::Div,
            TokenKind::Percent => Self::Mod,
            _ => return None,
        };
        Some(op)
    }

    /// Binding strength, higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            Self::Or => 0,
            Self::And => 1,
            Self::Equal | Self::NotEqual => 2,
            Self::Less | Self::Greater | Self::LessEqual | Self::GreaterEqual => 3,
            Self::Add | Self::Sub => 4,
            Self::Mul | Self::Div | Self::Mod => 5,
        }
    }

    pub fn class(self) -> OperatorClass {
        match self {
            Self::Or | Self::And => OperatorClass::Logical,
            Self::Equal | Self::NotEqual => OperatorClass::Equality,
            Self::Less | Self::Greater | Self::LessEqual | Self::GreaterEqual => {
                OperatorClass::Relational
            }
            Self::Add | Self::Sub | Self::Mul | Self::Div | Self::Mod => OperatorClass::Arithmetic,
        }
    }

    /// Comparisons are relational or equality tests.
    pub fn is_comparison(self) -> bool {
        matches!(self.class(), OperatorClass::Equality | OperatorClass::Relational)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Or => "|",
            Self::And => "&",
            Self::Equal => "=",
            Self::NotEqual => "!",
            Self::Less => "<",
            Self::Greater => ">",
            Self::LessEqual => "<=",
            Self::GreaterEqual => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
        }
    }
}

// ── Nodes ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum NodeKind {
    /// Children: annotations, parameters, then the body block.
    Script {
        trigger: String,
        name: String,
        return_type: Type,
    },
    /// `ty` is a primitive or an array reference.
    Parameter {
        ty: Type,
        name: String,
    },
    /// `#name:value`
    Annotation {
        name: String,
        value: i32,
    },

    BoolLiteral(bool),
    IntLiteral(i32),
    LongLiteral(i64),
    StringLiteral(String),
    /// Packed `level_x_y_tx_ty`.
    CoordgridLiteral(i32),

    /// `$name`
    LocalVariable {
        name: String,
    },
    /// `$name(index)`; child: index.
    ArrayElement {
        name: String,
    },
    /// `%name`
    GlobalVariable {
        name: String,
    },
    /// `^name`
    Constant {
        name: String,
    },
    /// Bare identifier: a config reference or an argument-less command.
    Dynamic {
        name: String,
    },
    /// Children: left, right.
    Binary {
        op: Operator,
    },
    /// Child: the wrapped arithmetic expression.
    Calc,
    /// Script invocation through a trigger operator; children: arguments.
    Call {
        trigger: TriggerType,
        name: String,
    },
    /// Children: arguments.
    Command {
        name: String,
        alternative: bool,
    },
    /// Interpolated string; children: parts in order.
    Concat,

    Block,
    /// Children: condition, then-branch, optional else-branch.
    If,
    /// Children: condition, body.
    While,
    /// Children: body, condition.
    DoWhile,
    Break,
    Continue,
    /// Children: returned expressions.
    Return,
    /// Child: optional initialiser.
    VariableDeclaration {
        ty: PrimitiveType,
        name: String,
    },
    /// Child: size expression.
    ArrayDeclaration {
        ty: PrimitiveType,
        name: String,
    },
    /// `$a, %b = x, y;` children: the `targets` variables, then the values.
    Assignment {
        targets: usize,
    },
    /// Children: scrutinee, cases.
    Switch {
        ty: PrimitiveType,
    },
    /// Children: keys, then the body block.
    Case {
        is_default: bool,
    },
    /// Child: the evaluated expression.
    ExpressionStatement,
}

impl NodeKind {
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            Self::Block
                | Self::If
                | Self::While
                | Self::DoWhile
                | Self::Break
                | Self::Continue
                | Self::Return
                | Self::VariableDeclaration { .. }
                | Self::ArrayDeclaration { .. }
                | Self::Assignment { .. }
                | Self::Switch { .. }
                | Self::ExpressionStatement
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Inferred type, set by the semantic checker.
    pub ty: Option<Type>,
    /// Resolved symbol, set by the semantic checker.
    pub symbol: Option<Symbol>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("node {child:?} already has parent {parent:?}")]
    AlreadyParented { child: NodeId, parent: NodeId },
    #[error("inserting {child:?} under {parent:?} would create a cycle")]
    Cycle { child: NodeId, parent: NodeId },
    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),
}

/// Borrowed view of a script node's parts.
#[derive(Debug, Clone)]
pub struct ScriptView<'a> {
    pub id: NodeId,
    pub trigger: &'a str,
    pub name: &'a str,
    pub return_type: &'a Type,
    pub annotations: Vec<NodeId>,
    pub parameters: Vec<NodeId>,
    pub body: Option<NodeId>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyntaxTree {
    nodes: Vec<Node>,
    scripts: Vec<NodeId>,
}

impl SyntaxTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Allocate a detached node.
    pub fn push(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(Node {
            kind,
            span,
            parent: None,
            children: Vec::new(),
            ty: None,
            symbol: None,
        });
        id
    }

    /// Allocate a node and attach `children` in order.
    pub fn build(
        &mut self,
        kind: NodeKind,
        span: Span,
        children: impl IntoIterator<Item = NodeId>,
    ) -> Result<NodeId, TreeError> {
        let id = self.push(kind, span);
        for child in children {
            self.add_child(id, child)?;
        }
        Ok(id)
    }

    /// Append `child` to `parent`. Fails without touching either node if
    /// the child is already attached somewhere or is an ancestor of `parent`.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        if self.get(parent).is_none() {
            return Err(TreeError::UnknownNode(parent));
        }
        let existing = self.get(child).ok_or(TreeError::UnknownNode(child))?.parent;
        if let Some(existing) = existing {
            return Err(TreeError::AlreadyParented {
                child,
                parent: existing,
            });
        }
        if self.ancestors(parent).any(|id| id == child) {
            return Err(TreeError::Cycle { child, parent });
        }
        self.nodes[child.index()].parent = Some(parent);
        self.nodes[parent.index()].children.push(child);
        Ok(())
    }

    /// `id` itself followed by each ancestor up to the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(id), |&current| {
            self.get(current).and_then(|node| node.parent)
        })
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.node(id).span
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn child(&self, id: NodeId, n: usize) -> Option<NodeId> {
        self.node(id).children.get(n).copied()
    }

    // ── Decorations ───────────────────────────────────────────────

    pub fn ty(&self, id: NodeId) -> Option<&Type> {
        self.node(id).ty.as_ref()
    }

    pub fn set_type(&mut self, id: NodeId, ty: Type) {
        self.nodes[id.index()].ty = Some(ty);
    }

    pub fn symbol(&self, id: NodeId) -> Option<&Symbol> {
        self.node(id).symbol.as_ref()
    }

    pub fn set_symbol(&mut self, id: NodeId, symbol: Symbol) {
        self.nodes[id.index()].symbol = Some(symbol);
    }

    // ── Scripts ───────────────────────────────────────────────────

    pub fn add_script(&mut self, id: NodeId) {
        self.scripts.push(id);
    }

    /// Top-level script nodes in source order.
    pub fn scripts(&self) -> &[NodeId] {
        &self.scripts
    }

    pub fn script(&self, id: NodeId) -> Option<ScriptView<'_>> {
        let NodeKind::Script {
            trigger,
            name,
            return_type,
        } = self.kind(id)
        else {
            return None;
        };
        let mut view = ScriptView {
            id,
            trigger,
            name,
            return_type,
            annotations: Vec::new(),
            parameters: Vec::new(),
            body: None,
        };
        for &child in self.children(id) {
            match self.kind(child) {
                NodeKind::Annotation { .. } => view.annotations.push(child),
                NodeKind::Parameter { .. } => view.parameters.push(child),
                NodeKind::Block => view.body = Some(child),
                _ => {}
            }
        }
        Some(view)
    }

    pub fn enclosing_script(&self, id: NodeId) -> Option<NodeId> {
        self.ancestors(id)
            .find(|&ancestor| matches!(self.kind(ancestor), NodeKind::Script { .. }))
    }

    /// `[trigger,name]` of the script enclosing `id`.
    pub fn script_label(&self, id: NodeId) -> Option<String> {
        let script = self.enclosing_script(id)?;
        match self.kind(script) {
            NodeKind::Script { trigger, name, .. } => Some(format!("[{trigger},{name}]")),
            _ => None,
        }
    }
}
