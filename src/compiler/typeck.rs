//! Main semantic pass: scoping, name resolution and type checking.
//!
//! Every checked node gets its inferred type; every resolved name gets its
//! symbol. Code generation relies on both decorations being present.

use std::collections::HashSet;

use tracing::debug;

use super::ast::{NodeId, NodeKind, Operator, OperatorClass, SyntaxTree};
use super::error::{CompileError, ErrorReporter};
use super::scope::{LocalEntry, Scope};
use super::symbol::{ConstantValue, Symbol, SymbolTable, VariableDomain, VariableInfo};
use super::trigger::TriggerType;
use super::types::{PrimitiveType, StackType, Type};

/// Type check the bodies of `scripts`, whose signatures are already in
/// `symbols`.
pub fn check_scripts(
    tree: &mut SyntaxTree,
    symbols: &SymbolTable<'_>,
    reporter: &mut dyn ErrorReporter,
    scripts: &[NodeId],
    array_budget: usize,
) {
    let mut checker = TypeChecker::new(tree, symbols, reporter, array_budget);
    for &script in scripts {
        if checker.reporter.halted() {
            break;
        }
        checker.check_script(script);
    }
    debug!(scripts = scripts.len(), "type checked scripts");
}

/// Compile-time integer value of a switch key: an int-stack literal, an int
/// constant or a config reference. Valid after type checking.
pub fn constant_value(tree: &SyntaxTree, node: NodeId) -> Option<i32> {
    match tree.kind(node) {
        NodeKind::IntLiteral(value) | NodeKind::CoordgridLiteral(value) => Some(*value),
        NodeKind::BoolLiteral(value) => Some(i32::from(*value)),
        NodeKind::Constant { .. } => match tree.symbol(node) {
            Some(Symbol::Constant(info)) => match info.value {
                ConstantValue::Int(value) => Some(value),
                ConstantValue::Long(_) | ConstantValue::String(_) => None,
            },
            _ => None,
        },
        NodeKind::Dynamic { .. } => match tree.symbol(node) {
            Some(Symbol::Config(info)) => Some(info.id),
            _ => None,
        },
        _ => None,
    }
}

pub struct TypeChecker<'a, 'p> {
    tree: &'a mut SyntaxTree,
    symbols: &'a SymbolTable<'p>,
    reporter: &'a mut dyn ErrorReporter,
    array_budget: usize,
    scope: Scope,
    return_type: Type,
    /// Enclosing loops of the current statement.
    loops: usize,
    /// Enclosing `calc(...)` expressions.
    calc: usize,
}

impl<'a, 'p> TypeChecker<'a, 'p> {
    pub fn new(
        tree: &'a mut SyntaxTree,
        symbols: &'a SymbolTable<'p>,
        reporter: &'a mut dyn ErrorReporter,
        array_budget: usize,
    ) -> Self {
        Self {
            tree,
            symbols,
            reporter,
            array_budget,
            scope: Scope::new(array_budget),
            return_type: Type::VOID,
            loops: 0,
            calc: 0,
        }
    }

    fn error(&mut self, node: NodeId, message: impl Into<String>) {
        let script = self.tree.script_label(node);
        self.reporter
            .report(CompileError::semantic(message, self.tree.span(node)).in_script(script));
    }

    /// Report `actual` not matching `expected`, unless an earlier error
    /// already left it undefined.
    fn expect_type(&mut self, node: NodeId, expected: &Type, actual: &Type) {
        if !actual.is_undefined() && actual != expected {
            self.error(node, format!("Type mismatch: expected {expected}, got {actual}"));
        }
    }

    pub fn check_script(&mut self, script: NodeId) {
        let Some(view) = self.tree.script(script) else {
            return;
        };
        let return_type = view.return_type.clone();
        let parameters = view.parameters.clone();
        let body = view.body;

        self.scope = Scope::new(self.array_budget);
        self.return_type = return_type;
        self.loops = 0;
        self.calc = 0;

        for parameter in parameters {
            if let NodeKind::Parameter { ty, name } = self.tree.kind(parameter).clone() {
                match ty {
                    Type::ArrayReference { element, .. } => {
                        self.declare_array(parameter, &name, element);
                    }
                    Type::Primitive(ty) => self.declare_local(parameter, &name, ty),
                    Type::Tuple(_) => {
                        self.error(parameter, format!("Parameter ${name} cannot have type {ty}"));
                    }
                }
            }
        }
        if let Some(body) = body {
            // The body shares the root scope with the parameters.
            for statement in self.tree.children(body).to_vec() {
                self.statement(statement);
            }
        }
    }

    fn declare_local(&mut self, node: NodeId, name: &str, ty: PrimitiveType) {
        if !ty.is_declarable() {
            self.error(node, format!("Cannot declare a local variable of type {ty}"));
            return;
        }
        match self.scope.declare_variable(name, ty).map(|entry| entry.id) {
            Ok(id) => {
                self.tree.set_symbol(
                    node,
                    Symbol::Variable(VariableInfo {
                        name: name.to_string(),
                        id,
                        ty,
                        domain: VariableDomain::Local,
                    }),
                );
                self.tree.set_type(node, ty.into());
            }
            Err(error) => self.error(node, error.to_string()),
        }
    }

    // ── Statements ────────────────────────────────────────────────

    fn statement(&mut self, node: NodeId) {
        if self.reporter.halted() {
            return;
        }
        let children = self.tree.children(node).to_vec();
        match self.tree.kind(node).clone() {
            NodeKind::Block => {
                self.scope.enter();
                for child in children {
                    self.statement(child);
                }
                self.scope.exit();
            }
            NodeKind::If => {
                if let [condition, then, rest @ ..] = children.as_slice() {
                    self.condition(*condition);
                    self.statement(*then);
                    if let Some(&otherwise) = rest.first() {
                        self.statement(otherwise);
                    }
                }
            }
            NodeKind::While => {
                if let [condition, body] = children.as_slice() {
                    self.condition(*condition);
                    self.loop_body(*body);
                }
            }
            NodeKind::DoWhile => {
                if let [body, condition] = children.as_slice() {
                    self.loop_body(*body);
                    self.condition(*condition);
                }
            }
            NodeKind::Break => {
                if self.loops == 0 {
                    self.error(node, "break statement is not allowed outside of a loop");
                }
            }
            NodeKind::Continue => {
                if self.loops == 0 {
                    self.error(node, "continue statement is not allowed outside of a loop");
                }
            }
            NodeKind::Return => self.return_statement(node, &children),
            NodeKind::VariableDeclaration { ty, name } => {
                if let Some(&init) = children.first() {
                    let actual = self.expression(init, Some(ty));
                    self.expect_type(init, &ty.into(), &actual);
                }
                self.declare_local(node, &name, ty);
            }
            NodeKind::ArrayDeclaration { ty, name } => {
                self.array_declaration(node, ty, &name, &children);
            }
            NodeKind::Assignment { targets } => self.assignment(node, targets, &children),
            NodeKind::Switch { ty } => self.switch_statement(node, ty, &children),
            NodeKind::ExpressionStatement => {
                if let Some(&expr) = children.first() {
                    self.expression(expr, None);
                }
            }
            _ => self.error(node, "Expected a statement"),
        }
    }

    fn loop_body(&mut self, body: NodeId) {
        self.loops += 1;
        self.statement(body);
        self.loops -= 1;
    }

    fn condition(&mut self, node: NodeId) {
        let ty = self.expression(node, Some(PrimitiveType::Bool));
        if !ty.is_undefined() && ty != Type::BOOL {
            self.error(node, format!("Condition must be of type boolean, got {ty}"));
        }
    }

    fn return_statement(&mut self, node: NodeId, values: &[NodeId]) {
        let expected = self.return_type.flatten();
        let Some(actual) = self.flat_values(values, &expected) else {
            return;
        };
        let actual = Type::tuple(actual);
        if actual != self.return_type {
            let expected = self.return_type.clone();
            self.error(
                node,
                format!("Expected return type {expected}, got {actual}"),
            );
        }
    }

    fn array_declaration(
        &mut self,
        node: NodeId,
        ty: PrimitiveType,
        name: &str,
        children: &[NodeId],
    ) {
        if let Some(&size) = children.first() {
            let actual = self.expression(size, Some(PrimitiveType::Int));
            self.expect_type(size, &Type::INT, &actual);
        }
        self.declare_array(node, name, ty);
    }

    /// Declare an array local or array parameter, taking the next slot of
    /// the script's array budget.
    fn declare_array(&mut self, node: NodeId, name: &str, ty: PrimitiveType) {
        if ty.stack_type() != Some(StackType::Int) {
            self.error(node, format!("Arrays of type {ty} are not supported"));
            return;
        }
        match self.scope.declare_array(name, ty).map(|entry| entry.array) {
            Ok(Some(index)) => {
                self.tree.set_symbol(node, Symbol::Array { index, element: ty });
                self.tree.set_type(node, Type::ArrayReference { element: ty, index });
            }
            Ok(None) => {}
            Err(error) => self.error(node, error.to_string()),
        }
    }

    fn assignment(&mut self, node: NodeId, targets: usize, children: &[NodeId]) {
        let (targets, values) = children.split_at(targets.min(children.len()));
        if targets.len() > 1
            && targets
                .iter()
                .any(|&t| matches!(self.tree.kind(t), NodeKind::ArrayElement { .. }))
        {
            self.error(node, "Array elements must be assigned on their own");
        }
        let mut expected = Vec::with_capacity(targets.len());
        for &target in targets {
            expected.push(self.expression(target, None));
        }
        let Some(actual) = self.flat_values(values, &expected) else {
            return;
        };
        if expected.iter().any(Type::is_undefined) {
            return;
        }
        if actual.len() != expected.len() {
            self.error(
                node,
                format!(
                    "Expected {} value(s) in assignment, got {}",
                    expected.len(),
                    actual.len()
                ),
            );
            return;
        }
        for (index, (want, got)) in expected.iter().zip(&actual).enumerate() {
            if want != got {
                self.error(
                    node,
                    format!("Value {} of assignment: expected {want}, got {got}", index + 1),
                );
            }
        }
    }

    fn switch_statement(&mut self, node: NodeId, ty: PrimitiveType, children: &[NodeId]) {
        let [scrutinee, cases @ ..] = children else {
            return;
        };
        if ty.stack_type() != Some(StackType::Int) {
            self.error(node, format!("Switch statements of type {ty} are not supported"));
        }
        let actual = self.expression(*scrutinee, Some(ty));
        self.expect_type(*scrutinee, &ty.into(), &actual);

        let mut seen = HashSet::new();
        for &case in cases {
            let case_children = self.tree.children(case).to_vec();
            let Some((&body, keys)) = case_children.split_last() else {
                continue;
            };
            for &key in keys {
                let actual = self.expression(key, Some(ty));
                self.expect_type(key, &ty.into(), &actual);
                if actual.is_undefined() {
                    continue;
                }
                match constant_value(self.tree, key) {
                    Some(value) => {
                        if !seen.insert(value) {
                            self.error(key, "Duplicate case key in switch statement");
                        }
                    }
                    None => self.error(key, "Case keys must be constant values"),
                }
            }
            self.statement(body);
        }
    }

    // ── Expressions ───────────────────────────────────────────────

    /// Infer and record the type of `node`. `hint` is the type the context
    /// expects, used to pick between same-named configs.
    fn expression(&mut self, node: NodeId, hint: Option<PrimitiveType>) -> Type {
        let ty = self.infer(node, hint);
        self.tree.set_type(node, ty.clone());
        ty
    }

    /// Type every node in `nodes` and flatten the results. `None` if any of
    /// them is undefined (already reported).
    fn flat_values(&mut self, nodes: &[NodeId], expected: &[Type]) -> Option<Vec<Type>> {
        let mut actual = Vec::new();
        let mut complete = true;
        for &node in nodes {
            let hint = expected.get(actual.len()).and_then(Type::as_primitive);
            let ty = self.expression(node, hint);
            if ty.is_undefined() {
                complete = false;
            }
            actual.extend(ty.flatten());
        }
        complete.then_some(actual)
    }

    fn infer(&mut self, node: NodeId, hint: Option<PrimitiveType>) -> Type {
        let symbols = self.symbols;
        let children = self.tree.children(node).to_vec();
        match self.tree.kind(node).clone() {
            NodeKind::BoolLiteral(_) => Type::BOOL,
            NodeKind::IntLiteral(_) => Type::INT,
            NodeKind::LongLiteral(_) => Type::LONG,
            NodeKind::StringLiteral(_) => Type::STRING,
            NodeKind::CoordgridLiteral(_) => PrimitiveType::Coordgrid.into(),
            NodeKind::LocalVariable { name } => self.local(node, &name),
            NodeKind::ArrayElement { name } => self.array_element(node, &name, &children),
            NodeKind::GlobalVariable { name } => match symbols.lookup_variable(&name) {
                Some(info) => {
                    self.tree.set_symbol(node, Symbol::Variable(info.clone()));
                    info.ty.into()
                }
                None => {
                    self.error(node, format!("Undefined global variable %{name}"));
                    Type::UNDEFINED
                }
            },
            NodeKind::Constant { name } => match symbols.lookup_constant(&name) {
                Some(info) => {
                    self.tree.set_symbol(node, Symbol::Constant(info.clone()));
                    info.ty.into()
                }
                None => {
                    self.error(node, format!("Undefined constant ^{name}"));
                    Type::UNDEFINED
                }
            },
            NodeKind::Dynamic { name } => self.dynamic(node, &name, hint),
            NodeKind::Binary { op } => self.binary(node, op, &children),
            NodeKind::Calc => {
                self.calc += 1;
                let ty = match children.first() {
                    Some(&inner) => self.expression(inner, hint),
                    None => Type::UNDEFINED,
                };
                self.calc -= 1;
                if !ty.is_undefined() && ty != Type::INT && ty != Type::LONG {
                    self.error(node, format!("calc() expects an int or long expression, got {ty}"));
                    return Type::UNDEFINED;
                }
                ty
            }
            NodeKind::Call { trigger, name } => self.call(node, trigger, &name, &children),
            NodeKind::Command { name, alternative } => {
                self.command(node, &name, alternative, &children)
            }
            NodeKind::Concat => {
                for part in children {
                    let ty = self.expression(part, None);
                    if !ty.is_undefined() && (ty.arity() != 1 || ty.stack_type().is_none()) {
                        self.error(part, format!("Cannot concatenate a value of type {ty}"));
                    }
                }
                Type::STRING
            }
            _ => {
                self.error(node, "Expected an expression");
                Type::UNDEFINED
            }
        }
    }

    fn local(&mut self, node: NodeId, name: &str) -> Type {
        match self.scope.lookup(name).cloned() {
            Some(entry) if entry.array.is_none() => {
                self.tree.set_symbol(
                    node,
                    Symbol::Variable(VariableInfo {
                        name: entry.name,
                        id: entry.id,
                        ty: entry.ty,
                        domain: VariableDomain::Local,
                    }),
                );
                entry.ty.into()
            }
            Some(LocalEntry {
                array: Some(index),
                ty,
                ..
            }) if self.is_call_argument(node) => {
                self.tree.set_symbol(node, Symbol::Array { index, element: ty });
                Type::ArrayReference { element: ty, index }
            }
            Some(_) => {
                self.error(node, format!("Array ${name} must be accessed with an index"));
                Type::UNDEFINED
            }
            None => {
                self.error(node, format!("Undefined local variable ${name}"));
                Type::UNDEFINED
            }
        }
    }

    /// Whole arrays may only be passed straight to a script call.
    fn is_call_argument(&self, node: NodeId) -> bool {
        self.tree
            .parent(node)
            .is_some_and(|parent| matches!(self.tree.kind(parent), NodeKind::Call { .. }))
    }

    fn array_element(&mut self, node: NodeId, name: &str, children: &[NodeId]) -> Type {
        if let Some(&index) = children.first() {
            let actual = self.expression(index, Some(PrimitiveType::Int));
            self.expect_type(index, &Type::INT, &actual);
        }
        match self.scope.lookup(name).cloned() {
            Some(entry) => match entry.array {
                Some(index) => {
                    self.tree.set_symbol(
                        node,
                        Symbol::Array {
                            index,
                            element: entry.ty,
                        },
                    );
                    entry.ty.into()
                }
                None => {
                    self.error(node, format!("Local variable ${name} is not an array"));
                    Type::UNDEFINED
                }
            },
            None => {
                self.error(node, format!("Undefined array ${name}"));
                Type::UNDEFINED
            }
        }
    }

    /// A bare name: a config entry, else a command taking no arguments.
    fn dynamic(&mut self, node: NodeId, name: &str, hint: Option<PrimitiveType>) -> Type {
        let symbols = self.symbols;
        let config = hint
            .filter(|ty| ty.is_config())
            .and_then(|ty| symbols.lookup_config(ty, name))
            .or_else(|| symbols.lookup_config_any(name));
        if let Some(info) = config {
            self.tree.set_symbol(node, Symbol::Config(info.clone()));
            return info.ty.into();
        }
        if let Some(info) = symbols.lookup_command(name) {
            self.check_arguments(node, &info.arguments, &[], name);
            self.tree.set_symbol(node, Symbol::Command(info.clone()));
            return info.return_type.clone();
        }
        self.error(node, format!("Cannot resolve '{name}'"));
        Type::UNDEFINED
    }

    fn binary(&mut self, node: NodeId, op: Operator, children: &[NodeId]) -> Type {
        let [left, right] = children else {
            return Type::UNDEFINED;
        };
        let symbol = op.symbol();
        match op.class() {
            OperatorClass::Logical => {
                let l = self.expression(*left, Some(PrimitiveType::Bool));
                let r = self.expression(*right, Some(PrimitiveType::Bool));
                if !l.is_undefined() && !r.is_undefined() && (l != Type::BOOL || r != Type::BOOL) {
                    self.error(
                        node,
                        format!("Operator '{symbol}' expects boolean operands, got {l} and {r}"),
                    );
                }
                Type::BOOL
            }
            OperatorClass::Equality | OperatorClass::Relational => {
                let l = self.expression(*left, None);
                let r = self.expression(*right, l.as_primitive());
                if l.is_undefined() || r.is_undefined() {
                    return Type::BOOL;
                }
                let comparable = if op.class() == OperatorClass::Equality {
                    l.arity() == 1
                        && matches!(l.stack_type(), Some(StackType::Int | StackType::Long))
                } else {
                    l == Type::INT || l == Type::LONG
                };
                if l != r || !comparable {
                    self.error(
                        node,
                        format!("Operator '{symbol}' cannot be applied to {l} and {r}"),
                    );
                }
                Type::BOOL
            }
            OperatorClass::Arithmetic => {
                if self.calc == 0 {
                    self.error(
                        node,
                        format!("Arithmetic operator '{symbol}' is only allowed inside calc()"),
                    );
                }
                let l = self.expression(*left, None);
                let r = self.expression(*right, l.as_primitive());
                if l.is_undefined() || r.is_undefined() {
                    return Type::UNDEFINED;
                }
                if l == r && (l == Type::INT || l == Type::LONG) {
                    l
                } else {
                    self.error(
                        node,
                        format!("Operator '{symbol}' cannot be applied to {l} and {r}"),
                    );
                    Type::UNDEFINED
                }
            }
        }
    }

    fn call(&mut self, node: NodeId, trigger: TriggerType, name: &str, args: &[NodeId]) -> Type {
        let symbols = self.symbols;
        let Some(info) = symbols.lookup_script(trigger, name) else {
            for &arg in args {
                self.expression(arg, None);
            }
            self.error(node, format!("Undefined script [{trigger},{name}]"));
            return Type::UNDEFINED;
        };
        self.check_arguments(node, &info.arguments, args, &info.full_name());
        self.tree.set_symbol(node, Symbol::Script(info.clone()));
        if !trigger.has_returns() {
            let in_statement = self
                .tree
                .parent(node)
                .is_some_and(|parent| *self.tree.kind(parent) == NodeKind::ExpressionStatement);
            if !in_statement {
                self.error(
                    node,
                    format!("{} does not return and cannot be used as a value", info.full_name()),
                );
                return Type::UNDEFINED;
            }
        }
        info.return_type.clone()
    }

    fn command(&mut self, node: NodeId, name: &str, alternative: bool, args: &[NodeId]) -> Type {
        let symbols = self.symbols;
        let Some(info) = symbols.lookup_command(name) else {
            for &arg in args {
                self.expression(arg, None);
            }
            self.error(node, format!("Undefined command '{name}'"));
            return Type::UNDEFINED;
        };
        if alternative && !info.alternative {
            self.error(node, format!("Command '{name}' has no alternative form"));
        }
        self.check_arguments(node, &info.arguments, args, name);
        self.tree.set_symbol(node, Symbol::Command(info.clone()));
        info.return_type.clone()
    }

    /// Flatten `args` and match them against `expected` by count, then per
    /// 1-based position.
    fn check_arguments(&mut self, node: NodeId, expected: &[Type], args: &[NodeId], callee: &str) {
        let expected: Vec<Type> = expected.iter().flat_map(Type::flatten).collect();
        let Some(actual) = self.flat_values(args, &expected) else {
            return;
        };
        if actual.len() != expected.len() {
            self.error(
                node,
                format!(
                    "{callee} expects {} argument(s), got {}",
                    expected.len(),
                    actual.len()
                ),
            );
            return;
        }
        for (index, (want, got)) in expected.iter().zip(&actual).enumerate() {
            if want != got {
                self.error(
                    node,
                    format!("Argument {} of {callee}: expected {want}, got {got}", index + 1),
                );
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::compiler::error::CollectingReporter;
    use crate::compiler::parser::parse_source;
    use crate::compiler::precheck::register_scripts;
    use crate::compiler::scope::DEFAULT_ARRAY_BUDGET;
    use crate::compiler::symbol::{CommandInfo, ConfigInfo, ConstantInfo};
    use crate::compiler::token::LexicalTable;

    fn symbols() -> SymbolTable<'static> {
        let mut table = SymbolTable::new();
        table
            .define_command(CommandInfo {
                opcode: 1000,
                name: "mes".into(),
                arguments: vec![Type::STRING],
                return_type: Type::VOID,
                alternative: true,
            })
            .unwrap();
        table
            .define_command(CommandInfo {
                opcode: 1001,
                name: "clock".into(),
                arguments: Vec::new(),
                return_type: Type::INT,
                alternative: false,
            })
            .unwrap();
        table
            .define_config(ConfigInfo {
                name: "coins".into(),
                ty: PrimitiveType::Obj,
                content_type: None,
                id: 995,
            })
            .unwrap();
        table
            .define_config(ConfigInfo {
                name: "coins".into(),
                ty: PrimitiveType::Npc,
                content_type: None,
                id: 7,
            })
            .unwrap();
        table
            .define_constant(ConstantInfo {
                name: "max".into(),
                ty: PrimitiveType::Int,
                value: ConstantValue::Int(10),
            })
            .unwrap();
        table
            .define_variable(VariableInfo {
                name: "points".into(),
                id: 101,
                ty: PrimitiveType::Int,
                domain: VariableDomain::Player,
            })
            .unwrap();
        table
    }

    fn check_src(source: &str) -> (SyntaxTree, Vec<CompileError>) {
        check_with_budget(source, DEFAULT_ARRAY_BUDGET)
    }

    fn check_with_budget(source: &str, budget: usize) -> (SyntaxTree, Vec<CompileError>) {
        let table = LexicalTable::default();
        let mut reporter = CollectingReporter::new();
        let mut tree = parse_source(source, &table, &mut reporter);
        assert!(!reporter.has_errors(), "parse errors: {:?}", reporter.errors());
        let root = symbols();
        let mut symbols = root.create_sub_table();
        let scripts = register_scripts(&tree, &mut symbols, &mut reporter);
        check_scripts(&mut tree, &symbols, &mut reporter, &scripts, budget);
        (tree, reporter.take())
    }

    fn messages(source: &str) -> Vec<String> {
        check_src(source).1.into_iter().map(|e| e.message).collect()
    }

    #[test]
    fn valid_script_has_no_errors() {
        let source = r#"
[proc,sum](int $a, int $b)(int)
def_int $total = calc($a + $b);
if ($total > ^max & %points >= 0) {
    mes("big: <$total>");
}
return($total);
"#;
        assert!(messages(source).is_empty());
    }

    #[test]
    fn arithmetic_requires_calc() {
        let errors = messages("[proc,a](int $x)(int) return($x + 1);");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("only allowed inside calc()"));
    }

    #[test]
    fn condition_must_be_boolean() {
        let errors = messages("[proc,a](int $x) if ($x) { return; }");
        assert_eq!(errors, vec!["Condition must be of type boolean, got int"]);
    }

    #[test]
    fn return_type_mismatch() {
        let errors = messages("[proc,a](int) return(\"x\");");
        assert_eq!(errors, vec!["Expected return type int, got string"]);
        assert!(messages("[proc,b] return;").is_empty());
    }

    #[test]
    fn tuple_returns_flatten() {
        let source = "[proc,pair](int, string) return(1, \"a\"); [proc,use](int, string) return(~pair);";
        assert!(messages(source).is_empty());
    }

    #[test]
    fn argument_errors_cite_index() {
        let source = "[proc,f](int $a, string $b) [proc,g] ~f(1, 2); ~f(1);";
        let errors = messages(source);
        assert_eq!(
            errors,
            vec![
                "Argument 2 of [proc,f]: expected string, got int",
                "[proc,f] expects 2 argument(s), got 1",
            ]
        );
    }

    #[test]
    fn label_calls_are_statements_only() {
        let errors = messages("[label,l] [proc,a](int) @l; return(@l);");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("cannot be used as a value"));
    }

    #[test]
    fn undefined_names() {
        let errors = messages("[proc,a] $x = 1; ~missing; nothing;");
        assert_eq!(
            errors,
            vec![
                "Undefined local variable $x",
                "Undefined script [proc,missing]",
                "Cannot resolve 'nothing'",
            ]
        );
    }

    #[test]
    fn redeclaration_in_nested_scope() {
        let errors = messages("[proc,a](int $x) { def_int $x = 1; }");
        assert_eq!(errors, vec!["Local variable $x is already defined"]);
        assert!(messages("[proc,b] { def_int $y; } { def_string $y; }").is_empty());
    }

    #[test]
    fn nested_arrays_exceed_budget() {
        let source = "[proc,a] def_int $a(1); def_int $b(1); { def_int $c(1); }";
        let (_, errors) = check_with_budget(source, 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Too many arrays declared in script (maximum 2)");
        assert_eq!(errors[0].script.as_deref(), Some("[proc,a]"));
    }

    #[test]
    fn array_parameters_take_first_slots() {
        let (tree, errors) =
            check_src("[proc,f](int $n, intarray $arr) def_int $more(2); $arr(0) = $n;");
        assert!(errors.is_empty(), "{errors:?}");
        let view = tree.script(tree.scripts()[0]).unwrap();
        assert!(matches!(
            tree.symbol(view.parameters[1]),
            Some(Symbol::Array { index: 0, element: PrimitiveType::Int })
        ));
        let declaration = tree.children(view.body.unwrap())[0];
        assert!(matches!(tree.symbol(declaration), Some(Symbol::Array { index: 1, .. })));
    }

    #[test]
    fn array_parameters_count_against_budget() {
        let (_, errors) = check_with_budget("[proc,f](intarray $a) def_int $b(1);", 1);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Too many arrays declared in script (maximum 1)");
    }

    #[test]
    fn whole_arrays_only_pass_to_scripts() {
        let source = "[proc,f](intarray $arr)
            [proc,g] def_int $v(2); ~f($v); mes($v); def_int $i; ~f($i);";
        assert_eq!(
            messages(source),
            vec![
                "Array $v must be accessed with an index",
                "Argument 1 of [proc,f]: expected intarray, got int",
            ]
        );
        let errors = messages("[proc,h](stringarray $s)");
        assert_eq!(errors, vec!["Arrays of type string are not supported"]);
    }

    #[test]
    fn arrays_are_int_based() {
        let errors = messages("[proc,a] def_string $s(4);");
        assert_eq!(errors, vec!["Arrays of type string are not supported"]);
        assert!(messages("[proc,b] def_obj $o(4); $o(0) = coins;").is_empty());
    }

    #[test]
    fn break_outside_loop() {
        let errors = messages("[proc,a] break; while (true) { break; } do { continue; } while (false);");
        assert_eq!(errors, vec!["break statement is not allowed outside of a loop"]);
    }

    #[test]
    fn switch_keys() {
        let source = "[proc,a](int $x) switch_int ($x) { case 1, ^max: case 10: case $x: }";
        let errors = messages(source);
        assert_eq!(
            errors,
            vec![
                "Duplicate case key in switch statement",
                "Case keys must be constant values",
            ]
        );
    }

    #[test]
    fn dynamic_resolves_by_expected_type() {
        let (tree, errors) = check_src("[proc,a](npc $n) if ($n = coins) { return; }");
        assert!(errors.is_empty(), "{errors:?}");
        let found = tree
            .scripts()
            .iter()
            .flat_map(|&s| {
                let mut stack = vec![s];
                let mut out = Vec::new();
                while let Some(id) = stack.pop() {
                    stack.extend(tree.children(id));
                    if let Some(Symbol::Config(info)) = tree.symbol(id) {
                        out.push(info.id);
                    }
                }
                out
            })
            .collect::<Vec<_>>();
        assert_eq!(found, vec![7]);
    }

    #[test]
    fn assignments() {
        assert!(messages("[proc,a] def_int $i; def_string $s; $i, $s = 1, \"x\"; %points = 3;").is_empty());
        let errors = messages("[proc,b] def_int $i; $i = \"x\";");
        assert_eq!(errors, vec!["Value 1 of assignment: expected int, got string"]);
        let errors = messages("[proc,c] def_int $i; $i = 1, 2;");
        assert_eq!(errors, vec!["Expected 1 value(s) in assignment, got 2"]);
    }

    #[test]
    fn alternative_command_form() {
        assert!(messages("[proc,a] .mes(\"hi\");").is_empty());
        let errors = messages("[proc,b](int) return(.clock);");
        assert_eq!(errors, vec!["Command 'clock' has no alternative form"]);
    }

    #[test]
    fn concatenation_accepts_single_values() {
        assert!(messages("[proc,a](int $i, long $l) mes(\"<$i> <$l> <coins>\");").is_empty());
        let errors = messages("[proc,pair](int, int) return(1, 2); [proc,b] mes(\"<~pair>\");");
        assert_eq!(errors, vec!["Cannot concatenate a value of type (int,int)"]);
    }

    #[test]
    fn errors_carry_enclosing_script() {
        let (_, errors) = check_src("[proc,first] [proc,second] $nope = 1;");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].script.as_deref(), Some("[proc,second]"));
    }

    #[test]
    fn decorations_are_recorded() {
        let (tree, errors) = check_src("[proc,a](int $x)(int) return(calc($x * 2));");
        assert!(errors.is_empty());
        let script = tree.scripts()[0];
        let param = tree.script(script).unwrap().parameters[0];
        assert!(matches!(
            tree.symbol(param),
            Some(Symbol::Variable(VariableInfo { id: 0, domain: VariableDomain::Local, .. }))
        ));
        let body = tree.script(script).unwrap().body.unwrap();
        let ret = tree.children(body)[0];
        let calc = tree.children(ret)[0];
        assert_eq!(tree.ty(calc), Some(&Type::INT));
    }
}
