//! Lowering of checked syntax trees into block based instructions.

use serde::Serialize;
use tracing::debug;

use super::ast::{NodeId, NodeKind, Operator, OperatorClass, SyntaxTree};
use super::error::{CompileError, ErrorReporter};
use super::ir::{Block, BlockMap, Instruction, Label, LabelGenerator, Operand};
use super::locals::LocalMap;
use super::opcode::{CoreOpcode, InstructionMap};
use super::span::Span;
use super::switch::{SwitchMap, SwitchTable};
use super::symbol::{ConstantValue, Symbol, VariableDomain, VariableInfo};
use super::trigger::TriggerType;
use super::typeck::constant_value;
use super::types::{DefaultValue, PrimitiveType, StackType, Type};

/// Per stack type counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StackCounts {
    pub int: usize,
    pub string: usize,
    pub long: usize,
}

impl StackCounts {
    pub fn get(&self, stack: StackType) -> usize {
        match stack {
            StackType::Int => self.int,
            StackType::String => self.string,
            StackType::Long => self.long,
        }
    }

    fn from_fn(f: impl Fn(StackType) -> usize) -> Self {
        Self {
            int: f(StackType::Int),
            string: f(StackType::String),
            long: f(StackType::Long),
        }
    }
}

/// Generated code of one script, ready for optimization and linking.
#[derive(Debug, Clone, Serialize)]
pub struct BinaryScript {
    /// `[trigger,name]`
    pub name: String,
    pub trigger: TriggerType,
    pub entry: Label,
    pub blocks: BlockMap,
    pub switch_tables: Vec<SwitchTable>,
    pub parameters: StackCounts,
    /// For each array parameter, in slot order, its position among the
    /// int stack arguments. Not counted in `parameters`.
    pub array_parameters: Vec<usize>,
    pub variables: StackCounts,
}

/// Generate code for every script in `scripts`. A script that fails to
/// lower is reported and left out.
pub fn generate(
    tree: &SyntaxTree,
    scripts: &[NodeId],
    map: &InstructionMap,
    reporter: &mut dyn ErrorReporter,
) -> Vec<BinaryScript> {
    let mut generated = Vec::with_capacity(scripts.len());
    for &script in scripts {
        if reporter.halted() {
            break;
        }
        match CodeGenerator::new(tree, map).script(script) {
            Ok(binary) => generated.push(binary),
            Err(error) => reporter.report(error.in_script(tree.script_label(script))),
        }
    }
    debug!(scripts = generated.len(), "generated code");
    generated
}

type GenResult = Result<(), CompileError>;

struct LoopLabels {
    /// `continue` target.
    next: Label,
    /// `break` target.
    exit: Label,
}

/// Code generator for a single script; state never outlives the script.
pub struct CodeGenerator<'a> {
    tree: &'a SyntaxTree,
    map: &'a InstructionMap,
    labels: LabelGenerator,
    blocks: BlockMap,
    locals: LocalMap,
    switches: SwitchMap,
    current: Option<Label>,
    loops: Vec<LoopLabels>,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(tree: &'a SyntaxTree, map: &'a InstructionMap) -> Self {
        Self {
            tree,
            map,
            labels: LabelGenerator::new(),
            blocks: BlockMap::new(),
            locals: LocalMap::new(),
            switches: SwitchMap::new(),
            current: None,
            loops: Vec::new(),
        }
    }

    pub fn script(mut self, node: NodeId) -> Result<BinaryScript, CompileError> {
        let tree = self.tree;
        let view = tree
            .script(node)
            .ok_or_else(|| self.error(node, "Expected a script"))?;
        let trigger = TriggerType::for_representation(view.trigger)
            .ok_or_else(|| self.error(node, format!("Unknown trigger type '{}'", view.trigger)))?;

        let entry = self.labels.generate("entry");
        self.bind(entry.clone())?;
        let mut array_parameters = Vec::new();
        let mut int_arguments = 0;
        for &parameter in &view.parameters {
            if let Symbol::Array { index, .. } = self.symbol(parameter)? {
                if *index != array_parameters.len() {
                    return Err(
                        self.error(parameter, "Array parameters must take the first array slots")
                    );
                }
                array_parameters.push(int_arguments);
                int_arguments += 1;
                continue;
            }
            let info = self.variable(parameter)?;
            if info.ty.stack_type() == Some(StackType::Int) {
                int_arguments += 1;
            }
            self.locals
                .register_parameter(info.id, &info.name, info.ty)
                .map(|_| ())
                .map_err(|e| self.error(parameter, e.to_string()))?;
        }
        if let Some(body) = view.body {
            for &statement in tree.children(body) {
                self.statement(statement)?;
            }
        }
        if !self.terminated() {
            for ty in view.return_type.flatten() {
                let ty = ty.as_primitive().unwrap_or(PrimitiveType::Void);
                self.push_default(node, ty)?;
            }
            self.emit(node, CoreOpcode::Return, Operand::None)?;
        }

        let locals = &self.locals;
        Ok(BinaryScript {
            name: format!("[{},{}]", view.trigger, view.name),
            trigger,
            entry,
            parameters: StackCounts::from_fn(|stack| locals.parameter_count(stack)),
            array_parameters,
            variables: StackCounts::from_fn(|stack| locals.variable_count(stack)),
            blocks: self.blocks,
            switch_tables: self.switches.into_tables(),
        })
    }

    // ── Emission ──────────────────────────────────────────────────

    fn error(&self, node: NodeId, message: impl Into<String>) -> CompileError {
        CompileError::codegen(message, self.tree.span(node))
    }

    /// Start a new block at the end of the layout and emit into it.
    fn bind(&mut self, label: Label) -> GenResult {
        self.blocks
            .bind(label.clone())
            .map_err(|e| CompileError::codegen(e.to_string(), Span::default()))?;
        self.current = Some(label);
        Ok(())
    }

    fn current_block(&self) -> Option<&Block> {
        self.current.as_ref().and_then(|label| self.blocks.get(label))
    }

    /// Whether control cannot fall off the end of the current block.
    fn terminated(&self) -> bool {
        self.current_block()
            .and_then(Block::last)
            .and_then(|instruction| self.map.core(instruction.opcode))
            .is_some_and(CoreOpcode::ends_flow)
    }

    fn emit(&mut self, node: NodeId, opcode: CoreOpcode, operand: Operand) -> GenResult {
        let code = self
            .map
            .lookup(opcode)
            .map_err(|e| self.error(node, e.to_string()))?;
        self.emit_code(node, code, operand)
    }

    fn emit_code(&mut self, node: NodeId, code: u16, operand: Operand) -> GenResult {
        let span = self.tree.span(node);
        let block = self
            .current
            .as_ref()
            .and_then(|label| self.blocks.get_mut(label))
            .ok_or_else(|| CompileError::codegen("No block to emit into", span))?;
        block
            .add(Instruction::new(code, operand))
            .map_err(|e| CompileError::codegen(e.to_string(), span))
    }

    fn emit_int(&mut self, node: NodeId, opcode: CoreOpcode, value: usize) -> GenResult {
        let value = i32::try_from(value)
            .map_err(|_| self.error(node, format!("Operand {value} does not fit in an int")))?;
        self.emit(node, opcode, Operand::Int(value))
    }

    fn push_default(&mut self, node: NodeId, ty: PrimitiveType) -> GenResult {
        match ty.default_value() {
            Some(DefaultValue::Int(value)) => {
                self.emit(node, CoreOpcode::PushIntConstant, Operand::Int(value))
            }
            Some(DefaultValue::String(value)) => {
                self.emit(node, CoreOpcode::PushStringConstant, Operand::String(value))
            }
            Some(DefaultValue::Long(value)) => {
                self.emit(node, CoreOpcode::PushLongConstant, Operand::Long(value))
            }
            None => Err(self.error(node, format!("Type {ty} has no default value"))),
        }
    }

    // ── Decorations ───────────────────────────────────────────────

    fn symbol(&self, node: NodeId) -> Result<&'a Symbol, CompileError> {
        let tree = self.tree;
        tree.symbol(node)
            .ok_or_else(|| self.error(node, "Unresolved symbol reaching code generation"))
    }

    fn node_type(&self, node: NodeId) -> Result<&'a Type, CompileError> {
        let tree = self.tree;
        tree.ty(node)
            .ok_or_else(|| self.error(node, "Untyped expression reaching code generation"))
    }

    fn stack_of(&self, node: NodeId, ty: PrimitiveType) -> Result<StackType, CompileError> {
        ty.stack_type()
            .ok_or_else(|| self.error(node, format!("Type {ty} has no stack representation")))
    }

    fn variable(&self, node: NodeId) -> Result<&'a VariableInfo, CompileError> {
        match self.symbol(node)? {
            Symbol::Variable(info) => Ok(info),
            _ => Err(self.error(node, "Expected a variable")),
        }
    }

    /// Slot and stack type of a local referenced or declared by `node`.
    fn local_slot(&self, node: NodeId) -> Result<(usize, StackType), CompileError> {
        let info = self.variable(node)?;
        let local = self
            .locals
            .lookup(info.id)
            .ok_or_else(|| self.error(node, format!("Local ${} has no slot", info.name)))?;
        Ok((local.slot, self.stack_of(node, local.ty)?))
    }

    fn array_index(&self, node: NodeId) -> Result<(usize, PrimitiveType), CompileError> {
        match self.symbol(node)? {
            Symbol::Array { index, element } => Ok((*index, *element)),
            _ => Err(self.error(node, "Expected an array")),
        }
    }

    fn script_name(&self, node: NodeId) -> Result<String, CompileError> {
        match self.symbol(node)? {
            Symbol::Script(info) => Ok(info.full_name()),
            _ => Err(self.error(node, "Expected a script")),
        }
    }

    // ── Statements ────────────────────────────────────────────────

    fn statement(&mut self, node: NodeId) -> GenResult {
        let tree = self.tree;
        let children = tree.children(node);
        match tree.kind(node) {
            NodeKind::Block => {
                for &child in children {
                    self.statement(child)?;
                }
                Ok(())
            }
            NodeKind::If => self.if_statement(node, children),
            NodeKind::While => self.while_statement(node, children),
            NodeKind::DoWhile => self.do_while_statement(node, children),
            NodeKind::Break => {
                let target = self.loops.last().map(|labels| labels.exit.clone());
                let target = target.ok_or_else(|| self.error(node, "break outside of a loop"))?;
                self.emit(node, CoreOpcode::Branch, Operand::Label(target))
            }
            NodeKind::Continue => {
                let target = self.loops.last().map(|labels| labels.next.clone());
                let target = target.ok_or_else(|| self.error(node, "continue outside of a loop"))?;
                self.emit(node, CoreOpcode::Branch, Operand::Label(target))
            }
            NodeKind::Return => {
                for &value in children {
                    self.expression(value)?;
                }
                self.emit(node, CoreOpcode::Return, Operand::None)
            }
            NodeKind::VariableDeclaration { ty, name } => {
                match children.first() {
                    Some(&init) => self.expression(init)?,
                    None => self.push_default(node, *ty)?,
                }
                let info = self.variable(node)?;
                let slot = self
                    .locals
                    .register_variable(info.id, name, *ty)
                    .map(|local| local.slot)
                    .map_err(|e| self.error(node, e.to_string()))?;
                let stack = self.stack_of(node, *ty)?;
                self.emit_int(node, pop_local(stack), slot)
            }
            NodeKind::ArrayDeclaration { .. } => {
                if let Some(&size) = children.first() {
                    self.expression(size)?;
                }
                let (index, element) = self.array_index(node)?;
                let operand = (index << 16) | element.code() as usize;
                self.emit_int(node, CoreOpcode::DefineArray, operand)
            }
            NodeKind::Assignment { targets } => self.assignment(node, *targets, children),
            NodeKind::Switch { .. } => self.switch_statement(node, children),
            NodeKind::ExpressionStatement => {
                let Some(&expr) = children.first() else {
                    return Ok(());
                };
                self.expression(expr)?;
                for ty in self.node_type(expr)?.flatten() {
                    let stack = ty
                        .stack_type()
                        .ok_or_else(|| self.error(expr, format!("Cannot discard a value of type {ty}")))?;
                    self.emit(expr, discard(stack), Operand::None)?;
                }
                Ok(())
            }
            _ => Err(self.error(node, "Expected a statement")),
        }
    }

    fn if_statement(&mut self, node: NodeId, children: &[NodeId]) -> GenResult {
        let [condition, then, rest @ ..] = children else {
            return Err(self.error(node, "Malformed if statement"));
        };
        let on_true = self.labels.generate("if_true");
        let end = self.labels.generate("if_end");
        match rest.first() {
            Some(&otherwise) => {
                let on_false = self.labels.generate("if_false");
                self.condition(*condition, &on_true, &on_false)?;
                self.bind(on_true)?;
                self.statement(*then)?;
                self.emit(node, CoreOpcode::Branch, Operand::Label(end.clone()))?;
                self.bind(on_false)?;
                self.statement(otherwise)?;
            }
            None => {
                self.condition(*condition, &on_true, &end)?;
                self.bind(on_true)?;
                self.statement(*then)?;
            }
        }
        self.bind(end)
    }

    fn while_statement(&mut self, node: NodeId, children: &[NodeId]) -> GenResult {
        let [condition, body] = children else {
            return Err(self.error(node, "Malformed while statement"));
        };
        let start = self.labels.generate("while_start");
        let inner = self.labels.generate("while_body");
        let end = self.labels.generate("while_end");
        self.bind(start.clone())?;
        self.condition(*condition, &inner, &end)?;
        self.bind(inner)?;
        self.loops.push(LoopLabels {
            next: start.clone(),
            exit: end.clone(),
        });
        self.statement(*body)?;
        self.loops.pop();
        self.emit(node, CoreOpcode::Branch, Operand::Label(start))?;
        self.bind(end)
    }

    fn do_while_statement(&mut self, node: NodeId, children: &[NodeId]) -> GenResult {
        let [body, condition] = children else {
            return Err(self.error(node, "Malformed do-while statement"));
        };
        let start = self.labels.generate("do_body");
        let check = self.labels.generate("do_condition");
        let end = self.labels.generate("do_end");
        self.bind(start.clone())?;
        self.loops.push(LoopLabels {
            next: check.clone(),
            exit: end.clone(),
        });
        self.statement(*body)?;
        self.loops.pop();
        self.bind(check)?;
        self.condition(*condition, &start, &end)?;
        self.bind(end)
    }

    fn assignment(&mut self, node: NodeId, targets: usize, children: &[NodeId]) -> GenResult {
        let (targets, values) = children.split_at(targets.min(children.len()));
        if let [target] = targets {
            if matches!(self.tree.kind(*target), NodeKind::ArrayElement { .. }) {
                // index sits below the value
                if let Some(&index) = self.tree.children(*target).first() {
                    self.expression(index)?;
                }
                for &value in values {
                    self.expression(value)?;
                }
                let (array, _) = self.array_index(*target)?;
                return self.emit_int(node, CoreOpcode::PopArrayInt, array);
            }
        }
        for &value in values {
            self.expression(value)?;
        }
        // each stack is LIFO, so the last target takes the top value
        for &target in targets.iter().rev() {
            self.store(target)?;
        }
        Ok(())
    }

    fn store(&mut self, target: NodeId) -> GenResult {
        match self.tree.kind(target) {
            NodeKind::LocalVariable { .. } => {
                let (slot, stack) = self.local_slot(target)?;
                self.emit_int(target, pop_local(stack), slot)
            }
            NodeKind::GlobalVariable { .. } => {
                let info = self.variable(target)?;
                let opcode = self.variable_opcode(target, info, false)?;
                self.emit(target, opcode, Operand::Int(info.id))
            }
            _ => Err(self.error(target, "Expected an assignable variable")),
        }
    }

    fn switch_statement(&mut self, node: NodeId, children: &[NodeId]) -> GenResult {
        let tree = self.tree;
        let [scrutinee, cases @ ..] = children else {
            return Err(self.error(node, "Malformed switch statement"));
        };
        self.expression(*scrutinee)?;
        let id = self.switches.generate();
        self.emit(node, CoreOpcode::Switch, Operand::Switch(id))?;

        let end = self.labels.generate("switch_end");
        let mut default = None;
        let mut bodies = Vec::with_capacity(cases.len());
        for &case in cases {
            let NodeKind::Case { is_default } = tree.kind(case) else {
                return Err(self.error(case, "Expected a switch case"));
            };
            let Some((&body, keys)) = tree.children(case).split_last() else {
                continue;
            };
            let label = self.labels.generate("switch_case");
            let values = keys
                .iter()
                .map(|&key| {
                    constant_value(tree, key)
                        .ok_or_else(|| self.error(key, "Case keys must be constant values"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            if *is_default {
                default = Some(label.clone());
            }
            if !values.is_empty() {
                if let Some(table) = self.switches.get_mut(id) {
                    table.add_case(values, label.clone());
                }
            }
            bodies.push((label, body));
        }

        // unmatched keys continue here
        let fallback = default.unwrap_or_else(|| end.clone());
        self.emit(node, CoreOpcode::Branch, Operand::Label(fallback))?;
        for (label, body) in bodies {
            self.bind(label)?;
            self.statement(body)?;
            self.emit(node, CoreOpcode::Branch, Operand::Label(end.clone()))?;
        }
        self.bind(end)
    }

    // ── Expressions ───────────────────────────────────────────────

    fn expression(&mut self, node: NodeId) -> GenResult {
        let tree = self.tree;
        let children = tree.children(node);
        match tree.kind(node) {
            NodeKind::BoolLiteral(value) => {
                self.emit(node, CoreOpcode::PushIntConstant, Operand::Int(i32::from(*value)))
            }
            NodeKind::IntLiteral(value) | NodeKind::CoordgridLiteral(value) => {
                self.emit(node, CoreOpcode::PushIntConstant, Operand::Int(*value))
            }
            NodeKind::LongLiteral(value) => {
                self.emit(node, CoreOpcode::PushLongConstant, Operand::Long(*value))
            }
            NodeKind::StringLiteral(value) => {
                self.emit(node, CoreOpcode::PushStringConstant, Operand::String(value.clone()))
            }
            NodeKind::LocalVariable { .. } => {
                if let Symbol::Array { index, .. } = self.symbol(node)? {
                    return self.emit_int(node, CoreOpcode::PushIntConstant, *index);
                }
                let (slot, stack) = self.local_slot(node)?;
                self.emit_int(node, push_local(stack), slot)
            }
            NodeKind::ArrayElement { .. } => {
                if let Some(&index) = children.first() {
                    self.expression(index)?;
                }
                let (array, _) = self.array_index(node)?;
                self.emit_int(node, CoreOpcode::PushArrayInt, array)
            }
            NodeKind::GlobalVariable { .. } => {
                let info = self.variable(node)?;
                let opcode = self.variable_opcode(node, info, true)?;
                self.emit(node, opcode, Operand::Int(info.id))
            }
            NodeKind::Constant { .. } => match self.symbol(node)? {
                Symbol::Constant(info) => match &info.value {
                    ConstantValue::Int(value) => {
                        self.emit(node, CoreOpcode::PushIntConstant, Operand::Int(*value))
                    }
                    ConstantValue::Long(value) => {
                        self.emit(node, CoreOpcode::PushLongConstant, Operand::Long(*value))
                    }
                    ConstantValue::String(value) => self.emit(
                        node,
                        CoreOpcode::PushStringConstant,
                        Operand::String(value.clone()),
                    ),
                },
                _ => Err(self.error(node, "Expected a constant")),
            },
            NodeKind::Dynamic { .. } => match self.symbol(node)? {
                Symbol::Config(info) => {
                    self.emit(node, CoreOpcode::PushIntConstant, Operand::Int(info.id))
                }
                Symbol::Command(info) => self.emit_code(node, info.opcode, Operand::Int(0)),
                _ => Err(self.error(node, "Expected a config or command reference")),
            },
            NodeKind::Binary { op } => match op.class() {
                OperatorClass::Arithmetic => {
                    let [left, right] = children else {
                        return Err(self.error(node, "Malformed binary expression"));
                    };
                    self.expression(*left)?;
                    self.expression(*right)?;
                    let long = *self.node_type(node)? == Type::LONG;
                    self.emit(node, arithmetic(*op, long), Operand::None)
                }
                _ => self.materialize(node),
            },
            NodeKind::Calc => match children.first() {
                Some(&inner) => self.expression(inner),
                None => Ok(()),
            },
            NodeKind::Call { trigger, .. } => {
                for &argument in children {
                    self.expression(argument)?;
                }
                let name = self.script_name(node)?;
                let opcode = match trigger {
                    TriggerType::Label => CoreOpcode::JumpWithParams,
                    TriggerType::Proc | TriggerType::ClientScript => CoreOpcode::GosubWithParams,
                };
                self.emit(node, opcode, Operand::Script(name))
            }
            NodeKind::Command { alternative, .. } => {
                for &argument in children {
                    self.expression(argument)?;
                }
                match self.symbol(node)? {
                    Symbol::Command(info) => {
                        self.emit_code(node, info.opcode, Operand::Int(i32::from(*alternative)))
                    }
                    _ => Err(self.error(node, "Expected a command")),
                }
            }
            NodeKind::Concat => {
                for &part in children {
                    self.expression(part)?;
                    match self.node_type(part)?.stack_type() {
                        Some(StackType::Int) => {
                            self.emit(part, CoreOpcode::IntToString, Operand::None)?;
                        }
                        Some(StackType::Long) => {
                            self.emit(part, CoreOpcode::LongToString, Operand::None)?;
                        }
                        Some(StackType::String) => {}
                        None => return Err(self.error(part, "Cannot concatenate this value")),
                    }
                }
                self.emit_int(node, CoreOpcode::JoinString, children.len())
            }
            _ => Err(self.error(node, "Expected an expression")),
        }
    }

    /// Push a boolean expression as `1` or `0`.
    fn materialize(&mut self, node: NodeId) -> GenResult {
        let on_true = self.labels.generate("cond_true");
        let on_false = self.labels.generate("cond_false");
        let end = self.labels.generate("cond_end");
        self.condition(node, &on_true, &on_false)?;
        self.bind(on_true)?;
        self.emit(node, CoreOpcode::PushIntConstant, Operand::Int(1))?;
        self.emit(node, CoreOpcode::Branch, Operand::Label(end.clone()))?;
        self.bind(on_false)?;
        self.emit(node, CoreOpcode::PushIntConstant, Operand::Int(0))?;
        self.bind(end)
    }

    /// Branch to `on_true` or `on_false` depending on a boolean expression.
    fn condition(&mut self, node: NodeId, on_true: &Label, on_false: &Label) -> GenResult {
        let tree = self.tree;
        if let (NodeKind::Binary { op }, [left, right]) = (tree.kind(node), tree.children(node)) {
            match op {
                Operator::And => {
                    let middle = self.labels.generate("and_true");
                    self.condition(*left, &middle, on_false)?;
                    self.bind(middle)?;
                    return self.condition(*right, on_true, on_false);
                }
                Operator::Or => {
                    let middle = self.labels.generate("or_false");
                    self.condition(*left, on_true, &middle)?;
                    self.bind(middle)?;
                    return self.condition(*right, on_true, on_false);
                }
                _ if op.is_comparison() => {
                    self.expression(*left)?;
                    self.expression(*right)?;
                    let long = *self.node_type(*left)? == Type::LONG;
                    self.emit(node, branch(*op, long), Operand::Label(on_true.clone()))?;
                    return self.emit(node, CoreOpcode::Branch, Operand::Label(on_false.clone()));
                }
                _ => {}
            }
        }
        self.expression(node)?;
        self.emit(node, CoreOpcode::BranchIfTrue, Operand::Label(on_true.clone()))?;
        self.emit(node, CoreOpcode::Branch, Operand::Label(on_false.clone()))
    }

    fn variable_opcode(
        &self,
        node: NodeId,
        info: &VariableInfo,
        push: bool,
    ) -> Result<CoreOpcode, CompileError> {
        let stack = self.stack_of(node, info.ty)?;
        let opcode = match (info.domain, stack, push) {
            (VariableDomain::Player, StackType::Int, true) => CoreOpcode::PushVarp,
            (VariableDomain::Player, StackType::Int, false) => CoreOpcode::PopVarp,
            (VariableDomain::PlayerBit, StackType::Int, true) => CoreOpcode::PushVarpBit,
            (VariableDomain::PlayerBit, StackType::Int, false) => CoreOpcode::PopVarpBit,
            (VariableDomain::ClientInt, StackType::Int, true) => CoreOpcode::PushVarcInt,
            (VariableDomain::ClientInt, StackType::Int, false) => CoreOpcode::PopVarcInt,
            (VariableDomain::ClientString, StackType::String, true) => CoreOpcode::PushVarcString,
            (VariableDomain::ClientString, StackType::String, false) => CoreOpcode::PopVarcString,
            (domain, _, _) => {
                return Err(self.error(
                    node,
                    format!("Variable %{} of type {} cannot live in the {domain:?} domain", info.name, info.ty),
                ))
            }
        };
        Ok(opcode)
    }
}

fn push_local(stack: StackType) -> CoreOpcode {
    match stack {
        StackType::Int => CoreOpcode::PushIntLocal,
        StackType::String => CoreOpcode::PushStringLocal,
        StackType::Long => CoreOpcode::PushLongLocal,
    }
}

fn pop_local(stack: StackType) -> CoreOpcode {
    match stack {
        StackType::Int => CoreOpcode::PopIntLocal,
        StackType::String => CoreOpcode::PopStringLocal,
        StackType::Long => CoreOpcode::PopLongLocal,
    }
}

fn discard(stack: StackType) -> CoreOpcode {
    match stack {
        StackType::Int => CoreOpcode::PopIntDiscard,
        StackType::String => CoreOpcode::PopStringDiscard,
        StackType::Long => CoreOpcode::PopLongDiscard,
    }
}

fn arithmetic(op: Operator, long: bool) -> CoreOpcode {
    match (op, long) {
        (Operator::Sub, false) => CoreOpcode::Sub,
        (Operator::Mul, false) => CoreOpcode::Mul,
        (Operator::Div, false) => CoreOpcode::Div,
        (Operator::Mod, false) => CoreOpcode::Mod,
        (Operator::Sub, true) => CoreOpcode::LongSub,
        (Operator::Mul, true) => CoreOpcode::LongMul,
        (Operator::Div, true) => CoreOpcode::LongDiv,
        (Operator::Mod, true) => CoreOpcode::LongMod,
        (_, true) => CoreOpcode::LongAdd,
        (_, false) => CoreOpcode::Add,
    }
}

fn branch(op: Operator, long: bool) -> CoreOpcode {
    match (op, long) {
        (Operator::NotEqual, false) => CoreOpcode::BranchNot,
        (Operator::Less, false) => CoreOpcode::BranchLessThan,
        (Operator::Greater, false) => CoreOpcode::BranchGreaterThan,
        (Operator::LessEqual, false) => CoreOpcode::BranchLessThanOrEquals,
        (Operator::GreaterEqual, false) => CoreOpcode::BranchGreaterThanOrEquals,
        (Operator::NotEqual, true) => CoreOpcode::LongBranchNot,
        (Operator::Less, true) => CoreOpcode::LongBranchLessThan,
        (Operator::Greater, true) => CoreOpcode::LongBranchGreaterThan,
        (Operator::LessEqual, true) => CoreOpcode::LongBranchLessThanOrEquals,
        (Operator::GreaterEqual, true) => CoreOpcode::LongBranchGreaterThanOrEquals,
        (_, true) => CoreOpcode::LongBranchEquals,
        (_, false) => CoreOpcode::BranchEquals,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
pub(crate) mod tests {
    use super::*;
    use crate::compiler::error::CollectingReporter;
    use crate::compiler::parser::parse_source;
    use crate::compiler::precheck::register_scripts;
    use crate::compiler::scope::DEFAULT_ARRAY_BUDGET;
    use crate::compiler::symbol::{CommandInfo, ConfigInfo, ConstantInfo, SymbolTable};
    use crate::compiler::token::LexicalTable;
    use crate::compiler::typeck::check_scripts;

    pub(crate) fn test_symbols() -> SymbolTable<'static> {
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
            .define_config(ConfigInfo {
                name: "coins".into(),
                ty: PrimitiveType::Obj,
                content_type: None,
                id: 995,
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

    /// Compile `source` through code generation, asserting it is error free.
    pub(crate) fn compile_src(source: &str) -> Vec<BinaryScript> {
        let table = LexicalTable::default();
        let mut reporter = CollectingReporter::new();
        let mut tree = parse_source(source, &table, &mut reporter);
        let root = test_symbols();
        let mut symbols = root.create_sub_table();
        let scripts = register_scripts(&tree, &mut symbols, &mut reporter);
        check_scripts(&mut tree, &symbols, &mut reporter, &scripts, DEFAULT_ARRAY_BUDGET);
        let map = InstructionMap::standard();
        let generated = generate(&tree, &scripts, &map, &mut reporter);
        assert!(!reporter.has_errors(), "errors: {:?}", reporter.errors());
        generated
    }

    /// Every instruction as `Opcode operand`, blocks concatenated.
    pub(crate) fn listing(script: &BinaryScript) -> Vec<String> {
        let map = InstructionMap::standard();
        script
            .blocks
            .blocks()
            .iter()
            .flat_map(Block::instructions)
            .map(|instruction| {
                let name = map.describe(instruction.opcode);
                match &instruction.operand {
                    Operand::None => name,
                    operand => format!("{name} {operand}"),
                }
            })
            .collect()
    }

    #[test]
    fn return_value_without_implicit_return() {
        let scripts = compile_src("[proc,a](int) return(1);");
        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts[0].name, "[proc,a]");
        assert_eq!(listing(&scripts[0]), vec!["PushIntConstant 1", "Return"]);
    }

    #[test]
    fn implicit_return_pushes_defaults() {
        let scripts = compile_src("[proc,a] [proc,b](int, string)");
        assert_eq!(listing(&scripts[0]), vec!["Return"]);
        assert_eq!(
            listing(&scripts[1]),
            vec!["PushIntConstant 0", "PushStringConstant \"\"", "Return"]
        );
    }

    #[test]
    fn locals_are_partitioned_by_stack_type() {
        let scripts =
            compile_src("[proc,a](int $x, string $s) def_int $y = $x; def_string $t = $s;");
        let script = &scripts[0];
        assert_eq!(
            listing(script),
            vec![
                "PushIntLocal 0",
                "PopIntLocal 1",
                "PushStringLocal 0",
                "PopStringLocal 1",
                "Return",
            ]
        );
        assert_eq!(script.parameters, StackCounts { int: 1, string: 1, long: 0 });
        assert_eq!(script.variables, StackCounts { int: 1, string: 1, long: 0 });
    }

    #[test]
    fn if_else_layout() {
        let scripts = compile_src("[proc,a](int $x)(int) if ($x = 1) { return(2); } else { return(3); }");
        let names: Vec<_> = scripts[0]
            .blocks
            .blocks()
            .iter()
            .map(|b| b.label.name.clone())
            .collect();
        assert_eq!(names, vec!["entry_0", "if_true_1", "if_false_3", "if_end_2"]);
        assert_eq!(
            listing(&scripts[0])[..4],
            [
                "PushIntLocal 0",
                "PushIntConstant 1",
                "BranchEquals if_true_1",
                "Branch if_false_3"
            ]
        );
    }

    #[test]
    fn while_loop_branches_back() {
        let scripts = compile_src(
            "[proc,a] def_int $i = 0; while ($i < 3) { $i = calc($i + 1); if ($i = 2) { break; } }",
        );
        let ops = listing(&scripts[0]);
        assert!(ops.contains(&"BranchLessThan while_body_2".to_string()));
        assert!(ops.contains(&"Branch while_end_3".to_string()));
        assert!(ops.contains(&"Branch while_start_1".to_string()));
    }

    #[test]
    fn switch_builds_table() {
        let scripts = compile_src(
            "[proc,a](int $x)(int) switch_int ($x) { case 1, ^max: return(1); case default: return(0); }",
        );
        let script = &scripts[0];
        assert_eq!(script.switch_tables.len(), 1);
        let table = &script.switch_tables[0];
        assert_eq!(table.cases.len(), 1);
        assert_eq!(table.cases[0].keys, vec![1, 10]);
        let ops = listing(script);
        assert_eq!(ops[1], "Switch table 0");
        // unmatched keys go to the default case
        assert!(ops[2].starts_with("Branch switch_case"));
    }

    #[test]
    fn expression_statements_discard_results() {
        let scripts = compile_src("[proc,pair](int, string) return(1, \"a\"); [proc,b] ~pair;");
        assert_eq!(
            listing(&scripts[1]),
            vec!["GosubWithParams [proc,pair]", "PopIntDiscard", "PopStringDiscard", "Return"]
        );
    }

    #[test]
    fn arrays_and_globals() {
        let scripts = compile_src("[proc,a] def_int $arr(4); $arr(1) = %points; %points = $arr(1);");
        assert_eq!(
            listing(&scripts[0]),
            vec![
                "PushIntConstant 4",
                "DefineArray 105",
                "PushIntConstant 1",
                "PushVarp 101",
                "PopArrayInt 0",
                "PushIntConstant 1",
                "PushArrayInt 0",
                "PopVarp 101",
                "Return",
            ]
        );
    }

    #[test]
    fn concatenation_converts_parts() {
        let scripts = compile_src("[proc,a](int $i) mes(\"v=<$i>\");");
        assert_eq!(
            listing(&scripts[0]),
            vec![
                "PushStringConstant \"v=\"",
                "PushIntLocal 0",
                "IntToString",
                "JoinString 2",
                "command#1000 0",
                "Return",
            ]
        );
    }

    #[test]
    fn logical_operators_short_circuit() {
        let scripts = compile_src("[proc,a](int $x)(boolean) return($x > 0 & $x < 9);");
        let names: Vec<_> = scripts[0]
            .blocks
            .blocks()
            .iter()
            .map(|b| b.label.name.clone())
            .collect();
        assert_eq!(
            names,
            vec!["entry_0", "and_true_4", "cond_true_1", "cond_false_2", "cond_end_3"]
        );
    }

    #[test]
    fn multi_assignment_pops_in_reverse() {
        let scripts = compile_src("[proc,a] def_int $a; def_int $b; $a, $b = 1, 2;");
        let ops = listing(&scripts[0]);
        assert_eq!(
            ops[4..],
            ["PushIntConstant 1", "PushIntConstant 2", "PopIntLocal 1", "PopIntLocal 0", "Return"]
        );
    }
}
