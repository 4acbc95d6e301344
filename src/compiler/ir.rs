//! Block based instruction representation produced by code generation.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use super::opcode::InstructionMap;

/// A branch target: one block per label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Label {
    pub id: u32,
    pub name: String,
}

impl Label {
    /// The first block of a script; never removed.
    pub fn is_entry(&self) -> bool {
        self.id == 0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Hands out labels for one script; id 0 is the entry label.
#[derive(Debug, Default)]
pub struct LabelGenerator {
    next: u32,
}

impl LabelGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate(&mut self, prefix: &str) -> Label {
        let id = self.next;
        self.next += 1;
        Label {
            id,
            name: format!("{prefix}_{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Operand {
    None,
    Int(i32),
    String(String),
    Long(i64),
    Label(Label),
    /// Switch table id within the script.
    Switch(usize),
    /// Full name of the invoked script, `[trigger,name]`.
    Script(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Int(value) => write!(f, "{value}"),
            Operand::String(value) => write!(f, "{value:?}"),
            Operand::Long(value) => write!(f, "{value}L"),
            Operand::Label(label) => write!(f, "{label}"),
            Operand::Switch(id) => write!(f, "table {id}"),
            Operand::Script(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instruction {
    /// Concrete opcode, see [`InstructionMap`].
    pub opcode: u16,
    pub operand: Operand,
    #[serde(skip)]
    owner: Option<Label>,
}

impl Instruction {
    pub fn new(opcode: u16, operand: Operand) -> Self {
        Self {
            opcode,
            operand,
            owner: None,
        }
    }

    pub fn owner(&self) -> Option<&Label> {
        self.owner.as_ref()
    }

    pub fn int_operand(&self) -> Option<i32> {
        match self.operand {
            Operand::Int(value) => Some(value),
            _ => None,
        }
    }

    pub fn label_operand(&self) -> Option<&Label> {
        match &self.operand {
            Operand::Label(label) => Some(label),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrError {
    #[error("instruction already belongs to block {0}")]
    AlreadyOwned(Label),
    #[error("block {0} is already bound")]
    DuplicateBlock(Label),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub label: Label,
    instructions: Vec<Instruction>,
}

impl Block {
    pub fn new(label: Label) -> Self {
        Self {
            label,
            instructions: Vec::new(),
        }
    }

    /// Append an instruction; it must not belong to another block.
    pub fn add(&mut self, mut instruction: Instruction) -> Result<(), IrError> {
        if let Some(owner) = instruction.owner {
            return Err(IrError::AlreadyOwned(owner));
        }
        instruction.owner = Some(self.label.clone());
        self.instructions.push(instruction);
        Ok(())
    }

    /// Detach the instruction at `index`.
    pub fn remove(&mut self, index: usize) -> Option<Instruction> {
        if index >= self.instructions.len() {
            return None;
        }
        let mut instruction = self.instructions.remove(index);
        instruction.owner = None;
        Some(instruction)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Instruction> {
        self.instructions.get_mut(index)
    }

    pub fn last(&self) -> Option<&Instruction> {
        self.instructions.last()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// Blocks of one script in layout order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BlockMap {
    blocks: Vec<Block>,
}

impl BlockMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an empty block for `label` at the end of the layout.
    pub fn bind(&mut self, label: Label) -> Result<(), IrError> {
        if self.index_of(&label).is_some() {
            return Err(IrError::DuplicateBlock(label));
        }
        self.blocks.push(Block::new(label));
        Ok(())
    }

    pub fn index_of(&self, label: &Label) -> Option<usize> {
        self.blocks.iter().position(|block| block.label == *label)
    }

    pub fn get(&self, label: &Label) -> Option<&Block> {
        self.blocks.iter().find(|block| block.label == *label)
    }

    pub fn get_mut(&mut self, label: &Label) -> Option<&mut Block> {
        self.blocks.iter_mut().find(|block| block.label == *label)
    }

    pub fn remove(&mut self, label: &Label) -> Option<Block> {
        let index = self.index_of(label)?;
        Some(self.blocks.remove(index))
    }

    /// Label of the block laid out right after `label`.
    pub fn next(&self, label: &Label) -> Option<&Label> {
        let index = self.index_of(label)?;
        self.blocks.get(index + 1).map(|block| &block.label)
    }

    pub fn is_next_to(&self, label: &Label, other: &Label) -> bool {
        self.next(label) == Some(other)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut [Block] {
        &mut self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(Block::len).sum()
    }

    /// Human readable listing, one instruction per line.
    pub fn render(&self, map: &InstructionMap) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            out.push_str(&format!("{}:\n", block.label));
            for instruction in block.instructions() {
                let name = map.describe(instruction.opcode);
                match instruction.operand {
                    Operand::None => out.push_str(&format!("    {name}\n")),
                    ref operand => out.push_str(&format!("    {name} {operand}\n")),
                }
            }
        }
        out
    }
}
