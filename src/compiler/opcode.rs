//! Abstract core opcodes and their translation to concrete numbering.

use std::collections::HashMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ir::{Instruction, Operand};

/// Numbering-independent identity of a core instruction.
///
/// Commands are not core opcodes; they carry their configured opcode
/// directly.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoreOpcode {
    PushIntConstant,
    PushStringConstant,
    PushLongConstant,
    PopIntDiscard,
    PopStringDiscard,
    PopLongDiscard,
    PushIntLocal,
    PushStringLocal,
    PushLongLocal,
    PopIntLocal,
    PopStringLocal,
    PopLongLocal,
    PushVarp,
    PushVarpBit,
    PushVarcInt,
    PushVarcString,
    PopVarp,
    PopVarpBit,
    PopVarcInt,
    PopVarcString,
    DefineArray,
    PushArrayInt,
    PopArrayInt,
    Branch,
    BranchEquals,
    BranchNot,
    BranchLessThan,
    BranchGreaterThan,
    BranchLessThanOrEquals,
    BranchGreaterThanOrEquals,
    BranchIfTrue,
    BranchIfFalse,
    LongBranchEquals,
    LongBranchNot,
    LongBranchLessThan,
    LongBranchGreaterThan,
    LongBranchLessThanOrEquals,
    LongBranchGreaterThanOrEquals,
    Switch,
    Return,
    JoinString,
    IntToString,
    LongToString,
    GosubWithParams,
    JumpWithParams,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    LongAdd,
    LongSub,
    LongMul,
    LongDiv,
    LongMod,
}

impl CoreOpcode {
    pub const ALL: [CoreOpcode; 55] = [
        CoreOpcode::PushIntConstant,
        CoreOpcode::PushStringConstant,
        CoreOpcode::PushLongConstant,
        CoreOpcode::PopIntDiscard,
        CoreOpcode::PopStringDiscard,
        CoreOpcode::PopLongDiscard,
        CoreOpcode::PushIntLocal,
        CoreOpcode::PushStringLocal,
        CoreOpcode::PushLongLocal,
        CoreOpcode::PopIntLocal,
        CoreOpcode::PopStringLocal,
        CoreOpcode::PopLongLocal,
        CoreOpcode::PushVarp,
        CoreOpcode::PushVarpBit,
        CoreOpcode::PushVarcInt,
        CoreOpcode::PushVarcString,
        CoreOpcode::PopVarp,
        CoreOpcode::PopVarpBit,
        CoreOpcode::PopVarcInt,
        CoreOpcode::PopVarcString,
        CoreOpcode::DefineArray,
        CoreOpcode::PushArrayInt,
        CoreOpcode::PopArrayInt,
        CoreOpcode::Branch,
        CoreOpcode::BranchEquals,
        CoreOpcode::BranchNot,
        CoreOpcode::BranchLessThan,
        CoreOpcode::BranchGreaterThan,
        CoreOpcode::BranchLessThanOrEquals,
        CoreOpcode::BranchGreaterThanOrEquals,
        CoreOpcode::BranchIfTrue,
        CoreOpcode::BranchIfFalse,
        CoreOpcode::LongBranchEquals,
        CoreOpcode::LongBranchNot,
        CoreOpcode::LongBranchLessThan,
        CoreOpcode::LongBranchGreaterThan,
        CoreOpcode::LongBranchLessThanOrEquals,
        CoreOpcode::LongBranchGreaterThanOrEquals,
        CoreOpcode::Switch,
        CoreOpcode::Return,
        CoreOpcode::JoinString,
        CoreOpcode::IntToString,
        CoreOpcode::LongToString,
        CoreOpcode::GosubWithParams,
        CoreOpcode::JumpWithParams,
        CoreOpcode::Add,
        CoreOpcode::Sub,
        CoreOpcode::Mul,
        CoreOpcode::Div,
        CoreOpcode::Mod,
        CoreOpcode::LongAdd,
        CoreOpcode::LongSub,
        CoreOpcode::LongMul,
        CoreOpcode::LongDiv,
        CoreOpcode::LongMod,
    ];

    /// Whether the operand is encoded in 32 bits rather than 8. A property
    /// of the opcode, never of the call site.
    pub fn is_large_operand(self) -> bool {
        !matches!(
            self,
            Self::Return
                | Self::PopIntDiscard
                | Self::PopStringDiscard
                | Self::PopLongDiscard
                | Self::IntToString
                | Self::LongToString
                | Self::Add
                | Self::Sub
                | Self::Mul
                | Self::Div
                | Self::Mod
                | Self::LongAdd
                | Self::LongSub
                | Self::LongMul
                | Self::LongDiv
                | Self::LongMod
        )
    }

    /// Instructions whose operand is a branch target label.
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Self::Branch
                | Self::BranchEquals
                | Self::BranchNot
                | Self::BranchLessThan
                | Self::BranchGreaterThan
                | Self::BranchLessThanOrEquals
                | Self::BranchGreaterThanOrEquals
                | Self::BranchIfTrue
                | Self::BranchIfFalse
                | Self::LongBranchEquals
                | Self::LongBranchNot
                | Self::LongBranchLessThan
                | Self::LongBranchGreaterThan
                | Self::LongBranchLessThanOrEquals
                | Self::LongBranchGreaterThanOrEquals
        )
    }

    /// Instructions that transfer control; nothing may be folded across them.
    pub fn is_flow(self) -> bool {
        self.is_branch()
            || matches!(
                self,
                Self::Switch | Self::Return | Self::GosubWithParams | Self::JumpWithParams
            )
    }

    /// Control never reaches the instruction after these.
    pub fn ends_flow(self) -> bool {
        matches!(self, Self::Branch | Self::Return | Self::JumpWithParams)
    }
}

impl fmt::Display for CoreOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstructionMapError {
    #[error("core opcode {0} is already mapped")]
    DuplicateOpcode(CoreOpcode),
    #[error("code {code} is already used by {existing}")]
    DuplicateCode { code: u16, existing: CoreOpcode },
    #[error("core opcode {0} has no concrete code")]
    Unmapped(CoreOpcode),
}

/// Translation between [`CoreOpcode`] and the concrete numeric opcodes that
/// end up in generated instructions.
#[derive(Debug, Clone, Default)]
pub struct InstructionMap {
    codes: HashMap<CoreOpcode, u16>,
    cores: HashMap<u16, CoreOpcode>,
}

impl InstructionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every core opcode numbered by its declaration order.
    pub fn standard() -> Self {
        let mut map = Self::new();
        for opcode in CoreOpcode::ALL {
            map.codes.insert(opcode, opcode as u16);
            map.cores.insert(opcode as u16, opcode);
        }
        map
    }

    pub fn register(&mut self, opcode: CoreOpcode, code: u16) -> Result<(), InstructionMapError> {
        if self.codes.contains_key(&opcode) {
            return Err(InstructionMapError::DuplicateOpcode(opcode));
        }
        if let Some(&existing) = self.cores.get(&code) {
            return Err(InstructionMapError::DuplicateCode { code, existing });
        }
        self.codes.insert(opcode, code);
        self.cores.insert(code, opcode);
        Ok(())
    }

    /// Replace the code of an already mapped opcode.
    pub fn remap(&mut self, opcode: CoreOpcode, code: u16) -> Result<(), InstructionMapError> {
        let previous = self
            .codes
            .remove(&opcode)
            .ok_or(InstructionMapError::Unmapped(opcode))?;
        self.cores.remove(&previous);
        if let Some(&existing) = self.cores.get(&code) {
            self.codes.insert(opcode, previous);
            self.cores.insert(previous, opcode);
            return Err(InstructionMapError::DuplicateCode { code, existing });
        }
        self.codes.insert(opcode, code);
        self.cores.insert(code, opcode);
        Ok(())
    }

    pub fn lookup(&self, opcode: CoreOpcode) -> Result<u16, InstructionMapError> {
        self.codes
            .get(&opcode)
            .copied()
            .ok_or(InstructionMapError::Unmapped(opcode))
    }

    /// Core opcode a concrete code stands for; `None` for command codes.
    pub fn core(&self, code: u16) -> Option<CoreOpcode> {
        self.cores.get(&code).copied()
    }

    pub fn is(&self, instruction: &Instruction, opcode: CoreOpcode) -> bool {
        self.codes.get(&opcode) == Some(&instruction.opcode)
    }

    /// Rewrite `instruction` in place into `opcode` with `operand`.
    pub fn transform(
        &self,
        instruction: &mut Instruction,
        opcode: CoreOpcode,
        operand: Operand,
    ) -> Result<(), InstructionMapError> {
        instruction.opcode = self.lookup(opcode)?;
        instruction.operand = operand;
        Ok(())
    }

    /// Whether every core opcode has a code.
    pub fn is_ready(&self) -> bool {
        CoreOpcode::ALL.iter().all(|op| self.codes.contains_key(op))
    }

    /// Display name of a concrete code: the core opcode, or `command#<code>`.
    pub fn describe(&self, code: u16) -> String {
        match self.core(code) {
            Some(core) => core.to_string(),
            None => format!("command#{code}"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn standard_map_is_ready_and_bijective() {
        let map = InstructionMap::standard();
        assert!(map.is_ready());
        for opcode in CoreOpcode::ALL {
            let code = map.lookup(opcode).unwrap();
            assert_eq!(map.core(code), Some(opcode));
        }
    }

    #[test]
    fn register_rejects_duplicates() {
        let mut map = InstructionMap::new();
        map.register(CoreOpcode::Add, 10).unwrap();
        assert_eq!(
            map.register(CoreOpcode::Add, 11),
            Err(InstructionMapError::DuplicateOpcode(CoreOpcode::Add))
        );
        assert_eq!(
            map.register(CoreOpcode::Sub, 10),
            Err(InstructionMapError::DuplicateCode { code: 10, existing: CoreOpcode::Add })
        );
        assert!(!map.is_ready());
    }

    #[test]
    fn remap_keeps_map_consistent_on_clash() {
        let mut map = InstructionMap::standard();
        let sub = map.lookup(CoreOpcode::Sub).unwrap();
        assert!(map.remap(CoreOpcode::Add, sub).is_err());
        assert_eq!(map.lookup(CoreOpcode::Add).unwrap(), CoreOpcode::Add as u16);
        map.remap(CoreOpcode::Add, 900).unwrap();
        assert_eq!(map.core(900), Some(CoreOpcode::Add));
        assert_eq!(map.core(CoreOpcode::Add as u16), None);
    }

    #[test]
    fn is_matches_concrete_code() {
        let map = InstructionMap::standard();
        let push = Instruction::new(map.lookup(CoreOpcode::PushIntConstant).unwrap(), Operand::Int(1));
        assert!(map.is(&push, CoreOpcode::PushIntConstant));
        assert!(!map.is(&push, CoreOpcode::Add));
    }

    #[test]
    fn transform_rewrites_opcode_and_operand() {
        let map = InstructionMap::standard();
        let mut instruction = Instruction::new(map.lookup(CoreOpcode::Add).unwrap(), Operand::None);
        map.transform(&mut instruction, CoreOpcode::PushIntConstant, Operand::Int(7))
            .unwrap();
        assert!(map.is(&instruction, CoreOpcode::PushIntConstant));
        assert_eq!(instruction.int_operand(), Some(7));
    }

    #[test]
    fn operand_sizes_are_static() {
        assert!(!CoreOpcode::Return.is_large_operand());
        assert!(!CoreOpcode::Add.is_large_operand());
        assert!(CoreOpcode::PushIntConstant.is_large_operand());
        assert!(CoreOpcode::Branch.is_flow());
        assert!(CoreOpcode::Switch.is_flow());
        assert!(!CoreOpcode::Switch.is_branch());
    }
}
