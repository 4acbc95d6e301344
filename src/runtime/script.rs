//! Linked, executable scripts and the cache they are looked up in.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use super::error::ExecutionError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Operand {
    Int(i32),
    String(String),
    Long(i64),
}

/// A script with absolute branch targets. `instructions` and `operands`
/// are parallel; every switch table maps a key to an address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Script {
    pub name: String,
    pub instructions: Vec<u16>,
    pub operands: Vec<Operand>,
    pub switch_tables: Vec<HashMap<i32, usize>>,
    pub int_arguments: usize,
    pub string_arguments: usize,
    pub long_arguments: usize,
    /// Positions, among the popped int arguments, of the array slots lent
    /// by the caller. Entry `i` binds array `i` of this script.
    pub array_arguments: Vec<usize>,
}

impl Script {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn opcode(&self, address: usize) -> Option<u16> {
        self.instructions.get(address).copied()
    }

    pub fn operand(&self, address: usize) -> Result<&Operand, ExecutionError> {
        self.operands
            .get(address)
            .ok_or(ExecutionError::MissingOperand(address))
    }

    pub fn int_operand(&self, address: usize) -> Result<i32, ExecutionError> {
        match self.operand(address)? {
            Operand::Int(value) => Ok(*value),
            _ => Err(ExecutionError::OperandType {
                address,
                expected: "int",
            }),
        }
    }

    pub fn string_operand(&self, address: usize) -> Result<&str, ExecutionError> {
        match self.operand(address)? {
            Operand::String(value) => Ok(value),
            _ => Err(ExecutionError::OperandType {
                address,
                expected: "string",
            }),
        }
    }

    pub fn long_operand(&self, address: usize) -> Result<i64, ExecutionError> {
        match self.operand(address)? {
            Operand::Long(value) => Ok(*value),
            _ => Err(ExecutionError::OperandType {
                address,
                expected: "long",
            }),
        }
    }

    /// Target address of `key` in switch table `table`, if the key has a case.
    pub fn switch_target(&self, table: i32, key: i32) -> Result<Option<usize>, ExecutionError> {
        let cases = usize::try_from(table)
            .ok()
            .and_then(|index| self.switch_tables.get(index))
            .ok_or(ExecutionError::UnknownSwitchTable(table))?;
        Ok(cases.get(&key).copied())
    }
}

/// Linked scripts by `[trigger,name]`.
#[derive(Debug, Clone, Default)]
pub struct ScriptCache {
    scripts: HashMap<String, Arc<Script>>,
}

impl ScriptCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `script`, returning the one it replaced.
    pub fn insert(&mut self, script: Script) -> Option<Arc<Script>> {
        self.scripts.insert(script.name.clone(), Arc::new(script))
    }

    pub fn get(&self, name: &str) -> Option<Arc<Script>> {
        self.scripts.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scripts.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// Script names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.scripts.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl FromIterator<Script> for ScriptCache {
    fn from_iter<I: IntoIterator<Item = Script>>(iter: I) -> Self {
        let mut cache = Self::new();
        for script in iter {
            cache.insert(script);
        }
        cache
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn operands_are_typed() {
        let script = Script {
            name: "[proc,a]".into(),
            instructions: vec![0, 1, 2],
            operands: vec![Operand::Int(4), Operand::String("x".into()), Operand::Long(9)],
            ..Script::default()
        };
        assert_eq!(script.int_operand(0).unwrap(), 4);
        assert_eq!(script.string_operand(1).unwrap(), "x");
        assert_eq!(script.long_operand(2).unwrap(), 9);
        assert!(matches!(
            script.int_operand(1),
            Err(ExecutionError::OperandType { address: 1, .. })
        ));
        assert!(matches!(script.operand(3), Err(ExecutionError::MissingOperand(3))));
    }

    #[test]
    fn switch_lookup() {
        let script = Script {
            switch_tables: vec![HashMap::from([(1, 10), (2, 12)])],
            ..Script::default()
        };
        assert_eq!(script.switch_target(0, 2).unwrap(), Some(12));
        assert_eq!(script.switch_target(0, 3).unwrap(), None);
        assert!(matches!(
            script.switch_target(1, 1),
            Err(ExecutionError::UnknownSwitchTable(1))
        ));
    }

    #[test]
    fn cache_by_name() {
        let cache: ScriptCache = ["[proc,b]", "[proc,a]"]
            .into_iter()
            .map(|name| Script {
                name: name.into(),
                ..Script::default()
            })
            .collect();
        assert_eq!(cache.names(), vec!["[proc,a]", "[proc,b]"]);
        assert!(cache.get("[proc,a]").is_some());
        assert!(cache.get("[label,a]").is_none());
    }
}
