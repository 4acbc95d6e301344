//! Jump tables for switch statements.

use serde::Serialize;

use super::ir::Label;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwitchCase {
    pub keys: Vec<i32>,
    pub label: Label,
}

/// One switch site: ordered cases, each a key set and its target block.
/// Unmatched keys fall through to the instruction after `SWITCH`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwitchTable {
    pub id: usize,
    pub cases: Vec<SwitchCase>,
}

impl SwitchTable {
    pub fn add_case(&mut self, keys: Vec<i32>, label: Label) {
        self.cases.push(SwitchCase { keys, label });
    }

    pub fn lookup(&self, key: i32) -> Option<&Label> {
        self.cases
            .iter()
            .find(|case| case.keys.contains(&key))
            .map(|case| &case.label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &Label> {
        self.cases.iter().map(|case| &case.label)
    }
}

/// Switch tables of one script, ids assigned in order.
#[derive(Debug, Default)]
pub struct SwitchMap {
    tables: Vec<SwitchTable>,
}

impl SwitchMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an empty table and return its id.
    pub fn generate(&mut self) -> usize {
        let id = self.tables.len();
        self.tables.push(SwitchTable {
            id,
            cases: Vec::new(),
        });
        id
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut SwitchTable> {
        self.tables.get_mut(id)
    }

    pub fn tables(&self) -> &[SwitchTable] {
        &self.tables
    }

    pub fn into_tables(self) -> Vec<SwitchTable> {
        self.tables
    }
}
