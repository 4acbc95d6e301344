//! Parent-chained symbol tables for scripts, commands, configs, constants
//! and global variables.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::trigger::TriggerType;
use super::types::{PrimitiveType, Type};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptInfo {
    pub name: String,
    /// Predefined id from an `#id` annotation.
    pub id: Option<i32>,
    pub trigger: TriggerType,
    pub return_type: Type,
    pub arguments: Vec<Type>,
}

impl ScriptInfo {
    /// `[trigger,name]`, the form scripts are referred to in diagnostics.
    pub fn full_name(&self) -> String {
        format!("[{},{}]", self.trigger, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigInfo {
    pub name: String,
    pub ty: PrimitiveType,
    pub content_type: Option<PrimitiveType>,
    pub id: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConstantValue {
    Int(i32),
    Long(i64),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstantInfo {
    pub name: String,
    pub ty: PrimitiveType,
    pub value: ConstantValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandInfo {
    pub opcode: u16,
    pub name: String,
    pub arguments: Vec<Type>,
    pub return_type: Type,
    /// Whether the `.name(...)` form exists.
    pub alternative: bool,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum VariableDomain {
    Local,
    Player,
    PlayerBit,
    ClientInt,
    ClientString,
}

impl VariableDomain {
    /// Lookup order for `%name` references.
    pub const GLOBAL_PRECEDENCE: [VariableDomain; 4] = [
        VariableDomain::Player,
        VariableDomain::PlayerBit,
        VariableDomain::ClientInt,
        VariableDomain::ClientString,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableInfo {
    pub name: String,
    pub id: i32,
    pub ty: PrimitiveType,
    pub domain: VariableDomain,
}

/// What a name in the syntax tree resolved to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Symbol {
    Script(ScriptInfo),
    Command(CommandInfo),
    Config(ConfigInfo),
    Constant(ConstantInfo),
    Variable(VariableInfo),
    Array { index: usize, element: PrimitiveType },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolError {
    #[error("{kind} '{name}' is already defined")]
    Duplicate { kind: SymbolKind, name: String },
    #[error("symbols cannot be removed from this table")]
    RemovalNotAllowed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Script,
    Command,
    Config,
    Constant,
    Variable,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Script => "script",
            Self::Command => "command",
            Self::Config => "config",
            Self::Constant => "constant",
            Self::Variable => "variable",
        })
    }
}

/// Symbol table with an optional read-only parent.
///
/// Lookups fall back to the parent chain; definitions only ever touch this
/// table, so a parent never sees what its children define.
#[derive(Debug, Default)]
pub struct SymbolTable<'p> {
    parent: Option<&'p SymbolTable<'p>>,
    allow_removal: bool,
    scripts: IndexMap<(TriggerType, String), ScriptInfo>,
    commands: IndexMap<String, CommandInfo>,
    configs: HashMap<PrimitiveType, IndexMap<String, ConfigInfo>>,
    constants: IndexMap<String, ConstantInfo>,
    variables: HashMap<VariableDomain, IndexMap<String, VariableInfo>>,
}

impl<'p> SymbolTable<'p> {
    pub fn new() -> SymbolTable<'static> {
        SymbolTable::default()
    }

    /// Child table parented to `self` in which scripts may be removed again.
    pub fn create_sub_table(&self) -> SymbolTable<'_> {
        SymbolTable {
            parent: Some(self),
            allow_removal: true,
            ..SymbolTable::default()
        }
    }

    pub fn parent(&self) -> Option<&'p SymbolTable<'p>> {
        self.parent
    }

    // ── Scripts ───────────────────────────────────────────────────

    pub fn define_script(&mut self, info: ScriptInfo) -> Result<(), SymbolError> {
        let key = (info.trigger, info.name.clone());
        if self.scripts.contains_key(&key) {
            return Err(SymbolError::Duplicate {
                kind: SymbolKind::Script,
                name: info.full_name(),
            });
        }
        self.scripts.insert(key, info);
        Ok(())
    }

    pub fn lookup_script(&self, trigger: TriggerType, name: &str) -> Option<&ScriptInfo> {
        self.scripts
            .get(&(trigger, name.to_string()))
            .or_else(|| self.parent.and_then(|p| p.lookup_script(trigger, name)))
    }

    pub fn remove_script(
        &mut self,
        trigger: TriggerType,
        name: &str,
    ) -> Result<Option<ScriptInfo>, SymbolError> {
        if !self.allow_removal {
            return Err(SymbolError::RemovalNotAllowed);
        }
        Ok(self.scripts.shift_remove(&(trigger, name.to_string())))
    }

    /// Scripts defined in this table, in definition order.
    pub fn scripts(&self) -> impl Iterator<Item = &ScriptInfo> {
        self.scripts.values()
    }

    // ── Commands ──────────────────────────────────────────────────

    pub fn define_command(&mut self, info: CommandInfo) -> Result<(), SymbolError> {
        if self.commands.contains_key(&info.name) {
            return Err(SymbolError::Duplicate {
                kind: SymbolKind::Command,
                name: info.name,
            });
        }
        self.commands.insert(info.name.clone(), info);
        Ok(())
    }

    pub fn lookup_command(&self, name: &str) -> Option<&CommandInfo> {
        self.commands
            .get(name)
            .or_else(|| self.parent.and_then(|p| p.lookup_command(name)))
    }

    // ── Configs ───────────────────────────────────────────────────

    pub fn define_config(&mut self, info: ConfigInfo) -> Result<(), SymbolError> {
        let partition = self.configs.entry(info.ty).or_default();
        if partition.contains_key(&info.name) {
            return Err(SymbolError::Duplicate {
                kind: SymbolKind::Config,
                name: info.name,
            });
        }
        partition.insert(info.name.clone(), info);
        Ok(())
    }

    pub fn lookup_config(&self, ty: PrimitiveType, name: &str) -> Option<&ConfigInfo> {
        self.configs
            .get(&ty)
            .and_then(|partition| partition.get(name))
            .or_else(|| self.parent.and_then(|p| p.lookup_config(ty, name)))
    }

    /// First config named `name` in any type partition.
    pub fn lookup_config_any(&self, name: &str) -> Option<&ConfigInfo> {
        PrimitiveType::ALL
            .into_iter()
            .find_map(|ty| self.lookup_config(ty, name))
    }

    // ── Constants ─────────────────────────────────────────────────

    pub fn define_constant(&mut self, info: ConstantInfo) -> Result<(), SymbolError> {
        if self.constants.contains_key(&info.name) {
            return Err(SymbolError::Duplicate {
                kind: SymbolKind::Constant,
                name: info.name,
            });
        }
        self.constants.insert(info.name.clone(), info);
        Ok(())
    }

    pub fn lookup_constant(&self, name: &str) -> Option<&ConstantInfo> {
        self.constants
            .get(name)
            .or_else(|| self.parent.and_then(|p| p.lookup_constant(name)))
    }

    // ── Variables ─────────────────────────────────────────────────

    pub fn define_variable(&mut self, info: VariableInfo) -> Result<(), SymbolError> {
        let partition = self.variables.entry(info.domain).or_default();
        if partition.contains_key(&info.name) {
            return Err(SymbolError::Duplicate {
                kind: SymbolKind::Variable,
                name: info.name,
            });
        }
        partition.insert(info.name.clone(), info);
        Ok(())
    }

    pub fn lookup_variable_in(&self, domain: VariableDomain, name: &str) -> Option<&VariableInfo> {
        self.variables
            .get(&domain)
            .and_then(|partition| partition.get(name))
            .or_else(|| self.parent.and_then(|p| p.lookup_variable_in(domain, name)))
    }

    /// Resolve a `%name` reference: player, then player bit, then client
    /// variables. A name present in several domains is not an error.
    pub fn lookup_variable(&self, name: &str) -> Option<&VariableInfo> {
        VariableDomain::GLOBAL_PRECEDENCE
            .into_iter()
            .find_map(|domain| self.lookup_variable_in(domain, name))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config(name: &str, id: i32) -> ConfigInfo {
        ConfigInfo {
            name: name.into(),
            ty: PrimitiveType::Obj,
            content_type: None,
            id,
        }
    }

    fn variable(name: &str, domain: VariableDomain, id: i32) -> VariableInfo {
        VariableInfo {
            name: name.into(),
            id,
            ty: PrimitiveType::Int,
            domain,
        }
    }

    #[test]
    fn child_sees_parent_but_not_reverse() {
        let mut root = SymbolTable::new();
        root.define_config(config("coins", 995)).unwrap();
        let mut child = root.create_sub_table();
        child.define_config(config("bones", 526)).unwrap();

        assert_eq!(child.lookup_config(PrimitiveType::Obj, "coins").unwrap().id, 995);
        assert!(child.lookup_config(PrimitiveType::Obj, "bones").is_some());
        assert!(root.lookup_config(PrimitiveType::Obj, "bones").is_none());
        assert!(child.lookup_config(PrimitiveType::Npc, "coins").is_none());
    }

    #[test]
    fn duplicates_are_rejected_locally_only() {
        let mut root = SymbolTable::new();
        root.define_config(config("coins", 1)).unwrap();
        assert_eq!(
            root.define_config(config("coins", 2)),
            Err(SymbolError::Duplicate {
                kind: SymbolKind::Config,
                name: "coins".into()
            })
        );
        let mut child = root.create_sub_table();
        assert!(child.define_config(config("coins", 3)).is_ok());
        assert_eq!(child.lookup_config(PrimitiveType::Obj, "coins").unwrap().id, 3);
    }

    #[test]
    fn variable_lookup_follows_domain_precedence() {
        let mut table = SymbolTable::new();
        table.define_variable(variable("x", VariableDomain::ClientInt, 3)).unwrap();
        table.define_variable(variable("x", VariableDomain::PlayerBit, 2)).unwrap();
        assert_eq!(table.lookup_variable("x").unwrap().domain, VariableDomain::PlayerBit);
        table.define_variable(variable("x", VariableDomain::Player, 1)).unwrap();
        assert_eq!(table.lookup_variable("x").unwrap().id, 1);
        assert!(table.lookup_variable("y").is_none());
    }

    #[test]
    fn script_removal_requires_sub_table() {
        let info = ScriptInfo {
            name: "test".into(),
            id: None,
            trigger: TriggerType::Proc,
            return_type: Type::VOID,
            arguments: Vec::new(),
        };
        let mut root = SymbolTable::new();
        root.define_script(info.clone()).unwrap();
        assert_eq!(
            root.remove_script(TriggerType::Proc, "test"),
            Err(SymbolError::RemovalNotAllowed)
        );
        let mut child = root.create_sub_table();
        child.define_script(info).unwrap();
        assert!(child.remove_script(TriggerType::Proc, "test").unwrap().is_some());
        // the parent's definition is still visible
        assert!(child.lookup_script(TriggerType::Proc, "test").is_some());
    }

    #[test]
    fn duplicate_script_keeps_first() {
        let mut table = SymbolTable::new();
        let first = ScriptInfo {
            name: "a".into(),
            id: Some(4),
            trigger: TriggerType::Proc,
            return_type: Type::INT,
            arguments: Vec::new(),
        };
        let second = ScriptInfo {
            return_type: Type::STRING,
            ..first.clone()
        };
        table.define_script(first).unwrap();
        assert!(table.define_script(second).is_err());
        assert_eq!(
            table.lookup_script(TriggerType::Proc, "a").unwrap().return_type,
            Type::INT
        );
        assert_eq!(table.scripts().count(), 1);
    }
}
