//! JSON configuration: the declarations scripts compile against, opcode
//! numbering and runtime pool sizes.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compiler::opcode::{CoreOpcode, InstructionMap};
use crate::compiler::scope::DEFAULT_ARRAY_BUDGET;
use crate::compiler::symbol::{
    CommandInfo, ConfigInfo, ConstantInfo, ConstantValue, SymbolTable, VariableDomain, VariableInfo,
};
use crate::compiler::types::{PrimitiveType, StackType, Type};
use crate::compiler::CompilerOptions;
use crate::error::ConfigError;
use crate::runtime::executor::PoolSizes;

// ── Declarations ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CommandDecl {
    pub name: String,
    pub opcode: u16,
    #[serde(default)]
    pub arguments: Vec<PrimitiveType>,
    #[serde(default)]
    pub returns: Vec<PrimitiveType>,
    /// Whether the `.name(...)` form exists.
    #[serde(default)]
    pub alternative: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConfigDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: PrimitiveType,
    pub id: i32,
    /// Element type of enums and params.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<PrimitiveType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ConstantLiteral {
    Bool(bool),
    Number(i64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConstantDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: PrimitiveType,
    pub value: ConstantLiteral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VariableDecl {
    pub name: String,
    pub domain: VariableDomain,
    #[serde(rename = "type")]
    pub ty: PrimitiveType,
    pub id: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RuntimeConfig {
    pub pool_size: usize,
    pub frame_pool_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let sizes = PoolSizes::default();
        Self {
            pool_size: sizes.runtimes,
            frame_pool_size: sizes.frames,
        }
    }
}

/// Everything outside the script sources that compilation and execution
/// depend on. Every field is optional in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CompilerConfig {
    pub array_budget: usize,
    pub optimize: bool,
    pub commands: Vec<CommandDecl>,
    pub configs: Vec<ConfigDecl>,
    pub constants: Vec<ConstantDecl>,
    pub variables: Vec<VariableDecl>,
    /// Concrete code overrides; unlisted opcodes keep their standard code.
    pub opcodes: BTreeMap<CoreOpcode, u16>,
    pub runtime: RuntimeConfig,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            array_budget: DEFAULT_ARRAY_BUDGET,
            optimize: true,
            commands: Vec::new(),
            configs: Vec::new(),
            constants: Vec::new(),
            variables: Vec::new(),
            opcodes: BTreeMap::new(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl CompilerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&data)?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Write pretty JSON through a sibling temp file so a failed write
    /// never leaves a truncated config behind.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut tmp_name = OsString::from(path.file_name().unwrap_or_default());
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);
        let io = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        fs::write(&tmp_path, json).map_err(io)?;
        fs::rename(&tmp_path, path).map_err(io)
    }

    /// JSON schema of the configuration format.
    pub fn schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(CompilerConfig)).unwrap_or_default()
    }

    pub fn options(&self) -> CompilerOptions {
        CompilerOptions {
            array_budget: self.array_budget,
            optimize: self.optimize,
        }
    }

    pub fn pool_sizes(&self) -> PoolSizes {
        PoolSizes {
            runtimes: self.runtime.pool_size,
            frames: self.runtime.frame_pool_size,
        }
    }

    /// Standard numbering with the `opcodes` overrides applied. Command
    /// opcodes may not collide with any core code.
    pub fn instruction_map(&self) -> Result<InstructionMap, ConfigError> {
        let mut map = InstructionMap::new();
        for (&opcode, &code) in &self.opcodes {
            map.register(opcode, code)?;
        }
        for opcode in CoreOpcode::ALL {
            if !self.opcodes.contains_key(&opcode) {
                map.register(opcode, opcode as u16)?;
            }
        }
        for command in &self.commands {
            if let Some(core) = map.core(command.opcode) {
                return Err(ConfigError::OpcodeClash {
                    name: command.name.clone(),
                    code: command.opcode,
                    core,
                });
            }
        }
        Ok(map)
    }
}

// ── Symbol table ────────────────────────────────────────────────

impl SymbolTable<'static> {
    /// Root table holding every declaration of `config`.
    pub fn from_config(config: &CompilerConfig) -> Result<Self, ConfigError> {
        let mut table = SymbolTable::new();
        for command in &config.commands {
            for &ty in &command.arguments {
                declarable(&command.name, ty)?;
            }
            for &ty in &command.returns {
                declarable(&command.name, ty)?;
            }
            table.define_command(CommandInfo {
                opcode: command.opcode,
                name: command.name.clone(),
                arguments: command.arguments.iter().copied().map(Type::from).collect(),
                return_type: Type::tuple(command.returns.iter().copied().map(Type::from)),
                alternative: command.alternative,
            })?;
        }
        for config_decl in &config.configs {
            if !config_decl.ty.is_config() {
                return Err(ConfigError::UnusableType {
                    name: config_decl.name.clone(),
                    ty: config_decl.ty,
                });
            }
            table.define_config(ConfigInfo {
                name: config_decl.name.clone(),
                ty: config_decl.ty,
                content_type: config_decl.content_type,
                id: config_decl.id,
            })?;
        }
        for constant in &config.constants {
            table.define_constant(ConstantInfo {
                name: constant.name.clone(),
                ty: constant.ty,
                value: constant_value(constant)?,
            })?;
        }
        for variable in &config.variables {
            declarable(&variable.name, variable.ty)?;
            if variable.domain == VariableDomain::Local {
                return Err(ConfigError::UnusableType {
                    name: variable.name.clone(),
                    ty: variable.ty,
                });
            }
            table.define_variable(VariableInfo {
                name: variable.name.clone(),
                id: variable.id,
                ty: variable.ty,
                domain: variable.domain,
            })?;
        }
        debug!(
            commands = config.commands.len(),
            configs = config.configs.len(),
            constants = config.constants.len(),
            variables = config.variables.len(),
            "built symbol table"
        );
        Ok(table)
    }
}

fn declarable(name: &str, ty: PrimitiveType) -> Result<(), ConfigError> {
    if ty.stack_type().is_none() {
        return Err(ConfigError::UnusableType {
            name: name.to_string(),
            ty,
        });
    }
    Ok(())
}

fn constant_value(constant: &ConstantDecl) -> Result<ConstantValue, ConfigError> {
    let mismatch = || ConfigError::ConstantType {
        name: constant.name.clone(),
        ty: constant.ty,
    };
    let value = match (constant.ty.stack_type(), &constant.value) {
        (Some(StackType::Int), ConstantLiteral::Bool(value)) if constant.ty == PrimitiveType::Bool => {
            ConstantValue::Int(i32::from(*value))
        }
        (Some(StackType::Int), ConstantLiteral::Number(value)) if constant.ty != PrimitiveType::Bool => {
            ConstantValue::Int(i32::try_from(*value).map_err(|_| mismatch())?)
        }
        (Some(StackType::Long), ConstantLiteral::Number(value)) => ConstantValue::Long(*value),
        (Some(StackType::String), ConstantLiteral::Text(value)) => ConstantValue::String(value.clone()),
        _ => return Err(mismatch()),
    };
    Ok(value)
}
