use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::compiler::link::LinkError;
use crate::compiler::opcode::{CoreOpcode, InstructionMapError};
use crate::compiler::symbol::SymbolError;
use crate::compiler::types::PrimitiveType;
use crate::runtime::error::{ExecutionError, RegistrationError};

/// Failure to load, save or apply a [`CompilerConfig`].
///
/// [`CompilerConfig`]: crate::config::CompilerConfig
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error on {path}: {source}", path = .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Symbol(#[from] SymbolError),
    #[error("Invalid opcode mapping: {0}")]
    InstructionMap(#[from] InstructionMapError),
    #[error("Constant '{name}' does not hold a {ty} value")]
    ConstantType { name: String, ty: PrimitiveType },
    #[error("Type {ty} cannot be used for '{name}'")]
    UnusableType { name: String, ty: PrimitiveType },
    #[error("Command '{name}' uses opcode {code}, which belongs to {core}")]
    OpcodeClash {
        name: String,
        code: u16,
        core: CoreOpcode,
    },
}

/// Top-level error of the library entry points and the CLI.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to read {path}: {source}", path = .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Compilation failed with {0} error(s)")]
    Compile(usize),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("Script {0} suspended and cannot be resumed here")]
    Suspended(String),
}

impl AppError {
    /// The message followed by every underlying cause, `: `-separated.
    /// Causes a message already spells out are not repeated.
    pub fn report(&self) -> String {
        let mut text = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(error) = cause {
            let message = error.to_string();
            if !text.contains(&message) {
                text.push_str(": ");
                text.push_str(&message);
            }
            cause = error.source();
        }
        text
    }
}

impl Serialize for AppError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.report())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_includes_execution_cause() {
        let error = AppError::from(ExecutionError::DivisionByZero.in_script("[proc,div]"));
        assert_eq!(error.to_string(), "Error executing script: [proc,div]");
        assert_eq!(error.report(), "Error executing script: [proc,div]: Division by zero");
        let json = serde_json::to_string(&error).unwrap_or_default();
        assert!(json.contains("Division by zero"));
    }

    #[test]
    fn report_skips_causes_already_shown() {
        let error = AppError::Read {
            path: PathBuf::from("missing.rs2"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert_eq!(error.report(), "Failed to read missing.rs2: not found");
    }
}
