use thiserror::Error;

use crate::compiler::opcode::CoreOpcode;
use crate::compiler::types::StackType;

/// Fatal error of one script execution. The offending runtime is discarded.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("No executor registered for opcode {opcode} at address {address}")]
    MissingExecutor { opcode: u16, address: usize },
    #[error("{0:?} stack underflow")]
    StackUnderflow(StackType),
    #[error("Instruction at address {0} has no operand")]
    MissingOperand(usize),
    #[error("Operand at address {address} is not of type {expected}")]
    OperandType {
        address: usize,
        expected: &'static str,
    },
    #[error("Unknown script {0}")]
    UnknownScript(String),
    #[error("Unknown switch table {0}")]
    UnknownSwitchTable(i32),
    #[error("Invalid array size {0}")]
    ArraySize(i32),
    #[error("Index {index} out of bounds for array {array} of size {size}")]
    ArrayIndex { array: usize, index: i32, size: usize },
    #[error("Array {0} is not defined")]
    InvalidArray(usize),
    #[error("Local slot {0} is out of range")]
    LocalIndex(i32),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Call depth limit of {0} exceeded")]
    CallDepth(usize),
    #[error("No script is loaded")]
    NoScript,
    #[error("Error executing script: {script}")]
    Script {
        script: String,
        #[source]
        source: Box<ExecutionError>,
    },
}

impl ExecutionError {
    /// Attach the executing script's name, once.
    pub fn in_script(self, script: &str) -> Self {
        match self {
            wrapped @ ExecutionError::Script { .. } => wrapped,
            other => ExecutionError::Script {
                script: script.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The error underneath any script context.
    pub fn root(&self) -> &ExecutionError {
        match self {
            ExecutionError::Script { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Setup-time failure while filling an [`InstructionExecutorMap`].
///
/// [`InstructionExecutorMap`]: super::executor::InstructionExecutorMap
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("Opcode {0} already has an executor")]
    Duplicate(u16),
    #[error("Core opcode {0} has no concrete code")]
    Unmapped(CoreOpcode),
}
