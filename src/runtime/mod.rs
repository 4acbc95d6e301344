//! Bytecode interpreter for linked scripts.

pub mod error;
pub mod executor;
pub mod ops;
pub mod pool;
pub mod script;
pub mod vm;

pub use error::{ExecutionError, RegistrationError};
pub use executor::{Execution, ExecutionContext, InstructionExecutorMap, PoolSizes, ScriptExecutor};
pub use script::{Script, ScriptCache};
pub use vm::{ReturnValues, ScriptRuntime};

use crate::compiler::opcode::InstructionMap;

/// An executor map holding a handler for every core opcode of `codes`.
/// Command handlers are registered on top by the embedder.
pub fn core_executors(codes: &InstructionMap) -> Result<InstructionExecutorMap, RegistrationError> {
    let mut executors = InstructionExecutorMap::new();
    ops::register_core(&mut executors, codes)?;
    Ok(executors)
}
