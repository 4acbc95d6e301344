//! Opcode dispatch and the execute/resume loop.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::error::{ExecutionError, RegistrationError};
use super::pool::{ScriptFramePool, ScriptRuntimePool};
use super::script::ScriptCache;
use super::vm::{ReturnValues, ScriptRuntime};

/// Shared state handlers may reach besides their runtime.
pub struct ExecutionContext<'a> {
    pub cache: &'a ScriptCache,
    pub frames: &'a Mutex<ScriptFramePool>,
}

/// Handler for one concrete opcode.
pub trait InstructionExecutor: Send + Sync {
    fn execute(
        &self,
        runtime: &mut ScriptRuntime,
        context: &ExecutionContext<'_>,
    ) -> Result<(), ExecutionError>;
}

impl<F> InstructionExecutor for F
where
    F: Fn(&mut ScriptRuntime, &ExecutionContext<'_>) -> Result<(), ExecutionError> + Send + Sync,
{
    fn execute(
        &self,
        runtime: &mut ScriptRuntime,
        context: &ExecutionContext<'_>,
    ) -> Result<(), ExecutionError> {
        self(runtime, context)
    }
}

/// Concrete opcode to handler table. An opcode has at most one handler.
#[derive(Default)]
pub struct InstructionExecutorMap {
    executors: HashMap<u16, Box<dyn InstructionExecutor>>,
}

impl InstructionExecutorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        opcode: u16,
        executor: impl InstructionExecutor + 'static,
    ) -> Result<(), RegistrationError> {
        if self.executors.contains_key(&opcode) {
            return Err(RegistrationError::Duplicate(opcode));
        }
        self.executors.insert(opcode, Box::new(executor));
        Ok(())
    }

    pub fn get(&self, opcode: u16) -> Option<&dyn InstructionExecutor> {
        self.executors.get(&opcode).map(AsRef::as_ref)
    }

    pub fn contains(&self, opcode: u16) -> bool {
        self.executors.contains_key(&opcode)
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

/// Outcome of [`ScriptExecutor::execute`] or [`ScriptExecutor::resume`].
#[derive(Debug)]
pub enum Execution {
    Completed(ReturnValues),
    /// A handler aborted; pass the runtime back to `resume` to continue
    /// after the aborting instruction, or drop it to cancel.
    Suspended(Box<ScriptRuntime>),
}

/// Pool sizes of a [`ScriptExecutor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSizes {
    pub runtimes: usize,
    pub frames: usize,
}

impl Default for PoolSizes {
    fn default() -> Self {
        Self {
            runtimes: 8,
            frames: 512,
        }
    }
}

/// Runs linked scripts. Runtimes come from and return to a bounded pool;
/// `execute` takes `&self`, so one executor can serve several threads.
pub struct ScriptExecutor {
    executors: InstructionExecutorMap,
    cache: ScriptCache,
    runtimes: Mutex<ScriptRuntimePool>,
    frames: Mutex<ScriptFramePool>,
}

impl ScriptExecutor {
    pub fn new(executors: InstructionExecutorMap, cache: ScriptCache, pools: PoolSizes) -> Self {
        Self {
            executors,
            cache,
            runtimes: Mutex::new(ScriptRuntimePool::with_capacity(pools.runtimes)),
            frames: Mutex::new(ScriptFramePool::with_capacity(pools.frames)),
        }
    }

    pub fn cache(&self) -> &ScriptCache {
        &self.cache
    }

    /// Runtimes idle in the pool.
    pub fn pooled_runtimes(&self) -> usize {
        self.runtimes.lock().len()
    }

    /// Run `name` on a pooled runtime prepared by `setup`.
    pub fn execute(
        &self,
        name: &str,
        setup: impl FnOnce(&mut ScriptRuntime) -> Result<(), ExecutionError>,
    ) -> Result<Execution, ExecutionError> {
        let script = self
            .cache
            .get(name)
            .ok_or_else(|| ExecutionError::UnknownScript(name.to_string()).in_script(name))?;
        let mut runtime = self.runtimes.lock().acquire();
        runtime.load(script);
        setup(runtime.as_mut()).map_err(|e| e.in_script(name))?;
        debug!(script = name, "executing");
        self.run(runtime)
    }

    /// Continue a suspended runtime after the instruction that aborted it.
    pub fn resume(&self, mut runtime: Box<ScriptRuntime>) -> Result<Execution, ExecutionError> {
        runtime.clear_abort();
        self.run(runtime)
    }

    fn run(&self, mut runtime: Box<ScriptRuntime>) -> Result<Execution, ExecutionError> {
        let context = ExecutionContext {
            cache: &self.cache,
            frames: &self.frames,
        };
        loop {
            let script = runtime.script()?.clone();
            let address = runtime.address();
            let Some(opcode) = script.opcode(address) else {
                break;
            };
            let executor = self
                .executors
                .get(opcode)
                .ok_or(ExecutionError::MissingExecutor { opcode, address })
                .map_err(|e| e.in_script(&script.name))?;
            trace!(script = %script.name, address, opcode, "dispatch");
            executor
                .execute(runtime.as_mut(), &context)
                .map_err(|e| e.in_script(&script.name))?;
            if runtime.is_finished() {
                break;
            }
            runtime.step();
            if runtime.is_aborted() {
                debug!(script = %script.name, address, "suspended");
                return Ok(Execution::Suspended(runtime));
            }
        }
        let values = runtime.take_return_values();
        self.frames.lock().release_all(runtime.drain_frames());
        self.runtimes.lock().release(runtime);
        Ok(Execution::Completed(values))
    }
}
