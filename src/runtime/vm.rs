//! Per-execution interpreter state: operand stacks, locals, arrays and
//! saved call frames.

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use serde::Serialize;

use super::error::ExecutionError;
use super::pool::Recycle;
use super::script::Script;
use crate::compiler::symbol::VariableDomain;
use crate::compiler::types::{PrimitiveType, StackType};

/// Local slots per stack type.
pub const MAX_LOCALS: usize = 256;
/// Arrays a single activation may define.
pub const MAX_ARRAYS: usize = 5;
/// Largest size `DEFINE_ARRAY` accepts.
pub const MAX_ARRAY_SIZE: i32 = 5000;
/// Maximum nested `GOSUB` depth to stop runaway recursion.
pub const MAX_CALL_DEPTH: usize = 1024;

/// Global variables a script reads and writes through the `VAR*` opcodes.
/// Unset variables read as `0` or the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableStore {
    ints: HashMap<(VariableDomain, i32), i32>,
    strings: HashMap<i32, String>,
}

impl VariableStore {
    pub fn int(&self, domain: VariableDomain, id: i32) -> i32 {
        self.ints.get(&(domain, id)).copied().unwrap_or(0)
    }

    pub fn set_int(&mut self, domain: VariableDomain, id: i32, value: i32) {
        self.ints.insert((domain, id), value);
    }

    pub fn string(&self, id: i32) -> String {
        self.strings.get(&id).cloned().unwrap_or_default()
    }

    pub fn set_string(&mut self, id: i32, value: String) {
        self.strings.insert(id, value);
    }

    pub fn clear(&mut self) {
        self.ints.clear();
        self.strings.clear();
    }
}

/// Values left on the stacks when a script completes, bottom first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReturnValues {
    pub ints: Vec<i32>,
    pub strings: Vec<String>,
    pub longs: Vec<i64>,
}

/// Locals and arrays of one activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locals {
    ints: Vec<i32>,
    strings: Vec<String>,
    longs: Vec<i64>,
    arrays: Vec<Option<Vec<i32>>>,
}

impl Default for Locals {
    fn default() -> Self {
        Self {
            ints: vec![0; MAX_LOCALS],
            strings: vec![String::new(); MAX_LOCALS],
            longs: vec![0; MAX_LOCALS],
            arrays: vec![None; MAX_ARRAYS],
        }
    }
}

impl Locals {
    /// Clear every slot, keeping the allocations.
    fn reset(&mut self) {
        self.ints.fill(0);
        self.strings.iter_mut().for_each(String::clear);
        self.longs.fill(0);
        self.arrays.iter_mut().for_each(|array| *array = None);
    }
}

/// Saved caller state for a `GOSUB`.
#[derive(Debug, Default)]
pub struct ScriptFrame {
    script: Option<Arc<Script>>,
    address: usize,
    locals: Locals,
    /// Caller array slots lent to the callee, indexed by callee slot.
    lent: Vec<usize>,
}

impl Recycle for ScriptFrame {
    fn recycle(&mut self) {
        self.script = None;
        self.address = 0;
        self.locals.reset();
        self.lent.clear();
    }
}

/// Arguments taken off the stacks for a call.
struct Arguments {
    ints: Vec<i32>,
    strings: Vec<String>,
    longs: Vec<i64>,
    /// Caller array slots, in callee slot order.
    arrays: Vec<usize>,
}

/// Interpreter state for one execution.
///
/// Branching handlers call [`jump`](Self::jump) with an absolute address;
/// the dispatcher then skips its increment for that instruction.
#[derive(Debug, Default)]
pub struct ScriptRuntime {
    script: Option<Arc<Script>>,
    address: usize,
    jumped: bool,
    aborted: bool,
    finished: bool,
    ints: Vec<i32>,
    strings: Vec<String>,
    longs: Vec<i64>,
    locals: Locals,
    frames: Vec<ScriptFrame>,
    variables: VariableStore,
}

impl Recycle for ScriptRuntime {
    fn recycle(&mut self) {
        self.script = None;
        self.address = 0;
        self.jumped = false;
        self.aborted = false;
        self.finished = false;
        self.clear_stacks();
        self.locals.reset();
        self.frames.clear();
        self.variables.clear();
    }
}

impl ScriptRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `script` from its first instruction.
    pub fn load(&mut self, script: Arc<Script>) {
        self.script = Some(script);
        self.address = 0;
        self.jumped = false;
        self.finished = false;
    }

    pub fn script(&self) -> Result<&Arc<Script>, ExecutionError> {
        self.script.as_ref().ok_or(ExecutionError::NoScript)
    }

    pub fn address(&self) -> usize {
        self.address
    }

    /// Continue at `target` instead of the next instruction.
    pub fn jump(&mut self, target: usize) {
        self.address = target;
        self.jumped = true;
    }

    /// Move past the instruction just executed, unless it jumped.
    pub(crate) fn step(&mut self) {
        if mem::take(&mut self.jumped) {
            return;
        }
        self.address += 1;
    }

    /// Suspend after the current instruction.
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub(crate) fn clear_abort(&mut self) {
        self.aborted = false;
    }

    /// End the script after the current instruction.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut VariableStore {
        &mut self.variables
    }

    pub fn call_depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn drain_frames(&mut self) -> Vec<ScriptFrame> {
        mem::take(&mut self.frames)
    }

    // ── Operands ──────────────────────────────────────────────────

    pub fn int_operand(&self) -> Result<i32, ExecutionError> {
        self.script()?.int_operand(self.address)
    }

    pub fn long_operand(&self) -> Result<i64, ExecutionError> {
        self.script()?.long_operand(self.address)
    }

    pub fn string_operand(&self) -> Result<String, ExecutionError> {
        self.script()?.string_operand(self.address).map(str::to_string)
    }

    /// The int operand read as an address or index.
    pub fn index_operand(&self) -> Result<usize, ExecutionError> {
        let value = self.int_operand()?;
        usize::try_from(value).map_err(|_| ExecutionError::OperandType {
            address: self.address,
            expected: "non-negative int",
        })
    }

    // ── Stacks ────────────────────────────────────────────────────

    pub fn push_int(&mut self, value: i32) {
        self.ints.push(value);
    }

    pub fn pop_int(&mut self) -> Result<i32, ExecutionError> {
        self.ints.pop().ok_or(ExecutionError::StackUnderflow(StackType::Int))
    }

    pub fn push_string(&mut self, value: String) {
        self.strings.push(value);
    }

    pub fn pop_string(&mut self) -> Result<String, ExecutionError> {
        self.strings
            .pop()
            .ok_or(ExecutionError::StackUnderflow(StackType::String))
    }

    pub fn push_long(&mut self, value: i64) {
        self.longs.push(value);
    }

    pub fn pop_long(&mut self) -> Result<i64, ExecutionError> {
        self.longs.pop().ok_or(ExecutionError::StackUnderflow(StackType::Long))
    }

    /// The top `count` strings in push order.
    pub fn pop_strings(&mut self, count: usize) -> Result<Vec<String>, ExecutionError> {
        pop_many(&mut self.strings, count, StackType::String)
    }

    pub fn int_stack(&self) -> &[i32] {
        &self.ints
    }

    pub fn string_stack(&self) -> &[String] {
        &self.strings
    }

    pub fn long_stack(&self) -> &[i64] {
        &self.longs
    }

    pub fn clear_stacks(&mut self) {
        self.ints.clear();
        self.strings.clear();
        self.longs.clear();
    }

    pub(crate) fn take_return_values(&mut self) -> ReturnValues {
        ReturnValues {
            ints: mem::take(&mut self.ints),
            strings: mem::take(&mut self.strings),
            longs: mem::take(&mut self.longs),
        }
    }

    // ── Locals ────────────────────────────────────────────────────

    pub fn int_local(&self, slot: i32) -> Result<i32, ExecutionError> {
        slot_of(slot)
            .and_then(|index| self.locals.ints.get(index).copied())
            .ok_or(ExecutionError::LocalIndex(slot))
    }

    pub fn set_int_local(&mut self, slot: i32, value: i32) -> Result<(), ExecutionError> {
        let local = slot_of(slot)
            .and_then(|index| self.locals.ints.get_mut(index))
            .ok_or(ExecutionError::LocalIndex(slot))?;
        *local = value;
        Ok(())
    }

    pub fn string_local(&self, slot: i32) -> Result<String, ExecutionError> {
        slot_of(slot)
            .and_then(|index| self.locals.strings.get(index).cloned())
            .ok_or(ExecutionError::LocalIndex(slot))
    }

    pub fn set_string_local(&mut self, slot: i32, value: String) -> Result<(), ExecutionError> {
        let local = slot_of(slot)
            .and_then(|index| self.locals.strings.get_mut(index))
            .ok_or(ExecutionError::LocalIndex(slot))?;
        *local = value;
        Ok(())
    }

    pub fn long_local(&self, slot: i32) -> Result<i64, ExecutionError> {
        slot_of(slot)
            .and_then(|index| self.locals.longs.get(index).copied())
            .ok_or(ExecutionError::LocalIndex(slot))
    }

    pub fn set_long_local(&mut self, slot: i32, value: i64) -> Result<(), ExecutionError> {
        let local = slot_of(slot)
            .and_then(|index| self.locals.longs.get_mut(index))
            .ok_or(ExecutionError::LocalIndex(slot))?;
        *local = value;
        Ok(())
    }

    // ── Arrays ────────────────────────────────────────────────────

    /// Allocate array `array` with `size` elements of the type with `code`.
    pub fn define_array(&mut self, array: usize, size: i32, code: u32) -> Result<(), ExecutionError> {
        if !(1..=MAX_ARRAY_SIZE).contains(&size) {
            return Err(ExecutionError::ArraySize(size));
        }
        let slot = self
            .locals
            .arrays
            .get_mut(array)
            .ok_or(ExecutionError::InvalidArray(array))?;
        let default = if code == u32::from(PrimitiveType::Int.code())
            || code == u32::from(PrimitiveType::Bool.code())
        {
            0
        } else {
            -1
        };
        *slot = Some(vec![default; usize::try_from(size).unwrap_or_default()]);
        Ok(())
    }

    fn array_mut(&mut self, array: usize) -> Result<&mut Vec<i32>, ExecutionError> {
        self.locals
            .arrays
            .get_mut(array)
            .and_then(Option::as_mut)
            .ok_or(ExecutionError::InvalidArray(array))
    }

    pub fn array_size(&self, array: usize) -> Option<usize> {
        self.locals.arrays.get(array)?.as_ref().map(Vec::len)
    }

    pub fn array_get(&mut self, array: usize, index: i32) -> Result<i32, ExecutionError> {
        let elements = self.array_mut(array)?;
        let size = elements.len();
        usize::try_from(index)
            .ok()
            .and_then(|i| elements.get(i).copied())
            .ok_or(ExecutionError::ArrayIndex { array, index, size })
    }

    pub fn array_set(&mut self, array: usize, index: i32, value: i32) -> Result<(), ExecutionError> {
        let elements = self.array_mut(array)?;
        let size = elements.len();
        let element = usize::try_from(index)
            .ok()
            .and_then(|i| elements.get_mut(i))
            .ok_or(ExecutionError::ArrayIndex { array, index, size })?;
        *element = value;
        Ok(())
    }

    // ── Calls ─────────────────────────────────────────────────────

    fn pop_arguments(&mut self, callee: &Script) -> Result<Arguments, ExecutionError> {
        let count = callee.int_arguments + callee.array_arguments.len();
        let mut ints = Vec::with_capacity(callee.int_arguments);
        let mut arrays = vec![usize::MAX; callee.array_arguments.len()];
        for (position, value) in pop_many(&mut self.ints, count, StackType::Int)?
            .into_iter()
            .enumerate()
        {
            match callee.array_arguments.iter().position(|&p| p == position) {
                Some(slot) => {
                    if let Some(array) = arrays.get_mut(slot) {
                        *array = usize::try_from(value).unwrap_or(usize::MAX);
                    }
                }
                None => ints.push(value),
            }
        }
        Ok(Arguments {
            ints,
            strings: pop_many(&mut self.strings, callee.string_arguments, StackType::String)?,
            longs: pop_many(&mut self.longs, callee.long_arguments, StackType::Long)?,
            arrays,
        })
    }

    /// Take the defined arrays at `slots` out of the current activation.
    fn take_arrays(&mut self, slots: &[usize]) -> Result<Vec<Vec<i32>>, ExecutionError> {
        slots
            .iter()
            .map(|&slot| {
                self.locals
                    .arrays
                    .get_mut(slot)
                    .and_then(Option::take)
                    .ok_or(ExecutionError::InvalidArray(slot))
            })
            .collect()
    }

    /// Bind `arrays` to the first array slots of the current activation.
    fn place_arrays(&mut self, arrays: Vec<Vec<i32>>) {
        for (slot, array) in self.locals.arrays.iter_mut().zip(arrays) {
            *slot = Some(array);
        }
    }

    /// Argument `i` of each stack type lands in local slot `i`.
    fn seed_arguments(&mut self, arguments: Arguments) -> Result<(), ExecutionError> {
        if arguments.ints.len() > MAX_LOCALS
            || arguments.strings.len() > MAX_LOCALS
            || arguments.longs.len() > MAX_LOCALS
        {
            return Err(ExecutionError::LocalIndex(i32::try_from(MAX_LOCALS).unwrap_or(i32::MAX)));
        }
        for (local, value) in self.locals.ints.iter_mut().zip(arguments.ints) {
            *local = value;
        }
        for (local, value) in self.locals.strings.iter_mut().zip(arguments.strings) {
            *local = value;
        }
        for (local, value) in self.locals.longs.iter_mut().zip(arguments.longs) {
            *local = value;
        }
        Ok(())
    }

    /// Enter `callee`, saving the caller into `frame`. The caller resumes
    /// after the calling instruction once the callee returns.
    pub fn call(&mut self, callee: Arc<Script>, mut frame: ScriptFrame) -> Result<(), ExecutionError> {
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(ExecutionError::CallDepth(MAX_CALL_DEPTH));
        }
        let mut arguments = self.pop_arguments(&callee)?;
        let arrays = self.take_arrays(&arguments.arrays)?;
        frame.script = self.script.take();
        frame.address = self.address;
        frame.locals.reset();
        frame.lent = mem::take(&mut arguments.arrays);
        mem::swap(&mut frame.locals, &mut self.locals);
        self.frames.push(frame);
        self.seed_arguments(arguments)?;
        self.place_arrays(arrays);
        self.script = Some(callee);
        self.jump(0);
        Ok(())
    }

    /// Leave the current script. Returns the spent frame when a caller was
    /// restored; with no caller the execution is finished.
    pub fn return_from_call(&mut self) -> Option<ScriptFrame> {
        let Some(mut frame) = self.frames.pop() else {
            self.finish();
            return None;
        };
        mem::swap(&mut frame.locals, &mut self.locals);
        // Lent arrays go back to the caller, with the callee's writes.
        for (callee_slot, &caller_slot) in frame.lent.iter().enumerate() {
            let array = frame.locals.arrays.get_mut(callee_slot).and_then(Option::take);
            if let Some(slot) = self.locals.arrays.get_mut(caller_slot) {
                *slot = array;
            }
        }
        self.script = frame.script.take();
        self.address = frame.address;
        Some(frame)
    }

    /// Replace the current script with `target`, discarding the stacks and
    /// every saved frame. Returns the discarded frames.
    pub fn transfer(&mut self, target: Arc<Script>) -> Result<Vec<ScriptFrame>, ExecutionError> {
        let arguments = self.pop_arguments(&target)?;
        let arrays = self.take_arrays(&arguments.arrays)?;
        self.clear_stacks();
        let frames = mem::take(&mut self.frames);
        self.locals.reset();
        self.seed_arguments(arguments)?;
        self.place_arrays(arrays);
        self.script = Some(target);
        self.jump(0);
        Ok(frames)
    }
}

fn slot_of(slot: i32) -> Option<usize> {
    usize::try_from(slot).ok().filter(|&index| index < MAX_LOCALS)
}

/// Split off the top `count` values, keeping their push order.
fn pop_many<T>(stack: &mut Vec<T>, count: usize, ty: StackType) -> Result<Vec<T>, ExecutionError> {
    let start = stack
        .len()
        .checked_sub(count)
        .ok_or(ExecutionError::StackUnderflow(ty))?;
    Ok(stack.split_off(start))
}
