//! Fixed-point optimizer over generated blocks.
//!
//! Passes see opcodes only through [`InstructionMap`], so they work with any
//! concrete numbering. Every pass must strictly shrink the instruction or
//! block count when it reports work, which bounds the fixed-point loop.

use std::collections::HashSet;

use tracing::debug;

use super::codegen::BinaryScript;
use super::ir::{Block, Label, Operand};
use super::opcode::{CoreOpcode, InstructionMap};

/// A whole-script pass. Returns the number of optimized units.
pub trait Optimization {
    fn name(&self) -> &'static str;
    fn run(&self, map: &InstructionMap, script: &mut BinaryScript) -> usize;
}

/// A pass that looks at one block at a time.
pub trait BlockOptimization {
    fn name(&self) -> &'static str;
    fn run_block(&self, map: &InstructionMap, block: &mut Block) -> usize;
}

/// Runs a [`BlockOptimization`] over every block of a script.
pub struct PerBlock<T>(pub T);

impl<T: BlockOptimization> Optimization for PerBlock<T> {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn run(&self, map: &InstructionMap, script: &mut BinaryScript) -> usize {
        script
            .blocks
            .blocks_mut()
            .iter_mut()
            .map(|block| self.0.run_block(map, block))
            .sum()
    }
}

pub struct Optimizer<'m> {
    map: &'m InstructionMap,
    passes: Vec<Box<dyn Optimization>>,
}

impl<'m> Optimizer<'m> {
    pub fn new(map: &'m InstructionMap) -> Self {
        Self {
            map,
            passes: Vec::new(),
        }
    }

    /// Constant folding, dead branches, natural flow and dead blocks.
    pub fn with_default_passes(map: &'m InstructionMap) -> Self {
        let mut optimizer = Self::new(map);
        optimizer.register(PerBlock(ConstantFolding));
        optimizer.register(PerBlock(DeadBranch));
        optimizer.register(NaturalFlow);
        optimizer.register(DeadBlock);
        optimizer
    }

    pub fn register(&mut self, pass: impl Optimization + 'static) {
        self.passes.push(Box::new(pass));
    }

    /// Repeat every pass until a whole round changes nothing. Returns the
    /// total number of optimized units.
    pub fn run(&self, script: &mut BinaryScript) -> usize {
        let mut total = 0;
        let mut round = 0;
        loop {
            round += 1;
            let mut optimized = 0;
            for pass in &self.passes {
                let count = pass.run(self.map, script);
                if count > 0 {
                    debug!(script = %script.name, pass = pass.name(), count, round, "optimized");
                }
                optimized += count;
            }
            if optimized == 0 {
                break;
            }
            total += optimized;
        }
        debug!(script = %script.name, total, rounds = round, "optimizer converged");
        total
    }
}

// ── Pass 1: Constant folding ─────────────────────────────────────

/// `PUSH c1, PUSH c2, <arith>` becomes `PUSH (c1 <arith> c2)`.
///
/// Matches only inside one block, so a fold never spans a branch target or
/// a flow instruction.
pub struct ConstantFolding;

impl BlockOptimization for ConstantFolding {
    fn name(&self) -> &'static str {
        "constant folding"
    }

    fn run_block(&self, map: &InstructionMap, block: &mut Block) -> usize {
        let mut folded = 0;
        let mut ip = 2;
        while ip < block.len() {
            let Some(result) = fold_at(map, block, ip) else {
                ip += 1;
                continue;
            };
            block.remove(ip);
            block.remove(ip - 1);
            let replaced = block
                .get_mut(ip - 2)
                .map(|first| match result {
                    Operand::Long(_) => map.transform(first, CoreOpcode::PushLongConstant, result),
                    _ => map.transform(first, CoreOpcode::PushIntConstant, result),
                })
                .is_some_and(|outcome| outcome.is_ok());
            if replaced {
                folded += 1;
            }
            // the folded push may now feed the next operator
            ip -= 1;
        }
        folded
    }
}

fn fold_at(map: &InstructionMap, block: &Block, ip: usize) -> Option<Operand> {
    let op = map.core(block.get(ip)?.opcode)?;
    let left = block.get(ip.checked_sub(2)?)?;
    let right = block.get(ip - 1)?;
    match (&left.operand, &right.operand) {
        (Operand::Int(a), Operand::Int(b))
            if map.is(left, CoreOpcode::PushIntConstant)
                && map.is(right, CoreOpcode::PushIntConstant) =>
        {
            eval_int(op, *a, *b).map(Operand::Int)
        }
        (Operand::Long(a), Operand::Long(b))
            if map.is(left, CoreOpcode::PushLongConstant)
                && map.is(right, CoreOpcode::PushLongConstant) =>
        {
            eval_long(op, *a, *b).map(Operand::Long)
        }
        _ => None,
    }
}

/// Truncating division; the remainder takes the dividend's sign. Division
/// by zero is left for the runtime to report.
fn eval_int(op: CoreOpcode, a: i32, b: i32) -> Option<i32> {
    Some(match op {
        CoreOpcode::Add => a.wrapping_add(b),
        CoreOpcode::Sub => a.wrapping_sub(b),
        CoreOpcode::Mul => a.wrapping_mul(b),
        CoreOpcode::Div if b != 0 => a.wrapping_div(b),
        CoreOpcode::Mod if b != 0 => a.wrapping_rem(b),
        _ => return None,
    })
}

fn eval_long(op: CoreOpcode, a: i64, b: i64) -> Option<i64> {
    Some(match op {
        CoreOpcode::LongAdd => a.wrapping_add(b),
        CoreOpcode::LongSub => a.wrapping_sub(b),
        CoreOpcode::LongMul => a.wrapping_mul(b),
        CoreOpcode::LongDiv if b != 0 => a.wrapping_div(b),
        CoreOpcode::LongMod if b != 0 => a.wrapping_rem(b),
        _ => return None,
    })
}

// ── Pass 2: Dead branches ────────────────────────────────────────

/// Drops instructions that follow a `RETURN`, `BRANCH` or
/// `JUMP_WITH_PARAMS` in the same block, typically the `BRANCH` to the end
/// of an `if` whose body returned.
pub struct DeadBranch;

impl BlockOptimization for DeadBranch {
    fn name(&self) -> &'static str {
        "dead branch"
    }

    fn run_block(&self, map: &InstructionMap, block: &mut Block) -> usize {
        let end = block
            .instructions()
            .iter()
            .position(|instruction| map.core(instruction.opcode).is_some_and(CoreOpcode::ends_flow));
        let Some(end) = end else {
            return 0;
        };
        let mut removed = 0;
        while block.remove(end + 1).is_some() {
            removed += 1;
        }
        removed
    }
}

// ── Pass 3: Natural flow ─────────────────────────────────────────

/// Removes a trailing `BRANCH` to the block laid out next.
pub struct NaturalFlow;

impl Optimization for NaturalFlow {
    fn name(&self) -> &'static str {
        "natural flow"
    }

    fn run(&self, map: &InstructionMap, script: &mut BinaryScript) -> usize {
        let layout: Vec<Label> = script
            .blocks
            .blocks()
            .iter()
            .map(|block| block.label.clone())
            .collect();
        let mut removed = 0;
        for (block, next) in script.blocks.blocks_mut().iter_mut().zip(layout.iter().skip(1)) {
            let redundant = block.last().is_some_and(|last| {
                map.is(last, CoreOpcode::Branch) && last.label_operand() == Some(next)
            });
            if redundant && block.remove(block.len() - 1).is_some() {
                removed += 1;
            }
        }
        removed
    }
}

// ── Pass 4: Dead blocks ──────────────────────────────────────────

/// Removes non-entry blocks nothing can reach: no branch names them, no
/// switch case targets them and the previous block does not fall into them.
pub struct DeadBlock;

impl Optimization for DeadBlock {
    fn name(&self) -> &'static str {
        "dead block"
    }

    fn run(&self, map: &InstructionMap, script: &mut BinaryScript) -> usize {
        let blocks = script.blocks.blocks();
        let mut live: HashSet<Label> = blocks
            .iter()
            .flat_map(Block::instructions)
            .filter_map(|instruction| instruction.label_operand().cloned())
            .collect();
        live.extend(
            script
                .switch_tables
                .iter()
                .flat_map(|table| table.labels().cloned()),
        );
        for pair in blocks.windows(2) {
            if let [previous, block] = pair {
                let falls_through = previous.last().map_or(true, |last| {
                    !map.core(last.opcode).is_some_and(CoreOpcode::ends_flow)
                });
                if falls_through {
                    live.insert(block.label.clone());
                }
            }
        }

        let dead: Vec<Label> = blocks
            .iter()
            .map(|block| &block.label)
            .filter(|label| !label.is_entry() && !live.contains(*label))
            .cloned()
            .collect();
        for label in &dead {
            script.blocks.remove(label);
        }
        dead.len()
    }
}
