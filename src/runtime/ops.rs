//! Handlers for the core opcodes.

use crate::compiler::opcode::{CoreOpcode, InstructionMap};
use crate::compiler::symbol::VariableDomain;

use super::error::{ExecutionError, RegistrationError};
use super::executor::{ExecutionContext, InstructionExecutorMap};
use super::vm::ScriptRuntime;

type Handler = fn(&mut ScriptRuntime, &ExecutionContext<'_>) -> Result<(), ExecutionError>;

/// Register a handler for every core opcode under its concrete code.
pub fn register_core(
    executors: &mut InstructionExecutorMap,
    codes: &InstructionMap,
) -> Result<(), RegistrationError> {
    for opcode in CoreOpcode::ALL {
        let code = codes
            .lookup(opcode)
            .map_err(|_| RegistrationError::Unmapped(opcode))?;
        executors.register(code, handler(opcode))?;
    }
    Ok(())
}

fn handler(opcode: CoreOpcode) -> Handler {
    match opcode {
        CoreOpcode::PushIntConstant => |rt, _| {
            let value = rt.int_operand()?;
            rt.push_int(value);
            Ok(())
        },
        CoreOpcode::PushStringConstant => |rt, _| {
            let value = rt.string_operand()?;
            rt.push_string(value);
            Ok(())
        },
        CoreOpcode::PushLongConstant => |rt, _| {
            let value = rt.long_operand()?;
            rt.push_long(value);
            Ok(())
        },
        CoreOpcode::PopIntDiscard => |rt, _| rt.pop_int().map(drop),
        CoreOpcode::PopStringDiscard => |rt, _| rt.pop_string().map(drop),
        CoreOpcode::PopLongDiscard => |rt, _| rt.pop_long().map(drop),

        // ── Locals ──
        CoreOpcode::PushIntLocal => |rt, _| {
            let value = rt.int_local(rt.int_operand()?)?;
            rt.push_int(value);
            Ok(())
        },
        CoreOpcode::PushStringLocal => |rt, _| {
            let value = rt.string_local(rt.int_operand()?)?;
            rt.push_string(value);
            Ok(())
        },
        CoreOpcode::PushLongLocal => |rt, _| {
            let value = rt.long_local(rt.int_operand()?)?;
            rt.push_long(value);
            Ok(())
        },
        CoreOpcode::PopIntLocal => |rt, _| {
            let slot = rt.int_operand()?;
            let value = rt.pop_int()?;
            rt.set_int_local(slot, value)
        },
        CoreOpcode::PopStringLocal => |rt, _| {
            let slot = rt.int_operand()?;
            let value = rt.pop_string()?;
            rt.set_string_local(slot, value)
        },
        CoreOpcode::PopLongLocal => |rt, _| {
            let slot = rt.int_operand()?;
            let value = rt.pop_long()?;
            rt.set_long_local(slot, value)
        },

        // ── Globals ──
        CoreOpcode::PushVarp => |rt, _| push_var(rt, VariableDomain::Player),
        CoreOpcode::PushVarpBit => |rt, _| push_var(rt, VariableDomain::PlayerBit),
        CoreOpcode::PushVarcInt => |rt, _| push_var(rt, VariableDomain::ClientInt),
        CoreOpcode::PopVarp => |rt, _| pop_var(rt, VariableDomain::Player),
        CoreOpcode::PopVarpBit => |rt, _| pop_var(rt, VariableDomain::PlayerBit),
        CoreOpcode::PopVarcInt => |rt, _| pop_var(rt, VariableDomain::ClientInt),
        CoreOpcode::PushVarcString => |rt, _| {
            let value = rt.variables().string(rt.int_operand()?);
            rt.push_string(value);
            Ok(())
        },
        CoreOpcode::PopVarcString => |rt, _| {
            let id = rt.int_operand()?;
            let value = rt.pop_string()?;
            rt.variables_mut().set_string(id, value);
            Ok(())
        },

        // ── Arrays ──
        CoreOpcode::DefineArray => |rt, _| {
            let operand = rt.index_operand()?;
            let size = rt.pop_int()?;
            let code = u32::try_from(operand & 0xffff).unwrap_or_default();
            rt.define_array(operand >> 16, size, code)
        },
        CoreOpcode::PushArrayInt => |rt, _| {
            let array = rt.index_operand()?;
            let index = rt.pop_int()?;
            let value = rt.array_get(array, index)?;
            rt.push_int(value);
            Ok(())
        },
        CoreOpcode::PopArrayInt => |rt, _| {
            let array = rt.index_operand()?;
            let value = rt.pop_int()?;
            let index = rt.pop_int()?;
            rt.array_set(array, index, value)
        },

        // ── Branches ──
        CoreOpcode::Branch => |rt, _| {
            let target = rt.index_operand()?;
            rt.jump(target);
            Ok(())
        },
        CoreOpcode::BranchEquals => |rt, _| branch_int(rt, |a, b| a == b),
        CoreOpcode::BranchNot => |rt, _| branch_int(rt, |a, b| a != b),
        CoreOpcode::BranchLessThan => |rt, _| branch_int(rt, |a, b| a < b),
        CoreOpcode::BranchGreaterThan => |rt, _| branch_int(rt, |a, b| a > b),
        CoreOpcode::BranchLessThanOrEquals => |rt, _| branch_int(rt, |a, b| a <= b),
        CoreOpcode::BranchGreaterThanOrEquals => |rt, _| branch_int(rt, |a, b| a >= b),
        CoreOpcode::BranchIfTrue => |rt, _| {
            let value = rt.pop_int()?;
            branch_if(rt, value != 0)
        },
        CoreOpcode::BranchIfFalse => |rt, _| {
            let value = rt.pop_int()?;
            branch_if(rt, value == 0)
        },
        CoreOpcode::LongBranchEquals => |rt, _| branch_long(rt, |a, b| a == b),
        CoreOpcode::LongBranchNot => |rt, _| branch_long(rt, |a, b| a != b),
        CoreOpcode::LongBranchLessThan => |rt, _| branch_long(rt, |a, b| a < b),
        CoreOpcode::LongBranchGreaterThan => |rt, _| branch_long(rt, |a, b| a > b),
        CoreOpcode::LongBranchLessThanOrEquals => |rt, _| branch_long(rt, |a, b| a <= b),
        CoreOpcode::LongBranchGreaterThanOrEquals => |rt, _| branch_long(rt, |a, b| a >= b),
        CoreOpcode::Switch => |rt, _| {
            let table = rt.int_operand()?;
            let key = rt.pop_int()?;
            let target = rt.script()?.switch_target(table, key)?;
            if let Some(target) = target {
                rt.jump(target);
            }
            Ok(())
        },

        // ── Calls ──
        CoreOpcode::Return => |rt, ctx| {
            if let Some(frame) = rt.return_from_call() {
                ctx.frames.lock().release(frame);
            }
            Ok(())
        },
        CoreOpcode::GosubWithParams => |rt, ctx| {
            let name = rt.string_operand()?;
            let callee = ctx
                .cache
                .get(&name)
                .ok_or(ExecutionError::UnknownScript(name))?;
            let frame = ctx.frames.lock().acquire();
            rt.call(callee, frame)
        },
        CoreOpcode::JumpWithParams => |rt, ctx| {
            let name = rt.string_operand()?;
            let target = ctx
                .cache
                .get(&name)
                .ok_or(ExecutionError::UnknownScript(name))?;
            let dropped = rt.transfer(target)?;
            ctx.frames.lock().release_all(dropped);
            Ok(())
        },

        // ── Strings ──
        CoreOpcode::JoinString => |rt, _| {
            let count = rt.index_operand()?;
            let joined = rt.pop_strings(count)?.concat();
            rt.push_string(joined);
            Ok(())
        },
        CoreOpcode::IntToString => |rt, _| {
            let value = rt.pop_int()?;
            rt.push_string(value.to_string());
            Ok(())
        },
        CoreOpcode::LongToString => |rt, _| {
            let value = rt.pop_long()?;
            rt.push_string(value.to_string());
            Ok(())
        },

        // ── Math ──
        CoreOpcode::Add => |rt, _| int_math(rt, |a, b| Some(a.wrapping_add(b))),
        CoreOpcode::Sub => |rt, _| int_math(rt, |a, b| Some(a.wrapping_sub(b))),
        CoreOpcode::Mul => |rt, _| int_math(rt, |a, b| Some(a.wrapping_mul(b))),
        CoreOpcode::Div => |rt, _| int_math(rt, |a, b| (b != 0).then(|| a.wrapping_div(b))),
        CoreOpcode::Mod => |rt, _| int_math(rt, |a, b| (b != 0).then(|| a.wrapping_rem(b))),
        CoreOpcode::LongAdd => |rt, _| long_math(rt, |a, b| Some(a.wrapping_add(b))),
        CoreOpcode::LongSub => |rt, _| long_math(rt, |a, b| Some(a.wrapping_sub(b))),
        CoreOpcode::LongMul => |rt, _| long_math(rt, |a, b| Some(a.wrapping_mul(b))),
        CoreOpcode::LongDiv => |rt, _| long_math(rt, |a, b| (b != 0).then(|| a.wrapping_div(b))),
        CoreOpcode::LongMod => |rt, _| long_math(rt, |a, b| (b != 0).then(|| a.wrapping_rem(b))),
    }
}

fn push_var(rt: &mut ScriptRuntime, domain: VariableDomain) -> Result<(), ExecutionError> {
    let value = rt.variables().int(domain, rt.int_operand()?);
    rt.push_int(value);
    Ok(())
}

fn pop_var(rt: &mut ScriptRuntime, domain: VariableDomain) -> Result<(), ExecutionError> {
    let id = rt.int_operand()?;
    let value = rt.pop_int()?;
    rt.variables_mut().set_int(domain, id, value);
    Ok(())
}

fn branch_if(rt: &mut ScriptRuntime, taken: bool) -> Result<(), ExecutionError> {
    if taken {
        let target = rt.index_operand()?;
        rt.jump(target);
    }
    Ok(())
}

/// Pops the right operand, then the left.
fn branch_int(rt: &mut ScriptRuntime, test: fn(i32, i32) -> bool) -> Result<(), ExecutionError> {
    let right = rt.pop_int()?;
    let left = rt.pop_int()?;
    branch_if(rt, test(left, right))
}

fn branch_long(rt: &mut ScriptRuntime, test: fn(i64, i64) -> bool) -> Result<(), ExecutionError> {
    let right = rt.pop_long()?;
    let left = rt.pop_long()?;
    branch_if(rt, test(left, right))
}

/// `None` from `op` means a zero divisor.
fn int_math(rt: &mut ScriptRuntime, op: fn(i32, i32) -> Option<i32>) -> Result<(), ExecutionError> {
    let right = rt.pop_int()?;
    let left = rt.pop_int()?;
    let value = op(left, right).ok_or(ExecutionError::DivisionByZero)?;
    rt.push_int(value);
    Ok(())
}

fn long_math(rt: &mut ScriptRuntime, op: fn(i64, i64) -> Option<i64>) -> Result<(), ExecutionError> {
    let right = rt.pop_long()?;
    let left = rt.pop_long()?;
    let value = op(left, right).ok_or(ExecutionError::DivisionByZero)?;
    rt.push_long(value);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::compiler::codegen::tests::compile_src;
    use crate::compiler::link::link_all;
    use crate::compiler::optimize::Optimizer;
    use crate::runtime::executor::{Execution, PoolSizes, ScriptExecutor};
    use crate::runtime::vm::ReturnValues;

    fn executor_with(source: &str, executors: InstructionExecutorMap) -> ScriptExecutor {
        let map = InstructionMap::standard();
        let mut scripts = compile_src(source);
        let optimizer = Optimizer::with_default_passes(&map);
        for script in &mut scripts {
            optimizer.run(script);
        }
        ScriptExecutor::new(executors, link_all(&scripts).unwrap(), PoolSizes::default())
    }

    fn executor(source: &str) -> ScriptExecutor {
        let mut executors = InstructionExecutorMap::new();
        register_core(&mut executors, &InstructionMap::standard()).unwrap();
        executor_with(source, executors)
    }

    fn run(executor: &ScriptExecutor, name: &str, ints: &[i32]) -> Result<ReturnValues, ExecutionError> {
        let args = ints.to_vec();
        let execution = executor.execute(name, move |rt| {
            for (slot, value) in (0..).zip(args) {
                rt.set_int_local(slot, value)?;
            }
            Ok(())
        })?;
        match execution {
            Execution::Completed(values) => Ok(values),
            Execution::Suspended(_) => panic!("{name} suspended"),
        }
    }

    /// Executors with a `mes` (opcode 1000) that records its text, aborting
    /// the script when `suspend` is set.
    fn recording(suspend: bool) -> (InstructionExecutorMap, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut executors = InstructionExecutorMap::new();
        register_core(&mut executors, &InstructionMap::standard()).unwrap();
        let sink = Arc::clone(&log);
        executors
            .register(
                1000,
                move |rt: &mut ScriptRuntime, _: &ExecutionContext<'_>| -> Result<(), ExecutionError> {
                    sink.lock().push(rt.pop_string()?);
                    if suspend {
                        rt.abort();
                    }
                    Ok(())
                },
            )
            .unwrap();
        (executors, log)
    }

    #[test]
    fn loops_accumulate() {
        let executor = executor(
            "[proc,sum](int $n)(int)
            def_int $i = 0;
            def_int $total = 0;
            while ($i < $n) {
                $i = calc($i + 1);
                $total = calc($total + $i);
            }
            return($total);",
        );
        assert_eq!(run(&executor, "[proc,sum]", &[4]).unwrap().ints, vec![10]);
        assert_eq!(run(&executor, "[proc,sum]", &[0]).unwrap().ints, vec![0]);
    }

    #[test]
    fn switch_selects_case() {
        let executor = executor(
            "[proc,pick](int $x)(string)
            switch_int ($x) {
                case 1, 2 : return(\"low\");
                case ^max : return(\"max\");
                case default : return(\"other\");
            }",
        );
        let pick = |x| run(&executor, "[proc,pick]", &[x]).unwrap().strings;
        assert_eq!(pick(2), vec!["low"]);
        assert_eq!(pick(10), vec!["max"]);
        assert_eq!(pick(7), vec!["other"]);
    }

    #[test]
    fn gosub_restores_caller_locals() {
        let executor = executor(
            "[proc,outer](int)
            def_int $a = 5;
            def_int $b = ~double($a);
            return(calc($a + $b));
            [proc,double](int $v)(int)
            def_int $scratch = 100;
            return(calc($v * 2));",
        );
        assert_eq!(run(&executor, "[proc,outer]", &[]).unwrap().ints, vec![15]);
        assert_eq!(executor.pooled_runtimes(), 1);
    }

    #[test]
    fn recursion_unwinds() {
        let executor = executor(
            "[proc,fact](int $n)(int)
            if ($n <= 1) {
                return(1);
            }
            return(calc($n * ~fact(calc($n - 1))));",
        );
        assert_eq!(run(&executor, "[proc,fact]", &[5]).unwrap().ints, vec![120]);
    }

    #[test]
    fn arrays_default_to_zero() {
        let executor = executor(
            "[proc,arr](int)
            def_int $arr(3);
            $arr(0) = 4;
            $arr(2) = 6;
            return(calc($arr(0) + $arr(1) + $arr(2)));",
        );
        assert_eq!(run(&executor, "[proc,arr]", &[]).unwrap().ints, vec![10]);
    }

    #[test]
    fn arrays_pass_by_reference() {
        let executor = executor(
            "[proc,main](int)
            def_int $pad(1);
            def_int $values(3);
            $values(0) = 4;
            ~scale(2, $values);
            return(calc($values(0) + $values(1)));
            [proc,scale](int $k, intarray $arr)
            $arr(1) = calc($arr(0) * $k);",
        );
        assert_eq!(run(&executor, "[proc,main]", &[]).unwrap().ints, vec![12]);
    }

    #[test]
    fn array_errors_name_the_script() {
        let executor = executor(
            "[proc,oob](int $i, int $size)(int)
            def_int $arr($size);
            return($arr($i));",
        );
        let error = run(&executor, "[proc,oob]", &[3, 3]).unwrap_err();
        assert_eq!(error.to_string(), "Error executing script: [proc,oob]");
        assert!(matches!(
            error.root(),
            ExecutionError::ArrayIndex { index: 3, size: 3, .. }
        ));
        let error = run(&executor, "[proc,oob]", &[0, 0]).unwrap_err();
        assert!(matches!(error.root(), ExecutionError::ArraySize(0)));
        let error = run(&executor, "[proc,oob]", &[0, 5001]).unwrap_err();
        assert!(matches!(error.root(), ExecutionError::ArraySize(5001)));
        // failed runtimes are dropped, not pooled
        assert_eq!(executor.pooled_runtimes(), 0);
    }

    #[test]
    fn division_by_zero_fails() {
        let executor = executor("[proc,div](int $a, int $b)(int) return(calc($a / $b));");
        assert_eq!(run(&executor, "[proc,div]", &[7, 2]).unwrap().ints, vec![3]);
        let error = run(&executor, "[proc,div]", &[7, 0]).unwrap_err();
        assert!(matches!(error.root(), ExecutionError::DivisionByZero));
    }

    #[test]
    fn unknown_script_is_an_error() {
        let executor = executor("[proc,a]");
        let error = run(&executor, "[proc,missing]", &[]).unwrap_err();
        assert!(matches!(error.root(), ExecutionError::UnknownScript(name) if name == "[proc,missing]"));
    }

    #[test]
    fn commands_dispatch_to_registered_executors() {
        let (executors, log) = recording(false);
        let executor = executor_with("[proc,greet](int $n) mes(\"n=<$n>\");", executors);
        run(&executor, "[proc,greet]", &[3]).unwrap();
        assert_eq!(*log.lock(), vec!["n=3"]);
    }

    #[test]
    fn missing_command_executor_fails() {
        let executor = executor("[proc,greet] mes(\"hi\");");
        let error = run(&executor, "[proc,greet]", &[]).unwrap_err();
        assert!(matches!(
            error.root(),
            ExecutionError::MissingExecutor { opcode: 1000, .. }
        ));
    }

    #[test]
    fn jump_replaces_the_script() {
        let (executors, log) = recording(false);
        let executor = executor_with(
            "[proc,start] def_int $x = 7; @finish($x);
            [label,finish](int $v) mes(\"<$v>\");",
            executors,
        );
        run(&executor, "[proc,start]", &[]).unwrap();
        assert_eq!(*log.lock(), vec!["7"]);
    }

    #[test]
    fn aborted_scripts_resume_after_the_aborting_instruction() {
        let (executors, log) = recording(true);
        let executor = executor_with(
            "[proc,talk](int) mes(\"one\"); mes(\"two\"); return(2);",
            executors,
        );
        let mut execution = executor.execute("[proc,talk]", |_| Ok(())).unwrap();
        let mut suspensions = 0;
        let values = loop {
            match execution {
                Execution::Suspended(runtime) => {
                    suspensions += 1;
                    execution = executor.resume(runtime).unwrap();
                }
                Execution::Completed(values) => break values,
            }
        };
        assert_eq!(suspensions, 2);
        assert_eq!(values.ints, vec![2]);
        assert_eq!(*log.lock(), vec!["one", "two"]);
    }

    #[test]
    fn duplicate_registration_fails() {
        let map = InstructionMap::standard();
        let mut executors = InstructionExecutorMap::new();
        register_core(&mut executors, &map).unwrap();
        assert_eq!(executors.len(), CoreOpcode::ALL.len());
        assert_eq!(
            register_core(&mut executors, &map),
            Err(RegistrationError::Duplicate(map.lookup(CoreOpcode::ALL[0]).unwrap()))
        );
    }

    #[test]
    fn unmapped_core_opcode_fails() {
        let mut executors = InstructionExecutorMap::new();
        assert_eq!(
            register_core(&mut executors, &InstructionMap::new()),
            Err(RegistrationError::Unmapped(CoreOpcode::ALL[0]))
        );
    }
}
