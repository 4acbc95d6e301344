//! Flattens block based scripts into executable scripts with absolute
//! branch targets.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use super::codegen::BinaryScript;
use super::ir::{Label, Operand as IrOperand};
use crate::runtime::script::{Operand, Script, ScriptCache};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("{script}: branch to unbound block {label}")]
    UnboundLabel { script: String, label: String },
    #[error("{script}: unknown switch table {table}")]
    UnknownSwitchTable { script: String, table: usize },
    #[error("{script}: address {address} does not fit an operand")]
    AddressOverflow { script: String, address: usize },
}

/// Lay out `script`'s blocks in order and resolve labels to addresses.
pub fn link(script: &BinaryScript) -> Result<Script, LinkError> {
    let mut addresses: HashMap<&Label, usize> = HashMap::new();
    let mut next = 0;
    for block in script.blocks.blocks() {
        addresses.insert(&block.label, next);
        next += block.len();
    }
    let resolve = |label: &Label| {
        addresses
            .get(label)
            .copied()
            .ok_or_else(|| LinkError::UnboundLabel {
                script: script.name.clone(),
                label: label.name.clone(),
            })
    };
    let as_int = |address: usize| {
        i32::try_from(address).map_err(|_| LinkError::AddressOverflow {
            script: script.name.clone(),
            address,
        })
    };

    let mut instructions = Vec::with_capacity(next);
    let mut operands = Vec::with_capacity(next);
    for instruction in script.blocks.blocks().iter().flat_map(|block| block.instructions()) {
        let operand = match &instruction.operand {
            IrOperand::None => Operand::Int(0),
            IrOperand::Int(value) => Operand::Int(*value),
            IrOperand::String(value) | IrOperand::Script(value) => Operand::String(value.clone()),
            IrOperand::Long(value) => Operand::Long(*value),
            IrOperand::Label(label) => Operand::Int(as_int(resolve(label)?)?),
            IrOperand::Switch(table) => {
                if *table >= script.switch_tables.len() {
                    return Err(LinkError::UnknownSwitchTable {
                        script: script.name.clone(),
                        table: *table,
                    });
                }
                Operand::Int(as_int(*table)?)
            }
        };
        instructions.push(instruction.opcode);
        operands.push(operand);
    }

    let mut switch_tables = Vec::with_capacity(script.switch_tables.len());
    for table in &script.switch_tables {
        let mut cases = HashMap::new();
        for case in &table.cases {
            let target = resolve(&case.label)?;
            for &key in &case.keys {
                cases.entry(key).or_insert(target);
            }
        }
        switch_tables.push(cases);
    }

    debug!(script = %script.name, instructions = instructions.len(), "linked");
    Ok(Script {
        name: script.name.clone(),
        instructions,
        operands,
        switch_tables,
        int_arguments: script.parameters.int,
        string_arguments: script.parameters.string,
        long_arguments: script.parameters.long,
        array_arguments: script.array_parameters.clone(),
    })
}

/// Link every script into a cache keyed by full name.
pub fn link_all<'a>(
    scripts: impl IntoIterator<Item = &'a BinaryScript>,
) -> Result<ScriptCache, LinkError> {
    scripts.into_iter().map(link).collect()
}
