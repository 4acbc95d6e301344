//! Slot assignment for script parameters and local variables.

use std::collections::HashMap;

use thiserror::Error;

use super::types::{PrimitiveType, StackType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Local {
    pub name: String,
    pub ty: PrimitiveType,
    /// Slot within the stack type's local array.
    pub slot: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocalError {
    #[error("local ${0} has no runtime representation")]
    Undeclarable(String),
    #[error("parameter ${0} declared after a local variable")]
    ParameterAfterVariable(String),
}

/// Locals of one script, partitioned into parameters and variables and then
/// by stack type.
///
/// Parameters occupy the first slots of each partition, in order; variables
/// follow in declaration order. Slots are never reused, so a shadowing
/// declaration in a nested block still takes a new slot.
#[derive(Debug, Default)]
pub struct LocalMap {
    parameters: HashMap<StackType, Vec<Local>>,
    variables: HashMap<StackType, Vec<Local>>,
    /// Keyed by the per-script id the checker assigned.
    by_id: HashMap<i32, Local>,
    by_name: HashMap<String, Local>,
}

impl LocalMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_parameter(
        &mut self,
        id: i32,
        name: &str,
        ty: PrimitiveType,
    ) -> Result<&Local, LocalError> {
        let stack = ty
            .stack_type()
            .ok_or_else(|| LocalError::Undeclarable(name.to_string()))?;
        if self.variable_count(stack) > 0 {
            return Err(LocalError::ParameterAfterVariable(name.to_string()));
        }
        let local = Local {
            name: name.to_string(),
            ty,
            slot: self.parameter_count(stack),
        };
        self.parameters.entry(stack).or_default().push(local.clone());
        Ok(self.index(id, local))
    }

    pub fn register_variable(
        &mut self,
        id: i32,
        name: &str,
        ty: PrimitiveType,
    ) -> Result<&Local, LocalError> {
        let stack = ty
            .stack_type()
            .ok_or_else(|| LocalError::Undeclarable(name.to_string()))?;
        let local = Local {
            name: name.to_string(),
            ty,
            slot: self.parameter_count(stack) + self.variable_count(stack),
        };
        self.variables.entry(stack).or_default().push(local.clone());
        Ok(self.index(id, local))
    }

    fn index(&mut self, id: i32, local: Local) -> &Local {
        self.by_name.insert(local.name.clone(), local.clone());
        self.by_id.entry(id).or_insert(local)
    }

    pub fn lookup(&self, id: i32) -> Option<&Local> {
        self.by_id.get(&id)
    }

    /// Most recently registered local with this name, parameter or variable.
    pub fn lookup_name(&self, name: &str) -> Option<&Local> {
        self.by_name.get(name)
    }

    pub fn parameters(&self, stack: StackType) -> &[Local] {
        self.parameters.get(&stack).map_or(&[], Vec::as_slice)
    }

    pub fn variables(&self, stack: StackType) -> &[Local] {
        self.variables.get(&stack).map_or(&[], Vec::as_slice)
    }

    pub fn parameter_count(&self, stack: StackType) -> usize {
        self.parameters(stack).len()
    }

    pub fn variable_count(&self, stack: StackType) -> usize {
        self.variables(stack).len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn slots_follow_parameters_per_stack_type() {
        let mut locals = LocalMap::new();
        assert_eq!(locals.register_parameter(0, "a", PrimitiveType::Int).unwrap().slot, 0);
        assert_eq!(locals.register_parameter(1, "s", PrimitiveType::String).unwrap().slot, 0);
        assert_eq!(locals.register_parameter(2, "b", PrimitiveType::Obj).unwrap().slot, 1);
        assert_eq!(locals.register_variable(3, "c", PrimitiveType::Bool).unwrap().slot, 2);
        assert_eq!(locals.register_variable(4, "l", PrimitiveType::Long).unwrap().slot, 0);
        assert_eq!(locals.parameter_count(StackType::Int), 2);
        assert_eq!(locals.variable_count(StackType::Int), 1);
        assert_eq!(locals.lookup(2).unwrap().name, "b");
    }

    #[test]
    fn shadowing_takes_a_new_slot() {
        let mut locals = LocalMap::new();
        locals.register_variable(0, "x", PrimitiveType::Int).unwrap();
        locals.register_variable(1, "x", PrimitiveType::Int).unwrap();
        assert_eq!(locals.lookup(0).unwrap().slot, 0);
        assert_eq!(locals.lookup(1).unwrap().slot, 1);
        assert_eq!(locals.lookup_name("x").unwrap().slot, 1);
    }

    #[test]
    fn rejects_late_parameters_and_void() {
        let mut locals = LocalMap::new();
        locals.register_variable(0, "x", PrimitiveType::Int).unwrap();
        assert!(matches!(
            locals.register_parameter(1, "p", PrimitiveType::Int),
            Err(LocalError::ParameterAfterVariable(_))
        ));
        assert!(matches!(
            locals.register_variable(2, "v", PrimitiveType::Void),
            Err(LocalError::Undeclarable(_))
        ));
    }
}
