//! Lexical scopes for script locals and arrays.

use indexmap::IndexMap;
use thiserror::Error;

use super::types::PrimitiveType;

pub const DEFAULT_ARRAY_BUDGET: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    pub name: String,
    pub ty: PrimitiveType,
    /// Unique per script, in declaration order (parameters first).
    pub id: i32,
    /// Array slot when the local is an array.
    pub array: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("Local variable ${0} is already defined")]
    Duplicate(String),
    #[error("Too many arrays declared in script (maximum {limit})")]
    ArrayBudget { limit: usize },
}

#[derive(Debug, Default)]
struct Frame {
    locals: IndexMap<String, LocalEntry>,
}

/// Scope chain of one script.
///
/// Array declarations are counted against the root budget for the whole
/// script; leaving a nested scope never gives slots back.
#[derive(Debug)]
pub struct Scope {
    frames: Vec<Frame>,
    array_budget: usize,
    arrays_used: usize,
    next_id: i32,
}

impl Scope {
    pub fn new(array_budget: usize) -> Self {
        Self {
            frames: vec![Frame::default()],
            array_budget,
            arrays_used: 0,
            next_id: 0,
        }
    }

    pub fn enter(&mut self) {
        self.frames.push(Frame::default());
    }

    /// Leave the innermost scope. The root scope is never popped.
    pub fn exit(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn arrays_used(&self) -> usize {
        self.arrays_used
    }

    pub fn declare_variable(&mut self, name: &str, ty: PrimitiveType) -> Result<&LocalEntry, ScopeError> {
        self.declare(name, ty, None)
    }

    pub fn declare_array(
        &mut self,
        name: &str,
        element: PrimitiveType,
    ) -> Result<&LocalEntry, ScopeError> {
        if self.lookup(name).is_some() {
            return Err(ScopeError::Duplicate(name.to_string()));
        }
        if self.arrays_used >= self.array_budget {
            return Err(ScopeError::ArrayBudget {
                limit: self.array_budget,
            });
        }
        let index = self.arrays_used;
        self.arrays_used += 1;
        self.declare(name, element, Some(index))
    }

    fn declare(
        &mut self,
        name: &str,
        ty: PrimitiveType,
        array: Option<usize>,
    ) -> Result<&LocalEntry, ScopeError> {
        if self.lookup(name).is_some() {
            return Err(ScopeError::Duplicate(name.to_string()));
        }
        let id = self.next_id;
        self.next_id += 1;
        let top = self.frames.len() - 1;
        let entry = self.frames[top].locals.entry(name.to_string()).or_insert(LocalEntry {
            name: name.to_string(),
            ty,
            id,
            array,
        });
        Ok(entry)
    }

    /// Innermost visible local named `name`.
    pub fn lookup(&self, name: &str) -> Option<&LocalEntry> {
        self.frames.iter().rev().find_map(|frame| frame.locals.get(name))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn nested_names_are_visible_until_exit() {
        let mut scope = Scope::new(DEFAULT_ARRAY_BUDGET);
        scope.declare_variable("a", PrimitiveType::Int).unwrap();
        scope.enter();
        let b = scope.declare_variable("b", PrimitiveType::String).unwrap().id;
        assert_eq!(b, 1);
        assert!(scope.lookup("a").is_some());
        scope.exit();
        assert!(scope.lookup("b").is_none());
        // a sibling scope may reuse the name and gets a fresh id
        scope.enter();
        assert_eq!(scope.declare_variable("b", PrimitiveType::Int).unwrap().id, 2);
    }

    #[test]
    fn redeclaring_visible_name_fails() {
        let mut scope = Scope::new(DEFAULT_ARRAY_BUDGET);
        scope.declare_variable("a", PrimitiveType::Int).unwrap();
        scope.enter();
        assert_eq!(
            scope.declare_variable("a", PrimitiveType::Int).unwrap_err(),
            ScopeError::Duplicate("a".into())
        );
    }

    #[test]
    fn nested_arrays_count_against_root_budget() {
        let mut scope = Scope::new(2);
        scope.declare_array("a", PrimitiveType::Int).unwrap();
        scope.enter();
        assert_eq!(scope.declare_array("b", PrimitiveType::Int).unwrap().array, Some(1));
        scope.exit();
        scope.enter();
        assert_eq!(
            scope.declare_array("c", PrimitiveType::Int).unwrap_err(),
            ScopeError::ArrayBudget { limit: 2 }
        );
        assert_eq!(scope.arrays_used(), 2);
    }
}
