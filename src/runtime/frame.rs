use std::collections::HashMap;

use crate::lang::value::Value;

/// Return address of the root frame. A balanced program never returns to it.
pub const ROOT_RETURN_ADDRESS: usize = usize::MAX;

/// Per-invocation variable bindings plus the address to resume at on RET.
///
/// Bindings are flat: no block scoping, and no lookup into the caller's
/// frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    variables: HashMap<String, Value>,
    return_address: usize,
}

impl Frame {
    pub fn new(return_address: usize) -> Self {
        Self {
            variables: HashMap::new(),
            return_address,
        }
    }

    /// Frame holding top-level variables.
    pub fn root() -> Self {
        Self::new(ROOT_RETURN_ADDRESS)
    }

    pub fn is_root(&self) -> bool {
        self.return_address == ROOT_RETURN_ADDRESS
    }

    pub fn return_address(&self) -> usize {
        self.return_address
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Bind `name`, replacing any previous binding.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn variables(&self) -> &HashMap<String, Value> {
        &self.variables
    }
}
