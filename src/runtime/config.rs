use serde::Deserialize;

/// Resource limits for a [`Machine`](crate::runtime::vm_bc::Machine).
///
/// Every limit is off by default: the engine itself runs a malformed program
/// forever. A driver that wants a watchdog opts in here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VmConfig {
    /// Maximum number of instructions to execute.
    pub max_steps: Option<u64>,
    /// Maximum call-frame depth, root frame included.
    pub max_frames: Option<usize>,
    /// Maximum operand stack size.
    pub max_stack: Option<usize>,
}

impl VmConfig {
    pub fn with_max_steps(mut self, limit: u64) -> Self {
        self.max_steps = Some(limit);
        self
    }

    pub fn with_max_frames(mut self, limit: usize) -> Self {
        self.max_frames = Some(limit);
        self
    }

    pub fn with_max_stack(mut self, limit: usize) -> Self {
        self.max_stack = Some(limit);
        self
    }
}
