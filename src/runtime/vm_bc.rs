use tracing::{debug, trace};

use crate::bytecode::{Opcode, ProgramBc};
use crate::lang::value::Value;
use crate::runtime::builtins::Builtins;
use crate::runtime::config::VmConfig;
use crate::runtime::frame::Frame;
use crate::runtime::runtime_error::{RuntimeError, StackKind, stack_underflow};
use crate::runtime::table::InstructionTable;

/// Counters kept across a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    pub steps: u64,
    pub calls: u64,
    pub returns: u64,
    /// Deepest frame stack seen, root frame included.
    pub max_frame_depth: usize,
}

/// Everything a handler may touch: pointer, operand stack, frames and
/// builtins. The instruction stream itself stays with the [`Machine`].
#[derive(Debug)]
pub struct MachineState {
    ip: usize,
    stack: Vec<Value>,
    // root frame first, active frame last
    frames: Vec<Frame>,
    halted: bool,
    builtins: Builtins,
    config: VmConfig,
    stats: ExecutionStats,
    current: (usize, Opcode),
    // first fatal error; the machine is halted once set
    error: Option<RuntimeError>,
}

impl MachineState {
    fn new(builtins: Builtins, config: VmConfig) -> Self {
        Self {
            ip: 0,
            stack: Vec::new(),
            frames: vec![Frame::root()],
            halted: false,
            builtins,
            config,
            stats: ExecutionStats {
                max_frame_depth: 1,
                ..ExecutionStats::default()
            },
            current: (0, Opcode::Halt),
            error: None,
        }
    }

    /// Address of the next instruction to fetch.
    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn jump(&mut self, target: usize) {
        self.ip = target;
    }

    pub fn halt(&mut self) {
        self.halted = true;
    }

    /// Opcode of the instruction being executed.
    pub fn current_opcode(&self) -> Opcode {
        self.current.1
    }

    pub fn malformed(&self, reason: impl Into<String>) -> RuntimeError {
        let (address, opcode) = self.current;
        RuntimeError::MalformedInstruction {
            address,
            opcode,
            reason: reason.into(),
        }
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if let Some(limit) = self.config.max_stack {
            if self.stack.len() >= limit {
                return Err(RuntimeError::StackOverflow { limit });
            }
        }
        self.stack.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack
            .pop()
            .ok_or_else(|| stack_underflow(self.current_opcode()))
    }

    /// The active frame. The root frame is never popped, so there is always
    /// one.
    pub fn frame(&self) -> &Frame {
        &self.frames[self.frames.len() - 1]
    }

    pub fn frame_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    pub fn push_frame(&mut self, frame: Frame) -> Result<(), RuntimeError> {
        if let Some(limit) = self.config.max_frames {
            if self.frames.len() >= limit {
                return Err(RuntimeError::FrameLimitExceeded { limit });
            }
        }
        debug!(
            from = self.current.0,
            return_address = frame.return_address(),
            depth = self.frames.len() + 1,
            "call"
        );
        self.frames.push(frame);
        self.stats.calls += 1;
        self.stats.max_frame_depth = self.stats.max_frame_depth.max(self.frames.len());
        Ok(())
    }

    /// Pop the active frame. Fails when only the root frame is left.
    pub fn pop_frame(&mut self) -> Result<Frame, RuntimeError> {
        let frame = match self.frames.len() {
            0 | 1 => None,
            _ => self.frames.pop(),
        }
        .ok_or(RuntimeError::StackUnderflow {
            stack: StackKind::Frame,
            opcode: self.current_opcode(),
        })?;
        debug!(
            from = self.current.0,
            return_address = frame.return_address(),
            depth = self.frames.len(),
            "return"
        );
        self.stats.returns += 1;
        Ok(frame)
    }

    pub fn builtins_mut(&mut self) -> &mut Builtins {
        &mut self.builtins
    }
}

/// Fetch-decode-execute engine over a flat instruction stream.
///
/// CALL and RET move frames on an explicit stack: recursion depth in the
/// guest program never grows the host stack.
#[derive(Debug)]
pub struct Machine {
    program: ProgramBc,
    table: InstructionTable,
    state: MachineState,
}

impl Machine {
    pub fn new(program: ProgramBc, builtins: Builtins) -> Self {
        Self::with_config(program, builtins, VmConfig::default())
    }

    pub fn with_config(program: ProgramBc, builtins: Builtins, config: VmConfig) -> Self {
        Self {
            program,
            table: InstructionTable::standard(),
            state: MachineState::new(builtins, config),
        }
    }

    /// Replace the instruction table.
    pub fn with_table(mut self, table: InstructionTable) -> Self {
        self.table = table;
        self
    }

    /// Step until HALT. Any error is fatal: the machine halts where it failed
    /// and every later `run` or `step` returns the same error.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        if let Some(e) = &self.state.error {
            return Err(e.clone());
        }

        while !self.state.halted {
            if let Err(e) = self.step() {
                debug!(address = self.state.current.0, error = %e, "execution failed");
                return Err(e);
            }
        }

        debug!(
            steps = self.state.stats.steps,
            calls = self.state.stats.calls,
            returns = self.state.stats.returns,
            stack = self.state.stack.len(),
            "halted"
        );
        Ok(())
    }

    /// Execute one instruction. Does nothing once halted by HALT.
    pub fn step(&mut self) -> Result<(), RuntimeError> {
        if let Some(e) = &self.state.error {
            return Err(e.clone());
        }
        if self.state.halted {
            return Ok(());
        }

        let result = self.execute();
        if let Err(e) = &result {
            self.state.halted = true;
            self.state.error = Some(e.clone());
        }
        result
    }

    fn execute(&mut self) -> Result<(), RuntimeError> {
        if let Some(limit) = self.state.config.max_steps {
            if self.state.stats.steps >= limit {
                return Err(RuntimeError::StepLimitExceeded { limit });
            }
        }

        let address = self.state.ip;
        let instruction = self
            .program
            .get(address)
            .ok_or(RuntimeError::InvalidAddress {
                address,
                len: self.program.len(),
            })?;
        self.state.ip += 1;
        self.state.stats.steps += 1;
        self.state.current = (address, instruction.opcode);

        let descriptor = self.table.resolve(instruction.opcode.name())?;
        if instruction.operands.len() != descriptor.arity {
            return Err(self.state.malformed(format!(
                "expected {} operand(s), found {}",
                descriptor.arity,
                instruction.operands.len()
            )));
        }

        trace!(address, opcode = %instruction.opcode, stack = self.state.stack.len(), "exec");
        (descriptor.handler)(&mut self.state, &instruction.operands)
    }

    pub fn is_halted(&self) -> bool {
        self.state.halted
    }

    /// The fatal error that halted the machine, if any.
    pub fn error(&self) -> Option<&RuntimeError> {
        self.state.error.as_ref()
    }

    pub fn ip(&self) -> usize {
        self.state.ip
    }

    pub fn stack(&self) -> &[Value] {
        &self.state.stack
    }

    /// Number of live frames, root frame included.
    pub fn frame_depth(&self) -> usize {
        self.state.frames.len()
    }

    /// Top-level bindings.
    pub fn globals(&self) -> &Frame {
        &self.state.frames[0]
    }

    pub fn stats(&self) -> ExecutionStats {
        self.state.stats
    }

    pub fn program(&self) -> &ProgramBc {
        &self.program
    }

    pub fn builtins_mut(&mut self) -> &mut Builtins {
        &mut self.state.builtins
    }
}
