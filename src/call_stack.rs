use crate::error::{Result, VmError};
use log::trace;

/// Number of local variable slots carried by every frame.
pub const MAX_LOCALS: usize = 16;

/// Maximum depth of a single frame's evaluation stack
pub const EVAL_STACK_LIMIT: usize = 1024;

/// Maximum number of nested routine calls
pub const CALL_DEPTH_LIMIT: usize = 1024;

/// One active routine invocation
#[derive(Debug, Clone)]
pub struct CallFrame {
    /// Byte address of the next instruction to execute in this routine
    pub pc: u32,
    /// Local variable values; slots past `num_locals` read as 0
    pub locals: [u16; MAX_LOCALS],
    /// Locals declared by the routine header
    pub num_locals: u8,
    /// Arguments supplied by the caller
    pub arity: u8,
    /// Where the caller wants the return value (None = discard)
    pub store_to: Option<u8>,
    /// Evaluation stack for variable 0
    stack: Vec<u16>,
}

impl CallFrame {
    pub fn new(entry_address: u32) -> Self {
        CallFrame {
            pc: entry_address,
            locals: [0; MAX_LOCALS],
            num_locals: 0,
            arity: 0,
            store_to: None,
            stack: Vec::new(),
        }
    }

    pub fn push(&mut self, value: u16) -> Result<()> {
        if self.stack.len() >= EVAL_STACK_LIMIT {
            return Err(VmError::StackOverflow(EVAL_STACK_LIMIT));
        }
        self.stack.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<u16> {
        self.stack.pop().ok_or_else(|| {
            VmError::StackUnderflow(format!("evaluation stack empty in routine at PC {:05x}", self.pc))
        })
    }

    pub fn peek(&self) -> Result<u16> {
        self.stack.last().copied().ok_or_else(|| {
            VmError::StackUnderflow(format!("evaluation stack empty in routine at PC {:05x}", self.pc))
        })
    }

    /// Overwrite the top of the evaluation stack without changing its depth.
    pub fn replace_top(&mut self, value: u16) -> Result<()> {
        match self.stack.last_mut() {
            Some(top) => {
                *top = value;
                Ok(())
            }
            None => Err(VmError::StackUnderflow(format!(
                "no stack top to replace in routine at PC {:05x}",
                self.pc
            ))),
        }
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Read local `index` (0-based). Unset locals hold their initial 0.
    pub fn read_local(&self, index: usize) -> u16 {
        self.locals.get(index).copied().unwrap_or(0)
    }

    /// Write local `index` (0-based). Writes never fail; slots past the
    /// declared count are simply stored.
    pub fn write_local(&mut self, index: usize, value: u16) {
        if let Some(slot) = self.locals.get_mut(index) {
            *slot = value;
        }
    }
}

/// Stack of active routine frames. The bottom frame is the main routine and
/// is never popped.
#[derive(Debug, Clone, Default)]
pub struct CallStack {
    frames: Vec<CallFrame>,
}

impl CallStack {
    pub fn new() -> Self {
        CallStack { frames: Vec::new() }
    }

    /// Push a fresh frame starting at `entry_address`. Locals and arity are
    /// filled in by the caller.
    pub fn push_frame(&mut self, entry_address: u32) -> Result<&mut CallFrame> {
        if self.frames.len() >= CALL_DEPTH_LIMIT {
            return Err(VmError::StackOverflow(CALL_DEPTH_LIMIT));
        }
        trace!("push_frame: entry {:05x}, depth {}", entry_address, self.frames.len() + 1);
        self.frames.push(CallFrame::new(entry_address));
        let last = self.frames.len() - 1;
        Ok(&mut self.frames[last])
    }

    pub fn current_frame(&self) -> Result<&CallFrame> {
        self.frames
            .last()
            .ok_or_else(|| VmError::StackUnderflow("no active routine".to_string()))
    }

    pub fn current_frame_mut(&mut self) -> Result<&mut CallFrame> {
        self.frames
            .last_mut()
            .ok_or_else(|| VmError::StackUnderflow("no active routine".to_string()))
    }

    /// Remove and return the top frame. Returning from the main routine is a
    /// fault; only `quit` halts the machine.
    pub fn pop_frame(&mut self) -> Result<CallFrame> {
        if self.frames.len() <= 1 {
            return Err(VmError::StackUnderflow(
                "return from the main routine".to_string(),
            ));
        }
        self.frames
            .pop()
            .ok_or_else(|| VmError::StackUnderflow("no active routine".to_string()))
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Discard frames above `depth`, used when unwinding to a catch point.
    pub fn unwind_to(&mut self, depth: usize) -> Result<()> {
        if depth == 0 || depth > self.frames.len() {
            return Err(VmError::StackUnderflow(format!(
                "cannot unwind to frame {} of {}",
                depth,
                self.frames.len()
            )));
        }
        self.frames.truncate(depth);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
