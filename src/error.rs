//! Error type shared by every part of the interpreter.
//!
//! Faults raised while an instruction executes are wrapped in
//! [`VmError::Execution`] by the run loop so the host sees the program
//! counter, opcode, operands and frame depth of the failing instruction.

use thiserror::Error;

use crate::display_trait::DisplayError;

pub type Result<T> = std::result::Result<T, VmError>;

#[derive(Debug, Error)]
pub enum VmError {
    #[error("memory fault: {width}-byte access at 0x{address:05x} outside story image of {size} bytes")]
    MemoryFault {
        address: u32,
        width: u32,
        size: usize,
    },

    #[error("stack underflow: {0}")]
    StackUnderflow(String),

    #[error("stack overflow: more than {0} entries")]
    StackOverflow(usize),

    #[error("malformed text: {0}")]
    MalformedText(String),

    #[error("malformed property: {0}")]
    MalformedProperty(String),

    #[error("malformed object tree: {0}")]
    MalformedObjectTree(String),

    #[error("invalid object number {0}")]
    InvalidObject(u16),

    #[error("division by zero")]
    DivisionByZero,

    #[error("invalid story file: {0}")]
    InvalidStory(String),

    #[error("input closed")]
    InputClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Display(#[from] DisplayError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(
        "fault at PC 0x{pc:05x} executing {mnemonic} (opcode 0x{opcode:02x}, operands {operands:04x?}, frame depth {depth}): {source}"
    )]
    Execution {
        pc: u32,
        opcode: u8,
        mnemonic: &'static str,
        operands: Vec<u16>,
        depth: usize,
        #[source]
        source: Box<VmError>,
    },
}

impl VmError {
    /// The innermost fault, looking through any execution context.
    pub fn root_cause(&self) -> &VmError {
        match self {
            VmError::Execution { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<VmError> for String {
    fn from(error: VmError) -> String {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_context() {
        let err = VmError::Execution {
            pc: 0x1234,
            opcode: 0x17,
            mnemonic: "div",
            operands: vec![4, 0],
            depth: 2,
            source: Box::new(VmError::DivisionByZero),
        };
        assert!(matches!(err.root_cause(), VmError::DivisionByZero));
        let text = err.to_string();
        assert!(text.contains("0x01234"));
        assert!(text.contains("div"));
        assert!(text.contains("frame depth 2"));
    }

    #[test]
    fn test_memory_fault_message() {
        let err = VmError::MemoryFault {
            address: 0x10000,
            width: 2,
            size: 0x8000,
        };
        assert_eq!(
            err.to_string(),
            "memory fault: 2-byte access at 0x10000 outside story image of 32768 bytes"
        );
    }
}
