use crate::call_stack::{CallFrame, CallStack};
use crate::error::{Result, VmError};
use crate::header::{self, Header};
use crate::memory::Memory;
use crate::text::TextDecoder;
use crate::zobject::ObjectTable;
use log::{debug, trace};
use std::fmt;

/// Maximum number of local variables per routine
pub const MAX_ROUTINE_LOCALS: u8 = 15;

/// The Z-Machine virtual machine state
pub struct VM {
    /// The story image being executed
    pub memory: Memory,
    /// Image as loaded, for restart and verify
    pristine: Vec<u8>,
    /// Active routine frames; the bottom one is the main routine
    pub call_stack: CallStack,
}

impl VM {
    /// Create a new VM for `memory` and enter the main routine
    pub fn new(memory: Memory) -> Result<Self> {
        let pristine = memory.bytes().to_vec();
        let mut vm = VM {
            memory,
            pristine,
            call_stack: CallStack::new(),
        };
        vm.enter_main()?;
        Ok(vm)
    }

    fn enter_main(&mut self) -> Result<()> {
        self.call_stack.clear();
        let header = Header::new(&self.memory);
        if header.version() <= 5 {
            // Execution starts at a byte address with no routine header
            let pc = header.initial_pc() as u32;
            self.call_stack.push_frame(pc)?;
        } else {
            let entry = header.unpack_routine(header.initial_pc());
            let num_locals = self.memory.read_byte(entry)?;
            let frame = self.call_stack.push_frame(entry + 1)?;
            frame.num_locals = num_locals.min(MAX_ROUTINE_LOCALS);
        }
        debug!("Entered main routine at {:05x}", self.pc()?);
        Ok(())
    }

    /// Restore the loaded image and restart from the main routine. The
    /// transcript and fixed-pitch bits of Flags 2 survive.
    pub fn reset(&mut self) -> Result<()> {
        let flags2 = self.memory.read_word(header::FLAGS2 as u32)? & 0x0003;
        self.memory.copy_from(&self.pristine)?;
        let restored = self.memory.read_word(header::FLAGS2 as u32)?;
        self.memory
            .write_word(header::FLAGS2 as u32, (restored & !0x0003) | flags2)?;
        self.enter_main()
    }

    pub fn pristine(&self) -> &[u8] {
        &self.pristine
    }

    pub fn header(&self) -> Header<'_> {
        Header::new(&self.memory)
    }

    pub fn version(&self) -> u8 {
        self.header().version()
    }

    pub fn objects(&self) -> ObjectTable {
        ObjectTable::new(&self.memory)
    }

    pub fn text(&self) -> Result<TextDecoder<'_>> {
        TextDecoder::new(&self.memory)
    }

    /// Program counter of the current frame
    pub fn pc(&self) -> Result<u32> {
        Ok(self.call_stack.current_frame()?.pc)
    }

    pub fn set_pc(&mut self, pc: u32) -> Result<()> {
        self.call_stack.current_frame_mut()?.pc = pc;
        Ok(())
    }

    pub fn frame(&self) -> Result<&CallFrame> {
        self.call_stack.current_frame()
    }

    pub fn frame_mut(&mut self) -> Result<&mut CallFrame> {
        self.call_stack.current_frame_mut()
    }

    /// Push a value onto the current evaluation stack
    pub fn push(&mut self, value: u16) -> Result<()> {
        self.frame_mut()?.push(value)
    }

    /// Pop a value from the current evaluation stack
    pub fn pop(&mut self) -> Result<u16> {
        self.frame_mut()?.pop()
    }

    pub fn peek(&self) -> Result<u16> {
        self.frame()?.peek()
    }

    /// Globals are variables 0x10-0xFF
    fn global_address(&self, var: u8) -> Result<u32> {
        if var < 0x10 {
            return Err(VmError::InvalidStory(format!(
                "variable {:02x} is not a global",
                var
            )));
        }
        Ok(self.header().global_variables() as u32 + (var as u32 - 0x10) * 2)
    }

    pub fn read_global(&self, var: u8) -> Result<u16> {
        self.memory.read_word(self.global_address(var)?)
    }

    pub fn write_global(&mut self, var: u8, value: u16) -> Result<()> {
        let address = self.global_address(var)?;
        self.memory.write_word(address, value)
    }

    /// Read a variable (0x00 = pop stack, 0x01-0x0F = local, 0x10-0xFF = global)
    pub fn read_variable(&mut self, var: u8) -> Result<u16> {
        let value = match var {
            0x00 => self.pop()?,
            0x01..=0x0F => self.frame()?.read_local((var - 1) as usize),
            _ => self.read_global(var)?,
        };
        trace!("read_variable({:02x}) = {:04x}", var, value);
        Ok(value)
    }

    /// Write a variable (0x00 = push stack, 0x01-0x0F = local, 0x10-0xFF = global)
    pub fn write_variable(&mut self, var: u8, value: u16) -> Result<()> {
        trace!("write_variable({:02x}, {:04x})", var, value);
        match var {
            0x00 => self.push(value),
            0x01..=0x0F => {
                self.frame_mut()?.write_local((var - 1) as usize, value);
                Ok(())
            }
            _ => self.write_global(var, value),
        }
    }

    /// Read a variable named by another instruction's operand. Variable 0
    /// peeks at the stack top instead of popping.
    pub fn read_variable_indirect(&mut self, var: u8) -> Result<u16> {
        if var == 0 {
            self.peek()
        } else {
            self.read_variable(var)
        }
    }

    /// Write a variable named by another instruction's operand. Variable 0
    /// replaces the stack top instead of pushing.
    pub fn write_variable_indirect(&mut self, var: u8, value: u16) -> Result<()> {
        if var == 0 {
            self.frame_mut()?.replace_top(value)
        } else {
            self.write_variable(var, value)
        }
    }

    /// Sum of the image bytes after the header, as the `verify` opcode checks it
    pub fn checksum(&self) -> u16 {
        let header = self.header();
        let end = header.file_length().min(self.pristine.len());
        if end <= crate::memory::HEADER_SIZE {
            return 0;
        }
        self.pristine[crate::memory::HEADER_SIZE..end]
            .iter()
            .fold(0u16, |sum, &b| sum.wrapping_add(b as u16))
    }

    pub fn call_depth(&self) -> usize {
        self.call_stack.depth()
    }
}

impl fmt::Debug for VM {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VM")
            .field("version", &self.version())
            .field("pc", &self.pc().ok())
            .field("call_depth", &self.call_depth())
            .finish()
    }
}

impl From<VM> for Memory {
    fn from(vm: VM) -> Memory {
        vm.memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{StoryBuilder, CODE_START, GLOBALS};

    fn create_test_vm(version: u8) -> VM {
        VM::new(StoryBuilder::new(version).global(0, 0x1234).build().unwrap()).unwrap()
    }

    #[test]
    fn test_vm_creation() {
        let vm = create_test_vm(3);
        assert_eq!(vm.version(), 3);
        assert_eq!(vm.pc().unwrap(), CODE_START);
        assert_eq!(vm.call_depth(), 1);
    }

    #[test]
    fn test_v6_enters_main_routine() {
        let vm = create_test_vm(6);
        assert_eq!(vm.pc().unwrap(), CODE_START + 1);
        assert_eq!(vm.frame().unwrap().num_locals, 0);
    }

    #[test]
    fn test_stack_variable_asymmetry() {
        let mut vm = create_test_vm(5);
        vm.write_variable(0, 10).unwrap();
        vm.write_variable(0, 20).unwrap();
        assert_eq!(vm.frame().unwrap().stack_depth(), 2);
        assert_eq!(vm.read_variable(0).unwrap(), 20);
        assert_eq!(vm.read_variable(0).unwrap(), 10);
        assert!(matches!(vm.read_variable(0), Err(VmError::StackUnderflow(_))));
    }

    #[test]
    fn test_global_access_rejects_local_numbers() {
        let mut vm = create_test_vm(5);
        vm.write_global(0x10, 0x1234).unwrap();
        assert_eq!(vm.read_global(0x10).unwrap(), 0x1234);
        assert_eq!(vm.read_global(0xFF).unwrap(), 0);
        assert!(matches!(vm.read_global(0x0F), Err(VmError::InvalidStory(_))));
        assert!(matches!(vm.write_global(0x00, 1), Err(VmError::InvalidStory(_))));
    }

    #[test]
    fn test_indirect_stack_access_in_place() {
        let mut vm = create_test_vm(5);
        vm.push(5).unwrap();
        assert_eq!(vm.read_variable_indirect(0).unwrap(), 5);
        vm.write_variable_indirect(0, 6).unwrap();
        assert_eq!(vm.frame().unwrap().stack_depth(), 1);
        assert_eq!(vm.pop().unwrap(), 6);
    }

    #[test]
    fn test_global_variables_round_trip() {
        let mut vm = create_test_vm(3);
        assert_eq!(vm.read_variable(0x10).unwrap(), 0x1234);
        vm.write_variable(0x11, 0xABCD).unwrap();
        assert_eq!(vm.read_global(0x11).unwrap(), 0xABCD);
        // Stored big-endian at globals + 2
        assert_eq!(vm.memory.read_byte(GLOBALS + 2).unwrap(), 0xAB);
        assert_eq!(vm.memory.read_byte(GLOBALS + 3).unwrap(), 0xCD);
        vm.write_variable(0xFF, 7).unwrap();
        assert_eq!(vm.memory.read_word(GLOBALS + 0xEF * 2).unwrap(), 7);
    }

    #[test]
    fn test_local_variables() {
        let mut vm = create_test_vm(3);
        assert_eq!(vm.read_variable(3).unwrap(), 0);
        vm.write_variable(3, 99).unwrap();
        assert_eq!(vm.read_variable(3).unwrap(), 99);
    }

    #[test]
    fn test_reset_restores_memory_and_stack() {
        let mut vm = create_test_vm(3);
        vm.write_global(0x10, 1).unwrap();
        vm.push(3).unwrap();
        vm.set_pc(CODE_START + 10).unwrap();
        vm.memory.write_word(header::FLAGS2 as u32, 0x0001).unwrap();
        vm.reset().unwrap();
        assert_eq!(vm.read_global(0x10).unwrap(), 0x1234);
        assert_eq!(vm.frame().unwrap().stack_depth(), 0);
        assert_eq!(vm.pc().unwrap(), CODE_START);
        assert_eq!(vm.memory.read_word(header::FLAGS2 as u32).unwrap(), 0x0001);
    }

    #[test]
    fn test_checksum_matches_header() {
        let vm = create_test_vm(5);
        assert_eq!(vm.checksum(), vm.header().checksum());
    }
}
