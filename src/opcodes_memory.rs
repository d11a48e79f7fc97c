/// Memory operations for Z-Machine interpreter
///
/// This module handles all memory access operations including:
/// - Variable operations (load, store), which name their variable indirectly
/// - Word and byte array access (loadw, storew, loadb, storeb)
/// - Table operations (copy_table, scan_table)
///
/// Array addresses are computed in 16 bits, so `array + index` wraps the way
/// story files expect.
use crate::error::{Result, VmError};
use crate::instruction::Instruction;
use crate::interpreter::{ExecutionResult, Interpreter};
use crate::opcode_tables::Mnemonic;
use log::debug;

impl Interpreter {
    /// Handle memory access opcodes
    pub fn execute_memory_op(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> Result<ExecutionResult> {
        let operand = |i: usize| operands.get(i).copied().unwrap_or(0);

        match inst.mnemonic() {
            // 1OP:0x0E - load
            Mnemonic::Load => {
                let value = self.vm.read_variable_indirect(operand(0) as u8)?;
                self.store_result(inst, value)?;
                Ok(ExecutionResult::Continue)
            }

            // 2OP:0x0D - store
            Mnemonic::Store => {
                let var = operand(0) as u8;
                debug!("store: V{:02x} = {}", var, operand(1));
                self.vm.write_variable_indirect(var, operand(1))?;
                Ok(ExecutionResult::Continue)
            }

            // 2OP:0x0F - loadw
            Mnemonic::Loadw => {
                let address = operand(0).wrapping_add(operand(1).wrapping_mul(2));
                let value = self.vm.memory.read_word(address as u32)?;
                self.store_result(inst, value)?;
                Ok(ExecutionResult::Continue)
            }

            // 2OP:0x10 - loadb
            Mnemonic::Loadb => {
                let address = operand(0).wrapping_add(operand(1));
                let value = self.vm.memory.read_byte(address as u32)?;
                self.store_result(inst, value as u16)?;
                Ok(ExecutionResult::Continue)
            }

            // VAR:0x01 - storew
            Mnemonic::Storew => {
                let address = operand(0).wrapping_add(operand(1).wrapping_mul(2));
                self.vm.memory.write_word(address as u32, operand(2))?;
                Ok(ExecutionResult::Continue)
            }

            // VAR:0x02 - storeb
            Mnemonic::Storeb => {
                let address = operand(0).wrapping_add(operand(1));
                self.vm.memory.write_byte(address as u32, operand(2) as u8)?;
                Ok(ExecutionResult::Continue)
            }

            // VAR:0x1D - copy_table
            Mnemonic::CopyTable => {
                self.copy_table(operand(0) as u32, operand(1) as u32, operand(2) as i16)?;
                Ok(ExecutionResult::Continue)
            }

            // VAR:0x17 - scan_table
            Mnemonic::ScanTable => {
                let form = operands.get(3).copied().unwrap_or(0x82);
                let found = self.scan_table(operand(0), operand(1) as u32, operand(2), form)?;
                self.store_result(inst, found.unwrap_or(0) as u16)?;
                self.do_branch(inst, found.is_some())
            }

            _ => Err(VmError::InvalidStory(format!(
                "Unhandled memory opcode: {}",
                inst.name()
            ))),
        }
    }

    /// Copy `size` bytes from `first` to `second`. A zero `second` clears the
    /// source instead; a negative size forces a forward byte-by-byte copy even
    /// when the ranges overlap.
    fn copy_table(&mut self, first: u32, second: u32, size: i16) -> Result<()> {
        let len = size.unsigned_abs() as u32;
        debug!("copy_table {:04x} -> {:04x}, size {}", first, second, size);

        if second == 0 {
            for i in 0..len {
                self.vm.memory.write_byte(first + i, 0)?;
            }
        } else if size < 0 {
            for i in 0..len {
                let byte = self.vm.memory.read_byte(first + i)?;
                self.vm.memory.write_byte(second + i, byte)?;
            }
        } else {
            let source = self.vm.memory.slice(first, len as usize)?.to_vec();
            for (i, byte) in source.into_iter().enumerate() {
                self.vm.memory.write_byte(second + i as u32, byte)?;
            }
        }
        Ok(())
    }

    /// Address of the first field in `table` whose leading word (form bit 7
    /// set) or byte equals `value`. Fields are `form & 0x7F` bytes long.
    fn scan_table(&self, value: u16, table: u32, len: u16, form: u16) -> Result<Option<u32>> {
        let field = (form & 0x7F) as u32;
        let words = form & 0x80 != 0;
        for i in 0..len as u32 {
            let address = table + i * field;
            let entry = if words {
                self.vm.memory.read_word(address)?
            } else {
                self.vm.memory.read_byte(address)? as u16
            };
            if entry == value {
                return Ok(Some(address));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{Harness, StoryBuilder};
    use test_log::test;

    const TABLE: u32 = 0x1200;

    fn run(builder: StoryBuilder) -> Harness {
        let mut h = Harness::new(builder, &[]).unwrap();
        h.run().unwrap();
        h
    }

    #[test]
    fn test_loadw_and_storew() {
        let h = run(StoryBuilder::new(3).words_at(TABLE, &[0x1111, 0x2222]).code(&[
            0xCF, 0x1F, 0x12, 0x00, 0x01, 0x10, // loadw #1200, #01 -> G00
            0xE1, 0x13, 0x12, 0x00, 0x02, 0xBE, 0xEF, // storew #1200, #02, #beef
            0xBA,
        ]));
        assert_eq!(h.global(0), 0x2222);
        let memory = &h.interpreter.vm.memory;
        assert_eq!(memory.read_word(TABLE + 4).unwrap(), 0xBEEF);
    }

    #[test]
    fn test_loadb_and_storeb() {
        let h = run(StoryBuilder::new(3).bytes_at(TABLE, &[7, 8, 9]).code(&[
            0xD0, 0x1F, 0x12, 0x00, 0x02, 0x10, // loadb #1200, #02 -> G00
            0xE2, 0x17, 0x12, 0x00, 0x00, 0x2A, // storeb #1200, #00, #2a
            0xBA,
        ]));
        assert_eq!(h.global(0), 9);
        assert_eq!(h.interpreter.vm.memory.read_byte(TABLE).unwrap(), 0x2A);
    }

    #[test]
    fn test_store_and_load_use_stack_in_place() {
        let h = run(StoryBuilder::new(5).code(&[
            0xE8, 0x7F, 0x01, // push #01
            0x0D, 0x00, 0x09, // store sp, #09 (replaces top)
            0x9E, 0x00, 0x10, // load sp -> G00 (peeks)
            0xE9, 0x7F, 0x11, // pull G01
            0xBA,
        ]));
        assert_eq!(h.global(0), 9);
        assert_eq!(h.global(1), 9);
        let frame = h.interpreter.vm.frame().unwrap();
        assert_eq!(frame.stack_depth(), 0);
    }

    #[test]
    fn test_copy_table_overlapping_move() {
        let h = run(StoryBuilder::new(5).bytes_at(TABLE, &[1, 2, 3, 4, 0]).code(&[
            // copy_table #1200, #1201, #0004
            0xFD, 0x03, 0x12, 0x00, 0x12, 0x01, 0x00, 0x04, //
            0xBA,
        ]));
        let memory = &h.interpreter.vm.memory;
        assert_eq!(memory.slice(TABLE, 5).unwrap(), &[1, 1, 2, 3, 4]);
    }

    #[test]
    fn test_copy_table_negative_size_copies_forward() {
        let h = run(StoryBuilder::new(5).bytes_at(TABLE, &[1, 2, 3, 4, 0]).code(&[
            // copy_table #1200, #1201, #-4
            0xFD, 0x03, 0x12, 0x00, 0x12, 0x01, 0xFF, 0xFC, //
            0xBA,
        ]));
        let memory = &h.interpreter.vm.memory;
        assert_eq!(memory.slice(TABLE, 5).unwrap(), &[1, 1, 1, 1, 1]);
    }

    #[test]
    fn test_copy_table_zero_destination_clears() {
        let h = run(StoryBuilder::new(5).bytes_at(TABLE, &[1, 2, 3]).code(&[
            // copy_table #1200, #00, #03
            0xFD, 0x17, 0x12, 0x00, 0x00, 0x03, //
            0xBA,
        ]));
        assert_eq!(h.interpreter.vm.memory.slice(TABLE, 3).unwrap(), &[0, 0, 0]);
    }

    #[test]
    fn test_scan_table_words_and_bytes() {
        let h = run(
            StoryBuilder::new(5)
                .words_at(TABLE, &[10, 20, 30])
                .bytes_at(TABLE + 0x10, &[5, 0, 6, 0, 7, 0])
                .code(&[
                    // Each branch lands on the next instruction either way
                    // scan_table #0014, #1200, #03 -> G00 [TRUE +2]
                    0xF7, 0x07, 0x00, 0x14, 0x12, 0x00, 0x03, 0x10, 0xC2, //
                    // scan_table #07, #1210, #03, #02 -> G01 (two-byte byte fields)
                    0xF7, 0x45, 0x07, 0x12, 0x10, 0x03, 0x02, 0x11, 0xC2, //
                    // scan_table #63, #1200, #03 -> G02
                    0xF7, 0x47, 0x63, 0x12, 0x00, 0x03, 0x12, 0xC2, //
                    0xBA,
                ]),
        );
        assert_eq!(h.global(0), TABLE as u16 + 2);
        assert_eq!(h.global(1), TABLE as u16 + 0x14);
        assert_eq!(h.global(2), 0);
    }
}
