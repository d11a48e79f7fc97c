/// Mathematical and logical operations for Z-Machine interpreter
///
/// This module handles all arithmetic, comparison and bitwise operations:
/// - Arithmetic operations (add, sub, mul, div, mod), all signed 16-bit
/// - Bitwise operations (and, or, not, test) and shifts (log_shift, art_shift)
/// - Comparisons (je, jl, jg, jz) and counters (inc, dec, inc_chk, dec_chk)
/// - The random number generator
use crate::error::{Result, VmError};
use crate::instruction::Instruction;
use crate::interpreter::{ExecutionResult, Interpreter};
use crate::opcode_tables::Mnemonic;
use log::debug;

impl Interpreter {
    /// Handle mathematical and logical opcodes
    pub fn execute_math_op(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> Result<ExecutionResult> {
        let a = operands.first().copied().unwrap_or(0);
        let b = operands.get(1).copied().unwrap_or(0);

        match inst.mnemonic() {
            // 2OP:0x14 - add
            Mnemonic::Add => {
                self.store_result(inst, (a as i16).wrapping_add(b as i16) as u16)?;
                Ok(ExecutionResult::Continue)
            }

            // 2OP:0x15 - sub
            Mnemonic::Sub => {
                self.store_result(inst, (a as i16).wrapping_sub(b as i16) as u16)?;
                Ok(ExecutionResult::Continue)
            }

            // 2OP:0x16 - mul
            Mnemonic::Mul => {
                self.store_result(inst, (a as i16).wrapping_mul(b as i16) as u16)?;
                Ok(ExecutionResult::Continue)
            }

            // 2OP:0x17 - div (truncates toward zero)
            Mnemonic::Div => {
                if b == 0 {
                    return Err(VmError::DivisionByZero);
                }
                self.store_result(inst, (a as i16).wrapping_div(b as i16) as u16)?;
                Ok(ExecutionResult::Continue)
            }

            // 2OP:0x18 - mod (sign follows the dividend)
            Mnemonic::Mod => {
                if b == 0 {
                    return Err(VmError::DivisionByZero);
                }
                self.store_result(inst, (a as i16).wrapping_rem(b as i16) as u16)?;
                Ok(ExecutionResult::Continue)
            }

            // 2OP:0x08 - or
            Mnemonic::Or => {
                self.store_result(inst, a | b)?;
                Ok(ExecutionResult::Continue)
            }

            // 2OP:0x09 - and
            Mnemonic::And => {
                self.store_result(inst, a & b)?;
                Ok(ExecutionResult::Continue)
            }

            // 1OP:0x0F - not (v1-4), VAR:0x18 - not (v5+)
            Mnemonic::Not => {
                self.store_result(inst, !a)?;
                Ok(ExecutionResult::Continue)
            }

            // 2OP:0x07 - test
            Mnemonic::Test => self.do_branch(inst, a & b == b),

            // 2OP:0x01 - je (up to three candidates)
            Mnemonic::Je => {
                let matched = operands.len() > 1 && operands[1..].contains(&a);
                self.do_branch(inst, matched)
            }

            // 2OP:0x02 - jl
            Mnemonic::Jl => self.do_branch(inst, (a as i16) < (b as i16)),

            // 2OP:0x03 - jg
            Mnemonic::Jg => self.do_branch(inst, (a as i16) > (b as i16)),

            // 1OP:0x00 - jz
            Mnemonic::Jz => self.do_branch(inst, a == 0),

            // 1OP:0x05 - inc
            Mnemonic::Inc => {
                self.adjust_variable(a as u8, 1)?;
                Ok(ExecutionResult::Continue)
            }

            // 1OP:0x06 - dec
            Mnemonic::Dec => {
                self.adjust_variable(a as u8, -1)?;
                Ok(ExecutionResult::Continue)
            }

            // 2OP:0x05 - inc_chk
            Mnemonic::IncChk => {
                let value = self.adjust_variable(a as u8, 1)?;
                self.do_branch(inst, value > b as i16)
            }

            // 2OP:0x04 - dec_chk
            Mnemonic::DecChk => {
                let value = self.adjust_variable(a as u8, -1)?;
                self.do_branch(inst, value < b as i16)
            }

            // EXT:0x02 - log_shift
            Mnemonic::LogShift => {
                let places = b as i16;
                let result = match places {
                    0..=15 => a << places,
                    -15..=-1 => a >> -places,
                    _ => 0,
                };
                self.store_result(inst, result)?;
                Ok(ExecutionResult::Continue)
            }

            // EXT:0x03 - art_shift
            Mnemonic::ArtShift => {
                let places = b as i16;
                let value = a as i16;
                let result = match places {
                    0..=15 => value << places,
                    -15..=-1 => value >> -places,
                    p if p < 0 => value >> 15,
                    _ => 0,
                };
                self.store_result(inst, result as u16)?;
                Ok(ExecutionResult::Continue)
            }

            // VAR:0x07 - random
            Mnemonic::Random => {
                let range = a as i16;
                let result = if range > 0 {
                    self.rng.next_in_range(range as u16)
                } else if range < 0 {
                    self.rng.seed((range as i32).unsigned_abs() as u64);
                    0
                } else {
                    self.rng.reseed_unpredictable();
                    0
                };
                debug!("random {} -> {}", range, result);
                self.store_result(inst, result)?;
                Ok(ExecutionResult::Continue)
            }

            _ => Err(VmError::InvalidStory(format!(
                "Unhandled math opcode: {}",
                inst.name()
            ))),
        }
    }

    /// Add `delta` to the variable named by `var` in place (variable 0 is the
    /// top of stack, not a push/pop), returning the new signed value
    fn adjust_variable(&mut self, var: u8, delta: i16) -> Result<i16> {
        let value = (self.vm.read_variable_indirect(var)? as i16).wrapping_add(delta);
        self.vm.write_variable_indirect(var, value as u16)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::VmError;
    use crate::test_utils::{Harness, StoryBuilder};
    use test_log::test;

    fn run(version: u8, code: &[u8]) -> Harness {
        let mut h = Harness::new(StoryBuilder::new(version).code(code), &[]).unwrap();
        h.run().unwrap();
        h
    }

    #[test]
    fn test_signed_arithmetic() {
        let h = run(
            3,
            &[
                0x15, 0x03, 0x05, 0x10, // sub #03, #05 -> G00
                0x56, 0x10, 0x07, 0x11, // mul G00, #07 -> G01
                0x57, 0x11, 0x02, 0x12, // div G01, #02 -> G02
                0x58, 0x11, 0x04, 0x13, // mod G01, #04 -> G03
                0xBA,
            ],
        );
        assert_eq!(h.global(0) as i16, -2);
        assert_eq!(h.global(1) as i16, -14);
        assert_eq!(h.global(2) as i16, -7);
        assert_eq!(h.global(3) as i16, -2);
    }

    #[test]
    fn test_add_wraps() {
        // add #7fff, #0001 -> G00 (VAR form with large constants)
        let h = run(3, &[0xD4, 0x0F, 0x7F, 0xFF, 0x00, 0x01, 0x10, 0xBA]);
        assert_eq!(h.global(0), 0x8000);
    }

    #[test]
    fn test_division_by_zero_faults() {
        let mut h = Harness::new(
            StoryBuilder::new(3).code(&[0x18, 0x04, 0x00, 0x10]),
            &[],
        )
        .unwrap();
        let err = h.run().unwrap_err();
        assert!(matches!(err.root_cause(), VmError::DivisionByZero));
    }

    #[test]
    fn test_je_matches_any_candidate() {
        // je #03, #01, #02, #03 [TRUE +3]; quit; store G00 #01; quit
        let h = run(
            3,
            &[0xC1, 0x55, 0x03, 0x01, 0x02, 0x03, 0xC3, 0xBA, 0x0D, 0x10, 0x01, 0xBA],
        );
        assert_eq!(h.global(0), 1);
    }

    #[test]
    fn test_inc_chk_and_dec_chk_are_signed() {
        let builder = StoryBuilder::new(3).global(0, 0xFFFF).code(&[
            // inc_chk G00, #00 [TRUE +5] with G00 = -1 -> 0, not taken
            0x05, 0x10, 0x00, 0xC5, //
            0x0D, 0x11, 0x09, // store G01 #09
            // dec_chk G00, #00 [TRUE +5]: 0 -> -1 < 0, taken
            0x04, 0x10, 0x00, 0xC5, //
            0x0D, 0x11, 0x07, // store G01 #07 (skipped)
            0xBA,
        ]);
        let mut h = Harness::new(builder, &[]).unwrap();
        h.run().unwrap();
        assert_eq!(h.global(0) as i16, -1);
        assert_eq!(h.global(1), 9);
    }

    #[test]
    fn test_inc_on_stack_is_in_place() {
        let h = run(
            5,
            &[
                0xE8, 0x7F, 0x05, // push #05
                0x95, 0x00, // inc sp
                0xE9, 0x7F, 0x10, // pull G00
                0xBA,
            ],
        );
        assert_eq!(h.global(0), 6);
    }

    #[test]
    fn test_shifts() {
        let h = run(
            5,
            &[
                0xBE, 0x02, 0x0F, 0x80, 0x00, 0xFF, 0xFF, 0x10, // log_shift #8000, #-1 -> G00
                0xBE, 0x03, 0x0F, 0x80, 0x00, 0xFF, 0xFF, 0x11, // art_shift #8000, #-1 -> G01
                0xBE, 0x02, 0x5F, 0x01, 0x04, 0x12, // log_shift #01, #04 -> G02
                0xBA,
            ],
        );
        assert_eq!(h.global(0), 0x4000);
        assert_eq!(h.global(1), 0xC000);
        assert_eq!(h.global(2), 0x0010);
    }

    #[test]
    fn test_random_seeding_is_deterministic() {
        let code = [
            0xE7, 0x3F, 0xFF, 0xD6, 0x10, // random #-42 -> G00
            0xE7, 0x7F, 0x64, 0x11, // random #100 -> G01
            0xE7, 0x7F, 0x64, 0x12, // random #100 -> G02
            0xBA,
        ];
        let first = run(5, &code);
        let second = run(5, &code);
        assert_eq!(first.global(0), 0);
        assert!((1..=100).contains(&first.global(1)));
        assert_eq!(first.global(1), second.global(1));
        assert_eq!(first.global(2), second.global(2));
    }
}
