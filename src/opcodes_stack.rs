/// Stack and routine call operations for Z-Machine interpreter
///
/// This module handles all stack-related opcodes including:
/// - Stack manipulation (push, pull, pop, and the v6 user stacks)
/// - Routine calls and returns (every call variant, ret, rtrue, rfalse, ret_popped)
/// - Non-local returns (catch, throw) and argument introspection (check_arg_count)
use crate::error::{Result, VmError};
use crate::instruction::Instruction;
use crate::interpreter::{ExecutionResult, Interpreter};
use crate::opcode_tables::Mnemonic;
use log::debug;

impl Interpreter {
    /// Handle stack and call-related opcodes
    pub fn execute_stack_op(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> Result<ExecutionResult> {
        let first = operands.first().copied().unwrap_or(0);
        let rest = operands.get(1..).unwrap_or(&[]);

        match inst.mnemonic() {
            // ---- CALLS ----

            // 1OP:0x08 - call_1s, 2OP:0x19 - call_2s, VAR:0x00 - call_vs, VAR:0x0C - call_vs2
            Mnemonic::Call1s | Mnemonic::Call2s | Mnemonic::CallVs | Mnemonic::CallVs2 => {
                self.do_call(first, rest, inst.store_var)
            }

            // 1OP:0x0F - call_1n, 2OP:0x1A - call_2n, VAR:0x19 - call_vn, VAR:0x1A - call_vn2
            Mnemonic::Call1n | Mnemonic::Call2n | Mnemonic::CallVn | Mnemonic::CallVn2 => {
                self.do_call(first, rest, None)
            }

            // ---- RETURNS ----

            // 1OP:0x0B - ret
            Mnemonic::Ret => self.do_return(first),

            // 0OP:0x00 - rtrue
            Mnemonic::Rtrue => self.do_return(1),

            // 0OP:0x01 - rfalse
            Mnemonic::Rfalse => self.do_return(0),

            // 0OP:0x08 - ret_popped
            Mnemonic::RetPopped => {
                let value = self.vm.pop()?;
                self.do_return(value)
            }

            // 0OP:0x09 - catch (v5+)
            Mnemonic::Catch => {
                let depth = self.vm.call_depth() as u16;
                debug!("catch -> {}", depth);
                self.store_result(inst, depth)?;
                Ok(ExecutionResult::Continue)
            }

            // 2OP:0x1C - throw
            Mnemonic::Throw => {
                let depth = operands.get(1).copied().unwrap_or(0) as usize;
                debug!("throw {} to frame {}", first, depth);
                self.vm.call_stack.unwind_to(depth)?;
                self.do_return(first)
            }

            // VAR:0x1F - check_arg_count
            Mnemonic::CheckArgCount => {
                let arity = self.vm.frame()?.arity as u16;
                self.do_branch(inst, first <= arity)
            }

            // ---- STACK ----

            // VAR:0x08 - push
            Mnemonic::Push => {
                self.vm.push(first)?;
                Ok(ExecutionResult::Continue)
            }

            // VAR:0x09 - pull
            Mnemonic::Pull => {
                if inst.store_var.is_some() {
                    // v6: optional user stack operand, result stored
                    let value = match operands.first() {
                        Some(&stack) => self.pull_user_stack(stack as u32)?,
                        None => self.vm.pop()?,
                    };
                    self.store_result(inst, value)?;
                } else {
                    let value = self.vm.pop()?;
                    self.vm.write_variable_indirect(first as u8, value)?;
                }
                Ok(ExecutionResult::Continue)
            }

            // 0OP:0x09 - pop (v1-4)
            Mnemonic::Pop => {
                self.vm.pop()?;
                Ok(ExecutionResult::Continue)
            }

            // EXT:0x15 - pop_stack
            Mnemonic::PopStack => {
                match operands.get(1) {
                    Some(&stack) => {
                        let free = self.vm.memory.read_word(stack as u32)?;
                        self.vm
                            .memory
                            .write_word(stack as u32, free.wrapping_add(first))?;
                    }
                    None => {
                        for _ in 0..first {
                            self.vm.pop()?;
                        }
                    }
                }
                Ok(ExecutionResult::Continue)
            }

            // EXT:0x18 - push_stack
            Mnemonic::PushStack => {
                let stack = operands.get(1).copied().unwrap_or(0) as u32;
                let free = self.vm.memory.read_word(stack)?;
                if free == 0 {
                    return self.do_branch(inst, false);
                }
                self.vm.memory.write_word(stack + free as u32 * 2, first)?;
                self.vm.memory.write_word(stack, free - 1)?;
                self.do_branch(inst, true)
            }

            _ => Err(VmError::InvalidStory(format!(
                "Unhandled stack opcode: {}",
                inst.name()
            ))),
        }
    }

    /// Pop from a user stack: a word count of free slots followed by the
    /// slots, filled from the top down
    fn pull_user_stack(&mut self, stack: u32) -> Result<u16> {
        let free = self.vm.memory.read_word(stack)?.wrapping_add(1);
        let value = self.vm.memory.read_word(stack + free as u32 * 2)?;
        self.vm.memory.write_word(stack, free)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::VmError;
    use crate::test_utils::{Harness, StoryBuilder, CODE_START};
    use test_log::test;

    const ROUTINE: u32 = 0x3000;

    #[test]
    fn test_call_binds_args_over_header_defaults() {
        // Routine with locals (0x0A, 0x0B, 0x0C) copies them to G00-G02
        let builder = StoryBuilder::new(3);
        let packed = builder.packed(ROUTINE);
        let [hi, lo] = packed.to_be_bytes();
        let builder = builder
            .routine(
                ROUTINE,
                &[0x0A, 0x0B, 0x0C],
                &[
                    0x2D, 0x10, 0x01, // store G00 L00
                    0x2D, 0x11, 0x02, // store G01 L01
                    0x2D, 0x12, 0x03, // store G02 L02
                    0xB0, // rtrue
                ],
            )
            .code(&[
                0xE0, 0x17, hi, lo, 0x07, 0x08, 0x13, // call_vs routine #07 #08 -> G03
                0xBA,
            ]);
        let mut h = Harness::new(builder, &[]).unwrap();
        h.run().unwrap();
        assert_eq!(h.global(0), 7);
        assert_eq!(h.global(1), 8);
        assert_eq!(h.global(2), 0x0C);
        assert_eq!(h.global(3), 1);
    }

    #[test]
    fn test_extra_arguments_are_discarded() {
        // Two locals, three arguments
        let builder = StoryBuilder::new(5);
        let [hi, lo] = builder.packed(ROUTINE).to_be_bytes();
        let builder = builder
            .routine(
                ROUTINE,
                &[0, 0],
                &[
                    0x2D, 0x10, 0x01, // store G00 L00
                    0x2D, 0x11, 0x02, // store G01 L01
                    0xB0,
                ],
            )
            .code(&[0xF9, 0x15, hi, lo, 0x05, 0x06, 0x07, 0xBA]); // call_vn routine #05 #06 #07
        let mut h = Harness::new(builder, &[]).unwrap();
        h.run().unwrap();
        assert_eq!(h.global(0), 5);
        assert_eq!(h.global(1), 6);
        assert_eq!(h.interpreter.vm.frame().unwrap().stack_depth(), 0);
    }

    #[test]
    fn test_call_to_zero_stores_false() {
        let builder = StoryBuilder::new(3)
            .global(0, 0x99)
            .code(&[0xE0, 0x3F, 0x00, 0x00, 0x10, 0xBA]); // call_vs 0 -> G00
        let mut h = Harness::new(builder, &[]).unwrap();
        h.run().unwrap();
        assert_eq!(h.global(0), 0);
        assert_eq!(h.interpreter.vm.call_depth(), 1);
    }

    #[test]
    fn test_ret_popped_and_stack_isolation() {
        let builder = StoryBuilder::new(5);
        let [hi, lo] = builder.packed(ROUTINE).to_be_bytes();
        let builder = builder
            .routine(
                ROUTINE,
                &[],
                &[
                    0xE8, 0x7F, 0x2A, // push #2a
                    0xB8, // ret_popped
                ],
            )
            .code(&[
                0xE8, 0x7F, 0x01, // push #01
                0x88, hi, lo, 0x10, // call_1s routine -> G00
                0xE9, 0x7F, 0x11, // pull G01
                0xBA,
            ]);
        let mut h = Harness::new(builder, &[]).unwrap();
        h.run().unwrap();
        assert_eq!(h.global(0), 0x2A);
        assert_eq!(h.global(1), 1);
    }

    #[test]
    fn test_catch_and_throw_unwind() {
        // main: call_vs A -> G00; quit
        // A: catch -> L00; call_vn B L00; rfalse
        // B: throw #07, L00
        let builder = StoryBuilder::new(5);
        let a = ROUTINE;
        let b = ROUTINE + 0x40;
        let [ahi, alo] = builder.packed(a).to_be_bytes();
        let [bhi, blo] = builder.packed(b).to_be_bytes();
        let builder = builder
            .routine(
                a,
                &[0],
                &[
                    0xB9, 0x01, // catch -> L00
                    0xF9, 0x2F, bhi, blo, 0x01, // call_vn B L00
                    0xB1, // rfalse
                ],
            )
            .routine(
                b,
                &[0],
                &[
                    0x3C, 0x07, 0x01, // throw #07, L00
                ],
            )
            .code(&[0xE0, 0x3F, ahi, alo, 0x10, 0xBA]);
        let mut h = Harness::new(builder, &[]).unwrap();
        h.run().unwrap();
        assert_eq!(h.global(0), 7);
        assert_eq!(h.interpreter.vm.call_depth(), 1);
    }

    #[test]
    fn test_check_arg_count() {
        let builder = StoryBuilder::new(5);
        let [hi, lo] = builder.packed(ROUTINE).to_be_bytes();
        let builder = builder
            .routine(
                ROUTINE,
                &[0, 0, 0],
                &[
                    0xFF, 0x7F, 0x01, 0xC5, // check_arg_count #01 [TRUE +5]
                    0x0D, 0x11, 0x09, // store G01 #09 (skipped)
                    0xFF, 0x7F, 0x02, 0xC6, // check_arg_count #02 [TRUE +6]
                    0x0D, 0x10, 0x01, // store G00 #01
                    0xB0, // rtrue
                    0x0D, 0x10, 0x02, // store G00 #02
                    0xB0,
                ],
            )
            .code(&[0xF9, 0x1F, hi, lo, 0x05, 0xBA]); // call_vn routine #05
        let mut h = Harness::new(builder, &[]).unwrap();
        h.run().unwrap();
        // One argument supplied: the first check branches, the second does not
        assert_eq!(h.global(0), 1);
        assert_eq!(h.global(1), 0);
    }

    #[test]
    fn test_pop_on_empty_stack_is_underflow() {
        let mut h = Harness::new(StoryBuilder::new(3).code(&[0xB9]), &[]).unwrap();
        let err = h.run().unwrap_err();
        assert!(matches!(err.root_cause(), VmError::StackUnderflow(_)));
        match err {
            VmError::Execution { pc, .. } => assert_eq!(pc, CODE_START),
            other => panic!("unexpected {other:?}"),
        }
    }
}
