//! Fetch/decode/execute loop and the state shared by every opcode family.
//!
//! Opcode semantics live in the `opcodes_*` modules as further
//! `impl Interpreter` blocks; this module owns dispatch, variable operands,
//! calls and returns, branching, output streams and the control opcodes
//! (jump, quit, restart, verify, save/restore, undo).

use std::collections::VecDeque;

use crate::call_stack::{CallStack, MAX_LOCALS};
use crate::display_trait::ZMachineDisplay;
use crate::error::{Result, VmError};
use crate::header;
use crate::input::ZMachineInput;
use crate::instruction::{Instruction, OperandType};
use crate::opcode_tables::{tables_for, InstructionTables, Mnemonic};
use crate::text;
use crate::vm::{MAX_ROUTINE_LOCALS, VM};
use crate::zrand::RandomNumberGenerator;
use log::{debug, info, trace, warn};

/// Number of undo snapshots kept before the oldest is dropped
pub const UNDO_LIMIT: usize = 10;

/// Interpreter number published in the header (IBM PC)
pub const INTERPRETER_NUMBER: u8 = 6;
pub const INTERPRETER_VERSION: u8 = b'A';

/// Result of executing an instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    /// Continue execution normally
    Continue,
    /// Branch taken, PC already updated
    Branched,
    /// Routine called, PC updated
    Called,
    /// Routine returned
    Returned(u16),
    /// Game should quit
    Quit,
}

/// Machine state captured by save_undo
struct UndoState {
    memory: Vec<u8>,
    call_stack: CallStack,
    store_var: Option<u8>,
}

/// State for managing output stream redirection
struct OutputStreamState {
    /// Stream 1
    screen: bool,
    /// Stream 2; tracked in Flags 2 only, nothing is written to a file
    transcript: bool,
    /// Stream 3 tables, innermost last
    stream3_stack: Vec<u32>,
}

impl OutputStreamState {
    fn new() -> Self {
        OutputStreamState {
            screen: true,
            transcript: false,
            stream3_stack: Vec::new(),
        }
    }
}

/// The main Z-Machine interpreter
pub struct Interpreter {
    /// The VM state
    pub vm: VM,
    pub(crate) version: u8,
    tables: &'static InstructionTables,
    pub(crate) display: Box<dyn ZMachineDisplay>,
    pub(crate) input: Box<dyn ZMachineInput>,
    pub(crate) rng: Box<dyn RandomNumberGenerator>,
    output_streams: OutputStreamState,
    undo_stack: VecDeque<UndoState>,
    /// Instruction count for diagnostics and run limits
    instruction_count: u64,
    quit: bool,
}

impl Interpreter {
    /// Create a new interpreter and publish the collaborators' capabilities
    /// into the story header
    pub fn new(
        vm: VM,
        display: Box<dyn ZMachineDisplay>,
        input: Box<dyn ZMachineInput>,
        rng: Box<dyn RandomNumberGenerator>,
    ) -> Result<Self> {
        let version = vm.version();
        let mut interpreter = Interpreter {
            vm,
            version,
            tables: tables_for(version),
            display,
            input,
            rng,
            output_streams: OutputStreamState::new(),
            undo_stack: VecDeque::new(),
            instruction_count: 0,
            quit: false,
        };
        interpreter.publish_header()?;
        Ok(interpreter)
    }

    /// Write the interpreter's identity and the display metrics into the header
    fn publish_header(&mut self) -> Result<()> {
        let (columns, lines) = self.display.screen_size();
        let memory = &mut self.vm.memory;

        memory.write_word(header::STANDARD_REVISION as u32, 0x0101)?;

        let mut flags1 = memory.read_byte(header::FLAGS1 as u32)?;
        if self.version <= 3 {
            // Status line available, screen splitting available
            flags1 &= !0x10;
            flags1 |= 0x20;
        } else {
            // Bold, italic and fixed-pitch available; no timed input
            flags1 |= 0x1C;
            flags1 &= !0x80;
            if self.display.has_color() {
                flags1 |= 0x01;
            } else {
                flags1 &= !0x01;
            }
            memory.write_byte(header::INTERPRETER_NUMBER as u32, INTERPRETER_NUMBER)?;
            memory.write_byte(header::INTERPRETER_VERSION as u32, INTERPRETER_VERSION)?;
            memory.write_byte(header::SCREEN_HEIGHT_LINES as u32, lines.min(255) as u8)?;
            memory.write_byte(header::SCREEN_WIDTH_CHARS as u32, columns.min(255) as u8)?;
        }
        memory.write_byte(header::FLAGS1 as u32, flags1)?;

        if self.version >= 5 {
            let width = self.display.character_width();
            let height = self.display.line_height();
            memory.write_word(
                header::SCREEN_WIDTH_UNITS as u32,
                columns.saturating_mul(width as u16),
            )?;
            memory.write_word(
                header::SCREEN_HEIGHT_UNITS as u32,
                lines.saturating_mul(height as u16),
            )?;
            let (first, second) = if self.version == 6 {
                (height, width)
            } else {
                (width, height)
            };
            memory.write_byte(header::FONT_WIDTH as u32, first)?;
            memory.write_byte(header::FONT_HEIGHT as u32, second)?;

            // No pictures, mouse, sound or menus
            let flags2 = memory.read_word(header::FLAGS2 as u32)?;
            memory.write_word(header::FLAGS2 as u32, flags2 & !0x01A8)?;
        }

        debug!(
            "Published header: {}x{} screen, interpreter {} {}",
            columns, lines, INTERPRETER_NUMBER, INTERPRETER_VERSION as char
        );
        Ok(())
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    /// True once a quit instruction has executed
    pub fn has_quit(&self) -> bool {
        self.quit
    }

    /// Run until the story quits
    pub fn run(&mut self) -> Result<()> {
        self.run_with_limit(None)
    }

    /// Run until the story quits or `max_instructions` more instructions have
    /// executed
    pub fn run_with_limit(&mut self, max_instructions: Option<u64>) -> Result<()> {
        info!("Starting Z-Machine interpreter...");
        info!("Initial PC: {:05x}", self.vm.pc()?);

        let mut executed = 0u64;
        while !self.quit {
            if let Some(limit) = max_instructions {
                if executed >= limit {
                    info!("Reached instruction limit of {}", limit);
                    return Ok(());
                }
            }
            self.step()?;
            executed += 1;
        }
        info!("Story quit after {} instructions", self.instruction_count);
        self.display.flush()?;
        Ok(())
    }

    /// Fetch, decode and execute one instruction
    pub fn step(&mut self) -> Result<ExecutionResult> {
        let pc = self.vm.pc()?;
        let inst = match Instruction::decode(&self.vm.memory, pc, self.tables, self.version) {
            Ok(inst) => inst,
            Err(e) => {
                return Err(VmError::Execution {
                    pc,
                    opcode: self.vm.memory.read_byte(pc).unwrap_or(0),
                    mnemonic: "decode",
                    operands: Vec::new(),
                    depth: self.vm.call_depth(),
                    source: Box::new(e),
                })
            }
        };

        // The current frame's PC always names the next instruction while
        // this one executes
        self.vm.set_pc(inst.next_address())?;
        self.instruction_count += 1;

        match self.execute_instruction(&inst) {
            Ok(ExecutionResult::Quit) => {
                self.quit = true;
                Ok(ExecutionResult::Quit)
            }
            Ok(result) => Ok(result),
            Err(e) => Err(VmError::Execution {
                pc,
                opcode: inst.descriptor.raw,
                mnemonic: inst.name(),
                operands: inst.raw_operands(),
                depth: self.vm.call_depth(),
                source: Box::new(e),
            }),
        }
    }

    /// Execute a single instruction
    pub fn execute_instruction(&mut self, inst: &Instruction) -> Result<ExecutionResult> {
        use Mnemonic::*;

        let operands = self.resolve_operands(inst)?;

        if inst.descriptor.min_version > self.version {
            return self.execute_unsupported(inst);
        }

        match inst.mnemonic() {
            Add | Sub | Mul | Div | Mod | Or | And | Not | Test | Je | Jl | Jg | Jz | Inc
            | Dec | IncChk | DecChk | LogShift | ArtShift | Random => {
                self.execute_math_op(inst, &operands)
            }

            Loadw | Loadb | Storew | Storeb | Store | Load | CopyTable | ScanTable => {
                self.execute_memory_op(inst, &operands)
            }

            Push | Pull | Pop | PopStack | PushStack | RetPopped | Ret | Rtrue | Rfalse
            | Call1s | Call1n | Call2s | Call2n | CallVs | CallVs2 | CallVn | CallVn2 | Catch
            | Throw | CheckArgCount => self.execute_stack_op(inst, &operands),

            Jin | TestAttr | SetAttr | ClearAttr | InsertObj | RemoveObj | GetProp
            | GetPropAddr | GetNextProp | GetPropLen | GetSibling | GetChild | GetParent
            | PutProp | PrintObj => self.execute_object_op(inst, &operands),

            Print | PrintRet | NewLine | PrintAddr | PrintPaddr | PrintChar | PrintNum
            | PrintUnicode | CheckUnicode | PrintTable | ShowStatus | SplitWindow | SetWindow
            | EraseWindow | EraseLine | SetCursor | GetCursor | SetTextStyle | BufferMode
            | OutputStream | InputStream | SoundEffect | SetColour | SetTrueColour
            | SetFont => self.execute_display_op(inst, &operands),

            Sread | Aread | ReadChar | Tokenise | EncodeText => {
                self.execute_io_op(inst, &operands)
            }

            Jump | Nop | Quit | Restart | Verify | Piracy | Save | Restore | SaveUndo
            | RestoreUndo => self.execute_control_op(inst, &operands),

            // Unassigned slots and the graphical v6 operations
            _ => self.execute_unsupported(inst),
        }
    }

    /// Resolve operand values (handle variables vs constants)
    pub fn resolve_operands(&mut self, inst: &Instruction) -> Result<Vec<u16>> {
        let mut values = Vec::with_capacity(inst.operands.len());
        for operand in &inst.operands {
            let value = match operand.kind {
                OperandType::Variable => self.vm.read_variable(operand.raw as u8)?,
                _ => operand.raw,
            };
            values.push(value);
        }
        Ok(values)
    }

    /// Tolerated no-op for unassigned or unsupported encodings: stores 0 and
    /// does not branch
    fn execute_unsupported(&mut self, inst: &Instruction) -> Result<ExecutionResult> {
        warn!(
            "Ignoring {} (opcode {:02x}) at {:05x} in version {}",
            inst.name(),
            inst.descriptor.raw,
            inst.address,
            self.version
        );
        self.store_result(inst, 0)?;
        self.do_branch(inst, false)
    }

    /// Write `value` to the instruction's store variable, if it has one
    pub(crate) fn store_result(&mut self, inst: &Instruction, value: u16) -> Result<()> {
        if let Some(var) = inst.store_var {
            self.vm.write_variable(var, value)?;
        }
        Ok(())
    }

    /// Handle branching
    pub(crate) fn do_branch(
        &mut self,
        inst: &Instruction,
        condition: bool,
    ) -> Result<ExecutionResult> {
        if let Some(ref branch) = inst.branch {
            if condition == branch.on_true {
                return match branch.offset {
                    0 => self.do_return(0), // rfalse
                    1 => self.do_return(1), // rtrue
                    offset => {
                        // Relative to the instruction after the branch data
                        let target = (inst.next_address() as i64 + offset as i64 - 2) as u32;
                        trace!("Branch from {:05x} to {:05x}", inst.address, target);
                        self.vm.set_pc(target)?;
                        Ok(ExecutionResult::Branched)
                    }
                };
            }
        }
        Ok(ExecutionResult::Continue)
    }

    /// Enter the routine at packed address `packed_addr`
    pub(crate) fn do_call(
        &mut self,
        packed_addr: u16,
        args: &[u16],
        return_store: Option<u8>,
    ) -> Result<ExecutionResult> {
        // Calling address 0 returns false
        if packed_addr == 0 {
            if let Some(var) = return_store {
                self.vm.write_variable(var, 0)?;
            }
            return Ok(ExecutionResult::Continue);
        }

        let address = self.vm.header().unpack_routine(packed_addr);
        let num_locals = self.vm.memory.read_byte(address)?;
        if num_locals > MAX_ROUTINE_LOCALS {
            return Err(VmError::InvalidStory(format!(
                "routine at {:05x} declares {} locals",
                address, num_locals
            )));
        }

        let mut locals = [0u16; MAX_LOCALS];
        let mut pc = address + 1;
        if self.version < 5 {
            // Initial values are stored in the routine header
            for slot in locals.iter_mut().take(num_locals as usize) {
                *slot = self.vm.memory.read_word(pc)?;
                pc += 2;
            }
        }

        let bound = args.len().min(num_locals as usize);
        locals[..bound].copy_from_slice(&args[..bound]);
        if args.len() > bound {
            debug!(
                "Call to {:05x} discards {} surplus arguments",
                address,
                args.len() - bound
            );
        }

        let frame = self.vm.call_stack.push_frame(pc)?;
        frame.locals = locals;
        frame.num_locals = num_locals;
        frame.arity = args.len() as u8;
        frame.store_to = return_store;

        debug!(
            "CALL {:05x} with args {:?} -> {:?}, depth {}",
            address,
            args,
            return_store,
            self.vm.call_depth()
        );
        Ok(ExecutionResult::Called)
    }

    /// Handle routine returns
    pub(crate) fn do_return(&mut self, value: u16) -> Result<ExecutionResult> {
        let frame = self.vm.call_stack.pop_frame()?;
        debug!(
            "RETURN {} to {:05x}, depth {}",
            value,
            self.vm.pc()?,
            self.vm.call_depth()
        );
        if let Some(var) = frame.store_to {
            self.vm.write_variable(var, value)?;
        }
        Ok(ExecutionResult::Returned(value))
    }

    /// Redirect output into the table at `table` until the matching close
    pub(crate) fn enable_stream3(&mut self, table: u32) -> Result<()> {
        debug!("Output stream 3 opened at {:04x}", table);
        if self.output_streams.stream3_stack.len() >= 16 {
            return Err(VmError::StackOverflow(16));
        }
        self.vm.memory.write_word(table, 0)?;
        self.output_streams.stream3_stack.push(table);
        Ok(())
    }

    pub(crate) fn disable_stream3(&mut self) {
        match self.output_streams.stream3_stack.pop() {
            Some(table) => debug!("Output stream 3 at {:04x} closed", table),
            None => debug!("Output stream 3 closed while inactive"),
        }
    }

    pub(crate) fn select_screen_stream(&mut self, enabled: bool) {
        self.output_streams.screen = enabled;
    }

    /// Switch stream 2 and mirror it in Flags 2 bit 0
    pub(crate) fn select_transcript_stream(&mut self, enabled: bool) -> Result<()> {
        self.output_streams.transcript = enabled;
        let flags2 = self.vm.memory.read_word(header::FLAGS2 as u32)?;
        let flags2 = if enabled { flags2 | 1 } else { flags2 & !1 };
        self.vm.memory.write_word(header::FLAGS2 as u32, flags2)
    }

    pub(crate) fn stream3_active(&self) -> bool {
        !self.output_streams.stream3_stack.is_empty()
    }

    /// Output text, handling stream 3 redirection
    pub(crate) fn output_text(&mut self, text: &str) -> Result<()> {
        if let Some(&table) = self.output_streams.stream3_stack.last() {
            let mut count = self.vm.memory.read_word(table)?;
            for ch in text.chars() {
                let zscii = if ch == '\n' {
                    13
                } else {
                    text::char_to_zscii(ch).unwrap_or(b'?' as u16)
                };
                self.vm
                    .memory
                    .write_byte(table + 2 + count as u32, zscii as u8)?;
                count = count.wrapping_add(1);
            }
            self.vm.memory.write_word(table, count)?;
            return Ok(());
        }

        if self.output_streams.screen {
            self.display.print(text)?;
        }
        Ok(())
    }

    pub(crate) fn output_char(&mut self, ch: char) -> Result<()> {
        let mut buf = [0u8; 4];
        self.output_text(ch.encode_utf8(&mut buf))
    }

    /// Handle control opcodes
    fn execute_control_op(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> Result<ExecutionResult> {
        match inst.mnemonic() {
            // 1OP:0x0C - jump
            Mnemonic::Jump => {
                let offset = operands[0] as i16;
                let target = (inst.next_address() as i64 + offset as i64 - 2) as u32;
                debug!("jump {:+} to {:05x}", offset, target);
                self.vm.set_pc(target)?;
                Ok(ExecutionResult::Branched)
            }

            // 0OP:0x04 - nop
            Mnemonic::Nop => Ok(ExecutionResult::Continue),

            // 0OP:0x0A - quit
            Mnemonic::Quit => {
                info!("quit");
                self.display.flush()?;
                Ok(ExecutionResult::Quit)
            }

            // 0OP:0x07 - restart
            Mnemonic::Restart => {
                info!("restart");
                self.vm.reset()?;
                self.output_streams.stream3_stack.clear();
                self.undo_stack.clear();
                self.publish_header()?;
                Ok(ExecutionResult::Continue)
            }

            // 0OP:0x0D - verify
            Mnemonic::Verify => {
                let expected = self.vm.header().checksum();
                let actual = self.vm.checksum();
                debug!("verify: header {:04x}, computed {:04x}", expected, actual);
                self.do_branch(inst, expected == actual)
            }

            // 0OP:0x0F - piracy
            Mnemonic::Piracy => self.do_branch(inst, true),

            // 0OP:0x05/0x06, EXT:0x00/0x01 - save/restore
            // No persistence collaborator: report failure
            Mnemonic::Save | Mnemonic::Restore => {
                debug!("{}: no storage available", inst.name());
                self.store_result(inst, 0)?;
                self.do_branch(inst, false)
            }

            // EXT:0x09 - save_undo
            Mnemonic::SaveUndo => {
                let dynamic_end = (self.vm.header().static_memory_base() as usize)
                    .min(self.vm.memory.len());
                let snapshot = UndoState {
                    memory: self.vm.memory.bytes()[..dynamic_end].to_vec(),
                    call_stack: self.vm.call_stack.clone(),
                    store_var: inst.store_var,
                };
                if self.undo_stack.len() >= UNDO_LIMIT {
                    self.undo_stack.pop_front();
                }
                self.undo_stack.push_back(snapshot);
                debug!("save_undo: {} snapshots held", self.undo_stack.len());
                self.store_result(inst, 1)?;
                Ok(ExecutionResult::Continue)
            }

            // EXT:0x0A - restore_undo
            Mnemonic::RestoreUndo => match self.undo_stack.pop_back() {
                Some(state) => {
                    debug!("restore_undo: {} snapshots left", self.undo_stack.len());
                    self.vm.memory.copy_from(&state.memory)?;
                    self.vm.call_stack = state.call_stack;
                    if let Some(var) = state.store_var {
                        self.vm.write_variable(var, 2)?;
                    }
                    Ok(ExecutionResult::Continue)
                }
                None => {
                    debug!("restore_undo: nothing to restore");
                    self.store_result(inst, 0)?;
                    Ok(ExecutionResult::Continue)
                }
            },

            _ => Err(VmError::InvalidStory(format!(
                "Unhandled control opcode: {}",
                inst.name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display_headless::HeadlessDisplay;
    use crate::input::ScriptedInput;
    use crate::test_utils::{StoryBuilder, CODE_START};
    use crate::zrand::ZRand;
    use std::cell::RefCell;
    use std::rc::Rc;
    use test_log::test;

    fn interpreter_for(builder: StoryBuilder) -> (Interpreter, Rc<RefCell<String>>) {
        let vm = VM::new(builder.build().unwrap()).unwrap();
        let display = HeadlessDisplay::new();
        let transcript = display.transcript();
        let interp = Interpreter::new(
            vm,
            Box::new(display),
            Box::new(ScriptedInput::default()),
            Box::new(ZRand::new_predictable(1)),
        )
        .unwrap();
        (interp, transcript)
    }

    #[test]
    fn test_simple_execution() {
        // add #05, #03 -> G00; quit
        let (mut interp, _) =
            interpreter_for(StoryBuilder::new(3).code(&[0x14, 0x05, 0x03, 0x10, 0xBA]));
        interp.run().unwrap();
        assert!(interp.has_quit());
        assert_eq!(interp.vm.read_global(0x10).unwrap(), 8);
        assert_eq!(interp.instruction_count(), 2);
    }

    #[test]
    fn test_run_limit_stops_without_quit() {
        // jump -> self
        let (mut interp, _) = interpreter_for(StoryBuilder::new(3).code(&[0x9C, 0x00]));
        interp.run_with_limit(Some(50)).unwrap();
        assert!(!interp.has_quit());
        assert_eq!(interp.instruction_count(), 50);
        assert_eq!(interp.vm.pc().unwrap(), CODE_START);
    }

    #[test]
    fn test_header_is_published() {
        let (interp, _) = interpreter_for(StoryBuilder::new(5));
        let memory = &interp.vm.memory;
        assert_eq!(memory.read_word(header::STANDARD_REVISION as u32).unwrap(), 0x0101);
        assert_eq!(memory.read_byte(header::INTERPRETER_NUMBER as u32).unwrap(), 6);
        assert_eq!(memory.read_byte(header::SCREEN_HEIGHT_LINES as u32).unwrap(), 24);
        assert_eq!(memory.read_byte(header::SCREEN_WIDTH_CHARS as u32).unwrap(), 80);
        assert_eq!(memory.read_word(header::SCREEN_WIDTH_UNITS as u32).unwrap(), 80);
        assert_eq!(memory.read_byte(header::FONT_HEIGHT as u32).unwrap(), 1);
    }

    #[test]
    fn test_fault_carries_context() {
        // div #04, #00 -> sp
        let (mut interp, _) =
            interpreter_for(StoryBuilder::new(3).code(&[0x17, 0x04, 0x00, 0x00]));
        let err = interp.run().unwrap_err();
        match err {
            VmError::Execution {
                pc,
                mnemonic,
                operands,
                depth,
                ref source,
                ..
            } => {
                assert_eq!(pc, CODE_START);
                assert_eq!(mnemonic, "div");
                assert_eq!(operands, vec![4, 0]);
                assert_eq!(depth, 1);
                assert!(matches!(**source, VmError::DivisionByZero));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_unassigned_opcode_is_a_noop() {
        // 2OP:0x00 is unassigned in every version; then quit
        let (mut interp, _) =
            interpreter_for(StoryBuilder::new(3).code(&[0x00, 0x01, 0x02, 0xBA]));
        interp.run().unwrap();
        assert!(interp.has_quit());
    }

    #[test]
    fn test_version_gated_opcode_stores_zero() {
        // VAR:0x18 not needs v5; in v4 it decodes but stores 0
        let (mut interp, _) = interpreter_for(
            StoryBuilder::new(4)
                .global(0, 0x55)
                .code(&[0xF8, 0x3F, 0x12, 0x34, 0x10, 0xBA]),
        );
        interp.run().unwrap();
        assert_eq!(interp.vm.read_global(0x10).unwrap(), 0);
    }

    #[test]
    fn test_outermost_return_is_stack_underflow() {
        let (mut interp, _) = interpreter_for(StoryBuilder::new(3).code(&[0xB0]));
        let err = interp.run().unwrap_err();
        assert!(matches!(err.root_cause(), VmError::StackUnderflow(_)));
    }

    #[test]
    fn test_stream3_captures_output() {
        let table = 0x1200u16;
        let [hi, lo] = table.to_be_bytes();
        let (mut interp, transcript) = interpreter_for(
            StoryBuilder::new(5).code(&[
                0xF3, 0x0F, 0x00, 0x03, hi, lo, // output_stream 3 table
                0xE5, 0x7F, b'H', // print_char 'H'
                0xE5, 0x7F, b'i', // print_char 'i'
                0xF3, 0x3F, 0xFF, 0xFD, // output_stream -3
                0xE5, 0x7F, b'!', // print_char '!'
                0xBA,
            ]),
        );
        interp.run().unwrap();
        let memory = &interp.vm.memory;
        assert_eq!(memory.read_word(table as u32).unwrap(), 2);
        assert_eq!(memory.slice(table as u32 + 2, 2).unwrap(), b"Hi");
        assert_eq!(transcript.borrow().as_str(), "!");
    }

    #[test]
    fn test_undo_round_trip() {
        let (mut interp, _) = interpreter_for(
            StoryBuilder::new(5).code(&[
                0xBE, 0x09, 0xFF, 0x10, // save_undo -> G00
                0x95, 0x11, // inc G01
                0x41, 0x11, 0x02, 0xC1, // je G01, #02 [TRUE RTRUE], never taken
                0xBE, 0x0A, 0xFF, 0x12, // restore_undo -> G02
                0xBA,
            ]),
        );
        // First pass: save_undo stores 1, inc makes G01 = 1, restore_undo
        // rewinds to just after save_undo with G00 = 2 and G01 = 0
        for _ in 0..4 {
            interp.step().unwrap();
        }
        assert_eq!(interp.vm.read_global(0x10).unwrap(), 2);
        assert_eq!(interp.vm.read_global(0x11).unwrap(), 0);
        assert_eq!(interp.vm.pc().unwrap(), CODE_START + 4);
        // Second pass: nothing left, restore_undo stores 0 in G02
        for _ in 0..3 {
            interp.step().unwrap();
        }
        assert_eq!(interp.vm.read_global(0x12).unwrap(), 0);
        assert_eq!(interp.step().unwrap(), ExecutionResult::Quit);
    }

    #[test]
    fn test_restart_restores_image() {
        // store G00 #07; restart
        let (mut interp, _) =
            interpreter_for(StoryBuilder::new(3).code(&[0x0D, 0x10, 0x07, 0xB7]));
        interp.step().unwrap();
        assert_eq!(interp.vm.read_global(0x10).unwrap(), 7);
        interp.step().unwrap();
        assert_eq!(interp.vm.read_global(0x10).unwrap(), 0);
        assert_eq!(interp.vm.pc().unwrap(), CODE_START);
    }

    #[test]
    fn test_verify_branches_on_checksum() {
        // verify [TRUE +3]; quit; (branch target) store G00 #01; quit
        let (mut interp, _) = interpreter_for(
            StoryBuilder::new(3).code(&[0xBD, 0xC3, 0xBA, 0x0D, 0x10, 0x01, 0xBA]),
        );
        interp.run().unwrap();
        assert_eq!(interp.vm.read_global(0x10).unwrap(), 1);
    }
}
