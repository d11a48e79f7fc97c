/// Display and text output operations for Z-Machine interpreter
///
/// This module handles all display-related operations including:
/// - Text output operations (print, print_ret, print_char, print_num, print_addr, print_paddr)
/// - Unicode output (print_unicode, check_unicode) and print_table
/// - Window management (split_window, set_window, erase_window, erase_line)
/// - Cursor control (set_cursor, get_cursor)
/// - Text styling (set_text_style, set_colour, set_true_colour, set_font)
/// - Output control (new_line, show_status, buffer_mode, output_stream)
/// - Audio/UI feedback (sound_effect, input_stream)
///
/// Text goes through `output_text` so stream 3 can capture it. Window,
/// cursor and style requests go straight to the display.
use crate::error::{Result, VmError};
use crate::header;
use crate::instruction::Instruction;
use crate::interpreter::{ExecutionResult, Interpreter};
use crate::opcode_tables::Mnemonic;
use crate::text::zscii_to_char;
use log::{debug, trace};

impl Interpreter {
    /// Handle display and text output opcodes
    pub fn execute_display_op(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> Result<ExecutionResult> {
        let operand = |i: usize| operands.get(i).copied().unwrap_or(0);

        match inst.mnemonic() {
            // ---- 0OP DISPLAY OPERATIONS ----

            // 0OP:0x02 - print (literal string)
            Mnemonic::Print => {
                if let Some(address) = inst.text_address {
                    self.print_string_at(address)?;
                }
                Ok(ExecutionResult::Continue)
            }

            // 0OP:0x03 - print_ret
            Mnemonic::PrintRet => {
                if let Some(address) = inst.text_address {
                    self.print_string_at(address)?;
                }
                self.output_char('\n')?;
                self.do_return(1)
            }

            // 0OP:0x0B - new_line
            Mnemonic::NewLine => {
                self.output_char('\n')?;
                Ok(ExecutionResult::Continue)
            }

            // 0OP:0x0C - show_status (v1-3)
            Mnemonic::ShowStatus => {
                if self.version <= 3 {
                    self.show_status()?;
                }
                Ok(ExecutionResult::Continue)
            }

            // ---- 1OP DISPLAY OPERATIONS ----

            // 1OP:0x07 - print_addr
            Mnemonic::PrintAddr => {
                self.print_string_at(operand(0) as u32)?;
                Ok(ExecutionResult::Continue)
            }

            // 1OP:0x0D - print_paddr
            Mnemonic::PrintPaddr => {
                let address = self.vm.header().unpack_string(operand(0));
                self.print_string_at(address)?;
                Ok(ExecutionResult::Continue)
            }

            // ---- VAR DISPLAY OPERATIONS ----

            // VAR:0x05 - print_char
            Mnemonic::PrintChar => {
                match zscii_to_char(operand(0)) {
                    Some(ch) => self.output_char(ch)?,
                    None => debug!("print_char: unprintable ZSCII {}", operand(0)),
                }
                Ok(ExecutionResult::Continue)
            }

            // VAR:0x06 - print_num
            Mnemonic::PrintNum => {
                let num_str = format!("{}", operand(0) as i16);
                self.output_text(&num_str)?;
                Ok(ExecutionResult::Continue)
            }

            // VAR:0x1E - print_table
            Mnemonic::PrintTable => {
                let height = operands.get(2).copied().unwrap_or(1);
                self.print_table(operand(0) as u32, operand(1), height, operand(3))?;
                Ok(ExecutionResult::Continue)
            }

            // EXT:0x0B - print_unicode
            Mnemonic::PrintUnicode => {
                let ch = char::from_u32(operand(0) as u32).unwrap_or('?');
                self.output_char(ch)?;
                Ok(ExecutionResult::Continue)
            }

            // EXT:0x0C - check_unicode (bit 0: can print, bit 1: can read)
            Mnemonic::CheckUnicode => {
                let support = match char::from_u32(operand(0) as u32) {
                    Some(ch) if !ch.is_control() => 3,
                    _ => 0,
                };
                self.store_result(inst, support)?;
                Ok(ExecutionResult::Continue)
            }

            // VAR:0x0A - split_window
            Mnemonic::SplitWindow => {
                debug!("split_window: lines={}", operand(0));
                self.display.split_window(operand(0))?;
                Ok(ExecutionResult::Continue)
            }

            // VAR:0x0B - set_window
            Mnemonic::SetWindow => {
                debug!("set_window: window={}", operand(0));
                self.display.set_window(operand(0) as u8)?;
                Ok(ExecutionResult::Continue)
            }

            // VAR:0x0D - erase_window
            Mnemonic::EraseWindow => {
                self.display.erase_window(operand(0) as i16)?;
                Ok(ExecutionResult::Continue)
            }

            // VAR:0x0E - erase_line (only value 1, the cursor position, is meaningful for text)
            Mnemonic::EraseLine => {
                if operand(0) == 1 {
                    self.display.erase_line()?;
                }
                Ok(ExecutionResult::Continue)
            }

            // VAR:0x0F - set_cursor
            Mnemonic::SetCursor => {
                debug!("set_cursor: line={}, column={}", operand(0), operand(1));
                self.display.set_cursor(operand(0), operand(1))?;
                Ok(ExecutionResult::Continue)
            }

            // VAR:0x10 - get_cursor
            Mnemonic::GetCursor => {
                // array-->0 = line, array-->1 = column
                let array = operand(0) as u32;
                let (line, column) = self.display.get_cursor()?;
                self.vm.memory.write_word(array, line)?;
                self.vm.memory.write_word(array + 2, column)?;
                Ok(ExecutionResult::Continue)
            }

            // VAR:0x11 - set_text_style
            Mnemonic::SetTextStyle => {
                // Style bits: 1=reverse, 2=bold, 4=italic, 8=fixed-pitch
                self.display.set_text_style(operand(0))?;
                Ok(ExecutionResult::Continue)
            }

            // VAR:0x12 - buffer_mode
            Mnemonic::BufferMode => {
                self.display.set_buffer_mode(operand(0) != 0)?;
                Ok(ExecutionResult::Continue)
            }

            // VAR:0x13 - output_stream
            Mnemonic::OutputStream => {
                let stream = operand(0) as i16;
                debug!("output_stream {}", stream);
                match stream {
                    1 => self.select_screen_stream(true),
                    -1 => self.select_screen_stream(false),
                    2 => self.select_transcript_stream(true)?,
                    -2 => self.select_transcript_stream(false)?,
                    3 => self.enable_stream3(operand(1) as u32)?,
                    -3 => self.disable_stream3(),
                    0 => {}
                    other => debug!("output_stream {} not supported, ignored", other),
                }
                Ok(ExecutionResult::Continue)
            }

            // VAR:0x14 - input_stream
            Mnemonic::InputStream => {
                debug!("input_stream {} ignored, keyboard only", operand(0));
                Ok(ExecutionResult::Continue)
            }

            // VAR:0x15 - sound_effect
            Mnemonic::SoundEffect => {
                debug!("sound_effect {} ignored", operand(0));
                Ok(ExecutionResult::Continue)
            }

            // 2OP:0x1B - set_colour
            Mnemonic::SetColour => {
                self.display.set_colour(operand(0), operand(1))?;
                Ok(ExecutionResult::Continue)
            }

            // EXT:0x0D - set_true_colour
            Mnemonic::SetTrueColour => {
                debug!(
                    "set_true_colour {:04x}/{:04x} ignored",
                    operand(0),
                    operand(1)
                );
                Ok(ExecutionResult::Continue)
            }

            // EXT:0x04 - set_font (only the normal font exists; 0 queries it)
            Mnemonic::SetFont => {
                let previous = match operand(0) {
                    0 | 1 => 1,
                    _ => 0,
                };
                self.store_result(inst, previous)?;
                Ok(ExecutionResult::Continue)
            }

            _ => Err(VmError::InvalidStory(format!(
                "Unhandled display opcode: {}",
                inst.name()
            ))),
        }
    }

    /// Decode and output the Z-string at byte address `address`
    fn print_string_at(&mut self, address: u32) -> Result<()> {
        let (text, _) = self.vm.text()?.decode(address)?;
        trace!("print {:05x}: {:?}", address, text);
        self.output_text(&text)
    }

    /// Print `height` rows of `width` ZSCII characters, skipping `skip`
    /// bytes between rows
    fn print_table(&mut self, table: u32, width: u16, height: u16, skip: u16) -> Result<()> {
        let mut address = table;
        for row in 0..height {
            if row > 0 {
                self.output_char('\n')?;
            }
            let mut line = String::with_capacity(width as usize);
            for i in 0..width as u32 {
                let code = self.vm.memory.read_byte(address + i)? as u16;
                line.push(zscii_to_char(code).unwrap_or('?'));
            }
            self.output_text(&line)?;
            address += width as u32 + skip as u32;
        }
        Ok(())
    }

    /// Redraw the v1-3 status line: location object name on the left, score
    /// and moves (or the time, when Flags 1 bit 1 is set) on the right
    pub(crate) fn show_status(&mut self) -> Result<()> {
        let location = self.vm.read_global(0x10)?;
        let name = if location == 0 {
            String::new()
        } else {
            let objects = self.vm.objects();
            match objects.short_name_address(&self.vm.memory, location)? {
                Some(address) => self.vm.text()?.decode(address)?.0,
                None => String::new(),
            }
        };

        let first = self.vm.read_global(0x11)?;
        let second = self.vm.read_global(0x12)?;
        let flags1 = self.vm.memory.read_byte(header::FLAGS1 as u32)?;
        let right = if flags1 & 0x02 != 0 {
            format!("Time: {}:{:02}", first, second)
        } else {
            format!("Score: {}  Moves: {}", first as i16, second)
        };

        debug!("show_status: {} / {}", name, right);
        self.display.show_status(&name, &right)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::header;
    use crate::test_utils::{Harness, StoryBuilder, STRING_AREA};
    use crate::text::{encode_string, Alphabets};
    use test_log::test;

    const TABLE: u32 = 0x1200;
    const ROUTINE: u32 = 0x3000;

    fn zstring(text: &str) -> Vec<u8> {
        encode_string(text, &Alphabets::standard())
            .iter()
            .flat_map(|w| w.to_be_bytes())
            .collect()
    }

    fn run(builder: StoryBuilder) -> Harness {
        let mut h = Harness::new(builder, &[]).unwrap();
        h.run().unwrap();
        h
    }

    #[test]
    fn test_print_inline_and_numbers() {
        let mut code = vec![0xB2]; // print "hello"
        code.extend(zstring("hello"));
        code.extend([
            0xBB, // new_line
            0xE6, 0x3F, 0xFF, 0xF6, // print_num #-10
            0xE5, 0x7F, 0x41, // print_char 'A'
            0xBA,
        ]);
        let h = run(StoryBuilder::new(3).code(&code));
        assert_eq!(h.output(), "hello\n-10A");
    }

    #[test]
    fn test_print_ret_returns_true() {
        let builder = StoryBuilder::new(3);
        let [hi, lo] = builder.packed(ROUTINE).to_be_bytes();
        let mut body = vec![0xB3]; // print_ret "bye"
        body.extend(zstring("bye"));
        let h = run(builder
            .routine(ROUTINE, &[], &body)
            .code(&[0xE0, 0x3F, hi, lo, 0x10, 0xBA])); // call_vs routine -> G00
        assert_eq!(h.output(), "bye\n");
        assert_eq!(h.global(0), 1);
    }

    #[test]
    fn test_print_paddr_and_print_addr() {
        let builder = StoryBuilder::new(5).string_at(STRING_AREA, "lamp");
        let [hi, lo] = builder.packed(STRING_AREA).to_be_bytes();
        let [ahi, alo] = (STRING_AREA as u16).to_be_bytes();
        let h = run(builder.code(&[
            0x8D, hi, lo, // print_paddr
            0x87, ahi, alo, // print_addr
            0xBA,
        ]));
        assert_eq!(h.output(), "lamplamp");
    }

    #[test]
    fn test_output_stream_selection() {
        let h = run(StoryBuilder::new(5).code(&[
            0xF3, 0x3F, 0xFF, 0xFF, // output_stream #-1
            0xE5, 0x7F, 0x78, // print_char 'x'
            0xF3, 0x7F, 0x01, // output_stream #1
            0xE5, 0x7F, 0x79, // print_char 'y'
            0xF3, 0x7F, 0x02, // output_stream #2
            0xBA,
        ]));
        assert_eq!(h.output(), "y");
        let flags2 = h.interpreter.vm.memory.read_word(header::FLAGS2 as u32).unwrap();
        assert_eq!(flags2 & 1, 1);
    }

    #[test]
    fn test_show_status_score_and_time() {
        let world = |flags1: u8| {
            StoryBuilder::new(3)
                .header_byte(header::FLAGS1, flags1)
                .object(1, "kitchen", [0, 0, 0], &[], &[])
                .global(0, 1)
                .global(1, 9)
                .global(2, 5)
                .code(&[0xBC, 0xBA]) // show_status; quit
        };
        let h = run(world(0));
        assert_eq!(h.status_lines.borrow().as_slice(), ["kitchen Score: 9  Moves: 5"]);
        let h = run(world(0x02));
        assert_eq!(h.status_lines.borrow().as_slice(), ["kitchen Time: 9:05"]);
    }

    #[test]
    fn test_cursor_round_trip() {
        let h = run(StoryBuilder::new(5).code(&[
            0xEA, 0x7F, 0x02, // split_window #02
            0xEB, 0x7F, 0x01, // set_window #01
            0xEF, 0x5F, 0x03, 0x07, // set_cursor #03, #07
            0xF0, 0x3F, 0x12, 0x00, // get_cursor #1200
            0xBA,
        ]));
        let memory = &h.interpreter.vm.memory;
        assert_eq!(memory.read_word(TABLE).unwrap(), 3);
        assert_eq!(memory.read_word(TABLE + 2).unwrap(), 7);
    }

    #[test]
    fn test_print_table_rows() {
        let h = run(StoryBuilder::new(5).bytes_at(TABLE, b"abcXdef").code(&[
            // print_table #1200, #03, #02, #01
            0xFE, 0x15, 0x12, 0x00, 0x03, 0x02, 0x01, //
            0xBA,
        ]));
        assert_eq!(h.output(), "abc\ndef");
    }

    #[test]
    fn test_unicode_and_font() {
        let h = run(StoryBuilder::new(5).code(&[
            0xBE, 0x0B, 0x3F, 0x00, 0xE9, // print_unicode #00e9
            0xBE, 0x0C, 0x3F, 0x00, 0xE9, 0x10, // check_unicode #00e9 -> G00
            0xBE, 0x0C, 0x7F, 0x07, 0x11, // check_unicode #07 -> G01
            0xBE, 0x04, 0x7F, 0x01, 0x12, // set_font #01 -> G02
            0xBE, 0x04, 0x7F, 0x03, 0x13, // set_font #03 -> G03
            0xBA,
        ]));
        assert_eq!(h.output(), "\u{e9}");
        assert_eq!(h.global(0), 3);
        assert_eq!(h.global(1), 0);
        assert_eq!(h.global(2), 1);
        assert_eq!(h.global(3), 0);
    }
}
