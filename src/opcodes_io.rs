/// Input operations for Z-Machine interpreter
///
/// This module handles keyboard input and the text buffers it fills:
/// - Line input (sread for v1-4, aread for v5+) with optional tokenising
/// - Single key input (read_char)
/// - Lexical analysis on demand (tokenise) and dictionary encoding (encode_text)
///
/// Buffer layouts:
/// - v1-4 text buffer: byte 0 capacity, text from byte 1, zero terminated
/// - v5+ text buffer: byte 0 capacity, byte 1 length, text from byte 2
/// - parse buffer: byte 0 capacity, byte 1 word count, then 4-byte entries
///   of dictionary address (word), length and position in the text buffer
///
/// Dictionary lookup is not performed; every parse entry records address 0.
use crate::error::{Result, VmError};
use crate::instruction::Instruction;
use crate::interpreter::{ExecutionResult, Interpreter};
use crate::opcode_tables::Mnemonic;
use crate::text::{self, char_to_zscii, Alphabets};
use log::debug;

/// ZSCII code of the key that terminates line input
const TERMINATOR_NEWLINE: u16 = 13;

/// ZSCII code for a single keypress. Escape and delete are input-only codes
/// with no printable form; anything else unknown reads as '?'.
fn key_to_zscii(ch: char) -> u16 {
    match ch {
        '\x1b' => 27,
        '\x08' | '\x7f' => 8,
        _ => char_to_zscii(ch).unwrap_or(b'?' as u16),
    }
}

/// Split `text` into words: runs of non-space bytes, with each separator
/// byte also a word on its own. Returns (start, length) pairs.
pub fn split_words(text: &[u8], separators: &[u8]) -> Vec<(usize, usize)> {
    let mut words = Vec::new();
    let mut start: Option<usize> = None;

    for (i, &byte) in text.iter().enumerate() {
        if byte == b' ' || separators.contains(&byte) {
            if let Some(s) = start.take() {
                words.push((s, i - s));
            }
            if byte != b' ' {
                words.push((i, 1));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        words.push((s, text.len() - s));
    }
    words
}

impl Interpreter {
    /// Handle input opcodes
    pub fn execute_io_op(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> Result<ExecutionResult> {
        let operand = |i: usize| operands.get(i).copied().unwrap_or(0);

        match inst.mnemonic() {
            // VAR:0x04 - sread (v1-4), aread (v5+)
            Mnemonic::Sread | Mnemonic::Aread => {
                if self.version <= 3 {
                    self.show_status()?;
                }
                let text_buffer = operand(0) as u32;
                let parse_buffer = operand(1) as u32;

                let line = self.input.read_line()?;
                debug!("read line: {:?}", line);
                self.store_line(text_buffer, &line)?;
                if parse_buffer != 0 {
                    self.tokenise(text_buffer, parse_buffer, false)?;
                }
                self.store_result(inst, TERMINATOR_NEWLINE)?;
                Ok(ExecutionResult::Continue)
            }

            // VAR:0x16 - read_char (first operand is always 1, the keyboard)
            Mnemonic::ReadChar => {
                let ch = self.input.read_char()?;
                let zscii = key_to_zscii(ch);
                debug!("read_char: {:?} -> {}", ch, zscii);
                self.store_result(inst, zscii)?;
                Ok(ExecutionResult::Continue)
            }

            // VAR:0x1B - tokenise
            Mnemonic::Tokenise => {
                if operand(2) != 0 {
                    debug!("tokenise: custom dictionary {:04x} not consulted", operand(2));
                }
                self.tokenise(operand(0) as u32, operand(1) as u32, operand(3) != 0)?;
                Ok(ExecutionResult::Continue)
            }

            // VAR:0x1C - encode_text
            Mnemonic::EncodeText => {
                let source = operand(0) as u32 + operand(2) as u32;
                let bytes = self.vm.memory.slice(source, operand(1) as usize)?;
                let word: String = bytes.iter().map(|&b| b as char).collect();
                let alphabets = Alphabets::from_memory(&self.vm.memory)?;
                let encoded = text::encode_text(&word, self.version, &alphabets);
                let dest = operand(3) as u32;
                for (i, w) in encoded.iter().enumerate() {
                    self.vm.memory.write_word(dest + i as u32 * 2, *w)?;
                }
                Ok(ExecutionResult::Continue)
            }

            _ => Err(VmError::InvalidStory(format!(
                "Unhandled input opcode: {}",
                inst.name()
            ))),
        }
    }

    /// Offset of the first text byte in a text buffer for this version
    fn text_start(&self) -> u32 {
        if self.version <= 4 {
            1
        } else {
            2
        }
    }

    /// Write `line`, lowercased and clipped to the buffer's capacity, into
    /// the text buffer at `buffer`
    fn store_line(&mut self, buffer: u32, line: &str) -> Result<()> {
        let capacity = self.vm.memory.read_byte(buffer)? as usize;
        let limit = if self.version <= 4 {
            capacity.saturating_sub(1)
        } else {
            capacity
        };

        let zscii: Vec<u8> = line
            .trim_end_matches(['\n', '\r'])
            .chars()
            .flat_map(char::to_lowercase)
            .filter_map(char_to_zscii)
            .filter(|&c| c != TERMINATOR_NEWLINE)
            .map(|c| c as u8)
            .take(limit)
            .collect();

        let start = buffer + self.text_start();
        for (i, &byte) in zscii.iter().enumerate() {
            self.vm.memory.write_byte(start + i as u32, byte)?;
        }
        if self.version <= 4 {
            self.vm.memory.write_byte(start + zscii.len() as u32, 0)?;
        } else {
            self.vm.memory.write_byte(buffer + 1, zscii.len() as u8)?;
        }
        Ok(())
    }

    /// The text currently held in the text buffer at `buffer`
    fn buffer_text(&self, buffer: u32) -> Result<Vec<u8>> {
        let start = buffer + self.text_start();
        if self.version <= 4 {
            let capacity = self.vm.memory.read_byte(buffer)? as u32;
            let mut text = Vec::new();
            for i in 0..capacity {
                let byte = self.vm.memory.read_byte(start + i)?;
                if byte == 0 {
                    break;
                }
                text.push(byte);
            }
            Ok(text)
        } else {
            let len = self.vm.memory.read_byte(buffer + 1)? as usize;
            Ok(self.vm.memory.slice(start, len)?.to_vec())
        }
    }

    /// Split the text buffer into words and record them in the parse buffer.
    /// With `keep_unknown` set, entries for words not in the dictionary
    /// (all of them here) are left untouched.
    fn tokenise(&mut self, text_buffer: u32, parse_buffer: u32, keep_unknown: bool) -> Result<()> {
        let text = self.buffer_text(text_buffer)?;
        let dictionary = self.vm.header().dictionary() as u32;
        let count = self.vm.memory.read_byte(dictionary)? as usize;
        let separators = self.vm.memory.slice(dictionary + 1, count)?.to_vec();

        let max_words = self.vm.memory.read_byte(parse_buffer)? as usize;
        let words = split_words(&text, &separators);
        let stored = words.len().min(max_words);
        debug!(
            "tokenise: {} words ({} stored) from {:?}",
            words.len(),
            stored,
            String::from_utf8_lossy(&text)
        );

        self.vm.memory.write_byte(parse_buffer + 1, stored as u8)?;
        if keep_unknown {
            return Ok(());
        }
        let offset = self.text_start() as usize;
        for (i, &(start, len)) in words.iter().take(stored).enumerate() {
            let entry = parse_buffer + 2 + i as u32 * 4;
            self.vm.memory.write_word(entry, 0)?;
            self.vm.memory.write_byte(entry + 2, len as u8)?;
            self.vm.memory.write_byte(entry + 3, (start + offset) as u8)?;
        }
        Ok(())
    }
}
