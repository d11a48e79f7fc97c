// Test utilities for building synthetic story images in memory
//
// Every image uses the same fixed layout so tests can refer to tables by
// constant address. Code is appended from CODE_START; v6+ images get an
// empty main routine header there and code starts one byte later.

use std::cell::RefCell;
use std::rc::Rc;

use crate::display_headless::HeadlessDisplay;
use crate::error::Result;
use crate::header;
use crate::input::ScriptedInput;
use crate::interpreter::Interpreter;
use crate::memory::{Memory, HEADER_SIZE};
use crate::text::{encode_string, Alphabets};
use crate::vm::VM;
use crate::zrand::ZRand;

pub const GLOBALS: u32 = 0x0100;
pub const ABBREVIATIONS: u32 = 0x02E0;
pub const OBJECT_TABLE: u32 = 0x0400;
pub const PROPERTY_AREA: u32 = 0x0900;
pub const DICTIONARY: u32 = 0x1000;
pub const STATIC_BASE: u32 = 0x1800;
pub const CODE_START: u32 = 0x2000;
pub const STRING_AREA: u32 = 0x4000;
pub const IMAGE_SIZE: usize = 0x8000;

#[doc(hidden)]
pub struct StoryBuilder {
    version: u8,
    bytes: Vec<u8>,
    code_cursor: usize,
    property_cursor: usize,
}

impl StoryBuilder {
    pub fn new(version: u8) -> Self {
        let mut builder = StoryBuilder {
            version,
            bytes: vec![0u8; IMAGE_SIZE],
            code_cursor: CODE_START as usize,
            property_cursor: PROPERTY_AREA as usize,
        };
        builder.bytes[header::VERSION] = version;
        builder.put_word(header::HIGH_MEMORY as u32, CODE_START as u16);
        builder.put_word(header::DICTIONARY as u32, DICTIONARY as u16);
        builder.put_word(header::OBJECT_TABLE as u32, OBJECT_TABLE as u16);
        builder.put_word(header::GLOBAL_VARIABLES as u32, GLOBALS as u16);
        builder.put_word(header::STATIC_MEMORY as u32, STATIC_BASE as u16);
        builder.put_word(header::ABBREVIATIONS as u32, ABBREVIATIONS as u16);
        builder.bytes[header::SERIAL..header::SERIAL + 6].copy_from_slice(b"000000");

        // Dictionary header: separators '.', ',', '"', then an empty word list
        let entry_length = if version <= 3 { 7 } else { 9 };
        builder.bytes[DICTIONARY as usize..DICTIONARY as usize + 7]
            .copy_from_slice(&[3, b'.', b',', b'"', entry_length, 0, 0]);

        if version >= 6 {
            // Main routine with no locals
            builder.code_cursor += 1;
            let packed = builder.packed(CODE_START);
            builder.put_word(header::INITIAL_PC as u32, packed);
        } else {
            builder.put_word(header::INITIAL_PC as u32, CODE_START as u16);
        }
        builder
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    fn put_word(&mut self, address: u32, value: u16) {
        let at = address as usize;
        self.bytes[at..at + 2].copy_from_slice(&value.to_be_bytes());
    }

    /// Packed form of a routine or string address for this version.
    pub fn packed(&self, address: u32) -> u16 {
        let divisor = match self.version {
            1..=3 => 2,
            4..=7 => 4,
            _ => 8,
        };
        (address / divisor) as u16
    }

    /// Address the next `code` call will write to.
    pub fn code_address(&self) -> u32 {
        self.code_cursor as u32
    }

    /// Append instructions to the main routine.
    pub fn code(mut self, bytes: &[u8]) -> Self {
        let at = self.code_cursor;
        self.bytes[at..at + bytes.len()].copy_from_slice(bytes);
        self.code_cursor += bytes.len();
        self
    }

    pub fn bytes_at(mut self, address: u32, bytes: &[u8]) -> Self {
        let at = address as usize;
        self.bytes[at..at + bytes.len()].copy_from_slice(bytes);
        self
    }

    pub fn words_at(mut self, address: u32, words: &[u16]) -> Self {
        for (i, w) in words.iter().enumerate() {
            self.put_word(address + i as u32 * 2, *w);
        }
        self
    }

    pub fn header_byte(self, offset: usize, value: u8) -> Self {
        self.bytes_at(offset as u32, &[value])
    }

    pub fn header_word(self, offset: usize, value: u16) -> Self {
        self.words_at(offset as u32, &[value])
    }

    /// Write a routine header (local count, and initial values before v5)
    /// followed by its body.
    pub fn routine(self, address: u32, locals: &[u16], body: &[u8]) -> Self {
        let mut bytes = vec![locals.len() as u8];
        if self.version < 5 {
            for l in locals {
                bytes.extend_from_slice(&l.to_be_bytes());
            }
        }
        bytes.extend_from_slice(body);
        self.bytes_at(address, &bytes)
    }

    /// Encode `text` as a Z-string at `address`.
    pub fn string_at(self, address: u32, text: &str) -> Self {
        let words = encode_string(text, &Alphabets::standard());
        self.words_at(address, &words)
    }

    /// Set global `index` (variable 16 + index).
    pub fn global(self, index: u8, value: u16) -> Self {
        self.words_at(GLOBALS + index as u32 * 2, &[value])
    }

    /// Point abbreviation table entry `index` at a string.
    pub fn abbreviation(self, index: u16, text_address: u32) -> Self {
        self.words_at(ABBREVIATIONS + index as u32 * 2, &[(text_address / 2) as u16])
    }

    pub fn property_default(self, property: u8, value: u16) -> Self {
        self.words_at(OBJECT_TABLE + (property as u32 - 1) * 2, &[value])
    }

    fn default_property_count(&self) -> u32 {
        if self.version <= 3 {
            31
        } else {
            63
        }
    }

    fn entry_size(&self) -> u32 {
        if self.version <= 3 {
            9
        } else {
            14
        }
    }

    /// Address of object `number`'s entry.
    pub fn object_address(&self, number: u16) -> u32 {
        OBJECT_TABLE + self.default_property_count() * 2 + (number as u32 - 1) * self.entry_size()
    }

    /// Write object `number` with `[parent, sibling, child]`, the given
    /// attribute numbers set, a short name and a property list. Properties
    /// are written in descending order whatever order they are given in.
    pub fn object(
        mut self,
        number: u16,
        name: &str,
        relations: [u16; 3],
        attributes: &[u8],
        properties: &[(u8, &[u8])],
    ) -> Self {
        let entry = self.object_address(number) as usize;
        let v3 = self.version <= 3;

        for &attr in attributes {
            self.bytes[entry + attr as usize / 8] |= 0x80 >> (attr % 8);
        }
        let (relations_at, table_at) = if v3 { (entry + 4, entry + 7) } else { (entry + 6, entry + 12) };
        for (i, &r) in relations.iter().enumerate() {
            if v3 {
                self.bytes[relations_at + i] = r as u8;
            } else {
                let at = relations_at + i * 2;
                self.bytes[at..at + 2].copy_from_slice(&r.to_be_bytes());
            }
        }

        let table = self.property_cursor;
        self.bytes[table_at..table_at + 2].copy_from_slice(&(table as u16).to_be_bytes());

        let mut data = Vec::new();
        if name.is_empty() {
            data.push(0);
        } else {
            let words = encode_string(name, &Alphabets::standard());
            data.push(words.len() as u8);
            for w in words {
                data.extend_from_slice(&w.to_be_bytes());
            }
        }

        let mut props: Vec<(u8, &[u8])> = properties.to_vec();
        props.sort_by(|a, b| b.0.cmp(&a.0));
        for (num, value) in props {
            let size = value.len();
            if v3 {
                data.push((((size - 1) as u8) << 5) | num);
            } else if size == 1 {
                data.push(num);
            } else if size == 2 {
                data.push(num | 0x40);
            } else {
                data.push(num | 0x80);
                data.push(0x80 | (size as u8 & 0x3F));
            }
            data.extend_from_slice(value);
        }
        data.push(0);

        self.bytes[table..table + data.len()].copy_from_slice(&data);
        self.property_cursor += data.len();
        self
    }

    /// Finish the image: file length and checksum are filled in.
    pub fn build(mut self) -> Result<Memory> {
        let scale = match self.version {
            1..=3 => 2,
            4..=5 => 4,
            _ => 8,
        };
        self.put_word(header::FILE_LENGTH as u32, (self.bytes.len() / scale) as u16);
        let checksum = self.bytes[HEADER_SIZE..]
            .iter()
            .fold(0u16, |sum, &b| sum.wrapping_add(b as u16));
        self.put_word(header::CHECKSUM as u32, checksum);
        Memory::load(self.bytes)
    }
}

/// An interpreter over a built story with headless output and scripted input.
#[doc(hidden)]
pub struct Harness {
    pub interpreter: Interpreter,
    pub transcript: Rc<RefCell<String>>,
    pub status_lines: Rc<RefCell<Vec<String>>>,
}

impl Harness {
    pub fn new(builder: StoryBuilder, input: &[&str]) -> Result<Self> {
        let vm = VM::new(builder.build()?)?;
        let display = HeadlessDisplay::new();
        let transcript = display.transcript();
        let status_lines = display.status_lines();
        let interpreter = Interpreter::new(
            vm,
            Box::new(display),
            Box::new(ScriptedInput::new(input.iter().copied())),
            Box::new(ZRand::new_predictable(0)),
        )?;
        Ok(Harness {
            interpreter,
            transcript,
            status_lines,
        })
    }

    /// Run to quit, or at most 10000 instructions.
    pub fn run(&mut self) -> Result<()> {
        self.interpreter.run_with_limit(Some(10_000))
    }

    pub fn output(&self) -> String {
        self.transcript.borrow().clone()
    }

    pub fn global(&self, index: u8) -> u16 {
        self.interpreter.vm.read_global(0x10 + index).unwrap_or(0xDEAD)
    }
}
