use std::fmt::Display;
use std::fmt::Error;
use std::fmt::Formatter;

use crate::memory::Memory;

pub const VERSION: usize = 0x00;
pub const FLAGS1: usize = 0x01;
pub const RELEASE: usize = 0x02;
pub const HIGH_MEMORY: usize = 0x04;
pub const INITIAL_PC: usize = 0x06;
pub const DICTIONARY: usize = 0x08;
pub const OBJECT_TABLE: usize = 0x0A;
pub const GLOBAL_VARIABLES: usize = 0x0C;
pub const STATIC_MEMORY: usize = 0x0E;
pub const FLAGS2: usize = 0x10;
pub const SERIAL: usize = 0x12;
pub const ABBREVIATIONS: usize = 0x18;
pub const FILE_LENGTH: usize = 0x1A;
pub const CHECKSUM: usize = 0x1C;
pub const INTERPRETER_NUMBER: usize = 0x1E;
pub const INTERPRETER_VERSION: usize = 0x1F;
pub const SCREEN_HEIGHT_LINES: usize = 0x20;
pub const SCREEN_WIDTH_CHARS: usize = 0x21;
pub const SCREEN_WIDTH_UNITS: usize = 0x22;
pub const SCREEN_HEIGHT_UNITS: usize = 0x24;
pub const FONT_WIDTH: usize = 0x26;
pub const FONT_HEIGHT: usize = 0x27;
pub const ROUTINES_OFFSET: usize = 0x28;
pub const STRINGS_OFFSET: usize = 0x2A;
pub const DEFAULT_BACKGROUND: usize = 0x2C;
pub const DEFAULT_FOREGROUND: usize = 0x2D;
pub const TERMINATING_CHARACTERS: usize = 0x2E;
pub const STANDARD_REVISION: usize = 0x32;
pub const ALPHABET_TABLE: usize = 0x34;
pub const HEADER_EXTENSION: usize = 0x36;

/// How packed addresses scale for one machine version.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackingRule {
    pub multiplier: u32,
    /// Versions 6 and 7 add eight times the routine/string offset field.
    pub uses_offsets: bool,
}

const PACKING_RULES: [PackingRule; 9] = [
    PackingRule { multiplier: 2, uses_offsets: false }, // unused version 0
    PackingRule { multiplier: 2, uses_offsets: false },
    PackingRule { multiplier: 2, uses_offsets: false },
    PackingRule { multiplier: 2, uses_offsets: false },
    PackingRule { multiplier: 4, uses_offsets: false },
    PackingRule { multiplier: 4, uses_offsets: false },
    PackingRule { multiplier: 4, uses_offsets: true },
    PackingRule { multiplier: 4, uses_offsets: true },
    PackingRule { multiplier: 8, uses_offsets: false },
];

pub fn packing_rule(version: u8) -> PackingRule {
    PACKING_RULES[(version as usize).min(8)]
}

/// Read-only view over the header fields of a story image.
///
/// Nothing is cached: every accessor reads memory, so writes made by the
/// running story are always visible. `Memory::load` guarantees the image is
/// at least one header long, which keeps these reads infallible.
pub struct Header<'a> {
    memory: &'a Memory,
}

impl<'a> Header<'a> {
    pub fn new(memory: &'a Memory) -> Self {
        Header { memory }
    }

    fn byte(&self, offset: usize) -> u8 {
        self.memory.bytes()[offset]
    }

    fn word(&self, offset: usize) -> u16 {
        let bytes = self.memory.bytes();
        u16::from_be_bytes([bytes[offset], bytes[offset + 1]])
    }

    pub fn version(&self) -> u8 {
        self.byte(VERSION)
    }

    pub fn flags1(&self) -> u8 {
        self.byte(FLAGS1)
    }

    pub fn flags2(&self) -> u16 {
        self.word(FLAGS2)
    }

    pub fn release(&self) -> u16 {
        self.word(RELEASE)
    }

    pub fn serial(&self) -> String {
        self.memory.bytes()[SERIAL..SERIAL + 6]
            .iter()
            .map(|&b| b as char)
            .collect()
    }

    pub fn high_memory_base(&self) -> u16 {
        self.word(HIGH_MEMORY)
    }

    /// Byte address of the first instruction (v1-5) or packed address of the
    /// main routine (v6+).
    pub fn initial_pc(&self) -> u16 {
        self.word(INITIAL_PC)
    }

    pub fn dictionary(&self) -> u16 {
        self.word(DICTIONARY)
    }

    pub fn object_table(&self) -> u16 {
        self.word(OBJECT_TABLE)
    }

    pub fn global_variables(&self) -> u16 {
        self.word(GLOBAL_VARIABLES)
    }

    pub fn static_memory_base(&self) -> u16 {
        self.word(STATIC_MEMORY)
    }

    pub fn abbreviations_table(&self) -> u16 {
        self.word(ABBREVIATIONS)
    }

    /// File length in bytes; the stored field is scaled by version.
    pub fn file_length(&self) -> usize {
        let scale = match self.version() {
            1..=3 => 2,
            4..=5 => 4,
            _ => 8,
        };
        self.word(FILE_LENGTH) as usize * scale
    }

    pub fn checksum(&self) -> u16 {
        self.word(CHECKSUM)
    }

    pub fn routines_offset(&self) -> u16 {
        self.word(ROUTINES_OFFSET)
    }

    pub fn strings_offset(&self) -> u16 {
        self.word(STRINGS_OFFSET)
    }

    pub fn terminating_characters_table(&self) -> u16 {
        self.word(TERMINATING_CHARACTERS)
    }

    pub fn alphabet_table(&self) -> u16 {
        if self.version() >= 5 {
            self.word(ALPHABET_TABLE)
        } else {
            0
        }
    }

    pub fn header_extension_table(&self) -> u16 {
        self.word(HEADER_EXTENSION)
    }

    /// Byte address of a packed routine address.
    pub fn unpack_routine(&self, packed: u16) -> u32 {
        let rule = packing_rule(self.version());
        let mut addr = packed as u32 * rule.multiplier;
        if rule.uses_offsets {
            addr += 8 * self.routines_offset() as u32;
        }
        addr
    }

    /// Byte address of a packed string address.
    pub fn unpack_string(&self, packed: u16) -> u32 {
        let rule = packing_rule(self.version());
        let mut addr = packed as u32 * rule.multiplier;
        if rule.uses_offsets {
            addr += 8 * self.strings_offset() as u32;
        }
        addr
    }
}

impl Display for Header<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(
            f,
            "
Z-code version:           {}
Interpreter flags:        {:#04x}
Release number:           {}
Size of resident memory:  {:#06x}
Start PC:                 {:#06x}
Dictionary address:       {:#06x}
Object table address:     {:#06x}
Global variables address: {:#06x}
Size of dynamic memory:   {:#06x}
Game flags:               {:#06x}
Serial number:            {}
Abbreviations address:    {:#06x}
File size:                {:#06x}
Checksum:                 {:#06x}
",
            self.version(),
            self.flags1(),
            self.release(),
            self.high_memory_base(),
            self.initial_pc(),
            self.dictionary(),
            self.object_table(),
            self.global_variables(),
            self.static_memory_base(),
            self.flags2(),
            self.serial(),
            self.abbreviations_table(),
            self.file_length(),
            self.checksum(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(version: u8) -> Memory {
        let mut bytes = vec![0u8; 0x400];
        bytes[VERSION] = version;
        bytes[INITIAL_PC..INITIAL_PC + 2].copy_from_slice(&0x0123u16.to_be_bytes());
        bytes[GLOBAL_VARIABLES..GLOBAL_VARIABLES + 2].copy_from_slice(&0x0200u16.to_be_bytes());
        bytes[ROUTINES_OFFSET..ROUTINES_OFFSET + 2].copy_from_slice(&0x0010u16.to_be_bytes());
        bytes[STRINGS_OFFSET..STRINGS_OFFSET + 2].copy_from_slice(&0x0020u16.to_be_bytes());
        bytes[SERIAL..SERIAL + 6].copy_from_slice(b"880429");
        Memory::load(bytes).unwrap()
    }

    #[test]
    fn test_fields_are_read_from_memory() {
        let mut mem = story(3);
        assert_eq!(Header::new(&mem).initial_pc(), 0x0123);
        assert_eq!(Header::new(&mem).global_variables(), 0x0200);
        assert_eq!(Header::new(&mem).serial(), "880429");
        mem.write_word(GLOBAL_VARIABLES as u32, 0x0300).unwrap();
        assert_eq!(Header::new(&mem).global_variables(), 0x0300);
    }

    #[test]
    fn test_packed_addresses_by_version() {
        assert_eq!(Header::new(&story(3)).unpack_routine(0x100), 0x200);
        assert_eq!(Header::new(&story(5)).unpack_routine(0x100), 0x400);
        assert_eq!(Header::new(&story(8)).unpack_routine(0x100), 0x800);
        let v6 = story(6);
        assert_eq!(Header::new(&v6).unpack_routine(0x100), 0x400 + 8 * 0x10);
        assert_eq!(Header::new(&v6).unpack_string(0x100), 0x400 + 8 * 0x20);
        let v3 = story(3);
        assert_eq!(Header::new(&v3).unpack_string(0x100), 0x200);
    }

    #[test]
    fn test_file_length_scaling() {
        let mut mem = story(3);
        mem.write_word(FILE_LENGTH as u32, 0x100).unwrap();
        assert_eq!(Header::new(&mem).file_length(), 0x200);
        let mut mem = story(5);
        mem.write_word(FILE_LENGTH as u32, 0x100).unwrap();
        assert_eq!(Header::new(&mem).file_length(), 0x400);
    }

    #[test]
    fn test_alphabet_table_only_from_v5() {
        let mut mem = story(4);
        mem.write_word(ALPHABET_TABLE as u32, 0x300).unwrap();
        assert_eq!(Header::new(&mem).alphabet_table(), 0);
        let mut mem = story(5);
        mem.write_word(ALPHABET_TABLE as u32, 0x300).unwrap();
        assert_eq!(Header::new(&mem).alphabet_table(), 0x300);
    }
}
