use std::collections::HashMap;

use bitreader::BitReader;
use log::{debug, trace};

use crate::error::{Result, VmError};
use crate::header::Header;
use crate::memory::Memory;

/// The three alphabets for Z-string decoding, indexed by Z-character minus 6
const ALPHABET_A0: &[u8; 26] = b"abcdefghijklmnopqrstuvwxyz";
const ALPHABET_A1: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
// Position 0 is the 10-bit escape and position 1 is newline; neither is printed from here
const ALPHABET_A2: &[u8; 26] = b" \n0123456789.,!?_#'\"/\\-:()";

/// Longest string the decoder will follow before declaring it unterminated.
pub const MAX_STRING_WORDS: u32 = 4096;

/// ZSCII 155..=223 in the default extra-characters table.
const EXTRA_CHARACTERS: [char; 69] = [
    'ä', 'ö', 'ü', 'Ä', 'Ö', 'Ü', 'ß', '»', '«', 'ë', 'ï', 'ÿ', 'Ë', 'Ï', 'á', 'é', 'í', 'ó', 'ú',
    'ý', 'Á', 'É', 'Í', 'Ó', 'Ú', 'Ý', 'à', 'è', 'ì', 'ò', 'ù', 'À', 'È', 'Ì', 'Ò', 'Ù', 'â', 'ê',
    'î', 'ô', 'û', 'Â', 'Ê', 'Î', 'Ô', 'Û', 'å', 'Å', 'ø', 'Ø', 'ã', 'ñ', 'õ', 'Ã', 'Ñ', 'Õ', 'æ',
    'Æ', 'ç', 'Ç', 'þ', 'ð', 'Þ', 'Ð', '£', 'œ', 'Œ', '¡', '¿',
];

lazy_static! {
    static ref UNICODE_TO_ZSCII: HashMap<char, u16> = EXTRA_CHARACTERS
        .iter()
        .enumerate()
        .map(|(i, &c)| (c, 155 + i as u16))
        .collect();
}

/// Map a ZSCII output code to a character. Codes with no printable meaning
/// give `None`.
pub fn zscii_to_char(code: u16) -> Option<char> {
    match code {
        13 => Some('\n'),
        32..=126 => Some(code as u8 as char),
        155..=223 => Some(EXTRA_CHARACTERS[(code - 155) as usize]),
        _ => None,
    }
}

/// Map an input character to ZSCII, if representable.
pub fn char_to_zscii(ch: char) -> Option<u16> {
    match ch {
        '\n' | '\r' => Some(13),
        ' '..='~' => Some(ch as u16),
        _ => UNICODE_TO_ZSCII.get(&ch).copied(),
    }
}

/// One 16-bit text word: end-of-string flag plus three Z-characters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackedChars {
    pub last: bool,
    pub chars: [u8; 3],
}

pub fn unpack_word(word: u16) -> PackedChars {
    let bytes = word.to_be_bytes();
    let mut br = BitReader::new(&bytes);
    // Reading 16 bits out of a 2-byte buffer cannot run short
    let last = br.read_u8(1).unwrap_or(0) == 1;
    let mut chars = [0u8; 3];
    for c in chars.iter_mut() {
        *c = br.read_u8(5).unwrap_or(0);
    }
    PackedChars { last, chars }
}

/// Pack Z-characters three to a word, marking the final word as the end.
pub fn pack_zchars(zchars: &[u8]) -> Vec<u16> {
    let mut words: Vec<u16> = zchars
        .chunks(3)
        .map(|chunk| {
            let mut padded = [5u8; 3];
            padded[..chunk.len()].copy_from_slice(chunk);
            ((padded[0] as u16 & 0x1F) << 10) | ((padded[1] as u16 & 0x1F) << 5) | (padded[2] as u16 & 0x1F)
        })
        .collect();
    if let Some(last) = words.last_mut() {
        *last |= 0x8000;
    }
    words
}

/// Number of words in the string at `address`, including the one carrying
/// the end bit.
pub fn word_len(memory: &Memory, address: u32) -> Result<u32> {
    let mut len = 0;
    loop {
        let word = memory.read_word(address + len * 2)?;
        len += 1;
        if word & 0x8000 != 0 {
            return Ok(len);
        }
        if len >= MAX_STRING_WORDS {
            return Err(VmError::MalformedText(format!(
                "string at {address:05x} not terminated within {MAX_STRING_WORDS} words"
            )));
        }
    }
}

/// The three 26-character alphabets, standard or loaded from a v5+ table.
#[derive(Debug, Clone)]
pub struct Alphabets {
    rows: [[u8; 26]; 3],
}

impl Alphabets {
    pub fn standard() -> Self {
        Alphabets {
            rows: [*ALPHABET_A0, *ALPHABET_A1, *ALPHABET_A2],
        }
    }

    pub fn from_memory(memory: &Memory) -> Result<Self> {
        let table = Header::new(memory).alphabet_table();
        if table == 0 {
            return Ok(Self::standard());
        }
        let mut rows = [[0u8; 26]; 3];
        for (r, row) in rows.iter_mut().enumerate() {
            row.copy_from_slice(memory.slice(table as u32 + r as u32 * 26, 26)?);
        }
        // A2 positions 6 and 7 keep their fixed meanings whatever the table says
        rows[2][0] = b' ';
        rows[2][1] = b'\n';
        debug!("Using custom alphabet table at {:04x}", table);
        Ok(Alphabets { rows })
    }

    fn lookup(&self, alphabet: usize, zchar: u8) -> char {
        let code = self.rows[alphabet][(zchar - 6) as usize];
        if code == b'\n' {
            '\n'
        } else {
            zscii_to_char(code as u16).unwrap_or('?')
        }
    }

    fn find(&self, zscii: u16) -> Option<(usize, u8)> {
        for (r, row) in self.rows.iter().enumerate() {
            for (i, &code) in row.iter().enumerate() {
                // A2 escape and newline slots are not real characters
                if r == 2 && i < 2 {
                    continue;
                }
                if code as u16 == zscii {
                    return Some((r, i as u8 + 6));
                }
            }
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CharMode {
    Normal,
    Shift,
    Special,
    Abbreviation(u8),
    DoubleTop,
    DoubleBottom(u16),
}

/// Decompresses Z-strings out of story memory.
pub struct TextDecoder<'a> {
    memory: &'a Memory,
    abbreviations: u32,
    alphabets: Alphabets,
}

impl<'a> TextDecoder<'a> {
    pub fn new(memory: &'a Memory) -> Result<Self> {
        Ok(TextDecoder {
            memory,
            abbreviations: Header::new(memory).abbreviations_table() as u32,
            alphabets: Alphabets::from_memory(memory)?,
        })
    }

    /// Number of words in the string at `address`, including the terminator.
    pub fn word_len(&self, address: u32) -> Result<u32> {
        word_len(self.memory, address)
    }

    /// Decode the string at `address`, returning it with its length in bytes.
    pub fn decode(&self, address: u32) -> Result<(String, usize)> {
        let len = self.word_len(address)?;
        let text = self.decode_words(address, len, false)?;
        Ok((text, len as usize * 2))
    }

    fn decode_words(&self, address: u32, len: u32, in_abbreviation: bool) -> Result<String> {
        let mut result = String::new();
        let mut mode = CharMode::Normal;

        for i in 0..len {
            let word = self.memory.read_word(address + i * 2)?;
            let packed = unpack_word(word);
            trace!("Z-word {:04x} = Z-chars {:?}", word, packed.chars);

            for &code in packed.chars.iter() {
                mode = match mode {
                    CharMode::Abbreviation(bank) => {
                        let index = 32 * (bank as u32 - 1) + code as u32;
                        result.push_str(&self.expand_abbreviation(index)?);
                        CharMode::Normal
                    }
                    CharMode::DoubleTop => CharMode::DoubleBottom(code as u16 & 0x1F),
                    CharMode::DoubleBottom(top) => {
                        let zscii = (top << 5) | (code as u16 & 0x1F);
                        match zscii_to_char(zscii) {
                            Some(ch) => result.push(ch),
                            None => debug!("Unprintable ZSCII {} in string at {:05x}", zscii, address),
                        }
                        CharMode::Normal
                    }
                    current => match code {
                        0 => {
                            result.push(' ');
                            CharMode::Normal
                        }
                        1..=3 => {
                            if in_abbreviation {
                                return Err(VmError::MalformedText(format!(
                                    "abbreviation string at {address:05x} refers to another abbreviation"
                                )));
                            }
                            CharMode::Abbreviation(code)
                        }
                        4 => CharMode::Shift,
                        5 => CharMode::Special,
                        6 if current == CharMode::Special => CharMode::DoubleTop,
                        _ => {
                            let alphabet = match current {
                                CharMode::Shift => 1,
                                CharMode::Special => 2,
                                _ => 0,
                            };
                            result.push(self.alphabets.lookup(alphabet, code));
                            CharMode::Normal
                        }
                    },
                };
            }
        }

        Ok(result)
    }

    fn expand_abbreviation(&self, index: u32) -> Result<String> {
        let entry = self.abbreviations + index * 2;
        let word_addr = self.memory.read_word(entry)?;
        let address = word_addr as u32 * 2;
        trace!("Abbreviation {} -> {:05x}", index, address);
        let len = self.word_len(address)?;
        self.decode_words(address, len, true)
    }
}

fn push_zchars(ch: char, alphabets: &Alphabets, zchars: &mut Vec<u8>) {
    match ch {
        ' ' => return zchars.push(0),
        '\n' => return zchars.extend_from_slice(&[5, 7]),
        _ => {}
    }
    let zscii = match char_to_zscii(ch) {
        Some(z) => z,
        None => return,
    };
    match alphabets.find(zscii) {
        Some((0, z)) => zchars.push(z),
        Some((shift, z)) => {
            zchars.push(3 + shift as u8);
            zchars.push(z);
        }
        None => {
            zchars.extend_from_slice(&[5, 6, ((zscii >> 5) & 0x1F) as u8, (zscii & 0x1F) as u8]);
        }
    }
}

/// Encode `text` as a complete Z-string, case preserved.
pub fn encode_string(text: &str, alphabets: &Alphabets) -> Vec<u16> {
    let mut zchars = Vec::with_capacity(text.len());
    for ch in text.chars() {
        push_zchars(ch, alphabets, &mut zchars);
    }
    if zchars.is_empty() {
        zchars.push(5);
    }
    pack_zchars(&zchars)
}

/// Encode `text` into a dictionary-format word: 6 Z-characters for v1-3,
/// 9 for later versions, padded with 5s and truncated to fit.
pub fn encode_text(text: &str, version: u8, alphabets: &Alphabets) -> Vec<u16> {
    let resolution = if version <= 3 { 6 } else { 9 };
    let mut zchars = Vec::with_capacity(resolution + 4);

    for ch in text.chars().flat_map(char::to_lowercase) {
        if zchars.len() >= resolution {
            break;
        }
        push_zchars(ch, alphabets, &mut zchars);
    }

    zchars.resize(resolution, 5);
    pack_zchars(&zchars)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABBREVIATIONS: usize = 0x40;

    fn memory_with(words_at: &[(usize, &[u16])]) -> Memory {
        let mut bytes = vec![0u8; 0x400];
        bytes[0] = 3;
        bytes[0x18..0x1A].copy_from_slice(&(ABBREVIATIONS as u16).to_be_bytes());
        for (addr, words) in words_at {
            for (i, w) in words.iter().enumerate() {
                bytes[addr + i * 2..addr + i * 2 + 2].copy_from_slice(&w.to_be_bytes());
            }
        }
        Memory::load(bytes).unwrap()
    }

    fn decode(mem: &Memory, addr: u32) -> Result<(String, usize)> {
        TextDecoder::new(mem).unwrap().decode(addr)
    }

    #[test]
    fn test_simple_string() {
        // h e l | l o <pad>, alphabet 0 codes are letter index + 6
        let mem = memory_with(&[(0x100, &[0x3551, 0xC685])]);
        let (text, len) = decode(&mem, 0x100).unwrap();
        assert_eq!(text, "hello");
        assert_eq!(len, 4);
    }

    #[test]
    fn test_string_with_space() {
        // a, space, b in one terminated word
        let mem = memory_with(&[(0x100, &pack_zchars(&[6, 0, 7]))]);
        assert_eq!(decode(&mem, 0x100).unwrap(), ("a b".to_string(), 2));
    }

    #[test]
    fn test_shift_is_one_shot() {
        // Shift, h, i -> "Hi"
        let mem = memory_with(&[(0x100, &pack_zchars(&[4, 13, 14]))]);
        assert_eq!(decode(&mem, 0x100).unwrap().0, "Hi");
    }

    #[test]
    fn test_special_alphabet_and_newline() {
        // Special '1', Special newline, 'a'
        let mem = memory_with(&[(0x100, &pack_zchars(&[5, 9, 5, 7, 6]))]);
        assert_eq!(decode(&mem, 0x100).unwrap().0, "1\na");
    }

    #[test]
    fn test_ten_bit_literal_assembles_with_or() {
        // '@' is ZSCII 64 = top 2, bottom 0; '{' is 123 = top 3, bottom 27
        let mem = memory_with(&[(0x100, &pack_zchars(&[5, 6, 2, 0, 5, 6, 3, 27]))]);
        assert_eq!(decode(&mem, 0x100).unwrap().0, "@{");
    }

    #[test]
    fn test_abbreviation_expansion() {
        // Abbreviation 0 -> "the" stored at byte 0x200 (word address 0x100)
        let mem = memory_with(&[
            (ABBREVIATIONS, &[0x0100]),
            (0x200, &[0xE5AA]),
            (0x100, &pack_zchars(&[1, 0, 0, 6])),
        ]);
        assert_eq!(decode(&mem, 0x100).unwrap().0, "the a");
    }

    #[test]
    fn test_abbreviation_banks() {
        // Bank 2, index 1 is table entry 33
        let mut entries = vec![0u16; 34];
        entries[33] = 0x0100;
        let mem = memory_with(&[
            (ABBREVIATIONS, &entries),
            (0x200, &pack_zchars(&[11])),
            (0x100, &pack_zchars(&[2, 1])),
        ]);
        assert_eq!(decode(&mem, 0x100).unwrap().0, "f");
    }

    #[test]
    fn test_nested_abbreviation_is_fault() {
        // Abbreviation 0 points at itself
        let mem = memory_with(&[
            (ABBREVIATIONS, &[0x0100]),
            (0x200, &pack_zchars(&[1, 0])),
            (0x100, &pack_zchars(&[1, 0])),
        ]);
        assert!(matches!(decode(&mem, 0x100), Err(VmError::MalformedText(_))));
    }

    #[test]
    fn test_word_len_counts_terminator() {
        let mem = memory_with(&[(0x100, &[0x1111, 0x2222, 0x8333])]);
        let decoder = TextDecoder::new(&mem).unwrap();
        assert_eq!(decoder.word_len(0x100).unwrap(), 3);
        assert_eq!(decoder.word_len(0x104).unwrap(), 1);
    }

    #[test]
    fn test_unterminated_string_faults() {
        // No end bit anywhere before the image ends
        let mut bytes = vec![0x11u8; 0x400];
        bytes[0] = 3;
        bytes[0x18] = 0;
        bytes[0x19] = 0x40;
        let mem = Memory::load(bytes).unwrap();
        assert!(decode(&mem, 0x100).is_err());
    }

    #[test]
    fn test_unpack_word() {
        let packed = unpack_word(0xC685);
        assert!(packed.last);
        assert_eq!(packed.chars, [17, 20, 5]);
    }

    #[test]
    fn test_encode_text_v3_and_v5() {
        let alphabets = Alphabets::standard();
        assert_eq!(encode_text("hello", 3, &alphabets), vec![0x3551, 0xC685]);
        // Truncated to six Z-characters
        assert_eq!(encode_text("helloworld", 3, &alphabets).len(), 2);
        assert_eq!(encode_text("hello", 5, &alphabets).len(), 3);
        // Digits come from A2 with a shift
        assert_eq!(encode_text("1", 3, &alphabets), pack_zchars(&[5, 9, 5, 5, 5, 5]));
    }

    #[test]
    fn test_encode_string_decodes_back() {
        let words = encode_string("Go North, 2 rooms!", &Alphabets::standard());
        let mem = memory_with(&[(0x100, &words)]);
        assert_eq!(decode(&mem, 0x100).unwrap().0, "Go North, 2 rooms!");
    }

    #[test]
    fn test_zscii_mapping() {
        assert_eq!(zscii_to_char(13), Some('\n'));
        assert_eq!(zscii_to_char(65), Some('A'));
        assert_eq!(zscii_to_char(155), Some('ä'));
        assert_eq!(zscii_to_char(223), Some('¿'));
        assert_eq!(zscii_to_char(3), None);
        assert_eq!(char_to_zscii('ä'), Some(155));
        assert_eq!(char_to_zscii('x'), Some(120));
    }
}
