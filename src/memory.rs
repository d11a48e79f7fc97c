use crate::error::{Result, VmError};
use log::debug;

/// Size of the story-file header; every image must at least contain it.
pub const HEADER_SIZE: usize = 0x40;

/// Largest story image accepted for a given version.
pub fn max_story_size(version: u8) -> usize {
    match version {
        1..=3 => 128 * 1024,
        4..=5 => 256 * 1024,
        _ => 512 * 1024,
    }
}

/// Flat, byte-addressable story image.
///
/// Every access is bounds-checked against the loaded size; words and
/// double words are big-endian.
#[derive(Debug, Clone)]
pub struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    /// Take ownership of a story image, validating the header version and size.
    pub fn load(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(VmError::InvalidStory(format!(
                "image of {} bytes is too small for a header",
                bytes.len()
            )));
        }
        let version = bytes[0];
        if !(1..=8).contains(&version) {
            return Err(VmError::InvalidStory(format!(
                "unsupported version {version}"
            )));
        }
        if bytes.len() > max_story_size(version) {
            return Err(VmError::InvalidStory(format!(
                "image of {} bytes exceeds the v{} limit of {} bytes",
                bytes.len(),
                version,
                max_story_size(version)
            )));
        }
        debug!("Loaded v{} story image, {} bytes", version, bytes.len());
        Ok(Memory { bytes })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn check(&self, address: u32, width: u32) -> Result<usize> {
        let end = address as u64 + width as u64;
        if end > self.bytes.len() as u64 {
            return Err(VmError::MemoryFault {
                address,
                width,
                size: self.bytes.len(),
            });
        }
        Ok(address as usize)
    }

    pub fn read_byte(&self, address: u32) -> Result<u8> {
        let at = self.check(address, 1)?;
        Ok(self.bytes[at])
    }

    pub fn read_word(&self, address: u32) -> Result<u16> {
        let at = self.check(address, 2)?;
        Ok(u16::from_be_bytes([self.bytes[at], self.bytes[at + 1]]))
    }

    pub fn read_dword(&self, address: u32) -> Result<u32> {
        let at = self.check(address, 4)?;
        Ok(u32::from_be_bytes([
            self.bytes[at],
            self.bytes[at + 1],
            self.bytes[at + 2],
            self.bytes[at + 3],
        ]))
    }

    /// Test bit `position` (0 = least significant) of the byte at `address`.
    pub fn read_bit(&self, address: u32, position: u8) -> Result<bool> {
        Ok(self.read_byte(address)? & (1 << (position & 7)) != 0)
    }

    pub fn write_byte(&mut self, address: u32, value: u8) -> Result<()> {
        let at = self.check(address, 1)?;
        self.bytes[at] = value;
        Ok(())
    }

    pub fn write_word(&mut self, address: u32, value: u16) -> Result<()> {
        let at = self.check(address, 2)?;
        self.bytes[at..at + 2].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    pub fn write_dword(&mut self, address: u32, value: u32) -> Result<()> {
        let at = self.check(address, 4)?;
        self.bytes[at..at + 4].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    /// Borrow `len` bytes starting at `address`.
    pub fn slice(&self, address: u32, len: usize) -> Result<&[u8]> {
        let at = self.check(address, len as u32)?;
        Ok(&self.bytes[at..at + len])
    }

    /// Overwrite the start of the image with `image` (restart, undo).
    pub fn copy_from(&mut self, image: &[u8]) -> Result<()> {
        let at = self.check(0, image.len() as u32)?;
        self.bytes[at..image.len()].copy_from_slice(image);
        Ok(())
    }
}
