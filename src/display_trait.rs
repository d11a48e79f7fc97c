//! Core display trait for Z-Machine screen output
//!
//! The interpreter writes all visible text through this trait and asks it
//! for the screen metrics it publishes in the story header. Implementations
//! exist for a real terminal and for headless runs.

use std::fmt;

/// Core trait for Z-Machine display operations
pub trait ZMachineDisplay {
    /// Print text to the current window
    fn print(&mut self, text: &str) -> Result<(), DisplayError>;

    /// Print a single character to the current window
    fn print_char(&mut self, ch: char) -> Result<(), DisplayError> {
        let mut buf = [0u8; 4];
        self.print(ch.encode_utf8(&mut buf))
    }

    /// Split the screen so the upper window is `lines` tall
    fn split_window(&mut self, lines: u16) -> Result<(), DisplayError>;

    /// Set the current window (0 = lower/main, 1 = upper)
    fn set_window(&mut self, window: u8) -> Result<(), DisplayError>;

    /// Erase a window (-1 = unsplit and clear, -2 = clear all, 0 = lower, 1 = upper)
    fn erase_window(&mut self, window: i16) -> Result<(), DisplayError>;

    /// Erase from cursor to end of line
    fn erase_line(&mut self) -> Result<(), DisplayError>;

    /// Set cursor position (1-based) in the upper window
    fn set_cursor(&mut self, line: u16, column: u16) -> Result<(), DisplayError>;

    /// Current cursor position as (line, column), 1-based
    fn get_cursor(&mut self) -> Result<(u16, u16), DisplayError>;

    /// Set text style (0 = roman, 1 = reverse, 2 = bold, 4 = italic, 8 = fixed)
    fn set_text_style(&mut self, style: u16) -> Result<(), DisplayError>;

    /// Turn word-wrap buffering on or off
    fn set_buffer_mode(&mut self, buffered: bool) -> Result<(), DisplayError>;

    /// Set foreground and background using Z-machine colour numbers
    fn set_colour(&mut self, _foreground: u16, _background: u16) -> Result<(), DisplayError> {
        Ok(())
    }

    /// Draw the v3 status line
    fn show_status(&mut self, location: &str, right: &str) -> Result<(), DisplayError>;

    /// Push buffered output to the device
    fn flush(&mut self) -> Result<(), DisplayError> {
        Ok(())
    }

    // Capability queries published into the header

    /// Screen dimensions as (columns, lines)
    fn screen_size(&self) -> (u16, u16);

    fn line_height(&self) -> u8 {
        1
    }

    fn character_width(&self) -> u8 {
        1
    }

    /// Dimensions of a picture, if pictures are supported at all
    fn picture_size(&self, _picture: u16) -> Option<(u16, u16)> {
        None
    }

    fn has_color(&self) -> bool {
        false
    }
}

/// Display error type
#[derive(Debug, Clone)]
pub struct DisplayError {
    pub message: String,
}

impl DisplayError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for DisplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Display error: {}", self.message)
    }
}

impl std::error::Error for DisplayError {}

impl From<std::io::Error> for DisplayError {
    fn from(error: std::io::Error) -> Self {
        Self::new(format!("I/O error: {}", error))
    }
}
