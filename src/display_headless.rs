//! Headless display implementation for testing and CI environments
//!
//! Lower-window text is collected into a shared transcript that the host can
//! keep a handle to after the display is handed to the interpreter.

use std::cell::RefCell;
use std::rc::Rc;

use crate::display_trait::{DisplayError, ZMachineDisplay};
use log::debug;

#[derive(Debug)]
pub struct HeadlessDisplay {
    transcript: Rc<RefCell<String>>,
    upper_window: String,
    status_lines: Rc<RefCell<Vec<String>>>,
    cursor: (u16, u16),
    upper_window_lines: u16,
    current_window: u8,
    text_style: u16,
    width: u16,
    height: u16,
}

impl HeadlessDisplay {
    pub fn new() -> Self {
        Self::with_size(80, 24)
    }

    pub fn with_size(width: u16, height: u16) -> Self {
        HeadlessDisplay {
            transcript: Rc::new(RefCell::new(String::new())),
            upper_window: String::new(),
            status_lines: Rc::new(RefCell::new(Vec::new())),
            cursor: (1, 1),
            upper_window_lines: 0,
            current_window: 0,
            text_style: 0,
            width,
            height,
        }
    }

    /// Shared handle to everything printed in the lower window
    pub fn transcript(&self) -> Rc<RefCell<String>> {
        Rc::clone(&self.transcript)
    }

    /// Shared handle to every status line drawn
    pub fn status_lines(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.status_lines)
    }

    pub fn upper_window(&self) -> &str {
        &self.upper_window
    }
}

impl Default for HeadlessDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl ZMachineDisplay for HeadlessDisplay {
    fn print(&mut self, text: &str) -> Result<(), DisplayError> {
        if self.current_window == 1 {
            self.upper_window.push_str(text);
            self.cursor.1 = self.cursor.1.saturating_add(text.chars().count() as u16);
        } else {
            self.transcript.borrow_mut().push_str(text);
        }
        Ok(())
    }

    fn split_window(&mut self, lines: u16) -> Result<(), DisplayError> {
        debug!("Headless: split_window({})", lines);
        self.upper_window_lines = lines;
        Ok(())
    }

    fn set_window(&mut self, window: u8) -> Result<(), DisplayError> {
        debug!("Headless: set_window({})", window);
        self.current_window = window;
        if window == 1 {
            self.cursor = (1, 1);
        }
        Ok(())
    }

    fn erase_window(&mut self, window: i16) -> Result<(), DisplayError> {
        debug!("Headless: erase_window({})", window);
        if window == -1 {
            self.upper_window_lines = 0;
            self.current_window = 0;
        }
        if window < 0 || window == 1 {
            self.upper_window.clear();
        }
        Ok(())
    }

    fn erase_line(&mut self) -> Result<(), DisplayError> {
        Ok(())
    }

    fn set_cursor(&mut self, line: u16, column: u16) -> Result<(), DisplayError> {
        debug!("Headless: set_cursor({}, {})", line, column);
        self.cursor = (line, column);
        Ok(())
    }

    fn get_cursor(&mut self) -> Result<(u16, u16), DisplayError> {
        Ok(self.cursor)
    }

    fn set_text_style(&mut self, style: u16) -> Result<(), DisplayError> {
        self.text_style = if style == 0 { 0 } else { self.text_style | style };
        Ok(())
    }

    fn set_buffer_mode(&mut self, _buffered: bool) -> Result<(), DisplayError> {
        Ok(())
    }

    fn show_status(&mut self, location: &str, right: &str) -> Result<(), DisplayError> {
        self.status_lines
            .borrow_mut()
            .push(format!("{} {}", location, right));
        Ok(())
    }

    fn screen_size(&self) -> (u16, u16) {
        (self.width, self.height)
    }
}
