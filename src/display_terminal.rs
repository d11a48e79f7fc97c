//! Plain terminal display using crossterm for cursor and style control
//!
//! The lower window is ordinary scrolling stdout. The upper window (and the
//! v3 status line) is drawn at absolute positions at the top of the screen.

use crossterm::{
    cursor::{MoveTo, RestorePosition, SavePosition},
    queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{self, Clear, ClearType},
};
use log::debug;
use std::io::{self, Stdout, Write};

use crate::display_trait::{DisplayError, ZMachineDisplay};

pub struct TerminalDisplay {
    stdout: Stdout,
    fallback_size: (u16, u16),
    upper_window_lines: u16,
    current_window: u8,
    /// Upper window cursor (1-based)
    upper_cursor: (u16, u16),
}

impl TerminalDisplay {
    /// `fallback_size` is used when the terminal size cannot be queried.
    pub fn new(fallback_size: (u16, u16)) -> Self {
        TerminalDisplay {
            stdout: io::stdout(),
            fallback_size,
            upper_window_lines: 0,
            current_window: 0,
            upper_cursor: (1, 1),
        }
    }
}

/// Z-machine colour numbers 2-9 to terminal colours
fn zcolor(code: u16) -> Option<Color> {
    match code {
        2 => Some(Color::Black),
        3 => Some(Color::DarkRed),
        4 => Some(Color::DarkGreen),
        5 => Some(Color::DarkYellow),
        6 => Some(Color::DarkBlue),
        7 => Some(Color::DarkMagenta),
        8 => Some(Color::DarkCyan),
        9 => Some(Color::White),
        _ => None,
    }
}

impl ZMachineDisplay for TerminalDisplay {
    fn print(&mut self, text: &str) -> Result<(), DisplayError> {
        if self.current_window == 1 {
            let (line, column) = self.upper_cursor;
            queue!(
                self.stdout,
                SavePosition,
                MoveTo(column.saturating_sub(1), line.saturating_sub(1)),
                Print(text),
                RestorePosition
            )?;
            self.upper_cursor.1 = column.saturating_add(text.chars().count() as u16);
        } else {
            // Raw mode may be active from a read_char; keep line endings sane
            queue!(self.stdout, Print(text.replace('\n', "\r\n")))?;
        }
        self.stdout.flush()?;
        Ok(())
    }

    fn split_window(&mut self, lines: u16) -> Result<(), DisplayError> {
        debug!("Terminal: split_window({})", lines);
        self.upper_window_lines = lines;
        Ok(())
    }

    fn set_window(&mut self, window: u8) -> Result<(), DisplayError> {
        self.current_window = window;
        if window == 1 {
            self.upper_cursor = (1, 1);
        }
        Ok(())
    }

    fn erase_window(&mut self, window: i16) -> Result<(), DisplayError> {
        match window {
            -1 | -2 => {
                if window == -1 {
                    self.upper_window_lines = 0;
                    self.current_window = 0;
                }
                queue!(self.stdout, Clear(ClearType::All), MoveTo(0, 0))?;
            }
            1 => {
                queue!(self.stdout, SavePosition)?;
                for row in 0..self.upper_window_lines {
                    queue!(self.stdout, MoveTo(0, row), Clear(ClearType::CurrentLine))?;
                }
                queue!(self.stdout, RestorePosition)?;
            }
            _ => {}
        }
        self.stdout.flush()?;
        Ok(())
    }

    fn erase_line(&mut self) -> Result<(), DisplayError> {
        queue!(self.stdout, Clear(ClearType::UntilNewLine))?;
        self.stdout.flush()?;
        Ok(())
    }

    fn set_cursor(&mut self, line: u16, column: u16) -> Result<(), DisplayError> {
        self.upper_cursor = (line, column);
        Ok(())
    }

    fn get_cursor(&mut self) -> Result<(u16, u16), DisplayError> {
        Ok(self.upper_cursor)
    }

    fn set_text_style(&mut self, style: u16) -> Result<(), DisplayError> {
        if style == 0 {
            queue!(self.stdout, SetAttribute(Attribute::Reset))?;
        }
        if style & 1 != 0 {
            queue!(self.stdout, SetAttribute(Attribute::Reverse))?;
        }
        if style & 2 != 0 {
            queue!(self.stdout, SetAttribute(Attribute::Bold))?;
        }
        if style & 4 != 0 {
            queue!(self.stdout, SetAttribute(Attribute::Italic))?;
        }
        Ok(())
    }

    fn set_buffer_mode(&mut self, _buffered: bool) -> Result<(), DisplayError> {
        Ok(())
    }

    fn set_colour(&mut self, foreground: u16, background: u16) -> Result<(), DisplayError> {
        if foreground == 1 || background == 1 {
            queue!(self.stdout, ResetColor)?;
        }
        if let Some(fg) = zcolor(foreground) {
            queue!(self.stdout, SetForegroundColor(fg))?;
        }
        if let Some(bg) = zcolor(background) {
            queue!(self.stdout, SetBackgroundColor(bg))?;
        }
        Ok(())
    }

    fn show_status(&mut self, location: &str, right: &str) -> Result<(), DisplayError> {
        let (width, _) = self.screen_size();
        let width = width as usize;
        let room = width.saturating_sub(right.chars().count() + 2);
        let left: String = location.chars().take(room).collect();
        let padding = width.saturating_sub(left.chars().count() + right.chars().count() + 1);
        let line = format!(" {}{}{}", left, " ".repeat(padding), right);
        queue!(
            self.stdout,
            SavePosition,
            MoveTo(0, 0),
            SetAttribute(Attribute::Reverse),
            Print(line),
            SetAttribute(Attribute::Reset),
            RestorePosition
        )?;
        self.stdout.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DisplayError> {
        self.stdout.flush()?;
        Ok(())
    }

    fn screen_size(&self) -> (u16, u16) {
        terminal::size().unwrap_or(self.fallback_size)
    }

    fn has_color(&self) -> bool {
        true
    }
}
