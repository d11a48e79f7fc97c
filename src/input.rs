//! Line and character input for sread/aread and read_char
//!
//! Interactive terminals get single keypresses through crossterm's raw mode;
//! piped input is read a line at a time. End of input is reported as
//! `VmError::InputClosed` so a finished script stops the interpreter instead
//! of spinning on empty commands.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::rc::Rc;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use log::debug;

use crate::error::{Result, VmError};

pub trait ZMachineInput {
    /// Read one line, without its terminator
    fn read_line(&mut self) -> Result<String>;

    /// Read one keypress
    fn read_char(&mut self) -> Result<char>;
}

/// Input from the process's standard input
pub struct StdinInput {
    interactive: bool,
}

impl StdinInput {
    pub fn new() -> Self {
        StdinInput {
            interactive: atty::is(atty::Stream::Stdin),
        }
    }

    fn read_raw_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let bytes_read = io::stdin().lock().read_line(&mut line)?;
        if bytes_read == 0 {
            debug!("Input: EOF on stdin");
            return Err(VmError::InputClosed);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    fn read_key(&mut self) -> Result<char> {
        terminal::enable_raw_mode()?;
        let result = loop {
            match event::read() {
                Ok(Event::Key(key)) => {
                    if let Some(ch) = key_to_char(key) {
                        break Ok(ch);
                    }
                }
                Ok(_) => {}
                Err(e) => break Err(VmError::Io(e)),
            }
        };
        terminal::disable_raw_mode()?;
        result
    }
}

impl Default for StdinInput {
    fn default() -> Self {
        Self::new()
    }
}

fn key_to_char(key: KeyEvent) -> Option<char> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some('\x1b'),
        KeyCode::Char(c) => Some(c),
        KeyCode::Enter => Some('\n'),
        KeyCode::Esc => Some('\x1b'),
        KeyCode::Backspace => Some('\x08'),
        KeyCode::Tab => Some('\t'),
        _ => None,
    }
}

impl ZMachineInput for StdinInput {
    fn read_line(&mut self) -> Result<String> {
        let line = self.read_raw_line()?;
        debug!("Input: line '{}'", line);
        Ok(line)
    }

    fn read_char(&mut self) -> Result<char> {
        if self.interactive {
            return self.read_key();
        }
        // Piped input: first character of the next line, newline if blank
        let line = self.read_raw_line()?;
        Ok(line.chars().next().unwrap_or('\n'))
    }
}

/// Input fed from a fixed script, for tests and replay
#[derive(Debug, Default)]
pub struct ScriptedInput {
    lines: VecDeque<String>,
}

impl ScriptedInput {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedInput {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

impl ZMachineInput for ScriptedInput {
    fn read_line(&mut self) -> Result<String> {
        self.lines.pop_front().ok_or(VmError::InputClosed)
    }

    fn read_char(&mut self) -> Result<char> {
        let line = self.lines.pop_front().ok_or(VmError::InputClosed)?;
        Ok(line.chars().next().unwrap_or('\n'))
    }
}

/// Writes buffered story output to `out` before every read, so a prompt
/// collected by a headless display is visible before input blocks.
pub struct FlushBeforeRead<W: Write> {
    inner: Box<dyn ZMachineInput>,
    pending: Rc<RefCell<String>>,
    out: W,
}

impl<W: Write> FlushBeforeRead<W> {
    pub fn new(inner: Box<dyn ZMachineInput>, pending: Rc<RefCell<String>>, out: W) -> Self {
        FlushBeforeRead {
            inner,
            pending,
            out,
        }
    }

    fn flush_pending(&mut self) -> Result<()> {
        let text = std::mem::take(&mut *self.pending.borrow_mut());
        self.out.write_all(text.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }
}

impl<W: Write> ZMachineInput for FlushBeforeRead<W> {
    fn read_line(&mut self) -> Result<String> {
        self.flush_pending()?;
        self.inner.read_line()
    }

    fn read_char(&mut self) -> Result<char> {
        self.flush_pending()?;
        self.inner.read_char()
    }
}
