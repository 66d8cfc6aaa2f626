use std::io::{BufRead, BufReader, Cursor};
use std::path::{Path, PathBuf};

use crate::error::{Result, ResultExt};

/// The stack of open sources. The last element is the one currently being read; an `#include`
/// pushes onto it and reaching the end of a file pops it.
#[derive(Debug, Default)]
pub struct InputState {
    pub input: Vec<Input>,
}

impl InputState {
    pub fn input_push(&mut self, input: Input) {
        log::debug!("InputState::input_push(): {}", input.name);
        self.input.push(input);
    }

    pub fn input_pop(&mut self) -> Option<Input> {
        let input = self.input.pop();
        if let Some(input) = &input {
            log::debug!(
                "InputState::input_pop(): {} after {} lines",
                input.name,
                input.line_number
            );
        }
        input
    }

    pub fn input_len(&self) -> usize {
        self.input.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    pub fn current(&self) -> Option<&Input> {
        self.input.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut Input> {
        self.input.last_mut()
    }
}

#[derive(Debug)]
pub struct Input {
    pub input: InputRead,
    /// Used in diagnostics.
    pub name: String,
    /// `None` for in-memory sources.
    pub path: Option<PathBuf>,
    /// Number of the line most recently returned by [`Input::read_line`].
    pub line_number: usize,
}

impl Input {
    pub fn new(input: InputRead, name: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self {
            input,
            name: name.into(),
            path,
            line_number: 0,
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(crate::Error::from)
            .add_context(|| format!("Error opening file {path:?}"))?;
        Ok(Self::new(
            InputRead::File(BufReader::new(file)),
            path.display().to_string(),
            Some(path.to_owned()),
        ))
    }

    pub fn from_string(source: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(
            InputRead::Memory(Cursor::new(source.into().into_bytes())),
            name,
            None,
        )
    }

    /// The next physical line including its terminating newline, if it has one.
    pub fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let n = match &mut self.input {
            InputRead::File(reader) => reader.read_line(&mut line),
            InputRead::Memory(cursor) => cursor.read_line(&mut line),
        }
        .map_err(crate::Error::from)
        .add_context(|| format!("Error reading {}", self.name))?;

        if n == 0 {
            return Ok(None);
        }
        self.line_number += 1;
        Ok(Some(line))
    }

    /// The directory that quoted includes from this source are resolved against.
    pub fn directory(&self) -> PathBuf {
        match self.path.as_deref().and_then(Path::parent) {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_owned(),
            _ => PathBuf::from("."),
        }
    }
}

#[derive(Debug)]
pub enum InputRead {
    File(BufReader<std::fs::File>),
    Memory(Cursor<Vec<u8>>),
}
