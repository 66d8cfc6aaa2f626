use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::{Error, ErrorKind, Result};
use crate::input::{Input, InputState};
use crate::macros::{MacroDefinition, MacroName};

/// Maximum nesting of included files.
pub const MAX_INCLUDE_DEPTH: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalFrame {
    /// The macro name for `#ifdef`/`#ifndef`, or `if_N` for `#if`.
    pub label: String,
    pub active: bool,
}

/// Open conditional blocks, innermost last.
#[derive(Debug, Default)]
pub struct ConditionalStack {
    frames: Vec<ConditionalFrame>,
}

impl ConditionalStack {
    pub fn push_frame(&mut self, label: impl Into<String>, active: bool) {
        let frame = ConditionalFrame {
            label: label.into(),
            active,
        };
        log::debug!("ConditionalStack::push_frame(): {frame:?}");
        self.frames.push(frame);
    }

    /// Handles `#else`.
    pub fn flip_top(&mut self) -> Result<&ConditionalFrame> {
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| Error::syntax("#else without a matching #if, #ifdef or #ifndef"))?;
        frame.active = !frame.active;
        Ok(frame)
    }

    /// Handles `#endif`.
    pub fn pop_frame(&mut self) -> Result<ConditionalFrame> {
        self.frames
            .pop()
            .ok_or_else(|| Error::syntax("#endif without a matching #if, #ifdef or #ifndef"))
    }

    /// Output is produced only while every open block is active.
    pub fn is_emitting(&self) -> bool {
        self.frames.iter().all(|frame| frame.active)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

#[derive(Debug, Default)]
pub struct State {
    pub macro_definitions: HashMap<MacroName, Rc<MacroDefinition>>,
    pub conditionals: ConditionalStack,
    pub system_include_paths: Vec<PathBuf>,
    if_counter: usize,
    /// Line number of the first line of the text currently being processed.
    pub line_number: usize,
    pub input: InputState,
    /// Makes rendering of any identifier fail, to exercise the internal error report.
    pub trigger_internal_error: bool,
}

impl State {
    pub fn new(system_include_paths: Vec<PathBuf>) -> Self {
        Self {
            system_include_paths,
            ..Self::default()
        }
    }

    /// Add `definition` to the macro table, replacing any existing macro of the same name.
    pub fn define(
        &mut self,
        definition: Rc<MacroDefinition>,
        stderr: &mut dyn Write,
    ) -> Result<MacroName> {
        let name = definition.name.clone();
        log::debug!("State::define(): {definition}");
        if let Some(previous) = self.macro_definitions.insert(name.clone(), definition) {
            log::debug!("State::define(): replaced {previous}");
            writeln!(stderr, "warning: redefinition of macro {name}")?;
        }
        Ok(name)
    }

    pub fn lookup(&self, name: &str) -> Option<Rc<MacroDefinition>> {
        self.macro_definitions.get(name).cloned()
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.macro_definitions.contains_key(name)
    }

    /// Labels for `#if` blocks, `if_1`, `if_2`, ...
    pub fn next_if_label(&mut self) -> String {
        self.if_counter += 1;
        format!("if_{}", self.if_counter)
    }

    pub fn current_file_name(&self) -> String {
        self.input
            .current()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "<unknown>".to_owned())
    }

    /// Search the system include paths in order for `name`.
    pub fn resolve_system_include(&self, name: &str) -> Result<PathBuf> {
        self.system_include_paths
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| {
                Error::new(ErrorKind::IncludeNotFound {
                    name: name.to_owned(),
                    searched: self.system_include_paths.clone(),
                })
            })
    }

    /// Quoted includes are relative to the including file.
    pub fn resolve_local_include(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        if path.is_absolute() {
            return path.to_owned();
        }
        match self.input.current() {
            Some(input) => input.directory().join(path),
            None => path.to_owned(),
        }
    }

    /// Open the included file and make it the current input.
    pub fn include(&mut self, target: &str, system: bool) -> Result<()> {
        if self.input.input_len() >= MAX_INCLUDE_DEPTH {
            return Err(Error::new(ErrorKind::IncludeDepth(MAX_INCLUDE_DEPTH)));
        }
        let path = if system {
            self.resolve_system_include(target)?
        } else {
            self.resolve_local_include(target)
        };
        log::debug!("State::include(): {target} resolved to {path:?}");
        self.input.input_push(Input::open(&path)?);
        Ok(())
    }
}
