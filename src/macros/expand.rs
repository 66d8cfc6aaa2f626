//! Rendering a parsed tree to output text.
//!
//! Rendering is where directives take effect: definitions are added to the macro table, includes
//! are opened and diagnostics are reported. Macro uses are replaced by their expansion; if any
//! expansion happened the result is returned as [`Continuation::MoreExpansionNeeded`] so that the
//! driver feeds it through the parser again.

use std::io::Write;

use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::macros::MacroDefinition;
use crate::node::{write_arguments, Node};
use crate::state::State;

/// Rendered in place of an `#include` line.
pub const INCLUDE_PLACEHOLDER: &str = r#"static_assert(0, "include node not properly implemented");"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    Complete(String),
    /// Macros were expanded, and the text may contain further macro uses.
    MoreExpansionNeeded(String),
}

pub fn render(node: &Node, state: &mut State, stderr: &mut dyn Write) -> Result<Continuation> {
    let mut renderer = Renderer {
        state,
        stderr,
        expanded: false,
    };
    let mut out = String::new();
    renderer.render(node, &mut out)?;
    Ok(match renderer.expanded {
        true => Continuation::MoreExpansionNeeded(out),
        false => Continuation::Complete(out),
    })
}

struct Renderer<'s, 'w> {
    state: &'s mut State,
    stderr: &'w mut dyn Write,
    expanded: bool,
}

impl Renderer<'_, '_> {
    fn render(&mut self, node: &Node, out: &mut String) -> Result<()> {
        log::trace!("Renderer::render(): {node:?}");
        match node {
            Node::Lines(children) => {
                for child in children {
                    self.render(child, out)?;
                }
            }
            Node::Identifier { name, args } => self.render_identifier(name, args.as_deref(), out)?,
            Node::Literal { .. } | Node::Whitespace(_) | Node::Comment(_) | Node::Newline => {
                node.write_source(out)
            }
            Node::Define(definition) => {
                self.state.define(definition.clone(), self.stderr)?;
                node.write_source(out);
            }
            Node::Include {
                target,
                system,
                line,
            } => {
                self.state.include(target, *system).map_err(|e| {
                    e.add_context(format!("{}:{line}", self.state.current_file_name()))
                })?;
                out.push_str(INCLUDE_PLACEHOLDER);
            }
            Node::Error {
                message,
                file,
                line,
            } => {
                return Err(Error::new(ErrorKind::Directive {
                    file: file.clone(),
                    line: *line,
                    message: message.clone(),
                }))
            }
            Node::Warning {
                message,
                file,
                line,
            } => {
                log::debug!("Renderer::render(): #warning at {file}:{line}");
                writeln!(self.stderr, "{file}:{line}: warning: {message}")?;
            }
            Node::Pragma { .. } => {
                log::debug!("Renderer::render(): passing through {node:?}");
                node.write_source(out);
            }
        }
        Ok(())
    }

    fn render_identifier(
        &mut self,
        name: &str,
        args: Option<&[Node]>,
        out: &mut String,
    ) -> Result<()> {
        if self.state.trigger_internal_error {
            return Err(Error::internal(format!(
                "internal error triggered while rendering {name}"
            )));
        }

        let Some(definition) = self.state.lookup(name) else {
            out.push_str(name);
            if let Some(args) = args {
                self.render_arguments(args, out)?;
            }
            return Ok(());
        };

        match args {
            // a function-like macro named without arguments is just a name
            None if definition.is_function_like() => out.push_str(name),
            None => {
                out.push_str(&self.expand(&definition, None)?);
                self.expanded = true;
            }
            // `NAME()` on an object-like macro keeps the parentheses
            Some(args) if !definition.is_function_like() && args.iter().all(Node::is_blank) => {
                out.push_str(&self.expand(&definition, None)?);
                self.render_arguments(args, out)?;
                self.expanded = true;
            }
            Some(args) => {
                let rendered = args
                    .iter()
                    .map(|arg| {
                        let mut text = String::new();
                        self.render(arg, &mut text).map(|_| text)
                    })
                    .collect::<Result<Vec<_>>>()?;
                log::debug!("Renderer::render_identifier(): {name}{rendered:?}");
                out.push_str(&self.expand(&definition, Some(&rendered))?);
                self.expanded = true;
            }
        }
        Ok(())
    }

    fn expand(&self, definition: &MacroDefinition, args: Option<&[String]>) -> Result<String> {
        definition
            .expand(args)
            .add_context(|| format!("Line {}", self.state.line_number))
    }

    fn render_arguments(&mut self, args: &[Node], out: &mut String) -> Result<()> {
        let mut result = Ok(());
        write_arguments(args, out, |arg, out| {
            if result.is_ok() {
                result = self.render(arg, out);
            }
        });
        result
    }
}
