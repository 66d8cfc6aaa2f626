use std::io::Write;

use crate::error::{Error, ErrorKind, Result};
use crate::input::Input;
use crate::macros::expand::{render, Continuation};
use crate::parser::parse;
use crate::state::State;

/// How many times a single line may be fed back through the parser after macro expansion.
pub const MAX_EXPANSION_PASSES: usize = 64;

pub const BUG_REPORT_URL: &str = concat!(env!("CARGO_PKG_REPOSITORY"), "/issues");

/// Text waiting to be parsed, either read from the current input or produced by expanding
/// macros.
struct Pending {
    text: String,
    /// The input as read, when `text` was produced by expansion.
    source: Option<String>,
    line: usize,
    /// How many expansion passes produced `text`. Zero for text read from a file.
    passes: usize,
}

impl Pending {
    /// The text to show in error reports.
    fn source(&self) -> &str {
        self.source.as_deref().unwrap_or(&self.text)
    }
}

/// The main loop, the most important function in this program.
///
/// Reads lines from the top of `state.input` until every input is exhausted, returning the
/// concatenated output. Errors are reported on `stderr` here, where the offending input is
/// still known.
pub fn process(state: &mut State, stderr: &mut dyn Write) -> Result<String> {
    let mut output = String::new();
    // Physical lines joined together while a block comment is open.
    let mut buffer = String::new();
    let mut buffer_line = 0;
    let mut expansion: Option<Pending> = None;

    loop {
        let pending = match expansion.take() {
            Some(pending) => pending,
            None => {
                let Some(input) = state.input.current_mut() else {
                    break;
                };
                match input.read_line()? {
                    Some(line) => {
                        if buffer.is_empty() {
                            buffer_line = input.line_number;
                        }
                        buffer.push_str(&line);
                        Pending {
                            text: std::mem::take(&mut buffer),
                            source: None,
                            line: buffer_line,
                            passes: 0,
                        }
                    }
                    None => {
                        if !buffer.is_empty() {
                            let error = Error::new(ErrorKind::UnterminatedComment {
                                line: buffer_line,
                            });
                            report_syntax_error(stderr, state, &buffer, &error)?;
                            return Err(error);
                        }
                        state.input.input_pop();
                        if !state.input.is_empty() && !output.is_empty() && !output.ends_with('\n')
                        {
                            output.push('\n');
                        }
                        continue;
                    }
                }
            }
        };

        state.line_number = pending.line;
        log::trace!("process(): line {} {:?}", pending.line, pending.text);
        let tree = match parse(&pending.text, state) {
            Ok(tree) => tree,
            // Keep reading until the comment is closed
            Err(Error {
                kind: ErrorKind::UnterminatedComment { .. },
                ..
            }) if pending.passes == 0 => {
                buffer = pending.text;
                continue;
            }
            Err(error) => {
                report_syntax_error(stderr, state, pending.source(), &error)?;
                return Err(error);
            }
        };

        if !state.conditionals.is_emitting() {
            log::trace!("process(): skipping line {}", pending.line);
            continue;
        }

        match render(&tree, state, stderr) {
            Ok(Continuation::Complete(text)) => output.push_str(&text),
            Ok(Continuation::MoreExpansionNeeded(text)) => {
                if text == pending.text {
                    output.push_str(&text);
                } else if pending.passes + 1 >= MAX_EXPANSION_PASSES {
                    let error = Error::syntax(format!(
                        "Line {}: macro expansion did not finish after {MAX_EXPANSION_PASSES} \
                         passes",
                        pending.line
                    ));
                    report_syntax_error(stderr, state, pending.source(), &error)?;
                    return Err(error);
                } else {
                    expansion = Some(Pending {
                        text,
                        source: Some(pending.source.unwrap_or(pending.text)),
                        line: pending.line,
                        passes: pending.passes + 1,
                    });
                }
            }
            Err(error) => {
                report_render_error(stderr, state, pending.source(), &error)?;
                return Err(error);
            }
        }
    }

    if state.conditionals.depth() > 0 {
        log::warn!(
            "process(): {} conditional blocks still open at end of input",
            state.conditionals.depth()
        );
    }
    Ok(output)
}

/// Process `source` as if it were a file called `name`.
pub fn preprocess_str(
    source: &str,
    name: &str,
    state: &mut State,
    stderr: &mut dyn Write,
) -> Result<String> {
    state.input.input_push(Input::from_string(source, name));
    process(state, stderr)
}

fn write_input(stderr: &mut dyn Write, input: &str) -> std::io::Result<()> {
    stderr.write_all(input.as_bytes())?;
    if !input.ends_with('\n') {
        stderr.write_all(b"\n")?;
    }
    Ok(())
}

fn report_syntax_error(
    stderr: &mut dyn Write,
    state: &State,
    input: &str,
    error: &Error,
) -> Result<()> {
    writeln!(
        stderr,
        "A syntax error was encountered while parsing a line from {}:",
        state.current_file_name()
    )?;
    write_input(stderr, input)?;
    writeln!(stderr, "{error}")?;
    Ok(())
}

fn report_render_error(
    stderr: &mut dyn Write,
    state: &State,
    input: &str,
    error: &Error,
) -> Result<()> {
    match &error.kind {
        ErrorKind::Internal(_) => {
            writeln!(stderr, "An internal error occured while processing a line:")?;
            write_input(stderr, input)?;
            writeln!(stderr, "Please report this error: {BUG_REPORT_URL}")?;
            writeln!(stderr, "{error}")?;
        }
        ErrorKind::Lex { .. } | ErrorKind::Syntax(_) => {
            report_syntax_error(stderr, state, input, error)?
        }
        _ => writeln!(stderr, "{error}")?,
    }
    Ok(())
}
