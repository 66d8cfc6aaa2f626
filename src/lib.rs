use std::io::Write;
use std::path::PathBuf;

use clap::builder::{TypedValueParser, ValueParserFactory};

pub use error::{Error, ErrorKind, Result};
pub use main_loop::{preprocess_str, process};
pub use state::State;

pub mod error;
pub mod input;
pub mod lexer;
pub mod macros;
pub mod main_loop;
pub mod node;
pub mod parser;
pub mod precedence;
pub mod state;
#[cfg(test)]
mod test_utils;

/// A `-D name[=value]` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentDefine {
    pub name: String,
    pub value: Option<String>,
}

impl ArgumentDefine {
    /// The equivalent `#define` line.
    pub fn to_directive(&self) -> String {
        match &self.value {
            Some(value) => format!("#define {} {value}\n", self.name),
            None => format!("#define {}\n", self.name),
        }
    }
}

#[derive(Clone)]
pub struct ArgumentDefineParser;

impl TypedValueParser for ArgumentDefineParser {
    type Value = ArgumentDefine;

    fn parse_ref(
        &self,
        cmd: &clap::Command,
        _arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> std::result::Result<Self::Value, clap::Error> {
        let value = value.to_str().ok_or_else(|| {
            clap::Error::raw(
                clap::error::ErrorKind::InvalidUtf8,
                "macro definitions must be valid UTF-8\n",
            )
            .with_cmd(cmd)
        })?;
        let (name, value) = match value.split_once('=') {
            Some((name, value)) => (name, Some(value.to_owned())),
            None => (value, None),
        };
        if !lexer::is_identifier(name) {
            return Err(clap::Error::raw(
                clap::error::ErrorKind::InvalidValue,
                format!("{name:?} is not a valid macro name\n"),
            )
            .with_cmd(cmd));
        }
        Ok(ArgumentDefine {
            name: name.to_owned(),
            value,
        })
    }
}

impl ValueParserFactory for ArgumentDefine {
    type Parser = ArgumentDefineParser;

    fn value_parser() -> Self::Parser {
        ArgumentDefineParser
    }
}

#[derive(Debug, clap::Parser, Clone, Default)]
#[command(version, about)]
pub struct Args {
    /// The file to preprocess.
    pub input_file: PathBuf,
    /// Where to write the output. Defaults to the input path with `.preprocessed.cc` appended.
    #[arg(short = 'o', long = "output_file")]
    pub output_file: Option<PathBuf>,
    /// Add a directory to search for `#include <...>` files. May be repeated; directories are
    /// searched in the order given.
    #[arg(short = 'S', long = "sys_include")]
    pub sys_include: Vec<PathBuf>,
    /// `name[=val]`
    ///
    /// Define `name` to `val`, or to `true` if `=val` is omitted, before processing the input.
    #[arg(short = 'D', long)]
    pub define: Vec<ArgumentDefine>,
    /// Print debug logging.
    #[arg(long)]
    pub debug: bool,
    #[arg(long = "trigger_internal_error", hide = true)]
    pub trigger_internal_error: bool,
}

impl Args {
    pub fn output_path(&self) -> PathBuf {
        match &self.output_file {
            Some(path) => path.clone(),
            None => {
                let mut path = self.input_file.clone().into_os_string();
                path.push(".preprocessed.cc");
                path.into()
            }
        }
    }
}

pub fn run<STDERR: Write>(mut stderr: STDERR, args: Args) -> Result<()> {
    let output_path = args.output_path();
    let output = run_impl(&mut stderr, args)?;
    log::debug!("run(): writing {} bytes to {output_path:?}", output.len());
    if let Err(error) = std::fs::write(&output_path, output) {
        let error = Error::from(error).add_context(format!("Error writing {output_path:?}"));
        writeln!(stderr, "{error}")?;
        return Err(error);
    }
    Ok(())
}

/// Preprocess the input named by `args`, returning the output text.
pub fn run_impl(stderr: &mut dyn Write, args: Args) -> Result<String> {
    let mut state = State::new(args.sys_include);
    state.trigger_internal_error = args.trigger_internal_error;

    for define in &args.define {
        if let Err(error) = define_from_argument(&mut state, define, stderr) {
            let error = error.add_context(format!("-D {}", define.name));
            writeln!(stderr, "{error}")?;
            return Err(error);
        }
    }

    match input::Input::open(&args.input_file) {
        Ok(input) => state.input.input_push(input),
        Err(error) => {
            writeln!(stderr, "{error}")?;
            return Err(error);
        }
    }
    process(&mut state, stderr)
}

/// Runs a `-D` argument through the parser as the equivalent `#define`.
fn define_from_argument(
    state: &mut State,
    define: &ArgumentDefine,
    stderr: &mut dyn Write,
) -> Result<()> {
    let directive = define.to_directive();
    log::debug!("define_from_argument(): {directive:?}");
    let tree = parser::parse(&directive, state)?;
    macros::expand::render(&tree, state, stderr)?;
    Ok(())
}
