use std::path::PathBuf;

/// The category of failure, used to pick the process exit code and the report printed by the
/// driver.
#[derive(thiserror::Error, Debug)]
pub enum ErrorKind {
    #[error("Unknown token on line {line}: {character}")]
    Lex { line: usize, character: char },
    #[error("Unterminated block comment starting on line {line}")]
    UnterminatedComment { line: usize },
    #[error("{0}")]
    Syntax(String),
    /// Raised by an `#error` directive.
    #[error("{file}:{line}: error: {message}")]
    Directive {
        file: String,
        line: usize,
        message: String,
    },
    #[error("Could not find file {name} in defined system include paths: {searched:?}")]
    IncludeNotFound { name: String, searched: Vec<PathBuf> },
    #[error("Include nesting exceeded the maximum depth of {0}")]
    IncludeDepth(usize),
    #[error("Error processing io")]
    Io,
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    context: Vec<String>,
    source: Option<Box<dyn std::error::Error + 'static>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: Vec::new(),
            source: None,
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax(message.into()))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal(message.into()))
    }

    pub fn add_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Errors that the user caused with their input, as opposed to faults in this program.
    pub fn is_user_error(&self) -> bool {
        !matches!(self.kind, ErrorKind::Internal(_))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for context in self.context.iter().rev() {
            write!(f, "{context}: ")?;
        }
        write!(f, "{}", self.kind)?;
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref()
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::new(ErrorKind::Io).with_source(error)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub trait ResultExt<T> {
    fn add_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T> ResultExt<T> for Result<T> {
    fn add_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.add_context(f()))
    }
}

pub trait GetExitCode {
    fn get_exit_code(&self) -> i32;
}

impl<T> GetExitCode for Result<T> {
    fn get_exit_code(&self) -> i32 {
        match self {
            Ok(_) => 0,
            Err(error) if error.is_user_error() => 1,
            Err(_) => 2,
        }
    }
}
