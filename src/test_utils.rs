use crate::main_loop::preprocess_str;
use crate::state::State;

/// Preprocess `source` with a fresh [`State`], discarding diagnostics.
pub fn preprocess(source: &str) -> crate::Result<String> {
    let mut stderr = Vec::new();
    preprocess_str(source, "test.cpp", &mut State::default(), &mut stderr)
}

/// Preprocess `source` with a fresh [`State`] and return what was written to stderr.
pub fn stderr_of(source: &str) -> String {
    let mut stderr = Vec::new();
    let _ = preprocess_str(source, "test.cpp", &mut State::default(), &mut stderr);
    String::from_utf8(stderr).unwrap()
}
