//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

use similar_asserts::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Unescape newlines from .out file format
fn unescape_newlines(input: &str) -> String {
    input.replace("\\n", "\n")
}

#[derive(Debug, Default)]
struct Expected {
    output: Option<String>,
    stderr: String,
    stderr_regex: Option<String>,
    status: i32,
    /// Only check that something was written to stderr.
    expect_error: bool,
    args: Vec<String>,
}

/// Parse the .out file format (key=value lines)
fn parse_out_file(content: &str) -> Expected {
    let mut expected = Expected::default();
    for line in content.lines() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            match key {
                "output" => expected.output = Some(unescape_newlines(value)),
                "stderr" => expected.stderr = unescape_newlines(value),
                "stderr_regex" => expected.stderr_regex = Some(unescape_newlines(value)),
                "status" => expected.status = value.parse().unwrap_or(0),
                "expect_error" => expected.expect_error = value == "true",
                "args" => {
                    expected.args = value.split_whitespace().map(String::from).collect()
                }
                _ => {}
            }
        }
    }
    expected
}

struct TestPlan {
    input: PathBuf,
    expected: Expected,
}

/// Load a fixture, `<name>.cpp` with the expectations in `<name>.out`
fn load_fixture(name: &str) -> TestPlan {
    let base = Path::new("fixtures/integration_tests");
    let input = base.join(format!("{name}.cpp"));
    let out_path = base.join(format!("{name}.out"));

    let out_content = fs::read_to_string(&out_path)
        .unwrap_or_else(|_| panic!("Failed to read {}", out_path.display()));
    TestPlan {
        input,
        expected: parse_out_file(&out_content),
    }
}

/// Run pepper on the fixture, returning the process output and the preprocessed text if the
/// output file was written.
fn run_pepper(plan: &TestPlan) -> (Output, Option<String>) {
    let dir = tempfile::tempdir().unwrap();
    let output_file = dir.path().join("out.cc");
    let output = Command::new(env!("CARGO_BIN_EXE_pepper"))
        .args(&plan.expected.args)
        .arg(&plan.input)
        .arg("-o")
        .arg(&output_file)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run pepper");
    let preprocessed = fs::read_to_string(&output_file).ok();
    (output, preprocessed)
}

fn run_test(plan: TestPlan) {
    let (output, preprocessed) = run_pepper(&plan);
    let stderr = String::from_utf8_lossy(&output.stderr);

    match &plan.expected.stderr_regex {
        None if plan.expected.expect_error => {
            assert!(!stderr.is_empty(), "expected stderr to be non-empty")
        }
        Some(pattern) => {
            let re = regex_lite::Regex::new(pattern).unwrap();
            assert!(
                re.is_match(&stderr),
                "stderr doesn't match regex: {pattern}\nActual stderr: {stderr}"
            );
        }
        None => assert_eq!(stderr.as_ref(), plan.expected.stderr.as_str(), "stderr mismatch"),
    }

    assert_eq!(
        output.status.code(),
        Some(plan.expected.status),
        "exit code mismatch"
    );

    match &plan.expected.output {
        Some(expected) => assert_eq!(
            preprocessed.as_deref(),
            Some(expected.as_str()),
            "output mismatch"
        ),
        None if plan.expected.status != 0 => {
            assert!(preprocessed.is_none(), "output written despite failure")
        }
        None => {}
    }
}

macro_rules! pepper_test {
    ($name:ident) => {
        #[test]
        fn $name() {
            run_test(load_fixture(stringify!($name)));
        }
    };
}

pepper_test!(arity_error);
pepper_test!(define_arg);
pepper_test!(error_directive);
pepper_test!(function_macro);
pepper_test!(if_expression);
pepper_test!(ifdef);
pepper_test!(include);
pepper_test!(internal_error);
pepper_test!(lex_error);
pepper_test!(multiline_comment);
pepper_test!(object_macro);
pepper_test!(pragma);
pepper_test!(py_directive);
pepper_test!(redefinition);
pepper_test!(redefinition_identical);
pepper_test!(syntax_error);
pepper_test!(system_include);
pepper_test!(system_include_missing);
pepper_test!(variadic);
pepper_test!(warning_directive);

#[test]
fn default_output_path() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("main.cpp");
    fs::write(&input, "#define N 3\nint a[N];\n").unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_pepper"))
        .arg(&input)
        .output()
        .expect("failed to run pepper");
    assert_eq!(output.status.code(), Some(0));
    let preprocessed = fs::read_to_string(dir.path().join("main.cpp.preprocessed.cc")).unwrap();
    assert_eq!(
        preprocessed,
        "// Macro N with no args expanding to '3'\nint a[3];\n"
    );
}
