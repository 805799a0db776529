//! FileCheck-style test validation for IR files.
//!
//! A test file is ordinary textual IR whose comment lines carry `RUN:` and
//! `CHECK*` directives. Each `RUN:` line compiles the file with the options it
//! names and matches the rendered output (or the error message, for runs
//! prefixed with `not`) against the check directives in order.
//!
//! ```text
//! ; RUN: slotc -a %s
//! ; CHECK: # main()
//! ; CHECK-NEXT: # entry:
//! ; CHECK-NOT: jmp_ind
//! define i32 @main() {
//! entry:
//!   ret i32 1
//! }
//! ```

use crate::core::{CompileError, CompileResult};
use crate::program::{AssembleOptions, OutputFormat};

/// A CHECK directive extracted from an IR file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckDirective {
    /// CHECK: pattern - Match on this or any later line
    Check(String),
    /// CHECK-LABEL: pattern - Label for a section
    CheckLabel(String),
    /// CHECK-NEXT: pattern - Match on the next line
    CheckNext(String),
    /// CHECK-NOT: pattern - Must not occur before the next match
    CheckNot(String),
    /// CHECK-EMPTY - Match empty line
    CheckEmpty,
    /// COM: comment - Comment, ignored
    Comment(String),
}

/// A RUN directive: how to compile the file and whether that must fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirective {
    pub expect_failure: bool,
    pub options: AssembleOptions,
    pub format: OutputFormat,
}

impl RunDirective {
    /// Parse the command after `RUN:`, e.g. `not slotc -N 16 --entry f %s`.
    pub fn parse(command: &str) -> Result<Self, String> {
        let mut words = command.split_whitespace().peekable();
        let expect_failure = words.next_if_eq(&"not").is_some();
        if words.next().is_none() {
            return Err("RUN line without a command".to_string());
        }

        let mut run = RunDirective {
            expect_failure,
            options: AssembleOptions::default(),
            format: OutputFormat::Text,
        };
        while let Some(word) = words.next() {
            match word {
                "%s" => {}
                "-a" | "--asm" => run.format = OutputFormat::Asm,
                "-N" | "--min-slots" => {
                    let value = words.next().ok_or("-N needs a value")?;
                    run.options.min_slots = value
                        .parse()
                        .map_err(|_| format!("invalid slot count '{value}'"))?;
                }
                "--entry" => {
                    run.options.entry = words.next().ok_or("--entry needs a value")?.to_string();
                }
                "--format" => match words.next() {
                    Some("text") => run.format = OutputFormat::Text,
                    Some("json") => run.format = OutputFormat::Json,
                    Some("asm") => run.format = OutputFormat::Asm,
                    other => return Err(format!("unknown format {other:?}")),
                },
                other => return Err(format!("unknown RUN argument '{other}'")),
            }
        }
        Ok(run)
    }
}

/// Test specification extracted from an IR file
#[derive(Debug)]
pub struct TestSpec {
    pub run_directives: Vec<RunDirective>,
    pub check_directives: Vec<CheckDirective>,
    /// The whole file; directives are comments to the IR reader.
    pub source: String,
}

impl TestSpec {
    /// Parse an IR file to extract test specifications
    pub fn parse(content: &str) -> CompileResult<Self> {
        let mut run_directives = Vec::new();
        let mut check_directives = Vec::new();

        for (idx, line) in content.lines().enumerate() {
            let Some(comment) = line.trim().strip_prefix(';') else {
                continue;
            };
            let comment = comment.trim();

            if let Some(command) = comment.strip_prefix("RUN:") {
                let run = RunDirective::parse(command).map_err(|message| CompileError::Parse {
                    line: idx as u32 + 1,
                    message,
                })?;
                run_directives.push(run);
            } else if let Some(pattern) = comment.strip_prefix("CHECK-LABEL:") {
                check_directives.push(CheckDirective::CheckLabel(pattern.trim().to_string()));
            } else if let Some(pattern) = comment.strip_prefix("CHECK-NEXT:") {
                check_directives.push(CheckDirective::CheckNext(pattern.trim().to_string()));
            } else if let Some(pattern) = comment.strip_prefix("CHECK-NOT:") {
                check_directives.push(CheckDirective::CheckNot(pattern.trim().to_string()));
            } else if comment.starts_with("CHECK-EMPTY") {
                check_directives.push(CheckDirective::CheckEmpty);
            } else if let Some(pattern) = comment.strip_prefix("CHECK:") {
                check_directives.push(CheckDirective::Check(pattern.trim().to_string()));
            } else if let Some(text) = comment.strip_prefix("COM:") {
                check_directives.push(CheckDirective::Comment(text.trim().to_string()));
            }
        }

        Ok(TestSpec {
            run_directives,
            check_directives,
            source: content.to_string(),
        })
    }
}

/// Test runner that compiles IR tests and validates their output
#[derive(Debug, Default)]
pub struct TestRunner;

impl TestRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run every RUN directive of a test and validate its output
    pub fn run_test(&self, spec: &TestSpec) -> Result<(), String> {
        if spec.run_directives.is_empty() {
            return Err("test has no RUN line".to_string());
        }
        for run in &spec.run_directives {
            let output = self.execute(&spec.source, run)?;
            self.validate_output(&output, &spec.check_directives)?;
        }
        Ok(())
    }

    /// Compile `source` as `run` says and return the text to check.
    pub fn execute(&self, source: &str, run: &RunDirective) -> Result<String, String> {
        match crate::compile_to_string(source, &run.options, run.format) {
            Ok(output) if run.expect_failure => Err(format!(
                "expected compilation to fail, but it produced:\n{output}"
            )),
            Ok(output) => Ok(output),
            Err(err) if run.expect_failure => {
                log::debug!("expected failure: {err}");
                Ok(err.to_string())
            }
            Err(err) => Err(format!("compilation failed: {err}")),
        }
    }

    /// Validate output against CHECK directives
    pub fn validate_output(
        &self,
        output: &str,
        directives: &[CheckDirective],
    ) -> Result<(), String> {
        let output_lines: Vec<&str> = output.lines().collect();
        let mut line_idx = 0;
        let mut forbidden: Vec<&str> = Vec::new();

        for directive in directives {
            match directive {
                CheckDirective::Comment(_) => continue,

                CheckDirective::CheckNot(pattern) => forbidden.push(pattern),

                CheckDirective::Check(pattern) | CheckDirective::CheckLabel(pattern) => {
                    let found = output_lines
                        .iter()
                        .skip(line_idx)
                        .position(|line| line.contains(pattern.as_str()));

                    match found {
                        Some(idx) => {
                            check_absent(&forbidden, &output_lines[line_idx..line_idx + idx])?;
                            forbidden.clear();
                            line_idx += idx + 1;
                            log::trace!("CHECK: '{}' found at line {}", pattern, line_idx - 1);
                        }
                        None => {
                            return Err(format!(
                                "CHECK: pattern '{}' not found in output:\n{}",
                                pattern, output
                            ));
                        }
                    }
                }

                CheckDirective::CheckNext(pattern) => {
                    let Some(line) = output_lines.get(line_idx) else {
                        return Err(format!("CHECK-NEXT: no more lines, expected '{}'", pattern));
                    };
                    if !line.contains(pattern.as_str()) {
                        return Err(format!(
                            "CHECK-NEXT: expected '{}' but got '{}'",
                            pattern, line
                        ));
                    }
                    check_absent(&forbidden, &[])?;
                    forbidden.clear();
                    line_idx += 1;
                }

                CheckDirective::CheckEmpty => {
                    let Some(line) = output_lines.get(line_idx) else {
                        continue;
                    };
                    if !line.trim().is_empty() {
                        return Err(format!(
                            "CHECK-EMPTY: expected empty line but got '{}'",
                            line
                        ));
                    }
                    line_idx += 1;
                }
            }
        }

        check_absent(&forbidden, &output_lines[line_idx.min(output_lines.len())..])
    }
}

fn check_absent(patterns: &[&str], lines: &[&str]) -> Result<(), String> {
    for pattern in patterns {
        if let Some(line) = lines.iter().find(|line| line.contains(pattern)) {
            return Err(format!("CHECK-NOT: '{}' found in '{}'", pattern, line));
        }
    }
    Ok(())
}
