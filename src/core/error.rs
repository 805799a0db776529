// This module defines the error types for the slotc backend using the thiserror crate.
// CompileError covers the two fatal categories of the lowering pipeline: constructs the
// backend does not lower (opcodes, predicates, casts, initializers, recursion) and internal
// invariant checks that signal a broken upstream contract. It also carries the failures of
// the textual IR reader, of reading input files and of rendering the artifact. Lowering is
// all-or-nothing, so there is no recoverable variant. CompileResult<T> is the usual alias.

//! Error types for the slotc backend.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Where in the input a diagnostic points.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub function: Option<String>,
    pub line: Option<u32>,
}

impl Location {
    pub fn in_function(name: &str) -> Self {
        Self {
            function: Some(name.to_string()),
            line: None,
        }
    }

    pub fn at_line(mut self, line: Option<u32>) -> Self {
        self.line = line;
        self
    }

    pub fn is_unknown(&self) -> bool {
        self.function.is_none() && self.line.is_none()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.function, self.line) {
            (Some(func), Some(line)) => write!(f, " (in @{func}, line {line})"),
            (Some(func), None) => write!(f, " (in @{func})"),
            (None, Some(line)) => write!(f, " (line {line})"),
            (None, None) => Ok(()),
        }
    }
}

/// Main error type for compilation.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("unsupported {construct}{location}")]
    UnsupportedConstruct {
        construct: String,
        location: Location,
    },

    #[error("invariant violated: {reason}{location}")]
    InvariantViolation {
        reason: String,
        location: Location,
    },

    #[error("parse error at line {line}: {message}")]
    Parse {
        line: u32,
        message: String,
    },

    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot render artifact: {0}")]
    Render(#[from] serde_json::Error),
}

impl CompileError {
    pub fn unsupported(construct: impl Into<String>) -> Self {
        CompileError::UnsupportedConstruct {
            construct: construct.into(),
            location: Location::default(),
        }
    }

    pub fn invariant(reason: impl Into<String>) -> Self {
        CompileError::InvariantViolation {
            reason: reason.into(),
            location: Location::default(),
        }
    }

    /// Attach a location unless the error already has one.
    pub fn located(mut self, at: &Location) -> Self {
        match &mut self {
            CompileError::UnsupportedConstruct { location, .. }
            | CompileError::InvariantViolation { location, .. } => {
                if location.function.is_none() {
                    location.function = at.function.clone();
                }
                if location.line.is_none() {
                    location.line = at.line;
                }
            }
            CompileError::Parse { .. } | CompileError::Io { .. } | CompileError::Render(_) => {}
        }
        self
    }
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;
