//! Assembled programs and their renderings.

use serde::Serialize;

use crate::lower::LoweredFunction;
use crate::target::Instruction;

pub mod assembler;
pub mod render;

pub use assembler::{AssembleOptions, ProgramAssembler, DEFAULT_CHECK_SLOT};
pub use render::OutputFormat;

/// A fully linked program.
///
/// Keeps the lowered functions so renderings can print function and block
/// headers next to the flat code.
#[derive(Debug, Clone)]
pub struct Program<'arena> {
    /// Index of the first executed instruction.
    pub start: u32,
    /// Slot holding the program's outcome.
    pub check: u32,
    pub n_vars: u32,
    pub n_global_vars: u32,
    pub functions: Vec<LoweredFunction<'arena>>,
}

impl Program<'_> {
    /// All instructions in execution-index order.
    pub fn code(&self) -> Vec<Instruction> {
        self.functions
            .iter()
            .flat_map(|function| function.instructions().map(|(_, inst)| *inst))
            .collect()
    }

    pub fn len(&self) -> u32 {
        self.functions.iter().map(|function| function.len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_artifact(&self) -> Artifact {
        Artifact {
            start: self.start,
            check: self.check,
            n_vars: self.n_vars,
            n_global_vars: self.n_global_vars,
            code: self.code(),
        }
    }
}

/// The output record handed to the execution engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub start: u32,
    pub check: u32,
    pub n_vars: u32,
    pub n_global_vars: u32,
    pub code: Vec<Instruction>,
}
