//! slotc - a backend for a stackless flat-memory machine.
//!
//! The target machine has one growing array of word-sized cells and no
//! registers or call stack. slotc lowers a typed SSA IR module into the
//! machine's flat instruction list: every value gets a fixed cell, every
//! function a fixed frame of slots, and control flow is linearized into
//! absolute instruction indices.
//!
//! # Primary Usage
//!
//! ```ignore
//! use slotc::core::CompilationSession;
//! use slotc::ir::Module;
//! use slotc::program::{AssembleOptions, ProgramAssembler};
//! use bumpalo::Bump;
//!
//! let module = Module::parse(source)?;
//! let arena = Bump::new();
//! let mut session = CompilationSession::new(&arena);
//! let program = ProgramAssembler::new(&mut session, &module, AssembleOptions::default())
//!     .assemble()?;
//! println!("{}", program.render_text());
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Errors, address descriptors, slot allocation, type layout, session
//! - [`ir`] - The input IR model, its textual reader and FileCheck-style tests
//! - [`lower`] - Per-instruction lowering into per-block code
//! - [`linearize`] - Block layout, merge stores and branch resolution
//! - [`program`] - Whole-program assembly, call linking and renderings
//! - [`target`] - Target opcodes and instruction records

pub mod core;
pub mod ir;
pub mod linearize;
pub mod lower;
pub mod program;
pub mod target;

pub use crate::core::{
    AddressDescriptor, CompilationSession, CompileError, CompileResult, SessionStats, TypeLayout,
};
pub use crate::ir::Module;
pub use crate::linearize::ControlFlowLinearizer;
pub use crate::lower::{FunctionLowering, LoweredFunction};
pub use crate::program::{AssembleOptions, Artifact, OutputFormat, Program, ProgramAssembler};
pub use crate::target::{Instruction, Opcode, Operand};

use bumpalo::Bump;

/// Parse and assemble `source`, returning the output artifact.
pub fn compile(source: &str, options: &AssembleOptions) -> CompileResult<Artifact> {
    let module = Module::parse(source)?;
    let arena = Bump::new();
    let mut session = CompilationSession::new(&arena);
    let program = ProgramAssembler::new(&mut session, &module, options.clone()).assemble()?;
    Ok(program.to_artifact())
}

/// Parse, assemble and render `source` in one step.
pub fn compile_to_string(
    source: &str,
    options: &AssembleOptions,
    format: OutputFormat,
) -> CompileResult<String> {
    let module = Module::parse(source)?;
    let arena = Bump::new();
    let mut session = CompilationSession::new(&arena);
    let program = ProgramAssembler::new(&mut session, &module, options.clone()).assemble()?;
    program.render(format)
}
