// This module is the hub of the backend's shared infrastructure. It groups the pieces
// every later stage builds on: the error taxonomy, the address-descriptor encoding and
// the monotonic slot allocator over the flat cell space, the flat type layout, and the
// arena-based compilation session that threads all mutable state through lowering.

//! Core infrastructure shared by every lowering stage.
//!
//! # Key Components
//!
//! - [`error`]: `CompileError` taxonomy and `CompileResult`
//! - [`address`]: `AddressDescriptor` and `SlotAllocator`
//! - [`layout`]: `TypeLayout`, cell counts and field/element offsets
//! - [`session`]: `CompilationSession`, the explicit lowering context

pub mod address;
pub mod error;
pub mod layout;
pub mod session;

pub use address::{AddressDescriptor, SlotAllocator};
pub use error::{CompileError, CompileResult, Location};
pub use layout::{IndexStep, TypeLayout};
pub use session::{CallSite, CompilationSession, SessionStats, ValueKey};
