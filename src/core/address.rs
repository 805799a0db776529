//! Address descriptors and the flat slot allocator.
//!
//! The target has a single array of word-sized cells. Every source value is
//! reached through an [`AddressDescriptor`]: a base slot, a count of runtime
//! dereferences, and whether the base itself is known at compile time.
//!
//! - literal, indirection 0: the base *is* the value (a constant)
//! - literal, indirection n: `base` is a known address; n dereferences reach the scalar
//! - non-literal: read slot `base` at run time first, then dereference
//!   `indirection` more times
//!
//! For every value the indirection equals the pointer depth of its type, so
//! constants and integer temporaries sit at 0 and addresses of cells at 1.

use serde::Serialize;
use std::fmt;

use super::error::{CompileError, CompileResult};
use super::layout::TypeLayout;
use crate::ir::Type;

/// Compiler-side encoding of how to reach a value at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct AddressDescriptor {
    pub slot: i64,
    pub indirection: u32,
    pub literal: bool,
}

impl AddressDescriptor {
    /// A compile-time constant.
    pub const fn constant(value: i64) -> Self {
        Self {
            slot: value,
            indirection: 0,
            literal: true,
        }
    }

    /// A value that lives in a freshly allocated cell.
    pub const fn cell(slot: u32, indirection: u32) -> Self {
        Self {
            slot: slot as i64,
            indirection,
            literal: false,
        }
    }

    /// The known address of a cell.
    pub const fn address_of(slot: u32) -> Self {
        Self {
            slot: slot as i64,
            indirection: 1,
            literal: true,
        }
    }

    /// Describe a value of type `ty` stored in slot `base`.
    ///
    /// Pointer types contribute one level per pointer layer; non-pointer
    /// values occupy exactly one cell at indirection 0.
    pub fn variable(ty: &Type, base: u32) -> Self {
        Self::cell(base, ty.pointer_depth())
    }

    /// Same base shifted by a compile-time offset.
    pub fn offset(self, by: i64) -> CompileResult<Self> {
        let slot = self.slot.checked_add(by).ok_or_else(|| {
            CompileError::unsupported(format!("address offset {by} from {self}"))
        })?;
        Ok(Self { slot, ..self })
    }

    /// The descriptor produced by reading through this one once.
    pub fn dereferenced(self) -> CompileResult<Self> {
        let indirection = self.indirection.checked_sub(1).ok_or_else(|| {
            CompileError::invariant(format!("load through non-pointer descriptor {self}"))
        })?;
        Ok(Self {
            slot: self.slot,
            indirection,
            literal: false,
        })
    }

    pub fn is_constant(&self) -> bool {
        self.literal && self.indirection == 0
    }
}

impl fmt::Display for AddressDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for _ in 0..self.indirection {
            f.write_str("*")?;
        }
        write!(f, "{}", self.slot)?;
        if self.literal {
            f.write_str("d")?;
        }
        Ok(())
    }
}

/// Monotonic bump allocator over the shared slot space.
///
/// Slots are never freed or reused.
#[derive(Debug, Clone, Default)]
pub struct SlotAllocator {
    next: u32,
}

impl SlotAllocator {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    /// Reserve `count` contiguous slots and return the first.
    pub fn allocate(&mut self, count: u32) -> CompileResult<u32> {
        let base = self.next;
        self.next = base
            .checked_add(count)
            .ok_or_else(|| CompileError::unsupported("program size: slot space exhausted"))?;
        Ok(base)
    }

    /// Number of slots handed out so far.
    pub fn allocated(&self) -> u32 {
        self.next
    }

    /// Reserve storage for an object of type `pointee` and describe its address.
    ///
    /// The descriptor is literal; its indirection is one for the address
    /// plus the pointer layers of the object's element type.
    pub fn allocate_object(&mut self, pointee: &Type) -> CompileResult<AddressDescriptor> {
        let (cells, element) = TypeLayout::layout(pointee)?;
        let cells = u32::try_from(cells)
            .map_err(|_| CompileError::unsupported(format!("object of type {pointee} (too large)")))?;
        let base = self.allocate(cells)?;
        Ok(AddressDescriptor {
            slot: base as i64,
            indirection: 1 + element.pointer_depth(),
            literal: true,
        })
    }
}
