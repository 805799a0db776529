// This module provides the compilation session, the single explicit context object that
// every lowering call receives. It owns the shared state of one whole-program translation:
// the slot allocator over the flat cell space, the value table mapping each source value
// to its address descriptor, the queue of call sites waiting for the link pass, and the
// statistics counters. Function and block names are interned in a bumpalo arena so that
// lowered functions can hand out &'arena str names with the session lifetime. The session
// is single-owner and mutated only by the deterministic traversal of the assembler.

//! Arena-based compilation session.

use bumpalo::Bump;
use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use std::collections::BTreeMap;
use std::fmt;

use super::address::{AddressDescriptor, SlotAllocator};
use super::error::{CompileError, CompileResult};
use crate::ir::{BlockId, FuncId, GlobalId, InstId, Type};
use crate::target::Opcode;

/// Stable identity of a source value, used as the value-table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKey {
    Inst(InstId),
    Arg(FuncId, u32),
    Global(GlobalId),
}

/// Opaque handle to a queued call sequence.
///
/// Records where the placeholder sequence starts so the link pass can
/// rewrite it once every function's start offset is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    pub caller: FuncId,
    pub block: BlockId,
    /// Index of the first argument store inside the block's code.
    pub position: u32,
    pub callee: FuncId,
    pub arg_count: u32,
}

/// Arena-based compilation session.
pub struct CompilationSession<'arena> {
    arena: &'arena Bump,
    interned_strings: HashMap<String, &'arena str>,
    slots: SlotAllocator,
    values: HashMap<ValueKey, AddressDescriptor>,
    calls: Vec<CallSite>,
    stats: SessionStats,
}

impl<'arena> CompilationSession<'arena> {
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            interned_strings: HashMap::new(),
            slots: SlotAllocator::new(),
            values: HashMap::new(),
            calls: Vec::new(),
            stats: SessionStats::default(),
        }
    }

    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Intern a string in the arena.
    pub fn intern_str(&mut self, s: &str) -> &'arena str {
        if let Some(&interned) = self.interned_strings.get(s) {
            return interned;
        }
        let interned = self.arena.alloc_str(s);
        self.interned_strings.insert(s.to_string(), interned);
        interned
    }

    /// Reserve `count` fresh slots.
    pub fn alloc(&mut self, count: u32) -> CompileResult<u32> {
        let base = self.slots.allocate(count)?;
        self.stats.slots_allocated += count as usize;
        Ok(base)
    }

    /// Reserve one fresh cell holding a value of the given pointer depth.
    pub fn alloc_cell(&mut self, indirection: u32) -> CompileResult<AddressDescriptor> {
        Ok(AddressDescriptor::cell(self.alloc(1)?, indirection))
    }

    pub fn slots(&self) -> &SlotAllocator {
        &self.slots
    }

    /// Reserve storage for an object of type `pointee` and describe its address.
    pub fn alloc_object(&mut self, pointee: &Type) -> CompileResult<AddressDescriptor> {
        let before = self.slots.allocated();
        let desc = self.slots.allocate_object(pointee)?;
        self.stats.slots_allocated += (self.slots.allocated() - before) as usize;
        Ok(desc)
    }

    /// Record the descriptor of a value. Each value is described exactly once.
    pub fn bind(&mut self, key: ValueKey, desc: AddressDescriptor) -> CompileResult<()> {
        match self.values.entry(key) {
            Entry::Occupied(_) => Err(CompileError::invariant(format!(
                "value {key:?} described twice"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(desc);
                Ok(())
            }
        }
    }

    pub fn lookup(&self, key: ValueKey) -> Option<AddressDescriptor> {
        self.values.get(&key).copied()
    }

    pub fn queue_call(&mut self, site: CallSite) {
        self.stats.calls_queued += 1;
        log::debug!(
            "call site queued: caller {:?} block {:?} at {}",
            site.caller,
            site.block,
            site.position
        );
        self.calls.push(site);
    }

    /// Hand over every queued call site; the queue is left empty.
    pub fn take_calls(&mut self) -> Vec<CallSite> {
        std::mem::take(&mut self.calls)
    }

    pub fn pending_calls(&self) -> usize {
        self.calls.len()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut SessionStats {
        &mut self.stats
    }

    pub fn record_emitted(&mut self, opcode: Opcode) {
        self.stats.instructions_emitted += 1;
        *self
            .stats
            .instruction_counts
            .entry(opcode.to_string())
            .or_insert(0) += 1;
    }
}

/// Compilation session statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    pub functions_lowered: usize,
    pub blocks_lowered: usize,
    pub redundant_blocks: usize,
    pub elided_jumps: usize,
    pub merge_stores: usize,
    pub instructions_emitted: usize,
    pub instruction_counts: BTreeMap<String, usize>,
    pub calls_queued: usize,
    pub calls_patched: usize,
    pub slots_allocated: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(f, "  Functions lowered: {}", self.functions_lowered)?;
        writeln!(f, "  Blocks lowered: {}", self.blocks_lowered)?;
        writeln!(f, "  Redundant blocks: {}", self.redundant_blocks)?;
        writeln!(f, "  Elided jumps: {}", self.elided_jumps)?;
        writeln!(f, "  Merge stores: {}", self.merge_stores)?;
        writeln!(f, "  Instructions emitted: {}", self.instructions_emitted)?;
        writeln!(f, "  Call sites patched: {}/{}", self.calls_patched, self.calls_queued)?;
        writeln!(f, "  Slots allocated: {}", self.slots_allocated)?;

        if !self.instruction_counts.is_empty() {
            writeln!(f, "  Instruction breakdown:")?;
            let mut sorted: Vec<_> = self.instruction_counts.iter().collect();
            sorted.sort_by_key(|(_, count)| std::cmp::Reverse(**count));

            for (opcode, count) in sorted.into_iter().take(10) {
                writeln!(f, "    {}: {}", opcode, count)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_returns_same_str() {
        let arena = Bump::new();
        let mut session = CompilationSession::new(&arena);
        let a = session.intern_str("main");
        let b = session.intern_str("main");
        assert!(std::ptr::eq(a, b));
    }

    #[test]
    fn test_bind_rejects_second_descriptor() {
        let arena = Bump::new();
        let mut session = CompilationSession::new(&arena);
        let key = ValueKey::Inst(InstId(3));
        session.bind(key, AddressDescriptor::cell(0, 0)).unwrap();
        assert!(session.bind(key, AddressDescriptor::cell(1, 0)).is_err());
        assert_eq!(session.lookup(key), Some(AddressDescriptor::cell(0, 0)));
    }

    #[test]
    fn test_alloc_tracks_stats() {
        let arena = Bump::new();
        let mut session = CompilationSession::new(&arena);
        assert_eq!(session.alloc(4).unwrap(), 0);
        let cell = session.alloc_cell(1).unwrap();
        assert_eq!(cell, AddressDescriptor::cell(4, 1));
        assert_eq!(session.stats().slots_allocated, 5);
        assert_eq!(session.slots().allocated(), 5);
    }

    #[test]
    fn test_take_calls_drains_queue() {
        let arena = Bump::new();
        let mut session = CompilationSession::new(&arena);
        session.queue_call(CallSite {
            caller: FuncId(0),
            block: BlockId(0),
            position: 2,
            callee: FuncId(1),
            arg_count: 1,
        });
        assert_eq!(session.pending_calls(), 1);
        assert_eq!(session.take_calls().len(), 1);
        assert_eq!(session.pending_calls(), 0);
    }
}
