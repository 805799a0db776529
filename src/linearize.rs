// This module implements control-flow linearization for one lowered function. Blocks keep
// their declaration order. The layout pass decides, block by block, whether the pending
// exit needs a transfer instruction at all (a jump into the next laid-out block is
// elided), appends the merge stores every successor's phi cells require, and assigns
// each non-redundant block its offset from the function start. Redundant blocks (a
// lone unconditional branch) get no offset; edges into them are followed to the first
// real block. The link pass runs once the function's absolute start is known and
// appends the final jmp/br to every block that kept its exit.

//! Block ordering, jump elision and merge resolution.

use crate::core::{CompilationSession, CompileError, CompileResult, Location, ValueKey};
use crate::ir::{BlockId, InstKind, Module};
use crate::lower::{cell_address, resolve_value, store_to_cell, Exit, LoweredBlock, LoweredFunction};
use crate::target::{Instruction, Operand};

pub struct ControlFlowLinearizer;

impl ControlFlowLinearizer {
    /// Elide jumps, append merge stores and assign block offsets.
    ///
    /// Returns the function's final instruction count, including the
    /// transfer instructions the link pass will append.
    pub fn layout(
        function: &mut LoweredFunction<'_>,
        module: &Module,
        session: &mut CompilationSession<'_>,
    ) -> CompileResult<u32> {
        let location = Location::in_function(function.name);
        let mut offset = 0u32;

        for idx in 0..function.blocks.len() {
            if function.blocks[idx].redundant {
                session.stats_mut().redundant_blocks += 1;
                continue;
            }
            let from = BlockId(idx as u32);
            function.blocks[idx].offset = Some(offset);

            let Some(exit) = function.blocks[idx].exit else {
                offset += function.blocks[idx].len();
                continue;
            };

            let merges = Self::merge_stores(function, module, session, from, &exit)
                .map_err(|e| e.located(&location))?;
            session.stats_mut().merge_stores += merges.len();

            let elide = match exit {
                Exit::Jump(target) => {
                    let (resolved, _) = resolve_target(&function.blocks, from, target)
                        .map_err(|e| e.located(&location))?;
                    next_laid_out(&function.blocks, idx) == Some(resolved)
                }
                Exit::Branch { .. } => false,
            };

            let block = &mut function.blocks[idx];
            for inst in merges {
                session.record_emitted(inst.opcode);
                block.code.push(inst);
            }
            if elide {
                log::trace!("block {}: jump into next block elided", block.name);
                session.stats_mut().elided_jumps += 1;
                block.exit = None;
                offset += block.len();
            } else {
                offset += block.len() + 1;
            }
        }

        function.len = offset;
        log::debug!("@{}: {} instruction(s) after layout", function.name, offset);
        Ok(offset)
    }

    /// Stores of this block's incoming values into every successor's merge cells.
    fn merge_stores(
        function: &LoweredFunction<'_>,
        module: &Module,
        session: &CompilationSession<'_>,
        from: BlockId,
        exit: &Exit,
    ) -> CompileResult<Vec<Instruction>> {
        let mut reached: Vec<(BlockId, BlockId)> = Vec::new();
        for successor in exit.successors() {
            let (target, via) = resolve_target(&function.blocks, from, successor)?;
            if let Some(&(_, first_via)) = reached.iter().find(|(seen, _)| *seen == target) {
                if first_via != via && !function.block(target).merges.is_empty() {
                    return Err(CompileError::unsupported(format!(
                        "merge block {} reached through two distinct edges of one branch",
                        function.block(target).name
                    )));
                }
                continue;
            }
            reached.push((target, via));
        }

        let mut stores = Vec::new();
        for (target, via) in reached {
            for &phi in &function.block(target).merges {
                let inst = module.inst(phi);
                let InstKind::Phi { incoming, .. } = &inst.kind else {
                    return Err(CompileError::invariant("merge list holds a non-phi instruction"));
                };
                let name = inst.name.as_deref().unwrap_or("<unnamed>");
                let (value, _) = incoming.iter().find(|(_, block)| *block == via).ok_or_else(|| {
                    CompileError::invariant(format!(
                        "phi %{name} has no incoming value for block {}",
                        function.block(via).name
                    ))
                    .located(&Location::default().at_line(inst.line))
                })?;
                let cell = session.lookup(ValueKey::Inst(phi)).ok_or_else(|| {
                    CompileError::invariant(format!("phi %{name} has no merge cell"))
                })?;
                let src = resolve_value(session, module, function.id, value)?;
                stores.push(store_to_cell(Operand::from(cell_address(cell)), src));
            }
        }
        Ok(stores)
    }

    /// Append the final transfer instruction of every block that kept its exit.
    pub fn link(
        function: &mut LoweredFunction<'_>,
        session: &mut CompilationSession<'_>,
    ) -> CompileResult<()> {
        let location = Location::in_function(function.name);
        let start = function.start;

        for idx in 0..function.blocks.len() {
            let block = &function.blocks[idx];
            if block.redundant {
                continue;
            }
            let Some(exit) = block.exit else { continue };
            let from = BlockId(idx as u32);
            let transfer = match exit {
                Exit::Jump(target) => Instruction::jmp(
                    block_address(&function.blocks, start, from, target)
                        .map_err(|e| e.located(&location))?,
                ),
                Exit::Branch {
                    cond,
                    if_true,
                    if_false,
                } => {
                    let on_true = block_address(&function.blocks, start, from, if_true)
                        .map_err(|e| e.located(&location))?;
                    let on_false = block_address(&function.blocks, start, from, if_false)
                        .map_err(|e| e.located(&location))?;
                    if on_true == on_false {
                        Instruction::jmp(on_true)
                    } else {
                        Instruction::br(on_true, on_false, cond)
                    }
                }
            };
            log::trace!("block {}: {}", function.blocks[idx].name, transfer);
            session.record_emitted(transfer.opcode);
            function.blocks[idx].code.push(transfer);
        }

        let emitted: u32 = function
            .blocks
            .iter()
            .filter(|block| !block.redundant)
            .map(LoweredBlock::len)
            .sum();
        if emitted != function.len {
            return Err(CompileError::invariant(format!(
                "linked length {emitted} differs from laid-out length {}",
                function.len
            ))
            .located(&location));
        }
        Ok(())
    }
}

/// Follow `target` through redundant blocks.
///
/// Returns the first non-redundant block reached and the block the final hop
/// leaves from (the predecessor its phi instructions name).
pub fn resolve_target(
    blocks: &[LoweredBlock<'_>],
    from: BlockId,
    target: BlockId,
) -> CompileResult<(BlockId, BlockId)> {
    let mut via = from;
    let mut current = target;
    for _ in 0..=blocks.len() {
        let block = blocks.get(current.0 as usize).ok_or_else(|| {
            CompileError::invariant(format!("branch to unknown block #{}", current.0))
        })?;
        if !block.redundant {
            return Ok((current, via));
        }
        match block.exit {
            Some(Exit::Jump(next)) => {
                via = current;
                current = next;
            }
            _ => {
                return Err(CompileError::invariant(format!(
                    "redundant block {} has no unconditional exit",
                    block.name
                )))
            }
        }
    }
    Err(CompileError::invariant(format!(
        "cycle of redundant blocks through {}",
        blocks[target.0 as usize].name
    )))
}

/// Absolute instruction index of the block a branch to `target` lands on.
fn block_address(
    blocks: &[LoweredBlock<'_>],
    start: u32,
    from: BlockId,
    target: BlockId,
) -> CompileResult<u32> {
    let (resolved, _) = resolve_target(blocks, from, target)?;
    let block = &blocks[resolved.0 as usize];
    let offset = block
        .offset
        .ok_or_else(|| CompileError::invariant(format!("block {} has no offset", block.name)))?;
    Ok(start + offset)
}

/// First non-redundant block after `idx` in declaration order.
fn next_laid_out(blocks: &[LoweredBlock<'_>], idx: usize) -> Option<BlockId> {
    blocks
        .iter()
        .enumerate()
        .skip(idx + 1)
        .find(|(_, block)| !block.redundant)
        .map(|(i, _)| BlockId(i as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AddressDescriptor;
    use crate::ir::FuncId;
    use crate::lower::FunctionLowering;
    use crate::target::Opcode;
    use bumpalo::Bump;

    fn linearize(text: &str, start: u32) -> CompileResult<Vec<(String, Vec<Instruction>, Option<u32>)>> {
        let module = Module::parse(text)?;
        let arena = Bump::new();
        let mut session = CompilationSession::new(&arena);
        let mut function = FunctionLowering::new(&mut session, &module, FuncId(0))?.lower()?;
        ControlFlowLinearizer::layout(&mut function, &module, &mut session)?;
        function.start = start;
        ControlFlowLinearizer::link(&mut function, &mut session)?;
        Ok(function
            .blocks
            .iter()
            .map(|b| (b.name.to_string(), b.code.clone(), b.offset))
            .collect())
    }

    #[test]
    fn test_fallthrough_jump_is_elided() {
        let blocks = linearize(
            "define void @f() {\nentry:\n  %v = alloca i32\n  store i32 1, i32* %v\n  br label %next\nnext:\n  ret void\n}\n",
            0,
        )
        .unwrap();
        assert_eq!(blocks[0].1.len(), 1);
        assert!(blocks[0].1.iter().all(|i| !i.opcode.is_control_transfer()));
        assert_eq!(blocks[1].2, Some(1));
    }

    #[test]
    fn test_backward_jump_is_kept() {
        let blocks = linearize(
            "define void @f(i1 %c) {\nentry:\n  br label %loop\nloop:\n  br i1 %c, label %loop, label %done\ndone:\n  ret void\n}\n",
            10,
        )
        .unwrap();
        // entry falls through; loop branches back to itself at 10 or on to done at 11.
        assert!(blocks[0].1.is_empty());
        assert_eq!(blocks[1].2, Some(0));
        assert_eq!(blocks[1].1, vec![Instruction::br(10, 11, AddressDescriptor::cell(2, 0))]);
    }

    #[test]
    fn test_redundant_chain_is_skipped() {
        let blocks = linearize(
            "define void @f(i1 %c) {\nentry:\n  br i1 %c, label %hop, label %out\nhop:\n  br label %hop2\nhop2:\n  br label %out\nout:\n  ret void\n}\n",
            0,
        )
        .unwrap();
        assert_eq!(blocks[1].2, None);
        assert_eq!(blocks[2].2, None);
        // Both edges reach `out`, so the branch collapses into one jump.
        assert_eq!(blocks[0].1, vec![Instruction::jmp(1)]);
        assert_eq!(blocks[3].2, Some(1));
    }

    #[test]
    fn test_merge_stores_precede_transfer() {
        let blocks = linearize(
            "define i32 @f(i1 %c, i32 %x) {\nentry:\n  br i1 %c, label %then, label %join\nthen:\n  %y = add i32 %x, 1\n  br label %join\njoin:\n  %r = phi i32 [ 0, %entry ], [ %y, %then ]\n  ret i32 %r\n}\n",
            0,
        )
        .unwrap();
        // rv 0, ra 1, %c 2, %x 3, %y 4, %r 5.
        let entry = &blocks[0].1;
        assert_eq!(entry[0].to_artifact(), "('store_const', 5, 0, 0)");
        assert_eq!(entry[1].opcode, Opcode::Br);
        let then = &blocks[1].1;
        assert_eq!(then.last().map(|i| i.to_artifact()), Some("('mov', 5, 4, 0)".to_string()));
        // `then` falls through into `join`.
        assert_eq!(then.len(), 2);
    }

    #[test]
    fn test_missing_phi_incoming_is_invariant_violation() {
        let err = linearize(
            "define i32 @f() {\nentry:\n  br label %join\njoin:\n  %r = phi i32 [ 1, %other ]\n  ret i32 %r\nother:\n  br label %join\n}\n",
            0,
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::InvariantViolation { .. }));
    }

    #[test]
    fn test_redundant_cycle_is_invariant_violation() {
        let err = linearize(
            "define void @f() {\nentry:\n  br label %a\na:\n  br label %b\nb:\n  br label %a\n}\n",
            0,
        )
        .unwrap_err();
        assert!(err.to_string().contains("cycle"), "{err}");
    }
}
