// This module implements instruction lowering: for each function it reserves the fixed
// frame slots (return value, return address, arguments), then walks every basic block in
// declaration order and translates each source instruction into zero or more target
// instructions, recording a descriptor for every value it defines in the session's value
// table. Dispatch is an exhaustive match over the closed InstKind enumeration; the
// per-opcode rules live in the memory, arith, compare and call submodules. Control-flow
// terminators are not emitted here: a block only remembers its pending exit, and the
// linearizer decides later whether a transfer instruction is needed at all.

//! Per-block instruction lowering.

use crate::core::{
    AddressDescriptor, CompilationSession, CompileError, CompileResult, Location, TypeLayout,
    ValueKey,
};
use crate::ir::{BlockId, ConstGep, FuncId, InstId, InstKind, Module, Value};
use crate::target::{Instruction, Opcode, Operand};

mod arith;
mod call;
mod compare;
mod memory;

/// Pending control transfer of a block, resolved by the linearizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Jump(BlockId),
    Branch {
        cond: AddressDescriptor,
        if_true: BlockId,
        if_false: BlockId,
    },
}

impl Exit {
    /// Successors in declaration order of the branch, without duplicates.
    pub fn successors(&self) -> Vec<BlockId> {
        match *self {
            Exit::Jump(target) => vec![target],
            Exit::Branch {
                if_true, if_false, ..
            } => {
                if if_true == if_false {
                    vec![if_true]
                } else {
                    vec![if_true, if_false]
                }
            }
        }
    }
}

/// Position of one target instruction inside a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodePosition {
    pub block: BlockId,
    pub index: u32,
}

/// Fixed per-function slots shared by every call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionFrame {
    pub return_value: AddressDescriptor,
    pub return_address: u32,
    pub args: Vec<AddressDescriptor>,
}

#[derive(Debug, Clone)]
pub struct LoweredBlock<'arena> {
    pub name: &'arena str,
    pub code: Vec<Instruction>,
    pub exit: Option<Exit>,
    /// Body is exactly one unconditional jump.
    pub redundant: bool,
    /// Phi instructions owned by this block.
    pub merges: Vec<InstId>,
    /// Offset from the function start; assigned by the linearizer.
    pub offset: Option<u32>,
}

impl LoweredBlock<'_> {
    pub fn len(&self) -> u32 {
        self.code.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct LoweredFunction<'arena> {
    pub id: FuncId,
    pub name: &'arena str,
    pub frame: FunctionFrame,
    pub blocks: Vec<LoweredBlock<'arena>>,
    /// Every `jmp_ind` emitted for a return.
    pub exits: Vec<CodePosition>,
    /// Absolute index of the first instruction; assigned by the assembler.
    pub start: u32,
    /// Instruction count after linearization.
    pub len: u32,
}

impl LoweredFunction<'_> {
    pub fn block(&self, id: BlockId) -> &LoweredBlock<'_> {
        &self.blocks[id.0 as usize]
    }

    pub fn instruction_mut(&mut self, at: CodePosition) -> Option<&mut Instruction> {
        self.blocks
            .get_mut(at.block.0 as usize)?
            .code
            .get_mut(at.index as usize)
    }

    /// Absolute instruction index of a position, once offsets are assigned.
    pub fn absolute(&self, at: CodePosition) -> Option<u32> {
        let offset = self.blocks.get(at.block.0 as usize)?.offset?;
        Some(self.start + offset + at.index)
    }

    /// Instructions in final order, with their absolute indices.
    pub fn instructions(&self) -> impl Iterator<Item = (u32, &Instruction)> + '_ {
        self.blocks
            .iter()
            .filter(|block| !block.redundant)
            .flat_map(move |block| {
                let base = self.start + block.offset.unwrap_or(0);
                block
                    .code
                    .iter()
                    .enumerate()
                    .map(move |(i, inst)| (base + i as u32, inst))
            })
    }
}

/// Descriptor of a source value in the context of function `func`.
pub fn resolve_value(
    session: &CompilationSession<'_>,
    module: &Module,
    func: FuncId,
    value: &Value,
) -> CompileResult<AddressDescriptor> {
    match value {
        Value::Const(c) => Ok(AddressDescriptor::constant(*c)),
        Value::Inst(id) => session.lookup(ValueKey::Inst(*id)).ok_or_else(|| {
            let name = module.inst(*id).name.as_deref().unwrap_or("<unnamed>");
            CompileError::invariant(format!("use of %{name} before its definition"))
        }),
        Value::Arg(idx) => session.lookup(ValueKey::Arg(func, *idx)).ok_or_else(|| {
            CompileError::invariant(format!("argument {idx} has no slot"))
        }),
        Value::Global(id) => session
            .lookup(ValueKey::Global(*id))
            .ok_or_else(|| global_without_slot(module, *id)),
        Value::ConstGep(expr) => fold_constant_gep(session, module, expr),
    }
}

fn global_without_slot(module: &Module, id: crate::ir::GlobalId) -> CompileError {
    let global = module.global(id);
    if global.constant {
        CompileError::unsupported(format!("reference to constant global @{}", global.name))
    } else {
        CompileError::invariant(format!("global @{} has no slot", global.name))
    }
}

/// Fold a constant address expression into a literal descriptor.
pub fn fold_constant_gep(
    session: &CompilationSession<'_>,
    module: &Module,
    expr: &ConstGep,
) -> CompileResult<AddressDescriptor> {
    let base = session
        .lookup(ValueKey::Global(expr.base))
        .ok_or_else(|| global_without_slot(module, expr.base))?;
    let (offset, _) = TypeLayout::constant_offset(&expr.source_ty, &expr.indices)?;
    Ok(AddressDescriptor {
        literal: true,
        ..base.offset(offset)?
    })
}

/// Store `src` into the cell addressed by `dest`.
///
/// Known values (constants and literal addresses) become `store_const`;
/// runtime values are copied with `mov`.
pub fn store_to_cell(dest: Operand, src: AddressDescriptor) -> Instruction {
    if src.is_constant() {
        Instruction::new(Opcode::StoreConst, dest, src.slot, Operand::ZERO)
    } else if src.literal {
        Instruction::new(Opcode::StoreConst, dest, src, Operand::ZERO)
    } else {
        Instruction::new(Opcode::Mov, dest, src, Operand::ZERO)
    }
}

/// Address of the cell a non-literal descriptor reads from.
pub fn cell_address(value: AddressDescriptor) -> AddressDescriptor {
    AddressDescriptor {
        slot: value.slot,
        indirection: value.indirection + 1,
        literal: true,
    }
}

/// Lowers one function's blocks into target code.
pub struct FunctionLowering<'s, 'arena, 'm> {
    session: &'s mut CompilationSession<'arena>,
    module: &'m Module,
    func: FuncId,
    frame: FunctionFrame,
    location: Location,
    block: BlockId,
    code: Vec<Instruction>,
    exit: Option<Exit>,
    merges: Vec<InstId>,
    exits: Vec<CodePosition>,
}

impl<'s, 'arena, 'm> FunctionLowering<'s, 'arena, 'm> {
    /// Reserve the frame slots of `func` and prepare to lower its body.
    pub fn new(
        session: &'s mut CompilationSession<'arena>,
        module: &'m Module,
        func: FuncId,
    ) -> CompileResult<Self> {
        let function = module.function(func);
        let return_value = session.alloc_cell(function.ret.pointer_depth())?;
        let return_address = session.alloc(1)?;
        let mut args = Vec::with_capacity(function.params.len());
        for (idx, param) in function.params.iter().enumerate() {
            let desc = AddressDescriptor::variable(&param.ty, session.alloc(1)?);
            session.bind(ValueKey::Arg(func, idx as u32), desc)?;
            args.push(desc);
        }
        log::debug!(
            "frame for @{}: return value {}, return address {}, {} argument slot(s)",
            function.name,
            return_value,
            return_address,
            args.len()
        );

        Ok(Self {
            session,
            module,
            func,
            frame: FunctionFrame {
                return_value,
                return_address,
                args,
            },
            location: Location::in_function(&function.name),
            block: BlockId(0),
            code: Vec::new(),
            exit: None,
            merges: Vec::new(),
            exits: Vec::new(),
        })
    }

    pub fn frame(&self) -> &FunctionFrame {
        &self.frame
    }

    /// Lower every block in declaration order.
    pub fn lower(mut self) -> CompileResult<LoweredFunction<'arena>> {
        let module = self.module;
        let function = module.function(self.func);
        log::debug!("lowering function @{}", function.name);

        let mut blocks = Vec::with_capacity(function.blocks.len());
        for (idx, block) in function.blocks.iter().enumerate() {
            self.block = BlockId(idx as u32);
            let redundant = idx > 0
                && block.insts.len() == 1
                && matches!(module.inst(block.insts[0]).kind, InstKind::Br { .. });

            for &inst in &block.insts {
                self.lower_inst(inst).map_err(|e| {
                    e.located(&self.location.clone().at_line(module.inst(inst).line))
                })?;
            }

            log::trace!(
                "block {}: {} instruction(s){}",
                block.name,
                self.code.len(),
                if redundant { ", redundant" } else { "" }
            );
            self.session.stats_mut().blocks_lowered += 1;
            blocks.push(LoweredBlock {
                name: self.session.intern_str(&block.name),
                code: std::mem::take(&mut self.code),
                exit: self.exit.take(),
                redundant,
                merges: std::mem::take(&mut self.merges),
                offset: None,
            });
        }

        self.session.stats_mut().functions_lowered += 1;
        Ok(LoweredFunction {
            id: self.func,
            name: self.session.intern_str(&function.name),
            frame: self.frame,
            blocks,
            exits: self.exits,
            start: 0,
            len: 0,
        })
    }

    fn lower_inst(&mut self, id: InstId) -> CompileResult<()> {
        if self.exit.is_some() {
            return Err(CompileError::invariant("instruction after block terminator"));
        }
        let module = self.module;
        match &module.inst(id).kind {
            InstKind::Alloca { allocated } => self.lower_alloca(id, allocated),
            InstKind::Load { ptr, .. } => self.lower_load(id, ptr),
            InstKind::Store { value, ptr, .. } => self.lower_store(value, ptr),
            InstKind::Binary { op, lhs, rhs, .. } => self.lower_binary(id, *op, lhs, rhs),
            InstKind::ICmp { pred, lhs, rhs } => self.lower_icmp(id, *pred, lhs, rhs),
            InstKind::Cast { op, value, .. } => self.lower_cast(id, *op, value),
            InstKind::GetElementPtr {
                source_ty,
                base,
                indices,
            } => self.lower_gep(id, source_ty, base, indices),
            InstKind::Call { callee, args } => self.lower_call(id, *callee, args),
            InstKind::Phi { ty, .. } => {
                let cell = self.session.alloc_cell(ty.pointer_depth())?;
                self.bind(id, cell)?;
                self.merges.push(id);
                Ok(())
            }
            InstKind::Br { target } => {
                self.exit = Some(Exit::Jump(*target));
                Ok(())
            }
            InstKind::CondBr {
                cond,
                if_true,
                if_false,
            } => {
                let cond = self.resolve(cond)?;
                self.exit = Some(if cond.is_constant() {
                    Exit::Jump(if cond.slot != 0 { *if_true } else { *if_false })
                } else {
                    Exit::Branch {
                        cond,
                        if_true: *if_true,
                        if_false: *if_false,
                    }
                });
                Ok(())
            }
            InstKind::Ret { value } => self.lower_ret(value.as_ref()),
        }
    }

    fn resolve(&self, value: &Value) -> CompileResult<AddressDescriptor> {
        resolve_value(self.session, self.module, self.func, value)
    }

    fn bind(&mut self, id: InstId, desc: AddressDescriptor) -> CompileResult<()> {
        self.session.bind(ValueKey::Inst(id), desc)
    }

    fn emit(&mut self, inst: Instruction) {
        log::trace!("  [{}] {}", self.code.len(), inst);
        self.session.record_emitted(inst.opcode);
        self.code.push(inst);
    }

    /// A fresh result cell for instruction `id`, at the pointer depth of its type.
    fn result_cell(&mut self, id: InstId) -> CompileResult<AddressDescriptor> {
        let depth = self.result_depth(id);
        self.session.alloc_cell(depth)
    }

    fn result_depth(&self, id: InstId) -> u32 {
        self.module
            .result_type(id)
            .map(|ty| ty.pointer_depth())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;

    fn lower_first(text: &str) -> (Module, Vec<Vec<Instruction>>) {
        let module = Module::parse(text).unwrap();
        let arena = Bump::new();
        let mut session = CompilationSession::new(&arena);
        let lowered = FunctionLowering::new(&mut session, &module, FuncId(0))
            .unwrap()
            .lower()
            .unwrap();
        let code = lowered.blocks.iter().map(|b| b.code.clone()).collect();
        (module, code)
    }

    #[test]
    fn test_frame_slots_come_first() {
        let module = Module::parse(
            "define i32 @f(i32 %a, i32* %p) {\nentry:\n  ret i32 %a\n}\n",
        )
        .unwrap();
        let arena = Bump::new();
        let mut session = CompilationSession::new(&arena);
        let lowering = FunctionLowering::new(&mut session, &module, FuncId(0)).unwrap();
        let frame = lowering.frame().clone();
        assert_eq!(frame.return_value, AddressDescriptor::cell(0, 0));
        assert_eq!(frame.return_address, 1);
        assert_eq!(frame.args, vec![AddressDescriptor::cell(2, 0), AddressDescriptor::cell(3, 1)]);
    }

    #[test]
    fn test_redundant_block_detection() {
        let module = Module::parse(
            "define void @f() {\nentry:\n  br label %a\na:\n  br label %b\nb:\n  ret void\n}\n",
        )
        .unwrap();
        let arena = Bump::new();
        let mut session = CompilationSession::new(&arena);
        let lowered = FunctionLowering::new(&mut session, &module, FuncId(0))
            .unwrap()
            .lower()
            .unwrap();
        let flags: Vec<bool> = lowered.blocks.iter().map(|b| b.redundant).collect();
        assert_eq!(flags, vec![false, true, false]);
    }

    #[test]
    fn test_constant_condition_becomes_jump() {
        let module = Module::parse(
            "define void @f() {\nentry:\n  br i1 true, label %a, label %b\na:\n  ret void\nb:\n  ret void\n}\n",
        )
        .unwrap();
        let arena = Bump::new();
        let mut session = CompilationSession::new(&arena);
        let lowered = FunctionLowering::new(&mut session, &module, FuncId(0))
            .unwrap()
            .lower()
            .unwrap();
        assert_eq!(lowered.blocks[0].exit, Some(Exit::Jump(BlockId(1))));
    }

    #[test]
    fn test_casts_alias_their_operand() {
        let (_, code) = lower_first(
            "define i64 @f(i8 %a) {\nentry:\n  %w = zext i8 %a to i64\n  %t = trunc i64 %w to i32\n  %s = sext i32 %t to i64\n  ret i64 %s\n}\n",
        );
        // Only the return sequence is emitted.
        assert_eq!(code[0].len(), 2);
        assert_eq!(code[0][0].opcode, Opcode::Mov);
        assert_eq!(code[0][0].a, Operand::Desc(AddressDescriptor::cell(2, 0)));
    }

    #[test]
    fn test_store_to_cell_kinds() {
        let dest = Operand::Desc(AddressDescriptor::address_of(9));
        assert_eq!(
            store_to_cell(dest, AddressDescriptor::constant(4)),
            Instruction::new(Opcode::StoreConst, dest, 4i64, Operand::ZERO)
        );
        let addr = AddressDescriptor::address_of(2);
        assert_eq!(store_to_cell(dest, addr).opcode, Opcode::StoreConst);
        assert_eq!(store_to_cell(dest, AddressDescriptor::cell(3, 0)).opcode, Opcode::Mov);
    }
}
