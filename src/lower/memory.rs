//! Local allocation, loads, stores and address arithmetic.
//!
//! Addresses known at compile time stay in literal descriptors and fold
//! without emitting code; only addresses that exist at run time produce
//! `load`, `store` and `add` instructions.

use super::arith::Known;
use super::{cell_address, store_to_cell, FunctionLowering};
use crate::core::layout::scaled_offset;
use crate::core::{AddressDescriptor, CompileError, CompileResult, IndexStep, TypeLayout};
use crate::ir::{InstId, Type, Value};
use crate::target::{Instruction, Opcode, Operand};

impl FunctionLowering<'_, '_, '_> {
    pub(super) fn lower_alloca(&mut self, id: InstId, allocated: &Type) -> CompileResult<()> {
        let desc = self.session.alloc_object(allocated)?;
        log::trace!("alloca {allocated} at {desc}");
        self.bind(id, desc)
    }

    /// The result takes the pointer depth of the loaded type; a field address
    /// carries its aggregate's depth, which may be lower.
    pub(super) fn lower_load(&mut self, id: InstId, ptr: &Value) -> CompileResult<()> {
        let src = self.resolve(ptr)?;
        let depth = self.result_depth(id);
        let loaded = AddressDescriptor {
            indirection: depth,
            ..src.dereferenced()?
        };
        if src.literal {
            // Known address: the value is whatever that slot holds.
            return self.bind(id, loaded);
        }
        let cell = self.session.alloc_cell(depth)?;
        self.emit(Instruction::new(
            Opcode::Load,
            cell_address(cell),
            Operand::ZERO,
            src,
        ));
        self.bind(id, cell)
    }

    pub(super) fn lower_store(&mut self, value: &Value, ptr: &Value) -> CompileResult<()> {
        let dest = self.resolve(ptr)?;
        let src = self.resolve(value)?;
        if dest.indirection == 0 {
            return Err(CompileError::invariant(format!(
                "store through non-pointer descriptor {dest}"
            )));
        }

        let inst = if dest.literal {
            store_to_cell(Operand::from(dest), src)
        } else if src.is_constant() {
            Instruction::new(Opcode::StoreConstInd, Operand::ZERO, src.slot, dest)
        } else if src.literal {
            Instruction::new(Opcode::StoreConstInd, Operand::ZERO, src, dest)
        } else {
            Instruction::new(Opcode::Store, Operand::ZERO, src, dest)
        };
        self.emit(inst);
        Ok(())
    }

    /// Address arithmetic over an index path.
    ///
    /// Constant indices accumulate into one offset; each runtime index is
    /// scaled by its stride (skipped for stride one) and added to the
    /// running address. The result keeps the base's indirection.
    pub(super) fn lower_gep(
        &mut self,
        id: InstId,
        source_ty: &Type,
        base: &Value,
        indices: &[Value],
    ) -> CompileResult<()> {
        let base = self.resolve(base)?;
        let mut offset = 0i64;
        let mut scaled = Vec::new();

        let mut ty = source_ty;
        for (position, index) in indices.iter().enumerate() {
            let step = if position == 0 {
                IndexStep::Element {
                    stride: TypeLayout::stride(source_ty)?,
                    elem: source_ty,
                }
            } else {
                TypeLayout::index_step(ty)?
            };
            let index = Known::classify(self.resolve(index)?);
            match (step, index) {
                (IndexStep::Element { stride, elem }, Known::Const(c)) => {
                    offset = scaled_offset(offset, c, stride)?;
                    ty = elem;
                }
                (IndexStep::Element { stride, elem }, Known::Runtime(idx)) => {
                    scaled.push((stride, idx));
                    ty = elem;
                }
                (IndexStep::Field { fields }, Known::Const(c)) => {
                    let (field_offset, field_ty) = TypeLayout::field(fields, c)?;
                    offset = scaled_offset(offset, 1, field_offset)?;
                    ty = field_ty;
                }
                (IndexStep::Field { .. }, Known::Runtime(_)) => {
                    return Err(CompileError::unsupported("runtime structure field index"));
                }
            }
        }

        let mut address = base;
        let mut pending = offset;
        if base.literal {
            address = base.offset(offset)?;
            pending = 0;
        }

        for (stride, idx) in scaled {
            let step = if stride == 1 {
                idx
            } else {
                let tmp = self.session.alloc_cell(0)?;
                self.emit(Instruction::new(
                    Opcode::MulConst,
                    cell_address(tmp),
                    stride,
                    idx,
                ));
                tmp
            };
            let sum = self.session.alloc_cell(base.indirection)?;
            let opcode = if address.literal {
                Opcode::AddConst
            } else {
                Opcode::Add
            };
            self.emit(Instruction::new(opcode, cell_address(sum), address, step));
            address = sum;
        }

        if pending != 0 {
            let sum = self.session.alloc_cell(base.indirection)?;
            self.emit(Instruction::new(
                Opcode::AddConst,
                cell_address(sum),
                pending,
                address,
            ));
            address = sum;
        }

        log::trace!("getelementptr resolved to {address}");
        self.bind(id, address)
    }
}

#[cfg(test)]
mod tests {
    use crate::core::{AddressDescriptor, CompilationSession, CompileError};
    use crate::ir::{FuncId, Module};
    use crate::lower::FunctionLowering;
    use crate::target::{Instruction, Opcode, Operand};
    use bumpalo::Bump;

    fn lower(text: &str) -> Result<Vec<Instruction>, CompileError> {
        let module = Module::parse(text)?;
        let arena = Bump::new();
        let mut session = CompilationSession::new(&arena);
        let lowered = FunctionLowering::new(&mut session, &module, FuncId(0))?.lower()?;
        Ok(lowered.blocks[0].code.clone())
    }

    fn addr(slot: u32) -> Operand {
        Operand::Desc(AddressDescriptor::address_of(slot))
    }

    #[test]
    fn test_local_load_aliases_slot() {
        // rv = 0, ra = 1, %v at 2.
        let code = lower(
            "define i32 @f() {\nentry:\n  %v = alloca i32\n  store i32 9, i32* %v\n  %x = load i32, i32* %v\n  ret i32 %x\n}\n",
        )
        .unwrap();
        assert_eq!(
            code,
            vec![
                Instruction::new(Opcode::StoreConst, addr(2), 9i64, Operand::ZERO),
                Instruction::new(Opcode::Mov, addr(0), AddressDescriptor::cell(2, 0), Operand::ZERO),
                Instruction::jmp_ind(AddressDescriptor::cell(1, 0)),
            ]
        );
    }

    #[test]
    fn test_load_through_argument_pointer() {
        // rv = 0, ra = 1, %p = 2; loaded value at 3.
        let code = lower(
            "define i32 @f(i32* %p) {\nentry:\n  %x = load i32, i32* %p\n  ret i32 %x\n}\n",
        )
        .unwrap();
        assert_eq!(
            code[0],
            Instruction::new(Opcode::Load, addr(3), Operand::ZERO, AddressDescriptor::cell(2, 1))
        );
    }

    #[test]
    fn test_indirect_stores() {
        let code = lower(
            "define void @f(i32* %p, i32 %v) {\nentry:\n  store i32 4, i32* %p\n  store i32 %v, i32* %p\n  ret void\n}\n",
        )
        .unwrap();
        let p = AddressDescriptor::cell(2, 1);
        assert_eq!(code[0], Instruction::new(Opcode::StoreConstInd, Operand::ZERO, 4i64, p));
        assert_eq!(
            code[1],
            Instruction::new(Opcode::Store, Operand::ZERO, AddressDescriptor::cell(3, 0), p)
        );
    }

    #[test]
    fn test_constant_gep_on_local_folds() {
        let code = lower(
            "define void @f() {\nentry:\n  %a = alloca [4 x [5 x i32]]\n  %e = getelementptr inbounds [4 x [5 x i32]], [4 x [5 x i32]]* %a, i64 0, i64 2, i64 3\n  store i32 1, i32* %e\n  ret void\n}\n",
        )
        .unwrap();
        // %a occupies slots 2 to 21; element [2][3] is 2 + 13.
        assert_eq!(code.len(), 2);
        assert_eq!(code[0], Instruction::new(Opcode::StoreConst, addr(15), 1i64, Operand::ZERO));
    }

    #[test]
    fn test_constant_gep_on_pointer_adds_offset() {
        let code = lower(
            "define void @f({ i32, i32 }* %s) {\nentry:\n  %b = getelementptr { i32, i32 }, { i32, i32 }* %s, i32 0, i32 1\n  store i32 0, i32* %b\n  ret void\n}\n",
        )
        .unwrap();
        let sum = AddressDescriptor::cell(3, 1);
        assert_eq!(code[0].to_artifact(), "('add_const', 3, 1, 2)");
        assert_eq!(code[0].a, Operand::Int(1));
        assert_eq!(code[1], Instruction::new(Opcode::StoreConstInd, Operand::ZERO, 0i64, sum));
    }

    #[test]
    fn test_runtime_index_scales_then_adds() {
        let code = lower(
            "define void @f(i32 %i) {\nentry:\n  %a = alloca [3 x [2 x i32]]\n  %row = getelementptr [3 x [2 x i32]], [3 x [2 x i32]]* %a, i32 0, i32 %i\n  ret void\n}\n",
        )
        .unwrap();
        // rv 0, ra 1, %i 2, %a 3..9, scaled index 9, sum 10.
        let i = AddressDescriptor::cell(2, 0);
        assert_eq!(code[0], Instruction::new(Opcode::MulConst, addr(9), 2i64, i));
        assert_eq!(code[1].opcode, Opcode::AddConst);
        assert_eq!(code[1].a, Operand::Desc(AddressDescriptor::address_of(3)));
        assert_eq!(code[1].to_artifact(), "('add_const', 10, 3, 9)");
    }

    #[test]
    fn test_unit_stride_skips_multiply() {
        let code = lower(
            "define void @f(i32* %p, i32 %i) {\nentry:\n  %q = getelementptr i32, i32* %p, i32 %i\n  ret void\n}\n",
        )
        .unwrap();
        assert_eq!(code[0].to_artifact(), "('add', 4, 2, 3)");
        assert_eq!(code.len(), 2);
    }

    #[test]
    fn test_load_from_constant_is_rejected() {
        let err = lower("define i32 @f() {\nentry:\n  %x = load i32, i32* null\n  ret i32 %x\n}\n")
            .unwrap_err();
        assert!(matches!(err, CompileError::InvariantViolation { .. }));
    }
}
