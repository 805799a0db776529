//! Arithmetic, bitwise-and and shift lowering.
//!
//! At most one operand of a binary instruction may be known at compile time.
//! The known operand always lands in the first source field: commutative
//! operations are normalised, subtraction picks `sub_const` (constant minus
//! runtime) or `rsub_const` (runtime minus constant).

use super::{cell_address, FunctionLowering};
use crate::core::{AddressDescriptor, CompileError, CompileResult};
use crate::ir::{BinaryOp, CastOp, InstId, Value};
use crate::target::{Instruction, Opcode, Operand};

/// A lowered operand: either known at compile time or read at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Known {
    Const(i64),
    Runtime(AddressDescriptor),
}

impl Known {
    pub(super) fn classify(desc: AddressDescriptor) -> Self {
        if desc.literal {
            Known::Const(desc.slot)
        } else {
            Known::Runtime(desc)
        }
    }
}

impl FunctionLowering<'_, '_, '_> {
    pub(super) fn lower_binary(
        &mut self,
        id: InstId,
        op: BinaryOp,
        lhs: &Value,
        rhs: &Value,
    ) -> CompileResult<()> {
        log::trace!("compiling {} instruction", op.name());
        match op {
            BinaryOp::Add => self.lower_commutative(id, Opcode::Add, Opcode::AddConst, lhs, rhs),
            BinaryOp::Mul => self.lower_commutative(id, Opcode::Mul, Opcode::MulConst, lhs, rhs),
            BinaryOp::And => self.lower_commutative(id, Opcode::And, Opcode::AndConst, lhs, rhs),
            BinaryOp::Sub => self.lower_sub(id, lhs, rhs),
            BinaryOp::Shl => self.lower_shl(id, lhs, rhs),
            BinaryOp::AShr => self.lower_ashr(id, lhs, rhs),
            BinaryOp::Or
            | BinaryOp::Xor
            | BinaryOp::LShr
            | BinaryOp::UDiv
            | BinaryOp::SDiv
            | BinaryOp::URem
            | BinaryOp::SRem => Err(CompileError::unsupported(format!("opcode '{}'", op.name()))),
        }
    }

    /// Width changes and pointer reinterpretation reuse the operand's descriptor.
    pub(super) fn lower_cast(&mut self, id: InstId, op: CastOp, value: &Value) -> CompileResult<()> {
        match op {
            CastOp::ZExt | CastOp::SExt | CastOp::Trunc | CastOp::BitCast => {
                let desc = self.resolve(value)?;
                self.bind(id, desc)
            }
            CastOp::PtrToInt | CastOp::IntToPtr => {
                Err(CompileError::unsupported(format!("cast '{}'", op.name())))
            }
        }
    }

    fn operands(&self, lhs: &Value, rhs: &Value) -> CompileResult<(Known, Known)> {
        Ok((
            Known::classify(self.resolve(lhs)?),
            Known::classify(self.resolve(rhs)?),
        ))
    }

    fn lower_commutative(
        &mut self,
        id: InstId,
        runtime: Opcode,
        constant: Opcode,
        lhs: &Value,
        rhs: &Value,
    ) -> CompileResult<()> {
        let inst = match self.operands(lhs, rhs)? {
            (Known::Runtime(a), Known::Runtime(b)) => (runtime, Operand::from(a), Operand::from(b)),
            (Known::Const(c), Known::Runtime(x)) | (Known::Runtime(x), Known::Const(c)) => {
                (constant, Operand::from(c), Operand::from(x))
            }
            (Known::Const(_), Known::Const(_)) => return Err(two_constants()),
        };
        self.emit_result(id, inst)
    }

    fn lower_sub(&mut self, id: InstId, lhs: &Value, rhs: &Value) -> CompileResult<()> {
        let inst = match self.operands(lhs, rhs)? {
            (Known::Runtime(a), Known::Runtime(b)) => (Opcode::Sub, Operand::from(a), Operand::from(b)),
            (Known::Const(c), Known::Runtime(x)) => (Opcode::SubConst, Operand::from(c), Operand::from(x)),
            (Known::Runtime(x), Known::Const(c)) => (Opcode::RsubConst, Operand::from(c), Operand::from(x)),
            (Known::Const(_), Known::Const(_)) => return Err(two_constants()),
        };
        self.emit_result(id, inst)
    }

    fn lower_shl(&mut self, id: InstId, value: &Value, amount: &Value) -> CompileResult<()> {
        match self.operands(value, amount)? {
            (Known::Runtime(x), Known::Const(0)) => self.bind(id, x),
            (Known::Runtime(x), Known::Const(k)) => {
                let factor = u32::try_from(k)
                    .ok()
                    .filter(|&k| k < 63)
                    .map(|k| 1i64 << k)
                    .ok_or_else(|| CompileError::unsupported(format!("shift amount {k}")))?;
                self.emit_result(id, (Opcode::MulConst, Operand::from(factor), Operand::from(x)))
            }
            (Known::Const(_), Known::Const(_)) => Err(two_constants()),
            (value, Known::Runtime(by)) => {
                let value = self.materialize(value)?;
                self.emit_result(id, (Opcode::Shl, Operand::from(by), Operand::from(value)))
            }
        }
    }

    fn lower_ashr(&mut self, id: InstId, value: &Value, amount: &Value) -> CompileResult<()> {
        match self.operands(value, amount)? {
            (Known::Runtime(x), Known::Const(0)) => self.bind(id, x),
            (Known::Runtime(x), Known::Const(1)) => {
                self.emit_result(id, (Opcode::Shr1, Operand::ZERO, Operand::from(x)))
            }
            (Known::Runtime(x), Known::Const(k)) => {
                if !(0..64).contains(&k) {
                    return Err(CompileError::unsupported(format!("shift amount {k}")));
                }
                self.emit_result(id, (Opcode::ShrConst, Operand::from(k), Operand::from(x)))
            }
            (Known::Const(_), Known::Const(_)) => Err(two_constants()),
            (value, Known::Runtime(by)) => {
                let value = self.materialize(value)?;
                self.emit_result(id, (Opcode::Shr, Operand::from(by), Operand::from(value)))
            }
        }
    }

    /// Copy a known value into a fresh cell so it can sit in a runtime field.
    fn materialize(&mut self, value: Known) -> CompileResult<AddressDescriptor> {
        match value {
            Known::Runtime(desc) => Ok(desc),
            Known::Const(c) => {
                let cell = self.session.alloc_cell(0)?;
                self.emit(Instruction::new(
                    Opcode::StoreConst,
                    cell_address(cell),
                    c,
                    Operand::ZERO,
                ));
                Ok(cell)
            }
        }
    }

    /// Emit `(opcode, result, a, b)` into a fresh result cell bound to `id`.
    pub(super) fn emit_result(
        &mut self,
        id: InstId,
        (opcode, a, b): (Opcode, Operand, Operand),
    ) -> CompileResult<()> {
        let result = self.result_cell(id)?;
        self.emit(Instruction::new(opcode, cell_address(result), a, b));
        self.bind(id, result)
    }
}

pub(super) fn two_constants() -> CompileError {
    CompileError::invariant("binary operation with two constant operands")
}
