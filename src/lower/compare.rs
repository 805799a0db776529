// Integer comparisons are canonicalised before opcode selection: a constant
// operand always ends up on the right-hand side of the relation (and in the
// first source field of the emitted instruction), flipping the relation when
// the operands are swapped. Runtime pairs of `gt`/`ge` are swapped into
// `lt`/`le`, so the target only needs `gt`/`ge` in the constant form.

use super::arith::{two_constants, Known};
use super::FunctionLowering;
use crate::core::{CompileError, CompileResult};
use crate::ir::{InstId, IntPredicate, Value};
use crate::target::{CmpOperands, Opcode, Operand, Relation};

impl FunctionLowering<'_, '_, '_> {
    pub(super) fn lower_icmp(
        &mut self,
        id: InstId,
        pred: IntPredicate,
        lhs: &Value,
        rhs: &Value,
    ) -> CompileResult<()> {
        log::trace!("compiling icmp {} instruction", pred.name());
        let lhs = Known::classify(self.resolve(lhs)?);
        let rhs = Known::classify(self.resolve(rhs)?);
        let lhs_const = matches!(lhs, Known::Const(_));
        let has_const = lhs_const || matches!(rhs, Known::Const(_));

        let (relation, swap) = canonical_relation(pred, lhs_const, has_const);
        let (first, second) = if swap { (rhs, lhs) } else { (lhs, rhs) };
        let unsigned = pred.is_unsigned();

        let inst = match (first, second) {
            (Known::Runtime(a), Known::Runtime(b)) => (
                Opcode::cmp(relation, unsigned, CmpOperands::Runtime),
                Operand::from(a),
                Operand::from(b),
            ),
            (Known::Runtime(x), Known::Const(c)) => {
                let operands = if unsigned && c >= 0 && matches!(relation, Relation::Lt | Relation::Le)
                {
                    CmpOperands::NonNegConst
                } else {
                    CmpOperands::Const
                };
                (
                    Opcode::cmp(relation, unsigned, operands),
                    Operand::from(c),
                    Operand::from(x),
                )
            }
            (Known::Const(_), Known::Const(_)) => return Err(two_constants()),
            (Known::Const(_), Known::Runtime(_)) => {
                return Err(CompileError::invariant(
                    "constant left of comparison after canonicalisation",
                ))
            }
        };
        self.emit_result(id, inst)
    }
}

/// Relation to test and whether the operands are swapped to reach it.
fn canonical_relation(pred: IntPredicate, lhs_const: bool, has_const: bool) -> (Relation, bool) {
    use IntPredicate::*;
    match pred {
        Slt | Ult => (if lhs_const { Relation::Gt } else { Relation::Lt }, lhs_const),
        Sle | Ule => (if lhs_const { Relation::Ge } else { Relation::Le }, lhs_const),
        Sgt | Ugt if has_const => (if lhs_const { Relation::Lt } else { Relation::Gt }, lhs_const),
        Sge | Uge if has_const => (if lhs_const { Relation::Le } else { Relation::Ge }, lhs_const),
        Sgt | Ugt => (Relation::Lt, true),
        Sge | Uge => (Relation::Le, true),
        Eq => (Relation::Eq, lhs_const),
        Ne => (Relation::Ne, lhs_const),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AddressDescriptor, CompilationSession};
    use crate::ir::{FuncId, Module};
    use crate::target::Instruction;
    use bumpalo::Bump;

    fn lower_cmp(pred: &str, lhs: &str, rhs: &str) -> Instruction {
        let text = format!(
            "define i1 @f(i32 %x, i32 %y) {{\nentry:\n  %c = icmp {pred} i32 {lhs}, {rhs}\n  ret i1 %c\n}}\n"
        );
        let module = Module::parse(&text).unwrap();
        let arena = Bump::new();
        let mut session = CompilationSession::new(&arena);
        let lowered = FunctionLowering::new(&mut session, &module, FuncId(0))
            .unwrap()
            .lower()
            .unwrap();
        lowered.blocks[0].code[0]
    }

    const X: AddressDescriptor = AddressDescriptor::cell(2, 0);
    const Y: AddressDescriptor = AddressDescriptor::cell(3, 0);

    fn tag(inst: &Instruction) -> String {
        inst.opcode.to_string()
    }

    #[test]
    fn test_constant_on_left_flips_relation() {
        let inst = lower_cmp("slt", "5", "%x");
        assert_eq!(tag(&inst), "gt_const");
        assert_eq!(inst.a, Operand::Int(5));
        assert_eq!(inst.b, Operand::Desc(X));
    }

    #[test]
    fn test_constant_on_right_keeps_relation() {
        let inst = lower_cmp("sle", "%x", "7");
        assert_eq!(tag(&inst), "le_const");
        assert_eq!((inst.a, inst.b), (Operand::Int(7), Operand::Desc(X)));
        assert_eq!(tag(&lower_cmp("sgt", "%x", "7")), "gt_const");
        assert_eq!(tag(&lower_cmp("sge", "3", "%x")), "le_const");
    }

    #[test]
    fn test_runtime_greater_swaps_into_less() {
        let inst = lower_cmp("sgt", "%x", "%y");
        assert_eq!(tag(&inst), "lt");
        assert_eq!((inst.a, inst.b), (Operand::Desc(Y), Operand::Desc(X)));
        assert_eq!(tag(&lower_cmp("uge", "%x", "%y")), "ule");
    }

    #[test]
    fn test_unsigned_nonnegative_constant_refinement() {
        assert_eq!(tag(&lower_cmp("ult", "%x", "10")), "ult_pos_const");
        assert_eq!(tag(&lower_cmp("ule", "%x", "-1")), "ule_const");
        assert_eq!(tag(&lower_cmp("ult", "10", "%x")), "ugt_const");
        assert_eq!(tag(&lower_cmp("ugt", "10", "%x")), "ult_pos_const");
    }

    #[test]
    fn test_equality() {
        let inst = lower_cmp("eq", "0", "%y");
        assert_eq!(tag(&inst), "eq_const");
        assert_eq!((inst.a, inst.b), (Operand::Int(0), Operand::Desc(Y)));
        assert_eq!(tag(&lower_cmp("ne", "%x", "%y")), "ne");
    }
}
