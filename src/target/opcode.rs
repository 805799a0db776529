//! Closed opcode set of the flat-memory machine.

use serde::{Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Relation {
    pub fn name(self) -> &'static str {
        match self {
            Relation::Lt => "lt",
            Relation::Le => "le",
            Relation::Gt => "gt",
            Relation::Ge => "ge",
            Relation::Eq => "eq",
            Relation::Ne => "ne",
        }
    }
}

/// Which operand form a comparison takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOperands {
    /// Two runtime operands.
    Runtime,
    /// Constant in the first source field, runtime value in the second.
    Const,
    /// Like `Const`, with the constant known to be non-negative; enables
    /// the cheaper unsigned path.
    NonNegConst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Comparison {
    pub relation: Relation,
    pub unsigned: bool,
    pub operands: CmpOperands,
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unsigned {
            f.write_str("u")?;
        }
        f.write_str(self.relation.name())?;
        match self.operands {
            CmpOperands::Runtime => Ok(()),
            CmpOperands::Const => f.write_str("_const"),
            CmpOperands::NonNegConst => f.write_str("_pos_const"),
        }
    }
}

/// Target opcodes. Field meaning is `(dest, a, b)` for every opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// `dest <- a` where `a` is a known value.
    StoreConst,
    /// `*b <- a` where `a` is a known value.
    StoreConstInd,
    /// `*b <- a`.
    Store,
    /// `dest <- a` copied from a cell.
    Mov,
    /// `dest <- *b`.
    Load,
    Add,
    AddConst,
    Sub,
    /// `dest <- a - b`, `a` constant.
    SubConst,
    /// `dest <- b - a`, `a` constant.
    RsubConst,
    Mul,
    MulConst,
    And,
    AndConst,
    /// Arithmetic shift right of `b` by runtime amount `a`.
    Shr,
    ShrConst,
    /// Arithmetic shift right by one.
    Shr1,
    /// Shift left of `b` by runtime amount `a`.
    Shl,
    Cmp(Comparison),
    /// Unconditional jump to instruction `dest`.
    Jmp,
    /// Jump to the instruction index held in cell `b`.
    JmpInd,
    /// Jump to `dest` when `b` holds true, else to `a`.
    Br,
}

impl Opcode {
    pub fn cmp(relation: Relation, unsigned: bool, operands: CmpOperands) -> Self {
        Opcode::Cmp(Comparison {
            relation,
            unsigned,
            operands,
        })
    }

    pub fn is_control_transfer(self) -> bool {
        matches!(self, Opcode::Jmp | Opcode::JmpInd | Opcode::Br)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Opcode::StoreConst => "store_const",
            Opcode::StoreConstInd => "store_const_ind",
            Opcode::Store => "store",
            Opcode::Mov => "mov",
            Opcode::Load => "load",
            Opcode::Add => "add",
            Opcode::AddConst => "add_const",
            Opcode::Sub => "sub",
            Opcode::SubConst => "sub_const",
            Opcode::RsubConst => "rsub_const",
            Opcode::Mul => "mul",
            Opcode::MulConst => "mul_const",
            // The machine's tag for bitwise and carries a trailing underscore.
            Opcode::And => "and_",
            Opcode::AndConst => "and__const",
            Opcode::Shr => "shr",
            Opcode::ShrConst => "shr_const",
            Opcode::Shr1 => "shr1",
            Opcode::Shl => "shl",
            Opcode::Cmp(cmp) => return cmp.fmt(f),
            Opcode::Jmp => "jmp",
            Opcode::JmpInd => "jmp_ind",
            Opcode::Br => "br",
        };
        f.write_str(tag)
    }
}

impl Serialize for Opcode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison_tags() {
        assert_eq!(Opcode::cmp(Relation::Lt, false, CmpOperands::Runtime).to_string(), "lt");
        assert_eq!(Opcode::cmp(Relation::Gt, false, CmpOperands::Const).to_string(), "gt_const");
        assert_eq!(
            Opcode::cmp(Relation::Le, true, CmpOperands::NonNegConst).to_string(),
            "ule_pos_const"
        );
        assert_eq!(Opcode::cmp(Relation::Lt, true, CmpOperands::Const).to_string(), "ult_const");
    }

    #[test]
    fn test_plain_tags() {
        assert_eq!(Opcode::RsubConst.to_string(), "rsub_const");
        assert_eq!(Opcode::JmpInd.to_string(), "jmp_ind");
        assert_eq!(Opcode::Shr1.to_string(), "shr1");
        assert_eq!(Opcode::And.to_string(), "and_");
        assert_eq!(Opcode::AndConst.to_string(), "and__const");
    }

    #[test]
    fn test_control_transfer() {
        assert!(Opcode::Br.is_control_transfer());
        assert!(!Opcode::Mov.is_control_transfer());
    }
}
