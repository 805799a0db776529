//! Typed SSA input IR consumed by the backend.
//!
//! The IR is a fully materialized tree: a [`Module`] of globals and
//! functions, functions of ordered [`Block`]s, blocks of ordered instruction
//! ids. Instructions live in one module-wide arena ([`Module::insts`]) so that
//! an [`InstId`] is a stable identity for the value an instruction produces.
//!
//! The textual reader in [`parser`] accepts an LLVM-assembly-like subset:
//!
//! ```text
//! ; Comments start with semicolon
//! @counter = global i32 0
//!
//! define void @inc(i32* %p) {
//! entry:
//!   %v = load i32, i32* %p
//!   %n = add i32 %v, 1
//!   store i32 %n, i32* %p
//!   ret void
//! }
//! ```

use std::fmt;

pub mod check;
pub mod parser;

pub use check::{CheckDirective, TestRunner, TestSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalId(pub u32);

/// Index of a block inside its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Structural types. Every scalar occupies one machine word.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Int(u32),
    Ptr(Box<Type>),
    Array(u64, Box<Type>),
    Struct(Vec<Type>),
}

impl Type {
    pub fn ptr_to(self) -> Type {
        Type::Ptr(Box::new(self))
    }

    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Ptr(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Ptr(_))
    }

    /// Number of pointer layers wrapped around the innermost non-pointer type.
    pub fn pointer_depth(&self) -> u32 {
        let mut depth = 0;
        let mut ty = self;
        while let Type::Ptr(inner) = ty {
            depth += 1;
            ty = inner;
        }
        depth
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int(bits) => write!(f, "i{bits}"),
            Type::Ptr(inner) => write!(f, "{inner}*"),
            Type::Array(count, elem) => write!(f, "[{count} x {elem}]"),
            Type::Struct(fields) => {
                write!(f, "{{ ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{field}")?;
                }
                write!(f, " }}")
            }
        }
    }
}

/// An instruction operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Result of a prior instruction.
    Inst(InstId),
    /// Argument of the enclosing function, by position.
    Arg(u32),
    Global(GlobalId),
    /// Integer constant, sign-extended.
    Const(i64),
    /// Constant `getelementptr` expression over a global.
    ConstGep(Box<ConstGep>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstGep {
    /// The type the base pointer points to.
    pub source_ty: Type,
    pub base: GlobalId,
    pub indices: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
    UDiv,
    SDiv,
    URem,
    SRem,
}

impl BinaryOp {
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Shl => "shl",
            BinaryOp::LShr => "lshr",
            BinaryOp::AShr => "ashr",
            BinaryOp::UDiv => "udiv",
            BinaryOp::SDiv => "sdiv",
            BinaryOp::URem => "urem",
            BinaryOp::SRem => "srem",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "add" => BinaryOp::Add,
            "sub" => BinaryOp::Sub,
            "mul" => BinaryOp::Mul,
            "and" => BinaryOp::And,
            "or" => BinaryOp::Or,
            "xor" => BinaryOp::Xor,
            "shl" => BinaryOp::Shl,
            "lshr" => BinaryOp::LShr,
            "ashr" => BinaryOp::AShr,
            "udiv" => BinaryOp::UDiv,
            "sdiv" => BinaryOp::SDiv,
            "urem" => BinaryOp::URem,
            "srem" => BinaryOp::SRem,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntPredicate {
    Eq,
    Ne,
    Ugt,
    Uge,
    Ult,
    Ule,
    Sgt,
    Sge,
    Slt,
    Sle,
}

impl IntPredicate {
    pub fn name(self) -> &'static str {
        match self {
            IntPredicate::Eq => "eq",
            IntPredicate::Ne => "ne",
            IntPredicate::Ugt => "ugt",
            IntPredicate::Uge => "uge",
            IntPredicate::Ult => "ult",
            IntPredicate::Ule => "ule",
            IntPredicate::Sgt => "sgt",
            IntPredicate::Sge => "sge",
            IntPredicate::Slt => "slt",
            IntPredicate::Sle => "sle",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "eq" => IntPredicate::Eq,
            "ne" => IntPredicate::Ne,
            "ugt" => IntPredicate::Ugt,
            "uge" => IntPredicate::Uge,
            "ult" => IntPredicate::Ult,
            "ule" => IntPredicate::Ule,
            "sgt" => IntPredicate::Sgt,
            "sge" => IntPredicate::Sge,
            "slt" => IntPredicate::Slt,
            "sle" => IntPredicate::Sle,
            _ => return None,
        })
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            IntPredicate::Ugt | IntPredicate::Uge | IntPredicate::Ult | IntPredicate::Ule
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    ZExt,
    SExt,
    Trunc,
    BitCast,
    PtrToInt,
    IntToPtr,
}

impl CastOp {
    pub fn name(self) -> &'static str {
        match self {
            CastOp::ZExt => "zext",
            CastOp::SExt => "sext",
            CastOp::Trunc => "trunc",
            CastOp::BitCast => "bitcast",
            CastOp::PtrToInt => "ptrtoint",
            CastOp::IntToPtr => "inttoptr",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "zext" => CastOp::ZExt,
            "sext" => CastOp::SExt,
            "trunc" => CastOp::Trunc,
            "bitcast" => CastOp::BitCast,
            "ptrtoint" => CastOp::PtrToInt,
            "inttoptr" => CastOp::IntToPtr,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstKind {
    Alloca {
        allocated: Type,
    },
    Load {
        ty: Type,
        ptr: Value,
    },
    Store {
        ty: Type,
        value: Value,
        ptr: Value,
    },
    Binary {
        op: BinaryOp,
        ty: Type,
        lhs: Value,
        rhs: Value,
    },
    ICmp {
        pred: IntPredicate,
        lhs: Value,
        rhs: Value,
    },
    Cast {
        op: CastOp,
        value: Value,
        to: Type,
    },
    GetElementPtr {
        /// The type the base pointer points to.
        source_ty: Type,
        base: Value,
        indices: Vec<Value>,
    },
    Call {
        callee: FuncId,
        args: Vec<Value>,
    },
    Phi {
        ty: Type,
        incoming: Vec<(Value, BlockId)>,
    },
    Br {
        target: BlockId,
    },
    CondBr {
        cond: Value,
        if_true: BlockId,
        if_false: BlockId,
    },
    Ret {
        value: Option<Value>,
    },
}

impl InstKind {
    pub fn opcode_name(&self) -> &'static str {
        match self {
            InstKind::Alloca { .. } => "alloca",
            InstKind::Load { .. } => "load",
            InstKind::Store { .. } => "store",
            InstKind::Binary { op, .. } => op.name(),
            InstKind::ICmp { .. } => "icmp",
            InstKind::Cast { op, .. } => op.name(),
            InstKind::GetElementPtr { .. } => "getelementptr",
            InstKind::Call { .. } => "call",
            InstKind::Phi { .. } => "phi",
            InstKind::Br { .. } | InstKind::CondBr { .. } => "br",
            InstKind::Ret { .. } => "ret",
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Br { .. } | InstKind::CondBr { .. } | InstKind::Ret { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inst {
    pub name: Option<String>,
    pub kind: InstKind,
    /// Source line, when the instruction came from text.
    pub line: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub name: String,
    pub insts: Vec<InstId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub ret: Type,
    pub params: Vec<Param>,
    /// Empty for declarations.
    pub blocks: Vec<Block>,
    pub declaration: bool,
}

impl Function {
    pub fn is_intrinsic(&self) -> bool {
        self.name.starts_with("llvm.")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Initializer {
    Zero,
    Int(i64),
    Array(Vec<i64>),
    /// Defined elsewhere or not representable as cell data.
    Opaque,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    pub name: String,
    /// Type of the stored object; the global itself is a pointer to it.
    pub ty: Type,
    pub constant: bool,
    pub init: Initializer,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Module {
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
    pub insts: Vec<Inst>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> crate::core::CompileResult<Self> {
        parser::parse_module(text)
    }

    pub fn inst(&self, id: InstId) -> &Inst {
        &self.insts[id.0 as usize]
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.0 as usize]
    }

    pub fn global(&self, id: GlobalId) -> &Global {
        &self.globals[id.0 as usize]
    }

    pub fn function_id(&self, name: &str) -> Option<FuncId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|idx| FuncId(idx as u32))
    }

    pub fn func_ids(&self) -> impl Iterator<Item = FuncId> + '_ {
        (0..self.functions.len() as u32).map(FuncId)
    }

    /// Append an instruction to the module arena, returning its id.
    pub fn push_inst(&mut self, inst: Inst) -> InstId {
        let id = InstId(self.insts.len() as u32);
        self.insts.push(inst);
        id
    }

    /// Result type of an instruction, or `None` when it produces no value.
    pub fn result_type(&self, id: InstId) -> Option<Type> {
        match &self.inst(id).kind {
            InstKind::Alloca { allocated } => Some(allocated.clone().ptr_to()),
            InstKind::Load { ty, .. } => Some(ty.clone()),
            InstKind::Binary { ty, .. } => Some(ty.clone()),
            InstKind::ICmp { .. } => Some(Type::Int(1)),
            InstKind::Cast { to, .. } => Some(to.clone()),
            InstKind::GetElementPtr {
                source_ty, indices, ..
            } => gep_result_type(source_ty, indices).map(Type::ptr_to),
            InstKind::Call { callee, .. } => match &self.function(*callee).ret {
                Type::Void => None,
                ty => Some(ty.clone()),
            },
            InstKind::Phi { ty, .. } => Some(ty.clone()),
            InstKind::Store { .. }
            | InstKind::Br { .. }
            | InstKind::CondBr { .. }
            | InstKind::Ret { .. } => None,
        }
    }
}

/// Type reached by walking `indices` (after the first) into `source_ty`.
pub fn gep_result_type(source_ty: &Type, indices: &[Value]) -> Option<Type> {
    let mut ty = source_ty;
    for index in indices.iter().skip(1) {
        ty = match ty {
            Type::Array(_, elem) => elem,
            Type::Struct(fields) => match index {
                Value::Const(field) => fields.get(usize::try_from(*field).ok()?)?,
                _ => return None,
            },
            _ => return None,
        };
    }
    Some(ty.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_depth_counts_layers() {
        let ty = Type::Int(32).ptr_to().ptr_to();
        assert_eq!(ty.pointer_depth(), 2);
        assert_eq!(Type::Int(8).pointer_depth(), 0);
    }

    #[test]
    fn test_type_display() {
        let ty = Type::Struct(vec![
            Type::Int(32),
            Type::Array(4, Box::new(Type::Int(8).ptr_to())),
        ]);
        assert_eq!(ty.to_string(), "{ i32, [4 x i8*] }");
    }

    #[test]
    fn test_gep_result_type_walks_struct_and_array() {
        let source = Type::Struct(vec![Type::Int(32), Type::Array(3, Box::new(Type::Int(16)))]);
        let indices = vec![Value::Const(0), Value::Const(1), Value::Inst(InstId(9))];
        assert_eq!(gep_result_type(&source, &indices), Some(Type::Int(16)));
    }

    #[test]
    fn test_gep_result_type_rejects_runtime_struct_index() {
        let source = Type::Struct(vec![Type::Int(32)]);
        let indices = vec![Value::Const(0), Value::Arg(0)];
        assert_eq!(gep_result_type(&source, &indices), None);
    }
}
