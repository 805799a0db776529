// This module defines the instruction format of the flat-memory target machine. Every
// target instruction is a fixed four-field record (opcode, dest, a, b) regardless of the
// opcode's natural arity; unused fields hold the integer zero. Operand fields are either
// raw integers (constants, instruction indices) or address descriptors that tell the
// execution engine how to reach a value in the flat cell array.

//! Target instruction records.

use serde::ser::SerializeTuple;
use serde::{Serialize, Serializer};
use std::fmt;

use crate::core::AddressDescriptor;

pub mod opcode;

pub use opcode::{CmpOperands, Comparison, Opcode, Relation};

/// One operand field of a target instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum Operand {
    Int(i64),
    Desc(AddressDescriptor),
}

impl Operand {
    pub const ZERO: Operand = Operand::Int(0);

    /// The raw integer the artifact carries for this field.
    pub fn raw(&self) -> i64 {
        match self {
            Operand::Int(value) => *value,
            Operand::Desc(desc) => desc.slot,
        }
    }

    /// Annotated form used by diagnostics.
    pub fn annotated(&self) -> String {
        match self {
            Operand::Int(value) => value.to_string(),
            Operand::Desc(desc) => desc.to_string(),
        }
    }
}

impl From<AddressDescriptor> for Operand {
    fn from(desc: AddressDescriptor) -> Self {
        Operand::Desc(desc)
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::Int(value)
    }
}

impl From<u32> for Operand {
    fn from(value: u32) -> Self {
        Operand::Int(value as i64)
    }
}

/// A target instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub opcode: Opcode,
    pub dest: Operand,
    pub a: Operand,
    pub b: Operand,
}

impl Instruction {
    pub fn new(
        opcode: Opcode,
        dest: impl Into<Operand>,
        a: impl Into<Operand>,
        b: impl Into<Operand>,
    ) -> Self {
        Self {
            opcode,
            dest: dest.into(),
            a: a.into(),
            b: b.into(),
        }
    }

    pub fn jmp(target: u32) -> Self {
        Self::new(Opcode::Jmp, target, Operand::ZERO, Operand::ZERO)
    }

    pub fn br(if_true: u32, if_false: u32, cond: AddressDescriptor) -> Self {
        Self::new(Opcode::Br, if_true, if_false, cond)
    }

    pub fn jmp_ind(through: AddressDescriptor) -> Self {
        Self::new(Opcode::JmpInd, Operand::ZERO, Operand::ZERO, through)
    }

    /// Artifact rendering: `('op', d, a, b)` with descriptors as their base slot.
    pub fn to_artifact(&self) -> String {
        format!(
            "('{}', {}, {}, {})",
            self.opcode,
            self.dest.raw(),
            self.a.raw(),
            self.b.raw()
        )
    }

    /// Diagnostics rendering: `op d a b` with annotated descriptors.
    pub fn to_annotated(&self) -> String {
        format!(
            "{} {} {} {}",
            self.opcode,
            self.dest.annotated(),
            self.a.annotated(),
            self.b.annotated()
        )
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_annotated())
    }
}

impl Serialize for Instruction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(4)?;
        tuple.serialize_element(&self.opcode)?;
        tuple.serialize_element(&self.dest)?;
        tuple.serialize_element(&self.a)?;
        tuple.serialize_element(&self.b)?;
        tuple.end()
    }
}
