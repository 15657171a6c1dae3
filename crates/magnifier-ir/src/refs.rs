//! Entity references for the IR arena.
//!
//! Each ref type is a thin `u32` wrapper providing type-safe indexing
//! into `PrimaryMap` storage in `IrContext`.

use cranelift_entity::entity_impl;
use std::fmt;

use crate::types::Type;

/// Reference to a module in the arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleRef(u32);
entity_impl!(ModuleRef, "module");

/// Reference to a function (definition or declaration).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncRef(u32);
entity_impl!(FuncRef, "fn");

/// Reference to a basic block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockRef(u32);
entity_impl!(BlockRef, "block");

/// Reference to an instruction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstRef(u32);
entity_impl!(InstRef, "inst");

/// Reference to an SSA value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueRef(u32);
entity_impl!(ValueRef, "v");

/// Where a value comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueDef {
    /// Result of an instruction.
    Inst(InstRef),
    /// Formal parameter of a function at the given position.
    Arg(FuncRef, u32),
    /// Integer constant; bits are already masked to the type's width.
    Const(Type, u64),
    /// Address of a function.
    Func(FuncRef),
    /// Undefined value of a type.
    Undef(Type),
}

impl fmt::Display for ValueDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueDef::Inst(inst) => write!(f, "{inst}"),
            ValueDef::Arg(func, idx) => write!(f, "{func}#{idx}"),
            ValueDef::Const(ty, bits) => write!(f, "{ty} {bits}"),
            ValueDef::Func(func) => write!(f, "&{func}"),
            ValueDef::Undef(ty) => write!(f, "{ty} undef"),
        }
    }
}
