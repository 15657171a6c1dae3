//! Instruction kinds and their operand conventions.
//!
//! Operand layout per kind:
//!
//! | Kind | Operands | Blocks |
//! |------|----------|--------|
//! | `Binary`, `Icmp` | `[lhs, rhs]` | none |
//! | `Select` | `[cond, then, else]` | none |
//! | `Phi` | incoming values | incoming blocks, parallel to operands |
//! | `Call` | `[callee, args...]` | none |
//! | `Alloca` | none | none |
//! | `Load` | `[ptr]` | none |
//! | `Store` | `[value, ptr]` | none |
//! | `Assume` | `[cond]` | none |
//! | `Br` | none | `[dest]` |
//! | `CondBr` | `[cond]` | `[then, else]` |
//! | `Ret` | `[]` or `[value]` | none |
//! | `Unreachable` | none | none |

use std::fmt;

use crate::types::{Signature, Type};

/// Two-operand integer arithmetic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 13] = [
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::UDiv,
        BinaryOp::SDiv,
        BinaryOp::URem,
        BinaryOp::SRem,
        BinaryOp::And,
        BinaryOp::Or,
        BinaryOp::Xor,
        BinaryOp::Shl,
        BinaryOp::LShr,
        BinaryOp::AShr,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::UDiv => "udiv",
            BinaryOp::SDiv => "sdiv",
            BinaryOp::URem => "urem",
            BinaryOp::SRem => "srem",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Shl => "shl",
            BinaryOp::LShr => "lshr",
            BinaryOp::AShr => "ashr",
        }
    }

    pub fn from_keyword(word: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.keyword() == word)
    }

    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Mul | BinaryOp::And | BinaryOp::Or | BinaryOp::Xor
        )
    }
}

/// Integer comparison predicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IntPredicate {
    Eq,
    Ne,
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl IntPredicate {
    pub const ALL: [IntPredicate; 10] = [
        IntPredicate::Eq,
        IntPredicate::Ne,
        IntPredicate::Ult,
        IntPredicate::Ule,
        IntPredicate::Ugt,
        IntPredicate::Uge,
        IntPredicate::Slt,
        IntPredicate::Sle,
        IntPredicate::Sgt,
        IntPredicate::Sge,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            IntPredicate::Eq => "eq",
            IntPredicate::Ne => "ne",
            IntPredicate::Ult => "ult",
            IntPredicate::Ule => "ule",
            IntPredicate::Ugt => "ugt",
            IntPredicate::Uge => "uge",
            IntPredicate::Slt => "slt",
            IntPredicate::Sle => "sle",
            IntPredicate::Sgt => "sgt",
            IntPredicate::Sge => "sge",
        }
    }

    pub fn from_keyword(word: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.keyword() == word)
    }
}

/// What an instruction does.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum InstKind {
    Binary(BinaryOp),
    Icmp(IntPredicate),
    Select,
    Phi,
    /// Call through the signature the call site was written against.
    Call(Signature),
    /// Stack slot holding one value of the given type.
    Alloca(Type),
    Load,
    Store,
    Assume,
    Br,
    CondBr,
    Ret,
    Unreachable,
}

impl InstKind {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Br | InstKind::CondBr | InstKind::Ret | InstKind::Unreachable
        )
    }

    pub fn is_call(&self) -> bool {
        matches!(self, InstKind::Call(_))
    }

    /// Whether removing an unused instance of this kind could change behaviour.
    pub fn has_side_effects(&self) -> bool {
        match self {
            InstKind::Call(_) | InstKind::Store | InstKind::Assume => true,
            // Division by zero is undefined behaviour, not a trap we preserve.
            InstKind::Binary(_) | InstKind::Icmp(_) | InstKind::Select | InstKind::Phi => false,
            InstKind::Alloca(_) | InstKind::Load => false,
            kind => kind.is_terminator(),
        }
    }

    /// Short mnemonic used by the printer and in diagnostics.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            InstKind::Binary(op) => op.keyword(),
            InstKind::Icmp(_) => "icmp",
            InstKind::Select => "select",
            InstKind::Phi => "phi",
            InstKind::Call(_) => "call",
            InstKind::Alloca(_) => "alloca",
            InstKind::Load => "load",
            InstKind::Store => "store",
            InstKind::Assume => "assume",
            InstKind::Br | InstKind::CondBr => "br",
            InstKind::Ret => "ret",
            InstKind::Unreachable => "unreachable",
        }
    }
}

impl fmt::Display for InstKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstKind::Icmp(pred) => write!(f, "icmp {}", pred.keyword()),
            InstKind::Call(sig) => write!(f, "call {sig}"),
            InstKind::Alloca(ty) => write!(f, "alloca {ty}"),
            kind => f.write_str(kind.mnemonic()),
        }
    }
}
