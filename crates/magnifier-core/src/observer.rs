//! Substitution observer interface.

use std::fmt;

use magnifier_ir::{InstRef, IrContext, ValueRef};
use serde::Serialize;

/// Why a value is about to be replaced.
///
/// The discriminant is what a hook marker's substitution slot stores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum SubstitutionKind {
    /// A call's result is replaced by the inlined callee's return value.
    ReturnValue = 1,
    /// A callee parameter is replaced by the call-site argument.
    Argument = 2,
    /// An instruction is replaced by the constant it folds to.
    ConstantFolding = 3,
    /// An instruction or argument is replaced by a user-supplied value.
    ValueSubstitution = 4,
    /// An indirect callee is replaced by a concrete function.
    FunctionDevirtualization = 5,
}

impl SubstitutionKind {
    pub const ALL: [SubstitutionKind; 5] = [
        SubstitutionKind::ReturnValue,
        SubstitutionKind::Argument,
        SubstitutionKind::ConstantFolding,
        SubstitutionKind::ValueSubstitution,
        SubstitutionKind::FunctionDevirtualization,
    ];

    pub fn from_id(id: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.id() == id)
    }

    pub fn id(self) -> u64 {
        self as u64
    }
}

impl fmt::Display for SubstitutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SubstitutionKind::ReturnValue => "ReturnValue",
            SubstitutionKind::Argument => "Argument",
            SubstitutionKind::ConstantFolding => "ConstantFolding",
            SubstitutionKind::ValueSubstitution => "ValueSubstitution",
            SubstitutionKind::FunctionDevirtualization => "FunctionDevirtualization",
        })
    }
}

/// One pending substitution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubstitutionSite {
    /// The hook call, or the folded instruction for constant folding.
    pub marker: InstRef,
    pub old: ValueRef,
    pub new: ValueRef,
    pub kind: SubstitutionKind,
}

/// Decides the value that finally replaces `site.old`.
///
/// Observers may create constants through `ctx` but must not otherwise
/// change the IR. Returning the marker's own result is treated as
/// accepting `site.new` for hook calls, and as keeping the instruction for
/// constant folding.
pub trait SubstitutionObserver {
    fn perform_substitution(&mut self, ctx: &mut IrContext, site: &SubstitutionSite) -> ValueRef;
}

/// Accepts every proposed value.
pub struct NullSubstitutionObserver;

impl SubstitutionObserver for NullSubstitutionObserver {
    fn perform_substitution(&mut self, _ctx: &mut IrContext, site: &SubstitutionSite) -> ValueRef {
        site.new
    }
}

impl<F> SubstitutionObserver for F
where
    F: FnMut(&mut IrContext, &SubstitutionSite) -> ValueRef,
{
    fn perform_substitution(&mut self, ctx: &mut IrContext, site: &SubstitutionSite) -> ValueRef {
        self(ctx, site)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_round_trip_through_ids() {
        for kind in SubstitutionKind::ALL {
            assert_eq!(SubstitutionKind::from_id(kind.id()), Some(kind));
        }
        assert_eq!(SubstitutionKind::from_id(0), None);
        assert_eq!(SubstitutionKind::ConstantFolding.to_string(), "ConstantFolding");
    }
}
