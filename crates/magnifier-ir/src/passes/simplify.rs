//! Constant folding and algebraic simplification over a whole function.

use crate::context::IrContext;
use crate::fold::fold_instruction;
use crate::instructions::{BinaryOp, InstKind, IntPredicate};
use crate::refs::{FuncRef, InstRef, ValueRef};
use crate::types::Type;

/// Counts from one [`simplify_function`] run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SimplifyResult {
    pub folded: usize,
    pub simplified: usize,
}

/// Replace every instruction that folds or simplifies with its value.
///
/// Replaced instructions are left in place without uses; dead code
/// elimination removes them.
pub fn simplify_function(ctx: &mut IrContext, func: FuncRef) -> SimplifyResult {
    let mut result = SimplifyResult::default();
    for inst in ctx.func_insts(func) {
        let Some(old) = ctx.inst_result(inst) else {
            continue;
        };
        if !ctx.has_uses(old) {
            continue;
        }
        if let Some(c) = fold_instruction(ctx, inst) {
            ctx.replace_all_uses(old, c);
            result.folded += 1;
        } else if let Some(v) = simplify_instruction(ctx, inst) {
            ctx.replace_all_uses(old, v);
            result.simplified += 1;
        }
    }
    result
}

/// A simpler existing value equal to `inst`'s result, if one is known.
///
/// Covers identities such as `x + 0`, `x * 1`, `x ^ x`, comparisons of a
/// value with itself, selects with equal arms and phis whose incoming
/// values are all the same (ignoring the phi itself).
pub fn simplify_instruction(ctx: &mut IrContext, inst: InstRef) -> Option<ValueRef> {
    let data = ctx.inst(inst);
    let (kind, ty, ops) = (data.kind.clone(), data.ty, data.operands.clone());

    match kind {
        InstKind::Binary(op) => simplify_binary(ctx, op, ty, ops[0], ops[1]),
        InstKind::Icmp(pred) if ops[0] == ops[1] => {
            let holds = matches!(
                pred,
                IntPredicate::Eq
                    | IntPredicate::Ule
                    | IntPredicate::Uge
                    | IntPredicate::Sle
                    | IntPredicate::Sge
            );
            Some(ctx.iconst(Type::I1, u64::from(holds)))
        }
        InstKind::Select => match ctx.const_bits(ops[0]) {
            Some(0) => Some(ops[2]),
            Some(_) => Some(ops[1]),
            None => (ops[1] == ops[2]).then_some(ops[1]),
        },
        InstKind::Phi => {
            let this = ctx.inst_result(inst);
            let mut incoming = ops.iter().copied().filter(|&v| Some(v) != this);
            let first = incoming.next()?;
            incoming.all(|v| v == first).then_some(first)
        }
        _ => None,
    }
}

fn simplify_binary(
    ctx: &mut IrContext,
    op: BinaryOp,
    ty: Type,
    lhs: ValueRef,
    rhs: ValueRef,
) -> Option<ValueRef> {
    let is = |ctx: &IrContext, v: ValueRef, bits: u64| ctx.const_bits(v) == Some(ty.mask(bits));
    let zero = |ctx: &mut IrContext| ctx.iconst(ty, 0);

    match op {
        BinaryOp::Add | BinaryOp::Or | BinaryOp::Xor if is(ctx, rhs, 0) => Some(lhs),
        BinaryOp::Add | BinaryOp::Or | BinaryOp::Xor if is(ctx, lhs, 0) => Some(rhs),
        BinaryOp::Sub | BinaryOp::Shl | BinaryOp::LShr | BinaryOp::AShr if is(ctx, rhs, 0) => {
            Some(lhs)
        }
        BinaryOp::Mul | BinaryOp::UDiv | BinaryOp::SDiv if is(ctx, rhs, 1) => Some(lhs),
        BinaryOp::Mul if is(ctx, lhs, 1) => Some(rhs),
        BinaryOp::Mul | BinaryOp::And if is(ctx, rhs, 0) || is(ctx, lhs, 0) => Some(zero(ctx)),
        BinaryOp::And if is(ctx, rhs, u64::MAX) => Some(lhs),
        BinaryOp::And if is(ctx, lhs, u64::MAX) => Some(rhs),
        BinaryOp::And | BinaryOp::Or if lhs == rhs => Some(lhs),
        BinaryOp::Sub | BinaryOp::Xor if lhs == rhs => Some(zero(ctx)),
        BinaryOp::URem | BinaryOp::SRem if is(ctx, rhs, 1) => Some(zero(ctx)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;
    use crate::passes::dce::eliminate_dead_code;
    use crate::printer::{NoAnnotations, print_function};
    use insta::assert_snapshot;

    #[test]
    fn folds_and_simplifies() {
        let mut owned = parse_module(
            "m",
            "\
define i32 @f(i32 %a) {
entry:
  %one = add i32 0, 1
  %x = mul i32 %a, %one
  %y = xor i32 %x, %x
  %z = or i32 %a, %y
  %c = icmp sle i32 %z, %z
  %r = select i32 %c, %z, 9
  ret i32 %r
}
",
        )
        .unwrap();
        let f = owned.func_by_name("f").unwrap();
        let ctx = owned.context_mut();

        let first = simplify_function(ctx, f);
        assert_eq!(first.folded, 1);
        eliminate_dead_code(ctx, f);
        assert_snapshot!(print_function(ctx, f, &mut NoAnnotations), @r"
        define i32 @f(i32 %a) {
        entry:
          ret i32 %a
        }
        ");
    }

    #[test]
    fn phi_ignores_self_references() {
        let mut owned = parse_module(
            "m",
            "\
define i32 @f(i32 %a, i1 %c) {
entry:
  br label %loop
loop:
  %p = phi i32 [ %a, %entry ], [ %p, %loop ]
  br i1 %c, label %loop, label %exit
exit:
  ret i32 %p
}
",
        )
        .unwrap();
        let f = owned.func_by_name("f").unwrap();
        let ctx = owned.context_mut();
        let phi = ctx.leading_phis(ctx.func_blocks(f)[1])[0];
        let a = ctx.func_param(f, 0);
        assert_eq!(simplify_instruction(ctx, phi), Some(a));
    }
}
