//! Constant folding.
//!
//! Folding never mutates the instruction; it only reports the constant the
//! instruction is known to produce. Callers decide whether to RAUW.

use crate::context::IrContext;
use crate::instructions::{BinaryOp, InstKind, IntPredicate};
use crate::refs::{InstRef, ValueRef};
use crate::types::Type;

/// The constant `inst` evaluates to, if its operands make it constant.
///
/// Binary operators wrap at the operand width. Division or remainder by
/// zero, signed overflow in division, and shifts by at least the width are
/// left unfolded.
pub fn fold_instruction(ctx: &mut IrContext, inst: InstRef) -> Option<ValueRef> {
    let data = ctx.inst(inst);
    let (kind, ty, ops) = (data.kind.clone(), data.ty, data.operands.clone());

    match kind {
        InstKind::Binary(op) => {
            let lhs = ctx.const_bits(ops[0])?;
            let rhs = ctx.const_bits(ops[1])?;
            let bits = eval_binary(op, ty, lhs, rhs)?;
            Some(ctx.iconst(ty, bits))
        }
        InstKind::Icmp(pred) => {
            let operand_ty = ctx.value_ty(ops[0]);
            let lhs = ctx.const_bits(ops[0])?;
            let rhs = ctx.const_bits(ops[1])?;
            let holds = eval_icmp(pred, operand_ty, lhs, rhs);
            Some(ctx.iconst(Type::I1, u64::from(holds)))
        }
        InstKind::Select => {
            let chosen = match ctx.const_bits(ops[0]) {
                Some(0) => ops[2],
                Some(_) => ops[1],
                None if ops[1] == ops[2] => ops[1],
                None => return None,
            };
            ctx.const_bits(chosen).map(|_| chosen)
        }
        InstKind::Phi => {
            let first = *ops.first()?;
            ctx.const_bits(first)?;
            ops.iter().all(|&v| v == first).then_some(first)
        }
        _ => None,
    }
}

/// Evaluate a binary operator on masked constant bits of type `ty`.
pub fn eval_binary(op: BinaryOp, ty: Type, lhs: u64, rhs: u64) -> Option<u64> {
    let width = ty.int_width()?;
    let (slhs, srhs) = (ty.sign_extend(lhs), ty.sign_extend(rhs));
    let signed_min = ty.sign_extend(1u64 << (width - 1));
    let signed_overflow = slhs == signed_min && srhs == -1;

    let bits = match op {
        BinaryOp::Add => lhs.wrapping_add(rhs),
        BinaryOp::Sub => lhs.wrapping_sub(rhs),
        BinaryOp::Mul => lhs.wrapping_mul(rhs),
        BinaryOp::UDiv => lhs.checked_div(rhs)?,
        BinaryOp::URem => lhs.checked_rem(rhs)?,
        BinaryOp::SDiv => {
            if rhs == 0 || signed_overflow {
                return None;
            }
            (slhs / srhs) as u64
        }
        BinaryOp::SRem => {
            if rhs == 0 || signed_overflow {
                return None;
            }
            (slhs % srhs) as u64
        }
        BinaryOp::And => lhs & rhs,
        BinaryOp::Or => lhs | rhs,
        BinaryOp::Xor => lhs ^ rhs,
        BinaryOp::Shl | BinaryOp::LShr | BinaryOp::AShr if rhs >= u64::from(width) => return None,
        BinaryOp::Shl => lhs << rhs,
        BinaryOp::LShr => lhs >> rhs,
        BinaryOp::AShr => (slhs >> rhs) as u64,
    };
    Some(ty.mask(bits))
}

/// Evaluate a comparison on masked constant bits of type `ty`.
pub fn eval_icmp(pred: IntPredicate, ty: Type, lhs: u64, rhs: u64) -> bool {
    let (slhs, srhs) = (ty.sign_extend(lhs), ty.sign_extend(rhs));
    match pred {
        IntPredicate::Eq => lhs == rhs,
        IntPredicate::Ne => lhs != rhs,
        IntPredicate::Ult => lhs < rhs,
        IntPredicate::Ule => lhs <= rhs,
        IntPredicate::Ugt => lhs > rhs,
        IntPredicate::Uge => lhs >= rhs,
        IntPredicate::Slt => slhs < srhs,
        IntPredicate::Sle => slhs <= srhs,
        IntPredicate::Sgt => slhs > srhs,
        IntPredicate::Sge => slhs >= srhs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::InstData;
    use crate::types::Signature;

    fn setup() -> (IrContext, crate::BlockRef) {
        let mut ctx = IrContext::new();
        let m = ctx.create_module("m");
        let f = ctx.create_function(m, "f", Signature::new([Type::I32], Type::I32));
        let entry = ctx.create_block(Some("entry".into()));
        ctx.append_block(f, entry);
        (ctx, entry)
    }

    fn inst(ctx: &mut IrContext, block: crate::BlockRef, data: InstData) -> InstRef {
        let i = ctx.create_inst(data);
        ctx.append_inst(block, i);
        i
    }

    #[test]
    fn wrapping_arithmetic() {
        assert_eq!(eval_binary(BinaryOp::Add, Type::I8, 0xff, 2), Some(1));
        assert_eq!(eval_binary(BinaryOp::Sub, Type::I32, 0, 1), Some(0xffff_ffff));
        assert_eq!(eval_binary(BinaryOp::Mul, Type::I64, u64::MAX, 2), Some(u64::MAX - 1));
        assert_eq!(eval_binary(BinaryOp::AShr, Type::I8, 0x80, 7), Some(0xff));
        assert_eq!(eval_binary(BinaryOp::LShr, Type::I8, 0x80, 7), Some(1));
        let minus = |n: i64| Type::I32.mask(n as u64);
        assert_eq!(eval_binary(BinaryOp::SDiv, Type::I32, minus(-7), 2), Some(minus(-3)));
        assert_eq!(eval_binary(BinaryOp::SRem, Type::I32, minus(-7), 2), Some(minus(-1)));
    }

    #[test]
    fn undefined_cases_do_not_fold() {
        assert_eq!(eval_binary(BinaryOp::UDiv, Type::I32, 1, 0), None);
        assert_eq!(eval_binary(BinaryOp::SRem, Type::I32, 1, 0), None);
        assert_eq!(eval_binary(BinaryOp::SDiv, Type::I8, 0x80, 0xff), None);
        assert_eq!(eval_binary(BinaryOp::Shl, Type::I32, 1, 32), None);
    }

    #[test]
    fn comparisons_respect_signedness() {
        let minus_one = Type::I32.mask(u64::MAX);
        assert!(eval_icmp(IntPredicate::Slt, Type::I32, minus_one, 0));
        assert!(!eval_icmp(IntPredicate::Ult, Type::I32, minus_one, 0));
        assert!(eval_icmp(IntPredicate::Sge, Type::I32, 3, 3));
    }

    #[test]
    fn folds_constant_add() {
        let (mut ctx, entry) = setup();
        let one = ctx.iconst(Type::I32, 1);
        let two = ctx.iconst(Type::I32, 2);
        let add = inst(
            &mut ctx,
            entry,
            InstData::new(InstKind::Binary(BinaryOp::Add), Type::I32).operands([one, two]),
        );
        let three = ctx.iconst(Type::I32, 3);
        assert_eq!(fold_instruction(&mut ctx, add), Some(three));
    }

    #[test]
    fn select_and_phi() {
        let (mut ctx, entry) = setup();
        let t = ctx.iconst(Type::I1, 1);
        let seven = ctx.iconst(Type::I32, 7);
        let arg = ctx.func_param(ctx.block_func(entry).unwrap(), 0);

        let sel = inst(
            &mut ctx,
            entry,
            InstData::new(InstKind::Select, Type::I32).operands([t, seven, arg]),
        );
        assert_eq!(fold_instruction(&mut ctx, sel), Some(seven));

        let sel_arg = inst(
            &mut ctx,
            entry,
            InstData::new(InstKind::Select, Type::I32).operands([t, arg, seven]),
        );
        assert_eq!(fold_instruction(&mut ctx, sel_arg), None);

        let phi = inst(
            &mut ctx,
            entry,
            InstData::new(InstKind::Phi, Type::I32)
                .operands([seven, seven])
                .blocks([entry, entry]),
        );
        assert_eq!(fold_instruction(&mut ctx, phi), Some(seven));
    }

    #[test]
    fn non_constant_operands_do_not_fold() {
        let (mut ctx, entry) = setup();
        let arg = ctx.func_param(ctx.block_func(entry).unwrap(), 0);
        let one = ctx.iconst(Type::I32, 1);
        let add = inst(
            &mut ctx,
            entry,
            InstData::new(InstKind::Binary(BinaryOp::Add), Type::I32).operands([arg, one]),
        );
        assert_eq!(fold_instruction(&mut ctx, add), None);
    }
}
