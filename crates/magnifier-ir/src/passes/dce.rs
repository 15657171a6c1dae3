//! Dead code elimination.
//!
//! Removes instructions whose results are never used and which have no side
//! effects, plus stack slots that are only ever stored to.

use crate::context::IrContext;
use crate::instructions::InstKind;
use crate::refs::{BlockRef, FuncRef, InstRef};

/// Result of running dead code elimination.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DceResult {
    /// Total number of instructions removed.
    pub removed_count: usize,
    /// Number of fixpoint iterations performed.
    pub iterations: usize,
    /// Whether fixpoint was reached within the iteration limit.
    pub reached_fixpoint: bool,
}

const MAX_ITERATIONS: usize = 100;

/// Eliminate dead instructions from `func` until nothing changes.
pub fn eliminate_dead_code(ctx: &mut IrContext, func: FuncRef) -> DceResult {
    let mut total_removed = 0;

    for iteration in 0..MAX_ITERATIONS {
        let blocks = ctx.func_blocks(func).to_vec();
        let mut removed = 0;
        for block in blocks {
            removed += sweep_block(ctx, block);
        }
        removed += remove_write_only_slots(ctx, func);

        if removed == 0 {
            return DceResult {
                removed_count: total_removed,
                iterations: iteration + 1,
                reached_fixpoint: true,
            };
        }
        total_removed += removed;
    }

    DceResult {
        removed_count: total_removed,
        iterations: MAX_ITERATIONS,
        reached_fixpoint: false,
    }
}

/// Sweep a single block in reverse order, removing dead instructions.
///
/// Reverse order lets one sweep remove a whole chain of dead definitions.
fn sweep_block(ctx: &mut IrContext, block: BlockRef) -> usize {
    let mut removed = 0;
    for inst in ctx.block_insts(block).to_vec().into_iter().rev() {
        if is_dead(ctx, inst) {
            ctx.erase_inst(inst);
            removed += 1;
        }
    }
    removed
}

/// Check if an instruction is dead (no side effects, result unused).
pub fn is_dead(ctx: &IrContext, inst: InstRef) -> bool {
    if ctx.inst_kind(inst).has_side_effects() {
        return false;
    }
    match ctx.inst_result(inst) {
        Some(result) => !ctx.has_uses(result),
        None => true,
    }
}

/// Erase allocas whose only users are stores into them, with those stores.
fn remove_write_only_slots(ctx: &mut IrContext, func: FuncRef) -> usize {
    let mut removed = 0;
    for inst in ctx.func_insts(func) {
        if !matches!(ctx.inst_kind(inst), InstKind::Alloca(_)) {
            continue;
        }
        let Some(slot) = ctx.inst_result(inst) else {
            continue;
        };
        let write_only = ctx
            .uses(slot)
            .iter()
            .all(|u| *ctx.inst_kind(u.user) == InstKind::Store && u.operand_index == 1);
        if !write_only {
            continue;
        }
        for store in ctx.users(slot) {
            ctx.erase_inst(store);
            removed += 1;
        }
        ctx.erase_inst(inst);
        removed += 1;
    }
    removed
}
