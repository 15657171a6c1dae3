//! Control-flow simplification and store-to-load forwarding.

use std::collections::{HashMap, HashSet};

use crate::context::{InstData, IrContext};
use crate::instructions::InstKind;
use crate::refs::{BlockRef, FuncRef, ValueDef, ValueRef};
use crate::types::Type;

/// Counts from one [`simplify_cfg`] run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CfgResult {
    pub folded_branches: usize,
    pub removed_blocks: usize,
    pub merged_blocks: usize,
    pub removed_phis: usize,
}

impl CfgResult {
    pub fn changed(&self) -> bool {
        *self != Self::default()
    }
}

/// Fold constant branches, drop unreachable blocks, merge straight-line
/// block pairs and remove trivial phis.
pub fn simplify_cfg(ctx: &mut IrContext, func: FuncRef) -> CfgResult {
    if ctx.is_declaration(func) {
        return CfgResult::default();
    }
    CfgResult {
        folded_branches: fold_constant_branches(ctx, func),
        removed_blocks: remove_unreachable_blocks(ctx, func),
        merged_blocks: merge_blocks(ctx, func),
        removed_phis: remove_trivial_phis(ctx, func),
    }
}

/// Turn conditional branches on constants (or to a single target) into
/// unconditional ones.
fn fold_constant_branches(ctx: &mut IrContext, func: FuncRef) -> usize {
    let mut folded = 0;
    for block in ctx.func_blocks(func).to_vec() {
        let Some(term) = ctx.terminator(block) else {
            continue;
        };
        if *ctx.inst_kind(term) != InstKind::CondBr {
            continue;
        }
        let targets = ctx.inst_blocks(term).to_vec();
        let (taken, dropped) = match ctx.const_bits(ctx.inst_operands(term)[0]) {
            Some(0) => (targets[1], Some(targets[0])),
            Some(_) => (targets[0], Some(targets[1])),
            None if targets[0] == targets[1] => (targets[0], None),
            None => continue,
        };
        if let Some(dropped) = dropped.filter(|&d| d != taken) {
            for phi in ctx.leading_phis(dropped) {
                ctx.remove_phi_incoming(phi, block);
            }
        }
        let br = ctx.create_inst(InstData::new(InstKind::Br, Type::Void).block(taken));
        ctx.insert_inst_after(term, br);
        ctx.erase_inst(term);
        folded += 1;
    }
    folded
}

/// Erase blocks not reachable from the entry block.
fn remove_unreachable_blocks(ctx: &mut IrContext, func: FuncRef) -> usize {
    let Some(entry) = ctx.entry_block(func) else {
        return 0;
    };
    let mut reachable: HashSet<BlockRef> = HashSet::new();
    let mut stack = vec![entry];
    while let Some(b) = stack.pop() {
        if reachable.insert(b) {
            stack.extend(ctx.successors(b));
        }
    }

    let dead: Vec<BlockRef> = ctx
        .func_blocks(func)
        .iter()
        .copied()
        .filter(|b| !reachable.contains(b))
        .collect();
    if dead.is_empty() {
        return 0;
    }
    for &b in &dead {
        for succ in ctx.successors(b) {
            if reachable.contains(&succ) {
                for phi in ctx.leading_phis(succ) {
                    ctx.remove_phi_incoming(phi, b);
                }
            }
        }
    }
    ctx.erase_blocks(&dead);
    dead.len()
}

/// Merge a block into its unique predecessor when that predecessor
/// branches unconditionally to it and nowhere else.
fn merge_blocks(ctx: &mut IrContext, func: FuncRef) -> usize {
    let mut merged = 0;
    loop {
        let Some((pred, block)) = find_mergeable(ctx, func) else {
            return merged;
        };
        for phi in ctx.leading_phis(block) {
            let incoming = ctx.inst_operands(phi)[0];
            let result = ctx.inst_result(phi).expect("phi has a result");
            ctx.replace_all_uses(result, incoming);
            ctx.erase_inst(phi);
        }
        let br = ctx.terminator(pred).expect("mergeable predecessor has a terminator");
        ctx.erase_inst(br);
        for inst in ctx.block_insts(block).to_vec() {
            ctx.detach_inst(inst);
            ctx.append_inst(pred, inst);
        }
        for succ in ctx.successors(pred) {
            for phi in ctx.leading_phis(succ) {
                ctx.replace_block_in(phi, block, pred);
            }
        }
        ctx.erase_blocks(&[block]);
        merged += 1;
    }
}

fn find_mergeable(ctx: &IrContext, func: FuncRef) -> Option<(BlockRef, BlockRef)> {
    let entry = ctx.entry_block(func)?;
    ctx.func_blocks(func).iter().copied().find_map(|pred| {
        let term = ctx.terminator(pred)?;
        if *ctx.inst_kind(term) != InstKind::Br {
            return None;
        }
        let block = ctx.inst_blocks(term)[0];
        let single_pred = ctx.predecessors(block) == [pred];
        (block != pred && block != entry && single_pred).then_some((pred, block))
    })
}

/// Replace phis whose incoming values are all the same value.
fn remove_trivial_phis(ctx: &mut IrContext, func: FuncRef) -> usize {
    let mut removed = 0;
    for block in ctx.func_blocks(func).to_vec() {
        for phi in ctx.leading_phis(block) {
            let result = ctx.inst_result(phi).expect("phi has a result");
            let mut incoming = ctx
                .inst_operands(phi)
                .iter()
                .copied()
                .filter(|&v| v != result);
            let Some(first) = incoming.next() else {
                continue;
            };
            if incoming.all(|v| v == first) {
                ctx.replace_all_uses(result, first);
                ctx.erase_inst(phi);
                removed += 1;
            }
        }
    }
    removed
}

/// Forward stored and loaded values to later loads of the same slot within
/// each block.
///
/// Distinct allocas never alias. A store through any other pointer, and
/// any call, forgets everything known so far.
pub fn forward_stores(ctx: &mut IrContext, func: FuncRef) -> usize {
    let mut forwarded = 0;
    for block in ctx.func_blocks(func).to_vec() {
        let mut known: HashMap<ValueRef, ValueRef> = HashMap::new();
        for inst in ctx.block_insts(block).to_vec() {
            match ctx.inst_kind(inst).clone() {
                InstKind::Store => {
                    let (value, ptr) = (ctx.inst_operands(inst)[0], ctx.inst_operands(inst)[1]);
                    if is_alloca(ctx, ptr) {
                        known.retain(|&p, _| is_alloca(ctx, p));
                    } else {
                        known.clear();
                    }
                    known.insert(ptr, value);
                }
                InstKind::Load => {
                    let ptr = ctx.inst_operands(inst)[0];
                    let result = ctx.inst_result(inst).expect("load has a result");
                    match known.get(&ptr).copied() {
                        Some(v) if ctx.value_ty(v) == ctx.value_ty(result) => {
                            ctx.replace_all_uses(result, v);
                            forwarded += 1;
                        }
                        _ => {
                            known.insert(ptr, result);
                        }
                    }
                }
                InstKind::Call(_) => known.clear(),
                _ => {}
            }
        }
    }
    forwarded
}

fn is_alloca(ctx: &IrContext, v: ValueRef) -> bool {
    match ctx.value_def(v) {
        ValueDef::Inst(i) => matches!(ctx.inst_kind(i), InstKind::Alloca(_)),
        _ => false,
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
    fn constant_branch_removes_dead_arm() {
        let mut owned = parse_module(
            "m",
            "\
define i32 @f(i32 %a) {
entry:
  br i1 true, label %yes, label %no
yes:
  %x = add i32 %a, 1
  br label %join
no:
  br label %join
join:
  %r = phi i32 [ %x, %yes ], [ 0, %no ]
  ret i32 %r
}
",
        )
        .unwrap();
        let f = owned.func_by_name("f").unwrap();
        let ctx = owned.context_mut();

        let result = simplify_cfg(ctx, f);
        assert_eq!(result.folded_branches, 1);
        assert_eq!(result.removed_blocks, 1);
        assert_snapshot!(print_function(ctx, f, &mut NoAnnotations), @r"
        define i32 @f(i32 %a) {
        entry:
          %x = add i32 %a, 1
          ret i32 %x
        }
        ");
    }

    #[test]
    fn loads_see_earlier_stores() {
        let mut owned = parse_module(
            "m",
            "\
declare void @clobber()

define i32 @f(i32 %a) {
entry:
  %slot = alloca i32
  store i32 %a, ptr %slot
  %v = load i32, ptr %slot
  call void @clobber()
  %w = load i32, ptr %slot
  %s = add i32 %v, %w
  ret i32 %s
}
",
        )
        .unwrap();
        let f = owned.func_by_name("f").unwrap();
        let ctx = owned.context_mut();

        assert_eq!(forward_stores(ctx, f), 1);
        eliminate_dead_code(ctx, f);
        assert_snapshot!(print_function(ctx, f, &mut NoAnnotations), @r"
        define i32 @f(i32 %a) {
        entry:
          %slot = alloca i32
          store i32 %a, ptr %slot
          call void @clobber()
          %w = load i32, ptr %slot
          %s = add i32 %a, %w
          ret i32 %s
        }
        ");
    }
}
