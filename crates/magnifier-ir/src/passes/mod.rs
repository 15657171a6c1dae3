//! Optimization pipelines.
//!
//! Passes operate directly on `IrContext` with in-place mutations, using
//! use-chains for dead code detection and RAUW for value replacement.
//! [`optimize_function`] runs the pipeline for an [`OptLevel`].

pub mod cfg;
pub mod dce;
pub mod simplify;

use std::fmt;

use tracing::debug;

use crate::context::IrContext;
use crate::inline::{InlineOptions, inline_call};
use crate::refs::FuncRef;

pub use cfg::{CfgResult, forward_stores, simplify_cfg};
pub use dce::{DceResult, eliminate_dead_code};
pub use simplify::{SimplifyResult, simplify_function, simplify_instruction};

/// Optimization level, as in `-O0` .. `-O3`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OptLevel {
    O0,
    O1,
    O2,
    O3,
}

impl OptLevel {
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            0 => Some(OptLevel::O0),
            1 => Some(OptLevel::O1),
            2 => Some(OptLevel::O2),
            3 => Some(OptLevel::O3),
            _ => None,
        }
    }

    pub fn number(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "O{}", self.number())
    }
}

/// What a pipeline run changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassStats {
    pub folded: usize,
    pub simplified: usize,
    pub removed_insts: usize,
    pub folded_branches: usize,
    pub removed_blocks: usize,
    pub merged_blocks: usize,
    pub removed_phis: usize,
    pub forwarded_loads: usize,
    pub inlined_calls: usize,
    /// Pipeline iterations until nothing changed.
    pub iterations: usize,
}

const MAX_ITERATIONS: usize = 32;

/// Callees at most this large are inlined at `O3`.
const O3_INLINE_LIMIT: usize = 64;

/// Run the pipeline for `level` over `func`.
pub fn optimize_function(ctx: &mut IrContext, func: FuncRef, level: OptLevel) -> PassStats {
    let mut stats = PassStats::default();
    if level == OptLevel::O0 || ctx.is_declaration(func) {
        return stats;
    }

    if level == OptLevel::O3 {
        run_to_fixpoint(ctx, func, OptLevel::O2, &mut stats);
        stats.inlined_calls = inline_small_callees(ctx, func);
    }
    run_to_fixpoint(ctx, func, level.min(OptLevel::O2), &mut stats);

    debug!(func = ctx.func_name(func), %level, ?stats, "optimized function");
    stats
}

fn run_to_fixpoint(ctx: &mut IrContext, func: FuncRef, level: OptLevel, stats: &mut PassStats) {
    for _ in 0..MAX_ITERATIONS {
        stats.iterations += 1;
        let mut changed = false;

        if level >= OptLevel::O2 {
            let forwarded = forward_stores(ctx, func);
            stats.forwarded_loads += forwarded;
            changed |= forwarded > 0;
        }

        let simplified = simplify_function(ctx, func);
        stats.folded += simplified.folded;
        stats.simplified += simplified.simplified;
        changed |= simplified != SimplifyResult::default();

        if level >= OptLevel::O2 {
            let cfg = simplify_cfg(ctx, func);
            stats.folded_branches += cfg.folded_branches;
            stats.removed_blocks += cfg.removed_blocks;
            stats.merged_blocks += cfg.merged_blocks;
            stats.removed_phis += cfg.removed_phis;
            changed |= cfg.changed();
        }

        let dce = eliminate_dead_code(ctx, func);
        stats.removed_insts += dce.removed_count;
        changed |= dce.removed_count > 0;

        if !changed {
            return;
        }
    }
}

/// Inline every direct call in `func` to a small, defined, non-recursive
/// callee. Calls exposed by inlining are not revisited.
fn inline_small_callees(ctx: &mut IrContext, func: FuncRef) -> usize {
    let options = InlineOptions {
        max_callee_insts: O3_INLINE_LIMIT,
    };
    let calls: Vec<_> = ctx
        .func_insts(func)
        .into_iter()
        .filter(|&i| ctx.call_callee(i).is_some_and(|callee| callee != func))
        .collect();
    calls
        .into_iter()
        .filter(|&call| inline_call(ctx, call, &options).is_ok())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;
    use crate::printer::{NoAnnotations, print_function};
    use insta::assert_snapshot;

    const SRC: &str = "\
define i32 @sq(i32 %x) {
entry:
  %r = mul i32 %x, %x
  ret i32 %r
}

define i32 @f(i32 %a) {
entry:
  %slot = alloca i32
  store i32 3, ptr %slot
  %v = load i32, ptr %slot
  %c = icmp eq i32 %v, 3
  br i1 %c, label %yes, label %no
yes:
  %s = call i32 @sq(i32 %v)
  br label %join
no:
  br label %join
join:
  %r = phi i32 [ %s, %yes ], [ %a, %no ]
  ret i32 %r
}
";

    fn optimized(level: OptLevel) -> (String, PassStats) {
        let mut owned = parse_module("m", SRC).unwrap();
        let f = owned.func_by_name("f").unwrap();
        let ctx = owned.context_mut();
        let stats = optimize_function(ctx, f, level);
        (print_function(ctx, f, &mut NoAnnotations), stats)
    }

    #[test]
    fn o0_changes_nothing() {
        let (text, stats) = optimized(OptLevel::O0);
        assert_eq!(stats, PassStats::default());
        assert_eq!(text, SRC.split_once("\n\n").unwrap().1);
    }

    #[test]
    fn o1_keeps_control_flow() {
        let (text, stats) = optimized(OptLevel::O1);
        assert_eq!(stats.forwarded_loads, 0);
        assert_eq!(stats.removed_blocks, 0);
        assert!(text.contains("br i1 %c, label %yes, label %no"));
    }

    #[test]
    fn o2_folds_the_branch() {
        let (text, stats) = optimized(OptLevel::O2);
        assert_eq!(stats.forwarded_loads, 1);
        assert_snapshot!(text, @r"
        define i32 @f(i32 %a) {
        entry:
          %s = call i32 @sq(i32 3)
          ret i32 %s
        }
        ");
    }

    #[test]
    fn o3_inlines_and_folds() {
        let (text, stats) = optimized(OptLevel::O3);
        assert_eq!(stats.inlined_calls, 1);
        assert_snapshot!(text, @r"
        define i32 @f(i32 %a) {
        entry:
          ret i32 9
        }
        ");
    }

    #[test]
    fn levels_parse_from_numbers() {
        assert_eq!(OptLevel::from_number(2), Some(OptLevel::O2));
        assert_eq!(OptLevel::from_number(4), None);
        assert_eq!(OptLevel::O3.to_string(), "O3");
    }
}
