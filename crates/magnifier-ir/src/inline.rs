//! Call-site inlining.
//!
//! The callee body is instantiated from a [`BodyTemplate`] with the call's
//! arguments standing in for the parameters, so the callee itself is never
//! touched. A single-block callee ending in `ret` is spliced in front of the
//! call. Anything else splits the calling block:
//!
//! ```text
//! caller:                      caller:
//!   %r = call @f(...)    =>      br label %f.entry
//!   <rest>                     f.entry: ...  ret => br label %caller.split
//!                              caller.split:
//!                                %r = phi [ ... ]   ; one entry per ret
//!                                <rest>
//! ```

use std::collections::HashMap;

use derive_more::{Display, Error};
use tracing::debug;

use crate::body::BodyTemplate;
use crate::context::{InstData, IrContext};
use crate::instructions::InstKind;
use crate::refs::*;
use crate::types::Type;

/// Limits applied by [`inline_call`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineOptions {
    /// Callees with more instructions than this are refused.
    pub max_callee_insts: usize,
}

impl Default for InlineOptions {
    fn default() -> Self {
        Self {
            max_callee_insts: 4096,
        }
    }
}

/// Why a call site could not be inlined.
#[derive(Clone, Debug, PartialEq, Eq, Display, Error)]
pub enum InlineFailure {
    #[display("instruction is not a call")]
    NotACall,
    #[display("call is indirect")]
    IndirectCall,
    #[display("callee has no body")]
    CalleeHasNoBody,
    #[display("callee is variadic")]
    VariadicCallee,
    #[display("callee expects {expected} argument(s), call passes {found}")]
    ArgumentCountMismatch { expected: usize, found: usize },
    #[display("callee has {insts} instructions, limit is {limit}")]
    CalleeTooLarge { insts: usize, limit: usize },
}

/// What [`inline_call`] produced.
#[derive(Debug)]
pub struct InlinedCall {
    /// Callee instruction to its live copy in the caller.
    pub inst_map: HashMap<InstRef, InstRef>,
    /// Blocks added to the caller, in layout order. Empty when the body was
    /// spliced into the calling block.
    pub blocks: Vec<BlockRef>,
    /// The value that replaced the call's result, if it had one.
    pub result: Option<ValueRef>,
}

/// Inline the direct call `call` into its function.
///
/// On failure nothing is modified. On success `call` is erased.
pub fn inline_call(
    ctx: &mut IrContext,
    call: InstRef,
    options: &InlineOptions,
) -> Result<InlinedCall, InlineFailure> {
    if !ctx.inst_kind(call).is_call() {
        return Err(InlineFailure::NotACall);
    }
    let callee = ctx.call_callee(call).ok_or(InlineFailure::IndirectCall)?;
    if ctx.is_declaration(callee) {
        return Err(InlineFailure::CalleeHasNoBody);
    }
    let sig = ctx.func_sig(callee);
    if sig.variadic {
        return Err(InlineFailure::VariadicCallee);
    }
    let args = ctx.call_args(call).to_vec();
    if args.len() != sig.params.len() {
        return Err(InlineFailure::ArgumentCountMismatch {
            expected: sig.params.len(),
            found: args.len(),
        });
    }
    let insts = ctx.func_inst_count(callee);
    if insts > options.max_callee_insts {
        return Err(InlineFailure::CalleeTooLarge {
            insts,
            limit: options.max_callee_insts,
        });
    }

    let block = ctx
        .inst_block(call)
        .expect("inline_call: call is not placed in a block");
    let template = BodyTemplate::capture(ctx, callee);
    let body = template.instantiate(ctx, &args, |f| f);
    let mut inst_map = body.inst_map;

    let spliced = body.blocks.len() == 1
        && ctx
            .terminator(body.blocks[0])
            .is_some_and(|t| *ctx.inst_kind(t) == InstKind::Ret);

    let (blocks, result) = if spliced {
        let only = body.blocks[0];
        let insts = ctx.block_insts(only).to_vec();
        let (&ret, rest) = insts.split_last().expect("spliced body has a terminator");
        for &i in rest {
            ctx.detach_inst(i);
            ctx.insert_inst_before(call, i);
        }
        let value = ctx.inst_operands(ret).first().copied();
        ctx.erase_inst(ret);
        ctx.erase_blocks(&[only]);
        replace_call_result(ctx, call, value);
        ctx.erase_inst(call);
        (Vec::new(), value)
    } else {
        let tail = ctx.split_block_after(call);
        let mut prev = block;
        for &b in &body.blocks {
            ctx.insert_block_after(prev, b);
            prev = b;
        }

        let mut returns: Vec<(ValueRef, BlockRef)> = Vec::new();
        for &b in &body.blocks {
            let Some(term) = ctx.terminator(b) else {
                continue;
            };
            if *ctx.inst_kind(term) != InstKind::Ret {
                continue;
            }
            if let Some(&v) = ctx.inst_operands(term).first() {
                returns.push((v, b));
            }
            let br = ctx.create_inst(InstData::new(InstKind::Br, Type::Void).block(tail));
            ctx.insert_inst_after(term, br);
            ctx.erase_inst(term);
        }

        let value = match ctx.inst_result(call) {
            None => None,
            Some(old) => {
                let ty = ctx.value_ty(old);
                let merged = match returns.as_slice() {
                    [] => ctx.undef(ty),
                    [(v, _)] => *v,
                    _ => {
                        let phi = ctx.create_inst(
                            InstData::new(InstKind::Phi, ty)
                                .operands(returns.iter().map(|&(v, _)| v))
                                .blocks(returns.iter().map(|&(_, b)| b)),
                        );
                        match ctx.block_insts(tail).first().copied() {
                            Some(first) => ctx.insert_inst_before(first, phi),
                            None => ctx.append_inst(tail, phi),
                        }
                        let merged = ctx.inst_result(phi).expect("phi has a result");
                        let name = ctx.value_name(old).map(str::to_owned);
                        ctx.set_value_name(merged, name);
                        merged
                    }
                };
                Some(merged)
            }
        };
        replace_call_result(ctx, call, value);

        let br = ctx.create_inst(InstData::new(InstKind::Br, Type::Void).block(body.blocks[0]));
        ctx.insert_inst_after(call, br);
        ctx.erase_inst(call);
        (body.blocks, value)
    };

    inst_map.retain(|_, i| ctx.is_inst_live(*i));
    debug!(
        callee = ctx.func_name(callee),
        insts = inst_map.len(),
        spliced,
        "inlined call"
    );
    Ok(InlinedCall {
        inst_map,
        blocks,
        result,
    })
}

fn replace_call_result(ctx: &mut IrContext, call: InstRef, value: Option<ValueRef>) {
    let Some(old) = ctx.inst_result(call) else {
        return;
    };
    let new = match value {
        Some(v) => v,
        None => ctx.undef(ctx.value_ty(old)),
    };
    ctx.replace_all_uses(old, new);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;
    use crate::printer::{NoAnnotations, print_function};
    use insta::assert_snapshot;

    fn first_call(ctx: &IrContext, func: FuncRef) -> InstRef {
        ctx.func_insts(func)
            .into_iter()
            .find(|&i| ctx.inst_kind(i).is_call())
            .unwrap()
    }

    #[test]
    fn single_block_callee_is_spliced() {
        let mut owned = parse_module(
            "m",
            "\
define i32 @add(i32 %a, i32 %b) {
entry:
  %sum = add i32 %a, %b
  ret i32 %sum
}

define i32 @call() {
entry:
  %r = call i32 @add(i32 1, i32 2)
  ret i32 %r
}
",
        )
        .unwrap();
        let caller = owned.func_by_name("call").unwrap();
        let ctx = owned.context_mut();
        let call = first_call(ctx, caller);

        let inlined = inline_call(ctx, call, &InlineOptions::default()).unwrap();
        assert!(inlined.blocks.is_empty());
        assert_eq!(inlined.inst_map.len(), 1);
        assert!(!ctx.is_inst_live(call));
        assert_snapshot!(print_function(ctx, caller, &mut NoAnnotations), @r"
        define i32 @call() {
        entry:
          %sum = add i32 1, 2
          ret i32 %sum
        }
        ");
    }

    #[test]
    fn multi_block_callee_merges_returns() {
        let mut owned = parse_module(
            "m",
            "\
define i32 @abs(i32 %x) {
entry:
  %neg = icmp slt i32 %x, 0
  br i1 %neg, label %flip, label %keep
flip:
  %y = sub i32 0, %x
  ret i32 %y
keep:
  ret i32 %x
}

define i32 @g(i32 %v) {
entry:
  %a = call i32 @abs(i32 %v)
  %b = add i32 %a, 1
  ret i32 %b
}
",
        )
        .unwrap();
        let caller = owned.func_by_name("g").unwrap();
        let ctx = owned.context_mut();
        let call = first_call(ctx, caller);

        let inlined = inline_call(ctx, call, &InlineOptions::default()).unwrap();
        assert_eq!(inlined.blocks.len(), 3);
        assert_snapshot!(print_function(ctx, caller, &mut NoAnnotations), @r"
        define i32 @g(i32 %v) {
        entry:
          br label %entry.1
        entry.1:
          %neg = icmp slt i32 %v, 0
          br i1 %neg, label %flip, label %keep
        flip:
          %y = sub i32 0, %v
          br label %entry.split
        keep:
          br label %entry.split
        entry.split:
          %a = phi i32 [ %y, %flip ], [ %v, %keep ]
          %b = add i32 %a, 1
          ret i32 %b
        }
        ");
    }

    #[test]
    fn refusals_leave_the_caller_untouched() {
        let mut owned = parse_module(
            "m",
            "\
declare i32 @ext(i32)
declare i32 @vararg(i32, ...)

define i32 @big(i32 %a) {
entry:
  %x = add i32 %a, 1
  %y = add i32 %x, 1
  ret i32 %y
}

define i32 @g(i32 %v, ptr %p) {
entry:
  %a = call i32 @ext(i32 %v)
  %b = call i32 (i32, ...) @vararg(i32 %a, i32 1)
  %c = call i32 @big(i32 %b)
  %d = call i32 %p(i32 %c)
  %e = add i32 %d, 1
  ret i32 %e
}
",
        )
        .unwrap();
        let caller = owned.func_by_name("g").unwrap();
        let ctx = owned.context_mut();
        let before = print_function(ctx, caller, &mut NoAnnotations);
        let insts = ctx.func_insts(caller);
        let small = InlineOptions {
            max_callee_insts: 2,
        };

        assert_eq!(
            inline_call(ctx, insts[0], &small).unwrap_err(),
            InlineFailure::CalleeHasNoBody
        );
        assert_eq!(
            inline_call(ctx, insts[1], &small).unwrap_err(),
            InlineFailure::CalleeHasNoBody
        );
        assert_eq!(
            inline_call(ctx, insts[2], &small).unwrap_err(),
            InlineFailure::CalleeTooLarge { insts: 3, limit: 2 }
        );
        assert_eq!(
            inline_call(ctx, insts[3], &small).unwrap_err(),
            InlineFailure::IndirectCall
        );
        assert_eq!(
            inline_call(ctx, insts[4], &small).unwrap_err(),
            InlineFailure::NotACall
        );
        assert_eq!(print_function(ctx, caller, &mut NoAnnotations), before);
    }

    #[test]
    fn void_callee_without_return_value() {
        let mut owned = parse_module(
            "m",
            "\
define void @sink(ptr %p) {
entry:
  store i32 0, ptr %p
  ret void
}

define void @g(ptr %p) {
entry:
  call void @sink(ptr %p)
  ret void
}
",
        )
        .unwrap();
        let caller = owned.func_by_name("g").unwrap();
        let ctx = owned.context_mut();
        let call = first_call(ctx, caller);

        let inlined = inline_call(ctx, call, &InlineOptions::default()).unwrap();
        assert_eq!(inlined.result, None);
        assert_snapshot!(print_function(ctx, caller, &mut NoAnnotations), @r"
        define void @g(ptr %p) {
        entry:
          store i32 0, ptr %p
          ret void
        }
        ");
    }
}
