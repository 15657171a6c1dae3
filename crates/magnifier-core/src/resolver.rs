//! Call-site resolution policies for inlining.

use magnifier_ir::{FuncRef, InstRef, IrContext};

/// Picks the function a call site should be inlined from.
///
/// `known_callee` is the direct target, or `None` for an indirect call.
pub trait FunctionResolver {
    fn resolve_call_site(
        &mut self,
        ctx: &IrContext,
        call: InstRef,
        known_callee: Option<FuncRef>,
    ) -> Option<FuncRef>;
}

/// Inlines exactly what the call already targets.
pub struct DirectCallResolver;

impl FunctionResolver for DirectCallResolver {
    fn resolve_call_site(
        &mut self,
        _ctx: &IrContext,
        _call: InstRef,
        known_callee: Option<FuncRef>,
    ) -> Option<FuncRef> {
        known_callee
    }
}

/// Resolves declarations to a same-named definition with the same
/// signature in any module of the context.
pub struct LinkingResolver;

impl FunctionResolver for LinkingResolver {
    fn resolve_call_site(
        &mut self,
        ctx: &IrContext,
        _call: InstRef,
        known_callee: Option<FuncRef>,
    ) -> Option<FuncRef> {
        let callee = known_callee?;
        if !ctx.is_declaration(callee) {
            return Some(callee);
        }
        let name = ctx.func_name(callee);
        let sig = ctx.func_sig(callee);
        ctx.modules()
            .flat_map(|m| ctx.module_funcs(m).iter().copied())
            .find(|&f| !ctx.is_declaration(f) && ctx.func_name(f) == name && ctx.func_sig(f) == sig)
            .or(Some(callee))
    }
}

impl<F> FunctionResolver for F
where
    F: FnMut(&IrContext, InstRef, Option<FuncRef>) -> Option<FuncRef>,
{
    fn resolve_call_site(
        &mut self,
        ctx: &IrContext,
        call: InstRef,
        known_callee: Option<FuncRef>,
    ) -> Option<FuncRef> {
        self(ctx, call, known_callee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use magnifier_ir::{parse_module_into, InstKind};

    #[test]
    fn linking_resolver_finds_definitions_in_other_modules() {
        let mut ctx = IrContext::new();
        let lib = parse_module_into(
            &mut ctx,
            "lib",
            "define i32 @inc(i32 %x) {\nentry:\n  %y = add i32 %x, 1\n  ret i32 %y\n}\n",
        )
        .unwrap();
        let app = parse_module_into(
            &mut ctx,
            "app",
            "\
declare i32 @inc(i32)

define i32 @main() {
entry:
  %r = call i32 @inc(i32 1)
  ret i32 %r
}
",
        )
        .unwrap();
        let main = ctx.func_by_name(app, "main").unwrap();
        let call = ctx
            .func_insts(main)
            .into_iter()
            .find(|&i| matches!(ctx.inst_kind(i), InstKind::Call(_)))
            .unwrap();
        let decl = ctx.call_callee(call);
        let def = ctx.func_by_name(lib, "inc");

        assert_eq!(DirectCallResolver.resolve_call_site(&ctx, call, decl), decl);
        assert_eq!(LinkingResolver.resolve_call_site(&ctx, call, decl), def);
    }
}
