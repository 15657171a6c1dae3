//! Substitution hooks.
//!
//! A hook is a call to a transient declaration `T hook(T old, T new)`. It
//! is placed where a value is about to be replaced, so structural rewrites
//! that know nothing about observation (cloning, inlining) carry it along
//! like any other instruction. Afterwards [`SubstitutionHooks::elide`] turns
//! every surviving hook into an observer event and removes it.

use std::collections::HashMap;

use magnifier_ir::{
    FuncRef, InstData, InstKind, InstRef, IntPredicate, IrContext, ModuleRef, Signature, Type,
    ValueDef, ValueRef, fold_instruction, print_inst,
};
use tracing::{debug, trace};

use crate::id::{IdKind, IdLedger, Node};
use crate::observer::{SubstitutionKind, SubstitutionObserver, SubstitutionSite};

const HOOK_PREFIX: &str = "magnifier.substitution_hook";

/// Per-operation registry of hook functions, one per (module, type).
#[derive(Default)]
pub struct SubstitutionHooks {
    functions: HashMap<(ModuleRef, Type), FuncRef>,
}

enum Pending {
    /// A hook call; its operands are read when the entry is processed.
    Hook(InstRef),
    /// An instruction that folded to `value`.
    Folded { inst: InstRef, value: ValueRef },
}

impl SubstitutionHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// The hook function for `ty` in `module`, declared on first request.
    pub fn hook_function(&mut self, ctx: &mut IrContext, module: ModuleRef, ty: Type) -> FuncRef {
        if let Some(&f) = self.functions.get(&(module, ty)) {
            return f;
        }
        let name = ctx.unique_func_name(module, &format!("{HOOK_PREFIX}.{ty}"));
        let f = ctx.create_function(module, name, Signature::new([ty, ty], ty));
        self.functions.insert((module, ty), f);
        f
    }

    /// A detached `hook(old, new)` call tagged with `kind`.
    pub fn create_hook_call(
        &mut self,
        ctx: &mut IrContext,
        ledger: &mut IdLedger,
        module: ModuleRef,
        kind: SubstitutionKind,
        old: ValueRef,
        new: ValueRef,
    ) -> InstRef {
        let ty = ctx.value_ty(old);
        let hook = self.hook_function(ctx, module, ty);
        let sig = ctx.func_sig(hook).clone();
        let addr = ctx.func_addr(hook);
        let call =
            ctx.create_inst(InstData::new(InstKind::Call(sig), ty).operands([addr, old, new]));
        ledger.set_id(Node::Instruction(call), IdKind::Substitution, kind.id());
        call
    }

    /// Insert a hook for `value` before `before` and route every other use of
    /// `value` through it. Returns the hook call.
    pub fn wrap_before(
        &mut self,
        ctx: &mut IrContext,
        ledger: &mut IdLedger,
        before: InstRef,
        kind: SubstitutionKind,
        value: ValueRef,
        new: ValueRef,
    ) -> InstRef {
        let module = self.module_of(ctx, before);
        let hook = self.create_hook_call(ctx, ledger, module, kind, value, new);
        ctx.insert_inst_before(before, hook);
        redirect(ctx, value, hook);
        hook
    }

    /// Like [`wrap_before`](Self::wrap_before), inserting after `after`.
    pub fn wrap_after(
        &mut self,
        ctx: &mut IrContext,
        ledger: &mut IdLedger,
        after: InstRef,
        kind: SubstitutionKind,
        value: ValueRef,
        new: ValueRef,
    ) -> InstRef {
        let module = self.module_of(ctx, after);
        let hook = self.create_hook_call(ctx, ledger, module, kind, value, new);
        ctx.insert_inst_after(after, hook);
        redirect(ctx, value, hook);
        hook
    }

    fn module_of(&self, ctx: &IrContext, inst: InstRef) -> ModuleRef {
        let func = ctx
            .inst_func(inst)
            .expect("hook anchor must be placed in a function");
        ctx.func_module(func)
    }

    pub fn is_hook_call(&self, ctx: &IrContext, inst: InstRef) -> bool {
        ctx.call_callee(inst)
            .is_some_and(|f| self.functions.values().any(|&h| h == f))
    }

    /// Turn every hook call in `func` into an observer event.
    ///
    /// Entries are processed as a stack. Returns the number of events
    /// reported to `observer`.
    pub fn elide(
        &self,
        ctx: &mut IrContext,
        ledger: &mut IdLedger,
        func: FuncRef,
        observer: &mut dyn SubstitutionObserver,
    ) -> usize {
        let mut worklist: Vec<Pending> = ctx
            .func_insts(func)
            .into_iter()
            .filter(|&i| self.is_hook_call(ctx, i))
            .map(Pending::Hook)
            .collect();
        debug!(func = ctx.func_name(func), hooks = worklist.len(), "eliding substitution hooks");

        let mut events = 0;
        while let Some(entry) = worklist.pop() {
            let (site, is_hook) = match entry {
                Pending::Hook(marker) => {
                    if !ctx.is_inst_live(marker) {
                        continue;
                    }
                    let ops = ctx.inst_operands(marker);
                    let site = SubstitutionSite {
                        marker,
                        old: ops[1],
                        new: ops[2],
                        kind: substitution_kind(ledger, marker),
                    };
                    (site, true)
                }
                Pending::Folded { inst, value } => {
                    if !ctx.is_inst_live(inst) || ctx.inst_func(inst) != Some(func) {
                        continue;
                    }
                    let site = SubstitutionSite {
                        marker: inst,
                        old: result_of(ctx, inst),
                        new: value,
                        kind: SubstitutionKind::ConstantFolding,
                    };
                    (site, false)
                }
            };
            events += 1;

            let marker_value = result_of(ctx, site.marker);
            let mut final_value = observer.perform_substitution(ctx, &site);
            if final_value == marker_value && is_hook {
                final_value = site.new;
            }
            trace!(
                marker = %print_inst(ctx, site.marker),
                kind = %site.kind,
                kept = final_value == marker_value,
                "substitution"
            );

            if site.kind == SubstitutionKind::ValueSubstitution && final_value != site.old {
                emit_assumption(ctx, site.marker, site.old, final_value);
            }

            if final_value == marker_value {
                ledger.remove_id(Node::Instruction(site.marker), IdKind::Substitution);
            } else {
                let users = ctx.users(marker_value);
                ctx.replace_all_uses(marker_value, final_value);
                for user in users {
                    if user == site.marker || self.is_hook_call(ctx, user) {
                        continue;
                    }
                    if let Some(value) = fold_instruction(ctx, user) {
                        ledger.set_id(
                            Node::Instruction(user),
                            IdKind::Substitution,
                            SubstitutionKind::ConstantFolding.id(),
                        );
                        worklist.push(Pending::Folded { inst: user, value });
                    }
                }
                ctx.erase_inst(site.marker);
                ledger.forget(Node::Instruction(site.marker));
            }

            if let ValueDef::Inst(old) = ctx.value_def(site.old) {
                if old != site.marker
                    && ctx.is_inst_live(old)
                    && ctx.inst_func(old) == Some(func)
                    && !ctx.has_uses(site.old)
                {
                    ctx.erase_inst(old);
                    ledger.forget(Node::Instruction(old));
                }
            }
        }
        events
    }

    /// Erase every registered hook function and clear the registry.
    ///
    /// # Panics
    ///
    /// Panics if a hook function is still called from anywhere.
    pub fn remove_hook_functions(&mut self, ctx: &mut IrContext) {
        for (_, f) in self.functions.drain() {
            let addr = ctx.func_addr(f);
            assert!(
                !ctx.has_uses(addr),
                "hook function @{} still has uses",
                ctx.func_name(f)
            );
            ctx.erase_function(f);
        }
    }
}

/// Replace every use of `value` except the one in `hook` with the hook's result.
fn redirect(ctx: &mut IrContext, value: ValueRef, hook: InstRef) {
    let result = result_of(ctx, hook);
    ctx.replace_uses_except(value, result, hook);
}

fn result_of(ctx: &IrContext, inst: InstRef) -> ValueRef {
    ctx.inst_result(inst)
        .expect("substitution marker must produce a value")
}

fn substitution_kind(ledger: &IdLedger, marker: InstRef) -> SubstitutionKind {
    let id = ledger.get_id(Node::Instruction(marker), IdKind::Substitution);
    SubstitutionKind::from_id(id)
        .unwrap_or_else(|| panic!("hook call {marker} carries no substitution kind ({id})"))
}

fn emit_assumption(ctx: &mut IrContext, before: InstRef, old: ValueRef, new: ValueRef) {
    let cmp = ctx.create_inst(
        InstData::new(InstKind::Icmp(IntPredicate::Eq), Type::I1).operands([old, new]),
    );
    ctx.insert_inst_before(before, cmp);
    let cond = result_of(ctx, cmp);
    let assume = ctx.create_inst(InstData::new(InstKind::Assume, Type::Void).operand(cond));
    ctx.insert_inst_before(before, assume);
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;
    use magnifier_ir::{NoAnnotations, parse_module_into, print_function};

    fn setup(text: &str) -> (IrContext, FuncRef) {
        let mut ctx = IrContext::new();
        let m = parse_module_into(&mut ctx, "m", text).unwrap();
        let f = ctx.func_by_name(m, "f").unwrap();
        (ctx, f)
    }

    #[test]
    fn value_substitution_cascades_through_folding() {
        let (mut ctx, f) = setup(
            "\
define i32 @f(i32 %x) {
entry:
  %y = add i32 %x, 1
  %z = mul i32 %y, 2
  ret i32 %z
}
",
        );
        let mut ledger = IdLedger::new();
        let mut hooks = SubstitutionHooks::new();
        let x = ctx.func_param(f, 0);
        let five = ctx.iconst(Type::I32, 5);
        let first = ctx.func_insts(f)[0];
        let kind = SubstitutionKind::ValueSubstitution;
        hooks.wrap_before(&mut ctx, &mut ledger, first, kind, x, five);

        let mut seen = Vec::new();
        let mut observer = |_: &mut IrContext, site: &SubstitutionSite| {
            seen.push(site.kind);
            site.new
        };
        let events = hooks.elide(&mut ctx, &mut ledger, f, &mut observer);
        hooks.remove_hook_functions(&mut ctx);

        assert_eq!(events, 3);
        assert_eq!(
            seen,
            [
                SubstitutionKind::ValueSubstitution,
                SubstitutionKind::ConstantFolding,
                SubstitutionKind::ConstantFolding,
            ]
        );
        assert!(hooks.is_empty());
        assert!(ledger.is_empty());
        assert_snapshot!(print_function(&ctx, f, &mut NoAnnotations), @r"
        define i32 @f(i32 %x) {
        entry:
          %0 = icmp eq i32 %x, 5
          assume i1 %0
          ret i32 12
        }
        ");
    }

    #[test]
    fn observer_can_keep_a_folded_instruction() {
        let (mut ctx, f) = setup(
            "\
define i32 @f(i32 %x) {
entry:
  %y = add i32 %x, 1
  ret i32 %y
}
",
        );
        let mut ledger = IdLedger::new();
        let mut hooks = SubstitutionHooks::new();
        let x = ctx.func_param(f, 0);
        let two = ctx.iconst(Type::I32, 2);
        let first = ctx.func_insts(f)[0];
        hooks.wrap_before(&mut ctx, &mut ledger, first, SubstitutionKind::Argument, x, two);

        let mut observer = |ctx: &mut IrContext, site: &SubstitutionSite| match site.kind {
            SubstitutionKind::ConstantFolding => ctx.inst_result(site.marker).unwrap(),
            _ => site.new,
        };
        hooks.elide(&mut ctx, &mut ledger, f, &mut observer);
        hooks.remove_hook_functions(&mut ctx);

        assert!(ledger.is_empty());
        assert_snapshot!(print_function(&ctx, f, &mut NoAnnotations), @r"
        define i32 @f(i32 %x) {
        entry:
          %y = add i32 2, 1
          ret i32 %y
        }
        ");
    }

    #[test]
    fn hook_functions_are_shared_per_type() {
        let (mut ctx, f) = setup("define i32 @f(i32 %x) {\nentry:\n  ret i32 %x\n}\n");
        let m = ctx.func_module(f);
        let mut hooks = SubstitutionHooks::new();
        let a = hooks.hook_function(&mut ctx, m, Type::I32);
        let b = hooks.hook_function(&mut ctx, m, Type::I32);
        let c = hooks.hook_function(&mut ctx, m, Type::I8);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(ctx.func_name(a), "magnifier.substitution_hook.i32");

        hooks.remove_hook_functions(&mut ctx);
        assert_eq!(ctx.module_funcs(m), [f]);
    }
}
