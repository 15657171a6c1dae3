use magnifier_ir::{FuncRef, InstData, InstKind, InstRef, inline_call};
use tracing::debug;

use crate::error::{ExplorerError, ExplorerResult, InlineError};
use crate::explorer::Explorer;
use crate::id::{Node, ValueId};
use crate::observer::{SubstitutionKind, SubstitutionObserver};
use crate::resolver::FunctionResolver;

impl Explorer {
    /// Inline the call instruction `id` into a clone of its function.
    ///
    /// `resolver` picks the function whose body is inlined. Parameters and
    /// the call's result are routed through substitution hooks, so
    /// `observer` sees one `Argument` event per parameter, one
    /// `ReturnValue` event for a non-void call, and the constant folding
    /// that follows. Returns the id of the mutated clone.
    pub fn inline_function_call(
        &mut self,
        id: ValueId,
        resolver: &mut dyn FunctionResolver,
        observer: &mut dyn SubstitutionObserver,
    ) -> ExplorerResult<ValueId, InlineError> {
        let fail = |error| ExplorerError::new(id, error);

        let call = self
            .resolve_instruction(id)
            .ok_or(fail(InlineError::InstructionNotFound))?;
        let InstKind::Call(call_sig) = self.ctx.inst_kind(call).clone() else {
            return Err(fail(InlineError::NotACallBaseInstruction));
        };
        let known = self.ctx.call_callee(call);
        let callee = resolver
            .resolve_call_site(&self.ctx, call, known)
            .filter(|&f| self.ctx.is_func_live(f) && !self.ctx.is_declaration(f))
            .ok_or(fail(InlineError::CannotResolveFunction))?;
        let sig = self.ctx.func_sig(callee);
        if sig.variadic {
            return Err(fail(InlineError::VariadicFunction));
        }
        if *sig != call_sig {
            return Err(fail(InlineError::ResolveFunctionTypeMismatch));
        }

        let caller = self
            .ctx
            .inst_func(call)
            .expect("indexed instruction belongs to a function");
        debug!(
            caller = self.ctx.func_name(caller),
            callee = self.ctx.func_name(callee),
            id,
            "inlining call"
        );

        let callee_clone = self.clone_with_ids(callee).func;
        self.hook_parameters(callee_clone);

        let caller_map = self.clone_with_ids(caller);
        let cloned_call = *caller_map
            .insts
            .get(&call)
            .expect("clone maps every instruction of the caller");
        let target = self.hook_return_value(cloned_call);
        let addr = self.ctx.func_addr(callee_clone);
        self.ctx.set_operand(target, 0, addr);

        let inlined = match inline_call(&mut self.ctx, target, &self.config.inline) {
            Ok(inlined) => inlined,
            Err(failure) => {
                debug!(%failure, "inlining failed, discarding clones");
                self.discard_function(caller_map.func);
                self.discard_function(callee_clone);
                self.hooks.remove_hook_functions(&mut self.ctx);
                return Err(fail(InlineError::InlineOperationFailed(failure)));
            }
        };

        for (&from, &to) in &inlined.inst_map {
            self.ids.copy_ids(Node::Instruction(from), Node::Instruction(to));
        }
        self.discard_function(callee_clone);

        self.hooks
            .elide(&mut self.ctx, &mut self.ids, caller_map.func, observer);
        self.hooks.remove_hook_functions(&mut self.ctx);
        Ok(self.update_metadata(caller_map.func))
    }

    /// Route every use of each parameter of `func` through an `Argument` hook
    /// placed at the top of the entry block.
    fn hook_parameters(&mut self, func: FuncRef) {
        let entry = self
            .ctx
            .entry_block(func)
            .expect("resolved callee has a body");
        let anchor = self
            .ctx
            .first_non_phi(entry)
            .expect("entry block ends in a terminator");
        for param in self.ctx.func_params(func).to_vec() {
            self.hooks.wrap_before(
                &mut self.ctx,
                &mut self.ids,
                anchor,
                SubstitutionKind::Argument,
                param,
                param,
            );
        }
    }

    /// Put a duplicate of `call` right after it and route the original
    /// result through a `ReturnValue` hook fed by the duplicate. Returns the
    /// call to inline: the duplicate, or `call` itself when it has no result.
    fn hook_return_value(&mut self, call: InstRef) -> InstRef {
        let Some(old) = self.ctx.inst_result(call) else {
            return call;
        };
        let data = self.ctx.inst(call);
        let dup = InstData::new(data.kind.clone(), data.ty).operands(data.operands.iter().copied());
        let dup = self.ctx.create_inst(dup);
        self.ctx.insert_inst_after(call, dup);

        let new = self
            .ctx
            .inst_result(dup)
            .expect("duplicate of a value-producing call has a result");
        self.hooks.wrap_after(
            &mut self.ctx,
            &mut self.ids,
            dup,
            SubstitutionKind::ReturnValue,
            old,
            new,
        );
        dup
    }
}
