use tracing::debug;

use crate::error::{DevirtualizeError, ExplorerError, ExplorerResult};
use crate::explorer::Explorer;
use crate::id::ValueId;
use crate::observer::{SubstitutionKind, SubstitutionObserver};

impl Explorer {
    /// Make the indirect call `inst_id` call function `func_id` directly,
    /// in a clone of its function.
    ///
    /// The callee rewrite is reported to `observer` as a
    /// `FunctionDevirtualization` event. Returns the id of the clone.
    pub fn devirtualize_function(
        &mut self,
        inst_id: ValueId,
        func_id: ValueId,
        observer: &mut dyn SubstitutionObserver,
    ) -> ExplorerResult<ValueId, DevirtualizeError> {
        let call = self
            .resolve_instruction(inst_id)
            .ok_or(ExplorerError::new(inst_id, DevirtualizeError::InstructionNotFound))?;
        if !self.ctx.inst_kind(call).is_call() {
            return Err(ExplorerError::new(inst_id, DevirtualizeError::NotACallBaseInstruction));
        }
        let target = self
            .resolve_function(func_id)
            .ok_or(ExplorerError::new(func_id, DevirtualizeError::FunctionNotFound))?;
        if self.ctx.call_callee(call).is_some() {
            return Err(ExplorerError::new(inst_id, DevirtualizeError::NotAIndirectCall));
        }
        let arg_count = self.ctx.call_args(call).len();
        if !self.ctx.func_sig(target).accepts_arg_count(arg_count) {
            return Err(ExplorerError::new(inst_id, DevirtualizeError::ArgNumMismatch));
        }

        let caller = self
            .ctx
            .inst_func(call)
            .expect("indexed instruction belongs to a function");
        debug!(
            caller = self.ctx.func_name(caller),
            target = self.ctx.func_name(target),
            inst_id,
            "devirtualizing call"
        );

        let map = self.clone_with_ids(caller);
        let cloned_call = *map
            .insts
            .get(&call)
            .expect("clone maps every instruction of the caller");
        let old_callee = self.ctx.inst_operands(cloned_call)[0];
        let addr = self.ctx.func_addr(target);
        let module = self.ctx.func_module(map.func);
        let hook = self.hooks.create_hook_call(
            &mut self.ctx,
            &mut self.ids,
            module,
            SubstitutionKind::FunctionDevirtualization,
            old_callee,
            addr,
        );
        self.ctx.insert_inst_before(cloned_call, hook);
        let hooked = self
            .ctx
            .inst_result(hook)
            .expect("pointer hook produces a value");
        self.ctx.set_operand(cloned_call, 0, hooked);

        self.hooks.elide(&mut self.ctx, &mut self.ids, map.func, observer);
        self.hooks.remove_hook_functions(&mut self.ctx);
        Ok(self.update_metadata(map.func))
    }
}
