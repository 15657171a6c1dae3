use magnifier_ir::{InstKind, ValueDef};
use tracing::debug;

use crate::error::{ExplorerError, ExplorerResult, SubstitutionError};
use crate::explorer::Explorer;
use crate::id::ValueId;
use crate::observer::{SubstitutionKind, SubstitutionObserver};

impl Explorer {
    /// Replace the result of instruction `id` with the constant `value`, in a
    /// clone of its function.
    ///
    /// `value` is truncated to the instruction's integer width. The
    /// replacement goes through a `ValueSubstitution` hook, so it is reported
    /// to `observer` and constant folding cascades from it. Returns the id of
    /// the clone.
    pub fn substitute_instruction_with_value(
        &mut self,
        id: ValueId,
        value: i64,
        observer: &mut dyn SubstitutionObserver,
    ) -> ExplorerResult<ValueId, SubstitutionError> {
        let Some(inst) = self.resolve_instruction(id) else {
            return Err(self.missing_substitution_target(id));
        };
        let ty = self.ctx.inst_ty(inst);
        if !ty.is_int() {
            return Err(ExplorerError::new(id, SubstitutionError::IncorrectType));
        }

        let func = self
            .ctx
            .inst_func(inst)
            .expect("indexed instruction belongs to a function");
        debug!(func = self.ctx.func_name(func), id, value, "substituting instruction");

        let map = self.clone_with_ids(func);
        let target = *map
            .insts
            .get(&inst)
            .expect("clone maps every instruction of the function");
        let old = self
            .ctx
            .inst_result(target)
            .expect("integer instruction has a result");
        let constant = self.ctx.iconst(ty, value as u64);

        // Phis stay grouped at the top of their block.
        let anchor = match self.ctx.inst_kind(target) {
            InstKind::Phi => {
                let block = self.ctx.inst_block(target).expect("cloned phi is placed");
                *self
                    .ctx
                    .leading_phis(block)
                    .last()
                    .expect("block holding a phi has leading phis")
            }
            _ => target,
        };
        self.hooks.wrap_after(
            &mut self.ctx,
            &mut self.ids,
            anchor,
            SubstitutionKind::ValueSubstitution,
            old,
            constant,
        );

        self.hooks.elide(&mut self.ctx, &mut self.ids, map.func, observer);
        self.hooks.remove_hook_functions(&mut self.ctx);
        Ok(self.update_metadata(map.func))
    }

    /// Replace argument `id` with the constant `value` throughout a clone of
    /// its function. Returns the id of the clone.
    pub fn substitute_argument_with_value(
        &mut self,
        id: ValueId,
        value: i64,
        observer: &mut dyn SubstitutionObserver,
    ) -> ExplorerResult<ValueId, SubstitutionError> {
        let Some(arg) = self.resolve_argument(id) else {
            return Err(self.missing_substitution_target(id));
        };
        let ty = self.ctx.value_ty(arg);
        if !ty.is_int() {
            return Err(ExplorerError::new(id, SubstitutionError::IncorrectType));
        }
        let ValueDef::Arg(func, position) = self.ctx.value_def(arg) else {
            panic!("indexed argument {arg} is not a function parameter");
        };
        debug!(func = self.ctx.func_name(func), id, value, "substituting argument");

        let map = self.clone_with_ids(func);
        let (_, param) = map.args[position as usize];
        let constant = self.ctx.iconst(ty, value as u64);
        let entry = self
            .ctx
            .entry_block(map.func)
            .expect("indexed function has a body");
        let anchor = self
            .ctx
            .first_non_phi(entry)
            .expect("entry block ends in a terminator");
        self.hooks.wrap_before(
            &mut self.ctx,
            &mut self.ids,
            anchor,
            SubstitutionKind::ValueSubstitution,
            param,
            constant,
        );

        self.hooks.elide(&mut self.ctx, &mut self.ids, map.func, observer);
        self.hooks.remove_hook_functions(&mut self.ctx);
        Ok(self.update_metadata(map.func))
    }

    fn missing_substitution_target(&self, id: ValueId) -> ExplorerError<SubstitutionError> {
        let error = if self.resolve_function(id).is_some() {
            SubstitutionError::CannotUseFunctionId
        } else {
            SubstitutionError::IdNotFound
        };
        ExplorerError::new(id, error)
    }
}
