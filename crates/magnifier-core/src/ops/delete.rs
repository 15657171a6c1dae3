use tracing::debug;

use crate::error::{DeletionError, ExplorerError, ExplorerResult};
use crate::explorer::Explorer;
use crate::id::ValueId;

impl Explorer {
    /// Erase function `id` and everything indexed inside it.
    ///
    /// Refused while any instruction outside the function still refers to
    /// it. Recursive calls inside the function itself do not count. The
    /// index keeps its rows, so the ids look up as erased afterwards.
    pub fn delete_function(&mut self, id: ValueId) -> ExplorerResult<(), DeletionError> {
        let func = self
            .resolve_function(id)
            .ok_or(ExplorerError::new(id, DeletionError::IdNotFound))?;
        let addr = self.ctx.func_addr(func);
        let in_use = self
            .ctx
            .uses(addr)
            .iter()
            .any(|u| self.ctx.inst_func(u.user) != Some(func));
        if in_use {
            return Err(ExplorerError::new(id, DeletionError::FunctionInUse));
        }

        debug!(func = self.ctx.func_name(func), id, "deleting function");
        self.forget_function(func);
        self.ctx.erase_function(func);
        Ok(())
    }
}
