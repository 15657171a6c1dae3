use magnifier_ir::OptLevel;
use tracing::debug;

use crate::error::{ExplorerError, ExplorerResult, OptimizationError};
use crate::explorer::Explorer;
use crate::id::ValueId;

impl Explorer {
    /// Run the optimization pipeline for `level` on a clone of function
    /// `id`. Returns the id of the clone.
    pub fn optimize_function(
        &mut self,
        id: ValueId,
        level: OptLevel,
    ) -> ExplorerResult<ValueId, OptimizationError> {
        if level == OptLevel::O0 {
            return Err(ExplorerError::new(id, OptimizationError::InvalidOptimizationLevel));
        }
        let func = self
            .resolve_function(id)
            .ok_or(ExplorerError::new(id, OptimizationError::IdNotFound))?;

        let map = self.clone_with_ids(func);
        let stats = magnifier_ir::optimize_function(&mut self.ctx, map.func, level);
        debug!(func = self.ctx.func_name(func), %level, ?stats, "optimized function");
        Ok(self.update_metadata(map.func))
    }
}
