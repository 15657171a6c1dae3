//! The explorer: shared IR context, id bookkeeping and ingestion.
//!
//! All ingested modules live in one [`IrContext`]. Every function that is
//! (re-)indexed gets fresh derived ids through
//! [`update_metadata`](Explorer::update_metadata), while original ids
//! survive clones through the ledger. The transformation operations live in
//! [`crate::ops`] as further `impl Explorer` blocks.

use magnifier_ir::{
    BlockRef, CloneMap, FuncRef, InstRef, IrContext, ModuleRef, OwnedModule, ParseError,
    ValueRef, clone_function, import_module_into, parse_module, print_function, verify_function,
};
use tracing::{debug, warn};

use crate::annotate::IdCommentWriter;
use crate::config::ExplorerConfig;
use crate::hooks::SubstitutionHooks;
use crate::id::{INVALID_VALUE_ID, IdAllocator, IdKind, IdLedger, Node, ValueId};
use crate::index::{Lookup, ValueIndex};

/// Whether a function came from an ingested module or from an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionKind {
    Original,
    Generated,
}

/// Identity-preserving IR explorer.
///
/// Not thread-safe: every mutation takes `&mut self`, and one explorer
/// serves one session.
pub struct Explorer {
    pub(crate) ctx: IrContext,
    modules: Vec<ModuleRef>,
    pub(crate) ids: IdLedger,
    alloc: IdAllocator,
    pub(crate) index: ValueIndex,
    pub(crate) hooks: SubstitutionHooks,
    pub(crate) config: ExplorerConfig,
}

impl Default for Explorer {
    fn default() -> Self {
        Self::new()
    }
}

impl Explorer {
    pub fn new() -> Self {
        Self::with_config(ExplorerConfig::default())
    }

    pub fn with_config(config: ExplorerConfig) -> Self {
        Self {
            ctx: IrContext::new(),
            modules: Vec::new(),
            ids: IdLedger::new(),
            alloc: IdAllocator::default(),
            index: ValueIndex::new(),
            hooks: SubstitutionHooks::new(),
            config,
        }
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    pub fn context(&self) -> &IrContext {
        &self.ctx
    }

    /// Ingested modules in ingestion order.
    pub fn modules(&self) -> &[ModuleRef] {
        &self.modules
    }

    /// The id the next allocation will hand out.
    pub fn next_id(&self) -> ValueId {
        self.alloc.peek()
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// Take ownership of a module and index its defined functions.
    ///
    /// Declarations and intrinsics are imported but not indexed.
    pub fn take_module(&mut self, owned: OwnedModule) -> ModuleRef {
        let (src, module) = owned.into_parts();
        let map = import_module_into(&mut self.ctx, &src, module);
        let funcs: Vec<FuncRef> = self
            .ctx
            .module_funcs(map.module)
            .iter()
            .copied()
            .filter(|&f| !self.ctx.is_declaration(f) && !self.ctx.is_intrinsic(f))
            .collect();
        debug!(
            module = self.ctx.module_name(map.module),
            functions = funcs.len(),
            "ingesting module"
        );
        for f in funcs {
            self.update_metadata(f);
        }
        self.modules.push(map.module);
        map.module
    }

    /// Parse `text` and ingest the result.
    pub fn load_module(&mut self, name: &str, text: &str) -> Result<ModuleRef, ParseError> {
        let owned = parse_module(name, text)?;
        Ok(self.take_module(owned))
    }

    // ========================================================================
    // Ids
    // ========================================================================

    pub fn get_id(&self, node: Node, kind: IdKind) -> ValueId {
        self.ids.get_id(node, kind)
    }

    pub fn function_id(&self, func: FuncRef) -> ValueId {
        self.ids.get_id(Node::Function(func), IdKind::Derived)
    }

    pub fn instruction_id(&self, inst: InstRef) -> ValueId {
        self.ids.get_id(Node::Instruction(inst), IdKind::Derived)
    }

    pub fn argument_id(&self, arg: ValueRef) -> ValueId {
        self.ids.get_id(Node::Argument(arg), IdKind::Derived)
    }

    /// The id of a block, carried by its terminator.
    pub fn block_id(&self, block: BlockRef) -> ValueId {
        self.ctx
            .terminator(block)
            .map_or(INVALID_VALUE_ID, |t| self.ids.get_id(Node::Instruction(t), IdKind::Block))
    }

    pub fn function_kind(&self, func: FuncRef) -> FunctionKind {
        let node = Node::Function(func);
        if self.ids.get_id(node, IdKind::Derived) == self.ids.get_id(node, IdKind::Original) {
            FunctionKind::Original
        } else {
            FunctionKind::Generated
        }
    }

    pub fn resolve_function(&self, id: ValueId) -> Option<FuncRef> {
        self.index.resolve_function(&self.ctx, id)
    }

    pub fn resolve_instruction(&self, id: ValueId) -> Option<InstRef> {
        self.index.resolve_instruction(&self.ctx, id)
    }

    pub fn resolve_block(&self, id: ValueId) -> Option<BlockRef> {
        self.index.resolve_block(&self.ctx, id)
    }

    pub fn resolve_argument(&self, id: ValueId) -> Option<ValueRef> {
        self.index.resolve_argument(&self.ctx, id)
    }

    pub fn lookup_function(&self, id: ValueId) -> Lookup<FuncRef> {
        self.index.lookup_function(&self.ctx, id)
    }

    pub fn lookup_instruction(&self, id: ValueId) -> Lookup<InstRef> {
        self.index.lookup_instruction(&self.ctx, id)
    }

    /// Visit live functions under their current id, in ascending id order.
    ///
    /// Generated functions are skipped unless `include_generated` is set.
    pub fn for_each_function(
        &self,
        include_generated: bool,
        mut visit: impl FnMut(ValueId, FuncRef),
    ) {
        for (id, func) in self.index.functions() {
            if !self.ctx.is_func_live(func) || self.function_id(func) != id {
                continue;
            }
            if include_generated || self.function_kind(func) == FunctionKind::Original {
                visit(id, func);
            }
        }
    }

    /// Collected form of [`for_each_function`](Self::for_each_function).
    pub fn functions(&self, include_generated: bool) -> Vec<(ValueId, FuncRef)> {
        let mut out = Vec::new();
        self.for_each_function(include_generated, |id, f| out.push((id, f)));
        out
    }

    /// The function's text annotated with ids, or `None` if `id` does not
    /// name a live function.
    pub fn print_function(&self, id: ValueId) -> Option<String> {
        let func = self.resolve_function(id)?;
        Some(print_function(&self.ctx, func, &mut IdCommentWriter::new(&self.ids)))
    }

    // ========================================================================
    // Re-indexing
    // ========================================================================

    /// Give `func` and everything in it fresh derived ids.
    ///
    /// The function id is allocated first and argument `i` gets
    /// `function id + i + 1`. Original ids are only set where missing, and
    /// block ids are always recomputed.
    pub fn update_metadata(&mut self, func: FuncRef) -> ValueId {
        self.prune_ids();
        let func_id = self.alloc.allocate();
        let node = Node::Function(func);
        self.ids.set_id(node, IdKind::Derived, func_id);
        if self.ids.get_id(node, IdKind::Original) == INVALID_VALUE_ID {
            self.ids.set_id(node, IdKind::Original, func_id);
        }
        self.index.register_function(func_id, func);

        for arg in self.ctx.func_params(func).to_vec() {
            let id = self.alloc.allocate();
            self.ids.set_id(Node::Argument(arg), IdKind::Derived, id);
            self.index.register_argument(id, arg);
        }

        for inst in self.ctx.func_insts(func) {
            let id = self.alloc.allocate();
            let node = Node::Instruction(inst);
            self.ids.set_id(node, IdKind::Derived, id);
            if self.ids.get_id(node, IdKind::Original) == INVALID_VALUE_ID {
                self.ids.set_id(node, IdKind::Original, id);
            }
            self.ids.remove_id(node, IdKind::Block);
            self.index.register_instruction(id, inst);
        }

        for block in self.ctx.func_blocks(func).to_vec() {
            let Some(term) = self.ctx.terminator(block) else {
                continue;
            };
            let id = self.alloc.allocate();
            self.ids.set_id(Node::Instruction(term), IdKind::Block, id);
            self.index.register_block(id, block);
        }

        debug!(
            func = self.ctx.func_name(func),
            id = func_id,
            last = self.alloc.peek() - 1,
            "indexed function"
        );
        if self.config.verify_after_mutation {
            let report = verify_function(&self.ctx, func);
            for error in &report.errors {
                warn!("{error}");
            }
        }
        func_id
    }

    // ========================================================================
    // Clone bookkeeping shared by the operations
    // ========================================================================

    /// Clone `func` and carry every id slot over to the copy.
    ///
    /// The copy keeps the original's derived ids until it is re-indexed.
    pub(crate) fn clone_with_ids(&mut self, func: FuncRef) -> CloneMap {
        let map = clone_function(&mut self.ctx, func);
        self.ids.copy_ids(Node::Function(func), Node::Function(map.func));
        for (&old, &new) in &map.insts {
            self.ids.copy_ids(Node::Instruction(old), Node::Instruction(new));
        }
        map
    }

    /// Erase a function that was never indexed, with its ledger entries.
    pub(crate) fn discard_function(&mut self, func: FuncRef) {
        self.forget_function(func);
        self.ctx.erase_function(func);
    }

    /// Drop ledger entries of nodes the IR has erased, such as instructions
    /// a pass or the inliner removed from a clone.
    pub(crate) fn prune_ids(&mut self) {
        let ctx = &self.ctx;
        self.ids.retain(|node| match node {
            Node::Function(f) => ctx.is_func_live(f),
            Node::Instruction(i) => ctx.is_inst_live(i),
            Node::Argument(v) => ctx.is_value_live(v),
        });
    }

    pub(crate) fn forget_function(&mut self, func: FuncRef) {
        for inst in self.ctx.func_insts(func) {
            self.ids.forget(Node::Instruction(inst));
        }
        for &arg in self.ctx.func_params(func) {
            self.ids.forget(Node::Argument(arg));
        }
        self.ids.forget(Node::Function(func));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;
    use magnifier_ir::OptLevel;

    const MODULE: &str = "\
declare i32 @llvm.abs.i32(i32)

define i32 @add(i32 %a, i32 %b) {
entry:
  %s = add i32 %a, %b
  ret i32 %s
}

define i32 @call() {
entry:
  %r = call i32 @add(i32 1, i32 2)
  ret i32 %r
}
";

    #[test]
    fn ingestion_indexes_definitions_in_module_order() {
        let mut explorer = Explorer::new();
        explorer.load_module("m", MODULE).unwrap();

        let listed: Vec<_> = explorer
            .functions(false)
            .into_iter()
            .map(|(id, f)| (id, explorer.context().func_name(f).to_owned()))
            .collect();
        // add: 1, args 2-3, insts 4-5, block 6; call: 7, insts 8-9, block 10
        assert_eq!(listed, [(1, "add".to_owned()), (7, "call".to_owned())]);
        assert_eq!(explorer.next_id(), 11);
    }

    #[test]
    fn printed_functions_carry_ids() {
        let mut explorer = Explorer::new();
        explorer.load_module("m", MODULE).unwrap();
        assert_snapshot!(explorer.print_function(1).unwrap(), @r"
        ; Function argument ids: (%a = 2) (%b = 3)
        ; 1|1
        define i32 @add(i32 %a, i32 %b) {
        entry:
        ; --- start block: 6 ---
          %s = add i32 %a, %b ; 4|4
          ret i32 %s ; 5|5
        ; --- end block: 6 ---
        }
        ");
        assert_eq!(explorer.print_function(4), None);
    }

    #[test]
    fn reindexing_keeps_originals() {
        let mut explorer = Explorer::new();
        explorer.load_module("m", MODULE).unwrap();
        let add = explorer.resolve_function(1).unwrap();
        let first = explorer.context().func_insts(add)[0];

        let id = explorer.update_metadata(add);
        assert_eq!(id, 11);
        assert_eq!(explorer.get_id(Node::Function(add), IdKind::Original), 1);
        assert_eq!(explorer.get_id(Node::Instruction(first), IdKind::Original), 4);
        assert_eq!(explorer.instruction_id(first), 14);
        // The old id still names the same live function.
        assert_eq!(explorer.resolve_function(1), Some(add));
        assert_eq!(explorer.functions(true).len(), 2);
    }

    #[test]
    fn ledger_only_tracks_live_nodes() {
        let mut explorer = Explorer::new();
        explorer.load_module("m", MODULE).unwrap();
        let inlined = explorer
            .inline_function_call(
                8,
                &mut crate::DirectCallResolver,
                &mut crate::NullSubstitutionObserver,
            )
            .unwrap();
        explorer.optimize_function(1, OptLevel::O3).unwrap();
        explorer.optimize_function(inlined, OptLevel::O2).unwrap();

        let ctx = &explorer.ctx;
        let stale: Vec<Node> = explorer
            .ids
            .nodes()
            .filter(|&node| match node {
                Node::Function(f) => !ctx.is_func_live(f),
                Node::Instruction(i) => !ctx.is_inst_live(i),
                Node::Argument(v) => !ctx.is_value_live(v),
            })
            .collect();
        assert_eq!(stale, []);
        assert!(!explorer.ids.is_empty());
    }
}
