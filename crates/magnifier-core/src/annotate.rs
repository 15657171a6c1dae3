//! Id annotations for printed functions.

use std::fmt::Write;

use magnifier_ir::{Annotator, BlockRef, FuncRef, FunctionNames, InstRef, IrContext};

use crate::id::{IdKind, IdLedger, Node};

/// Decorates printed IR with `derived|original` id pairs and block ids.
///
/// Every line it adds is a `;` comment, so annotated output still parses.
pub struct IdCommentWriter<'a> {
    ids: &'a IdLedger,
}

impl<'a> IdCommentWriter<'a> {
    pub fn new(ids: &'a IdLedger) -> Self {
        Self { ids }
    }

    fn pair(&self, node: Node) -> String {
        format!(
            "{}|{}",
            self.ids.get_id(node, IdKind::Derived),
            self.ids.get_id(node, IdKind::Original)
        )
    }

    fn block_id(&self, ctx: &IrContext, block: BlockRef) -> Option<u64> {
        let term = ctx.terminator(block)?;
        Some(self.ids.get_id(Node::Instruction(term), IdKind::Block))
    }
}

impl Annotator for IdCommentWriter<'_> {
    fn function_header(
        &mut self,
        ctx: &IrContext,
        func: FuncRef,
        names: &FunctionNames,
        out: &mut String,
    ) {
        let params = ctx.func_params(func);
        if !params.is_empty() {
            out.push_str("; Function argument ids:");
            for &arg in params {
                let id = self.ids.get_id(Node::Argument(arg), IdKind::Derived);
                let name = names.local(arg).unwrap_or("?");
                write!(out, " (%{name} = {id})").expect("fmt::Write to String never fails");
            }
            out.push('\n');
        }
        writeln!(out, "; {}", self.pair(Node::Function(func)))
            .expect("fmt::Write to String never fails");
    }

    fn block_start(&mut self, ctx: &IrContext, block: BlockRef, out: &mut String) {
        if let Some(id) = self.block_id(ctx, block) {
            writeln!(out, "; --- start block: {id} ---").expect("fmt::Write to String never fails");
        }
    }

    fn block_end(&mut self, ctx: &IrContext, block: BlockRef, out: &mut String) {
        if let Some(id) = self.block_id(ctx, block) {
            writeln!(out, "; --- end block: {id} ---").expect("fmt::Write to String never fails");
        }
    }

    fn inst_comment(&mut self, _ctx: &IrContext, inst: InstRef) -> Option<String> {
        Some(self.pair(Node::Instruction(inst)))
    }
}
