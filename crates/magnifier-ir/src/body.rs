//! Owned snapshots of function bodies.
//!
//! A [`BodyTemplate`] records a function's blocks and instructions without
//! borrowing the context, so the same body can be re-created inside the
//! same context (cloning, inlining) or inside another one (module import).

use std::collections::HashMap;

use smallvec::SmallVec;

use crate::context::{InstData, IrContext};
use crate::instructions::InstKind;
use crate::refs::*;
use crate::types::Type;

/// How an operand is reproduced when a template is instantiated.
#[derive(Clone, Debug)]
enum OperandTemplate {
    /// Result of an instruction inside the captured body.
    Local(ValueRef),
    /// Formal parameter of the captured function.
    Arg(u32),
    Const(Type, u64),
    Func(FuncRef),
    Undef(Type),
}

struct InstTemplate {
    src: InstRef,
    kind: InstKind,
    ty: Type,
    operands: SmallVec<[OperandTemplate; 4]>,
    /// Indices into `BodyTemplate::blocks`.
    blocks: SmallVec<[usize; 2]>,
    result: Option<ValueRef>,
    result_name: Option<String>,
}

struct BlockTemplate {
    src: BlockRef,
    label: Option<String>,
    insts: Vec<InstTemplate>,
}

/// A captured function body.
pub struct BodyTemplate {
    blocks: Vec<BlockTemplate>,
}

/// The entities created by [`BodyTemplate::instantiate`].
pub struct Instantiated {
    /// New blocks in the captured layout order, not attached to any function.
    pub blocks: Vec<BlockRef>,
    pub block_map: HashMap<BlockRef, BlockRef>,
    pub inst_map: HashMap<InstRef, InstRef>,
}

impl BodyTemplate {
    /// Snapshot the body of `func`.
    ///
    /// # Panics
    ///
    /// Panics if an instruction names a block outside `func`.
    pub fn capture(ctx: &IrContext, func: FuncRef) -> Self {
        let block_index: HashMap<BlockRef, usize> = ctx
            .func_blocks(func)
            .iter()
            .enumerate()
            .map(|(idx, &b)| (b, idx))
            .collect();

        let blocks = ctx
            .func_blocks(func)
            .iter()
            .map(|&b| BlockTemplate {
                src: b,
                label: ctx.block_label(b).map(str::to_owned),
                insts: ctx
                    .block_insts(b)
                    .iter()
                    .map(|&i| capture_inst(ctx, i, &block_index))
                    .collect(),
            })
            .collect();
        Self { blocks }
    }

    pub fn inst_count(&self) -> usize {
        self.blocks.iter().map(|b| b.insts.len()).sum()
    }

    /// Re-create the body in `ctx`.
    ///
    /// `args` supplies the values standing in for the captured function's
    /// parameters; `map_func` translates function references.
    pub fn instantiate(
        &self,
        ctx: &mut IrContext,
        args: &[ValueRef],
        mut map_func: impl FnMut(FuncRef) -> FuncRef,
    ) -> Instantiated {
        let mut out = Instantiated {
            blocks: Vec::with_capacity(self.blocks.len()),
            block_map: HashMap::new(),
            inst_map: HashMap::new(),
        };
        for tb in &self.blocks {
            let b = ctx.create_block(tb.label.clone());
            out.blocks.push(b);
            out.block_map.insert(tb.src, b);
        }

        // Pass 1: create instructions so that every local result exists.
        let mut values: HashMap<ValueRef, ValueRef> = HashMap::new();
        for (tb, &b) in self.blocks.iter().zip(&out.blocks) {
            for ti in &tb.insts {
                let data = InstData::new(ti.kind.clone(), ti.ty)
                    .blocks(ti.blocks.iter().map(|&idx| out.blocks[idx]));
                let inst = ctx.create_inst(data);
                ctx.append_inst(b, inst);
                out.inst_map.insert(ti.src, inst);
                if let (Some(old), Some(new)) = (ti.result, ctx.inst_result(inst)) {
                    ctx.set_value_name(new, ti.result_name.clone());
                    values.insert(old, new);
                }
            }
        }

        // Pass 2: wire operands, including forward references through phis.
        for tb in &self.blocks {
            for ti in &tb.insts {
                let operands: SmallVec<[ValueRef; 4]> = ti
                    .operands
                    .iter()
                    .map(|op| match *op {
                        OperandTemplate::Local(v) => *values.get(&v).unwrap_or_else(|| {
                            panic!("instantiate: {v} is not defined in the body")
                        }),
                        OperandTemplate::Arg(idx) => args[idx as usize],
                        OperandTemplate::Const(ty, bits) => ctx.iconst(ty, bits),
                        OperandTemplate::Func(f) => ctx.func_addr(map_func(f)),
                        OperandTemplate::Undef(ty) => ctx.undef(ty),
                    })
                    .collect();
                ctx.set_operands(out.inst_map[&ti.src], operands);
            }
        }
        out
    }
}

fn capture_inst(
    ctx: &IrContext,
    i: InstRef,
    block_index: &HashMap<BlockRef, usize>,
) -> InstTemplate {
    let data = ctx.inst(i);
    let operands = data
        .operands
        .iter()
        .map(|&v| match ctx.value_def(v) {
            ValueDef::Inst(_) => OperandTemplate::Local(v),
            ValueDef::Arg(_, idx) => OperandTemplate::Arg(idx),
            ValueDef::Const(ty, bits) => OperandTemplate::Const(ty, bits),
            ValueDef::Func(f) => OperandTemplate::Func(f),
            ValueDef::Undef(ty) => OperandTemplate::Undef(ty),
        })
        .collect();
    let blocks = data
        .blocks
        .iter()
        .map(|b| {
            *block_index
                .get(b)
                .unwrap_or_else(|| panic!("capture: {i} names {b} outside its function"))
        })
        .collect();
    let result = ctx.inst_result(i);
    InstTemplate {
        src: i,
        kind: data.kind.clone(),
        ty: data.ty,
        operands,
        blocks,
        result,
        result_name: result.and_then(|v| ctx.value_name(v).map(str::to_owned)),
    }
}
