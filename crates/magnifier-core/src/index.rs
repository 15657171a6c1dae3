//! Value index: id to IR handle tables.
//!
//! Tables are ordered by id, so enumeration is ascending and listings are
//! reproducible. Handles are checked for liveness against the context on
//! every lookup, which lets a lookup tell "erased since" from "never
//! existed".

use std::collections::BTreeMap;

use magnifier_ir::{BlockRef, FuncRef, InstRef, IrContext, ValueRef};

use crate::id::ValueId;

/// Outcome of resolving an id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lookup<T> {
    /// The id names a live object.
    Live(T),
    /// The id was registered but its object has since been erased.
    Erased,
    /// The id was never registered in this table.
    Unknown,
}

impl<T> Lookup<T> {
    pub fn live(self) -> Option<T> {
        match self {
            Lookup::Live(x) => Some(x),
            Lookup::Erased | Lookup::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Lookup::Unknown)
    }
}

/// The four id tables.
#[derive(Default)]
pub struct ValueIndex {
    functions: BTreeMap<ValueId, FuncRef>,
    instructions: BTreeMap<ValueId, InstRef>,
    blocks: BTreeMap<ValueId, BlockRef>,
    arguments: BTreeMap<ValueId, ValueRef>,
}

fn lookup<T: Copy>(
    table: &BTreeMap<ValueId, T>,
    id: ValueId,
    is_live: impl FnOnce(T) -> bool,
) -> Lookup<T> {
    match table.get(&id) {
        Some(&x) if is_live(x) => Lookup::Live(x),
        Some(_) => Lookup::Erased,
        None => Lookup::Unknown,
    }
}

impl ValueIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_function(&mut self, id: ValueId, f: FuncRef) {
        self.functions.insert(id, f);
    }

    pub fn register_instruction(&mut self, id: ValueId, i: InstRef) {
        self.instructions.insert(id, i);
    }

    pub fn register_block(&mut self, id: ValueId, b: BlockRef) {
        self.blocks.insert(id, b);
    }

    pub fn register_argument(&mut self, id: ValueId, v: ValueRef) {
        self.arguments.insert(id, v);
    }

    pub fn lookup_function(&self, ctx: &IrContext, id: ValueId) -> Lookup<FuncRef> {
        lookup(&self.functions, id, |f| ctx.is_func_live(f))
    }

    pub fn lookup_instruction(&self, ctx: &IrContext, id: ValueId) -> Lookup<InstRef> {
        lookup(&self.instructions, id, |i| {
            ctx.is_inst_live(i) && ctx.inst_func(i).is_some()
        })
    }

    pub fn lookup_block(&self, ctx: &IrContext, id: ValueId) -> Lookup<BlockRef> {
        lookup(&self.blocks, id, |b| ctx.is_block_live(b))
    }

    pub fn lookup_argument(&self, ctx: &IrContext, id: ValueId) -> Lookup<ValueRef> {
        lookup(&self.arguments, id, |v| ctx.is_value_live(v))
    }

    pub fn resolve_function(&self, ctx: &IrContext, id: ValueId) -> Option<FuncRef> {
        self.lookup_function(ctx, id).live()
    }

    pub fn resolve_instruction(&self, ctx: &IrContext, id: ValueId) -> Option<InstRef> {
        self.lookup_instruction(ctx, id).live()
    }

    pub fn resolve_block(&self, ctx: &IrContext, id: ValueId) -> Option<BlockRef> {
        self.lookup_block(ctx, id).live()
    }

    pub fn resolve_argument(&self, ctx: &IrContext, id: ValueId) -> Option<ValueRef> {
        self.lookup_argument(ctx, id).live()
    }

    /// Registered functions in ascending id order, dead ones included.
    pub fn functions(&self) -> impl Iterator<Item = (ValueId, FuncRef)> + '_ {
        self.functions.iter().map(|(&id, &f)| (id, f))
    }

    pub fn instructions(&self) -> impl Iterator<Item = (ValueId, InstRef)> + '_ {
        self.instructions.iter().map(|(&id, &i)| (id, i))
    }

    pub fn blocks(&self) -> impl Iterator<Item = (ValueId, BlockRef)> + '_ {
        self.blocks.iter().map(|(&id, &b)| (id, b))
    }

    pub fn arguments(&self) -> impl Iterator<Item = (ValueId, ValueRef)> + '_ {
        self.arguments.iter().map(|(&id, &v)| (id, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use magnifier_ir::{Signature, Type};

    #[test]
    fn lookup_distinguishes_erased_from_unknown() {
        let mut ctx = IrContext::new();
        let m = ctx.create_module("m");
        let f = ctx.create_function(m, "f", Signature::new([Type::I32], Type::Void));
        let mut index = ValueIndex::new();
        index.register_function(4, f);
        index.register_argument(5, ctx.func_param(f, 0));

        assert_eq!(index.lookup_function(&ctx, 4), Lookup::Live(f));
        assert_eq!(index.lookup_function(&ctx, 5), Lookup::Unknown);

        ctx.erase_function(f);
        assert_eq!(index.lookup_function(&ctx, 4), Lookup::Erased);
        assert_eq!(index.lookup_argument(&ctx, 5), Lookup::Erased);
        assert_eq!(index.resolve_function(&ctx, 4), None);
    }

    #[test]
    fn enumeration_is_ascending() {
        let mut ctx = IrContext::new();
        let m = ctx.create_module("m");
        let sig = Signature::new([], Type::Void);
        let a = ctx.create_function(m, "a", sig.clone());
        let b = ctx.create_function(m, "b", sig);
        let mut index = ValueIndex::new();
        index.register_function(9, a);
        index.register_function(2, b);
        let order: Vec<_> = index.functions().collect();
        assert_eq!(order, vec![(2, b), (9, a)]);
    }
}
