//! IrContext: arena-based mutable IR storage.
//!
//! All IR entities (modules, functions, blocks, instructions, values) are
//! stored in `PrimaryMap`s owned by `IrContext`. Entities are never
//! reclaimed: erasing one marks it dead, so a stale handle can still be
//! told apart from one that never existed.

use std::collections::HashMap;

use cranelift_entity::{PrimaryMap, SecondaryMap};
use smallvec::SmallVec;

use crate::instructions::InstKind;
use crate::refs::*;
use crate::types::{Signature, Type};

// ============================================================================
// Use-chain
// ============================================================================

/// A single use of a value: which instruction uses it, at which operand index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Use {
    pub user: InstRef,
    pub operand_index: u32,
}

// ============================================================================
// Entity data types
// ============================================================================

/// A named collection of functions.
pub struct ModuleData {
    pub name: String,
    funcs: Vec<FuncRef>,
}

/// A function definition or declaration.
///
/// A function without blocks is a declaration.
pub struct FuncData {
    pub name: String,
    pub sig: Signature,
    module: ModuleRef,
    params: Vec<ValueRef>,
    blocks: Vec<BlockRef>,
    addr: ValueRef,
    live: bool,
}

/// A basic block: an ordered list of instructions ending in a terminator.
pub struct BlockData {
    pub label: Option<String>,
    insts: Vec<InstRef>,
    parent: Option<FuncRef>,
    live: bool,
}

/// Data for a single instruction in the arena.
pub struct InstData {
    pub kind: InstKind,
    /// Result type; `Void` instructions produce no value.
    pub ty: Type,
    pub operands: SmallVec<[ValueRef; 4]>,
    /// Successor blocks for branches, incoming blocks for phis.
    pub blocks: SmallVec<[BlockRef; 2]>,
    result: Option<ValueRef>,
    parent: Option<BlockRef>,
    live: bool,
}

/// Data for a single SSA value.
pub struct ValueData {
    pub def: ValueDef,
    pub ty: Type,
    pub name: Option<String>,
}

impl InstData {
    /// Create instruction data with no operands or blocks.
    pub fn new(kind: InstKind, ty: Type) -> Self {
        Self {
            kind,
            ty,
            operands: SmallVec::new(),
            blocks: SmallVec::new(),
            result: None,
            parent: None,
            live: true,
        }
    }

    pub fn operand(mut self, v: ValueRef) -> Self {
        self.operands.push(v);
        self
    }

    pub fn operands(mut self, vs: impl IntoIterator<Item = ValueRef>) -> Self {
        self.operands.extend(vs);
        self
    }

    pub fn block(mut self, b: BlockRef) -> Self {
        self.blocks.push(b);
        self
    }

    pub fn blocks(mut self, bs: impl IntoIterator<Item = BlockRef>) -> Self {
        self.blocks.extend(bs);
        self
    }
}

// ============================================================================
// IrContext
// ============================================================================

/// Arena-based mutable IR context.
///
/// Owns all IR entities and provides methods for creating, querying,
/// and mutating them. Use-chains are automatically maintained.
#[derive(Default)]
pub struct IrContext {
    modules: PrimaryMap<ModuleRef, ModuleData>,
    funcs: PrimaryMap<FuncRef, FuncData>,
    blocks: PrimaryMap<BlockRef, BlockData>,
    insts: PrimaryMap<InstRef, InstData>,
    values: PrimaryMap<ValueRef, ValueData>,

    /// Use-chain: for each value, the list of instructions that use it.
    uses: SecondaryMap<ValueRef, SmallVec<[Use; 2]>>,

    /// Interned constants and undefs.
    consts: HashMap<(Type, u64), ValueRef>,
    undefs: HashMap<Type, ValueRef>,
}

impl IrContext {
    /// Create a new empty IR context.
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Module
    // ========================================================================

    pub fn create_module(&mut self, name: impl Into<String>) -> ModuleRef {
        self.modules.push(ModuleData {
            name: name.into(),
            funcs: Vec::new(),
        })
    }

    pub fn module(&self, m: ModuleRef) -> &ModuleData {
        &self.modules[m]
    }

    pub fn module_name(&self, m: ModuleRef) -> &str {
        &self.modules[m].name
    }

    /// Live functions of a module in creation order.
    pub fn module_funcs(&self, m: ModuleRef) -> &[FuncRef] {
        &self.modules[m].funcs
    }

    pub fn modules(&self) -> impl Iterator<Item = ModuleRef> + '_ {
        self.modules.keys()
    }

    pub fn func_by_name(&self, m: ModuleRef, name: &str) -> Option<FuncRef> {
        self.modules[m]
            .funcs
            .iter()
            .copied()
            .find(|&f| self.funcs[f].name == name)
    }

    /// Pick a function name not yet used in `m`.
    ///
    /// Returns `base` when free; otherwise `root.N` with the smallest free
    /// `N`, where `root` is `base` without any numeric `.N` suffix.
    pub fn unique_func_name(&self, m: ModuleRef, base: &str) -> String {
        if self.func_by_name(m, base).is_none() {
            return base.to_owned();
        }
        let root = match base.rsplit_once('.') {
            Some((root, suffix))
                if !root.is_empty()
                    && !suffix.is_empty()
                    && suffix.bytes().all(|b| b.is_ascii_digit()) =>
            {
                root
            }
            _ => base,
        };
        (1u32..)
            .map(|n| format!("{root}.{n}"))
            .find(|candidate| self.func_by_name(m, candidate).is_none())
            .unwrap_or_else(|| unreachable!("u32 suffix space exhausted"))
    }

    // ========================================================================
    // Function
    // ========================================================================

    /// Create a function declaration in `module`.
    ///
    /// Argument values and the function address value are allocated up
    /// front. Appending a block turns the declaration into a definition.
    pub fn create_function(
        &mut self,
        module: ModuleRef,
        name: impl Into<String>,
        sig: Signature,
    ) -> FuncRef {
        let func = self.funcs.next_key();
        let params = sig
            .params
            .iter()
            .enumerate()
            .map(|(idx, &ty)| {
                self.values.push(ValueData {
                    def: ValueDef::Arg(func, idx as u32),
                    ty,
                    name: None,
                })
            })
            .collect();
        let addr = self.values.push(ValueData {
            def: ValueDef::Func(func),
            ty: Type::Ptr,
            name: None,
        });
        let created = self.funcs.push(FuncData {
            name: name.into(),
            sig,
            module,
            params,
            blocks: Vec::new(),
            addr,
            live: true,
        });
        debug_assert_eq!(created, func);
        self.modules[module].funcs.push(func);
        func
    }

    pub fn func(&self, f: FuncRef) -> &FuncData {
        &self.funcs[f]
    }

    pub fn func_name(&self, f: FuncRef) -> &str {
        &self.funcs[f].name
    }

    pub fn func_sig(&self, f: FuncRef) -> &Signature {
        &self.funcs[f].sig
    }

    pub fn func_module(&self, f: FuncRef) -> ModuleRef {
        self.funcs[f].module
    }

    pub fn func_params(&self, f: FuncRef) -> &[ValueRef] {
        &self.funcs[f].params
    }

    pub fn func_param(&self, f: FuncRef, index: usize) -> ValueRef {
        self.funcs[f].params[index]
    }

    /// The value denoting the address of `f`, used as a direct callee.
    pub fn func_addr(&self, f: FuncRef) -> ValueRef {
        self.funcs[f].addr
    }

    pub fn func_blocks(&self, f: FuncRef) -> &[BlockRef] {
        &self.funcs[f].blocks
    }

    pub fn entry_block(&self, f: FuncRef) -> Option<BlockRef> {
        self.funcs[f].blocks.first().copied()
    }

    pub fn is_declaration(&self, f: FuncRef) -> bool {
        self.funcs[f].blocks.is_empty()
    }

    /// Functions named `llvm.*` are compiler intrinsics.
    pub fn is_intrinsic(&self, f: FuncRef) -> bool {
        self.funcs[f].name.starts_with("llvm.")
    }

    pub fn is_func_live(&self, f: FuncRef) -> bool {
        self.funcs.is_valid(f) && self.funcs[f].live
    }

    /// All instructions of a function in layout order.
    pub fn func_insts(&self, f: FuncRef) -> Vec<InstRef> {
        self.funcs[f]
            .blocks
            .iter()
            .flat_map(|&b| self.blocks[b].insts.iter().copied())
            .collect()
    }

    pub fn func_inst_count(&self, f: FuncRef) -> usize {
        self.funcs[f]
            .blocks
            .iter()
            .map(|&b| self.blocks[b].insts.len())
            .sum()
    }

    /// Erase a function together with its body and remove it from its module.
    ///
    /// # Panics
    ///
    /// Panics if the function's address is still used after its own body
    /// has been dropped.
    pub fn erase_function(&mut self, f: FuncRef) {
        let blocks = std::mem::take(&mut self.funcs[f].blocks);
        self.erase_blocks(&blocks);
        let addr = self.funcs[f].addr;
        assert!(
            self.uses[addr].is_empty(),
            "erase_function: @{} still has {} use(s)",
            self.funcs[f].name,
            self.uses[addr].len()
        );
        let module = self.funcs[f].module;
        self.modules[module].funcs.retain(|&g| g != f);
        self.funcs[f].live = false;
    }

    // ========================================================================
    // Block
    // ========================================================================

    /// Create a block not yet attached to any function.
    pub fn create_block(&mut self, label: Option<String>) -> BlockRef {
        self.blocks.push(BlockData {
            label,
            insts: Vec::new(),
            parent: None,
            live: true,
        })
    }

    pub fn block(&self, b: BlockRef) -> &BlockData {
        &self.blocks[b]
    }

    pub fn block_label(&self, b: BlockRef) -> Option<&str> {
        self.blocks[b].label.as_deref()
    }

    pub fn block_insts(&self, b: BlockRef) -> &[InstRef] {
        &self.blocks[b].insts
    }

    pub fn block_func(&self, b: BlockRef) -> Option<FuncRef> {
        self.blocks[b].parent
    }

    pub fn is_block_live(&self, b: BlockRef) -> bool {
        self.blocks.is_valid(b) && self.blocks[b].live
    }

    /// The block's last instruction, if it is a terminator.
    pub fn terminator(&self, b: BlockRef) -> Option<InstRef> {
        self.blocks[b]
            .insts
            .last()
            .copied()
            .filter(|&i| self.insts[i].kind.is_terminator())
    }

    /// Successor blocks named by the block's terminator.
    pub fn successors(&self, b: BlockRef) -> SmallVec<[BlockRef; 2]> {
        match self.terminator(b) {
            Some(term) => self.insts[term].blocks.clone(),
            None => SmallVec::new(),
        }
    }

    /// Blocks of `b`'s function whose terminator branches to `b`.
    pub fn predecessors(&self, b: BlockRef) -> Vec<BlockRef> {
        let Some(func) = self.blocks[b].parent else {
            return Vec::new();
        };
        self.funcs[func]
            .blocks
            .iter()
            .copied()
            .filter(|&p| self.successors(p).contains(&b))
            .collect()
    }

    /// Append a detached block to the end of a function.
    pub fn append_block(&mut self, f: FuncRef, b: BlockRef) {
        assert!(
            self.blocks[b].parent.is_none(),
            "append_block: {b} already belongs to a function"
        );
        self.blocks[b].parent = Some(f);
        self.funcs[f].blocks.push(b);
    }

    /// Insert a detached block right after `after` in its function's layout.
    pub fn insert_block_after(&mut self, after: BlockRef, b: BlockRef) {
        assert!(
            self.blocks[b].parent.is_none(),
            "insert_block_after: {b} already belongs to a function"
        );
        let func = self.blocks[after]
            .parent
            .expect("insert_block_after: anchor block is detached");
        let blocks = &mut self.funcs[func].blocks;
        let pos = blocks
            .iter()
            .position(|&x| x == after)
            .expect("insert_block_after: anchor block not in its function");
        blocks.insert(pos + 1, b);
        self.blocks[b].parent = Some(func);
    }

    /// Erase a set of blocks and all their instructions.
    ///
    /// Instructions may reference each other across the set. Any use of an
    /// erased result from outside the set is redirected to `undef`.
    pub fn erase_blocks(&mut self, blocks: &[BlockRef]) {
        for &b in blocks {
            for i in self.blocks[b].insts.clone() {
                self.drop_operand_uses(i);
                self.insts[i].operands.clear();
            }
        }
        for &b in blocks {
            for i in std::mem::take(&mut self.blocks[b].insts) {
                if let Some(result) = self.insts[i].result {
                    if self.has_uses(result) {
                        let undef = self.undef(self.values[result].ty);
                        self.replace_all_uses(result, undef);
                    }
                }
                self.insts[i].parent = None;
                self.insts[i].live = false;
            }
            if let Some(func) = self.blocks[b].parent.take() {
                self.funcs[func].blocks.retain(|&x| x != b);
            }
            self.blocks[b].live = false;
        }
    }

    /// Split `inst`'s block after `inst`.
    ///
    /// Every instruction following `inst` moves to a new block placed right
    /// after the original one. Phis in the moved terminator's successors are
    /// updated to name the new block as their predecessor.
    pub fn split_block_after(&mut self, inst: InstRef) -> BlockRef {
        let block = self.insts[inst]
            .parent
            .expect("split_block_after: instruction is detached");
        let label = self.blocks[block].label.as_ref().map(|l| format!("{l}.split"));
        let tail = self.create_block(label);
        self.insert_block_after(block, tail);

        let insts = &mut self.blocks[block].insts;
        let pos = insts
            .iter()
            .position(|&i| i == inst)
            .expect("split_block_after: instruction not in its block");
        let moved: Vec<InstRef> = insts.drain(pos + 1..).collect();
        for &i in &moved {
            self.insts[i].parent = Some(tail);
        }
        self.blocks[tail].insts = moved;

        for succ in self.successors(tail) {
            for phi in self.leading_phis(succ) {
                self.replace_block_in(phi, block, tail);
            }
        }
        tail
    }

    /// The phi instructions at the start of a block.
    pub fn leading_phis(&self, b: BlockRef) -> Vec<InstRef> {
        self.blocks[b]
            .insts
            .iter()
            .copied()
            .take_while(|&i| self.insts[i].kind == InstKind::Phi)
            .collect()
    }

    /// First instruction of a block that is not a phi.
    pub fn first_non_phi(&self, b: BlockRef) -> Option<InstRef> {
        self.blocks[b]
            .insts
            .iter()
            .copied()
            .find(|&i| self.insts[i].kind != InstKind::Phi)
    }

    // ========================================================================
    // Instruction
    // ========================================================================

    /// Create a new instruction and allocate its result value.
    ///
    /// The instruction's operands are registered in the use-chain. It is
    /// detached; use `append_inst` or `insert_inst_before` to place it.
    pub fn create_inst(&mut self, data: InstData) -> InstRef {
        assert!(
            data.parent.is_none() && data.result.is_none(),
            "create_inst: instruction data must be fresh"
        );
        let ty = data.ty;
        let inst = self.insts.push(data);
        self.add_operand_uses(inst);
        if !ty.is_void() {
            let v = self.values.push(ValueData {
                def: ValueDef::Inst(inst),
                ty,
                name: None,
            });
            self.insts[inst].result = Some(v);
        }
        inst
    }

    pub fn inst(&self, i: InstRef) -> &InstData {
        &self.insts[i]
    }

    pub fn inst_kind(&self, i: InstRef) -> &InstKind {
        &self.insts[i].kind
    }

    pub fn inst_ty(&self, i: InstRef) -> Type {
        self.insts[i].ty
    }

    pub fn inst_operands(&self, i: InstRef) -> &[ValueRef] {
        &self.insts[i].operands
    }

    pub fn inst_blocks(&self, i: InstRef) -> &[BlockRef] {
        &self.insts[i].blocks
    }

    pub fn inst_result(&self, i: InstRef) -> Option<ValueRef> {
        self.insts[i].result
    }

    pub fn inst_block(&self, i: InstRef) -> Option<BlockRef> {
        self.insts[i].parent
    }

    pub fn inst_func(&self, i: InstRef) -> Option<FuncRef> {
        self.insts[i].parent.and_then(|b| self.blocks[b].parent)
    }

    pub fn is_inst_live(&self, i: InstRef) -> bool {
        self.insts.is_valid(i) && self.insts[i].live
    }

    /// The function a call targets directly, if its callee operand is a
    /// function address.
    pub fn call_callee(&self, i: InstRef) -> Option<FuncRef> {
        let data = &self.insts[i];
        if !data.kind.is_call() {
            return None;
        }
        data.operands.first().and_then(|&v| self.as_func(v))
    }

    /// Argument operands of a call.
    pub fn call_args(&self, i: InstRef) -> &[ValueRef] {
        let operands = &self.insts[i].operands;
        if self.insts[i].kind.is_call() && !operands.is_empty() {
            &operands[1..]
        } else {
            &[]
        }
    }

    /// Append a detached instruction to the end of a block.
    pub fn append_inst(&mut self, block: BlockRef, inst: InstRef) {
        assert!(
            self.insts[inst].parent.is_none(),
            "append_inst: {inst} already belongs to a block"
        );
        self.insts[inst].parent = Some(block);
        self.blocks[block].insts.push(inst);
    }

    /// Insert a detached instruction right before `before`.
    pub fn insert_inst_before(&mut self, before: InstRef, inst: InstRef) {
        self.insert_inst_at(before, inst, 0);
    }

    /// Insert a detached instruction right after `after`.
    pub fn insert_inst_after(&mut self, after: InstRef, inst: InstRef) {
        self.insert_inst_at(after, inst, 1);
    }

    fn insert_inst_at(&mut self, anchor: InstRef, inst: InstRef, offset: usize) {
        assert!(
            self.insts[inst].parent.is_none(),
            "insert_inst: {inst} already belongs to a block"
        );
        let block = self.insts[anchor]
            .parent
            .expect("insert_inst: anchor instruction is detached");
        let insts = &mut self.blocks[block].insts;
        let pos = insts
            .iter()
            .position(|&i| i == anchor)
            .expect("insert_inst: anchor not found in its block");
        insts.insert(pos + offset, inst);
        self.insts[inst].parent = Some(block);
    }

    /// Remove an instruction from its block without destroying it.
    pub fn detach_inst(&mut self, inst: InstRef) {
        if let Some(block) = self.insts[inst].parent.take() {
            self.blocks[block].insts.retain(|&i| i != inst);
        }
    }

    /// Erase an instruction: detach it, drop its operand uses, mark it dead.
    ///
    /// # Panics
    ///
    /// Panics if the instruction's result still has uses.
    pub fn erase_inst(&mut self, inst: InstRef) {
        if let Some(result) = self.insts[inst].result {
            assert!(
                self.uses[result].is_empty(),
                "erase_inst: result {result} of {inst} still has {} use(s)",
                self.uses[result].len()
            );
        }
        self.detach_inst(inst);
        self.drop_operand_uses(inst);
        self.insts[inst].operands.clear();
        self.insts[inst].live = false;
    }

    /// Replace operand `index` of `inst`.
    pub fn set_operand(&mut self, inst: InstRef, index: usize, v: ValueRef) {
        let old = self.insts[inst].operands[index];
        if old == v {
            return;
        }
        let operand_index = index as u32;
        self.uses[old].retain(|u| !(u.user == inst && u.operand_index == operand_index));
        self.insts[inst].operands[index] = v;
        self.uses[v].push(Use {
            user: inst,
            operand_index,
        });
    }

    /// Replace the whole operand list of `inst`.
    pub fn set_operands(&mut self, inst: InstRef, operands: impl IntoIterator<Item = ValueRef>) {
        self.drop_operand_uses(inst);
        self.insts[inst].operands = operands.into_iter().collect();
        self.add_operand_uses(inst);
    }

    /// Replace the block list of `inst`.
    pub fn set_blocks(&mut self, inst: InstRef, blocks: impl IntoIterator<Item = BlockRef>) {
        self.insts[inst].blocks = blocks.into_iter().collect();
    }

    /// Rename every occurrence of block `old` in `inst`'s block list.
    pub fn replace_block_in(&mut self, inst: InstRef, old: BlockRef, new: BlockRef) {
        for b in self.insts[inst].blocks.iter_mut() {
            if *b == old {
                *b = new;
            }
        }
    }

    /// Drop the incoming edges of `phi` that come from `pred`.
    pub fn remove_phi_incoming(&mut self, phi: InstRef, pred: BlockRef) {
        let data = &self.insts[phi];
        let (operands, blocks): (Vec<ValueRef>, Vec<BlockRef>) = data
            .operands
            .iter()
            .copied()
            .zip(data.blocks.iter().copied())
            .filter(|&(_, b)| b != pred)
            .unzip();
        self.set_operands(phi, operands);
        self.set_blocks(phi, blocks);
    }

    fn add_operand_uses(&mut self, inst: InstRef) {
        let operands = self.insts[inst].operands.clone();
        for (idx, val) in operands.into_iter().enumerate() {
            self.uses[val].push(Use {
                user: inst,
                operand_index: idx as u32,
            });
        }
    }

    fn drop_operand_uses(&mut self, inst: InstRef) {
        let operands = self.insts[inst].operands.clone();
        for val in operands {
            self.uses[val].retain(|u| u.user != inst);
        }
    }

    // ========================================================================
    // Value
    // ========================================================================

    pub fn value(&self, v: ValueRef) -> &ValueData {
        &self.values[v]
    }

    pub fn value_ty(&self, v: ValueRef) -> Type {
        self.values[v].ty
    }

    pub fn value_def(&self, v: ValueRef) -> ValueDef {
        self.values[v].def
    }

    pub fn value_name(&self, v: ValueRef) -> Option<&str> {
        self.values[v].name.as_deref()
    }

    pub fn set_value_name(&mut self, v: ValueRef, name: Option<String>) {
        self.values[v].name = name;
    }

    /// The interned integer constant of type `ty` with the given bits.
    pub fn iconst(&mut self, ty: Type, bits: u64) -> ValueRef {
        let bits = ty.mask(bits);
        if let Some(&v) = self.consts.get(&(ty, bits)) {
            return v;
        }
        let v = self.values.push(ValueData {
            def: ValueDef::Const(ty, bits),
            ty,
            name: None,
        });
        self.consts.insert((ty, bits), v);
        v
    }

    /// The interned `undef` of type `ty`.
    pub fn undef(&mut self, ty: Type) -> ValueRef {
        if let Some(&v) = self.undefs.get(&ty) {
            return v;
        }
        let v = self.values.push(ValueData {
            def: ValueDef::Undef(ty),
            ty,
            name: None,
        });
        self.undefs.insert(ty, v);
        v
    }

    /// Constant bits of `v`, if it is an integer constant.
    pub fn const_bits(&self, v: ValueRef) -> Option<u64> {
        match self.values[v].def {
            ValueDef::Const(_, bits) => Some(bits),
            _ => None,
        }
    }

    /// The function `v` is the address of, if any.
    pub fn as_func(&self, v: ValueRef) -> Option<FuncRef> {
        match self.values[v].def {
            ValueDef::Func(f) => Some(f),
            _ => None,
        }
    }

    /// Whether the entity defining `v` is still alive.
    pub fn is_value_live(&self, v: ValueRef) -> bool {
        if !self.values.is_valid(v) {
            return false;
        }
        match self.values[v].def {
            ValueDef::Inst(i) => self.is_inst_live(i),
            ValueDef::Arg(f, _) | ValueDef::Func(f) => self.is_func_live(f),
            ValueDef::Const(..) | ValueDef::Undef(_) => true,
        }
    }

    // ========================================================================
    // Use-chain
    // ========================================================================

    /// Get all uses of a value.
    pub fn uses(&self, v: ValueRef) -> &[Use] {
        &self.uses[v]
    }

    /// Check if a value has any uses.
    pub fn has_uses(&self, v: ValueRef) -> bool {
        !self.uses[v].is_empty()
    }

    /// Distinct instructions using `v`, in use-chain order.
    pub fn users(&self, v: ValueRef) -> Vec<InstRef> {
        let mut users: Vec<InstRef> = Vec::new();
        for u in &self.uses[v] {
            if !users.contains(&u.user) {
                users.push(u.user);
            }
        }
        users
    }

    // ========================================================================
    // RAUW (Replace All Uses With)
    // ========================================================================

    /// Replace all uses of `old` with `new` in all instructions.
    ///
    /// Updates both operand lists and the use-chain.
    pub fn replace_all_uses(&mut self, old: ValueRef, new: ValueRef) {
        if old == new {
            return;
        }
        let old_uses = std::mem::take(&mut self.uses[old]);
        for u in &old_uses {
            let slot = &mut self.insts[u.user].operands[u.operand_index as usize];
            debug_assert_eq!(*slot, old);
            *slot = new;
            self.uses[new].push(*u);
        }
    }

    /// Replace all uses of `old` with `new` except those in `except`.
    pub fn replace_uses_except(&mut self, old: ValueRef, new: ValueRef, except: InstRef) {
        if old == new {
            return;
        }
        let (kept, moved): (SmallVec<[Use; 2]>, SmallVec<[Use; 2]>) = self.uses[old]
            .iter()
            .copied()
            .partition(|u| u.user == except);
        self.uses[old] = kept;
        for u in moved {
            self.insts[u.user].operands[u.operand_index as usize] = new;
            self.uses[new].push(u);
        }
    }
}
