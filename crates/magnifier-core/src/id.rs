//! Identity ledger.
//!
//! Ids are kept out-of-band, keyed by IR handle, so the IR itself knows
//! nothing about them. Cloning carries ids across explicitly through
//! [`IdLedger::copy_ids`] and the clone's old-to-new maps.

use std::collections::HashMap;

use magnifier_ir::{FuncRef, InstRef, ValueRef};

/// A stable identity handed out by an [`Explorer`](crate::Explorer).
pub type ValueId = u64;

/// "No id" / "not found".
pub const INVALID_VALUE_ID: ValueId = 0;

/// The independent id slots a node can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdKind {
    /// Current identity, replaced every time the owning function is re-indexed.
    Derived,
    /// Identity of the earliest ancestor; set once and never overwritten.
    Original,
    /// Identity of a basic block, carried by its terminator.
    Block,
    /// Pending substitution kind of a hook marker.
    Substitution,
}

/// Something that can carry ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Node {
    Function(FuncRef),
    Instruction(InstRef),
    Argument(ValueRef),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct IdSlots {
    derived: ValueId,
    original: ValueId,
    block: ValueId,
    substitution: ValueId,
}

impl IdSlots {
    fn slot(&mut self, kind: IdKind) -> &mut ValueId {
        match kind {
            IdKind::Derived => &mut self.derived,
            IdKind::Original => &mut self.original,
            IdKind::Block => &mut self.block,
            IdKind::Substitution => &mut self.substitution,
        }
    }

    fn get(&self, kind: IdKind) -> ValueId {
        match kind {
            IdKind::Derived => self.derived,
            IdKind::Original => self.original,
            IdKind::Block => self.block,
            IdKind::Substitution => self.substitution,
        }
    }
}

/// Per-node id slots.
#[derive(Default)]
pub struct IdLedger {
    slots: HashMap<Node, IdSlots>,
}

impl IdLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id in `kind`'s slot, or [`INVALID_VALUE_ID`] when unset.
    pub fn get_id(&self, node: Node, kind: IdKind) -> ValueId {
        self.slots
            .get(&node)
            .map_or(INVALID_VALUE_ID, |s| s.get(kind))
    }

    pub fn set_id(&mut self, node: Node, kind: IdKind, id: ValueId) {
        *self.slots.entry(node).or_default().slot(kind) = id;
    }

    pub fn remove_id(&mut self, node: Node, kind: IdKind) {
        if let Some(slots) = self.slots.get_mut(&node) {
            *slots.slot(kind) = INVALID_VALUE_ID;
            if *slots == IdSlots::default() {
                self.slots.remove(&node);
            }
        }
    }

    /// Copy every slot of `from` onto `to`, replacing what `to` had.
    pub fn copy_ids(&mut self, from: Node, to: Node) {
        match self.slots.get(&from).copied() {
            Some(slots) => {
                self.slots.insert(to, slots);
            }
            None => {
                self.slots.remove(&to);
            }
        }
    }

    /// Drop every slot of `node`.
    pub fn forget(&mut self, node: Node) {
        self.slots.remove(&node);
    }

    /// Every node that carries at least one id, in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = Node> + '_ {
        self.slots.keys().copied()
    }

    /// Keep only the nodes for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(Node) -> bool) {
        self.slots.retain(|&node, _| keep(node));
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Monotone id counter. The first id handed out is 1.
#[derive(Debug)]
pub struct IdAllocator {
    next: ValueId,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl IdAllocator {
    pub fn allocate(&mut self) -> ValueId {
        let id = self.next;
        self.next += 1;
        id
    }

    /// The id the next call to [`allocate`](Self::allocate) returns.
    pub fn peek(&self) -> ValueId {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_entity::EntityRef;

    #[test]
    fn unset_slots_read_as_invalid() {
        let ledger = IdLedger::new();
        let node = Node::Function(FuncRef::new(0));
        assert_eq!(ledger.get_id(node, IdKind::Derived), INVALID_VALUE_ID);
    }

    #[test]
    fn slots_are_independent() {
        let mut ledger = IdLedger::new();
        let node = Node::Instruction(InstRef::new(3));
        ledger.set_id(node, IdKind::Derived, 7);
        ledger.set_id(node, IdKind::Original, 2);
        ledger.remove_id(node, IdKind::Derived);
        assert_eq!(ledger.get_id(node, IdKind::Derived), INVALID_VALUE_ID);
        assert_eq!(ledger.get_id(node, IdKind::Original), 2);

        ledger.remove_id(node, IdKind::Original);
        assert!(ledger.is_empty());
    }

    #[test]
    fn copy_replaces_target_slots() {
        let mut ledger = IdLedger::new();
        let (a, b) = (Node::Instruction(InstRef::new(0)), Node::Instruction(InstRef::new(1)));
        ledger.set_id(a, IdKind::Original, 5);
        ledger.set_id(b, IdKind::Block, 9);
        ledger.copy_ids(a, b);
        assert_eq!(ledger.get_id(b, IdKind::Original), 5);
        assert_eq!(ledger.get_id(b, IdKind::Block), INVALID_VALUE_ID);
    }

    #[test]
    fn retain_drops_whole_nodes() {
        let mut ledger = IdLedger::new();
        for n in 0..4 {
            let node = Node::Instruction(InstRef::new(n));
            ledger.set_id(node, IdKind::Derived, n as ValueId + 1);
        }
        ledger.retain(|node| !matches!(node, Node::Instruction(i) if i.index() % 2 == 1));
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.get_id(Node::Instruction(InstRef::new(2)), IdKind::Derived), 3);
        let dropped = Node::Instruction(InstRef::new(3));
        assert_eq!(ledger.get_id(dropped, IdKind::Derived), INVALID_VALUE_ID);
    }

    #[test]
    fn allocator_starts_at_one() {
        let mut ids = IdAllocator::default();
        assert_eq!(ids.peek(), 1);
        assert_eq!(ids.allocate(), 1);
        assert_eq!(ids.allocate(), 2);
        assert_eq!(ids.peek(), 3);
    }
}
