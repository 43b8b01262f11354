//! Basic block records.
//!
//! A block owns an ordered list of instructions (doubly linked through the
//! instruction records), an ordered list of block parameters (the
//! block-argument form of SSA), its predecessor and successor edges, and the
//! bookkeeping needed for incremental SSA construction: the seal state, the
//! per-variable last definitions, and the placeholder values waiting for the
//! block to be sealed.

use crate::ir::entities::{Block, Inst, Value, Variable};
use crate::ir::types::Type;
use cranelift_entity::packed_option::PackedOption;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// A block parameter: a value defined at block entry whose concrete value is
/// supplied by whichever branch enters the block.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockParam {
    /// The type of the parameter value.
    pub ty: Type,
    /// The value the parameter defines.
    pub value: Value,
}

/// A predecessor edge: the branching instruction in `block` that targets us.
///
/// A block can appear more than once if several of its branches target the
/// same successor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockPredecessor {
    /// The predecessor block.
    pub block: Block,
    /// The branch instruction in `block` that targets this block.
    pub branch: Inst,
}

impl BlockPredecessor {
    /// Convenient method to construct a new predecessor edge.
    pub fn new(block: Block, branch: Inst) -> Self {
        Self { block, branch }
    }
}

/// Contents and SSA-construction state of one basic block.
pub struct BlockData {
    /// First instruction, or none while the block is empty.
    pub root: PackedOption<Inst>,
    /// Last instruction, or none while the block is empty.
    pub tail: PackedOption<Inst>,
    /// Ordered block parameters.
    pub params: SmallVec<[BlockParam; 4]>,
    /// Incoming edges.
    pub preds: Vec<BlockPredecessor>,
    /// Outgoing edges, in branch order. Non-owning references.
    pub succs: Vec<Block>,
    /// Set once the front-end promises no further predecessors.
    pub sealed: bool,
    /// The unique predecessor, cached at seal time when there is exactly one.
    pub single_pred: PackedOption<Block>,
    /// The most recent definition of each variable inside this block.
    pub last_definitions: FxHashMap<Variable, Value>,
    /// Placeholder values handed out for reads of variables with no local
    /// definition while the block was unsealed, in creation order. Resolved
    /// into real block parameters when the block is sealed.
    pub unknown_values: Vec<(Variable, Value)>,
    /// Set by dead-block elimination; an invalid block is skipped by all
    /// iterators but keeps its number until the next reset.
    pub invalid: bool,
    /// Set by loop detection when a back edge targets this block.
    pub loop_header: bool,
    /// Position in the reverse postorder, or `u32::MAX` when unreachable.
    pub rpo_number: u32,
    /// Estimated execution frequency, written by the frequency pass.
    pub frequency: u64,
}

impl Default for BlockData {
    /// An empty, unsealed, unreachable block. This is what the pool hands
    /// out on allocation and restores on reset.
    fn default() -> Self {
        Self {
            root: None.into(),
            tail: None.into(),
            params: SmallVec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
            sealed: false,
            single_pred: None.into(),
            last_definitions: FxHashMap::default(),
            unknown_values: Vec::new(),
            invalid: false,
            loop_header: false,
            rpo_number: u32::MAX,
            frequency: 0,
        }
    }
}

impl BlockData {
    /// Is this block reachable according to the last dominator computation?
    pub fn is_reachable(&self) -> bool {
        self.rpo_number != u32::MAX
    }

    /// The parameter values in order.
    pub fn param_values(&self) -> impl Iterator<Item = Value> + '_ {
        self.params.iter().map(|p| p.value)
    }

    /// Add an incoming edge from `branch` in `pred`.
    pub fn add_pred(&mut self, pred: Block, branch: Inst) {
        debug_assert!(!self.sealed, "adding a predecessor to a sealed block");
        self.preds.push(BlockPredecessor::new(pred, branch));
    }

    /// Remove the incoming edge carried by `branch`, if present.
    pub fn remove_pred(&mut self, branch: Inst) {
        self.preds.retain(|p| p.branch != branch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_entity::EntityRef;

    #[test]
    fn predecessor_edges() {
        let mut data = BlockData::default();
        let b1 = Block::new(1);
        let b2 = Block::new(2);
        data.add_pred(b1, Inst::new(10));
        data.add_pred(b2, Inst::new(20));
        assert_eq!(data.preds.len(), 2);
        data.remove_pred(Inst::new(10));
        assert_eq!(data.preds, vec![BlockPredecessor::new(b2, Inst::new(20))]);
    }

    #[test]
    fn fresh_block_is_unreachable_and_unsealed() {
        let data = BlockData::default();
        assert!(!data.is_reachable());
        assert!(!data.sealed);
        assert!(data.root.is_none() && data.tail.is_none());
    }
}
